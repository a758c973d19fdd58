// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Song-scoped track lookups.

use std::collections::HashMap;

use tracing::{debug, warn};

use super::{GroupTrack, LeafTrack, Track};
use crate::config::{PlaybackSettings, SoundSettings};

/// Root-level group with the given name
pub fn root_group<'a>(tree: &'a [Track], name: &str) -> Option<&'a GroupTrack> {
    tree.iter()
        .filter_map(Track::as_group)
        .find(|group| group.name == name)
}

/// Sound group name for a song, honoring the override table
pub fn sound_group_name<'a>(song: &'a str, overrides: &'a HashMap<String, String>) -> &'a str {
    match overrides.get(song) {
        Some(group) => {
            debug!(song, group = %group, "using sound group override");
            group.as_str()
        }
        None => song,
    }
}

/// Armable sounds for the current song.
///
/// Looks up the song's group under the sound root, falling back to the
/// default group. Only direct leaf children are returned.
pub fn sounds_for_song<'a>(
    tree: &'a [Track],
    song: Option<&str>,
    settings: &SoundSettings,
) -> Vec<&'a LeafTrack> {
    let Some(sounds) = root_group(tree, &settings.root_group) else {
        warn!(group = %settings.root_group, "sound track group not found");
        return Vec::new();
    };

    let song_group = song.and_then(|song| {
        let name = sound_group_name(song, &settings.overrides);
        sounds.child_group(name)
    });

    let group = match song_group {
        Some(group) => group,
        None => {
            warn!(
                song = song.unwrap_or("<none>"),
                fallback = %settings.default_group,
                "sounds for current song not found, using default sounds"
            );
            match sounds.child_group(&settings.default_group) {
                Some(group) => group,
                None => {
                    warn!(song = song.unwrap_or("<none>"), "no sounds could be found");
                    return Vec::new();
                }
            }
        }
    };

    group.leaf_children().collect()
}

/// Playback tracks for the current song.
///
/// Children are returned as they are; nested groups (e.g. a multi-track
/// drum kit) are not flattened.
pub fn playback_tracks_for_song<'a>(
    tree: &'a [Track],
    song: Option<&str>,
    settings: &PlaybackSettings,
) -> &'a [Track] {
    let Some(playback) = root_group(tree, &settings.root_group) else {
        warn!(group = %settings.root_group, "playback track group not found");
        return &[];
    };

    match song.and_then(|song| playback.child_group(song)) {
        Some(group) => &group.children,
        None => {
            warn!(song = song.unwrap_or("<none>"), "no playback tracks could be found");
            &[]
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracks::{build_tree, TrackRecord};

    fn tree() -> Vec<Track> {
        build_tree(&[
            TrackRecord::group("1", "Guitar Sounds", None),
            TrackRecord::group("2", "Default", Some("1")),
            TrackRecord::leaf("3", "Default Clean", Some("2")),
            TrackRecord::group("4", "Slow Dancing", Some("1")),
            TrackRecord::leaf("5", "Ambient", Some("4")),
            TrackRecord::leaf("6", "Lead", Some("4")),
            TrackRecord::group("7", "Nested", Some("4")),
            TrackRecord::group("10", "Playback Tracks", None),
            TrackRecord::group("11", "Intro", Some("10")),
            TrackRecord::leaf("12", "Keys", Some("11")),
            TrackRecord::group("13", "Drums", Some("11")),
            TrackRecord::leaf("14", "Kick", Some("13")),
        ])
    }

    fn names(tracks: &[&LeafTrack]) -> Vec<String> {
        tracks.iter().map(|t| t.name.clone()).collect()
    }

    #[test]
    fn test_sounds_for_song_exact_match() {
        let tree = tree();
        let mut settings = SoundSettings::default();
        settings.overrides.clear();
        let sounds = sounds_for_song(&tree, Some("Slow Dancing"), &settings);
        // The nested group is not a sound
        assert_eq!(names(&sounds), vec!["Ambient", "Lead"]);
    }

    #[test]
    fn test_sounds_for_song_override() {
        let tree = tree();
        let mut settings = SoundSettings::default();
        settings
            .overrides
            .insert("Slow Dancing (Live)".to_string(), "Slow Dancing".to_string());
        let sounds = sounds_for_song(&tree, Some("Slow Dancing (Live)"), &settings);
        assert_eq!(names(&sounds), vec!["Ambient", "Lead"]);
    }

    #[test]
    fn test_sounds_for_song_falls_back_to_default() {
        let tree = tree();
        let settings = SoundSettings::default();
        let sounds = sounds_for_song(&tree, Some("Unknown Song"), &settings);
        assert_eq!(names(&sounds), vec!["Default Clean"]);

        let sounds = sounds_for_song(&tree, None, &settings);
        assert_eq!(names(&sounds), vec!["Default Clean"]);
    }

    #[test]
    fn test_sounds_without_root_group() {
        let tree = tree();
        let settings = SoundSettings {
            root_group: "Bass Sounds".to_string(),
            ..SoundSettings::default()
        };
        assert!(sounds_for_song(&tree, Some("Slow Dancing"), &settings).is_empty());
    }

    #[test]
    fn test_playback_tracks_keep_nested_groups() {
        let tree = tree();
        let settings = PlaybackSettings::default();
        let tracks = playback_tracks_for_song(&tree, Some("Intro"), &settings);
        let names: Vec<&str> = tracks.iter().map(Track::name).collect();
        assert_eq!(names, vec!["Keys", "Drums"]);
        assert!(tracks[1].is_group());

        assert!(playback_tracks_for_song(&tree, Some("Outro"), &settings).is_empty());
    }
}
