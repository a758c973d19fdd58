// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Song and section tracking against the live timeline position.
//!
//! The tracker keeps the latest marker snapshot and playhead position and
//! derives current/next/previous song and section from them on demand.
//! Sections are scoped to the current song: only sections in
//! `[current song start, next song start)` are considered, so section
//! navigation never crosses a song boundary.

use std::ops::Range;

use tracing::debug;

use super::{classify, current_index, neighbor, Direction, Marker, MarkerKind, RawMarker};

/// Current song and section, derived from markers and position
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolvedPosition {
    pub current_song: Option<Marker>,
    pub current_section: Option<Marker>,
}

impl ResolvedPosition {
    pub fn song_name(&self) -> Option<&str> {
        self.current_song.as_ref().map(|m| m.name.as_str())
    }

    pub fn section_name(&self) -> Option<&str> {
        self.current_section.as_ref().map(|m| m.name.as_str())
    }
}

/// Emitted when the resolved song or section name changes
#[derive(Debug, Clone, PartialEq)]
pub struct PositionChange {
    pub resolved: ResolvedPosition,
    pub song_changed: bool,
    pub section_changed: bool,
}

/// Derives the current song and section from markers and position
#[derive(Debug, Clone, Default)]
pub struct PositionTracker {
    /// Song start markers, ordered by time
    songs: Vec<Marker>,
    /// All section markers, ordered by time
    sections: Vec<Marker>,
    /// Latest playhead position
    position: f64,
    /// Last resolved names handed out
    last: ResolvedPosition,
}

impl PositionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the marker snapshot.
    ///
    /// Returns a change only if the resolved song or section name differs
    /// from the last one handed out.
    pub fn set_markers(&mut self, raw: &[RawMarker]) -> Option<PositionChange> {
        let mut markers = classify(raw);
        // Stable, so markers sharing a time keep backend order
        markers.sort_by(|a, b| a.time.total_cmp(&b.time));

        let (sections, songs): (Vec<Marker>, Vec<Marker>) =
            markers.into_iter().partition(Marker::is_section);
        self.songs = songs;
        self.sections = sections;
        self.refresh()
    }

    /// Update the playhead position.
    pub fn set_position(&mut self, position: f64) -> Option<PositionChange> {
        self.position = position;
        self.refresh()
    }

    pub fn position(&self) -> f64 {
        self.position
    }

    /// All song start markers, ordered by time
    pub fn songs(&self) -> &[Marker] {
        &self.songs
    }

    fn current_song_index(&self) -> Option<usize> {
        current_index(&self.songs, self.position)
    }

    pub fn current_song(&self) -> Option<&Marker> {
        self.current_song_index().map(|i| &self.songs[i])
    }

    pub fn next_song(&self) -> Option<&Marker> {
        neighbor(&self.songs, self.current_song_index(), Direction::Next)
    }

    pub fn previous_song(&self) -> Option<&Marker> {
        neighbor(&self.songs, self.current_song_index(), Direction::Previous)
    }

    /// Neighbor of the current marker of `kind` in the given direction
    pub fn neighbor(&self, kind: MarkerKind, direction: Direction) -> Option<&Marker> {
        match kind {
            MarkerKind::SongStart => neighbor(&self.songs, self.current_song_index(), direction),
            MarkerKind::Section => {
                let sections = self.song_sections();
                neighbor(sections, current_index(sections, self.position), direction)
            }
        }
    }

    fn section_range(&self) -> Range<usize> {
        let Some(song) = self.current_song() else {
            return 0..0;
        };
        let start = self.sections.partition_point(|s| s.time < song.time);
        let end = match self.next_song() {
            Some(next) => self.sections.partition_point(|s| s.time < next.time),
            None => self.sections.len(),
        };
        start..end.max(start)
    }

    /// Sections belonging to the current song, ordered by time
    pub fn song_sections(&self) -> &[Marker] {
        &self.sections[self.section_range()]
    }

    pub fn current_section(&self) -> Option<&Marker> {
        let sections = self.song_sections();
        let section = current_index(sections, self.position).map(|i| &sections[i])?;
        // A section before the song start belongs to the previous song
        match self.current_song() {
            Some(song) if section.time < song.time => None,
            _ => Some(section),
        }
    }

    pub fn next_section(&self) -> Option<&Marker> {
        self.neighbor(MarkerKind::Section, Direction::Next)
    }

    pub fn previous_section(&self) -> Option<&Marker> {
        self.neighbor(MarkerKind::Section, Direction::Previous)
    }

    /// Resolve the current song and section from the latest snapshot
    pub fn resolve(&self) -> ResolvedPosition {
        ResolvedPosition {
            current_song: self.current_song().cloned(),
            current_section: self.current_section().cloned(),
        }
    }

    /// Last resolved position handed out
    pub fn resolved(&self) -> &ResolvedPosition {
        &self.last
    }

    fn refresh(&mut self) -> Option<PositionChange> {
        let resolved = self.resolve();
        let song_changed = resolved.song_name() != self.last.song_name();
        let section_changed = resolved.section_name() != self.last.section_name();

        // Keep marker times fresh even when nothing is emitted
        self.last = resolved.clone();

        if !song_changed && !section_changed {
            debug!(position = self.position, "resolved position unchanged");
            return None;
        }

        Some(PositionChange {
            resolved,
            song_changed,
            section_changed,
        })
    }
}
