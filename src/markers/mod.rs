// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Timeline markers and their classification.
//!
//! A session timeline carries named markers. Markers whose name starts with
//! [`SECTION_PREFIX`] mark the start of a section inside a song; every other
//! marker marks the start of a song.

pub mod tracker;

pub use tracker::{PositionChange, PositionTracker, ResolvedPosition};

use serde::{Deserialize, Serialize};

/// Name prefix reserved for section markers
pub const SECTION_PREFIX: char = '#';

/// Kind of a classified marker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MarkerKind {
    /// Start of a song
    SongStart,
    /// Start of a section within the current song
    Section,
}

/// A marker as reported by the session backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawMarker {
    /// Name exactly as it appears on the timeline
    pub name: String,
    /// Timeline position of the marker
    pub time: f64,
}

impl RawMarker {
    pub fn new(name: impl Into<String>, time: f64) -> Self {
        Self {
            name: name.into(),
            time,
        }
    }
}

/// A classified marker
#[derive(Debug, Clone, PartialEq)]
pub struct Marker {
    /// Display name (section prefix stripped)
    pub name: String,
    /// Timeline position
    pub time: f64,
    /// Song start or section
    pub kind: MarkerKind,
}

impl Marker {
    /// Classify a single raw marker
    pub fn classify(raw: &RawMarker) -> Self {
        match raw.name.strip_prefix(SECTION_PREFIX) {
            Some(name) => Self {
                name: name.to_string(),
                time: raw.time,
                kind: MarkerKind::Section,
            },
            None => Self {
                name: raw.name.clone(),
                time: raw.time,
                kind: MarkerKind::SongStart,
            },
        }
    }

    pub fn is_section(&self) -> bool {
        self.kind == MarkerKind::Section
    }
}

/// Classify a list of raw markers, preserving order.
pub fn classify(raw: &[RawMarker]) -> Vec<Marker> {
    raw.iter().map(Marker::classify).collect()
}

/// Direction of a neighbor lookup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Next,
    Previous,
}

/// Index of the marker the position is currently inside.
///
/// `markers` must be ordered by time. The result is the marker with
/// `time <= position` whose successor (if any) lies after `position`.
pub fn current_index(markers: &[Marker], position: f64) -> Option<usize> {
    markers.iter().enumerate().position(|(i, marker)| {
        marker.time <= position
            && markers
                .get(i + 1)
                .map_or(true, |next| next.time > position)
    })
}

/// Marker the position is currently inside, if any
pub fn current_marker(markers: &[Marker], position: f64) -> Option<&Marker> {
    current_index(markers, position).map(|i| &markers[i])
}

/// Marker immediately before or after `current`. No wraparound.
pub fn neighbor(markers: &[Marker], current: Option<usize>, direction: Direction) -> Option<&Marker> {
    let current = current?;
    let index = match direction {
        Direction::Next => current.checked_add(1)?,
        Direction::Previous => current.checked_sub(1)?,
    };
    markers.get(index)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{Rng, SeedableRng};
    use rand::rngs::StdRng;

    fn songs(times: &[(&str, f64)]) -> Vec<Marker> {
        times
            .iter()
            .map(|(name, time)| Marker {
                name: name.to_string(),
                time: *time,
                kind: MarkerKind::SongStart,
            })
            .collect()
    }

    #[test]
    fn test_classify_section_prefix() {
        let marker = Marker::classify(&RawMarker::new("#Chorus", 40.0));
        assert_eq!(marker.kind, MarkerKind::Section);
        assert_eq!(marker.name, "Chorus");
        assert_eq!(marker.time, 40.0);
    }

    #[test]
    fn test_classify_song_start() {
        let marker = Marker::classify(&RawMarker::new("Intro", 0.0));
        assert_eq!(marker.kind, MarkerKind::SongStart);
        assert_eq!(marker.name, "Intro");
    }

    #[test]
    fn test_classify_only_strips_one_prefix() {
        let marker = Marker::classify(&RawMarker::new("##Outro", 8.0));
        assert_eq!(marker.kind, MarkerKind::Section);
        assert_eq!(marker.name, "#Outro");
    }

    #[test]
    fn test_classify_empty_and_prefix_only() {
        let empty = Marker::classify(&RawMarker::new("", 1.0));
        assert_eq!(empty.kind, MarkerKind::SongStart);
        assert_eq!(empty.name, "");

        let bare = Marker::classify(&RawMarker::new("#", 2.0));
        assert_eq!(bare.kind, MarkerKind::Section);
        assert_eq!(bare.name, "");
    }

    #[test]
    fn test_classify_random_names() {
        let mut rng = StdRng::seed_from_u64(7);
        let alphabet = ['#', 'a', 'B', ' ', '1'];
        let raw: Vec<RawMarker> = (0..200)
            .map(|i| {
                let len = rng.gen_range(0..6);
                let name: String = (0..len)
                    .map(|_| alphabet[rng.gen_range(0..alphabet.len())])
                    .collect();
                RawMarker::new(name, i as f64)
            })
            .collect();

        for (raw, marker) in raw.iter().zip(classify(&raw)) {
            if raw.name.starts_with('#') {
                assert_eq!(marker.kind, MarkerKind::Section);
                assert_eq!(marker.name, raw.name[1..]);
            } else {
                assert_eq!(marker.kind, MarkerKind::SongStart);
                assert_eq!(marker.name, raw.name);
            }
        }
    }

    #[test]
    fn test_current_marker() {
        let markers = songs(&[("A", 0.0), ("B", 10.0), ("C", 20.0)]);
        assert_eq!(current_marker(&markers, 0.0).unwrap().name, "A");
        assert_eq!(current_marker(&markers, 9.99).unwrap().name, "A");
        assert_eq!(current_marker(&markers, 10.0).unwrap().name, "B");
        assert_eq!(current_marker(&markers, 500.0).unwrap().name, "C");
    }

    #[test]
    fn test_current_marker_before_first() {
        let markers = songs(&[("A", 4.0), ("B", 10.0)]);
        assert!(current_marker(&markers, 3.0).is_none());
        assert!(current_marker(&[], 3.0).is_none());
    }

    #[test]
    fn test_current_marker_matches_definition() {
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..200 {
            let count = rng.gen_range(0..12);
            let mut times: Vec<f64> = (0..count).map(|_| rng.gen_range(0..50) as f64).collect();
            times.sort_by(|a, b| a.total_cmp(b));
            let markers: Vec<Marker> = times
                .iter()
                .enumerate()
                .map(|(i, t)| Marker {
                    name: format!("m{}", i),
                    time: *t,
                    kind: MarkerKind::SongStart,
                })
                .collect();
            let position = rng.gen_range(-5.0..60.0);

            // The last marker at or before the position, by list order
            let expected = markers.iter().rposition(|m| m.time <= position);
            assert_eq!(current_index(&markers, position), expected);
        }
    }

    #[test]
    fn test_neighbor_no_wraparound() {
        let markers = songs(&[("A", 0.0), ("B", 10.0), ("C", 20.0)]);
        assert_eq!(neighbor(&markers, Some(1), Direction::Next).unwrap().name, "C");
        assert_eq!(neighbor(&markers, Some(1), Direction::Previous).unwrap().name, "A");
        assert!(neighbor(&markers, Some(2), Direction::Next).is_none());
        assert!(neighbor(&markers, Some(0), Direction::Previous).is_none());
        assert!(neighbor(&markers, None, Direction::Next).is_none());
    }
}
