// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Track hierarchy of the live session.
//!
//! The session backend reports tracks as a flat list where each record may
//! reference its parent group. [`build_tree`] turns that list into a tree of
//! leaf tracks (armable MIDI/audio tracks) and group tracks. The tree is
//! always rebuilt from a fresh flat list; it is never patched in place.

pub mod select;

pub use select::{playback_tracks_for_song, root_group, sound_group_name, sounds_for_song};

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

/// Backend-assigned track identifier, stable across updates
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrackId(pub String);

impl TrackId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TrackId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Input monitoring state of an armable track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MonitorMode {
    In,
    #[default]
    Auto,
    Off,
}

/// One entry of the flat track list reported by the backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackRecord {
    pub id: TrackId,
    pub name: String,
    /// Parent group, if the track is nested
    #[serde(default)]
    pub parent_id: Option<TrackId>,
    /// Whether the backend reports the track as armable (non-group)
    pub can_be_armed: bool,
    #[serde(default)]
    pub armed: bool,
    #[serde(default)]
    pub muted: bool,
    #[serde(default)]
    pub monitor_mode: MonitorMode,
}

impl TrackRecord {
    /// Armable MIDI/audio track
    pub fn leaf(id: &str, name: &str, parent: Option<&str>) -> Self {
        Self {
            id: TrackId::from(id),
            name: name.to_string(),
            parent_id: parent.map(TrackId::from),
            can_be_armed: true,
            armed: false,
            muted: false,
            monitor_mode: MonitorMode::default(),
        }
    }

    /// Group track
    pub fn group(id: &str, name: &str, parent: Option<&str>) -> Self {
        Self {
            can_be_armed: false,
            ..Self::leaf(id, name, parent)
        }
    }

    pub fn armed(mut self, armed: bool) -> Self {
        self.armed = armed;
        self
    }
}

/// Errors raised when using the track tree
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TrackError {
    /// Group tracks cannot be armed
    #[error("track '{name}' ({id}) is a group track and cannot be armed")]
    NotArmable { id: TrackId, name: String },
    /// No track with this id in the tree
    #[error("track {0} not found")]
    NotFound(TrackId),
}

/// An armable MIDI or audio track
#[derive(Debug, Clone, PartialEq)]
pub struct LeafTrack {
    pub id: TrackId,
    pub name: String,
    pub parent_id: Option<TrackId>,
    pub armed: bool,
    pub muted: bool,
    pub monitor_mode: MonitorMode,
}

/// A group containing other tracks. Never armable.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupTrack {
    pub id: TrackId,
    pub name: String,
    pub parent_id: Option<TrackId>,
    pub muted: bool,
    pub children: Vec<Track>,
}

impl GroupTrack {
    /// Direct child group with the given name
    pub fn child_group(&self, name: &str) -> Option<&GroupTrack> {
        self.children
            .iter()
            .filter_map(Track::as_group)
            .find(|group| group.name == name)
    }

    /// Direct children that are leaf tracks
    pub fn leaf_children(&self) -> impl Iterator<Item = &LeafTrack> {
        self.children.iter().filter_map(Track::as_leaf)
    }
}

/// Node of the track tree
#[derive(Debug, Clone, PartialEq)]
pub enum Track {
    Leaf(LeafTrack),
    Group(GroupTrack),
}

impl Track {
    pub fn id(&self) -> &TrackId {
        match self {
            Track::Leaf(t) => &t.id,
            Track::Group(g) => &g.id,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Track::Leaf(t) => &t.name,
            Track::Group(g) => &g.name,
        }
    }

    pub fn parent_id(&self) -> Option<&TrackId> {
        match self {
            Track::Leaf(t) => t.parent_id.as_ref(),
            Track::Group(g) => g.parent_id.as_ref(),
        }
    }

    pub fn is_group(&self) -> bool {
        matches!(self, Track::Group(_))
    }

    pub fn as_leaf(&self) -> Option<&LeafTrack> {
        match self {
            Track::Leaf(t) => Some(t),
            Track::Group(_) => None,
        }
    }

    pub fn as_group(&self) -> Option<&GroupTrack> {
        match self {
            Track::Group(g) => Some(g),
            Track::Leaf(_) => None,
        }
    }

    /// The leaf track, or a usage error for groups
    pub fn armable(&self) -> Result<&LeafTrack, TrackError> {
        match self {
            Track::Leaf(t) => Ok(t),
            Track::Group(g) => Err(TrackError::NotArmable {
                id: g.id.clone(),
                name: g.name.clone(),
            }),
        }
    }

    fn from_record(record: &TrackRecord, children: Vec<Track>) -> Self {
        if record.can_be_armed {
            Track::Leaf(LeafTrack {
                id: record.id.clone(),
                name: record.name.clone(),
                parent_id: record.parent_id.clone(),
                armed: record.armed,
                muted: record.muted,
                monitor_mode: record.monitor_mode,
            })
        } else {
            Track::Group(GroupTrack {
                id: record.id.clone(),
                name: record.name.clone(),
                parent_id: record.parent_id.clone(),
                muted: record.muted,
                children,
            })
        }
    }
}

/// Build the track hierarchy from the flat list.
///
/// Children keep the order of the flat list. A record whose parent is
/// missing or is not a group is dropped (with its subtree) and reported.
/// Only records without a parent become roots.
pub fn build_tree(records: &[TrackRecord]) -> Vec<Track> {
    let index: HashMap<&TrackId, usize> = records
        .iter()
        .enumerate()
        .map(|(i, record)| (&record.id, i))
        .collect();

    let mut children: Vec<Vec<usize>> = vec![Vec::new(); records.len()];
    let mut roots = Vec::new();

    for (i, record) in records.iter().enumerate() {
        let Some(parent_id) = &record.parent_id else {
            roots.push(i);
            continue;
        };
        match index.get(parent_id) {
            Some(&parent) if !records[parent].can_be_armed => children[parent].push(i),
            Some(&parent) => warn!(
                track = %record.name,
                parent = %records[parent].name,
                "parent is not a valid group track, dropping track from tree"
            ),
            None => warn!(
                track = %record.name,
                parent_id = %parent_id,
                "parent track not found, dropping track from tree"
            ),
        }
    }

    // Every node reachable from a root has an acyclic parent chain
    fn assemble(i: usize, records: &[TrackRecord], children: &[Vec<usize>]) -> Track {
        let nested = children[i]
            .iter()
            .map(|&child| assemble(child, records, children))
            .collect();
        Track::from_record(&records[i], nested)
    }

    roots
        .into_iter()
        .map(|i| assemble(i, records, &children))
        .collect()
}

/// Flatten a tree back into records, pre-order
pub fn flatten(tree: &[Track]) -> Vec<TrackRecord> {
    fn visit(track: &Track, out: &mut Vec<TrackRecord>) {
        match track {
            Track::Leaf(t) => out.push(TrackRecord {
                id: t.id.clone(),
                name: t.name.clone(),
                parent_id: t.parent_id.clone(),
                can_be_armed: true,
                armed: t.armed,
                muted: t.muted,
                monitor_mode: t.monitor_mode,
            }),
            Track::Group(g) => {
                out.push(TrackRecord {
                    id: g.id.clone(),
                    name: g.name.clone(),
                    parent_id: g.parent_id.clone(),
                    can_be_armed: false,
                    armed: false,
                    muted: g.muted,
                    monitor_mode: MonitorMode::default(),
                });
                for child in &g.children {
                    visit(child, out);
                }
            }
        }
    }

    let mut out = Vec::new();
    for track in tree {
        visit(track, &mut out);
    }
    out
}

/// Find any track by id, depth first
pub fn find_track<'a>(tree: &'a [Track], id: &TrackId) -> Option<&'a Track> {
    for track in tree {
        if track.id() == id {
            return Some(track);
        }
        if let Track::Group(group) = track {
            if let Some(found) = find_track(&group.children, id) {
                return Some(found);
            }
        }
    }
    None
}

/// All leaf tracks of the tree, pre-order
pub fn leaves(tree: &[Track]) -> Vec<&LeafTrack> {
    let mut out = Vec::new();
    for track in tree {
        match track {
            Track::Leaf(t) => out.push(t),
            Track::Group(g) => out.extend(leaves(&g.children)),
        }
    }
    out
}
