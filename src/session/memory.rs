// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! In-memory session backend.
//!
//! Holds a whole live set in memory, loaded from a YAML session file. Used
//! for rehearsing a set without the studio host and as the backend of the
//! test suite: every mutating call is recorded as a [`SessionCommand`].

use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tracing::debug;

use super::{BackendEvent, LoopRegion, SessionBackend, SessionError, SessionResult};
use crate::markers::RawMarker;
use crate::tracks::{MonitorMode, TrackId, TrackRecord};

/// A live set as stored on disk
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionFile {
    /// Timeline length in seconds
    #[serde(default = "default_song_length")]
    pub song_length: f64,
    #[serde(default)]
    pub position: f64,
    #[serde(default)]
    pub playing: bool,
    #[serde(default, rename = "loop")]
    pub loop_region: LoopRegion,
    #[serde(default)]
    pub markers: Vec<RawMarker>,
    #[serde(default)]
    pub tracks: Vec<TrackRecord>,
}

fn default_song_length() -> f64 {
    600.0
}

impl Default for SessionFile {
    fn default() -> Self {
        Self {
            song_length: default_song_length(),
            position: 0.0,
            playing: false,
            loop_region: LoopRegion::default(),
            markers: Vec::new(),
            tracks: Vec::new(),
        }
    }
}

impl SessionFile {
    /// Load a session from a YAML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read session file: {:?}", path.as_ref()))?;
        Self::from_yaml(&contents)
    }

    /// Parse a session from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).context("Failed to parse session YAML")
    }

    /// Serialize to YAML string
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).context("Failed to serialize session to YAML")
    }
}

/// A mutating call received by the in-memory backend
#[derive(Debug, Clone, PartialEq)]
pub enum SessionCommand {
    SetArm(TrackId, bool),
    SetMute(TrackId, bool),
    SetMonitorMode(TrackId, MonitorMode),
    JumpToTime(f64),
    SetPlaying(bool),
    SetLoop(f64, f64),
}

#[derive(Debug, Default)]
struct SessionState {
    file: SessionFile,
    connected: bool,
    fail_connects: u32,
    watched: HashSet<TrackId>,
    reject_arm: HashSet<TrackId>,
    commands: Vec<SessionCommand>,
    subscribers: Vec<UnboundedSender<BackendEvent>>,
}

impl SessionState {
    fn emit(&mut self, event: BackendEvent) {
        debug!(?event, "session event");
        self.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    fn ensure_connected(&self) -> SessionResult<()> {
        if self.connected {
            Ok(())
        } else {
            Err(SessionError::Disconnected)
        }
    }

    fn track_mut(&mut self, id: &TrackId) -> SessionResult<&mut TrackRecord> {
        self.file
            .tracks
            .iter_mut()
            .find(|t| &t.id == id)
            .ok_or_else(|| SessionError::UnknownTrack(id.clone()))
    }

    fn armable_mut(&mut self, id: &TrackId) -> SessionResult<&mut TrackRecord> {
        let track = self.track_mut(id)?;
        if !track.can_be_armed {
            return Err(SessionError::Rejected {
                command: "arm".to_string(),
                reason: format!("'{}' is a group track", track.name),
            });
        }
        Ok(track)
    }

    fn flag_changed(&mut self, id: &TrackId) {
        if self.watched.contains(id) {
            self.emit(BackendEvent::TrackFlagChanged(id.clone()));
        }
    }
}

/// Session backend holding the whole set in memory
#[derive(Debug, Default)]
pub struct MemorySession {
    state: Mutex<SessionState>,
}

impl MemorySession {
    pub fn new(file: SessionFile) -> Self {
        Self {
            state: Mutex::new(SessionState {
                file,
                ..SessionState::default()
            }),
        }
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Self::new(SessionFile::load(path)?))
    }

    fn state(&self) -> MutexGuard<'_, SessionState> {
        // State stays consistent even if a holder panicked
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Fail the next `count` connection attempts as busy
    pub fn fail_next_connects(&self, count: u32) {
        self.state().fail_connects = count;
    }

    /// Make arming this track silently not take effect
    pub fn reject_arm(&self, id: impl Into<TrackId>) {
        self.state().reject_arm.insert(id.into());
    }

    /// Mutating calls received so far
    pub fn commands(&self) -> Vec<SessionCommand> {
        self.state().commands.clone()
    }

    pub fn clear_commands(&self) {
        self.state().commands.clear();
    }

    /// Current snapshot of the set
    pub fn snapshot(&self) -> SessionFile {
        self.state().file.clone()
    }

    /// Move the playhead as the transport would
    pub fn move_playhead(&self, position: f64) {
        let mut state = self.state();
        state.file.position = position;
        state.emit(BackendEvent::PositionChanged(position));
    }

    /// Replace the markers as an edit of the set would
    pub fn replace_markers(&self, markers: Vec<RawMarker>) {
        let mut state = self.state();
        state.file.markers = markers.clone();
        state.emit(BackendEvent::MarkersChanged(markers));
    }

    /// Replace the track list as an edit of the set would
    pub fn replace_tracks(&self, tracks: Vec<TrackRecord>) {
        let mut state = self.state();
        state.file.tracks = tracks;
        state.emit(BackendEvent::TracksChanged);
    }

    /// Change a track's arm state from outside (e.g. clicked in the host)
    pub fn arm_externally(&self, id: &TrackId, armed: bool) {
        let mut state = self.state();
        if let Ok(track) = state.track_mut(id) {
            track.armed = armed;
            state.flag_changed(id);
        }
    }

    /// Advance the playhead while playing, stopping at the end of the song.
    pub fn spawn_transport(self: &Arc<Self>, tick: Duration) -> JoinHandle<()> {
        let session = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(tick);
            loop {
                interval.tick().await;
                let mut state = session.state();
                if !state.file.playing {
                    continue;
                }
                let position = (state.file.position + tick.as_secs_f64()).min(state.file.song_length);
                state.file.position = position;
                state.emit(BackendEvent::PositionChanged(position));
                if position >= state.file.song_length {
                    state.file.playing = false;
                    state.emit(BackendEvent::PlayingChanged(false));
                }
            }
        })
    }
}

impl SessionBackend for MemorySession {
    async fn connect(&self) -> SessionResult<()> {
        let mut state = self.state();
        if state.fail_connects > 0 {
            state.fail_connects -= 1;
            return Err(SessionError::Unavailable("resource busy".to_string()));
        }
        state.connected = true;
        Ok(())
    }

    fn subscribe(&self) -> UnboundedReceiver<BackendEvent> {
        let (tx, rx) = unbounded_channel();
        self.state().subscribers.push(tx);
        rx
    }

    async fn watch_track_flags(&self, id: &TrackId) -> SessionResult<()> {
        let mut state = self.state();
        state.ensure_connected()?;
        state.track_mut(id)?;
        state.watched.insert(id.clone());
        Ok(())
    }

    async fn markers(&self) -> SessionResult<Vec<RawMarker>> {
        let state = self.state();
        state.ensure_connected()?;
        Ok(state.file.markers.clone())
    }

    async fn position(&self) -> SessionResult<f64> {
        let state = self.state();
        state.ensure_connected()?;
        Ok(state.file.position)
    }

    async fn tracks(&self) -> SessionResult<Vec<TrackRecord>> {
        let state = self.state();
        state.ensure_connected()?;
        Ok(state.file.tracks.clone())
    }

    async fn set_arm(&self, id: &TrackId, armed: bool) -> SessionResult<()> {
        let mut state = self.state();
        state.ensure_connected()?;
        state.commands.push(SessionCommand::SetArm(id.clone(), armed));
        if armed && state.reject_arm.contains(id) {
            debug!(track = %id, "arm silently ignored");
            return Ok(());
        }
        let track = state.armable_mut(id)?;
        if track.armed != armed {
            track.armed = armed;
            state.flag_changed(id);
        }
        Ok(())
    }

    async fn is_armed(&self, id: &TrackId) -> SessionResult<bool> {
        let mut state = self.state();
        state.ensure_connected()?;
        Ok(state.track_mut(id)?.armed)
    }

    async fn set_mute(&self, id: &TrackId, muted: bool) -> SessionResult<()> {
        let mut state = self.state();
        state.ensure_connected()?;
        state.commands.push(SessionCommand::SetMute(id.clone(), muted));
        let track = state.track_mut(id)?;
        if track.muted != muted {
            track.muted = muted;
            state.flag_changed(id);
        }
        Ok(())
    }

    async fn set_monitor_mode(&self, id: &TrackId, mode: MonitorMode) -> SessionResult<()> {
        let mut state = self.state();
        state.ensure_connected()?;
        state
            .commands
            .push(SessionCommand::SetMonitorMode(id.clone(), mode));
        let track = state.armable_mut(id)?;
        if track.monitor_mode != mode {
            track.monitor_mode = mode;
            state.flag_changed(id);
        }
        Ok(())
    }

    async fn jump_to_time(&self, time: f64) -> SessionResult<()> {
        let mut state = self.state();
        state.ensure_connected()?;
        state.commands.push(SessionCommand::JumpToTime(time));
        let position = time.clamp(0.0, state.file.song_length);
        state.file.position = position;
        state.emit(BackendEvent::PositionChanged(position));
        Ok(())
    }

    async fn set_playing(&self, playing: bool) -> SessionResult<()> {
        let mut state = self.state();
        state.ensure_connected()?;
        state.commands.push(SessionCommand::SetPlaying(playing));
        if state.file.playing != playing {
            state.file.playing = playing;
            state.emit(BackendEvent::PlayingChanged(playing));
        }
        Ok(())
    }

    async fn is_playing(&self) -> SessionResult<bool> {
        let state = self.state();
        state.ensure_connected()?;
        Ok(state.file.playing)
    }

    async fn set_loop(&self, start: f64, length: f64) -> SessionResult<()> {
        let mut state = self.state();
        state.ensure_connected()?;
        state.commands.push(SessionCommand::SetLoop(start, length));
        let song_length = state.file.song_length;
        if start < 0.0 || length <= 0.0 || start + length > song_length {
            return Err(SessionError::Rejected {
                command: "set loop".to_string(),
                reason: format!(
                    "loop {}+{} does not fit a song of length {}",
                    start, length, song_length
                ),
            });
        }
        state.file.loop_region = LoopRegion::new(start, length);
        Ok(())
    }

    async fn loop_region(&self) -> SessionResult<LoopRegion> {
        let state = self.state();
        state.ensure_connected()?;
        Ok(state.file.loop_region)
    }

    async fn song_length(&self) -> SessionResult<f64> {
        let state = self.state();
        state.ensure_connected()?;
        Ok(state.file.song_length)
    }
}
