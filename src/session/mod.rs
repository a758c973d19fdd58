// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Session backend contract.
//!
//! The session backend owns the timeline, markers and tracks of the live
//! set and obeys transport and arming commands. Every call may suspend;
//! changes are pushed to subscribers as [`BackendEvent`]s.

pub mod memory;

pub use memory::{MemorySession, SessionCommand, SessionFile};

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{info, warn};

use crate::markers::RawMarker;
use crate::tracks::{MonitorMode, TrackError, TrackId, TrackRecord};

/// Errors reported by a session backend
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SessionError {
    /// Backend not reachable or busy; retry later
    #[error("session backend unavailable: {0}")]
    Unavailable(String),
    /// Call made before connecting or after the connection dropped
    #[error("session backend not connected")]
    Disconnected,
    #[error("unknown track {0}")]
    UnknownTrack(TrackId),
    #[error(transparent)]
    Track(#[from] TrackError),
    /// Backend refused the command
    #[error("backend rejected {command}: {reason}")]
    Rejected { command: String, reason: String },
}

pub type SessionResult<T> = Result<T, SessionError>;

/// Change notification pushed by the backend
#[derive(Debug, Clone, PartialEq)]
pub enum BackendEvent {
    /// The marker set changed; carries the full new snapshot
    MarkersChanged(Vec<RawMarker>),
    PositionChanged(f64),
    /// Tracks were added, removed or reparented
    TracksChanged,
    /// Arm, mute or monitor state of a watched track changed
    TrackFlagChanged(TrackId),
    PlayingChanged(bool),
}

/// Loop brace on the timeline
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct LoopRegion {
    pub start: f64,
    pub length: f64,
}

impl LoopRegion {
    pub fn new(start: f64, length: f64) -> Self {
        Self { start, length }
    }

    pub fn end(&self) -> f64 {
        self.start + self.length
    }
}

/// Contract the live controls use against the session backend
pub trait SessionBackend: Send + Sync + 'static {
    /// Establish the connection. May fail transiently while the backend
    /// is starting.
    fn connect(&self) -> impl Future<Output = SessionResult<()>> + Send;

    /// New receiver for change notifications
    fn subscribe(&self) -> UnboundedReceiver<BackendEvent>;

    /// Report arm, mute and monitor changes of one track as
    /// [`BackendEvent::TrackFlagChanged`]. Watching twice is harmless.
    fn watch_track_flags(&self, id: &TrackId) -> impl Future<Output = SessionResult<()>> + Send;

    fn markers(&self) -> impl Future<Output = SessionResult<Vec<RawMarker>>> + Send;

    fn position(&self) -> impl Future<Output = SessionResult<f64>> + Send;

    /// Flat track list with parent references
    fn tracks(&self) -> impl Future<Output = SessionResult<Vec<TrackRecord>>> + Send;

    fn set_arm(&self, id: &TrackId, armed: bool) -> impl Future<Output = SessionResult<()>> + Send;

    fn is_armed(&self, id: &TrackId) -> impl Future<Output = SessionResult<bool>> + Send;

    fn set_mute(&self, id: &TrackId, muted: bool) -> impl Future<Output = SessionResult<()>> + Send;

    fn set_monitor_mode(
        &self,
        id: &TrackId,
        mode: MonitorMode,
    ) -> impl Future<Output = SessionResult<()>> + Send;

    fn jump_to_time(&self, time: f64) -> impl Future<Output = SessionResult<()>> + Send;

    fn set_playing(&self, playing: bool) -> impl Future<Output = SessionResult<()>> + Send;

    fn is_playing(&self) -> impl Future<Output = SessionResult<bool>> + Send;

    /// Set the loop brace. Rejected if the loop would extend past the
    /// end of the song.
    fn set_loop(&self, start: f64, length: f64) -> impl Future<Output = SessionResult<()>> + Send;

    fn loop_region(&self) -> impl Future<Output = SessionResult<LoopRegion>> + Send;

    fn song_length(&self) -> impl Future<Output = SessionResult<f64>> + Send;
}

/// Connect, retrying with a fixed backoff until the backend answers.
///
/// Returns the number of attempts it took.
pub async fn connect_with_retry<B: SessionBackend>(backend: &B, backoff: Duration) -> u32 {
    let mut attempts = 0;
    loop {
        attempts += 1;
        match backend.connect().await {
            Ok(()) => {
                info!(attempts, "connected to session backend");
                return attempts;
            }
            Err(e) => {
                warn!(attempt = attempts, "{}; retrying in {:?}", e, backoff);
                tokio::time::sleep(backoff).await;
            }
        }
    }
}
