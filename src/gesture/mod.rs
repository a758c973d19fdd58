// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Tap gesture recognition for foot-controller buttons.
//!
//! Presses of one button are collected until the button has been quiet for
//! the configured window. The collected count is then classified: one
//! press is a single tap, two or more a double tap. Every press restarts
//! the window, so at most one timer is pending per button.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tracing::debug;

/// Classified tap gesture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tap {
    Single,
    Double,
}

/// A closed gesture for one logical control
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TapEvent<K> {
    pub key: K,
    pub tap: Tap,
}

/// Press counter for one button.
///
/// Each press bumps a generation; only the window opened by the latest
/// press may close the buffer.
#[derive(Debug, Clone, Default)]
pub struct TapBuffer {
    presses: usize,
    generation: u64,
}

impl TapBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a press. Returns the generation of the window it opens.
    pub fn press(&mut self) -> u64 {
        self.presses += 1;
        self.generation = self.generation.wrapping_add(1);
        self.generation
    }

    /// Close the window opened at `generation`.
    ///
    /// Stale generations leave the buffer untouched.
    pub fn close(&mut self, generation: u64) -> Option<Tap> {
        if generation != self.generation {
            return None;
        }
        let presses = std::mem::take(&mut self.presses);
        match presses {
            0 => None,
            1 => Some(Tap::Single),
            _ => Some(Tap::Double),
        }
    }

    pub fn pending(&self) -> usize {
        self.presses
    }

    /// Discard presses and invalidate any open window
    pub fn reset(&mut self) {
        self.presses = 0;
        self.generation = self.generation.wrapping_add(1);
    }
}

/// Debounced tap recognizer for one control.
///
/// Closed gestures are sent to `events` tagged with `key`. Must be used
/// from within a tokio runtime.
pub struct GestureRecognizer<K> {
    key: K,
    window: Duration,
    buffer: Arc<Mutex<TapBuffer>>,
    timer: Mutex<Option<JoinHandle<()>>>,
    events: UnboundedSender<TapEvent<K>>,
}

impl<K> GestureRecognizer<K>
where
    K: Copy + Send + std::fmt::Debug + 'static,
{
    pub fn new(key: K, window: Duration, events: UnboundedSender<TapEvent<K>>) -> Self {
        Self {
            key,
            window,
            buffer: Arc::new(Mutex::new(TapBuffer::new())),
            timer: Mutex::new(None),
            events,
        }
    }

    pub fn key(&self) -> K {
        self.key
    }

    /// Register a press and restart the quiet window
    pub fn press(&self) {
        let Ok(mut buffer) = self.buffer.lock() else {
            return;
        };
        let generation = buffer.press();
        debug!(key = ?self.key, presses = buffer.pending(), "tap");
        drop(buffer);

        let Ok(mut timer) = self.timer.lock() else {
            return;
        };
        if let Some(pending) = timer.take() {
            pending.abort();
        }

        let key = self.key;
        let window = self.window;
        let buffer = self.buffer.clone();
        let events = self.events.clone();
        *timer = Some(tokio::spawn(async move {
            tokio::time::sleep(window).await;
            let tap = match buffer.lock() {
                Ok(mut buffer) => buffer.close(generation),
                Err(_) => None,
            };
            if let Some(tap) = tap {
                debug!(?key, ?tap, "gesture closed");
                let _ = events.send(TapEvent { key, tap });
            }
        }));
    }

    /// Drop any pending presses without emitting a gesture
    pub fn cancel(&self) {
        if let Ok(mut timer) = self.timer.lock() {
            if let Some(pending) = timer.take() {
                pending.abort();
            }
        }
        if let Ok(mut buffer) = self.buffer.lock() {
            buffer.reset();
        }
    }
}

impl<K> Drop for GestureRecognizer<K> {
    fn drop(&mut self) {
        if let Ok(mut timer) = self.timer.lock() {
            if let Some(pending) = timer.take() {
                pending.abort();
            }
        }
    }
}
