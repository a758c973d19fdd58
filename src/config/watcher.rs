// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! File watcher for hot-reloading the controls file.
//!
//! Modifications are debounced, re-parsed and forwarded to the engine so
//! new bindings take effect without restarting mid-set. A file that fails
//! to parse is reported and the running configuration is kept.

use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, Sender};
use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc::UnboundedSender;
use tracing::debug;

use super::ControlsFile;

/// Events emitted by the config watcher
#[derive(Debug, Clone)]
pub enum ConfigEvent {
    /// Controls file was modified and successfully reloaded
    Reloaded(Box<ControlsFile>),
    /// Controls file was modified but failed to parse
    Error(String),
}

/// Controls file watcher with debouncing and validation
pub struct ConfigWatcher {
    _watcher: RecommendedWatcher,
    watched_path: PathBuf,
}

impl ConfigWatcher {
    /// Watch a controls file and send a [`ConfigEvent`] for each settled
    /// modification.
    ///
    /// # Arguments
    /// * `path` - Controls file to watch
    /// * `debounce` - Quiet time after the last modification before reloading
    /// * `events` - Channel the engine reads reloads from
    pub fn spawn<P: AsRef<Path>>(
        path: P,
        debounce: Duration,
        events: UnboundedSender<ConfigEvent>,
    ) -> Result<Self> {
        let watched_path = path.as_ref().to_path_buf();
        let file_name = watched_path.file_name().map(|n| n.to_os_string());

        let (notify_tx, notify_rx): (Sender<Event>, Receiver<Event>) = mpsc::channel();

        let mut watcher = RecommendedWatcher::new(
            move |res: Result<Event, notify::Error>| {
                if let Ok(event) = res {
                    let _ = notify_tx.send(event);
                }
            },
            Config::default(),
        )
        .map_err(|e| anyhow!("Failed to create file watcher: {}", e))?;

        // Editors often replace the file, so watch the directory and filter
        let watch_dir = match watched_path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        watcher
            .watch(&watch_dir, RecursiveMode::NonRecursive)
            .map_err(|e| anyhow!("Failed to watch path {:?}: {}", watch_dir, e))?;

        let reload_path = watched_path.clone();
        std::thread::spawn(move || {
            let mut last_event_time: Option<Instant> = None;

            loop {
                match notify_rx.recv_timeout(Duration::from_millis(50)) {
                    Ok(event) => {
                        let touches_file = event
                            .paths
                            .iter()
                            .any(|p| p.file_name().map(|n| n.to_os_string()) == file_name);
                        let relevant = matches!(
                            event.kind,
                            EventKind::Modify(_) | EventKind::Create(_)
                        );
                        if touches_file && relevant {
                            debug!(path = ?reload_path, "controls file changed");
                            last_event_time = Some(Instant::now());
                        }
                    }
                    Err(mpsc::RecvTimeoutError::Timeout) => {
                        let settled = last_event_time.is_some_and(|t| t.elapsed() >= debounce);
                        if settled {
                            last_event_time = None;
                            let event = match ControlsFile::load(&reload_path) {
                                Ok(config) => ConfigEvent::Reloaded(Box::new(config)),
                                Err(e) => ConfigEvent::Error(format!(
                                    "Failed to load {:?}: {:#}",
                                    reload_path, e
                                )),
                            };
                            if events.send(event).is_err() {
                                break;
                            }
                        }
                    }
                    Err(mpsc::RecvTimeoutError::Disconnected) => {
                        // Watcher was dropped, exit thread
                        break;
                    }
                }
            }
        });

        Ok(Self {
            _watcher: watcher,
            watched_path,
        })
    }

    /// Get the path being watched
    pub fn watched_path(&self) -> &Path {
        &self.watched_path
    }
}

/// Validate a controls file without applying it
pub fn validate_config<P: AsRef<Path>>(path: P) -> Result<ControlsFile> {
    ControlsFile::load(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_validate_config() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("controls.yaml");
        fs::write(&file_path, "gesture:\n  window_ms: 250\n").unwrap();

        let config = validate_config(&file_path).unwrap();
        assert_eq!(config.gesture.window_ms, 250);
    }

    #[test]
    fn test_validate_invalid_config() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("invalid.yaml");
        fs::write(&file_path, "this is not valid yaml: [").unwrap();

        assert!(validate_config(&file_path).is_err());
    }

    #[tokio::test]
    async fn test_watcher_creation() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("controls.yaml");
        fs::write(&file_path, "{}\n").unwrap();

        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        let watcher = ConfigWatcher::spawn(&file_path, Duration::from_millis(100), tx).unwrap();
        assert_eq!(watcher.watched_path(), file_path.as_path());
    }

    #[tokio::test]
    async fn test_watcher_detects_changes() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("controls.yaml");
        fs::write(&file_path, "gesture:\n  window_ms: 500\n").unwrap();

        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let _watcher = ConfigWatcher::spawn(&file_path, Duration::from_millis(100), tx).unwrap();

        tokio::time::sleep(Duration::from_millis(200)).await;
        fs::write(&file_path, "gesture:\n  window_ms: 300\n").unwrap();

        // A partial write may surface first as an error or a stale reload
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        loop {
            match tokio::time::timeout_at(deadline, rx.recv()).await {
                Ok(Some(ConfigEvent::Reloaded(config))) if config.gesture.window_ms == 300 => break,
                Ok(Some(_)) => continue,
                Ok(None) => panic!("watcher channel closed"),
                Err(_) => panic!("no reload within 5s of the edit"),
            }
        }
    }
}
