// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Configuration for a live rig.
//!
//! The controls file binds foot-controller buttons to controls, names the
//! track groups that hold each song's sounds and playback tracks, and
//! overrides keyboard shortcuts. It is read from YAML or TOML depending on
//! the file extension.

pub mod watcher;

pub use watcher::{validate_config, ConfigEvent, ConfigWatcher};

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::midi::MidiFilter;
use crate::tracks::MonitorMode;

/// Root of the controls file
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ControlsFile {
    /// MIDI device configuration
    #[serde(default)]
    pub midi: MidiDeviceConfig,
    /// Button bindings for the foot controller
    #[serde(default)]
    pub mappings: ControlMappings,
    #[serde(default)]
    pub gesture: GestureConfig,
    #[serde(default)]
    pub sounds: SoundSettings,
    #[serde(default)]
    pub playback: PlaybackSettings,
    #[serde(default)]
    pub backend: BackendConfig,
    /// Keyboard shortcut overrides (key description -> action name)
    #[serde(default)]
    pub keyboard: HashMap<String, String>,
}

impl ControlsFile {
    /// Load a controls file, picking the format from the extension
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read controls file: {:?}", path))?;
        let parsed = if is_toml(path) {
            Self::from_toml(&contents)
        } else {
            Self::from_yaml(&contents)
        };
        parsed.with_context(|| format!("Invalid controls file: {:?}", path))
    }

    /// Parse controls configuration from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).context("Failed to parse controls YAML")
    }

    /// Parse controls configuration from TOML string
    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).context("Failed to parse controls TOML")
    }

    /// Serialize to YAML string
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).context("Failed to serialize controls to YAML")
    }

    /// Save to a YAML file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let yaml = self.to_yaml()?;
        fs::write(path.as_ref(), yaml)
            .with_context(|| format!("Failed to write controls file: {:?}", path.as_ref()))
    }
}

fn is_toml(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "toml")
}

/// Whether a path looks like a controls file
pub fn is_config_file(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext == "yaml" || ext == "yml" || ext == "toml")
}

/// MIDI device configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct MidiDeviceConfig {
    /// Substring of the input port name to connect to
    #[serde(default)]
    pub device: Option<String>,
}

/// Button filter per control. An unset binding never matches.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ControlMappings {
    #[serde(default)]
    pub track_switch: Option<MidiFilter>,
    #[serde(default)]
    pub song_switch: Option<MidiFilter>,
    #[serde(default)]
    pub section_switch: Option<MidiFilter>,
    #[serde(default)]
    pub play_pause: Option<MidiFilter>,
}

/// Tap gesture timing
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GestureConfig {
    /// Quiet window after the last press before taps are counted
    #[serde(default = "default_window_ms")]
    pub window_ms: u64,
}

fn default_window_ms() -> u64 {
    500
}

impl GestureConfig {
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }
}

impl Default for GestureConfig {
    fn default() -> Self {
        Self {
            window_ms: default_window_ms(),
        }
    }
}

/// Where each song's sounds live in the track tree
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SoundSettings {
    /// Root-level group holding one sound group per song
    #[serde(default = "default_sound_root")]
    pub root_group: String,
    /// Sound group used when a song has none of its own
    #[serde(default = "default_sound_group")]
    pub default_group: String,
    /// Song name -> sound group name, for takes that share sounds
    #[serde(default)]
    pub overrides: HashMap<String, String>,
    /// Monitor mode applied to a song's sounds when it becomes current
    #[serde(default)]
    pub monitor_mode: Option<MonitorMode>,
    /// Arm the first sound when the song changes
    #[serde(default)]
    pub arm_first_on_song_change: bool,
}

fn default_sound_root() -> String {
    "Guitar Sounds".to_string()
}
fn default_sound_group() -> String {
    "Default".to_string()
}

impl Default for SoundSettings {
    fn default() -> Self {
        Self {
            root_group: default_sound_root(),
            default_group: default_sound_group(),
            overrides: HashMap::new(),
            monitor_mode: None,
            arm_first_on_song_change: false,
        }
    }
}

/// Where each song's backing tracks live in the track tree
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlaybackSettings {
    #[serde(default = "default_playback_root")]
    pub root_group: String,
}

fn default_playback_root() -> String {
    "Playback Tracks".to_string()
}

impl Default for PlaybackSettings {
    fn default() -> Self {
        Self {
            root_group: default_playback_root(),
        }
    }
}

/// Session backend connection settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BackendConfig {
    /// Fixed backoff between connection attempts at startup
    #[serde(default = "default_retry_ms")]
    pub retry_ms: u64,
}

fn default_retry_ms() -> u64 {
    1000
}

impl BackendConfig {
    pub fn retry(&self) -> Duration {
        Duration::from_millis(self.retry_ms)
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            retry_ms: default_retry_ms(),
        }
    }
}
