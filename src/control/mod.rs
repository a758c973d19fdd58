// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Control vocabulary for the foot controller and keyboard.
//!
//! Foot-controller buttons are [`Control`]s whose tap gestures map to
//! [`ControlAction`]s. Keyboard shortcuts map to actions directly.

pub mod keyboard;

pub use keyboard::{format_shortcut, KeyBinding, KeyReader, KeyboardController, Shortcut};

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use crate::gesture::Tap;

/// Logical foot-controller button
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Control {
    TrackSwitch,
    SongSwitch,
    SectionSwitch,
    PlayPause,
}

impl Control {
    pub const ALL: [Control; 4] = [
        Control::TrackSwitch,
        Control::SongSwitch,
        Control::SectionSwitch,
        Control::PlayPause,
    ];

    /// Action a tap gesture on this control triggers
    pub fn action(self, tap: Tap) -> ControlAction {
        match (self, tap) {
            (Control::TrackSwitch, Tap::Single) => ControlAction::NextSound,
            (Control::TrackSwitch, Tap::Double) => ControlAction::PreviousSound,
            (Control::SongSwitch, Tap::Single) => ControlAction::NextSong,
            (Control::SongSwitch, Tap::Double) => ControlAction::PreviousSong,
            (Control::SectionSwitch, Tap::Single) => ControlAction::NextSection,
            (Control::SectionSwitch, Tap::Double) => ControlAction::PreviousSection,
            (Control::PlayPause, Tap::Single) => ControlAction::PlayPause,
            (Control::PlayPause, Tap::Double) => ControlAction::TogglePlayFrom,
        }
    }
}

/// Action that can be triggered by controls
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlAction {
    // Sounds
    /// Arm the next sound of the current song
    NextSound,
    /// Arm the previous sound of the current song
    PreviousSound,
    /// Toggle mute of the armed sound
    ToggleMute,

    // Navigation
    NextSong,
    PreviousSong,
    NextSection,
    PreviousSection,

    // Transport
    /// Start from the song or section start, or stop
    PlayPause,
    /// Switch between playing from the song start and the section start
    TogglePlayFrom,
    /// Move the loop start to the current section
    LoopStartToSection,
    /// Move the loop end to the end of the current section
    LoopEndToSection,

    /// Quit application
    Quit,
}

impl ControlAction {
    pub const ALL: [ControlAction; 12] = [
        ControlAction::NextSound,
        ControlAction::PreviousSound,
        ControlAction::ToggleMute,
        ControlAction::NextSong,
        ControlAction::PreviousSong,
        ControlAction::NextSection,
        ControlAction::PreviousSection,
        ControlAction::PlayPause,
        ControlAction::TogglePlayFrom,
        ControlAction::LoopStartToSection,
        ControlAction::LoopEndToSection,
        ControlAction::Quit,
    ];

    /// Name used in the controls file
    pub fn name(self) -> &'static str {
        match self {
            ControlAction::NextSound => "next_sound",
            ControlAction::PreviousSound => "previous_sound",
            ControlAction::ToggleMute => "toggle_mute",
            ControlAction::NextSong => "next_song",
            ControlAction::PreviousSong => "previous_song",
            ControlAction::NextSection => "next_section",
            ControlAction::PreviousSection => "previous_section",
            ControlAction::PlayPause => "play_pause",
            ControlAction::TogglePlayFrom => "toggle_play_from",
            ControlAction::LoopStartToSection => "loop_start_to_section",
            ControlAction::LoopEndToSection => "loop_end_to_section",
            ControlAction::Quit => "quit",
        }
    }
}

impl fmt::Display for ControlAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown action '{0}'")]
pub struct UnknownAction(pub String);

impl FromStr for ControlAction {
    type Err = UnknownAction;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase().replace(['-', ' '], "_");
        ControlAction::ALL
            .into_iter()
            .find(|action| action.name() == wanted)
            .ok_or_else(|| UnknownAction(s.to_string()))
    }
}
