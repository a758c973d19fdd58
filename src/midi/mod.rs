// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! MIDI decoding and distribution.
//!
//! Raw frames from the controller are decoded into [`MidiMessage`]s and
//! broadcast to subscribers through the [`MidiHub`].

pub mod hub;
pub mod input;

pub use hub::{MessageClass, MidiHub, SubscriptionId};
pub use input::{find_port, list_sources, print_sources, MidiInput};

use serde::{Deserialize, Serialize};

/// MIDI status constants (upper nibble; the lower nibble is the channel)
pub mod messages {
    pub const NOTE_OFF: u8 = 0x80;
    pub const NOTE_ON: u8 = 0x90;
    pub const CONTROL_CHANGE: u8 = 0xB0;
    /// System common and real-time messages (transport, clock, sysex)
    pub const SYSTEM: u8 = 0xF0;

    pub const CLASS_MASK: u8 = 0xF0;
    pub const CHANNEL_MASK: u8 = 0x0F;
}

/// Decoded MIDI message. Channels are numbered 1-16.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MidiMessage {
    NoteOn { channel: u8, note: u8, velocity: u8 },
    NoteOff { channel: u8, note: u8, velocity: u8 },
    ControlChange { channel: u8, control: u8, value: u8 },
    /// System message; `status` is the raw status byte
    TransportClock { channel: u8, status: u8 },
    /// Unrecognized class or truncated frame
    Unknown { channel: u8, data: Vec<u8> },
}

impl MidiMessage {
    /// Decode a raw frame (status byte followed by up to two data bytes).
    ///
    /// Never fails on content: unrecognized classes and truncated channel
    /// messages decode to [`MidiMessage::Unknown`]. Returns `None` only for
    /// an empty frame.
    pub fn decode(frame: &[u8]) -> Option<Self> {
        let (&status, data) = frame.split_first()?;
        let class = status & messages::CLASS_MASK;
        let channel = (status & messages::CHANNEL_MASK) + 1;

        let message = match (class, data) {
            (messages::CONTROL_CHANGE, [control, value, ..]) => MidiMessage::ControlChange {
                channel,
                control: *control,
                value: *value,
            },
            (messages::NOTE_ON, [note, velocity, ..]) => MidiMessage::NoteOn {
                channel,
                note: *note,
                velocity: *velocity,
            },
            (messages::NOTE_OFF, [note, velocity, ..]) => MidiMessage::NoteOff {
                channel,
                note: *note,
                velocity: *velocity,
            },
            (messages::SYSTEM, _) => MidiMessage::TransportClock { channel, status },
            _ => MidiMessage::Unknown {
                channel,
                data: frame.to_vec(),
            },
        };
        Some(message)
    }

    pub fn channel(&self) -> u8 {
        match self {
            MidiMessage::NoteOn { channel, .. }
            | MidiMessage::NoteOff { channel, .. }
            | MidiMessage::ControlChange { channel, .. }
            | MidiMessage::TransportClock { channel, .. }
            | MidiMessage::Unknown { channel, .. } => *channel,
        }
    }

    /// Note number for note messages
    pub fn note(&self) -> Option<u8> {
        match self {
            MidiMessage::NoteOn { note, .. } | MidiMessage::NoteOff { note, .. } => Some(*note),
            _ => None,
        }
    }

    pub fn class(&self) -> MessageClass {
        match self {
            MidiMessage::NoteOn { .. } => MessageClass::NoteOn,
            MidiMessage::NoteOff { .. } => MessageClass::NoteOff,
            MidiMessage::ControlChange { .. } => MessageClass::ControlChange,
            MidiMessage::TransportClock { .. } => MessageClass::TransportClock,
            MidiMessage::Unknown { .. } => MessageClass::Unknown,
        }
    }
}

/// Note message type a filter selects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoteKind {
    #[default]
    NoteOn,
    NoteOff,
}

impl NoteKind {
    pub fn class(self) -> MessageClass {
        match self {
            NoteKind::NoteOn => MessageClass::NoteOn,
            NoteKind::NoteOff => MessageClass::NoteOff,
        }
    }
}

/// Binds an action to a physical button.
///
/// Unset fields match anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct MidiFilter {
    #[serde(default)]
    pub channel: Option<u8>,
    #[serde(default)]
    pub note: Option<u8>,
    #[serde(default, rename = "type")]
    pub kind: NoteKind,
}

impl MidiFilter {
    /// Note-on filter for one button
    pub fn note_on(channel: u8, note: u8) -> Self {
        Self {
            channel: Some(channel),
            note: Some(note),
            kind: NoteKind::NoteOn,
        }
    }

    pub fn matches(&self, message: &MidiMessage) -> bool {
        if message.class() != self.kind.class() {
            return false;
        }
        if let Some(channel) = self.channel {
            if channel != message.channel() {
                return false;
            }
        }
        match self.note {
            Some(note) => message.note() == Some(note),
            None => true,
        }
    }
}
