// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! MIDI input from the foot controller.
//!
//! Ports are opened through `midir`. Raw frames are forwarded from the
//! driver callback into an unbounded channel so they reach the engine in
//! arrival order; decoding happens on the receiving side.

use anyhow::{anyhow, Result};
use midir::{Ignore, MidiInput as MidirInput, MidiInputConnection, MidiInputPort};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info};

const CLIENT_NAME: &str = "liveset";

/// An open MIDI input port. Frames stop flowing when this is dropped.
pub struct MidiInput {
    _connection: MidiInputConnection<()>,
    port_name: String,
}

impl MidiInput {
    /// Open the first port whose name contains `device` (case-insensitive)
    /// and forward every raw frame to `frames`.
    pub fn open(device: &str, frames: UnboundedSender<Vec<u8>>) -> Result<Self> {
        let mut midi_in = MidirInput::new(CLIENT_NAME)
            .map_err(|e| anyhow!("Failed to create MIDI client: {}", e))?;
        // Transport and clock messages are part of the decoded stream
        midi_in.ignore(Ignore::None);

        let (port, port_name) = find_port(&midi_in, device)
            .ok_or_else(|| anyhow!("No MIDI input matching '{}'", device))?;

        let connection = midi_in
            .connect(
                &port,
                "liveset-input",
                move |_timestamp, frame, _| {
                    // Receiver gone means the engine is shutting down
                    let _ = frames.send(frame.to_vec());
                },
                (),
            )
            .map_err(|e| anyhow!("Failed to connect to '{}': {}", port_name, e))?;

        info!(port = %port_name, "MIDI input connected");
        Ok(Self {
            _connection: connection,
            port_name,
        })
    }

    pub fn port_name(&self) -> &str {
        &self.port_name
    }
}

/// First port whose name contains `device`, ignoring case
pub fn find_port(midi_in: &MidirInput, device: &str) -> Option<(MidiInputPort, String)> {
    let wanted = device.to_lowercase();
    midi_in.ports().into_iter().find_map(|port| {
        let name = midi_in.port_name(&port).ok()?;
        debug!(port = %name, "found MIDI input");
        name.to_lowercase()
            .contains(&wanted)
            .then_some((port, name))
    })
}

/// List all available MIDI sources
pub fn list_sources() -> Vec<(usize, String)> {
    let Ok(midi_in) = MidirInput::new(CLIENT_NAME) else {
        return Vec::new();
    };

    midi_in
        .ports()
        .iter()
        .enumerate()
        .map(|(i, port)| {
            let name = midi_in
                .port_name(port)
                .unwrap_or_else(|_| format!("Unknown {}", i));
            (i, name)
        })
        .collect()
}

/// Print all available MIDI sources to stdout
pub fn print_sources() {
    let sources = list_sources();
    if sources.is_empty() {
        println!("No MIDI sources found.");
    } else {
        println!("Available MIDI sources (inputs):");
        for (i, name) in sources {
            println!("  {}: {}", i, name);
        }
    }
}
