// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

use std::env;
use std::io::{self, Write};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use tokio::sync::mpsc::unbounded_channel;
use tokio::time::Instant;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use liveset::config::{is_config_file, validate_config, ConfigWatcher, ControlsFile};
use liveset::control::{format_shortcut, Control, KeyReader, KeyboardController};
use liveset::engine::{mapping, Engine, EngineInputs};
use liveset::midi::{list_sources, print_sources, MidiInput, MidiMessage};
use liveset::session::MemorySession;

/// Playhead update interval of the rehearsal transport
const TRANSPORT_TICK: Duration = Duration::from_millis(100);
const CONFIG_DEBOUNCE: Duration = Duration::from_millis(250);
const MONITOR_DURATION: Duration = Duration::from_secs(30);

fn print_usage() {
    println!("liveset - Foot-controller live set control");
    println!();
    println!("Usage: liveset [OPTIONS]");
    println!();
    println!("Options:");
    println!("  --list-sources                  List available MIDI sources (inputs)");
    println!("  --monitor <PORT>                Print decoded MIDI from a source (index or name) for 30s");
    println!("  --check <CONTROLS>              Validate a controls file");
    println!("  --run <CONTROLS> --session <SESSION> [--no-keyboard]");
    println!("                                  Run against a session file");
    println!("  --help                          Show this help message");
}

/// Stderr writer that survives raw mode, where a bare newline does not
/// return the cursor.
struct CrlfWriter(io::Stderr);

impl Write for CrlfWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let text = String::from_utf8_lossy(buf);
        self.0.write_all(text.replace('\n', "\r\n").as_bytes())?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.0.flush()
    }
}

fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(|| CrlfWriter(io::stderr()))
        .with_target(false)
        .init();
}

/// Resolve a port argument to a name: an index from `--list-sources` or
/// a name fragment.
fn port_name(port: &str) -> Result<String> {
    match port.parse::<usize>() {
        Ok(index) => list_sources()
            .into_iter()
            .find(|(i, _)| *i == index)
            .map(|(_, name)| name)
            .ok_or_else(|| anyhow!("No MIDI source with index {}", index)),
        Err(_) => Ok(port.to_string()),
    }
}

async fn monitor_input(port: &str) -> Result<()> {
    let device = port_name(port)?;
    let (tx, mut frames) = unbounded_channel();
    let input = MidiInput::open(&device, tx)?;

    println!("Monitoring '{}' for {}s (press Ctrl+C to stop)...", input.port_name(), MONITOR_DURATION.as_secs());
    println!();

    let deadline = Instant::now() + MONITOR_DURATION;
    while let Ok(Some(frame)) = tokio::time::timeout_at(deadline, frames.recv()).await {
        match MidiMessage::decode(&frame) {
            Some(message) => println!("{:02X?}  {:?}", frame, message),
            None => println!("{:02X?}  (empty)", frame),
        }
    }

    println!();
    println!("Monitor complete!");
    Ok(())
}

fn check_controls(path: &str) -> Result<()> {
    if !is_config_file(Path::new(path)) {
        println!("Warning: {} is not a .yaml, .yml or .toml file, reading it as YAML", path);
    }
    let config = validate_config(path)?;

    println!("{} is valid", path);
    println!();
    println!("MIDI device: {}", config.midi.device.as_deref().unwrap_or("(none)"));
    println!("Gesture window: {}ms", config.gesture.window_ms);
    println!();
    println!("Foot controls:");
    for control in Control::ALL {
        match mapping(&config.mappings, control) {
            Some(filter) => println!(
                "  {:?}: channel {}, note {}, {:?}",
                control,
                filter.channel.map_or("any".to_string(), |c| c.to_string()),
                filter.note.map_or("any".to_string(), |n| n.to_string()),
                filter.kind
            ),
            None => println!("  {:?}: not mapped", control),
        }
    }
    println!();
    println!("Keyboard:");
    let keyboard = KeyboardController::from_config(&config.keyboard);
    let mut categories: Vec<_> = keyboard.bindings_by_category().into_iter().collect();
    categories.sort_by(|a, b| a.0.cmp(&b.0));
    for (category, mut bindings) in categories {
        println!("  {}", category);
        bindings.sort_by_key(|b| b.action.name());
        for binding in bindings {
            println!("    {:<14} {}", format_shortcut(&binding.shortcut), binding.description);
        }
    }
    Ok(())
}

async fn run(controls_path: &str, session_path: &str, keyboard: bool) -> Result<()> {
    let config = ControlsFile::load(controls_path)?;
    let session = Arc::new(
        MemorySession::load(session_path)
            .with_context(|| format!("Failed to load session {}", session_path))?,
    );
    let transport = session.spawn_transport(TRANSPORT_TICK);

    let engine = Engine::start(session, &config).await?;
    let mut inputs = EngineInputs::default();

    let _midi = match &config.midi.device {
        Some(device) => {
            let (tx, rx) = unbounded_channel();
            match MidiInput::open(device, tx) {
                Ok(input) => {
                    inputs.midi = Some(rx);
                    Some(input)
                }
                Err(e) => {
                    warn!("{:#}; continuing without MIDI input", e);
                    None
                }
            }
        }
        None => {
            warn!("no MIDI device configured, foot controls disabled");
            None
        }
    };

    let (config_tx, config_rx) = unbounded_channel();
    let _watcher = ConfigWatcher::spawn(controls_path, CONFIG_DEBOUNCE, config_tx)?;
    inputs.config = Some(config_rx);

    let _keys = if keyboard {
        let (tx, rx) = unbounded_channel();
        let reader = KeyReader::spawn(tx).context("Failed to enable raw keyboard input")?;
        inputs.keys = Some(rx);
        info!("keyboard shortcuts active, press q to quit");
        Some(reader)
    } else {
        None
    };

    tokio::select! {
        result = engine.run(inputs) => result?,
        _ = tokio::signal::ctrl_c() => info!("interrupted"),
    }
    transport.abort();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        println!("liveset - Foot-controller live set control");
        println!("Run with --help for usage information");
        return Ok(());
    }

    init_logging();

    match args[1].as_str() {
        "--list-sources" => {
            print_sources();
        }
        "--monitor" => {
            if args.len() < 3 {
                eprintln!("Error: --monitor requires a source number or name");
                eprintln!("Use --list-sources to see available sources");
                std::process::exit(1);
            }
            monitor_input(&args[2]).await?;
        }
        "--check" => {
            if args.len() < 3 {
                eprintln!("Error: --check requires a controls file");
                std::process::exit(1);
            }
            check_controls(&args[2])?;
        }
        "--run" => {
            if args.len() < 3 {
                eprintln!("Error: --run requires a controls file");
                std::process::exit(1);
            }
            let rest = &args[3..];
            let session = rest
                .iter()
                .position(|a| a == "--session")
                .and_then(|i| rest.get(i + 1));
            let Some(session) = session else {
                eprintln!("Error: --run requires --session <SESSION>");
                std::process::exit(1);
            };
            let keyboard = !rest.iter().any(|a| a == "--no-keyboard");
            run(&args[2], session, keyboard).await?;
        }
        "--help" | "-h" => {
            print_usage();
        }
        _ => {
            eprintln!("Unknown option: {}", args[1]);
            print_usage();
            std::process::exit(1);
        }
    }

    Ok(())
}
