// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Event loop of the live controls.
//!
//! Every input (backend notifications, MIDI frames, key presses, closed
//! tap gestures, config reloads) arrives on its own channel. The engine
//! drains them one event at a time, so derivations and tree rebuilds
//! never interleave and each channel stays FIFO.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result};
use crossterm::event::KeyEvent;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tracing::{debug, info, warn};

use crate::config::{ConfigEvent, ControlMappings, ControlsFile};
use crate::control::{Control, ControlAction, KeyboardController};
use crate::dispatch::Dispatcher;
use crate::gesture::{GestureRecognizer, TapEvent};
use crate::midi::{MidiFilter, MidiHub, MidiMessage};
use crate::session::{connect_with_retry, BackendEvent, SessionBackend};

/// Optional input channels feeding the engine
#[derive(Default)]
pub struct EngineInputs {
    /// Raw MIDI frames from the controller
    pub midi: Option<UnboundedReceiver<Vec<u8>>>,
    pub keys: Option<UnboundedReceiver<KeyEvent>>,
    pub config: Option<UnboundedReceiver<ConfigEvent>>,
}

/// Filter bound to a control, if any
pub fn mapping(mappings: &ControlMappings, control: Control) -> Option<&MidiFilter> {
    match control {
        Control::TrackSwitch => mappings.track_switch.as_ref(),
        Control::SongSwitch => mappings.song_switch.as_ref(),
        Control::SectionSwitch => mappings.section_switch.as_ref(),
        Control::PlayPause => mappings.play_pause.as_ref(),
    }
}

/// Recognizers of one control, one per physical button.
///
/// A filter without a channel or note matches several buttons; each
/// (channel, note) pair gets its own recognizer so their taps never
/// merge into one gesture.
struct ControlButtons {
    control: Control,
    window: Duration,
    taps: UnboundedSender<TapEvent<Control>>,
    buttons: Mutex<HashMap<(u8, u8), Arc<GestureRecognizer<Control>>>>,
}

impl ControlButtons {
    fn new(control: Control, window: Duration, taps: UnboundedSender<TapEvent<Control>>) -> Self {
        Self {
            control,
            window,
            taps,
            buttons: Mutex::new(HashMap::new()),
        }
    }

    fn press(&self, message: &MidiMessage) {
        let Some(note) = message.note() else {
            return;
        };
        let recognizer = {
            let Ok(mut buttons) = self.buttons.lock() else {
                return;
            };
            buttons
                .entry((message.channel(), note))
                .or_insert_with(|| Arc::new(GestureRecognizer::new(self.control, self.window, self.taps.clone())))
                .clone()
        };
        recognizer.press();
    }
}

pub struct Engine<B> {
    dispatcher: Dispatcher<B>,
    hub: MidiHub,
    keyboard: KeyboardController,
    controls: Vec<Arc<ControlButtons>>,
    taps_tx: UnboundedSender<TapEvent<Control>>,
    taps_rx: UnboundedReceiver<TapEvent<Control>>,
    backend_events: UnboundedReceiver<BackendEvent>,
}

impl<B: SessionBackend> Engine<B> {
    /// Connect to the backend (retrying until it answers), then load the
    /// initial state and bind the controls.
    pub async fn start(backend: Arc<B>, config: &ControlsFile) -> Result<Self> {
        connect_with_retry(backend.as_ref(), config.backend.retry()).await;
        let backend_events = backend.subscribe();

        let mut dispatcher = Dispatcher::new(backend, config);
        dispatcher
            .sync()
            .await
            .context("Failed to load the live set from the session backend")?;

        let (taps_tx, taps_rx) = unbounded_channel();
        let mut engine = Self {
            dispatcher,
            hub: MidiHub::new(),
            keyboard: KeyboardController::from_config(&config.keyboard),
            controls: Vec::new(),
            taps_tx,
            taps_rx,
            backend_events,
        };
        engine.bind_controls(&config.mappings, config.gesture.window());
        Ok(engine)
    }

    pub fn dispatcher(&self) -> &Dispatcher<B> {
        &self.dispatcher
    }

    pub fn keyboard(&self) -> &KeyboardController {
        &self.keyboard
    }

    /// Number of controls bound to a MIDI button
    pub fn bound_controls(&self) -> usize {
        self.controls.len()
    }

    /// Replace all MIDI subscriptions with the mapped controls. Every
    /// button matching a control's filter is recognized on its own.
    /// Pending gestures of the old bindings are dropped.
    pub fn bind_controls(&mut self, mappings: &ControlMappings, window: Duration) {
        self.hub.clear();
        self.controls.clear();

        for control in Control::ALL {
            let Some(filter) = mapping(mappings, control) else {
                debug!(?control, "control not mapped");
                continue;
            };
            let buttons = Arc::new(ControlButtons::new(control, window, self.taps_tx.clone()));
            let pressed = buttons.clone();
            self.hub.subscribe_notes(*filter, move |message| pressed.press(message));
            self.controls.push(buttons);
            info!(?control, channel = ?filter.channel, note = ?filter.note, "control bound");
        }
    }

    fn apply_config(&mut self, event: ConfigEvent) {
        match event {
            ConfigEvent::Reloaded(config) => {
                self.bind_controls(&config.mappings, config.gesture.window());
                self.keyboard = KeyboardController::from_config(&config.keyboard);
                self.dispatcher.apply_config(&config);
                info!("controls reloaded");
            }
            ConfigEvent::Error(e) => warn!("controls file invalid, keeping current controls: {}", e),
        }
    }

    /// Run until a quit action arrives
    pub async fn run(mut self, mut inputs: EngineInputs) -> Result<()> {
        info!("{}", self.dispatcher.status());
        loop {
            tokio::select! {
                Some(event) = self.backend_events.recv() => {
                    self.dispatcher.handle_event(event).await;
                }
                Some(frame) = recv_opt(&mut inputs.midi) => {
                    self.hub.publish_frame(&frame);
                }
                Some(key) = recv_opt(&mut inputs.keys) => {
                    if let Some(action) = self.keyboard.process_key(&key) {
                        if action == ControlAction::Quit {
                            break;
                        }
                        self.dispatcher.perform(action).await;
                    }
                }
                Some(tap) = self.taps_rx.recv() => {
                    let action = tap.key.action(tap.tap);
                    debug!(control = ?tap.key, tap = ?tap.tap, %action, "gesture");
                    self.dispatcher.perform(action).await;
                }
                Some(event) = recv_opt(&mut inputs.config) => {
                    self.apply_config(event);
                }
            }
        }
        info!("shutting down");
        Ok(())
    }
}

/// Receive from an optional channel; a missing channel never yields
async fn recv_opt<T>(rx: &mut Option<UnboundedReceiver<T>>) -> Option<T> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::markers::RawMarker;
    use crate::session::{MemorySession, SessionCommand, SessionFile};
    use crate::tracks::{TrackId, TrackRecord};
    use crossterm::event::{KeyCode, KeyModifiers};

    fn session_file() -> SessionFile {
        SessionFile {
            song_length: 200.0,
            position: 45.0,
            markers: vec![
                RawMarker::new("Intro", 0.0),
                RawMarker::new("#Verse", 0.0),
                RawMarker::new("#Chorus", 40.0),
                RawMarker::new("Bridge", 90.0),
            ],
            tracks: vec![
                TrackRecord::group("1", "Guitar Sounds", None),
                TrackRecord::group("2", "Intro", Some("1")),
                TrackRecord::leaf("3", "Clean", Some("2")).armed(true),
                TrackRecord::leaf("4", "Crunch", Some("2")),
            ],
            ..SessionFile::default()
        }
    }

    fn controls() -> ControlsFile {
        ControlsFile::from_yaml(
            r#"
mappings:
  track_switch: { channel: 1, note: 60 }
  song_switch: { channel: 1, note: 62 }
"#,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_bind_controls_skips_unmapped() {
        let session = Arc::new(MemorySession::new(session_file()));
        let mut engine = Engine::start(session, &controls()).await.unwrap();
        assert_eq!(engine.bound_controls(), 2);

        engine.bind_controls(&ControlMappings::default(), Duration::from_millis(500));
        assert_eq!(engine.bound_controls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_retries_until_connected() {
        let session = Arc::new(MemorySession::new(session_file()));
        session.fail_next_connects(2);
        let started = tokio::time::Instant::now();
        let engine = Engine::start(session, &controls()).await.unwrap();
        assert_eq!(started.elapsed(), Duration::from_secs(2));
        assert_eq!(
            engine.dispatcher().context().current_song().unwrap().name,
            "Intro"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_tap_reaches_backend() {
        let session = Arc::new(MemorySession::new(session_file()));
        let engine = Engine::start(session.clone(), &controls()).await.unwrap();

        let (midi_tx, midi_rx) = unbounded_channel();
        let (key_tx, key_rx) = unbounded_channel();
        let run = tokio::spawn(engine.run(EngineInputs {
            midi: Some(midi_rx),
            keys: Some(key_rx),
            config: None,
        }));

        midi_tx.send(vec![0x90, 60, 100]).unwrap();
        // Wrong note, ignored
        midi_tx.send(vec![0x90, 61, 100]).unwrap();
        tokio::time::sleep(Duration::from_millis(600)).await;

        assert_eq!(
            session.commands(),
            vec![
                SessionCommand::SetArm(TrackId::from("4"), true),
                SessionCommand::SetArm(TrackId::from("3"), false),
            ]
        );

        key_tx
            .send(KeyEvent::new(KeyCode::Char('q'), KeyModifiers::NONE))
            .unwrap();
        run.await.unwrap().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_wildcard_note_keeps_buttons_apart() {
        let session = Arc::new(MemorySession::new(session_file()));
        let config = ControlsFile::from_yaml("mappings:\n  track_switch: { channel: 1 }\n").unwrap();
        let engine = Engine::start(session.clone(), &config).await.unwrap();

        let (midi_tx, midi_rx) = unbounded_channel();
        let (key_tx, key_rx) = unbounded_channel();
        let run = tokio::spawn(engine.run(EngineInputs {
            midi: Some(midi_rx),
            keys: Some(key_rx),
            config: None,
        }));

        // Two buttons inside one window: two single taps, not a double
        midi_tx.send(vec![0x90, 60, 100]).unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        midi_tx.send(vec![0x90, 61, 100]).unwrap();
        tokio::time::sleep(Duration::from_millis(700)).await;

        // The second next-sound stops at the last sound of the song
        assert_eq!(
            session.commands(),
            vec![
                SessionCommand::SetArm(TrackId::from("4"), true),
                SessionCommand::SetArm(TrackId::from("3"), false),
            ]
        );

        key_tx
            .send(KeyEvent::new(KeyCode::Char('q'), KeyModifiers::NONE))
            .unwrap();
        run.await.unwrap().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_config_reload_rebinds() {
        let session = Arc::new(MemorySession::new(session_file()));
        let engine = Engine::start(session.clone(), &controls()).await.unwrap();

        let (midi_tx, midi_rx) = unbounded_channel();
        let (config_tx, config_rx) = unbounded_channel();
        let (key_tx, key_rx) = unbounded_channel();
        let run = tokio::spawn(engine.run(EngineInputs {
            midi: Some(midi_rx),
            keys: Some(key_rx),
            config: Some(config_rx),
        }));

        let reloaded = ControlsFile::from_yaml("mappings:\n  track_switch: { channel: 2, note: 10 }\n").unwrap();
        config_tx.send(ConfigEvent::Reloaded(Box::new(reloaded))).unwrap();
        config_tx.send(ConfigEvent::Error("bad yaml".to_string())).unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;

        // Old binding is gone
        midi_tx.send(vec![0x90, 60, 100]).unwrap();
        tokio::time::sleep(Duration::from_millis(600)).await;
        assert!(session.commands().is_empty());

        midi_tx.send(vec![0x91, 10, 100]).unwrap();
        tokio::time::sleep(Duration::from_millis(600)).await;
        assert_eq!(session.commands().len(), 2);

        key_tx
            .send(KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL))
            .unwrap();
        run.await.unwrap().unwrap();
    }
}
