// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Keyboard shortcut handling.
//!
//! The loop-bound controls have no button on the foot controller, so they
//! live on the keyboard together with keyboard equivalents of the foot
//! controls. Keys are read in raw mode on a blocking task.

use std::collections::HashMap;
use std::time::Duration;

use anyhow::{anyhow, bail, Result};
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers, MediaKeyCode};
use crossterm::terminal;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::ControlAction;

/// A keyboard shortcut definition
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Shortcut {
    /// Key code
    pub code: KeyCode,
    /// Required modifiers
    pub modifiers: KeyModifiers,
}

impl Shortcut {
    /// Create a new shortcut.
    ///
    /// Shift is folded into character keys, since terminals report
    /// shifted characters already shifted.
    pub fn new(code: KeyCode, modifiers: KeyModifiers) -> Self {
        match code {
            KeyCode::Char(c) if modifiers.contains(KeyModifiers::SHIFT) => Self {
                code: KeyCode::Char(c.to_ascii_uppercase()),
                modifiers: modifiers.difference(KeyModifiers::SHIFT),
            },
            _ => Self { code, modifiers },
        }
    }

    /// Create a shortcut with no modifiers
    pub fn key(code: KeyCode) -> Self {
        Self::new(code, KeyModifiers::NONE)
    }

    /// Create a shortcut with Ctrl modifier
    pub fn ctrl(code: KeyCode) -> Self {
        Self::new(code, KeyModifiers::CONTROL)
    }

    /// Create a shortcut with Shift modifier
    pub fn shift(code: KeyCode) -> Self {
        Self::new(code, KeyModifiers::SHIFT)
    }

    /// Parse a key description such as `l`, `shift+l`, `ctrl+c`, `space`
    /// or `media_play_pause`
    pub fn parse(description: &str) -> Result<Self> {
        let mut modifiers = KeyModifiers::NONE;
        let mut parts: Vec<&str> = description.split('+').map(str::trim).collect();
        // A literal '+' key
        if description.ends_with("++") || description == "+" {
            parts.retain(|p| !p.is_empty());
            parts.push("+");
        }
        let key = parts
            .pop()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| anyhow!("empty key description '{}'", description))?;

        for modifier in parts {
            match modifier.to_lowercase().as_str() {
                "ctrl" | "control" => modifiers |= KeyModifiers::CONTROL,
                "shift" => modifiers |= KeyModifiers::SHIFT,
                "alt" | "option" => modifiers |= KeyModifiers::ALT,
                other => bail!("unknown modifier '{}' in '{}'", other, description),
            }
        }

        let mut chars = key.chars();
        let code = match (chars.next(), chars.next()) {
            (Some(c), None) => KeyCode::Char(c),
            _ => match key.to_lowercase().as_str() {
                "space" => KeyCode::Char(' '),
                "enter" | "return" => KeyCode::Enter,
                "esc" | "escape" => KeyCode::Esc,
                "tab" => KeyCode::Tab,
                "backspace" => KeyCode::Backspace,
                "left" => KeyCode::Left,
                "right" => KeyCode::Right,
                "up" => KeyCode::Up,
                "down" => KeyCode::Down,
                "home" => KeyCode::Home,
                "end" => KeyCode::End,
                "pageup" => KeyCode::PageUp,
                "pagedown" => KeyCode::PageDown,
                "media_play_pause" => KeyCode::Media(MediaKeyCode::PlayPause),
                "media_next" | "media_next_track" => KeyCode::Media(MediaKeyCode::TrackNext),
                "media_previous" | "media_previous_track" => {
                    KeyCode::Media(MediaKeyCode::TrackPrevious)
                }
                other => match other.strip_prefix('f').and_then(|n| n.parse::<u8>().ok()) {
                    Some(n) if (1..=24).contains(&n) => KeyCode::F(n),
                    _ => bail!("unknown key '{}'", key),
                },
            },
        };

        Ok(Self::new(code, modifiers))
    }

    /// Check if this shortcut matches a key event
    pub fn matches(&self, code: KeyCode, modifiers: KeyModifiers) -> bool {
        *self == Self::new(code, modifiers)
    }
}

/// A keyboard binding (shortcut to action)
#[derive(Debug, Clone)]
pub struct KeyBinding {
    /// The shortcut
    pub shortcut: Shortcut,
    /// The action to perform
    pub action: ControlAction,
    /// Description for help display
    pub description: String,
    /// Category for grouping in help
    pub category: String,
}

impl KeyBinding {
    /// Create a new key binding
    pub fn new(shortcut: Shortcut, action: ControlAction, description: impl Into<String>) -> Self {
        Self {
            shortcut,
            action,
            description: description.into(),
            category: "General".to_string(),
        }
    }

    /// Set the category
    pub fn category(mut self, cat: impl Into<String>) -> Self {
        self.category = cat.into();
        self
    }
}

/// Keyboard controller with configurable bindings
#[derive(Debug, Clone)]
pub struct KeyboardController {
    bindings: HashMap<Shortcut, KeyBinding>,
}

impl KeyboardController {
    /// Create an empty keyboard controller
    pub fn new() -> Self {
        Self {
            bindings: HashMap::new(),
        }
    }

    /// Create a keyboard controller with default bindings
    pub fn with_defaults() -> Self {
        let mut controller = Self::new();
        controller.add_default_bindings();
        controller
    }

    /// Default bindings plus overrides from the controls file.
    ///
    /// Invalid entries are reported and skipped.
    pub fn from_config(overrides: &HashMap<String, String>) -> Self {
        let mut controller = Self::with_defaults();
        for (key, action) in overrides {
            if let Err(e) = controller.bind(key, action) {
                warn!(key = %key, action = %action, "ignoring keyboard binding: {:#}", e);
            }
        }
        controller
    }

    fn add_default_bindings(&mut self) {
        // Transport
        self.add(KeyBinding::new(
            Shortcut::key(KeyCode::Char(' ')),
            ControlAction::PlayPause,
            "Play/Stop",
        ).category("Transport"));

        self.add(KeyBinding::new(
            Shortcut::key(KeyCode::Media(MediaKeyCode::PlayPause)),
            ControlAction::PlayPause,
            "Play/Stop",
        ).category("Transport"));

        self.add(KeyBinding::new(
            Shortcut::key(KeyCode::Char('m')),
            ControlAction::TogglePlayFrom,
            "Play From Song/Section",
        ).category("Transport"));

        // Loop
        self.add(KeyBinding::new(
            Shortcut::key(KeyCode::Char('[')),
            ControlAction::LoopStartToSection,
            "Loop Start To Section",
        ).category("Loop"));

        self.add(KeyBinding::new(
            Shortcut::key(KeyCode::Char(']')),
            ControlAction::LoopEndToSection,
            "Loop End To Section",
        ).category("Loop"));

        // Navigation
        self.add(KeyBinding::new(
            Shortcut::key(KeyCode::Media(MediaKeyCode::TrackNext)),
            ControlAction::NextSong,
            "Next Song",
        ).category("Navigation"));

        self.add(KeyBinding::new(
            Shortcut::key(KeyCode::Media(MediaKeyCode::TrackPrevious)),
            ControlAction::PreviousSong,
            "Previous Song",
        ).category("Navigation"));

        self.add(KeyBinding::new(
            Shortcut::key(KeyCode::Char('.')),
            ControlAction::NextSection,
            "Next Section",
        ).category("Navigation"));

        self.add(KeyBinding::new(
            Shortcut::key(KeyCode::Char(',')),
            ControlAction::PreviousSection,
            "Previous Section",
        ).category("Navigation"));

        // Sounds
        self.add(KeyBinding::new(
            Shortcut::key(KeyCode::Char('n')),
            ControlAction::NextSound,
            "Next Sound",
        ).category("Sounds"));

        self.add(KeyBinding::new(
            Shortcut::key(KeyCode::Char('p')),
            ControlAction::PreviousSound,
            "Previous Sound",
        ).category("Sounds"));

        self.add(KeyBinding::new(
            Shortcut::key(KeyCode::Char('u')),
            ControlAction::ToggleMute,
            "Mute/Unmute Sound",
        ).category("Sounds"));

        // App
        self.add(KeyBinding::new(
            Shortcut::key(KeyCode::Char('q')),
            ControlAction::Quit,
            "Quit",
        ).category("App"));

        self.add(KeyBinding::new(
            Shortcut::ctrl(KeyCode::Char('c')),
            ControlAction::Quit,
            "Quit",
        ).category("App"));
    }

    /// Add a key binding
    pub fn add(&mut self, binding: KeyBinding) {
        self.bindings.insert(binding.shortcut.clone(), binding);
    }

    /// Bind a key description to an action name
    pub fn bind(&mut self, key: &str, action: &str) -> Result<()> {
        let shortcut = Shortcut::parse(key)?;
        let action: ControlAction = action.parse()?;
        debug!(key, %action, "keyboard binding");
        self.add(KeyBinding::new(shortcut, action, action.name()).category("Custom"));
        Ok(())
    }

    /// Remove a key binding
    pub fn remove(&mut self, shortcut: &Shortcut) -> Option<KeyBinding> {
        self.bindings.remove(shortcut)
    }

    /// Get action for a key event
    pub fn get_action(&self, code: KeyCode, modifiers: KeyModifiers) -> Option<ControlAction> {
        let shortcut = Shortcut::new(code, modifiers);
        self.bindings.get(&shortcut).map(|b| b.action)
    }

    /// Process a key event and return the action
    pub fn process_key(&self, key: &KeyEvent) -> Option<ControlAction> {
        if key.kind != KeyEventKind::Press {
            return None;
        }
        self.get_action(key.code, key.modifiers)
    }

    /// Get all bindings for help display
    pub fn bindings(&self) -> impl Iterator<Item = &KeyBinding> {
        self.bindings.values()
    }

    /// Get bindings grouped by category
    pub fn bindings_by_category(&self) -> HashMap<String, Vec<&KeyBinding>> {
        let mut grouped: HashMap<String, Vec<&KeyBinding>> = HashMap::new();

        for binding in self.bindings.values() {
            grouped
                .entry(binding.category.clone())
                .or_default()
                .push(binding);
        }

        grouped
    }
}

impl Default for KeyboardController {
    fn default() -> Self {
        Self::with_defaults()
    }
}

/// Format a shortcut for display
pub fn format_shortcut(shortcut: &Shortcut) -> String {
    let mut parts = Vec::new();

    if shortcut.modifiers.contains(KeyModifiers::CONTROL) {
        parts.push("Ctrl".to_string());
    }
    if shortcut.modifiers.contains(KeyModifiers::ALT) {
        parts.push("Alt".to_string());
    }

    let key = match shortcut.code {
        KeyCode::Char(' ') => "Space".to_string(),
        KeyCode::Char(c) if c.is_ascii_uppercase() => format!("Shift+{}", c),
        KeyCode::Char(c) => c.to_uppercase().to_string(),
        KeyCode::F(n) => format!("F{}", n),
        KeyCode::Up => "↑".to_string(),
        KeyCode::Down => "↓".to_string(),
        KeyCode::Left => "←".to_string(),
        KeyCode::Right => "→".to_string(),
        KeyCode::Enter => "Enter".to_string(),
        KeyCode::Esc => "Esc".to_string(),
        KeyCode::Tab => "Tab".to_string(),
        KeyCode::Media(MediaKeyCode::PlayPause) => "Media Play/Pause".to_string(),
        KeyCode::Media(MediaKeyCode::TrackNext) => "Media Next".to_string(),
        KeyCode::Media(MediaKeyCode::TrackPrevious) => "Media Previous".to_string(),
        _ => "?".to_string(),
    };

    parts.push(key);
    parts.join("+")
}

/// Reads key presses in raw mode and forwards them to the engine.
///
/// Raw mode is left again when the reader is dropped.
pub struct KeyReader {
    handle: JoinHandle<()>,
}

impl KeyReader {
    pub fn spawn(keys: UnboundedSender<KeyEvent>) -> Result<Self> {
        terminal::enable_raw_mode()?;

        let handle = tokio::task::spawn_blocking(move || {
            while !keys.is_closed() {
                match event::poll(Duration::from_millis(100)) {
                    Ok(false) => continue,
                    Ok(true) => {}
                    Err(e) => {
                        warn!("keyboard poll failed: {}", e);
                        break;
                    }
                }
                match event::read() {
                    Ok(Event::Key(key)) if key.kind == KeyEventKind::Press => {
                        if keys.send(key).is_err() {
                            break;
                        }
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!("keyboard read failed: {}", e);
                        break;
                    }
                }
            }
        });

        Ok(Self { handle })
    }
}

impl Drop for KeyReader {
    fn drop(&mut self) {
        self.handle.abort();
        if let Err(e) = terminal::disable_raw_mode() {
            warn!("failed to leave raw mode: {}", e);
        }
    }
}
