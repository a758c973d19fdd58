// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Foot-controller live set control.
//!
//! Resolves the current song and section from timeline markers, keeps a
//! tree of the session's tracks, and turns MIDI button taps and keyboard
//! shortcuts into arming, navigation and transport commands against a
//! session backend.

pub mod config;
pub mod control;
pub mod dispatch;
pub mod engine;
pub mod gesture;
pub mod markers;
pub mod midi;
pub mod session;
pub mod tracks;
