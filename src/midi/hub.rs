// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Publish/subscribe hub for decoded MIDI messages.
//!
//! One producer (the controller input) publishes; any number of
//! subscribers receive every message matching their selector. Callbacks
//! run synchronously in registration order and nothing is buffered.

use tracing::{debug, warn};

use super::{MidiFilter, MidiMessage};

/// Message class a subscriber can select on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageClass {
    NoteOn,
    NoteOff,
    ControlChange,
    TransportClock,
    Unknown,
}

/// Handle returned by subscribe, used to unsubscribe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

type Callback = Box<dyn Fn(&MidiMessage) + Send + Sync>;

enum Selector {
    All,
    Class(MessageClass),
    Filter(MidiFilter),
}

impl Selector {
    fn accepts(&self, message: &MidiMessage) -> bool {
        match self {
            Selector::All => true,
            Selector::Class(class) => message.class() == *class,
            Selector::Filter(filter) => filter.matches(message),
        }
    }
}

struct Subscription {
    id: SubscriptionId,
    selector: Selector,
    callback: Callback,
}

/// Broadcast registry of MIDI subscribers
#[derive(Default)]
pub struct MidiHub {
    subscriptions: Vec<Subscription>,
    next_id: u64,
}

impl MidiHub {
    pub fn new() -> Self {
        Self::default()
    }

    fn register(&mut self, selector: Selector, callback: Callback) -> SubscriptionId {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        self.subscriptions.push(Subscription {
            id,
            selector,
            callback,
        });
        id
    }

    /// Receive every message
    pub fn subscribe_all<F>(&mut self, callback: F) -> SubscriptionId
    where
        F: Fn(&MidiMessage) + Send + Sync + 'static,
    {
        self.register(Selector::All, Box::new(callback))
    }

    /// Receive every message of one class
    pub fn subscribe<F>(&mut self, class: MessageClass, callback: F) -> SubscriptionId
    where
        F: Fn(&MidiMessage) + Send + Sync + 'static,
    {
        self.register(Selector::Class(class), Box::new(callback))
    }

    /// Receive note messages matching a button filter
    pub fn subscribe_notes<F>(&mut self, filter: MidiFilter, callback: F) -> SubscriptionId
    where
        F: Fn(&MidiMessage) + Send + Sync + 'static,
    {
        self.register(Selector::Filter(filter), Box::new(callback))
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) {
        let before = self.subscriptions.len();
        self.subscriptions.retain(|s| s.id != id);
        if self.subscriptions.len() == before {
            warn!(?id, "unsubscribe for unknown subscription");
        }
    }

    pub fn clear(&mut self) {
        self.subscriptions.clear();
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscriptions.len()
    }

    /// Deliver a decoded message to every matching subscriber
    pub fn publish(&self, message: &MidiMessage) {
        for subscription in &self.subscriptions {
            if subscription.selector.accepts(message) {
                (subscription.callback)(message);
            }
        }
    }

    /// Decode a raw frame and publish it
    pub fn publish_frame(&self, frame: &[u8]) -> Option<MidiMessage> {
        let message = MidiMessage::decode(frame)?;
        debug!(?message, "midi in");
        self.publish(&message);
        Some(message)
    }
}
