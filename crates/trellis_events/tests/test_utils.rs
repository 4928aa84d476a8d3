//! Shared helpers for `trellis_events` integration tests.
//!
//! Import via `mod test_utils;` in test files.

#![allow(
    dead_code,
    missing_docs,
    reason = "shared test utilities, not all items used in every test binary"
)]

use std::sync::{Arc, Mutex};

use trellis_events::{CanvasEvent, CanvasEventType, EventBus, EventPayload};

/// Ordered log of labels written by handlers.
#[derive(Debug, Clone, Default)]
pub struct Recorder {
    entries: Arc<Mutex<Vec<String>>>,
}

impl Recorder {
    pub fn push(&self, entry: impl Into<String>) {
        self.entries
            .lock()
            .expect("recorder lock poisoned")
            .push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.entries.lock().expect("recorder lock poisoned").clone()
    }

    /// Subscribes a handler on `bus` that logs `label` and the event name.
    pub fn listen(&self, bus: &EventBus, event_type: &str, label: &'static str) {
        let recorder = self.clone();
        bus.on(event_type, move |event| {
            recorder.push(format!("{label}:{}", event.name()));
        });
    }
}

pub fn node_created() -> CanvasEvent {
    CanvasEvent::new(CanvasEventType::NodeCreated, EventPayload::Empty)
}
