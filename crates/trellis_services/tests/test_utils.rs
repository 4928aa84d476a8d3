//! Shared helpers for `trellis_services` integration tests.
//!
//! Import via `mod test_utils;` in test files.

#![allow(
    dead_code,
    missing_docs,
    reason = "shared test utilities, not all items used in every test binary"
)]

use std::sync::{Arc, Mutex};

use trellis_core::NodeKind;
use trellis_core::clock::ManualClock;
use trellis_core::config::CanvasConfig;
use trellis_core::connection::ConnectionDraft;
use trellis_core::node::NodeDraft;
use trellis_events::{EventBus, WILDCARD};
use trellis_services::prelude::*;

/// Ordered log of event names seen on a bus.
#[derive(Debug, Clone, Default)]
pub struct Recorder {
    names: Arc<Mutex<Vec<String>>>,
}

impl Recorder {
    /// Records every event emitted on `bus`.
    pub fn attach(bus: &EventBus) -> Self {
        let recorder = Self::default();
        let sink = recorder.clone();
        bus.on(WILDCARD, move |event| {
            sink.names
                .lock()
                .expect("recorder lock poisoned")
                .push(event.name().as_str().to_owned());
        });
        recorder
    }

    pub fn names(&self) -> Vec<String> {
        self.names.lock().expect("recorder lock poisoned").clone()
    }

    pub fn count(&self, name: &str) -> usize {
        self.names().iter().filter(|n| n.as_str() == name).count()
    }

    pub fn clear(&self) {
        self.names.lock().expect("recorder lock poisoned").clear();
    }
}

/// An initialized canvas on a manual clock with in-memory storage.
pub struct Harness {
    pub canvas: Canvas,
    pub clock: ManualClock,
    pub storage: Arc<MemoryStorage>,
    pub events: Recorder,
}

/// Builds a canvas without initializing it.
pub fn uninitialized(config: CanvasConfig) -> Harness {
    let clock = ManualClock::new(1_000);
    let storage = Arc::new(MemoryStorage::new());
    let canvas = Canvas::builder()
        .config(config)
        .clock(clock.shared())
        .storage(Arc::clone(&storage) as Arc<dyn CanvasStorage>)
        .build();
    let events = Recorder::attach(canvas.bus());
    Harness {
        canvas,
        clock,
        storage,
        events,
    }
}

pub async fn harness_with(config: CanvasConfig) -> Harness {
    let harness = uninitialized(config);
    assert!(harness.canvas.initialize().await.success, "canvas should initialize");
    harness.events.clear();
    harness
}

pub async fn harness() -> Harness {
    harness_with(CanvasConfig::default()).await
}

pub fn start(id: &str) -> NodeDraft {
    NodeDraft::new(NodeKind::Start).with_id(id)
}

pub fn sms(id: &str, x: f64, y: f64) -> NodeDraft {
    NodeDraft::new(NodeKind::Sms).with_id(id).at(x, y)
}

pub fn link(id: &str, source: &str, target: &str) -> ConnectionDraft {
    ConnectionDraft::new(source, target).with_id(id)
}

/// Creates `a -> b -> c` laid out vertically.
pub async fn chain(canvas: &Canvas) {
    for (i, id) in ["a", "b", "c"].into_iter().enumerate() {
        let created = canvas.create_node(sms(id, 0.0, i as f64 * 150.0)).await;
        assert!(created.success, "node {id} should be created: {:?}", created.error);
    }
    for (id, source, target) in [("ab", "a", "b"), ("bc", "b", "c")] {
        let created = canvas.create_connection(link(id, source, target)).await;
        assert!(created.success, "{source} -> {target}: {:?}", created.error);
    }
}

pub async fn node_count(canvas: &Canvas) -> usize {
    canvas.get_all_nodes().await.data.map_or(0, |nodes| nodes.len())
}

pub async fn connection_count(canvas: &Canvas) -> usize {
    canvas
        .get_all_connections()
        .await
        .data
        .map_or(0, |connections| connections.len())
}
