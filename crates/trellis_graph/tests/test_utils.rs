//! Shared helpers for `trellis_graph` integration tests.
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
use trellis_graph::GraphStore;
use trellis_validation::ValidationEngine;

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

/// A store on a manual clock so snapshot timestamps are deterministic.
pub fn store_with(config: CanvasConfig) -> Arc<GraphStore> {
    let clock = ManualClock::new(1_000).shared();
    let bus = EventBus::with_config(&config.events, Arc::clone(&clock));
    let validator = Arc::new(ValidationEngine::new(&config));
    Arc::new(GraphStore::with_parts(config, bus, validator, clock))
}

pub fn store() -> Arc<GraphStore> {
    store_with(CanvasConfig::default())
}

pub fn sms(id: &str, x: f64, y: f64) -> NodeDraft {
    NodeDraft::new(NodeKind::Sms).with_id(id).at(x, y)
}

pub fn link(id: &str, source: &str, target: &str) -> ConnectionDraft {
    ConnectionDraft::new(source, target).with_id(id)
}

/// Creates `a -> b -> c` laid out vertically.
pub async fn chain(store: &GraphStore) {
    for (i, id) in ["a", "b", "c"].into_iter().enumerate() {
        store
            .create_node(sms(id, 0.0, i as f64 * 150.0))
            .await
            .expect("node should be created");
    }
    store.create_connection(link("ab", "a", "b")).await.expect("a -> b");
    store.create_connection(link("bc", "b", "c")).await.expect("b -> c");
}
