//! Shared helpers for `trellis_layout` integration tests.
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

pub fn store() -> Arc<GraphStore> {
    let config = CanvasConfig::default();
    let clock = ManualClock::new(0).shared();
    let bus = EventBus::with_config(&config.events, Arc::clone(&clock));
    let validator = Arc::new(ValidationEngine::new(&config));
    Arc::new(GraphStore::with_parts(config, bus, validator, clock))
}

/// `start -> splitA -> {leaf1, leaf2}`, all stacked at the origin.
pub async fn split_flow(store: &GraphStore) {
    let batch = store
        .create_nodes(vec![
            NodeDraft::new(NodeKind::Start).with_id("start"),
            NodeDraft::new(NodeKind::AudienceSplit).with_id("splitA"),
            NodeDraft::new(NodeKind::Sms).with_id("leaf1"),
            NodeDraft::new(NodeKind::Sms).with_id("leaf2"),
        ])
        .await;
    assert!(batch.success, "nodes: {:?}", batch.errors);
    let batch = store
        .create_connections(vec![
            ConnectionDraft::new("start", "splitA"),
            ConnectionDraft::new("splitA", "leaf1"),
            ConnectionDraft::new("splitA", "leaf2"),
        ])
        .await;
    assert!(batch.success, "connections: {:?}", batch.errors);
}

/// Event names seen on a bus, in order.
#[derive(Debug, Clone, Default)]
pub struct Recorder {
    names: Arc<Mutex<Vec<String>>>,
}

impl Recorder {
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
}
