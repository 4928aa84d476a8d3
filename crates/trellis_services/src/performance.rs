//! Engine-side performance bookkeeping.
//!
//! Marks and measures follow the browser performance timeline: a mark records
//! the clock, a measure is the distance between two marks (or a mark and now).
//! While monitoring, commits and layout runs are counted from the bus.
//! Rendering happens outside the engine, so memory and render figures are
//! estimates derived from the graph and the viewport.

use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::Mutex;
use serde::Serialize;
use thiserror::Error;
use trellis_core::clock::Clock;
use trellis_core::{ErrorCode, codes};
use trellis_events::event::{CommitOrigin, PerformanceEventData};
use trellis_events::{CanvasEvent, CanvasEventType, EventPayload, SubscriptionId};
use trellis_graph::GraphStore;

const SOURCE: &str = "performance";

/// Share of a capacity limit at which [`PerformanceMonitor::check_thresholds`]
/// warns.
pub const CAPACITY_WARNING_RATIO: f64 = 0.9;

/// Why a performance call failed.
#[derive(Debug, Error)]
pub enum PerformanceError {
    /// Marks need a name.
    #[error("mark name must not be empty")]
    EmptyName,
    /// A measure referenced a mark that was never set.
    #[error("mark '{0}' does not exist")]
    UnknownMark(String),
    /// The graph could not be sized.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ErrorCode for PerformanceError {
    fn code(&self) -> &'static str {
        match self {
            PerformanceError::EmptyName | PerformanceError::UnknownMark(_) => codes::INVALID_ARGUMENT,
            PerformanceError::Serialization(_) => codes::SERIALIZATION_ERROR,
        }
    }
}

/// Counters returned by [`PerformanceMonitor::get_metrics`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceMetrics {
    /// Nodes on the canvas.
    pub node_count: usize,
    /// Connections on the canvas.
    pub connection_count: usize,
    /// Events emitted on the bus since the last reset.
    pub events_emitted: u64,
    /// Mutation commits seen while monitoring.
    pub commits: u64,
    /// Layout runs seen while monitoring.
    pub layout_runs: u64,
    /// Duration of the latest layout run.
    pub last_layout_ms: Option<f64>,
    /// Recorded measures by name.
    pub measures: IndexMap<String, f64>,
    /// Whether bus monitoring is on.
    pub monitoring: bool,
    /// Store revision.
    pub revision: u64,
}

/// Estimated engine memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryUsage {
    /// Nodes held.
    pub nodes: usize,
    /// Connections held.
    pub connections: usize,
    /// Size of the graph serialized as JSON.
    pub graph_bytes: usize,
}

/// What a renderer would have to draw for the current viewport.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderEstimate {
    /// Nodes overlapping the visible area.
    pub visible_nodes: usize,
    /// Connections with at least one visible endpoint.
    pub visible_connections: usize,
    /// All nodes.
    pub total_nodes: usize,
    /// Current zoom factor.
    pub zoom: f64,
}

#[derive(Debug, Default)]
struct Counters {
    marks: IndexMap<String, u64>,
    measures: IndexMap<String, f64>,
    commits: u64,
    layout_runs: u64,
    last_layout_ms: Option<f64>,
    events_baseline: u64,
}

/// Marks, measures and counters for one store.
#[derive(Debug)]
pub struct PerformanceMonitor {
    store: Arc<GraphStore>,
    counters: Arc<Mutex<Counters>>,
    subscriptions: Mutex<Vec<SubscriptionId>>,
}

impl PerformanceMonitor {
    /// Creates a monitor. Monitoring starts off.
    #[must_use]
    pub fn new(store: Arc<GraphStore>) -> Self {
        let counters = Counters {
            events_baseline: store.bus().emitted_count(),
            ..Counters::default()
        };
        Self {
            store,
            counters: Arc::new(Mutex::new(counters)),
            subscriptions: Mutex::new(Vec::new()),
        }
    }

    /// Subscribes to commits and layout runs. Idempotent.
    pub fn start_monitoring(&self) {
        let mut subscriptions = self.subscriptions.lock();
        if !subscriptions.is_empty() {
            return;
        }
        let bus = self.store.bus();
        let counters = Arc::clone(&self.counters);
        subscriptions.push(bus.on(CanvasEventType::CanvasStateChanged, move |event| {
            if event
                .as_commit()
                .is_some_and(|commit| commit.origin == CommitOrigin::Mutation)
            {
                counters.lock().commits += 1;
            }
        }));
        let counters = Arc::clone(&self.counters);
        subscriptions.push(bus.on(CanvasEventType::LayoutEnd, move |event| {
            let mut counters = counters.lock();
            counters.layout_runs += 1;
            if let Some(duration) = event.as_layout().and_then(|layout| layout.duration_ms) {
                counters.last_layout_ms = Some(duration);
            }
        }));
        tracing::debug!("performance monitoring started");
    }

    /// Drops the bus subscriptions. Counters are kept.
    pub fn stop_monitoring(&self) {
        let subscriptions: Vec<SubscriptionId> = self.subscriptions.lock().drain(..).collect();
        if subscriptions.is_empty() {
            return;
        }
        for id in &subscriptions {
            self.store.bus().off(id);
        }
        tracing::debug!("performance monitoring stopped");
    }

    /// Whether [`start_monitoring`](Self::start_monitoring) is in effect.
    #[must_use]
    pub fn is_monitoring(&self) -> bool {
        !self.subscriptions.lock().is_empty()
    }

    /// Records the clock under `name`, replacing an earlier mark.
    ///
    /// # Errors
    ///
    /// Returns [`PerformanceError::EmptyName`] for a blank name.
    pub async fn mark(&self, name: &str) -> Result<u64, PerformanceError> {
        if name.trim().is_empty() {
            return Err(PerformanceError::EmptyName);
        }
        let now = self.store.clock().now_millis();
        self.counters.lock().marks.insert(name.to_owned(), now);
        self.emit(CanvasEventType::PerformanceMark, name, Some(now as f64), "epoch-ms")
            .await;
        Ok(now)
    }

    /// Milliseconds from mark `start` to mark `end`, or to now without one.
    /// The result is stored under `name`.
    ///
    /// # Errors
    ///
    /// Returns [`PerformanceError::UnknownMark`] if a mark is missing and
    /// [`PerformanceError::EmptyName`] for a blank name.
    pub async fn measure(&self, name: &str, start: &str, end: Option<&str>) -> Result<f64, PerformanceError> {
        if name.trim().is_empty() {
            return Err(PerformanceError::EmptyName);
        }
        let now = self.store.clock().now_millis();
        let duration = {
            let mut counters = self.counters.lock();
            let from = *counters
                .marks
                .get(start)
                .ok_or_else(|| PerformanceError::UnknownMark(start.to_owned()))?;
            let to = match end {
                Some(end) => *counters
                    .marks
                    .get(end)
                    .ok_or_else(|| PerformanceError::UnknownMark(end.to_owned()))?,
                None => now,
            };
            let duration = to.saturating_sub(from) as f64;
            counters.measures.insert(name.to_owned(), duration);
            duration
        };
        self.emit(CanvasEventType::PerformanceMeasure, name, Some(duration), "ms")
            .await;
        Ok(duration)
    }

    /// Current counters.
    #[must_use]
    pub fn get_metrics(&self) -> PerformanceMetrics {
        let (node_count, connection_count) = self
            .store
            .with_graph(|graph| (graph.nodes.len(), graph.connections.len()));
        let emitted = self.store.bus().emitted_count();
        let counters = self.counters.lock();
        PerformanceMetrics {
            node_count,
            connection_count,
            events_emitted: emitted.saturating_sub(counters.events_baseline),
            commits: counters.commits,
            layout_runs: counters.layout_runs,
            last_layout_ms: counters.last_layout_ms,
            measures: counters.measures.clone(),
            monitoring: self.is_monitoring(),
            revision: self.store.revision(),
        }
    }

    /// Clears marks, measures and counters. Monitoring state is unchanged.
    pub fn reset_metrics(&self) {
        let baseline = self.store.bus().emitted_count();
        *self.counters.lock() = Counters {
            events_baseline: baseline,
            ..Counters::default()
        };
    }

    /// Estimated memory held by the graph.
    ///
    /// # Errors
    ///
    /// Returns [`PerformanceError::Serialization`] if the graph cannot be
    /// written as JSON.
    pub fn get_memory_usage(&self) -> Result<MemoryUsage, PerformanceError> {
        self.store.with_graph(|graph| {
            Ok(MemoryUsage {
                nodes: graph.nodes.len(),
                connections: graph.connections.len(),
                graph_bytes: serde_json::to_vec(graph)?.len(),
            })
        })
    }

    /// What the current viewport shows.
    #[must_use]
    pub fn get_render_performance(&self) -> RenderEstimate {
        let viewport = self.store.viewport();
        let area = viewport.visible_area();
        self.store.with_graph(|graph| {
            let visible: Vec<_> = graph
                .nodes
                .values()
                .filter(|node| node.bounds().intersects(&area))
                .map(|node| &node.id)
                .collect();
            let visible_connections = graph
                .connections
                .values()
                .filter(|c| visible.contains(&&c.source) || visible.contains(&&c.target))
                .count();
            RenderEstimate {
                visible_nodes: visible.len(),
                visible_connections,
                total_nodes: graph.nodes.len(),
                zoom: viewport.zoom,
            }
        })
    }

    /// Emits `performance:warning` for each capacity limit at or above
    /// [`CAPACITY_WARNING_RATIO`] and returns the warnings raised.
    pub async fn check_thresholds(&self) -> Vec<String> {
        let limits = self.store.config().performance;
        let metrics = self.get_metrics();
        let mut warnings = Vec::new();
        for (name, used, limit) in [
            ("nodes", metrics.node_count, limits.max_nodes),
            ("connections", metrics.connection_count, limits.max_connections),
        ] {
            if limit == 0 {
                continue;
            }
            let ratio = used as f64 / limit as f64;
            if ratio >= CAPACITY_WARNING_RATIO {
                tracing::warn!(name, used, limit, "canvas close to capacity");
                self.emit(CanvasEventType::PerformanceWarning, name, Some(ratio), "ratio")
                    .await;
                warnings.push(format!("{name}: {used} of {limit}"));
            }
        }
        warnings
    }

    async fn emit(&self, kind: CanvasEventType, name: &str, value: Option<f64>, unit: &str) {
        let data = PerformanceEventData {
            name: name.to_owned(),
            value,
            unit: Some(unit.to_owned()),
            details: None,
        };
        let event = CanvasEvent::new(kind, EventPayload::Performance(data)).from_source(SOURCE);
        self.store.bus().emit(event).await;
    }
}

impl Drop for PerformanceMonitor {
    fn drop(&mut self) {
        self.stop_monitoring();
    }
}
