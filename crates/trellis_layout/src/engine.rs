//! Applies layouts to a [`GraphStore`].
//!
//! The engine snapshots the graph, runs a pure algorithm from
//! [`algorithm`](crate::algorithm) or [`arrange`](crate::arrange), and writes
//! the changed positions back with one `move_nodes` batch. That batch is an
//! ordinary store commit, so it is validated, versioned and undoable.
//! Each run is bracketed by `layout:start` and `layout:end`.

use std::sync::Arc;

use hashbrown::HashSet;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use trellis_core::clock::Clock;
use trellis_core::config::{
    ForceConfig, GridConfig, LayoutAlgorithm, LayoutAlignment, LayoutConfig, LayoutDirection, LayoutSpacing,
};
use trellis_core::geometry::Position;
use trellis_core::{Graph, Node, NodeId};
use trellis_events::event::LayoutEventData;
use trellis_events::{CanvasEvent, CanvasEventType, EventPayload};
use trellis_graph::GraphStore;

use crate::algorithm::{self, Positions};
use crate::arrange::{self, Alignment, Distribution};
use crate::error::LayoutError;
use crate::suggest;

// ─────────────────────────────────────────────────────────────────────────────
// Options
// ─────────────────────────────────────────────────────────────────────────────

/// Per-call overrides of the canvas layout settings. Unset fields fall back
/// to the store's [`LayoutConfig`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LayoutOptions {
    /// Hierarchical flow direction.
    pub direction: Option<LayoutDirection>,
    /// Spacing between nodes and layers.
    pub spacing: Option<LayoutSpacing>,
    /// Layer alignment.
    pub alignment: Option<LayoutAlignment>,
    /// Force-directed parameters.
    pub force: Option<ForceConfig>,
    /// Grid column count.
    pub grid_columns: Option<usize>,
}

impl LayoutOptions {
    /// Parses a loosely typed options object, e.g. from a service call.
    ///
    /// # Errors
    ///
    /// Returns [`LayoutError::Options`] when a field has the wrong shape.
    pub fn from_value(value: Value) -> Result<Self, LayoutError> {
        serde_json::from_value(value).map_err(|err| LayoutError::Options(err.to_string()))
    }

    /// Overlays these options on `base`.
    #[must_use]
    pub fn apply(&self, base: &LayoutConfig) -> LayoutConfig {
        let mut config = base.clone();
        if let Some(direction) = self.direction {
            config.direction = direction;
        }
        if let Some(spacing) = &self.spacing {
            config.spacing = spacing.clone();
        }
        if let Some(alignment) = self.alignment {
            config.alignment = alignment;
        }
        if let Some(force) = &self.force {
            config.force = force.clone();
        }
        if self.grid_columns.is_some() {
            config.grid_columns = self.grid_columns;
        }
        config
    }
}

fn check_config(config: &LayoutConfig) -> Result<(), LayoutError> {
    let spacing = &config.spacing;
    let force = &config.force;
    let non_negative = [
        ("spacing.node", spacing.node),
        ("spacing.level", spacing.level),
        ("spacing.branch", spacing.branch),
        ("force.convergence", force.convergence),
        ("force.idealLength", force.ideal_length),
        ("force.repulsion", force.repulsion),
        ("force.attraction", force.attraction),
    ];
    for (name, value) in non_negative {
        if !value.is_finite() || value < 0.0 {
            return Err(LayoutError::InvalidArgument(format!(
                "{name} must be a non-negative number, got {value}"
            )));
        }
    }
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// LayoutEngine
// ─────────────────────────────────────────────────────────────────────────────

/// What a layout run changed.
#[derive(Debug, Clone, PartialEq)]
pub struct LayoutReport {
    /// Algorithm or arrangement name.
    pub algorithm: String,
    /// Nodes whose position actually changed.
    pub moved: Vec<NodeId>,
    /// Time from `layout:start` to `layout:end`, by the store clock.
    pub duration_ms: f64,
}

/// Layout and arrangement for one store.
#[derive(Debug, Clone)]
pub struct LayoutEngine {
    store: Arc<GraphStore>,
}

impl LayoutEngine {
    /// Creates an engine over `store`.
    #[must_use]
    pub fn new(store: Arc<GraphStore>) -> Self {
        Self { store }
    }

    /// The effective settings for a call with `options`.
    ///
    /// # Errors
    ///
    /// Returns [`LayoutError::InvalidArgument`] for negative or non-finite
    /// spacing or force parameters.
    pub fn effective_config(&self, options: Option<&LayoutOptions>) -> Result<LayoutConfig, LayoutError> {
        let base = self.store.config().layout;
        let config = options.map_or(base.clone(), |options| options.apply(&base));
        check_config(&config)?;
        Ok(config)
    }

    /// Computes target positions without applying them.
    ///
    /// # Errors
    ///
    /// See [`effective_config`](Self::effective_config).
    pub fn preview(
        &self,
        algorithm: LayoutAlgorithm,
        options: Option<&LayoutOptions>,
    ) -> Result<Positions, LayoutError> {
        let config = self.effective_config(options)?;
        let grid = self.store.config().grid;
        Ok(self
            .store
            .with_graph(|graph| layout_positions(algorithm, graph, &config, &grid)))
    }

    /// Runs `algorithm`, or the configured default, over every node.
    ///
    /// # Errors
    ///
    /// Rejects invalid options before anything is emitted, and reports
    /// store refusals of the write-back as [`LayoutError::Rejected`].
    pub async fn auto_layout(
        &self,
        algorithm: Option<LayoutAlgorithm>,
        options: Option<&LayoutOptions>,
    ) -> Result<LayoutReport, LayoutError> {
        let config = self.effective_config(options)?;
        let algorithm = algorithm.unwrap_or(config.algorithm);
        let grid = self.store.config().grid;
        let affected: Vec<NodeId> = self.store.with_graph(|graph| graph.nodes.keys().cloned().collect());
        self.run(algorithm.as_str(), affected, |graph| {
            Ok(layout_positions(algorithm, graph, &config, &grid))
        })
        .await
    }

    /// Breadth-first layered layout.
    ///
    /// # Errors
    ///
    /// See [`auto_layout`](Self::auto_layout).
    pub async fn hierarchical_layout(&self, options: Option<&LayoutOptions>) -> Result<LayoutReport, LayoutError> {
        self.auto_layout(Some(LayoutAlgorithm::Hierarchical), options).await
    }

    /// Force-directed layout.
    ///
    /// # Errors
    ///
    /// See [`auto_layout`](Self::auto_layout).
    pub async fn force_layout(&self, options: Option<&LayoutOptions>) -> Result<LayoutReport, LayoutError> {
        self.auto_layout(Some(LayoutAlgorithm::Force), options).await
    }

    /// Circular layout.
    ///
    /// # Errors
    ///
    /// See [`auto_layout`](Self::auto_layout).
    pub async fn circular_layout(&self, options: Option<&LayoutOptions>) -> Result<LayoutReport, LayoutError> {
        self.auto_layout(Some(LayoutAlgorithm::Circular), options).await
    }

    /// Grid layout.
    ///
    /// # Errors
    ///
    /// See [`auto_layout`](Self::auto_layout).
    pub async fn grid_layout(&self, options: Option<&LayoutOptions>) -> Result<LayoutReport, LayoutError> {
        self.auto_layout(Some(LayoutAlgorithm::Grid), options).await
    }

    /// Lines up the given nodes. Nodes outside `ids` never move.
    ///
    /// # Errors
    ///
    /// Returns [`LayoutError::NodeNotFound`] if any id is unknown.
    pub async fn align_nodes(&self, ids: &[NodeId], alignment: Alignment) -> Result<LayoutReport, LayoutError> {
        let nodes = self.resolve(ids)?;
        let affected = node_ids(&nodes);
        self.run(alignment.as_str(), affected, move |_| Ok(arrange::align(&nodes, alignment)))
            .await
    }

    /// Spreads the given nodes with equal gaps.
    ///
    /// # Errors
    ///
    /// Returns [`LayoutError::NodeNotFound`] if any id is unknown.
    pub async fn distribute_nodes(
        &self,
        ids: &[NodeId],
        distribution: Distribution,
    ) -> Result<LayoutReport, LayoutError> {
        let nodes = self.resolve(ids)?;
        let affected = node_ids(&nodes);
        self.run(distribution.as_str(), affected, move |_| {
            Ok(arrange::distribute(&nodes, distribution))
        })
        .await
    }

    /// Re-spaces the given nodes along their dominant axis.
    ///
    /// # Errors
    ///
    /// Returns [`LayoutError::NodeNotFound`] for unknown ids and
    /// [`LayoutError::InvalidArgument`] for a negative spacing.
    pub async fn adjust_spacing(&self, ids: &[NodeId], spacing: f64) -> Result<LayoutReport, LayoutError> {
        let nodes = self.resolve(ids)?;
        let positions = arrange::adjust_spacing(&nodes, spacing)?;
        let affected = node_ids(&nodes);
        self.run("adjust-spacing", affected, move |_| Ok(positions)).await
    }

    /// Algorithms suited to the current graph, best first.
    #[must_use]
    pub fn suggestions(&self) -> Vec<LayoutAlgorithm> {
        self.store.with_graph(suggest::suggest)
    }

    fn resolve(&self, ids: &[NodeId]) -> Result<Vec<Node>, LayoutError> {
        let mut seen: HashSet<&NodeId> = HashSet::with_capacity(ids.len());
        self.store.with_graph(|graph| {
            ids.iter()
                .filter(|id| seen.insert(*id))
                .map(|id| {
                    graph
                        .node(id)
                        .cloned()
                        .ok_or_else(|| LayoutError::NodeNotFound(id.clone()))
                })
                .collect()
        })
    }

    async fn run(
        &self,
        algorithm: &str,
        affected: Vec<NodeId>,
        compute: impl FnOnce(&Graph) -> Result<Positions, LayoutError>,
    ) -> Result<LayoutReport, LayoutError> {
        let clock = self.store.clock();
        let started = clock.now_millis();
        self.emit(CanvasEventType::LayoutStart, algorithm, affected.clone(), None)
            .await;

        let graph = self.store.graph();
        let outcome = compute(&graph).map(|positions| changed_moves(&graph, positions));
        let result = match outcome {
            Ok(moves) if moves.is_empty() => Ok(Vec::new()),
            Ok(moves) => {
                let moved: Vec<NodeId> = moves.iter().map(|(id, _)| id.clone()).collect();
                let batch = self.store.move_nodes(moves).await;
                if batch.success {
                    Ok(moved)
                } else {
                    Err(LayoutError::Rejected(batch.errors))
                }
            }
            Err(err) => Err(err),
        };

        let duration_ms = clock.now_millis().saturating_sub(started) as f64;
        if let Ok(moved) = &result
            && !moved.is_empty()
        {
            self.emit(CanvasEventType::LayoutChanged, algorithm, moved.clone(), None)
                .await;
        }
        self.emit(CanvasEventType::LayoutEnd, algorithm, affected, Some(duration_ms))
            .await;

        match result {
            Ok(moved) => {
                tracing::debug!(algorithm, moved = moved.len(), duration_ms, "layout applied");
                Ok(LayoutReport {
                    algorithm: algorithm.to_owned(),
                    moved,
                    duration_ms,
                })
            }
            Err(err) => {
                tracing::warn!(algorithm, error = %err, "layout rejected");
                Err(err)
            }
        }
    }

    async fn emit(
        &self,
        kind: CanvasEventType,
        algorithm: &str,
        affected_nodes: Vec<NodeId>,
        duration_ms: Option<f64>,
    ) {
        let data = LayoutEventData {
            algorithm: algorithm.to_owned(),
            affected_nodes,
            duration_ms,
        };
        let event = CanvasEvent::new(kind, EventPayload::Layout(data)).from_source("layout");
        self.store.bus().emit(event).await;
    }
}

fn layout_positions(
    algorithm: LayoutAlgorithm,
    graph: &Graph,
    config: &LayoutConfig,
    grid: &GridConfig,
) -> Positions {
    match algorithm {
        LayoutAlgorithm::Hierarchical => algorithm::hierarchical(graph, config),
        LayoutAlgorithm::Force => algorithm::force(graph, &config.force),
        LayoutAlgorithm::Circular => algorithm::circular(graph, config),
        LayoutAlgorithm::Grid => algorithm::grid(graph, config, grid),
    }
}

/// Drops targets for nodes that no longer exist or would not move.
fn changed_moves(graph: &Graph, positions: Positions) -> Vec<(NodeId, Position)> {
    positions
        .into_iter()
        .filter(|(id, target)| graph.node(id).is_some_and(|node| node.position() != *target))
        .collect()
}

fn node_ids(nodes: &[Node]) -> Vec<NodeId> {
    nodes.iter().map(|node| node.id.clone()).collect()
}
