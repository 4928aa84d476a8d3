//! The canonical node/connection/viewport/selection state of one canvas.
//!
//! Every mutation follows the same pipeline:
//!
//! 1. Under the write lock, clone the graph into a draft and apply the change.
//! 2. Run [`ValidationEngine::check_commit`] on the draft; blocking findings
//!    reject the call and leave the store untouched.
//! 3. Swap the draft in, prune the selection, bump the revision and capture
//!    the committed [`CanvasSnapshot`].
//! 4. Release the lock, then emit the per-entity events, any selection
//!    events and finally one `canvas:state-changed` commit event.
//!
//! Batch items are checked one at a time with
//! [`ValidationEngine::check_scope`], which only looks at the entities an
//! item touched. A failed item is undone from a journal of the entries it
//! overwrote. One whole-graph structural pass runs before the batch commits.
//!
//! Because the lock is never held across an `await`, handlers may call back
//! into the store (nested emits resolve depth-first).

use core::fmt;
use core::hash::Hash;
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::RwLock;
use serde_json::{Map, Value};
use trellis_core::canvas::{CanvasMode, CanvasSnapshot, CanvasState, Selection, SnapshotType, Viewport};
use trellis_core::clock::{Clock, SharedClock, SystemClock};
use trellis_core::config::CanvasConfig;
use trellis_core::connection::{ConnectionDraft, ConnectionMetadata, ConnectionPatch};
use trellis_core::geometry::{Position, Rectangle, Size};
use trellis_core::graph::ConnectionDirection;
use trellis_core::node::{NodeDraft, NodeMetadata, NodePatch, PortSide};
use trellis_core::value::{merge_maps, set_path};
use trellis_core::{
    BatchOperationResult, Connection, ConnectionId, ErrorCode, Graph, Node, NodeId, OperationResult,
};
use trellis_events::event::{
    CommitEventData, CommitOrigin, ConnectionEventData, ModeEventData, NodeEventData, ViewportEventData,
};
use trellis_events::{CanvasEvent, CanvasEventType, EventBus, EventPayload};
use trellis_validation::{CommitScope, ValidationEngine, ValidationResult};

use crate::error::StoreError;
use crate::query::{Query, QueryError, QueryResult};
use crate::selection::selection_events;

const SOURCE: &str = "graph-store";

/// Offset applied by [`GraphStore::clone_node`] when none is given.
pub const CLONE_OFFSET: Position = Position::new(20.0, 20.0);

struct StoreState {
    graph: Graph,
    viewport: Viewport,
    selection: Selection,
    mode: CanvasMode,
    revision: u64,
}

/// Events and metadata produced by a staged commit, emitted after the lock
/// is released.
struct Staged {
    events: Vec<CanvasEvent>,
    /// Set for mutation commits, which real-time validation re-checks.
    revalidate: bool,
}

impl Staged {
    fn none() -> Self {
        Self {
            events: Vec::new(),
            revalidate: false,
        }
    }
}

/// Owner of one canvas's graph, viewport, selection and mode.
pub struct GraphStore {
    state: RwLock<StoreState>,
    config: RwLock<CanvasConfig>,
    bus: EventBus,
    validator: Arc<ValidationEngine>,
    clock: SharedClock,
}

impl fmt::Debug for GraphStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.read();
        f.debug_struct("GraphStore")
            .field("nodes", &state.graph.nodes.len())
            .field("connections", &state.graph.connections.len())
            .field("mode", &state.mode)
            .field("revision", &state.revision)
            .finish_non_exhaustive()
    }
}

impl Default for GraphStore {
    fn default() -> Self {
        Self::new(CanvasConfig::default())
    }
}

impl GraphStore {
    /// Creates a store with its own bus, validation engine and the system clock.
    #[must_use]
    pub fn new(config: CanvasConfig) -> Self {
        let clock = SystemClock::shared();
        let bus = EventBus::with_config(&config.events, Arc::clone(&clock));
        let validator = Arc::new(ValidationEngine::new(&config));
        Self::with_parts(config, bus, validator, clock)
    }

    /// Creates a store over explicitly provided collaborators.
    #[must_use]
    pub fn with_parts(
        config: CanvasConfig,
        bus: EventBus,
        validator: Arc<ValidationEngine>,
        clock: SharedClock,
    ) -> Self {
        let viewport = Viewport::default().clamped(&config.zoom);
        Self {
            state: RwLock::new(StoreState {
                graph: Graph::new(),
                viewport,
                selection: Selection::default(),
                mode: CanvasMode::default(),
                revision: 0,
            }),
            config: RwLock::new(config),
            bus,
            validator,
            clock,
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Accessors
    // ─────────────────────────────────────────────────────────────────────────

    /// The bus this store publishes on.
    #[must_use]
    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// The validation engine consulted before commits.
    #[must_use]
    pub fn validator(&self) -> &Arc<ValidationEngine> {
        &self.validator
    }

    /// The clock used for metadata and snapshot timestamps.
    #[must_use]
    pub fn clock(&self) -> SharedClock {
        Arc::clone(&self.clock)
    }

    /// Current configuration.
    #[must_use]
    pub fn config(&self) -> CanvasConfig {
        self.config.read().clone()
    }

    /// Counter bumped by every state change; used for dirty tracking.
    #[must_use]
    pub fn revision(&self) -> u64 {
        self.state.read().revision
    }

    /// Current interaction mode.
    #[must_use]
    pub fn mode(&self) -> CanvasMode {
        self.state.read().mode
    }

    /// A copy of the current graph.
    #[must_use]
    pub fn graph(&self) -> Graph {
        self.state.read().graph.clone()
    }

    /// Runs `f` against the live graph without copying it.
    pub fn with_graph<R>(&self, f: impl FnOnce(&Graph) -> R) -> R {
        f(&self.state.read().graph)
    }

    /// Current viewport.
    #[must_use]
    pub fn viewport(&self) -> Viewport {
        self.state.read().viewport
    }

    /// Current selection.
    #[must_use]
    pub fn selection(&self) -> Selection {
        self.state.read().selection.clone()
    }

    /// Full serializable state.
    #[must_use]
    pub fn state(&self) -> CanvasState {
        let state = self.state.read();
        CanvasState::from_graph(&state.graph, state.viewport, state.selection.clone(), state.mode)
    }

    /// An independent copy of the current graph and viewport.
    #[must_use]
    pub fn snapshot(&self, kind: SnapshotType) -> CanvasSnapshot {
        let state = self.state.read();
        CanvasSnapshot::capture(
            state.graph.clone(),
            state.viewport,
            self.clock.now_millis(),
            kind,
        )
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Node reads
    // ─────────────────────────────────────────────────────────────────────────

    /// Looks up a node.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NodeNotFound`] for unknown ids.
    pub fn get_node(&self, id: &NodeId) -> Result<Node, StoreError> {
        self.state
            .read()
            .graph
            .node(id)
            .cloned()
            .ok_or_else(|| StoreError::NodeNotFound(id.clone()))
    }

    /// Looks up several nodes, skipping unknown ids.
    #[must_use]
    pub fn get_nodes(&self, ids: &[NodeId]) -> Vec<Node> {
        let state = self.state.read();
        ids.iter().filter_map(|id| state.graph.node(id).cloned()).collect()
    }

    /// All nodes in insertion order.
    #[must_use]
    pub fn all_nodes(&self) -> Vec<Node> {
        self.state.read().graph.nodes.values().cloned().collect()
    }

    /// Filters, sorts and paginates nodes.
    ///
    /// # Errors
    ///
    /// Returns a [`QueryError`] for malformed queries.
    pub fn query_nodes(&self, query: &Query) -> Result<QueryResult<Node>, QueryError> {
        query.run(self.state.read().graph.nodes.values())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Node mutations
    // ─────────────────────────────────────────────────────────────────────────

    /// Creates a node, filling size, label and ports from the node type registry.
    ///
    /// # Errors
    ///
    /// Fails on duplicate ids, capacity limits, read-only mode or blocking
    /// validation findings.
    pub async fn create_node(&self, draft: NodeDraft) -> Result<Node, StoreError> {
        self.mutate("createNode", |d| d.insert_node(draft)).await
    }

    /// Creates several nodes in one commit; each item succeeds or fails alone.
    pub async fn create_nodes(&self, drafts: Vec<NodeDraft>) -> BatchOperationResult<Node> {
        self.mutate_batch("createNodes", drafts, |d, draft| d.insert_node(draft))
            .await
    }

    /// Applies a partial update.
    ///
    /// # Errors
    ///
    /// Fails on unknown ids, malformed data paths, read-only mode or blocking
    /// validation findings.
    pub async fn update_node(&self, id: &NodeId, patch: NodePatch) -> Result<Node, StoreError> {
        self.mutate("updateNode", |d| d.update_node(id, patch)).await
    }

    /// Updates several nodes in one commit; each item succeeds or fails alone.
    pub async fn update_nodes(&self, updates: Vec<(NodeId, NodePatch)>) -> BatchOperationResult<Node> {
        self.mutate_batch("updateNodes", updates, |d, (id, patch)| d.update_node(&id, patch))
            .await
    }

    /// Deletes a node and every connection touching it.
    ///
    /// Kinds registered as non-deletable need `force`.
    ///
    /// # Errors
    ///
    /// Fails on unknown ids, protected kinds or read-only mode.
    pub async fn delete_node(&self, id: &NodeId, force: bool) -> Result<Node, StoreError> {
        self.mutate("deleteNode", |d| d.remove_node(id, force)).await
    }

    /// Deletes several nodes in one commit; each item succeeds or fails alone.
    pub async fn delete_nodes(&self, ids: &[NodeId], force: bool) -> BatchOperationResult<Node> {
        self.mutate_batch("deleteNodes", ids.to_vec(), |d, id| d.remove_node(&id, force))
            .await
    }

    /// Moves a node's top-left corner to `(x, y)`.
    ///
    /// # Errors
    ///
    /// Fails on unknown ids, non-finite coordinates or read-only mode.
    pub async fn move_node(&self, id: &NodeId, x: f64, y: f64) -> Result<Node, StoreError> {
        self.mutate("moveNode", |d| d.move_node(id, Position::new(x, y))).await
    }

    /// Moves several nodes in one commit; each item succeeds or fails alone.
    pub async fn move_nodes(&self, moves: Vec<(NodeId, Position)>) -> BatchOperationResult<Node> {
        self.mutate_batch("moveNodes", moves, |d, (id, to)| d.move_node(&id, to))
            .await
    }

    /// Resizes a node, clamped to its kind's bounds.
    ///
    /// # Errors
    ///
    /// Fails on unknown ids, non-resizable kinds or read-only mode.
    pub async fn resize_node(&self, id: &NodeId, width: f64, height: f64) -> Result<Node, StoreError> {
        self.mutate("resizeNode", |d| d.resize_node(id, Size::new(width, height)))
            .await
    }

    /// Copies a node under a fresh id, shifted by `offset` (default
    /// [`CLONE_OFFSET`]). Connections are not copied.
    ///
    /// # Errors
    ///
    /// Fails on unknown ids, capacity limits or read-only mode.
    pub async fn clone_node(&self, id: &NodeId, offset: Option<Position>) -> Result<Node, StoreError> {
        let offset = offset.unwrap_or(CLONE_OFFSET);
        self.mutate("cloneNode", |d| {
            let source = d.node(id)?.clone();
            let mut draft = NodeDraft::from(source);
            draft.id = None;
            draft.x += offset.x;
            draft.y += offset.y;
            draft.metadata = None;
            d.insert_node(draft)
        })
        .await
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Connection reads
    // ─────────────────────────────────────────────────────────────────────────

    /// Looks up a connection.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ConnectionNotFound`] for unknown ids.
    pub fn get_connection(&self, id: &ConnectionId) -> Result<Connection, StoreError> {
        self.state
            .read()
            .graph
            .connection(id)
            .cloned()
            .ok_or_else(|| StoreError::ConnectionNotFound(id.clone()))
    }

    /// Looks up several connections, skipping unknown ids.
    #[must_use]
    pub fn get_connections(&self, ids: &[ConnectionId]) -> Vec<Connection> {
        let state = self.state.read();
        ids.iter()
            .filter_map(|id| state.graph.connection(id).cloned())
            .collect()
    }

    /// All connections in insertion order.
    #[must_use]
    pub fn all_connections(&self) -> Vec<Connection> {
        self.state.read().graph.connections.values().cloned().collect()
    }

    /// Connections touching a node.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NodeNotFound`] for unknown ids.
    pub fn get_node_connections(
        &self,
        id: &NodeId,
        direction: ConnectionDirection,
    ) -> Result<Vec<Connection>, StoreError> {
        let state = self.state.read();
        if state.graph.node(id).is_none() {
            return Err(StoreError::NodeNotFound(id.clone()));
        }
        Ok(state
            .graph
            .connections_of(id, direction)
            .into_iter()
            .cloned()
            .collect())
    }

    /// Filters, sorts and paginates connections.
    ///
    /// # Errors
    ///
    /// Returns a [`QueryError`] for malformed queries.
    pub fn query_connections(&self, query: &Query) -> Result<QueryResult<Connection>, QueryError> {
        query.run(self.state.read().graph.connections.values())
    }

    /// Dry-runs a node draft against the current graph without committing.
    ///
    /// # Errors
    ///
    /// Returns the error the real creation would fail with.
    pub fn check_node(&self, draft: &NodeDraft) -> Result<(), StoreError> {
        let config = self.config.read().clone();
        let graph = self.state.read().graph.clone();
        let mut d = Draft::new(graph, &config, &self.validator, self.clock.now_millis());
        d.insert_node(draft.clone())?;
        d.verify_all()
    }

    /// Dry-runs a connection against the current graph without committing.
    ///
    /// # Errors
    ///
    /// Returns the error the real creation would fail with.
    pub fn check_connection(&self, draft: &ConnectionDraft) -> Result<(), StoreError> {
        let config = self.config.read().clone();
        let graph = self.state.read().graph.clone();
        let mut d = Draft::new(graph, &config, &self.validator, self.clock.now_millis());
        d.insert_connection(draft.clone())?;
        d.verify_all()
    }

    /// Returns true if a plain connection `source -> target` would be accepted.
    #[must_use]
    pub fn is_valid_connection(&self, source: &NodeId, target: &NodeId) -> bool {
        self.check_connection(&ConnectionDraft::new(source, target))
            .is_ok()
    }

    /// Orthogonal polyline from the source anchor to the target anchor.
    ///
    /// Anchors are the attached ports when set, otherwise the bottom center of
    /// the source and the top center of the target.
    ///
    /// # Errors
    ///
    /// Fails if the connection or either endpoint is missing.
    pub fn connection_path(&self, id: &ConnectionId) -> Result<Vec<Position>, StoreError> {
        let state = self.state.read();
        let graph = &state.graph;
        let connection = graph
            .connection(id)
            .ok_or_else(|| StoreError::ConnectionNotFound(id.clone()))?;
        let source = graph
            .node(&connection.source)
            .ok_or_else(|| StoreError::NodeNotFound(connection.source.clone()))?;
        let target = graph
            .node(&connection.target)
            .ok_or_else(|| StoreError::NodeNotFound(connection.target.clone()))?;

        let source_port = connection.source_port.as_ref().and_then(|p| source.port(p));
        let target_port = connection.target_port.as_ref().and_then(|p| target.port(p));
        let (start, side) = match source_port {
            Some(port) => (port.anchor(&source.bounds()), port.side),
            None => {
                let b = source.bounds();
                (Position::new(b.center().x, b.bottom()), PortSide::Bottom)
            }
        };
        let end = match target_port {
            Some(port) => port.anchor(&target.bounds()),
            None => {
                let b = target.bounds();
                Position::new(b.center().x, b.y)
            }
        };

        let path = if matches!(side, PortSide::Left | PortSide::Right) {
            let mid = (start.x + end.x) / 2.0;
            vec![start, Position::new(mid, start.y), Position::new(mid, end.y), end]
        } else {
            let mid = (start.y + end.y) / 2.0;
            vec![start, Position::new(start.x, mid), Position::new(end.x, mid), end]
        };
        Ok(path)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Connection mutations
    // ─────────────────────────────────────────────────────────────────────────

    /// Creates a connection.
    ///
    /// # Errors
    ///
    /// Fails on duplicate ids, capacity limits, read-only mode or blocking
    /// validation findings (dangling endpoints, port limits, denied rules).
    pub async fn create_connection(&self, draft: ConnectionDraft) -> Result<Connection, StoreError> {
        self.mutate("createConnection", |d| d.insert_connection(draft))
            .await
    }

    /// Creates several connections in one commit; each item succeeds or fails alone.
    pub async fn create_connections(
        &self,
        drafts: Vec<ConnectionDraft>,
    ) -> BatchOperationResult<Connection> {
        self.mutate_batch("createConnections", drafts, |d, draft| d.insert_connection(draft))
            .await
    }

    /// Applies a partial update.
    ///
    /// # Errors
    ///
    /// Fails on unknown ids, read-only mode or blocking validation findings.
    pub async fn update_connection(
        &self,
        id: &ConnectionId,
        patch: ConnectionPatch,
    ) -> Result<Connection, StoreError> {
        self.mutate("updateConnection", |d| d.update_connection(id, patch))
            .await
    }

    /// Updates several connections in one commit; each item succeeds or fails alone.
    pub async fn update_connections(
        &self,
        updates: Vec<(ConnectionId, ConnectionPatch)>,
    ) -> BatchOperationResult<Connection> {
        self.mutate_batch("updateConnections", updates, |d, (id, patch)| {
            d.update_connection(&id, patch)
        })
        .await
    }

    /// Deletes a connection.
    ///
    /// # Errors
    ///
    /// Fails on unknown ids or read-only mode.
    pub async fn delete_connection(&self, id: &ConnectionId) -> Result<Connection, StoreError> {
        self.mutate("deleteConnection", |d| d.remove_connection(id)).await
    }

    /// Deletes several connections in one commit; each item succeeds or fails alone.
    pub async fn delete_connections(&self, ids: &[ConnectionId]) -> BatchOperationResult<Connection> {
        self.mutate_batch("deleteConnections", ids.to_vec(), |d, id| d.remove_connection(&id))
            .await
    }

    /// Deletes every connection touching a node, in one commit.
    ///
    /// # Errors
    ///
    /// Fails on unknown ids or read-only mode.
    pub async fn delete_node_connections(&self, id: &NodeId) -> Result<Vec<Connection>, StoreError> {
        self.mutate("deleteNodeConnections", |d| {
            d.node(id)?;
            let ids: Vec<ConnectionId> = d
                .graph
                .connections_of(id, ConnectionDirection::All)
                .into_iter()
                .map(|c| c.id.clone())
                .collect();
            ids.iter().map(|cid| d.remove_connection(cid)).collect()
        })
        .await
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Canvas-wide mutations
    // ─────────────────────────────────────────────────────────────────────────

    /// Inserts complete entities in one commit, as an import does.
    ///
    /// # Errors
    ///
    /// Fails as a whole on any duplicate id, capacity limit or blocking finding.
    pub async fn add_entities(
        &self,
        nodes: Vec<Node>,
        connections: Vec<Connection>,
    ) -> Result<(), StoreError> {
        self.mutate("addEntities", |d| {
            for node in nodes {
                d.put_node(node)?;
            }
            for connection in connections {
                d.put_connection(connection)?;
            }
            Ok(())
        })
        .await
    }

    /// Replaces the whole graph (and optionally the viewport) in one commit.
    ///
    /// Emits a deleted, created or updated event for every entity that
    /// differs between the old and new graph.
    ///
    /// # Errors
    ///
    /// Fails on read-only mode, capacity limits or blocking findings.
    pub async fn replace_graph(&self, graph: Graph, viewport: Option<Viewport>) -> Result<(), StoreError> {
        self.mutate("replaceGraph", |d| {
            d.replace(graph)?;
            d.viewport = viewport;
            Ok(())
        })
        .await
    }

    /// Replaces nodes, connections, viewport, selection and mode.
    ///
    /// # Errors
    ///
    /// Fails on read-only mode, capacity limits or blocking findings.
    pub async fn update_canvas_state(&self, state: CanvasState) -> Result<(), StoreError> {
        let CanvasState {
            nodes,
            connections,
            viewport,
            selection,
            mode,
        } = state;
        self.mutate("updateCanvasState", |d| {
            d.replace(Graph::from_parts(nodes, connections))?;
            d.viewport = Some(viewport);
            d.selection = Some(selection);
            Ok(())
        })
        .await?;
        self.set_mode(mode).await;
        Ok(())
    }

    /// Deletes every node and connection in one commit.
    ///
    /// # Errors
    ///
    /// Fails on read-only mode.
    pub async fn clear_canvas(&self) -> Result<(), StoreError> {
        self.mutate("clearCanvas", |d| {
            d.clear();
            Ok(())
        })
        .await
    }

    /// Clears the canvas and resets the viewport to its default position.
    ///
    /// # Errors
    ///
    /// Fails on read-only mode.
    pub async fn reset_canvas(&self) -> Result<(), StoreError> {
        let current = self.viewport();
        let viewport = Viewport {
            width: current.width,
            height: current.height,
            ..Viewport::default()
        };
        self.mutate("resetCanvas", |d| {
            d.clear();
            d.viewport = Some(viewport);
            Ok(())
        })
        .await
    }

    /// Installs a snapshot without validation, as undo/redo do.
    ///
    /// Emits the commit event with [`CommitOrigin::Adoption`]. Real-time
    /// validation does not re-run for adopted states.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ReadOnly`] in view mode.
    pub async fn adopt(&self, snapshot: &CanvasSnapshot, restore_viewport: bool) -> Result<(), StoreError> {
        let staged = {
            let zoom = self.config.read().zoom.clone();
            let mut guard = self.state.write();
            let state = &mut *guard;
            if !state.mode.is_editable() {
                return Err(StoreError::ReadOnly);
            }
            let previous_selection = state.selection.clone();
            let previous_viewport = state.viewport;
            state.graph = snapshot.graph.clone();
            if restore_viewport {
                state.viewport = snapshot.viewport.clamped(&zoom);
            }
            state.selection.retain_existing(&state.graph);
            state.revision += 1;

            let mut events = selection_events(&previous_selection, &state.selection);
            events.extend(viewport_events(previous_viewport, state.viewport));
            events.push(commit_event(
                CommitOrigin::Adoption,
                state.revision,
                "adopt",
                Arc::new(snapshot.clone()),
            ));
            tracing::debug!(
                snapshot = %snapshot.id,
                revision = state.revision,
                nodes = state.graph.nodes.len(),
                "adopted snapshot"
            );
            Staged {
                events,
                revalidate: false,
            }
        };
        self.flush(staged).await;
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Viewport
    // ─────────────────────────────────────────────────────────────────────────

    /// Replaces the viewport, clamping its zoom.
    pub async fn set_viewport(&self, viewport: Viewport) -> Viewport {
        self.change_viewport(|_| viewport).await
    }

    /// Zooms to `scale`, keeping the screen point `center` (default: the
    /// middle of the screen) fixed.
    pub async fn zoom_to(&self, scale: f64, center: Option<Position>) -> Viewport {
        let zoom = self.config.read().zoom.clone();
        self.change_viewport(|current| {
            let center =
                center.unwrap_or_else(|| Position::new(current.width / 2.0, current.height / 2.0));
            let anchor = current.screen_to_canvas(center);
            let scale = zoom.clamp(scale);
            Viewport {
                x: center.x - anchor.x * scale,
                y: center.y - anchor.y * scale,
                zoom: scale,
                ..current
            }
        })
        .await
    }

    /// Zooms in by one configured step.
    pub async fn zoom_in(&self) -> Viewport {
        let step = self.config.read().zoom.step;
        let current = self.viewport().zoom;
        self.zoom_to(current + step, None).await
    }

    /// Zooms out by one configured step.
    pub async fn zoom_out(&self) -> Viewport {
        let step = self.config.read().zoom.step;
        let current = self.viewport().zoom;
        self.zoom_to(current - step, None).await
    }

    /// Shifts the viewport by a screen-space delta.
    pub async fn pan(&self, dx: f64, dy: f64) -> Viewport {
        self.change_viewport(|current| Viewport {
            x: current.x + dx,
            y: current.y + dy,
            ..current
        })
        .await
    }

    /// Zooms and pans so every node is visible with `padding` screen pixels
    /// around. An empty canvas leaves the viewport unchanged.
    pub async fn fit_to_content(&self, padding: f64) -> Viewport {
        let Some(bounds) = self.canvas_bounds() else {
            return self.viewport();
        };
        let zoom = self.config.read().zoom.clone();
        self.change_viewport(|current| {
            let available_w = (current.width - 2.0 * padding).max(1.0);
            let available_h = (current.height - 2.0 * padding).max(1.0);
            let scale = zoom.clamp(
                (available_w / bounds.width.max(1.0)).min(available_h / bounds.height.max(1.0)),
            );
            centered_on(current, bounds.center(), scale)
        })
        .await
    }

    /// Pans so the content's center is in the middle of the screen.
    pub async fn center_content(&self) -> Viewport {
        let Some(bounds) = self.canvas_bounds() else {
            return self.viewport();
        };
        self.change_viewport(|current| centered_on(current, bounds.center(), current.zoom))
            .await
    }

    /// Bounding box of all nodes, if any.
    #[must_use]
    pub fn canvas_bounds(&self) -> Option<Rectangle> {
        self.state.read().graph.bounds()
    }

    /// Converts a screen point using the current viewport.
    #[must_use]
    pub fn screen_to_canvas(&self, point: Position) -> Position {
        self.viewport().screen_to_canvas(point)
    }

    /// Converts a canvas point using the current viewport.
    #[must_use]
    pub fn canvas_to_screen(&self, point: Position) -> Position {
        self.viewport().canvas_to_screen(point)
    }

    /// Snaps a dragged position to the grid when within the snap threshold.
    #[must_use]
    pub fn snap_position(&self, position: Position) -> Position {
        let config = self.config.read();
        if !config.snap.enabled || !config.grid.enabled {
            return position;
        }
        let snap = |value: f64| {
            let snapped = config.grid.snap(value);
            if (snapped - value).abs() <= config.snap.threshold {
                snapped
            } else {
                value
            }
        };
        Position::new(snap(position.x), snap(position.y))
    }

    async fn change_viewport(&self, f: impl FnOnce(Viewport) -> Viewport) -> Viewport {
        let zoom = self.config.read().zoom.clone();
        let (previous, next) = {
            let mut state = self.state.write();
            let previous = state.viewport;
            let next = f(previous).clamped(&zoom);
            if next != previous {
                state.viewport = next;
                state.revision += 1;
            }
            (previous, next)
        };
        for event in viewport_events(previous, next) {
            self.bus.emit(event).await;
        }
        next
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Mode & configuration
    // ─────────────────────────────────────────────────────────────────────────

    /// Switches the interaction mode. [`CanvasMode::View`] rejects mutations.
    pub async fn set_mode(&self, mode: CanvasMode) {
        let previous = {
            let mut state = self.state.write();
            core::mem::replace(&mut state.mode, mode)
        };
        if previous != mode {
            tracing::debug!(?previous, ?mode, "canvas mode changed");
            let event = CanvasEvent::new(
                CanvasEventType::CanvasModeChanged,
                EventPayload::Mode(ModeEventData { mode, previous }),
            )
            .from_source(SOURCE);
            self.bus.emit(event).await;
        }
    }

    /// Replaces the configuration and pushes the relevant sections to the
    /// validation engine and bus.
    pub async fn set_config(&self, config: CanvasConfig) {
        self.validator.set_config(config.validation.clone());
        self.validator.set_policy(config.connection.clone());
        self.bus.set_max_listeners(config.events.max_listeners);
        let payload = serde_json::to_value(&config).unwrap_or_default();
        let zoom = config.zoom.clone();
        *self.config.write() = config;
        self.change_viewport(|current| current.clamped(&zoom)).await;
        let event = CanvasEvent::new(CanvasEventType::CanvasConfigChanged, EventPayload::Custom(payload))
            .from_source(SOURCE);
        self.bus.emit(event).await;
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Selection plumbing
    // ─────────────────────────────────────────────────────────────────────────

    /// Applies a selection change and emits the resulting events.
    ///
    /// `f` sees the live graph and a mutable copy of the selection and returns
    /// a value passed back to the caller. Selection changes bypass history.
    pub(crate) async fn change_selection<R>(&self, f: impl FnOnce(&Graph, &mut Selection) -> R) -> R {
        let (value, events) = {
            let mut state = self.state.write();
            let previous = state.selection.clone();
            let mut next = previous.clone();
            let value = f(&state.graph, &mut next);
            next.retain_existing(&state.graph);
            let events = selection_events(&previous, &next);
            state.selection = next;
            (value, events)
        };
        for event in events {
            self.bus.emit(event).await;
        }
        value
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Commit pipeline
    // ─────────────────────────────────────────────────────────────────────────

    async fn mutate<T>(
        &self,
        operation: &'static str,
        apply: impl FnOnce(&mut Draft<'_>) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        match self.stage(operation, |d| {
            let value = apply(d)?;
            d.verify_all()?;
            Ok(value)
        }) {
            Ok((value, staged)) => {
                self.flush(staged).await;
                Ok(value)
            }
            Err(err) => {
                tracing::warn!(operation, code = err.code(), error = %err, "mutation rejected");
                Err(err)
            }
        }
    }

    async fn mutate_batch<I, T>(
        &self,
        operation: &'static str,
        items: Vec<I>,
        apply: impl Fn(&mut Draft<'_>, I) -> Result<T, StoreError>,
    ) -> BatchOperationResult<T> {
        let count = items.len();
        let staged = self.stage(operation, |d| {
            let results: Vec<OperationResult<T>> = items
                .into_iter()
                .map(|item| OperationResult::from_result(d.attempt(|d| apply(d, item))))
                .collect();
            d.verify_structure()?;
            Ok(results)
        });
        match staged {
            Ok((results, staged)) => {
                self.flush(staged).await;
                let batch = BatchOperationResult::from_results(results);
                if batch.error_count > 0 {
                    tracing::warn!(
                        operation,
                        succeeded = batch.success_count,
                        failed = batch.error_count,
                        "batch partially rejected"
                    );
                }
                batch
            }
            Err(err) => {
                tracing::warn!(operation, code = err.code(), error = %err, "batch rejected");
                (0..count)
                    .map(|_| OperationResult::from_result(Err(err.clone())))
                    .collect()
            }
        }
    }

    fn stage<T>(
        &self,
        operation: &'static str,
        apply: impl FnOnce(&mut Draft<'_>) -> Result<T, StoreError>,
    ) -> Result<(T, Staged), StoreError> {
        let config = self.config.read().clone();
        let mut guard = self.state.write();
        let state = &mut *guard;
        if !state.mode.is_editable() {
            return Err(StoreError::ReadOnly);
        }
        let now = self.clock.now_millis();
        let mut draft = Draft::new(state.graph.clone(), &config, &self.validator, now);
        let value = apply(&mut draft)?;
        if !draft.changed {
            return Ok((value, Staged::none()));
        }

        let Draft {
            graph,
            events: mut entity_events,
            viewport,
            selection,
            ..
        } = draft;
        let previous_selection = state.selection.clone();
        let previous_viewport = state.viewport;
        state.graph = graph;
        if let Some(selection) = selection {
            state.selection = selection;
        }
        if let Some(viewport) = viewport {
            state.viewport = viewport.clamped(&config.zoom);
        }
        state.selection.retain_existing(&state.graph);
        state.revision += 1;

        let snapshot = Arc::new(
            CanvasSnapshot::capture(state.graph.clone(), state.viewport, now, SnapshotType::Auto)
                .with_description(operation),
        );
        entity_events.extend(selection_events(&previous_selection, &state.selection));
        entity_events.extend(viewport_events(previous_viewport, state.viewport));
        entity_events.push(commit_event(
            CommitOrigin::Mutation,
            state.revision,
            operation,
            snapshot,
        ));
        tracing::debug!(
            operation,
            revision = state.revision,
            nodes = state.graph.nodes.len(),
            connections = state.graph.connections.len(),
            "committed"
        );
        Ok((
            value,
            Staged {
                events: entity_events,
                revalidate: true,
            },
        ))
    }

    async fn flush(&self, staged: Staged) {
        for event in staged.events {
            self.bus.emit(event).await;
        }
        if staged.revalidate && self.validator.is_real_time() {
            let result = self.with_graph(|graph| self.validator.validate_graph(graph));
            self.validator
                .publish(&self.bus, &result, "canvas", None)
                .await;
        }
    }

    /// Validates the whole current graph with every enabled rule.
    #[must_use]
    pub fn validate(&self) -> ValidationResult {
        self.with_graph(|graph| self.validator.validate_graph(graph))
    }
}

fn centered_on(current: Viewport, point: Position, zoom: f64) -> Viewport {
    Viewport {
        x: current.width / 2.0 - point.x * zoom,
        y: current.height / 2.0 - point.y * zoom,
        zoom,
        ..current
    }
}

fn commit_event(
    origin: CommitOrigin,
    revision: u64,
    operation: &str,
    snapshot: Arc<CanvasSnapshot>,
) -> CanvasEvent {
    CanvasEvent::new(
        CanvasEventType::CanvasStateChanged,
        EventPayload::Commit(CommitEventData {
            origin,
            revision,
            operation: operation.to_owned(),
            snapshot,
        }),
    )
    .from_source(SOURCE)
}

fn viewport_events(previous: Viewport, viewport: Viewport) -> Vec<CanvasEvent> {
    if previous == viewport {
        return Vec::new();
    }
    let data = ViewportEventData { viewport, previous };
    let mut kinds = vec![CanvasEventType::ViewportChanged];
    if previous.zoom != viewport.zoom {
        kinds.push(CanvasEventType::ZoomChanged);
    }
    if previous.x != viewport.x || previous.y != viewport.y {
        kinds.push(CanvasEventType::PanChanged);
    }
    kinds
        .into_iter()
        .map(|kind| CanvasEvent::new(kind, EventPayload::Viewport(data.clone())).from_source(SOURCE))
        .collect()
}

// ─────────────────────────────────────────────────────────────────────────────
// Draft
// ─────────────────────────────────────────────────────────────────────────────

/// A working copy of the graph plus the events its changes will emit.
struct Draft<'a> {
    graph: Graph,
    scope: CommitScope,
    journal: Option<Vec<Undo>>,
    events: Vec<CanvasEvent>,
    viewport: Option<Viewport>,
    selection: Option<Selection>,
    changed: bool,
    config: &'a CanvasConfig,
    validator: &'a ValidationEngine,
    now: u64,
}

impl<'a> Draft<'a> {
    fn new(graph: Graph, config: &'a CanvasConfig, validator: &'a ValidationEngine, now: u64) -> Self {
        Self {
            graph,
            scope: CommitScope::new(),
            journal: None,
            events: Vec::new(),
            viewport: None,
            selection: None,
            changed: false,
            config,
            validator,
            now,
        }
    }

    fn node(&self, id: &NodeId) -> Result<&Node, StoreError> {
        self.graph
            .node(id)
            .ok_or_else(|| StoreError::NodeNotFound(id.clone()))
    }

    fn connection(&self, id: &ConnectionId) -> Result<&Connection, StoreError> {
        self.graph
            .connection(id)
            .ok_or_else(|| StoreError::ConnectionNotFound(id.clone()))
    }

    fn emit_node(&mut self, kind: CanvasEventType, data: NodeEventData) {
        self.changed = true;
        self.events
            .push(CanvasEvent::new(kind, EventPayload::Node(data)).from_source(SOURCE));
    }

    fn emit_connection(&mut self, kind: CanvasEventType, data: ConnectionEventData) {
        self.changed = true;
        self.events
            .push(CanvasEvent::new(kind, EventPayload::Connection(data)).from_source(SOURCE));
    }

    // ── validation ──────────────────────────────────────────────────────────

    fn judge(&self, result: &ValidationResult) -> Result<(), StoreError> {
        let strict = self.validator.is_strict();
        if result.is_blocking(strict) {
            return Err(StoreError::Validation(
                result.blocking(strict).into_iter().cloned().collect(),
            ));
        }
        Ok(())
    }

    fn verify_all(&self) -> Result<(), StoreError> {
        if !self.changed {
            return Ok(());
        }
        self.judge(&self.validator.check_commit(&self.graph, &self.scope))
    }

    fn verify_structure(&self) -> Result<(), StoreError> {
        if !self.changed {
            return Ok(());
        }
        self.judge(&self.validator.check_structure(&self.graph))
    }

    /// Applies one batch item, rolling the draft back if it fails or its
    /// result does not validate.
    fn attempt<T>(&mut self, op: impl FnOnce(&mut Self) -> Result<T, StoreError>) -> Result<T, StoreError> {
        let marks = (
            self.events.len(),
            self.scope.nodes.len(),
            self.scope.connections.len(),
            self.changed,
        );
        self.journal = Some(Vec::new());
        let outcome = op(self).and_then(|value| {
            let scope = CommitScope {
                nodes: self.scope.nodes[marks.1..].to_vec(),
                connections: self.scope.connections[marks.2..].to_vec(),
            };
            self.judge(&self.validator.check_scope(&self.graph, &scope))
                .map(|()| value)
        });
        let journal = self.journal.take().unwrap_or_default();
        if outcome.is_err() {
            self.rollback(journal);
            self.events.truncate(marks.0);
            self.scope.nodes.truncate(marks.1);
            self.scope.connections.truncate(marks.2);
            self.changed = marks.3;
        }
        outcome
    }

    // ── journal ─────────────────────────────────────────────────────────────

    fn record_node(&mut self, id: &NodeId) {
        if let Some(journal) = self.journal.as_mut() {
            let prior = self
                .graph
                .nodes
                .get_full(id)
                .map(|(index, _, node)| (index, node.clone()));
            journal.push(Undo::Node(id.clone(), prior));
        }
    }

    fn record_connection(&mut self, id: &ConnectionId) {
        if let Some(journal) = self.journal.as_mut() {
            let prior = self
                .graph
                .connections
                .get_full(id)
                .map(|(index, _, connection)| (index, connection.clone()));
            journal.push(Undo::Connection(id.clone(), prior));
        }
    }

    fn record_graph(&mut self) {
        if let Some(journal) = self.journal.as_mut() {
            journal.push(Undo::Graph(self.graph.clone()));
        }
    }

    fn rollback(&mut self, journal: Vec<Undo>) {
        for undo in journal.into_iter().rev() {
            match undo {
                Undo::Node(id, prior) => restore(&mut self.graph.nodes, id, prior),
                Undo::Connection(id, prior) => restore(&mut self.graph.connections, id, prior),
                Undo::Graph(graph) => self.graph = graph,
            }
        }
    }

    // ── nodes ───────────────────────────────────────────────────────────────

    fn ensure_node_capacity(&self) -> Result<(), StoreError> {
        let limit = self.config.performance.max_nodes;
        if self.graph.nodes.len() >= limit {
            return Err(StoreError::Capacity { entity: "node", limit });
        }
        Ok(())
    }

    fn insert_node(&mut self, draft: NodeDraft) -> Result<Node, StoreError> {
        ensure_finite(&[draft.x, draft.y])?;
        let node_type = self.validator.node_type(&draft.kind);
        let size = Size::new(
            draft.width.unwrap_or(node_type.default_size.width),
            draft.height.unwrap_or(node_type.default_size.height),
        );
        ensure_finite(&[size.width, size.height])?;
        let mut metadata = draft.metadata.unwrap_or_default();
        metadata.create_time.get_or_insert(self.now);
        metadata.update_time = Some(self.now);
        let node = Node {
            id: draft.id.unwrap_or_else(NodeId::generate),
            label: draft.label.or_else(|| Some(node_type.label.clone())),
            ports: draft.ports.unwrap_or_else(|| node_type.instantiate_ports()),
            kind: draft.kind,
            x: draft.x,
            y: draft.y,
            width: Some(size.width),
            height: Some(size.height),
            data: draft.data,
            style: draft.style,
            metadata: Some(metadata),
        };
        self.put_node(node)
    }

    fn put_node(&mut self, node: Node) -> Result<Node, StoreError> {
        self.ensure_node_capacity()?;
        if self.graph.nodes.contains_key(&node.id) {
            return Err(StoreError::DuplicateNode(node.id));
        }
        self.record_node(&node.id);
        self.graph.nodes.insert(node.id.clone(), node.clone());
        self.scope.nodes.push(node.id.clone());
        self.emit_node(
            CanvasEventType::NodeCreated,
            NodeEventData {
                node: node.clone(),
                previous: None,
                delta: None,
            },
        );
        Ok(node)
    }

    fn update_node(&mut self, id: &NodeId, patch: NodePatch) -> Result<Node, StoreError> {
        let now = self.now;
        let previous = self.node(id)?.clone();
        let mut node = previous.clone();
        let NodePatch {
            kind,
            x,
            y,
            width,
            height,
            label,
            data,
            data_paths,
            style,
            ports,
            metadata,
        } = patch;
        ensure_finite(&[x, y, width, height].into_iter().flatten().collect::<Vec<_>>())?;

        if let Some(kind) = kind {
            node.kind = kind;
        }
        node.x = x.unwrap_or(node.x);
        node.y = y.unwrap_or(node.y);
        node.width = width.or(node.width);
        node.height = height.or(node.height);
        if let Some(label) = label {
            node.label = Some(label);
        }
        if let Some(data) = data {
            merge_maps(&mut node.data, data);
        }
        if !data_paths.is_empty() {
            let mut value = Value::Object(core::mem::take(&mut node.data));
            for (path, new_value) in data_paths {
                set_path(&mut value, &path, new_value)?;
            }
            node.data = match value {
                Value::Object(map) => map,
                _ => Map::new(),
            };
        }
        if let Some(style) = style {
            node.style = Some(style);
        }
        if let Some(ports) = ports {
            node.ports = ports;
        }
        if let Some(metadata) = metadata {
            node.metadata = Some(metadata);
        }
        node.metadata.get_or_insert_with(NodeMetadata::default).update_time = Some(now);

        self.record_node(id);
        self.graph.nodes.insert(id.clone(), node.clone());
        self.scope.nodes.push(id.clone());
        self.emit_node(
            CanvasEventType::NodeUpdated,
            NodeEventData {
                node: node.clone(),
                previous: Some(previous),
                delta: None,
            },
        );
        Ok(node)
    }

    fn move_node(&mut self, id: &NodeId, to: Position) -> Result<Node, StoreError> {
        ensure_finite(&[to.x, to.y])?;
        let now = self.now;
        let previous = self.node(id)?.clone();
        let mut node = previous.clone();
        node.x = to.x;
        node.y = to.y;
        node.metadata.get_or_insert_with(NodeMetadata::default).update_time = Some(now);
        self.record_node(id);
        self.graph.nodes.insert(id.clone(), node.clone());
        self.scope.nodes.push(id.clone());
        self.emit_node(
            CanvasEventType::NodeMoved,
            NodeEventData {
                delta: Some(Position::new(to.x - previous.x, to.y - previous.y)),
                node: node.clone(),
                previous: Some(previous),
            },
        );
        Ok(node)
    }

    fn resize_node(&mut self, id: &NodeId, size: Size) -> Result<Node, StoreError> {
        ensure_finite(&[size.width, size.height])?;
        let now = self.now;
        let previous = self.node(id)?.clone();
        let node_type = self.validator.node_type(&previous.kind);
        if !node_type.resizable {
            return Err(StoreError::NotResizable(id.clone()));
        }
        let size = size.clamp(node_type.min_size, node_type.max_size);
        let mut node = previous.clone();
        node.width = Some(size.width);
        node.height = Some(size.height);
        node.metadata.get_or_insert_with(NodeMetadata::default).update_time = Some(now);
        self.record_node(id);
        self.graph.nodes.insert(id.clone(), node.clone());
        self.scope.nodes.push(id.clone());
        self.emit_node(
            CanvasEventType::NodeResized,
            NodeEventData {
                node: node.clone(),
                previous: Some(previous),
                delta: None,
            },
        );
        Ok(node)
    }

    fn remove_node(&mut self, id: &NodeId, force: bool) -> Result<Node, StoreError> {
        let kind = self.node(id)?.kind.clone();
        if !force && !self.validator.node_type(&kind).deletable {
            return Err(StoreError::NotDeletable { id: id.clone(), kind });
        }
        self.record_node(id);
        let Some(node) = self.graph.nodes.shift_remove(id) else {
            return Err(StoreError::NodeNotFound(id.clone()));
        };
        let attached: Vec<ConnectionId> = self
            .graph
            .connections
            .values()
            .filter(|c| c.touches(id))
            .map(|c| c.id.clone())
            .collect();
        let mut connections = Vec::with_capacity(attached.len());
        for connection_id in &attached {
            self.record_connection(connection_id);
            connections.extend(self.graph.connections.shift_remove(connection_id));
        }
        for connection in connections {
            self.emit_connection(
                CanvasEventType::ConnectionDeleted,
                ConnectionEventData {
                    connection,
                    previous: None,
                },
            );
        }
        self.emit_node(
            CanvasEventType::NodeDeleted,
            NodeEventData {
                node: node.clone(),
                previous: None,
                delta: None,
            },
        );
        Ok(node)
    }

    // ── connections ─────────────────────────────────────────────────────────

    fn insert_connection(&mut self, draft: ConnectionDraft) -> Result<Connection, StoreError> {
        let mut metadata = draft.metadata.unwrap_or_default();
        metadata.create_time.get_or_insert(self.now);
        metadata.update_time = Some(self.now);
        let connection = Connection {
            id: draft.id.unwrap_or_else(ConnectionId::generate),
            source: draft.source,
            target: draft.target,
            source_port: draft.source_port,
            target_port: draft.target_port,
            label: draft.label,
            data: draft.data,
            style: draft.style,
            metadata: Some(metadata),
        };
        self.put_connection(connection)
    }

    fn put_connection(&mut self, connection: Connection) -> Result<Connection, StoreError> {
        let limit = self.config.performance.max_connections;
        if self.graph.connections.len() >= limit {
            return Err(StoreError::Capacity {
                entity: "connection",
                limit,
            });
        }
        if self.graph.connections.contains_key(&connection.id) {
            return Err(StoreError::DuplicateConnection(connection.id));
        }
        self.record_connection(&connection.id);
        self.graph
            .connections
            .insert(connection.id.clone(), connection.clone());
        self.scope.connections.push(connection.id.clone());
        self.emit_connection(
            CanvasEventType::ConnectionCreated,
            ConnectionEventData {
                connection: connection.clone(),
                previous: None,
            },
        );
        Ok(connection)
    }

    fn update_connection(&mut self, id: &ConnectionId, patch: ConnectionPatch) -> Result<Connection, StoreError> {
        let now = self.now;
        let previous = self.connection(id)?.clone();
        let mut connection = previous.clone();
        let ConnectionPatch {
            source,
            target,
            source_port,
            target_port,
            label,
            data,
            style,
            metadata,
        } = patch;
        if let Some(source) = source {
            connection.source = source;
        }
        if let Some(target) = target {
            connection.target = target;
        }
        if let Some(port) = source_port {
            connection.source_port = port;
        }
        if let Some(port) = target_port {
            connection.target_port = port;
        }
        if let Some(label) = label {
            connection.label = Some(label);
        }
        if let Some(data) = data {
            merge_maps(&mut connection.data, data);
        }
        if let Some(style) = style {
            connection.style = Some(style);
        }
        if let Some(metadata) = metadata {
            connection.metadata = Some(metadata);
        }
        connection
            .metadata
            .get_or_insert_with(ConnectionMetadata::default)
            .update_time = Some(now);

        self.record_connection(id);
        self.graph.connections.insert(id.clone(), connection.clone());
        self.scope.connections.push(id.clone());
        self.emit_connection(
            CanvasEventType::ConnectionUpdated,
            ConnectionEventData {
                connection: connection.clone(),
                previous: Some(previous),
            },
        );
        Ok(connection)
    }

    fn remove_connection(&mut self, id: &ConnectionId) -> Result<Connection, StoreError> {
        self.record_connection(id);
        let connection = self
            .graph
            .connections
            .shift_remove(id)
            .ok_or_else(|| StoreError::ConnectionNotFound(id.clone()))?;
        self.emit_connection(
            CanvasEventType::ConnectionDeleted,
            ConnectionEventData {
                connection: connection.clone(),
                previous: None,
            },
        );
        Ok(connection)
    }

    // ── whole graph ─────────────────────────────────────────────────────────

    fn clear(&mut self) {
        self.record_graph();
        let graph = core::mem::take(&mut self.graph);
        for connection in graph.connections.into_values() {
            self.emit_connection(
                CanvasEventType::ConnectionDeleted,
                ConnectionEventData {
                    connection,
                    previous: None,
                },
            );
        }
        for node in graph.nodes.into_values() {
            self.emit_node(
                CanvasEventType::NodeDeleted,
                NodeEventData {
                    node,
                    previous: None,
                    delta: None,
                },
            );
        }
        self.changed = true;
    }

    /// Swaps in a whole graph, emitting the entity events that turn the old
    /// graph into the new one.
    fn replace(&mut self, graph: Graph) -> Result<(), StoreError> {
        let limits = &self.config.performance;
        if graph.nodes.len() > limits.max_nodes {
            return Err(StoreError::Capacity {
                entity: "node",
                limit: limits.max_nodes,
            });
        }
        if graph.connections.len() > limits.max_connections {
            return Err(StoreError::Capacity {
                entity: "connection",
                limit: limits.max_connections,
            });
        }
        self.record_graph();
        let previous = core::mem::replace(&mut self.graph, graph);

        for connection in previous.connections.values() {
            if !self.graph.connections.contains_key(&connection.id) {
                self.emit_connection(
                    CanvasEventType::ConnectionDeleted,
                    ConnectionEventData {
                        connection: connection.clone(),
                        previous: None,
                    },
                );
            }
        }
        for node in previous.nodes.values() {
            if !self.graph.nodes.contains_key(&node.id) {
                self.emit_node(
                    CanvasEventType::NodeDeleted,
                    NodeEventData {
                        node: node.clone(),
                        previous: None,
                        delta: None,
                    },
                );
            }
        }
        let nodes: Vec<Node> = self.graph.nodes.values().cloned().collect();
        for node in nodes {
            match previous.nodes.get(&node.id) {
                None => self.emit_node(
                    CanvasEventType::NodeCreated,
                    NodeEventData {
                        node,
                        previous: None,
                        delta: None,
                    },
                ),
                Some(old) if *old != node => self.emit_node(
                    CanvasEventType::NodeUpdated,
                    NodeEventData {
                        node,
                        previous: Some(old.clone()),
                        delta: None,
                    },
                ),
                Some(_) => {}
            }
        }
        let connections: Vec<Connection> = self.graph.connections.values().cloned().collect();
        for connection in connections {
            match previous.connections.get(&connection.id) {
                None => self.emit_connection(
                    CanvasEventType::ConnectionCreated,
                    ConnectionEventData {
                        connection,
                        previous: None,
                    },
                ),
                Some(old) if *old != connection => self.emit_connection(
                    CanvasEventType::ConnectionUpdated,
                    ConnectionEventData {
                        connection,
                        previous: Some(old.clone()),
                    },
                ),
                Some(_) => {}
            }
        }
        self.changed = true;
        Ok(())
    }
}

/// Prior state of an entity touched by a batch item.
enum Undo {
    Node(NodeId, Option<(usize, Node)>),
    Connection(ConnectionId, Option<(usize, Connection)>),
    Graph(Graph),
}

/// Puts `key` back at `index`, or removes it if it did not exist before.
fn restore<K: Hash + Eq, V>(map: &mut IndexMap<K, V>, key: K, prior: Option<(usize, V)>) {
    match prior {
        None => {
            map.shift_remove(&key);
        }
        Some((_, value)) if map.contains_key(&key) => {
            map.insert(key, value);
        }
        Some((index, value)) => {
            map.shift_insert(index, key, value);
        }
    }
}

fn ensure_finite(values: &[f64]) -> Result<(), StoreError> {
    if values.iter().all(|v| v.is_finite()) {
        Ok(())
    } else {
        Err(StoreError::InvalidArgument(
            "coordinates and sizes must be finite numbers".to_owned(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::executor::block_on;
    use trellis_core::NodeKind;
    use trellis_core::codes;

    #[test]
    fn create_node_fills_registry_defaults() {
        let store = GraphStore::default();
        let node = block_on(store.create_node(NodeDraft::new(NodeKind::Sms).with_id("a")))
            .expect("create should succeed");
        assert_eq!(node.label.as_deref(), Some("SMS"));
        assert_eq!(node.width, Some(120.0));
        assert_eq!(node.ports.len(), 2);
        assert!(node.metadata.as_ref().is_some_and(|m| m.create_time.is_some()));
        assert_eq!(store.revision(), 1);
    }

    #[test]
    fn duplicate_node_ids_are_rejected_without_changes() {
        let store = GraphStore::default();
        block_on(store.create_node(NodeDraft::new(NodeKind::Sms).with_id("a")))
            .expect("create should succeed");
        let err = block_on(store.create_node(NodeDraft::new(NodeKind::Wait).with_id("a")))
            .expect_err("duplicate should fail");
        assert_eq!(err.code(), codes::DUPLICATE_NODE_ID);
        assert_eq!(store.revision(), 1);
        assert_eq!(store.get_node(&"a".into()).map(|n| n.kind), Ok(NodeKind::Sms));
    }

    #[test]
    fn resize_clamps_to_kind_bounds() {
        let store = GraphStore::default();
        block_on(store.create_node(NodeDraft::new(NodeKind::Sms).with_id("a")))
            .expect("create should succeed");
        let node = block_on(store.resize_node(&"a".into(), 10.0, 10_000.0)).expect("resize should succeed");
        assert_eq!(node.size(), Size::new(60.0, 320.0));
    }

    #[test]
    fn data_paths_write_nested_values() {
        let store = GraphStore::default();
        block_on(store.create_node(NodeDraft::new(NodeKind::Sms).with_id("a").with_data("keep", 1)))
            .expect("create should succeed");
        let node = block_on(store.update_node(
            &"a".into(),
            NodePatch::new().data_path("template.body", "hi"),
        ))
        .expect("update should succeed");
        assert_eq!(node.data["keep"], serde_json::json!(1));
        assert_eq!(node.data["template"]["body"], serde_json::json!("hi"));
    }

    #[test]
    fn non_finite_positions_are_invalid_arguments() {
        let store = GraphStore::default();
        let err = block_on(store.create_node(NodeDraft::new(NodeKind::Sms).at(f64::NAN, 0.0)))
            .expect_err("nan should be rejected");
        assert_eq!(err.code(), codes::INVALID_ARGUMENT);
    }

    #[test]
    fn view_mode_rejects_mutations() {
        let store = GraphStore::default();
        block_on(store.set_mode(CanvasMode::View));
        let err = block_on(store.create_node(NodeDraft::new(NodeKind::Sms)))
            .expect_err("view mode is read-only");
        assert_eq!(err, StoreError::ReadOnly);
    }

    #[test]
    fn capacity_limits_apply_to_creates() {
        let store = GraphStore::new(CanvasConfig::default().with_capacity(1, 10));
        block_on(store.create_node(NodeDraft::new(NodeKind::Sms))).expect("first fits");
        let err = block_on(store.create_node(NodeDraft::new(NodeKind::Sms)))
            .expect_err("second exceeds the limit");
        assert_eq!(err.code(), codes::CAPACITY_EXCEEDED);
    }

    #[test]
    fn start_nodes_need_force_to_delete() {
        let store = GraphStore::default();
        block_on(store.create_node(NodeDraft::new(NodeKind::Start).with_id("s")))
            .expect("create should succeed");
        let err = block_on(store.delete_node(&"s".into(), false)).expect_err("start is protected");
        assert_eq!(err.code(), codes::NOT_DELETABLE);
        block_on(store.delete_node(&"s".into(), true)).expect("forced delete succeeds");
        assert!(store.all_nodes().is_empty());
    }

    #[test]
    fn zoom_to_keeps_center_fixed() {
        let store = GraphStore::default();
        let before = store.viewport();
        let center = Position::new(200.0, 100.0);
        let anchor = before.screen_to_canvas(center);
        let after = block_on(store.zoom_to(2.0, Some(center)));
        assert_eq!(after.zoom, 2.0);
        assert_eq!(after.canvas_to_screen(anchor), center);
        let clamped = block_on(store.zoom_to(100.0, None));
        assert_eq!(clamped.zoom, 4.0);
    }

    #[test]
    fn fit_to_content_shows_every_node() {
        let store = GraphStore::default();
        for (id, x) in [("a", 0.0), ("b", 2000.0)] {
            block_on(store.create_node(NodeDraft::new(NodeKind::Sms).with_id(id).at(x, 0.0)))
                .expect("create should succeed");
        }
        let viewport = block_on(store.fit_to_content(20.0));
        let bounds = store.canvas_bounds().expect("non-empty canvas");
        assert!(viewport.visible_area().contains_rect(&bounds));
    }

    #[test]
    fn connection_path_is_orthogonal() {
        let store = GraphStore::default();
        block_on(store.create_nodes(vec![
            NodeDraft::new(NodeKind::Sms).with_id("a").at(0.0, 0.0),
            NodeDraft::new(NodeKind::Wait).with_id("b").at(200.0, 200.0),
        ]));
        let connection = block_on(store.create_connection(ConnectionDraft::new("a", "b").with_id("c")))
            .expect("connect should succeed");
        let path = store.connection_path(&connection.id).expect("path exists");
        assert_eq!(path.first(), Some(&Position::new(60.0, 80.0)));
        assert_eq!(path.last(), Some(&Position::new(260.0, 200.0)));
        for pair in path.windows(2) {
            assert!(pair[0].x == pair[1].x || pair[0].y == pair[1].y);
        }
    }

    #[test]
    fn snap_position_respects_threshold() {
        let mut config = CanvasConfig::default();
        config.snap.threshold = 3.0;
        let store = GraphStore::new(config);
        assert_eq!(store.snap_position(Position::new(41.0, 50.0)), Position::new(40.0, 50.0));
    }
}
