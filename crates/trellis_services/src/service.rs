//! The service boundary.
//!
//! These traits are the only contract a presentation layer calls. Every
//! method reports failure through [`OperationResult`] or
//! [`BatchOperationResult`] with a stable code from [`trellis_core::codes`];
//! nothing is raised across the boundary. Calls made before
//! [`Service::initialize`] or after [`Service::destroy`] fail with
//! [`codes::NOT_READY`](trellis_core::codes::NOT_READY).
//!
//! [`Canvas`](crate::Canvas) implements every trait over one shared store.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use trellis_core::canvas::{CanvasMode, Viewport};
use trellis_core::config::LayoutAlgorithm;
use trellis_core::connection::{ConnectionDraft, ConnectionPatch};
use trellis_core::geometry::{Position, Rectangle, Size};
use trellis_core::graph::ConnectionDirection;
use trellis_core::node::{NodeDraft, NodePatch};
use trellis_core::{
    BatchOperationResult, CanvasSnapshot, CanvasState, Connection, ConnectionId, Node, NodeId, OperationResult,
    SnapshotId,
};
use trellis_events::{CanvasEvent, SubscriptionId};
use trellis_graph::{Query, QueryResult, SelectionOutcome};
use trellis_layout::{Alignment, Distribution, LayoutOptions, LayoutReport};
use trellis_validation::ValidationResult;
use trellis_validation::rule::{RuleInfo, ValidationRule};

use crate::performance::{MemoryUsage, PerformanceMetrics, RenderEstimate};
use crate::storage::CanvasSummary;
use crate::transfer::{ExportFormat, ExportOptions, ImportFormat, ImportOptions, ImportReport};

/// Callback registered through [`EventService::subscribe`].
pub type EventHandler = Arc<dyn Fn(&CanvasEvent) + Send + Sync>;

/// Lifecycle shared by every service.
#[async_trait]
pub trait Service: Send + Sync {
    /// Makes the service usable. Calling it again is a no-op.
    async fn initialize(&self) -> OperationResult<()>;

    /// Releases subscriptions. The service cannot be initialized again.
    async fn destroy(&self) -> OperationResult<()>;

    /// Whether calls are accepted.
    fn is_ready(&self) -> bool;
}

// ─────────────────────────────────────────────────────────────────────────────
// Entities
// ─────────────────────────────────────────────────────────────────────────────

/// Node CRUD and geometry.
#[async_trait]
pub trait NodeService: Service {
    /// Creates one node.
    async fn create_node(&self, draft: NodeDraft) -> OperationResult<Node>;
    /// Creates nodes one commit each; failures do not stop the batch.
    async fn create_nodes(&self, drafts: Vec<NodeDraft>) -> BatchOperationResult<Node>;
    /// Fetches one node.
    async fn get_node(&self, id: &NodeId) -> OperationResult<Node>;
    /// Fetches the nodes that exist among `ids`.
    async fn get_nodes(&self, ids: &[NodeId]) -> OperationResult<Vec<Node>>;
    /// Every node, in insertion order.
    async fn get_all_nodes(&self) -> OperationResult<Vec<Node>>;
    /// Applies a patch.
    async fn update_node(&self, id: &NodeId, patch: NodePatch) -> OperationResult<Node>;
    /// Applies patches one commit each.
    async fn update_nodes(&self, updates: Vec<(NodeId, NodePatch)>) -> BatchOperationResult<Node>;
    /// Deletes a node and its connections. `force` overrides non-deletable kinds.
    async fn delete_node(&self, id: &NodeId, force: bool) -> OperationResult<bool>;
    /// Deletes nodes one commit each.
    async fn delete_nodes(&self, ids: &[NodeId], force: bool) -> BatchOperationResult<bool>;
    /// Filters, sorts and pages nodes.
    async fn query_nodes(&self, query: &Query) -> OperationResult<QueryResult<Node>>;
    /// Dry-runs a creation and reports what would block it.
    async fn validate_node_draft(&self, draft: &NodeDraft) -> OperationResult<ValidationResult>;
    /// Copies a node, offset or placed at `position`.
    async fn clone_node(&self, id: &NodeId, position: Option<Position>) -> OperationResult<Node>;
    /// Moves a node.
    async fn move_node(&self, id: &NodeId, position: Position) -> OperationResult<Node>;
    /// Resizes a node.
    async fn resize_node(&self, id: &NodeId, size: Size) -> OperationResult<Node>;
}

/// Connection CRUD and routing.
#[async_trait]
pub trait ConnectionService: Service {
    /// Creates one connection.
    async fn create_connection(&self, draft: ConnectionDraft) -> OperationResult<Connection>;
    /// Creates connections one commit each.
    async fn create_connections(&self, drafts: Vec<ConnectionDraft>) -> BatchOperationResult<Connection>;
    /// Fetches one connection.
    async fn get_connection(&self, id: &ConnectionId) -> OperationResult<Connection>;
    /// Fetches the connections that exist among `ids`.
    async fn get_connections(&self, ids: &[ConnectionId]) -> OperationResult<Vec<Connection>>;
    /// Every connection, in insertion order.
    async fn get_all_connections(&self) -> OperationResult<Vec<Connection>>;
    /// Connections touching a node.
    async fn get_node_connections(
        &self,
        id: &NodeId,
        direction: ConnectionDirection,
    ) -> OperationResult<Vec<Connection>>;
    /// Applies a patch.
    async fn update_connection(&self, id: &ConnectionId, patch: ConnectionPatch) -> OperationResult<Connection>;
    /// Applies patches one commit each.
    async fn update_connections(
        &self,
        updates: Vec<(ConnectionId, ConnectionPatch)>,
    ) -> BatchOperationResult<Connection>;
    /// Deletes one connection.
    async fn delete_connection(&self, id: &ConnectionId) -> OperationResult<bool>;
    /// Deletes connections one commit each.
    async fn delete_connections(&self, ids: &[ConnectionId]) -> BatchOperationResult<bool>;
    /// Deletes every connection touching a node, in one commit.
    async fn delete_node_connections(&self, id: &NodeId) -> OperationResult<bool>;
    /// Filters, sorts and pages connections.
    async fn query_connections(&self, query: &Query) -> OperationResult<QueryResult<Connection>>;
    /// Dry-runs a creation and reports what would block it.
    async fn validate_connection_draft(&self, draft: &ConnectionDraft) -> OperationResult<ValidationResult>;
    /// Whether a plain connection between two nodes would be accepted.
    async fn is_valid_connection(&self, source: &NodeId, target: &NodeId) -> OperationResult<bool>;
    /// Anchor points of a connection, source first.
    async fn get_connection_path(&self, id: &ConnectionId) -> OperationResult<Vec<Position>>;
}

// ─────────────────────────────────────────────────────────────────────────────
// Canvas, history, selection
// ─────────────────────────────────────────────────────────────────────────────

/// Whole-canvas state and viewport.
#[async_trait]
pub trait CanvasService: Service {
    /// Nodes, connections, viewport, selection and mode.
    async fn get_canvas_state(&self) -> OperationResult<CanvasState>;
    /// Replaces the state in one commit.
    async fn update_canvas_state(&self, state: CanvasState) -> OperationResult<CanvasState>;
    /// Clears the canvas and resets the viewport.
    async fn reset_canvas(&self) -> OperationResult<bool>;
    /// Deletes every node and connection in one commit.
    async fn clear_canvas(&self) -> OperationResult<bool>;
    /// Zooms and pans so all content is visible.
    async fn fit_canvas(&self) -> OperationResult<Viewport>;
    /// Pans so the content is centered.
    async fn center_canvas(&self) -> OperationResult<Viewport>;
    /// Sets the zoom, keeping `center` fixed on screen.
    async fn zoom_canvas(&self, scale: f64, center: Option<Position>) -> OperationResult<Viewport>;
    /// Moves the viewport by a screen offset.
    async fn pan_canvas(&self, offset: Position) -> OperationResult<Viewport>;
    /// Bounding box of all nodes; empty at the origin for an empty canvas.
    async fn get_canvas_bounds(&self) -> OperationResult<Rectangle>;
    /// Converts a screen point.
    async fn screen_to_canvas(&self, point: Position) -> OperationResult<Position>;
    /// Converts a canvas point.
    async fn canvas_to_screen(&self, point: Position) -> OperationResult<Position>;
    /// Switches the interaction mode.
    async fn set_mode(&self, mode: CanvasMode) -> OperationResult<CanvasMode>;
}

/// Undo, redo and named snapshots.
#[async_trait]
pub trait HistoryService: Service {
    /// Records a named snapshot of the current state.
    async fn create_snapshot(&self, description: Option<&str>) -> OperationResult<Arc<CanvasSnapshot>>;
    /// Finds a snapshot in the named list or the timeline.
    async fn get_snapshot(&self, id: &SnapshotId) -> OperationResult<Arc<CanvasSnapshot>>;
    /// Named snapshots followed by the timeline.
    async fn get_all_snapshots(&self) -> OperationResult<Vec<Arc<CanvasSnapshot>>>;
    /// Removes a snapshot other than the present one.
    async fn delete_snapshot(&self, id: &SnapshotId) -> OperationResult<bool>;
    /// Adopts a snapshot as the new present.
    async fn restore_snapshot(&self, id: &SnapshotId) -> OperationResult<bool>;
    /// Steps back.
    async fn undo(&self) -> OperationResult<bool>;
    /// Steps forward.
    async fn redo(&self) -> OperationResult<bool>;
    /// Whether there is something to undo.
    async fn can_undo(&self) -> OperationResult<bool>;
    /// Whether there is something to redo.
    async fn can_redo(&self) -> OperationResult<bool>;
    /// Drops past and future.
    async fn clear_history(&self) -> OperationResult<bool>;
    /// Number of timeline entries.
    async fn get_history_size(&self) -> OperationResult<usize>;
}

/// Selection of nodes and connections.
#[async_trait]
pub trait SelectionService: Service {
    /// Selects nodes; `multiple` adds to the current selection.
    async fn select_nodes(&self, ids: &[NodeId], multiple: bool) -> OperationResult<SelectionOutcome>;
    /// Selects connections; `multiple` adds to the current selection.
    async fn select_connections(&self, ids: &[ConnectionId], multiple: bool) -> OperationResult<SelectionOutcome>;
    /// Selects everything.
    async fn select_all(&self) -> OperationResult<SelectionOutcome>;
    /// Empties the selection. Returns whether anything was selected.
    async fn clear_selection(&self) -> OperationResult<bool>;
    /// Selects exactly what is not selected.
    async fn invert_selection(&self) -> OperationResult<SelectionOutcome>;
    /// Selected nodes.
    async fn get_selected_nodes(&self) -> OperationResult<Vec<Node>>;
    /// Selected connections.
    async fn get_selected_connections(&self) -> OperationResult<Vec<Connection>>;
    /// Whether a node is selected.
    async fn is_node_selected(&self, id: &NodeId) -> OperationResult<bool>;
    /// Whether a connection is selected.
    async fn is_connection_selected(&self, id: &ConnectionId) -> OperationResult<bool>;
    /// Selects nodes lying entirely inside `area`.
    async fn select_by_area(&self, area: Rectangle, multiple: bool) -> OperationResult<SelectionOutcome>;
}

// ─────────────────────────────────────────────────────────────────────────────
// Layout and validation
// ─────────────────────────────────────────────────────────────────────────────

/// Automatic placement and arrangement.
#[async_trait]
pub trait LayoutService: Service {
    /// Runs `algorithm`, or the configured one.
    async fn auto_layout(
        &self,
        algorithm: Option<LayoutAlgorithm>,
        options: Option<&LayoutOptions>,
    ) -> OperationResult<LayoutReport>;
    /// Aligns nodes to a shared edge or center line.
    async fn align_nodes(&self, ids: &[NodeId], alignment: Alignment) -> OperationResult<LayoutReport>;
    /// Spaces nodes evenly between the outermost two.
    async fn distribute_nodes(&self, ids: &[NodeId], distribution: Distribution) -> OperationResult<LayoutReport>;
    /// Sets a fixed gap between consecutive nodes.
    async fn adjust_spacing(&self, ids: &[NodeId], spacing: f64) -> OperationResult<LayoutReport>;
    /// Layered layout.
    async fn hierarchical_layout(&self, options: Option<&LayoutOptions>) -> OperationResult<LayoutReport>;
    /// Force-directed layout.
    async fn force_layout(&self, options: Option<&LayoutOptions>) -> OperationResult<LayoutReport>;
    /// Circular layout.
    async fn circular_layout(&self, options: Option<&LayoutOptions>) -> OperationResult<LayoutReport>;
    /// Grid layout.
    async fn grid_layout(&self, options: Option<&LayoutOptions>) -> OperationResult<LayoutReport>;
    /// Algorithms ranked for the current graph.
    async fn get_layout_suggestions(&self) -> OperationResult<Vec<LayoutAlgorithm>>;
}

/// Rule-based and workflow validation.
#[async_trait]
pub trait ValidationService: Service {
    /// Validates the whole canvas and publishes the findings.
    async fn validate_canvas(&self) -> OperationResult<ValidationResult>;
    /// Validates one node.
    async fn validate_node(&self, id: &NodeId) -> OperationResult<ValidationResult>;
    /// Validates one connection.
    async fn validate_connection(&self, id: &ConnectionId) -> OperationResult<ValidationResult>;
    /// Checks the marketing-flow shape.
    async fn validate_workflow(&self) -> OperationResult<ValidationResult>;
    /// Registered rules.
    async fn get_validation_rules(&self) -> OperationResult<Vec<RuleInfo>>;
    /// Registers a rule.
    async fn add_validation_rule(&self, rule: ValidationRule) -> OperationResult<bool>;
    /// Removes a custom rule.
    async fn remove_validation_rule(&self, id: &str) -> OperationResult<bool>;
    /// Turns a rule on.
    async fn enable_validation_rule(&self, id: &str) -> OperationResult<bool>;
    /// Turns a rule off.
    async fn disable_validation_rule(&self, id: &str) -> OperationResult<bool>;
}

// ─────────────────────────────────────────────────────────────────────────────
// Documents, storage, events, performance
// ─────────────────────────────────────────────────────────────────────────────

/// Import and export.
#[async_trait]
pub trait ImportExportService: Service {
    /// Exports the canvas.
    async fn export_canvas(&self, options: &ExportOptions) -> OperationResult<String>;
    /// Imports a document, replacing or merging.
    async fn import_canvas(&self, data: &str, options: &ImportOptions) -> OperationResult<ImportReport>;
    /// Exports some nodes and the connections between them.
    async fn export_nodes(&self, ids: &[NodeId], options: &ExportOptions) -> OperationResult<String>;
    /// Adds the nodes of a document.
    async fn import_nodes(&self, data: &str, options: &ImportOptions) -> OperationResult<Vec<Node>>;
    /// Exports some connections.
    async fn export_connections(&self, ids: &[ConnectionId], options: &ExportOptions) -> OperationResult<String>;
    /// Adds the connections of a document.
    async fn import_connections(&self, data: &str, options: &ImportOptions) -> OperationResult<Vec<Connection>>;
    /// Formats the engine writes.
    async fn get_supported_export_formats(&self) -> OperationResult<Vec<ExportFormat>>;
    /// Formats the engine reads.
    async fn get_supported_import_formats(&self) -> OperationResult<Vec<ImportFormat>>;
}

/// Persistence.
#[async_trait]
pub trait StorageService: Service {
    /// Saves the canvas and returns its storage id.
    async fn save_canvas(&self, name: Option<&str>) -> OperationResult<String>;
    /// Replaces the canvas with a stored one.
    async fn load_canvas(&self, id: &str) -> OperationResult<CanvasState>;
    /// Deletes a stored canvas.
    async fn delete_canvas(&self, id: &str) -> OperationResult<bool>;
    /// Lists stored canvases.
    async fn get_canvas_list(&self) -> OperationResult<Vec<CanvasSummary>>;
    /// Saves if auto-save is due. Returns whether it saved.
    async fn auto_save_canvas(&self) -> OperationResult<bool>;
    /// Sets the auto-save interval.
    async fn set_auto_save_interval(&self, interval_ms: u64) -> OperationResult<bool>;
    /// Turns auto-save on.
    async fn enable_auto_save(&self) -> OperationResult<bool>;
    /// Turns auto-save off.
    async fn disable_auto_save(&self) -> OperationResult<bool>;
    /// Whether the canvas changed since the last save or load.
    async fn has_unsaved_changes(&self) -> OperationResult<bool>;
}

/// Access to the canvas event bus.
#[async_trait]
pub trait EventService: Service {
    /// Registers a handler for an event name, or `"*"` for all.
    async fn subscribe(&self, event_type: &str, handler: EventHandler) -> OperationResult<SubscriptionId>;
    /// Removes a handler. Returns whether it was registered.
    async fn unsubscribe(&self, id: &SubscriptionId) -> OperationResult<bool>;
    /// Emits a caller-defined event.
    async fn publish(&self, event_type: &str, data: Value) -> OperationResult<bool>;
    /// Recorded events, newest last.
    async fn get_event_history(&self, event_type: Option<&str>, limit: Option<usize>)
    -> OperationResult<Vec<CanvasEvent>>;
    /// Drops recorded events.
    async fn clear_event_history(&self) -> OperationResult<bool>;
    /// Starts recording events.
    async fn enable_event_logging(&self) -> OperationResult<bool>;
    /// Stops recording events.
    async fn disable_event_logging(&self) -> OperationResult<bool>;
}

/// Marks, measures and engine-side estimates.
#[async_trait]
pub trait PerformanceService: Service {
    /// Counts commits and layout runs from the bus.
    async fn start_monitoring(&self) -> OperationResult<bool>;
    /// Stops counting.
    async fn stop_monitoring(&self) -> OperationResult<bool>;
    /// Current counters.
    async fn get_metrics(&self) -> OperationResult<PerformanceMetrics>;
    /// Clears marks, measures and counters.
    async fn reset_metrics(&self) -> OperationResult<bool>;
    /// Records the clock under `name`.
    async fn mark(&self, name: &str) -> OperationResult<bool>;
    /// Milliseconds between two marks, or a mark and now.
    async fn measure(&self, name: &str, start: &str, end: Option<&str>) -> OperationResult<f64>;
    /// Estimated graph memory.
    async fn get_memory_usage(&self) -> OperationResult<MemoryUsage>;
    /// What the current viewport shows.
    async fn get_render_performance(&self) -> OperationResult<RenderEstimate>;
    /// Warns about limits close to capacity.
    async fn check_thresholds(&self) -> OperationResult<Vec<String>>;
}
