//! The [`Canvas`] facade: one store, one bus, every service.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use serde_json::Value;
use trellis_core::canvas::{CanvasMode, Viewport};
use trellis_core::clock::{SharedClock, SystemClock};
use trellis_core::config::LayoutAlgorithm;
use trellis_core::connection::{ConnectionDraft, ConnectionPatch};
use trellis_core::geometry::{Position, Rectangle, Size};
use trellis_core::graph::ConnectionDirection;
use trellis_core::node::{NodeDraft, NodePatch};
use trellis_core::registry::NodeTypeRegistry;
use trellis_core::{
    BatchOperationResult, CanvasConfig, CanvasSnapshot, CanvasState, Connection, ConnectionId, ErrorCode, Node,
    NodeId, OperationError, OperationResult, SnapshotId,
};
use trellis_events::{CanvasEvent, CanvasEventType, EventBus, EventPayload, SubscriptionId};
use trellis_graph::{GraphStore, HistoryManager, Query, QueryResult, SelectionManager, SelectionOutcome, StoreError};
use trellis_layout::{Alignment, Distribution, LayoutEngine, LayoutOptions, LayoutReport};
use trellis_validation::rule::{RuleInfo, ValidationRule};
use trellis_validation::{ValidationEngine, ValidationIssue, ValidationResult};

use crate::error::ServiceError;
use crate::performance::{MemoryUsage, PerformanceMetrics, PerformanceMonitor, RenderEstimate};
use crate::service::{
    CanvasService, ConnectionService, EventHandler, EventService, HistoryService, ImportExportService,
    LayoutService, NodeService, PerformanceService, SelectionService, Service, StorageService, ValidationService,
};
use crate::storage::{CanvasStorage, CanvasSummary, MemoryStorage, StorageManager};
use crate::transfer::{ExportFormat, ExportOptions, ImportFormat, ImportOptions, ImportReport, TransferManager};

const SOURCE: &str = "canvas";

/// Padding kept around content by [`CanvasService::fit_canvas`].
pub const FIT_PADDING: f64 = 50.0;

/// Returns early with a `NOT_READY` failure unless the canvas accepts calls.
macro_rules! ensure_ready {
    ($canvas:expr) => {
        if let Err(err) = $canvas.readiness() {
            return OperationResult::fail(OperationError::from_error(&err));
        }
    };
    ($canvas:expr, batch) => {
        if let Err(err) = $canvas.readiness() {
            return BatchOperationResult::from_results(vec![OperationResult::fail(OperationError::from_error(&err))]);
        }
    };
}

// ─────────────────────────────────────────────────────────────────────────────
// CanvasBuilder
// ─────────────────────────────────────────────────────────────────────────────

/// Assembles a [`Canvas`] from optional collaborators.
///
/// ```
/// use trellis_core::CanvasConfig;
/// use trellis_core::clock::ManualClock;
/// use trellis_services::Canvas;
///
/// let canvas = Canvas::builder()
///     .config(CanvasConfig::default())
///     .clock(ManualClock::new(0).shared())
///     .build();
/// assert_eq!(canvas.store().revision(), 0);
/// ```
#[derive(Default)]
pub struct CanvasBuilder {
    config: CanvasConfig,
    clock: Option<SharedClock>,
    storage: Option<Arc<dyn CanvasStorage>>,
    registry: Option<NodeTypeRegistry>,
}

impl fmt::Debug for CanvasBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CanvasBuilder")
            .field("config", &self.config)
            .field("custom_clock", &self.clock.is_some())
            .field("custom_storage", &self.storage.is_some())
            .field("custom_registry", &self.registry.is_some())
            .finish()
    }
}

impl CanvasBuilder {
    /// Sets the configuration.
    #[must_use]
    pub fn config(mut self, config: CanvasConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the clock. Defaults to the system clock.
    #[must_use]
    pub fn clock(mut self, clock: SharedClock) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Sets the storage backend. Defaults to [`MemoryStorage`].
    #[must_use]
    pub fn storage(mut self, storage: Arc<dyn CanvasStorage>) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Sets the node type registry. Defaults to the built-in kinds.
    #[must_use]
    pub fn registry(mut self, registry: NodeTypeRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Wires the store, bus, validator and managers together.
    #[must_use]
    pub fn build(self) -> Canvas {
        let clock = self.clock.unwrap_or_else(SystemClock::shared);
        let bus = EventBus::with_config(&self.config.events, Arc::clone(&clock));
        let validator = Arc::new(match self.registry {
            Some(registry) => ValidationEngine::with_registry(&self.config, registry),
            None => ValidationEngine::new(&self.config),
        });
        let store = Arc::new(GraphStore::with_parts(self.config, bus, validator, clock));
        let backend = self
            .storage
            .unwrap_or_else(|| Arc::new(MemoryStorage::new()) as Arc<dyn CanvasStorage>);
        Canvas {
            history: HistoryManager::new(Arc::clone(&store)),
            selection: SelectionManager::new(Arc::clone(&store)),
            layout: LayoutEngine::new(Arc::clone(&store)),
            transfer: TransferManager::new(Arc::clone(&store)),
            storage: StorageManager::new(Arc::clone(&store), backend),
            performance: PerformanceMonitor::new(Arc::clone(&store)),
            store,
            ready: AtomicBool::new(false),
            destroyed: AtomicBool::new(false),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Canvas
// ─────────────────────────────────────────────────────────────────────────────

/// A marketing-task canvas.
///
/// Owns the store and every manager built on it, and implements each service
/// trait. Nothing is global: two canvases never share state.
pub struct Canvas {
    store: Arc<GraphStore>,
    history: Arc<HistoryManager>,
    selection: SelectionManager,
    layout: LayoutEngine,
    transfer: TransferManager,
    storage: StorageManager,
    performance: PerformanceMonitor,
    ready: AtomicBool,
    destroyed: AtomicBool,
}

impl fmt::Debug for Canvas {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Canvas")
            .field("revision", &self.store.revision())
            .field("ready", &self.ready.load(Ordering::SeqCst))
            .field("destroyed", &self.destroyed.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

impl Default for Canvas {
    fn default() -> Self {
        Self::new(CanvasConfig::default())
    }
}

impl Canvas {
    /// A canvas with the system clock and in-memory storage.
    #[must_use]
    pub fn new(config: CanvasConfig) -> Self {
        Self::builder().config(config).build()
    }

    /// Starts a [`CanvasBuilder`].
    #[must_use]
    pub fn builder() -> CanvasBuilder {
        CanvasBuilder::default()
    }

    /// The shared store.
    #[must_use]
    pub fn store(&self) -> &Arc<GraphStore> {
        &self.store
    }

    /// The store's event bus.
    #[must_use]
    pub fn bus(&self) -> &EventBus {
        self.store.bus()
    }

    /// The history manager.
    #[must_use]
    pub fn history(&self) -> &Arc<HistoryManager> {
        &self.history
    }

    /// The selection manager.
    #[must_use]
    pub fn selection(&self) -> &SelectionManager {
        &self.selection
    }

    /// The layout engine.
    #[must_use]
    pub fn layout(&self) -> &LayoutEngine {
        &self.layout
    }

    /// Import and export.
    #[must_use]
    pub fn transfer(&self) -> &TransferManager {
        &self.transfer
    }

    /// Save and load.
    #[must_use]
    pub fn storage(&self) -> &StorageManager {
        &self.storage
    }

    /// Marks, measures and counters.
    #[must_use]
    pub fn performance(&self) -> &PerformanceMonitor {
        &self.performance
    }

    fn readiness(&self) -> Result<(), ServiceError> {
        if self.destroyed.load(Ordering::SeqCst) {
            Err(ServiceError::Destroyed)
        } else if self.ready.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(ServiceError::NotReady)
        }
    }

    async fn lifecycle(&self, kind: CanvasEventType) {
        let event = CanvasEvent::new(kind, EventPayload::Empty).from_source(SOURCE);
        self.store.bus().emit(event).await;
    }
}

fn invalid<T>(message: impl Into<String>) -> OperationResult<T> {
    OperationResult::fail(OperationError::from_error(&ServiceError::InvalidArgument(message.into())))
}

fn acknowledge<T>(batch: BatchOperationResult<T>) -> BatchOperationResult<bool> {
    batch.results.into_iter().map(|result| result.map(|_| true)).collect()
}

/// Turns a dry-run outcome into findings.
fn draft_findings(outcome: Result<(), StoreError>) -> ValidationResult {
    match outcome {
        Ok(()) => ValidationResult::new(),
        Err(StoreError::Validation(issues)) => issues.into_iter().collect(),
        Err(err) => std::iter::once(ValidationIssue::new("store", err.code(), "", err.to_string())).collect(),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Lifecycle
// ─────────────────────────────────────────────────────────────────────────────

#[async_trait]
impl Service for Canvas {
    async fn initialize(&self) -> OperationResult<()> {
        if self.destroyed.load(Ordering::SeqCst) {
            return OperationResult::fail(OperationError::from_error(&ServiceError::Destroyed));
        }
        if self.ready.swap(true, Ordering::SeqCst) {
            return OperationResult::ok(());
        }
        self.lifecycle(CanvasEventType::CanvasInitialized).await;
        self.lifecycle(CanvasEventType::CanvasReady).await;
        tracing::info!(revision = self.store.revision(), "canvas ready");
        OperationResult::ok(())
    }

    async fn destroy(&self) -> OperationResult<()> {
        if self.destroyed.swap(true, Ordering::SeqCst) {
            return OperationResult::ok(());
        }
        self.ready.store(false, Ordering::SeqCst);
        self.performance.stop_monitoring();
        self.lifecycle(CanvasEventType::CanvasDestroyed).await;
        self.store.bus().destroy();
        tracing::info!("canvas destroyed");
        OperationResult::ok(())
    }

    fn is_ready(&self) -> bool {
        self.readiness().is_ok()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Nodes & connections
// ─────────────────────────────────────────────────────────────────────────────

#[async_trait]
impl NodeService for Canvas {
    async fn create_node(&self, draft: NodeDraft) -> OperationResult<Node> {
        ensure_ready!(self);
        OperationResult::from_result(self.store.create_node(draft).await)
    }

    async fn create_nodes(&self, drafts: Vec<NodeDraft>) -> BatchOperationResult<Node> {
        ensure_ready!(self, batch);
        self.store.create_nodes(drafts).await
    }

    async fn get_node(&self, id: &NodeId) -> OperationResult<Node> {
        ensure_ready!(self);
        OperationResult::from_result(self.store.get_node(id))
    }

    async fn get_nodes(&self, ids: &[NodeId]) -> OperationResult<Vec<Node>> {
        ensure_ready!(self);
        OperationResult::ok(self.store.get_nodes(ids))
    }

    async fn get_all_nodes(&self) -> OperationResult<Vec<Node>> {
        ensure_ready!(self);
        OperationResult::ok(self.store.all_nodes())
    }

    async fn update_node(&self, id: &NodeId, patch: NodePatch) -> OperationResult<Node> {
        ensure_ready!(self);
        OperationResult::from_result(self.store.update_node(id, patch).await)
    }

    async fn update_nodes(&self, updates: Vec<(NodeId, NodePatch)>) -> BatchOperationResult<Node> {
        ensure_ready!(self, batch);
        self.store.update_nodes(updates).await
    }

    async fn delete_node(&self, id: &NodeId, force: bool) -> OperationResult<bool> {
        ensure_ready!(self);
        OperationResult::from_result(self.store.delete_node(id, force).await.map(|_| true))
    }

    async fn delete_nodes(&self, ids: &[NodeId], force: bool) -> BatchOperationResult<bool> {
        ensure_ready!(self, batch);
        acknowledge(self.store.delete_nodes(ids, force).await)
    }

    async fn query_nodes(&self, query: &Query) -> OperationResult<QueryResult<Node>> {
        ensure_ready!(self);
        OperationResult::from_result(self.store.query_nodes(query))
    }

    async fn validate_node_draft(&self, draft: &NodeDraft) -> OperationResult<ValidationResult> {
        ensure_ready!(self);
        OperationResult::ok(draft_findings(self.store.check_node(draft)))
    }

    async fn clone_node(&self, id: &NodeId, position: Option<Position>) -> OperationResult<Node> {
        ensure_ready!(self);
        let offset = match position {
            Some(target) => match self.store.get_node(id) {
                Ok(source) => Some(Position::new(target.x - source.x, target.y - source.y)),
                Err(err) => return OperationResult::fail(OperationError::from_error(&err)),
            },
            None => None,
        };
        OperationResult::from_result(self.store.clone_node(id, offset).await)
    }

    async fn move_node(&self, id: &NodeId, position: Position) -> OperationResult<Node> {
        ensure_ready!(self);
        OperationResult::from_result(self.store.move_node(id, position.x, position.y).await)
    }

    async fn resize_node(&self, id: &NodeId, size: Size) -> OperationResult<Node> {
        ensure_ready!(self);
        OperationResult::from_result(self.store.resize_node(id, size.width, size.height).await)
    }
}

#[async_trait]
impl ConnectionService for Canvas {
    async fn create_connection(&self, draft: ConnectionDraft) -> OperationResult<Connection> {
        ensure_ready!(self);
        OperationResult::from_result(self.store.create_connection(draft).await)
    }

    async fn create_connections(&self, drafts: Vec<ConnectionDraft>) -> BatchOperationResult<Connection> {
        ensure_ready!(self, batch);
        self.store.create_connections(drafts).await
    }

    async fn get_connection(&self, id: &ConnectionId) -> OperationResult<Connection> {
        ensure_ready!(self);
        OperationResult::from_result(self.store.get_connection(id))
    }

    async fn get_connections(&self, ids: &[ConnectionId]) -> OperationResult<Vec<Connection>> {
        ensure_ready!(self);
        OperationResult::ok(self.store.get_connections(ids))
    }

    async fn get_all_connections(&self) -> OperationResult<Vec<Connection>> {
        ensure_ready!(self);
        OperationResult::ok(self.store.all_connections())
    }

    async fn get_node_connections(
        &self,
        id: &NodeId,
        direction: ConnectionDirection,
    ) -> OperationResult<Vec<Connection>> {
        ensure_ready!(self);
        OperationResult::from_result(self.store.get_node_connections(id, direction))
    }

    async fn update_connection(&self, id: &ConnectionId, patch: ConnectionPatch) -> OperationResult<Connection> {
        ensure_ready!(self);
        OperationResult::from_result(self.store.update_connection(id, patch).await)
    }

    async fn update_connections(
        &self,
        updates: Vec<(ConnectionId, ConnectionPatch)>,
    ) -> BatchOperationResult<Connection> {
        ensure_ready!(self, batch);
        self.store.update_connections(updates).await
    }

    async fn delete_connection(&self, id: &ConnectionId) -> OperationResult<bool> {
        ensure_ready!(self);
        OperationResult::from_result(self.store.delete_connection(id).await.map(|_| true))
    }

    async fn delete_connections(&self, ids: &[ConnectionId]) -> BatchOperationResult<bool> {
        ensure_ready!(self, batch);
        acknowledge(self.store.delete_connections(ids).await)
    }

    async fn delete_node_connections(&self, id: &NodeId) -> OperationResult<bool> {
        ensure_ready!(self);
        OperationResult::from_result(self.store.delete_node_connections(id).await.map(|_| true))
    }

    async fn query_connections(&self, query: &Query) -> OperationResult<QueryResult<Connection>> {
        ensure_ready!(self);
        OperationResult::from_result(self.store.query_connections(query))
    }

    async fn validate_connection_draft(&self, draft: &ConnectionDraft) -> OperationResult<ValidationResult> {
        ensure_ready!(self);
        OperationResult::ok(draft_findings(self.store.check_connection(draft)))
    }

    async fn is_valid_connection(&self, source: &NodeId, target: &NodeId) -> OperationResult<bool> {
        ensure_ready!(self);
        OperationResult::ok(self.store.is_valid_connection(source, target))
    }

    async fn get_connection_path(&self, id: &ConnectionId) -> OperationResult<Vec<Position>> {
        ensure_ready!(self);
        OperationResult::from_result(self.store.connection_path(id))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Canvas, history, selection
// ─────────────────────────────────────────────────────────────────────────────

#[async_trait]
impl CanvasService for Canvas {
    async fn get_canvas_state(&self) -> OperationResult<CanvasState> {
        ensure_ready!(self);
        OperationResult::ok(self.store.state())
    }

    async fn update_canvas_state(&self, state: CanvasState) -> OperationResult<CanvasState> {
        ensure_ready!(self);
        let outcome = self.store.update_canvas_state(state).await;
        OperationResult::from_result(outcome.map(|()| self.store.state()))
    }

    async fn reset_canvas(&self) -> OperationResult<bool> {
        ensure_ready!(self);
        OperationResult::from_result(self.store.reset_canvas().await.map(|()| true))
    }

    async fn clear_canvas(&self) -> OperationResult<bool> {
        ensure_ready!(self);
        OperationResult::from_result(self.store.clear_canvas().await.map(|()| true))
    }

    async fn fit_canvas(&self) -> OperationResult<Viewport> {
        ensure_ready!(self);
        OperationResult::ok(self.store.fit_to_content(FIT_PADDING).await)
    }

    async fn center_canvas(&self) -> OperationResult<Viewport> {
        ensure_ready!(self);
        OperationResult::ok(self.store.center_content().await)
    }

    async fn zoom_canvas(&self, scale: f64, center: Option<Position>) -> OperationResult<Viewport> {
        ensure_ready!(self);
        if !scale.is_finite() || scale <= 0.0 {
            return invalid(format!("zoom scale must be positive, got {scale}"));
        }
        OperationResult::ok(self.store.zoom_to(scale, center).await)
    }

    async fn pan_canvas(&self, offset: Position) -> OperationResult<Viewport> {
        ensure_ready!(self);
        if !offset.x.is_finite() || !offset.y.is_finite() {
            return invalid("pan offset must be finite");
        }
        OperationResult::ok(self.store.pan(offset.x, offset.y).await)
    }

    async fn get_canvas_bounds(&self) -> OperationResult<Rectangle> {
        ensure_ready!(self);
        OperationResult::ok(self.store.canvas_bounds().unwrap_or_default())
    }

    async fn screen_to_canvas(&self, point: Position) -> OperationResult<Position> {
        ensure_ready!(self);
        OperationResult::ok(self.store.screen_to_canvas(point))
    }

    async fn canvas_to_screen(&self, point: Position) -> OperationResult<Position> {
        ensure_ready!(self);
        OperationResult::ok(self.store.canvas_to_screen(point))
    }

    async fn set_mode(&self, mode: CanvasMode) -> OperationResult<CanvasMode> {
        ensure_ready!(self);
        self.store.set_mode(mode).await;
        OperationResult::ok(mode)
    }
}

#[async_trait]
impl HistoryService for Canvas {
    async fn create_snapshot(&self, description: Option<&str>) -> OperationResult<Arc<CanvasSnapshot>> {
        ensure_ready!(self);
        OperationResult::ok(self.history.create_snapshot(description).await)
    }

    async fn get_snapshot(&self, id: &SnapshotId) -> OperationResult<Arc<CanvasSnapshot>> {
        ensure_ready!(self);
        OperationResult::from_result(self.history.get_snapshot(id))
    }

    async fn get_all_snapshots(&self) -> OperationResult<Vec<Arc<CanvasSnapshot>>> {
        ensure_ready!(self);
        OperationResult::ok(self.history.all_snapshots())
    }

    async fn delete_snapshot(&self, id: &SnapshotId) -> OperationResult<bool> {
        ensure_ready!(self);
        OperationResult::from_result(self.history.delete_snapshot(id).await.map(|()| true))
    }

    async fn restore_snapshot(&self, id: &SnapshotId) -> OperationResult<bool> {
        ensure_ready!(self);
        OperationResult::from_result(self.history.restore_snapshot(id).await.map(|_| true))
    }

    async fn undo(&self) -> OperationResult<bool> {
        ensure_ready!(self);
        OperationResult::from_result(self.history.undo().await.map(|_| true))
    }

    async fn redo(&self) -> OperationResult<bool> {
        ensure_ready!(self);
        OperationResult::from_result(self.history.redo().await.map(|_| true))
    }

    async fn can_undo(&self) -> OperationResult<bool> {
        ensure_ready!(self);
        OperationResult::ok(self.history.can_undo())
    }

    async fn can_redo(&self) -> OperationResult<bool> {
        ensure_ready!(self);
        OperationResult::ok(self.history.can_redo())
    }

    async fn clear_history(&self) -> OperationResult<bool> {
        ensure_ready!(self);
        self.history.clear_history().await;
        OperationResult::ok(true)
    }

    async fn get_history_size(&self) -> OperationResult<usize> {
        ensure_ready!(self);
        OperationResult::ok(self.history.history_size())
    }
}

#[async_trait]
impl SelectionService for Canvas {
    async fn select_nodes(&self, ids: &[NodeId], multiple: bool) -> OperationResult<SelectionOutcome> {
        ensure_ready!(self);
        OperationResult::ok(self.selection.select_nodes(ids, multiple).await)
    }

    async fn select_connections(&self, ids: &[ConnectionId], multiple: bool) -> OperationResult<SelectionOutcome> {
        ensure_ready!(self);
        OperationResult::ok(self.selection.select_connections(ids, multiple).await)
    }

    async fn select_all(&self) -> OperationResult<SelectionOutcome> {
        ensure_ready!(self);
        OperationResult::ok(self.selection.select_all().await)
    }

    async fn clear_selection(&self) -> OperationResult<bool> {
        ensure_ready!(self);
        OperationResult::ok(self.selection.clear_selection().await)
    }

    async fn invert_selection(&self) -> OperationResult<SelectionOutcome> {
        ensure_ready!(self);
        OperationResult::ok(self.selection.invert_selection().await)
    }

    async fn get_selected_nodes(&self) -> OperationResult<Vec<Node>> {
        ensure_ready!(self);
        OperationResult::ok(self.selection.selected_nodes())
    }

    async fn get_selected_connections(&self) -> OperationResult<Vec<Connection>> {
        ensure_ready!(self);
        OperationResult::ok(self.selection.selected_connections())
    }

    async fn is_node_selected(&self, id: &NodeId) -> OperationResult<bool> {
        ensure_ready!(self);
        OperationResult::ok(self.selection.is_node_selected(id))
    }

    async fn is_connection_selected(&self, id: &ConnectionId) -> OperationResult<bool> {
        ensure_ready!(self);
        OperationResult::ok(self.selection.is_connection_selected(id))
    }

    async fn select_by_area(&self, area: Rectangle, multiple: bool) -> OperationResult<SelectionOutcome> {
        ensure_ready!(self);
        OperationResult::ok(self.selection.select_by_area(area, multiple).await)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Layout & validation
// ─────────────────────────────────────────────────────────────────────────────

#[async_trait]
impl LayoutService for Canvas {
    async fn auto_layout(
        &self,
        algorithm: Option<LayoutAlgorithm>,
        options: Option<&LayoutOptions>,
    ) -> OperationResult<LayoutReport> {
        ensure_ready!(self);
        OperationResult::from_result(self.layout.auto_layout(algorithm, options).await)
    }

    async fn align_nodes(&self, ids: &[NodeId], alignment: Alignment) -> OperationResult<LayoutReport> {
        ensure_ready!(self);
        OperationResult::from_result(self.layout.align_nodes(ids, alignment).await)
    }

    async fn distribute_nodes(&self, ids: &[NodeId], distribution: Distribution) -> OperationResult<LayoutReport> {
        ensure_ready!(self);
        OperationResult::from_result(self.layout.distribute_nodes(ids, distribution).await)
    }

    async fn adjust_spacing(&self, ids: &[NodeId], spacing: f64) -> OperationResult<LayoutReport> {
        ensure_ready!(self);
        OperationResult::from_result(self.layout.adjust_spacing(ids, spacing).await)
    }

    async fn hierarchical_layout(&self, options: Option<&LayoutOptions>) -> OperationResult<LayoutReport> {
        ensure_ready!(self);
        OperationResult::from_result(self.layout.hierarchical_layout(options).await)
    }

    async fn force_layout(&self, options: Option<&LayoutOptions>) -> OperationResult<LayoutReport> {
        ensure_ready!(self);
        OperationResult::from_result(self.layout.force_layout(options).await)
    }

    async fn circular_layout(&self, options: Option<&LayoutOptions>) -> OperationResult<LayoutReport> {
        ensure_ready!(self);
        OperationResult::from_result(self.layout.circular_layout(options).await)
    }

    async fn grid_layout(&self, options: Option<&LayoutOptions>) -> OperationResult<LayoutReport> {
        ensure_ready!(self);
        OperationResult::from_result(self.layout.grid_layout(options).await)
    }

    async fn get_layout_suggestions(&self) -> OperationResult<Vec<LayoutAlgorithm>> {
        ensure_ready!(self);
        OperationResult::ok(self.layout.suggestions())
    }
}

#[async_trait]
impl ValidationService for Canvas {
    async fn validate_canvas(&self) -> OperationResult<ValidationResult> {
        ensure_ready!(self);
        let result = self.store.validate();
        self.store
            .validator()
            .publish(self.store.bus(), &result, "canvas", None)
            .await;
        OperationResult::ok(result)
    }

    async fn validate_node(&self, id: &NodeId) -> OperationResult<ValidationResult> {
        ensure_ready!(self);
        let validator = self.store.validator();
        let Some(result) = self.store.with_graph(|graph| validator.validate_node(graph, id)) else {
            return OperationResult::fail(OperationError::from_error(&StoreError::NodeNotFound(id.clone())));
        };
        validator
            .publish(self.store.bus(), &result, "node", Some(id.as_str()))
            .await;
        OperationResult::ok(result)
    }

    async fn validate_connection(&self, id: &ConnectionId) -> OperationResult<ValidationResult> {
        ensure_ready!(self);
        let validator = self.store.validator();
        let Some(result) = self
            .store
            .with_graph(|graph| validator.validate_connection(graph, id))
        else {
            return OperationResult::fail(OperationError::from_error(&StoreError::ConnectionNotFound(id.clone())));
        };
        validator
            .publish(self.store.bus(), &result, "connection", Some(id.as_str()))
            .await;
        OperationResult::ok(result)
    }

    async fn validate_workflow(&self) -> OperationResult<ValidationResult> {
        ensure_ready!(self);
        let validator = self.store.validator();
        let result = self.store.with_graph(|graph| validator.validate_workflow(graph));
        validator.publish(self.store.bus(), &result, "workflow", None).await;
        OperationResult::ok(result)
    }

    async fn get_validation_rules(&self) -> OperationResult<Vec<RuleInfo>> {
        ensure_ready!(self);
        OperationResult::ok(self.store.validator().rules())
    }

    async fn add_validation_rule(&self, rule: ValidationRule) -> OperationResult<bool> {
        ensure_ready!(self);
        OperationResult::from_result(self.store.validator().add_rule(rule).map(|()| true))
    }

    async fn remove_validation_rule(&self, id: &str) -> OperationResult<bool> {
        ensure_ready!(self);
        OperationResult::from_result(self.store.validator().remove_rule(id).map(|_| true))
    }

    async fn enable_validation_rule(&self, id: &str) -> OperationResult<bool> {
        ensure_ready!(self);
        OperationResult::from_result(self.store.validator().enable_rule(id).map(|()| true))
    }

    async fn disable_validation_rule(&self, id: &str) -> OperationResult<bool> {
        ensure_ready!(self);
        OperationResult::from_result(self.store.validator().disable_rule(id).map(|()| true))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Documents, storage, events, performance
// ─────────────────────────────────────────────────────────────────────────────

#[async_trait]
impl ImportExportService for Canvas {
    async fn export_canvas(&self, options: &ExportOptions) -> OperationResult<String> {
        ensure_ready!(self);
        OperationResult::from_result(self.transfer.export_canvas(options).await)
    }

    async fn import_canvas(&self, data: &str, options: &ImportOptions) -> OperationResult<ImportReport> {
        ensure_ready!(self);
        OperationResult::from_result(self.transfer.import_canvas(data, options).await)
    }

    async fn export_nodes(&self, ids: &[NodeId], options: &ExportOptions) -> OperationResult<String> {
        ensure_ready!(self);
        OperationResult::from_result(self.transfer.export_nodes(ids, options).await)
    }

    async fn import_nodes(&self, data: &str, options: &ImportOptions) -> OperationResult<Vec<Node>> {
        ensure_ready!(self);
        OperationResult::from_result(self.transfer.import_nodes(data, options).await)
    }

    async fn export_connections(&self, ids: &[ConnectionId], options: &ExportOptions) -> OperationResult<String> {
        ensure_ready!(self);
        OperationResult::from_result(self.transfer.export_connections(ids, options).await)
    }

    async fn import_connections(&self, data: &str, options: &ImportOptions) -> OperationResult<Vec<Connection>> {
        ensure_ready!(self);
        OperationResult::from_result(self.transfer.import_connections(data, options).await)
    }

    async fn get_supported_export_formats(&self) -> OperationResult<Vec<ExportFormat>> {
        ensure_ready!(self);
        OperationResult::ok(self.transfer.supported_export_formats())
    }

    async fn get_supported_import_formats(&self) -> OperationResult<Vec<ImportFormat>> {
        ensure_ready!(self);
        OperationResult::ok(self.transfer.supported_import_formats())
    }
}

#[async_trait]
impl StorageService for Canvas {
    async fn save_canvas(&self, name: Option<&str>) -> OperationResult<String> {
        ensure_ready!(self);
        OperationResult::from_result(self.storage.save_canvas(name).await)
    }

    async fn load_canvas(&self, id: &str) -> OperationResult<CanvasState> {
        ensure_ready!(self);
        OperationResult::from_result(self.storage.load_canvas(id).await)
    }

    async fn delete_canvas(&self, id: &str) -> OperationResult<bool> {
        ensure_ready!(self);
        OperationResult::from_result(self.storage.delete_canvas(id).await.map(|()| true))
    }

    async fn get_canvas_list(&self) -> OperationResult<Vec<CanvasSummary>> {
        ensure_ready!(self);
        OperationResult::from_result(self.storage.get_canvas_list().await)
    }

    async fn auto_save_canvas(&self) -> OperationResult<bool> {
        ensure_ready!(self);
        OperationResult::from_result(self.storage.auto_save_canvas().await)
    }

    async fn set_auto_save_interval(&self, interval_ms: u64) -> OperationResult<bool> {
        ensure_ready!(self);
        OperationResult::from_result(self.storage.set_auto_save_interval(interval_ms).map(|()| true))
    }

    async fn enable_auto_save(&self) -> OperationResult<bool> {
        ensure_ready!(self);
        self.storage.enable_auto_save();
        OperationResult::ok(true)
    }

    async fn disable_auto_save(&self) -> OperationResult<bool> {
        ensure_ready!(self);
        self.storage.disable_auto_save();
        OperationResult::ok(true)
    }

    async fn has_unsaved_changes(&self) -> OperationResult<bool> {
        ensure_ready!(self);
        OperationResult::ok(self.storage.has_unsaved_changes())
    }
}

#[async_trait]
impl EventService for Canvas {
    async fn subscribe(&self, event_type: &str, handler: EventHandler) -> OperationResult<SubscriptionId> {
        ensure_ready!(self);
        if event_type.trim().is_empty() {
            return invalid("event type must not be empty");
        }
        OperationResult::ok(self.store.bus().on(event_type, move |event| handler(event)))
    }

    async fn unsubscribe(&self, id: &SubscriptionId) -> OperationResult<bool> {
        ensure_ready!(self);
        OperationResult::ok(self.store.bus().off(id))
    }

    async fn publish(&self, event_type: &str, data: Value) -> OperationResult<bool> {
        ensure_ready!(self);
        if event_type.trim().is_empty() {
            return invalid("event type must not be empty");
        }
        let event = CanvasEvent::custom(event_type, data).from_source("service");
        let report = self.store.bus().emit(event).await;
        OperationResult::ok(!report.dropped)
    }

    async fn get_event_history(
        &self,
        event_type: Option<&str>,
        limit: Option<usize>,
    ) -> OperationResult<Vec<CanvasEvent>> {
        ensure_ready!(self);
        OperationResult::ok(self.store.bus().get_history(event_type, limit))
    }

    async fn clear_event_history(&self) -> OperationResult<bool> {
        ensure_ready!(self);
        self.store.bus().clear_history();
        OperationResult::ok(true)
    }

    async fn enable_event_logging(&self) -> OperationResult<bool> {
        ensure_ready!(self);
        self.store.bus().enable_history();
        OperationResult::ok(true)
    }

    async fn disable_event_logging(&self) -> OperationResult<bool> {
        ensure_ready!(self);
        self.store.bus().disable_history();
        OperationResult::ok(true)
    }
}

#[async_trait]
impl PerformanceService for Canvas {
    async fn start_monitoring(&self) -> OperationResult<bool> {
        ensure_ready!(self);
        self.performance.start_monitoring();
        OperationResult::ok(true)
    }

    async fn stop_monitoring(&self) -> OperationResult<bool> {
        ensure_ready!(self);
        self.performance.stop_monitoring();
        OperationResult::ok(true)
    }

    async fn get_metrics(&self) -> OperationResult<PerformanceMetrics> {
        ensure_ready!(self);
        OperationResult::ok(self.performance.get_metrics())
    }

    async fn reset_metrics(&self) -> OperationResult<bool> {
        ensure_ready!(self);
        self.performance.reset_metrics();
        OperationResult::ok(true)
    }

    async fn mark(&self, name: &str) -> OperationResult<bool> {
        ensure_ready!(self);
        OperationResult::from_result(self.performance.mark(name).await.map(|_| true))
    }

    async fn measure(&self, name: &str, start: &str, end: Option<&str>) -> OperationResult<f64> {
        ensure_ready!(self);
        OperationResult::from_result(self.performance.measure(name, start, end).await)
    }

    async fn get_memory_usage(&self) -> OperationResult<MemoryUsage> {
        ensure_ready!(self);
        OperationResult::from_result(self.performance.get_memory_usage())
    }

    async fn get_render_performance(&self) -> OperationResult<RenderEstimate> {
        ensure_ready!(self);
        OperationResult::ok(self.performance.get_render_performance())
    }

    async fn check_thresholds(&self) -> OperationResult<Vec<String>> {
        ensure_ready!(self);
        OperationResult::ok(self.performance.check_thresholds().await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trellis_core::{NodeKind, codes};

    #[test]
    fn draft_findings_keep_validation_issues() {
        let issue = ValidationIssue::new("custom", "MISSING", "label", "label required");
        let result = draft_findings(Err(StoreError::Validation(vec![issue.clone()])));
        assert!(!result.valid);
        assert_eq!(result.errors, vec![issue]);
    }

    #[test]
    fn draft_findings_wrap_other_errors() {
        let result = draft_findings(Err(StoreError::NodeNotFound(NodeId::from("ghost"))));
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].code, codes::NODE_NOT_FOUND);
        assert!(draft_findings(Ok(())).valid);
    }

    #[tokio::test]
    async fn calls_before_initialize_are_not_ready() {
        let canvas = Canvas::default();
        let created = canvas.create_node(NodeDraft::new(NodeKind::Sms)).await;
        assert_eq!(created.error_code(), Some(codes::NOT_READY));
        let batch = canvas.delete_nodes(&[NodeId::from("a")], false).await;
        assert_eq!(batch.error_count, 1);
        assert_eq!(batch.errors[0].code, codes::NOT_READY);
    }
}
