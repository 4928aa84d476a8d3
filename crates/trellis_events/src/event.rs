//! Event names, payloads and the event object handed to handlers.
//!
//! Every event carries a name (a [`CanvasEventType`] tag such as
//! `"node:created"`, possibly prefixed by namespaces, or any custom string),
//! a timestamp, and a typed [`EventPayload`]. Handlers match on the payload
//! for typed access:
//!
//! ```
//! use trellis_events::{CanvasEvent, CanvasEventType, EventPayload};
//!
//! fn describe(event: &CanvasEvent) -> String {
//!     match event.payload() {
//!         EventPayload::Node(data) => format!("{} {}", event.name(), data.node.id),
//!         EventPayload::Commit(data) => format!("commit #{}", data.revision),
//!         _ => event.name().to_string(),
//!     }
//! }
//!
//! let event = CanvasEvent::new(CanvasEventType::CanvasReady, EventPayload::Empty);
//! assert_eq!(describe(&event), "canvas:ready");
//! ```

use core::fmt;
use core::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde_json::Value;
use trellis_core::canvas::{CanvasMode, CanvasSnapshot, Viewport};
use trellis_core::geometry::{Position, Rectangle};
use trellis_core::{Connection, ConnectionId, Node, NodeId, SnapshotId};

use crate::bus::SubscriptionId;

// ─────────────────────────────────────────────────────────────────────────────
// CanvasEventType
// ─────────────────────────────────────────────────────────────────────────────

macro_rules! event_types {
    ($($(#[$meta:meta])* $variant:ident => $tag:literal,)*) => {
        /// Catalogue of the event names the engine emits.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum CanvasEventType {
            $($(#[$meta])* $variant,)*
        }

        impl CanvasEventType {
            /// Every catalogued event type.
            pub const ALL: &'static [CanvasEventType] = &[$(CanvasEventType::$variant,)*];

            /// Returns the wire name, e.g. `"node:created"`.
            #[must_use]
            pub const fn as_str(self) -> &'static str {
                match self {
                    $(CanvasEventType::$variant => $tag,)*
                }
            }
        }

        impl FromStr for CanvasEventType {
            type Err = UnknownEventType;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($tag => Ok(CanvasEventType::$variant),)*
                    other => Err(UnknownEventType(other.to_owned())),
                }
            }
        }
    };
}

event_types! {
    /// The canvas finished initializing.
    CanvasInitialized => "canvas:initialized",
    /// The canvas was torn down.
    CanvasDestroyed => "canvas:destroyed",
    /// The canvas is ready for input.
    CanvasReady => "canvas:ready",
    /// A handler or subsystem failed.
    CanvasError => "canvas:error",
    /// A mutation (or adoption) committed.
    CanvasStateChanged => "canvas:state-changed",
    /// The canvas mode changed.
    CanvasModeChanged => "canvas:mode-changed",
    /// The configuration changed.
    CanvasConfigChanged => "canvas:config-changed",
    /// The viewport changed.
    ViewportChanged => "viewport:changed",
    /// The zoom factor changed.
    ZoomChanged => "zoom:changed",
    /// The viewport translation changed.
    PanChanged => "pan:changed",
    /// A node was created.
    NodeCreated => "node:created",
    /// A node was updated.
    NodeUpdated => "node:updated",
    /// A node was deleted.
    NodeDeleted => "node:deleted",
    /// A node entered the selection.
    NodeSelected => "node:selected",
    /// A node left the selection.
    NodeDeselected => "node:deselected",
    /// A node moved.
    NodeMoved => "node:moved",
    /// A node was resized.
    NodeResized => "node:resized",
    /// A connection was created.
    ConnectionCreated => "connection:created",
    /// A connection was updated.
    ConnectionUpdated => "connection:updated",
    /// A connection was deleted.
    ConnectionDeleted => "connection:deleted",
    /// A connection entered the selection.
    ConnectionSelected => "connection:selected",
    /// A connection left the selection.
    ConnectionDeselected => "connection:deselected",
    /// The selection changed.
    SelectionChanged => "selection:changed",
    /// The selection was cleared.
    SelectionCleared => "selection:cleared",
    /// The undo/redo stacks changed.
    HistoryChanged => "history:changed",
    /// An undo was applied.
    HistoryUndo => "history:undo",
    /// A redo was applied.
    HistoryRedo => "history:redo",
    /// A named snapshot was created.
    SnapshotCreated => "snapshot:created",
    /// A snapshot was restored.
    SnapshotRestored => "snapshot:restored",
    /// A layout run started.
    LayoutStart => "layout:start",
    /// A layout run finished.
    LayoutEnd => "layout:end",
    /// Node positions changed through a layout.
    LayoutChanged => "layout:changed",
    /// Validation started.
    ValidationStart => "validation:start",
    /// Validation finished.
    ValidationEnd => "validation:end",
    /// Validation produced errors.
    ValidationError => "validation:error",
    /// Validation produced warnings.
    ValidationWarning => "validation:warning",
    /// An export started.
    ExportStart => "export:start",
    /// An export finished.
    ExportEnd => "export:end",
    /// An export failed.
    ExportError => "export:error",
    /// An import started.
    ImportStart => "import:start",
    /// An import finished.
    ImportEnd => "import:end",
    /// An import failed.
    ImportError => "import:error",
    /// A save started.
    SaveStart => "save:start",
    /// A save finished.
    SaveEnd => "save:end",
    /// A save failed.
    SaveError => "save:error",
    /// A load started.
    LoadStart => "load:start",
    /// A load finished.
    LoadEnd => "load:end",
    /// A load failed.
    LoadError => "load:error",
    /// An automatic save ran.
    AutoSave => "auto-save",
    /// A performance mark was recorded.
    PerformanceMark => "performance:mark",
    /// A performance measure was recorded.
    PerformanceMeasure => "performance:measure",
    /// A performance threshold was crossed.
    PerformanceWarning => "performance:warning",
    /// A caller-defined event.
    Custom => "custom",
}

impl CanvasEventType {
    /// The part before the first `:`, e.g. `"node"`.
    #[must_use]
    pub fn category(self) -> &'static str {
        let tag = self.as_str();
        tag.split_once(':').map_or(tag, |(category, _)| category)
    }
}

impl fmt::Display for CanvasEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when parsing an event name that is not in the catalogue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownEventType(pub String);

impl fmt::Display for UnknownEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown event type '{}'", self.0)
    }
}

impl core::error::Error for UnknownEventType {}

// ─────────────────────────────────────────────────────────────────────────────
// EventName
// ─────────────────────────────────────────────────────────────────────────────

/// The name an event is dispatched under.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EventName(Arc<str>);

impl EventName {
    /// Creates a name from any string.
    #[must_use]
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self(name.into())
    }

    /// Returns the name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns `"{namespace}:{self}"`.
    #[must_use]
    pub fn prefixed(&self, namespace: &str) -> Self {
        Self(format!("{namespace}:{}", self.0).into())
    }

    /// The catalogued type, if this name is un-prefixed and known.
    #[must_use]
    pub fn event_type(&self) -> Option<CanvasEventType> {
        self.0.parse().ok()
    }

    /// Returns true if this name equals the catalogued type.
    #[must_use]
    pub fn is(&self, kind: CanvasEventType) -> bool {
        &*self.0 == kind.as_str()
    }
}

impl fmt::Display for EventName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<CanvasEventType> for EventName {
    fn from(kind: CanvasEventType) -> Self {
        Self(kind.as_str().into())
    }
}

impl From<&str> for EventName {
    fn from(name: &str) -> Self {
        Self(name.into())
    }
}

impl From<String> for EventName {
    fn from(name: String) -> Self {
        Self(name.into())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Payloads
// ─────────────────────────────────────────────────────────────────────────────

/// Node lifecycle data.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeEventData {
    /// The node after the change (or as it was, for deletions).
    pub node: Node,
    /// The node before the change, for updates, moves and resizes.
    pub previous: Option<Node>,
    /// Movement applied, for moves.
    pub delta: Option<Position>,
}

/// Connection lifecycle data.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionEventData {
    /// The connection after the change (or as it was, for deletions).
    pub connection: Connection,
    /// The connection before the change, for updates.
    pub previous: Option<Connection>,
}

/// Selection change data.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SelectionEventData {
    /// Selected nodes after the change.
    pub selected_nodes: Vec<NodeId>,
    /// Selected connections after the change.
    pub selected_connections: Vec<ConnectionId>,
    /// Selected nodes before the change.
    pub previous_nodes: Vec<NodeId>,
    /// Selected connections before the change.
    pub previous_connections: Vec<ConnectionId>,
    /// Area of an area selection.
    pub area: Option<Rectangle>,
}

/// Viewport change data.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewportEventData {
    /// The viewport after the change.
    pub viewport: Viewport,
    /// The viewport before the change.
    pub previous: Viewport,
}

/// Undo/redo state data.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HistoryEventData {
    /// Whether undo is possible.
    pub can_undo: bool,
    /// Whether redo is possible.
    pub can_redo: bool,
    /// `past + 1 + future`.
    pub history_size: usize,
    /// The snapshot involved, if any.
    pub snapshot_id: Option<SnapshotId>,
    /// Snapshot description, if any.
    pub description: Option<String>,
}

/// Layout run data.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LayoutEventData {
    /// Algorithm or operation name.
    pub algorithm: String,
    /// Nodes whose position was computed.
    pub affected_nodes: Vec<NodeId>,
    /// Wall time of the run, on `layout:end`.
    pub duration_ms: Option<f64>,
}

/// A single validation finding, flattened for transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FindingSummary {
    /// Offending field or entity id.
    pub field: String,
    /// Human-readable message.
    pub message: String,
}

/// Validation run data.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidationEventData {
    /// Validated entity id, if the run targeted one.
    pub target: Option<String>,
    /// `"node"`, `"connection"`, `"canvas"` or `"workflow"`.
    pub target_type: String,
    /// Error findings.
    pub errors: Vec<FindingSummary>,
    /// Warning and info findings.
    pub warnings: Vec<FindingSummary>,
    /// Whether the run found no errors.
    pub is_valid: bool,
}

/// Import/export data.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransferEventData {
    /// Document format.
    pub format: String,
    /// Document size in bytes.
    pub size: Option<usize>,
    /// Wall time of the transfer.
    pub duration_ms: Option<f64>,
    /// Failure message.
    pub error: Option<String>,
}

/// Persistence data.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StorageEventData {
    /// Stored canvas id.
    pub id: Option<String>,
    /// Stored canvas name.
    pub name: Option<String>,
    /// Document size in bytes.
    pub size: Option<usize>,
    /// Failure message.
    pub error: Option<String>,
    /// Whether the save was automatic.
    pub auto_save: bool,
}

/// Performance data.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PerformanceEventData {
    /// Mark or measure name.
    pub name: String,
    /// Measured value.
    pub value: Option<f64>,
    /// Unit of `value`.
    pub unit: Option<String>,
    /// Free-form details.
    pub details: Option<Value>,
}

/// Where a committed state change came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommitOrigin {
    /// A mutation through the store's public API.
    Mutation,
    /// The history manager installing an earlier or later state.
    Adoption,
}

/// Commit data for `canvas:state-changed`.
#[derive(Debug, Clone, PartialEq)]
pub struct CommitEventData {
    /// Mutation or adoption.
    pub origin: CommitOrigin,
    /// Store revision after the commit.
    pub revision: u64,
    /// Name of the operation that committed, e.g. `"createNode"`.
    pub operation: String,
    /// The committed state, captured before the store lock was released.
    pub snapshot: Arc<CanvasSnapshot>,
}

/// Mode change data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModeEventData {
    /// New mode.
    pub mode: CanvasMode,
    /// Previous mode.
    pub previous: CanvasMode,
}

/// Diagnostic data for `canvas:error`.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorEventData {
    /// What went wrong.
    pub message: String,
    /// Name of the event being handled when the failure happened.
    pub event_type: Option<String>,
    /// Subscription whose handler failed.
    pub subscription: Option<SubscriptionId>,
}

/// Typed event payload.
#[derive(Debug, Clone, PartialEq)]
pub enum EventPayload {
    /// No payload.
    Empty,
    /// Node lifecycle.
    Node(NodeEventData),
    /// Connection lifecycle.
    Connection(ConnectionEventData),
    /// Selection change.
    Selection(SelectionEventData),
    /// Viewport change.
    Viewport(ViewportEventData),
    /// Undo/redo state.
    History(HistoryEventData),
    /// Layout run.
    Layout(LayoutEventData),
    /// Validation run.
    Validation(ValidationEventData),
    /// Import/export.
    Transfer(TransferEventData),
    /// Persistence.
    Storage(StorageEventData),
    /// Performance.
    Performance(PerformanceEventData),
    /// Commit.
    Commit(CommitEventData),
    /// Mode change.
    Mode(ModeEventData),
    /// Diagnostic.
    Error(ErrorEventData),
    /// Caller-defined JSON.
    Custom(Value),
}

// ─────────────────────────────────────────────────────────────────────────────
// CanvasEvent
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub(crate) struct EventControl {
    default_prevented: AtomicBool,
    propagation_stopped: AtomicBool,
    immediate_stopped: AtomicBool,
}

/// An event in flight.
///
/// Cloning is cheap: the payload and the propagation flags are shared, so
/// the copies that travel up through namespaces observe the same
/// `stop_propagation` calls.
#[derive(Debug, Clone)]
pub struct CanvasEvent {
    name: EventName,
    timestamp: u64,
    source: Option<Arc<str>>,
    payload: Arc<EventPayload>,
    control: Arc<EventControl>,
}

impl CanvasEvent {
    /// Creates an event. The bus stamps the timestamp if it is left at zero.
    #[must_use]
    pub fn new(name: impl Into<EventName>, payload: EventPayload) -> Self {
        Self {
            name: name.into(),
            timestamp: 0,
            source: None,
            payload: Arc::new(payload),
            control: Arc::default(),
        }
    }

    /// Creates a custom event with a JSON payload.
    #[must_use]
    pub fn custom(name: impl Into<EventName>, data: Value) -> Self {
        Self::new(name, EventPayload::Custom(data))
    }

    /// Sets the timestamp in epoch milliseconds.
    #[must_use]
    pub fn at(mut self, timestamp: u64) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Tags the emitting component.
    #[must_use]
    pub fn from_source(mut self, source: impl Into<Arc<str>>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Dispatch name.
    #[must_use]
    pub fn name(&self) -> &EventName {
        &self.name
    }

    /// Timestamp in epoch milliseconds.
    #[must_use]
    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    /// Emitting component, if tagged.
    #[must_use]
    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    /// Typed payload.
    #[must_use]
    pub fn payload(&self) -> &EventPayload {
        &self.payload
    }

    /// Returns true if the name equals the catalogued type.
    #[must_use]
    pub fn is(&self, kind: CanvasEventType) -> bool {
        self.name.is(kind)
    }

    /// Asks the emitter to skip its default action.
    pub fn prevent_default(&self) {
        self.control.default_prevented.store(true, Ordering::SeqCst);
    }

    /// Whether [`prevent_default`](Self::prevent_default) was called.
    #[must_use]
    pub fn default_prevented(&self) -> bool {
        self.control.default_prevented.load(Ordering::SeqCst)
    }

    /// Stops the event from reaching further buses.
    pub fn stop_propagation(&self) {
        self.control.propagation_stopped.store(true, Ordering::SeqCst);
    }

    /// Stops remaining handlers on the current bus and further buses.
    pub fn stop_immediate_propagation(&self) {
        self.control.immediate_stopped.store(true, Ordering::SeqCst);
        self.stop_propagation();
    }

    /// Whether propagation to further buses was stopped.
    #[must_use]
    pub fn propagation_stopped(&self) -> bool {
        self.control.propagation_stopped.load(Ordering::SeqCst)
    }

    pub(crate) fn immediate_stopped(&self) -> bool {
        self.control.immediate_stopped.load(Ordering::SeqCst)
    }

    pub(crate) fn renamed(&self, name: EventName) -> Self {
        Self {
            name,
            ..self.clone()
        }
    }

    pub(crate) fn stamp_if_unset(&mut self, now: u64) {
        if self.timestamp == 0 {
            self.timestamp = now;
        }
    }

    // Typed accessors.

    /// Node payload.
    #[must_use]
    pub fn as_node(&self) -> Option<&NodeEventData> {
        match self.payload() {
            EventPayload::Node(data) => Some(data),
            _ => None,
        }
    }

    /// Connection payload.
    #[must_use]
    pub fn as_connection(&self) -> Option<&ConnectionEventData> {
        match self.payload() {
            EventPayload::Connection(data) => Some(data),
            _ => None,
        }
    }

    /// Selection payload.
    #[must_use]
    pub fn as_selection(&self) -> Option<&SelectionEventData> {
        match self.payload() {
            EventPayload::Selection(data) => Some(data),
            _ => None,
        }
    }

    /// Commit payload.
    #[must_use]
    pub fn as_commit(&self) -> Option<&CommitEventData> {
        match self.payload() {
            EventPayload::Commit(data) => Some(data),
            _ => None,
        }
    }

    /// History payload.
    #[must_use]
    pub fn as_history(&self) -> Option<&HistoryEventData> {
        match self.payload() {
            EventPayload::History(data) => Some(data),
            _ => None,
        }
    }

    /// Validation payload.
    #[must_use]
    pub fn as_validation(&self) -> Option<&ValidationEventData> {
        match self.payload() {
            EventPayload::Validation(data) => Some(data),
            _ => None,
        }
    }

    /// Layout payload.
    #[must_use]
    pub fn as_layout(&self) -> Option<&LayoutEventData> {
        match self.payload() {
            EventPayload::Layout(data) => Some(data),
            _ => None,
        }
    }

    /// Error payload.
    #[must_use]
    pub fn as_error(&self) -> Option<&ErrorEventData> {
        match self.payload() {
            EventPayload::Error(data) => Some(data),
            _ => None,
        }
    }
}

impl fmt::Display for CanvasEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.name, self.timestamp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_types_round_trip_through_strings() {
        for kind in CanvasEventType::ALL {
            assert_eq!(kind.as_str().parse::<CanvasEventType>(), Ok(*kind));
        }
        assert!("mouse:down".parse::<CanvasEventType>().is_err());
    }

    #[test]
    fn category_is_prefix_before_colon() {
        assert_eq!(CanvasEventType::NodeCreated.category(), "node");
        assert_eq!(CanvasEventType::AutoSave.category(), "auto-save");
    }

    #[test]
    fn clones_share_propagation_flags() {
        let event = CanvasEvent::new(CanvasEventType::NodeCreated, EventPayload::Empty);
        let forwarded = event.renamed(event.name().prefixed("child"));
        assert_eq!(forwarded.name().as_str(), "child:node:created");
        forwarded.stop_propagation();
        assert!(event.propagation_stopped());
        assert!(!event.immediate_stopped());
        event.stop_immediate_propagation();
        assert!(forwarded.immediate_stopped());
    }

    #[test]
    fn stamp_only_fills_missing_timestamp() {
        let mut event = CanvasEvent::custom("custom", Value::Null);
        event.stamp_if_unset(10);
        event.stamp_if_unset(20);
        assert_eq!(event.timestamp(), 10);
    }
}
