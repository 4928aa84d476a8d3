//! Canvas data model for Trellis (Layer 1).
//!
//! `trellis_core` defines the types every other Trellis crate speaks: nodes,
//! ports, connections, the viewport, selections and snapshots, together with
//! the configuration tree and the result envelopes returned across the
//! service boundary.
//!
//! # Core Concepts
//!
//! - [`Graph`] - Nodes and connections keyed by id, in insertion order
//! - [`Node`] - A positioned vertex with typed [`Port`]s and free-form data
//! - [`Connection`] - A directed link between two nodes (optionally port to port)
//! - [`Viewport`] / [`Selection`] - Per-canvas view state
//! - [`CanvasSnapshot`] - Immutable copy of the canvas, the unit of undo/redo
//! - [`OperationResult`] / [`BatchOperationResult`] - Service-boundary envelopes
//! - [`CanvasConfig`] - Serde-backed configuration tree
//!
//! # Architecture
//!
//! - **Layer 1** (`trellis_core`): data model and shared utilities (this crate)
//! - **Layer 1** (`trellis_events`): typed event bus
//! - **Layer 2** (`trellis_validation`, `trellis_graph`, `trellis_layout`): engine
//! - **Layer 3** (`trellis_services`): service boundary and canvas facade

/// Canvas-level state: viewport, selection, snapshots.
pub mod canvas;

/// Clock abstraction used for timestamps.
pub mod clock;

/// Configuration tree.
pub mod config;

/// Connection types.
pub mod connection;

/// Geometry primitives.
pub mod geometry;

/// Node/connection container.
pub mod graph;

/// Identifier newtypes.
pub mod id;

/// Node and port types.
pub mod node;

/// Node type registry.
pub mod registry;

/// Operation result envelopes and error codes.
pub mod result;

/// Structural utilities over `serde_json::Value` (path get/set, deep merge).
pub mod value;

/// Re-export all common types for easy access.
pub mod prelude {
    pub use crate::canvas::{
        CanvasMode, CanvasSnapshot, CanvasState, HistoryState, Selection, SelectionMode,
        SnapshotType, Viewport,
    };
    pub use crate::clock::{Clock, ManualClock, SharedClock, SystemClock};
    pub use crate::config::{
        CanvasConfig, ConnectionPolicy, ConnectionRule, EventBusConfig, ForceConfig, GridConfig,
        HistoryConfig, LayoutAlgorithm, LayoutAlignment, LayoutConfig, LayoutDirection,
        LayoutSpacing, PerformanceConfig, SnapConfig, StorageConfig, ValidationConfig, ZoomConfig,
    };
    pub use crate::connection::{
        Connection, ConnectionDraft, ConnectionMetadata, ConnectionPatch, ConnectionStyle,
        MarkerKind, MarkerStyle,
    };
    pub use crate::geometry::{Position, Rectangle, Size};
    pub use crate::graph::{ConnectionDirection, Graph, GraphDecodeError};
    pub use crate::id::{ConnectionId, NodeId, PortId, SnapshotId};
    pub use crate::node::{
        DEFAULT_NODE_SIZE, Node, NodeDraft, NodeKind, NodeMetadata, NodePatch, NodeStyle, Port,
        PortDirection, PortSide,
    };
    pub use crate::registry::{NodeTypeConfig, NodeTypeRegistry, PortTemplate};
    pub use crate::result::{
        BatchOperationResult, ErrorCode, OperationError, OperationResult, codes,
    };
}

pub use canvas::{CanvasSnapshot, CanvasState, Selection, Viewport};
pub use config::CanvasConfig;
pub use connection::Connection;
pub use graph::Graph;
pub use id::{ConnectionId, NodeId, PortId, SnapshotId};
pub use node::{Node, NodeKind, Port};
pub use result::{BatchOperationResult, ErrorCode, OperationError, OperationResult, codes};
