//! Service boundary and canvas facade for Trellis (Layer 4).
//!
//! # Core Concepts
//!
//! - [`Canvas`] - Owns one store, bus and validator and implements every
//!   service trait over them
//! - [`service`] - `NodeService`, `ConnectionService`, `CanvasService` and the
//!   rest; each call returns an [`OperationResult`](trellis_core::OperationResult)
//!   or [`BatchOperationResult`](trellis_core::BatchOperationResult)
//! - [`TransferManager`] - Lossless JSON documents, SVG rendering and merging imports
//! - [`StorageManager`] - Save, load and auto-save through a [`CanvasStorage`] backend
//! - [`PerformanceMonitor`] - Marks, measures and engine-side estimates
//! - [`tracing_setup`] - Optional subscriber installation for hosts
//!
//! # Lifecycle
//!
//! A canvas refuses every call with `NOT_READY` until
//! [`Service::initialize`] has run, and again after [`Service::destroy`].
//!
//! ```
//! use futures::executor::block_on;
//! use trellis_core::NodeKind;
//! use trellis_core::node::NodeDraft;
//! use trellis_services::prelude::*;
//!
//! let canvas = Canvas::default();
//! block_on(async {
//!     assert!(canvas.initialize().await.success);
//!     let created = canvas.create_node(NodeDraft::new(NodeKind::Start).with_id("start")).await;
//!     assert!(created.success);
//!     assert!(canvas.undo().await.success);
//!     assert_eq!(canvas.get_all_nodes().await.data.map(|nodes| nodes.len()), Some(0));
//! });
//! ```

/// The canvas facade.
pub mod canvas;

/// Service-layer errors.
pub mod error;

/// Marks, measures and metrics.
pub mod performance;

/// Service traits.
pub mod service;

/// Persistence.
pub mod storage;

/// Tracing subscriber setup.
pub mod tracing_setup;

/// Import and export.
pub mod transfer;

/// Re-export all common types for easy access.
pub mod prelude {
    pub use crate::canvas::{Canvas, CanvasBuilder, FIT_PADDING};
    pub use crate::error::ServiceError;
    pub use crate::performance::{
        MemoryUsage, PerformanceError, PerformanceMetrics, PerformanceMonitor, RenderEstimate,
    };
    pub use crate::service::{
        CanvasService, ConnectionService, EventHandler, EventService, HistoryService, ImportExportService,
        LayoutService, NodeService, PerformanceService, SelectionService, Service, StorageService,
        ValidationService,
    };
    pub use crate::storage::{
        CanvasStorage, CanvasSummary, MemoryStorage, StorageError, StorageManager, StoredCanvas,
    };
    pub use crate::tracing_setup::{TracingConfig, TracingFormat, TracingInitError, init_tracing};
    pub use crate::transfer::{
        CanvasDocument, ExportFormat, ExportOptions, ImportFormat, ImportOptions, ImportReport, TransferError,
        TransferManager,
    };
}

pub use canvas::{Canvas, CanvasBuilder};
pub use error::ServiceError;
pub use performance::PerformanceMonitor;
pub use service::Service;
pub use storage::{CanvasStorage, MemoryStorage, StorageManager};
pub use transfer::{CanvasDocument, TransferManager};
