//! Graph store, selection and history for Trellis canvases (Layer 2).
//!
//! # Core Concepts
//!
//! - [`GraphStore`] - Single source of truth for nodes, connections, viewport,
//!   selection and mode; every mutation is validated and committed atomically
//! - [`Query`] - Predicate language (`eq`, `in`, `regex`, ...) with sort and pagination
//! - [`SelectionManager`] - Single, multiple and area selection over the store
//! - [`HistoryManager`] - Bounded linear undo/redo driven by commit events
//!
//! # Commits and events
//!
//! A successful call emits its per-entity events (`node:created`,
//! `connection:deleted`, ...), then any selection events, then exactly one
//! `canvas:state-changed`. A rejected call emits nothing and changes nothing.
//! Batch calls apply each item independently and commit the survivors once.
//!
//! ```
//! use futures::executor::block_on;
//! use trellis_core::node::NodeDraft;
//! use trellis_core::NodeKind;
//! use trellis_core::connection::ConnectionDraft;
//! use trellis_graph::GraphStore;
//!
//! let store = GraphStore::default();
//! block_on(async {
//!     store.create_node(NodeDraft::new(NodeKind::Sms).with_id("a")).await.unwrap();
//!     store.create_node(NodeDraft::new(NodeKind::Wait).with_id("b")).await.unwrap();
//!     store.create_connection(ConnectionDraft::new("a", "b")).await.unwrap();
//!     store.delete_node(&"a".into(), false).await.unwrap();
//! });
//! assert!(store.all_connections().is_empty());
//! ```

/// Store and history errors.
pub mod error;

/// Undo/redo.
pub mod history;

/// Node and connection queries.
pub mod query;

/// Selection management.
pub mod selection;

/// The graph store.
pub mod store;

/// Re-export all common types for easy access.
pub mod prelude {
    pub use crate::error::{HistoryError, StoreError};
    pub use crate::history::HistoryManager;
    pub use crate::query::{
        Condition, Operator, Pagination, Query, QueryError, QueryResult, SortDirection, SortSpec,
    };
    pub use crate::selection::{SelectionManager, SelectionOutcome};
    pub use crate::store::{CLONE_OFFSET, GraphStore};
}

pub use error::{HistoryError, StoreError};
pub use history::HistoryManager;
pub use query::{Condition, Query, QueryError, QueryResult};
pub use selection::{SelectionManager, SelectionOutcome};
pub use store::GraphStore;
