//! Layout engine for Trellis canvases (Layer 3).
//!
//! # Core Concepts
//!
//! - [`algorithm`] - Pure hierarchical, force-directed, circular and grid
//!   layouts over a [`Graph`](trellis_core::Graph) snapshot
//! - [`arrange`] - Align, distribute and re-space a chosen subset of nodes
//! - [`suggest`] - Rank algorithms by graph shape
//! - [`LayoutEngine`] - Applies any of the above to a
//!   [`GraphStore`](trellis_graph::GraphStore) as one undoable commit
//!
//! Algorithms are deterministic: the same graph and settings always produce
//! the same positions. Cycles are tolerated everywhere.

/// Pure layout algorithms.
pub mod algorithm;

/// Subset arrangement.
pub mod arrange;

/// Applying layouts to a store.
pub mod engine;

/// Layout errors.
pub mod error;

/// Algorithm suggestions.
pub mod suggest;

/// Re-export all common types for easy access.
pub mod prelude {
    pub use crate::algorithm::Positions;
    pub use crate::arrange::{Alignment, Distribution};
    pub use crate::engine::{LayoutEngine, LayoutOptions, LayoutReport};
    pub use crate::error::LayoutError;
    pub use crate::suggest::GraphShape;
}

pub use algorithm::Positions;
pub use arrange::{Alignment, Distribution};
pub use engine::{LayoutEngine, LayoutOptions, LayoutReport};
pub use error::LayoutError;
