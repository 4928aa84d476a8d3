//! # Trellis Internal Library
//!
//! Re-exports the core Trellis crates for convenience.

/// Layer 1: canvas data model, configuration and result types.
pub use trellis_core;

/// Layer 1: typed events and the event bus.
pub use trellis_events;

/// Layer 2: structural, workflow and user validation rules.
pub use trellis_validation;

/// Layer 2: graph store, history, selection and queries.
pub use trellis_graph;

/// Layer 3: automatic layout and arrangement.
pub use trellis_layout;

/// Layer 4: service boundary and canvas facade.
pub use trellis_services;

/// Re-export all common types for easy access.
pub mod prelude {
    pub use trellis_core::prelude::*;
    pub use trellis_events::prelude::*;
    pub use trellis_graph::prelude::*;
    pub use trellis_layout::prelude::*;
    pub use trellis_services::prelude::*;
    pub use trellis_validation::prelude::*;
}
