//! Event bus for Trellis canvases (Layer 1).
//!
//! `trellis_events` provides the publish/subscribe backbone every other
//! Trellis component talks through. The graph store announces mutations on
//! it, the history manager listens for commits on it, and external callers
//! observe the canvas through it.
//!
//! # Core Concepts
//!
//! - [`EventBus`] - Subscription registry with prioritized, sequential dispatch
//! - [`CanvasEvent`] - Name, timestamp, typed [`EventPayload`] and propagation flags
//! - [`CanvasEventType`] - Catalogue of the event names the engine emits
//! - [`EventMiddleware`] - Transform-or-drop stages run before dispatch
//!
//! # Example
//!
//! ```
//! use trellis_events::{CanvasEvent, CanvasEventType, EventBus, EventPayload};
//!
//! # futures::executor::block_on(async {
//! let bus = EventBus::new();
//! bus.on(CanvasEventType::CanvasReady, |event| {
//!     assert!(event.is(CanvasEventType::CanvasReady));
//! });
//! let report = bus
//!     .emit(CanvasEvent::new(CanvasEventType::CanvasReady, EventPayload::Empty))
//!     .await;
//! assert_eq!(report.delivered, 1);
//! # });
//! ```

/// The bus, subscriptions and dispatch.
pub mod bus;

/// Event names, payloads and the in-flight event object.
pub mod event;

/// Pre-dispatch middleware.
pub mod middleware;

/// Re-export all common types for easy access.
pub mod prelude {
    pub use crate::bus::{
        BoxFuture, EmitReport, EventBus, HandlerError, ListenerConfig, SubscriptionId,
        SubscriptionInfo, WILDCARD, WeakEventBus,
    };
    pub use crate::event::{
        CanvasEvent, CanvasEventType, CommitEventData, CommitOrigin, ConnectionEventData,
        ErrorEventData, EventName, EventPayload, FindingSummary, HistoryEventData,
        LayoutEventData, ModeEventData, NodeEventData, PerformanceEventData,
        SelectionEventData, StorageEventData, TransferEventData, UnknownEventType,
        ValidationEventData, ViewportEventData,
    };
    pub use crate::middleware::{EventFilter, EventMapper, EventMiddleware};
}

pub use bus::{EmitReport, EventBus, HandlerError, ListenerConfig, SubscriptionId, WILDCARD};
pub use event::{CanvasEvent, CanvasEventType, EventName, EventPayload};
pub use middleware::EventMiddleware;
