//! Middleware that sees events before a bus dispatches them.
//!
//! Middleware runs in installation order on the bus it was installed on,
//! for events emitted on that bus and for events bubbling up into it. Each
//! stage may pass the event through, replace it, or drop it (`None`), in
//! which case no handler on that bus runs and the event stops travelling.

use crate::event::CanvasEvent;

/// Transforms or drops events before dispatch.
pub trait EventMiddleware: Send + Sync + 'static {
    /// Returns the event to dispatch, or `None` to drop it.
    fn handle(&self, event: CanvasEvent) -> Option<CanvasEvent>;
}

/// Middleware that drops events failing a predicate.
pub struct EventFilter<P> {
    predicate: P,
}

impl<P> EventFilter<P>
where
    P: Fn(&CanvasEvent) -> bool + Send + Sync + 'static,
{
    /// Keeps only events for which `predicate` returns true.
    pub fn new(predicate: P) -> Self {
        Self { predicate }
    }
}

impl<P> EventMiddleware for EventFilter<P>
where
    P: Fn(&CanvasEvent) -> bool + Send + Sync + 'static,
{
    fn handle(&self, event: CanvasEvent) -> Option<CanvasEvent> {
        (self.predicate)(&event).then_some(event)
    }
}

/// Middleware backed by a closure.
pub struct EventMapper<F> {
    map: F,
}

impl<F> EventMapper<F>
where
    F: Fn(CanvasEvent) -> Option<CanvasEvent> + Send + Sync + 'static,
{
    /// Wraps a transform-or-drop closure.
    pub fn new(map: F) -> Self {
        Self { map }
    }
}

impl<F> EventMiddleware for EventMapper<F>
where
    F: Fn(CanvasEvent) -> Option<CanvasEvent> + Send + Sync + 'static,
{
    fn handle(&self, event: CanvasEvent) -> Option<CanvasEvent> {
        (self.map)(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{CanvasEventType, EventPayload};

    #[test]
    fn filter_drops_non_matching_events() {
        let filter = EventFilter::new(|event: &CanvasEvent| event.is(CanvasEventType::NodeCreated));
        let keep = CanvasEvent::new(CanvasEventType::NodeCreated, EventPayload::Empty);
        let drop = CanvasEvent::new(CanvasEventType::NodeDeleted, EventPayload::Empty);
        assert!(filter.handle(keep).is_some());
        assert!(filter.handle(drop).is_none());
    }

    #[test]
    fn mapper_can_replace_events() {
        let mapper = EventMapper::new(|event: CanvasEvent| {
            Some(CanvasEvent::custom("audit", serde_json::json!(event.name().as_str())))
        });
        let out = mapper
            .handle(CanvasEvent::new(CanvasEventType::NodeMoved, EventPayload::Empty))
            .unwrap();
        assert_eq!(out.name().as_str(), "audit");
    }
}
