//! The event bus.
//!
//! [`EventBus`] is a cheaply cloneable handle to a subscription registry.
//! Subscriptions are keyed by event name (`"*"` receives everything) and
//! invoked in priority order, highest first, ties broken by registration
//! order. `emit` awaits each handler in turn, so handler side effects are
//! observed in dispatch order even when handlers are asynchronous.
//!
//! # Namespaces
//!
//! [`EventBus::namespace`] creates a child bus. An event emitted on a child
//! travels in three phases:
//!
//! 1. **Capture**: ancestors, root first, run their `capture` handlers for
//!    the prefixed name (`"child:node:created"` as seen by the parent).
//! 2. **Target**: the child runs its middleware and all local handlers.
//! 3. **Bubble**: the event is forwarded to each ancestor in turn, prefixed
//!    with the namespace, where middleware and non-capture handlers run.
//!
//! `stop_propagation` ends the journey at the current bus;
//! `stop_immediate_propagation` also skips the remaining handlers there.
//!
//! # Failures
//!
//! Handler errors and panics never escape `emit`. They are logged and
//! re-emitted on the same bus as a `canvas:error` event; failures inside a
//! `canvas:error` handler are only logged.

use core::fmt;
use core::future::Future;
use core::pin::Pin;
use std::collections::VecDeque;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use futures::FutureExt;
use hashbrown::HashMap;
use parking_lot::{Mutex, RwLock};
use trellis_core::clock::{SharedClock, SystemClock};
use trellis_core::config::EventBusConfig;

use crate::event::{CanvasEvent, CanvasEventType, ErrorEventData, EventName, EventPayload};
use crate::middleware::EventMiddleware;

/// A boxed, sendable future.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Error type returned by fallible handlers.
pub type HandlerError = Box<dyn core::error::Error + Send + Sync>;

type HandlerFn =
    Arc<dyn Fn(CanvasEvent) -> BoxFuture<'static, Result<(), HandlerError>> + Send + Sync>;

/// Event name that matches every event on a bus.
pub const WILDCARD: &str = "*";

// ─────────────────────────────────────────────────────────────────────────────
// Subscriptions
// ─────────────────────────────────────────────────────────────────────────────

/// Identifier returned by the `on*` methods, accepted by [`EventBus::off`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionId(Arc<str>);

impl SubscriptionId {
    fn generate() -> Self {
        Self(format!("sub_{}", nanoid::nanoid!(12)).into())
    }

    /// Returns the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Per-subscription options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ListenerConfig {
    /// Remove the subscription before its first invocation.
    pub once: bool,
    /// Higher runs first.
    pub priority: i32,
    /// Run during the capture phase for events from child namespaces.
    pub capture: bool,
}

impl ListenerConfig {
    /// Default options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fire at most once.
    #[must_use]
    pub fn once(mut self) -> Self {
        self.once = true;
        self
    }

    /// Sets the priority.
    #[must_use]
    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Listen during the capture phase.
    #[must_use]
    pub fn capture(mut self) -> Self {
        self.capture = true;
        self
    }
}

struct Subscription {
    id: SubscriptionId,
    event_type: String,
    config: ListenerConfig,
    seq: u64,
    active: AtomicBool,
    handler: HandlerFn,
}

/// Read-only view of a subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionInfo {
    /// Identifier.
    pub id: SubscriptionId,
    /// Subscribed event name.
    pub event_type: String,
    /// Options.
    pub config: ListenerConfig,
    /// Whether the subscription will still fire.
    pub active: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Capture,
    Target,
    Bubble,
}

impl Phase {
    fn admits(self, config: &ListenerConfig) -> bool {
        match self {
            Phase::Capture => config.capture,
            Phase::Target => true,
            Phase::Bubble => !config.capture,
        }
    }
}

/// What happened to an emitted event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EmitReport {
    /// Handlers that ran, across all buses.
    pub delivered: usize,
    /// Whether a handler called `prevent_default`.
    pub default_prevented: bool,
    /// Whether a handler stopped propagation.
    pub propagation_stopped: bool,
    /// Whether middleware dropped the event.
    pub dropped: bool,
}

// ─────────────────────────────────────────────────────────────────────────────
// History ring
// ─────────────────────────────────────────────────────────────────────────────

struct HistoryRing {
    enabled: bool,
    capacity: usize,
    events: VecDeque<CanvasEvent>,
}

impl HistoryRing {
    fn record(&mut self, event: &CanvasEvent) {
        if !self.enabled || self.capacity == 0 {
            return;
        }
        while self.events.len() >= self.capacity {
            self.events.pop_front();
        }
        self.events.push_back(event.clone());
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// EventBus
// ─────────────────────────────────────────────────────────────────────────────

struct BusInner {
    namespace: Option<String>,
    parent: Option<EventBus>,
    children: Mutex<Vec<Weak<BusInner>>>,
    subscriptions: RwLock<HashMap<String, Vec<Arc<Subscription>>>>,
    middleware: RwLock<Vec<Arc<dyn EventMiddleware>>>,
    history: Mutex<HistoryRing>,
    max_listeners: AtomicUsize,
    next_seq: AtomicU64,
    emitted: AtomicU64,
    destroyed: AtomicBool,
    clock: SharedClock,
}

/// A typed publish/subscribe bus with namespaces, middleware and history.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

/// A non-owning handle to an [`EventBus`].
#[derive(Clone)]
pub struct WeakEventBus {
    inner: Weak<BusInner>,
}

impl WeakEventBus {
    /// Returns the bus if it is still alive.
    #[must_use]
    pub fn upgrade(&self) -> Option<EventBus> {
        self.inner.upgrade().map(|inner| EventBus { inner })
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("path", &self.path())
            .field("event_names", &self.event_names())
            .field("destroyed", &self.is_destroyed())
            .finish()
    }
}

impl EventBus {
    /// Creates a root bus with default settings and the system clock.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(&EventBusConfig::default(), SystemClock::shared())
    }

    /// Creates a root bus.
    #[must_use]
    pub fn with_config(config: &EventBusConfig, clock: SharedClock) -> Self {
        Self::build(None, None, config, clock)
    }

    fn build(
        namespace: Option<String>,
        parent: Option<EventBus>,
        config: &EventBusConfig,
        clock: SharedClock,
    ) -> Self {
        Self {
            inner: Arc::new(BusInner {
                namespace,
                parent,
                children: Mutex::new(Vec::new()),
                subscriptions: RwLock::new(HashMap::new()),
                middleware: RwLock::new(Vec::new()),
                history: Mutex::new(HistoryRing {
                    enabled: config.history_enabled,
                    capacity: config.history_size,
                    events: VecDeque::new(),
                }),
                max_listeners: AtomicUsize::new(config.max_listeners),
                next_seq: AtomicU64::new(0),
                emitted: AtomicU64::new(0),
                destroyed: AtomicBool::new(false),
                clock,
            }),
        }
    }

    /// Returns a non-owning handle.
    #[must_use]
    pub fn downgrade(&self) -> WeakEventBus {
        WeakEventBus {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Current time from the bus clock.
    #[must_use]
    pub fn now(&self) -> u64 {
        self.inner.clock.now_millis()
    }

    /// The clock used to stamp events.
    #[must_use]
    pub fn clock(&self) -> SharedClock {
        Arc::clone(&self.inner.clock)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Registration
    // ─────────────────────────────────────────────────────────────────────────

    /// Registers a synchronous handler.
    pub fn on<F>(&self, event_type: impl Into<EventName>, handler: F) -> SubscriptionId
    where
        F: Fn(&CanvasEvent) + Send + Sync + 'static,
    {
        self.on_with(event_type, ListenerConfig::default(), handler)
    }

    /// Registers a synchronous handler that fires at most once.
    pub fn once<F>(&self, event_type: impl Into<EventName>, handler: F) -> SubscriptionId
    where
        F: Fn(&CanvasEvent) + Send + Sync + 'static,
    {
        self.on_with(event_type, ListenerConfig::default().once(), handler)
    }

    /// Registers a synchronous handler with explicit options.
    pub fn on_with<F>(
        &self,
        event_type: impl Into<EventName>,
        config: ListenerConfig,
        handler: F,
    ) -> SubscriptionId
    where
        F: Fn(&CanvasEvent) + Send + Sync + 'static,
    {
        let handler = Arc::new(handler);
        self.subscribe(
            event_type.into(),
            config,
            Arc::new(
                move |event: CanvasEvent| -> BoxFuture<'static, Result<(), HandlerError>> {
                    let handler = Arc::clone(&handler);
                    Box::pin(async move {
                        handler(&event);
                        Ok::<(), HandlerError>(())
                    })
                },
            ),
        )
    }

    /// Registers an asynchronous, fallible handler.
    ///
    /// `emit` awaits the returned future before invoking the next handler.
    pub fn on_async<F, Fut>(
        &self,
        event_type: impl Into<EventName>,
        config: ListenerConfig,
        handler: F,
    ) -> SubscriptionId
    where
        F: Fn(CanvasEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
    {
        self.subscribe(
            event_type.into(),
            config,
            Arc::new(
                move |event: CanvasEvent| -> BoxFuture<'static, Result<(), HandlerError>> {
                    Box::pin(handler(event))
                },
            ),
        )
    }

    fn subscribe(
        &self,
        event_type: EventName,
        config: ListenerConfig,
        handler: HandlerFn,
    ) -> SubscriptionId {
        let id = SubscriptionId::generate();
        let key = event_type.as_str().to_owned();
        let subscription = Arc::new(Subscription {
            id: id.clone(),
            event_type: key.clone(),
            config,
            seq: self.inner.next_seq.fetch_add(1, Ordering::Relaxed),
            active: AtomicBool::new(true),
            handler,
        });

        let count = {
            let mut subscriptions = self.inner.subscriptions.write();
            let entries = subscriptions.entry(key.clone()).or_default();
            entries.push(subscription);
            entries.len()
        };

        let max = self.inner.max_listeners.load(Ordering::Relaxed);
        if max > 0 && count > max {
            tracing::warn!(
                bus = %self.path(),
                event_type = %key,
                count,
                max,
                "listener count exceeds max listeners; possible leak"
            );
        }
        id
    }

    /// Removes a subscription. Returns false if it was not registered.
    pub fn off(&self, id: &SubscriptionId) -> bool {
        let mut subscriptions = self.inner.subscriptions.write();
        for entries in subscriptions.values_mut() {
            if let Some(idx) = entries.iter().position(|sub| &sub.id == id) {
                let removed = entries.remove(idx);
                removed.active.store(false, Ordering::SeqCst);
                return true;
            }
        }
        false
    }

    /// Removes all subscriptions for `event_type`, or every subscription.
    pub fn remove_all_listeners(&self, event_type: Option<&str>) {
        let mut subscriptions = self.inner.subscriptions.write();
        let drained: Vec<Arc<Subscription>> = match event_type {
            Some(key) => subscriptions.remove(key).unwrap_or_default(),
            None => subscriptions.drain().flat_map(|(_, subs)| subs).collect(),
        };
        for sub in drained {
            sub.active.store(false, Ordering::SeqCst);
        }
    }

    /// Number of active subscriptions for `event_type`.
    #[must_use]
    pub fn listener_count(&self, event_type: &str) -> usize {
        self.inner
            .subscriptions
            .read()
            .get(event_type)
            .map_or(0, |subs| {
                subs.iter()
                    .filter(|sub| sub.active.load(Ordering::SeqCst))
                    .count()
            })
    }

    /// Event names with at least one subscription, sorted.
    #[must_use]
    pub fn event_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .inner
            .subscriptions
            .read()
            .iter()
            .filter(|(_, subs)| !subs.is_empty())
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }

    /// Subscriptions for `event_type`, in dispatch order.
    #[must_use]
    pub fn listeners(&self, event_type: &str) -> Vec<SubscriptionInfo> {
        let subscriptions = self.inner.subscriptions.read();
        let mut subs: Vec<&Arc<Subscription>> =
            subscriptions.get(event_type).into_iter().flatten().collect();
        subs.sort_by_key(|sub| (core::cmp::Reverse(sub.config.priority), sub.seq));
        subs.into_iter()
            .map(|sub| SubscriptionInfo {
                id: sub.id.clone(),
                event_type: sub.event_type.clone(),
                config: sub.config,
                active: sub.active.load(Ordering::SeqCst),
            })
            .collect()
    }

    /// Sets the per-type listener count above which registration warns.
    /// Zero disables the warning.
    pub fn set_max_listeners(&self, max: usize) {
        self.inner.max_listeners.store(max, Ordering::Relaxed);
    }

    /// Current listener warning threshold.
    #[must_use]
    pub fn max_listeners(&self) -> usize {
        self.inner.max_listeners.load(Ordering::Relaxed)
    }

    /// Appends a middleware stage.
    pub fn add_middleware(&self, middleware: impl EventMiddleware) {
        self.inner.middleware.write().push(Arc::new(middleware));
    }

    /// Removes all middleware.
    pub fn clear_middleware(&self) {
        self.inner.middleware.write().clear();
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Emission
    // ─────────────────────────────────────────────────────────────────────────

    /// Dispatches an event and waits for every handler to finish.
    pub async fn emit(&self, event: CanvasEvent) -> EmitReport {
        self.emit_boxed(event).await
    }

    /// Shorthand for emitting a catalogued event.
    pub async fn emit_type(&self, kind: CanvasEventType, payload: EventPayload) -> EmitReport {
        self.emit_boxed(CanvasEvent::new(kind, payload)).await
    }

    fn emit_boxed(&self, mut event: CanvasEvent) -> BoxFuture<'_, EmitReport> {
        Box::pin(async move {
            let mut report = EmitReport::default();
            if self.is_destroyed() {
                tracing::debug!(bus = %self.path(), event = %event.name(), "emit on destroyed bus ignored");
                return report;
            }
            event.stamp_if_unset(self.now());

            // Capture: root first, each ancestor sees its own prefixed name.
            let mut captures = Vec::new();
            let mut name = event.name().clone();
            let mut bus = self.clone();
            while let Some(parent) = bus.inner.parent.clone() {
                name = name.prefixed(bus.namespace_name());
                captures.push((parent.clone(), name.clone()));
                bus = parent;
            }
            for (ancestor, name) in captures.iter().rev() {
                if event.propagation_stopped() {
                    break;
                }
                let captured = event.renamed(name.clone());
                report.delivered += ancestor.invoke_handlers(&captured, Phase::Capture).await;
            }

            // Target, then bubble.
            let mut current = event.clone();
            if !current.propagation_stopped() {
                let (delivered, passed) = self.deliver(current.clone(), Phase::Target).await;
                report.delivered += delivered;
                match passed {
                    Some(passed) => current = passed,
                    None => report.dropped = true,
                }

                let mut bus = self.clone();
                while !report.dropped && !current.propagation_stopped() {
                    let Some(parent) = bus.inner.parent.clone() else {
                        break;
                    };
                    let forwarded = current.renamed(current.name().prefixed(bus.namespace_name()));
                    let (delivered, passed) = parent.deliver(forwarded, Phase::Bubble).await;
                    report.delivered += delivered;
                    match passed {
                        Some(passed) => current = passed,
                        None => report.dropped = true,
                    }
                    bus = parent;
                }
            }

            report.default_prevented = current.default_prevented();
            report.propagation_stopped = current.propagation_stopped();
            report
        })
    }

    /// Runs middleware, records history and invokes handlers on this bus.
    async fn deliver(&self, event: CanvasEvent, phase: Phase) -> (usize, Option<CanvasEvent>) {
        if self.is_destroyed() {
            return (0, None);
        }
        let stages: Vec<Arc<dyn EventMiddleware>> = self.inner.middleware.read().clone();
        let mut event = event;
        for stage in stages {
            match stage.handle(event) {
                Some(next) => event = next,
                None => {
                    tracing::trace!(bus = %self.path(), "event dropped by middleware");
                    return (0, None);
                }
            }
        }

        self.inner.history.lock().record(&event);
        self.inner.emitted.fetch_add(1, Ordering::Relaxed);

        let delivered = self.invoke_handlers(&event, phase).await;
        (delivered, Some(event))
    }

    async fn invoke_handlers(&self, event: &CanvasEvent, phase: Phase) -> usize {
        let mut matching: Vec<Arc<Subscription>> = {
            let subscriptions = self.inner.subscriptions.read();
            [event.name().as_str(), WILDCARD]
                .into_iter()
                .filter_map(|key| subscriptions.get(key))
                .flatten()
                .filter(|sub| phase.admits(&sub.config))
                .cloned()
                .collect()
        };
        matching.sort_by_key(|sub| (core::cmp::Reverse(sub.config.priority), sub.seq));

        tracing::trace!(
            bus = %self.path(),
            event = %event.name(),
            handlers = matching.len(),
            ?phase,
            "dispatching"
        );

        let mut delivered = 0;
        for sub in matching {
            if event.immediate_stopped() {
                break;
            }
            if sub.config.once {
                if !sub.active.swap(false, Ordering::SeqCst) {
                    continue;
                }
                self.off(&sub.id);
            } else if !sub.active.load(Ordering::SeqCst) {
                continue;
            }

            let invoked =
                std::panic::catch_unwind(AssertUnwindSafe(|| (sub.handler)(event.clone())));
            let outcome = match invoked {
                Ok(future) => match AssertUnwindSafe(future).catch_unwind().await {
                    Ok(result) => result.map_err(|err| err.to_string()),
                    Err(panic) => Err(panic_message(panic.as_ref())),
                },
                Err(panic) => Err(panic_message(panic.as_ref())),
            };
            delivered += 1;

            if let Err(message) = outcome {
                self.report_failure(event, &sub, message).await;
            }
        }
        delivered
    }

    async fn report_failure(&self, event: &CanvasEvent, sub: &Subscription, message: String) {
        tracing::warn!(
            bus = %self.path(),
            event = %event.name(),
            subscription = %sub.id,
            error = %message,
            "event handler failed"
        );
        let is_diagnostic = event.name().as_str() == CanvasEventType::CanvasError.as_str()
            || event.name().as_str().ends_with(":canvas:error");
        if is_diagnostic {
            return;
        }
        let diagnostic = CanvasEvent::new(
            CanvasEventType::CanvasError,
            EventPayload::Error(ErrorEventData {
                message,
                event_type: Some(event.name().to_string()),
                subscription: Some(sub.id.clone()),
            }),
        )
        .from_source("event-bus");
        self.emit_boxed(diagnostic).await;
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Namespaces & lifecycle
    // ─────────────────────────────────────────────────────────────────────────

    /// Returns the child bus called `name`, creating it if needed.
    ///
    /// Children inherit the listener threshold, history settings and clock.
    #[must_use]
    pub fn namespace(&self, name: &str) -> EventBus {
        let mut children = self.inner.children.lock();
        children.retain(|child| child.strong_count() > 0);
        let existing = children.iter().filter_map(Weak::upgrade).find(|child| {
            child.namespace.as_deref() == Some(name) && !child.destroyed.load(Ordering::SeqCst)
        });
        if let Some(inner) = existing {
            return EventBus { inner };
        }

        let config = {
            let history = self.inner.history.lock();
            EventBusConfig {
                max_listeners: self.max_listeners(),
                history_enabled: history.enabled,
                history_size: history.capacity,
            }
        };
        let child = Self::build(
            Some(name.to_owned()),
            Some(self.clone()),
            &config,
            Arc::clone(&self.inner.clock),
        );
        children.push(Arc::downgrade(&child.inner));
        child
    }

    fn namespace_name(&self) -> &str {
        self.inner.namespace.as_deref().unwrap_or_default()
    }

    /// Colon-separated namespace path; empty for the root.
    #[must_use]
    pub fn path(&self) -> String {
        let mut segments = Vec::new();
        let mut bus = Some(self.clone());
        while let Some(current) = bus {
            if let Some(name) = &current.inner.namespace {
                segments.push(name.clone());
            }
            bus = current.inner.parent.clone();
        }
        segments.reverse();
        segments.join(":")
    }

    /// Parent bus, for namespaces.
    #[must_use]
    pub fn parent(&self) -> Option<EventBus> {
        self.inner.parent.clone()
    }

    /// Drops all subscriptions, middleware, history and children.
    /// Later `emit` calls do nothing.
    pub fn destroy(&self) {
        if self.inner.destroyed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.remove_all_listeners(None);
        self.clear_middleware();
        self.inner.history.lock().events.clear();
        let children: Vec<Weak<BusInner>> = self.inner.children.lock().drain(..).collect();
        for child in children.iter().filter_map(Weak::upgrade) {
            EventBus { inner: child }.destroy();
        }
        tracing::info!(bus = %self.path(), "event bus destroyed");
    }

    /// Whether [`destroy`](Self::destroy) was called.
    #[must_use]
    pub fn is_destroyed(&self) -> bool {
        self.inner.destroyed.load(Ordering::SeqCst)
    }

    /// Events that passed through this bus's middleware so far.
    #[must_use]
    pub fn emitted_count(&self) -> u64 {
        self.inner.emitted.load(Ordering::Relaxed)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // History
    // ─────────────────────────────────────────────────────────────────────────

    /// Recorded events, oldest first, optionally filtered by name and
    /// limited to the most recent `limit`.
    #[must_use]
    pub fn get_history(&self, event_type: Option<&str>, limit: Option<usize>) -> Vec<CanvasEvent> {
        let history = self.inner.history.lock();
        let matching: Vec<&CanvasEvent> = history
            .events
            .iter()
            .filter(|event| event_type.is_none_or(|name| event.name().as_str() == name))
            .collect();
        let skip = limit.map_or(0, |limit| matching.len().saturating_sub(limit));
        matching.into_iter().skip(skip).cloned().collect()
    }

    /// Forgets recorded events.
    pub fn clear_history(&self) {
        self.inner.history.lock().events.clear();
    }

    /// Starts recording events.
    pub fn enable_history(&self) {
        self.inner.history.lock().enabled = true;
    }

    /// Stops recording events. Already recorded events are kept.
    pub fn disable_history(&self) {
        self.inner.history.lock().enabled = false;
    }

    /// Whether events are being recorded.
    #[must_use]
    pub fn is_history_enabled(&self) -> bool {
        self.inner.history.lock().enabled
    }
}

fn panic_message(panic: &(dyn core::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        format!("handler panicked: {message}")
    } else if let Some(message) = panic.downcast_ref::<String>() {
        format!("handler panicked: {message}")
    } else {
        "handler panicked".to_owned()
    }
}
