//! Typed publish/subscribe registry.
//!
//! Handlers are keyed by [`EventKind`] and invoked in subscription order.
//! The handler list is copied before dispatch, so a handler may subscribe
//! or unsubscribe (itself included) while running. A panicking handler is
//! logged and does not affect its siblings.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use futures_util::FutureExt;
use tracing::{error, warn};

use crate::lock;

/// Event categories shared by the device and client sides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EventKind {
    /// A vector was defined (client side).
    Definition,
    /// A vector's state changed.
    StateUpdate,
    /// An element's value changed.
    Change,
    /// A client asked to write an element (device side, preventable).
    Write,
    /// An element's value is about to be read (device side).
    Read,
}

impl EventKind {
    pub const ALL: [EventKind; 5] = [
        EventKind::Definition,
        EventKind::StateUpdate,
        EventKind::Change,
        EventKind::Write,
        EventKind::Read,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::Definition => "definition",
            EventKind::StateUpdate => "state",
            EventKind::Change => "change",
            EventKind::Write => "write",
            EventKind::Read => "read",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An event that can travel over an [`EventBus`].
pub trait BusEvent: Clone + Send + Sync + 'static {
    fn kind(&self) -> EventKind;
}

/// Handle returned by `subscribe`, used to detach the handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        SubscriptionId(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

/// Boxed future produced by async handlers.
pub type BoxFuture = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

enum Handler<E> {
    Sync(Arc<dyn Fn(&E) + Send + Sync>),
    Async(Arc<dyn Fn(E) -> BoxFuture + Send + Sync>),
}

impl<E> Clone for Handler<E> {
    fn clone(&self) -> Self {
        match self {
            Handler::Sync(f) => Handler::Sync(Arc::clone(f)),
            Handler::Async(f) => Handler::Async(Arc::clone(f)),
        }
    }
}

type HandlerMap<E> = HashMap<EventKind, BTreeMap<SubscriptionId, Handler<E>>>;

/// Per-source handler registry.
pub struct EventBus<E> {
    handlers: Mutex<HandlerMap<E>>,
}

impl<E> Default for EventBus<E> {
    fn default() -> Self {
        Self {
            handlers: Mutex::new(HashMap::new()),
        }
    }
}

impl<E> fmt::Debug for EventBus<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let count: usize = lock(&self.handlers).values().map(BTreeMap::len).sum();
        f.debug_struct("EventBus").field("handlers", &count).finish()
    }
}

impl<E: BusEvent> EventBus<E> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a synchronous handler for one event kind.
    pub fn subscribe<F>(&self, kind: EventKind, handler: F) -> SubscriptionId
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        self.subscribe_kinds(&[kind], handler)
    }

    /// Register one synchronous handler for several kinds under a single id.
    pub fn subscribe_kinds<F>(&self, kinds: &[EventKind], handler: F) -> SubscriptionId
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        self.insert(kinds, Handler::Sync(Arc::new(handler)))
    }

    /// Register an async handler. Each event spawns the returned future on
    /// the ambient tokio runtime; raising never waits for it.
    pub fn subscribe_async<F, Fut>(&self, kind: EventKind, handler: F) -> SubscriptionId
    where
        F: Fn(E) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let boxed = move |event: E| -> BoxFuture { Box::pin(handler(event)) };
        self.insert(&[kind], Handler::Async(Arc::new(boxed)))
    }

    fn insert(&self, kinds: &[EventKind], handler: Handler<E>) -> SubscriptionId {
        let id = SubscriptionId::next();
        let mut map = lock(&self.handlers);
        for kind in kinds {
            map.entry(*kind).or_default().insert(id, handler.clone());
        }
        id
    }

    /// Detach a handler from every kind it was registered for.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut map = lock(&self.handlers);
        let mut removed = false;
        for handlers in map.values_mut() {
            removed |= handlers.remove(&id).is_some();
        }
        removed
    }

    /// Number of (kind, handler) registrations.
    pub fn handler_count(&self) -> usize {
        lock(&self.handlers).values().map(BTreeMap::len).sum()
    }

    /// Invoke every handler registered for the event's kind.
    pub fn raise(&self, event: &E) {
        let kind = event.kind();
        let handlers: Vec<Handler<E>> = lock(&self.handlers)
            .get(&kind)
            .map(|m| m.values().cloned().collect())
            .unwrap_or_default();

        for handler in handlers {
            match handler {
                Handler::Sync(f) => {
                    if catch_unwind(AssertUnwindSafe(|| f(event))).is_err() {
                        error!(%kind, "event handler panicked");
                    }
                }
                Handler::Async(f) => match tokio::runtime::Handle::try_current() {
                    Ok(runtime) => match catch_unwind(AssertUnwindSafe(|| f(event.clone()))) {
                        Ok(future) => {
                            runtime.spawn(async move {
                                if AssertUnwindSafe(future).catch_unwind().await.is_err() {
                                    error!(%kind, "async event handler panicked");
                                }
                            });
                        }
                        Err(_) => error!(%kind, "async event handler panicked"),
                    },
                    Err(_) => warn!(%kind, "no tokio runtime, async handler skipped"),
                },
            }
        }
    }
}
