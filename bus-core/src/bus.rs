//! The public `Bus` surface (spec §6).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;

use crate::async_dispatch::AsyncDispatcher;
use crate::config::BusConfig;
use crate::dispatch;
use crate::error::BusError;
use crate::registry::Registry;
use crate::sink::{ErrorSink, SinkList, TracingErrorSink};
use crate::types::{Listener, Message};

/// An in-process publish/subscribe message bus.
///
/// `Bus` is cheap to clone (it's a handle around `Arc`-backed state) and
/// safe to share across threads: every operation here is internally
/// synchronized, following the locking discipline in `SPEC_FULL.md`'s
/// carried-over §5.
pub struct Bus {
    registry: Arc<Registry>,
    sinks: SinkList,
    async_dispatcher: AsyncDispatcher,
    shut_down: AtomicBool,
}

impl Bus {
    /// A bus using [`BusConfig::default`].
    pub fn new() -> Self {
        Self::with_config(BusConfig::default())
    }

    pub fn with_config(config: BusConfig) -> Self {
        let sinks: SinkList = Arc::new(RwLock::new(vec![Arc::new(TracingErrorSink) as Arc<dyn ErrorSink>]));
        Self {
            registry: Arc::new(Registry::new()),
            sinks,
            async_dispatcher: AsyncDispatcher::new(&config),
            shut_down: AtomicBool::new(false),
        }
    }

    /// Register every handler method of `listener`'s class (spec §4.3).
    /// A no-op if the class has no handlers.
    pub fn subscribe<L: Listener + Send + Sync + 'static>(&self, listener: Arc<L>) {
        self.registry.subscribe(listener);
    }

    /// Remove `listener` from every subscription it belongs to. A no-op if
    /// it was never subscribed (spec P7).
    pub fn unsubscribe<L: Listener + Send + Sync + 'static>(&self, listener: &Arc<L>) {
        self.registry.unsubscribe(listener);
    }

    /// Register an additional error sink (spec §6 `addErrorHandler`). The
    /// bus ships with a [`TracingErrorSink`] already installed; sinks fire
    /// in registration order and never see the installed sink replaced.
    pub fn add_error_handler(&self, sink: Arc<dyn ErrorSink>) {
        self.sinks.write().push(sink);
    }

    /// `publish(m1)` — spec §4.4.
    pub fn publish<T: Message>(&self, message: T) {
        dispatch::publish_one(&self.registry, &self.sinks, message);
    }

    /// `publish(m1, m2)`.
    pub fn publish2<A: Message, B: Message>(&self, a: A, b: B) {
        dispatch::publish_two(&self.registry, &self.sinks, a, b);
    }

    /// `publish(m1, m2, m3)`.
    pub fn publish3<A: Message, B: Message, C: Message>(&self, a: A, b: B, c: C) {
        dispatch::publish_three(&self.registry, &self.sinks, a, b, c);
    }

    /// `publish(m1...mk)` with all `mi` of the same runtime type `T` — also
    /// the direct array-typed publish path (spec P4's "no rewrapping"
    /// case); see `dispatch::publish_array` for why the two coincide here.
    pub fn publish_many<T: Message>(&self, items: Vec<Arc<T>>) {
        dispatch::publish_array(&self.registry, &self.sinks, items);
    }

    /// `publishAsync(args...)` (spec §4.5). Blocks the caller if the
    /// dispatch queue is full; this is the backpressure point.
    pub fn publish_async<T: Message>(&self, message: T) -> Result<(), BusError> {
        if self.shut_down.load(Ordering::Acquire) {
            return Err(BusError::ShuttingDown);
        }
        self.async_dispatcher.publish_async(self.registry.clone(), self.sinks.clone(), message, None)
    }

    /// `publishAsync(timeout, args...)`: bounded wait on enqueue.
    pub fn publish_async_timeout<T: Message>(&self, message: T, timeout: Duration) -> Result<(), BusError> {
        if self.shut_down.load(Ordering::Acquire) {
            return Err(BusError::ShuttingDown);
        }
        self.async_dispatcher.publish_async(self.registry.clone(), self.sinks.clone(), message, Some(timeout))
    }

    pub fn publish_async2<A: Message, B: Message>(&self, a: A, b: B) -> Result<(), BusError> {
        if self.shut_down.load(Ordering::Acquire) {
            return Err(BusError::ShuttingDown);
        }
        self.async_dispatcher.publish_async2(self.registry.clone(), self.sinks.clone(), a, b, None)
    }

    pub fn publish_async3<A: Message, B: Message, C: Message>(&self, a: A, b: B, c: C) -> Result<(), BusError> {
        if self.shut_down.load(Ordering::Acquire) {
            return Err(BusError::ShuttingDown);
        }
        self.async_dispatcher.publish_async3(self.registry.clone(), self.sinks.clone(), a, b, c, None)
    }

    pub fn publish_async_many<T: Message>(&self, items: Vec<Arc<T>>) -> Result<(), BusError> {
        if self.shut_down.load(Ordering::Acquire) {
            return Err(BusError::ShuttingDown);
        }
        self.async_dispatcher.publish_async_many(self.registry.clone(), self.sinks.clone(), items, None)
    }

    /// `hasPendingMessages()`.
    pub fn has_pending_messages(&self) -> bool {
        self.async_dispatcher.has_pending_messages()
    }

    /// `shutdown()` — idempotent; subsequent `publish_async*` calls return
    /// `Err(BusError::ShuttingDown)`. Synchronous `publish*` is unaffected:
    /// the spec scopes shutdown to the asynchronous dispatch path only.
    pub fn shutdown(&self) {
        self.shut_down.store(true, Ordering::Release);
        self.async_dispatcher.shutdown();
    }
}

impl Default for Bus {
    fn default() -> Self {
        Self::new()
    }
}
