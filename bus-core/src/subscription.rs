//! Component 3: Subscription (spec §3/§4.2).
//!
//! One instance per (listener-class, handler-method) pair, created lazily
//! and retained for the process lifetime (spec's Lifecycle note). The
//! listener set is an `arc-swap`-backed copy-on-write vector so that
//! `publish` never blocks `subscribe`/`unsubscribe` of other instances —
//! publish loads one `Arc` snapshot and iterates it lock-free, exactly
//! the "concurrent listener set" design note in spec §9.

use std::any::Any;
use std::sync::Arc;

use arc_swap::ArcSwap;
use tracing::debug;

use crate::error::{PublicationError, SharedMessage};
use crate::metadata::HandlerMetadata;
use crate::sink::{dispatch_to_sinks, SinkList};

pub(crate) type ListenerHandle = Arc<dyn Any + Send + Sync>;

/// The registry entry uniting a handler with the set of listener
/// instances currently bound to it.
pub struct Subscription {
    pub(crate) metadata: HandlerMetadata,
    listeners: ArcSwap<Vec<ListenerHandle>>,
}

impl Subscription {
    pub(crate) fn new(metadata: HandlerMetadata) -> Self {
        Self { metadata, listeners: ArcSwap::from_pointee(Vec::new()) }
    }

    pub fn metadata(&self) -> &HandlerMetadata {
        &self.metadata
    }

    /// Add `listener` to the set. Not idempotent: subscribing the same
    /// instance twice yields two invocations per publish (spec §4.2).
    pub(crate) fn subscribe(&self, listener: ListenerHandle) {
        self.listeners.rcu(move |current| {
            let mut next = (**current).clone();
            next.push(listener.clone());
            next
        });
    }

    /// Remove `listener`; a no-op if it isn't present (spec P7).
    pub(crate) fn unsubscribe(&self, listener: &ListenerHandle) {
        self.listeners.rcu(move |current| {
            let mut next = Vec::with_capacity(current.len());
            next.extend(current.iter().filter(|l| !Arc::ptr_eq(l, listener)).cloned());
            next
        });
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.listeners.load().is_empty()
    }

    /// Iterate a consistent snapshot of the listener set and invoke the
    /// handler on each with `args`. Handler panics are caught, packaged,
    /// and sent to `sinks`; iteration continues for remaining listeners
    /// (spec §4.2, §7).
    pub(crate) fn publish(&self, args: &[SharedMessage], sinks: &SinkList) {
        let snapshot = self.listeners.load();
        if snapshot.is_empty() {
            return;
        }
        for listener in snapshot.iter() {
            if let Err(panic_payload) = self.metadata.invoke(listener.as_ref(), args) {
                debug!("handler invocation panicked; routing to error sinks");
                let error = PublicationError::with_cause(
                    "handler invocation panicked",
                    Arc::from(panic_payload),
                    args.to_vec(),
                );
                dispatch_to_sinks(sinks, error);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::handler1;
    use crate::message_type;
    use parking_lot::RwLock;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Ping;
    message_type!(Ping);

    struct MyListener {
        count: AtomicUsize,
    }

    fn empty_sinks() -> SinkList {
        Arc::new(RwLock::new(Vec::new()))
    }

    #[test]
    fn publish_invokes_every_subscribed_listener() {
        let metadata = handler1::<MyListener, Ping, _>(|l: &MyListener, _: &Ping| {
            l.count.fetch_add(1, Ordering::SeqCst);
        });
        let sub = Subscription::new(metadata);
        let a: ListenerHandle = Arc::new(MyListener { count: AtomicUsize::new(0) });
        let b: ListenerHandle = Arc::new(MyListener { count: AtomicUsize::new(0) });
        sub.subscribe(a.clone());
        sub.subscribe(b.clone());

        let msg: SharedMessage = Arc::new(Ping);
        sub.publish(&[msg], &empty_sinks());

        assert_eq!(a.downcast_ref::<MyListener>().unwrap().count.load(Ordering::SeqCst), 1);
        assert_eq!(b.downcast_ref::<MyListener>().unwrap().count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unsubscribe_is_idempotent_and_instance_scoped() {
        let metadata = handler1::<MyListener, Ping, _>(|l: &MyListener, _: &Ping| {
            l.count.fetch_add(1, Ordering::SeqCst);
        });
        let sub = Subscription::new(metadata);
        let a: ListenerHandle = Arc::new(MyListener { count: AtomicUsize::new(0) });
        let b: ListenerHandle = Arc::new(MyListener { count: AtomicUsize::new(0) });
        sub.subscribe(a.clone());
        sub.subscribe(b.clone());

        sub.unsubscribe(&a);
        sub.unsubscribe(&a); // no-op, must not affect b or panic

        let msg: SharedMessage = Arc::new(Ping);
        sub.publish(&[msg], &empty_sinks());

        assert_eq!(a.downcast_ref::<MyListener>().unwrap().count.load(Ordering::SeqCst), 0);
        assert_eq!(b.downcast_ref::<MyListener>().unwrap().count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn handler_panic_is_caught_and_reported_not_propagated() {
        struct PanicListener;
        let metadata = handler1::<PanicListener, Ping, _>(|_: &PanicListener, _: &Ping| {
            panic!("boom");
        });
        let sub = Subscription::new(metadata);
        let listener: ListenerHandle = Arc::new(PanicListener);
        sub.subscribe(listener);

        let msg: SharedMessage = Arc::new(Ping);
        // Must not unwind out of publish().
        sub.publish(&[msg], &empty_sinks());
    }
}
