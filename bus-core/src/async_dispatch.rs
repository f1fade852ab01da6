//! Component 8: Asynchronous Dispatch (spec §4.5).
//!
//! A bounded multi-producer multi-consumer queue of dispatch jobs, drained
//! by a fixed worker pool, built on `crossbeam_channel` — the same crate
//! `audio-backend::cpal_backend` uses for its producer/consumer handoff.
//! A bounded channel already blocks a sender when full and a receiver
//! when empty — the exact backpressure/suspension points spec §5 calls
//! out — so the queue and the free-list spec §4.5 describes as separate
//! collaborators are unified here into one channel: there is no reusable
//! `MessageHolder` pool, because boxing one closure per publish is already
//! the cheapest allocation Rust's ownership model allows, and pooling
//! would only add bookkeeping to save what is already a single small
//! `Box`. See `DESIGN.md` for this deviation.
//!
//! Shutdown is modeled as a second, zero-capacity channel: dropping its
//! sender closes it, and every worker (and every in-flight `publish_async`
//! call) is racing a `recv` on it via [`crossbeam_channel::select!`], so
//! shutdown interrupts blocked sends and idle workers alike without
//! polling.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{self as channel, select, Receiver, Sender};
use parking_lot::Mutex;
use tracing::{debug, info};

use crate::config::BusConfig;
use crate::dispatch;
use crate::error::BusError;
use crate::registry::Registry;
use crate::sink::SinkList;
use crate::types::Message;

type Job = Box<dyn FnOnce() + Send>;

pub(crate) struct AsyncDispatcher {
    sender: Sender<Job>,
    shutdown_flag: Arc<AtomicBool>,
    shutdown_tx: Mutex<Option<Sender<()>>>,
    shutdown_rx: Receiver<()>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl AsyncDispatcher {
    pub(crate) fn new(config: &BusConfig) -> Self {
        let (sender, receiver) = channel::bounded::<Job>(config.queue_capacity());
        let (shutdown_tx, shutdown_rx) = channel::bounded::<()>(0);
        let shutdown_flag = Arc::new(AtomicBool::new(false));

        let mut workers = Vec::with_capacity(config.worker_count());
        for id in 0..config.worker_count() {
            let receiver = receiver.clone();
            let shutdown_rx = shutdown_rx.clone();
            let shutdown_flag = shutdown_flag.clone();
            workers.push(
                std::thread::Builder::new()
                    .name(format!("bus-core-worker-{id}"))
                    .spawn(move || worker_loop(id, receiver, shutdown_rx, shutdown_flag))
                    .expect("bus-core: failed to spawn async dispatch worker thread"),
            );
        }

        Self {
            sender,
            shutdown_flag,
            shutdown_tx: Mutex::new(Some(shutdown_tx)),
            shutdown_rx,
            workers: Mutex::new(workers),
        }
    }

    fn is_shutting_down(&self) -> bool {
        self.shutdown_flag.load(Ordering::Acquire)
    }

    fn enqueue(&self, job: Job, timeout: Option<Duration>) -> Result<(), BusError> {
        if self.is_shutting_down() {
            return Err(BusError::ShuttingDown);
        }
        match timeout {
            None => {
                select! {
                    send(self.sender, job) -> res => res.map_err(|_| BusError::ShuttingDown),
                    recv(self.shutdown_rx) -> _ => Err(BusError::ShuttingDown),
                }
            }
            Some(duration) => {
                select! {
                    send(self.sender, job) -> res => res.map_err(|_| BusError::ShuttingDown),
                    recv(self.shutdown_rx) -> _ => Err(BusError::ShuttingDown),
                    recv(channel::after(duration)) -> _ => Err(BusError::EnqueueTimeout),
                }
            }
        }
    }

    pub(crate) fn publish_async<T>(
        &self,
        registry: Arc<Registry>,
        sinks: SinkList,
        message: T,
        timeout: Option<Duration>,
    ) -> Result<(), BusError>
    where
        T: Message,
    {
        let job: Job = Box::new(move || dispatch::publish_one(&registry, &sinks, message));
        self.enqueue(job, timeout)
    }

    pub(crate) fn publish_async2<A, B>(
        &self,
        registry: Arc<Registry>,
        sinks: SinkList,
        a: A,
        b: B,
        timeout: Option<Duration>,
    ) -> Result<(), BusError>
    where
        A: Message,
        B: Message,
    {
        let job: Job = Box::new(move || dispatch::publish_two(&registry, &sinks, a, b));
        self.enqueue(job, timeout)
    }

    pub(crate) fn publish_async3<A, B, C>(
        &self,
        registry: Arc<Registry>,
        sinks: SinkList,
        a: A,
        b: B,
        c: C,
        timeout: Option<Duration>,
    ) -> Result<(), BusError>
    where
        A: Message,
        B: Message,
        C: Message,
    {
        let job: Job = Box::new(move || dispatch::publish_three(&registry, &sinks, a, b, c));
        self.enqueue(job, timeout)
    }

    pub(crate) fn publish_async_many<T: Message>(
        &self,
        registry: Arc<Registry>,
        sinks: SinkList,
        items: Vec<Arc<T>>,
        timeout: Option<Duration>,
    ) -> Result<(), BusError> {
        let job: Job = Box::new(move || dispatch::publish_array(&registry, &sinks, items));
        self.enqueue(job, timeout)
    }

    pub(crate) fn has_pending_messages(&self) -> bool {
        self.sender.len() > 0
    }

    /// Idempotent: the first caller to observe the flag transition performs
    /// the channel close and worker join; later callers return immediately.
    pub(crate) fn shutdown(&self) {
        if self.shutdown_flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire).is_err() {
            return;
        }
        info!("bus shutting down, signaling async workers");
        self.shutdown_tx.lock().take(); // drop closes the channel
        let handles = std::mem::take(&mut *self.workers.lock());
        for handle in handles {
            let _ = handle.join();
        }
        info!("all async dispatch workers exited");
    }
}

impl Drop for AsyncDispatcher {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop(id: usize, receiver: Receiver<Job>, shutdown_rx: Receiver<()>, shutdown_flag: Arc<AtomicBool>) {
    loop {
        select! {
            recv(receiver) -> msg => match msg {
                Ok(job) => job(),
                Err(_) => break,
            },
            recv(shutdown_rx) -> _ => break,
        }
        if shutdown_flag.load(Ordering::Acquire) {
            break;
        }
    }
    debug!(worker = id, "async dispatch worker exiting");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{PublicationError, SharedMessage};
    use crate::message_type;
    use crate::metadata::handler1;
    use crate::sink::ErrorSink;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    struct Ping;
    message_type!(Ping);

    struct Counter {
        count: AtomicUsize,
    }

    impl crate::types::Listener for Counter {
        fn handlers() -> Vec<crate::metadata::HandlerMetadata> {
            vec![handler1::<Counter, Ping, _>(|l: &Counter, _: &Ping| {
                l.count.fetch_add(1, Ordering::SeqCst);
            })]
        }
    }

    struct NullSink;
    impl ErrorSink for NullSink {
        fn handle(&self, _error: PublicationError) {}
    }

    fn sinks() -> SinkList {
        Arc::new(parking_lot::RwLock::new(vec![Arc::new(NullSink) as Arc<dyn ErrorSink>]))
    }

    #[test]
    fn publish_async_reaches_subscribed_listener() {
        let registry = Arc::new(Registry::new());
        let listener = Arc::new(Counter { count: AtomicUsize::new(0) });
        registry.subscribe(listener.clone());

        let config = BusConfig::builder().worker_count(2).queue_capacity(16).build();
        let dispatcher = AsyncDispatcher::new(&config);
        for _ in 0..50 {
            dispatcher.publish_async(registry.clone(), sinks(), Ping, None).unwrap();
        }

        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while listener.count.load(Ordering::SeqCst) < 50 && std::time::Instant::now() < deadline {
            std::thread::yield_now();
        }
        assert_eq!(listener.count.load(Ordering::SeqCst), 50);
        dispatcher.shutdown();
    }

    #[test]
    fn shutdown_is_idempotent_and_stops_workers() {
        let config = BusConfig::builder().worker_count(2).queue_capacity(4).build();
        let dispatcher = AsyncDispatcher::new(&config);
        dispatcher.shutdown();
        dispatcher.shutdown();
        assert!(dispatcher.workers.lock().is_empty());
    }

    #[test]
    fn publish_after_shutdown_is_rejected() {
        let registry = Arc::new(Registry::new());
        let config = BusConfig::builder().worker_count(1).queue_capacity(4).build();
        let dispatcher = AsyncDispatcher::new(&config);
        dispatcher.shutdown();

        let result = dispatcher.publish_async(registry, sinks(), Ping, None);
        assert!(matches!(result, Err(BusError::ShuttingDown)));
    }

    #[test]
    fn has_pending_messages_reflects_queue_occupancy() {
        let registry = Arc::new(Registry::new());
        let config = BusConfig::builder().worker_count(1).queue_capacity(8).build();
        let dispatcher = AsyncDispatcher::new(&config);
        assert!(!dispatcher.has_pending_messages());
        // No subscribers, but the job still occupies the queue until a
        // worker pulls it; use a generous queue and check promptly.
        dispatcher.publish_async(registry, sinks(), Ping, None).unwrap();
        // Either still queued or already drained by a worker; both are
        // valid observations of a live system, so just exercise the call.
        let _ = dispatcher.has_pending_messages();
        dispatcher.shutdown();
    }
}
