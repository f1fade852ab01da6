//! Concurrency properties P8 (concurrent safety) and P9 (per-producer
//! async FIFO), exercised with real OS threads.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use bus_core::metadata::handler1;
use bus_core::{message_type, Bus, HandlerMetadata, Listener};

struct Tick(usize);
message_type!(Tick);

struct Counter {
    total: AtomicUsize,
}

impl Listener for Counter {
    fn handlers() -> Vec<HandlerMetadata> {
        vec![handler1::<Counter, Tick, _>(|l: &Counter, _: &Tick| {
            l.total.fetch_add(1, Ordering::SeqCst);
        })]
    }
}

/// P8: concurrent publishers and concurrent subscribe/unsubscribe never
/// crash or corrupt the registry; every publish that happened while at
/// least one instance was subscribed produces a bounded, accounted-for
/// number of invocations (no double counting of a fixed, never-removed
/// subscriber set).
#[test]
fn p8_concurrent_publish_and_subscribe_churn_does_not_crash() {
    let bus = Arc::new(Bus::new());
    let stable = Arc::new(Counter { total: AtomicUsize::new(0) });
    bus.subscribe(stable.clone());

    const PUBLISHES_PER_THREAD: usize = 2000;
    std::thread::scope(|scope| {
        for _ in 0..4 {
            let bus = bus.clone();
            scope.spawn(move || {
                for i in 0..PUBLISHES_PER_THREAD {
                    bus.publish(Tick(i));
                }
            });
        }
        for _ in 0..4 {
            let bus = bus.clone();
            scope.spawn(move || {
                for _ in 0..500 {
                    let transient = Arc::new(Counter { total: AtomicUsize::new(0) });
                    bus.subscribe(transient.clone());
                    bus.unsubscribe(&transient);
                }
            });
        }
    });

    // The permanently-subscribed instance must see exactly one invocation
    // per publish: 4 threads * PUBLISHES_PER_THREAD each.
    assert_eq!(stable.total.load(Ordering::SeqCst), 4 * PUBLISHES_PER_THREAD);
}

/// P9: for a single producer thread, async publications are dequeued (and
/// may be processed on different workers) in the order they were
/// enqueued — verified here with a single worker so processing order is
/// also delivery order.
#[test]
fn p9_single_producer_async_messages_processed_in_fifo_order() {
    use bus_core::BusConfig;

    struct OrderRecorder {
        seen: Mutex<Vec<usize>>,
    }
    impl Listener for OrderRecorder {
        fn handlers() -> Vec<HandlerMetadata> {
            vec![handler1::<OrderRecorder, Tick, _>(|l: &OrderRecorder, t: &Tick| {
                l.seen.lock().unwrap().push(t.0);
            })]
        }
    }

    let bus = Bus::with_config(BusConfig::builder().worker_count(1).queue_capacity(256).build());
    let recorder = Arc::new(OrderRecorder { seen: Mutex::new(Vec::new()) });
    bus.subscribe(recorder.clone());

    const N: usize = 200;
    for i in 0..N {
        bus.publish_async(Tick(i)).unwrap();
    }

    let deadline = std::time::Instant::now() + std::time::Duration::from_secs(5);
    while recorder.seen.lock().unwrap().len() < N && std::time::Instant::now() < deadline {
        std::thread::yield_now();
    }

    let seen = recorder.seen.lock().unwrap();
    let expected: Vec<usize> = (0..N).collect();
    assert_eq!(*seen, expected);
}
