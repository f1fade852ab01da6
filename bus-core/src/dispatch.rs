//! Component 7: the Dispatch Core (spec §4.4).
//!
//! Given a published message tuple, produce the union of matching
//! subscriptions (exact, super, varArg) or fall through to the dead-letter
//! handlers, then invoke outside the registry lock. These are free
//! functions rather than methods on `Registry` so the async dispatch
//! worker (component 8) and the synchronous `Bus::publish*` surface share
//! exactly one code path, as spec §4.5 requires ("a worker dequeues and
//! calls the synchronous path").

use std::any::TypeId;
use std::sync::Arc;

use tracing::debug;

use crate::cache::SubList;
use crate::dead_message::DeadMessage;
use crate::error::SharedMessage;
use crate::registry::Registry;
use crate::sink::SinkList;
use crate::types::Message;

fn invoke_bucket(bucket: &SubList, args: &[SharedMessage], sinks: &SinkList) {
    for sub in bucket.iter() {
        sub.publish(args, sinks);
    }
}

/// Whether `bucket` contains at least one subscription with a live
/// listener. Subscriptions are retained for the process lifetime (spec
/// Lifecycle note) even after their last listener unsubscribes, so a
/// non-empty bucket alone does not mean a publication actually reached
/// anyone — dead-letter fallback (spec §4.4 step 6, scenario S4) must key
/// off live listeners, not off registry bookkeeping.
fn bucket_has_live_listener(bucket: &SubList) -> bool {
    bucket.iter().any(|sub| !sub.is_empty())
}

fn deliver_dead_letter(registry: &Registry, sinks: &SinkList, published: Vec<SharedMessage>) {
    let dead_type = TypeId::of::<DeadMessage>();
    let subs = registry.subscriptions_exact(dead_type);
    if !bucket_has_live_listener(&subs) {
        debug!("publication matched no handler and no DeadMessage subscriber");
        return;
    }
    let envelope: SharedMessage = Arc::new(DeadMessage::new(published));
    invoke_bucket(&subs, std::slice::from_ref(&envelope), sinks);
}

/// `publish(m1)` — single-argument dispatch (spec §4.4, steps 1-6).
pub(crate) fn publish_one<T: Message>(registry: &Registry, sinks: &SinkList, message: T) {
    let scalar: Arc<T> = Arc::new(message);
    let type_id = TypeId::of::<T>();

    let exact = registry.subscriptions_exact(type_id);
    let supers = registry.subscriptions_super::<T>();

    let (vararg_exact, vararg_super) = if registry.vararg_possible() {
        (registry.vararg_exact::<T>(), registry.vararg_super::<T>())
    } else {
        (SubList::default(), SubList::default())
    };

    let any_match = bucket_has_live_listener(&exact)
        || bucket_has_live_listener(&supers)
        || bucket_has_live_listener(&vararg_exact)
        || bucket_has_live_listener(&vararg_super);

    let shared: SharedMessage = scalar.clone();
    let scalar_args = [shared.clone()];
    invoke_bucket(&exact, &scalar_args, sinks);
    invoke_bucket(&supers, &scalar_args, sinks);

    if !vararg_exact.is_empty() || !vararg_super.is_empty() {
        let array: SharedMessage = Arc::new(vec![shared.clone()]);
        let array_args = [array];
        invoke_bucket(&vararg_exact, &array_args, sinks);
        invoke_bucket(&vararg_super, &array_args, sinks);
    }

    if !any_match {
        deliver_dead_letter(registry, sinks, vec![shared]);
    }
}

/// `publish(m1, m2)` — two-argument tuple dispatch.
pub(crate) fn publish_two<A: Message, B: Message>(registry: &Registry, sinks: &SinkList, a: A, b: B) {
    let types = [TypeId::of::<A>(), TypeId::of::<B>()];
    let per_position_supers = vec![registry.oracle().super_types::<A>(), registry.oracle().super_types::<B>()];

    let exact = registry.subscriptions_exact_tuple(&types);
    let supers = registry.subscriptions_super_tuple(&types, &per_position_supers);
    let any_match = bucket_has_live_listener(&exact) || bucket_has_live_listener(&supers);

    let args: [SharedMessage; 2] = [Arc::new(a), Arc::new(b)];
    invoke_bucket(&exact, &args, sinks);
    invoke_bucket(&supers, &args, sinks);

    if !any_match {
        deliver_dead_letter(registry, sinks, args.to_vec());
    }
}

/// `publish(m1, m2, m3)` — three-argument tuple dispatch.
pub(crate) fn publish_three<A: Message, B: Message, C: Message>(
    registry: &Registry,
    sinks: &SinkList,
    a: A,
    b: B,
    c: C,
) {
    let types = [TypeId::of::<A>(), TypeId::of::<B>(), TypeId::of::<C>()];
    let per_position_supers = vec![
        registry.oracle().super_types::<A>(),
        registry.oracle().super_types::<B>(),
        registry.oracle().super_types::<C>(),
    ];

    let exact = registry.subscriptions_exact_tuple(&types);
    let supers = registry.subscriptions_super_tuple(&types, &per_position_supers);
    let any_match = bucket_has_live_listener(&exact) || bucket_has_live_listener(&supers);

    let args: [SharedMessage; 3] = [Arc::new(a), Arc::new(b), Arc::new(c)];
    invoke_bucket(&exact, &args, sinks);
    invoke_bucket(&supers, &args, sinks);

    if !any_match {
        deliver_dead_letter(registry, sinks, args.to_vec());
    }
}

/// `publish(m1...mk)`, k >= 1, all of the same runtime type `T` — the
/// homogeneous-variadic path (spec §4.4's last paragraph) *and* the direct
/// array-typed publish path (spec P4's "no rewrapping" case) are the same
/// operation in this crate: both hand the dispatch core the uniform
/// type-erased array representation and match it via the *same*
/// `varArgExact`/`varArgSuper` buckets a scalar publish's synthesized
/// one-element array would use, with no synthesis step here since the
/// caller already supplied the array. Subscriptions declared over a bare
/// `T` are not reachable this way (they would require implicit iteration,
/// which the spec never calls for).
pub(crate) fn publish_array<T: Message>(registry: &Registry, sinks: &SinkList, items: Vec<Arc<T>>) {
    let exact = registry.vararg_exact::<T>();
    let supers = registry.vararg_super::<T>();
    let any_match = bucket_has_live_listener(&exact) || bucket_has_live_listener(&supers);

    let elements: Vec<SharedMessage> = items.into_iter().map(|item| -> SharedMessage { item }).collect();
    let shared: SharedMessage = Arc::new(elements);
    let args = [shared.clone()];
    invoke_bucket(&exact, &args, sinks);
    invoke_bucket(&supers, &args, sinks);

    if !any_match {
        deliver_dead_letter(registry, sinks, vec![shared]);
    }
}

