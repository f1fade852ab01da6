//! Component 4: the Subscription Registry (spec §3/§4.3) — the
//! authoritative index from listener class, single message type, and
//! message-type tuple to the subscriptions that declare them, plus the
//! Supertype/VarArg caches layered on top.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::info;

use crate::cache::{KeyedCache, SubList};
use crate::metadata::Arity;
use crate::oracle::TypeOracle;
use crate::subscription::{ListenerHandle, Subscription};
use crate::types::{Kind, Listener, Message};

/// A trie over `[TypeId]` keys: `byTupleTrie` in spec §3.
#[derive(Default)]
struct TrieNode {
    children: HashMap<TypeId, TrieNode>,
    subs: Vec<Arc<Subscription>>,
}

#[derive(Default)]
struct TupleTrie {
    root: TrieNode,
}

impl TupleTrie {
    fn insert(&mut self, types: &[TypeId], sub: Arc<Subscription>) {
        let mut node = &mut self.root;
        for t in types {
            node = node.children.entry(*t).or_default();
        }
        node.subs.push(sub);
    }

    fn get(&self, types: &[TypeId]) -> Option<&[Arc<Subscription>]> {
        let mut node = &self.root;
        for t in types {
            node = node.children.get(t)?;
        }
        (!node.subs.is_empty()).then_some(node.subs.as_slice())
    }
}

#[derive(Default)]
struct Tables {
    by_listener_class: HashMap<TypeId, Vec<Arc<Subscription>>>,
    /// Keyed by [`Kind`] rather than a bare `TypeId`: a scalar handler for
    /// `T` and a varargs handler for `T[]` share the same element
    /// `TypeId` and must not collide in the same bucket (spec I2).
    by_single_type: HashMap<Kind, Vec<Arc<Subscription>>>,
    by_tuple: TupleTrie,
    non_listeners: std::collections::HashSet<TypeId>,
}

/// The registry: three indices, a non-listener short-circuit set, the
/// Supertype/VarArg caches, and the monotone varArg-possibility flag.
pub struct Registry {
    tables: RwLock<Tables>,
    oracle: TypeOracle,
    has_vararg_handlers: AtomicBool,
    super_cache_single: KeyedCache<TypeId>,
    super_cache_tuple: KeyedCache<Vec<TypeId>>,
    vararg_exact_cache: KeyedCache<TypeId>,
    vararg_super_cache: KeyedCache<TypeId>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
            oracle: TypeOracle::new(),
            has_vararg_handlers: AtomicBool::new(false),
            super_cache_single: KeyedCache::default(),
            super_cache_tuple: KeyedCache::default(),
            vararg_exact_cache: KeyedCache::default(),
            vararg_super_cache: KeyedCache::default(),
        }
    }

    pub(crate) fn oracle(&self) -> &TypeOracle {
        &self.oracle
    }

    pub(crate) fn vararg_possible(&self) -> bool {
        self.has_vararg_handlers.load(Ordering::Acquire)
    }

    fn clear_caches(&self) {
        self.super_cache_single.clear();
        self.super_cache_tuple.clear();
        self.vararg_exact_cache.clear();
        self.vararg_super_cache.clear();
    }

    /// spec §4.3 `subscribe(listener)`.
    pub fn subscribe<L: Listener + Any + Send + Sync + 'static>(&self, listener: Arc<L>) {
        let class = TypeId::of::<L>();
        {
            let tables = self.tables.read();
            if tables.non_listeners.contains(&class) {
                return;
            }
            if let Some(subs) = tables.by_listener_class.get(&class) {
                let handle: ListenerHandle = listener;
                for sub in subs {
                    sub.subscribe(handle.clone());
                }
                return;
            }
        }

        let handler_metadata = L::handlers();
        if handler_metadata.is_empty() {
            self.tables.write().non_listeners.insert(class);
            return;
        }

        let new_subs: Vec<Arc<Subscription>> =
            handler_metadata.into_iter().map(|m| Arc::new(Subscription::new(m))).collect();
        let handle: ListenerHandle = listener;
        for sub in &new_subs {
            sub.subscribe(handle.clone());
        }

        let mut tables = self.tables.write();
        if let Some(existing) = tables.by_listener_class.get(&class) {
            // Lost the race: another thread registered this class first.
            for sub in existing {
                sub.subscribe(handle.clone());
            }
            drop(tables);
            // The subscriptions we built are now orphaned (never indexed);
            // explicitly unsubscribe our handle from them so they don't
            // keep the listener alive for nothing.
            for sub in &new_subs {
                sub.unsubscribe(&handle);
            }
            return;
        }

        let mut any_vararg = false;
        for sub in &new_subs {
            let meta = sub.metadata();
            any_vararg |= meta.accepts_var_args();
            match meta.arity() {
                Arity::One => {
                    tables
                        .by_single_type
                        .entry(Kind::Scalar(meta.param_types()[0]))
                        .or_default()
                        .push(sub.clone());
                }
                Arity::Variadic => {
                    tables
                        .by_single_type
                        .entry(Kind::Array(meta.param_types()[0]))
                        .or_default()
                        .push(sub.clone());
                }
                Arity::Two | Arity::Three => {
                    tables.by_tuple.insert(meta.param_types(), sub.clone());
                }
            }
        }
        tables.by_listener_class.insert(class, new_subs);
        drop(tables);

        if any_vararg {
            self.has_vararg_handlers.store(true, Ordering::Release);
        }
        self.clear_caches();
        info!(listener_class = std::any::type_name::<L>(), "listener subscribed");
    }

    /// spec §4.3 `unsubscribe(listener)`.
    pub fn unsubscribe<L: Listener + Any + Send + Sync + 'static>(&self, listener: &Arc<L>) {
        let class = TypeId::of::<L>();
        let tables = self.tables.read();
        if tables.non_listeners.contains(&class) {
            return;
        }
        let Some(subs) = tables.by_listener_class.get(&class) else {
            return;
        };
        let handle: ListenerHandle = listener.clone();
        for sub in subs {
            sub.unsubscribe(&handle);
        }
        drop(tables);
        // No table mutation, but I3 requires caches not to serve stale
        // subscription references, so clear unconditionally.
        self.clear_caches();
    }

    pub(crate) fn subscriptions_exact(&self, type_id: TypeId) -> SubList {
        self.tables
            .read()
            .by_single_type
            .get(&Kind::Scalar(type_id))
            .map(|v| Arc::new(v.clone()))
            .unwrap_or_default()
    }

    pub(crate) fn subscriptions_exact_tuple(&self, types: &[TypeId]) -> SubList {
        self.tables.read().by_tuple.get(types).map(|s| Arc::new(s.to_vec())).unwrap_or_default()
    }

    /// spec §4.3 `subscriptionsSuper(T)`.
    pub(crate) fn subscriptions_super<T: Message>(&self) -> SubList {
        let key = TypeId::of::<T>();
        self.super_cache_single.get_or_compute(key, || {
            let supers = self.oracle.super_types::<T>();
            let tables = self.tables.read();
            let mut out = Vec::new();
            for super_type in supers.iter() {
                if let Some(subs) = tables.by_single_type.get(&Kind::Scalar(*super_type)) {
                    out.extend(subs.iter().filter(|s| s.metadata().accepts_subtypes()).cloned());
                }
            }
            Arc::new(out)
        })
    }

    /// spec §4.3 `subscriptionsSuper(T1,...,Tn)`: every subscription whose
    /// declared parameter sequence is reachable by choosing, at each
    /// position, either the published type itself or one of its proper
    /// supertypes — except the single all-exact combination, which is
    /// `subscriptions_exact_tuple`'s job alone (a handler whose declared
    /// tuple is exactly `types` must not also be returned here, or it
    /// would be invoked twice per publish, once per bucket).
    ///
    /// Each position's candidate list is built `[T_i] ++ superTypes(T_i)`
    /// in the Oracle's own BFS order (not `HashMap` iteration order, which
    /// would make invocation order within this bucket vary across
    /// processes — spec §4.3's "Tie-breaks and ordering" paragraph calls
    /// this out as part of the test contract), and combinations are
    /// visited with the first position as the outermost loop so the
    /// result order is anchored to the first operand's traversal order.
    pub(crate) fn subscriptions_super_tuple(&self, types: &[TypeId], per_position_supers: &[Arc<Vec<TypeId>>]) -> SubList {
        self.super_cache_tuple.get_or_compute(types.to_vec(), || {
            let tables = self.tables.read();
            let candidates: Vec<Vec<TypeId>> = types
                .iter()
                .zip(per_position_supers.iter())
                .map(|(exact, supers)| {
                    let mut v = Vec::with_capacity(1 + supers.len());
                    v.push(*exact);
                    v.extend(supers.iter().copied());
                    v
                })
                .collect();

            let mut seen = std::collections::HashSet::new();
            let mut out = Vec::new();
            let mut prefix = Vec::with_capacity(types.len());
            visit_declared_combinations(&candidates, &mut prefix, &mut |declared| {
                if declared == types {
                    return;
                }
                if let Some(subs) = tables.by_tuple.get(declared) {
                    for sub in subs {
                        if sub.metadata().accepts_subtypes() && seen.insert(Arc::as_ptr(sub) as *const ()) {
                            out.push(sub.clone());
                        }
                    }
                }
            });
            Arc::new(out)
        })
    }

    /// spec §4.3 `varArgExact(T)`. Looked up by the *element* type's
    /// `TypeId` tagged [`Kind::Array`] — see `SPEC_FULL.md` §0 for why this
    /// crate never needs an actual `Vec<T>` Rust type to key the array
    /// bucket.
    pub(crate) fn vararg_exact<T: Message>(&self) -> SubList {
        let element = TypeId::of::<T>();
        self.vararg_exact_cache.get_or_compute(element, || {
            let tables = self.tables.read();
            tables
                .by_single_type
                .get(&Kind::Array(element))
                .map(|subs| Arc::new(subs.iter().filter(|s| s.metadata().accepts_var_args()).cloned().collect()))
                .unwrap_or_default()
        })
    }

    /// spec §4.3 `varArgSuper(T)`: "array-of-S is a supertype of
    /// array-of-T whenever S is a supertype of T" (spec §4.3's
    /// `varArgSuper` definition) is implemented directly over the
    /// element's own supertype closure rather than a `Vec<T>` closure.
    pub(crate) fn vararg_super<T: Message>(&self) -> SubList {
        let element = TypeId::of::<T>();
        self.vararg_super_cache.get_or_compute(element, || {
            let supers = self.oracle.super_types::<T>();
            let tables = self.tables.read();
            let mut out = Vec::new();
            for super_type in supers.iter() {
                if let Some(subs) = tables.by_single_type.get(&Kind::Array(*super_type)) {
                    out.extend(
                        subs.iter()
                            .filter(|s| s.metadata().accepts_subtypes() && s.metadata().accepts_var_args())
                            .cloned(),
                    );
                }
            }
            Arc::new(out)
        })
    }

    /// spec §4.3 `varArgSuper(T1,...,Tn)`: pairwise common-subscription
    /// intersection across `varArgSuper(T_i)`, preserving the first
    /// operand's order. Exposed for API completeness (see `DESIGN.md`);
    /// the dispatch core does not wire this into ordinary tuple publishes
    /// because a varargs handler is, by construction, single-typed.
    pub(crate) fn vararg_super_intersection(&self, per_position: &[SubList]) -> SubList {
        let Some((first, rest)) = per_position.split_first() else {
            return SubList::default();
        };
        let out: Vec<Arc<Subscription>> = first
            .iter()
            .filter(|candidate| {
                rest.iter().all(|others| others.iter().any(|o| Arc::ptr_eq(o, candidate)))
            })
            .cloned()
            .collect();
        Arc::new(out)
    }
}

/// Visit every combination obtainable by picking one entry from each of
/// `candidates[0], candidates[1], ...` in turn, outermost position first,
/// so the visit order is anchored to `candidates[0]`'s own order.
fn visit_declared_combinations(candidates: &[Vec<TypeId>], prefix: &mut Vec<TypeId>, visit: &mut impl FnMut(&[TypeId])) {
    let pos = prefix.len();
    if pos == candidates.len() {
        visit(prefix);
        return;
    }
    for ty in &candidates[pos] {
        prefix.push(*ty);
        visit_declared_combinations(candidates, prefix, visit);
        prefix.pop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message_type;
    use crate::metadata::{handler1, handler_vararg, HandlerMetadata};
    use std::any::TypeId;

    struct Number;
    struct Integer;
    message_type!(Number);
    message_type!(Integer => [Number]);

    struct ScalarListener;
    impl Listener for ScalarListener {
        fn handlers() -> Vec<HandlerMetadata> {
            vec![handler1::<ScalarListener, Number, _>(|_l: &ScalarListener, _: &Number| {})]
        }
    }

    struct VarArgListener;
    impl Listener for VarArgListener {
        fn handlers() -> Vec<HandlerMetadata> {
            vec![handler_vararg::<VarArgListener, Number, _>(false, |_l: &VarArgListener, _: &[_]| {})]
        }
    }

    /// A scalar handler for `T` and a varargs handler for `T[]` share the
    /// element `TypeId`; they must land in disjoint buckets (spec I2).
    #[test]
    fn scalar_and_vararg_handlers_on_the_same_element_type_do_not_collide() {
        let registry = Registry::new();
        registry.subscribe(Arc::new(ScalarListener));
        registry.subscribe(Arc::new(VarArgListener));

        let exact = registry.subscriptions_exact(TypeId::of::<Number>());
        assert_eq!(exact.len(), 1, "only the scalar handler should be in the exact-scalar bucket");

        let vararg_exact = registry.vararg_exact::<Number>();
        assert_eq!(vararg_exact.len(), 1, "only the vararg handler should be in the exact-array bucket");
    }

    struct NonListener;
    impl Listener for NonListener {
        fn handlers() -> Vec<HandlerMetadata> {
            vec![]
        }
    }

    #[test]
    fn subscribing_a_class_with_no_handlers_is_remembered_as_a_non_listener() {
        let registry = Registry::new();
        registry.subscribe(Arc::new(NonListener));
        registry.subscribe(Arc::new(NonListener));
        assert_eq!(registry.subscriptions_exact(TypeId::of::<Number>()).len(), 0);
    }

    /// Subscriptions are retained for the process lifetime (spec
    /// Lifecycle note): unsubscribing the last listener empties the
    /// subscription's own listener set but never removes it from the
    /// registry's tables, so `subscriptions_exact` keeps returning it —
    /// downstream dispatch code is the layer that must check for live
    /// listeners, not the registry index (see `dispatch::bucket_has_live_listener`).
    #[test]
    fn unsubscribe_retains_the_subscription_but_empties_its_listener_set() {
        let registry = Registry::new();
        let listener = Arc::new(ScalarListener);
        registry.subscribe(listener.clone());
        let before = registry.subscriptions_exact(TypeId::of::<Number>());
        assert_eq!(before.len(), 1);
        assert!(!before[0].is_empty());

        registry.unsubscribe(&listener);
        let after = registry.subscriptions_exact(TypeId::of::<Number>());
        assert_eq!(after.len(), 1, "the subscription itself is never removed from the registry");
        assert!(after[0].is_empty(), "but its listener set is now empty");
    }

    #[test]
    fn vararg_super_reaches_a_handler_declared_over_the_elements_supertype() {
        struct PolyVarArgListener;
        impl Listener for PolyVarArgListener {
            fn handlers() -> Vec<HandlerMetadata> {
                vec![handler_vararg::<PolyVarArgListener, Number, _>(true, |_l: &PolyVarArgListener, _: &[_]| {})]
            }
        }

        let registry = Registry::new();
        registry.subscribe(Arc::new(PolyVarArgListener));

        assert_eq!(registry.vararg_exact::<Integer>().len(), 0, "Integer[] is not an exact Number[] match");
        assert_eq!(registry.vararg_super::<Integer>().len(), 1, "Number[] is a supertype of Integer[]");
    }

    struct Text;
    message_type!(Text);

    /// spec S5's literal case at the registry level: a two-arg handler
    /// declared `(Number, Text)` with `acceptsSubtypes=true` must match a
    /// published `(Integer, Text)` even though only position 0 is a
    /// strict supertype match — position 1 matches *exactly*. A predicate
    /// that requires every position to be a strict supertype would drop
    /// this candidate entirely.
    #[test]
    fn subscriptions_super_tuple_matches_when_only_some_positions_are_strict_supertypes() {
        use crate::metadata::handler2_poly;

        struct PairListener;
        impl Listener for PairListener {
            fn handlers() -> Vec<HandlerMetadata> {
                vec![handler2_poly::<PairListener, Number, Text, _>(|_l, _a, _b| {})]
            }
        }

        let registry = Registry::new();
        registry.subscribe(Arc::new(PairListener));

        let types = [TypeId::of::<Integer>(), TypeId::of::<Text>()];
        let per_position_supers =
            vec![registry.oracle().super_types::<Integer>(), registry.oracle().super_types::<Text>()];
        let supers = registry.subscriptions_super_tuple(&types, &per_position_supers);
        assert_eq!(supers.len(), 1, "(Number, Text) matches published (Integer, Text)");

        // The fully-exact (Number, Text) publish is `subscriptions_exact_tuple`'s
        // job alone; it must not also appear in the super bucket (else it
        // would be invoked twice per publish).
        let exact_types = [TypeId::of::<Number>(), TypeId::of::<Text>()];
        let exact_supers = vec![registry.oracle().super_types::<Number>(), registry.oracle().super_types::<Text>()];
        let supers_for_exact = registry.subscriptions_super_tuple(&exact_types, &exact_supers);
        assert_eq!(supers_for_exact.len(), 0, "an all-positions-exact publish is exact_tuple's match, not super_tuple's");
    }
}
