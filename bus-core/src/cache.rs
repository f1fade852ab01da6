//! Components 5 & 6: the Supertype and VarArg caches (spec §3/§4.3).
//!
//! Both caches share the same shape: memoized per key, cleared in O(1) on
//! every subscribe/unsubscribe (spec I3). `arc-swap` gives lock-free
//! reads of a whole-map snapshot and cheap read-copy-update population on
//! a miss, so cache population never competes with the registry's own
//! read/write lock.

use std::hash::Hash;
use std::sync::Arc;

use arc_swap::ArcSwap;
use std::collections::HashMap;

use crate::subscription::Subscription;

pub(crate) type SubList = Arc<Vec<Arc<Subscription>>>;

pub(crate) struct KeyedCache<K: Eq + Hash + Clone + Send + Sync + 'static> {
    map: ArcSwap<HashMap<K, SubList>>,
}

impl<K: Eq + Hash + Clone + Send + Sync + 'static> Default for KeyedCache<K> {
    fn default() -> Self {
        Self { map: ArcSwap::from_pointee(HashMap::new()) }
    }
}

impl<K: Eq + Hash + Clone + Send + Sync + 'static> KeyedCache<K> {
    /// Return the cached value for `key`, computing and populating it via
    /// `compute` on a miss. Two threads racing on the same miss both
    /// compute (the registry data is stable under the read lock), and
    /// whichever store wins is equally correct — no coordination needed.
    pub(crate) fn get_or_compute(&self, key: K, compute: impl FnOnce() -> SubList) -> SubList {
        if let Some(hit) = self.map.load().get(&key) {
            return hit.clone();
        }
        let computed = compute();
        let inserted = computed.clone();
        self.map.rcu(move |current| {
            let mut next = (**current).clone();
            next.insert(key.clone(), inserted.clone());
            next
        });
        computed
    }

    /// Clear every entry. Called on every subscribe/unsubscribe (I3).
    pub(crate) fn clear(&self) {
        self.map.store(Arc::new(HashMap::new()));
    }
}
