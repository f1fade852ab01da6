//! Component 1: the Type Hierarchy Oracle (spec §4.1).
//!
//! Supertype lookup is memoized permanently — the type graph embedded in
//! `Message::super_edges` is fixed for the process, so once a type's
//! closure is computed it never needs recomputing, let alone invalidating.

use crate::types::{Message, SuperEdge};
use parking_lot::RwLock;
use std::any::TypeId;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

/// Memoized supertype closures, keyed by the root type's [`TypeId`].
#[derive(Default)]
pub struct TypeOracle {
    supertypes: RwLock<HashMap<TypeId, Arc<Vec<TypeId>>>>,
}

impl TypeOracle {
    pub fn new() -> Self {
        Self::default()
    }

    /// All proper supertypes reachable from `T`, in breadth-first,
    /// deduplicated traversal order. Empty for root types.
    pub fn super_types<T: Message>(&self) -> Arc<Vec<TypeId>> {
        let key = TypeId::of::<T>();
        if let Some(hit) = self.supertypes.read().get(&key) {
            return hit.clone();
        }
        let computed = Arc::new(Self::bfs_closure(key, T::super_edges()));
        // Another thread may have raced us to compute the same closure;
        // either result is equally valid (the graph is immutable), so
        // just keep whichever landed first.
        let mut guard = self.supertypes.write();
        guard.entry(key).or_insert(computed).clone()
    }

    fn bfs_closure(root: TypeId, root_edges: &'static [SuperEdge]) -> Vec<TypeId> {
        let mut seen: HashSet<TypeId> = HashSet::new();
        seen.insert(root);
        let mut order = Vec::new();
        let mut queue: VecDeque<SuperEdge> = root_edges.iter().copied().collect();
        while let Some((type_id, edges_fn)) = queue.pop_front() {
            if !seen.insert(type_id) {
                continue;
            }
            order.push(type_id);
            for edge in edges_fn() {
                queue.push_back(*edge);
            }
        }
        order
    }
}
