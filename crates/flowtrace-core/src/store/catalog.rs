// ── Keyed entity catalog ──
//
// Insertion-ordered grouping of entities under a lookup key with cheap
// `Arc` snapshots per key. Lookups of unknown keys return a shared empty
// snapshot instead of `None`.

use std::borrow::Borrow;
use std::hash::Hash;
use std::sync::Arc;

use indexmap::IndexMap;

/// Entities grouped by key, preserving insertion order within each key
/// and across keys.
#[derive(Debug, Clone)]
pub(crate) struct Catalog<K, T> {
    by_key: IndexMap<K, Arc<Vec<T>>>,
    empty: Arc<Vec<T>>,
}

impl<K: Hash + Eq, T: Clone> Catalog<K, T> {
    pub(crate) fn new() -> Self {
        Self {
            by_key: IndexMap::new(),
            empty: Arc::new(Vec::new()),
        }
    }

    /// Append `entity` under `key`.
    pub(crate) fn push(&mut self, key: K, entity: T) {
        let slot = self.by_key.entry(key).or_default();
        Arc::make_mut(slot).push(entity);
    }

    /// Snapshot of every entity stored under `key` (cheap `Arc` clone).
    pub(crate) fn get<Q>(&self, key: &Q) -> Arc<Vec<T>>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.by_key
            .get(key)
            .map_or_else(|| Arc::clone(&self.empty), Arc::clone)
    }

    /// Every entity, key by key in insertion order.
    pub(crate) fn values(&self) -> impl Iterator<Item = &T> {
        self.by_key.values().flat_map(|v| v.iter())
    }

    /// Total number of entities across all keys.
    pub(crate) fn len(&self) -> usize {
        self.by_key.values().map(|v| v.len()).sum()
    }
}
