// ── Generic reactive entity collection ──
//
// Lock-free concurrent storage with O(1) lookups and push-based
// change notification via `watch` channels.

use std::collections::HashSet;
use std::hash::Hash;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::watch;

pub(crate) type Snapshot<T> = Arc<Vec<Arc<T>>>;

/// A lock-free, reactive collection for a single entity type.
///
/// Every mutation bumps a version counter and rebuilds the snapshot that
/// subscribers receive. Entities are stored behind `Arc` and replaced
/// wholesale on update, so readers never observe a half-written value.
pub(crate) struct EntityCollection<K, T>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    T: Send + Sync + 'static,
{
    by_key: DashMap<K, Arc<T>>,

    /// Version counter, bumped on every mutation.
    version: watch::Sender<u64>,

    /// Full snapshot, rebuilt on mutation for efficient subscription.
    snapshot: watch::Sender<Snapshot<T>>,
}

impl<K, T> EntityCollection<K, T>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
{
    pub(crate) fn new() -> Self {
        let (version, _) = watch::channel(0u64);
        let (snapshot, _) = watch::channel(Arc::new(Vec::new()));

        Self {
            by_key: DashMap::new(),
            version,
            snapshot,
        }
    }

    /// Insert or replace an entity. Returns `true` if the key was new.
    pub(crate) fn upsert(&self, key: K, entity: T) -> bool {
        let is_new = self.by_key.insert(key, Arc::new(entity)).is_none();
        self.rebuild_snapshot();
        self.bump_version();
        is_new
    }

    /// Remove an entity by key. Returns the removed entity if it existed.
    pub(crate) fn remove(&self, key: &K) -> Option<Arc<T>> {
        let removed = self.by_key.remove(key).map(|(_, v)| v);
        if removed.is_some() {
            self.rebuild_snapshot();
            self.bump_version();
        }
        removed
    }

    /// Apply `f` to a copy of the entity and store the result.
    /// Returns `None` if the key is absent, else `f`'s return value.
    pub(crate) fn modify<R>(&self, key: &K, f: impl FnOnce(&mut T) -> R) -> Option<R> {
        let out = {
            let mut slot = self.by_key.get_mut(key)?;
            let mut next = T::clone(slot.value());
            let out = f(&mut next);
            *slot.value_mut() = Arc::new(next);
            out
        };
        self.rebuild_snapshot();
        self.bump_version();
        Some(out)
    }

    pub(crate) fn get(&self, key: &K) -> Option<Arc<T>> {
        self.by_key.get(key).map(|r| Arc::clone(r.value()))
    }

    /// Get the current snapshot (cheap `Arc` clone).
    pub(crate) fn snapshot(&self) -> Snapshot<T> {
        self.snapshot.borrow().clone()
    }

    /// Subscribe to snapshot changes via a `watch::Receiver`.
    pub(crate) fn subscribe(&self) -> watch::Receiver<Snapshot<T>> {
        self.snapshot.subscribe()
    }

    pub(crate) fn version(&self) -> u64 {
        *self.version.borrow()
    }

    pub(crate) fn len(&self) -> usize {
        self.by_key.len()
    }

    pub(crate) fn keys(&self) -> Vec<K> {
        self.by_key.iter().map(|r| r.key().clone()).collect()
    }

    /// Upsert all incoming entities, then prune any existing keys not in
    /// the incoming set. Avoids the brief empty state a clear would cause.
    pub(crate) fn upsert_and_prune(&self, items: Vec<(K, T)>) {
        let incoming: HashSet<K> = items.iter().map(|(k, _)| k.clone()).collect();
        for (key, entity) in items {
            self.upsert(key, entity);
        }
        for existing in self.keys() {
            if !incoming.contains(&existing) {
                self.remove(&existing);
            }
        }
    }

    // ── Private helpers ──────────────────────────────────────────────

    fn rebuild_snapshot(&self) {
        let values: Vec<Arc<T>> = self.by_key.iter().map(|r| Arc::clone(r.value())).collect();
        // `send_modify` updates unconditionally, even with zero receivers.
        self.snapshot.send_modify(|snap| *snap = Arc::new(values));
    }

    fn bump_version(&self) {
        self.version.send_modify(|v| *v += 1);
    }
}
