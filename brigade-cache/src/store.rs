//! Authoritative map from collection keys to entry snapshots.
//!
//! The store is the only shared mutable state in the cache. Every write
//! goes through `apply`, which holds the write lock for the whole
//! read-modify-write, so no caller can observe a partial update. Writers
//! are the mutation coordinator and the fetch orchestrator; everything
//! else reads.

use crate::entry::{CacheEntry, EntryStatus};
use brigade_core::{CollectionKey, Entity, KeyMatcher};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

struct EntrySlot<T> {
    entry: Arc<CacheEntry<T>>,
    last_touched: Instant,
}

/// Keyed storage of collection snapshots.
pub struct CacheStore<T: Entity> {
    entries: RwLock<HashMap<CollectionKey, EntrySlot<T>>>,
}

impl<T: Entity> Default for CacheStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Entity> CacheStore<T> {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Read-only lookup; `None` if the key has never been touched.
    pub fn get(&self, key: CollectionKey) -> Option<Arc<CacheEntry<T>>> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries.get(&key).map(|slot| slot.entry.clone())
    }

    /// Lookup with lazy creation: an untouched key materializes as an
    /// empty Stale entry, created on first subscribe or fetch.
    pub fn entry(&self, key: CollectionKey) -> Arc<CacheEntry<T>> {
        if let Some(entry) = self.get(key) {
            return entry;
        }
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries
            .entry(key)
            .or_insert_with(|| EntrySlot {
                entry: Arc::new(CacheEntry::empty(key)),
                last_touched: Instant::now(),
            })
            .entry
            .clone()
    }

    /// All keys currently cached.
    pub fn keys(&self) -> Vec<CollectionKey> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries.keys().copied().collect()
    }

    /// Keys the matcher selects, in no particular order.
    pub fn keys_matching(&self, matcher: &KeyMatcher) -> Vec<CollectionKey> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries
            .keys()
            .filter(|key| matcher.matches(key))
            .copied()
            .collect()
    }

    /// Atomic read-modify-write. `patch` runs under the write lock and
    /// must not block. If the patched entry carries the same version the
    /// swap is skipped and the previous snapshot is returned, so callers
    /// can use pointer identity to decide whether to notify.
    pub fn apply(
        &self,
        key: CollectionKey,
        patch: impl FnOnce(&CacheEntry<T>) -> CacheEntry<T>,
    ) -> Arc<CacheEntry<T>> {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        let slot = entries.entry(key).or_insert_with(|| EntrySlot {
            entry: Arc::new(CacheEntry::empty(key)),
            last_touched: Instant::now(),
        });
        let next = patch(&slot.entry);
        slot.last_touched = Instant::now();
        if next.version == slot.entry.version {
            return slot.entry.clone();
        }
        slot.entry = Arc::new(next);
        slot.entry.clone()
    }

    /// Guarded status transition; an illegal move is refused and logged.
    pub fn set_status(&self, key: CollectionKey, status: EntryStatus) -> Arc<CacheEntry<T>> {
        self.apply(key, |entry| match entry.with_status(status) {
            Some(next) => next,
            None => {
                tracing::debug!(
                    %key,
                    from = ?entry.status,
                    to = ?status,
                    "refusing illegal status transition"
                );
                entry.clone()
            }
        })
    }

    /// Record a read-side touch (subscription activity) so the entry is
    /// not considered idle.
    pub fn touch(&self, key: CollectionKey) {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        if let Some(slot) = entries.get_mut(&key) {
            slot.last_touched = Instant::now();
        }
    }

    /// Evict entries that have had zero subscribers for longer than
    /// `idle`. Returns the number of entries dropped.
    pub fn evict_idle(
        &self,
        idle: Duration,
        subscriber_count: impl Fn(&CollectionKey) -> usize,
    ) -> usize {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        let now = Instant::now();
        let before = entries.len();
        entries.retain(|key, slot| {
            subscriber_count(key) > 0 || now.duration_since(slot.last_touched) < idle
        });
        let dropped = before - entries.len();
        if dropped > 0 {
            tracing::debug!(dropped, "evicted idle cache entries");
        }
        dropped
    }
}
