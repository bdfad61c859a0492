//! Observer registry: notifies subscribers when an entry changes.
//!
//! A generic subject bindable to any UI layer. Callbacks receive the new
//! snapshot `Arc`; change detection is by pointer identity. Unsubscribing
//! is dropping the guard.

use crate::entry::CacheEntry;
use brigade_core::{CollectionKey, Entity};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

type Callback<T> = Arc<dyn Fn(&Arc<CacheEntry<T>>) + Send + Sync>;

pub struct ObserverRegistry<T: Entity> {
    listeners: Mutex<HashMap<CollectionKey, Vec<(u64, Callback<T>)>>>,
    next_id: AtomicU64,
}

impl<T: Entity> Default for ObserverRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Entity> ObserverRegistry<T> {
    pub fn new() -> Self {
        Self {
            listeners: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register a callback for one key. The returned guard unsubscribes
    /// on drop; a view that unmounts simply stops being notified.
    pub fn subscribe(
        self: &Arc<Self>,
        key: CollectionKey,
        callback: impl Fn(&Arc<CacheEntry<T>>) + Send + Sync + 'static,
    ) -> WatchGuard<T> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut listeners = self.listeners.lock().unwrap_or_else(|e| e.into_inner());
        listeners
            .entry(key)
            .or_default()
            .push((id, Arc::new(callback)));
        WatchGuard {
            registry: Arc::downgrade(self),
            key,
            id,
        }
    }

    /// Deliver a changed snapshot to every subscriber of `key`. Listeners
    /// are cloned out first so a callback may subscribe or unsubscribe
    /// without deadlocking.
    pub fn notify(&self, key: CollectionKey, entry: &Arc<CacheEntry<T>>) {
        let callbacks: Vec<Callback<T>> = {
            let listeners = self.listeners.lock().unwrap_or_else(|e| e.into_inner());
            match listeners.get(&key) {
                Some(subs) => subs.iter().map(|(_, cb)| cb.clone()).collect(),
                None => return,
            }
        };
        for callback in callbacks {
            callback(entry);
        }
    }

    pub fn subscriber_count(&self, key: &CollectionKey) -> usize {
        let listeners = self.listeners.lock().unwrap_or_else(|e| e.into_inner());
        listeners.get(key).map_or(0, Vec::len)
    }

    fn unsubscribe(&self, key: CollectionKey, id: u64) {
        let mut listeners = self.listeners.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(subs) = listeners.get_mut(&key) {
            subs.retain(|(sub_id, _)| *sub_id != id);
            if subs.is_empty() {
                listeners.remove(&key);
            }
        }
    }
}

/// RAII subscription handle; dropping it unsubscribes.
pub struct WatchGuard<T: Entity> {
    registry: Weak<ObserverRegistry<T>>,
    key: CollectionKey,
    id: u64,
}

impl<T: Entity> WatchGuard<T> {
    pub fn key(&self) -> CollectionKey {
        self.key
    }
}

impl<T: Entity> Drop for WatchGuard<T> {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.unsubscribe(self.key, self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use brigade_core::{ResourceKind, StockItem, VenueId};
    use std::sync::atomic::AtomicUsize;

    fn key() -> CollectionKey {
        CollectionKey::all(ResourceKind::Stock, VenueId::generate())
    }

    #[test]
    fn test_notify_reaches_only_matching_key() {
        let registry: Arc<ObserverRegistry<StockItem>> = Arc::new(ObserverRegistry::new());
        let hits = Arc::new(AtomicUsize::new(0));
        let counted = hits.clone();
        let watched = key();
        let other = key();
        let _guard = registry.subscribe(watched, move |_| {
            counted.fetch_add(1, Ordering::SeqCst);
        });

        let entry = Arc::new(CacheEntry::empty(watched));
        registry.notify(watched, &entry);
        registry.notify(other, &Arc::new(CacheEntry::empty(other)));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_dropping_guard_unsubscribes() {
        let registry: Arc<ObserverRegistry<StockItem>> = Arc::new(ObserverRegistry::new());
        let watched = key();
        let guard = registry.subscribe(watched, |_| {});
        assert_eq!(registry.subscriber_count(&watched), 1);
        drop(guard);
        assert_eq!(registry.subscriber_count(&watched), 0);
    }

    #[test]
    fn test_callback_may_resubscribe_without_deadlock() {
        let registry: Arc<ObserverRegistry<StockItem>> = Arc::new(ObserverRegistry::new());
        let watched = key();
        let registry_inner = registry.clone();
        let _guard = registry.subscribe(watched, move |entry| {
            // Re-entrant use of the registry from inside a callback.
            let extra = registry_inner.subscribe(entry.key, |_| {});
            drop(extra);
        });
        registry.notify(watched, &Arc::new(CacheEntry::empty(watched)));
    }
}
