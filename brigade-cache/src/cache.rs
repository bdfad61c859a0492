//! Per-session collection cache facade.
//!
//! One `CollectionCache` per entity type, constructed at login and
//! dropped at logout; nothing here is a global. Cloning the facade is
//! cheap and shares the underlying store, so every screen, the realtime
//! pump and the fetch paths all converge on the same snapshots.

use crate::coordinator::{MutationCoordinator, MutationIntent};
use crate::entry::CacheEntry;
use crate::fetch::{FetchOrchestrator, FetchPage};
use crate::observer::{ObserverRegistry, WatchGuard};
use crate::projection::{ItemView, ScopeListView, WindowView};
use crate::store::CacheStore;
use brigade_core::{CacheError, CollectionKey, Entity, EntityId, KeyMatcher, RealtimeEvent, VenueId};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Cached views of one remote collection type for one session.
pub struct CollectionCache<T: Entity> {
    store: Arc<CacheStore<T>>,
    observers: Arc<ObserverRegistry<T>>,
    coordinator: Arc<MutationCoordinator<T>>,
    orchestrator: Arc<FetchOrchestrator<T>>,
}

impl<T: Entity> Clone for CollectionCache<T> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            observers: self.observers.clone(),
            coordinator: self.coordinator.clone(),
            orchestrator: self.orchestrator.clone(),
        }
    }
}

impl<T: Entity> Default for CollectionCache<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Entity> CollectionCache<T> {
    pub fn new() -> Self {
        let store = Arc::new(CacheStore::new());
        let observers = Arc::new(ObserverRegistry::new());
        let coordinator = Arc::new(MutationCoordinator::new(store.clone(), observers.clone()));
        let orchestrator = Arc::new(FetchOrchestrator::new(store.clone(), observers.clone()));
        Self {
            store,
            observers,
            coordinator,
            orchestrator,
        }
    }

    // ------------------------------------------------------------------
    // Read side
    // ------------------------------------------------------------------

    /// Current snapshot for a key, created lazily on first use.
    pub fn snapshot(&self, key: CollectionKey) -> Arc<CacheEntry<T>> {
        self.store.entry(key)
    }

    /// Snapshot plus change callback; dropping the guard unsubscribes.
    pub fn subscribe(
        &self,
        key: CollectionKey,
        on_change: impl Fn(&Arc<CacheEntry<T>>) + Send + Sync + 'static,
    ) -> (Arc<CacheEntry<T>>, WatchGuard<T>) {
        let snapshot = self.store.entry(key);
        self.store.touch(key);
        let guard = self.observers.subscribe(key, on_change);
        (snapshot, guard)
    }

    pub fn all_view(&self, venue: VenueId) -> ScopeListView<T> {
        ScopeListView::new(self.clone(), venue)
    }

    pub fn window_view(&self, venue: VenueId) -> WindowView<T> {
        WindowView::new(self.clone(), venue)
    }

    pub fn item_view(&self, venue: VenueId, id: EntityId) -> ItemView<T> {
        ItemView::new(self.clone(), venue, id)
    }

    // ------------------------------------------------------------------
    // Mutation side
    // ------------------------------------------------------------------

    /// Optimistic mutation with a network leg: patch every matching view
    /// now, reconcile (or roll back) when `call` completes.
    pub async fn mutate_with<F, Fut>(
        &self,
        intent: MutationIntent<T>,
        call: F,
    ) -> Result<Option<T>, CacheError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Option<T>, CacheError>>,
    {
        self.coordinator.mutate_with(intent, call).await
    }

    /// Realtime event path; same patch primitives, no rollback.
    pub fn apply_remote(&self, event: &RealtimeEvent<T>) {
        self.coordinator.apply_remote(event);
    }

    /// Imperative helpers for a screen that patched the server itself and
    /// holds the confirmed response: no generic invalidation round trip.
    pub fn upsert(&self, entity: T) {
        self.coordinator.confirm_upsert(entity);
    }

    pub fn remove(&self, venue: VenueId, id: EntityId) {
        self.coordinator.confirm_remove(venue, id);
    }

    pub fn update(
        &self,
        venue: VenueId,
        id: EntityId,
        patch: serde_json::Value,
    ) -> Result<(), CacheError> {
        let intent = MutationIntent::<T>::update(venue, id, patch);
        self.coordinator.apply_optimistic(&intent).map(|_| ())
    }

    // ------------------------------------------------------------------
    // Fetch side
    // ------------------------------------------------------------------

    pub async fn ensure_fresh<L, Fut>(
        &self,
        key: CollectionKey,
        loader: L,
    ) -> Result<Arc<CacheEntry<T>>, CacheError>
    where
        L: FnOnce() -> Fut,
        Fut: Future<Output = Result<FetchPage<T>, CacheError>>,
    {
        self.orchestrator.ensure_fresh(key, loader).await
    }

    pub async fn load_more<L, Fut>(
        &self,
        key: CollectionKey,
        loader: L,
    ) -> Result<Arc<CacheEntry<T>>, CacheError>
    where
        L: FnOnce(Option<String>) -> Fut,
        Fut: Future<Output = Result<FetchPage<T>, CacheError>>,
    {
        self.orchestrator.load_more(key, loader).await
    }

    pub fn mark_stale(&self, key: CollectionKey) {
        self.orchestrator.mark_stale(key);
    }

    /// Reconnect/focus hook: flag every matching entry for refetch.
    pub fn mark_stale_matching(&self, matcher: &KeyMatcher) {
        self.orchestrator.mark_stale_matching(matcher);
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Drop entries nobody has watched for longer than `idle`.
    pub fn evict_idle(&self, idle: Duration) -> usize {
        let observers = self.observers.clone();
        self.store
            .evict_idle(idle, move |key| observers.subscriber_count(key))
    }

    pub fn subscriber_count(&self, key: &CollectionKey) -> usize {
        self.observers.subscriber_count(key)
    }
}
