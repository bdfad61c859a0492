//! Typed read projections over the store.
//!
//! Each projection is a thin handle: a key plus clones of the session's
//! shared components. A windowed projection owns its own entry with an
//! independent fetch lifecycle, but every coordinator transaction
//! matching its venue patches it with the same primitives as the flat
//! view, which is what keeps both views showing the same edited item
//! without a second round trip.

use crate::cache::CollectionCache;
use crate::entry::CacheEntry;
use crate::fetch::FetchPage;
use crate::observer::WatchGuard;
use brigade_core::{CacheError, CollectionKey, Entity, EntityId, VenueId};
use std::future::Future;
use std::sync::Arc;

/// The unbounded all-items-in-venue view.
pub struct ScopeListView<T: Entity> {
    cache: CollectionCache<T>,
    key: CollectionKey,
}

impl<T: Entity> ScopeListView<T> {
    pub(crate) fn new(cache: CollectionCache<T>, venue: VenueId) -> Self {
        let key = CollectionKey::all(T::resource(), venue);
        Self { cache, key }
    }

    pub fn key(&self) -> CollectionKey {
        self.key
    }

    /// Current snapshot, creating the entry lazily.
    pub fn snapshot(&self) -> Arc<CacheEntry<T>> {
        self.cache.snapshot(self.key)
    }

    /// Snapshot plus change subscription, the shape a screen binds to.
    pub fn subscribe(
        &self,
        on_change: impl Fn(&Arc<CacheEntry<T>>) + Send + Sync + 'static,
    ) -> (Arc<CacheEntry<T>>, WatchGuard<T>) {
        self.cache.subscribe(self.key, on_change)
    }

    /// Fetch if not Fresh, deduplicated with any in-flight fetch.
    pub async fn refresh<L, Fut>(&self, loader: L) -> Result<Arc<CacheEntry<T>>, CacheError>
    where
        L: FnOnce() -> Fut,
        Fut: Future<Output = Result<FetchPage<T>, CacheError>>,
    {
        self.cache.ensure_fresh(self.key, loader).await
    }

    pub fn items(&self) -> Vec<T> {
        self.snapshot().items.clone()
    }
}

/// The cursor-paginated window view of the same collection.
pub struct WindowView<T: Entity> {
    cache: CollectionCache<T>,
    key: CollectionKey,
}

impl<T: Entity> WindowView<T> {
    pub(crate) fn new(cache: CollectionCache<T>, venue: VenueId) -> Self {
        let key = CollectionKey::window(T::resource(), venue);
        Self { cache, key }
    }

    pub fn key(&self) -> CollectionKey {
        self.key
    }

    pub fn snapshot(&self) -> Arc<CacheEntry<T>> {
        self.cache.snapshot(self.key)
    }

    pub fn subscribe(
        &self,
        on_change: impl Fn(&Arc<CacheEntry<T>>) + Send + Sync + 'static,
    ) -> (Arc<CacheEntry<T>>, WatchGuard<T>) {
        self.cache.subscribe(self.key, on_change)
    }

    pub async fn refresh<L, Fut>(&self, loader: L) -> Result<Arc<CacheEntry<T>>, CacheError>
    where
        L: FnOnce() -> Fut,
        Fut: Future<Output = Result<FetchPage<T>, CacheError>>,
    {
        self.cache.ensure_fresh(self.key, loader).await
    }

    /// Fetch and append the next window; no-op once exhausted.
    pub async fn load_more<L, Fut>(&self, loader: L) -> Result<Arc<CacheEntry<T>>, CacheError>
    where
        L: FnOnce(Option<String>) -> Fut,
        Fut: Future<Output = Result<FetchPage<T>, CacheError>>,
    {
        self.cache.load_more(self.key, loader).await
    }

    pub fn has_more(&self) -> bool {
        self.snapshot().has_more
    }

    pub fn items(&self) -> Vec<T> {
        self.snapshot().items.clone()
    }
}

/// Single-entity lookup across a venue's cached views.
pub struct ItemView<T: Entity> {
    cache: CollectionCache<T>,
    venue: VenueId,
    id: EntityId,
}

impl<T: Entity> ItemView<T> {
    pub(crate) fn new(cache: CollectionCache<T>, venue: VenueId, id: EntityId) -> Self {
        Self { cache, venue, id }
    }

    /// Look the item up in any cached view of the venue, flat view first.
    pub fn get(&self) -> Option<T> {
        let flat = self.cache.snapshot(CollectionKey::all(T::resource(), self.venue));
        if let Some(item) = flat.item(self.id) {
            return Some(item.clone());
        }
        let window = self
            .cache
            .snapshot(CollectionKey::window(T::resource(), self.venue));
        window.item(self.id).cloned()
    }

    /// Cached lookup with a fetch fallback; a fetched entity is upserted
    /// into the venue's views so the next lookup hits the cache.
    pub async fn ensure<L, Fut>(&self, loader: L) -> Result<Option<T>, CacheError>
    where
        L: FnOnce(EntityId) -> Fut,
        Fut: Future<Output = Result<Option<T>, CacheError>>,
    {
        if let Some(item) = self.get() {
            return Ok(Some(item));
        }
        match loader(self.id).await? {
            Some(entity) => {
                self.cache.upsert(entity.clone());
                Ok(Some(entity))
            }
            None => Ok(None),
        }
    }
}
