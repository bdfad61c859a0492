//! Fetch orchestrator: bridges cache entries to the network.
//!
//! Deduplicates in-flight fetches per key, drives the entry status
//! machine, and treats fetched totals as authoritative over any
//! optimistic counter drift accumulated between fetches.

use crate::entry::{CacheEntry, EntryStatus, MergeMode};
use crate::observer::ObserverRegistry;
use crate::store::CacheStore;
use brigade_core::{CacheError, CollectionKey, Entity, KeyMatcher};
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use tokio::sync::OwnedMutexGuard;

/// One window of a collection as returned by a loader.
#[derive(Debug, Clone)]
pub struct FetchPage<T> {
    pub items: Vec<T>,
    /// Opaque cursor for the next window, if any.
    pub cursor: Option<String>,
    pub has_more: bool,
    /// Authoritative server-side collection size.
    pub total_count: u64,
}

/// Shared slot for one in-flight fetch: locked by the owner for the
/// duration of the fetch, then carries its error (if any) to waiters.
type FlightGate = Arc<tokio::sync::Mutex<Option<CacheError>>>;

/// Tracks staleness and deduplicates concurrent fetches per key.
pub struct FetchOrchestrator<T: Entity> {
    store: Arc<CacheStore<T>>,
    observers: Arc<ObserverRegistry<T>>,
    in_flight: Mutex<HashMap<CollectionKey, FlightGate>>,
}

enum Flight<'a, T: Entity> {
    /// This caller owns the fetch.
    Owner(FlightTicket<'a, T>),
    /// Another fetch for the key is running; wait on its gate.
    Waiter(FlightGate),
}

/// Owner-side handle for one in-flight fetch. Completing it records the
/// outcome for waiters; dropping it unsettled (the owner future was
/// cancelled at an await point) still removes the flight and parks the
/// entry in Error, so the key never wedges behind an orphaned gate.
struct FlightTicket<'a, T: Entity> {
    orchestrator: &'a FetchOrchestrator<T>,
    key: CollectionKey,
    settled: bool,
    guard: OwnedMutexGuard<Option<CacheError>>,
}

impl<T: Entity> FlightTicket<'_, T> {
    fn complete(mut self) {
        self.settled = true;
    }

    fn complete_err(mut self, err: &CacheError) {
        *self.guard = Some(err.clone());
        self.settled = true;
    }
}

impl<T: Entity> Drop for FlightTicket<'_, T> {
    fn drop(&mut self) {
        if !self.settled {
            tracing::warn!(key = %self.key, "fetch cancelled mid-flight");
            *self.guard = Some(CacheError::network(None, "fetch cancelled before completion"));
            self.orchestrator
                .notify_status(self.key, EntryStatus::Error);
        }
        let mut in_flight = self
            .orchestrator
            .in_flight
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        in_flight.remove(&self.key);
        // The gate guard drops after this body, waking waiters.
    }
}

impl<T: Entity> FetchOrchestrator<T> {
    pub fn new(store: Arc<CacheStore<T>>, observers: Arc<ObserverRegistry<T>>) -> Self {
        Self {
            store,
            observers,
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    /// Make `key` Fresh. Fresh entries are a no-op; a key with a fetch
    /// already in flight awaits that fetch instead of issuing a duplicate
    /// request; otherwise the loader runs, replaces the items wholesale
    /// and adopts the response's pagination metadata. On failure the last
    /// good snapshot is preserved under an Error status.
    pub async fn ensure_fresh<L, Fut>(
        &self,
        key: CollectionKey,
        loader: L,
    ) -> Result<Arc<CacheEntry<T>>, CacheError>
    where
        L: FnOnce() -> Fut,
        Fut: Future<Output = Result<FetchPage<T>, CacheError>>,
    {
        let entry = self.store.entry(key);
        if entry.status == EntryStatus::Fresh {
            return Ok(entry);
        }

        let ticket = match self.join_or_open_flight(key) {
            Flight::Waiter(gate) => {
                // Wait for the owner to finish and share its outcome
                // instead of issuing a duplicate request.
                let outcome = gate.lock().await;
                return match &*outcome {
                    Some(err) => Err(err.clone()),
                    None => Ok(self.store.entry(key)),
                };
            }
            Flight::Owner(ticket) => ticket,
        };

        self.notify_status(key, EntryStatus::Fetching);
        match loader().await {
            Ok(page) => {
                let next = self.store.apply(key, |entry| {
                    entry
                        .with_upserted(page.items.clone(), MergeMode::ReplaceAll)
                        .with_page_meta(page.cursor.clone(), page.has_more, page.total_count)
                        .with_status(EntryStatus::Fresh)
                        .unwrap_or_else(|| entry.clone())
                });
                self.observers.notify(key, &next);
                ticket.complete();
                Ok(next)
            }
            Err(err) => {
                tracing::warn!(%key, error = %err, "collection fetch failed");
                self.notify_status(key, EntryStatus::Error);
                ticket.complete_err(&err);
                Err(err)
            }
        }
    }

    /// Fetch the next cursor window and append it. Valid only while the
    /// entry reports `has_more`; otherwise a quiet no-op.
    pub async fn load_more<L, Fut>(
        &self,
        key: CollectionKey,
        loader: L,
    ) -> Result<Arc<CacheEntry<T>>, CacheError>
    where
        L: FnOnce(Option<String>) -> Fut,
        Fut: Future<Output = Result<FetchPage<T>, CacheError>>,
    {
        let entry = self.store.entry(key);
        if !entry.has_more {
            return Ok(entry);
        }

        let ticket = match self.join_or_open_flight(key) {
            Flight::Waiter(gate) => {
                let outcome = gate.lock().await;
                return match &*outcome {
                    Some(err) => Err(err.clone()),
                    None => Ok(self.store.entry(key)),
                };
            }
            Flight::Owner(ticket) => ticket,
        };

        self.notify_status(key, EntryStatus::Fetching);
        match loader(entry.cursor.clone()).await {
            Ok(page) => {
                let next = self.store.apply(key, |entry| {
                    entry
                        .with_upserted(page.items.clone(), MergeMode::Append)
                        .with_page_meta(page.cursor.clone(), page.has_more, page.total_count)
                        .with_status(EntryStatus::Fresh)
                        .unwrap_or_else(|| entry.clone())
                });
                self.observers.notify(key, &next);
                ticket.complete();
                Ok(next)
            }
            Err(err) => {
                tracing::warn!(%key, error = %err, "window fetch failed");
                self.notify_status(key, EntryStatus::Error);
                ticket.complete_err(&err);
                Err(err)
            }
        }
    }

    /// Mark one entry stale so the next `ensure_fresh` refetches it.
    pub fn mark_stale(&self, key: CollectionKey) {
        self.notify_status(key, EntryStatus::Stale);
    }

    /// Staleness sweep across every entry the matcher selects. This is
    /// the reconnect/focus hook that closes a consistency gap: data
    /// missed while a channel was down is reconciled by the next full
    /// refetch, not replayed.
    pub fn mark_stale_matching(&self, matcher: &KeyMatcher) {
        for key in self.store.keys_matching(matcher) {
            self.mark_stale(key);
        }
    }

    fn join_or_open_flight(&self, key: CollectionKey) -> Flight<'_, T> {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(gate) = in_flight.get(&key) {
            return Flight::Waiter(gate.clone());
        }
        let gate: FlightGate = Arc::new(tokio::sync::Mutex::new(None));
        let guard = gate
            .clone()
            .try_lock_owned()
            .expect("freshly created gate is uncontended");
        in_flight.insert(key, gate);
        Flight::Owner(FlightTicket {
            orchestrator: self,
            key,
            settled: false,
            guard,
        })
    }

    fn notify_status(&self, key: CollectionKey, status: EntryStatus) {
        let mut before = 0;
        let next = self.store.apply(key, |entry| {
            before = entry.version;
            match entry.with_status(status) {
                Some(next) => next,
                None => {
                    tracing::debug!(%key, from = ?entry.status, to = ?status, "status change refused");
                    entry.clone()
                }
            }
        });
        if next.version != before {
            self.observers.notify(key, &next);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use brigade_core::{ResourceKind, StockItem, VenueId};
    use brigade_test_utils::stock_item;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn orchestrator() -> (Arc<CacheStore<StockItem>>, FetchOrchestrator<StockItem>) {
        let store = Arc::new(CacheStore::new());
        let observers = Arc::new(ObserverRegistry::new());
        let orchestrator = FetchOrchestrator::new(store.clone(), observers);
        (store, orchestrator)
    }

    fn page(items: Vec<StockItem>) -> FetchPage<StockItem> {
        let total = items.len() as u64;
        FetchPage {
            items,
            cursor: None,
            has_more: false,
            total_count: total,
        }
    }

    #[tokio::test]
    async fn test_fresh_entry_skips_loader() {
        let (_store, orchestrator) = orchestrator();
        let venue = VenueId::generate();
        let key = CollectionKey::all(ResourceKind::Stock, venue);
        let calls = AtomicUsize::new(0);

        orchestrator
            .ensure_fresh(key, || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(page(vec![stock_item(venue, "Flour", 5.0)]))
            })
            .await
            .unwrap();
        let entry = orchestrator
            .ensure_fresh(key, || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(page(vec![]))
            })
            .await
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(entry.status, EntryStatus::Fresh);
        assert_eq!(entry.items.len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_fetches_share_one_request() {
        let (_store, orchestrator) = orchestrator();
        let orchestrator = Arc::new(orchestrator);
        let venue = VenueId::generate();
        let key = CollectionKey::all(ResourceKind::Stock, venue);
        let calls = Arc::new(AtomicUsize::new(0));

        let first = {
            let orchestrator = orchestrator.clone();
            let calls = calls.clone();
            tokio::spawn(async move {
                orchestrator
                    .ensure_fresh(key, move || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
                        Ok(page(vec![stock_item(venue, "Flour", 5.0)]))
                    })
                    .await
            })
        };
        // Give the first task time to open the flight.
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        let second = {
            let orchestrator = orchestrator.clone();
            let calls = calls.clone();
            tokio::spawn(async move {
                orchestrator
                    .ensure_fresh(key, move || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        Ok(page(vec![]))
                    })
                    .await
            })
        };

        let entry_a = first.await.unwrap().unwrap();
        let entry_b = second.await.unwrap().unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(entry_a.items.len(), 1);
        assert_eq!(entry_b.items.len(), 1);
    }

    #[tokio::test]
    async fn test_cancelled_fetch_does_not_wedge_the_key() {
        let (store, orchestrator) = orchestrator();
        let orchestrator = Arc::new(orchestrator);
        let venue = VenueId::generate();
        let key = CollectionKey::all(ResourceKind::Stock, venue);

        // Owner aborted mid-fetch, at the loader await point.
        let hung = {
            let orchestrator = orchestrator.clone();
            tokio::spawn(async move {
                orchestrator
                    .ensure_fresh(key, || {
                        std::future::pending::<Result<FetchPage<StockItem>, CacheError>>()
                    })
                    .await
            })
        };
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        hung.abort();
        assert!(hung.await.unwrap_err().is_cancelled());

        // The orphaned flight surfaced as a retryable Error...
        assert_eq!(store.entry(key).status, EntryStatus::Error);

        // ...and the next caller runs its own loader instead of joining
        // a flight that no longer exists.
        let calls = AtomicUsize::new(0);
        let entry = orchestrator
            .ensure_fresh(key, || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(page(vec![stock_item(venue, "Flour", 5.0)]))
            })
            .await
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(entry.status, EntryStatus::Fresh);
    }

    #[tokio::test]
    async fn test_waiter_observes_shared_fetch_failure() {
        let (_store, orchestrator) = orchestrator();
        let orchestrator = Arc::new(orchestrator);
        let venue = VenueId::generate();
        let key = CollectionKey::all(ResourceKind::Stock, venue);
        let calls = Arc::new(AtomicUsize::new(0));

        let owner = {
            let orchestrator = orchestrator.clone();
            tokio::spawn(async move {
                orchestrator
                    .ensure_fresh(key, || async {
                        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
                        Err(CacheError::network(Some(502), "upstream down"))
                    })
                    .await
            })
        };
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        let waiter = {
            let orchestrator = orchestrator.clone();
            let calls = calls.clone();
            tokio::spawn(async move {
                orchestrator
                    .ensure_fresh(key, move || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        Ok(page(vec![]))
                    })
                    .await
            })
        };

        let owner_err = owner.await.unwrap().unwrap_err();
        let waiter_err = waiter.await.unwrap().unwrap_err();
        assert_eq!(owner_err, waiter_err);
        assert_eq!(calls.load(Ordering::SeqCst), 0, "waiter never fetched");
    }

    #[tokio::test]
    async fn test_failed_fetch_preserves_last_good_snapshot() {
        let (_store, orchestrator) = orchestrator();
        let venue = VenueId::generate();
        let key = CollectionKey::all(ResourceKind::Stock, venue);
        let item = stock_item(venue, "Flour", 5.0);

        orchestrator
            .ensure_fresh(key, || async { Ok(page(vec![item.clone()])) })
            .await
            .unwrap();
        orchestrator.mark_stale(key);
        let err = orchestrator
            .ensure_fresh(key, || async {
                Err(CacheError::network(Some(500), "boom"))
            })
            .await
            .unwrap_err();

        assert!(matches!(err, CacheError::Network { .. }));
        let entry = orchestrator.store.entry(key);
        assert_eq!(entry.status, EntryStatus::Error);
        assert_eq!(entry.items.len(), 1);
        // A later retry can still fetch out of the Error state.
        let entry = orchestrator
            .ensure_fresh(key, || async { Ok(page(vec![item.clone()])) })
            .await
            .unwrap();
        assert_eq!(entry.status, EntryStatus::Fresh);
    }

    #[tokio::test]
    async fn test_load_more_appends_and_adopts_authoritative_total() {
        let (store, orchestrator) = orchestrator();
        let venue = VenueId::generate();
        let key = CollectionKey::window(ResourceKind::Stock, venue);
        let first = stock_item(venue, "A", 1.0);
        let second = stock_item(venue, "B", 2.0);

        orchestrator
            .ensure_fresh(key, || async {
                Ok(FetchPage {
                    items: vec![first.clone()],
                    cursor: Some("c1".to_string()),
                    has_more: true,
                    total_count: 2,
                })
            })
            .await
            .unwrap();

        let entry = orchestrator
            .load_more(key, |cursor| async move {
                assert_eq!(cursor.as_deref(), Some("c1"));
                Ok(FetchPage {
                    items: vec![second.clone()],
                    cursor: None,
                    has_more: false,
                    total_count: 2,
                })
            })
            .await
            .unwrap();

        assert_eq!(entry.items.len(), 2);
        assert_eq!(entry.total_count, 2);
        assert!(!entry.has_more);

        // Exhausted window: load_more is a quiet no-op.
        let calls = AtomicUsize::new(0);
        let unchanged = orchestrator
            .load_more(key, |_| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(page(vec![]))
            })
            .await
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(unchanged.version, store.entry(key).version);
    }
}
