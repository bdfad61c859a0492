//! Brigade Cache - client-side collection cache
//!
//! Keeps multiple overlapping views of the same remote collection (an
//! unbounded per-venue list, a paginated window, single-entity lookups)
//! consistent while local optimistic mutations, server confirmations and
//! realtime push events interleave. Every view converges to the same
//! truth without extra round trips.

pub mod cache;
pub mod coordinator;
pub mod entry;
pub mod fetch;
pub mod observer;
pub mod projection;
pub mod store;

pub use cache::CollectionCache;
pub use coordinator::{MutationCoordinator, MutationIntent, MutationOp, PendingMutation};
pub use entry::{CacheEntry, EntryStatus, MergeMode};
pub use fetch::{FetchOrchestrator, FetchPage};
pub use observer::{ObserverRegistry, WatchGuard};
pub use projection::{ItemView, ScopeListView, WindowView};
pub use store::CacheStore;
