//! Mutation coordinator: the single entry point turning UI actions and
//! realtime events into store writes.
//!
//! The optimistic phase is synchronous and never suspends between the
//! rollback snapshot and the patch, so every matching view updates in one
//! tick. Confirmations and realtime events are applied strictly in
//! completion order; a delete that lands after an update wins by arrival.

use crate::entry::{CacheEntry, MergeMode};
use crate::observer::ObserverRegistry;
use crate::store::CacheStore;
use brigade_core::{
    CacheError, CollectionKey, Entity, EntityId, EventPayload, EventSemantics, KeyMatcher,
    RealtimeEvent, VenueId,
};
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

/// What a mutation does to the collection.
#[derive(Debug, Clone)]
pub enum MutationOp<T> {
    /// Insert an optimistic entity carrying a client-generated temp id.
    Create(T),
    /// Shallow field-merge into the item with `id`.
    Update { id: EntityId, patch: Value },
    /// Drop the item with `id`.
    Delete { id: EntityId },
}

/// A mutation plus the predicate selecting the cache entries it touches.
#[derive(Debug, Clone)]
pub struct MutationIntent<T> {
    pub op: MutationOp<T>,
    pub matcher: KeyMatcher,
}

impl<T: Entity> MutationIntent<T> {
    /// Create, patching every cached view of the entity's venue.
    pub fn create(entity: T) -> Self {
        let matcher = KeyMatcher::venue_wide(T::resource(), entity.venue_id());
        Self {
            op: MutationOp::Create(entity),
            matcher,
        }
    }

    pub fn update(venue: VenueId, id: EntityId, patch: Value) -> Self {
        Self {
            op: MutationOp::Update { id, patch },
            matcher: KeyMatcher::venue_wide(T::resource(), venue),
        }
    }

    pub fn delete(venue: VenueId, id: EntityId) -> Self {
        Self {
            op: MutationOp::Delete { id },
            matcher: KeyMatcher::venue_wide(T::resource(), venue),
        }
    }

    /// Override the default venue-wide matcher.
    pub fn with_matcher(mut self, matcher: KeyMatcher) -> Self {
        self.matcher = matcher;
        self
    }
}

/// Pre-mutation state of one patched entry. The version is the entry's
/// counter immediately after the optimistic patch: rollback applies only
/// while the entry still carries it.
struct TargetSnapshot<T> {
    key: CollectionKey,
    pre: CacheEntry<T>,
    tagged_version: u64,
}

/// An optimistic mutation awaiting its network confirmation.
pub struct PendingMutation<T> {
    /// Client temp id of an optimistic create, for the temp→server swap.
    temp_id: Option<EntityId>,
    targets: Vec<TargetSnapshot<T>>,
}

impl<T> PendingMutation<T> {
    /// Number of cache entries the optimistic phase patched.
    pub fn target_count(&self) -> usize {
        self.targets.len()
    }
}

/// Applies mutations to all matching cache entries atomically and
/// optimistically, then reconciles with the server outcome.
pub struct MutationCoordinator<T: Entity> {
    store: Arc<CacheStore<T>>,
    observers: Arc<ObserverRegistry<T>>,
}

impl<T: Entity> MutationCoordinator<T> {
    pub fn new(store: Arc<CacheStore<T>>, observers: Arc<ObserverRegistry<T>>) -> Self {
        Self { store, observers }
    }

    /// Optimistic phase: resolve the matcher, snapshot every target, patch
    /// them all through the store primitives and notify subscribers.
    ///
    /// A patch that cannot be applied (malformed update) rolls back the
    /// targets already touched and surfaces the error, so a failed intent
    /// never leaves the views half-patched.
    pub fn apply_optimistic(
        &self,
        intent: &MutationIntent<T>,
    ) -> Result<PendingMutation<T>, CacheError> {
        let keys = self.store.keys_matching(&intent.matcher);
        let temp_id = match &intent.op {
            MutationOp::Create(entity) => Some(entity.entity_id()),
            _ => None,
        };

        let mut targets: Vec<TargetSnapshot<T>> = Vec::with_capacity(keys.len());
        for key in keys {
            let mut pre: Option<CacheEntry<T>> = None;
            let mut failure: Option<CacheError> = None;
            let next = self.store.apply(key, |entry| {
                pre = Some(entry.clone());
                match &intent.op {
                    MutationOp::Create(entity) => {
                        entry.with_upserted(vec![entity.clone()], MergeMode::Prepend)
                    }
                    MutationOp::Update { id, patch } => match entry.with_item_updated(*id, patch)
                    {
                        Ok(patched) => patched,
                        Err(err) => {
                            failure = Some(err);
                            entry.clone()
                        }
                    },
                    MutationOp::Delete { id } => entry.with_removed(&[*id]),
                }
            });
            let pre = pre.unwrap_or_else(|| CacheEntry::empty(key));
            if let Some(err) = failure {
                self.rollback(&targets);
                return Err(err);
            }
            if next.version != pre.version {
                self.observers.notify(key, &next);
                targets.push(TargetSnapshot {
                    key,
                    pre,
                    tagged_version: next.version,
                });
            }
        }

        Ok(PendingMutation { temp_id, targets })
    }

    /// Reconcile a pending mutation with the server outcome.
    ///
    /// Success with a canonical entity swaps the optimistic item for the
    /// server's version (final id, computed totals). Failure rolls back
    /// every target whose version is unchanged since the optimistic patch;
    /// a newer mutation on the entry invalidates its rollback, which is
    /// what keeps a since-deleted item from being resurrected.
    pub fn resolve(
        &self,
        pending: PendingMutation<T>,
        outcome: Result<Option<T>, CacheError>,
    ) -> Result<Option<T>, CacheError> {
        match outcome {
            Ok(Some(canonical)) => {
                self.adopt_canonical(&pending, &canonical);
                Ok(Some(canonical))
            }
            Ok(None) => Ok(None),
            Err(err) => {
                self.rollback(&pending.targets);
                Err(err)
            }
        }
    }

    /// Full user-initiated flow: optimistic patch, network call, then
    /// reconcile. The network leg is not cancellable once issued.
    pub async fn mutate_with<F, Fut>(
        &self,
        intent: MutationIntent<T>,
        call: F,
    ) -> Result<Option<T>, CacheError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Option<T>, CacheError>>,
    {
        let pending = self.apply_optimistic(&intent)?;
        let outcome = call().await;
        self.resolve(pending, outcome)
    }

    /// Realtime path: no rollback, idempotent by construction. An upsert
    /// overwrites by id rather than duplicating, which absorbs the echo of
    /// an action this client already applied optimistically.
    pub fn apply_remote(&self, event: &RealtimeEvent<T>) {
        match event.semantics {
            EventSemantics::Upsert => {
                let entities: Vec<T> = match &event.payload {
                    EventPayload::One(entity) => vec![entity.clone()],
                    EventPayload::Many(entities) => entities.clone(),
                    EventPayload::Ids(_) => {
                        tracing::warn!(
                            channel = %event.channel,
                            "dropping upsert event with bare-id payload"
                        );
                        return;
                    }
                };
                let mut by_venue: HashMap<VenueId, Vec<T>> = HashMap::new();
                for entity in entities {
                    by_venue.entry(entity.venue_id()).or_default().push(entity);
                }
                for (venue, batch) in by_venue {
                    self.upsert_into(KeyMatcher::venue_wide(T::resource(), venue), batch);
                }
            }
            EventSemantics::Remove => {
                let ids: Vec<EntityId> = match &event.payload {
                    EventPayload::Ids(ids) => ids.clone(),
                    EventPayload::One(entity) => vec![entity.entity_id()],
                    EventPayload::Many(entities) => {
                        entities.iter().map(Entity::entity_id).collect()
                    }
                };
                // Removals arrive as bare ids with no venue attached; ids
                // are globally unique so a resource-wide sweep is safe.
                for key in self
                    .store
                    .keys_matching(&KeyMatcher::resource_wide(T::resource()))
                {
                    self.remove_from(key, &ids);
                }
            }
        }
    }

    /// Imperative helper for a screen that already holds the confirmed
    /// server entity: upsert it into every view of its venue.
    pub fn confirm_upsert(&self, entity: T) {
        let matcher = KeyMatcher::venue_wide(T::resource(), entity.venue_id());
        self.upsert_into(matcher, vec![entity]);
    }

    /// Imperative helper mirroring a confirmed server-side delete.
    pub fn confirm_remove(&self, venue: VenueId, id: EntityId) {
        let matcher = KeyMatcher::venue_wide(T::resource(), venue);
        for key in self.store.keys_matching(&matcher) {
            self.remove_from(key, &[id]);
        }
    }

    fn upsert_into(&self, matcher: KeyMatcher, batch: Vec<T>) {
        for key in self.store.keys_matching(&matcher) {
            let next = self
                .store
                .apply(key, |entry| entry.with_upserted(batch.clone(), MergeMode::Prepend));
            self.observers.notify(key, &next);
        }
    }

    fn remove_from(&self, key: CollectionKey, ids: &[EntityId]) {
        let mut before = 0;
        let next = self.store.apply(key, |entry| {
            before = entry.version;
            entry.with_removed(ids)
        });
        if next.version != before {
            self.observers.notify(key, &next);
        }
    }

    fn adopt_canonical(&self, pending: &PendingMutation<T>, canonical: &T) {
        let canonical_id = canonical.entity_id();
        for target in &pending.targets {
            let mut before = 0;
            let next = self.store.apply(target.key, |entry| {
                before = entry.version;
                match pending.temp_id {
                    Some(temp) if entry.contains(temp) => {
                        entry.with_item_replaced(temp, canonical.clone())
                    }
                    // Only overwrite an item that is still present; a
                    // delete that raced ahead of this confirmation wins.
                    _ if entry.contains(canonical_id) => {
                        entry.with_upserted(vec![canonical.clone()], MergeMode::Prepend)
                    }
                    _ => entry.clone(),
                }
            });
            if next.version != before {
                self.observers.notify(target.key, &next);
            }
        }
    }

    fn rollback(&self, targets: &[TargetSnapshot<T>]) {
        for target in targets {
            let mut before = 0;
            let next = self.store.apply(target.key, |entry| {
                before = entry.version;
                if entry.version == target.tagged_version {
                    entry.restored_from(&target.pre)
                } else {
                    tracing::debug!(
                        key = %target.key,
                        tagged = target.tagged_version,
                        current = entry.version,
                        "skipping rollback, entry advanced past snapshot"
                    );
                    entry.clone()
                }
            });
            if next.version != before {
                self.observers.notify(target.key, &next);
            }
        }
    }
}
