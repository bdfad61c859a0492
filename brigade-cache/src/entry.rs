//! Cache entry snapshots and their pure patch primitives.
//!
//! Every primitive returns a new entry (value semantics). A changed entry
//! carries `version + 1`; a no-op returns an entry with the same version,
//! which the store uses to skip the swap and the observer notification.
//! Several entries can therefore be patched as one logical transaction
//! with subscribers detecting change by `Arc` identity.

use brigade_core::{CacheError, CollectionKey, Entity, EntityId};
use serde_json::Value;

/// Fetch lifecycle of a cache entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryStatus {
    Fresh,
    Stale,
    Fetching,
    Error,
}

impl EntryStatus {
    /// Legal transitions: Fresh→Stale, (Stale|Fresh|Error)→Fetching,
    /// Fetching→(Fresh|Error). Anything else is refused by the store.
    pub fn can_transition(self, next: EntryStatus) -> bool {
        matches!(
            (self, next),
            (Self::Fresh, Self::Stale)
                | (Self::Fresh, Self::Fetching)
                | (Self::Stale, Self::Fetching)
                | (Self::Error, Self::Fetching)
                | (Self::Fetching, Self::Fresh)
                | (Self::Fetching, Self::Error)
        )
    }
}

/// Where merged items are placed relative to the existing sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeMode {
    /// New ids go to the front (dashboards list newest first).
    Prepend,
    /// New ids go to the back (pagination appends windows).
    Append,
    /// The incoming items become the whole sequence.
    ReplaceAll,
}

/// Cached snapshot of one collection view.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry<T> {
    pub key: CollectionKey,
    /// Ordered, unique by entity id.
    pub items: Vec<T>,
    /// Opaque pagination token from the last fetch.
    pub cursor: Option<String>,
    /// Server-side collection size; optimistic patches drift it, a
    /// successful fetch overwrites it.
    pub total_count: u64,
    pub has_more: bool,
    pub status: EntryStatus,
    /// Monotonic counter, bumped on every applied change. Rollback
    /// eligibility is decided by comparing against it.
    pub version: u64,
}

impl<T: Entity> CacheEntry<T> {
    /// Empty entry for a key that has never been fetched.
    pub fn empty(key: CollectionKey) -> Self {
        Self {
            key,
            items: Vec::new(),
            cursor: None,
            total_count: 0,
            has_more: false,
            status: EntryStatus::Stale,
            version: 0,
        }
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.items.iter().any(|item| item.entity_id() == id)
    }

    pub fn item(&self, id: EntityId) -> Option<&T> {
        self.items.iter().find(|item| item.entity_id() == id)
    }

    fn bumped(&self) -> Self {
        let mut next = self.clone();
        next.version += 1;
        next
    }

    /// Merge items by id. Existing ids are overwritten in place, new ids
    /// are placed per `mode`. Always counts as a change: an echo that
    /// overwrites an identical item still advances the version, which is
    /// what lets a later rollback recognize the entry was touched.
    pub fn with_upserted(&self, incoming: Vec<T>, mode: MergeMode) -> Self {
        let mut next = self.bumped();
        match mode {
            MergeMode::ReplaceAll => {
                let mut replaced: Vec<T> = Vec::with_capacity(incoming.len());
                for item in incoming {
                    if let Some(slot) = replaced
                        .iter_mut()
                        .find(|existing| existing.entity_id() == item.entity_id())
                    {
                        *slot = item;
                    } else {
                        replaced.push(item);
                    }
                }
                next.total_count = replaced.len() as u64;
                next.items = replaced;
            }
            MergeMode::Prepend | MergeMode::Append => {
                let mut fresh: Vec<T> = Vec::new();
                for item in incoming {
                    if let Some(slot) = next
                        .items
                        .iter_mut()
                        .find(|existing| existing.entity_id() == item.entity_id())
                    {
                        *slot = item;
                    } else if let Some(slot) = fresh
                        .iter_mut()
                        .find(|queued| queued.entity_id() == item.entity_id())
                    {
                        *slot = item;
                    } else {
                        fresh.push(item);
                    }
                }
                next.total_count += fresh.len() as u64;
                match mode {
                    MergeMode::Prepend => {
                        fresh.extend(std::mem::take(&mut next.items));
                        next.items = fresh;
                    }
                    _ => next.items.extend(fresh),
                }
            }
        }
        next
    }

    /// Drop matching ids, decrementing the total by the number actually
    /// removed (floored at 0). No matches is a no-op.
    pub fn with_removed(&self, ids: &[EntityId]) -> Self {
        let before = self.items.len();
        let kept: Vec<T> = self
            .items
            .iter()
            .filter(|item| !ids.contains(&item.entity_id()))
            .cloned()
            .collect();
        let removed = (before - kept.len()) as u64;
        if removed == 0 {
            return self.clone();
        }
        let mut next = self.bumped();
        next.items = kept;
        next.total_count = next.total_count.saturating_sub(removed);
        next
    }

    /// Shallow field-merge `patch` into the item with `id` through serde.
    /// A no-op (same version) if the id is absent from this entry.
    pub fn with_item_updated(&self, id: EntityId, patch: &Value) -> Result<Self, CacheError> {
        let Some(position) = self.items.iter().position(|item| item.entity_id() == id) else {
            return Ok(self.clone());
        };
        let merged = merge_fields(&self.items[position], patch)?;
        let mut next = self.bumped();
        next.items[position] = merged;
        Ok(next)
    }

    /// Swap the optimistic item `old_id` for the canonical server entity,
    /// preserving its position. Used when a create confirmation returns
    /// final ids and computed totals. No-op if `old_id` is absent.
    pub fn with_item_replaced(&self, old_id: EntityId, item: T) -> Self {
        let Some(position) = self
            .items
            .iter()
            .position(|existing| existing.entity_id() == old_id)
        else {
            return self.clone();
        };
        let mut next = self.bumped();
        next.items[position] = item;
        next
    }

    /// Guarded status transition. Returns `None` for an illegal move so
    /// the store can refuse it and log.
    pub fn with_status(&self, status: EntryStatus) -> Option<Self> {
        if self.status == status {
            return Some(self.clone());
        }
        if !self.status.can_transition(status) {
            return None;
        }
        let mut next = self.bumped();
        next.status = status;
        Some(next)
    }

    /// Adopt pagination metadata from a fetch response. The fetched
    /// `total_count` is authoritative and overwrites optimistic drift.
    pub fn with_page_meta(&self, cursor: Option<String>, has_more: bool, total_count: u64) -> Self {
        let mut next = self.bumped();
        next.cursor = cursor;
        next.has_more = has_more;
        next.total_count = total_count;
        next
    }

    /// Restore a pre-mutation snapshot on rollback. The version keeps
    /// advancing; only the data travels back.
    pub fn restored_from(&self, snapshot: &Self) -> Self {
        let mut next = snapshot.clone();
        next.version = self.version + 1;
        next
    }
}

/// Serialize, shallow-merge object fields, deserialize back. A patch that
/// produces an invalid entity is a parse error, not a panic.
fn merge_fields<T: Entity>(item: &T, patch: &Value) -> Result<T, CacheError> {
    let mut value = serde_json::to_value(item)
        .map_err(|err| CacheError::parse("local-patch", err.to_string()))?;
    if let (Value::Object(base), Value::Object(fields)) = (&mut value, patch) {
        for (name, field) in fields {
            base.insert(name.clone(), field.clone());
        }
    }
    serde_json::from_value(value).map_err(|err| CacheError::parse("local-patch", err.to_string()))
}
