//! Realtime event model.
//!
//! Push channels deliver collection changes as `RealtimeEvent`s. An event
//! is either an upsert carrying full payloads or a removal carrying bare
//! ids, mirroring what the server broadcasts on each mutation.

use crate::EntityId;
use serde::{Deserialize, Serialize};

/// How an event's payload applies to a cached collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventSemantics {
    /// Insert-or-overwrite by id. Applying the same upsert twice must
    /// leave the entry unchanged after the first application.
    Upsert,
    /// Drop by id. Unknown ids are ignored.
    Remove,
}

/// Payload of a realtime event: one entity, a batch of entities, or a
/// batch of ids for removals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EventPayload<T> {
    One(T),
    Many(Vec<T>),
    Ids(Vec<EntityId>),
}

/// A push notification describing a remote collection change.
///
/// Delivered by the feed adapter to the mutation coordinator in strict
/// socket-receive order; the coordinator applies it through the same
/// patch path as local mutations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RealtimeEvent<T> {
    /// Logical channel the event arrived on (diagnostics only).
    pub channel: String,
    pub semantics: EventSemantics,
    pub payload: EventPayload<T>,
}

impl<T> RealtimeEvent<T> {
    pub fn upsert_one(channel: impl Into<String>, entity: T) -> Self {
        Self {
            channel: channel.into(),
            semantics: EventSemantics::Upsert,
            payload: EventPayload::One(entity),
        }
    }

    pub fn upsert_many(channel: impl Into<String>, entities: Vec<T>) -> Self {
        Self {
            channel: channel.into(),
            semantics: EventSemantics::Upsert,
            payload: EventPayload::Many(entities),
        }
    }

    pub fn remove(channel: impl Into<String>, ids: Vec<EntityId>) -> Self {
        Self {
            channel: channel.into(),
            semantics: EventSemantics::Remove,
            payload: EventPayload::Ids(ids),
        }
    }

    /// Entities carried by an upsert payload; empty for removals.
    pub fn entities(&self) -> &[T] {
        match &self.payload {
            EventPayload::One(entity) => std::slice::from_ref(entity),
            EventPayload::Many(entities) => entities,
            EventPayload::Ids(_) => &[],
        }
    }

    /// Ids carried by a removal payload; empty for upserts.
    pub fn removed_ids(&self) -> &[EntityId] {
        match &self.payload {
            EventPayload::Ids(ids) => ids,
            _ => &[],
        }
    }
}
