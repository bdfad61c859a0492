//! Brigade Core - shared data types
//!
//! Pure data structures with no behavior beyond construction and
//! predicates. All other crates depend on this. No I/O lives here.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub mod entities;
pub mod error;
pub mod event;
pub mod key;

pub use entities::{
    Entity, Notification, NotificationLevel, Order, OrderLine, OrderStatus, Recipe,
    RecipeIngredient, StockItem,
};
pub use error::CacheError;
pub use event::{EventPayload, EventSemantics, RealtimeEvent};
pub use key::{CollectionKey, KeyMatcher, ResourceKind, ViewKind};

// ============================================================================
// IDENTITY TYPES
// ============================================================================

/// Entity identifier using UUIDv7 for timestamp-sortable IDs.
pub type EntityId = Uuid;

/// Timestamp type using UTC timezone.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Generate a new UUIDv7 EntityId (timestamp-sortable).
pub fn new_entity_id() -> EntityId {
    Uuid::now_v7()
}

/// Identifier of the restaurant (venue) that scopes every collection.
///
/// Newtype rather than a bare Uuid so a venue id cannot be confused with
/// an entity id at a call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VenueId(Uuid);

impl VenueId {
    pub fn new(id: Uuid) -> Self {
        Self(id)
    }

    pub fn generate() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl std::fmt::Display for VenueId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
