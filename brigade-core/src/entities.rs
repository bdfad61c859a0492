//! Domain entities for the restaurant dashboard.
//!
//! Every entity carries a globally unique `EntityId` and the `VenueId`
//! that scopes it. The `Entity` trait is the seam the cache is generic
//! over; a type implementing it can be stored, matched and patched by id.

use crate::key::ResourceKind;
use crate::{EntityId, Timestamp, VenueId};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Marker trait for types the collection cache can hold.
///
/// # Implementation Requirements
///
/// - `resource()` must return a consistent value for all instances
/// - `entity_id()` must return the globally unique identifier
/// - Implementations must be `Clone`, `Serialize`, and `DeserializeOwned`
///   so optimistic patches can field-merge through serde
pub trait Entity: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Resource family this entity belongs to.
    fn resource() -> ResourceKind;

    /// Globally unique identifier of this instance.
    fn entity_id(&self) -> EntityId;

    /// Venue this instance is scoped to.
    fn venue_id(&self) -> VenueId;
}

// ============================================================================
// STOCK
// ============================================================================

/// A stock (inventory) item tracked per venue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockItem {
    pub stock_item_id: EntityId,
    pub venue_id: VenueId,
    pub name: String,
    pub sku: String,
    /// On-hand quantity in `unit`s.
    pub quantity: f64,
    pub unit: String,
    /// Below this quantity the item shows up in low-stock reports.
    pub low_stock_threshold: f64,
    pub updated_at: Timestamp,
}

impl Entity for StockItem {
    fn resource() -> ResourceKind {
        ResourceKind::Stock
    }

    fn entity_id(&self) -> EntityId {
        self.stock_item_id
    }

    fn venue_id(&self) -> VenueId {
        self.venue_id
    }
}

// ============================================================================
// RECIPES
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecipeIngredient {
    pub stock_item_id: EntityId,
    pub quantity: f64,
}

/// A menu recipe composed of stock ingredients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recipe {
    pub recipe_id: EntityId,
    pub venue_id: VenueId,
    pub name: String,
    pub ingredients: Vec<RecipeIngredient>,
    pub price_cents: i64,
    pub active: bool,
}

impl Entity for Recipe {
    fn resource() -> ResourceKind {
        ResourceKind::Recipe
    }

    fn entity_id(&self) -> EntityId {
        self.recipe_id
    }

    fn venue_id(&self) -> VenueId {
        self.venue_id
    }
}

// ============================================================================
// ORDERS
// ============================================================================

/// Lifecycle of an order on the live tracking board. `Invoiced` orders
/// leave the board via the batched removal feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Placed,
    Preparing,
    Ready,
    Served,
    Invoiced,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderLine {
    pub recipe_id: EntityId,
    pub quantity: u32,
    pub note: Option<String>,
}

/// A customer order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub order_id: EntityId,
    pub venue_id: VenueId,
    pub table_label: String,
    pub status: OrderStatus,
    pub lines: Vec<OrderLine>,
    pub total_cents: i64,
    pub placed_at: Timestamp,
}

impl Entity for Order {
    fn resource() -> ResourceKind {
        ResourceKind::Order
    }

    fn entity_id(&self) -> EntityId {
        self.order_id
    }

    fn venue_id(&self) -> VenueId {
        self.venue_id
    }
}

// ============================================================================
// NOTIFICATIONS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationLevel {
    Info,
    Warning,
    Alert,
}

/// An operational notification (low stock, order delays, billing).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub notification_id: EntityId,
    pub venue_id: VenueId,
    pub level: NotificationLevel,
    pub message: String,
    pub read: bool,
    pub created_at: Timestamp,
}

impl Entity for Notification {
    fn resource() -> ResourceKind {
        ResourceKind::Notification
    }

    fn entity_id(&self) -> EntityId {
        self.notification_id
    }

    fn venue_id(&self) -> VenueId {
        self.venue_id
    }
}
