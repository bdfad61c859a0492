//! Brigade Test Utilities
//!
//! Centralized test infrastructure for the Brigade workspace:
//! - Builders for domain entities with sensible defaults
//! - Proptest strategies for property suites

use brigade_core::{
    new_entity_id, Notification, NotificationLevel, Order, OrderLine, OrderStatus, Recipe,
    RecipeIngredient, StockItem, VenueId,
};
use chrono::Utc;
use proptest::prelude::*;

// ============================================================================
// BUILDERS
// ============================================================================

/// A stock item with a fresh id in the given venue.
pub fn stock_item(venue: VenueId, name: &str, quantity: f64) -> StockItem {
    StockItem {
        stock_item_id: new_entity_id(),
        venue_id: venue,
        name: name.to_string(),
        sku: format!("SKU-{}", &name.to_uppercase()),
        quantity,
        unit: "kg".to_string(),
        low_stock_threshold: 1.0,
        updated_at: Utc::now(),
    }
}

/// A one-line order with a fresh id in the given venue.
pub fn order(venue: VenueId, table_label: &str, status: OrderStatus) -> Order {
    Order {
        order_id: new_entity_id(),
        venue_id: venue,
        table_label: table_label.to_string(),
        status,
        lines: vec![OrderLine {
            recipe_id: new_entity_id(),
            quantity: 1,
            note: None,
        }],
        total_cents: 1250,
        placed_at: Utc::now(),
    }
}

pub fn recipe(venue: VenueId, name: &str, price_cents: i64) -> Recipe {
    Recipe {
        recipe_id: new_entity_id(),
        venue_id: venue,
        name: name.to_string(),
        ingredients: vec![RecipeIngredient {
            stock_item_id: new_entity_id(),
            quantity: 0.2,
        }],
        price_cents,
        active: true,
    }
}

pub fn notification(venue: VenueId, message: &str) -> Notification {
    Notification {
        notification_id: new_entity_id(),
        venue_id: venue,
        level: NotificationLevel::Info,
        message: message.to_string(),
        read: false,
        created_at: Utc::now(),
    }
}

// ============================================================================
// PROPTEST STRATEGIES
// ============================================================================

pub fn name_strategy() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9 _-]{3,24}".prop_map(|s| s.trim().to_string())
}

pub fn quantity_strategy() -> impl Strategy<Value = f64> {
    (0u32..10_000u32).prop_map(|q| f64::from(q) / 10.0)
}

/// Stock items with distinct fresh ids in one venue.
pub fn stock_items_strategy(
    venue: VenueId,
    max: usize,
) -> impl Strategy<Value = Vec<StockItem>> {
    prop::collection::vec((name_strategy(), quantity_strategy()), 1..=max).prop_map(move |specs| {
        specs
            .into_iter()
            .map(|(name, quantity)| stock_item(venue, &name, quantity))
            .collect()
    })
}

pub fn order_status_strategy() -> impl Strategy<Value = OrderStatus> {
    prop_oneof![
        Just(OrderStatus::Placed),
        Just(OrderStatus::Preparing),
        Just(OrderStatus::Ready),
        Just(OrderStatus::Served),
        Just(OrderStatus::Invoiced),
        Just(OrderStatus::Cancelled),
    ]
}

pub fn orders_strategy(venue: VenueId, max: usize) -> impl Strategy<Value = Vec<Order>> {
    prop::collection::vec((name_strategy(), order_status_strategy()), 1..=max).prop_map(
        move |specs| {
            specs
                .into_iter()
                .map(|(table, status)| order(venue, &table, status))
                .collect()
        },
    )
}
