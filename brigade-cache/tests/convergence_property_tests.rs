//! Property-based tests for cache convergence.
//!
//! For any interleaving of optimistic mutations and realtime events on
//! disjoint ids, every view converges to the union of net effects and the
//! total count tracks creates minus deletes, floored at zero.

use brigade_cache::{CollectionCache, MutationIntent};
use brigade_core::{CollectionKey, Entity, EntityId, RealtimeEvent, ResourceKind, StockItem, VenueId};
use brigade_test_utils::stock_items_strategy;
use proptest::prelude::*;
use std::collections::HashSet;

/// How one item enters the cache and whether it later leaves.
#[derive(Debug, Clone, Copy)]
enum ItemPlan {
    OptimisticCreate { then_delete: bool },
    RealtimeUpsert { then_delete: bool },
}

fn item_plan_strategy() -> impl Strategy<Value = ItemPlan> {
    prop_oneof![
        Just(ItemPlan::OptimisticCreate { then_delete: false }),
        Just(ItemPlan::OptimisticCreate { then_delete: true }),
        Just(ItemPlan::RealtimeUpsert { then_delete: false }),
        Just(ItemPlan::RealtimeUpsert { then_delete: true }),
    ]
}

fn materialized_cache(venue: VenueId) -> CollectionCache<StockItem> {
    let cache = CollectionCache::new();
    cache.snapshot(CollectionKey::all(ResourceKind::Stock, venue));
    cache.snapshot(CollectionKey::window(ResourceKind::Stock, venue));
    cache
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Convergence: the final entry equals the union of net effects and
    /// totalCount = creates − deletes on every view.
    #[test]
    fn prop_disjoint_interleavings_converge(
        items in stock_items_strategy(VenueId::generate(), 12),
        plans in prop::collection::vec(item_plan_strategy(), 12),
    ) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let venue = items[0].venue_id();
            let cache = materialized_cache(venue);

            let mut expected: HashSet<EntityId> = HashSet::new();
            for (item, plan) in items.iter().zip(plans.iter().cycle()) {
                let id = item.entity_id();
                match plan {
                    ItemPlan::OptimisticCreate { then_delete } => {
                        let confirmed = item.clone();
                        cache
                            .mutate_with(MutationIntent::create(item.clone()), move || async move {
                                Ok(Some(confirmed))
                            })
                            .await
                            .unwrap();
                        if *then_delete {
                            cache.apply_remote(&RealtimeEvent::<StockItem>::remove(
                                "stock.removed",
                                vec![id],
                            ));
                        } else {
                            expected.insert(id);
                        }
                    }
                    ItemPlan::RealtimeUpsert { then_delete } => {
                        cache.apply_remote(&RealtimeEvent::upsert_one("stock.live", item.clone()));
                        if *then_delete {
                            let deleted = cache
                                .mutate_with(
                                    MutationIntent::<StockItem>::delete(venue, id),
                                    || async { Ok(None) },
                                )
                                .await;
                            prop_assert!(deleted.is_ok());
                        } else {
                            expected.insert(id);
                        }
                    }
                }
            }

            for key in [
                CollectionKey::all(ResourceKind::Stock, venue),
                CollectionKey::window(ResourceKind::Stock, venue),
            ] {
                let entry = cache.snapshot(key);
                let got: HashSet<EntityId> =
                    entry.items.iter().map(Entity::entity_id).collect();
                prop_assert_eq!(&got, &expected, "items on {}", key);
                prop_assert_eq!(entry.total_count, expected.len() as u64, "total on {}", key);
                prop_assert_eq!(entry.items.len(), got.len(), "no duplicate ids on {}", key);
            }
            Ok(())
        })?;
    }

    /// Idempotence: a duplicated realtime upsert batch changes nothing
    /// after its first application.
    #[test]
    fn prop_duplicate_upsert_batches_are_absorbed(
        items in stock_items_strategy(VenueId::generate(), 8),
    ) {
        let venue = items[0].venue_id();
        let cache = materialized_cache(venue);
        let event = RealtimeEvent::upsert_many("stock.live", items.clone());

        cache.apply_remote(&event);
        let key = CollectionKey::all(ResourceKind::Stock, venue);
        let once = cache.snapshot(key);
        cache.apply_remote(&event);
        let twice = cache.snapshot(key);

        prop_assert_eq!(&once.items, &twice.items);
        prop_assert_eq!(once.total_count, twice.total_count);
        prop_assert_eq!(twice.items.len(), items.len());
    }

    /// Rollback correctness: a failed mutation restores the exact
    /// pre-mutation items when nothing else touched the entry.
    #[test]
    fn prop_failed_update_restores_pre_mutation_items(
        items in stock_items_strategy(VenueId::generate(), 8),
        target_index in 0usize..8,
        new_quantity in 0.0f64..1000.0,
    ) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let venue = items[0].venue_id();
            let cache = materialized_cache(venue);
            cache.apply_remote(&RealtimeEvent::upsert_many("stock.live", items.clone()));

            let key = CollectionKey::all(ResourceKind::Stock, venue);
            let before = cache.snapshot(key);
            let target = &items[target_index % items.len()];

            let outcome = cache
                .mutate_with(
                    MutationIntent::update(
                        venue,
                        target.entity_id(),
                        serde_json::json!({ "quantity": new_quantity }),
                    ),
                    || async {
                        Err(brigade_core::CacheError::network(Some(500), "rejected"))
                    },
                )
                .await;
            prop_assert!(outcome.is_err());

            let after = cache.snapshot(key);
            prop_assert_eq!(&after.items, &before.items);
            prop_assert_eq!(after.total_count, before.total_count);
            Ok(())
        })?;
    }
}
