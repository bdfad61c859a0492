//! Order-tracking feed wiring.
//!
//! Live order tracking uses two channels against the same venue: a
//! per-order channel that upserts every placed or changed order, and a
//! batched channel that removes orders once they are invoiced. Both
//! feed one pump so arrival order is preserved across channels.

use crate::config::ReconnectConfig;
use crate::realtime::{spawn_event_pump, ChannelState, FeedChannel, FeedHandle};
use brigade_cache::CollectionCache;
use brigade_core::{CacheError, EntityId, KeyMatcher, Order, RealtimeEvent, ResourceKind, VenueId};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

pub const ORDER_LIVE_CHANNEL: &str = "orders.live";
pub const ORDER_INVOICED_CHANNEL: &str = "orders.invoiced";

/// Frame on the per-order channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OrderFeedFrame {
    OrderUpserted { order: Order },
}

/// Frame on the batched invoicing channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InvoiceFeedFrame {
    OrdersInvoiced { order_ids: Vec<EntityId> },
}

pub fn decode_order_frame(text: &str) -> Result<RealtimeEvent<Order>, CacheError> {
    let frame: OrderFeedFrame = serde_json::from_str(text)
        .map_err(|err| CacheError::parse(ORDER_LIVE_CHANNEL, err.to_string()))?;
    match frame {
        OrderFeedFrame::OrderUpserted { order } => {
            Ok(RealtimeEvent::upsert_one(ORDER_LIVE_CHANNEL, order))
        }
    }
}

pub fn decode_invoice_frame(text: &str) -> Result<RealtimeEvent<Order>, CacheError> {
    let frame: InvoiceFeedFrame = serde_json::from_str(text)
        .map_err(|err| CacheError::parse(ORDER_INVOICED_CHANNEL, err.to_string()))?;
    match frame {
        InvoiceFeedFrame::OrdersInvoiced { order_ids } => {
            Ok(RealtimeEvent::remove(ORDER_INVOICED_CHANNEL, order_ids))
        }
    }
}

/// Running order feeds for one venue. Dropping this does not stop the
/// tasks; call [`OrderFeeds::shutdown`].
pub struct OrderFeeds {
    live: FeedHandle,
    invoiced: FeedHandle,
    pump: JoinHandle<()>,
    refreshers: Vec<JoinHandle<()>>,
}

impl OrderFeeds {
    pub fn live_state(&self) -> ChannelState {
        self.live.state()
    }

    pub fn invoiced_state(&self) -> ChannelState {
        self.invoiced.state()
    }

    pub fn shutdown(self) {
        for refresher in self.refreshers {
            refresher.abort();
        }
        self.live.shutdown();
        self.invoiced.shutdown();
        self.pump.abort();
    }
}

/// Open both order channels for a venue and pump them into the cache.
pub fn spawn_order_feeds(
    ws_base_url: &str,
    venue: VenueId,
    cache: CollectionCache<Order>,
    reconnect: ReconnectConfig,
) -> OrderFeeds {
    let base = ws_base_url.trim_end_matches('/');
    let (events_tx, events_rx) = mpsc::channel(256);

    let live = FeedChannel::spawn(
        ORDER_LIVE_CHANNEL,
        format!("{base}/ws/venues/{venue}/orders"),
        Arc::new(decode_order_frame),
        events_tx.clone(),
        reconnect,
    );
    let invoiced = FeedChannel::spawn(
        ORDER_INVOICED_CHANNEL,
        format!("{base}/ws/venues/{venue}/orders/invoiced"),
        Arc::new(decode_invoice_frame),
        events_tx,
        reconnect,
    );

    let pump = spawn_event_pump(events_rx, cache.clone());
    let refreshers = vec![
        spawn_reconnect_refresh(&live, cache.clone(), venue),
        spawn_reconnect_refresh(&invoiced, cache, venue),
    ];

    OrderFeeds {
        live,
        invoiced,
        pump,
        refreshers,
    }
}

/// Events sent while a channel is down are gone; there is no replay.
/// The mitigation is a full refetch: flag every cached order view of
/// the venue stale each time the channel comes back up.
fn spawn_reconnect_refresh(
    handle: &FeedHandle,
    cache: CollectionCache<Order>,
    venue: VenueId,
) -> JoinHandle<()> {
    let mut state = handle.state_watch();
    tokio::spawn(async move {
        let matcher = KeyMatcher::venue_wide(ResourceKind::Order, venue);
        let mut was_open = false;
        while state.changed().await.is_ok() {
            let now = *state.borrow();
            if now == ChannelState::Open {
                if was_open {
                    tracing::debug!(venue = %venue, "feed reconnected, marking order views stale");
                    cache.mark_stale_matching(&matcher);
                }
                was_open = true;
            }
        }
    })
}
