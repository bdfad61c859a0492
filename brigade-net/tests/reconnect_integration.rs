//! End-to-end feed channel behavior against a local WebSocket server:
//! the channel redials after the server drops it, duplicate frames from
//! before the cut are absorbed, and garbage frames never kill the
//! connection.

use brigade_cache::CollectionCache;
use brigade_core::{CollectionKey, Entity, Order, OrderStatus, ResourceKind, VenueId};
use brigade_net::{
    decode_order_frame, spawn_event_pump, ChannelState, FeedChannel, OrderFeedFrame,
    ReconnectConfig,
};
use brigade_test_utils::order;
use futures_util::SinkExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

fn upsert_frame(order: &Order) -> Message {
    let text = serde_json::to_string(&OrderFeedFrame::OrderUpserted {
        order: order.clone(),
    })
    .unwrap();
    Message::Text(text)
}

async fn wait_until(mut probe: impl FnMut() -> bool, what: &str) {
    for _ in 0..250 {
        if probe() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("timed out waiting for {what}");
}

#[tokio::test]
async fn feed_channel_survives_a_server_drop_without_duplicates() {
    let venue = VenueId::generate();
    let first = order(venue, "T1", OrderStatus::Placed);
    let second = order(venue, "T2", OrderStatus::Preparing);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server_first = first.clone();
    let server_second = second.clone();
    let server = tokio::spawn(async move {
        // First connection: deliver one order, then drop the socket
        // without a close frame.
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        ws.send(upsert_frame(&server_first)).await.unwrap();
        drop(ws);

        // Second connection after the client's fixed-interval redial:
        // re-send the first order (the server replays recent state),
        // slip in a garbage frame, then a genuinely new order.
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        ws.send(upsert_frame(&server_first)).await.unwrap();
        ws.send(Message::Text("{ not json".to_string())).await.unwrap();
        ws.send(upsert_frame(&server_second)).await.unwrap();

        // Hold the socket open until the client has drained everything.
        tokio::time::sleep(Duration::from_secs(5)).await;
    });

    let cache: CollectionCache<Order> = CollectionCache::new();
    let key = CollectionKey::all(ResourceKind::Order, venue);
    cache.snapshot(key);

    let (events_tx, events_rx) = mpsc::channel(64);
    let pump = spawn_event_pump(events_rx, cache.clone());
    let handle = FeedChannel::spawn(
        "orders.live",
        format!("ws://{addr}/ws/venues/{venue}/orders"),
        Arc::new(decode_order_frame),
        events_tx,
        ReconnectConfig { interval_ms: 50 },
    );

    let probe_cache = cache.clone();
    wait_until(
        move || {
            let entry = probe_cache.snapshot(key);
            entry.contains(first.entity_id()) && entry.contains(second.entity_id())
        },
        "both orders to arrive across the reconnect",
    )
    .await;

    assert_eq!(handle.state(), ChannelState::Open, "channel re-opened");

    let entry = cache.snapshot(key);
    assert_eq!(entry.items.len(), 2, "replayed frame absorbed, not duplicated");
    assert_eq!(entry.total_count, 2);

    handle.shutdown();
    pump.abort();
    server.abort();
}

#[tokio::test]
async fn feed_channel_keeps_dialing_while_the_server_is_down() {
    // Reserve a port, then close the listener so every dial fails.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let (events_tx, _events_rx) = mpsc::channel::<brigade_core::RealtimeEvent<Order>>(8);
    let handle = FeedChannel::spawn(
        "orders.live",
        format!("ws://{addr}/ws"),
        Arc::new(decode_order_frame),
        events_tx,
        ReconnectConfig { interval_ms: 30 },
    );

    let mut state = handle.state_watch();
    let mut attempts = 0;
    // Connecting -> Error, over and over, at the fixed interval.
    while attempts < 3 {
        state.changed().await.unwrap();
        if *state.borrow() == ChannelState::Error {
            attempts += 1;
        }
    }

    handle.shutdown();
}
