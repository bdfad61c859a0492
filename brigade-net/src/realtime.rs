//! Realtime feed channels with fixed-interval reconnect.
//!
//! One [`FeedChannel`] owns one WebSocket URL. It decodes text frames
//! into [`RealtimeEvent`]s and forwards them, in socket order, to an
//! mpsc pipe that a single pump drains into the cache. A frame that
//! fails to decode is logged and dropped; it never tears the channel
//! down. When the connection drops for any reason the channel sleeps
//! for the configured interval and dials again, forever, until the
//! handle is shut down.

use crate::config::ReconnectConfig;
use brigade_cache::CollectionCache;
use brigade_core::{CacheError, Entity, RealtimeEvent};
use futures_util::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

/// Connection lifecycle of one feed channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Disconnected,
    Connecting,
    Open,
    /// Server closed the socket cleanly.
    Closed,
    /// Dial or socket failure.
    Error,
}

/// Turns one text frame into a typed event. `Err` means the frame is
/// dropped with a diagnostic.
pub type FrameDecoder<T> =
    Arc<dyn Fn(&str) -> Result<RealtimeEvent<T>, CacheError> + Send + Sync>;

pub struct FeedChannel;

impl FeedChannel {
    pub fn spawn<T: Entity>(
        name: &'static str,
        url: String,
        decoder: FrameDecoder<T>,
        events_tx: mpsc::Sender<RealtimeEvent<T>>,
        reconnect: ReconnectConfig,
    ) -> FeedHandle {
        let (state_tx, state_rx) = watch::channel(ChannelState::Disconnected);

        let task = tokio::spawn(async move {
            loop {
                let _ = state_tx.send(ChannelState::Connecting);
                match connect_async(&url).await {
                    Ok((mut stream, _)) => {
                        tracing::debug!(channel = name, "feed channel open");
                        let _ = state_tx.send(ChannelState::Open);

                        let mut closing = ChannelState::Disconnected;
                        while let Some(message) = stream.next().await {
                            match message {
                                Ok(Message::Text(text)) => match decoder(&text) {
                                    Ok(event) => {
                                        if events_tx.send(event).await.is_err() {
                                            // Pump gone: the session ended.
                                            let _ = state_tx.send(ChannelState::Closed);
                                            return;
                                        }
                                    }
                                    Err(err) => {
                                        tracing::warn!(
                                            channel = name,
                                            error = %err,
                                            "dropping undecodable frame"
                                        );
                                    }
                                },
                                Ok(Message::Close(_)) => {
                                    closing = ChannelState::Closed;
                                    break;
                                }
                                Ok(_) => {}
                                Err(err) => {
                                    tracing::warn!(
                                        channel = name,
                                        error = %err,
                                        "socket error, will redial"
                                    );
                                    closing = ChannelState::Error;
                                    break;
                                }
                            }
                        }
                        let _ = state_tx.send(closing);
                    }
                    Err(err) => {
                        tracing::warn!(channel = name, error = %err, "dial failed, will retry");
                        let _ = state_tx.send(ChannelState::Error);
                    }
                }

                if events_tx.is_closed() {
                    return;
                }
                // Fixed interval, no backoff.
                tokio::time::sleep(Duration::from_millis(reconnect.interval_ms)).await;
            }
        });

        FeedHandle {
            state: state_rx,
            task,
        }
    }
}

/// Probe and shutdown handle for one spawned channel.
pub struct FeedHandle {
    state: watch::Receiver<ChannelState>,
    task: JoinHandle<()>,
}

impl FeedHandle {
    pub fn state(&self) -> ChannelState {
        *self.state.borrow()
    }

    /// Watch receiver for state transitions, for reconnect hooks.
    pub fn state_watch(&self) -> watch::Receiver<ChannelState> {
        self.state.clone()
    }

    pub fn shutdown(self) {
        self.task.abort();
    }
}

/// Drains the shared event pipe into the cache in arrival order. One
/// pump per entity type; all of that type's channels feed it.
pub fn spawn_event_pump<T: Entity>(
    mut events_rx: mpsc::Receiver<RealtimeEvent<T>>,
    cache: CollectionCache<T>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = events_rx.recv().await {
            cache.apply_remote(&event);
        }
        tracing::debug!("event pump drained, feed channels gone");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use brigade_core::{CollectionKey, ResourceKind, StockItem, VenueId};
    use brigade_test_utils::stock_item;

    #[tokio::test]
    async fn test_pump_applies_events_in_arrival_order() {
        let venue = VenueId::generate();
        let cache: CollectionCache<StockItem> = CollectionCache::new();
        let key = CollectionKey::all(ResourceKind::Stock, venue);
        cache.snapshot(key);

        let item = stock_item(venue, "Flour", 1.0);
        let mut updated = item.clone();
        updated.quantity = 9.0;

        let (tx, rx) = mpsc::channel(8);
        let pump = spawn_event_pump(rx, cache.clone());
        tx.send(RealtimeEvent::upsert_one("stock.live", item.clone()))
            .await
            .unwrap();
        tx.send(RealtimeEvent::upsert_one("stock.live", updated))
            .await
            .unwrap();
        drop(tx);
        pump.await.unwrap();

        let entry = cache.snapshot(key);
        assert_eq!(entry.items.len(), 1);
        assert_eq!(entry.item(item.stock_item_id).unwrap().quantity, 9.0);
    }
}
