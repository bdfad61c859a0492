//! Brigade Network Edge
//!
//! The dashboard's only contact with the server: a JSON REST transport
//! for fetches and mutation legs, and reconnecting WebSocket feed
//! channels that stream collection changes into the cache. Everything
//! above this crate works against cached snapshots.

pub mod config;
pub mod order_feed;
pub mod realtime;
pub mod transport;

pub use config::{ClientConfig, ConfigError, ReconnectConfig};
pub use order_feed::{
    decode_invoice_frame, decode_order_frame, spawn_order_feeds, InvoiceFeedFrame, OrderFeedFrame,
    OrderFeeds, ORDER_INVOICED_CHANNEL, ORDER_LIVE_CHANNEL,
};
pub use realtime::{spawn_event_pump, ChannelState, FeedChannel, FeedHandle, FrameDecoder};
pub use transport::{
    CollectionClient, Method, MockTransport, RecordedRequest, RestClient, Transport,
};
