//! Error taxonomy for the collection cache.

use thiserror::Error;

/// Errors surfaced by the cache, coordinator and network edge.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CacheError {
    /// Transport failure or non-2xx response.
    #[error("network error{}: {message}", status.map(|s| format!(" ({s})")).unwrap_or_default())]
    Network {
        status: Option<u16>,
        message: String,
    },

    /// Malformed realtime payload. Swallowed at the adapter boundary with
    /// a diagnostic; never tears down the channel.
    #[error("malformed payload on channel {channel}: {reason}")]
    Parse { channel: String, reason: String },

    /// Server rejected the optimistic state. Surfaced, not auto-retried.
    #[error("server rejected optimistic state: {reason}")]
    Conflict { reason: String },

    /// Events were missed while a channel was down. Mitigated by a full
    /// refetch on reconnect, not recovered at the event layer.
    #[error("events missed on channel {channel} during disconnect")]
    ConsistencyGap { channel: String },
}

impl CacheError {
    pub fn network(status: Option<u16>, message: impl Into<String>) -> Self {
        Self::Network {
            status,
            message: message.into(),
        }
    }

    pub fn parse(channel: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Parse {
            channel: channel.into(),
            reason: reason.into(),
        }
    }

    pub fn conflict(reason: impl Into<String>) -> Self {
        Self::Conflict {
            reason: reason.into(),
        }
    }

    /// True for failures a screen should show as a non-blocking error
    /// state rather than a modal (background refetch failures).
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Network { .. } | Self::ConsistencyGap { .. })
    }
}
