use std::time::Duration;

use thiserror::Error;

use crate::pipeline::rate_limiter::ThrottleReason;

/// Everything that can end a dispatch attempt early. Every variant leads to
/// a reject without requeue; throttled requests come back through the
/// delayed republish instead.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Failed to decode notification payload: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },

    #[error("Store error: {0}")]
    Store(anyhow::Error),

    #[error("Channel {channel} throttled ({reason}), retry scheduled in {}s", .retry_in.as_secs())]
    Throttled {
        channel: String,
        reason: ThrottleReason,
        retry_in: Duration,
    },

    #[error("Message not delivered through any of {attempted} channel(s): {last_error}")]
    Send {
        attempted: usize,
        last_error: String,
    },

    #[error("Audit event write failed: {0}")]
    Recorder(anyhow::Error),

    #[error("Broker publish failed: {0}")]
    Broker(anyhow::Error),

    #[error("Billing publish failed: {0}")]
    Billing(anyhow::Error),
}

impl DispatchError {
    pub fn is_throttle(&self) -> bool {
        matches!(self, DispatchError::Throttled { .. })
    }
}
