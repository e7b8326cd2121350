use std::{sync::Arc, time::Duration};

use anyhow::anyhow;
use tracing::info;

use crate::{
    error::DispatchError,
    models::message::NotificationRequest,
    pipeline::ports::MessageBroker,
};

/// Re-enqueues throttled requests through the broker's delayed redelivery.
///
/// There is no attempt counter: a channel that stays throttled keeps
/// rescheduling the same request.
pub struct RetryScheduler {
    broker: Arc<dyn MessageBroker>,
    exchange: String,
    routing_key: String,
}

impl RetryScheduler {
    pub fn new(broker: Arc<dyn MessageBroker>, exchange: String, routing_key: String) -> Self {
        Self {
            broker,
            exchange,
            routing_key,
        }
    }

    pub async fn schedule_retry(
        &self,
        request: &NotificationRequest,
        delay: Duration,
    ) -> Result<(), DispatchError> {
        let payload = request
            .to_payload()
            .map_err(|e| DispatchError::Broker(anyhow!("Failed to encode retry payload: {}", e)))?;

        self.broker
            .schedule(&self.exchange, &self.routing_key, &payload, delay)
            .await
            .map_err(DispatchError::Broker)?;

        info!(
            exchange = %self.exchange,
            routing_key = %self.routing_key,
            lead_id = request.lead_id(),
            delay_secs = delay.as_secs(),
            "Notification rescheduled"
        );

        Ok(())
    }
}
