use std::sync::Arc;

use tracing::{debug, warn};

use crate::{config::BillingTarget, error::DispatchError, pipeline::ports::MessageBroker};

pub const BILLING_BODY: &[u8] = b"receipt";

/// Best-effort billing signal. Published once, never retried; a failure is
/// only reported back to the caller.
pub struct BillingPublisher {
    broker: Arc<dyn MessageBroker>,
    target: BillingTarget,
}

impl BillingPublisher {
    pub fn new(broker: Arc<dyn MessageBroker>, target: BillingTarget) -> Self {
        Self { broker, target }
    }

    pub async fn publish(&self) -> Result<(), DispatchError> {
        self.broker
            .publish(&self.target.exchange, &self.target.routing_key, BILLING_BODY)
            .await
            .map_err(|e| {
                warn!(exchange = %self.target.exchange, error = %e, "Billing publish failed");
                DispatchError::Billing(e)
            })?;

        debug!(exchange = %self.target.exchange, "Billing event published");
        Ok(())
    }
}
