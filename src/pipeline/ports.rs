use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{
    audit::AuditEvent,
    channel::Channel,
    evolution::SendOutcome,
    lead::Lead,
    trigger::{Attachment, Bundle, Trigger},
};

/// Read access to recipients, channels, triggers and bundles, plus the one
/// write this pipeline performs: the channel's throttle state.
#[async_trait]
pub trait ChannelStore: Send + Sync {
    async fn find_lead(&self, lead_id: i64) -> Result<Option<Lead>>;

    async fn find_channel(&self, channel_id: i64) -> Result<Option<Channel>>;

    /// Other channels of the same organization, in no particular order.
    async fn find_sibling_channels(&self, channel: &Channel) -> Result<Vec<Channel>>;

    async fn find_trigger(&self, trigger_id: i64) -> Result<Option<Trigger>>;

    async fn find_trigger_attachments(&self, trigger_id: i64) -> Result<Vec<Attachment>>;

    async fn find_bundle(&self, bundle_id: i64) -> Result<Option<Bundle>>;

    /// Overwrites the whole blob. No locking: concurrent writers can lose updates.
    async fn save_throttle_state(&self, channel: &Channel) -> Result<()>;
}

#[async_trait]
pub trait EventStore: Send + Sync {
    async fn save_event(&self, event: &AuditEvent) -> Result<()>;
}

#[async_trait]
pub trait MessageBroker: Send + Sync {
    async fn publish(&self, exchange: &str, routing_key: &str, body: &[u8]) -> Result<()>;

    /// Publishes with a delayed-redelivery directive.
    async fn schedule(
        &self,
        exchange: &str,
        routing_key: &str,
        body: &[u8],
        delay: Duration,
    ) -> Result<()>;
}

#[async_trait]
pub trait SenderGateway: Send + Sync {
    async fn send_text(&self, lead: &Lead, channel: &Channel, text: &str) -> Result<SendOutcome>;

    async fn send_media(
        &self,
        lead: &Lead,
        channel: &Channel,
        attachment: &Attachment,
        caption: &str,
    ) -> Result<SendOutcome>;
}

#[async_trait]
pub trait DeliveryAcker: Send + Sync {
    async fn acknowledge(&self, delivery_tag: u64) -> Result<()>;

    async fn reject(&self, delivery_tag: u64, requeue: bool) -> Result<()>;
}
