//! One notification request, start to finish.
//!
//! Both queues go through [`Dispatcher::dispatch`]; [`FlowConfig`] decides
//! whether the per-channel rules run, which routing key throttled requests
//! are rescheduled on and whether billing is signalled.
//!
//! Candidate channels are tried strictly in order and the first accepted
//! send wins. Exactly one audit event is written per request that reaches
//! the sending stage; throttled and unresolvable requests write none.

use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::{
    config::FlowConfig,
    error::DispatchError,
    models::{
        channel::{Channel, order_by_creation},
        evolution::SendOutcome,
        lead::Lead,
        message::{AutoresponderEvent, BlastEvent, NotificationRequest},
        status::EventKind,
        trigger::Attachment,
    },
    pipeline::{
        billing::BillingPublisher,
        ports::{ChannelStore, EventStore, MessageBroker, SenderGateway},
        rate_limiter::{RateLimiter, Verdict},
        recorder::OutcomeRecorder,
        scheduler::RetryScheduler,
    },
    utils::pacing_delay,
};

/// What was resolved before anything is sent.
struct DispatchPlan {
    lead: Lead,
    /// Primary first, then fallbacks.
    candidates: Vec<Channel>,
    /// Trigger or bundle text, used when the request carries none.
    stored_text: Option<String>,
    attachments: Vec<Attachment>,
    mode: SendMode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SendMode {
    /// Text with fallback; attachments follow on whichever channel accepted it.
    LeadThenAttachments,
    /// Attachments only, primary channel only, captioned with the text.
    AttachmentsOnPrimary,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DispatchSummary {
    pub channel: String,
    pub message_id: String,
    pub fallback_used: bool,
    pub accepted_sends: usize,
}

pub struct Dispatcher {
    flow: FlowConfig,
    store: Arc<dyn ChannelStore>,
    gateway: Arc<dyn SenderGateway>,
    limiter: RateLimiter,
    recorder: OutcomeRecorder,
    scheduler: RetryScheduler,
    billing: Option<BillingPublisher>,
}

impl Dispatcher {
    pub fn new(
        flow: FlowConfig,
        store: Arc<dyn ChannelStore>,
        events: Arc<dyn EventStore>,
        broker: Arc<dyn MessageBroker>,
        gateway: Arc<dyn SenderGateway>,
    ) -> Self {
        let scheduler = RetryScheduler::new(
            broker.clone(),
            flow.retry_exchange.clone(),
            flow.retry_routing_key.clone(),
        );
        let billing = flow
            .billing
            .clone()
            .map(|target| BillingPublisher::new(broker, target));

        Self {
            limiter: RateLimiter::new(flow.throttle_bypass),
            recorder: OutcomeRecorder::new(events),
            scheduler,
            billing,
            store,
            gateway,
            flow,
        }
    }

    pub fn flow(&self) -> &FlowConfig {
        &self.flow
    }

    pub async fn dispatch(&self, payload: &[u8]) -> Result<DispatchSummary, DispatchError> {
        let request = NotificationRequest::decode(self.flow.kind, payload)?;

        let mut plan = match &request {
            NotificationRequest::Autoresponder(event) => self.plan_trigger(event).await?,
            NotificationRequest::Blast(event) => self.plan_blast(event).await?,
        };
        let text = request
            .content()
            .map(str::to_string)
            .or_else(|| plan.stored_text.take())
            .unwrap_or_default();

        if self.flow.enforce_throttle {
            if let Some(primary) = plan.candidates.first_mut() {
                self.apply_rules(&request, primary).await?;
            }
        }

        let summary = match plan.mode {
            SendMode::LeadThenAttachments => {
                self.send_with_fallback(&request, &plan, &text).await?
            }
            SendMode::AttachmentsOnPrimary => {
                self.send_attachments_on_primary(&request, &plan, &text).await?
            }
        };

        if let Some(billing) = &self.billing {
            billing.publish().await?;
        }

        info!(
            flow = %self.flow.kind,
            lead_id = plan.lead.id,
            channel = %summary.channel,
            message_id = %summary.message_id,
            fallback_used = summary.fallback_used,
            "Notification dispatched"
        );

        Ok(summary)
    }

    async fn plan_trigger(&self, event: &AutoresponderEvent) -> Result<DispatchPlan, DispatchError> {
        let lead = self.lead(event.lead_id).await?;

        let primary = self
            .store
            .find_channel(event.whatsapp_instance_id)
            .await
            .map_err(DispatchError::Store)?
            .ok_or(DispatchError::NotFound {
                entity: "channel",
                id: event.whatsapp_instance_id,
            })?;

        let mut siblings = self
            .store
            .find_sibling_channels(&primary)
            .await
            .map_err(DispatchError::Store)?;
        siblings.retain(|channel| channel.id != primary.id);
        order_by_creation(&mut siblings);

        let trigger = self
            .store
            .find_trigger(event.whatsapp_trigger_id)
            .await
            .map_err(DispatchError::Store)?
            .ok_or(DispatchError::NotFound {
                entity: "trigger",
                id: event.whatsapp_trigger_id,
            })?;

        let attachments = self
            .store
            .find_trigger_attachments(trigger.id)
            .await
            .map_err(DispatchError::Store)?;

        let mode = if attachments.is_empty() {
            SendMode::LeadThenAttachments
        } else {
            SendMode::AttachmentsOnPrimary
        };

        let mut candidates = Vec::with_capacity(siblings.len() + 1);
        candidates.push(primary);
        candidates.extend(siblings);

        Ok(DispatchPlan {
            lead,
            candidates,
            stored_text: trigger.content,
            attachments,
            mode,
        })
    }

    async fn plan_blast(&self, event: &BlastEvent) -> Result<DispatchPlan, DispatchError> {
        let lead = self.lead(event.lead_id).await?;

        let bundle = self
            .store
            .find_bundle(event.communication_whatsapp_id)
            .await
            .map_err(DispatchError::Store)?
            .ok_or(DispatchError::NotFound {
                entity: "bundle",
                id: event.communication_whatsapp_id,
            })?;

        Ok(DispatchPlan {
            lead,
            candidates: bundle.channels,
            stored_text: bundle.content,
            attachments: bundle.attachments,
            mode: SendMode::LeadThenAttachments,
        })
    }

    async fn lead(&self, lead_id: i64) -> Result<Lead, DispatchError> {
        self.store
            .find_lead(lead_id)
            .await
            .map_err(DispatchError::Store)?
            .ok_or(DispatchError::NotFound {
                entity: "lead",
                id: lead_id,
            })
    }

    /// Evaluates the primary channel, then either schedules a retry of the
    /// original request or commits the new throttle state exactly once.
    async fn apply_rules(
        &self,
        request: &NotificationRequest,
        channel: &mut Channel,
    ) -> Result<(), DispatchError> {
        match self.limiter.evaluate(channel, Utc::now()) {
            Verdict::Throttled { reason, retry_in } => {
                warn!(
                    channel = %channel.instance_name,
                    %reason,
                    retry_in_secs = retry_in.as_secs(),
                    "Channel throttled, rescheduling request"
                );
                self.scheduler.schedule_retry(request, retry_in).await?;

                Err(DispatchError::Throttled {
                    channel: channel.instance_name.clone(),
                    reason,
                    retry_in,
                })
            }
            Verdict::Allow(next) => {
                if let Some(delay) = pacing_delay(self.flow.pacing_max_seconds) {
                    debug!(delay_secs = delay.as_secs(), "Pacing before send");
                    sleep(delay).await;
                }

                RateLimiter::commit(channel, next);
                self.store
                    .save_throttle_state(channel)
                    .await
                    .map_err(DispatchError::Store)
            }
        }
    }

    async fn send_with_fallback(
        &self,
        request: &NotificationRequest,
        plan: &DispatchPlan,
        text: &str,
    ) -> Result<DispatchSummary, DispatchError> {
        let mut last_error = None;

        for (position, channel) in plan.candidates.iter().enumerate() {
            let outcome = match self.gateway.send_text(&plan.lead, channel, text).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!(
                        channel = %channel.instance_name,
                        position,
                        error = %e,
                        "Failed to send message, trying next channel"
                    );
                    last_error = Some(e.to_string());
                    continue;
                }
            };

            let mut accepted_sends = 1;
            for attachment in &plan.attachments {
                match self
                    .send_attachment(&plan.lead, channel, attachment, &attachment.filename)
                    .await
                {
                    Ok(_) => accepted_sends += 1,
                    Err(e) => warn!(
                        channel = %channel.instance_name,
                        attachment_id = attachment.id,
                        error = %e,
                        "Failed to send attachment"
                    ),
                }
            }

            self.recorder
                .record(EventKind::Sent, request, &plan.lead, Some(&outcome))
                .await?;

            return Ok(DispatchSummary {
                channel: channel.instance_name.clone(),
                message_id: outcome.message_id,
                fallback_used: position > 0,
                accepted_sends,
            });
        }

        self.recorder
            .record(EventKind::Failed, request, &plan.lead, None)
            .await?;

        Err(DispatchError::Send {
            attempted: plan.candidates.len(),
            last_error: last_error.unwrap_or_else(|| "no candidate channels".to_string()),
        })
    }

    async fn send_attachments_on_primary(
        &self,
        request: &NotificationRequest,
        plan: &DispatchPlan,
        text: &str,
    ) -> Result<DispatchSummary, DispatchError> {
        let Some(primary) = plan.candidates.first() else {
            return Err(DispatchError::Send {
                attempted: 0,
                last_error: "no candidate channels".to_string(),
            });
        };

        let mut delivered: Option<SendOutcome> = None;
        let mut accepted_sends = 0;
        let mut last_error = None;

        for attachment in &plan.attachments {
            match self
                .send_attachment(&plan.lead, primary, attachment, text)
                .await
            {
                Ok(outcome) => {
                    accepted_sends += 1;
                    delivered = Some(outcome);
                }
                Err(e) => {
                    warn!(
                        channel = %primary.instance_name,
                        attachment_id = attachment.id,
                        error = %e,
                        "Failed to send attachment"
                    );
                    last_error = Some(e.to_string());
                }
            }
        }

        match delivered {
            Some(outcome) => {
                self.recorder
                    .record(EventKind::Sent, request, &plan.lead, Some(&outcome))
                    .await?;

                Ok(DispatchSummary {
                    channel: primary.instance_name.clone(),
                    message_id: outcome.message_id,
                    fallback_used: false,
                    accepted_sends,
                })
            }
            None => {
                self.recorder
                    .record(EventKind::Failed, request, &plan.lead, None)
                    .await?;

                Err(DispatchError::Send {
                    attempted: 1,
                    last_error: last_error.unwrap_or_default(),
                })
            }
        }
    }

    async fn send_attachment(
        &self,
        lead: &Lead,
        channel: &Channel,
        attachment: &Attachment,
        caption: &str,
    ) -> Result<SendOutcome> {
        if attachment.is_link() {
            self.gateway.send_text(lead, channel, &attachment.content).await
        } else {
            self.gateway
                .send_media(lead, channel, attachment, caption)
                .await
        }
    }
}
