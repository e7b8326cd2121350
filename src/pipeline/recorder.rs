use std::sync::Arc;

use tracing::{debug, error};

use crate::{
    error::DispatchError,
    models::{
        audit::AuditEvent,
        evolution::SendOutcome,
        lead::Lead,
        message::NotificationRequest,
        status::EventKind,
    },
    pipeline::ports::EventStore,
};

pub struct OutcomeRecorder {
    events: Arc<dyn EventStore>,
}

impl OutcomeRecorder {
    pub fn new(events: Arc<dyn EventStore>) -> Self {
        Self { events }
    }

    /// Appends one audit row. `outcome` is `None` when nothing was accepted
    /// downstream; the raw payload is then stored as JSON `null`.
    pub async fn record(
        &self,
        kind: EventKind,
        request: &NotificationRequest,
        lead: &Lead,
        outcome: Option<&SendOutcome>,
    ) -> Result<AuditEvent, DispatchError> {
        let (external_id, external_table) = request.external_reference();

        let mut event = AuditEvent::new(
            kind,
            request.lead_id(),
            request.organization_id(),
            lead.normalized_phone(),
            external_id,
            external_table,
        );

        if let Some(outcome) = outcome {
            event = event
                .with_message_id(outcome.message_id.clone())
                .with_event(outcome.response.clone());
        }

        self.events.save_event(&event).await.map_err(|e| {
            error!(
                kind = %kind,
                lead_id = event.lead_id,
                external_id = %event.external_id,
                error = %e,
                "Failed to write audit event"
            );
            DispatchError::Recorder(e)
        })?;

        debug!(
            kind = %kind,
            external_table = %event.external_table,
            external_id = %event.external_id,
            "Audit event saved"
        );

        Ok(event)
    }
}
