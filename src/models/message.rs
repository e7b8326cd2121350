use std::fmt::{Display, Formatter, Result as FmtResult};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowKind {
    Autoresponder,
    Blast,
}

impl FlowKind {
    /// Table name stored in the audit event's external reference pair.
    pub fn external_table(&self) -> &'static str {
        match self {
            FlowKind::Autoresponder => "whatsapp_triggers",
            FlowKind::Blast => "communication_whatsapps",
        }
    }
}

impl Display for FlowKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            FlowKind::Autoresponder => write!(f, "autoresponder"),
            FlowKind::Blast => write!(f, "blast"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutoresponderEvent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    pub lead_id: i64,
    pub organization_id: i64,
    pub whatsapp_trigger_id: i64,
    pub whatsapp_instance_id: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlastEvent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    pub lead_id: i64,
    pub communication_whatsapp_id: i64,
    pub organization_id: i64,
}

/// The decoded broker payload. Never persisted on its own.
#[derive(Debug, Clone, PartialEq)]
pub enum NotificationRequest {
    Autoresponder(AutoresponderEvent),
    Blast(BlastEvent),
}

impl NotificationRequest {
    pub fn decode(kind: FlowKind, payload: &[u8]) -> Result<Self, serde_json::Error> {
        match kind {
            FlowKind::Autoresponder => serde_json::from_slice(payload).map(Self::Autoresponder),
            FlowKind::Blast => serde_json::from_slice(payload).map(Self::Blast),
        }
    }

    pub fn to_payload(&self) -> Result<Vec<u8>, serde_json::Error> {
        match self {
            Self::Autoresponder(event) => serde_json::to_vec(event),
            Self::Blast(event) => serde_json::to_vec(event),
        }
    }

    pub fn lead_id(&self) -> i64 {
        match self {
            Self::Autoresponder(event) => event.lead_id,
            Self::Blast(event) => event.lead_id,
        }
    }

    pub fn organization_id(&self) -> i64 {
        match self {
            Self::Autoresponder(event) => event.organization_id,
            Self::Blast(event) => event.organization_id,
        }
    }

    /// Request text, ignoring empty strings.
    pub fn content(&self) -> Option<&str> {
        let content = match self {
            Self::Autoresponder(event) => event.content.as_deref(),
            Self::Blast(event) => event.content.as_deref(),
        };
        content.filter(|c| !c.is_empty())
    }

    /// `(external_id, external_table)` for the audit trail.
    pub fn external_reference(&self) -> (String, &'static str) {
        match self {
            Self::Autoresponder(event) => (
                event.whatsapp_trigger_id.to_string(),
                FlowKind::Autoresponder.external_table(),
            ),
            Self::Blast(event) => (
                event.communication_whatsapp_id.to_string(),
                FlowKind::Blast.external_table(),
            ),
        }
    }
}
