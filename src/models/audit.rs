use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::models::status::EventKind;

/// Event type code written on every dispatch outcome.
pub const DISPATCH_EVENT_TYPE: i32 = 1;

/// Append-only record of one terminal dispatch outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub kind: EventKind,
    pub lead_id: i64,
    pub organization_id: i64,
    pub phone_number: String,
    pub external_id: String,
    pub external_table: String,
    pub message_id: String,
    pub event_type: i32,
    pub date_event: String,
    pub event: JsonValue,
}

impl AuditEvent {
    pub fn new(
        kind: EventKind,
        lead_id: i64,
        organization_id: i64,
        phone_number: String,
        external_id: String,
        external_table: &str,
    ) -> Self {
        Self {
            kind,
            lead_id,
            organization_id,
            phone_number,
            external_id,
            external_table: external_table.to_string(),
            message_id: String::new(),
            event_type: DISPATCH_EVENT_TYPE,
            date_event: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            event: JsonValue::Null,
        }
    }

    pub fn with_message_id(mut self, message_id: String) -> Self {
        self.message_id = message_id;
        self
    }

    pub fn with_event(mut self, event: JsonValue) -> Self {
        self.event = event;
        self
    }
}
