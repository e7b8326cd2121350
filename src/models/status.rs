use std::fmt::{Display, Formatter, Result};

use serde::{Deserialize, Serialize};

/// Audit event partitions. Each kind is its own table in the events store;
/// the dispatch pipeline only ever writes `Sent` and `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Queued,
    Sent,
    Failed,
    Delivered,
    Read,
    Canceled,
    Scheduled,
    Accepted,
    PartiallyDelivered,
}

/// Terminal broker decision for one delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryDecision {
    Ack,
    Reject,
}

impl EventKind {
    pub fn table_name(&self) -> &'static str {
        match self {
            EventKind::Queued => "queued",
            EventKind::Sent => "sent",
            EventKind::Failed => "failed",
            EventKind::Delivered => "delivered",
            EventKind::Read => "read",
            EventKind::Canceled => "canceled",
            EventKind::Scheduled => "scheduled",
            EventKind::Accepted => "accepted",
            EventKind::PartiallyDelivered => "partially_delivered",
        }
    }
}

impl Display for EventKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        write!(f, "{}", self.table_name())
    }
}
