use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

/// Per-channel pacing state kept in the instance's `data` blob.
///
/// An absent key means the channel has never been evaluated for that rule.
/// Keys this pipeline does not own are carried in `extra` and written back
/// untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ThrottleState {
    #[serde(
        default,
        deserialize_with = "lenient_counter",
        skip_serializing_if = "Option::is_none"
    )]
    pub consecutive_sends: Option<i64>,

    #[serde(
        default,
        serialize_with = "rfc3339_seconds",
        skip_serializing_if = "Option::is_none"
    )]
    pub last_send_time: Option<DateTime<Utc>>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A sending identity (one connected chat account).
#[derive(Debug, Clone, PartialEq)]
pub struct Channel {
    pub id: i64,
    pub instance_name: String,
    pub owner: Option<String>,
    pub organization_id: i64,
    pub created_at: DateTime<Utc>,
    pub throttle: ThrottleState,
}

const DAYS_PER_MONTH: i64 = 30;

impl Channel {
    /// Whole 30-day months elapsed since the channel was created.
    pub fn months_since_creation(&self, now: DateTime<Utc>) -> i64 {
        let hours = (now - self.created_at).num_hours();
        (hours / (24 * DAYS_PER_MONTH)).max(0)
    }
}

/// Sorts fallback candidates oldest-created first. Ties keep query order.
pub fn order_by_creation(channels: &mut [Channel]) {
    channels.sort_by_key(|channel| channel.created_at);
}

// Older writers stored the counter as a float.
fn lenient_counter<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| v.as_f64()).map(|n| n as i64))
}

fn rfc3339_seconds<S>(value: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    match value {
        Some(ts) => serializer.serialize_str(&ts.to_rfc3339_opts(SecondsFormat::Secs, true)),
        None => serializer.serialize_none(),
    }
}
