use anyhow::{Error, Result, anyhow};
use dotenvy::dotenv;
use serde::Deserialize;

use crate::models::{
    message::FlowKind,
    retry::RetryConfig,
};

const DEVELOPMENT: &str = "development";
const PRODUCTION: &str = "production";

#[derive(Clone, Deserialize, Debug)]
pub struct Config {
    #[serde(default = "default_environment")]
    pub environment: String,

    pub rabbitmq_url: String,
    #[serde(default = "default_prefetch_count")]
    pub prefetch_count: u16,
    pub autoresponder_queue_name: String,
    pub blast_queue_name: String,
    pub notification_exchange: String,
    pub autoresponder_routing_key: String,
    pub blast_routing_key: String,
    pub billing_exchange: String,
    pub billing_routing_key: String,
    #[serde(default = "default_broker_connect_attempts")]
    pub broker_connect_attempts: u32,
    #[serde(default = "default_broker_connect_delay_ms")]
    pub broker_connect_delay_ms: u64,

    pub afrus_database_url: String,
    pub events_database_url: String,
    #[serde(default = "default_db_max_connections")]
    pub db_max_connections: u32,
    #[serde(default = "default_db_min_connections")]
    pub db_min_connections: u32,
    #[serde(default = "default_db_max_lifetime_seconds")]
    pub db_max_lifetime_seconds: u64,

    pub evolution_api_base_url: String,
    pub evolution_api_key: String,
    pub evolution_api_timeout_seconds: Option<u64>,

    #[serde(default = "default_worker_concurrency")]
    pub worker_concurrency: usize,
    #[serde(default = "default_shutdown_timeout_seconds")]
    pub shutdown_timeout_seconds: u64,
    #[serde(default = "default_pacing_max_seconds")]
    pub pacing_max_seconds: u64,

    pub server_port: u16,
}

/// Per-queue dispatch settings derived from [`Config`].
#[derive(Clone, Debug)]
pub struct FlowConfig {
    pub kind: FlowKind,
    pub queue_name: String,
    pub retry_exchange: String,
    pub retry_routing_key: String,
    /// Blast campaigns skip the per-channel rules entirely.
    pub enforce_throttle: bool,
    pub throttle_bypass: bool,
    pub pacing_max_seconds: u64,
    pub billing: Option<BillingTarget>,
}

#[derive(Clone, Debug)]
pub struct BillingTarget {
    pub exchange: String,
    pub routing_key: String,
}

impl Config {
    pub fn load() -> Result<Self, Error> {
        dotenv().ok();

        Self::from_vars(std::env::vars())
    }

    /// Builds the config from explicit `(NAME, value)` pairs. Throttle bypass
    /// is only reachable by setting `ENVIRONMENT=development`.
    pub fn from_vars<I>(vars: I) -> Result<Self, Error>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let config = envy::from_iter::<_, Self>(vars)
            .map_err(|e| anyhow!("Invalid or missing environmental variable: {}", e))?;

        if config.worker_concurrency == 0 {
            return Err(anyhow!("WORKER_CONCURRENCY must be greater than zero"));
        }

        Ok(config)
    }

    pub fn is_development(&self) -> bool {
        self.environment == DEVELOPMENT
    }

    pub fn broker_retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.broker_connect_attempts,
            initial_delay_ms: self.broker_connect_delay_ms,
            max_delay_ms: self.broker_connect_delay_ms * 8,
            backoff_multiplier: 2,
        }
    }

    pub fn autoresponder_flow(&self) -> FlowConfig {
        FlowConfig {
            kind: FlowKind::Autoresponder,
            queue_name: self.autoresponder_queue_name.clone(),
            retry_exchange: self.notification_exchange.clone(),
            retry_routing_key: self.autoresponder_routing_key.clone(),
            enforce_throttle: true,
            throttle_bypass: self.is_development(),
            pacing_max_seconds: self.pacing_max_seconds,
            billing: Some(BillingTarget {
                exchange: self.billing_exchange.clone(),
                routing_key: self.billing_routing_key.clone(),
            }),
        }
    }

    pub fn blast_flow(&self) -> FlowConfig {
        FlowConfig {
            kind: FlowKind::Blast,
            queue_name: self.blast_queue_name.clone(),
            retry_exchange: self.notification_exchange.clone(),
            retry_routing_key: self.blast_routing_key.clone(),
            enforce_throttle: false,
            throttle_bypass: self.is_development(),
            pacing_max_seconds: 0,
            billing: None,
        }
    }
}

fn default_environment() -> String {
    PRODUCTION.to_string()
}

fn default_prefetch_count() -> u16 {
    300
}

fn default_broker_connect_attempts() -> u32 {
    5
}

fn default_broker_connect_delay_ms() -> u64 {
    2000
}

fn default_db_max_connections() -> u32 {
    100
}

fn default_db_min_connections() -> u32 {
    10
}

fn default_db_max_lifetime_seconds() -> u64 {
    3600
}

fn default_worker_concurrency() -> usize {
    300
}

fn default_shutdown_timeout_seconds() -> u64 {
    5
}

fn default_pacing_max_seconds() -> u64 {
    60
}
