use std::{collections::HashMap, sync::Arc, time::Instant};

use tracing::{debug, warn};

use crate::{
    clients::{database::DatabaseClient, rbmq::RabbitMqClient},
    models::health::{HealthCheckResponse, ServiceHealth},
};

/// Probes the live dependencies the workers share. No new connections are
/// opened; a check reflects the pools the pipeline actually uses.
pub struct HealthChecker {
    afrus_db: Arc<DatabaseClient>,
    events_db: Arc<DatabaseClient>,
    broker: Arc<RabbitMqClient>,
}

impl HealthChecker {
    pub fn new(
        afrus_db: Arc<DatabaseClient>,
        events_db: Arc<DatabaseClient>,
        broker: Arc<RabbitMqClient>,
    ) -> Self {
        Self {
            afrus_db,
            events_db,
            broker,
        }
    }

    pub async fn check_all(&self) -> HealthCheckResponse {
        let mut checks = HashMap::new();

        checks.insert(
            "afrus_database".to_string(),
            Self::check_database(&self.afrus_db).await,
        );
        checks.insert(
            "events_database".to_string(),
            Self::check_database(&self.events_db).await,
        );
        checks.insert("message_broker".to_string(), self.check_rabbitmq());

        HealthCheckResponse::from_checks(checks)
    }

    async fn check_database(client: &DatabaseClient) -> ServiceHealth {
        let start = Instant::now();

        match client.health_check().await {
            Ok(_) => {
                let elapsed = start.elapsed().as_millis() as u64;
                debug!(database = client.name(), response_time_ms = elapsed, "Database health check passed");
                ServiceHealth::healthy(elapsed)
            }
            Err(e) => {
                warn!(database = client.name(), error = %e, "Database health check failed");
                ServiceHealth::unhealthy(format!("Health check query failed: {}", e))
            }
        }
    }

    fn check_rabbitmq(&self) -> ServiceHealth {
        if self.broker.is_connected() {
            debug!("RabbitMQ health check passed");
            ServiceHealth::healthy(0)
        } else {
            warn!("RabbitMQ connection is not open");
            ServiceHealth::unhealthy("Connection closed".to_string())
        }
    }
}
