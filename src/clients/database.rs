use std::time::Duration;

use anyhow::{Error, Result, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool, postgres::PgPoolOptions, types::Json};
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::{
    config::Config,
    models::{
        audit::AuditEvent,
        channel::{Channel, ThrottleState},
        lead::Lead,
        trigger::{Attachment, Bundle, Trigger},
    },
    pipeline::ports::{ChannelStore, EventStore},
};

const CHANNEL_COLUMNS: &str = r#"
    wi.id::bigint AS id,
    wi."instanceName" AS instance_name,
    wi.owner AS owner,
    wi.organization_id::bigint AS organization_id,
    wi.created_at::timestamptz AS created_at,
    wi.data AS data
"#;

#[derive(FromRow)]
struct LeadRow {
    id: i64,
    organization_id: i64,
    email: Option<String>,
    phone: Option<String>,
    language_code: Option<String>,
}

impl From<LeadRow> for Lead {
    fn from(row: LeadRow) -> Self {
        Self {
            id: row.id,
            organization_id: row.organization_id,
            email: row.email,
            phone: row.phone.unwrap_or_default(),
            language_code: row.language_code,
        }
    }
}

#[derive(FromRow)]
struct ChannelRow {
    id: i64,
    instance_name: String,
    owner: Option<String>,
    organization_id: i64,
    created_at: DateTime<Utc>,
    data: Option<Json<Value>>,
}

impl From<ChannelRow> for Channel {
    fn from(row: ChannelRow) -> Self {
        Self {
            id: row.id,
            instance_name: row.instance_name,
            owner: row.owner,
            organization_id: row.organization_id,
            created_at: row.created_at,
            throttle: row
                .data
                .map(|Json(blob)| throttle_state(row.id, blob))
                .unwrap_or_default(),
        }
    }
}

fn throttle_state(channel_id: i64, blob: Value) -> ThrottleState {
    if blob.is_null() {
        return ThrottleState::default();
    }

    serde_json::from_value(blob).unwrap_or_else(|e| {
        warn!(channel_id, error = %e, "Unreadable throttle state, treating as first use");
        ThrottleState::default()
    })
}

#[derive(FromRow)]
struct TriggerRow {
    id: i64,
    name: String,
    content: Option<String>,
    organization_id: i64,
}

#[derive(FromRow)]
struct BundleRow {
    id: i64,
    organization_id: i64,
    content: Option<String>,
}

#[derive(FromRow)]
struct AttachmentRow {
    id: i64,
    filename: String,
    content: String,
    size: i64,
    attachment_type: i32,
}

impl From<AttachmentRow> for Attachment {
    fn from(row: AttachmentRow) -> Self {
        Self {
            id: row.id,
            filename: row.filename,
            content: row.content,
            size: row.size,
            attachment_type: row.attachment_type,
        }
    }
}

/// Postgres pool for one logical database.
///
/// The same type backs both the CRM store (leads, instances, triggers,
/// bundles) and the append-only events store.
pub struct DatabaseClient {
    name: &'static str,
    pool: PgPool,
}

impl DatabaseClient {
    pub async fn connect(name: &'static str, database_url: &str, config: &Config) -> Result<Self, Error> {
        info!(database = name, "Connecting to PostgreSQL database");

        let pool = PgPoolOptions::new()
            .max_connections(config.db_max_connections)
            .min_connections(config.db_min_connections)
            .max_lifetime(Duration::from_secs(config.db_max_lifetime_seconds))
            .connect(database_url)
            .await
            .map_err(|e| anyhow!("Failed to connect to {} database: {}", name, e))?;

        info!(database = name, "PostgreSQL connection established");

        Ok(Self { name, pool })
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub async fn health_check(&self) -> Result<(), Error> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| anyhow!("{} database health check failed: {}", self.name, e))?;

        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
        info!(database = self.name, "PostgreSQL pool closed");
    }

    async fn bundle_channels(&self, bundle_id: i64) -> Result<Vec<Channel>, Error> {
        let query = format!(
            r#"
            SELECT {CHANNEL_COLUMNS}
            FROM blasts.communication_whatsapp_instances cwi
            JOIN whatsapp_instances wi ON wi.id = cwi.whatsapp_instance_id
            WHERE cwi.communication_whatsapp_id = $1
            ORDER BY cwi.created_at ASC, cwi.id ASC
            "#
        );

        let rows = sqlx::query_as::<_, ChannelRow>(&query)
            .bind(bundle_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(Channel::from).collect())
    }

    async fn bundle_attachments(&self, bundle_id: i64) -> Result<Vec<Attachment>, Error> {
        let rows = sqlx::query_as::<_, AttachmentRow>(
            r#"
            SELECT id::bigint AS id, filename, content, size::bigint AS size, "type"::int4 AS attachment_type
            FROM blasts.communication_whatsapp_attachments
            WHERE communication_whatsapp_id = $1
            ORDER BY id ASC
            "#,
        )
        .bind(bundle_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Attachment::from).collect())
    }
}

#[async_trait]
impl ChannelStore for DatabaseClient {
    async fn find_lead(&self, lead_id: i64) -> Result<Option<Lead>> {
        let row = sqlx::query_as::<_, LeadRow>(
            r#"
            SELECT id::bigint AS id, organization_id::bigint AS organization_id, email, phone, language_code
            FROM leads
            WHERE id = $1
            "#,
        )
        .bind(lead_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Lead::from))
    }

    async fn find_channel(&self, channel_id: i64) -> Result<Option<Channel>> {
        let query = format!("SELECT {CHANNEL_COLUMNS} FROM whatsapp_instances wi WHERE wi.id = $1");

        let row = sqlx::query_as::<_, ChannelRow>(&query)
            .bind(channel_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(Channel::from))
    }

    async fn find_sibling_channels(&self, channel: &Channel) -> Result<Vec<Channel>> {
        let query = format!(
            "SELECT {CHANNEL_COLUMNS} FROM whatsapp_instances wi \
             WHERE wi.organization_id = $1 AND wi.id <> $2"
        );

        let rows = sqlx::query_as::<_, ChannelRow>(&query)
            .bind(channel.organization_id)
            .bind(channel.id)
            .fetch_all(&self.pool)
            .await?;

        debug!(
            channel_id = channel.id,
            siblings = rows.len(),
            "Sibling channels loaded"
        );

        Ok(rows.into_iter().map(Channel::from).collect())
    }

    async fn find_trigger(&self, trigger_id: i64) -> Result<Option<Trigger>> {
        let row = sqlx::query_as::<_, TriggerRow>(
            r#"
            SELECT id::bigint AS id, name, content, organization_id::bigint AS organization_id
            FROM autoresponders.whatsapp_triggers
            WHERE id = $1 AND deleted_at IS NULL
            "#,
        )
        .bind(trigger_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| Trigger {
            id: row.id,
            name: row.name,
            content: row.content,
            organization_id: row.organization_id,
        }))
    }

    async fn find_trigger_attachments(&self, trigger_id: i64) -> Result<Vec<Attachment>> {
        let rows = sqlx::query_as::<_, AttachmentRow>(
            r#"
            SELECT id::bigint AS id, filename, content, size::bigint AS size, "type"::int4 AS attachment_type
            FROM autoresponders.whatsapp_trigger_attachments
            WHERE whatsapp_trigger_id = $1
            ORDER BY id ASC
            "#,
        )
        .bind(trigger_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Attachment::from).collect())
    }

    async fn find_bundle(&self, bundle_id: i64) -> Result<Option<Bundle>> {
        let Some(row) = sqlx::query_as::<_, BundleRow>(
            r#"
            SELECT id::bigint AS id, organization_id::bigint AS organization_id, content
            FROM blasts.communication_whatsapps
            WHERE id = $1
            "#,
        )
        .bind(bundle_id)
        .fetch_optional(&self.pool)
        .await?
        else {
            return Ok(None);
        };

        let channels = self.bundle_channels(row.id).await?;
        let attachments = self.bundle_attachments(row.id).await?;

        Ok(Some(Bundle {
            id: row.id,
            organization_id: row.organization_id,
            content: row.content,
            channels,
            attachments,
        }))
    }

    async fn save_throttle_state(&self, channel: &Channel) -> Result<()> {
        sqlx::query("UPDATE whatsapp_instances SET data = $1, updated_at = NOW() WHERE id = $2")
            .bind(Json(&channel.throttle))
            .bind(channel.id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                error!(channel_id = channel.id, error = %e, "Failed to save throttle state");
                anyhow!("Throttle state update failed: {}", e)
            })?;

        debug!(
            channel_id = channel.id,
            consecutive_sends = channel.throttle.consecutive_sends,
            "Throttle state saved"
        );

        Ok(())
    }
}

#[async_trait]
impl EventStore for DatabaseClient {
    async fn save_event(&self, event: &AuditEvent) -> Result<()> {
        let query = format!(
            r#"
            INSERT INTO whatsapp.{} (
                organization_id,
                lead_id,
                phone_number,
                external_id,
                external_table,
                message_id,
                event_type,
                date_event,
                event
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
            event.kind.table_name()
        );

        sqlx::query(&query)
            .bind(event.organization_id)
            .bind(event.lead_id)
            .bind(&event.phone_number)
            .bind(&event.external_id)
            .bind(&event.external_table)
            .bind(&event.message_id)
            .bind(event.event_type)
            .bind(&event.date_event)
            .bind(Json(&event.event))
            .execute(&self.pool)
            .await
            .map_err(|e| {
                error!(
                    error = %e,
                    kind = %event.kind,
                    lead_id = event.lead_id,
                    "Failed to write event to database"
                );
                anyhow!("Database write failed: {}", e)
            })?;

        debug!(
            kind = %event.kind,
            lead_id = event.lead_id,
            message_id = %event.message_id,
            "Event written to database"
        );

        Ok(())
    }
}
