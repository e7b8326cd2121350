use std::time::Duration;

use anyhow::{Error, Result, anyhow};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use tracing::{debug, info};

use crate::{
    config::Config,
    models::{
        channel::Channel,
        evolution::{MediaMessage, SendOptions, SendOutcome, SendPayload, SendResponse, TextMessage},
        lead::Lead,
        trigger::Attachment,
    },
    pipeline::ports::SenderGateway,
};

const API_KEY_HEADER: &str = "apikey";

/// HTTP client for the Evolution WhatsApp API.
///
/// One request per call and no internal retry; only `201 Created` counts as
/// accepted.
pub struct EvolutionClient {
    http_client: Client,
    base_url: String,
    api_key: String,
}

impl EvolutionClient {
    pub fn new(config: &Config) -> Result<Self, Error> {
        Self::from_parts(
            &config.evolution_api_base_url,
            &config.evolution_api_key,
            config.evolution_api_timeout_seconds.map(Duration::from_secs),
        )
    }

    pub fn from_parts(base_url: &str, api_key: &str, timeout: Option<Duration>) -> Result<Self, Error> {
        let mut builder = Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        let http_client = builder
            .build()
            .map_err(|e| anyhow!("Failed to build HTTP client: {}", e))?;

        info!(base_url, timeout_secs = timeout.map(|t| t.as_secs()), "Evolution client initialized");

        Ok(Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        })
    }

    fn endpoint(&self, action: &str, instance_name: &str) -> String {
        format!("{}/message/{}/{}", self.base_url, action, instance_name)
    }

    async fn post(&self, action: &str, instance_name: &str, payload: &SendPayload) -> Result<SendOutcome, Error> {
        let url = self.endpoint(action, instance_name);

        debug!(url = %url, number = %payload.number, "Sending Evolution request");

        let response = self
            .http_client
            .post(&url)
            .header(API_KEY_HEADER, &self.api_key)
            .json(payload)
            .send()
            .await
            .map_err(|e| anyhow!("Evolution request failed: {}", e))?;

        let status = response.status();
        let body = response.text().await?;

        if status != StatusCode::CREATED {
            return Err(anyhow!("Evolution responded {}: {}", status, body));
        }

        let raw: Value = serde_json::from_str(&body)
            .map_err(|e| anyhow!("Invalid Evolution response body: {}", e))?;
        let parsed: SendResponse = serde_json::from_value(raw.clone())
            .map_err(|e| anyhow!("Unexpected Evolution response shape: {}", e))?;

        debug!(message_id = %parsed.key.id, instance = instance_name, "Evolution accepted message");

        Ok(SendOutcome {
            message_id: parsed.key.id,
            response: raw,
        })
    }
}

#[async_trait]
impl SenderGateway for EvolutionClient {
    async fn send_text(&self, lead: &Lead, channel: &Channel, text: &str) -> Result<SendOutcome> {
        let payload = SendPayload {
            number: lead.normalized_phone(),
            text_message: Some(TextMessage {
                text: text.to_string(),
            }),
            media_message: None,
            options: SendOptions::text(),
        };

        self.post("sendText", &channel.instance_name, &payload).await
    }

    async fn send_media(
        &self,
        lead: &Lead,
        channel: &Channel,
        attachment: &Attachment,
        caption: &str,
    ) -> Result<SendOutcome> {
        let kind = attachment.media_kind();
        let payload = SendPayload {
            number: lead.normalized_phone(),
            text_message: None,
            media_message: Some(MediaMessage {
                media_type: kind.media_type.to_string(),
                mime_type: kind.mime_type.to_string(),
                caption: caption.to_string(),
                media: attachment.content.clone(),
                file_name: attachment.filename.clone(),
            }),
            options: SendOptions::media(),
        };

        self.post("sendMedia", &channel.instance_name, &payload).await
    }
}
