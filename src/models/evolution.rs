use serde::{Deserialize, Serialize};
use serde_json::Value;

const PRESENCE_COMPOSING: &str = "composing";

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SendPayload {
    pub number: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub text_message: Option<TextMessage>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_message: Option<MediaMessage>,

    pub options: SendOptions,
}

#[derive(Debug, Clone, Serialize)]
pub struct TextMessage {
    pub text: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct MediaMessage {
    #[serde(rename = "mediatype")]
    pub media_type: String,
    #[serde(rename = "mimetype")]
    pub mime_type: String,
    pub caption: String,
    pub media: String,
    #[serde(rename = "fileName")]
    pub file_name: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SendOptions {
    pub delay: u32,
    pub presence: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub link_preview: Option<bool>,
}

impl SendOptions {
    pub fn text() -> Self {
        Self {
            delay: 0,
            presence: PRESENCE_COMPOSING.to_string(),
            link_preview: Some(true),
        }
    }

    pub fn media() -> Self {
        Self {
            delay: 0,
            presence: PRESENCE_COMPOSING.to_string(),
            link_preview: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MessageKey {
    #[serde(rename = "remoteJid", default)]
    pub remote_jid: String,
    #[serde(rename = "fromMe", default)]
    pub from_me: bool,
    pub id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SendResponse {
    pub key: MessageKey,
}

/// Normalized result of one accepted send.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SendOutcome {
    pub message_id: String,
    pub response: Value,
}
