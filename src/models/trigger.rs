use serde::{Deserialize, Serialize};

use crate::models::channel::Channel;

/// Attachment type stored for links; sent as plain text, never as media.
pub const LINK_ATTACHMENT_TYPE: i32 = 3;

const MEDIA_TYPE_UNKNOWN: &str = "unknown";
const MIME_TYPE_DEFAULT: &str = "application/octet-stream";

/// Ordinal table, 1-based: attachment type `n` maps to entry `n - 1`.
const MEDIA_TYPES: [(&str, &str); 4] = [
    ("image", "image/png"),
    ("audio", "audio/mpeg"),
    ("video", "video/mp4"),
    ("document", "application/pdf"),
];

/// An autoresponder rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trigger {
    pub id: i64,
    pub name: String,
    pub content: Option<String>,
    pub organization_id: i64,
}

/// A blast campaign's communication definition.
#[derive(Debug, Clone, PartialEq)]
pub struct Bundle {
    pub id: i64,
    pub organization_id: i64,
    pub content: Option<String>,
    /// In link order.
    pub channels: Vec<Channel>,
    pub attachments: Vec<Attachment>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    pub id: i64,
    pub filename: String,
    pub content: String,
    pub size: i64,
    pub attachment_type: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MediaKind {
    pub media_type: &'static str,
    pub mime_type: &'static str,
}

impl MediaKind {
    /// Out-of-range values map to `unknown` / octet-stream; the send still goes out.
    pub fn from_type(attachment_type: i32) -> Self {
        usize::try_from(attachment_type)
            .ok()
            .and_then(|n| n.checked_sub(1))
            .and_then(|index| MEDIA_TYPES.get(index))
            .map(|&(media_type, mime_type)| MediaKind {
                media_type,
                mime_type,
            })
            .unwrap_or(MediaKind {
                media_type: MEDIA_TYPE_UNKNOWN,
                mime_type: MIME_TYPE_DEFAULT,
            })
    }
}

impl Attachment {
    pub fn is_link(&self) -> bool {
        self.attachment_type == LINK_ATTACHMENT_TYPE
    }

    pub fn media_kind(&self) -> MediaKind {
        MediaKind::from_type(self.attachment_type)
    }
}
