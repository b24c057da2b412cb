use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An incoming message from a channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncomingMessage {
    pub id: Uuid,
    /// Channel name (e.g. "console", "whatsapp").
    pub channel: String,
    /// Platform-specific user ID.
    pub sender_id: String,
    /// Human-readable sender name.
    pub sender_name: Option<String>,
    /// Message text content.
    pub text: String,
    pub timestamp: DateTime<Utc>,
    pub attachments: Vec<Attachment>,
    /// Platform-specific target for routing the response (e.g. a chat JID).
    #[serde(default)]
    pub reply_target: Option<String>,
}

impl IncomingMessage {
    /// First image attachment carrying inline bytes, if any.
    pub fn first_image(&self) -> Option<&Attachment> {
        self.attachments
            .iter()
            .find(|a| matches!(a.file_type, AttachmentType::Image) && a.data.is_some())
    }
}

/// An outgoing message to send back through a channel.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutgoingMessage {
    pub text: String,
    /// Optional media sent along with (or instead of) the text.
    #[serde(default)]
    pub media: Option<OutgoingMedia>,
    /// Platform-specific target for routing.
    #[serde(default)]
    pub reply_target: Option<String>,
}

/// Media attached to an outgoing message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutgoingMedia {
    pub mimetype: String,
    pub data: Vec<u8>,
    /// Deliver as a sticker rather than a regular image.
    #[serde(default)]
    pub as_sticker: bool,
}

/// A file attachment on a message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attachment {
    pub file_type: AttachmentType,
    pub mimetype: Option<String>,
    pub data: Option<Vec<u8>>,
    pub filename: Option<String>,
}

/// Supported attachment types.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum AttachmentType {
    Image,
    Document,
    Audio,
    Video,
    Other,
}

impl AttachmentType {
    /// Classify a MIME type.
    pub fn from_mimetype(mimetype: &str) -> Self {
        match mimetype.split('/').next() {
            Some("image") => Self::Image,
            Some("audio") => Self::Audio,
            Some("video") => Self::Video,
            Some("application") | Some("text") => Self::Document,
            _ => Self::Other,
        }
    }
}
