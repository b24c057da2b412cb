//! Binary media carried through JSON worker payloads.
//!
//! Worker requests and replies are JSON, so media bytes travel as standard
//! base64 inside a `{"media": ..., "mimetype": ...}` object.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};

use crate::error::DesterraError;

/// Raw media bytes with their MIME type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Media {
    pub mimetype: String,
    pub data: Vec<u8>,
}

/// Wire form of [`Media`] inside a worker payload or result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaPayload {
    /// Base64-encoded bytes.
    pub media: String,
    pub mimetype: String,
}

impl Media {
    pub fn new(mimetype: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            mimetype: mimetype.into(),
            data,
        }
    }

    /// Encode for a worker payload.
    pub fn to_payload(&self) -> MediaPayload {
        MediaPayload {
            media: STANDARD.encode(&self.data),
            mimetype: self.mimetype.clone(),
        }
    }

    /// Decode from any JSON value carrying `media` and `mimetype` fields.
    ///
    /// Extra fields (e.g. `width`, `caption`) are ignored.
    pub fn from_value(value: &serde_json::Value) -> Result<Self, DesterraError> {
        let payload: MediaPayload = serde_json::from_value(value.clone())?;
        payload.decode()
    }

    /// File extension matching the MIME type, `bin` when unknown.
    pub fn extension(&self) -> &'static str {
        extension_for(&self.mimetype)
    }
}

impl MediaPayload {
    pub fn decode(&self) -> Result<Media, DesterraError> {
        let data = STANDARD
            .decode(self.media.trim())
            .map_err(|e| DesterraError::Media(format!("invalid base64 media: {e}")))?;
        Ok(Media {
            mimetype: self.mimetype.clone(),
            data,
        })
    }
}

/// Map a MIME type to a file extension.
pub fn extension_for(mimetype: &str) -> &'static str {
    match mimetype.split(';').next().unwrap_or("").trim() {
        "image/webp" => "webp",
        "image/png" => "png",
        "image/jpeg" | "image/jpg" => "jpg",
        "image/gif" => "gif",
        "audio/mpeg" | "audio/mp3" => "mp3",
        "audio/ogg" => "ogg",
        "audio/mp4" => "m4a",
        _ => "bin",
    }
}

/// Guess a MIME type from a file extension (used by the console channel).
pub fn mimetype_for_extension(ext: &str) -> &'static str {
    match ext.to_ascii_lowercase().as_str() {
        "webp" => "image/webp",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "mp3" => "audio/mpeg",
        "ogg" | "opus" => "audio/ogg",
        "m4a" => "audio/mp4",
        _ => "application/octet-stream",
    }
}
