//! Media commands: turn a chat command into a queued job and the job's
//! outcome into a reply.

use desterra_core::media::Media;
use desterra_core::message::{IncomingMessage, OutgoingMedia, OutgoingMessage};
use desterra_queue::JobError;
use serde_json::{json, Value};
use tracing::warn;

use super::{arguments, Command, UNKNOWN};

const BUSY: &str = "⏳ Hay muchas solicitudes en cola, inténtalo en un momento.";
const INTERNAL: &str = "⚠️ Error interno, inténtalo de nuevo.";

/// A job ready to be enqueued, plus what to tell the user around it.
#[derive(Debug, Clone)]
pub struct MediaJob {
    pub category: &'static str,
    pub payload: Value,
    /// Sent right away, before the job runs.
    pub ack: String,
    /// Sent instead of media when the job fails.
    pub failure: &'static str,
    pub as_sticker: bool,
}

/// Build the job for a media command. `Err` carries the text to reply with
/// instead (usage hints, missing attachment).
pub fn prepare(command: &Command, incoming: &IncomingMessage) -> Result<MediaJob, &'static str> {
    let args = arguments(&incoming.text);
    match command {
        Command::Sticker => {
            let image = incoming
                .first_image()
                .ok_or("⚠️ Envía una imagen con *.sticker* como texto.")?;
            let data = image.data.clone().unwrap_or_default();
            let mimetype = image.mimetype.as_deref().unwrap_or("image/jpeg");
            let payload = serde_json::to_value(Media::new(mimetype, data).to_payload())
                .map_err(|_| INTERNAL)?;
            Ok(MediaJob {
                category: "sticker",
                payload,
                ack: "🖼️ Creando sticker...".to_string(),
                failure: "⚠️ Error al crear sticker.",
                as_sticker: true,
            })
        }
        Command::Image => {
            if args.is_empty() {
                return Err("⚠️ Usa: *.imagenes <descripción>*");
            }
            Ok(MediaJob {
                category: "image",
                payload: json!({ "prompt": args }),
                ack: format!("🖼️ Generando imagen: *{args}* ..."),
                failure: "⚠️ Error al generar la imagen.",
                as_sticker: false,
            })
        }
        Command::Meme => Ok(MediaJob {
            category: "meme",
            payload: json!({}),
            ack: "🤣 Buscando un meme...".to_string(),
            failure: "⚠️ Error al obtener meme.",
            as_sticker: false,
        }),
        Command::Music => {
            if args.is_empty() {
                return Err("⚠️ Usa: *.musica <nombre>*");
            }
            Ok(MediaJob {
                category: "music",
                payload: json!({ "query": args }),
                ack: format!("🎵 Buscando *{args}*..."),
                failure: "⚠️ Error al descargar canción.",
                as_sticker: false,
            })
        }
        Command::Menu | Command::Unknown(_) => Err(UNKNOWN),
    }
}

/// Reply for a finished job.
///
/// Worker results carry `media` and `mimetype`; an optional `title` (music)
/// or `caption` becomes the message text.
pub fn reply_for(
    job: &MediaJob,
    outcome: Result<Value, JobError>,
    reply_target: Option<String>,
) -> OutgoingMessage {
    let failure = |text: &str| OutgoingMessage {
        text: text.to_string(),
        media: None,
        reply_target: reply_target.clone(),
    };

    let value = match outcome {
        Ok(value) => value,
        Err(e @ JobError::QueueFull { .. }) => {
            warn!(category = job.category, "job rejected: {e}");
            return failure(BUSY);
        }
        Err(e) => {
            warn!(category = job.category, "job failed: {e}");
            return failure(job.failure);
        }
    };

    let media = match Media::from_value(&value) {
        Ok(media) => media,
        Err(e) => {
            warn!(category = job.category, "worker returned no usable media: {e}");
            return failure(job.failure);
        }
    };

    let text = match (value["title"].as_str(), value["caption"].as_str()) {
        (Some(title), _) => format!("🎶 {title}"),
        (None, Some(caption)) => caption.to_string(),
        (None, None) => String::new(),
    };

    OutgoingMessage {
        text,
        media: Some(OutgoingMedia {
            mimetype: media.mimetype,
            data: media.data,
            as_sticker: job.as_sticker,
        }),
        reply_target: reply_target.clone(),
    }
}
