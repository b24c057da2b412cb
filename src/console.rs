//! Console channel: chat with the bot from a terminal.
//!
//! Every stdin line is one incoming message. A `@path` token naming a
//! readable file is attached to the message and removed from its text, so
//! `.sticker @cat.png` works like sending a picture with a caption. Media
//! replies are written to the outbox directory and their path is printed.

use async_trait::async_trait;
use desterra_core::{
    config::ConsoleConfig,
    error::DesterraError,
    media::{extension_for, mimetype_for_extension},
    message::{Attachment, AttachmentType, IncomingMessage, OutgoingMessage},
    traits::Channel,
};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub struct ConsoleChannel {
    config: ConsoleConfig,
    outbox: PathBuf,
    reader: Mutex<Option<JoinHandle<()>>>,
}

impl ConsoleChannel {
    pub fn new(config: ConsoleConfig, outbox: PathBuf) -> Self {
        Self {
            config,
            outbox,
            reader: Mutex::new(None),
        }
    }

    /// Write reply media into the outbox. Returns the file path.
    async fn save_media(&self, mimetype: &str, data: &[u8]) -> Result<PathBuf, DesterraError> {
        tokio::fs::create_dir_all(&self.outbox).await?;
        let path = self
            .outbox
            .join(format!("{}.{}", Uuid::new_v4(), extension_for(mimetype)));
        tokio::fs::write(&path, data).await?;
        Ok(path)
    }
}

/// Split a console line into message text and attachment paths.
fn split_line(line: &str) -> (String, Vec<PathBuf>) {
    let mut words = Vec::new();
    let mut paths = Vec::new();
    for token in line.split_whitespace() {
        match token.strip_prefix('@') {
            Some(path) if !path.is_empty() => paths.push(PathBuf::from(path)),
            _ => words.push(token),
        }
    }
    (words.join(" "), paths)
}

/// Read an attachment from disk. Unreadable files are skipped with a warning.
async fn load_attachment(path: &Path) -> Option<Attachment> {
    match tokio::fs::read(path).await {
        Ok(data) => {
            let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
            let mimetype = mimetype_for_extension(ext);
            Some(Attachment {
                file_type: AttachmentType::from_mimetype(mimetype),
                mimetype: Some(mimetype.to_string()),
                data: Some(data),
                filename: path.file_name().map(|n| n.to_string_lossy().to_string()),
            })
        }
        Err(e) => {
            warn!("console: cannot attach {}: {e}", path.display());
            None
        }
    }
}

async fn to_message(line: &str, user: &str) -> IncomingMessage {
    let (text, paths) = split_line(line);
    let mut attachments = Vec::new();
    for path in &paths {
        if let Some(attachment) = load_attachment(path).await {
            attachments.push(attachment);
        }
    }
    IncomingMessage {
        id: Uuid::new_v4(),
        channel: "console".to_string(),
        sender_id: user.to_string(),
        sender_name: Some(user.to_string()),
        text,
        timestamp: chrono::Utc::now(),
        attachments,
        reply_target: None,
    }
}

#[async_trait]
impl Channel for ConsoleChannel {
    fn name(&self) -> &str {
        "console"
    }

    async fn start(&self) -> Result<mpsc::Receiver<IncomingMessage>, DesterraError> {
        let (tx, rx) = mpsc::channel(64);
        let user = self.config.user.clone();

        let handle = tokio::spawn(async move {
            let mut lines = BufReader::new(tokio::io::stdin()).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) if line.trim().is_empty() => continue,
                    Ok(Some(line)) => {
                        let msg = to_message(&line, &user).await;
                        if tx.send(msg).await.is_err() {
                            break;
                        }
                    }
                    Ok(None) => {
                        debug!("console: stdin closed");
                        break;
                    }
                    Err(e) => {
                        warn!("console: failed to read stdin: {e}");
                        break;
                    }
                }
            }
        });

        if let Ok(mut reader) = self.reader.lock() {
            *reader = Some(handle);
        }
        info!("Console channel reading stdin");
        Ok(rx)
    }

    async fn send(&self, message: OutgoingMessage) -> Result<(), DesterraError> {
        if !message.text.is_empty() {
            println!("{}", message.text);
        }
        if let Some(media) = message.media {
            let path = self.save_media(&media.mimetype, &media.data).await?;
            let kind = if media.as_sticker { "sticker" } else { "media" };
            println!("[{kind}] {}", path.display());
        }
        Ok(())
    }

    async fn stop(&self) -> Result<(), DesterraError> {
        let handle = self
            .reader
            .lock()
            .map_err(|_| DesterraError::Channel("console reader lock poisoned".into()))?
            .take();
        if let Some(handle) = handle {
            handle.abort();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use desterra_core::message::OutgoingMedia;

    #[test]
    fn test_split_line_extracts_paths() {
        let (text, paths) = split_line(".sticker @/tmp/cat.png  gracioso");
        assert_eq!(text, ".sticker gracioso");
        assert_eq!(paths, vec![PathBuf::from("/tmp/cat.png")]);

        let (text, paths) = split_line(".bot@desterra @");
        assert_eq!(text, ".bot@desterra @");
        assert!(paths.is_empty());
    }

    #[tokio::test]
    async fn test_to_message_attaches_readable_files() {
        let dir = tempfile::tempdir().unwrap();
        let img = dir.path().join("cat.png");
        std::fs::write(&img, [0x89, b'P', b'N', b'G']).unwrap();

        let line = format!(".sticker @{} @{}/missing.jpg", img.display(), dir.path().display());
        let msg = to_message(&line, "ana").await;
        assert_eq!(msg.text, ".sticker");
        assert_eq!(msg.sender_id, "ana");
        assert_eq!(msg.attachments.len(), 1);
        let image = msg.first_image().unwrap();
        assert_eq!(image.mimetype.as_deref(), Some("image/png"));
        assert_eq!(image.filename.as_deref(), Some("cat.png"));
    }

    #[tokio::test]
    async fn test_send_writes_media_to_outbox() {
        let dir = tempfile::tempdir().unwrap();
        let outbox = dir.path().join("outbox");
        let channel = ConsoleChannel::new(ConsoleConfig::default(), outbox.clone());

        channel
            .send(OutgoingMessage {
                text: String::new(),
                media: Some(OutgoingMedia {
                    mimetype: "image/webp".into(),
                    data: vec![1, 2, 3],
                    as_sticker: true,
                }),
                reply_target: None,
            })
            .await
            .unwrap();

        let files: Vec<PathBuf> = std::fs::read_dir(&outbox)
            .unwrap()
            .map(|e| e.unwrap().path())
            .collect();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].extension().unwrap(), "webp");
        assert_eq!(std::fs::read(&files[0]).unwrap(), vec![1, 2, 3]);
    }
}
