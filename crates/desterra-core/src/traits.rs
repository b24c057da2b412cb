use crate::{
    error::DesterraError,
    message::{IncomingMessage, OutgoingMessage},
};
use async_trait::async_trait;

/// Messaging Channel trait.
///
/// Every messaging platform (WhatsApp, the local console, etc.) implements
/// this trait to receive and send messages. The platform client itself is
/// opaque to the rest of the bot.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Human-readable channel name.
    fn name(&self) -> &str;

    /// Start listening for incoming messages.
    /// Returns a receiver that yields incoming messages.
    async fn start(&self) -> Result<tokio::sync::mpsc::Receiver<IncomingMessage>, DesterraError>;

    /// Send a message (text and/or media) back through this channel.
    async fn send(&self, message: OutgoingMessage) -> Result<(), DesterraError>;

    /// Graceful shutdown.
    async fn stop(&self) -> Result<(), DesterraError>;
}
