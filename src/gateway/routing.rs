//! Command routing: menu and usage replies inline, media work through the
//! dispatcher.

use super::Gateway;
use crate::commands::{self, Command};
use desterra_core::message::IncomingMessage;
use tracing::{debug, info};

impl Gateway {
    /// Handle one incoming message end to end.
    pub(super) async fn handle_message(&self, incoming: IncomingMessage) {
        let Some(command) = Command::parse(&incoming.text) else {
            debug!(channel = %incoming.channel, "ignoring non-command message");
            return;
        };

        match command {
            Command::Menu => self.send_text(&incoming, commands::MENU).await,
            Command::Unknown(token) => {
                debug!("unknown command {token}");
                self.send_text(&incoming, commands::UNKNOWN).await;
            }
            media => {
                let job = match commands::prepare(&media, &incoming) {
                    Ok(job) => job,
                    Err(hint) => {
                        self.send_text(&incoming, hint).await;
                        return;
                    }
                };

                info!(
                    category = job.category,
                    sender = %incoming.sender_id,
                    "media command received"
                );
                self.send_text(&incoming, &job.ack).await;
                let outcome = self
                    .dispatcher
                    .enqueue(job.category, job.payload.clone())
                    .await;
                let reply = commands::reply_for(&job, outcome, incoming.reply_target.clone());
                self.send(&incoming, reply).await;
            }
        }
    }
}
