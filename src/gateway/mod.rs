//! Gateway: the main event loop connecting channels and the worker queue.
//!
//! Every incoming message is handled on its own task, so a slow media job
//! never blocks other chats. Shutdown stops admission, lets running jobs
//! finish, delivers their replies, then stops the channels.

mod routing;


use desterra_core::{
    message::{IncomingMessage, OutgoingMessage},
    traits::Channel,
};
use desterra_queue::Dispatcher;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

/// How long shutdown waits for in-flight replies after the queue drained.
const REPLY_GRACE: Duration = Duration::from_secs(5);

/// The central gateway that routes chat commands to the worker queue.
pub struct Gateway {
    pub(super) channels: HashMap<String, Arc<dyn Channel>>,
    pub(super) dispatcher: Dispatcher,
}

impl Gateway {
    pub fn new(channels: HashMap<String, Arc<dyn Channel>>, dispatcher: Dispatcher) -> Self {
        Self {
            channels,
            dispatcher,
        }
    }

    /// Run until Ctrl-C or until every channel has closed.
    pub async fn run(self: Arc<Self>) -> anyhow::Result<()> {
        info!(
            "Desterra gateway running | channels: {} | categories: {}",
            self.channels.keys().cloned().collect::<Vec<_>>().join(", "),
            self.dispatcher.categories().collect::<Vec<_>>().join(", "),
        );

        let (tx, mut rx) = mpsc::channel::<IncomingMessage>(256);

        for (name, channel) in &self.channels {
            let mut channel_rx = channel
                .start()
                .await
                .map_err(|e| anyhow::anyhow!("failed to start channel {name}: {e}"))?;
            let tx = tx.clone();
            let channel_name = name.clone();

            tokio::spawn(async move {
                while let Some(msg) = channel_rx.recv().await {
                    if tx.send(msg).await.is_err() {
                        info!("gateway receiver dropped, stopping {channel_name} forwarder");
                        break;
                    }
                }
            });

            info!("Channel started: {name}");
        }

        drop(tx);

        let mut in_flight = JoinSet::new();
        loop {
            tokio::select! {
                incoming = rx.recv() => match incoming {
                    Some(incoming) => {
                        let gw = self.clone();
                        in_flight.spawn(async move {
                            gw.handle_message(incoming).await;
                        });
                    }
                    None => {
                        info!("All channels closed");
                        break;
                    }
                },
                Some(finished) = in_flight.join_next() => {
                    if let Err(e) = finished {
                        error!("message handler failed: {e}");
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("Received shutdown signal");
                    break;
                }
            }
        }

        self.shutdown(in_flight).await;
        Ok(())
    }

    /// Graceful shutdown: drain the queue, flush replies, stop channels.
    async fn shutdown(&self, mut in_flight: JoinSet<()>) {
        info!("Shutting down...");

        self.dispatcher.shutdown().await;

        let flushed = tokio::time::timeout(REPLY_GRACE, async {
            while in_flight.join_next().await.is_some() {}
        })
        .await;
        if flushed.is_err() {
            warn!("{} replies still pending at shutdown, dropping", in_flight.len());
            in_flight.abort_all();
        }

        for (name, channel) in &self.channels {
            if let Err(e) = channel.stop().await {
                warn!("failed to stop channel {name}: {e}");
            }
        }

        info!("Shutdown complete.");
    }

    /// Send a plain text message back to the sender.
    pub(super) async fn send_text(&self, incoming: &IncomingMessage, text: &str) {
        let msg = OutgoingMessage {
            text: text.to_string(),
            media: None,
            reply_target: incoming.reply_target.clone(),
        };
        self.send(incoming, msg).await;
    }

    /// Send a message through the channel the incoming message came from.
    pub(super) async fn send(&self, incoming: &IncomingMessage, msg: OutgoingMessage) {
        if let Some(channel) = self.channels.get(&incoming.channel) {
            if let Err(e) = channel.send(msg).await {
                error!("failed to send message: {e}");
            }
        } else {
            warn!("no channel named {} to reply through", incoming.channel);
        }
    }
}
