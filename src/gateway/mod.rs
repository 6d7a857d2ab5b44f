//! Gateway: the orchestration engine between channels, the language model,
//! the action executors and session storage.
//!
//! One inbound text runs through wizard/confirmation handling, analysis,
//! the clarification/confirmation gate, the action router and the response
//! synthesizer. Messages from one sender are processed one at a time.

mod analyzer;
mod call_script;
pub mod decode;
mod entities;
mod gate;
mod outcome;
mod pipeline;
mod router;
mod synthesizer;
mod tracker;
mod wizard;

#[cfg(test)]
mod tests;

use belt_core::{
    config::{Config, EngineConfig},
    message::IncomingMessage,
    traits::{
        BrowserExecutor, CalendarExecutor, CallLog, Channel, ContactDirectory, MessageSender,
        PreferenceStore, Provider, SessionStore, VoiceExecutor,
    },
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, Mutex};
use tracing::{info, warn};
use tracker::CallTracker;

/// The external action contracts.
#[derive(Clone)]
pub struct Executors {
    pub voice: Arc<dyn VoiceExecutor>,
    pub sms: Arc<dyn MessageSender>,
    pub email: Arc<dyn MessageSender>,
    pub calendar: Arc<dyn CalendarExecutor>,
    pub browser: Arc<dyn BrowserExecutor>,
}

/// Session state, contacts, preferences and call history.
#[derive(Clone)]
pub struct Storage {
    pub sessions: Arc<dyn SessionStore>,
    pub contacts: Arc<dyn ContactDirectory>,
    pub preferences: Arc<dyn PreferenceStore>,
    pub call_log: Arc<dyn CallLog>,
}

impl Storage {
    /// All four roles served by one backend.
    pub fn from_shared<S>(store: Arc<S>) -> Self
    where
        S: SessionStore + ContactDirectory + PreferenceStore + CallLog + 'static,
    {
        Self {
            sessions: store.clone(),
            contacts: store.clone(),
            preferences: store.clone(),
            call_log: store,
        }
    }
}

/// The central engine that turns requests into tracked actions.
pub struct Gateway {
    pub(super) provider: Arc<dyn Provider>,
    pub(super) channels: HashMap<String, Arc<dyn Channel>>,
    pub(super) executors: Executors,
    pub(super) storage: Storage,
    pub(super) engine: EngineConfig,
    pub(super) timezone: String,
    pub(super) tracker: CallTracker,
    pub(super) uptime: Instant,
    /// Senders with a message in flight. New messages are buffered here.
    pub(super) active_senders: Mutex<HashMap<String, Vec<IncomingMessage>>>,
}

impl Gateway {
    pub fn new(
        provider: Arc<dyn Provider>,
        channels: HashMap<String, Arc<dyn Channel>>,
        executors: Executors,
        storage: Storage,
        config: &Config,
    ) -> Self {
        let tracker = CallTracker::new(
            executors.voice.clone(),
            storage.sessions.clone(),
            storage.call_log.clone(),
            channels.clone(),
            &config.voice,
        );
        Self {
            provider,
            channels,
            executors,
            storage,
            engine: config.engine.clone(),
            timezone: config.belt.timezone.clone(),
            tracker,
            uptime: Instant::now(),
            active_senders: Mutex::new(HashMap::new()),
        }
    }

    /// Run the main event loop until every channel closes or Ctrl-C.
    pub async fn run(self: Arc<Self>) -> anyhow::Result<()> {
        info!(
            "Belt gateway running | provider: {} | channels: {}",
            self.provider.name(),
            self.channels.keys().cloned().collect::<Vec<_>>().join(", ")
        );

        let (tx, mut rx) = mpsc::channel::<IncomingMessage>(256);

        for (name, channel) in &self.channels {
            let mut channel_rx = channel.start().await?;
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

        loop {
            tokio::select! {
                incoming = rx.recv() => match incoming {
                    Some(incoming) => {
                        let gw = self.clone();
                        tokio::spawn(async move {
                            gw.dispatch_message(incoming).await;
                        });
                    }
                    None => {
                        info!("All channels closed");
                        break;
                    }
                },
                _ = tokio::signal::ctrl_c() => {
                    info!("Received shutdown signal");
                    break;
                }
            }
        }

        self.shutdown().await;
        Ok(())
    }

    /// Dispatch a message: buffer if the sender is busy, otherwise process.
    async fn dispatch_message(self: Arc<Self>, incoming: IncomingMessage) {
        let sender_key = format!("{}:{}", incoming.channel, incoming.sender_id);

        {
            let mut active = self.active_senders.lock().await;
            if let Some(buffer) = active.get_mut(&sender_key) {
                buffer.push(incoming.clone());
                info!("buffered message from {sender_key}");
                self.send_text(&incoming, "Momentje, ik rond eerst je vorige bericht af.")
                    .await;
                return;
            }
            active.insert(sender_key.clone(), Vec::new());
        }

        self.handle_message(incoming).await;

        loop {
            let next = {
                let mut active = self.active_senders.lock().await;
                match active.get_mut(&sender_key) {
                    Some(buf) if !buf.is_empty() => Some(buf.remove(0)),
                    _ => {
                        active.remove(&sender_key);
                        None
                    }
                }
            };

            match next {
                Some(buffered) => {
                    info!("processing buffered message from {sender_key}");
                    self.handle_message(buffered).await;
                }
                None => break,
            }
        }
    }

    /// Run one message through the pipeline and send the reply.
    async fn handle_message(&self, incoming: IncomingMessage) {
        let chat = incoming.chat_context();
        let reply = self
            .handle_user_text(&incoming.sender_id, &chat, &incoming.text, false)
            .await;

        self.send_text(&incoming, &reply.text).await;
        for followup in &reply.followups {
            self.send_text(&incoming, followup).await;
        }
    }

    /// Number of calls still being tracked.
    pub async fn active_calls(&self) -> usize {
        self.tracker.active_count().await
    }

    /// Cancel call tracking and stop all channels.
    pub async fn shutdown(&self) {
        info!("Shutting down...");
        self.tracker.shutdown().await;
        for (name, channel) in &self.channels {
            if let Err(e) = channel.stop().await {
                warn!("failed to stop channel {name}: {e}");
            }
        }
        info!("Shutdown complete.");
    }

    /// Send a plain text message back to the sender.
    async fn send_text(&self, incoming: &IncomingMessage, text: &str) {
        tracker::notify(&self.channels, &incoming.chat_context(), text).await;
    }
}
