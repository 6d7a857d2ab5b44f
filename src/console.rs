//! Terminal channel: one user typing on stdin, replies on stdout.

use async_trait::async_trait;
use belt_core::{
    error::BeltError,
    message::{IncomingMessage, OutgoingMessage},
    traits::Channel,
};
use chrono::Utc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub const CHANNEL_NAME: &str = "console";

pub struct ConsoleChannel {
    user_id: String,
}

impl ConsoleChannel {
    pub fn new(user_id: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
        }
    }

    fn incoming(&self, text: &str) -> IncomingMessage {
        IncomingMessage {
            id: Uuid::new_v4(),
            channel: CHANNEL_NAME.to_string(),
            sender_id: self.user_id.clone(),
            sender_name: None,
            text: text.to_string(),
            timestamp: Utc::now(),
            reply_target: Some(self.user_id.clone()),
        }
    }
}

#[async_trait]
impl Channel for ConsoleChannel {
    fn name(&self) -> &str {
        CHANNEL_NAME
    }

    async fn start(&self) -> Result<mpsc::Receiver<IncomingMessage>, BeltError> {
        let (tx, rx) = mpsc::channel(16);
        let template = self.incoming("");

        info!(
            "Console channel started for {} (type 'exit' to quit)",
            self.user_id
        );
        tokio::spawn(async move {
            let mut lines = BufReader::new(tokio::io::stdin()).lines();
            loop {
                let line = match lines.next_line().await {
                    Ok(Some(line)) => line,
                    Ok(None) => break,
                    Err(e) => {
                        warn!("console read failed: {e}");
                        break;
                    }
                };
                let text = line.trim();
                if text.is_empty() {
                    continue;
                }
                if matches!(text, "exit" | "quit") {
                    break;
                }
                let msg = IncomingMessage {
                    id: Uuid::new_v4(),
                    text: text.to_string(),
                    timestamp: Utc::now(),
                    ..template.clone()
                };
                if tx.send(msg).await.is_err() {
                    break;
                }
            }
            debug!("console input closed");
        });
        Ok(rx)
    }

    async fn send(&self, message: OutgoingMessage) -> Result<(), BeltError> {
        println!("{}\n", message.text);
        Ok(())
    }

    async fn stop(&self) -> Result<(), BeltError> {
        Ok(())
    }
}
