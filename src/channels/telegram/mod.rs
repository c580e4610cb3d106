//! Telegram channel adapter
//!
//! Raw Bot API calls over reqwest plus the getUpdates polling loop. Inbound
//! updates (from polling or the webhook endpoint) are converted into
//! `ChatEvent`s and forwarded through an mpsc channel to the daemon.

mod api;
mod dedup;
mod polling;
mod types;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::chat::{ChatEvent, ChatPort};
use crate::Result;

pub use dedup::UpdateDedup;
pub use polling::update_to_event;
pub use types::{BotCommand, Update};

/// Default capacity of the inbound event channel
const EVENT_BUFFER: usize = 64;

/// Telegram channel adapter
pub struct TelegramChannel {
    token: String,
    client: reqwest::Client,
    event_tx: Option<mpsc::Sender<ChatEvent>>,
}

impl TelegramChannel {
    /// Create an adapter wired to an inbound event channel
    ///
    /// The returned receiver yields events from polling or webhook ingest.
    #[must_use]
    pub fn with_receiver(token: String) -> (Self, mpsc::Receiver<ChatEvent>) {
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        (
            Self {
                token,
                client: reqwest::Client::new(),
                event_tx: Some(tx),
            },
            rx,
        )
    }

    /// Sender half of the inbound event channel (for webhook ingest)
    #[must_use]
    pub fn event_sender(&self) -> Option<mpsc::Sender<ChatEvent>> {
        self.event_tx.clone()
    }
}

#[async_trait]
impl ChatPort for TelegramChannel {
    async fn send_message(&self, chat_id: i64, text: &str) -> Result<i64> {
        self.send_message_returning_id(chat_id, text).await
    }

    async fn edit_message(&self, chat_id: i64, message_id: i64, text: &str) -> Result<()> {
        self.edit_message_text(chat_id, message_id, text).await
    }

    async fn delete_message(&self, chat_id: i64, message_id: i64) -> Result<()> {
        self.delete_message_by_id(chat_id, message_id).await
    }

    async fn send_chat_action(&self, chat_id: i64, action: &str) -> Result<()> {
        self.send_chat_action_raw(chat_id, action).await
    }

    async fn send_voice(&self, chat_id: i64, audio: Vec<u8>, filename: &str) -> Result<()> {
        self.send_voice_data(chat_id, audio, filename).await
    }

    async fn download_file(&self, file_id: &str) -> Result<Vec<u8>> {
        self.download_file_by_id(file_id).await
    }
}
