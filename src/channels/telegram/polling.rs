//! Telegram polling mode — getUpdates loop and event conversion

use serde::Deserialize;
use tokio::sync::mpsc;

use super::dedup::UpdateDedup;
use super::types::{API_BASE, Update};
use crate::chat::{ChatEvent, EventPayload, ReplyRef};

/// Response from Telegram getUpdates API
#[derive(Debug, Deserialize)]
struct GetUpdatesResponse {
    #[allow(dead_code)]
    ok: bool,
    result: Vec<Update>,
}

impl super::TelegramChannel {
    /// Spawn a background task that polls Telegram's getUpdates API
    ///
    /// Long-polls getUpdates and forwards received events into the mpsc
    /// channel. Any existing webhook must be deleted first or getUpdates
    /// conflicts.
    pub fn start_polling(&self, interval: std::time::Duration) -> tokio::task::JoinHandle<()> {
        let token = self.token.clone();
        let client = self.client.clone();
        let tx = self
            .event_tx
            .clone()
            .expect("start_polling requires an event_tx (use with_receiver)");

        tokio::spawn(async move {
            polling_loop(token, client, tx, interval).await;
        })
    }
}

/// Run the polling loop (background task)
async fn polling_loop(
    token: String,
    client: reqwest::Client,
    tx: mpsc::Sender<ChatEvent>,
    interval: std::time::Duration,
) {
    let mut offset: Option<i64> = None;
    let mut dedup = UpdateDedup::default();

    loop {
        let url = format!("{API_BASE}{token}/getUpdates");
        let mut params = serde_json::json!({
            "timeout": 30,
            "allowed_updates": ["message"],
        });
        if let Some(off) = offset {
            params["offset"] = serde_json::json!(off);
        }

        match client.post(&url).json(&params).send().await {
            Ok(resp) => {
                if let Ok(body) = resp.text().await {
                    if let Ok(updates) = serde_json::from_str::<GetUpdatesResponse>(&body) {
                        for update in updates.result {
                            // Advance offset past this update
                            offset = Some(update.update_id + 1);

                            if dedup.is_duplicate(update.update_id) {
                                continue;
                            }

                            if let Some(event) = update_to_event(update) {
                                if let Err(e) = tx.send(event).await {
                                    tracing::warn!(error = %e, "failed to forward Telegram event");
                                }
                            }
                        }
                    }
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Telegram getUpdates error");
            }
        }

        tokio::time::sleep(interval).await;
    }
}

/// Convert an update into a `ChatEvent`
///
/// Returns None for bot messages and for updates carrying neither text nor
/// a voice note.
#[must_use]
pub fn update_to_event(update: Update) -> Option<ChatEvent> {
    let msg = update.message?;

    // Skip bot messages
    if msg.from.as_ref().is_some_and(|u| u.is_bot) {
        return None;
    }

    let reply_to = msg.reply_to_message.as_deref().map(|reply| ReplyRef {
        message_id: reply.message_id,
        from_bot: reply.from.as_ref().is_some_and(|u| u.is_bot),
        text: reply.text.clone(),
    });

    let payload = if let Some(voice) = msg.voice {
        EventPayload::Voice {
            file_id: voice.file_id,
        }
    } else {
        EventPayload::Text(msg.text?)
    };

    Some(ChatEvent {
        chat_id: msg.chat.id,
        message_id: msg.message_id,
        payload,
        reply_to,
    })
}
