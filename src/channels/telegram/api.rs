//! Raw Telegram Bot API calls

use super::types::{
    API_BASE, BotCommand, DeleteMessageRequest, EditMessageTextRequest, FILE_BASE, GetFileRequest,
    SendChatActionRequest, SendMessageRequest, SentMessage, SetMyCommandsRequest,
    SetWebhookRequest, TelegramFile, TelegramResponse,
};
use crate::{Error, Result};

impl super::TelegramChannel {
    /// Send a message and return the platform message ID
    ///
    /// Uses Markdown parse mode with plain-text fallback.
    ///
    /// # Errors
    ///
    /// Returns error if the API request fails or the response lacks a message ID
    pub async fn send_message_returning_id(&self, chat_id: i64, text: &str) -> Result<i64> {
        let url = format!("{API_BASE}{}/sendMessage", self.token);

        let request = SendMessageRequest {
            chat_id,
            text: text.to_string(),
            parse_mode: Some("Markdown".to_string()),
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Channel(format!("Telegram sendMessage error: {e}")))?;

        let body = response
            .text()
            .await
            .map_err(|e| Error::Channel(format!("Telegram response read error: {e}")))?;

        let parsed: TelegramResponse<SentMessage> = serde_json::from_str(&body)
            .map_err(|e| Error::Channel(format!("Telegram response parse error: {e}")))?;

        if let Some(sent) = parsed.result {
            tracing::debug!(chat_id, message_id = sent.message_id, "Telegram message sent");
            return Ok(sent.message_id);
        }

        // Retry once without parse_mode; partial markdown breaks the parser
        let fallback = SendMessageRequest {
            chat_id,
            text: text.to_string(),
            parse_mode: None,
        };

        let fallback_body = self
            .client
            .post(&url)
            .json(&fallback)
            .send()
            .await
            .map_err(|e| Error::Channel(format!("Telegram sendMessage error: {e}")))?
            .text()
            .await
            .map_err(|e| Error::Channel(format!("Telegram response read error: {e}")))?;

        let fallback_parsed: TelegramResponse<SentMessage> = serde_json::from_str(&fallback_body)
            .map_err(|e| Error::Channel(format!("Telegram response parse error: {e}")))?;

        fallback_parsed.result.map(|m| m.message_id).ok_or_else(|| {
            Error::Channel(format!(
                "Telegram sendMessage error: {}",
                fallback_parsed.description.unwrap_or_default()
            ))
        })
    }

    /// Edit an existing message's text
    ///
    /// Suppresses "message is not modified" errors (common during streaming)
    /// and falls back to plain text on Markdown parse errors.
    ///
    /// # Errors
    ///
    /// Returns error if the API request fails
    pub async fn edit_message_text(&self, chat_id: i64, message_id: i64, text: &str) -> Result<()> {
        let url = format!("{API_BASE}{}/editMessageText", self.token);

        let request = EditMessageTextRequest {
            chat_id,
            message_id,
            text: text.to_string(),
            parse_mode: Some("Markdown".to_string()),
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Channel(format!("Telegram editMessageText error: {e}")))?;

        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();

            if body.to_lowercase().contains("message is not modified") {
                return Ok(());
            }

            // Fallback to plain text on parse error
            let fallback = EditMessageTextRequest {
                chat_id,
                message_id,
                text: text.to_string(),
                parse_mode: None,
            };

            let fallback_resp = self
                .client
                .post(&url)
                .json(&fallback)
                .send()
                .await
                .map_err(|e| Error::Channel(format!("Telegram editMessageText error: {e}")))?;

            if !fallback_resp.status().is_success() {
                let fallback_body = fallback_resp.text().await.unwrap_or_default();

                if fallback_body.to_lowercase().contains("message is not modified") {
                    return Ok(());
                }

                return Err(Error::Channel(format!(
                    "Telegram editMessageText error: {fallback_body}"
                )));
            }
        }

        Ok(())
    }

    /// Delete a message by ID
    ///
    /// # Errors
    ///
    /// Returns error if the API request fails
    pub async fn delete_message_by_id(&self, chat_id: i64, message_id: i64) -> Result<()> {
        let url = format!("{API_BASE}{}/deleteMessage", self.token);

        let request = DeleteMessageRequest {
            chat_id,
            message_id,
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Channel(format!("Telegram deleteMessage error: {e}")))?;

        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Channel(format!(
                "Telegram deleteMessage error: {body}"
            )));
        }

        Ok(())
    }

    /// Send a chat action (typing indicator, etc.)
    ///
    /// # Errors
    ///
    /// Returns error if the API request fails
    pub async fn send_chat_action_raw(&self, chat_id: i64, action: &str) -> Result<()> {
        let url = format!("{API_BASE}{}/sendChatAction", self.token);

        let request = SendChatActionRequest {
            chat_id,
            action: action.to_string(),
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Channel(format!("Telegram sendChatAction error: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Channel(format!(
                "Telegram sendChatAction error: {status} - {body}"
            )));
        }

        Ok(())
    }

    /// Send audio bytes as a voice message
    ///
    /// # Errors
    ///
    /// Returns error if the API request fails
    pub async fn send_voice_data(
        &self,
        chat_id: i64,
        audio: Vec<u8>,
        filename: &str,
    ) -> Result<()> {
        let url = format!("{API_BASE}{}/sendVoice", self.token);

        let form = reqwest::multipart::Form::new()
            .text("chat_id", chat_id.to_string())
            .part(
                "voice",
                reqwest::multipart::Part::bytes(audio).file_name(filename.to_string()),
            );

        let response = self
            .client
            .post(&url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| Error::Channel(format!("Telegram sendVoice error: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Channel(format!(
                "Telegram sendVoice error: {status} - {body}"
            )));
        }

        tracing::debug!(chat_id, "Telegram voice message sent");
        Ok(())
    }

    /// Download a file from Telegram by `file_id`.
    ///
    /// Calls `getFile` to get the file path, then downloads from
    /// `https://api.telegram.org/file/bot{token}/{file_path}`.
    ///
    /// # Errors
    ///
    /// Returns error if the API request or download fails
    pub async fn download_file_by_id(&self, file_id: &str) -> Result<Vec<u8>> {
        let url = format!("{API_BASE}{}/getFile", self.token);

        let request = GetFileRequest {
            file_id: file_id.to_string(),
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Channel(format!("Telegram getFile error: {e}")))?;

        let body = response
            .text()
            .await
            .map_err(|e| Error::Channel(format!("Telegram getFile response read error: {e}")))?;

        let parsed: TelegramResponse<TelegramFile> = serde_json::from_str(&body)
            .map_err(|e| Error::Channel(format!("Telegram getFile parse error: {e}")))?;

        let file = parsed.result.ok_or_else(|| {
            Error::Channel(format!(
                "Telegram getFile error: {}",
                parsed.description.unwrap_or_default()
            ))
        })?;

        let file_path = file
            .file_path
            .ok_or_else(|| Error::Channel("Telegram getFile returned no file_path".to_string()))?;

        let download_url = format!("{FILE_BASE}{}/{file_path}", self.token);
        let data = self
            .client
            .get(&download_url)
            .send()
            .await
            .map_err(|e| Error::Channel(format!("Telegram file download error: {e}")))?
            .bytes()
            .await
            .map_err(|e| Error::Channel(format!("Telegram file download read error: {e}")))?;

        Ok(data.to_vec())
    }

    /// Sync bot commands with Telegram via `setMyCommands`
    ///
    /// # Errors
    ///
    /// Returns error if the API request fails
    pub async fn sync_commands(&self, commands: &[BotCommand]) -> Result<()> {
        let url = format!("{API_BASE}{}/setMyCommands", self.token);

        let request = SetMyCommandsRequest {
            commands: commands.to_vec(),
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Channel(format!("Telegram setMyCommands error: {e}")))?;

        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Channel(format!(
                "Telegram setMyCommands error: {body}"
            )));
        }

        tracing::info!(count = commands.len(), "Telegram bot commands synced");
        Ok(())
    }

    /// Set webhook URL for receiving updates
    ///
    /// # Errors
    ///
    /// Returns error if the API request fails
    pub async fn set_webhook(&self, url: &str) -> Result<()> {
        let api_url = format!("{API_BASE}{}/setWebhook", self.token);

        let request = SetWebhookRequest {
            url: url.to_string(),
            allowed_updates: Some(vec!["message".to_string()]),
        };

        let response = self
            .client
            .post(&api_url)
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Channel(format!("Telegram setWebhook error: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Channel(format!(
                "Telegram setWebhook error: {status} - {body}"
            )));
        }

        tracing::info!(url, "Telegram webhook set");
        Ok(())
    }

    /// Delete webhook (switch to polling mode)
    ///
    /// # Errors
    ///
    /// Returns error if the API request fails
    pub async fn delete_webhook(&self) -> Result<()> {
        let url = format!("{API_BASE}{}/deleteWebhook", self.token);

        let response = self
            .client
            .post(&url)
            .send()
            .await
            .map_err(|e| Error::Channel(format!("Telegram deleteWebhook error: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Channel(format!(
                "Telegram deleteWebhook error: {status} - {body}"
            )));
        }

        tracing::info!("Telegram webhook deleted");
        Ok(())
    }

    /// Validate the bot token by calling `getMe`
    ///
    /// # Errors
    ///
    /// Returns error if the token is invalid
    pub async fn get_me(&self) -> Result<()> {
        let url = format!("{API_BASE}{}/getMe", self.token);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::Channel(format!("Telegram getMe error: {e}")))?;

        if !response.status().is_success() {
            return Err(Error::Channel("Invalid Telegram bot token".to_string()));
        }

        Ok(())
    }
}
