//! Telegram Bot API request/response types

use serde::{Deserialize, Serialize};

/// Telegram Bot API base URL
pub(crate) const API_BASE: &str = "https://api.telegram.org/bot";

/// Telegram file download base URL
pub(crate) const FILE_BASE: &str = "https://api.telegram.org/file/bot";

/// Telegram sendMessage request
#[derive(Serialize)]
pub(crate) struct SendMessageRequest {
    pub chat_id: i64,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parse_mode: Option<String>,
}

/// Telegram editMessageText request
#[derive(Serialize)]
pub(crate) struct EditMessageTextRequest {
    pub chat_id: i64,
    pub message_id: i64,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parse_mode: Option<String>,
}

/// Telegram deleteMessage request
#[derive(Serialize)]
pub(crate) struct DeleteMessageRequest {
    pub chat_id: i64,
    pub message_id: i64,
}

/// Telegram sendChatAction request
#[derive(Serialize)]
pub(crate) struct SendChatActionRequest {
    pub chat_id: i64,
    pub action: String,
}

/// Telegram setWebhook request
#[derive(Serialize)]
pub(crate) struct SetWebhookRequest {
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allowed_updates: Option<Vec<String>>,
}

/// Telegram getFile request
#[derive(Serialize)]
pub(crate) struct GetFileRequest {
    pub file_id: String,
}

/// File metadata from Telegram getFile response
#[derive(Debug, Deserialize)]
pub(crate) struct TelegramFile {
    #[allow(dead_code)]
    pub file_id: String,
    pub file_path: Option<String>,
}

/// Telegram setMyCommands request
#[derive(Serialize)]
pub(crate) struct SetMyCommandsRequest {
    pub commands: Vec<BotCommand>,
}

/// A bot command for Telegram's command menu
#[derive(Debug, Clone, Serialize)]
pub struct BotCommand {
    pub command: String,
    pub description: String,
}

/// Response from sendMessage containing the sent message
#[derive(Deserialize)]
pub(crate) struct SentMessage {
    pub message_id: i64,
}

/// Telegram API response wrapper
#[derive(Deserialize)]
#[allow(dead_code)]
pub(crate) struct TelegramResponse<T> {
    pub ok: bool,
    pub result: Option<T>,
    pub description: Option<String>,
}

/// A single update from getUpdates or a webhook delivery
#[derive(Debug, Deserialize)]
pub struct Update {
    pub update_id: i64,
    pub message: Option<UpdateMessage>,
}

/// Message carried by an update
#[derive(Debug, Deserialize)]
pub struct UpdateMessage {
    pub message_id: i64,
    pub chat: UpdateChat,
    pub from: Option<UpdateUser>,
    pub text: Option<String>,
    pub voice: Option<UpdateVoice>,
    pub reply_to_message: Option<Box<UpdateMessage>>,
}

/// Chat info from an update
#[derive(Debug, Deserialize)]
pub struct UpdateChat {
    pub id: i64,
}

/// User info from an update
#[derive(Debug, Deserialize)]
pub struct UpdateUser {
    #[allow(dead_code)]
    pub id: i64,
    pub is_bot: bool,
}

/// Voice note metadata from an update
#[derive(Debug, Deserialize)]
pub struct UpdateVoice {
    pub file_id: String,
}
