//! Messaging channel adapters
//!
//! The Telegram adapter implements the `ChatPort` trait from `crate::chat`
//! so the conversation controller never talks to the Bot API directly.

pub mod telegram;

pub use telegram::TelegramChannel;
