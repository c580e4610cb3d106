//! Courier Gateway - Telegram gateway for streaming LLM conversations
//!
//! This library provides the core functionality for the Courier gateway:
//! - Telegram channel adapter (polling and webhook ingest)
//! - Streaming conversation controller with throttled message edits
//! - Conversation persistence (SQLite)
//! - Optional voice pipeline (STT in, TTS out)
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                   Telegram                           │
//! │        getUpdates polling  │  webhook                │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │                Courier Gateway                       │
//! │  Daemon │ Chat controller │ STT/TTS │ Persistence   │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │         Generative language API (streaming)          │
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod api;
pub mod channels;
pub mod chat;
pub mod config;
pub mod daemon;
pub mod db;
pub mod error;
pub mod model;
pub mod voice;

pub use chat::{ChatController, ChatEvent, ChatPort, Command};
pub use config::Config;
pub use daemon::{Daemon, Dispatcher};
pub use db::{DbConn, DbPool};
pub use error::{Error, Result};
pub use model::{CompletionStream, GeminiClient, ModelGateway, PromptMessage, Role};
