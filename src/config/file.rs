//! TOML configuration file loading
//!
//! Supports `~/.config/courier/config.toml` as a persistent config source.
//! All fields are optional — the file is a partial overlay underneath the
//! environment.

use std::path::PathBuf;

use serde::Deserialize;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct CourierConfigFile {
    /// Telegram channel configuration
    #[serde(default)]
    pub telegram: TelegramFileConfig,

    /// Generative model configuration
    #[serde(default)]
    pub model: ModelFileConfig,

    /// Conversation behavior configuration
    #[serde(default)]
    pub chat: ChatFileConfig,

    /// Database configuration
    #[serde(default)]
    pub database: DatabaseFileConfig,

    /// Voice pipeline configuration
    #[serde(default)]
    pub voice: VoiceFileConfig,

    /// Webhook ingest configuration
    #[serde(default)]
    pub webhook: WebhookFileConfig,
}

/// Telegram-related configuration
#[derive(Debug, Default, Deserialize)]
pub struct TelegramFileConfig {
    /// Bot token
    pub token: Option<String>,

    /// Chat allow-list; empty or absent means all chats are allowed
    pub allowed_chats: Option<Vec<i64>>,
}

/// Generative model configuration
#[derive(Debug, Default, Deserialize)]
pub struct ModelFileConfig {
    /// API key
    pub api_key: Option<String>,

    /// API base URL
    pub base_url: Option<String>,

    /// Model identifier (e.g. "gemini-1.5-flash-002")
    pub model: Option<String>,

    /// Path to a file holding the system instruction
    pub system_message_file: Option<String>,

    /// Path to a context document uploaded as cached content
    pub context_file: Option<String>,
}

/// Conversation behavior configuration
#[derive(Debug, Default, Deserialize)]
pub struct ChatFileConfig {
    /// Idle seconds before a new message starts a fresh conversation
    pub conversation_timeout_secs: Option<u64>,

    /// Cap on persisted messages sent as model history
    pub max_history: Option<u64>,

    /// Minimum milliseconds between streaming edits
    pub edit_throttle_ms: Option<u64>,

    /// Path to a file holding the `/start` greeting
    pub start_message_file: Option<String>,
}

/// Database configuration
#[derive(Debug, Default, Deserialize)]
pub struct DatabaseFileConfig {
    /// Path to the SQLite database file
    pub path: Option<String>,
}

/// Voice pipeline configuration
#[derive(Debug, Default, Deserialize)]
pub struct VoiceFileConfig {
    pub stt_base_url: Option<String>,
    pub stt_api_key: Option<String>,
    pub stt_model: Option<String>,
    pub stt_response_format: Option<String>,

    pub tts_base_url: Option<String>,
    pub tts_api_key: Option<String>,
    pub tts_model: Option<String>,
    pub tts_voice: Option<String>,
    pub tts_backend: Option<String>,
    pub tts_audio_format: Option<String>,

    /// Language hint shared by STT and TTS
    pub language: Option<String>,
}

/// Webhook ingest configuration
#[derive(Debug, Default, Deserialize)]
pub struct WebhookFileConfig {
    /// Public URL registered with Telegram
    pub url: Option<String>,

    /// Local listen address
    pub listen_addr: Option<String>,
}

/// Load the TOML config file from the standard path
///
/// Returns `CourierConfigFile::default()` if the file doesn't exist or can't be parsed.
pub fn load_config_file() -> CourierConfigFile {
    let Some(path) = config_file_path() else {
        return CourierConfigFile::default();
    };

    if !path.exists() {
        return CourierConfigFile::default();
    }

    match std::fs::read_to_string(&path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "loaded config file");
                config
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config file, using defaults"
                );
                CourierConfigFile::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            CourierConfigFile::default()
        }
    }
}

/// Return the config file path: `~/.config/courier/config.toml`
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("courier").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_partial_file() {
        let content = r#"
            [telegram]
            allowed_chats = [123, -456]

            [chat]
            edit_throttle_ms = 750
        "#;

        let parsed: CourierConfigFile = toml::from_str(content).unwrap();
        assert_eq!(parsed.telegram.allowed_chats, Some(vec![123, -456]));
        assert_eq!(parsed.chat.edit_throttle_ms, Some(750));
        assert!(parsed.model.api_key.is_none());
        assert!(parsed.webhook.url.is_none());
    }

    #[test]
    fn empty_file_yields_defaults() {
        let parsed: CourierConfigFile = toml::from_str("").unwrap();
        assert!(parsed.telegram.token.is_none());
        assert!(parsed.database.path.is_none());
    }
}
