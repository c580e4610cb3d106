//! Configuration management for the Courier gateway
//!
//! Values are resolved with priority CLI > env > toml > default. Required values
//! (bot token, model API key, database path) abort startup when missing.

pub mod file;

use std::path::PathBuf;
use std::time::Duration;

use crate::{Error, Result};

/// Default minimum interval between streaming edits
pub const DEFAULT_EDIT_THROTTLE_MS: u64 = 500;

/// Default generative-language API base URL
pub const DEFAULT_API_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Default model identifier
pub const DEFAULT_MODEL: &str = "gemini-1.5-flash-002";

/// Default greeting sent in reply to `/start`
const DEFAULT_START_MESSAGE: &str = "Hello! How can I help you today?";

/// Courier gateway configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Telegram bot token
    pub telegram_token: String,

    /// Allowed chat IDs; empty means all chats are allowed
    pub allowed_chats: Vec<i64>,

    /// Idle duration after which the next message starts a fresh conversation
    pub conversation_timeout: Option<Duration>,

    /// Cap on how many persisted messages are sent as model history
    pub max_history: Option<usize>,

    /// Minimum interval between streaming message edits per chat
    pub edit_throttle: Duration,

    /// Path to the `SQLite` database file
    pub db_path: PathBuf,

    /// Greeting sent in reply to `/start`
    pub start_message: String,

    /// Model API configuration
    pub model: ModelConfig,

    /// Voice pipeline configuration (None when STT/TTS are not both set up)
    pub voice: Option<VoiceConfig>,

    /// Webhook configuration (None ⇒ polling mode)
    pub webhook: Option<WebhookConfig>,
}

/// Generative-language API configuration
#[derive(Debug, Clone)]
pub struct ModelConfig {
    /// API base URL
    pub base_url: String,

    /// API key
    pub api_key: String,

    /// Model identifier
    pub model: String,

    /// System instruction text (loaded from `COURIER_SYSTEM_MESSAGE_FILE`)
    pub system_message: Option<String>,

    /// Context document to upload once at startup and reference as cached
    /// content in subsequent requests
    pub context_file: Option<PathBuf>,
}

/// Speech-to-text configuration (OpenAI-compatible transcription endpoint)
#[derive(Debug, Clone)]
pub struct SttConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub response_format: Option<String>,
    pub language: Option<String>,
}

/// Text-to-speech configuration (OpenAI-compatible speech endpoint)
#[derive(Debug, Clone)]
pub struct TtsConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub voice: String,
    /// Backend hint for LocalAI-style servers
    pub backend: Option<String>,
    /// Audio container format (mp3, wav, ogg, ...)
    pub audio_format: Option<String>,
    pub language: Option<String>,
}

/// Voice pipeline configuration; present only when both STT and TTS base
/// URLs are configured
#[derive(Debug, Clone)]
pub struct VoiceConfig {
    pub stt: SttConfig,
    pub tts: TtsConfig,
}

/// Webhook ingest configuration
#[derive(Debug, Clone)]
pub struct WebhookConfig {
    /// Public URL registered with Telegram via setWebhook
    pub url: String,

    /// Local address to listen on, e.g. "0.0.0.0:8080"
    pub listen_addr: String,
}

/// Command-line overrides; a set value wins over env and the config file
#[derive(Debug, Default, Clone)]
pub struct ConfigOverrides {
    pub telegram_token: Option<String>,
    pub api_key: Option<String>,
    pub api_base_url: Option<String>,
    pub model: Option<String>,
    pub db_path: Option<String>,
    pub allowed_chats: Vec<i64>,
    pub conversation_timeout_secs: Option<u64>,
    pub max_history: Option<u64>,
    pub edit_throttle_ms: Option<u64>,
    pub system_message_file: Option<String>,
    pub context_file: Option<String>,
    pub start_message_file: Option<String>,
    pub webhook_url: Option<String>,
    pub webhook_listen_addr: Option<String>,
}

impl Config {
    /// Load configuration with priority CLI > env > toml > default
    ///
    /// # Errors
    ///
    /// Returns error if a required value is missing or a value fails to parse
    pub fn load(overrides: &ConfigOverrides) -> Result<Self> {
        let fc = file::load_config_file();
        let cli = overrides;

        // Resolved before the fields below are moved out of `fc`
        let voice = Self::load_voice(&fc);

        let telegram_token = cli
            .telegram_token
            .clone()
            .or_else(|| env_or("COURIER_TELEGRAM_TOKEN", fc.telegram.token))
            .ok_or_else(|| Error::Config("COURIER_TELEGRAM_TOKEN is required".to_string()))?;

        let api_key = cli
            .api_key
            .clone()
            .or_else(|| env_or("COURIER_API_KEY", fc.model.api_key))
            .ok_or_else(|| Error::Config("COURIER_API_KEY is required".to_string()))?;

        let db_path = cli
            .db_path
            .clone()
            .or_else(|| env_or("COURIER_DB_PATH", fc.database.path))
            .ok_or_else(|| Error::Config("COURIER_DB_PATH is required".to_string()))?;

        let allowed_chats = if cli.allowed_chats.is_empty() {
            parse_chat_list(
                env_or("COURIER_ALLOWED_CHATS", fc.telegram.allowed_chats.map(join_ids))
                    .as_deref(),
            )?
        } else {
            cli.allowed_chats.clone()
        };

        let conversation_timeout = cli
            .conversation_timeout_secs
            .or(parse_u64(
                env_or("COURIER_CONVERSATION_TIMEOUT", None),
                "COURIER_CONVERSATION_TIMEOUT",
            )?)
            .or(fc.chat.conversation_timeout_secs)
            .map(Duration::from_secs);

        let max_history = cli
            .max_history
            .or(parse_u64(env_or("COURIER_MAX_HISTORY", None), "COURIER_MAX_HISTORY")?)
            .or(fc.chat.max_history)
            .map(|n| usize::try_from(n).unwrap_or(usize::MAX));

        let edit_throttle = Duration::from_millis(
            cli.edit_throttle_ms
                .or(parse_u64(
                    env_or("COURIER_EDIT_THROTTLE_MS", None),
                    "COURIER_EDIT_THROTTLE_MS",
                )?)
                .or(fc.chat.edit_throttle_ms)
                .unwrap_or(DEFAULT_EDIT_THROTTLE_MS),
        );

        let system_message = read_optional_file(
            cli.system_message_file
                .clone()
                .or_else(|| env_or("COURIER_SYSTEM_MESSAGE_FILE", fc.model.system_message_file))
                .map(PathBuf::from),
        )?;

        let start_message = read_optional_file(
            cli.start_message_file
                .clone()
                .or_else(|| env_or("COURIER_START_MESSAGE_FILE", fc.chat.start_message_file))
                .map(PathBuf::from),
        )?
        .unwrap_or_else(|| DEFAULT_START_MESSAGE.to_string());

        let model = ModelConfig {
            base_url: cli
                .api_base_url
                .clone()
                .or_else(|| env_or("COURIER_API_BASE_URL", fc.model.base_url))
                .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string()),
            api_key,
            model: cli
                .model
                .clone()
                .or_else(|| env_or("COURIER_MODEL", fc.model.model))
                .unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            system_message,
            context_file: cli
                .context_file
                .clone()
                .or_else(|| env_or("COURIER_CONTEXT_FILE", fc.model.context_file))
                .map(PathBuf::from),
        };

        let webhook = cli
            .webhook_url
            .clone()
            .or_else(|| env_or("COURIER_WEBHOOK_URL", fc.webhook.url))
            .map(|url| WebhookConfig {
                url,
                listen_addr: cli
                    .webhook_listen_addr
                    .clone()
                    .or_else(|| {
                        env_or("COURIER_WEBHOOK_LISTEN_ADDR", fc.webhook.listen_addr.clone())
                    })
                    .unwrap_or_else(|| "0.0.0.0:8080".to_string()),
            });

        Ok(Self {
            telegram_token,
            allowed_chats,
            conversation_timeout,
            max_history,
            edit_throttle,
            db_path: PathBuf::from(db_path),
            start_message,
            model,
            voice,
            webhook,
        })
    }

    /// Voice is enabled only when both STT and TTS base URLs are configured
    fn load_voice(fc: &file::CourierConfigFile) -> Option<VoiceConfig> {
        let stt_base = env_or("STT_BASE_URL", fc.voice.stt_base_url.clone())?;
        let tts_base = env_or("TTS_BASE_URL", fc.voice.tts_base_url.clone())?;

        let language = env_or("LANGUAGE", fc.voice.language.clone());

        Some(VoiceConfig {
            stt: SttConfig {
                base_url: stt_base,
                api_key: env_or("STT_API_KEY", fc.voice.stt_api_key.clone()),
                model: env_or("STT_MODEL", fc.voice.stt_model.clone())
                    .unwrap_or_else(|| "whisper-1".to_string()),
                response_format: env_or("STT_RESPONSE_FORMAT", fc.voice.stt_response_format.clone()),
                language: language.clone(),
            },
            tts: TtsConfig {
                base_url: tts_base,
                api_key: env_or("TTS_API_KEY", fc.voice.tts_api_key.clone()),
                model: env_or("TTS_MODEL", fc.voice.tts_model.clone())
                    .unwrap_or_else(|| "tts-1".to_string()),
                voice: env_or("TTS_VOICE", fc.voice.tts_voice.clone())
                    .unwrap_or_else(|| "alloy".to_string()),
                backend: env_or("TTS_BACKEND", fc.voice.tts_backend.clone()),
                audio_format: env_or("TTS_AUDIO_FORMAT", fc.voice.tts_audio_format.clone()),
                language,
            },
        })
    }

    /// Check whether a chat is allowed to talk to the bot
    ///
    /// An empty allow-list authorizes every chat.
    #[must_use]
    pub fn is_chat_allowed(&self, chat_id: i64) -> bool {
        self.allowed_chats.is_empty() || self.allowed_chats.contains(&chat_id)
    }
}

/// Env var if set and non-empty, otherwise the TOML fallback
fn env_or(key: &str, fallback: Option<String>) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty()).or(fallback)
}

fn join_ids(ids: Vec<i64>) -> String {
    ids.iter().map(ToString::to_string).collect::<Vec<_>>().join(",")
}

/// Parse a comma-separated chat allow-list
fn parse_chat_list(raw: Option<&str>) -> Result<Vec<i64>> {
    let Some(raw) = raw else {
        return Ok(Vec::new());
    };

    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<i64>()
                .map_err(|_| Error::Config(format!("invalid chat id in allow-list: {s}")))
        })
        .collect()
}

fn parse_u64(value: Option<String>, key: &str) -> Result<Option<u64>> {
    value
        .map(|v| {
            v.parse::<u64>()
                .map_err(|_| Error::Config(format!("{key} must be an integer, got \"{v}\"")))
        })
        .transpose()
}

fn read_optional_file(path: Option<PathBuf>) -> Result<Option<String>> {
    path.map(|p| {
        std::fs::read_to_string(&p)
            .map_err(|e| Error::Config(format!("failed to read {}: {e}", p.display())))
    })
    .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_resolves_required_values_from_overrides() {
        let overrides = ConfigOverrides {
            telegram_token: Some("tok".into()),
            api_key: Some("key".into()),
            db_path: Some(":memory:".into()),
            allowed_chats: vec![7],
            edit_throttle_ms: Some(250),
            ..ConfigOverrides::default()
        };

        let config = Config::load(&overrides).unwrap();
        assert_eq!(config.telegram_token, "tok");
        assert_eq!(config.model.api_key, "key");
        assert_eq!(config.allowed_chats, vec![7]);
        assert_eq!(config.edit_throttle, Duration::from_millis(250));
    }

    #[test]
    fn parse_chat_list_handles_empty_and_values() {
        assert!(parse_chat_list(None).unwrap().is_empty());
        assert!(parse_chat_list(Some("")).unwrap().is_empty());
        assert_eq!(parse_chat_list(Some("123, -456")).unwrap(), vec![123, -456]);
        assert!(parse_chat_list(Some("abc")).is_err());
    }

    #[test]
    fn empty_allow_list_authorizes_all() {
        let config = Config {
            telegram_token: "tok".into(),
            allowed_chats: Vec::new(),
            conversation_timeout: None,
            max_history: None,
            edit_throttle: Duration::from_millis(DEFAULT_EDIT_THROTTLE_MS),
            db_path: PathBuf::from(":memory:"),
            start_message: "hi".into(),
            model: ModelConfig {
                base_url: DEFAULT_API_BASE_URL.into(),
                api_key: "key".into(),
                model: DEFAULT_MODEL.into(),
                system_message: None,
                context_file: None,
            },
            voice: None,
            webhook: None,
        };

        assert!(config.is_chat_allowed(42));
        assert!(config.is_chat_allowed(-1));
    }

    #[test]
    fn non_empty_allow_list_filters() {
        let config = Config {
            telegram_token: "tok".into(),
            allowed_chats: vec![1, 2],
            conversation_timeout: None,
            max_history: None,
            edit_throttle: Duration::from_millis(DEFAULT_EDIT_THROTTLE_MS),
            db_path: PathBuf::from(":memory:"),
            start_message: "hi".into(),
            model: ModelConfig {
                base_url: DEFAULT_API_BASE_URL.into(),
                api_key: "key".into(),
                model: DEFAULT_MODEL.into(),
                system_message: None,
                context_file: None,
            },
            voice: None,
            webhook: None,
        };

        assert!(config.is_chat_allowed(1));
        assert!(!config.is_chat_allowed(3));
    }
}
