//! Text-to-speech (TTS) synthesis

use serde::Serialize;

use crate::config::TtsConfig;
use crate::{Error, Result};

/// OpenAI-compatible speech request
///
/// `backend` and `language` are LocalAI extensions; servers that don't know
/// them ignore the extra fields.
#[derive(Serialize)]
struct SpeechRequest {
    model: String,
    input: String,
    voice: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    backend: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    language: Option<String>,
}

/// Synthesizes speech via an OpenAI-compatible endpoint
pub struct TextToSpeech {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    voice: String,
    backend: Option<String>,
    audio_format: Option<String>,
    language: Option<String>,
}

impl TextToSpeech {
    /// Create a new TTS instance
    #[must_use]
    pub fn new(config: &TtsConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            voice: config.voice.clone(),
            backend: config.backend.clone(),
            audio_format: config.audio_format.clone(),
            language: config.language.clone(),
        }
    }

    /// Synthesize speech, returning encoded audio bytes
    ///
    /// # Errors
    ///
    /// Returns error if synthesis fails
    pub async fn synthesize(&self, text: &str) -> Result<Vec<u8>> {
        tracing::debug!(chars = text.len(), "starting speech synthesis");

        let request = SpeechRequest {
            model: self.model.clone(),
            input: text.to_string(),
            voice: self.voice.clone(),
            backend: self.backend.clone(),
            response_format: self.audio_format.clone(),
            language: self.language.clone(),
        };

        let url = format!("{}/audio/speech", self.base_url);
        let mut builder = self.client.post(&url).json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.header("Authorization", format!("Bearer {key}"));
        }

        let response = builder.send().await.map_err(|e| {
            tracing::error!(error = %e, "speech request failed");
            e
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "speech API error");
            return Err(Error::Tts(format!("speech API error {status}: {body}")));
        }

        let audio = response.bytes().await?;
        tracing::info!(audio_bytes = audio.len(), "speech synthesis complete");
        Ok(audio.to_vec())
    }

    /// File extension matching the configured audio format
    #[must_use]
    pub fn file_extension(&self) -> &str {
        self.audio_format.as_deref().unwrap_or("mp3")
    }
}
