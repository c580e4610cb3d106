//! Speech-to-text (STT) processing

use crate::config::SttConfig;
use crate::{Error, Result};

/// Response from an OpenAI-compatible transcription API (json format)
#[derive(serde::Deserialize)]
struct TranscriptionResponse {
    text: String,
}

/// Transcribes speech to text via an OpenAI-compatible endpoint
pub struct SpeechToText {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    response_format: Option<String>,
    language: Option<String>,
}

impl SpeechToText {
    /// Create a new STT instance
    #[must_use]
    pub fn new(config: &SttConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            response_format: config.response_format.clone(),
            language: config.language.clone(),
        }
    }

    /// Transcribe audio to text
    ///
    /// # Arguments
    ///
    /// * `audio` - encoded audio bytes (Telegram voice notes are OGG/Opus)
    /// * `filename` - filename hint for the multipart upload
    ///
    /// # Errors
    ///
    /// Returns error if transcription fails
    pub async fn transcribe(&self, audio: Vec<u8>, filename: &str) -> Result<String> {
        tracing::debug!(audio_bytes = audio.len(), "starting transcription");

        let mut form = reqwest::multipart::Form::new()
            .part(
                "file",
                reqwest::multipart::Part::bytes(audio)
                    .file_name(filename.to_string())
                    .mime_str("audio/ogg")
                    .map_err(|e| Error::Stt(e.to_string()))?,
            )
            .text("model", self.model.clone());

        if let Some(format) = &self.response_format {
            form = form.text("response_format", format.clone());
        }
        if let Some(language) = &self.language {
            form = form.text("language", language.clone());
        }

        let url = format!("{}/audio/transcriptions", self.base_url);
        let mut request = self.client.post(&url).multipart(form);
        if let Some(key) = &self.api_key {
            request = request.header("Authorization", format!("Bearer {key}"));
        }

        let response = request.send().await.map_err(|e| {
            tracing::error!(error = %e, "transcription request failed");
            e
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "transcription API error");
            return Err(Error::Stt(format!("transcription API error {status}: {body}")));
        }

        // Plain-text formats return the transcript directly
        let text = if self.response_format.as_deref() == Some("text") {
            response.text().await?.trim().to_string()
        } else {
            let result: TranscriptionResponse = response.json().await.map_err(|e| {
                tracing::error!(error = %e, "failed to parse transcription response");
                e
            })?;
            result.text
        };

        tracing::info!(transcript = %text, "transcription complete");
        Ok(text)
    }
}
