//! Generative-language API client with SSE streaming
//!
//! Talks to Gemini-style `generateContent` / `streamGenerateContent`
//! endpoints. When a context file is configured, it is uploaded through the
//! file API and referenced as cached content; the cache is recreated
//! transparently after it expires.

mod types;

use std::path::PathBuf;
use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::channel::mpsc;
use futures::{SinkExt, Stream, StreamExt};
use tokio::sync::Mutex;

use crate::config::ModelConfig;
use crate::{Error, Result};

use types::{
    CachedContentResponse, Content, CreateCachedContentRequest, FileData, FileUploadResponse,
    GenerateContentRequest, GenerateContentResponse, Part,
};

/// Timeout for non-streaming model calls
const GENERATE_TIMEOUT: Duration = Duration::from_secs(60);

/// Cached-content TTL requested on creation
const CACHE_TTL: &str = "3600s";

/// Recreate the cache when it expires within this margin
const CACHE_EXPIRY_MARGIN: chrono::Duration = chrono::Duration::seconds(60);

/// A stream of reply text fragments
pub type CompletionStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// Role of a prompt message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Model,
}

impl Role {
    const fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Model => "model",
        }
    }
}

/// A single message of model history
#[derive(Debug, Clone)]
pub struct PromptMessage {
    pub role: Role,
    pub content: String,
}

impl PromptMessage {
    /// Create a user message
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    /// Create a model message
    #[must_use]
    pub fn model(content: impl Into<String>) -> Self {
        Self {
            role: Role::Model,
            content: content.into(),
        }
    }
}

/// Seam between the conversation controller and the model API
#[async_trait]
pub trait ModelGateway: Send + Sync {
    /// Stream a completion for the given history
    ///
    /// `system_override` replaces the configured system instruction for this
    /// request (a chat's selected mode).
    async fn stream_completion(
        &self,
        history: &[PromptMessage],
        system_override: Option<&str>,
    ) -> Result<CompletionStream>;

    /// One-shot generation for short auxiliary requests (title synthesis)
    async fn generate(&self, prompt: &str) -> Result<String>;
}

/// Handle to a live cachedContents entry
#[derive(Debug, Clone)]
struct CacheHandle {
    name: String,
    expires_at: DateTime<Utc>,
}

/// Gemini-style generative-language API client
pub struct GeminiClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    system_message: Option<String>,
    context_file: Option<PathBuf>,
    cache: Mutex<Option<CacheHandle>>,
}

impl GeminiClient {
    /// Create a new client from model configuration
    #[must_use]
    pub fn new(config: &ModelConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            system_message: config.system_message.clone(),
            context_file: config.context_file.clone(),
            cache: Mutex::new(None),
        }
    }

    /// Upload the context file and create the cached-content entry eagerly
    ///
    /// Called once at startup so the first exchange doesn't pay the upload.
    /// No-op when no context file is configured.
    ///
    /// # Errors
    ///
    /// Returns error if the upload or cache creation fails
    pub async fn warm_context_cache(&self) -> Result<()> {
        if self.context_file.is_some() {
            self.ensure_cached_content().await?;
        }
        Ok(())
    }

    /// Return the cachedContents name to reference, creating or recreating
    /// the cache as needed
    async fn ensure_cached_content(&self) -> Result<Option<String>> {
        let Some(path) = &self.context_file else {
            return Ok(None);
        };

        let mut cache = self.cache.lock().await;

        if let Some(handle) = cache.as_ref() {
            if handle.expires_at > Utc::now() + CACHE_EXPIRY_MARGIN {
                return Ok(Some(handle.name.clone()));
            }
            tracing::info!(name = %handle.name, "context cache expired, recreating");
        }

        let data = tokio::fs::read(path).await?;
        let uri = self.upload_file(data).await?;
        let handle = self.create_cache(&uri).await?;
        tracing::info!(name = %handle.name, expires_at = %handle.expires_at, "context cache created");

        let name = handle.name.clone();
        *cache = Some(handle);
        Ok(Some(name))
    }

    /// Upload raw bytes through the file API, returning the file URI
    async fn upload_file(&self, data: Vec<u8>) -> Result<String> {
        // The file API lives under /upload, parallel to the main API path
        let url = format!(
            "{}/files",
            self.base_url.replacen("/v1beta", "/upload/v1beta", 1)
        );

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .header("X-Goog-Upload-Protocol", "raw")
            .header("Content-Type", "text/plain")
            .body(data)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Model(format!("file upload error: {status} - {body}")));
        }

        let parsed: FileUploadResponse = response.json().await?;
        Ok(parsed.file.uri)
    }

    /// Create a cachedContents entry referencing the uploaded file
    ///
    /// The system instruction travels inside the cache, so requests that
    /// reference it must not carry one of their own.
    async fn create_cache(&self, file_uri: &str) -> Result<CacheHandle> {
        let url = format!("{}/cachedContents", self.base_url);

        let request = CreateCachedContentRequest {
            model: format!("models/{}", self.model),
            contents: vec![Content {
                role: Some("user".to_string()),
                parts: vec![Part {
                    text: None,
                    file_data: Some(FileData {
                        mime_type: "text/plain".to_string(),
                        file_uri: file_uri.to_string(),
                    }),
                }],
            }],
            system_instruction: self.system_message.as_ref().map(|text| Content {
                role: None,
                parts: vec![Part::text(text.clone())],
            }),
            ttl: CACHE_TTL.to_string(),
        };

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Model(format!(
                "cachedContents create error: {status} - {body}"
            )));
        }

        let parsed: CachedContentResponse = response.json().await?;
        let expires_at = DateTime::parse_from_rfc3339(&parsed.expire_time)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now() + chrono::Duration::minutes(55));

        Ok(CacheHandle {
            name: parsed.name,
            expires_at,
        })
    }

    /// Build a request body from history, the optional cache reference, and
    /// an optional system-instruction override
    fn build_request(
        &self,
        history: &[PromptMessage],
        cached_content: Option<String>,
        system_override: Option<&str>,
    ) -> GenerateContentRequest {
        let contents = history
            .iter()
            .map(|m| Content {
                role: Some(m.role.as_str().to_string()),
                parts: vec![Part::text(m.content.clone())],
            })
            .collect();

        // System instruction is carried by the cache when one is in use
        let system_instruction = if cached_content.is_some() {
            None
        } else {
            system_override
                .or(self.system_message.as_deref())
                .map(|text| Content {
                    role: None,
                    parts: vec![Part::text(text.to_string())],
                })
        };

        GenerateContentRequest {
            contents,
            system_instruction,
            cached_content,
        }
    }
}

#[async_trait]
impl ModelGateway for GeminiClient {
    async fn stream_completion(
        &self,
        history: &[PromptMessage],
        system_override: Option<&str>,
    ) -> Result<CompletionStream> {
        // The cache carries the default system instruction, so requests with
        // an override cannot reference it
        let cached = if system_override.is_some() {
            None
        } else {
            self.ensure_cached_content().await?
        };
        let request = self.build_request(history, cached, system_override);

        let url = format!(
            "{}/models/{}:streamGenerateContent?alt=sse",
            self.base_url, self.model
        );

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Model(format!("model API error: {status} - {body}")));
        }

        let (mut tx, rx) = mpsc::unbounded();

        tokio::spawn(async move {
            let mut bytes = response.bytes_stream();
            let mut buffer = String::new();

            while let Some(chunk) = bytes.next().await {
                let chunk = match chunk {
                    Ok(c) => c,
                    Err(e) => {
                        let _ = tx.send(Err(Error::Model(format!("stream error: {e}")))).await;
                        return;
                    }
                };

                buffer.push_str(&String::from_utf8_lossy(&chunk));

                // SSE events are newline-delimited `data: {json}` lines
                while let Some(pos) = buffer.find('\n') {
                    let line = buffer[..pos].trim().to_string();
                    buffer.drain(..=pos);

                    let Some(payload) = sse_payload(&line) else {
                        continue;
                    };

                    match serde_json::from_str::<GenerateContentResponse>(payload) {
                        Ok(parsed) => {
                            let text = parsed.text();
                            if !text.is_empty() && tx.send(Ok(text)).await.is_err() {
                                return;
                            }
                        }
                        Err(e) => {
                            tracing::warn!(error = %e, "unparseable SSE chunk, skipping");
                        }
                    }
                }
            }
        });

        Ok(Box::pin(rx))
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        let cached = self.ensure_cached_content().await?;
        let request = self.build_request(&[PromptMessage::user(prompt)], cached, None);

        let url = format!(
            "{}/models/{}:generateContent",
            self.base_url, self.model
        );

        let future = async {
            let response = self
                .client
                .post(&url)
                .header("x-goog-api-key", &self.api_key)
                .json(&request)
                .send()
                .await?;

            if !response.status().is_success() {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                return Err(Error::Model(format!("model API error: {status} - {body}")));
            }

            let parsed: GenerateContentResponse = response.json().await?;
            Ok(parsed.text())
        };

        tokio::time::timeout(GENERATE_TIMEOUT, future)
            .await
            .map_err(|_| Error::Model("model request timed out".to_string()))?
    }
}

/// Extract the JSON payload from one SSE line, if it carries one
fn sse_payload(line: &str) -> Option<&str> {
    let payload = line.strip_prefix("data: ")?;
    if payload.is_empty() || payload == "[DONE]" {
        None
    } else {
        Some(payload)
    }
}
