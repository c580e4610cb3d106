//! Shared test utilities
//!
//! Mock channel port and model gateway used by the controller tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use tokio::sync::Mutex;

use courier_gateway::chat::{ChatEvent, ChatPort, ControllerOptions, EventPayload};
use courier_gateway::config::ModelConfig;
use courier_gateway::model::CompletionStream;
use courier_gateway::{
    ChatController, Config, DbPool, Error, ModelGateway, PromptMessage, Result, db,
};

/// Set up an in-memory test database
#[must_use]
pub fn setup_test_db() -> DbPool {
    db::init_memory().expect("failed to init test db")
}

/// Build a text event as the polling loop would
#[must_use]
pub fn text_event(chat_id: i64, text: &str) -> ChatEvent {
    ChatEvent {
        chat_id,
        message_id: 1,
        payload: EventPayload::Text(text.to_string()),
        reply_to: None,
    }
}

/// Chat port that records every outbound call
pub struct MockPort {
    next_message_id: AtomicI64,
    pub sent: Mutex<Vec<(i64, String)>>,
    pub edits: Mutex<Vec<(i64, i64, String)>>,
    pub deleted: Mutex<Vec<(i64, i64)>>,
}

impl MockPort {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            next_message_id: AtomicI64::new(100),
            sent: Mutex::new(Vec::new()),
            edits: Mutex::new(Vec::new()),
            deleted: Mutex::new(Vec::new()),
        })
    }

    pub async fn sent_texts(&self) -> Vec<String> {
        self.sent.lock().await.iter().map(|(_, t)| t.clone()).collect()
    }

    pub async fn edit_texts(&self) -> Vec<String> {
        self.edits
            .lock()
            .await
            .iter()
            .map(|(_, _, t)| t.clone())
            .collect()
    }
}

#[async_trait]
impl ChatPort for MockPort {
    async fn send_message(&self, chat_id: i64, text: &str) -> Result<i64> {
        let id = self.next_message_id.fetch_add(1, Ordering::SeqCst);
        self.sent.lock().await.push((chat_id, text.to_string()));
        Ok(id)
    }

    async fn edit_message(&self, chat_id: i64, message_id: i64, text: &str) -> Result<()> {
        self.edits
            .lock()
            .await
            .push((chat_id, message_id, text.to_string()));
        Ok(())
    }

    async fn delete_message(&self, chat_id: i64, message_id: i64) -> Result<()> {
        self.deleted.lock().await.push((chat_id, message_id));
        Ok(())
    }

    async fn send_chat_action(&self, _chat_id: i64, _action: &str) -> Result<()> {
        Ok(())
    }

    async fn send_voice(&self, _chat_id: i64, _audio: Vec<u8>, _filename: &str) -> Result<()> {
        Ok(())
    }

    async fn download_file(&self, _file_id: &str) -> Result<Vec<u8>> {
        Ok(Vec::new())
    }
}

/// Model gateway that replays scripted completions
///
/// Each call to `stream_completion` consumes the next script in order and
/// records the system override it was called with.
pub struct MockModel {
    scripts: Mutex<VecDeque<Vec<Result<String>>>>,
    pub generate_calls: AtomicUsize,
    pub systems: Mutex<Vec<Option<String>>>,
    fragment_delay: Duration,
    title: String,
}

impl MockModel {
    #[must_use]
    pub fn new(scripts: Vec<Vec<Result<String>>>) -> Arc<Self> {
        Self::with_delay(scripts, Duration::ZERO)
    }

    /// Single completion made of the given fragments
    #[must_use]
    pub fn with_fragments(fragments: &[&str]) -> Arc<Self> {
        Self::new(vec![ok_script(fragments)])
    }

    /// Scripts whose fragments each arrive after a delay, to keep an
    /// exchange in flight while the test does something else
    #[must_use]
    pub fn with_delay(scripts: Vec<Vec<Result<String>>>, fragment_delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            scripts: Mutex::new(scripts.into()),
            generate_calls: AtomicUsize::new(0),
            systems: Mutex::new(Vec::new()),
            fragment_delay,
            title: "Test title".to_string(),
        })
    }

    pub async fn last_system(&self) -> Option<String> {
        self.systems.lock().await.last().cloned().flatten()
    }
}

/// Script where every fragment arrives intact
#[must_use]
pub fn ok_script(fragments: &[&str]) -> Vec<Result<String>> {
    fragments.iter().map(|f| Ok((*f).to_string())).collect()
}

#[async_trait]
impl ModelGateway for MockModel {
    async fn stream_completion(
        &self,
        _history: &[PromptMessage],
        system_override: Option<&str>,
    ) -> Result<CompletionStream> {
        self.systems
            .lock()
            .await
            .push(system_override.map(ToString::to_string));

        let script = self
            .scripts
            .lock()
            .await
            .pop_front()
            .ok_or_else(|| Error::Model("no scripted completion left".to_string()))?;

        let delay = self.fragment_delay;
        if delay.is_zero() {
            Ok(Box::pin(futures::stream::iter(script)))
        } else {
            Ok(Box::pin(futures::stream::iter(script).then(
                move |item| async move {
                    tokio::time::sleep(delay).await;
                    item
                },
            )))
        }
    }

    async fn generate(&self, _prompt: &str) -> Result<String> {
        self.generate_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.title.clone())
    }
}

/// Config with required values filled in, for dispatcher tests
#[must_use]
pub fn test_config(allowed_chats: Vec<i64>) -> Config {
    Config {
        telegram_token: "token".to_string(),
        allowed_chats,
        conversation_timeout: None,
        max_history: None,
        edit_throttle: Duration::ZERO,
        db_path: PathBuf::from(":memory:"),
        start_message: "Hello!".to_string(),
        model: ModelConfig {
            base_url: "https://example.invalid/v1beta".to_string(),
            api_key: "key".to_string(),
            model: "test-model".to_string(),
            system_message: None,
            context_file: None,
        },
        voice: None,
        webhook: None,
    }
}

/// Controller over mocks with no throttle and no timeout
#[must_use]
pub fn make_controller(
    port: Arc<MockPort>,
    model: Arc<MockModel>,
    pool: DbPool,
) -> ChatController {
    make_controller_with(port, model, pool, ControllerOptions {
        edit_throttle: std::time::Duration::ZERO,
        ..ControllerOptions::default()
    })
}

/// Controller over mocks with explicit options
#[must_use]
pub fn make_controller_with(
    port: Arc<MockPort>,
    model: Arc<MockModel>,
    pool: DbPool,
    options: ControllerOptions,
) -> ChatController {
    ChatController::new(port, model, pool, None, options)
}
