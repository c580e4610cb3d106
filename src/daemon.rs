//! Daemon wiring and event dispatch
//!
//! Owns the channel, controller, and ingest path (polling or webhook), and
//! dispatches one spawned task per inbound event. A busy-set rejects a
//! second event for a chat whose exchange is still in flight.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::mpsc;

use crate::api::{self, ApiState};
use crate::channels::TelegramChannel;
use crate::channels::telegram::{BotCommand, UpdateDedup};
use crate::chat::{ChatController, ChatEvent, ChatPort, ControllerOptions};
use crate::model::GeminiClient;
use crate::voice::VoicePipeline;
use crate::{Config, Error, Result, db};

/// Pause between getUpdates polls
const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Notice sent when a chat already has an exchange in flight
const BUSY_NOTICE: &str = "Please wait for the current reply to finish.";

/// The running gateway
pub struct Daemon {
    config: Config,
    channel: Arc<TelegramChannel>,
    dispatcher: Dispatcher,
    events: mpsc::Receiver<ChatEvent>,
}

/// Gates inbound events (allow-list, per-chat busy set) and hands each
/// accepted event to a spawned controller task
pub struct Dispatcher {
    config: Config,
    port: Arc<dyn ChatPort>,
    controller: Arc<ChatController>,
    busy: Arc<Mutex<HashSet<i64>>>,
}

impl Daemon {
    /// Wire up the database, channel, model client, and controller
    ///
    /// Validates the bot token and, when a context file is configured,
    /// uploads it and creates the content cache before serving traffic.
    ///
    /// # Errors
    ///
    /// Returns error if any component fails to initialize
    pub async fn new(config: Config) -> Result<Self> {
        let pool = db::init(&config.db_path)?;

        let (channel, events) = TelegramChannel::with_receiver(config.telegram_token.clone());
        let channel = Arc::new(channel);
        channel.get_me().await?;

        let model = Arc::new(GeminiClient::new(&config.model));
        model.warm_context_cache().await?;

        let voice = config.voice.as_ref().map(VoicePipeline::new);
        if voice.is_some() {
            tracing::info!("voice pipeline enabled");
        }

        let options = ControllerOptions {
            edit_throttle: config.edit_throttle,
            conversation_timeout: config.conversation_timeout,
            max_history: config.max_history,
            start_message: config.start_message.clone(),
        };

        let controller = Arc::new(ChatController::new(
            channel.clone(),
            model,
            pool,
            voice,
            options,
        ));

        let dispatcher = Dispatcher::new(config.clone(), channel.clone(), controller);

        Ok(Self {
            config,
            channel,
            dispatcher,
            events,
        })
    }

    /// Run until interrupted
    ///
    /// # Errors
    ///
    /// Returns error if ingest setup fails
    pub async fn run(self) -> Result<()> {
        let Self {
            config,
            channel,
            dispatcher,
            mut events,
        } = self;

        if let Err(e) = channel.sync_commands(&bot_commands()).await {
            tracing::warn!(error = %e, "failed to sync bot commands");
        }

        if let Some(webhook) = &config.webhook {
            channel.set_webhook(&webhook.url).await?;

            let event_tx = channel
                .event_sender()
                .ok_or_else(|| Error::Channel("channel has no event sender".to_string()))?;
            let state = Arc::new(ApiState {
                events: event_tx,
                dedup: Mutex::new(UpdateDedup::default()),
            });

            let listen_addr = webhook.listen_addr.clone();
            tokio::spawn(async move {
                if let Err(e) = api::serve(&listen_addr, state).await {
                    tracing::error!(error = %e, "webhook listener failed");
                }
            });

            tracing::info!(url = %webhook.url, "courier gateway ready (webhook mode)");
        } else {
            // getUpdates conflicts with a registered webhook
            if let Err(e) = channel.delete_webhook().await {
                tracing::warn!(error = %e, "failed to delete webhook before polling");
            }
            let _poller = channel.start_polling(POLL_INTERVAL);
            tracing::info!("courier gateway ready (polling mode)");
        }

        loop {
            tokio::select! {
                maybe_event = events.recv() => {
                    let Some(event) = maybe_event else {
                        tracing::warn!("event channel closed");
                        break;
                    };
                    dispatcher.dispatch(event);
                }
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("shutting down");
                    break;
                }
            }
        }

        Ok(())
    }
}

impl Dispatcher {
    /// Create a dispatcher over a port and controller
    #[must_use]
    pub fn new(config: Config, port: Arc<dyn ChatPort>, controller: Arc<ChatController>) -> Self {
        Self {
            config,
            port,
            controller,
            busy: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Dispatch one event: allow-list gate, busy gate, then a spawned task
    pub fn dispatch(&self, event: ChatEvent) {
        let chat_id = event.chat_id;

        if !self.config.is_chat_allowed(chat_id) {
            tracing::warn!(chat_id, "ignoring message from unauthorized chat");
            return;
        }

        {
            let mut busy = self.busy.lock().unwrap_or_else(PoisonError::into_inner);
            if busy.contains(&chat_id) {
                tracing::debug!(chat_id, "chat busy, rejecting event");
                let port = self.port.clone();
                tokio::spawn(async move {
                    if let Err(e) = port.send_message(chat_id, BUSY_NOTICE).await {
                        tracing::warn!(chat_id, error = %e, "busy notice failed");
                    }
                });
                return;
            }
            busy.insert(chat_id);
        }

        let controller = self.controller.clone();
        let busy = self.busy.clone();
        tokio::spawn(async move {
            if let Err(e) = controller.handle_event(event).await {
                tracing::error!(chat_id, error = %e, "event handling failed");
            }
            busy.lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&chat_id);
        });
    }
}

/// Commands registered in Telegram's command menu
fn bot_commands() -> Vec<BotCommand> {
    [
        ("new", "Start a new conversation"),
        ("retry", "Regenerate the last reply"),
        ("history", "List past conversations"),
        ("modes", "List and manage modes"),
        ("say", "Speak a bot message (reply to it)"),
    ]
    .into_iter()
    .map(|(command, description)| BotCommand {
        command: command.to_string(),
        description: description.to_string(),
    })
    .collect()
}
