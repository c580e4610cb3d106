//! Conversation controller
//!
//! Drives one exchange per inbound event: resolve the active conversation,
//! stream the model reply into a Telegram message through throttled edits,
//! then persist the completed exchange. Commands manage the conversation
//! lifecycle (`/new`, `/retry`, `/resume_<id>`, `/history`, `/say`) and the
//! chat's mode, a named system-prompt preset (`/modes`, `/mode_<id>`,
//! `/mode_off`, `/addmode`, `/delmode_<id>`).

pub mod command;
pub mod throttle;

pub use command::Command;
pub use throttle::EditThrottle;

use std::borrow::Cow;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;

use crate::db::{Conversation, ConversationRepo, DbPool, MessageRepo, MessageRole, ModeRepo};
use crate::model::{ModelGateway, PromptMessage, Role};
use crate::voice::VoicePipeline;
use crate::{Error, Result};

/// User-visible notice when a reply fails outright
const REPLY_ERROR_NOTICE: &str =
    "Sorry, something went wrong while generating a reply. Please try again.";

/// Appended to the partial text when a stream breaks mid-reply
const STREAM_INTERRUPTED_NOTICE: &str = "⚠️ The reply was interrupted. Please try again.";

/// Telegram rejects message text longer than this many characters
const MAX_MESSAGE_LEN: usize = 4096;

/// Suffix marking a reply clipped to fit the message limit
const CLIP_SUFFIX: &str = "…\n\n(Reply clipped to fit the message limit.)";

/// Usage hint for `/addmode`
const ADD_MODE_USAGE: &str = "Usage: /addmode <name> | <system prompt>";

/// Outbound side of a chat channel, as seen by the controller
#[async_trait]
pub trait ChatPort: Send + Sync {
    /// Send a message, returning its platform message id
    async fn send_message(&self, chat_id: i64, text: &str) -> Result<i64>;

    /// Edit a previously sent message
    async fn edit_message(&self, chat_id: i64, message_id: i64, text: &str) -> Result<()>;

    /// Delete a previously sent message
    async fn delete_message(&self, chat_id: i64, message_id: i64) -> Result<()>;

    /// Show a chat action ("typing", "record_voice", ...)
    async fn send_chat_action(&self, chat_id: i64, action: &str) -> Result<()>;

    /// Send audio bytes as a voice note
    async fn send_voice(&self, chat_id: i64, audio: Vec<u8>, filename: &str) -> Result<()>;

    /// Download a platform file by id
    async fn download_file(&self, file_id: &str) -> Result<Vec<u8>>;
}

/// An inbound chat event
#[derive(Debug, Clone)]
pub struct ChatEvent {
    pub chat_id: i64,
    pub message_id: i64,
    pub payload: EventPayload,
    pub reply_to: Option<ReplyRef>,
}

/// What the event carries
#[derive(Debug, Clone)]
pub enum EventPayload {
    /// Plain text or a command
    Text(String),
    /// A voice note to transcribe
    Voice { file_id: String },
}

/// Reference to the message an event replies to
#[derive(Debug, Clone)]
pub struct ReplyRef {
    pub message_id: i64,
    pub from_bot: bool,
    pub text: Option<String>,
}

/// Tunable controller behavior
#[derive(Debug, Clone)]
pub struct ControllerOptions {
    /// Minimum interval between streaming edits per chat
    pub edit_throttle: Duration,

    /// Idle duration after which the next message starts a fresh conversation
    pub conversation_timeout: Option<Duration>,

    /// Cap on how many persisted messages are sent as model history
    pub max_history: Option<usize>,

    /// Greeting sent in reply to `/start`
    pub start_message: String,
}

impl Default for ControllerOptions {
    fn default() -> Self {
        Self {
            edit_throttle: Duration::from_millis(crate::config::DEFAULT_EDIT_THROTTLE_MS),
            conversation_timeout: None,
            max_history: None,
            start_message: "Hello! How can I help you today?".to_string(),
        }
    }
}

/// How to persist a completed reply
enum Finalize {
    /// Store the user message and the reply together
    Exchange { user_text: String },
    /// Store only the reply (`/retry` — the user message is already stored)
    AssistantOnly,
}

/// Per-chat conversation controller
pub struct ChatController {
    port: Arc<dyn ChatPort>,
    model: Arc<dyn ModelGateway>,
    conversations: ConversationRepo,
    messages: MessageRepo,
    modes: ModeRepo,
    voice: Option<VoicePipeline>,
    throttle: EditThrottle,
    options: ControllerOptions,
}

impl ChatController {
    /// Create a controller over the given port, model, and database pool
    #[must_use]
    pub fn new(
        port: Arc<dyn ChatPort>,
        model: Arc<dyn ModelGateway>,
        pool: DbPool,
        voice: Option<VoicePipeline>,
        options: ControllerOptions,
    ) -> Self {
        Self {
            port,
            model,
            conversations: ConversationRepo::new(pool.clone()),
            messages: MessageRepo::new(pool.clone()),
            modes: ModeRepo::new(pool),
            voice,
            throttle: EditThrottle::new(options.edit_throttle),
            options,
        }
    }

    /// Handle one inbound event to completion
    ///
    /// # Errors
    ///
    /// Returns error on upstream or database failure; a user-visible notice
    /// has already been delivered where one applies.
    pub async fn handle_event(&self, event: ChatEvent) -> Result<()> {
        match &event.payload {
            EventPayload::Text(text) => {
                if let Some(cmd) = Command::parse(text) {
                    self.handle_command(&event, cmd).await
                } else {
                    self.run_text_exchange(event.chat_id, text.clone(), false)
                        .await
                }
            }
            EventPayload::Voice { file_id } => {
                self.handle_voice(event.chat_id, file_id).await
            }
        }
    }

    async fn handle_command(&self, event: &ChatEvent, cmd: Command) -> Result<()> {
        let chat_id = event.chat_id;
        tracing::debug!(chat_id, ?cmd, "handling command");

        match cmd {
            Command::Start => {
                self.port
                    .send_message(chat_id, &self.options.start_message)
                    .await?;
                Ok(())
            }
            Command::New => {
                self.conversations.clear_active(chat_id)?;
                self.port
                    .send_message(chat_id, "Started a new conversation.")
                    .await?;
                Ok(())
            }
            Command::History => self.handle_history(chat_id).await,
            Command::Resume(id) => self.handle_resume(chat_id, id).await,
            Command::Retry => self.handle_retry(chat_id).await,
            Command::Say => self.handle_say(event).await,
            Command::Modes => self.handle_modes(chat_id).await,
            Command::SelectMode(id) => self.handle_select_mode(chat_id, id).await,
            Command::ClearMode => {
                self.modes.clear_active(chat_id)?;
                self.port.send_message(chat_id, "Cleared mode.").await?;
                Ok(())
            }
            Command::AddMode(args) => self.handle_add_mode(chat_id, &args).await,
            Command::DeleteMode(id) => self.handle_delete_mode(chat_id, id).await,
        }
    }

    /// `/modes` — list this chat's modes with their select commands
    async fn handle_modes(&self, chat_id: i64) -> Result<()> {
        let modes = self.modes.list_by_chat(chat_id)?;

        if modes.is_empty() {
            self.port
                .send_message(chat_id, &format!("No modes yet. {ADD_MODE_USAGE}"))
                .await?;
            return Ok(());
        }

        let active_id = self.modes.active(chat_id)?.map(|m| m.id);
        let mut lines: Vec<String> = modes
            .iter()
            .map(|m| {
                let marker = if active_id == Some(m.id) { " (current)" } else { "" };
                format!("/mode_{} — {}{marker}", m.id, m.name)
            })
            .collect();
        lines.push("/mode_off — default prompt, /delmode_<id> — delete".to_string());

        self.port.send_message(chat_id, &lines.join("\n")).await?;
        Ok(())
    }

    /// `/mode_<id>` — switch the chat to a mode's system prompt
    async fn handle_select_mode(&self, chat_id: i64, id: i64) -> Result<()> {
        match self.modes.get(id, chat_id)? {
            Some(mode) => {
                self.modes.set_active(chat_id, mode.id)?;
                self.port
                    .send_message(chat_id, &format!("Changed mode to \"{}\".", mode.name))
                    .await?;
                Ok(())
            }
            None => {
                self.port
                    .send_message(chat_id, &format!("Mode {id} was not found."))
                    .await?;
                Ok(())
            }
        }
    }

    /// `/addmode <name> | <prompt>` — define a mode and select it
    async fn handle_add_mode(&self, chat_id: i64, args: &str) -> Result<()> {
        let Some((name, prompt)) = parse_mode_args(args) else {
            self.port.send_message(chat_id, ADD_MODE_USAGE).await?;
            return Ok(());
        };

        let mode = self.modes.create(chat_id, name, prompt)?;
        self.modes.set_active(chat_id, mode.id)?;
        tracing::info!(chat_id, mode_id = mode.id, "mode added");

        self.port
            .send_message(
                chat_id,
                &format!("Added mode \"{}\" and switched to it. See /modes.", mode.name),
            )
            .await?;
        Ok(())
    }

    /// `/delmode_<id>` — delete a mode, clearing the selection if needed
    async fn handle_delete_mode(&self, chat_id: i64, id: i64) -> Result<()> {
        let text = if self.modes.delete(id, chat_id)? {
            format!("Mode {id} deleted.")
        } else {
            format!("Mode {id} was not found.")
        };
        self.port.send_message(chat_id, &text).await?;
        Ok(())
    }

    /// `/history` — read-only list of this chat's conversations
    async fn handle_history(&self, chat_id: i64) -> Result<()> {
        let conversations = self.conversations.list_by_chat(chat_id)?;

        if conversations.is_empty() {
            self.port
                .send_message(chat_id, "No conversations yet.")
                .await?;
            return Ok(());
        }

        let lines: Vec<String> = conversations
            .iter()
            .map(|c| {
                format!(
                    "/resume_{} — {} (started {})",
                    c.id,
                    c.title.as_deref().unwrap_or("Untitled"),
                    c.created_at.format("%Y-%m-%d %H:%M UTC")
                )
            })
            .collect();

        self.port.send_message(chat_id, &lines.join("\n")).await?;
        Ok(())
    }

    /// `/resume_<id>` — repoint the chat at an earlier conversation
    ///
    /// A conversation belonging to another chat is indistinguishable from a
    /// missing one; the pointer is left untouched either way.
    async fn handle_resume(&self, chat_id: i64, id: i64) -> Result<()> {
        match self.conversations.get(id, chat_id)? {
            Some(conversation) => {
                self.conversations.set_active(chat_id, conversation.id)?;
                let title = conversation.title.as_deref().unwrap_or("Untitled");
                self.port
                    .send_message(chat_id, &format!("Resumed conversation {id}: {title}"))
                    .await?;
                Ok(())
            }
            None => {
                self.port
                    .send_message(chat_id, &format!("Conversation {id} was not found."))
                    .await?;
                Ok(())
            }
        }
    }

    /// `/retry` — drop the last reply and regenerate from the last user message
    async fn handle_retry(&self, chat_id: i64) -> Result<()> {
        let Some(active_id) = self.conversations.active(chat_id)? else {
            self.port
                .send_message(chat_id, "There is no active conversation to retry.")
                .await?;
            return Ok(());
        };

        let Some(conversation) = self.conversations.get(active_id, chat_id)? else {
            // Stale pointer; clear it rather than erroring forever
            self.conversations.clear_active(chat_id)?;
            self.port
                .send_message(chat_id, "There is no active conversation to retry.")
                .await?;
            return Ok(());
        };

        if self
            .messages
            .last_user_message(conversation.id)?
            .is_none()
        {
            self.port
                .send_message(chat_id, "Nothing to retry yet.")
                .await?;
            return Ok(());
        }

        self.messages.delete_last_assistant(conversation.id)?;

        // History now ends with the last user message
        let history = self.load_history(conversation.id)?;
        self.run_exchange(chat_id, &conversation, history, Finalize::AssistantOnly, false)
            .await
    }

    /// `/say` — speak a bot message back as a voice note
    async fn handle_say(&self, event: &ChatEvent) -> Result<()> {
        let chat_id = event.chat_id;

        let Some(voice) = &self.voice else {
            self.port
                .send_message(chat_id, "Voice is not enabled.")
                .await?;
            return Ok(());
        };

        let text = event
            .reply_to
            .as_ref()
            .filter(|reply| reply.from_bot)
            .and_then(|reply| reply.text.clone());

        let Some(text) = text else {
            self.port
                .send_message(chat_id, "Reply to one of my messages with /say.")
                .await?;
            return Ok(());
        };

        if let Err(e) = self.port.send_chat_action(chat_id, "record_voice").await {
            tracing::debug!(chat_id, error = %e, "chat action failed");
        }

        match voice.tts.synthesize(&text).await {
            Ok(audio) => {
                let filename = format!("say.{}", voice.tts.file_extension());
                self.port.send_voice(chat_id, audio, &filename).await
            }
            Err(e) => {
                tracing::warn!(chat_id, error = %e, "speech synthesis failed");
                self.port
                    .send_message(chat_id, "Sorry, I could not produce audio for that message.")
                    .await?;
                Ok(())
            }
        }
    }

    /// Voice note: transcribe, then run a normal exchange and speak the reply
    async fn handle_voice(&self, chat_id: i64, file_id: &str) -> Result<()> {
        let Some(voice) = &self.voice else {
            self.port
                .send_message(chat_id, "Voice messages are not enabled.")
                .await?;
            return Ok(());
        };

        let placeholder = self
            .port
            .send_message(chat_id, "🎙️ Transcribing…")
            .await?;

        let transcript = async {
            let audio = self.port.download_file(file_id).await?;
            voice.stt.transcribe(audio, "voice.ogg").await
        }
        .await;

        let transcript = match transcript {
            Ok(text) if !text.trim().is_empty() => text,
            Ok(_) => {
                self.port
                    .edit_message(chat_id, placeholder, "I could not hear anything in that message.")
                    .await?;
                return Ok(());
            }
            Err(e) => {
                tracing::warn!(chat_id, error = %e, "transcription failed");
                self.port
                    .edit_message(chat_id, placeholder, "Sorry, I could not transcribe that message.")
                    .await?;
                return Ok(());
            }
        };

        if let Err(e) = self.port.delete_message(chat_id, placeholder).await {
            tracing::debug!(chat_id, error = %e, "placeholder delete failed");
        }

        self.run_text_exchange(chat_id, transcript, true).await
    }

    /// Run one full exchange for plain user text
    async fn run_text_exchange(
        &self,
        chat_id: i64,
        user_text: String,
        reply_with_voice: bool,
    ) -> Result<()> {
        let conversation = self.resolve_conversation(chat_id)?;

        let mut history = self.load_history(conversation.id)?;
        history.push(PromptMessage::user(user_text.clone()));

        self.run_exchange(
            chat_id,
            &conversation,
            history,
            Finalize::Exchange { user_text },
            reply_with_voice,
        )
        .await
    }

    /// Active conversation for the chat, rolling over on idle timeout and
    /// creating a fresh one when none is active
    fn resolve_conversation(&self, chat_id: i64) -> Result<Conversation> {
        if let Some(active_id) = self.conversations.active(chat_id)? {
            if let Some(conversation) = self.conversations.get(active_id, chat_id)? {
                if self.is_expired(&conversation) {
                    tracing::info!(
                        chat_id,
                        conversation_id = conversation.id,
                        "conversation idle timeout, starting fresh"
                    );
                    self.conversations.clear_active(chat_id)?;
                } else {
                    return Ok(conversation);
                }
            }
        }

        let conversation = self.conversations.create(chat_id)?;
        self.conversations.set_active(chat_id, conversation.id)?;
        tracing::debug!(chat_id, conversation_id = conversation.id, "conversation created");
        Ok(conversation)
    }

    /// Timeout is evaluated only here, when a new exchange starts; an
    /// in-flight exchange is never preempted.
    fn is_expired(&self, conversation: &Conversation) -> bool {
        let Some(timeout) = self.options.conversation_timeout else {
            return false;
        };
        let Ok(timeout) = chrono::Duration::from_std(timeout) else {
            return false;
        };

        chrono::Utc::now() - conversation.last_activity_at > timeout
    }

    /// Persisted history of the conversation, oldest first, capped
    fn load_history(&self, conversation_id: i64) -> Result<Vec<PromptMessage>> {
        let stored = self.messages.list(conversation_id, self.options.max_history)?;

        Ok(stored
            .into_iter()
            .map(|m| PromptMessage {
                role: match m.role {
                    MessageRole::User => Role::User,
                    MessageRole::Assistant => Role::Model,
                },
                content: m.content,
            })
            .collect())
    }

    /// Stream the reply, then persist and post-process
    async fn run_exchange(
        &self,
        chat_id: i64,
        conversation: &Conversation,
        history: Vec<PromptMessage>,
        finalize: Finalize,
        reply_with_voice: bool,
    ) -> Result<()> {
        let first_exchange = self.messages.count(conversation.id)? == 0;

        // The selected mode's prompt replaces the configured system message
        let mode_prompt = self.modes.active(chat_id)?.map(|m| m.system_prompt);

        let reply = self
            .stream_reply(chat_id, &history, mode_prompt.as_deref())
            .await?;

        match &finalize {
            Finalize::Exchange { user_text } => {
                self.messages
                    .commit_exchange(conversation.id, user_text, &reply)?;
            }
            Finalize::AssistantOnly => {
                self.messages
                    .append(conversation.id, MessageRole::Assistant, &reply)?;
                self.conversations.touch(conversation.id)?;
            }
        }

        if first_exchange {
            if let Finalize::Exchange { user_text } = &finalize {
                self.generate_title(conversation.id, user_text, &reply).await;
            }
        }

        if reply_with_voice {
            self.speak_reply(chat_id, &reply).await;
        }

        Ok(())
    }

    /// Stream fragments into one Telegram message
    ///
    /// First fragment sends the message; later fragments edit it, coalesced
    /// by the throttle. Completion always lands an exact final edit. Outbound
    /// text is clipped to the platform message limit; the returned (and
    /// persisted) reply is never clipped. On a mid-stream failure the partial
    /// text gets a visible error suffix and nothing is persisted.
    async fn stream_reply(
        &self,
        chat_id: i64,
        history: &[PromptMessage],
        system_override: Option<&str>,
    ) -> Result<String> {
        if let Err(e) = self.port.send_chat_action(chat_id, "typing").await {
            tracing::debug!(chat_id, error = %e, "chat action failed");
        }

        let mut stream = match self.model.stream_completion(history, system_override).await {
            Ok(stream) => stream,
            Err(e) => {
                tracing::error!(chat_id, error = %e, "completion request failed");
                self.port.send_message(chat_id, REPLY_ERROR_NOTICE).await?;
                return Err(e);
            }
        };

        let mut buffer = String::new();
        let mut sent_id: Option<i64> = None;

        while let Some(item) = stream.next().await {
            match item {
                Ok(fragment) => {
                    buffer.push_str(&fragment);

                    match sent_id {
                        None => {
                            sent_id = Some(
                                self.port
                                    .send_message(chat_id, &clip_message(&buffer))
                                    .await?,
                            );
                        }
                        Some(id) => {
                            if self.throttle.check(chat_id) {
                                if let Err(e) = self
                                    .port
                                    .edit_message(chat_id, id, &clip_message(&buffer))
                                    .await
                                {
                                    tracing::warn!(chat_id, error = %e, "streaming edit failed");
                                }
                            }
                        }
                    }
                }
                Err(e) => {
                    tracing::error!(chat_id, error = %e, "completion stream failed");
                    let notice = if buffer.is_empty() {
                        REPLY_ERROR_NOTICE.to_string()
                    } else {
                        format!("{buffer}\n\n{STREAM_INTERRUPTED_NOTICE}")
                    };

                    match sent_id {
                        Some(id) => {
                            if let Err(edit_err) =
                                self.port.edit_message(chat_id, id, &clip_message(&notice)).await
                            {
                                tracing::warn!(chat_id, error = %edit_err, "error edit failed");
                            }
                        }
                        None => {
                            self.port.send_message(chat_id, &clip_message(&notice)).await?;
                        }
                    }

                    self.throttle.reset(chat_id);
                    return Err(e);
                }
            }
        }

        self.throttle.reset(chat_id);

        let Some(id) = sent_id else {
            self.port.send_message(chat_id, REPLY_ERROR_NOTICE).await?;
            return Err(Error::Model("empty completion".to_string()));
        };

        // Final edit bypasses the throttle so the delivered text is exact
        self.port
            .edit_message(chat_id, id, &clip_message(&buffer))
            .await?;

        Ok(buffer)
    }

    /// Synthesize a short title after the first exchange
    ///
    /// Failures are logged and ignored; the conversation stays untitled and
    /// the next exchange will not retry (first-exchange only).
    async fn generate_title(&self, conversation_id: i64, user_text: &str, reply: &str) {
        let prompt = title_prompt(user_text, reply);

        match self.model.generate(&prompt).await {
            Ok(raw) => {
                let title = sanitize_title(&raw);
                if title.is_empty() {
                    return;
                }
                match self.conversations.set_title(conversation_id, &title) {
                    Ok(true) => tracing::debug!(conversation_id, title, "conversation titled"),
                    Ok(false) => {}
                    Err(e) => tracing::warn!(conversation_id, error = %e, "title store failed"),
                }
            }
            Err(e) => tracing::warn!(conversation_id, error = %e, "title generation failed"),
        }
    }

    /// Speak the final reply as a voice note; degrades to text-only on failure
    async fn speak_reply(&self, chat_id: i64, reply: &str) {
        let Some(voice) = &self.voice else {
            return;
        };

        match voice.tts.synthesize(reply).await {
            Ok(audio) => {
                let filename = format!("reply.{}", voice.tts.file_extension());
                if let Err(e) = self.port.send_voice(chat_id, audio, &filename).await {
                    tracing::warn!(chat_id, error = %e, "voice reply send failed");
                }
            }
            Err(e) => tracing::warn!(chat_id, error = %e, "voice reply synthesis failed"),
        }
    }
}

/// Prompt for the secondary title request, built from the first exchange
fn title_prompt(user_text: &str, reply: &str) -> String {
    format!(
        "Write a very short title (at most six words) for a conversation that \
         starts with the exchange below. Reply with the title only.\n\n\
         User: {user_text}\n\nAssistant: {reply}"
    )
}

/// Clip text to the platform message limit, marking the cut
fn clip_message(text: &str) -> Cow<'_, str> {
    if text.chars().count() <= MAX_MESSAGE_LEN {
        return Cow::Borrowed(text);
    }

    let keep = MAX_MESSAGE_LEN - CLIP_SUFFIX.chars().count();
    let mut clipped: String = text.chars().take(keep).collect();
    clipped.push_str(CLIP_SUFFIX);
    Cow::Owned(clipped)
}

/// Split `/addmode` arguments into name and prompt
fn parse_mode_args(args: &str) -> Option<(&str, &str)> {
    let (name, prompt) = args.split_once('|')?;
    let name = name.trim();
    let prompt = prompt.trim();
    (!name.is_empty() && !prompt.is_empty()).then_some((name, prompt))
}

/// Normalize a model-produced title: first line, no quotes, bounded length
fn sanitize_title(raw: &str) -> String {
    let line = raw.lines().next().unwrap_or_default().trim();
    let line = line.trim_matches(|c| c == '"' || c == '\'' || c == '*').trim();
    line.chars().take(80).collect()
}
