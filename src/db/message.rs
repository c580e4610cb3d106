//! Message repository for conversation history

use super::DbPool;
use crate::{Error, Result};

/// A message in a conversation
#[derive(Debug, Clone)]
pub struct Message {
    pub id: i64,
    pub conversation_id: i64,
    pub role: MessageRole,
    pub content: String,
    pub seq: i64,
}

/// Message role
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageRole {
    User,
    Assistant,
}

impl MessageRole {
    pub(crate) const fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }

    fn from_str(s: &str) -> Option<Self> {
        match s {
            "user" => Some(Self::User),
            "assistant" => Some(Self::Assistant),
            _ => None,
        }
    }
}

/// Message repository
#[derive(Clone)]
pub struct MessageRepo {
    pool: DbPool,
}

impl MessageRepo {
    /// Create a new message repository
    #[must_use]
    #[allow(clippy::missing_const_for_fn)]
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Append a message with the next seq for its conversation
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn append(
        &self,
        conversation_id: i64,
        role: MessageRole,
        content: &str,
    ) -> Result<Message> {
        let conn = self
            .pool
            .get()
            .map_err(|e| Error::Database(e.to_string()))?;

        let seq = insert_message(&conn, conversation_id, role, content)?;

        Ok(Message {
            id: conn.last_insert_rowid(),
            conversation_id,
            role,
            content: content.to_string(),
            seq,
        })
    }

    /// Atomically persist one completed user/assistant exchange and refresh
    /// the conversation's last-activity timestamp
    ///
    /// Either both messages are stored or neither is.
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn commit_exchange(
        &self,
        conversation_id: i64,
        user_content: &str,
        assistant_content: &str,
    ) -> Result<()> {
        let mut conn = self
            .pool
            .get()
            .map_err(|e| Error::Database(e.to_string()))?;

        let tx = conn
            .transaction()
            .map_err(|e| Error::Database(e.to_string()))?;

        insert_message(&tx, conversation_id, MessageRole::User, user_content)?;
        insert_message(&tx, conversation_id, MessageRole::Assistant, assistant_content)?;

        tx.execute(
            "UPDATE conversations SET last_activity_at = ?1 WHERE id = ?2",
            rusqlite::params![chrono::Utc::now().to_rfc3339(), conversation_id],
        )
        .map_err(|e| Error::Database(e.to_string()))?;

        tx.commit().map_err(|e| Error::Database(e.to_string()))?;
        Ok(())
    }

    /// List messages oldest first, optionally capped to the most recent N
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn list(&self, conversation_id: i64, limit: Option<usize>) -> Result<Vec<Message>> {
        let conn = self
            .pool
            .get()
            .map_err(|e| Error::Database(e.to_string()))?;

        // When capped, take the newest N and reverse back to oldest-first
        let limit = limit.map_or(i64::MAX, |n| i64::try_from(n).unwrap_or(i64::MAX));

        let mut stmt = conn
            .prepare(
                "SELECT id, conversation_id, role, content, seq
                 FROM messages WHERE conversation_id = ?1
                 ORDER BY seq DESC LIMIT ?2",
            )
            .map_err(|e| Error::Database(e.to_string()))?;

        let messages: Vec<Message> = stmt
            .query_map(rusqlite::params![conversation_id, limit], row_to_message)
            .map_err(|e| Error::Database(e.to_string()))?
            .filter_map(std::result::Result::ok)
            .collect();

        Ok(messages.into_iter().rev().collect())
    }

    /// Get the most recent user message in a conversation, if any
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn last_user_message(&self, conversation_id: i64) -> Result<Option<Message>> {
        let conn = self
            .pool
            .get()
            .map_err(|e| Error::Database(e.to_string()))?;

        let message = conn
            .query_row(
                "SELECT id, conversation_id, role, content, seq
                 FROM messages WHERE conversation_id = ?1 AND role = 'user'
                 ORDER BY seq DESC LIMIT 1",
                [conversation_id],
                row_to_message,
            )
            .ok();

        Ok(message)
    }

    /// Delete the most recent assistant message, for `/retry`
    ///
    /// Returns whether a message was deleted.
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn delete_last_assistant(&self, conversation_id: i64) -> Result<bool> {
        let conn = self
            .pool
            .get()
            .map_err(|e| Error::Database(e.to_string()))?;

        let deleted = conn
            .execute(
                "DELETE FROM messages WHERE id = (
                     SELECT id FROM messages
                     WHERE conversation_id = ?1 AND role = 'assistant'
                     ORDER BY seq DESC LIMIT 1
                 )",
                [conversation_id],
            )
            .map_err(|e| Error::Database(e.to_string()))?;

        Ok(deleted > 0)
    }

    /// Count messages in a conversation
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn count(&self, conversation_id: i64) -> Result<usize> {
        let conn = self
            .pool
            .get()
            .map_err(|e| Error::Database(e.to_string()))?;

        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM messages WHERE conversation_id = ?1",
                [conversation_id],
                |row| row.get(0),
            )
            .map_err(|e| Error::Database(e.to_string()))?;

        Ok(usize::try_from(count).unwrap_or(0))
    }
}

/// Insert a message with seq = max(seq) + 1 for the conversation
fn insert_message(
    conn: &rusqlite::Connection,
    conversation_id: i64,
    role: MessageRole,
    content: &str,
) -> Result<i64> {
    let seq: i64 = conn
        .query_row(
            "SELECT COALESCE(MAX(seq), 0) + 1 FROM messages WHERE conversation_id = ?1",
            [conversation_id],
            |row| row.get(0),
        )
        .map_err(|e| Error::Database(e.to_string()))?;

    conn.execute(
        "INSERT INTO messages (conversation_id, role, content, seq)
         VALUES (?1, ?2, ?3, ?4)",
        rusqlite::params![conversation_id, role.as_str(), content, seq],
    )
    .map_err(|e| Error::Database(e.to_string()))?;

    Ok(seq)
}

fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<Message> {
    Ok(Message {
        id: row.get(0)?,
        conversation_id: row.get(1)?,
        role: MessageRole::from_str(&row.get::<_, String>(2)?).unwrap_or(MessageRole::User),
        content: row.get(3)?,
        seq: row.get(4)?,
    })
}
