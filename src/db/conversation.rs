//! Conversation repository for CRUD operations and the active pointer

use chrono::{DateTime, Utc};

use super::DbPool;
use crate::{Error, Result};

/// A persisted conversation
#[derive(Debug, Clone)]
pub struct Conversation {
    pub id: i64,
    pub chat_id: i64,
    pub title: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
}

/// Conversation repository
#[derive(Clone)]
pub struct ConversationRepo {
    pool: DbPool,
}

impl ConversationRepo {
    /// Create a new conversation repository
    #[must_use]
    #[allow(clippy::missing_const_for_fn)]
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Create a new conversation for a chat
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn create(&self, chat_id: i64) -> Result<Conversation> {
        let conn = self
            .pool
            .get()
            .map_err(|e| Error::Database(e.to_string()))?;

        let now = Utc::now();
        let now_str = now.to_rfc3339();

        conn.execute(
            "INSERT INTO conversations (chat_id, created_at, last_activity_at)
             VALUES (?1, ?2, ?2)",
            rusqlite::params![chat_id, &now_str],
        )
        .map_err(|e| Error::Database(e.to_string()))?;

        Ok(Conversation {
            id: conn.last_insert_rowid(),
            chat_id,
            title: None,
            created_at: now,
            last_activity_at: now,
        })
    }

    /// Get a conversation by id, enforcing chat ownership
    ///
    /// Returns None when the conversation does not exist or belongs to a
    /// different chat.
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn get(&self, id: i64, chat_id: i64) -> Result<Option<Conversation>> {
        let conn = self
            .pool
            .get()
            .map_err(|e| Error::Database(e.to_string()))?;

        let conversation = conn
            .query_row(
                "SELECT id, chat_id, title, created_at, last_activity_at
                 FROM conversations WHERE id = ?1 AND chat_id = ?2",
                rusqlite::params![id, chat_id],
                row_to_conversation,
            )
            .ok();

        Ok(conversation)
    }

    /// List all conversations for a chat, oldest first
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn list_by_chat(&self, chat_id: i64) -> Result<Vec<Conversation>> {
        let conn = self
            .pool
            .get()
            .map_err(|e| Error::Database(e.to_string()))?;

        let mut stmt = conn
            .prepare(
                "SELECT id, chat_id, title, created_at, last_activity_at
                 FROM conversations WHERE chat_id = ?1 ORDER BY id",
            )
            .map_err(|e| Error::Database(e.to_string()))?;

        let conversations = stmt
            .query_map([chat_id], row_to_conversation)
            .map_err(|e| Error::Database(e.to_string()))?
            .filter_map(std::result::Result::ok)
            .collect();

        Ok(conversations)
    }

    /// Set the conversation title, only if one has not been set yet
    ///
    /// Returns whether the title was stored.
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn set_title(&self, id: i64, title: &str) -> Result<bool> {
        let conn = self
            .pool
            .get()
            .map_err(|e| Error::Database(e.to_string()))?;

        let changed = conn
            .execute(
                "UPDATE conversations SET title = ?1 WHERE id = ?2 AND title IS NULL",
                rusqlite::params![title, id],
            )
            .map_err(|e| Error::Database(e.to_string()))?;

        Ok(changed > 0)
    }

    /// Update the conversation's last-activity timestamp
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn touch(&self, id: i64) -> Result<()> {
        let conn = self
            .pool
            .get()
            .map_err(|e| Error::Database(e.to_string()))?;

        conn.execute(
            "UPDATE conversations SET last_activity_at = ?1 WHERE id = ?2",
            rusqlite::params![Utc::now().to_rfc3339(), id],
        )
        .map_err(|e| Error::Database(e.to_string()))?;

        Ok(())
    }

    /// Get the active conversation id for a chat, if any
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn active(&self, chat_id: i64) -> Result<Option<i64>> {
        let conn = self
            .pool
            .get()
            .map_err(|e| Error::Database(e.to_string()))?;

        let id = conn
            .query_row(
                "SELECT conversation_id FROM active_conversations WHERE chat_id = ?1",
                [chat_id],
                |row| row.get(0),
            )
            .ok();

        Ok(id)
    }

    /// Point a chat at a conversation, replacing any previous pointer
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn set_active(&self, chat_id: i64, conversation_id: i64) -> Result<()> {
        let conn = self
            .pool
            .get()
            .map_err(|e| Error::Database(e.to_string()))?;

        conn.execute(
            "INSERT OR REPLACE INTO active_conversations (chat_id, conversation_id)
             VALUES (?1, ?2)",
            rusqlite::params![chat_id, conversation_id],
        )
        .map_err(|e| Error::Database(e.to_string()))?;

        Ok(())
    }

    /// Clear the active pointer for a chat
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn clear_active(&self, chat_id: i64) -> Result<()> {
        let conn = self
            .pool
            .get()
            .map_err(|e| Error::Database(e.to_string()))?;

        conn.execute(
            "DELETE FROM active_conversations WHERE chat_id = ?1",
            [chat_id],
        )
        .map_err(|e| Error::Database(e.to_string()))?;

        Ok(())
    }
}

fn row_to_conversation(row: &rusqlite::Row<'_>) -> rusqlite::Result<Conversation> {
    Ok(Conversation {
        id: row.get(0)?,
        chat_id: row.get(1)?,
        title: row.get(2)?,
        created_at: parse_datetime(&row.get::<_, String>(3)?),
        last_activity_at: parse_datetime(&row.get::<_, String>(4)?),
    })
}

pub(super) fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s).map_or_else(|_| Utc::now(), |dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_memory;

    fn setup() -> ConversationRepo {
        ConversationRepo::new(init_memory().unwrap())
    }

    #[test]
    fn test_create_and_get() {
        let repo = setup();

        let conversation = repo.create(100).unwrap();
        assert!(conversation.title.is_none());

        let fetched = repo.get(conversation.id, 100).unwrap().unwrap();
        assert_eq!(fetched.id, conversation.id);
        assert_eq!(fetched.chat_id, 100);
    }

    #[test]
    fn test_get_enforces_chat_ownership() {
        let repo = setup();

        let conversation = repo.create(100).unwrap();

        // Same id, different chat: not visible
        assert!(repo.get(conversation.id, 200).unwrap().is_none());
    }

    #[test]
    fn test_title_set_at_most_once() {
        let repo = setup();

        let conversation = repo.create(100).unwrap();

        assert!(repo.set_title(conversation.id, "First title").unwrap());
        assert!(!repo.set_title(conversation.id, "Second title").unwrap());

        let fetched = repo.get(conversation.id, 100).unwrap().unwrap();
        assert_eq!(fetched.title.as_deref(), Some("First title"));
    }

    #[test]
    fn test_active_pointer_is_unique_per_chat() {
        let repo = setup();

        let first = repo.create(100).unwrap();
        let second = repo.create(100).unwrap();

        assert!(repo.active(100).unwrap().is_none());

        repo.set_active(100, first.id).unwrap();
        assert_eq!(repo.active(100).unwrap(), Some(first.id));

        // Repointing replaces, never duplicates
        repo.set_active(100, second.id).unwrap();
        assert_eq!(repo.active(100).unwrap(), Some(second.id));

        repo.clear_active(100).unwrap();
        assert!(repo.active(100).unwrap().is_none());
    }

    #[test]
    fn test_list_by_chat_is_scoped() {
        let repo = setup();

        let a = repo.create(100).unwrap();
        let b = repo.create(100).unwrap();
        repo.create(200).unwrap();

        let listed = repo.list_by_chat(100).unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id, a.id);
        assert_eq!(listed[1].id, b.id);
    }
}
