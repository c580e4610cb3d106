//! Mode repository: named system-prompt presets and the per-chat selection

use super::DbPool;
use crate::{Error, Result};

/// A persisted mode: a named system prompt a chat can switch to
#[derive(Debug, Clone)]
pub struct Mode {
    pub id: i64,
    pub chat_id: i64,
    pub name: String,
    pub system_prompt: String,
}

/// Mode repository
#[derive(Clone)]
pub struct ModeRepo {
    pool: DbPool,
}

impl ModeRepo {
    /// Create a new mode repository
    #[must_use]
    #[allow(clippy::missing_const_for_fn)]
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Create a mode for a chat
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn create(&self, chat_id: i64, name: &str, system_prompt: &str) -> Result<Mode> {
        let conn = self
            .pool
            .get()
            .map_err(|e| Error::Database(e.to_string()))?;

        conn.execute(
            "INSERT INTO modes (chat_id, name, system_prompt) VALUES (?1, ?2, ?3)",
            rusqlite::params![chat_id, name, system_prompt],
        )
        .map_err(|e| Error::Database(e.to_string()))?;

        Ok(Mode {
            id: conn.last_insert_rowid(),
            chat_id,
            name: name.to_string(),
            system_prompt: system_prompt.to_string(),
        })
    }

    /// Get a mode by id, enforcing chat ownership
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn get(&self, id: i64, chat_id: i64) -> Result<Option<Mode>> {
        let conn = self
            .pool
            .get()
            .map_err(|e| Error::Database(e.to_string()))?;

        let mode = conn
            .query_row(
                "SELECT id, chat_id, name, system_prompt
                 FROM modes WHERE id = ?1 AND chat_id = ?2",
                rusqlite::params![id, chat_id],
                row_to_mode,
            )
            .ok();

        Ok(mode)
    }

    /// List all modes for a chat, oldest first
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn list_by_chat(&self, chat_id: i64) -> Result<Vec<Mode>> {
        let conn = self
            .pool
            .get()
            .map_err(|e| Error::Database(e.to_string()))?;

        let mut stmt = conn
            .prepare(
                "SELECT id, chat_id, name, system_prompt
                 FROM modes WHERE chat_id = ?1 ORDER BY id",
            )
            .map_err(|e| Error::Database(e.to_string()))?;

        let modes = stmt
            .query_map([chat_id], row_to_mode)
            .map_err(|e| Error::Database(e.to_string()))?
            .filter_map(std::result::Result::ok)
            .collect();

        Ok(modes)
    }

    /// Delete a mode, clearing the chat's selection when it pointed at it
    ///
    /// Returns whether a mode was deleted.
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn delete(&self, id: i64, chat_id: i64) -> Result<bool> {
        let conn = self
            .pool
            .get()
            .map_err(|e| Error::Database(e.to_string()))?;

        conn.execute(
            "DELETE FROM active_modes WHERE chat_id = ?2 AND mode_id = ?1",
            rusqlite::params![id, chat_id],
        )
        .map_err(|e| Error::Database(e.to_string()))?;

        let deleted = conn
            .execute(
                "DELETE FROM modes WHERE id = ?1 AND chat_id = ?2",
                rusqlite::params![id, chat_id],
            )
            .map_err(|e| Error::Database(e.to_string()))?;

        Ok(deleted > 0)
    }

    /// Get the selected mode for a chat, if any
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn active(&self, chat_id: i64) -> Result<Option<Mode>> {
        let conn = self
            .pool
            .get()
            .map_err(|e| Error::Database(e.to_string()))?;

        let mode = conn
            .query_row(
                "SELECT m.id, m.chat_id, m.name, m.system_prompt
                 FROM modes m
                 JOIN active_modes a ON a.mode_id = m.id
                 WHERE a.chat_id = ?1",
                [chat_id],
                row_to_mode,
            )
            .ok();

        Ok(mode)
    }

    /// Select a mode for a chat, replacing any previous selection
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn set_active(&self, chat_id: i64, mode_id: i64) -> Result<()> {
        let conn = self
            .pool
            .get()
            .map_err(|e| Error::Database(e.to_string()))?;

        conn.execute(
            "INSERT OR REPLACE INTO active_modes (chat_id, mode_id) VALUES (?1, ?2)",
            rusqlite::params![chat_id, mode_id],
        )
        .map_err(|e| Error::Database(e.to_string()))?;

        Ok(())
    }

    /// Clear the mode selection for a chat
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn clear_active(&self, chat_id: i64) -> Result<()> {
        let conn = self
            .pool
            .get()
            .map_err(|e| Error::Database(e.to_string()))?;

        conn.execute("DELETE FROM active_modes WHERE chat_id = ?1", [chat_id])
            .map_err(|e| Error::Database(e.to_string()))?;

        Ok(())
    }
}

fn row_to_mode(row: &rusqlite::Row<'_>) -> rusqlite::Result<Mode> {
    Ok(Mode {
        id: row.get(0)?,
        chat_id: row.get(1)?,
        name: row.get(2)?,
        system_prompt: row.get(3)?,
    })
}
