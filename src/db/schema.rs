//! Database schema and migrations

use rusqlite::Connection;

use crate::Result;

/// Current schema version
pub const SCHEMA_VERSION: i32 = 3;

/// Initialize the database schema
///
/// # Errors
///
/// Returns error if migration fails
pub fn init(conn: &Connection) -> Result<()> {
    let version: i32 = conn
        .query_row("PRAGMA user_version", [], |row| row.get(0))
        .unwrap_or(0);

    if version < 1 {
        migrate_v1(conn)?;
    }
    if version < 2 {
        migrate_v2(conn)?;
    }
    if version < 3 {
        migrate_v3(conn)?;
    }

    Ok(())
}

fn migrate_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r"
        -- Conversations table
        CREATE TABLE IF NOT EXISTS conversations (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            chat_id INTEGER NOT NULL,
            title TEXT,
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            last_activity_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE INDEX IF NOT EXISTS idx_conversations_chat ON conversations(chat_id);

        -- Messages table; seq is monotonic per conversation
        CREATE TABLE IF NOT EXISTS messages (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            conversation_id INTEGER NOT NULL REFERENCES conversations(id),
            role TEXT NOT NULL CHECK(role IN ('user', 'assistant')),
            content TEXT NOT NULL,
            seq INTEGER NOT NULL
        );

        CREATE UNIQUE INDEX IF NOT EXISTS idx_messages_conversation_seq
            ON messages(conversation_id, seq);

        PRAGMA user_version = 1;
        ",
    )?;

    tracing::info!("migrated to schema v1");
    Ok(())
}

fn migrate_v2(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r"
        -- Active conversation pointer, at most one per chat
        CREATE TABLE IF NOT EXISTS active_conversations (
            chat_id INTEGER NOT NULL UNIQUE,
            conversation_id INTEGER NOT NULL REFERENCES conversations(id)
        );

        PRAGMA user_version = 2;
        ",
    )?;

    tracing::info!("migrated to schema v2 (active conversation pointer)");
    Ok(())
}

fn migrate_v3(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r"
        -- Named system-prompt presets, scoped per chat
        CREATE TABLE IF NOT EXISTS modes (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            chat_id INTEGER NOT NULL,
            name TEXT NOT NULL,
            system_prompt TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_modes_chat ON modes(chat_id);

        -- Selected mode, at most one per chat
        CREATE TABLE IF NOT EXISTS active_modes (
            chat_id INTEGER NOT NULL UNIQUE,
            mode_id INTEGER NOT NULL REFERENCES modes(id)
        );

        PRAGMA user_version = 3;
        ",
    )?;

    tracing::info!("migrated to schema v3 (conversation modes)");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_init() {
        let conn = Connection::open_in_memory().unwrap();
        init(&conn).unwrap();

        // Verify tables exist
        let count: i32 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type='table'
                 AND name IN ('conversations', 'messages', 'active_conversations',
                              'modes', 'active_modes')",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 5);
    }

    #[test]
    fn test_schema_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        init(&conn).unwrap();
        init(&conn).unwrap(); // Should not fail
    }
}
