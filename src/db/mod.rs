// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Database module for saved chat conversations

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use crate::{RavenError, Result};

/// Number of conversations listed when no limit is given
pub const DEFAULT_LIST_LIMIT: usize = 20;

/// Title length taken from the first user message
const TITLE_CHARS: usize = 50;

const ROLES: &[&str] = &["user", "assistant", "system"];

/// Database manager for Raven (thread-safe wrapper)
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

/// A conversation with its message count
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub title: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub message_count: i64,
}

/// A single chat turn
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: i64,
    pub conversation_id: String,
    pub role: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// Database statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DbStats {
    pub conversation_count: i64,
    pub message_count: i64,
    pub user_message_count: i64,
}

fn parse_time(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn conversation_from_row(row: &Row<'_>) -> rusqlite::Result<Conversation> {
    let created: String = row.get(2)?;
    let updated: String = row.get(3)?;
    Ok(Conversation {
        id: row.get(0)?,
        title: row.get(1)?,
        created_at: parse_time(&created),
        updated_at: parse_time(&updated),
        message_count: row.get(4)?,
    })
}

impl Database {
    /// Open or create the database
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.initialize()?;
        Ok(db)
    }

    /// Open an in-memory database (for testing)
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.initialize()?;
        Ok(db)
    }

    fn lock_conn(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| RavenError::Config("Database lock poisoned".to_string()))
    }

    /// Initialize database schema
    fn initialize(&self) -> Result<()> {
        let conn = self.lock_conn()?;
        conn.execute_batch(r#"
            PRAGMA foreign_keys = ON;

            CREATE TABLE IF NOT EXISTS conversations (
                id TEXT PRIMARY KEY,
                title TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS messages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                conversation_id TEXT NOT NULL REFERENCES conversations(id) ON DELETE CASCADE,
                role TEXT NOT NULL,
                content TEXT NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_messages_conversation ON messages(conversation_id);
            CREATE INDEX IF NOT EXISTS idx_conversations_updated ON conversations(updated_at);
        "#)?;
        Ok(())
    }

    /// Create a new conversation
    pub fn create_conversation(&self, title: Option<&str>) -> Result<Conversation> {
        let conn = self.lock_conn()?;
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();
        let title = title.map(str::trim).filter(|t| !t.is_empty());

        conn.execute(
            "INSERT INTO conversations (id, title, created_at, updated_at) VALUES (?1, ?2, ?3, ?3)",
            params![id, title, now.to_rfc3339()],
        )?;

        Ok(Conversation {
            id,
            title: title.map(String::from),
            created_at: now,
            updated_at: now,
            message_count: 0,
        })
    }

    /// Most recently updated conversations first
    pub fn list_conversations(&self, limit: Option<usize>) -> Result<Vec<Conversation>> {
        let conn = self.lock_conn()?;
        let limit = limit.unwrap_or(DEFAULT_LIST_LIMIT);
        let mut stmt = conn.prepare(
            r#"SELECT c.id, c.title, c.created_at, c.updated_at, COUNT(m.id)
               FROM conversations c LEFT JOIN messages m ON m.conversation_id = c.id
               GROUP BY c.id
               ORDER BY c.updated_at DESC, c.rowid DESC
               LIMIT ?1"#,
        )?;
        let conversations = stmt
            .query_map(params![limit as i64], conversation_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(conversations)
    }

    pub fn get_conversation(&self, id: &str) -> Result<Conversation> {
        let conn = self.lock_conn()?;
        conn.query_row(
            r#"SELECT c.id, c.title, c.created_at, c.updated_at, COUNT(m.id)
               FROM conversations c LEFT JOIN messages m ON m.conversation_id = c.id
               WHERE c.id = ?1
               GROUP BY c.id"#,
            params![id],
            conversation_from_row,
        )
        .optional()?
        .ok_or_else(|| RavenError::NotFound(format!("conversation {}", id)))
    }

    /// Append a message. The first user message titles an untitled conversation.
    pub fn add_message(&self, conversation_id: &str, role: &str, content: &str) -> Result<Message> {
        if !ROLES.contains(&role) {
            return Err(RavenError::InvalidRequest(format!("unknown role '{}'", role)));
        }
        if content.trim().is_empty() {
            return Err(RavenError::InvalidRequest("message content is empty".to_string()));
        }

        let mut conn = self.lock_conn()?;
        let tx = conn.transaction()?;

        let title: Option<Option<String>> = tx
            .query_row(
                "SELECT title FROM conversations WHERE id = ?1",
                params![conversation_id],
                |row| row.get(0),
            )
            .optional()?;
        let Some(title) = title else {
            return Err(RavenError::NotFound(format!("conversation {}", conversation_id)));
        };

        let now = Utc::now();
        tx.execute(
            "INSERT INTO messages (conversation_id, role, content, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![conversation_id, role, content, now.to_rfc3339()],
        )?;
        let id = tx.last_insert_rowid();

        if title.is_none() && role == "user" {
            let title: String = content.trim().chars().take(TITLE_CHARS).collect();
            tx.execute(
                "UPDATE conversations SET title = ?1 WHERE id = ?2",
                params![title, conversation_id],
            )?;
        }
        tx.execute(
            "UPDATE conversations SET updated_at = ?1 WHERE id = ?2",
            params![now.to_rfc3339(), conversation_id],
        )?;
        tx.commit()?;

        Ok(Message {
            id,
            conversation_id: conversation_id.to_string(),
            role: role.to_string(),
            content: content.to_string(),
            created_at: now,
        })
    }

    /// Messages of a conversation, oldest first
    pub fn get_messages(&self, conversation_id: &str) -> Result<Vec<Message>> {
        let conn = self.lock_conn()?;
        let mut stmt = conn.prepare(
            r#"SELECT id, conversation_id, role, content, created_at
               FROM messages WHERE conversation_id = ?1 ORDER BY id"#,
        )?;
        let messages = stmt
            .query_map(params![conversation_id], |row| {
                let created: String = row.get(4)?;
                Ok(Message {
                    id: row.get(0)?,
                    conversation_id: row.get(1)?,
                    role: row.get(2)?,
                    content: row.get(3)?,
                    created_at: parse_time(&created),
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(messages)
    }

    /// Delete a conversation and its messages
    pub fn delete_conversation(&self, id: &str) -> Result<()> {
        let conn = self.lock_conn()?;
        conn.execute("DELETE FROM messages WHERE conversation_id = ?1", params![id])?;
        let deleted = conn.execute("DELETE FROM conversations WHERE id = ?1", params![id])?;
        if deleted == 0 {
            return Err(RavenError::NotFound(format!("conversation {}", id)));
        }
        Ok(())
    }

    /// Get database statistics
    pub fn get_stats(&self) -> Result<DbStats> {
        let conn = self.lock_conn()?;
        let conversation_count: i64 =
            conn.query_row("SELECT COUNT(*) FROM conversations", [], |row| row.get(0))?;
        let message_count: i64 = conn.query_row("SELECT COUNT(*) FROM messages", [], |row| row.get(0))?;
        let user_message_count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM messages WHERE role = 'user'",
            [],
            |row| row.get(0),
        )?;
        Ok(DbStats {
            conversation_count,
            message_count,
            user_message_count,
        })
    }

    /// Vacuum database
    pub fn vacuum(&self) -> Result<()> {
        let conn = self.lock_conn()?;
        conn.execute("VACUUM", [])?;
        Ok(())
    }
}
