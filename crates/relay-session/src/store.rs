use std::collections::HashSet;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use tracing::{debug, instrument};

use crate::error::{Result, SessionError};
use crate::message::{ChatMessage, MessageRole};
use crate::session::ChatSession;

/// Thread-safe SQLite-backed store for persistent sessions.
///
/// Wraps a single connection in a `Mutex` — the store's own write lock
/// serializes concurrent mutation of the same session, so the delete-then-
/// insert message sync below is safe under concurrent `save` calls.
pub struct SessionStore {
    db: Mutex<Connection>,
}

impl SessionStore {
    pub fn new(conn: Connection) -> Self {
        Self { db: Mutex::new(conn) }
    }

    /// Persist `session`'s metadata and message set.
    ///
    /// Message sync recomputes the ids in memory vs. the ids already in
    /// storage for `(owner_id, name)`: rows not in memory are deleted, rows
    /// not in storage are inserted. Idempotent under retry.
    #[instrument(skip(self, session), fields(owner_id = session.owner_id(), name = session.name()))]
    pub fn save(&self, session: &ChatSession) -> Result<()> {
        let db = self.db.lock().unwrap();

        db.execute(
            "INSERT INTO sessions (owner_id, name, model, system_prompt)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(owner_id, name) DO UPDATE SET
                model = excluded.model,
                system_prompt = excluded.system_prompt",
            rusqlite::params![
                session.owner_id(),
                session.name(),
                session.model(),
                session.system_prompt()
            ],
        )?;

        let in_memory: HashSet<i64> = session.messages().iter().map(|m| m.id).collect();

        let stored: HashSet<i64> = {
            let mut stmt = db.prepare(
                "SELECT id FROM messages WHERE owner_id = ?1 AND session_name = ?2",
            )?;
            let ids = stmt.query_map(
                rusqlite::params![session.owner_id(), session.name()],
                |row| row.get::<_, i64>(0),
            )?;
            ids.filter_map(|r| r.ok()).collect()
        };

        for stale_id in stored.difference(&in_memory) {
            db.execute(
                "DELETE FROM messages WHERE owner_id = ?1 AND session_name = ?2 AND id = ?3",
                rusqlite::params![session.owner_id(), session.name(), stale_id],
            )?;
        }

        for message in session.messages() {
            if stored.contains(&message.id) {
                continue;
            }
            db.execute(
                "INSERT INTO messages
                    (id, owner_id, sender_id, sender_nickname, session_name, timestamp, role, content)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                rusqlite::params![
                    message.id,
                    message.owner_id,
                    message.sender_id,
                    message.sender_nickname,
                    message.session_name,
                    message.timestamp.to_rfc3339(),
                    message.role.as_str(),
                    message.content,
                ],
            )?;
        }

        debug!(messages = in_memory.len(), "session saved");
        Ok(())
    }

    /// Load a session fully — reads never page.
    #[instrument(skip(self))]
    pub fn load(&self, owner_id: i64, name: &str) -> Result<Option<ChatSession>> {
        let db = self.db.lock().unwrap();

        let row: Option<(String, String)> = match db.query_row(
            "SELECT model, system_prompt FROM sessions WHERE owner_id = ?1 AND name = ?2",
            rusqlite::params![owner_id, name],
            |row| Ok((row.get(0)?, row.get(1)?)),
        ) {
            Ok(row) => Some(row),
            Err(rusqlite::Error::QueryReturnedNoRows) => None,
            Err(e) => return Err(SessionError::Database(e)),
        };

        let Some((model, system_prompt)) = row else {
            return Ok(None);
        };

        let mut session = ChatSession::new(owner_id, name, model);

        let mut stmt = db.prepare(
            "SELECT id, owner_id, sender_id, sender_nickname, session_name, timestamp, role, content
             FROM messages WHERE owner_id = ?1 AND session_name = ?2",
        )?;
        let rows = stmt.query_map(rusqlite::params![owner_id, name], row_to_message)?;
        for row in rows {
            session.add_message(row?);
        }

        // A persisted session with a prompt already has its synthetic system
        // message among the rows just loaded; re-deriving it via
        // set_system_prompt would duplicate it. When no synthetic message
        // made it into storage (prompt set directly via config after the
        // session was first saved), fall back to inserting it now.
        if session.messages().iter().any(|m| m.role == MessageRole::System) {
            session.set_system_prompt_field(system_prompt);
        } else if !system_prompt.is_empty() {
            session.set_system_prompt(system_prompt);
        }

        Ok(Some(session))
    }

    /// Delete a session's row, its messages, and its active-session pointer
    /// if it was active.
    #[instrument(skip(self))]
    pub fn delete(&self, owner_id: i64, name: &str) -> Result<()> {
        let db = self.db.lock().unwrap();
        let rows_changed = db.execute(
            "DELETE FROM sessions WHERE owner_id = ?1 AND name = ?2",
            rusqlite::params![owner_id, name],
        )?;
        if rows_changed == 0 {
            return Err(SessionError::NotFound {
                owner_id,
                name: name.to_string(),
            });
        }
        db.execute(
            "DELETE FROM messages WHERE owner_id = ?1 AND session_name = ?2",
            rusqlite::params![owner_id, name],
        )?;
        db.execute(
            "DELETE FROM active_sessions WHERE owner_id = ?1 AND session_name = ?2",
            rusqlite::params![owner_id, name],
        )?;
        Ok(())
    }

    /// Mark `name` as the sole active session for `owner_id` (delete-then-
    /// insert, so at most one row per owner at all times).
    #[instrument(skip(self))]
    pub fn mark_as_active(&self, owner_id: i64, name: &str) -> Result<()> {
        let db = self.db.lock().unwrap();
        db.execute(
            "DELETE FROM active_sessions WHERE owner_id = ?1",
            rusqlite::params![owner_id],
        )?;
        db.execute(
            "INSERT INTO active_sessions (owner_id, session_name) VALUES (?1, ?2)",
            rusqlite::params![owner_id, name],
        )?;
        Ok(())
    }

    /// Clear the active-session pointer for `owner_id`, if any.
    pub fn disable_active_session(&self, owner_id: i64) -> Result<()> {
        let db = self.db.lock().unwrap();
        db.execute(
            "DELETE FROM active_sessions WHERE owner_id = ?1",
            rusqlite::params![owner_id],
        )?;
        Ok(())
    }

    /// The currently active session name for `owner_id`, if any.
    pub fn get_active_session(&self, owner_id: i64) -> Result<Option<String>> {
        let db = self.db.lock().unwrap();
        match db.query_row(
            "SELECT session_name FROM active_sessions WHERE owner_id = ?1",
            rusqlite::params![owner_id],
            |row| row.get::<_, String>(0),
        ) {
            Ok(name) => Ok(Some(name)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(SessionError::Database(e)),
        }
    }

    /// All session names owned by `owner_id`.
    pub fn list_user_sessions(&self, owner_id: i64) -> Result<Vec<String>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare("SELECT name FROM sessions WHERE owner_id = ?1")?;
        let rows = stmt.query_map(rusqlite::params![owner_id], |row| row.get::<_, String>(0))?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }
}

fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<ChatMessage> {
    let role_str: String = row.get(6)?;
    let role: MessageRole = role_str.parse().unwrap_or(MessageRole::User);
    let timestamp_str: String = row.get(5)?;
    let timestamp: DateTime<Utc> = timestamp_str
        .parse::<DateTime<Utc>>()
        .unwrap_or_else(|_| Utc::now());

    Ok(ChatMessage {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        sender_id: row.get(2)?,
        sender_nickname: row.get(3)?,
        session_name: row.get(4)?,
        timestamp,
        role,
        content: row.get(7)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_db;
    use crate::message::ChatMessage;

    fn store() -> SessionStore {
        let conn = Connection::open_in_memory().unwrap();
        init_db(&conn).unwrap();
        SessionStore::new(conn)
    }

    #[test]
    fn save_then_load_roundtrips_messages_and_metadata() {
        let store = store();
        let mut session = ChatSession::new(1, "main", "qwen3");
        session.set_system_prompt("be helpful");
        session.add_message(ChatMessage {
            id: 10,
            owner_id: 1,
            sender_id: 2,
            sender_nickname: "alice".into(),
            session_name: "main".into(),
            timestamp: Utc::now(),
            role: MessageRole::User,
            content: "hi".into(),
        });
        store.save(&session).unwrap();

        let loaded = store.load(1, "main").unwrap().unwrap();
        assert_eq!(loaded.model(), "qwen3");
        assert_eq!(loaded.system_prompt(), "be helpful");
        assert_eq!(loaded.messages().len(), 2); // synthetic system + user turn
    }

    #[test]
    fn reloaded_system_prompt_survives_a_second_save() {
        // Regression: load() used to leave `system_prompt` at "" whenever the
        // synthetic system message was already present among the loaded
        // rows, so a save() right after a load() would wipe the stored
        // prompt on the next turn.
        let store = store();
        let mut session = ChatSession::new(1, "main", "qwen3");
        session.set_system_prompt("be helpful");
        store.save(&session).unwrap();

        let loaded = store.load(1, "main").unwrap().unwrap();
        store.save(&loaded).unwrap();

        let reloaded = store.load(1, "main").unwrap().unwrap();
        assert_eq!(reloaded.system_prompt(), "be helpful");
    }

    #[test]
    fn save_removes_messages_no_longer_in_memory() {
        let store = store();
        let mut session = ChatSession::new(1, "main", "qwen3");
        let msg = ChatMessage {
            id: 1,
            owner_id: 1,
            sender_id: 2,
            sender_nickname: "alice".into(),
            session_name: "main".into(),
            timestamp: Utc::now(),
            role: MessageRole::User,
            content: "hi".into(),
        };
        session.add_message(msg);
        store.save(&session).unwrap();

        let session2 = ChatSession::new(1, "main", "qwen3");
        store.save(&session2).unwrap();

        let loaded = store.load(1, "main").unwrap().unwrap();
        assert!(loaded.messages().is_empty());
    }

    #[test]
    fn mark_as_active_is_single_row_per_owner() {
        let store = store();
        store
            .save(&ChatSession::new(1, "a", "qwen3"))
            .unwrap();
        store
            .save(&ChatSession::new(1, "b", "qwen3"))
            .unwrap();
        store.mark_as_active(1, "a").unwrap();
        store.mark_as_active(1, "b").unwrap();
        assert_eq!(store.get_active_session(1).unwrap().as_deref(), Some("b"));
    }

    #[test]
    fn delete_cascades_messages_and_active_pointer() {
        let store = store();
        store.save(&ChatSession::new(1, "main", "qwen3")).unwrap();
        store.mark_as_active(1, "main").unwrap();
        store.delete(1, "main").unwrap();
        assert!(store.load(1, "main").unwrap().is_none());
        assert!(store.get_active_session(1).unwrap().is_none());
    }
}
