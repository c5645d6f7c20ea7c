use rusqlite::Connection;

use crate::error::Result;

/// Initialise the sessions/messages/active_sessions tables. Safe to call on
/// every startup — uses `IF NOT EXISTS` throughout.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS sessions (
            owner_id      INTEGER NOT NULL,
            name          TEXT NOT NULL,
            model         TEXT NOT NULL,
            system_prompt TEXT NOT NULL DEFAULT '',
            PRIMARY KEY (owner_id, name)
        );
        CREATE TABLE IF NOT EXISTS messages (
            id              INTEGER NOT NULL,
            owner_id        INTEGER NOT NULL,
            sender_id       INTEGER NOT NULL,
            sender_nickname TEXT NOT NULL,
            session_name    TEXT NOT NULL,
            timestamp       TEXT NOT NULL,
            role            TEXT NOT NULL,
            content         TEXT NOT NULL,
            PRIMARY KEY (id, owner_id, session_name),
            FOREIGN KEY (owner_id, session_name) REFERENCES sessions(owner_id, name)
        );
        CREATE INDEX IF NOT EXISTS idx_messages_session
            ON messages(owner_id, session_name);
        CREATE TABLE IF NOT EXISTS active_sessions (
            owner_id     INTEGER NOT NULL,
            session_name TEXT NOT NULL,
            UNIQUE (owner_id, session_name)
        );
        CREATE UNIQUE INDEX IF NOT EXISTS idx_active_sessions_owner
            ON active_sessions(owner_id);",
    )?;
    Ok(())
}
