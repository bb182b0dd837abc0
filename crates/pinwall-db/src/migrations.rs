use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            id          TEXT PRIMARY KEY,
            username    TEXT NOT NULL UNIQUE,
            password    TEXT NOT NULL,
            created_at  TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS panels (
            code           TEXT PRIMARY KEY,
            name           TEXT NOT NULL,
            variant        TEXT NOT NULL,
            password_hash  TEXT,
            owner_id       TEXT NOT NULL REFERENCES users(id),
            max_users      INTEGER NOT NULL,
            created_at     TEXT NOT NULL DEFAULT (datetime('now')),
            last_activity  TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS panel_participants (
            panel_code    TEXT NOT NULL REFERENCES panels(code),
            user_id       TEXT NOT NULL REFERENCES users(id),
            display_name  TEXT NOT NULL,
            joined_at     TEXT NOT NULL DEFAULT (datetime('now')),
            last_access   TEXT NOT NULL DEFAULT (datetime('now')),
            UNIQUE(panel_code, user_id)
        );

        CREATE INDEX IF NOT EXISTS idx_participants_user
            ON panel_participants(user_id);

        CREATE TABLE IF NOT EXISTS active_sessions (
            panel_code    TEXT NOT NULL REFERENCES panels(code),
            user_id       TEXT NOT NULL REFERENCES users(id),
            display_name  TEXT NOT NULL,
            joined_at     TEXT NOT NULL DEFAULT (datetime('now')),
            last_seen     TEXT NOT NULL DEFAULT (datetime('now')),
            UNIQUE(panel_code, user_id)
        );

        CREATE INDEX IF NOT EXISTS idx_sessions_seen
            ON active_sessions(panel_code, last_seen);

        CREATE TABLE IF NOT EXISTS notes (
            id          TEXT PRIMARY KEY,
            panel_code  TEXT NOT NULL REFERENCES panels(code),
            author_id   TEXT NOT NULL,
            content     TEXT NOT NULL,
            x           REAL NOT NULL,
            y           REAL NOT NULL,
            color       TEXT NOT NULL,
            created_at  TEXT NOT NULL DEFAULT (datetime('now')),
            updated_at  TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE INDEX IF NOT EXISTS idx_notes_panel
            ON notes(panel_code, created_at);
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
