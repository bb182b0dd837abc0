use anyhow::Result;
use rusqlite::{Connection, TransactionBehavior};

use crate::models::PanelRow;
use crate::{Database, OptionalExt, membership};

impl Database {
    /// Load a panel with its derived counters. `stale_minutes` bounds the
    /// presence window used for the active-user count.
    pub fn get_panel(&self, code: &str, stale_minutes: u32) -> Result<Option<PanelRow>> {
        self.with_conn(|conn| query_panel(conn, code, stale_minutes))
    }
}

/// Create a panel and seat its owner as the first participant, present from
/// the start, all in one transaction. `alloc_code` picks an unused code
/// against the same transaction, so the uniqueness check and the insert
/// cannot be split by a concurrent creation.
pub fn create_panel<F>(
    db: &Database,
    name: &str,
    variant: &str,
    password_hash: Option<&str>,
    owner_id: &str,
    owner_name: &str,
    max_users: u32,
    stale_minutes: u32,
    alloc_code: F,
) -> Result<PanelRow>
where
    F: FnOnce(&Connection) -> Result<String>,
{
    db.with_conn_mut(|conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let code = alloc_code(&tx)?;
        insert_panel(&tx, &code, name, variant, password_hash, owner_id, max_users)?;
        tx.execute(
            "INSERT INTO panel_participants (panel_code, user_id, display_name)
             VALUES (?1, ?2, ?3)",
            rusqlite::params![code, owner_id, owner_name],
        )?;
        // The owner occupies a seat immediately; capacity counts live sessions.
        membership::upsert_session(&tx, &code, owner_id, owner_name)?;

        let row = query_panel(&tx, &code, stale_minutes)?
            .ok_or_else(|| anyhow::anyhow!("panel vanished inside its own transaction"))?;
        tx.commit()?;
        Ok(row)
    })
}

/// True if a panel row already claims this code. Must be answered against
/// the durable store, never the cache: code allocation depends on it.
pub fn code_exists(conn: &Connection, code: &str) -> Result<bool> {
    let count: u32 = conn.query_row(
        "SELECT COUNT(*) FROM panels WHERE code = ?1",
        [code],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

pub fn insert_panel(
    conn: &Connection,
    code: &str,
    name: &str,
    variant: &str,
    password_hash: Option<&str>,
    owner_id: &str,
    max_users: u32,
) -> Result<()> {
    conn.execute(
        "INSERT INTO panels (code, name, variant, password_hash, owner_id, max_users)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        rusqlite::params![code, name, variant, password_hash, owner_id, max_users],
    )?;
    Ok(())
}

/// Bump `last_activity`. Called inside the same transaction as the content
/// write it reflects.
pub fn touch_activity(conn: &Connection, code: &str) -> Result<()> {
    conn.execute(
        "UPDATE panels SET last_activity = datetime('now') WHERE code = ?1",
        [code],
    )?;
    Ok(())
}

pub fn query_panel(conn: &Connection, code: &str, stale_minutes: u32) -> Result<Option<PanelRow>> {
    let mut stmt = conn.prepare(
        "SELECT p.code, p.name, p.variant, p.password_hash, p.owner_id, p.max_users,
                p.created_at, p.last_activity,
                (SELECT COUNT(*) FROM notes n WHERE n.panel_code = p.code) AS post_count,
                (SELECT COUNT(*) FROM active_sessions s
                  WHERE s.panel_code = p.code
                    AND s.last_seen > datetime('now', '-' || ?2 || ' minutes')) AS active_users
         FROM panels p
         WHERE p.code = ?1",
    )?;

    let row = stmt
        .query_row(rusqlite::params![code, stale_minutes], |row| {
            Ok(PanelRow {
                code: row.get(0)?,
                name: row.get(1)?,
                variant: row.get(2)?,
                password_hash: row.get(3)?,
                owner_id: row.get(4)?,
                max_users: row.get(5)?,
                created_at: row.get(6)?,
                last_activity: row.get(7)?,
                post_count: row.get(8)?,
                active_users: row.get(9)?,
            })
        })
        .optional()?;

    Ok(row)
}
