use anyhow::Result;
use rusqlite::{Connection, TransactionBehavior};

use crate::models::PanelListRow;
use crate::{Database, OptionalExt, panels};

/// Result of a join attempt, decided entirely inside one transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmitOutcome {
    Admitted { newly_joined: bool },
    Full,
    PanelMissing,
}

/// Result of a leave. A missing panel is reported as `NotMember` on purpose:
/// leaving must not reveal whether a code ever existed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaveOutcome {
    Left { panel_deleted: bool },
    NotMember,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TouchOutcome {
    Touched,
    NotMember,
    PanelMissing,
}

/// Admit a user to a panel: capacity check, participant upsert and the first
/// presence beat as one transaction. Admission writes the session row itself,
/// so a seat is held from the moment a join lands, not from the first
/// heartbeat. Returning members and users with a live session are always
/// admitted; only genuinely new arrivals count against the ceiling.
pub fn admit_participant(
    db: &Database,
    code: &str,
    user_id: &str,
    display_name: &str,
    stale_minutes: u32,
) -> Result<AdmitOutcome> {
    db.with_conn_mut(|conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let max_users: Option<u32> = tx
            .query_row("SELECT max_users FROM panels WHERE code = ?1", [code], |row| {
                row.get(0)
            })
            .optional()?;
        let max_users = match max_users {
            Some(m) => m,
            None => return Ok(AdmitOutcome::PanelMissing),
        };

        let already_member: u32 = tx.query_row(
            "SELECT COUNT(*) FROM panel_participants WHERE panel_code = ?1 AND user_id = ?2",
            [code, user_id],
            |row| row.get(0),
        )?;

        if already_member == 0 {
            let has_live_session: u32 = tx.query_row(
                "SELECT COUNT(*) FROM active_sessions
                 WHERE panel_code = ?1 AND user_id = ?2
                   AND last_seen > datetime('now', '-' || ?3 || ' minutes')",
                rusqlite::params![code, user_id, stale_minutes],
                |row| row.get(0),
            )?;

            if has_live_session == 0 {
                let active: u32 = tx.query_row(
                    "SELECT COUNT(*) FROM active_sessions
                     WHERE panel_code = ?1
                       AND last_seen > datetime('now', '-' || ?2 || ' minutes')",
                    rusqlite::params![code, stale_minutes],
                    |row| row.get(0),
                )?;
                if active >= max_users {
                    return Ok(AdmitOutcome::Full);
                }
            }
        }

        tx.execute(
            "INSERT INTO panel_participants (panel_code, user_id, display_name)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(panel_code, user_id)
             DO UPDATE SET last_access = datetime('now'), display_name = excluded.display_name",
            rusqlite::params![code, user_id, display_name],
        )?;
        upsert_session(&tx, code, user_id, display_name)?;
        panels::touch_activity(&tx, code)?;
        tx.commit()?;

        Ok(AdmitOutcome::Admitted {
            newly_joined: already_member == 0,
        })
    })
}

/// Remove a user from a panel. When the roster empties, the panel and
/// everything attached to it are deleted in the same transaction; a panel
/// with no participants must never survive.
pub fn leave_panel(db: &Database, code: &str, user_id: &str) -> Result<LeaveOutcome> {
    db.with_conn_mut(|conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let removed = tx.execute(
            "DELETE FROM panel_participants WHERE panel_code = ?1 AND user_id = ?2",
            [code, user_id],
        )?;
        if removed == 0 {
            return Ok(LeaveOutcome::NotMember);
        }

        tx.execute(
            "DELETE FROM active_sessions WHERE panel_code = ?1 AND user_id = ?2",
            [code, user_id],
        )?;

        let remaining: u32 = tx.query_row(
            "SELECT COUNT(*) FROM panel_participants WHERE panel_code = ?1",
            [code],
            |row| row.get(0),
        )?;
        if remaining > 0 {
            tx.commit()?;
            return Ok(LeaveOutcome::Left {
                panel_deleted: false,
            });
        }

        tx.execute("DELETE FROM notes WHERE panel_code = ?1", [code])?;
        tx.execute("DELETE FROM active_sessions WHERE panel_code = ?1", [code])?;
        tx.execute("DELETE FROM panels WHERE code = ?1", [code])?;
        tx.commit()?;

        Ok(LeaveOutcome::Left {
            panel_deleted: true,
        })
    })
}

/// Write or refresh one user's presence row on one panel. Admission and
/// heartbeats both land here; `last_seen` moves forward on every call.
pub(crate) fn upsert_session(
    conn: &Connection,
    code: &str,
    user_id: &str,
    display_name: &str,
) -> Result<()> {
    conn.execute(
        "INSERT INTO active_sessions (panel_code, user_id, display_name)
         VALUES (?1, ?2, ?3)
         ON CONFLICT(panel_code, user_id)
         DO UPDATE SET last_seen = datetime('now')",
        rusqlite::params![code, user_id, display_name],
    )?;
    Ok(())
}

/// Refresh the caller's presence session. Admission seeds the row; heartbeats
/// keep it inside the presence window afterwards. Only members may beat, so a
/// session row always has a matching participant row.
pub fn touch_session(
    db: &Database,
    code: &str,
    user_id: &str,
    display_name: &str,
) -> Result<TouchOutcome> {
    db.with_conn_mut(|conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        if !panels::code_exists(&tx, code)? {
            return Ok(TouchOutcome::PanelMissing);
        }

        let member: u32 = tx.query_row(
            "SELECT COUNT(*) FROM panel_participants WHERE panel_code = ?1 AND user_id = ?2",
            [code, user_id],
            |row| row.get(0),
        )?;
        if member == 0 {
            return Ok(TouchOutcome::NotMember);
        }

        upsert_session(&tx, code, user_id, display_name)?;
        tx.commit()?;

        Ok(TouchOutcome::Touched)
    })
}

/// Mark the panel read for this user by advancing `last_access`. Runs on the
/// note-listing path, so it must work without a transaction.
pub fn touch_read(db: &Database, code: &str, user_id: &str) -> Result<TouchOutcome> {
    db.with_conn(|conn| {
        if !panels::code_exists(conn, code)? {
            return Ok(TouchOutcome::PanelMissing);
        }

        let updated = conn.execute(
            "UPDATE panel_participants SET last_access = datetime('now')
             WHERE panel_code = ?1 AND user_id = ?2",
            [code, user_id],
        )?;
        if updated == 0 {
            return Ok(TouchOutcome::NotMember);
        }

        Ok(TouchOutcome::Touched)
    })
}

pub fn is_participant(conn: &Connection, code: &str, user_id: &str) -> Result<bool> {
    let count: u32 = conn.query_row(
        "SELECT COUNT(*) FROM panel_participants WHERE panel_code = ?1 AND user_id = ?2",
        [code, user_id],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

/// Drop sessions outside the presence window. They already stopped counting
/// toward capacity; this just keeps the table from growing without bound.
pub fn sweep_sessions(db: &Database, stale_minutes: u32) -> Result<usize> {
    db.with_conn(|conn| {
        let removed = conn.execute(
            "DELETE FROM active_sessions
             WHERE last_seen <= datetime('now', '-' || ?1 || ' minutes')",
            [stale_minutes],
        )?;
        Ok(removed)
    })
}

/// Panels this user belongs to, most recently active first, with per-panel
/// unread counts (notes authored by others since the user's last read).
pub fn list_panels_for_user(
    db: &Database,
    user_id: &str,
    stale_minutes: u32,
) -> Result<Vec<PanelListRow>> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT p.code, p.name, p.variant, p.last_activity,
                    (SELECT COUNT(*) FROM active_sessions s
                      WHERE s.panel_code = p.code
                        AND s.last_seen > datetime('now', '-' || ?2 || ' minutes')) AS active_users,
                    (SELECT COUNT(*) FROM notes n
                      WHERE n.panel_code = p.code
                        AND n.author_id != pp.user_id
                        AND n.created_at > pp.last_access) AS unread_count
             FROM panels p
             JOIN panel_participants pp ON pp.panel_code = p.code
             WHERE pp.user_id = ?1
             ORDER BY p.last_activity DESC",
        )?;

        let rows = stmt
            .query_map(rusqlite::params![user_id, stale_minutes], |row| {
                Ok(PanelListRow {
                    code: row.get(0)?,
                    name: row.get(1)?,
                    variant: row.get(2)?,
                    last_activity: row.get(3)?,
                    active_users: row.get(4)?,
                    unread_count: row.get(5)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(rows)
    })
}
