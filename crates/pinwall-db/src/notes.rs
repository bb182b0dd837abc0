use anyhow::Result;
use rusqlite::{Connection, TransactionBehavior};

use crate::models::NoteRow;
use crate::{Database, OptionalExt, membership, panels};

/// Result of a note write. Every variant except `Done` leaves the database
/// untouched.
pub enum NoteOutcome {
    Done(NoteRow),
    PanelMissing,
    NotMember,
    NoteMissing,
}

pub fn insert_note(
    db: &Database,
    code: &str,
    note_id: &str,
    author_id: &str,
    content: &str,
    x: f64,
    y: f64,
    color: &str,
) -> Result<NoteOutcome> {
    db.with_conn_mut(|conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        if !panels::code_exists(&tx, code)? {
            return Ok(NoteOutcome::PanelMissing);
        }
        if !membership::is_participant(&tx, code, author_id)? {
            return Ok(NoteOutcome::NotMember);
        }

        tx.execute(
            "INSERT INTO notes (id, panel_code, author_id, content, x, y, color)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            rusqlite::params![note_id, code, author_id, content, x, y, color],
        )?;
        panels::touch_activity(&tx, code)?;

        let row = query_note(&tx, code, note_id)?
            .ok_or_else(|| anyhow::anyhow!("note vanished inside its own transaction"))?;
        tx.commit()?;

        Ok(NoteOutcome::Done(row))
    })
}

pub fn move_note(
    db: &Database,
    code: &str,
    note_id: &str,
    user_id: &str,
    x: f64,
    y: f64,
) -> Result<NoteOutcome> {
    db.with_conn_mut(|conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        if !panels::code_exists(&tx, code)? {
            return Ok(NoteOutcome::PanelMissing);
        }
        if !membership::is_participant(&tx, code, user_id)? {
            return Ok(NoteOutcome::NotMember);
        }

        let updated = tx.execute(
            "UPDATE notes SET x = ?3, y = ?4, updated_at = datetime('now')
             WHERE id = ?1 AND panel_code = ?2",
            rusqlite::params![note_id, code, x, y],
        )?;
        if updated == 0 {
            return Ok(NoteOutcome::NoteMissing);
        }
        panels::touch_activity(&tx, code)?;

        let row = query_note(&tx, code, note_id)?
            .ok_or_else(|| anyhow::anyhow!("note vanished inside its own transaction"))?;
        tx.commit()?;

        Ok(NoteOutcome::Done(row))
    })
}

pub fn delete_note(db: &Database, code: &str, note_id: &str, user_id: &str) -> Result<NoteOutcome> {
    db.with_conn_mut(|conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        if !panels::code_exists(&tx, code)? {
            return Ok(NoteOutcome::PanelMissing);
        }
        if !membership::is_participant(&tx, code, user_id)? {
            return Ok(NoteOutcome::NotMember);
        }

        let row = match query_note(&tx, code, note_id)? {
            Some(row) => row,
            None => return Ok(NoteOutcome::NoteMissing),
        };

        tx.execute(
            "DELETE FROM notes WHERE id = ?1 AND panel_code = ?2",
            [note_id, code],
        )?;
        panels::touch_activity(&tx, code)?;
        tx.commit()?;

        Ok(NoteOutcome::Done(row))
    })
}

/// All notes on a panel in pin order. Callers are expected to have already
/// checked panel existence and membership. The rowid tiebreak keeps
/// same-second pins in insertion order.
pub fn list_notes(conn: &Connection, code: &str) -> Result<Vec<NoteRow>> {
    let mut stmt = conn.prepare(
        "SELECT id, panel_code, author_id, content, x, y, color, created_at, updated_at
         FROM notes
         WHERE panel_code = ?1
         ORDER BY created_at, rowid",
    )?;

    let rows = stmt
        .query_map([code], |row| {
            Ok(NoteRow {
                id: row.get(0)?,
                panel_code: row.get(1)?,
                author_id: row.get(2)?,
                content: row.get(3)?,
                x: row.get(4)?,
                y: row.get(5)?,
                color: row.get(6)?,
                created_at: row.get(7)?,
                updated_at: row.get(8)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows)
}

fn query_note(conn: &Connection, code: &str, note_id: &str) -> Result<Option<NoteRow>> {
    let mut stmt = conn.prepare(
        "SELECT id, panel_code, author_id, content, x, y, color, created_at, updated_at
         FROM notes
         WHERE id = ?1 AND panel_code = ?2",
    )?;

    let row = stmt
        .query_row([note_id, code], |row| {
            Ok(NoteRow {
                id: row.get(0)?,
                panel_code: row.get(1)?,
                author_id: row.get(2)?,
                content: row.get(3)?,
                x: row.get(4)?,
                y: row.get(5)?,
                color: row.get(6)?,
                created_at: row.get(7)?,
                updated_at: row.get(8)?,
            })
        })
        .optional()?;

    Ok(row)
}
