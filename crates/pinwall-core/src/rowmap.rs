//! Raw SQLite rows to typed records. SQLite hands back strings; anything
//! that fails to parse is logged and replaced with a default rather than
//! failing the whole read.

use chrono::{DateTime, NaiveDateTime, Utc};
use tracing::warn;
use uuid::Uuid;

use pinwall_db::models::{NoteRow, PanelListRow, PanelRow};
use pinwall_types::api::PanelSummary;
use pinwall_types::models::{NoteRecord, PanelRecord, PanelVariant};

pub(crate) fn parse_time(value: &str, field: &str, id: &str) -> DateTime<Utc> {
    value
        .parse::<DateTime<Utc>>()
        .or_else(|_| {
            // SQLite stores timestamps as "YYYY-MM-DD HH:MM:SS" without
            // timezone. Parse as naive UTC and convert.
            NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
        .unwrap_or_else(|e| {
            warn!("Corrupt {} '{}' on '{}': {}", field, value, id, e);
            DateTime::default()
        })
}

pub(crate) fn parse_uuid(value: &str, field: &str, id: &str) -> Uuid {
    value.parse().unwrap_or_else(|e| {
        warn!("Corrupt {} '{}' on '{}': {}", field, value, id, e);
        Uuid::default()
    })
}

fn parse_variant(value: &str, code: &str) -> PanelVariant {
    value.parse().unwrap_or_else(|e| {
        // The stored max_users still applies, so only palette/labeling drift.
        warn!("Corrupt variant on panel '{}': {}", code, e);
        PanelVariant::Friends
    })
}

pub(crate) fn panel_record(row: PanelRow) -> PanelRecord {
    PanelRecord {
        variant: parse_variant(&row.variant, &row.code),
        owner_id: parse_uuid(&row.owner_id, "owner_id", &row.code),
        created_at: parse_time(&row.created_at, "created_at", &row.code),
        last_activity: parse_time(&row.last_activity, "last_activity", &row.code),
        code: row.code,
        name: row.name,
        password_hash: row.password_hash,
        max_users: row.max_users,
        post_count: row.post_count,
        active_users: row.active_users,
    }
}

pub(crate) fn note_record(row: NoteRow) -> NoteRecord {
    NoteRecord {
        id: parse_uuid(&row.id, "id", &row.id),
        author_id: parse_uuid(&row.author_id, "author_id", &row.id),
        created_at: parse_time(&row.created_at, "created_at", &row.id),
        updated_at: parse_time(&row.updated_at, "updated_at", &row.id),
        panel_code: row.panel_code,
        content: row.content,
        x: row.x,
        y: row.y,
        color: row.color,
    }
}

pub(crate) fn panel_summary(row: PanelListRow) -> PanelSummary {
    PanelSummary {
        variant: parse_variant(&row.variant, &row.code),
        last_activity: parse_time(&row.last_activity, "last_activity", &row.code),
        code: row.code,
        name: row.name,
        active_users: row.active_users,
        unread_count: row.unread_count,
    }
}
