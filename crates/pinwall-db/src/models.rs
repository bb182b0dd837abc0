/// Database row types, mapped one-to-one from SQLite rows.
/// Kept as raw strings so the DB layer stays independent of the typed
/// domain models; parsing happens in pinwall-core with per-field
/// corruption warnings.

pub struct UserRow {
    pub id: String,
    pub username: String,
    pub password: String,
    pub created_at: String,
}

pub struct PanelRow {
    pub code: String,
    pub name: String,
    pub variant: String,
    pub password_hash: Option<String>,
    pub owner_id: String,
    pub max_users: u32,
    pub post_count: u32,
    pub active_users: u32,
    pub created_at: String,
    pub last_activity: String,
}

pub struct NoteRow {
    pub id: String,
    pub panel_code: String,
    pub author_id: String,
    pub content: String,
    pub x: f64,
    pub y: f64,
    pub color: String,
    pub created_at: String,
    pub updated_at: String,
}

/// One row of the "panels for user" listing, counters precomputed in SQL.
pub struct PanelListRow {
    pub code: String,
    pub name: String,
    pub variant: String,
    pub active_users: u32,
    pub unread_count: u32,
    pub last_activity: String,
}
