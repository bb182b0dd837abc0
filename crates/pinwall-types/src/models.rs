use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Panel flavor chosen at creation. The variant fixes the capacity ceiling
/// and the default note palette for the panel's whole lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PanelVariant {
    Friends,
    Couple,
    Family,
}

impl PanelVariant {
    /// Maximum number of concurrently active users admitted to a panel of
    /// this variant.
    pub fn max_users(self) -> u32 {
        match self {
            PanelVariant::Friends => 10,
            PanelVariant::Couple => 2,
            PanelVariant::Family => 8,
        }
    }

    /// Default sticky-note colors offered for this variant.
    pub fn palette(self) -> &'static [&'static str] {
        match self {
            PanelVariant::Friends => &["#ffd966", "#93c47d", "#6fa8dc", "#e06666"],
            PanelVariant::Couple => &["#f4b6c2", "#b4a7d6"],
            PanelVariant::Family => &["#ffe599", "#b6d7a8", "#9fc5e8", "#d5a6bd"],
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PanelVariant::Friends => "friends",
            PanelVariant::Couple => "couple",
            PanelVariant::Family => "family",
        }
    }
}

impl FromStr for PanelVariant {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "friends" => Ok(PanelVariant::Friends),
            "couple" => Ok(PanelVariant::Couple),
            "family" => Ok(PanelVariant::Family),
            other => Err(UnknownVariant(other.to_string())),
        }
    }
}

#[derive(Debug)]
pub struct UnknownVariant(pub String);

impl fmt::Display for UnknownVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown panel variant: {}", self.0)
    }
}

impl std::error::Error for UnknownVariant {}

/// Full panel state as loaded from the store, password hash included.
/// This is the shape held by the read-through cache; API responses go
/// through `PanelView`, which strips the hash.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PanelRecord {
    pub code: String,
    pub name: String,
    pub variant: PanelVariant,
    pub password_hash: Option<String>,
    pub owner_id: Uuid,
    pub max_users: u32,
    pub post_count: u32,
    pub active_users: u32,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

impl PanelRecord {
    pub fn requires_password(&self) -> bool {
        self.password_hash.is_some()
    }
}

/// A sticky note pinned to a panel. `author_id` survives the author leaving
/// the panel; notes only disappear with the panel itself or by explicit
/// deletion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NoteRecord {
    pub id: Uuid,
    pub panel_code: String,
    pub author_id: Uuid,
    pub content: String,
    pub x: f64,
    pub y: f64,
    pub color: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Permanent membership row. Created on first successful join and kept until
/// the user explicitly leaves.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Participant {
    pub panel_code: String,
    pub user_id: Uuid,
    pub display_name: String,
    pub joined_at: DateTime<Utc>,
    pub last_access: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn variant_capacity_ceilings() {
        assert_eq!(PanelVariant::Couple.max_users(), 2);
        assert_eq!(PanelVariant::Family.max_users(), 8);
        assert_eq!(PanelVariant::Friends.max_users(), 10);
    }

    #[test]
    fn variant_round_trips_through_str() {
        for v in [
            PanelVariant::Friends,
            PanelVariant::Couple,
            PanelVariant::Family,
        ] {
            assert_eq!(v.as_str().parse::<PanelVariant>().unwrap(), v);
        }
        assert!("house".parse::<PanelVariant>().is_err());
    }

    #[test]
    fn variant_serde_uses_lowercase() {
        let json = serde_json::to_string(&PanelVariant::Couple).unwrap();
        assert_eq!(json, "\"couple\"");
        let parsed: PanelVariant = serde_json::from_str("\"family\"").unwrap();
        assert_eq!(parsed, PanelVariant::Family);
    }

    #[test]
    fn every_variant_has_a_palette() {
        for v in [
            PanelVariant::Friends,
            PanelVariant::Couple,
            PanelVariant::Family,
        ] {
            assert!(!v.palette().is_empty());
        }
    }
}
