use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::warn;
use uuid::Uuid;

use pinwall_db::{Database, membership::TouchOutcome, notes, notes::NoteOutcome, panels};
use pinwall_types::models::{NoteRecord, PanelRecord, PanelVariant};

use crate::cache::ObjectCache;
use crate::codes::CodeGenerator;
use crate::error::PanelError;
use crate::membership::PRESENCE_STALE_MINUTES;
use crate::rowmap;

/// Cache TTL for panel records.
const PANEL_TTL: Duration = Duration::from_secs(300);
/// Cache TTL for per-panel note lists.
const NOTES_TTL: Duration = Duration::from_secs(60);

fn panel_key(code: &str) -> String {
    format!("panel:{code}")
}

fn notes_key(code: &str) -> String {
    format!("notes:{code}")
}

/// What a panel needs from its creator before a code is allocated.
pub struct NewPanel {
    pub name: String,
    pub variant: PanelVariant,
    pub password_hash: Option<String>,
    pub owner_id: Uuid,
    pub owner_name: String,
}

/// Read-through, write-invalidate store for panels and their notes.
///
/// Reads consult the cache first and fall back to SQLite, populating the
/// cache on the way out. Every mutation invalidates the affected entries
/// before returning, so a caller that saw a write succeed never reads an
/// older cached state afterwards. Cache failures of any kind are absorbed
/// and logged; the durable store stays authoritative.
#[derive(Clone)]
pub struct PanelStore {
    db: Arc<Database>,
    cache: Arc<dyn ObjectCache>,
    codes: CodeGenerator,
}

impl PanelStore {
    pub fn new(db: Arc<Database>, cache: Arc<dyn ObjectCache>) -> Self {
        PanelStore {
            db,
            cache,
            codes: CodeGenerator::new(),
        }
    }

    /// Allocate an unused code and create the panel. The creator becomes
    /// the first participant in the same transaction, so a freshly created
    /// panel is never orphaned.
    pub fn create(&self, new: NewPanel) -> Result<PanelRecord, PanelError> {
        let codes = self.codes;
        let owner_id = new.owner_id.to_string();
        let row = panels::create_panel(
            &self.db,
            &new.name,
            new.variant.as_str(),
            new.password_hash.as_deref(),
            &owner_id,
            &new.owner_name,
            new.variant.max_users(),
            PRESENCE_STALE_MINUTES,
            |conn| {
                codes
                    .allocate_unique(|candidate| panels::code_exists(conn, candidate))
                    .map_err(anyhow::Error::new)
            },
        )
        .map_err(PanelError::from_anyhow)?;

        Ok(rowmap::panel_record(row))
    }

    /// Panel lookup, cache first.
    pub fn get(&self, code: &str) -> Result<Option<PanelRecord>, PanelError> {
        let key = panel_key(code);
        if let Some(record) = self.cache_get::<PanelRecord>(&key) {
            return Ok(Some(record));
        }

        let row = self.db.get_panel(code, PRESENCE_STALE_MINUTES)?;
        let record = row.map(rowmap::panel_record);
        if let Some(ref record) = record {
            self.cache_put(&key, record, PANEL_TTL);
        }
        Ok(record)
    }

    /// All notes on a panel, cache first. Requires membership and advances
    /// the caller's read marker even on a cache hit.
    pub fn list_notes(&self, code: &str, user_id: Uuid) -> Result<Vec<NoteRecord>, PanelError> {
        match pinwall_db::membership::touch_read(&self.db, code, &user_id.to_string())? {
            TouchOutcome::Touched => {}
            TouchOutcome::NotMember => return Err(PanelError::NotMember),
            TouchOutcome::PanelMissing => return Err(PanelError::NotFound),
        }

        let key = notes_key(code);
        if let Some(records) = self.cache_get::<Vec<NoteRecord>>(&key) {
            return Ok(records);
        }

        let rows = self.db.with_conn(|conn| notes::list_notes(conn, code))?;
        let records: Vec<NoteRecord> = rows.into_iter().map(rowmap::note_record).collect();
        self.cache_put(&key, &records, NOTES_TTL);
        Ok(records)
    }

    /// Pin a new note. Color defaults to the panel palette's first entry.
    pub fn create_note(
        &self,
        code: &str,
        author_id: Uuid,
        content: &str,
        x: f64,
        y: f64,
        color: Option<&str>,
    ) -> Result<NoteRecord, PanelError> {
        let color = match color {
            Some(c) => c.to_string(),
            None => self.default_color(code)?,
        };

        let note_id = Uuid::new_v4().to_string();
        let outcome = notes::insert_note(
            &self.db,
            code,
            &note_id,
            &author_id.to_string(),
            content,
            x,
            y,
            &color,
        )?;
        self.invalidate(code);
        self.note_outcome(outcome)
    }

    pub fn move_note(
        &self,
        code: &str,
        note_id: Uuid,
        user_id: Uuid,
        x: f64,
        y: f64,
    ) -> Result<NoteRecord, PanelError> {
        let outcome = notes::move_note(
            &self.db,
            code,
            &note_id.to_string(),
            &user_id.to_string(),
            x,
            y,
        )?;
        self.invalidate(code);
        self.note_outcome(outcome)
    }

    pub fn delete_note(
        &self,
        code: &str,
        note_id: Uuid,
        user_id: Uuid,
    ) -> Result<NoteRecord, PanelError> {
        let outcome =
            notes::delete_note(&self.db, code, &note_id.to_string(), &user_id.to_string())?;
        self.invalidate(code);
        self.note_outcome(outcome)
    }

    /// Drop both cache entries for a panel. Mutating paths call this before
    /// reporting success; it is also the hook other components use after
    /// they write panel state directly.
    pub fn invalidate(&self, code: &str) {
        for key in [panel_key(code), notes_key(code)] {
            if let Err(e) = self.cache.delete(&key) {
                warn!("Cache delete failed for {}: {}", key, e);
            }
        }
    }

    fn note_outcome(&self, outcome: NoteOutcome) -> Result<NoteRecord, PanelError> {
        match outcome {
            NoteOutcome::Done(row) => Ok(rowmap::note_record(row)),
            NoteOutcome::PanelMissing => Err(PanelError::NotFound),
            NoteOutcome::NotMember => Err(PanelError::NotMember),
            NoteOutcome::NoteMissing => Err(PanelError::NotFound),
        }
    }

    fn default_color(&self, code: &str) -> Result<String, PanelError> {
        let record = self.get(code)?.ok_or(PanelError::NotFound)?;
        Ok(record.variant.palette()[0].to_string())
    }

    fn cache_get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        match self.cache.get(key) {
            Ok(Some(raw)) => match serde_json::from_str(&raw) {
                Ok(value) => Some(value),
                Err(e) => {
                    warn!("Dropping undecodable cache entry {}: {}", key, e);
                    if let Err(e) = self.cache.delete(key) {
                        warn!("Cache delete failed for {}: {}", key, e);
                    }
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                // Treat as a miss; the durable store answers instead.
                warn!("Cache read failed for {}: {}", key, e);
                None
            }
        }
    }

    fn cache_put<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) {
        match serde_json::to_string(value) {
            Ok(raw) => {
                if let Err(e) = self.cache.set(key, &raw, ttl) {
                    warn!("Cache write failed for {}: {}", key, e);
                }
            }
            Err(e) => warn!("Cache encode failed for {}: {}", key, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;

    /// Cache whose every operation fails. The store must shrug it off.
    struct FailingCache;

    impl ObjectCache for FailingCache {
        fn get(&self, _key: &str) -> anyhow::Result<Option<String>> {
            Err(anyhow::anyhow!("cache backend unreachable"))
        }
        fn set(&self, _key: &str, _value: &str, _ttl: Duration) -> anyhow::Result<()> {
            Err(anyhow::anyhow!("cache backend unreachable"))
        }
        fn delete(&self, _key: &str) -> anyhow::Result<()> {
            Err(anyhow::anyhow!("cache backend unreachable"))
        }
    }

    fn setup_with(cache: Arc<dyn ObjectCache>) -> (Arc<Database>, PanelStore, Uuid) {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let owner = Uuid::new_v4();
        db.create_user(&owner.to_string(), "ana", "hash").unwrap();
        let store = PanelStore::new(db.clone(), cache);
        (db, store, owner)
    }

    fn make_panel(store: &PanelStore, owner: Uuid) -> String {
        store
            .create(NewPanel {
                name: "board".to_string(),
                variant: PanelVariant::Friends,
                password_hash: None,
                owner_id: owner,
                owner_name: "ana".to_string(),
            })
            .unwrap()
            .code
    }

    #[test]
    fn test_reads_come_from_cache_until_invalidated() {
        let (db, store, owner) = setup_with(Arc::new(MemoryCache::new()));
        let code = make_panel(&store, owner);

        // Prime the cache, then change the row behind its back.
        assert_eq!(store.get(&code).unwrap().unwrap().name, "board");
        db.with_conn(|conn| {
            conn.execute("UPDATE panels SET name = 'renamed' WHERE code = ?1", [&code])?;
            Ok(())
        })
        .unwrap();

        assert_eq!(store.get(&code).unwrap().unwrap().name, "board");

        store.invalidate(&code);
        assert_eq!(store.get(&code).unwrap().unwrap().name, "renamed");
    }

    #[test]
    fn test_note_writes_invalidate_panel_and_list() {
        let (_db, store, owner) = setup_with(Arc::new(MemoryCache::new()));
        let code = make_panel(&store, owner);

        // Prime both entries.
        assert_eq!(store.get(&code).unwrap().unwrap().post_count, 0);
        assert!(store.list_notes(&code, owner).unwrap().is_empty());

        let note = store
            .create_note(&code, owner, "milk", 12.0, 30.0, None)
            .unwrap();
        // Default color comes from the variant palette.
        assert_eq!(note.color, PanelVariant::Friends.palette()[0]);

        let record = store.get(&code).unwrap().unwrap();
        assert_eq!(record.post_count, 1);
        let notes = store.list_notes(&code, owner).unwrap();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].content, "milk");
    }

    #[test]
    fn test_deleted_note_never_reappears_in_list() {
        let (_db, store, owner) = setup_with(Arc::new(MemoryCache::new()));
        let code = make_panel(&store, owner);

        let keep = store
            .create_note(&code, owner, "keep", 0.0, 0.0, None)
            .unwrap();
        let doomed = store
            .create_note(&code, owner, "drop", 0.0, 0.0, None)
            .unwrap();
        assert_eq!(store.list_notes(&code, owner).unwrap().len(), 2);

        store.delete_note(&code, doomed.id, owner).unwrap();
        let notes = store.list_notes(&code, owner).unwrap();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].id, keep.id);
    }

    #[test]
    fn test_note_list_requires_membership() {
        let (db, store, owner) = setup_with(Arc::new(MemoryCache::new()));
        let code = make_panel(&store, owner);
        let stranger = Uuid::new_v4();
        db.create_user(&stranger.to_string(), "sam", "hash").unwrap();

        match store.list_notes(&code, stranger) {
            Err(PanelError::NotMember) => {}
            other => panic!("expected NotMember, got {other:?}"),
        }
        match store.list_notes("ZZZZ99", owner) {
            Err(PanelError::NotFound) => {}
            other => panic!("expected NotFound, got {other:?}"),
        }
    }

    #[test]
    fn test_store_survives_a_dead_cache() {
        let (_db, store, owner) = setup_with(Arc::new(FailingCache));
        let code = make_panel(&store, owner);

        assert_eq!(store.get(&code).unwrap().unwrap().name, "board");
        let note = store
            .create_note(&code, owner, "milk", 1.0, 2.0, None)
            .unwrap();
        assert_eq!(store.list_notes(&code, owner).unwrap().len(), 1);
        store.move_note(&code, note.id, owner, 5.0, 6.0).unwrap();
        store.delete_note(&code, note.id, owner).unwrap();
        assert!(store.list_notes(&code, owner).unwrap().is_empty());
    }

    #[test]
    fn test_undecodable_cache_entry_falls_back_to_store() {
        let cache = Arc::new(MemoryCache::new());
        let (_db, store, owner) = setup_with(cache.clone());
        let code = make_panel(&store, owner);

        cache
            .set(&format!("panel:{code}"), "not json", Duration::from_secs(300))
            .unwrap();
        assert_eq!(store.get(&code).unwrap().unwrap().name, "board");
    }

    #[test]
    fn test_missing_panel_reads_as_none() {
        let (_db, store, _owner) = setup_with(Arc::new(MemoryCache::new()));
        assert!(store.get("ZZZZ99").unwrap().is_none());
    }
}
