use std::sync::Arc;

use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use tracing::{info, warn};
use uuid::Uuid;

use pinwall_db::Database;
use pinwall_db::membership::{self, AdmitOutcome};
use pinwall_types::models::{PanelRecord, PanelVariant};

use crate::error::PanelError;
use crate::membership::PRESENCE_STALE_MINUTES;
use crate::store::{NewPanel, PanelStore};

/// A join that went through.
#[derive(Debug)]
pub struct JoinAdmission {
    pub panel: PanelRecord,
    pub newly_joined: bool,
}

/// Decides who gets into a panel. Creation, the password gate and the
/// capacity gate all live here; the store and the membership tables do the
/// bookkeeping.
#[derive(Clone)]
pub struct AccessController {
    db: Arc<Database>,
    store: PanelStore,
}

impl AccessController {
    pub fn new(db: Arc<Database>, store: PanelStore) -> Self {
        AccessController { db, store }
    }

    /// Create a panel owned by `owner_id`. The password, when set, is
    /// stored as an Argon2id hash; plaintext never reaches the store.
    pub fn create_panel(
        &self,
        name: &str,
        variant: PanelVariant,
        password: Option<&str>,
        owner_id: Uuid,
        owner_name: &str,
    ) -> Result<PanelRecord, PanelError> {
        let password_hash = match password {
            Some(pw) => Some(hash_password(pw)?),
            None => None,
        };

        let record = self.store.create(NewPanel {
            name: name.to_string(),
            variant,
            password_hash,
            owner_id,
            owner_name: owner_name.to_string(),
        })?;
        info!(
            "Panel {} ({}) created by {}",
            record.code,
            variant.as_str(),
            owner_name
        );
        Ok(record)
    }

    /// Validate and execute a join as one unit: password gate, then
    /// capacity gate, then the membership upsert, which also starts the
    /// caller's presence session. A refusal at any gate leaves no trace
    /// in the store.
    pub fn join(
        &self,
        code: &str,
        password: Option<&str>,
        user_id: Uuid,
        display_name: &str,
    ) -> Result<JoinAdmission, PanelError> {
        let record = self.store.get(code)?.ok_or(PanelError::NotFound)?;

        // A password on an open panel is ignored rather than rejected.
        if let Some(hash) = record.password_hash.as_deref() {
            match password {
                None => return Err(PanelError::PasswordRequired),
                Some(pw) => {
                    if !verify_password(hash, pw)? {
                        warn!("Wrong password for panel {} from user {}", code, user_id);
                        return Err(PanelError::WrongPassword);
                    }
                }
            }
        }

        let outcome = membership::admit_participant(
            &self.db,
            code,
            &user_id.to_string(),
            display_name,
            PRESENCE_STALE_MINUTES,
        )?;
        match outcome {
            AdmitOutcome::Admitted { newly_joined } => {
                // The admit bumped last_activity; refresh the cache from
                // the durable row on the way out.
                self.store.invalidate(code);
                let panel = self.store.get(code)?.ok_or(PanelError::NotFound)?;
                Ok(JoinAdmission {
                    panel,
                    newly_joined,
                })
            }
            AdmitOutcome::Full => Err(PanelError::PanelFull),
            AdmitOutcome::PanelMissing => Err(PanelError::NotFound),
        }
    }
}

fn hash_password(password: &str) -> Result<String, PanelError> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| PanelError::Internal(anyhow::anyhow!("password hashing failed: {}", e)))?;
    Ok(hash.to_string())
}

fn verify_password(hash: &str, candidate: &str) -> Result<bool, PanelError> {
    let parsed = PasswordHash::new(hash)
        .map_err(|e| PanelError::Internal(anyhow::anyhow!("stored hash unparseable: {}", e)))?;
    match Argon2::default().verify_password(candidate.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(PanelError::Internal(anyhow::anyhow!(
            "password verification failed: {}",
            e
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;

    fn setup() -> (Arc<Database>, PanelStore, AccessController) {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let cache = Arc::new(MemoryCache::new());
        let store = PanelStore::new(db.clone(), cache);
        let access = AccessController::new(db.clone(), store.clone());
        (db, store, access)
    }

    fn add_user(db: &Database, name: &str) -> Uuid {
        let id = Uuid::new_v4();
        db.create_user(&id.to_string(), name, "hash").unwrap();
        id
    }

    #[test]
    fn test_create_seats_owner() {
        let (db, _, access) = setup();
        let owner = add_user(&db, "ana");

        let record = access
            .create_panel("groceries", PanelVariant::Family, None, owner, "ana")
            .unwrap();
        assert_eq!(record.code.len(), 6);
        assert_eq!(record.max_users, 8);
        assert!(!record.requires_password());

        // The creator is already a participant; re-joining is a refresh.
        let admission = access.join(&record.code, None, owner, "ana").unwrap();
        assert!(!admission.newly_joined);
    }

    #[test]
    fn test_password_gate() {
        let (db, _, access) = setup();
        let owner = add_user(&db, "ana");
        let guest = add_user(&db, "ben");
        let record = access
            .create_panel("date night", PanelVariant::Couple, Some("tulip"), owner, "ana")
            .unwrap();
        assert!(record.requires_password());

        // No password offered on a protected panel.
        match access.join(&record.code, None, guest, "ben") {
            Err(PanelError::PasswordRequired) => {}
            other => panic!("expected PasswordRequired, got {other:?}"),
        }

        // Wrong password: refused, and the roster must not grow.
        match access.join(&record.code, Some("rose"), guest, "ben") {
            Err(PanelError::WrongPassword) => {}
            other => panic!("expected WrongPassword, got {other:?}"),
        }
        let members: u32 = db
            .with_conn(|conn| {
                Ok(conn.query_row(
                    "SELECT COUNT(*) FROM panel_participants WHERE panel_code = ?1",
                    [&record.code],
                    |row| row.get(0),
                )?)
            })
            .unwrap();
        assert_eq!(members, 1);

        let admission = access.join(&record.code, Some("tulip"), guest, "ben").unwrap();
        assert!(admission.newly_joined);
    }

    #[test]
    fn test_password_ignored_on_open_panel() {
        let (db, _, access) = setup();
        let owner = add_user(&db, "ana");
        let guest = add_user(&db, "ben");
        let record = access
            .create_panel("open board", PanelVariant::Friends, None, owner, "ana")
            .unwrap();

        let admission = access
            .join(&record.code, Some("whatever"), guest, "ben")
            .unwrap();
        assert!(admission.newly_joined);
    }

    #[test]
    fn test_capacity_gate_on_couple_panel() {
        let (db, _, access) = setup();
        let ana = add_user(&db, "ana");
        let ben = add_user(&db, "ben");
        let cam = add_user(&db, "cam");
        let record = access
            .create_panel("us two", PanelVariant::Couple, None, ana, "ana")
            .unwrap();

        // Creation seated ana and her seat is held from that moment; ben's
        // join takes the second. Nobody ever sends a heartbeat, and the
        // panel must still turn the third user away.
        access.join(&record.code, None, ben, "ben").unwrap();
        match access.join(&record.code, None, cam, "cam") {
            Err(PanelError::PanelFull) => {}
            other => panic!("expected PanelFull, got {other:?}"),
        }

        // Members already inside are not subject to the ceiling.
        let admission = access.join(&record.code, None, ben, "ben").unwrap();
        assert!(!admission.newly_joined);
    }

    #[test]
    fn test_join_missing_panel() {
        let (db, _, access) = setup();
        let user = add_user(&db, "ana");
        match access.join("ZZZZ99", None, user, "ana") {
            Err(PanelError::NotFound) => {}
            other => panic!("expected NotFound, got {other:?}"),
        }
    }

    #[test]
    fn test_join_refreshes_cached_counters() {
        let (db, store, access) = setup();
        let ana = add_user(&db, "ana");
        let ben = add_user(&db, "ben");
        let record = access
            .create_panel("board", PanelVariant::Friends, None, ana, "ana")
            .unwrap();

        // Prime the cache, then write through a join.
        let before = store.get(&record.code).unwrap().unwrap();
        assert_eq!(before.post_count, 0);
        access.join(&record.code, None, ben, "ben").unwrap();

        let after = store.get(&record.code).unwrap().unwrap();
        assert!(after.last_activity >= before.last_activity);
    }
}
