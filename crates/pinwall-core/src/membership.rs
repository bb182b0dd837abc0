use std::sync::Arc;

use tracing::info;
use uuid::Uuid;

use pinwall_db::membership::{self, LeaveOutcome, TouchOutcome};
use pinwall_db::Database;
use pinwall_types::api::PanelSummary;

use crate::error::PanelError;
use crate::rowmap;
use crate::store::PanelStore;

/// Sessions silent for longer than this stop counting as active. Heartbeats
/// arrive every 30s from a live client, so ten minutes of silence means the
/// tab is long gone.
pub const PRESENCE_STALE_MINUTES: u32 = 10;

/// What a completed leave looks like to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeaveReport {
    pub panel_deleted: bool,
}

/// Tracks who belongs to which panel and who is currently there.
/// Permanent membership and ephemeral presence are separate records with
/// separate lifetimes; this component owns both.
#[derive(Clone)]
pub struct MembershipTracker {
    db: Arc<Database>,
    store: PanelStore,
}

impl MembershipTracker {
    pub fn new(db: Arc<Database>, store: PanelStore) -> Self {
        MembershipTracker { db, store }
    }

    /// Remove the caller from a panel. If that empties the roster, the
    /// panel and everything on it is already gone by the time this returns.
    pub fn leave(&self, code: &str, user_id: Uuid) -> Result<LeaveReport, PanelError> {
        let outcome = membership::leave_panel(&self.db, code, &user_id.to_string())?;
        match outcome {
            LeaveOutcome::Left { panel_deleted } => {
                self.store.invalidate(code);
                if panel_deleted {
                    info!("Panel {} orphaned by last leave, deleted", code);
                }
                Ok(LeaveReport { panel_deleted })
            }
            LeaveOutcome::NotMember => Err(PanelError::NotMember),
        }
    }

    /// Refresh the caller's presence session. Admission opened it; beats
    /// keep it inside the window, and one beat revives a session the sweep
    /// already removed. Deliberately does not touch the cache: the
    /// active-user counter may lag by up to one TTL, capacity decisions
    /// never read it.
    pub fn heartbeat(
        &self,
        code: &str,
        user_id: Uuid,
        display_name: &str,
    ) -> Result<(), PanelError> {
        match membership::touch_session(&self.db, code, &user_id.to_string(), display_name)? {
            TouchOutcome::Touched => Ok(()),
            TouchOutcome::NotMember => Err(PanelError::NotMember),
            TouchOutcome::PanelMissing => Err(PanelError::NotFound),
        }
    }

    /// Panels the user belongs to, most recently active first.
    pub fn list_panels(&self, user_id: Uuid) -> Result<Vec<PanelSummary>, PanelError> {
        let rows = membership::list_panels_for_user(
            &self.db,
            &user_id.to_string(),
            PRESENCE_STALE_MINUTES,
        )?;
        Ok(rows.into_iter().map(rowmap::panel_summary).collect())
    }

    /// Delete sessions outside the presence window.
    pub fn sweep_sessions(&self) -> Result<usize, PanelError> {
        Ok(membership::sweep_sessions(&self.db, PRESENCE_STALE_MINUTES)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::AccessController;
    use crate::cache::MemoryCache;
    use pinwall_types::models::PanelVariant;

    fn setup() -> (Arc<Database>, PanelStore, AccessController, MembershipTracker) {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let store = PanelStore::new(db.clone(), Arc::new(MemoryCache::new()));
        let access = AccessController::new(db.clone(), store.clone());
        let tracker = MembershipTracker::new(db.clone(), store.clone());
        (db, store, access, tracker)
    }

    fn add_user(db: &Database, name: &str) -> Uuid {
        let id = Uuid::new_v4();
        db.create_user(&id.to_string(), name, "hash").unwrap();
        id
    }

    #[test]
    fn test_last_leave_deletes_and_uncaches_the_panel() {
        let (db, store, access, tracker) = setup();
        let ana = add_user(&db, "ana");
        let ben = add_user(&db, "ben");
        let code = access
            .create_panel("board", PanelVariant::Friends, None, ana, "ana")
            .unwrap()
            .code;
        access.join(&code, None, ben, "ben").unwrap();
        store
            .create_note(&code, ana, "note", 0.0, 0.0, None)
            .unwrap();

        // Make sure the panel is sitting in the cache before the cascade.
        assert!(store.get(&code).unwrap().is_some());

        let report = tracker.leave(&code, ana).unwrap();
        assert!(!report.panel_deleted);
        let report = tracker.leave(&code, ben).unwrap();
        assert!(report.panel_deleted);

        // A cached record must not outlive the panel.
        assert!(store.get(&code).unwrap().is_none());
    }

    #[test]
    fn test_double_leave_is_rejected() {
        let (db, _store, access, tracker) = setup();
        let ana = add_user(&db, "ana");
        let ben = add_user(&db, "ben");
        let code = access
            .create_panel("board", PanelVariant::Friends, None, ana, "ana")
            .unwrap()
            .code;
        access.join(&code, None, ben, "ben").unwrap();

        tracker.leave(&code, ben).unwrap();
        match tracker.leave(&code, ben) {
            Err(PanelError::NotMember) => {}
            other => panic!("expected NotMember, got {other:?}"),
        }
    }

    #[test]
    fn test_heartbeat_gating() {
        let (db, _store, access, tracker) = setup();
        let ana = add_user(&db, "ana");
        let ben = add_user(&db, "ben");
        let code = access
            .create_panel("board", PanelVariant::Friends, None, ana, "ana")
            .unwrap()
            .code;

        match tracker.heartbeat(&code, ben, "ben") {
            Err(PanelError::NotMember) => {}
            other => panic!("expected NotMember, got {other:?}"),
        }
        match tracker.heartbeat("ZZZZ99", ana, "ana") {
            Err(PanelError::NotFound) => {}
            other => panic!("expected NotFound, got {other:?}"),
        }
        tracker.heartbeat(&code, ana, "ana").unwrap();
    }

    #[test]
    fn test_list_panels_surfaces_summaries() {
        let (db, _store, access, tracker) = setup();
        let ana = add_user(&db, "ana");
        let a = access
            .create_panel("first", PanelVariant::Friends, None, ana, "ana")
            .unwrap();
        let b = access
            .create_panel("second", PanelVariant::Couple, None, ana, "ana")
            .unwrap();

        let summaries = tracker.list_panels(ana).unwrap();
        assert_eq!(summaries.len(), 2);
        let codes: Vec<_> = summaries.iter().map(|s| s.code.as_str()).collect();
        assert!(codes.contains(&a.code.as_str()));
        assert!(codes.contains(&b.code.as_str()));
    }
}
