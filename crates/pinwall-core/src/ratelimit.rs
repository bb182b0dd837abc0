use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tracing::warn;

use crate::error::PanelError;

/// Request categories with independent budgets. Keys are chosen per
/// category by the caller: user id for authenticated traffic, client IP for
/// the auth endpoints, and `user:code` for link lookups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    PanelCreate,
    PanelJoin,
    LinkAccess,
    NoteCreate,
    Auth,
}

impl Category {
    /// (max requests, window) for this category.
    pub fn budget(self) -> (u32, Duration) {
        match self {
            Category::PanelCreate => (5, Duration::from_secs(600)),
            Category::PanelJoin => (20, Duration::from_secs(300)),
            Category::LinkAccess => (3, Duration::from_secs(30)),
            Category::NoteCreate => (15, Duration::from_secs(120)),
            Category::Auth => (10, Duration::from_secs(900)),
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Category::PanelCreate => "panel_create",
            Category::PanelJoin => "panel_join",
            Category::LinkAccess => "link_access",
            Category::NoteCreate => "note_create",
            Category::Auth => "auth",
        }
    }
}

struct Window {
    count: u32,
    reset_at: Instant,
}

/// Fixed-window request throttle keyed by (category, client key).
///
/// This is a courtesy brake, not a security boundary: if its own
/// bookkeeping breaks, requests are allowed through rather than dropped.
pub struct RateLimiter {
    windows: Mutex<HashMap<(Category, String), Window>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        RateLimiter {
            windows: Mutex::new(HashMap::new()),
        }
    }

    /// Check the budget and record this request in one step.
    pub fn try_acquire(&self, category: Category, key: &str) -> Result<(), PanelError> {
        self.try_acquire_at(category, key, Instant::now())
    }

    /// Check the budget without consuming it. Pair with `record` for flows
    /// where only some outcomes should count (failed logins).
    pub fn check(&self, category: Category, key: &str) -> Result<(), PanelError> {
        self.check_at(category, key, Instant::now())
    }

    /// Count an attempt against the budget without checking it.
    pub fn record(&self, category: Category, key: &str) {
        self.record_at(category, key, Instant::now());
    }

    /// Drop windows whose reset time has passed. Returns how many were
    /// removed.
    pub fn sweep(&self) -> usize {
        self.sweep_at(Instant::now())
    }

    fn try_acquire_at(
        &self,
        category: Category,
        key: &str,
        now: Instant,
    ) -> Result<(), PanelError> {
        let (max, window) = category.budget();
        let mut windows = match self.windows.lock() {
            Ok(windows) => windows,
            Err(e) => {
                warn!("Rate limiter lock poisoned, failing open: {}", e);
                return Ok(());
            }
        };

        let entry = windows
            .entry((category, key.to_string()))
            .or_insert(Window {
                count: 0,
                reset_at: now + window,
            });
        if now >= entry.reset_at {
            entry.count = 0;
            entry.reset_at = now + window;
        }

        if entry.count >= max {
            let retry_after_seconds = entry
                .reset_at
                .saturating_duration_since(now)
                .as_secs()
                .max(1);
            warn!(
                "Rate limit hit: category={} key={}",
                category.as_str(),
                key
            );
            return Err(PanelError::RateLimited {
                retry_after_seconds,
            });
        }

        entry.count += 1;
        Ok(())
    }

    fn check_at(&self, category: Category, key: &str, now: Instant) -> Result<(), PanelError> {
        let (max, _) = category.budget();
        let windows = match self.windows.lock() {
            Ok(windows) => windows,
            Err(e) => {
                warn!("Rate limiter lock poisoned, failing open: {}", e);
                return Ok(());
            }
        };

        if let Some(entry) = windows.get(&(category, key.to_string())) {
            if now < entry.reset_at && entry.count >= max {
                let retry_after_seconds = entry
                    .reset_at
                    .saturating_duration_since(now)
                    .as_secs()
                    .max(1);
                warn!(
                    "Rate limit hit: category={} key={}",
                    category.as_str(),
                    key
                );
                return Err(PanelError::RateLimited {
                    retry_after_seconds,
                });
            }
        }
        Ok(())
    }

    fn record_at(&self, category: Category, key: &str, now: Instant) {
        let (_, window) = category.budget();
        let mut windows = match self.windows.lock() {
            Ok(windows) => windows,
            Err(e) => {
                warn!("Rate limiter lock poisoned, skipping record: {}", e);
                return;
            }
        };

        let entry = windows
            .entry((category, key.to_string()))
            .or_insert(Window {
                count: 0,
                reset_at: now + window,
            });
        if now >= entry.reset_at {
            entry.count = 0;
            entry.reset_at = now + window;
        }
        entry.count += 1;
    }

    fn sweep_at(&self, now: Instant) -> usize {
        let mut windows = match self.windows.lock() {
            Ok(windows) => windows,
            Err(_) => return 0,
        };
        let before = windows.len();
        windows.retain(|_, entry| entry.reset_at > now);
        before - windows.len()
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}
