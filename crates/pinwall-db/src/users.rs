use anyhow::Result;

use crate::models::UserRow;
use crate::{Database, OptionalExt};

impl Database {
    /// Insert a new account. Returns false when the username is already
    /// taken, so callers need no separate existence check before inserting.
    pub fn create_user(&self, id: &str, username: &str, password_hash: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let inserted = conn.execute(
                "INSERT INTO users (id, username, password) VALUES (?1, ?2, ?3)",
                (id, username, password_hash),
            );
            match inserted {
                Ok(_) => Ok(true),
                Err(rusqlite::Error::SqliteFailure(e, _))
                    if e.code == rusqlite::ErrorCode::ConstraintViolation =>
                {
                    Ok(false)
                }
                Err(e) => Err(e.into()),
            }
        })
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, username, password, created_at FROM users WHERE username = ?1",
            )?;
            let row = stmt
                .query_row([username], |row| {
                    Ok(UserRow {
                        id: row.get(0)?,
                        username: row.get(1)?,
                        password: row.get(2)?,
                        created_at: row.get(3)?,
                    })
                })
                .optional()?;
            Ok(row)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_username_reports_taken() {
        let db = Database::open_in_memory().unwrap();
        assert!(db.create_user("id-1", "ana", "hash").unwrap());
        assert!(!db.create_user("id-2", "ana", "hash").unwrap());

        // The losing insert must leave the original row alone.
        let row = db.get_user_by_username("ana").unwrap().unwrap();
        assert_eq!(row.id, "id-1");
    }

    #[test]
    fn test_unknown_username_reads_as_none() {
        let db = Database::open_in_memory().unwrap();
        assert!(db.get_user_by_username("nobody").unwrap().is_none());
    }
}
