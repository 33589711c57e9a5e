//! User Storage
//! Mission: Persist users and revocable refresh tokens with SQLite

use crate::auth::models::{RefreshRecord, Role, User};
use anyhow::{Context, Result};
use bcrypt::{hash, verify, DEFAULT_COST};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::time::Duration;
use tracing::info;
use uuid::Uuid;

/// Credential store backed by SQLite.
///
/// Connections are opened per call. Refresh-token rotation relies on
/// `take_refresh_record` being a single DELETE..RETURNING statement: SQLite
/// serializes the writes, so of two concurrent rotations of the same token
/// exactly one receives the row and the other observes it already gone.
pub struct UserStore {
    db_path: String,
}

impl UserStore {
    /// Create a new user store and initialize the schema.
    pub fn new(db_path: &str) -> Result<Self> {
        let store = Self {
            db_path: db_path.to_string(),
        };
        store.init_db()?;
        Ok(store)
    }

    fn open(&self) -> Result<Connection> {
        let conn = Connection::open(&self.db_path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        Ok(conn)
    }

    fn init_db(&self) -> Result<()> {
        let conn = self.open()?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                email TEXT UNIQUE NOT NULL,
                name TEXT NOT NULL,
                password_hash TEXT NOT NULL,
                role TEXT NOT NULL,
                created_at TEXT NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS refresh_tokens (
                id TEXT PRIMARY KEY,
                token TEXT UNIQUE NOT NULL,
                user_id TEXT NOT NULL,
                expires_at TEXT NOT NULL,
                created_at TEXT NOT NULL,
                FOREIGN KEY (user_id) REFERENCES users(id)
            )",
            [],
        )?;

        Ok(())
    }

    fn row_to_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
        let id: String = row.get(0)?;
        let role_str: String = row.get(4)?;
        Ok(User {
            id: Uuid::parse_str(&id).unwrap_or_default(),
            email: row.get(1)?,
            name: row.get(2)?,
            password_hash: row.get(3)?,
            role: Role::from_str(&role_str).unwrap_or(Role::User),
            created_at: row.get(5)?,
        })
    }

    /// Get user by email
    pub fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let conn = self.open()?;
        let user = conn
            .query_row(
                "SELECT id, email, name, password_hash, role, created_at
                 FROM users WHERE email = ?1",
                params![email],
                Self::row_to_user,
            )
            .optional()?;
        Ok(user)
    }

    /// Get user by id
    pub fn find_user_by_id(&self, id: &Uuid) -> Result<Option<User>> {
        let conn = self.open()?;
        let user = conn
            .query_row(
                "SELECT id, email, name, password_hash, role, created_at
                 FROM users WHERE id = ?1",
                params![id.to_string()],
                Self::row_to_user,
            )
            .optional()?;
        Ok(user)
    }

    /// Verify email and password against the stored bcrypt hash.
    pub fn verify_password(&self, email: &str, password: &str) -> Result<bool> {
        match self.find_user_by_email(email)? {
            Some(user) => {
                let valid =
                    verify(password, &user.password_hash).context("Failed to verify password")?;
                Ok(valid)
            }
            None => Ok(false),
        }
    }

    /// Create a new user
    pub fn create_user(&self, name: &str, email: &str, password: &str, role: Role) -> Result<User> {
        let password_hash = hash(password, DEFAULT_COST).context("Failed to hash password")?;

        let user = User {
            id: Uuid::new_v4(),
            email: email.to_string(),
            name: name.to_string(),
            password_hash,
            role,
            created_at: Utc::now().to_rfc3339(),
        };

        let conn = self.open()?;
        conn.execute(
            "INSERT INTO users (id, email, name, password_hash, role, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                user.id.to_string(),
                user.email,
                user.name,
                user.password_hash,
                user.role.as_str(),
                user.created_at,
            ],
        )
        .context("Failed to insert user")?;

        info!(user_id = %user.id, email = %user.email, "Created user");

        Ok(user)
    }

    /// Update a user's role. Takes effect on the user's next token refresh.
    pub fn update_user_role(&self, user_id: &Uuid, role: Role) -> Result<bool> {
        let conn = self.open()?;
        let rows = conn.execute(
            "UPDATE users SET role = ?1 WHERE id = ?2",
            params![role.as_str(), user_id.to_string()],
        )?;
        Ok(rows > 0)
    }

    /// List users, newest first, with the total count for pagination.
    pub fn list_users(&self, page: u32, limit: u32) -> Result<(Vec<User>, u64)> {
        let conn = self.open()?;

        let total: u64 = conn.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?;

        let offset = (page.saturating_sub(1) as i64) * limit as i64;
        let mut stmt = conn.prepare(
            "SELECT id, email, name, password_hash, role, created_at
             FROM users ORDER BY created_at DESC LIMIT ?1 OFFSET ?2",
        )?;
        let users = stmt
            .query_map(params![limit as i64, offset], Self::row_to_user)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok((users, total))
    }

    /// Delete a user by id. Returns false if no such user existed.
    pub fn delete_user(&self, user_id: &Uuid) -> Result<bool> {
        let conn = self.open()?;
        conn.execute(
            "DELETE FROM refresh_tokens WHERE user_id = ?1",
            params![user_id.to_string()],
        )?;
        let rows = conn.execute(
            "DELETE FROM users WHERE id = ?1",
            params![user_id.to_string()],
        )?;
        Ok(rows > 0)
    }

    /// Persist a refresh-token record. The token is only honored by rotation
    /// while this row exists.
    pub fn create_refresh_record(
        &self,
        token: &str,
        user_id: &Uuid,
        expires_at: DateTime<Utc>,
    ) -> Result<RefreshRecord> {
        let record = RefreshRecord {
            id: Uuid::new_v4(),
            token: token.to_string(),
            user_id: *user_id,
            expires_at,
        };

        let conn = self.open()?;
        conn.execute(
            "INSERT INTO refresh_tokens (id, token, user_id, expires_at, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                record.id.to_string(),
                record.token,
                record.user_id.to_string(),
                record.expires_at.to_rfc3339(),
                Utc::now().to_rfc3339(),
            ],
        )
        .context("Failed to insert refresh token")?;

        Ok(record)
    }

    /// Look up a refresh record without consuming it.
    pub fn find_refresh_record(&self, token: &str) -> Result<Option<RefreshRecord>> {
        let conn = self.open()?;
        let record = conn
            .query_row(
                "SELECT id, token, user_id, expires_at FROM refresh_tokens WHERE token = ?1",
                params![token],
                Self::row_to_refresh_record,
            )
            .optional()?;
        Ok(record)
    }

    /// Atomically remove and return the refresh record for a token.
    ///
    /// This is the serialization point for rotation: concurrent callers with
    /// the same token race on a single DELETE and only one gets the row back.
    pub fn take_refresh_record(&self, token: &str) -> Result<Option<RefreshRecord>> {
        let conn = self.open()?;
        let record = conn
            .query_row(
                "DELETE FROM refresh_tokens WHERE token = ?1
                 RETURNING id, token, user_id, expires_at",
                params![token],
                Self::row_to_refresh_record,
            )
            .optional()?;
        Ok(record)
    }

    /// Delete a refresh record owned by a specific user (logout). Returns the
    /// number of rows removed.
    pub fn delete_refresh_record_for_user(&self, token: &str, user_id: &Uuid) -> Result<usize> {
        let conn = self.open()?;
        let rows = conn.execute(
            "DELETE FROM refresh_tokens WHERE token = ?1 AND user_id = ?2",
            params![token, user_id.to_string()],
        )?;
        Ok(rows)
    }

    fn row_to_refresh_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<RefreshRecord> {
        let id: String = row.get(0)?;
        let user_id: String = row.get(2)?;
        let expires_at: String = row.get(3)?;
        Ok(RefreshRecord {
            id: Uuid::parse_str(&id).unwrap_or_default(),
            token: row.get(1)?,
            user_id: Uuid::parse_str(&user_id).unwrap_or_default(),
            expires_at: DateTime::parse_from_rfc3339(&expires_at)
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or_else(|_| Utc::now()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use tempfile::NamedTempFile;

    fn create_test_store() -> (UserStore, NamedTempFile) {
        let temp_file = NamedTempFile::new().unwrap();
        let db_path = temp_file.path().to_str().unwrap();
        let store = UserStore::new(db_path).unwrap();
        (store, temp_file)
    }

    #[test]
    fn test_create_and_retrieve_user() {
        let (store, _temp) = create_test_store();

        let user = store
            .create_user("Alice", "alice@example.com", "Password1", Role::User)
            .unwrap();
        assert_eq!(user.role, Role::User);

        let by_email = store.find_user_by_email("alice@example.com").unwrap();
        assert!(by_email.is_some());
        assert_eq!(by_email.unwrap().id, user.id);

        let by_id = store.find_user_by_id(&user.id).unwrap();
        assert_eq!(by_id.unwrap().name, "Alice");

        assert!(store.find_user_by_email("nobody@example.com").unwrap().is_none());
    }

    #[test]
    fn test_password_verification() {
        let (store, _temp) = create_test_store();
        store
            .create_user("Bob", "bob@example.com", "Password1", Role::User)
            .unwrap();

        assert!(store.verify_password("bob@example.com", "Password1").unwrap());
        assert!(!store.verify_password("bob@example.com", "wrong").unwrap());
        assert!(!store.verify_password("nobody@example.com", "Password1").unwrap());
    }

    #[test]
    fn test_duplicate_email_rejected() {
        let (store, _temp) = create_test_store();
        store
            .create_user("Carol", "carol@example.com", "Password1", Role::User)
            .unwrap();
        assert!(store
            .create_user("Carol2", "carol@example.com", "Password1", Role::User)
            .is_err());
    }

    #[test]
    fn test_update_user_role() {
        let (store, _temp) = create_test_store();
        let user = store
            .create_user("Dan", "dan@example.com", "Password1", Role::User)
            .unwrap();

        assert!(store.update_user_role(&user.id, Role::Admin).unwrap());
        let updated = store.find_user_by_id(&user.id).unwrap().unwrap();
        assert_eq!(updated.role, Role::Admin);

        assert!(!store.update_user_role(&Uuid::new_v4(), Role::Admin).unwrap());
    }

    #[test]
    fn test_refresh_record_lifecycle() {
        let (store, _temp) = create_test_store();
        let user = store
            .create_user("Eve", "eve@example.com", "Password1", Role::User)
            .unwrap();

        let expires = Utc::now() + ChronoDuration::days(7);
        store
            .create_refresh_record("tok-1", &user.id, expires)
            .unwrap();

        let found = store.find_refresh_record("tok-1").unwrap().unwrap();
        assert_eq!(found.user_id, user.id);
        assert!((found.expires_at - expires).num_seconds().abs() <= 1);

        // Taking the record consumes it.
        let taken = store.take_refresh_record("tok-1").unwrap();
        assert!(taken.is_some());
        assert!(store.find_refresh_record("tok-1").unwrap().is_none());
        assert!(store.take_refresh_record("tok-1").unwrap().is_none());
    }

    #[test]
    fn test_take_refresh_record_single_winner() {
        let (store, temp) = create_test_store();
        let user = store
            .create_user("Frank", "frank@example.com", "Password1", Role::User)
            .unwrap();
        store
            .create_refresh_record("tok-race", &user.id, Utc::now() + ChronoDuration::days(7))
            .unwrap();

        let path = temp.path().to_str().unwrap().to_string();
        let mut handles = Vec::new();
        for _ in 0..4 {
            let path = path.clone();
            handles.push(std::thread::spawn(move || {
                let store = UserStore::new(&path).unwrap();
                store.take_refresh_record("tok-race").unwrap().is_some()
            }));
        }

        let wins: usize = handles
            .into_iter()
            .map(|h| h.join().unwrap() as usize)
            .sum();
        assert_eq!(wins, 1);
    }

    #[test]
    fn test_logout_only_deletes_owned_token() {
        let (store, _temp) = create_test_store();
        let alice = store
            .create_user("Alice", "alice@example.com", "Password1", Role::User)
            .unwrap();
        let mallory = store
            .create_user("Mallory", "mallory@example.com", "Password1", Role::User)
            .unwrap();

        let expires = Utc::now() + ChronoDuration::days(7);
        store
            .create_refresh_record("alice-tok", &alice.id, expires)
            .unwrap();

        // Someone else's logout must not revoke Alice's session.
        assert_eq!(
            store
                .delete_refresh_record_for_user("alice-tok", &mallory.id)
                .unwrap(),
            0
        );
        assert_eq!(
            store
                .delete_refresh_record_for_user("alice-tok", &alice.id)
                .unwrap(),
            1
        );
    }

    #[test]
    fn test_list_users_pagination() {
        let (store, _temp) = create_test_store();
        for i in 0..5 {
            store
                .create_user(
                    &format!("User{i}"),
                    &format!("user{i}@example.com"),
                    "Password1",
                    Role::User,
                )
                .unwrap();
        }

        let (page1, total) = store.list_users(1, 2).unwrap();
        assert_eq!(total, 5);
        assert_eq!(page1.len(), 2);

        let (page3, _) = store.list_users(3, 2).unwrap();
        assert_eq!(page3.len(), 1);
    }

    #[test]
    fn test_delete_user_removes_refresh_tokens() {
        let (store, _temp) = create_test_store();
        let user = store
            .create_user("Gone", "gone@example.com", "Password1", Role::User)
            .unwrap();
        store
            .create_refresh_record("gone-tok", &user.id, Utc::now() + ChronoDuration::days(7))
            .unwrap();

        assert!(store.delete_user(&user.id).unwrap());
        assert!(store.find_user_by_id(&user.id).unwrap().is_none());
        assert!(store.find_refresh_record("gone-tok").unwrap().is_none());

        assert!(!store.delete_user(&user.id).unwrap());
    }
}
