// Repository pattern - users, profiles, friendships and activation keys
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};
use std::sync::Arc;

use crate::accounts::domain::{
    friendship_pair, AccountError, ActivationKey, NewUser, Profile, User, UserId,
};
use crate::state::DbPool;

const PROFILE_SELECT: &str = "SELECT p.user_id, u.username, p.location, p.camera, \
                              p.fav_photo_id, u.is_active \
                              FROM profiles p JOIN users u ON u.id = p.user_id";

#[async_trait]
pub trait AccountRepository: Send + Sync {
    /// Insert an inactive user. A taken username is a conflict.
    async fn create_user(&self, user: &NewUser, password_hash: &str)
        -> Result<User, AccountError>;

    async fn user(&self, id: UserId) -> Result<Option<User>, AccountError>;

    async fn user_by_username(&self, username: &str) -> Result<Option<User>, AccountError>;

    async fn set_active(&self, id: UserId, active: bool) -> Result<bool, AccountError>;

    /// Persist the editable user columns (names, email)
    async fn save_user(&self, user: &User) -> Result<(), AccountError>;

    async fn delete_user(&self, id: UserId) -> Result<bool, AccountError>;

    /// Create the user's profile unless it exists, and return it
    async fn ensure_profile(&self, user: UserId) -> Result<Profile, AccountError>;

    async fn remove_profile(&self, user: UserId) -> Result<bool, AccountError>;

    async fn profile(&self, user: UserId) -> Result<Option<Profile>, AccountError>;

    async fn save_profile(&self, profile: &Profile) -> Result<(), AccountError>;

    /// Record the friendship; both sides see it. Returns false if it existed.
    async fn add_friend(&self, user: UserId, other: UserId) -> Result<bool, AccountError>;

    async fn friends(&self, user: UserId) -> Result<Vec<Profile>, AccountError>;

    async fn active_profiles(&self) -> Result<Vec<Profile>, AccountError>;

    async fn active_profile_count(&self) -> Result<i64, AccountError>;

    async fn store_activation_key(
        &self,
        user: UserId,
        key: &ActivationKey,
        expires_at: DateTime<Utc>,
    ) -> Result<(), AccountError>;

    /// Remove the key and return its user if it had not expired by `now`
    async fn consume_activation_key(
        &self,
        key: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<UserId>, AccountError>;
}

/// SQLite implementation
pub struct SqliteAccountRepository {
    pool: DbPool,
}

impl SqliteAccountRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AccountRepository for SqliteAccountRepository {
    async fn create_user(
        &self,
        user: &NewUser,
        password_hash: &str,
    ) -> Result<User, AccountError> {
        let conn = self.pool.get()?;
        let inserted = conn.execute(
            "INSERT INTO users (username, email, password_hash, is_active, date_joined)
             VALUES (?1, ?2, ?3, 0, ?4)",
            params![user.username, user.email, password_hash, Utc::now()],
        );
        match inserted {
            Ok(_) => {}
            Err(rusqlite::Error::SqliteFailure(e, _)) if e.code == ErrorCode::ConstraintViolation => {
                return Err(AccountError::Conflict(format!(
                    "a user with username '{}' already exists",
                    user.username
                )));
            }
            Err(e) => return Err(e.into()),
        }

        let id = UserId(conn.last_insert_rowid());
        load_user(&conn, "id = ?1", params![id])?.ok_or(AccountError::NotFound("user"))
    }

    async fn user(&self, id: UserId) -> Result<Option<User>, AccountError> {
        let conn = self.pool.get()?;
        Ok(load_user(&conn, "id = ?1", params![id])?)
    }

    async fn user_by_username(&self, username: &str) -> Result<Option<User>, AccountError> {
        let conn = self.pool.get()?;
        Ok(load_user(&conn, "username = ?1", params![username])?)
    }

    async fn set_active(&self, id: UserId, active: bool) -> Result<bool, AccountError> {
        let conn = self.pool.get()?;
        let rows = conn.execute(
            "UPDATE users SET is_active = ?1 WHERE id = ?2",
            params![active, id],
        )?;
        Ok(rows > 0)
    }

    async fn save_user(&self, user: &User) -> Result<(), AccountError> {
        let conn = self.pool.get()?;
        let rows = conn.execute(
            "UPDATE users SET first_name = ?1, last_name = ?2, email = ?3 WHERE id = ?4",
            params![user.first_name, user.last_name, user.email, user.id],
        )?;
        if rows == 0 {
            return Err(AccountError::NotFound("user"));
        }
        Ok(())
    }

    async fn delete_user(&self, id: UserId) -> Result<bool, AccountError> {
        let conn = self.pool.get()?;
        // sessions, keys, profile, photos and albums cascade
        let rows = conn.execute("DELETE FROM users WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }

    async fn ensure_profile(&self, user: UserId) -> Result<Profile, AccountError> {
        let conn = self.pool.get()?;
        conn.execute(
            "INSERT OR IGNORE INTO profiles (user_id) VALUES (?1)",
            params![user],
        )?;
        load_profile(&conn, user)?.ok_or(AccountError::NotFound("profile"))
    }

    async fn remove_profile(&self, user: UserId) -> Result<bool, AccountError> {
        let conn = self.pool.get()?;
        let rows = conn.execute("DELETE FROM profiles WHERE user_id = ?1", params![user])?;
        Ok(rows > 0)
    }

    async fn profile(&self, user: UserId) -> Result<Option<Profile>, AccountError> {
        let conn = self.pool.get()?;
        Ok(load_profile(&conn, user)?)
    }

    async fn save_profile(&self, profile: &Profile) -> Result<(), AccountError> {
        let conn = self.pool.get()?;
        let rows = conn.execute(
            "UPDATE profiles SET location = ?1, camera = ?2, fav_photo_id = ?3
             WHERE user_id = ?4",
            params![
                profile.location,
                profile.camera,
                profile.fav_photo_id,
                profile.user_id
            ],
        )?;
        if rows == 0 {
            return Err(AccountError::NotFound("profile"));
        }
        Ok(())
    }

    async fn add_friend(&self, user: UserId, other: UserId) -> Result<bool, AccountError> {
        let (a, b) = friendship_pair(user, other)?;
        let conn = self.pool.get()?;
        for id in [a, b] {
            if load_profile(&conn, id)?.is_none() {
                return Err(AccountError::NotFound("profile"));
            }
        }
        let rows = conn.execute(
            "INSERT OR IGNORE INTO friendships (profile_a, profile_b) VALUES (?1, ?2)",
            params![a, b],
        )?;
        Ok(rows > 0)
    }

    async fn friends(&self, user: UserId) -> Result<Vec<Profile>, AccountError> {
        let conn = self.pool.get()?;
        Ok(query_profiles(
            &conn,
            "WHERE p.user_id IN (
                 SELECT profile_b FROM friendships WHERE profile_a = ?1
                 UNION
                 SELECT profile_a FROM friendships WHERE profile_b = ?1
             )",
            params![user],
        )?)
    }

    async fn active_profiles(&self) -> Result<Vec<Profile>, AccountError> {
        let conn = self.pool.get()?;
        Ok(query_profiles(&conn, "WHERE u.is_active = 1", [])?)
    }

    async fn active_profile_count(&self) -> Result<i64, AccountError> {
        let conn = self.pool.get()?;
        let count = conn.query_row(
            "SELECT COUNT(*) FROM profiles p JOIN users u ON u.id = p.user_id
             WHERE u.is_active = 1",
            [],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    async fn store_activation_key(
        &self,
        user: UserId,
        key: &ActivationKey,
        expires_at: DateTime<Utc>,
    ) -> Result<(), AccountError> {
        let conn = self.pool.get()?;
        conn.execute(
            "INSERT INTO activation_keys (key, user_id, expires_at) VALUES (?1, ?2, ?3)",
            params![key.as_str(), user, expires_at],
        )?;
        Ok(())
    }

    async fn consume_activation_key(
        &self,
        key: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<UserId>, AccountError> {
        let mut conn = self.pool.get()?;
        let tx = conn.transaction()?;
        let found: Option<(UserId, DateTime<Utc>)> = tx
            .query_row(
                "SELECT user_id, expires_at FROM activation_keys WHERE key = ?1",
                params![key],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        // spent or stale, the key is gone either way
        tx.execute("DELETE FROM activation_keys WHERE key = ?1", params![key])?;
        tx.commit()?;

        Ok(found.and_then(|(user, expires_at)| (expires_at > now).then_some(user)))
    }
}

/// Type alias for Arc-wrapped repository (for AppState)
pub type DynAccountRepository = Arc<dyn AccountRepository>;

fn load_user(
    conn: &Connection,
    filter: &str,
    params: impl rusqlite::Params,
) -> rusqlite::Result<Option<User>> {
    conn.query_row(
        &format!("SELECT {} FROM users WHERE {filter}", User::COLUMNS),
        params,
        User::from_row,
    )
    .optional()
}

fn profile_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Profile> {
    Ok(Profile {
        user_id: row.get(0)?,
        username: row.get(1)?,
        location: row.get(2)?,
        camera: row.get(3)?,
        fav_photo_id: row.get(4)?,
        is_active: row.get(5)?,
    })
}

fn load_profile(conn: &Connection, user: UserId) -> rusqlite::Result<Option<Profile>> {
    conn.query_row(
        &format!("{PROFILE_SELECT} WHERE p.user_id = ?1"),
        params![user],
        profile_from_row,
    )
    .optional()
}

fn query_profiles(
    conn: &Connection,
    filter: &str,
    params: impl rusqlite::Params,
) -> rusqlite::Result<Vec<Profile>> {
    let mut stmt = conn.prepare(&format!("{PROFILE_SELECT} {filter} ORDER BY u.username"))?;
    let profiles = stmt
        .query_map(params, profile_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(profiles)
}
