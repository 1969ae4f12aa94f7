use chrono::{Duration, Utc};
use rand::Rng;
use rusqlite::{params, OptionalExtension};

use crate::config::expiry_after;
use crate::db::models::UserId;
use crate::error::AppError;
use crate::state::DbPool;

/// The user a session token belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionUser {
    pub id: UserId,
    pub username: String,
}

/// Create a new session for a user. Returns the session token.
pub fn create_session(pool: &DbPool, user_id: UserId, hours: u64) -> Result<String, AppError> {
    let expires_at = expiry_after(hours, Duration::try_hours).ok_or_else(|| {
        AppError::Internal(format!("session lifetime of {hours} hours is out of range"))
    })?;
    let conn = pool.get()?;

    let token = generate_token();
    let id = uuid::Uuid::now_v7().to_string();

    conn.execute(
        "INSERT INTO sessions (id, user_id, token, expires_at) VALUES (?1, ?2, ?3, ?4)",
        params![id, user_id, token, expires_at],
    )?;

    Ok(token)
}

/// Delete a session by token.
pub fn delete_session(pool: &DbPool, token: &str) -> Result<(), AppError> {
    let conn = pool.get()?;
    conn.execute("DELETE FROM sessions WHERE token = ?1", params![token])?;
    Ok(())
}

/// Resolve an unexpired session of an active user.
pub fn user_for_token(pool: &DbPool, token: &str) -> Result<Option<SessionUser>, AppError> {
    let conn = pool.get()?;
    let user = conn
        .query_row(
            "SELECT u.id, u.username FROM sessions s \
             JOIN users u ON u.id = s.user_id \
             WHERE s.token = ?1 AND s.expires_at > ?2 AND u.is_active = 1",
            params![token, Utc::now()],
            |row| {
                Ok(SessionUser {
                    id: row.get(0)?,
                    username: row.get(1)?,
                })
            },
        )
        .optional()?;
    Ok(user)
}

/// Generate a cryptographically random 32-byte hex token.
fn generate_token() -> String {
    let bytes: [u8; 32] = rand::thread_rng().gen();
    hex::encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    fn pool_with_user(active: bool) -> (DbPool, UserId) {
        let pool = db::memory_pool().unwrap();
        db::run_migrations(&pool).unwrap();
        let id = {
            let conn = pool.get().unwrap();
            conn.execute(
                "INSERT INTO users (username, email, password_hash, is_active, date_joined)
                 VALUES ('alice', 'alice@example.com', 'x', ?1, ?2)",
                params![active, Utc::now()],
            )
            .unwrap();
            UserId(conn.last_insert_rowid())
        };
        (pool, id)
    }

    #[test]
    fn generate_token_is_64_hex_chars() {
        let token = generate_token();
        assert_eq!(token.len(), 64);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn generate_token_is_unique() {
        let t1 = generate_token();
        let t2 = generate_token();
        assert_ne!(t1, t2);
    }

    #[test]
    fn session_resolves_until_deleted() {
        let (pool, id) = pool_with_user(true);
        let token = create_session(&pool, id, 1).unwrap();

        let user = user_for_token(&pool, &token).unwrap().unwrap();
        assert_eq!(user.id, id);
        assert_eq!(user.username, "alice");

        delete_session(&pool, &token).unwrap();
        assert!(user_for_token(&pool, &token).unwrap().is_none());
    }

    #[test]
    fn expired_sessions_do_not_resolve() {
        let (pool, id) = pool_with_user(true);
        let token = create_session(&pool, id, 0).unwrap();
        assert!(user_for_token(&pool, &token).unwrap().is_none());
    }

    #[test]
    fn out_of_range_lifetime_is_an_error() {
        let (pool, id) = pool_with_user(true);
        for hours in [u64::MAX, i64::MAX as u64] {
            let err = create_session(&pool, id, hours).unwrap_err();
            assert!(matches!(err, AppError::Internal(_)));
        }
        let conn = pool.get().unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM sessions", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn inactive_users_have_no_session() {
        let (pool, id) = pool_with_user(false);
        let token = create_session(&pool, id, 1).unwrap();
        assert!(user_for_token(&pool, &token).unwrap().is_none());
    }

    #[test]
    fn unknown_token_is_none() {
        let (pool, _) = pool_with_user(true);
        assert!(user_for_token(&pool, "nope").unwrap().is_none());
    }
}
