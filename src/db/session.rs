//! Session rows backing the refresh protocol.
//!
//! Each session holds exactly one refresh token. Rotation overwrites it with
//! a conditional update, so two concurrent refreshes presenting the same
//! token cannot both succeed.

use async_trait::async_trait;
use sqlx::sqlite::SqlitePool;

use crate::jwt::unix_now;
use crate::lifecycle::{ClientMetadata, NewSession, Session, SessionStore, StoreError};

#[derive(Clone)]
pub struct SqliteSessionStore {
    pool: SqlitePool,
}

#[derive(sqlx::FromRow)]
struct SessionRow {
    id: String,
    owner_id: String,
    refresh_token: String,
    user_agent: String,
    client_ip: String,
    is_blocked: i32,
    expires_at: i64,
    created_at: i64,
}

impl From<SessionRow> for Session {
    fn from(row: SessionRow) -> Self {
        Session {
            id: row.id,
            owner_id: row.owner_id,
            refresh_token: row.refresh_token,
            is_blocked: row.is_blocked != 0,
            expires_at: row.expires_at.max(0) as u64,
            client: ClientMetadata {
                user_agent: row.user_agent,
                client_ip: row.client_ip,
            },
            created_at: row.created_at.max(0) as u64,
        }
    }
}

const SESSION_COLUMNS: &str =
    "id, owner_id, refresh_token, user_agent, client_ip, is_blocked, expires_at, created_at";

impl SqliteSessionStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Delete sessions whose expiry is before `now`. Returns the number removed.
    pub async fn delete_expired(&self, now: u64) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM sessions WHERE expires_at < ?")
            .bind(now as i64)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Delete every session owned by a user. Returns the number removed.
    pub async fn delete_by_owner(&self, owner_id: &str) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM sessions WHERE owner_id = ?")
            .bind(owner_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl SessionStore for SqliteSessionStore {
    async fn create_session(&self, session: NewSession) -> Result<Session, StoreError> {
        let row: SessionRow = sqlx::query_as(&format!(
            "INSERT INTO sessions (id, owner_id, refresh_token, user_agent, client_ip, is_blocked, expires_at, created_at) \
             VALUES (?, ?, ?, ?, ?, 0, ?, ?) RETURNING {}",
            SESSION_COLUMNS
        ))
        .bind(&session.id)
        .bind(&session.owner_id)
        .bind(&session.refresh_token)
        .bind(&session.client.user_agent)
        .bind(&session.client.client_ip)
        .bind(session.expires_at as i64)
        .bind(unix_now() as i64)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.into())
    }

    async fn get_session(&self, id: &str) -> Result<Option<Session>, StoreError> {
        let row: Option<SessionRow> = sqlx::query_as(&format!(
            "SELECT {} FROM sessions WHERE id = ?",
            SESSION_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Session::from))
    }

    async fn update_session_refresh_token(
        &self,
        id: &str,
        refresh_token: &str,
        expires_at: u64,
    ) -> Result<Option<Session>, StoreError> {
        let row: Option<SessionRow> = sqlx::query_as(&format!(
            "UPDATE sessions SET refresh_token = ?, expires_at = ? WHERE id = ? RETURNING {}",
            SESSION_COLUMNS
        ))
        .bind(refresh_token)
        .bind(expires_at as i64)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Session::from))
    }

    async fn rotate_refresh_token(
        &self,
        id: &str,
        expected: &str,
        refresh_token: &str,
        expires_at: u64,
    ) -> Result<Option<Session>, StoreError> {
        let row: Option<SessionRow> = sqlx::query_as(&format!(
            "UPDATE sessions SET refresh_token = ?, expires_at = ? \
             WHERE id = ? AND refresh_token = ? AND is_blocked = 0 RETURNING {}",
            SESSION_COLUMNS
        ))
        .bind(refresh_token)
        .bind(expires_at as i64)
        .bind(id)
        .bind(expected)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Session::from))
    }

    async fn block_session(&self, id: &str) -> Result<bool, StoreError> {
        let result = sqlx::query("UPDATE sessions SET is_blocked = 1 WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_session(&self, id: &str) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM sessions WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
