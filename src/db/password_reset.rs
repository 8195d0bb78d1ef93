//! Single-use password reset tokens.

use sqlx::sqlite::SqlitePool;

#[derive(Clone)]
pub struct PasswordResetStore {
    pool: SqlitePool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PasswordReset {
    pub id: String,
    pub email: String,
    pub token: String,
    pub used: bool,
    pub expires_at: u64,
    pub created_at: u64,
}

#[derive(sqlx::FromRow)]
struct PasswordResetRow {
    id: String,
    email: String,
    token: String,
    used: i32,
    expires_at: i64,
    created_at: i64,
}

impl From<PasswordResetRow> for PasswordReset {
    fn from(row: PasswordResetRow) -> Self {
        PasswordReset {
            id: row.id,
            email: row.email,
            token: row.token,
            used: row.used != 0,
            expires_at: row.expires_at.max(0) as u64,
            created_at: row.created_at.max(0) as u64,
        }
    }
}

impl PasswordResetStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Store a reset token for `email`, valid until `expires_at`.
    pub async fn create(
        &self,
        email: &str,
        token: &str,
        created_at: u64,
        expires_at: u64,
    ) -> Result<PasswordReset, sqlx::Error> {
        let id = uuid::Uuid::new_v4().to_string();
        sqlx::query(
            "INSERT INTO password_resets (id, email, token, used, expires_at, created_at) VALUES (?, ?, ?, 0, ?, ?)",
        )
        .bind(&id)
        .bind(email)
        .bind(token)
        .bind(expires_at as i64)
        .bind(created_at as i64)
        .execute(&self.pool)
        .await?;

        Ok(PasswordReset {
            id,
            email: email.to_string(),
            token: token.to_string(),
            used: false,
            expires_at,
            created_at,
        })
    }

    /// Look up an unused, unexpired reset by its token.
    pub async fn get_active(
        &self,
        token: &str,
        now: u64,
    ) -> Result<Option<PasswordReset>, sqlx::Error> {
        let row: Option<PasswordResetRow> = sqlx::query_as(
            "SELECT id, email, token, used, expires_at, created_at FROM password_resets \
             WHERE token = ? AND used = 0 AND expires_at >= ?",
        )
        .bind(token)
        .bind(now as i64)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(PasswordReset::from))
    }

    /// Consume a reset. Returns false if it was already used.
    pub async fn mark_used(&self, id: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("UPDATE password_resets SET used = 1 WHERE id = ? AND used = 0")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Delete resets that are expired or already used.
    pub async fn delete_expired(&self, now: u64) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM password_resets WHERE expires_at < ? OR used = 1")
            .bind(now as i64)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
