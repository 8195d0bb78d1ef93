//! One-time email verification codes.

use sqlx::sqlite::SqlitePool;

#[derive(Clone)]
pub struct EmailOtpStore {
    pool: SqlitePool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailOtp {
    pub id: String,
    pub email: String,
    pub code: String,
    pub used: bool,
    pub expires_at: u64,
    pub created_at: u64,
}

#[derive(sqlx::FromRow)]
struct EmailOtpRow {
    id: String,
    email: String,
    code: String,
    used: i32,
    expires_at: i64,
    created_at: i64,
}

impl From<EmailOtpRow> for EmailOtp {
    fn from(row: EmailOtpRow) -> Self {
        EmailOtp {
            id: row.id,
            email: row.email,
            code: row.code,
            used: row.used != 0,
            expires_at: row.expires_at.max(0) as u64,
            created_at: row.created_at.max(0) as u64,
        }
    }
}

impl EmailOtpStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Store a new code for `email`, valid until `expires_at`.
    pub async fn create(
        &self,
        email: &str,
        code: &str,
        created_at: u64,
        expires_at: u64,
    ) -> Result<EmailOtp, sqlx::Error> {
        let id = uuid::Uuid::new_v4().to_string();
        sqlx::query(
            "INSERT INTO email_otps (id, email, code, used, expires_at, created_at) VALUES (?, ?, ?, 0, ?, ?)",
        )
        .bind(&id)
        .bind(email)
        .bind(code)
        .bind(expires_at as i64)
        .bind(created_at as i64)
        .execute(&self.pool)
        .await?;

        Ok(EmailOtp {
            id,
            email: email.to_string(),
            code: code.to_string(),
            used: false,
            expires_at,
            created_at,
        })
    }

    /// Most recent unused, unexpired code for `email`.
    pub async fn latest_active(
        &self,
        email: &str,
        now: u64,
    ) -> Result<Option<EmailOtp>, sqlx::Error> {
        let row: Option<EmailOtpRow> = sqlx::query_as(
            "SELECT id, email, code, used, expires_at, created_at FROM email_otps \
             WHERE email = ? COLLATE NOCASE AND used = 0 AND expires_at >= ? \
             ORDER BY created_at DESC, rowid DESC LIMIT 1",
        )
        .bind(email)
        .bind(now as i64)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(EmailOtp::from))
    }

    /// Consume a code. Returns false if it was already used.
    pub async fn mark_used(&self, id: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("UPDATE email_otps SET used = 1 WHERE id = ? AND used = 0")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Delete codes that are expired or already used.
    pub async fn delete_expired(&self, now: u64) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM email_otps WHERE expires_at < ? OR used = 1")
            .bind(now as i64)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use crate::db::Database;

    #[tokio::test]
    async fn test_latest_active_prefers_newest_unused() {
        let db = Database::open(":memory:").await.unwrap();
        let otps = db.email_otps();

        otps.create("eve@example.com", "111111", 100, 10_000).await.unwrap();
        let newest = otps.create("eve@example.com", "222222", 200, 10_000).await.unwrap();

        let active = otps.latest_active("EVE@example.com", 300).await.unwrap().unwrap();
        assert_eq!(active.code, "222222");

        assert!(otps.mark_used(&newest.id).await.unwrap());
        assert!(!otps.mark_used(&newest.id).await.unwrap());

        let active = otps.latest_active("eve@example.com", 300).await.unwrap().unwrap();
        assert_eq!(active.code, "111111");
    }

    #[tokio::test]
    async fn test_expired_codes_are_ignored_and_swept() {
        let db = Database::open(":memory:").await.unwrap();
        let otps = db.email_otps();

        otps.create("frank@example.com", "333333", 100, 500).await.unwrap();
        assert!(otps.latest_active("frank@example.com", 501).await.unwrap().is_none());

        assert_eq!(otps.delete_expired(501).await.unwrap(), 1);
    }
}
