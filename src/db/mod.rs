mod account;
mod email_otp;
mod password_reset;
mod session;

use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

pub use account::AccountStore;
pub use email_otp::{EmailOtp, EmailOtpStore};
pub use password_reset::{PasswordReset, PasswordResetStore};
pub use session::SqliteSessionStore;

#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open or create a database at the given path.
    /// Use ":memory:" for an in-memory database.
    pub async fn open(path: &str) -> Result<Self, sqlx::Error> {
        let url = if path == ":memory:" {
            "sqlite::memory:".to_string()
        } else {
            format!("sqlite:{}?mode=rwc", path)
        };

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&url)
            .await?;

        let db = Self { pool };
        db.migrate().await?;
        Ok(db)
    }

    /// Get the current schema version.
    async fn get_version(&self) -> Result<i32, sqlx::Error> {
        let result: Option<(i32,)> = sqlx::query_as("SELECT version FROM schema_version LIMIT 1")
            .fetch_optional(&self.pool)
            .await?;
        Ok(result.map(|r| r.0).unwrap_or(0))
    }

    /// Set the schema version within a transaction.
    async fn set_version(
        tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
        version: i32,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM schema_version")
            .execute(&mut **tx)
            .await?;
        sqlx::query("INSERT INTO schema_version (version) VALUES (?)")
            .bind(version)
            .execute(&mut **tx)
            .await?;
        Ok(())
    }

    /// Run database migrations.
    async fn migrate(&self) -> Result<(), sqlx::Error> {
        sqlx::query("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL)")
            .execute(&self.pool)
            .await?;

        let version = self.get_version().await?;

        if version < 1 {
            self.migrate_v1().await?;
        }
        if version < 2 {
            self.migrate_v2().await?;
        }

        Ok(())
    }

    /// Execute a list of queries in a transaction, then set the version.
    async fn run_migration(
        &self,
        version: i32,
        queries: &[&'static str],
    ) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        for query in queries {
            sqlx::query(*query).execute(&mut *tx).await?;
        }
        Self::set_version(&mut tx, version).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn migrate_v1(&self) -> Result<(), sqlx::Error> {
        self.run_migration(
            1,
            &[
                "CREATE TABLE users (
                    id TEXT PRIMARY KEY,
                    first_name TEXT NOT NULL DEFAULT '',
                    last_name TEXT NOT NULL DEFAULT '',
                    created_at INTEGER NOT NULL
                )",
                // One password identity per user
                "CREATE TABLE accounts (
                    id TEXT PRIMARY KEY,
                    user_id TEXT UNIQUE NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                    email TEXT UNIQUE NOT NULL COLLATE NOCASE,
                    hashed_password TEXT NOT NULL,
                    email_verified INTEGER NOT NULL DEFAULT 0,
                    created_at INTEGER NOT NULL
                )",
                "CREATE INDEX idx_accounts_email ON accounts(email)",
                // One row per sign-in; refresh_token is overwritten on rotation
                "CREATE TABLE sessions (
                    id TEXT PRIMARY KEY,
                    owner_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                    refresh_token TEXT NOT NULL,
                    user_agent TEXT NOT NULL DEFAULT '',
                    client_ip TEXT NOT NULL DEFAULT '',
                    is_blocked INTEGER NOT NULL DEFAULT 0,
                    expires_at INTEGER NOT NULL,
                    created_at INTEGER NOT NULL
                )",
                "CREATE INDEX idx_sessions_owner_id ON sessions(owner_id)",
                "CREATE INDEX idx_sessions_expires_at ON sessions(expires_at)",
                "CREATE TABLE email_otps (
                    id TEXT PRIMARY KEY,
                    email TEXT NOT NULL COLLATE NOCASE,
                    code TEXT NOT NULL,
                    used INTEGER NOT NULL DEFAULT 0,
                    expires_at INTEGER NOT NULL,
                    created_at INTEGER NOT NULL
                )",
                "CREATE INDEX idx_email_otps_email ON email_otps(email)",
            ],
        )
        .await
    }

    async fn migrate_v2(&self) -> Result<(), sqlx::Error> {
        self.run_migration(
            2,
            &[
                "CREATE TABLE password_resets (
                    id TEXT PRIMARY KEY,
                    email TEXT NOT NULL COLLATE NOCASE,
                    token TEXT UNIQUE NOT NULL,
                    used INTEGER NOT NULL DEFAULT 0,
                    expires_at INTEGER NOT NULL,
                    created_at INTEGER NOT NULL
                )",
                "CREATE INDEX idx_password_resets_email ON password_resets(email)",
            ],
        )
        .await
    }

    /// Get the account store.
    pub fn accounts(&self) -> AccountStore {
        AccountStore::new(self.pool.clone())
    }

    /// Get the session store.
    pub fn sessions(&self) -> SqliteSessionStore {
        SqliteSessionStore::new(self.pool.clone())
    }

    /// Get the email OTP store.
    pub fn email_otps(&self) -> EmailOtpStore {
        EmailOtpStore::new(self.pool.clone())
    }

    /// Get the password reset store.
    pub fn password_resets(&self) -> PasswordResetStore {
        PasswordResetStore::new(self.pool.clone())
    }

    /// Get the underlying connection pool (for tests that need raw SQL access).
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}
