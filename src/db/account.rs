use async_trait::async_trait;
use sqlx::sqlite::SqlitePool;

use crate::jwt::unix_now;
use crate::lifecycle::{Account, AccountDirectory, StoreError};

#[derive(Clone)]
pub struct AccountStore {
    pool: SqlitePool,
}

#[derive(sqlx::FromRow)]
struct AccountRow {
    id: String,
    user_id: String,
    email: String,
    hashed_password: String,
    email_verified: i32,
}

impl From<AccountRow> for Account {
    fn from(row: AccountRow) -> Self {
        Account {
            id: row.id,
            user_id: row.user_id,
            email: row.email,
            password_hash: row.hashed_password,
            email_verified: row.email_verified != 0,
        }
    }
}

const SELECT_ACCOUNT: &str =
    "SELECT id, user_id, email, hashed_password, email_verified FROM accounts";

impl AccountStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a user and its password account in one transaction.
    /// The account starts unverified.
    pub async fn create_with_user(
        &self,
        email: &str,
        hashed_password: &str,
        first_name: &str,
        last_name: &str,
    ) -> Result<Account, sqlx::Error> {
        let now = unix_now() as i64;
        let user_id = uuid::Uuid::new_v4().to_string();
        let account_id = uuid::Uuid::new_v4().to_string();

        let mut tx = self.pool.begin().await?;

        sqlx::query("INSERT INTO users (id, first_name, last_name, created_at) VALUES (?, ?, ?, ?)")
            .bind(&user_id)
            .bind(first_name)
            .bind(last_name)
            .bind(now)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            "INSERT INTO accounts (id, user_id, email, hashed_password, email_verified, created_at) VALUES (?, ?, ?, ?, 0, ?)",
        )
        .bind(&account_id)
        .bind(&user_id)
        .bind(email)
        .bind(hashed_password)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(Account {
            id: account_id,
            user_id,
            email: email.to_string(),
            password_hash: hashed_password.to_string(),
            email_verified: false,
        })
    }

    /// Get an account by email (case-insensitive).
    pub async fn get_by_email(&self, email: &str) -> Result<Option<Account>, sqlx::Error> {
        let row: Option<AccountRow> =
            sqlx::query_as(&format!("{} WHERE email = ? COLLATE NOCASE", SELECT_ACCOUNT))
                .bind(email)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(Account::from))
    }

    pub async fn get_by_user_id(&self, user_id: &str) -> Result<Option<Account>, sqlx::Error> {
        let row: Option<AccountRow> =
            sqlx::query_as(&format!("{} WHERE user_id = ?", SELECT_ACCOUNT))
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(Account::from))
    }

    /// Check whether an email is already registered.
    pub async fn email_exists(&self, email: &str) -> Result<bool, sqlx::Error> {
        let result: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM accounts WHERE email = ? COLLATE NOCASE")
                .bind(email)
                .fetch_one(&self.pool)
                .await?;
        Ok(result.0 > 0)
    }

    /// Mark the account's email as verified. Returns false if no account matched.
    pub async fn mark_email_verified(&self, email: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE accounts SET email_verified = 1 WHERE email = ? COLLATE NOCASE",
        )
        .bind(email)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Replace the stored password hash. Returns false if no account matched.
    pub async fn update_password(
        &self,
        email: &str,
        hashed_password: &str,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE accounts SET hashed_password = ? WHERE email = ? COLLATE NOCASE",
        )
        .bind(hashed_password)
        .bind(email)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl AccountDirectory for AccountStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<Account>, StoreError> {
        Ok(self.get_by_email(email).await?)
    }

    async fn find_by_user_id(&self, user_id: &str) -> Result<Option<Account>, StoreError> {
        Ok(self.get_by_user_id(user_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use crate::db::Database;

    #[tokio::test]
    async fn test_email_lookup_is_case_insensitive() {
        let db = Database::open(":memory:").await.unwrap();
        let accounts = db.accounts();

        let created = accounts
            .create_with_user("Alice@Example.com", "hash", "Alice", "")
            .await
            .unwrap();

        let found = accounts.get_by_email("alice@example.com").await.unwrap().unwrap();
        assert_eq!(found.id, created.id);
        assert!(accounts.email_exists("ALICE@EXAMPLE.COM").await.unwrap());
    }

    #[tokio::test]
    async fn test_duplicate_email_rejected() {
        let db = Database::open(":memory:").await.unwrap();
        let accounts = db.accounts();

        accounts
            .create_with_user("bob@example.com", "hash", "Bob", "")
            .await
            .unwrap();
        let result = accounts
            .create_with_user("BOB@example.com", "hash", "Bob", "")
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_mark_email_verified() {
        let db = Database::open(":memory:").await.unwrap();
        let accounts = db.accounts();

        let created = accounts
            .create_with_user("carol@example.com", "hash", "Carol", "")
            .await
            .unwrap();
        assert!(!created.email_verified);

        assert!(accounts.mark_email_verified("carol@example.com").await.unwrap());
        let found = accounts.get_by_user_id(&created.user_id).await.unwrap().unwrap();
        assert!(found.email_verified);

        assert!(!accounts.mark_email_verified("nobody@example.com").await.unwrap());
    }

    #[tokio::test]
    async fn test_update_password() {
        let db = Database::open(":memory:").await.unwrap();
        let accounts = db.accounts();

        accounts
            .create_with_user("dave@example.com", "old-hash", "Dave", "")
            .await
            .unwrap();

        assert!(accounts.update_password("DAVE@example.com", "new-hash").await.unwrap());
        let found = accounts.get_by_email("dave@example.com").await.unwrap().unwrap();
        assert_eq!(found.password_hash, "new-hash");

        assert!(!accounts.update_password("nobody@example.com", "x").await.unwrap());
    }
}
