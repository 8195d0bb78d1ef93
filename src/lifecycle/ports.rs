//! Storage seams consumed by the lifecycle coordinator.

use async_trait::async_trait;
use thiserror::Error;

/// Client details captured when a session is created.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientMetadata {
    pub user_agent: String,
    pub client_ip: String,
}

/// Server-side record of one authenticated client context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub id: String,
    /// Principal the session belongs to
    pub owner_id: String,
    /// The single refresh token currently valid for this session
    pub refresh_token: String,
    pub is_blocked: bool,
    /// Unix timestamp after which the session cannot be refreshed
    pub expires_at: u64,
    pub client: ClientMetadata,
    pub created_at: u64,
}

/// Fields required to create a session row.
#[derive(Debug, Clone)]
pub struct NewSession {
    pub id: String,
    pub owner_id: String,
    pub refresh_token: String,
    pub client: ClientMetadata,
    pub expires_at: u64,
}

/// Credentials record for one sign-in identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub id: String,
    pub user_id: String,
    pub email: String,
    pub password_hash: String,
    pub email_verified: bool,
}

/// Failure reported by a storage backend.
#[derive(Debug, Error)]
#[error("storage error: {0}")]
pub struct StoreError(#[source] Box<dyn std::error::Error + Send + Sync>);

impl StoreError {
    pub fn new(source: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self(Box::new(source))
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        Self::new(e)
    }
}

/// Persistence of session rows. Each operation touches a single row.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn create_session(&self, session: NewSession) -> Result<Session, StoreError>;

    async fn get_session(&self, id: &str) -> Result<Option<Session>, StoreError>;

    /// Overwrite the refresh token and expiry of a session.
    async fn update_session_refresh_token(
        &self,
        id: &str,
        refresh_token: &str,
        expires_at: u64,
    ) -> Result<Option<Session>, StoreError>;

    /// Replace the refresh token only if the stored one still equals
    /// `expected` and the session is not blocked. Returns `None` when the
    /// row is missing or the condition did not hold.
    ///
    /// The default implementation is not atomic; backends that can express a
    /// conditional update should override it.
    async fn rotate_refresh_token(
        &self,
        id: &str,
        expected: &str,
        refresh_token: &str,
        expires_at: u64,
    ) -> Result<Option<Session>, StoreError> {
        match self.get_session(id).await? {
            Some(session) if session.refresh_token == expected && !session.is_blocked => {
                self.update_session_refresh_token(id, refresh_token, expires_at)
                    .await
            }
            _ => Ok(None),
        }
    }

    /// Mark a session as blocked. Returns whether a row was changed.
    async fn block_session(&self, id: &str) -> Result<bool, StoreError>;

    /// Delete a session. Returns whether a row was removed.
    async fn delete_session(&self, id: &str) -> Result<bool, StoreError>;
}

/// Account lookups needed for sign-in.
#[async_trait]
pub trait AccountDirectory: Send + Sync {
    /// Case-insensitive lookup by email.
    async fn find_by_email(&self, email: &str) -> Result<Option<Account>, StoreError>;

    async fn find_by_user_id(&self, user_id: &str) -> Result<Option<Account>, StoreError>;
}
