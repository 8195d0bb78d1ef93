//! Lifecycle error taxonomy.

use thiserror::Error;

use super::ports::StoreError;
use crate::jwt::TokenError;

#[derive(Debug, Error)]
pub enum AuthError {
    /// Unknown account or wrong password; deliberately indistinguishable.
    #[error("invalid email or password")]
    InvalidCredentials,
    #[error("email not verified")]
    EmailNotVerified,
    #[error("token missing")]
    TokenMissing,
    #[error("token has expired")]
    TokenExpired,
    #[error("token is invalid")]
    TokenInvalid,
    #[error("session not found")]
    SessionNotFound,
    #[error("session is blocked")]
    SessionBlocked,
    #[error("session has expired")]
    SessionExpired,
    #[error("refresh token does not match session")]
    SessionMismatch,
    #[error("failed to issue token: {0}")]
    Issue(#[source] TokenError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl AuthError {
    /// Stable code for logs. Never sent to clients.
    pub fn code(&self) -> &'static str {
        match self {
            AuthError::InvalidCredentials => "AUTH_INVALID_CREDENTIALS",
            AuthError::EmailNotVerified => "AUTH_EMAIL_UNVERIFIED",
            AuthError::TokenMissing => "AUTH_TOKEN_MISSING",
            AuthError::TokenExpired => "AUTH_TOKEN_EXPIRED",
            AuthError::TokenInvalid => "AUTH_TOKEN_INVALID",
            AuthError::SessionNotFound => "AUTH_SESSION_NOT_FOUND",
            AuthError::SessionBlocked => "AUTH_SESSION_BLOCKED",
            AuthError::SessionExpired => "AUTH_SESSION_EXPIRED",
            AuthError::SessionMismatch => "AUTH_SESSION_MISMATCH",
            AuthError::Issue(_) => "AUTH_TOKEN_ISSUE_FAILED",
            AuthError::Store(_) => "AUTH_STORE_FAILED",
        }
    }

    /// Whether the error is a rejection of the caller rather than a server fault.
    pub fn is_rejection(&self) -> bool {
        !matches!(self, AuthError::Issue(_) | AuthError::Store(_))
    }
}

impl From<TokenError> for AuthError {
    fn from(e: TokenError) -> Self {
        match e {
            TokenError::Expired => AuthError::TokenExpired,
            TokenError::Invalid => AuthError::TokenInvalid,
            other => AuthError::Issue(other),
        }
    }
}
