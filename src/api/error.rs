//! Shared error handling for API endpoints.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use tracing::{debug, error};

use crate::lifecycle::AuthError;
use crate::registration::RegistrationError;

/// API error type with automatic response conversion.
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Unauthorized(String),
    Forbidden(String),
    NotFound(String),
    Conflict(String),
    Internal(String),
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::Unauthorized(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn internal(context: &str, e: impl std::fmt::Display) -> Self {
        error!("{}: {}", context, e);
        Self::Internal("Internal server error".into())
    }
}

impl From<AuthError> for ApiError {
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::InvalidCredentials => {
                debug!(code = e.code(), "Sign-in rejected");
                Self::Unauthorized("Invalid email or password".into())
            }
            AuthError::EmailNotVerified => {
                debug!(code = e.code(), "Sign-in rejected");
                Self::Forbidden("Email not verified".into())
            }
            AuthError::Issue(_) | AuthError::Store(_) => Self::internal(e.code(), &e),
            _ => {
                debug!(code = e.code(), "Request rejected");
                Self::Unauthorized("Unauthorized".into())
            }
        }
    }
}

impl From<RegistrationError> for ApiError {
    fn from(e: RegistrationError) -> Self {
        match e {
            RegistrationError::InvalidEmail
            | RegistrationError::WeakPassword
            | RegistrationError::InvalidName(_)
            | RegistrationError::InvalidCode
            | RegistrationError::InvalidResetToken
            | RegistrationError::PasswordMismatch => Self::BadRequest(e.to_string()),
            RegistrationError::EmailTaken => Self::Conflict("Email already registered".into()),
            RegistrationError::AccountNotFound => Self::NotFound("Account not found".into()),
            RegistrationError::Credential(_)
            | RegistrationError::Mail(_)
            | RegistrationError::Database(_) => Self::internal("Registration failed", &e),
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };
        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(e: impl Into<ApiError>) -> StatusCode {
        e.into().into_response().status()
    }

    #[test]
    fn test_auth_error_statuses() {
        assert_eq!(status(AuthError::InvalidCredentials), StatusCode::UNAUTHORIZED);
        assert_eq!(status(AuthError::EmailNotVerified), StatusCode::FORBIDDEN);
        assert_eq!(status(AuthError::SessionBlocked), StatusCode::UNAUTHORIZED);
        assert_eq!(status(AuthError::SessionMismatch), StatusCode::UNAUTHORIZED);
        assert_eq!(status(AuthError::TokenExpired), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn test_registration_error_statuses() {
        assert_eq!(status(RegistrationError::WeakPassword), StatusCode::BAD_REQUEST);
        assert_eq!(status(RegistrationError::EmailTaken), StatusCode::CONFLICT);
        assert_eq!(status(RegistrationError::AccountNotFound), StatusCode::NOT_FOUND);
        assert_eq!(status(RegistrationError::InvalidCode), StatusCode::BAD_REQUEST);
        assert_eq!(status(RegistrationError::InvalidResetToken), StatusCode::BAD_REQUEST);
        assert_eq!(status(RegistrationError::PasswordMismatch), StatusCode::BAD_REQUEST);
    }
}
