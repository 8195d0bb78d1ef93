//! Authentication error responses.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use tracing::{debug, error};

use super::cookie::clear_token_cookies;
use crate::lifecycle::AuthError;

/// Rejection from the auth middleware. Renders JSON and clears both cookies,
/// except on a session mismatch.
#[derive(Debug)]
pub struct ApiAuthError {
    error: AuthError,
    secure_cookies: bool,
}

impl ApiAuthError {
    pub fn new(error: AuthError, secure_cookies: bool) -> Self {
        Self {
            error,
            secure_cookies,
        }
    }

    pub fn error(&self) -> &AuthError {
        &self.error
    }

    fn status_code(&self) -> StatusCode {
        if self.error.is_rejection() {
            StatusCode::UNAUTHORIZED
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }

    /// A mismatch is what a request that lost a rotation race sees; the
    /// client may already hold the winner's pair, which must survive.
    fn clears_cookies(&self) -> bool {
        !matches!(self.error, AuthError::SessionMismatch)
    }

    fn message(&self) -> &'static str {
        if self.error.is_rejection() {
            "Unauthorized"
        } else {
            "Internal server error"
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: &'static str,
}

impl IntoResponse for ApiAuthError {
    fn into_response(self) -> Response {
        if self.error.is_rejection() {
            debug!(code = self.error.code(), "Request rejected");
        } else {
            error!(code = self.error.code(), error = %self.error, "Authentication failed");
        }

        let mut response = (
            self.status_code(),
            Json(ErrorResponse {
                error: self.message(),
            }),
        )
            .into_response();

        if self.clears_cookies() {
            clear_token_cookies(response.headers_mut(), self.secure_cookies);
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::header;

    fn set_cookie_count(error: AuthError) -> usize {
        let response = ApiAuthError::new(error, false).into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        response.headers().get_all(header::SET_COOKIE).iter().count()
    }

    #[test]
    fn test_rejections_clear_cookies() {
        assert_eq!(set_cookie_count(AuthError::TokenInvalid), 2);
        assert_eq!(set_cookie_count(AuthError::SessionBlocked), 2);
        assert_eq!(set_cookie_count(AuthError::SessionExpired), 2);
    }

    #[test]
    fn test_session_mismatch_keeps_cookies() {
        assert_eq!(set_cookie_count(AuthError::SessionMismatch), 0);
    }
}
