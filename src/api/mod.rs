mod auth;
mod error;
mod users;

use axum::Router;
use std::sync::Arc;

use crate::lifecycle::AuthService;
use crate::rate_limit::RateLimitConfig;
use crate::registration::Registration;

pub use auth::AuthApiState;
pub use error::ApiError;
pub use users::UsersState;

/// Create the API router.
pub fn create_api_router(
    auth: AuthService,
    registration: Registration,
    secure_cookies: bool,
    trust_forwarded_for: bool,
    rate_limit_config: Arc<RateLimitConfig>,
) -> Router {
    let auth_state = AuthApiState {
        auth: auth.clone(),
        registration,
        secure_cookies,
        trust_forwarded_for,
        rate_limit_config,
    };

    let users_state = UsersState {
        auth,
        secure_cookies,
        trust_forwarded_for,
    };

    Router::new()
        .nest("/auth", auth::router(auth_state))
        .nest("/users", users::router(users_state))
}
