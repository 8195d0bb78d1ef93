use axum::{Json, Router, extract::State, middleware, response::IntoResponse, routing::get};
use serde::Serialize;

use super::error::ApiError;
use crate::auth::{Auth, require_auth};
use crate::impl_has_auth_backend;
use crate::lifecycle::AuthService;

#[derive(Clone)]
pub struct UsersState {
    pub auth: AuthService,
    pub secure_cookies: bool,
    pub trust_forwarded_for: bool,
}

impl_has_auth_backend!(UsersState);

pub fn router(state: UsersState) -> Router {
    Router::new()
        .route("/me", get(me))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_auth::<UsersState>,
        ))
        .with_state(state)
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct MeResponse {
    id: String,
    email: String,
    email_verified: bool,
}

async fn me(
    State(state): State<UsersState>,
    Auth(subject): Auth,
) -> Result<impl IntoResponse, ApiError> {
    let account = state
        .auth
        .current_account(&subject.subject_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Account not found"))?;

    Ok(Json(MeResponse {
        id: account.user_id,
        email: account.email,
        email_verified: account.email_verified,
    }))
}
