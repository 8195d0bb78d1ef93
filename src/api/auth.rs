//! Sign-up, verification, password reset, sign-in, refresh and sign-out endpoints.

use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::{HeaderMap, HeaderValue, StatusCode, header},
    middleware,
    response::{IntoResponse, Response},
    routing::post,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::error::ApiError;
use crate::auth::{
    ApiAuthError, Auth, Client, clear_token_cookies, refresh_token, require_auth,
    set_token_cookies,
};
use crate::impl_has_auth_backend;
use crate::lifecycle::{AuthError, AuthService, IssuedTokens, RefreshRequest};
use crate::rate_limit::{RateLimitConfig, rate_limit_sign_in, rate_limit_sign_up};
use crate::registration::{Registration, ResetPassword, SignUp};

#[derive(Clone)]
pub struct AuthApiState {
    pub auth: AuthService,
    pub registration: Registration,
    pub secure_cookies: bool,
    pub trust_forwarded_for: bool,
    pub rate_limit_config: Arc<RateLimitConfig>,
}

impl_has_auth_backend!(AuthApiState);

pub fn router(state: AuthApiState) -> Router {
    let sign_up_routes = Router::new()
        .route("/sign-up", post(sign_up))
        .route("/send-otp", post(send_otp))
        .route("/forgot-password", post(forgot_password))
        .with_state(state.clone())
        .layer(middleware::from_fn_with_state(
            state.rate_limit_config.clone(),
            rate_limit_sign_up,
        ));

    let sign_in_routes = Router::new()
        .route("/sign-in", post(sign_in))
        .route("/verify-email", post(verify_email))
        .route("/refresh", post(refresh))
        .route("/verify-reset-token", post(verify_reset_token))
        .route("/reset-password", post(reset_password))
        .with_state(state.clone())
        .layer(middleware::from_fn_with_state(
            state.rate_limit_config.clone(),
            rate_limit_sign_in,
        ));

    let session_routes = Router::new()
        .route("/sign-out", post(sign_out))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_auth::<AuthApiState>,
        ))
        .with_state(state);

    Router::new()
        .merge(sign_up_routes)
        .merge(sign_in_routes)
        .merge(session_routes)
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignUpRequest {
    email: String,
    password: String,
    #[serde(default)]
    first_name: String,
    #[serde(default)]
    last_name: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SignUpResponse {
    id: String,
    email: String,
    email_verified: bool,
}

async fn sign_up(
    State(state): State<AuthApiState>,
    Json(payload): Json<SignUpRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let account = state
        .registration
        .sign_up(SignUp {
            email: payload.email.trim().to_string(),
            password: payload.password,
            first_name: payload.first_name.trim().to_string(),
            last_name: payload.last_name.trim().to_string(),
        })
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(SignUpResponse {
            id: account.user_id,
            email: account.email,
            email_verified: account.email_verified,
        }),
    ))
}

#[derive(Deserialize)]
struct SendOtpRequest {
    email: String,
}

#[derive(Serialize)]
struct MessageResponse {
    message: &'static str,
}

async fn send_otp(
    State(state): State<AuthApiState>,
    Json(payload): Json<SendOtpRequest>,
) -> Result<impl IntoResponse, ApiError> {
    state.registration.send_code(payload.email.trim()).await?;
    Ok(Json(MessageResponse {
        message: "Verification code sent",
    }))
}

#[derive(Deserialize)]
struct ForgotPasswordRequest {
    email: String,
}

/// Same answer whether or not the email is registered.
async fn forgot_password(
    State(state): State<AuthApiState>,
    Json(payload): Json<ForgotPasswordRequest>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .registration
        .forgot_password(payload.email.trim())
        .await?;
    Ok(Json(MessageResponse {
        message: "If your email is registered, you will receive a password reset link",
    }))
}

#[derive(Deserialize)]
struct VerifyResetTokenRequest {
    token: String,
}

async fn verify_reset_token(
    State(state): State<AuthApiState>,
    Json(payload): Json<VerifyResetTokenRequest>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .registration
        .verify_reset_token(payload.token.trim())
        .await?;
    Ok(Json(MessageResponse {
        message: "Token is valid",
    }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResetPasswordRequest {
    token: String,
    password: String,
    confirm_password: String,
}

async fn reset_password(
    State(state): State<AuthApiState>,
    Json(payload): Json<ResetPasswordRequest>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .registration
        .reset_password(ResetPassword {
            token: payload.token.trim().to_string(),
            password: payload.password,
            confirm_password: payload.confirm_password,
        })
        .await?;
    Ok(Json(MessageResponse {
        message: "Your password has been reset successfully",
    }))
}

#[derive(Deserialize)]
struct VerifyEmailRequest {
    email: String,
    otp: String,
}

async fn verify_email(
    State(state): State<AuthApiState>,
    Client(client): Client,
    Json(payload): Json<VerifyEmailRequest>,
) -> Result<Response, ApiError> {
    let account = state
        .registration
        .verify_email(payload.email.trim(), payload.otp.trim())
        .await?;

    let issued = state
        .auth
        .open_session(&account.user_id, &account.email, client)
        .await?;

    Ok(session_response(&issued, state.secure_cookies))
}

#[derive(Deserialize)]
struct SignInRequest {
    email: String,
    password: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SignInResponse {
    access_token: String,
    refresh_token: String,
    session_id: String,
    user: SignInUser,
}

#[derive(Serialize)]
struct SignInUser {
    id: String,
    email: String,
}

async fn sign_in(
    State(state): State<AuthApiState>,
    Client(client): Client,
    Json(payload): Json<SignInRequest>,
) -> Result<Response, ApiError> {
    if payload.email.trim().is_empty() || payload.password.is_empty() {
        return Err(ApiError::bad_request("Email and password are required"));
    }

    let issued = state
        .auth
        .sign_in(payload.email.trim(), &payload.password, client)
        .await?;

    Ok(session_response(&issued, state.secure_cookies))
}

/// Sign-in style response: JSON body, both cookies and a Bearer header.
fn session_response(issued: &IssuedTokens, secure: bool) -> Response {
    let mut response = Json(SignInResponse {
        access_token: issued.access_token.clone(),
        refresh_token: issued.refresh_token.clone(),
        session_id: issued.session_id.clone(),
        user: SignInUser {
            id: issued.access.sub.clone(),
            email: issued.access.email.clone(),
        },
    })
    .into_response();

    append_tokens(response.headers_mut(), issued, secure);
    response
}

fn append_tokens(headers: &mut HeaderMap, issued: &IssuedTokens, secure: bool) {
    set_token_cookies(headers, issued, secure);
    if let Ok(value) = HeaderValue::from_str(&format!("Bearer {}", issued.access_token)) {
        headers.insert(header::AUTHORIZATION, value);
    }
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct RefreshBody {
    session_id: Option<String>,
    refresh_token: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RefreshResponse {
    access_token: String,
    refresh_token: String,
}

/// Pick the refresh source: body session ID, then body token, then the
/// `Refresh` cookie or header.
fn refresh_request(body: RefreshBody, headers: &HeaderMap) -> Option<RefreshRequest> {
    let non_empty = |v: Option<String>| v.filter(|s| !s.trim().is_empty());

    if let Some(id) = non_empty(body.session_id) {
        return Some(RefreshRequest::SessionId(id));
    }
    if let Some(token) = non_empty(body.refresh_token) {
        return Some(RefreshRequest::RefreshToken(token));
    }
    refresh_token(headers).map(|t| RefreshRequest::RefreshToken(t.to_string()))
}

async fn refresh(
    State(state): State<AuthApiState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, Response> {
    let secure = state.secure_cookies;

    let body: RefreshBody = if body.is_empty() {
        RefreshBody::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|_| ApiError::bad_request("Invalid request body").into_response())?
    };

    let request = refresh_request(body, &headers)
        .ok_or_else(|| ApiAuthError::new(AuthError::TokenMissing, secure).into_response())?;

    let issued = state
        .auth
        .refresh_session(request)
        .await
        .map_err(|e| ApiAuthError::new(e, secure).into_response())?;

    let mut response = Json(RefreshResponse {
        access_token: issued.access_token.clone(),
        refresh_token: issued.refresh_token.clone(),
    })
    .into_response();

    append_tokens(response.headers_mut(), &issued, secure);
    Ok(response)
}

async fn sign_out(
    State(state): State<AuthApiState>,
    Auth(subject): Auth,
) -> Result<Response, ApiError> {
    if let Some(session_id) = subject.session_id.as_deref() {
        state.auth.sign_out(session_id).await?;
    }

    let mut response = StatusCode::NO_CONTENT.into_response();
    clear_token_cookies(response.headers_mut(), state.secure_cookies);
    Ok(response)
}
