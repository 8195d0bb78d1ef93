//! Request authentication middleware and extractor.

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{StatusCode, header, request::Parts},
    middleware::Next,
    response::Response,
};
use tracing::error;

use super::cookie::{access_token, refresh_token, set_token_cookies};
use super::errors::ApiAuthError;
use super::ip::client_metadata;
use super::state::HasAuthBackend;
use crate::lifecycle::{AuthenticatedSubject, ClientMetadata};

/// Middleware for routes that require authentication.
///
/// Verifies the access token, silently refreshing with the refresh token
/// when it has expired. The subject is inserted into request extensions for
/// the [`Auth`] extractor. After a silent refresh the new pair is appended to
/// the response as cookies, unless the handler already set cookies itself.
pub async fn require_auth<S>(
    State(state): State<S>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiAuthError>
where
    S: HasAuthBackend + Clone + Send + Sync + 'static,
{
    let secure = state.secure_cookies();

    let access = access_token(request.headers()).map(str::to_owned);
    let refresh = refresh_token(request.headers()).map(str::to_owned);

    let authentication = state
        .auth()
        .authenticate(access.as_deref(), refresh.as_deref())
        .await
        .map_err(|e| ApiAuthError::new(e, secure))?;

    request.extensions_mut().insert(authentication.subject);

    let mut response = next.run(request).await;

    if let Some(issued) = authentication.rotated {
        if !response.headers().contains_key(header::SET_COOKIE) {
            set_token_cookies(response.headers_mut(), &issued, secure);
        }
    }

    Ok(response)
}

/// Extractor for the subject authenticated by [`require_auth`].
pub struct Auth(pub AuthenticatedSubject);

impl<S> FromRequestParts<S> for Auth
where
    S: Send + Sync,
{
    type Rejection = StatusCode;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        match parts.extensions.get::<AuthenticatedSubject>() {
            Some(subject) => Ok(Auth(subject.clone())),
            None => {
                error!("Auth extractor used on a route without require_auth");
                Err(StatusCode::INTERNAL_SERVER_ERROR)
            }
        }
    }
}

/// Extractor for the user agent and IP recorded on new sessions.
pub struct Client(pub ClientMetadata);

impl<S> FromRequestParts<S> for Client
where
    S: HasAuthBackend + Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        Ok(Client(client_metadata(parts, state.trust_forwarded_for())))
    }
}
