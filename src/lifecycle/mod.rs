//! Token and session lifecycle.
//!
//! Sign-in mints an access/refresh pair and creates one session row holding
//! the refresh token. Refresh verifies the presented refresh token against
//! that row and rotates both tokens, overwriting the stored refresh token so
//! the previous one can never be used again. Request-time authentication
//! verifies the access token and, when it has merely expired, falls back to
//! the refresh protocol (silent refresh).
//!
//! `Session.expires_at` always equals the expiry of the refresh token it
//! currently holds, both at creation and after every rotation.

mod errors;
mod ports;

pub use errors::AuthError;
pub use ports::{
    Account, AccountDirectory, ClientMetadata, NewSession, Session, SessionStore, StoreError,
};

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::jwt::{TokenCodec, TokenError, TokenKind, TokenPayload, unix_now};
use crate::password::PasswordHasher;

/// Default access token lifetime: 15 minutes.
pub const DEFAULT_ACCESS_TTL: Duration = Duration::from_secs(15 * 60);

/// Default refresh token lifetime: 7 days.
pub const DEFAULT_REFRESH_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Token lifetimes and rotation behaviour.
#[derive(Debug, Clone, Copy)]
pub struct TokenPolicy {
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
    /// Block the session when an already-rotated refresh token is presented.
    pub revoke_on_reuse: bool,
}

impl Default for TokenPolicy {
    fn default() -> Self {
        Self {
            access_ttl: DEFAULT_ACCESS_TTL,
            refresh_ttl: DEFAULT_REFRESH_TTL,
            revoke_on_reuse: false,
        }
    }
}

/// A freshly minted token pair and the session it belongs to.
#[derive(Debug, Clone)]
pub struct IssuedTokens {
    pub session_id: String,
    pub access_token: String,
    pub access: TokenPayload,
    pub refresh_token: String,
    pub refresh: TokenPayload,
}

/// How the caller identifies the refresh token to use.
#[derive(Debug, Clone)]
pub enum RefreshRequest {
    /// Raw refresh token from a cookie, header or body
    RefreshToken(String),
    /// Session ID; the stored refresh token is used
    SessionId(String),
}

/// Typed request context for an authenticated request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedSubject {
    pub subject_id: String,
    pub subject_email: String,
    pub session_id: Option<String>,
}

impl From<&TokenPayload> for AuthenticatedSubject {
    fn from(payload: &TokenPayload) -> Self {
        Self {
            subject_id: payload.sub.clone(),
            subject_email: payload.email.clone(),
            session_id: payload.sid.clone(),
        }
    }
}

/// Outcome of request-time authentication.
#[derive(Debug, Clone)]
pub struct Authentication {
    pub subject: AuthenticatedSubject,
    /// New pair to hand back to the client when a silent refresh happened
    pub rotated: Option<IssuedTokens>,
}

/// Orchestrates sign-in, refresh and request authentication.
#[derive(Clone)]
pub struct AuthService {
    codec: Arc<TokenCodec>,
    sessions: Arc<dyn SessionStore>,
    accounts: Arc<dyn AccountDirectory>,
    passwords: Arc<dyn PasswordHasher>,
    policy: TokenPolicy,
}

impl AuthService {
    pub fn new(
        codec: Arc<TokenCodec>,
        sessions: Arc<dyn SessionStore>,
        accounts: Arc<dyn AccountDirectory>,
        passwords: Arc<dyn PasswordHasher>,
        policy: TokenPolicy,
    ) -> Self {
        Self {
            codec,
            sessions,
            accounts,
            passwords,
            policy,
        }
    }

    /// Verify credentials and open a new session.
    pub async fn sign_in(
        &self,
        email: &str,
        password: &str,
        client: ClientMetadata,
    ) -> Result<IssuedTokens, AuthError> {
        let Some(account) = self.accounts.find_by_email(email).await? else {
            debug!("Sign-in for unknown account");
            return Err(AuthError::InvalidCredentials);
        };

        if !self
            .passwords
            .verify_password(password, &account.password_hash)
        {
            debug!(subject_id = %account.user_id, "Sign-in with wrong password");
            return Err(AuthError::InvalidCredentials);
        }

        if !account.email_verified {
            return Err(AuthError::EmailNotVerified);
        }

        self.open_session(&account.user_id, &account.email, client)
            .await
    }

    /// Mint a token pair and persist a new session holding the refresh token.
    pub async fn open_session(
        &self,
        subject_id: &str,
        subject_email: &str,
        client: ClientMetadata,
    ) -> Result<IssuedTokens, AuthError> {
        let session_id = uuid::Uuid::new_v4().to_string();
        let issued = self.mint_pair(&session_id, subject_id, subject_email)?;

        let session = self
            .sessions
            .create_session(NewSession {
                id: session_id,
                owner_id: subject_id.to_string(),
                refresh_token: issued.refresh_token.clone(),
                client,
                expires_at: issued.refresh.exp,
            })
            .await?;

        info!(
            session_id = %session.id,
            subject_id = %subject_id,
            client_ip = %session.client.client_ip,
            "Session opened"
        );

        Ok(issued)
    }

    /// Verify a refresh token against its session and rotate both tokens.
    pub async fn refresh_session(&self, request: RefreshRequest) -> Result<IssuedTokens, AuthError> {
        let (presented, requested_session) = match request {
            RefreshRequest::RefreshToken(token) => (token, None),
            RefreshRequest::SessionId(id) => {
                let session = self
                    .sessions
                    .get_session(&id)
                    .await?
                    .ok_or(AuthError::SessionNotFound)?;
                (session.refresh_token, Some(id))
            }
        };

        if presented.is_empty() {
            return Err(AuthError::TokenMissing);
        }

        let payload = self.codec.verify(&presented, TokenKind::Refresh)?;
        let session_id = payload.sid.as_deref().ok_or(AuthError::TokenInvalid)?;

        if let Some(requested) = requested_session.as_deref() {
            if requested != session_id {
                warn!(
                    session_id = %requested,
                    token_session_id = %session_id,
                    "Stored refresh token belongs to another session"
                );
                return Err(AuthError::SessionMismatch);
            }
        }

        let session = self
            .sessions
            .get_session(session_id)
            .await?
            .ok_or(AuthError::SessionNotFound)?;

        if session.is_blocked {
            return Err(AuthError::SessionBlocked);
        }

        if unix_now() > session.expires_at {
            return Err(AuthError::SessionExpired);
        }

        if session.refresh_token != presented {
            warn!(
                session_id = %session.id,
                subject_id = %payload.sub,
                "Rotated refresh token presented again"
            );
            if self.policy.revoke_on_reuse {
                self.block_after_reuse(&session.id).await;
            }
            return Err(AuthError::SessionMismatch);
        }

        if payload.sub != session.owner_id {
            warn!(
                session_id = %session.id,
                subject_id = %payload.sub,
                owner_id = %session.owner_id,
                "Refresh token subject does not own the session"
            );
            return Err(AuthError::SessionMismatch);
        }

        let issued = self.mint_pair(&session.id, &payload.sub, &payload.email)?;

        let rotated = self
            .sessions
            .rotate_refresh_token(
                &session.id,
                &presented,
                &issued.refresh_token,
                issued.refresh.exp,
            )
            .await?;

        if rotated.is_none() {
            // Another request rotated the session between our read and write
            debug!(session_id = %session.id, "Lost refresh rotation race");
            return Err(AuthError::SessionMismatch);
        }

        debug!(session_id = %session.id, "Session rotated");
        Ok(issued)
    }

    /// Authenticate a request from its access token, silently refreshing
    /// with the refresh token when the access token has expired.
    pub async fn authenticate(
        &self,
        access_token: Option<&str>,
        refresh_token: Option<&str>,
    ) -> Result<Authentication, AuthError> {
        let access_token = access_token
            .filter(|t| !t.is_empty())
            .ok_or(AuthError::TokenMissing)?;

        match self.codec.verify(access_token, TokenKind::Access) {
            Ok(payload) => Ok(Authentication {
                subject: AuthenticatedSubject::from(&payload),
                rotated: None,
            }),
            Err(TokenError::Expired) => {
                let refresh_token = refresh_token
                    .filter(|t| !t.is_empty())
                    .ok_or(AuthError::TokenExpired)?;

                let issued = self
                    .refresh_session(RefreshRequest::RefreshToken(refresh_token.to_string()))
                    .await?;

                debug!(session_id = %issued.session_id, "Silent refresh");

                Ok(Authentication {
                    subject: AuthenticatedSubject::from(&issued.access),
                    rotated: Some(issued),
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    /// End a session. Returns whether it existed.
    pub async fn sign_out(&self, session_id: &str) -> Result<bool, AuthError> {
        let deleted = self.sessions.delete_session(session_id).await?;
        if deleted {
            info!(session_id = %session_id, "Session closed");
        }
        Ok(deleted)
    }

    /// Look up the account behind an authenticated subject.
    pub async fn current_account(&self, subject_id: &str) -> Result<Option<Account>, AuthError> {
        Ok(self.accounts.find_by_user_id(subject_id).await?)
    }

    fn mint_pair(
        &self,
        session_id: &str,
        subject_id: &str,
        subject_email: &str,
    ) -> Result<IssuedTokens, AuthError> {
        let (access_token, access) = self.codec.mint(
            Some(session_id),
            subject_id,
            subject_email,
            self.policy.access_ttl,
            TokenKind::Access,
        )?;
        let (refresh_token, refresh) = self.codec.mint(
            Some(session_id),
            subject_id,
            subject_email,
            self.policy.refresh_ttl,
            TokenKind::Refresh,
        )?;

        Ok(IssuedTokens {
            session_id: session_id.to_string(),
            access_token,
            access,
            refresh_token,
            refresh,
        })
    }

    async fn block_after_reuse(&self, session_id: &str) {
        match self.sessions.block_session(session_id).await {
            Ok(_) => warn!(session_id = %session_id, "Session blocked after refresh token reuse"),
            Err(e) => warn!(session_id = %session_id, error = %e, "Failed to block session"),
        }
    }
}
