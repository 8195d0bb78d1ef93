//! Signed token minting and verification.
//!
//! Access and refresh tokens are HS256 JWTs signed with two independent
//! secrets, so a leaked access secret cannot be used to forge refresh tokens.

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, errors::ErrorKind};
use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error;

/// Minimum length of each signing secret, in bytes.
pub const MIN_SECRET_LENGTH: usize = 32;

/// Token kind discriminator carried in the `typ` claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    /// Short-lived token authorizing individual requests
    Access,
    /// Long-lived token used only to mint new pairs, bound to a session
    Refresh,
}

impl TokenKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenKind::Access => "access",
            TokenKind::Refresh => "refresh",
        }
    }
}

/// Claims carried inside a signed token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPayload {
    /// Unique token ID
    pub jti: String,
    /// Subject (authenticated principal ID)
    pub sub: String,
    /// Subject email, for display and logging only
    pub email: String,
    /// Token kind
    #[serde(rename = "typ")]
    pub kind: TokenKind,
    /// Session this token belongs to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sid: Option<String>,
    /// Issued at (Unix timestamp)
    pub iat: u64,
    /// Expiration time (Unix timestamp)
    pub exp: u64,
}

impl TokenPayload {
    /// Lifetime of the token in seconds.
    pub fn lifetime_secs(&self) -> u64 {
        self.exp.saturating_sub(self.iat)
    }
}

/// Signing keys for both token kinds.
pub struct TokenCodec {
    access_encoding: EncodingKey,
    access_decoding: DecodingKey,
    refresh_encoding: EncodingKey,
    refresh_decoding: DecodingKey,
}

impl TokenCodec {
    /// Build a codec from the access and refresh secrets.
    ///
    /// Fails when either secret is shorter than [`MIN_SECRET_LENGTH`] or when
    /// both secrets are the same.
    pub fn new(access_secret: &[u8], refresh_secret: &[u8]) -> Result<Self, KeyError> {
        if access_secret.len() < MIN_SECRET_LENGTH {
            return Err(KeyError::TooShort(TokenKind::Access));
        }
        if refresh_secret.len() < MIN_SECRET_LENGTH {
            return Err(KeyError::TooShort(TokenKind::Refresh));
        }
        if access_secret == refresh_secret {
            return Err(KeyError::SharedSecret);
        }

        Ok(Self {
            access_encoding: EncodingKey::from_secret(access_secret),
            access_decoding: DecodingKey::from_secret(access_secret),
            refresh_encoding: EncodingKey::from_secret(refresh_secret),
            refresh_decoding: DecodingKey::from_secret(refresh_secret),
        })
    }

    /// Mint a token of the given kind, issued now.
    pub fn mint(
        &self,
        session_id: Option<&str>,
        subject_id: &str,
        subject_email: &str,
        duration: Duration,
        kind: TokenKind,
    ) -> Result<(String, TokenPayload), TokenError> {
        self.mint_at(
            unix_now(),
            session_id,
            subject_id,
            subject_email,
            duration,
            kind,
        )
    }

    /// Mint a token with an explicit issuance time (Unix seconds).
    pub fn mint_at(
        &self,
        issued_at: u64,
        session_id: Option<&str>,
        subject_id: &str,
        subject_email: &str,
        duration: Duration,
        kind: TokenKind,
    ) -> Result<(String, TokenPayload), TokenError> {
        let secs = duration.as_secs();
        if secs == 0 {
            return Err(TokenError::ZeroDuration);
        }

        // Expiry is persisted as a signed 64-bit column
        let exp = issued_at
            .checked_add(secs)
            .filter(|exp| i64::try_from(*exp).is_ok())
            .ok_or(TokenError::DurationTooLong)?;

        let payload = TokenPayload {
            jti: uuid::Uuid::new_v4().to_string(),
            sub: subject_id.to_string(),
            email: subject_email.to_string(),
            kind,
            sid: session_id.map(str::to_string),
            iat: issued_at,
            exp,
        };

        let key = match kind {
            TokenKind::Access => &self.access_encoding,
            TokenKind::Refresh => &self.refresh_encoding,
        };
        let token = jsonwebtoken::encode(&Header::new(Algorithm::HS256), &payload, key)
            .map_err(TokenError::Encoding)?;

        Ok((token, payload))
    }

    /// Verify a token against the secret for `kind` and decode its claims.
    pub fn verify(&self, token: &str, kind: TokenKind) -> Result<TokenPayload, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;

        let key = match kind {
            TokenKind::Access => &self.access_decoding,
            TokenKind::Refresh => &self.refresh_decoding,
        };

        let payload = jsonwebtoken::decode::<TokenPayload>(token, key, &validation)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => TokenError::Expired,
                _ => TokenError::Invalid,
            })?
            .claims;

        if payload.kind != kind {
            return Err(TokenError::Invalid);
        }
        // Refresh tokens are only meaningful together with their session
        if kind == TokenKind::Refresh && payload.sid.is_none() {
            return Err(TokenError::Invalid);
        }

        Ok(payload)
    }
}

/// Current Unix time in seconds.
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Configuration errors raised while building a [`TokenCodec`].
#[derive(Debug, Error)]
pub enum KeyError {
    #[error("{} token secret must be at least {MIN_SECRET_LENGTH} bytes", .0.as_str())]
    TooShort(TokenKind),
    #[error("access and refresh tokens must use different secrets")]
    SharedSecret,
}

/// Errors that can occur while minting or verifying tokens.
#[derive(Debug, Error)]
pub enum TokenError {
    #[error("token has expired")]
    Expired,
    #[error("token is invalid")]
    Invalid,
    #[error("token duration must be at least one second")]
    ZeroDuration,
    #[error("token duration is too long")]
    DurationTooLong,
    #[error("failed to encode token: {0}")]
    Encoding(#[source] jsonwebtoken::errors::Error),
}
