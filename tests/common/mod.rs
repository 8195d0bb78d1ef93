#![allow(dead_code)]

use async_trait::async_trait;
use axum::http::{HeaderMap, header};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokenward::db::Database;
use tokenward::jwt::{TokenCodec, unix_now};
use tokenward::lifecycle::{
    Account, AuthService, NewSession, Session, SessionStore, StoreError, TokenPolicy,
};
use tokenward::mailer::{MailError, VerificationMailer};
use tokenward::password::{BcryptHasher, PasswordHasher};
use tokenward::rate_limit::RateLimitConfig;
use tokenward::ServerConfig;

pub const ACCESS_SECRET: &[u8] = b"access-secret-for-testing-0123456789";
pub const REFRESH_SECRET: &[u8] = b"refresh-secret-for-testing-0123456789";
pub const PASSWORD: &str = "correct-horse";

/// Cheap bcrypt cost so tests stay fast.
pub const TEST_BCRYPT_COST: u32 = 4;

pub fn codec() -> TokenCodec {
    TokenCodec::new(ACCESS_SECRET, REFRESH_SECRET).unwrap()
}

pub async fn test_db() -> Database {
    Database::open(":memory:")
        .await
        .expect("Failed to open test database")
}

/// Create an account whose email is already verified.
pub async fn verified_account(db: &Database, email: &str) -> Account {
    let hash = BcryptHasher::new(TEST_BCRYPT_COST)
        .hash_password(PASSWORD)
        .unwrap();
    let accounts = db.accounts();
    accounts
        .create_with_user(email, &hash, "Test", "User")
        .await
        .unwrap();
    accounts.mark_email_verified(email).await.unwrap();
    accounts.get_by_email(email).await.unwrap().unwrap()
}

/// Service backed by the SQLite session store.
pub fn sqlite_service(db: &Database, policy: TokenPolicy) -> AuthService {
    service_with_store(db, Arc::new(db.sessions()), policy)
}

pub fn service_with_store(
    db: &Database,
    sessions: Arc<dyn SessionStore>,
    policy: TokenPolicy,
) -> AuthService {
    AuthService::new(
        Arc::new(codec()),
        sessions,
        Arc::new(db.accounts()),
        Arc::new(BcryptHasher::new(TEST_BCRYPT_COST)),
        policy,
    )
}

pub fn test_config(db: Database, mailer: Arc<dyn VerificationMailer>) -> ServerConfig {
    ServerConfig {
        db,
        access_secret: ACCESS_SECRET.to_vec(),
        refresh_secret: REFRESH_SECRET.to_vec(),
        policy: TokenPolicy::default(),
        secure_cookies: false,
        trust_forwarded_for: false,
        rate_limits: RateLimitConfig::relaxed(),
        mailer,
        bcrypt_cost: TEST_BCRYPT_COST,
    }
}

/// Mint an access token for `session_id` that expired a minute ago.
pub fn expired_access_token(subject_id: &str, email: &str, session_id: &str) -> String {
    let (token, _) = codec()
        .mint_at(
            unix_now() - 120,
            Some(session_id),
            subject_id,
            email,
            std::time::Duration::from_secs(60),
            tokenward::jwt::TokenKind::Access,
        )
        .unwrap();
    token
}

/// Values of all `Set-Cookie` headers, keyed by cookie name.
pub fn set_cookies(headers: &HeaderMap) -> HashMap<String, String> {
    headers
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .filter_map(|v| {
            let pair = v.split(';').next()?;
            let (name, value) = pair.split_once('=')?;
            Some((name.to_string(), value.to_string()))
        })
        .collect()
}

/// Mailer that remembers every code and reset token it was asked to send.
#[derive(Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<(String, String)>>,
    resets: Mutex<Vec<(String, String)>>,
}

impl RecordingMailer {
    pub fn last_code(&self, to: &str) -> Option<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|(email, _)| email == to)
            .map(|(_, code)| code.clone())
    }

    pub fn count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }

    pub fn last_reset(&self, to: &str) -> Option<String> {
        self.resets
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|(email, _)| email == to)
            .map(|(_, token)| token.clone())
    }

    pub fn reset_count(&self) -> usize {
        self.resets.lock().unwrap().len()
    }
}

#[async_trait]
impl VerificationMailer for RecordingMailer {
    async fn send_verification_code(
        &self,
        to: &str,
        code: &str,
        _expires_in_minutes: u64,
    ) -> Result<(), MailError> {
        self.sent
            .lock()
            .unwrap()
            .push((to.to_string(), code.to_string()));
        Ok(())
    }

    async fn send_password_reset(
        &self,
        to: &str,
        token: &str,
        _expires_in_minutes: u64,
    ) -> Result<(), MailError> {
        self.resets
            .lock()
            .unwrap()
            .push((to.to_string(), token.to_string()));
        Ok(())
    }
}

/// Mailer whose delivery always fails.
pub struct FailingMailer;

#[async_trait]
impl VerificationMailer for FailingMailer {
    async fn send_verification_code(
        &self,
        to: &str,
        _code: &str,
        _expires_in_minutes: u64,
    ) -> Result<(), MailError> {
        Err(MailError {
            to: to.to_string(),
            reason: "smtp unavailable".to_string(),
        })
    }

    async fn send_password_reset(
        &self,
        to: &str,
        _token: &str,
        _expires_in_minutes: u64,
    ) -> Result<(), MailError> {
        Err(MailError {
            to: to.to_string(),
            reason: "smtp unavailable".to_string(),
        })
    }
}

/// Session store kept in memory; relies on the trait's default rotation.
#[derive(Default)]
pub struct MemorySessionStore {
    sessions: Mutex<HashMap<String, Session>>,
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn create_session(&self, session: NewSession) -> Result<Session, StoreError> {
        let created = Session {
            id: session.id,
            owner_id: session.owner_id,
            refresh_token: session.refresh_token,
            is_blocked: false,
            expires_at: session.expires_at,
            client: session.client,
            created_at: unix_now(),
        };
        self.sessions
            .lock()
            .unwrap()
            .insert(created.id.clone(), created.clone());
        Ok(created)
    }

    async fn get_session(&self, id: &str) -> Result<Option<Session>, StoreError> {
        Ok(self.sessions.lock().unwrap().get(id).cloned())
    }

    async fn update_session_refresh_token(
        &self,
        id: &str,
        refresh_token: &str,
        expires_at: u64,
    ) -> Result<Option<Session>, StoreError> {
        let mut sessions = self.sessions.lock().unwrap();
        Ok(sessions.get_mut(id).map(|session| {
            session.refresh_token = refresh_token.to_string();
            session.expires_at = expires_at;
            session.clone()
        }))
    }

    async fn block_session(&self, id: &str) -> Result<bool, StoreError> {
        let mut sessions = self.sessions.lock().unwrap();
        Ok(sessions
            .get_mut(id)
            .map(|session| session.is_blocked = true)
            .is_some())
    }

    async fn delete_session(&self, id: &str) -> Result<bool, StoreError> {
        Ok(self.sessions.lock().unwrap().remove(id).is_some())
    }
}
