//! Account registration, email verification and password reset.
//!
//! Sign-up creates the user and its password account, then best-effort
//! issues a one-time code. Verifying the code marks the account verified;
//! the caller then opens a session for it.
//!
//! A password reset is requested by email and completed with a random
//! single-use token. Completing it signs the account out everywhere.

use rand::Rng;
use rand::distr::Alphanumeric;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::db::Database;
use crate::jwt::unix_now;
use crate::lifecycle::Account;
use crate::mailer::{MailError, VerificationMailer};
use crate::password::{CredentialError, PasswordHasher};

/// How long a verification code stays valid.
pub const OTP_TTL: Duration = Duration::from_secs(15 * 60);

/// How long a password reset token stays valid.
pub const RESET_TTL: Duration = Duration::from_secs(60 * 60);

/// Length of a password reset token.
pub const RESET_TOKEN_LENGTH: usize = 64;

/// Minimum password length accepted at sign-up and reset.
pub const MIN_PASSWORD_LENGTH: usize = 6;

#[derive(Debug, Error)]
pub enum RegistrationError {
    #[error("invalid email address")]
    InvalidEmail,
    #[error("password must be at least {MIN_PASSWORD_LENGTH} characters long")]
    WeakPassword,
    #[error("{0} cannot contain spaces")]
    InvalidName(&'static str),
    #[error("email already registered")]
    EmailTaken,
    #[error("account not found")]
    AccountNotFound,
    #[error("invalid or expired verification code")]
    InvalidCode,
    #[error("invalid or expired reset token")]
    InvalidResetToken,
    #[error("passwords do not match")]
    PasswordMismatch,
    #[error(transparent)]
    Credential(#[from] CredentialError),
    #[error(transparent)]
    Mail(#[from] MailError),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Sign-up input.
#[derive(Debug, Clone, Default)]
pub struct SignUp {
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
}

impl SignUp {
    pub fn validate(&self) -> Result<(), RegistrationError> {
        if self.first_name.contains(' ') {
            return Err(RegistrationError::InvalidName("first name"));
        }
        if self.last_name.contains(' ') {
            return Err(RegistrationError::InvalidName("last name"));
        }
        if !is_valid_email(&self.email) {
            return Err(RegistrationError::InvalidEmail);
        }
        if self.password.chars().count() < MIN_PASSWORD_LENGTH {
            return Err(RegistrationError::WeakPassword);
        }
        Ok(())
    }
}

/// Loose structural check: one `@`, non-empty local part, dotted domain.
pub fn is_valid_email(email: &str) -> bool {
    if email.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && domain.split('.').count() >= 2
        && domain.split('.').all(|part| !part.is_empty())
}

/// Six-digit numeric code.
pub fn generate_otp() -> String {
    rand::rng().random_range(100_000..=999_999).to_string()
}

/// Random alphanumeric password reset token.
pub fn generate_reset_token() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(RESET_TOKEN_LENGTH)
        .map(char::from)
        .collect()
}

/// Password reset completion input.
#[derive(Debug, Clone, Default)]
pub struct ResetPassword {
    pub token: String,
    pub password: String,
    pub confirm_password: String,
}

impl ResetPassword {
    pub fn validate(&self) -> Result<(), RegistrationError> {
        if self.token.is_empty() {
            return Err(RegistrationError::InvalidResetToken);
        }
        if self.password != self.confirm_password {
            return Err(RegistrationError::PasswordMismatch);
        }
        if self.password.chars().count() < MIN_PASSWORD_LENGTH {
            return Err(RegistrationError::WeakPassword);
        }
        Ok(())
    }
}

#[derive(Clone)]
pub struct Registration {
    db: Database,
    passwords: Arc<dyn PasswordHasher>,
    mailer: Arc<dyn VerificationMailer>,
}

impl Registration {
    pub fn new(
        db: Database,
        passwords: Arc<dyn PasswordHasher>,
        mailer: Arc<dyn VerificationMailer>,
    ) -> Self {
        Self {
            db,
            passwords,
            mailer,
        }
    }

    /// Create an unverified account and send it a verification code.
    ///
    /// A failure to store or deliver the code is logged and does not undo
    /// the account; the client can ask for a new code.
    pub async fn sign_up(&self, input: SignUp) -> Result<Account, RegistrationError> {
        input.validate()?;

        if self.db.accounts().email_exists(&input.email).await? {
            return Err(RegistrationError::EmailTaken);
        }

        let hash = self.passwords.hash_password(&input.password)?;
        let account = self
            .db
            .accounts()
            .create_with_user(&input.email, &hash, &input.first_name, &input.last_name)
            .await
            .map_err(|e| {
                if e.as_database_error()
                    .is_some_and(|db| db.is_unique_violation())
                {
                    RegistrationError::EmailTaken
                } else {
                    RegistrationError::Database(e)
                }
            })?;

        info!(subject_id = %account.user_id, "Account registered");

        if let Err(e) = self.issue_code(&account.email).await {
            warn!(subject_id = %account.user_id, error = %e, "Verification code not sent after sign-up");
        }

        Ok(account)
    }

    /// Issue a fresh verification code for an existing account.
    pub async fn send_code(&self, email: &str) -> Result<(), RegistrationError> {
        if !is_valid_email(email) {
            return Err(RegistrationError::InvalidEmail);
        }

        let account = self
            .db
            .accounts()
            .get_by_email(email)
            .await?
            .ok_or(RegistrationError::AccountNotFound)?;

        self.issue_code(&account.email).await
    }

    /// Check a code and mark the account's email as verified.
    pub async fn verify_email(&self, email: &str, code: &str) -> Result<Account, RegistrationError> {
        if code.is_empty() {
            return Err(RegistrationError::InvalidCode);
        }

        let otp = self
            .db
            .email_otps()
            .latest_active(email, unix_now())
            .await?
            .ok_or(RegistrationError::InvalidCode)?;

        if otp.code != code {
            return Err(RegistrationError::InvalidCode);
        }

        // A concurrent verification may have consumed it first
        if !self.db.email_otps().mark_used(&otp.id).await? {
            return Err(RegistrationError::InvalidCode);
        }

        let accounts = self.db.accounts();
        if !accounts.mark_email_verified(email).await? {
            return Err(RegistrationError::AccountNotFound);
        }

        let account = accounts
            .get_by_email(email)
            .await?
            .ok_or(RegistrationError::AccountNotFound)?;

        info!(subject_id = %account.user_id, "Email verified");
        Ok(account)
    }

    /// Start a password reset.
    ///
    /// Unknown emails succeed silently, so the answer never reveals which
    /// addresses are registered. Delivery failures are logged, not returned.
    pub async fn forgot_password(&self, email: &str) -> Result<(), RegistrationError> {
        if !is_valid_email(email) {
            return Err(RegistrationError::InvalidEmail);
        }

        let Some(account) = self.db.accounts().get_by_email(email).await? else {
            debug!("Password reset requested for unknown account");
            return Ok(());
        };

        let token = generate_reset_token();
        let now = unix_now();
        self.db
            .password_resets()
            .create(&account.email, &token, now, now + RESET_TTL.as_secs())
            .await?;

        if let Err(e) = self
            .mailer
            .send_password_reset(&account.email, &token, RESET_TTL.as_secs() / 60)
            .await
        {
            warn!(subject_id = %account.user_id, error = %e, "Password reset email not sent");
        }

        info!(subject_id = %account.user_id, "Password reset requested");
        Ok(())
    }

    /// Check that a reset token is still usable without consuming it.
    pub async fn verify_reset_token(&self, token: &str) -> Result<(), RegistrationError> {
        if token.is_empty() {
            return Err(RegistrationError::InvalidResetToken);
        }

        self.db
            .password_resets()
            .get_active(token, unix_now())
            .await?
            .map(|_| ())
            .ok_or(RegistrationError::InvalidResetToken)
    }

    /// Consume a reset token and set a new password.
    ///
    /// Every session of the account is deleted, so refresh tokens issued
    /// before the reset stop working.
    pub async fn reset_password(&self, input: ResetPassword) -> Result<Account, RegistrationError> {
        input.validate()?;

        let resets = self.db.password_resets();
        let reset = resets
            .get_active(&input.token, unix_now())
            .await?
            .ok_or(RegistrationError::InvalidResetToken)?;

        // A concurrent reset may have consumed it first
        if !resets.mark_used(&reset.id).await? {
            return Err(RegistrationError::InvalidResetToken);
        }

        let hash = self.passwords.hash_password(&input.password)?;

        let accounts = self.db.accounts();
        if !accounts.update_password(&reset.email, &hash).await? {
            return Err(RegistrationError::AccountNotFound);
        }

        let account = accounts
            .get_by_email(&reset.email)
            .await?
            .ok_or(RegistrationError::AccountNotFound)?;

        let revoked = self.db.sessions().delete_by_owner(&account.user_id).await?;

        info!(
            subject_id = %account.user_id,
            revoked_sessions = revoked,
            "Password reset completed"
        );
        Ok(account)
    }

    async fn issue_code(&self, email: &str) -> Result<(), RegistrationError> {
        let code = generate_otp();
        let now = unix_now();
        self.db
            .email_otps()
            .create(email, &code, now, now + OTP_TTL.as_secs())
            .await?;

        self.mailer
            .send_verification_code(email, &code, OTP_TTL.as_secs() / 60)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_email_validation() {
        assert!(is_valid_email("alice@example.com"));
        assert!(is_valid_email("a.b+c@mail.example.org"));
        assert!(!is_valid_email("alice"));
        assert!(!is_valid_email("alice@"));
        assert!(!is_valid_email("@example.com"));
        assert!(!is_valid_email("alice@example"));
        assert!(!is_valid_email("alice@@example.com"));
        assert!(!is_valid_email("al ice@example.com"));
        assert!(!is_valid_email("alice@example..com"));
    }

    #[test]
    fn test_sign_up_validation() {
        let valid = SignUp {
            email: "alice@example.com".into(),
            password: "secret1".into(),
            first_name: "Alice".into(),
            last_name: "Smith".into(),
        };
        assert!(valid.validate().is_ok());

        let short = SignUp {
            password: "12345".into(),
            ..valid.clone()
        };
        assert!(matches!(short.validate(), Err(RegistrationError::WeakPassword)));

        let spaced = SignUp {
            first_name: "Mary Ann".into(),
            ..valid.clone()
        };
        assert!(matches!(
            spaced.validate(),
            Err(RegistrationError::InvalidName("first name"))
        ));
    }

    #[test]
    fn test_reset_password_validation() {
        let valid = ResetPassword {
            token: "token".into(),
            password: "secret1".into(),
            confirm_password: "secret1".into(),
        };
        assert!(valid.validate().is_ok());

        let mismatched = ResetPassword {
            confirm_password: "secret2".into(),
            ..valid.clone()
        };
        assert!(matches!(
            mismatched.validate(),
            Err(RegistrationError::PasswordMismatch)
        ));

        let short = ResetPassword {
            password: "abc".into(),
            confirm_password: "abc".into(),
            ..valid.clone()
        };
        assert!(matches!(short.validate(), Err(RegistrationError::WeakPassword)));

        let missing = ResetPassword {
            token: String::new(),
            ..valid
        };
        assert!(matches!(
            missing.validate(),
            Err(RegistrationError::InvalidResetToken)
        ));
    }

    #[test]
    fn test_generate_reset_token() {
        let first = generate_reset_token();
        let second = generate_reset_token();
        assert_eq!(first.len(), RESET_TOKEN_LENGTH);
        assert!(first.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(first, second);
    }

    #[test]
    fn test_generate_otp_is_six_digits() {
        for _ in 0..100 {
            let code = generate_otp();
            assert_eq!(code.len(), 6);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
            assert!(!code.starts_with('0'));
        }
    }
}
