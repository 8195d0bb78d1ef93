//! Password hashing via bcrypt.

use thiserror::Error;
use tracing::warn;

/// bcrypt cost factor used in production.
pub const DEFAULT_BCRYPT_COST: u32 = 10;

#[derive(Debug, Error)]
#[error("failed to hash password: {0}")]
pub struct CredentialError(#[from] bcrypt::BcryptError);

/// Hashes new passwords and checks candidates against stored hashes.
pub trait PasswordHasher: Send + Sync {
    fn hash_password(&self, plain: &str) -> Result<String, CredentialError>;

    fn verify_password(&self, candidate: &str, hash: &str) -> bool;
}

#[derive(Debug, Clone, Copy)]
pub struct BcryptHasher {
    cost: u32,
}

impl BcryptHasher {
    pub fn new(cost: u32) -> Self {
        Self { cost }
    }
}

impl Default for BcryptHasher {
    fn default() -> Self {
        Self::new(DEFAULT_BCRYPT_COST)
    }
}

impl PasswordHasher for BcryptHasher {
    fn hash_password(&self, plain: &str) -> Result<String, CredentialError> {
        Ok(bcrypt::hash(plain, self.cost)?)
    }

    fn verify_password(&self, candidate: &str, hash: &str) -> bool {
        match bcrypt::verify(candidate, hash) {
            Ok(matches) => matches,
            Err(e) => {
                warn!(error = %e, "Stored password hash could not be checked");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_and_verify() {
        let hasher = BcryptHasher::new(4);

        let hash = hasher.hash_password("secret1").unwrap();
        assert_ne!(hash, "secret1");
        assert!(hasher.verify_password("secret1", &hash));
        assert!(!hasher.verify_password("secret2", &hash));
    }

    #[test]
    fn test_malformed_hash_does_not_verify() {
        let hasher = BcryptHasher::new(4);
        assert!(!hasher.verify_password("secret1", "not-a-bcrypt-hash"));
    }
}
