//! Credential hashing port.

use crate::error::DomainError;

/// Password hashing service.
pub trait PasswordHasher: Send + Sync {
    /// Hash a plain text password.
    fn hash(&self, password: &str) -> Result<String, PasswordError>;

    /// Verify a password against a stored hash.
    fn verify(&self, password: &str, hash: &str) -> Result<bool, PasswordError>;
}

#[derive(Debug, thiserror::Error)]
pub enum PasswordError {
    #[error("Hashing error: {0}")]
    Hashing(String),

    #[error("Stored hash is malformed: {0}")]
    MalformedHash(String),
}

impl From<PasswordError> for DomainError {
    fn from(err: PasswordError) -> Self {
        DomainError::unclassified(err.to_string()).with_cause(err)
    }
}
