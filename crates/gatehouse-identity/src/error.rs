//! Error types for identity operations
//!
//! Normalization itself never fails; these errors come from building the
//! inputs to it (subject identifiers, token payloads).

use thiserror::Error;

/// Identity error types.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentityError {
    /// Subject identifier was empty or whitespace
    #[error("Subject identifier must not be empty")]
    EmptySubject,

    /// ID token could not be decoded (malformed, bad encoding, etc.)
    #[error("Invalid token: {0}")]
    InvalidToken(String),

    /// Token payload was not a JSON object
    #[error("Token payload is not a claim set")]
    NotAClaimSet,
}

/// Result type for identity operations.
pub type IdentityResult<T> = Result<T, IdentityError>;

impl IdentityError {
    /// Get error code for diagnostics.
    pub fn error_code(&self) -> &'static str {
        match self {
            IdentityError::EmptySubject => "EMPTY_SUBJECT",
            IdentityError::InvalidToken(_) => "INVALID_TOKEN",
            IdentityError::NotAClaimSet => "NOT_A_CLAIM_SET",
        }
    }
}
