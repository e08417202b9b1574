//! Error types for the sign-in flow

use crate::platform::PlatformError;
use thiserror::Error;

/// Fallback shown when a sign-in fails without a server message.
pub const SIGN_IN_FAILED: &str = "Failed to sign in. Please check your credentials.";

/// Fallback shown when a registration fails without a server message.
pub const SIGN_UP_FAILED: &str = "Failed to sign up. Please try again.";

/// Fallback shown when a confirmation fails without a server message.
pub const CONFIRM_FAILED: &str = "Failed to confirm. Please check the code and try again.";

/// Fallback shown when sign-out fails without a server message.
pub const SIGN_OUT_FAILED: &str = "Failed to sign out. Please try again.";

/// Errors attached to a sign-in flow state.
///
/// These are user-facing: the display text is what a form shows.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthFlowError {
    /// Username or password rejected
    #[error("Failed to sign in. Please check your credentials.")]
    InvalidCredentials,

    /// Password and confirmation differ
    #[error("Passwords do not match.")]
    PasswordMismatch,

    /// Password under the minimum length
    #[error("Password must be at least 8 characters.")]
    PasswordTooShort,

    /// Confirmation code rejected
    #[error("{0}")]
    InvalidCode(String),

    /// Platform or transport failure, with the server message when available
    #[error("{0}")]
    NetworkError(String),

    /// Federated redirect could not be started or came back failed
    #[error("{0}")]
    FederatedSignInError(String),

    /// No session exists
    #[error("Your session has expired. Please sign in again.")]
    SessionExpired,

    /// A session exists but its identity could not be read
    #[error("Could not load your session: {0}")]
    ResolutionError(String),
}

/// Result type for sign-in flow operations.
pub type AuthFlowResult<T> = Result<T, AuthFlowError>;

impl AuthFlowError {
    /// Get error code for diagnostics.
    pub fn error_code(&self) -> &'static str {
        match self {
            AuthFlowError::InvalidCredentials => "INVALID_CREDENTIALS",
            AuthFlowError::PasswordMismatch => "PASSWORD_MISMATCH",
            AuthFlowError::PasswordTooShort => "PASSWORD_TOO_SHORT",
            AuthFlowError::InvalidCode(_) => "INVALID_CODE",
            AuthFlowError::NetworkError(_) => "NETWORK_ERROR",
            AuthFlowError::FederatedSignInError(_) => "FEDERATED_SIGN_IN_ERROR",
            AuthFlowError::SessionExpired => "SESSION_EXPIRED",
            AuthFlowError::ResolutionError(_) => "RESOLUTION_ERROR",
        }
    }

    /// Check if the error was raised before any network call.
    pub fn is_local_validation(&self) -> bool {
        matches!(
            self,
            AuthFlowError::PasswordMismatch | AuthFlowError::PasswordTooShort
        )
    }

    /// Network error carrying the server message, or `fallback`.
    pub fn network(err: &PlatformError, fallback: &str) -> Self {
        AuthFlowError::NetworkError(err.server_message().unwrap_or(fallback).to_string())
    }

    /// Map a failed credential sign-in.
    pub fn from_sign_in(err: &PlatformError) -> Self {
        match err {
            PlatformError::NotAuthorized(_) | PlatformError::UserNotFound(_) => {
                AuthFlowError::InvalidCredentials
            }
            other => Self::network(other, SIGN_IN_FAILED),
        }
    }

    /// Map a failed registration.
    pub fn from_sign_up(err: &PlatformError) -> Self {
        Self::network(err, SIGN_UP_FAILED)
    }

    /// Map a failed confirmation.
    pub fn from_confirm(err: &PlatformError) -> Self {
        match err {
            PlatformError::CodeMismatch(_) | PlatformError::ExpiredCode(_) => {
                AuthFlowError::InvalidCode(err.server_message().unwrap_or(CONFIRM_FAILED).to_string())
            }
            other => Self::network(other, CONFIRM_FAILED),
        }
    }

    /// Map a failure while reading the session.
    pub fn from_session(err: &PlatformError) -> Self {
        match err {
            PlatformError::NotAuthenticated => AuthFlowError::SessionExpired,
            other => AuthFlowError::ResolutionError(other.to_string()),
        }
    }

    /// Federated sign-in failure for a provider.
    pub fn federated(provider: &str) -> Self {
        AuthFlowError::FederatedSignInError(format!(
            "Failed to sign in with {}. Please try again.",
            provider
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_messages() {
        assert_eq!(AuthFlowError::PasswordMismatch.to_string(), "Passwords do not match.");
        assert_eq!(
            AuthFlowError::PasswordTooShort.to_string(),
            "Password must be at least 8 characters."
        );
        assert!(AuthFlowError::PasswordTooShort.is_local_validation());
        assert!(!AuthFlowError::InvalidCredentials.is_local_validation());
    }

    #[test]
    fn test_sign_in_mapping() {
        let rejected = PlatformError::NotAuthorized("Incorrect username or password.".into());
        assert_eq!(AuthFlowError::from_sign_in(&rejected), AuthFlowError::InvalidCredentials);

        let offline = PlatformError::Network("connection reset".into());
        assert_eq!(
            AuthFlowError::from_sign_in(&offline),
            AuthFlowError::NetworkError("connection reset".into())
        );

        let silent = PlatformError::Service {
            code: "InternalErrorException".into(),
            message: String::new(),
        };
        assert_eq!(
            AuthFlowError::from_sign_in(&silent),
            AuthFlowError::NetworkError(SIGN_IN_FAILED.into())
        );
    }

    #[test]
    fn test_confirm_mapping() {
        let mismatch = PlatformError::CodeMismatch("Invalid verification code provided.".into());
        assert_eq!(
            AuthFlowError::from_confirm(&mismatch),
            AuthFlowError::InvalidCode("Invalid verification code provided.".into())
        );

        let expired = PlatformError::ExpiredCode(String::new());
        assert_eq!(
            AuthFlowError::from_confirm(&expired),
            AuthFlowError::InvalidCode(CONFIRM_FAILED.into())
        );
    }

    #[test]
    fn test_session_mapping() {
        assert_eq!(
            AuthFlowError::from_session(&PlatformError::NotAuthenticated),
            AuthFlowError::SessionExpired
        );
        assert!(matches!(
            AuthFlowError::from_session(&PlatformError::Network("timeout".into())),
            AuthFlowError::ResolutionError(_)
        ));
    }

    #[test]
    fn test_federated_message() {
        assert_eq!(
            AuthFlowError::federated("Google").to_string(),
            "Failed to sign in with Google. Please try again."
        );
    }
}
