//! Identity platform interface
//!
//! The identity provider's wire protocol belongs to the platform's native
//! client library. This module only describes the calls the sign-in flow makes
//! and the shapes it gets back; embedding applications supply an
//! [`IdentityPlatform`] implementation.

use async_trait::async_trait;
use gatehouse_identity::{ClaimSet, FederatedProvider};
use std::collections::HashMap;
use thiserror::Error;

/// Identity platform error types.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlatformError {
    /// No user is signed in
    #[error("User is not authenticated")]
    NotAuthenticated,

    /// Wrong username or password
    #[error("{0}")]
    NotAuthorized(String),

    /// No such user
    #[error("{0}")]
    UserNotFound(String),

    /// Confirmation code did not match
    #[error("{0}")]
    CodeMismatch(String),

    /// Confirmation code expired
    #[error("{0}")]
    ExpiredCode(String),

    /// An account already exists for this username
    #[error("{0}")]
    UsernameExists(String),

    /// Password rejected by the pool's password policy
    #[error("{0}")]
    InvalidPassword(String),

    /// Transport failure
    #[error("Network error: {0}")]
    Network(String),

    /// Any other service-side rejection
    #[error("{message}")]
    Service {
        /// Service error code
        code: String,
        /// Service error message
        message: String,
    },
}

/// Result type for identity platform operations.
pub type PlatformResult<T> = Result<T, PlatformError>;

impl PlatformError {
    /// The message the service sent, when it sent one.
    pub fn server_message(&self) -> Option<&str> {
        let message = match self {
            PlatformError::NotAuthenticated => return None,
            PlatformError::NotAuthorized(m)
            | PlatformError::UserNotFound(m)
            | PlatformError::CodeMismatch(m)
            | PlatformError::ExpiredCode(m)
            | PlatformError::UsernameExists(m)
            | PlatformError::InvalidPassword(m)
            | PlatformError::Network(m) => m,
            PlatformError::Service { message, .. } => message,
        };

        Some(message.as_str()).filter(|m| !m.trim().is_empty())
    }
}

/// The signed-in user as the platform reports it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentUser {
    /// Stable user ID (the subject)
    pub user_id: String,
    /// Platform username
    pub username: String,
}

/// ID token issued for the session.
#[derive(Clone)]
pub struct IdToken {
    /// Compact-serialized JWT
    pub raw: String,
    /// Claim payload, when the platform already decoded it
    pub payload: Option<ClaimSet>,
}

impl std::fmt::Debug for IdToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdToken")
            .field("raw", &"[REDACTED]")
            .field("payload", &self.payload.as_ref().map(ClaimSet::len))
            .finish()
    }
}

impl IdToken {
    /// Create a token without a decoded payload.
    pub fn new(raw: impl Into<String>) -> Self {
        Self {
            raw: raw.into(),
            payload: None,
        }
    }

    /// Attach the decoded payload.
    pub fn with_payload(mut self, payload: ClaimSet) -> Self {
        self.payload = Some(payload);
        self
    }
}

/// Tokens held by the platform for the current session.
#[derive(Debug, Clone)]
pub struct SessionTokens {
    /// ID token
    pub id_token: IdToken,
    /// Access token, if issued
    pub access_token: Option<String>,
}

/// Session handle returned by `fetch_auth_session`.
///
/// Owned by the platform; the sign-in flow only reads it.
#[derive(Debug, Clone, Default)]
pub struct AuthSession {
    /// Tokens, absent when the platform has none to hand out
    pub tokens: Option<SessionTokens>,
}

impl AuthSession {
    /// Session carrying an ID token.
    pub fn with_id_token(id_token: IdToken) -> Self {
        Self {
            tokens: Some(SessionTokens {
                id_token,
                access_token: None,
            }),
        }
    }
}

/// What the platform wants next after a credential sign-in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignInNextStep {
    /// Sign-in complete
    Done,
    /// The account exists but its sign-up was never confirmed
    ConfirmSignUp,
    /// Another challenge (MFA, new password, ...) this flow does not handle
    Other(String),
}

/// Result of a credential sign-in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignInOutcome {
    /// Whether a session now exists
    pub is_signed_in: bool,
    /// Next step requested by the platform
    pub next_step: SignInNextStep,
}

impl SignInOutcome {
    /// Completed sign-in.
    pub fn signed_in() -> Self {
        Self {
            is_signed_in: true,
            next_step: SignInNextStep::Done,
        }
    }
}

/// Registration request.
#[derive(Clone)]
pub struct SignUpRequest {
    /// Username (the email address)
    pub username: String,
    /// Password
    pub password: String,
    /// User attributes to store with the account
    pub attributes: HashMap<String, String>,
}

impl std::fmt::Debug for SignUpRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignUpRequest")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .field("attributes", &self.attributes)
            .finish()
    }
}

impl SignUpRequest {
    /// Create a request with no attributes.
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            attributes: HashMap::new(),
        }
    }

    /// Add a user attribute.
    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }
}

/// Result of a registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignUpOutcome {
    /// Whether the account is usable without a confirmation code
    pub user_confirmed: bool,
    /// Subject assigned to the new account, if reported
    pub user_id: Option<String>,
}

/// Sign-out scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SignOutOptions {
    /// Revoke tokens on every device instead of only clearing local state
    pub global: bool,
}

impl SignOutOptions {
    /// Sign out everywhere.
    pub fn global() -> Self {
        Self { global: true }
    }

    /// Sign out of this client only.
    pub fn local() -> Self {
        Self { global: false }
    }
}

/// Client for the identity platform.
///
/// Lifecycle notifications (redirect completion and friends) are published on
/// the platform's hub channel rather than returned from these calls.
#[async_trait]
pub trait IdentityPlatform: Send + Sync {
    /// Sign in with username and password.
    async fn sign_in(&self, username: &str, password: &str) -> PlatformResult<SignInOutcome>;

    /// Register a new account.
    async fn sign_up(&self, request: SignUpRequest) -> PlatformResult<SignUpOutcome>;

    /// Confirm a registration with the emailed code.
    async fn confirm_sign_up(&self, username: &str, code: &str) -> PlatformResult<()>;

    /// Start a federated sign-in.
    ///
    /// The platform navigates away; completion is reported on the hub, never
    /// through this return value.
    async fn sign_in_with_redirect(
        &self,
        provider: FederatedProvider,
        custom_state: Option<String>,
    ) -> PlatformResult<()>;

    /// Get the signed-in user.
    async fn get_current_user(&self) -> PlatformResult<CurrentUser>;

    /// Get the current session's tokens.
    async fn fetch_auth_session(&self) -> PlatformResult<AuthSession>;

    /// Fetch the signed-in user's attributes directly.
    async fn fetch_user_attributes(&self) -> PlatformResult<ClaimSet>;

    /// Sign out.
    async fn sign_out(&self, options: SignOutOptions) -> PlatformResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_message() {
        assert_eq!(PlatformError::NotAuthenticated.server_message(), None);
        assert_eq!(
            PlatformError::NotAuthorized("Incorrect username or password.".to_string())
                .server_message(),
            Some("Incorrect username or password.")
        );
        assert_eq!(PlatformError::Network(" ".to_string()).server_message(), None);
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let request = SignUpRequest::new("a@b.com", "hunter22");
        let token = IdToken::new("eyJhbGciOi.secret.sig");

        assert!(!format!("{:?}", request).contains("hunter22"));
        assert!(!format!("{:?}", token).contains("secret"));
    }
}
