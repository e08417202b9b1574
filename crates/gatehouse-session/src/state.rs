//! Sign-in flow state

use crate::backend::{BackendResult, IntegrationStatus};
use crate::error::AuthFlowError;
use gatehouse_identity::Identity;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Minimum password length accepted at sign-up.
pub const MIN_PASSWORD_LENGTH: usize = 8;

/// Which form the user is looking at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormMode {
    /// Email and password sign-in
    SignIn,
    /// Registration
    SignUp,
    /// Registration confirmation code entry
    Confirm,
}

impl FormMode {
    /// Get the form name.
    pub fn as_str(&self) -> &'static str {
        match self {
            FormMode::SignIn => "sign_in",
            FormMode::SignUp => "sign_up",
            FormMode::Confirm => "confirm",
        }
    }

    /// Check if the form is part of registration.
    pub fn is_registration(&self) -> bool {
        matches!(self, FormMode::SignUp | FormMode::Confirm)
    }
}

impl std::fmt::Display for FormMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Form input.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    /// Email address, also the username
    pub email: String,
    /// Password
    pub password: String,
    /// Password repeated at sign-up
    pub confirm_password: String,
    /// Display name given at sign-up
    pub name: String,
    /// Emailed confirmation code
    pub confirmation_code: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"[REDACTED]")
            .field("confirm_password", &"[REDACTED]")
            .field("name", &self.name)
            .field("confirmation_code", &self.confirmation_code)
            .finish()
    }
}

impl Credentials {
    /// Check sign-up input before it is sent anywhere.
    pub fn validate_sign_up(&self) -> Result<(), AuthFlowError> {
        if self.password != self.confirm_password {
            return Err(AuthFlowError::PasswordMismatch);
        }
        if self.password.chars().count() < MIN_PASSWORD_LENGTH {
            return Err(AuthFlowError::PasswordTooShort);
        }
        Ok(())
    }

    pub(crate) fn clear_code(&mut self) {
        self.confirmation_code.clear();
    }

    pub(crate) fn clear_registration(&mut self) {
        self.confirm_password.clear();
        self.name.clear();
        self.confirmation_code.clear();
    }

    pub(crate) fn clear(&mut self) {
        *self = Self::default();
    }
}

/// A committed sign-in.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthenticatedSession {
    /// Who signed in
    pub identity: Arc<Identity>,
    /// Backend integration check result, once it arrives
    pub backend: Option<BackendResult>,
}

impl AuthenticatedSession {
    /// Backend integration status.
    pub fn integration_status(&self) -> IntegrationStatus {
        IntegrationStatus::from_result(self.backend.as_ref())
    }
}

/// Sign-in flow state.
#[derive(Debug, Clone, PartialEq)]
pub enum AuthState {
    /// Sign-in form
    SignIn,
    /// Registration form
    SignUp,
    /// Confirmation code form
    Confirm,
    /// Waiting for the session to be read
    Resolving,
    /// Signed in
    Authenticated(AuthenticatedSession),
    /// A form with an error attached
    Failed {
        /// Form the error belongs to
        form: FormMode,
        /// What went wrong
        error: AuthFlowError,
    },
}

impl AuthState {
    /// Clean state for a form.
    pub fn for_form(form: FormMode) -> Self {
        match form {
            FormMode::SignIn => AuthState::SignIn,
            FormMode::SignUp => AuthState::SignUp,
            FormMode::Confirm => AuthState::Confirm,
        }
    }

    /// Form to render, if any.
    pub fn form(&self) -> Option<FormMode> {
        match self {
            AuthState::SignIn => Some(FormMode::SignIn),
            AuthState::SignUp => Some(FormMode::SignUp),
            AuthState::Confirm => Some(FormMode::Confirm),
            AuthState::Failed { form, .. } => Some(*form),
            AuthState::Resolving | AuthState::Authenticated(_) => None,
        }
    }

    /// Error attached to the state.
    pub fn error(&self) -> Option<&AuthFlowError> {
        match self {
            AuthState::Failed { error, .. } => Some(error),
            _ => None,
        }
    }

    /// Signed-in identity.
    pub fn identity(&self) -> Option<&Arc<Identity>> {
        match self {
            AuthState::Authenticated(session) => Some(&session.identity),
            _ => None,
        }
    }

    /// Check if signed in.
    pub fn is_authenticated(&self) -> bool {
        matches!(self, AuthState::Authenticated(_))
    }

    /// Check if a resolved session may be committed from this state.
    pub fn accepts_resolution(&self) -> bool {
        matches!(
            self,
            AuthState::Resolving
                | AuthState::SignIn
                | AuthState::Failed {
                    form: FormMode::SignIn,
                    ..
                }
        )
    }

    /// Short state name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            AuthState::SignIn => "sign_in",
            AuthState::SignUp => "sign_up",
            AuthState::Confirm => "confirm",
            AuthState::Resolving => "resolving",
            AuthState::Authenticated(_) => "authenticated",
            AuthState::Failed { .. } => "failed",
        }
    }
}
