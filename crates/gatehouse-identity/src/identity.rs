//! Canonical identity record
//!
//! Every sign-in path ends in exactly one [`Identity`]. It is built once per
//! successful session resolution and never mutated afterwards; a new sign-in
//! produces a new record.

use crate::error::{IdentityError, IdentityResult};
use crate::provider::{FederatedProvider, ProviderKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Email placeholder for federated sessions whose provider attributes are not
/// mapped onto the identity pool's email attribute.
pub const UNMAPPED_EMAIL: &str = "Email not mapped in Cognito - check attribute mapping";

/// Non-empty subject identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SubjectId(String);

impl SubjectId {
    /// Parse a subject identifier, rejecting blank input.
    pub fn parse(value: impl Into<String>) -> IdentityResult<Self> {
        let value = value.into();
        if value.trim().is_empty() {
            return Err(IdentityError::EmptySubject);
        }
        Ok(Self(value))
    }

    /// Get the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for SubjectId {
    type Error = IdentityError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<SubjectId> for String {
    fn from(id: SubjectId) -> Self {
        id.0
    }
}

impl std::fmt::Display for SubjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// The normalized answer to "who is signed in".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Identity {
    /// Stable subject identifier
    pub subject_id: SubjectId,

    /// Email address, [`UNMAPPED_EMAIL`] for unmapped federated sessions,
    /// absent when nothing could be resolved
    pub email: Option<String>,

    /// Whether the email is verified
    pub email_verified: bool,

    /// Full display name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,

    /// Given name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub given_name: Option<String>,

    /// Family name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub family_name: Option<String>,

    /// Profile picture URL
    #[serde(skip_serializing_if = "Option::is_none")]
    pub picture_url: Option<String>,

    /// Phone number
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,

    /// Federated provider name (e.g. "Google"); absent for direct sessions
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_name: Option<String>,

    /// How the session was established
    pub provider_kind: ProviderKind,

    /// When this record was produced
    pub resolved_at: DateTime<Utc>,
}

impl Identity {
    /// Create an identity that carries nothing but the subject.
    ///
    /// Used when neither token claims nor fetched attributes are available.
    pub fn partial(subject_id: SubjectId) -> Self {
        Self {
            subject_id,
            email: None,
            email_verified: false,
            display_name: None,
            given_name: None,
            family_name: None,
            picture_url: None,
            phone_number: None,
            provider_name: None,
            provider_kind: ProviderKind::Unknown,
            resolved_at: Utc::now(),
        }
    }

    /// Check if the session came through a federated provider.
    pub fn is_federated(&self) -> bool {
        self.provider_kind.is_federated()
    }

    /// Check if the email is the unmapped-attribute placeholder.
    pub fn has_unmapped_email(&self) -> bool {
        self.email.as_deref() == Some(UNMAPPED_EMAIL)
    }

    /// Get the federated provider, if one is named.
    pub fn provider(&self) -> Option<FederatedProvider> {
        self.provider_name.as_deref().and_then(FederatedProvider::parse)
    }

    /// Check if both records describe the same principal.
    pub fn same_principal(&self, other: &Identity) -> bool {
        self.subject_id == other.subject_id
    }

    /// Human-readable description of how the user signed in.
    pub fn sign_in_summary(&self) -> String {
        match &self.provider_name {
            Some(name) => format!("Logged in via {} OAuth", name),
            None => "Logged in with AWS Cognito".to_string(),
        }
    }
}
