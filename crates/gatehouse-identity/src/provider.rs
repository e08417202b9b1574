//! Identity provider classification
//!
//! Sessions reach the identity pool either through a federated OAuth provider
//! (full browser redirect) or directly against the native user store. The two
//! paths produce differently shaped claim sets, so normalization dispatches on
//! [`ProviderKind`].

use crate::claims::{names, ClaimSet};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Supported federated providers.
///
/// Names follow the identity pool's provider naming.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum FederatedProvider {
    /// Google OAuth
    Google,
    /// Facebook Login
    Facebook,
    /// Login with Amazon
    Amazon,
    /// Sign in with Apple
    Apple,
    /// Custom OIDC or SAML provider, by configured name
    Custom(String),
}

impl FederatedProvider {
    /// Get the provider name the identity pool expects.
    pub fn as_str(&self) -> &str {
        match self {
            FederatedProvider::Google => "Google",
            FederatedProvider::Facebook => "Facebook",
            FederatedProvider::Amazon => "LoginWithAmazon",
            FederatedProvider::Apple => "SignInWithApple",
            FederatedProvider::Custom(name) => name,
        }
    }

    /// Parse from a provider name.
    pub fn parse(s: &str) -> Option<Self> {
        let trimmed = s.trim();
        match trimmed.to_lowercase().as_str() {
            "" => None,
            "google" => Some(FederatedProvider::Google),
            "facebook" => Some(FederatedProvider::Facebook),
            "loginwithamazon" | "amazon" => Some(FederatedProvider::Amazon),
            "signinwithapple" | "apple" => Some(FederatedProvider::Apple),
            _ => Some(FederatedProvider::Custom(trimmed.to_string())),
        }
    }
}

impl std::fmt::Display for FederatedProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a session was established, as far as its claims reveal.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProviderKind {
    /// Signed in through a third-party provider redirect
    Federated {
        /// First linked provider's name, when the claim could be decoded
        provider_name: Option<String>,
    },
    /// Signed in with username and password against the native store
    Direct,
    /// No claims were available to tell
    Unknown,
}

impl ProviderKind {
    /// Classify a claim set.
    ///
    /// A truthy `identities` claim marks a federated session, whether it
    /// arrives as a JSON string or as structured data. `null`, `false`, `0`
    /// and blank strings do not.
    pub fn classify(claims: Option<&ClaimSet>) -> Self {
        let Some(claims) = claims else {
            return ProviderKind::Unknown;
        };

        match claims.get(names::IDENTITIES) {
            None => ProviderKind::Direct,
            Some(Value::Bool(false)) => ProviderKind::Direct,
            Some(Value::Number(n)) if n.as_f64() == Some(0.0) => ProviderKind::Direct,
            Some(Value::String(raw)) if raw.trim().is_empty() => ProviderKind::Direct,
            Some(Value::String(raw)) => ProviderKind::Federated {
                provider_name: serde_json::from_str::<Value>(raw)
                    .ok()
                    .and_then(|parsed| first_provider_name(&parsed)),
            },
            Some(structured) => ProviderKind::Federated {
                provider_name: first_provider_name(structured),
            },
        }
    }

    /// Check if this is a federated session.
    pub fn is_federated(&self) -> bool {
        matches!(self, ProviderKind::Federated { .. })
    }

    /// Get the federated provider name, if known.
    pub fn provider_name(&self) -> Option<&str> {
        match self {
            ProviderKind::Federated { provider_name } => provider_name.as_deref(),
            _ => None,
        }
    }

    /// Verification assumed when the claim set says nothing.
    ///
    /// Federated providers verify email before handing it over.
    pub fn default_email_verified(&self) -> bool {
        self.is_federated()
    }
}

fn first_provider_name(value: &Value) -> Option<String> {
    let entry = match value {
        Value::Array(entries) => entries.first()?,
        Value::Object(_) => value,
        _ => return None,
    };

    entry
        .get("providerName")
        .and_then(Value::as_str)
        .filter(|name| !name.trim().is_empty())
        .map(str::to_string)
}
