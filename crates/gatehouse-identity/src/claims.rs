//! Raw claim sets
//!
//! A claim set is the decoded payload of an ID token, or the attribute map a
//! platform returns from a direct attribute fetch. Providers do not populate
//! these consistently (booleans arrive as strings, fields go missing), so the
//! accessors here read leniently and treat `null` and blank strings as absent.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Well-known claim names.
pub mod names {
    /// Subject (stable user ID)
    pub const SUB: &str = "sub";
    /// Primary email
    pub const EMAIL: &str = "email";
    /// Email verification flag
    pub const EMAIL_VERIFIED: &str = "email_verified";
    /// Alternate custom email attribute
    pub const CUSTOM_EMAIL: &str = "custom:email";
    /// OIDC preferred username
    pub const PREFERRED_USERNAME: &str = "preferred_username";
    /// Platform username as it appears in ID tokens
    pub const COGNITO_USERNAME: &str = "cognito:username";
    /// Platform username as it appears in fetched attributes
    pub const USERNAME: &str = "username";
    /// Linked federated identities
    pub const IDENTITIES: &str = "identities";
    /// Full display name
    pub const NAME: &str = "name";
    /// Given name
    pub const GIVEN_NAME: &str = "given_name";
    /// Family name
    pub const FAMILY_NAME: &str = "family_name";
    /// Profile picture URL
    pub const PICTURE: &str = "picture";
    /// Phone number
    pub const PHONE_NUMBER: &str = "phone_number";
    /// Role attribute written at sign-up
    pub const CUSTOM_USER_ROLE: &str = "custom:user_role";
}

/// A loosely typed set of identity claims.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClaimSet(Map<String, Value>);

impl ClaimSet {
    /// Create an empty claim set.
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Build a claim set from a JSON value.
    ///
    /// Returns `None` unless the value is an object.
    pub fn from_json(value: Value) -> Option<Self> {
        match value {
            Value::Object(map) => Some(Self(map)),
            _ => None,
        }
    }

    /// Build a claim set from string attributes, as returned by an attribute
    /// fetch.
    pub fn from_attributes<I, K, V>(attributes: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        attributes
            .into_iter()
            .map(|(k, v)| (k.into(), Value::String(v.into())))
            .collect()
    }

    /// Add a claim.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    /// Insert a claim, replacing any previous value.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    /// Get a raw claim value. `null` counts as absent.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key).filter(|v| !v.is_null())
    }

    /// Check whether a non-null claim is present.
    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Number of claims.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if the claim set has no claims.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Read a claim as a non-blank string.
    ///
    /// Numbers are rendered as strings; blank strings, objects, arrays and
    /// booleans are treated as absent.
    pub fn string(&self, key: &str) -> Option<String> {
        match self.get(key)? {
            Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    /// Read a claim as a strict boolean.
    ///
    /// Accepts JSON booleans, `"true"`/`"false"` in any case, and `1`/`0`
    /// as numbers or strings. Anything else is absent.
    pub fn flag(&self, key: &str) -> Option<bool> {
        match self.get(key)? {
            Value::Bool(b) => Some(*b),
            Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "1" => Some(true),
                "false" | "0" => Some(false),
                _ => None,
            },
            Value::Number(n) => match n.as_i64() {
                Some(1) => Some(true),
                Some(0) => Some(false),
                _ => None,
            },
            _ => None,
        }
    }

    /// Iterate over claim names.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Convert back into a JSON value.
    pub fn into_json(self) -> Value {
        Value::Object(self.0)
    }
}

impl FromIterator<(String, Value)> for ClaimSet {
    fn from_iter<T: IntoIterator<Item = (String, Value)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}
