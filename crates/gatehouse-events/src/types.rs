//! Event types
//!
//! [`HubEvent`] is the raw envelope the identity platform publishes on its
//! lifecycle channel; [`AuthEvent`] is the logical event the sign-in flow
//! reacts to.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Channel the identity platform publishes authentication lifecycle events on.
pub const AUTH_CHANNEL: &str = "auth";

/// Hub event names the sign-in flow listens for.
pub mod names {
    /// Federated redirect completed and tokens were stored
    pub const SIGN_IN_WITH_REDIRECT: &str = "signInWithRedirect";
    /// Federated redirect came back with an error
    pub const SIGN_IN_WITH_REDIRECT_FAILURE: &str = "signInWithRedirect_failure";
    /// Custom state passed through the OAuth redirect was returned
    pub const CUSTOM_OAUTH_STATE: &str = "customOAuthState";
}

/// Message used when a redirect failure carries no detail.
pub const DEFAULT_REDIRECT_FAILURE_MESSAGE: &str = "Failed to sign in with Google";

/// Raw lifecycle event envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HubEvent {
    /// Unique event ID
    pub id: Uuid,

    /// Channel the event was published on (e.g. "auth")
    pub channel: String,

    /// Event name (e.g. "signInWithRedirect")
    pub event: String,

    /// Event payload
    #[serde(default)]
    pub data: Value,

    /// Optional human-readable message
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Timestamp when the event was created
    pub timestamp: DateTime<Utc>,
}

impl HubEvent {
    /// Create a new event on a channel.
    pub fn new(channel: impl Into<String>, event: impl Into<String>, data: Value) -> Self {
        Self {
            id: Uuid::now_v7(),
            channel: channel.into(),
            event: event.into(),
            data,
            message: None,
            timestamp: Utc::now(),
        }
    }

    /// Create a new event on the auth channel.
    pub fn auth(event: impl Into<String>, data: Value) -> Self {
        Self::new(AUTH_CHANNEL, event, data)
    }

    /// Attach a message.
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Best-effort error detail: the message, else a string payload, else a
    /// `message` field inside the payload.
    fn detail(&self) -> Option<String> {
        let from_data = match &self.data {
            Value::String(s) => Some(s.as_str()),
            Value::Object(map) => map.get("message").and_then(Value::as_str),
            _ => None,
        };

        self.message
            .as_deref()
            .or(from_data)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    }
}

/// Sign-in completion events republished from the hub.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "detail", rename_all = "snake_case")]
pub enum AuthEvent {
    /// A federated redirect finished; a session should now exist
    RedirectCompleted,
    /// A federated redirect failed
    RedirectFailed(String),
    /// The OAuth custom state came back with the redirect
    CustomStateReceived(String),
}

impl AuthEvent {
    /// Map a hub event to an auth event.
    ///
    /// Returns `None` for other channels and for lifecycle events the sign-in
    /// flow does not react to.
    pub fn from_hub(event: &HubEvent) -> Option<Self> {
        if event.channel != AUTH_CHANNEL {
            return None;
        }

        match event.event.as_str() {
            names::SIGN_IN_WITH_REDIRECT => Some(AuthEvent::RedirectCompleted),
            names::SIGN_IN_WITH_REDIRECT_FAILURE => Some(AuthEvent::RedirectFailed(
                event
                    .detail()
                    .unwrap_or_else(|| DEFAULT_REDIRECT_FAILURE_MESSAGE.to_string()),
            )),
            names::CUSTOM_OAUTH_STATE => {
                let state = match &event.data {
                    Value::String(s) => s.clone(),
                    Value::Null => String::new(),
                    other => other.to_string(),
                };
                Some(AuthEvent::CustomStateReceived(state))
            }
            _ => None,
        }
    }

    /// Check if this event should trigger a session resolution.
    pub fn triggers_resolution(&self) -> bool {
        matches!(
            self,
            AuthEvent::RedirectCompleted | AuthEvent::CustomStateReceived(_)
        )
    }

    /// Build the hub event a platform would publish for this auth event.
    pub fn to_hub_event(&self) -> HubEvent {
        match self {
            AuthEvent::RedirectCompleted => HubEvent::auth(names::SIGN_IN_WITH_REDIRECT, Value::Null),
            AuthEvent::RedirectFailed(message) => {
                HubEvent::auth(names::SIGN_IN_WITH_REDIRECT_FAILURE, Value::Null)
                    .with_message(message.clone())
            }
            AuthEvent::CustomStateReceived(state) => {
                HubEvent::auth(names::CUSTOM_OAUTH_STATE, Value::String(state.clone()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_redirect_events() {
        let completed = HubEvent::auth("signInWithRedirect", Value::Null);
        assert_eq!(AuthEvent::from_hub(&completed), Some(AuthEvent::RedirectCompleted));

        let state = HubEvent::auth("customOAuthState", json!("return-to=/profile"));
        assert_eq!(
            AuthEvent::from_hub(&state),
            Some(AuthEvent::CustomStateReceived("return-to=/profile".to_string()))
        );
    }

    #[test]
    fn test_failure_message_fallbacks() {
        let bare = HubEvent::auth("signInWithRedirect_failure", Value::Null);
        assert_eq!(
            AuthEvent::from_hub(&bare),
            Some(AuthEvent::RedirectFailed(DEFAULT_REDIRECT_FAILURE_MESSAGE.to_string()))
        );

        let with_data = HubEvent::auth(
            "signInWithRedirect_failure",
            json!({"message": "ACCOUNT_LINKED: sign in again"}),
        );
        assert_eq!(
            AuthEvent::from_hub(&with_data),
            Some(AuthEvent::RedirectFailed("ACCOUNT_LINKED: sign in again".to_string()))
        );

        let with_message = HubEvent::auth("signInWithRedirect_failure", Value::Null)
            .with_message("access_denied");
        assert_eq!(
            AuthEvent::from_hub(&with_message),
            Some(AuthEvent::RedirectFailed("access_denied".to_string()))
        );
    }

    #[test]
    fn test_unrelated_events_ignored() {
        assert_eq!(AuthEvent::from_hub(&HubEvent::auth("tokenRefresh", Value::Null)), None);
        assert_eq!(
            AuthEvent::from_hub(&HubEvent::new("datastore", "signInWithRedirect", Value::Null)),
            None
        );
    }

    #[test]
    fn test_hub_event_mapping_is_consistent() {
        for event in [
            AuthEvent::RedirectCompleted,
            AuthEvent::RedirectFailed("denied".to_string()),
            AuthEvent::CustomStateReceived("state".to_string()),
        ] {
            assert_eq!(AuthEvent::from_hub(&event.to_hub_event()), Some(event));
        }
    }

    #[test]
    fn test_triggers_resolution() {
        assert!(AuthEvent::RedirectCompleted.triggers_resolution());
        assert!(AuthEvent::CustomStateReceived(String::new()).triggers_resolution());
        assert!(!AuthEvent::RedirectFailed(String::new()).triggers_resolution());
    }
}
