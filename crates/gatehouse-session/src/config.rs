//! Client configuration.
//!
//! Identity pool, OAuth redirect and backend settings. Loaded from environment
//! variables with defaults suitable for local development.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Missing required environment variable.
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    /// Invalid configuration value.
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue {
        /// Configuration key.
        key: String,
        /// Error message.
        message: String,
    },
}

/// Full client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Identity pool settings.
    pub identity_pool: IdentityPoolConfig,

    /// Protected backend endpoint.
    pub backend: BackendEndpoint,

    /// Backend request timeout in seconds.
    pub backend_timeout_secs: u64,
}

/// Identity pool settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityPoolConfig {
    /// User pool ID (e.g. "us-east-1_AbCdEf123").
    pub user_pool_id: Option<String>,

    /// App client ID.
    pub client_id: Option<String>,

    /// Hosted UI OAuth settings.
    pub oauth: OAuthSettings,
}

/// Hosted UI OAuth settings used by federated sign-in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthSettings {
    /// Hosted UI domain.
    pub domain: Option<String>,

    /// Requested scopes.
    pub scopes: Vec<String>,

    /// Allowed post-sign-in redirect URIs.
    pub redirect_sign_in: Vec<String>,

    /// Allowed post-sign-out redirect URIs.
    pub redirect_sign_out: Vec<String>,

    /// OAuth response type ("code" or "token").
    pub response_type: String,
}

/// Protected backend endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendEndpoint {
    /// Base URL (e.g. "https://api.example.com").
    pub base_url: String,
}

const DEFAULT_SCOPES: &str = "openid email profile phone";
const DEFAULT_REDIRECT: &str = "http://localhost:3000/";

impl Default for ClientConfig {
    /// Returns default configuration suitable for local development.
    fn default() -> Self {
        Self {
            identity_pool: IdentityPoolConfig {
                user_pool_id: None,
                client_id: None,
                oauth: OAuthSettings {
                    domain: None,
                    scopes: split_list(DEFAULT_SCOPES, ' '),
                    redirect_sign_in: vec![DEFAULT_REDIRECT.to_string()],
                    redirect_sign_out: vec![DEFAULT_REDIRECT.to_string()],
                    response_type: "code".to_string(),
                },
            },
            backend: BackendEndpoint {
                base_url: "http://localhost:8000".to_string(),
            },
            backend_timeout_secs: 10,
        }
    }
}

impl ClientConfig {
    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `COGNITO_USER_POOL_ID`: User pool ID
    /// - `COGNITO_APP_CLIENT_ID`: App client ID
    /// - `COGNITO_DOMAIN`: Hosted UI domain
    /// - `COGNITO_REDIRECT_SIGN_IN`: Comma-separated sign-in redirect URIs
    /// - `COGNITO_REDIRECT_SIGN_OUT`: Comma-separated sign-out redirect URIs
    /// - `COGNITO_SCOPES`: Space-separated scopes (default: openid email profile phone)
    /// - `COGNITO_RESPONSE_TYPE`: OAuth response type (default: code)
    /// - `BACKEND_API_URL`: Backend URL (default: http://localhost:8000)
    /// - `BACKEND_TIMEOUT_SECS`: Backend timeout in seconds (default: 10)
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let default = Self::default();
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        Self {
            identity_pool: IdentityPoolConfig {
                user_pool_id: non_empty("COGNITO_USER_POOL_ID"),
                client_id: non_empty("COGNITO_APP_CLIENT_ID"),
                oauth: OAuthSettings {
                    domain: non_empty("COGNITO_DOMAIN"),
                    scopes: non_empty("COGNITO_SCOPES")
                        .map(|s| split_list(&s, ' '))
                        .unwrap_or(default.identity_pool.oauth.scopes),
                    redirect_sign_in: non_empty("COGNITO_REDIRECT_SIGN_IN")
                        .map(|s| split_list(&s, ','))
                        .unwrap_or(default.identity_pool.oauth.redirect_sign_in),
                    redirect_sign_out: non_empty("COGNITO_REDIRECT_SIGN_OUT")
                        .map(|s| split_list(&s, ','))
                        .unwrap_or(default.identity_pool.oauth.redirect_sign_out),
                    response_type: non_empty("COGNITO_RESPONSE_TYPE")
                        .unwrap_or(default.identity_pool.oauth.response_type),
                },
            },
            backend: BackendEndpoint {
                base_url: non_empty("BACKEND_API_URL").unwrap_or(default.backend.base_url),
            },
            backend_timeout_secs: lookup("BACKEND_TIMEOUT_SECS")
                .and_then(|s| s.trim().parse().ok())
                .unwrap_or(default.backend_timeout_secs),
        }
    }

    /// Get the backend request timeout as a Duration.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.backend_timeout_secs)
    }

    /// Validate that credential sign-in can be configured.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.identity_pool.user_pool_id.is_none() {
            return Err(ConfigError::MissingEnvVar("COGNITO_USER_POOL_ID".to_string()));
        }
        if self.identity_pool.client_id.is_none() {
            return Err(ConfigError::MissingEnvVar("COGNITO_APP_CLIENT_ID".to_string()));
        }
        if self.backend_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                key: "BACKEND_TIMEOUT_SECS".to_string(),
                message: "must be greater than zero".to_string(),
            });
        }
        Ok(())
    }

    /// Validate that federated (redirect) sign-in can be configured.
    pub fn validate_for_federation(&self) -> Result<(), ConfigError> {
        self.validate()?;

        let oauth = &self.identity_pool.oauth;
        if oauth.domain.is_none() {
            return Err(ConfigError::MissingEnvVar("COGNITO_DOMAIN".to_string()));
        }
        if oauth.redirect_sign_in.is_empty() {
            return Err(ConfigError::MissingEnvVar("COGNITO_REDIRECT_SIGN_IN".to_string()));
        }
        if oauth.redirect_sign_out.is_empty() {
            return Err(ConfigError::MissingEnvVar("COGNITO_REDIRECT_SIGN_OUT".to_string()));
        }
        if oauth.response_type != "code" && oauth.response_type != "token" {
            return Err(ConfigError::InvalidValue {
                key: "COGNITO_RESPONSE_TYPE".to_string(),
                message: format!("expected \"code\" or \"token\", got \"{}\"", oauth.response_type),
            });
        }
        Ok(())
    }
}

impl BackendEndpoint {
    /// Create an endpoint for a base URL.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
        }
    }

    /// Build a full URL by appending a path to the base URL.
    pub fn url(&self, path: &str) -> String {
        let base = self.base_url.trim_end_matches('/');
        let path = path.trim_start_matches('/');
        format!("{}/{}", base, path)
    }
}

fn split_list(raw: &str, separator: char) -> Vec<String> {
    raw.split(separator)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
