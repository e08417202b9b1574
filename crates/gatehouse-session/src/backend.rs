//! Protected backend client.
//!
//! HTTP client for the application backend. The first authorized request after
//! sign-in doubles as an integration check: it proves the backend accepts the
//! session's ID token.

use crate::config::{BackendEndpoint, ClientConfig};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, instrument, warn};

/// Path of the authorized profile resource.
pub const PROFILE_PATH: &str = "/api/profile";

/// Backend client errors.
#[derive(Debug, Error)]
pub enum BackendError {
    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    /// API returned an error response.
    #[error("API error ({status}): {message}")]
    ApiError {
        /// HTTP status code.
        status: u16,
        /// Error message from the API.
        message: String,
    },

    /// Invalid response from the API.
    #[error("Invalid API response: {0}")]
    InvalidResponse(String),

    /// Authentication failed.
    #[error("Authentication failed")]
    AuthenticationFailed,

    /// HTTP client could not be built.
    #[error("Failed to build HTTP client: {0}")]
    ClientBuild(String),
}

/// Result type for backend operations.
pub type BackendClientResult<T> = Result<T, BackendError>;

impl BackendError {
    /// HTTP status carried by the error, if the backend answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            BackendError::ApiError { status, .. } => Some(*status),
            BackendError::AuthenticationFailed => Some(401),
            BackendError::RequestFailed(e) => e.status().map(|s| s.as_u16()),
            BackendError::InvalidResponse(_) | BackendError::ClientBuild(_) => None,
        }
    }
}

/// Outcome of the authorized backend call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendResult {
    /// Whether the backend accepted the token and answered with JSON.
    pub ok: bool,

    /// HTTP status, absent on transport failure.
    pub status: Option<u16>,

    /// Response body.
    pub payload: Option<Value>,

    /// When the result was received.
    pub received_at: DateTime<Utc>,
}

impl BackendResult {
    /// Successful call.
    pub fn success(status: u16, payload: Value) -> Self {
        Self {
            ok: true,
            status: Some(status),
            payload: Some(payload),
            received_at: Utc::now(),
        }
    }

    /// Failed call.
    pub fn failure(status: Option<u16>) -> Self {
        Self {
            ok: false,
            status,
            payload: None,
            received_at: Utc::now(),
        }
    }
}

/// Backend integration status shown next to the signed-in identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntegrationStatus {
    /// No result yet
    Pending,
    /// Backend accepted the token
    Connected,
    /// Backend call failed; the session itself is unaffected
    Degraded,
}

impl IntegrationStatus {
    /// Derive the status from an optional result.
    pub fn from_result(result: Option<&BackendResult>) -> Self {
        match result {
            None => IntegrationStatus::Pending,
            Some(r) if r.ok => IntegrationStatus::Connected,
            Some(_) => IntegrationStatus::Degraded,
        }
    }

    /// Get the status name.
    pub fn as_str(&self) -> &'static str {
        match self {
            IntegrationStatus::Pending => "pending",
            IntegrationStatus::Connected => "connected",
            IntegrationStatus::Degraded => "degraded",
        }
    }
}

impl std::fmt::Display for IntegrationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Something that can present an ID token to a protected resource.
#[async_trait]
pub trait ResourceAuthorizer: Send + Sync {
    /// Make one authorized call. Failures are reported in the result, never raised.
    async fn authorize(&self, id_token: &str) -> BackendResult;
}

/// Backend client.
#[derive(Clone)]
pub struct BackendAuthClient {
    /// HTTP client instance.
    client: Client,

    /// Backend endpoint configuration.
    endpoint: BackendEndpoint,

    /// Request timeout.
    timeout: Duration,
}

impl std::fmt::Debug for BackendAuthClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendAuthClient")
            .field("base_url", &self.endpoint.base_url)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl BackendAuthClient {
    /// Create a new backend client.
    pub fn new(endpoint: BackendEndpoint, timeout: Duration) -> BackendClientResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| BackendError::ClientBuild(e.to_string()))?;

        Ok(Self {
            client,
            endpoint,
            timeout,
        })
    }

    /// Create a client from the loaded configuration.
    pub fn from_config(config: &ClientConfig) -> BackendClientResult<Self> {
        Self::new(config.backend.clone(), config.timeout())
    }

    /// Backend endpoint.
    pub fn endpoint(&self) -> &BackendEndpoint {
        &self.endpoint
    }

    /// Fetch the profile resource with the ID token as bearer credential.
    #[instrument(skip(self, id_token))]
    pub async fn try_authorize(&self, id_token: &str) -> BackendClientResult<BackendResult> {
        debug!("Requesting {}", PROFILE_PATH);

        let url = self.endpoint.url(PROFILE_PATH);
        let response = self
            .client
            .get(&url)
            .header("Authorization", format!("Bearer {}", id_token))
            .send()
            .await?;

        let status = response.status().as_u16();
        let payload = self.handle_response(response).await?;
        Ok(BackendResult::success(status, payload))
    }

    /// Handle API response and parse JSON.
    async fn handle_response<T>(&self, response: reqwest::Response) -> BackendClientResult<T>
    where
        T: for<'de> Deserialize<'de>,
    {
        let status = response.status();

        if status == reqwest::StatusCode::UNAUTHORIZED {
            error!("Backend rejected the ID token");
            return Err(BackendError::AuthenticationFailed);
        }

        if !status.is_success() {
            let message = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
            warn!("Backend API error ({}): {}", status.as_u16(), message);
            return Err(BackendError::ApiError {
                status: status.as_u16(),
                message,
            });
        }

        response
            .json()
            .await
            .map_err(|e| BackendError::InvalidResponse(e.to_string()))
    }
}

#[async_trait]
impl ResourceAuthorizer for BackendAuthClient {
    async fn authorize(&self, id_token: &str) -> BackendResult {
        match self.try_authorize(id_token).await {
            Ok(result) => {
                info!(status = ?result.status, "Backend integration check succeeded");
                result
            }
            Err(e) => {
                warn!(error = %e, "Backend integration check failed");
                BackendResult::failure(e.status())
            }
        }
    }
}
