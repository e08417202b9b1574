//! Session resolution
//!
//! Reads whatever session the platform currently holds and turns it into an
//! [`Identity`]. Every path to a signed-in state (startup check, redirect
//! completion, credential sign-in) goes through [`SessionResolver::resolve`].

use crate::backend::{BackendResult, ResourceAuthorizer};
use crate::error::{AuthFlowError, AuthFlowResult};
use crate::platform::{IdToken, IdentityPlatform};
use gatehouse_identity::{decode_claims, ClaimNormalizer, ClaimSet, Identity, SubjectId};
use serde::Serialize;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

/// Where the identity's claims came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimSource {
    /// ID token payload
    IdToken,
    /// Fetched user attributes
    Attributes,
    /// Nothing; only the subject is known
    None,
}

/// A resolved session.
#[derive(Debug, Clone)]
pub struct Resolution {
    /// Normalized identity
    pub identity: Identity,
    /// Raw ID token to present to the backend, if the session has one
    pub id_token: Option<String>,
    /// Where the claims came from
    pub claim_source: ClaimSource,
}

/// Resolves the platform's current session into an identity.
#[derive(Clone)]
pub struct SessionResolver {
    platform: Arc<dyn IdentityPlatform>,
    authorizer: Arc<dyn ResourceAuthorizer>,
}

impl std::fmt::Debug for SessionResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionResolver").finish_non_exhaustive()
    }
}

impl SessionResolver {
    /// Create a resolver.
    pub fn new(
        platform: Arc<dyn IdentityPlatform>,
        authorizer: Arc<dyn ResourceAuthorizer>,
    ) -> Self {
        Self {
            platform,
            authorizer,
        }
    }

    /// Resolve the current session.
    ///
    /// # Errors
    ///
    /// `SessionExpired` when nobody is signed in, `ResolutionError` when a
    /// session exists but cannot be read. Missing claims are not an error.
    #[instrument(skip(self))]
    pub async fn resolve(&self) -> AuthFlowResult<Resolution> {
        let user = self
            .platform
            .get_current_user()
            .await
            .map_err(|e| AuthFlowError::from_session(&e))?;

        let fallback = SubjectId::parse(user.user_id.as_str())
            .map_err(|e| AuthFlowError::ResolutionError(e.to_string()))?;
        debug!(subject = %fallback, username = %user.username, "Current user found");

        let session = self
            .platform
            .fetch_auth_session()
            .await
            .map_err(|e| AuthFlowError::ResolutionError(e.to_string()))?;

        let id_token = session.tokens.as_ref().map(|tokens| &tokens.id_token);
        let token_claims = id_token.and_then(Self::token_claims);

        let attributes = if token_claims.is_some() {
            None
        } else {
            match self.platform.fetch_user_attributes().await {
                Ok(attributes) if !attributes.is_empty() => Some(attributes),
                Ok(_) => None,
                Err(e) => {
                    warn!(error = %e, "Could not fetch user attributes; continuing with subject only");
                    None
                }
            }
        };

        let claim_source = match (&token_claims, &attributes) {
            (Some(_), _) => ClaimSource::IdToken,
            (None, Some(_)) => ClaimSource::Attributes,
            (None, None) => ClaimSource::None,
        };

        let identity =
            ClaimNormalizer::normalize(&fallback, token_claims.as_ref(), attributes.as_ref());

        info!(
            subject = %identity.subject_id,
            provider = identity.provider_name.as_deref().unwrap_or("cognito"),
            ?claim_source,
            "Session resolved"
        );

        Ok(Resolution {
            identity,
            id_token: id_token
                .map(|token| token.raw.clone())
                .filter(|raw| !raw.trim().is_empty()),
            claim_source,
        })
    }

    /// Present the ID token to the backend on a background task.
    ///
    /// Exactly one call is made; its failure never surfaces as an error.
    pub fn authorize_in_background(&self, id_token: String) -> JoinHandle<BackendResult> {
        let authorizer = Arc::clone(&self.authorizer);
        tokio::spawn(async move { authorizer.authorize(&id_token).await })
    }

    fn token_claims(id_token: &IdToken) -> Option<ClaimSet> {
        if let Some(payload) = id_token.payload.as_ref().filter(|p| !p.is_empty()) {
            return Some(payload.clone());
        }
        if id_token.raw.trim().is_empty() {
            return None;
        }

        match decode_claims(&id_token.raw) {
            Ok(claims) if !claims.is_empty() => Some(claims),
            Ok(_) => None,
            Err(e) => {
                debug!(error = %e, "ID token payload not decodable");
                None
            }
        }
    }
}
