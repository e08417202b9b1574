//! Claim normalization
//!
//! Reconciles the claim shapes produced by different sign-in paths into one
//! [`Identity`]. Normalization is total: malformed or partially populated
//! input resolves through defaults and sentinels, never through an error.

use crate::claims::{names, ClaimSet};
use crate::identity::{Identity, SubjectId, UNMAPPED_EMAIL};
use crate::provider::ProviderKind;
use chrono::Utc;
use tracing::{debug, warn};

/// Claims that may carry an email address, in order of preference.
const EMAIL_CLAIMS: [&str; 3] = [names::EMAIL, names::CUSTOM_EMAIL, names::PREFERRED_USERNAME];

/// Claims that carry the platform username, in order of preference.
const USERNAME_CLAIMS: [&str; 2] = [names::COGNITO_USERNAME, names::USERNAME];

/// Stateless claim normalizer.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClaimNormalizer;

impl ClaimNormalizer {
    /// Normalize claims into an identity.
    ///
    /// # Arguments
    ///
    /// * `fallback_subject` - Subject of the current user, used when the
    ///   claims carry no usable `sub`
    /// * `token_claims` - Decoded ID-token payload, if any
    /// * `attributes` - Result of a direct attribute fetch, consulted only
    ///   when the token offered no claims
    ///
    /// # Returns
    ///
    /// The canonical identity. With no claims from either source this is a
    /// partial identity holding only the subject.
    pub fn normalize(
        fallback_subject: &SubjectId,
        token_claims: Option<&ClaimSet>,
        attributes: Option<&ClaimSet>,
    ) -> Identity {
        let source = token_claims
            .filter(|claims| !claims.is_empty())
            .or_else(|| attributes.filter(|claims| !claims.is_empty()));

        let Some(claims) = source else {
            debug!(subject = %fallback_subject, "No claims available, producing partial identity");
            return Identity::partial(fallback_subject.clone());
        };

        let kind = ProviderKind::classify(Some(claims));
        Self::from_claims(fallback_subject, claims, kind)
    }

    fn from_claims(fallback_subject: &SubjectId, claims: &ClaimSet, kind: ProviderKind) -> Identity {
        let subject_id = claims
            .string(names::SUB)
            .and_then(|sub| SubjectId::parse(sub).ok())
            .unwrap_or_else(|| fallback_subject.clone());

        let email_verified = claims
            .flag(names::EMAIL_VERIFIED)
            .unwrap_or_else(|| kind.default_email_verified());

        let email = Self::resolve_email(claims, &kind);
        if email.as_deref() == Some(UNMAPPED_EMAIL) {
            warn!(
                subject = %subject_id,
                provider = kind.provider_name().unwrap_or("unknown"),
                "Federated session carries no email claim; check the provider attribute mapping"
            );
        }

        Identity {
            subject_id,
            email,
            email_verified,
            display_name: claims.string(names::NAME),
            given_name: claims.string(names::GIVEN_NAME),
            family_name: claims.string(names::FAMILY_NAME),
            picture_url: claims.string(names::PICTURE),
            phone_number: claims.string(names::PHONE_NUMBER),
            provider_name: kind.provider_name().map(str::to_string),
            provider_kind: kind,
            resolved_at: Utc::now(),
        }
    }

    fn resolve_email(claims: &ClaimSet, kind: &ProviderKind) -> Option<String> {
        if let Some(email) = EMAIL_CLAIMS.iter().find_map(|key| claims.string(key)) {
            return Some(email);
        }

        match kind {
            ProviderKind::Federated { .. } => Some(UNMAPPED_EMAIL.to_string()),
            ProviderKind::Direct => USERNAME_CLAIMS.iter().find_map(|key| claims.string(key)),
            ProviderKind::Unknown => None,
        }
    }
}
