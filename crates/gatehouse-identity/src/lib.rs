//! # Gatehouse Identity
//!
//! This crate turns whatever an identity platform hands back after sign-in
//! into one canonical [`Identity`] record.
//!
//! ## Overview
//!
//! The gatehouse-identity crate handles:
//! - **Claim sets**: Loosely typed ID-token payloads and fetched user attributes
//! - **Provider classification**: Federated (OAuth redirect), direct
//!   (username/password) or unknown sessions
//! - **Normalization**: Per-provider rules that fill email, verification and
//!   profile fields without ever failing
//! - **Token payloads**: Decoding the claim payload of an ID token (optional)
//!
//! ## Features
//!
//! - `jwt` (default): ID-token payload decoding using jsonwebtoken
//!
//! ## Usage
//!
//! ```rust,no_run
//! use gatehouse_identity::{ClaimNormalizer, ClaimSet, SubjectId, UNMAPPED_EMAIL};
//!
//! let fallback = SubjectId::parse("user-123").unwrap();
//! let claims = ClaimSet::new()
//!     .with("sub", "0a1b2c")
//!     .with("identities", r#"[{"providerName":"Google"}]"#);
//!
//! let identity = ClaimNormalizer::normalize(&fallback, Some(&claims), None);
//! assert_eq!(identity.provider_name.as_deref(), Some("Google"));
//! assert!(identity.email_verified);
//! assert_eq!(identity.email.as_deref(), Some(UNMAPPED_EMAIL));
//! ```
//!
//! ## Normalization Rules
//!
//! Rules apply in order, first match wins per field:
//! 1. An `identities` claim marks a federated session
//! 2. `email_verified` is copied when present, otherwise federated sessions
//!    count as verified
//! 3. Email falls back through `email`, `custom:email`, `preferred_username`,
//!    then a sentinel (federated) or the platform username (direct)
//! 4. With no claims at all only the subject survives

pub mod claims;
pub mod error;
pub mod identity;
pub mod normalizer;
pub mod provider;
#[cfg(feature = "jwt")]
pub mod token;

// Re-export main types
pub use claims::ClaimSet;
pub use error::{IdentityError, IdentityResult};
pub use identity::{Identity, SubjectId, UNMAPPED_EMAIL};
pub use normalizer::ClaimNormalizer;
pub use provider::{FederatedProvider, ProviderKind};

#[cfg(feature = "jwt")]
pub use token::decode_claims;
