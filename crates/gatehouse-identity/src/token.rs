//! ID-token payload decoding
//!
//! The client reads the claim payload of the ID token it was issued so it can
//! build an identity without a network round trip. The signature is not
//! checked here; the backend verifies tokens against the pool's published keys
//! before trusting them.

use crate::claims::ClaimSet;
use crate::error::{IdentityError, IdentityResult};
use jsonwebtoken::{decode, decode_header, DecodingKey, TokenData, Validation};
use std::collections::HashSet;

/// Decode the claim payload of a JWT without verifying it.
///
/// Expiry, audience and signature are not validated.
///
/// # Arguments
///
/// * `token` - The compact-serialized JWT
///
/// # Returns
///
/// The decoded claim set, or `InvalidToken` if the token is malformed
pub fn decode_claims(token: &str) -> IdentityResult<ClaimSet> {
    let header = decode_header(token).map_err(|e| IdentityError::InvalidToken(e.to_string()))?;

    let mut validation = Validation::new(header.alg);
    validation.insecure_disable_signature_validation();
    validation.validate_exp = false;
    validation.validate_nbf = false;
    validation.validate_aud = false;
    validation.required_spec_claims = HashSet::new();

    let token_data: TokenData<serde_json::Value> =
        decode(token, &DecodingKey::from_secret(&[]), &validation)
            .map_err(|e| IdentityError::InvalidToken(e.to_string()))?;

    ClaimSet::from_json(token_data.claims).ok_or(IdentityError::NotAClaimSet)
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use serde_json::json;

    fn sign(claims: &serde_json::Value) -> String {
        encode(
            &Header::default(),
            claims,
            &EncodingKey::from_secret(b"test-secret-key-for-jwt-signing-minimum-32-chars"),
        )
        .unwrap()
    }

    #[test]
    fn test_decode_claims() {
        let token = sign(&json!({
            "sub": "abc-123",
            "email": "a@b.com",
            "email_verified": true,
            "aud": "client-id",
            "exp": 1,
        }));

        let claims = decode_claims(&token).unwrap();
        assert_eq!(claims.string("sub").as_deref(), Some("abc-123"));
        assert_eq!(claims.flag("email_verified"), Some(true));
    }

    #[test]
    fn test_decode_ignores_signature() {
        let token = sign(&json!({"sub": "abc-123"}));
        let (unsigned, _) = token.rsplit_once('.').unwrap();
        let tampered = format!("{}.c2lnbmF0dXJl", unsigned);

        assert!(decode_claims(&tampered).is_ok());
    }

    #[test]
    fn test_invalid_token() {
        let result = decode_claims("invalid-token");
        assert!(matches!(result, Err(IdentityError::InvalidToken(_))));
    }
}
