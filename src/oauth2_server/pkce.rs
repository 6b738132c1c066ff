// ABOUTME: Proof Key for Code Exchange (RFC 7636) challenge parsing and verifier checks
// ABOUTME: Only the S256 method is accepted; comparison is constant time
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

use crate::constants::oauth::{PKCE_VERIFIER_MAX_LEN, PKCE_VERIFIER_MIN_LEN};
use crate::errors::ProtocolError;
use arch_idp_core::models::{PkceChallenge, PkceMethod};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// Length of a base64url-encoded SHA-256 digest
const S256_CHALLENGE_LEN: usize = 43;

/// RFC 7636 unreserved characters
fn is_unreserved(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | '_' | '~')
}

/// S256 transformation of a verifier
#[must_use]
pub fn s256_challenge(verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}

/// Parse the challenge parameters of an authorize request
///
/// The method must be given explicitly: an absent method means `plain`,
/// which is never accepted.
///
/// # Errors
///
/// Returns `InvalidRequest` for a missing or unsupported method, a malformed
/// challenge, or a method without a challenge
pub fn parse_challenge(
    challenge: Option<&str>,
    method: Option<&str>,
) -> Result<Option<PkceChallenge>, ProtocolError> {
    let Some(challenge) = challenge else {
        if method.is_some() {
            return Err(ProtocolError::invalid_request(
                "code_challenge_method requires code_challenge",
            ));
        }
        return Ok(None);
    };

    let method = method
        .ok_or_else(|| ProtocolError::invalid_request("code_challenge_method is required"))?
        .parse::<PkceMethod>()
        .map_err(ProtocolError::invalid_request)?;

    if challenge.len() != S256_CHALLENGE_LEN || !challenge.chars().all(is_unreserved) {
        return Err(ProtocolError::invalid_request(
            "code_challenge must be a base64url-encoded SHA-256 digest",
        ));
    }

    Ok(Some(PkceChallenge {
        challenge: challenge.to_owned(),
        method,
    }))
}

/// Check a token request's verifier against the challenge bound to the code
///
/// # Errors
///
/// Returns `GrantMismatch` when the verifier is missing, malformed or wrong,
/// or when a verifier is presented for a code issued without a challenge
pub fn verify(challenge: Option<&PkceChallenge>, verifier: Option<&str>) -> Result<(), ProtocolError> {
    let Some(challenge) = challenge else {
        return if verifier.is_some() {
            Err(ProtocolError::GrantMismatch {
                reason: "code_verifier presented but no code_challenge was issued",
            })
        } else {
            Ok(())
        };
    };

    let verifier = verifier.ok_or(ProtocolError::GrantMismatch {
        reason: "code_verifier is required",
    })?;

    if !(PKCE_VERIFIER_MIN_LEN..=PKCE_VERIFIER_MAX_LEN).contains(&verifier.len())
        || !verifier.chars().all(is_unreserved)
    {
        return Err(ProtocolError::GrantMismatch {
            reason: "code_verifier is malformed",
        });
    }

    let computed = match challenge.method {
        PkceMethod::S256 => s256_challenge(verifier),
    };
    if computed
        .as_bytes()
        .ct_eq(challenge.challenge.as_bytes())
        .into()
    {
        Ok(())
    } else {
        Err(ProtocolError::GrantMismatch {
            reason: "code_verifier does not match code_challenge",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // RFC 7636 appendix B
    const VERIFIER: &str = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk";
    const CHALLENGE: &str = "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM";

    #[test]
    fn test_rfc_vector() {
        assert_eq!(s256_challenge(VERIFIER), CHALLENGE);
        let challenge = parse_challenge(Some(CHALLENGE), Some("S256")).unwrap();
        assert!(verify(challenge.as_ref(), Some(VERIFIER)).is_ok());
    }

    #[test]
    fn test_plain_method_is_rejected() {
        assert!(matches!(
            parse_challenge(Some(CHALLENGE), Some("plain")),
            Err(ProtocolError::InvalidRequest { .. })
        ));
    }

    #[test]
    fn test_absent_method_is_not_upgraded_to_s256() {
        assert!(matches!(
            parse_challenge(Some(CHALLENGE), None),
            Err(ProtocolError::InvalidRequest { .. })
        ));
    }

    #[test]
    fn test_wrong_or_missing_verifier_is_invalid_grant() {
        let challenge = parse_challenge(Some(CHALLENGE), Some("S256")).unwrap();
        let wrong = "a".repeat(43);
        for verifier in [None, Some("short"), Some(wrong.as_str())] {
            let error = verify(challenge.as_ref(), verifier).unwrap_err();
            assert_eq!(error.oauth_error_code(), "invalid_grant");
        }
    }

    #[test]
    fn test_verifier_without_challenge_is_rejected() {
        assert!(verify(None, None).is_ok());
        assert!(verify(None, Some(VERIFIER)).is_err());
    }
}
