// ABOUTME: RS256 access and identity token issuance with kid headers and scope-filtered claims
// ABOUTME: Verifies tokens statelessly against the published signing key set
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

//! Token Issuer
//!
//! Access tokens follow RFC 9068 (`typ: at+jwt`, `aud = client_id`). Identity
//! tokens release only the claims of identity resources whose scope was
//! granted. Neither is persisted: verification is signature plus JWKS.

use crate::constants::oauth::{scopes, ACCESS_TOKEN_JWT_TYPE};
use crate::errors::ProtocolError;
use crate::keys::SigningKeyManager;
use arch_idp_core::models::{Client, IdentityResource, ScopeSet, SubjectProfile};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, decode_header, encode, Algorithm, Header, Validation};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use uuid::Uuid;

/// Claims of an RS256 access token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessTokenClaims {
    /// Issuer
    pub iss: String,
    /// Subject (the client id for `client_credentials`)
    pub sub: String,
    /// Audience (the client id)
    pub aud: String,
    /// Client the token was issued to
    pub client_id: String,
    /// Space-delimited granted scopes
    pub scope: String,
    /// Issued at (seconds)
    pub iat: i64,
    /// Not before (seconds)
    pub nbf: i64,
    /// Expiry (seconds)
    pub exp: i64,
    /// Unique token id
    pub jti: String,
}

impl AccessTokenClaims {
    /// Granted scopes as a set
    #[must_use]
    pub fn scopes(&self) -> ScopeSet {
        ScopeSet::parse(&self.scope)
    }
}

/// Claims of an OpenID Connect identity token
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdentityTokenClaims {
    /// Issuer
    pub iss: String,
    /// Subject
    pub sub: String,
    /// Audience (the client id)
    pub aud: String,
    /// Issued at (seconds)
    pub iat: i64,
    /// Expiry (seconds)
    pub exp: i64,
    /// When the subject authenticated (seconds)
    pub auth_time: i64,
    /// Nonce from the authorize request
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
    /// Left-half SHA-256 of the accompanying access token
    #[serde(skip_serializing_if = "Option::is_none")]
    pub at_hash: Option<String>,
    /// Profile claims released by the granted identity scopes
    #[serde(flatten)]
    pub profile: Map<String, Value>,
}

/// A signed token and its timing
#[derive(Debug, Clone)]
pub struct IssuedToken {
    /// Compact JWS
    pub token: String,
    /// Signing key id
    pub kid: String,
    /// Issue time
    pub issued_at: DateTime<Utc>,
    /// Expiry time
    pub expires_at: DateTime<Utc>,
}

impl IssuedToken {
    /// Lifetime in seconds, as reported in `expires_in`
    #[must_use]
    pub fn expires_in(&self) -> i64 {
        (self.expires_at - self.issued_at).num_seconds()
    }
}

/// Inputs of an identity token
#[derive(Debug, Clone, Copy)]
pub struct IdentityTokenRequest<'a> {
    /// Subject and every known claim
    pub profile: &'a SubjectProfile,
    /// Audience
    pub client: &'a Client,
    /// Granted scopes
    pub scopes: &'a ScopeSet,
    /// Identity resources defining which claims each scope releases
    pub identity_resources: &'a [IdentityResource],
    /// Nonce from the authorize request
    pub nonce: Option<&'a str>,
    /// When the subject authenticated
    pub auth_time: DateTime<Utc>,
    /// Access token issued alongside, for `at_hash`
    pub access_token: Option<&'a str>,
}

/// Profile claims released by the granted, enabled identity resources
///
/// `sub` is never copied from the profile; it always comes from the subject.
#[must_use]
pub fn released_claims(
    profile: &SubjectProfile,
    granted: &ScopeSet,
    identity_resources: &[IdentityResource],
) -> Map<String, Value> {
    identity_resources
        .iter()
        .filter(|resource| resource.enabled && granted.contains(&resource.name))
        .flat_map(|resource| resource.claims.iter())
        .filter(|claim| claim.as_str() != "sub")
        .filter_map(|claim| {
            profile
                .claims
                .get(claim)
                .map(|value| (claim.clone(), value.clone()))
        })
        .collect()
}

/// `at_hash`: base64url of the left half of SHA-256(access token)
#[must_use]
pub fn access_token_hash(access_token: &str) -> String {
    let digest = Sha256::digest(access_token.as_bytes());
    URL_SAFE_NO_PAD.encode(&digest[..digest.len() / 2])
}

/// `now` plus `secs`, or `Internal` when the sum leaves chrono's range
///
/// # Errors
///
/// Returns `Internal` if the lifetime overflows the timestamp
pub fn expires_after(now: DateTime<Utc>, secs: i64) -> Result<DateTime<Utc>, ProtocolError> {
    Duration::try_seconds(secs)
        .and_then(|lifetime| now.checked_add_signed(lifetime))
        .ok_or_else(|| ProtocolError::internal(format!("lifetime of {secs}s overflows the clock")))
}

/// Mints and verifies signed tokens
pub struct TokenIssuer {
    issuer: String,
    keys: Arc<SigningKeyManager>,
}

impl TokenIssuer {
    /// Issuer for `issuer` (the `iss` claim) signing with `keys`
    pub fn new(issuer: impl Into<String>, keys: Arc<SigningKeyManager>) -> Self {
        Self {
            issuer: issuer.into(),
            keys,
        }
    }

    /// The `iss` value
    #[must_use]
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// Issue an access token valid for the client's access token lifetime
    ///
    /// # Errors
    ///
    /// Returns `SigningKeyUnavailable` if no key is active or signing fails
    pub fn issue_access_token(
        &self,
        subject: &str,
        client: &Client,
        scopes: &ScopeSet,
        now: DateTime<Utc>,
    ) -> Result<IssuedToken, ProtocolError> {
        let expires_at = expires_after(now, client.lifetimes.access_token_secs)?;
        let claims = AccessTokenClaims {
            iss: self.issuer.clone(),
            sub: subject.to_owned(),
            aud: client.client_id.clone(),
            client_id: client.client_id.clone(),
            scope: scopes.to_string(),
            iat: now.timestamp(),
            nbf: now.timestamp(),
            exp: expires_at.timestamp(),
            jti: Uuid::new_v4().to_string(),
        };
        self.sign(Some(ACCESS_TOKEN_JWT_TYPE), &claims, now, expires_at)
    }

    /// Issue an identity token releasing only the granted scopes' claims
    ///
    /// # Errors
    ///
    /// Returns `SigningKeyUnavailable` if no key is active or signing fails
    pub fn issue_identity_token(
        &self,
        request: IdentityTokenRequest<'_>,
        now: DateTime<Utc>,
    ) -> Result<IssuedToken, ProtocolError> {
        let expires_at = expires_after(now, request.client.lifetimes.identity_token_secs)?;
        let claims = IdentityTokenClaims {
            iss: self.issuer.clone(),
            sub: request.profile.subject.clone(),
            aud: request.client.client_id.clone(),
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
            auth_time: request.auth_time.timestamp(),
            nonce: request.nonce.map(ToOwned::to_owned),
            at_hash: request.access_token.map(access_token_hash),
            profile: released_claims(request.profile, request.scopes, request.identity_resources),
        };
        self.sign(Some("JWT"), &claims, now, expires_at)
    }

    fn sign<T: Serialize>(
        &self,
        typ: Option<&str>,
        claims: &T,
        issued_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<IssuedToken, ProtocolError> {
        let key = self.keys.active_key()?;
        let mut header = Header::new(Algorithm::RS256);
        header.kid = Some(key.kid().to_owned());
        header.typ = typ.map(ToOwned::to_owned);

        let token = encode(&header, claims, key.encoding_key()).map_err(|e| {
            ProtocolError::SigningKeyUnavailable {
                reason: format!("signing failed: {e}"),
            }
        })?;
        Ok(IssuedToken {
            token,
            kid: key.kid().to_owned(),
            issued_at,
            expires_at,
        })
    }

    /// Verify an access token's signature, issuer, expiry and (optionally) audience
    ///
    /// The key is chosen by the `kid` header among the keys published at `now`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidToken` for any verification failure
    pub fn verify_access_token(
        &self,
        token: &str,
        audience: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<AccessTokenClaims, ProtocolError> {
        let header = decode_header(token).map_err(|e| ProtocolError::InvalidToken {
            reason: format!("malformed token header: {e}"),
        })?;
        if header.typ.as_deref() != Some(ACCESS_TOKEN_JWT_TYPE) {
            return Err(ProtocolError::InvalidToken {
                reason: "not an access token".to_owned(),
            });
        }
        let kid = header.kid.ok_or_else(|| ProtocolError::InvalidToken {
            reason: "token has no kid".to_owned(),
        })?;
        let key = self
            .keys
            .verification_key(&kid, now)
            .ok_or_else(|| ProtocolError::InvalidToken {
                reason: format!("unknown or expired signing key '{kid}'"),
            })?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_issuer(&[self.issuer.as_str()]);
        validation.set_required_spec_claims(&["exp", "iss", "sub", "aud"]);
        match audience {
            Some(audience) => validation.set_audience(&[audience]),
            None => validation.validate_aud = false,
        }

        decode::<AccessTokenClaims>(token, key.decoding_key(), &validation)
            .map(|data| data.claims)
            .map_err(|e| ProtocolError::InvalidToken {
                reason: e.to_string(),
            })
    }

    /// Scope-filtered claims for the userinfo endpoint
    #[must_use]
    pub fn userinfo_claims(
        profile: &SubjectProfile,
        granted: &ScopeSet,
        identity_resources: &[IdentityResource],
    ) -> Map<String, Value> {
        let mut claims = released_claims(profile, granted, identity_resources);
        claims.insert(
            "sub".to_owned(),
            Value::String(profile.subject.clone()),
        );
        claims
    }

    /// Whether an identity token belongs in a response for `scopes`
    #[must_use]
    pub fn wants_identity_token(granted: &ScopeSet) -> bool {
        granted.contains(scopes::OPENID)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::{KeyRotationSettings, KeySet, SigningKey};
    use crate::store::{InMemoryStore, StorePolicy};
    use arch_idp_core::models::{GrantType, TokenLifetimes};

    fn issuer() -> TokenIssuer {
        let key = SigningKey::generate(2048, Utc::now()).unwrap();
        let keys = SigningKeyManager::new(
            KeySet::from_keys(vec![key]),
            Arc::new(InMemoryStore::new()),
            StorePolicy::default(),
            KeyRotationSettings {
                key_bits: 2048,
                rotation_interval: Duration::days(90),
                overlap: Duration::days(1),
            },
        );
        TokenIssuer::new("https://id.example.com", Arc::new(keys))
    }

    fn client() -> Client {
        let now = Utc::now();
        Client {
            client_id: "web-app".to_owned(),
            client_name: None,
            secret_hash: None,
            require_client_secret: false,
            allowed_grant_types: [GrantType::AuthorizationCode].into_iter().collect(),
            redirect_uris: ["https://app.example.com/cb".to_owned()].into_iter().collect(),
            allowed_scopes: ScopeSet::parse("openid profile email"),
            lifetimes: TokenLifetimes {
                access_token_secs: 600,
                ..TokenLifetimes::default()
            },
            allow_offline_access: false,
            require_pkce: false,
            require_consent: false,
            enabled: true,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_access_token_claims_follow_client_lifetime() {
        let issuer = issuer();
        let now = Utc::now();
        let issued = issuer
            .issue_access_token("alice", &client(), &ScopeSet::parse("openid profile"), now)
            .unwrap();
        assert_eq!(issued.expires_in(), 600);

        let claims = issuer
            .verify_access_token(&issued.token, Some("web-app"), now)
            .unwrap();
        assert_eq!(claims.iss, "https://id.example.com");
        assert_eq!(claims.aud, "web-app");
        assert_eq!(claims.scope, "openid profile");
        assert_eq!(claims.exp - claims.iat, 600);
        assert!(issuer
            .verify_access_token(&issued.token, Some("other-app"), now)
            .is_err());
    }

    #[test]
    fn test_overflowing_lifetime_is_an_error() {
        let issuer = issuer();
        let mut client = client();
        for secs in [9_000_000_000_000, i64::MAX] {
            client.lifetimes.access_token_secs = secs;
            assert!(matches!(
                issuer.issue_access_token("alice", &client, &ScopeSet::parse("openid"), Utc::now()),
                Err(ProtocolError::Internal { .. })
            ));
        }
        assert!(expires_after(Utc::now(), 600).is_ok());
    }

    #[test]
    fn test_identity_token_cannot_pass_as_access_token() {
        let issuer = issuer();
        let now = Utc::now();
        let profile = SubjectProfile::new("alice");
        let id_token = issuer
            .issue_identity_token(
                IdentityTokenRequest {
                    profile: &profile,
                    client: &client(),
                    scopes: &ScopeSet::parse("openid"),
                    identity_resources: &IdentityResource::standard_set(),
                    nonce: Some("n-1"),
                    auth_time: now,
                    access_token: None,
                },
                now,
            )
            .unwrap();
        assert!(matches!(
            issuer.verify_access_token(&id_token.token, None, now),
            Err(ProtocolError::InvalidToken { .. })
        ));
    }

    #[test]
    fn test_released_claims_follow_granted_scopes() {
        let profile = SubjectProfile::new("alice")
            .with_claim("name", "Alice Liddell")
            .with_claim("email", "alice@example.com")
            .with_claim("sub", "mallory");
        let resources = IdentityResource::standard_set();

        let openid_only = released_claims(&profile, &ScopeSet::parse("openid"), &resources);
        assert!(openid_only.is_empty());

        let with_profile = released_claims(&profile, &ScopeSet::parse("openid profile"), &resources);
        assert_eq!(with_profile.get("name"), Some(&Value::from("Alice Liddell")));
        assert!(with_profile.get("email").is_none());

        let userinfo = TokenIssuer::userinfo_claims(&profile, &ScopeSet::parse("openid"), &resources);
        assert_eq!(userinfo.get("sub"), Some(&Value::from("alice")));
    }

    #[test]
    fn test_at_hash_is_left_half_of_digest() {
        assert_eq!(access_token_hash("token").len(), 22);
    }
}
