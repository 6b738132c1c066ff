// ABOUTME: Grant store records for authorization codes, refresh token families, and consent
// ABOUTME: Includes the consumption and rotation outcomes returned by atomic store operations
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::scope::ScopeSet;
use crate::constants::oauth::PKCE_METHOD_S256;

/// PKCE code challenge method (RFC 7636)
///
/// Only `S256` is accepted; `plain` offers no protection against an
/// attacker who can read the authorization request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PkceMethod {
    /// SHA-256 of the verifier, base64url without padding
    S256,
}

impl PkceMethod {
    /// Wire identifier
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::S256 => PKCE_METHOD_S256,
        }
    }
}

impl FromStr for PkceMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == PKCE_METHOD_S256 {
            Ok(Self::S256)
        } else {
            Err(format!("unsupported code_challenge_method '{s}'"))
        }
    }
}

/// PKCE challenge bound to an authorization code
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PkceChallenge {
    /// Challenge value from the authorize request
    pub challenge: String,
    /// Transformation applied to the verifier
    pub method: PkceMethod,
}

/// Server-side record behind an authorization code
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationGrant {
    /// SHA-256 hex digest of the opaque code
    pub code_hash: String,
    /// Client the code was issued to
    pub client_id: String,
    /// Authenticated subject
    pub subject: String,
    /// Granted scopes
    pub scopes: ScopeSet,
    /// Redirect URI the code was delivered to
    pub redirect_uri: String,
    /// OIDC nonce echoed in the identity token
    pub nonce: Option<String>,
    /// PKCE binding
    pub pkce: Option<PkceChallenge>,
    /// When the subject authenticated
    pub auth_time: DateTime<Utc>,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Expiry time
    pub expires_at: DateTime<Utc>,
    /// Set once, on the single successful exchange
    pub consumed_at: Option<DateTime<Utc>>,
}

impl AuthorizationGrant {
    /// Whether the grant is past its expiry at `now`
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Result of an atomic code consumption
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsumeOutcome {
    /// This caller won the exchange
    Consumed(AuthorizationGrant),
    /// Expired (reported even when never consumed)
    Expired,
    /// Another caller already exchanged the code
    AlreadyConsumed,
    /// Unknown code
    NotFound,
    /// Code belongs to another client; left untouched
    ClientMismatch,
}

/// Refresh token lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshTokenStatus {
    /// Usable
    Active,
    /// Exchanged for its successor; presenting it again is reuse
    Rotated,
    /// Revoked directly or through its family
    Revoked,
}

impl RefreshTokenStatus {
    /// Storage identifier
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Rotated => "rotated",
            Self::Revoked => "revoked",
        }
    }
}

impl fmt::Display for RefreshTokenStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RefreshTokenStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "rotated" => Ok(Self::Rotated),
            "revoked" => Ok(Self::Revoked),
            other => Err(format!("unknown refresh token status '{other}'")),
        }
    }
}

/// One link of a refresh token rotation chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshTokenRecord {
    /// SHA-256 hex digest of the opaque token
    pub token_hash: String,
    /// Rotation family shared by every descendant of the first token
    pub family_id: Uuid,
    /// Position in the chain, starting at 0
    pub generation: u32,
    /// Hash of the token this one replaced
    pub parent_hash: Option<String>,
    /// Client the token was issued to
    pub client_id: String,
    /// Subject
    pub subject: String,
    /// Scopes of the original grant
    pub scopes: ScopeSet,
    /// When the subject originally authenticated
    pub auth_time: DateTime<Utc>,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Absolute family expiry, inherited by every successor
    pub expires_at: DateTime<Utc>,
    /// Lifecycle status
    pub status: RefreshTokenStatus,
}

impl RefreshTokenRecord {
    /// Whether the token is past its expiry at `now`
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Next link of the chain: same family, scopes and absolute expiry
    #[must_use]
    pub fn successor(&self, token_hash: String, now: DateTime<Utc>) -> Self {
        Self {
            token_hash,
            family_id: self.family_id,
            generation: self.generation.saturating_add(1),
            parent_hash: Some(self.token_hash.clone()),
            client_id: self.client_id.clone(),
            subject: self.subject.clone(),
            scopes: self.scopes.clone(),
            auth_time: self.auth_time,
            created_at: now,
            expires_at: self.expires_at,
            status: RefreshTokenStatus::Active,
        }
    }
}

/// Result of an atomic refresh token rotation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RotateOutcome {
    /// The presented token was active; its successor is stored
    Rotated {
        /// The token that was just rotated out
        previous: RefreshTokenRecord,
    },
    /// The presented token had already been rotated; the family is revoked
    Reused {
        /// Revoked family
        family_id: Uuid,
        /// Generation of the presented token
        generation: u32,
        /// Tokens moved to `Revoked` by this call
        revoked: u64,
    },
    /// The token is past its expiry
    Expired,
    /// The token or its family was already revoked
    Revoked,
    /// Unknown token
    NotFound,
    /// Token belongs to another client; left untouched
    ClientMismatch,
}

/// Remembered subject consent for a client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsentRecord {
    /// Subject
    pub subject: String,
    /// Client
    pub client_id: String,
    /// Scopes consented to
    pub scopes: ScopeSet,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Expiry (None = until revoked)
    pub expires_at: Option<DateTime<Utc>>,
}

impl ConsentRecord {
    /// Whether this consent covers `scopes` at `now`
    #[must_use]
    pub fn covers(&self, scopes: &ScopeSet, now: DateTime<Utc>) -> bool {
        let live = self.expires_at.map_or(true, |expires_at| now < expires_at);
        live && scopes.is_subset(&self.scopes)
    }
}
