// ABOUTME: Registered client application model
// ABOUTME: Holds allowed grant types, exact redirect URIs, scopes, secret hash, and token lifetimes
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use super::scope::ScopeSet;
use crate::constants::{lifetimes, oauth::grant_types};

/// OAuth 2.0 grant types a client may be registered for
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantType {
    /// Authorization code (with optional PKCE)
    AuthorizationCode,
    /// Implicit (front-channel tokens)
    Implicit,
    /// Client credentials (no end-user)
    ClientCredentials,
    /// Refresh token
    RefreshToken,
}

impl GrantType {
    /// Wire identifier
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AuthorizationCode => grant_types::AUTHORIZATION_CODE,
            Self::Implicit => grant_types::IMPLICIT,
            Self::ClientCredentials => grant_types::CLIENT_CREDENTIALS,
            Self::RefreshToken => grant_types::REFRESH_TOKEN,
        }
    }
}

impl fmt::Display for GrantType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GrantType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            grant_types::AUTHORIZATION_CODE => Ok(Self::AuthorizationCode),
            grant_types::IMPLICIT => Ok(Self::Implicit),
            grant_types::CLIENT_CREDENTIALS => Ok(Self::ClientCredentials),
            grant_types::REFRESH_TOKEN => Ok(Self::RefreshToken),
            other => Err(format!("unknown grant type '{other}'")),
        }
    }
}

/// Per-client token lifetimes in seconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenLifetimes {
    /// Access token lifetime
    pub access_token_secs: i64,
    /// Identity token lifetime
    pub identity_token_secs: i64,
    /// Authorization code lifetime
    pub authorization_code_secs: i64,
    /// Absolute refresh token family lifetime
    pub refresh_token_secs: i64,
}

impl Default for TokenLifetimes {
    fn default() -> Self {
        Self {
            access_token_secs: lifetimes::ACCESS_TOKEN_SECS,
            identity_token_secs: lifetimes::IDENTITY_TOKEN_SECS,
            authorization_code_secs: lifetimes::AUTHORIZATION_CODE_SECS,
            refresh_token_secs: lifetimes::REFRESH_TOKEN_SECS,
        }
    }
}

impl TokenLifetimes {
    /// Longest lifetime of a signed token issued under these settings
    #[must_use]
    pub fn longest_signed_token_secs(&self) -> i64 {
        self.access_token_secs.max(self.identity_token_secs)
    }
}

/// A registered client application
///
/// Immutable once registered except through an explicit admin update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Client {
    /// Unique client identifier
    pub client_id: String,
    /// Display name
    pub client_name: Option<String>,
    /// Argon2 PHC hash of the client secret (None for public clients)
    pub secret_hash: Option<String>,
    /// Whether the token endpoint requires a secret
    pub require_client_secret: bool,
    /// Grants the client may use
    pub allowed_grant_types: BTreeSet<GrantType>,
    /// Exact redirect URIs
    pub redirect_uris: BTreeSet<String>,
    /// Scopes the client may request
    pub allowed_scopes: ScopeSet,
    /// Token lifetimes
    pub lifetimes: TokenLifetimes,
    /// Whether refresh tokens may be issued (`offline_access`)
    pub allow_offline_access: bool,
    /// Whether authorization code requests must carry a PKCE challenge
    pub require_pkce: bool,
    /// Whether the subject must consent before codes or tokens are issued
    pub require_consent: bool,
    /// Disabled clients are treated as unknown
    pub enabled: bool,
    /// Registration time
    pub created_at: DateTime<Utc>,
    /// Last admin update
    pub updated_at: DateTime<Utc>,
}

impl Client {
    /// Whether the client may use `grant`
    #[must_use]
    pub fn allows_grant(&self, grant: GrantType) -> bool {
        self.allowed_grant_types.contains(&grant)
    }

    /// Confidential clients authenticate with a secret
    #[must_use]
    pub const fn is_confidential(&self) -> bool {
        self.require_client_secret
    }
}
