// ABOUTME: Client registry with exact redirect URI matching and Argon2 secret verification
// ABOUTME: Read-only at request time; registration hashes secrets and validates redirect URIs
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

use crate::config::environment::ServerConfig;
use crate::constants::{defaults, lifetimes};
use crate::errors::{AppError, AppResult, ProtocolError};
use crate::logging::AppLogger;
use crate::store::{ClientStore, StorePolicy};
use arch_idp_core::models::{Client, GrantType, ScopeSet, TokenLifetimes};
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use ring::rand::{SecureRandom, SystemRandom};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};
use url::Url;

const fn default_true() -> bool {
    true
}

/// Administrative description of a client, before its secret is hashed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientRegistration {
    /// Unique client identifier
    pub client_id: String,
    /// Display name
    #[serde(default)]
    pub client_name: Option<String>,
    /// Grants the client may use
    pub grant_types: BTreeSet<GrantType>,
    /// Exact redirect URIs
    #[serde(default)]
    pub redirect_uris: BTreeSet<String>,
    /// Scopes the client may request
    pub scopes: ScopeSet,
    /// Overrides for the configured token lifetimes
    #[serde(default)]
    pub lifetimes: Option<TokenLifetimes>,
    /// Whether the token endpoint requires a secret
    #[serde(default = "default_true")]
    pub require_client_secret: bool,
    /// Whether refresh tokens may be issued
    #[serde(default)]
    pub allow_offline_access: bool,
    /// Whether authorization code requests must carry PKCE
    #[serde(default)]
    pub require_pkce: bool,
    /// Whether the subject must consent
    #[serde(default)]
    pub require_consent: bool,
    /// Disabled clients are treated as unknown
    #[serde(default = "default_true")]
    pub enabled: bool,
}

/// Credentials presented at the token or revocation endpoint
#[derive(Clone, Default)]
pub struct ClientCredentials {
    /// Client identifier
    pub client_id: String,
    /// Plaintext secret, if presented
    pub client_secret: Option<String>,
}

impl fmt::Debug for ClientCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &self.client_secret.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

/// Lifetime defaults and the bounds applied to per-client overrides
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LifetimePolicy {
    /// Lifetimes of clients without overrides
    pub defaults: TokenLifetimes,
    /// How long a retired signing key stays verifiable; caps signed token lifetimes
    pub key_overlap_secs: i64,
}

impl LifetimePolicy {
    /// Policy for `defaults` under a key overlap of `key_overlap_secs`
    #[must_use]
    pub const fn new(defaults: TokenLifetimes, key_overlap_secs: i64) -> Self {
        Self {
            defaults,
            key_overlap_secs,
        }
    }

    /// Policy from the configured token defaults and signing overlap
    #[must_use]
    pub fn from_config(config: &ServerConfig) -> Self {
        Self::new(config.token_defaults, config.signing.overlap_secs)
    }

    fn validate(&self, client_id: &str, overrides: &TokenLifetimes) -> AppResult<()> {
        let all = [
            overrides.access_token_secs,
            overrides.identity_token_secs,
            overrides.authorization_code_secs,
            overrides.refresh_token_secs,
        ];
        if all.iter().any(|secs| *secs <= 0) {
            return Err(AppError::invalid_input(format!(
                "Client '{client_id}' has a non-positive token lifetime"
            )));
        }
        if all.iter().any(|secs| *secs > lifetimes::MAX_SECS) {
            return Err(AppError::invalid_input(format!(
                "Client '{client_id}' has a token lifetime above {}s",
                lifetimes::MAX_SECS
            )));
        }

        // A retired key must verify every token it signed until that token expires
        let longest = overrides.longest_signed_token_secs();
        if longest > self.key_overlap_secs {
            return Err(AppError::invalid_input(format!(
                "Client '{client_id}' issues tokens for {longest}s but retired keys verify for {}s",
                self.key_overlap_secs
            )));
        }
        Ok(())
    }
}

impl Default for LifetimePolicy {
    fn default() -> Self {
        Self::new(TokenLifetimes::default(), defaults::KEY_OVERLAP_SECS)
    }
}

/// Read access to registered clients
pub struct ClientRegistry {
    store: Arc<dyn ClientStore>,
    policy: StorePolicy,
}

impl ClientRegistry {
    /// Registry backed by `store`
    #[must_use]
    pub fn new(store: Arc<dyn ClientStore>, policy: StorePolicy) -> Self {
        Self { store, policy }
    }

    /// Find an enabled client
    ///
    /// # Errors
    ///
    /// Returns `ClientError` for unknown or disabled clients and a store
    /// error if the lookup fails
    pub async fn lookup(&self, client_id: &str) -> Result<Client, ProtocolError> {
        let client = self
            .policy
            .run("get_client", || self.store.get_client(client_id))
            .await?;

        match client {
            Some(client) if client.enabled => Ok(client),
            Some(_) => Err(ProtocolError::ClientError {
                client_id: client_id.to_owned(),
                reason: "client is disabled",
            }),
            None => Err(ProtocolError::ClientError {
                client_id: client_id.to_owned(),
                reason: "unknown client",
            }),
        }
    }

    /// Exact string match against the registered redirect URIs
    #[must_use]
    pub fn validate_redirect_uri(client: &Client, uri: &str) -> bool {
        client.redirect_uris.contains(uri)
    }

    /// Verify a presented secret against the stored Argon2 hash
    ///
    /// The verifier compares digests in constant time.
    #[must_use]
    pub fn validate_secret(client: &Client, presented: &str) -> bool {
        let Some(stored) = client.secret_hash.as_deref() else {
            return false;
        };
        let Ok(parsed) = PasswordHash::new(stored) else {
            tracing::error!(client_id = %client.client_id, "Stored client secret hash is unparseable");
            return false;
        };
        Argon2::default()
            .verify_password(presented.as_bytes(), &parsed)
            .is_ok()
    }

    /// Look up and authenticate a client at the token endpoint
    ///
    /// Confidential clients must present a valid secret. Public clients
    /// authenticate with their identifier alone and must not present one.
    ///
    /// # Errors
    ///
    /// Returns `ClientError` when the client is unknown, disabled, or fails
    /// authentication
    pub async fn authenticate(&self, credentials: &ClientCredentials) -> Result<Client, ProtocolError> {
        if credentials.client_id.is_empty() {
            return Err(ProtocolError::ClientError {
                client_id: String::new(),
                reason: "client_id is required",
            });
        }
        let client = self.lookup(&credentials.client_id).await?;

        let authenticated = match (&credentials.client_secret, client.require_client_secret) {
            (Some(secret), true) => Self::validate_secret(&client, secret),
            (None, false) => true,
            (Some(_), false) | (None, true) => false,
        };

        if authenticated {
            debug!(client_id = %client.client_id, "Client authenticated");
            Ok(client)
        } else {
            AppLogger::log_security_event(
                "client_authentication_failed",
                "medium",
                "client secret missing or invalid",
                &client.client_id,
            );
            Err(ProtocolError::ClientError {
                client_id: client.client_id,
                reason: "authentication failed",
            })
        }
    }

    /// Register or replace a client (explicit admin update)
    ///
    /// # Errors
    ///
    /// Returns an error if the registration is invalid or the write fails
    pub async fn register(
        &self,
        registration: ClientRegistration,
        secret: Option<&str>,
        lifetimes: LifetimePolicy,
    ) -> AppResult<Client> {
        let client = build_client(registration, secret, lifetimes, Utc::now())?;
        self.policy
            .run("upsert_client", || self.store.upsert_client(&client))
            .await?;
        info!(client_id = %client.client_id, "Client registered");
        Ok(client)
    }
}

/// Validate a registration and hash its secret into a storable client
///
/// # Errors
///
/// Returns an error for invalid redirect URIs or lifetimes, a missing secret
/// on a confidential client, a secret on a public client, or a hashing failure
pub fn build_client(
    registration: ClientRegistration,
    secret: Option<&str>,
    lifetimes: LifetimePolicy,
    now: DateTime<Utc>,
) -> AppResult<Client> {
    validate_registration(&registration)?;
    if let Some(overrides) = &registration.lifetimes {
        lifetimes.validate(&registration.client_id, overrides)?;
    }

    let secret_hash = match (secret, registration.require_client_secret) {
        (Some(secret), true) => Some(hash_client_secret(secret)?),
        (None, false) => None,
        (None, true) => {
            return Err(AppError::invalid_input(format!(
                "Client '{}' requires a secret",
                registration.client_id
            )))
        }
        (Some(_), false) => {
            return Err(AppError::invalid_input(format!(
                "Public client '{}' must not have a secret",
                registration.client_id
            )))
        }
    };

    Ok(Client {
        client_id: registration.client_id,
        client_name: registration.client_name,
        secret_hash,
        require_client_secret: registration.require_client_secret,
        allowed_grant_types: registration.grant_types,
        redirect_uris: registration.redirect_uris,
        allowed_scopes: registration.scopes,
        lifetimes: registration.lifetimes.unwrap_or(lifetimes.defaults),
        allow_offline_access: registration.allow_offline_access,
        require_pkce: registration.require_pkce,
        require_consent: registration.require_consent,
        enabled: registration.enabled,
        created_at: now,
        updated_at: now,
    })
}

fn validate_registration(registration: &ClientRegistration) -> AppResult<()> {
    if registration.client_id.trim().is_empty() {
        return Err(AppError::invalid_input("client_id must not be empty"));
    }
    if registration.grant_types.is_empty() {
        return Err(AppError::invalid_input(format!(
            "Client '{}' has no grant types",
            registration.client_id
        )));
    }

    let redirecting = registration.grant_types.contains(&GrantType::AuthorizationCode)
        || registration.grant_types.contains(&GrantType::Implicit);
    if redirecting && registration.redirect_uris.is_empty() {
        return Err(AppError::invalid_input(format!(
            "Client '{}' needs at least one redirect URI",
            registration.client_id
        )));
    }
    if let Some(uri) = registration
        .redirect_uris
        .iter()
        .find(|uri| !is_valid_redirect_uri(uri))
    {
        return Err(AppError::invalid_input(format!("Invalid redirect_uri: {uri}")));
    }

    if registration.grant_types.contains(&GrantType::ClientCredentials)
        && !registration.require_client_secret
    {
        return Err(AppError::invalid_input(format!(
            "Public client '{}' cannot use client_credentials",
            registration.client_id
        )));
    }
    Ok(())
}

/// Absolute URI, no fragment or wildcard, https or loopback http
fn is_valid_redirect_uri(uri: &str) -> bool {
    if uri.trim().is_empty() || uri.contains('#') || uri.contains('*') {
        return false;
    }
    let Ok(parsed) = Url::parse(uri) else {
        return false;
    };
    let loopback = matches!(
        parsed.host_str(),
        Some("localhost" | "127.0.0.1" | "[::1]")
    );
    match parsed.scheme() {
        "https" => true,
        "http" => loopback,
        _ => false,
    }
}

/// Hash a client secret with Argon2id and a random salt
///
/// # Errors
///
/// Returns an error if hashing fails
pub fn hash_client_secret(secret: &str) -> AppResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(secret.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AppError::internal(format!("Argon2 password hashing failed: {e}")))
}

/// Generate a random client secret
///
/// # Errors
///
/// Returns an error if the system random number generator fails
pub fn generate_client_secret() -> AppResult<String> {
    let mut secret = [0u8; 32];
    SystemRandom::new()
        .fill(&mut secret)
        .map_err(|_| AppError::internal("System RNG failure while generating client secret"))?;
    Ok(URL_SAFE_NO_PAD.encode(secret))
}
