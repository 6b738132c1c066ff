// ABOUTME: Grant manager driving authorization code, refresh token, and consent persistence
// ABOUTME: Generates opaque credentials, stores only their hashes, and maps store outcomes to protocol errors
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

//! Grant management
//!
//! Plaintext codes and refresh tokens exist only in responses; the stores
//! key everything by SHA-256 digest. Every store call goes through the
//! [`StorePolicy`] retry boundary.

use crate::constants::lifetimes;
use crate::crypto::{generate_opaque_token, hash_token};
use crate::errors::ProtocolError;
use crate::logging::AppLogger;
use crate::oauth2_server::token_issuer::expires_after;
use crate::store::{GrantStore, PurgeReport, StorePolicy};
use arch_idp_core::models::{
    AuthorizationGrant, Client, ConsentRecord, ConsumeOutcome, PkceChallenge, RefreshTokenRecord,
    RefreshTokenStatus, RotateOutcome, ScopeSet,
};
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Everything bound to a new authorization code
#[derive(Debug, Clone)]
pub struct NewAuthorizationCode<'a> {
    /// Client the code is issued to
    pub client: &'a Client,
    /// Authenticated subject
    pub subject: &'a str,
    /// Granted scopes
    pub scopes: &'a ScopeSet,
    /// Redirect URI the code is delivered to
    pub redirect_uri: &'a str,
    /// OIDC nonce
    pub nonce: Option<&'a str>,
    /// PKCE binding
    pub pkce: Option<PkceChallenge>,
    /// When the subject authenticated
    pub auth_time: DateTime<Utc>,
}

/// A freshly rotated refresh token
#[derive(Debug, Clone)]
pub struct RotatedRefreshToken {
    /// Plaintext successor to hand to the client
    pub token: String,
    /// The record that was rotated out
    pub previous: RefreshTokenRecord,
}

/// Grant lifecycle operations over a [`GrantStore`]
pub struct GrantManager {
    store: Arc<dyn GrantStore>,
    policy: StorePolicy,
}

impl GrantManager {
    /// Manager backed by `store`
    #[must_use]
    pub fn new(store: Arc<dyn GrantStore>, policy: StorePolicy) -> Self {
        Self { store, policy }
    }

    /// Issue a single-use authorization code
    ///
    /// # Errors
    ///
    /// Returns an error if code generation or persistence fails
    pub async fn create_authorization_code(
        &self,
        request: NewAuthorizationCode<'_>,
        now: DateTime<Utc>,
    ) -> Result<String, ProtocolError> {
        let code = generate_opaque_token()?;
        let grant = AuthorizationGrant {
            code_hash: hash_token(&code),
            client_id: request.client.client_id.clone(),
            subject: request.subject.to_owned(),
            scopes: request.scopes.clone(),
            redirect_uri: request.redirect_uri.to_owned(),
            nonce: request.nonce.map(ToOwned::to_owned),
            pkce: request.pkce,
            auth_time: request.auth_time,
            created_at: now,
            expires_at: expires_after(now, request.client.lifetimes.authorization_code_secs)?,
            consumed_at: None,
        };
        self.policy
            .run("store_authorization_code", || {
                self.store.store_authorization_code(&grant)
            })
            .await?;
        Ok(code)
    }

    /// Atomically consume a code on behalf of `client_id`
    ///
    /// Returns the raw store outcome; callers map it onto protocol errors.
    ///
    /// # Errors
    ///
    /// Returns a store error if the transition cannot be attempted
    pub async fn consume_authorization_code(
        &self,
        code: &str,
        client_id: &str,
        now: DateTime<Utc>,
    ) -> Result<ConsumeOutcome, ProtocolError> {
        let code_hash = hash_token(code);
        let outcome = self
            .policy
            .run("consume_authorization_code", || {
                self.store
                    .consume_authorization_code(&code_hash, client_id, now)
            })
            .await?;

        if outcome == ConsumeOutcome::ClientMismatch {
            AppLogger::log_security_event(
                "authorization_code_client_mismatch",
                "high",
                "authorization code presented by a client it was not issued to",
                client_id,
            );
        }
        Ok(outcome)
    }

    /// Start a new refresh token family at generation 0
    ///
    /// # Errors
    ///
    /// Returns an error if token generation or persistence fails
    pub async fn issue_refresh_token(
        &self,
        client: &Client,
        subject: &str,
        scopes: &ScopeSet,
        auth_time: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<String, ProtocolError> {
        let token = generate_opaque_token()?;
        let record = RefreshTokenRecord {
            token_hash: hash_token(&token),
            family_id: Uuid::new_v4(),
            generation: 0,
            parent_hash: None,
            client_id: client.client_id.clone(),
            subject: subject.to_owned(),
            scopes: scopes.clone(),
            auth_time,
            created_at: now,
            expires_at: expires_after(now, client.lifetimes.refresh_token_secs)?,
            status: RefreshTokenStatus::Active,
        };
        self.policy
            .run("store_refresh_token", || self.store.store_refresh_token(&record))
            .await?;
        Ok(token)
    }

    /// Read a refresh token record without changing it
    ///
    /// # Errors
    ///
    /// Returns a store error if the lookup fails
    pub async fn find_refresh_token(
        &self,
        token: &str,
    ) -> Result<Option<RefreshTokenRecord>, ProtocolError> {
        let token_hash = hash_token(token);
        self.policy
            .run("find_refresh_token", || {
                self.store.find_refresh_token(&token_hash)
            })
            .await
    }

    /// Rotate an active refresh token to a new one in the same family
    ///
    /// Presenting a token that was already rotated revokes the whole family
    /// and fails with `RefreshReuseDetected`.
    ///
    /// # Errors
    ///
    /// Returns `RefreshReuseDetected`, `GrantExpired`, `RefreshTokenRevoked`,
    /// `GrantNotFound`, `GrantMismatch` or a store error
    pub async fn rotate_refresh_token(
        &self,
        token: &str,
        client_id: &str,
        now: DateTime<Utc>,
    ) -> Result<RotatedRefreshToken, ProtocolError> {
        let token_hash = hash_token(token);
        let successor = generate_opaque_token()?;
        let successor_hash = hash_token(&successor);

        let outcome = self
            .policy
            .run("rotate_refresh_token", || {
                self.store
                    .rotate_refresh_token(&token_hash, client_id, &successor_hash, now)
            })
            .await?;

        match outcome {
            RotateOutcome::Rotated { previous } => Ok(RotatedRefreshToken {
                token: successor,
                previous,
            }),
            RotateOutcome::Reused {
                family_id,
                generation,
                revoked,
            } => {
                error!(
                    client_id = %client_id,
                    family_id = %family_id,
                    generation,
                    revoked,
                    "Refresh token reuse detected; token family revoked"
                );
                AppLogger::log_security_event(
                    "refresh_token_reuse",
                    "critical",
                    "rotated refresh token presented again",
                    client_id,
                );
                Err(ProtocolError::RefreshReuseDetected {
                    family_id,
                    generation,
                })
            }
            RotateOutcome::Expired => Err(ProtocolError::GrantExpired),
            RotateOutcome::Revoked => Err(ProtocolError::RefreshTokenRevoked),
            RotateOutcome::NotFound => Err(ProtocolError::GrantNotFound),
            RotateOutcome::ClientMismatch => {
                AppLogger::log_security_event(
                    "refresh_token_client_mismatch",
                    "high",
                    "refresh token presented by a client it was not issued to",
                    client_id,
                );
                Err(ProtocolError::GrantMismatch {
                    reason: "refresh token was issued to another client",
                })
            }
        }
    }

    /// Revoke every token in a family
    ///
    /// # Errors
    ///
    /// Returns a store error if the update fails
    pub async fn revoke_family(&self, family_id: Uuid) -> Result<u64, ProtocolError> {
        let revoked = self
            .policy
            .run("revoke_family", || self.store.revoke_family(family_id))
            .await?;
        info!(family_id = %family_id, revoked, "Refresh token family revoked");
        Ok(revoked)
    }

    /// Revoke the family of a refresh token presented by its owning client
    ///
    /// Unknown tokens and tokens of other clients are ignored (RFC 7009
    /// section 2.2); the return value says whether anything was revoked.
    ///
    /// # Errors
    ///
    /// Returns a store error if the lookup or update fails
    pub async fn revoke_refresh_token(
        &self,
        token: &str,
        client_id: &str,
    ) -> Result<bool, ProtocolError> {
        let Some(record) = self.find_refresh_token(token).await? else {
            return Ok(false);
        };
        if record.client_id != client_id {
            warn!(client_id = %client_id, "Revocation of another client's refresh token ignored");
            return Ok(false);
        }
        Ok(self.revoke_family(record.family_id).await? > 0)
    }

    /// Whether the subject's remembered consent covers `scopes`
    ///
    /// # Errors
    ///
    /// Returns a store error if the lookup fails
    pub async fn has_consent(
        &self,
        subject: &str,
        client_id: &str,
        scopes: &ScopeSet,
        now: DateTime<Utc>,
    ) -> Result<bool, ProtocolError> {
        let consent = self
            .policy
            .run("find_consent", || self.store.find_consent(subject, client_id))
            .await?;
        Ok(consent.is_some_and(|consent| consent.covers(scopes, now)))
    }

    /// Remember consent, merged with any scopes consented to earlier
    ///
    /// # Errors
    ///
    /// Returns a store error if the write fails
    pub async fn record_consent(
        &self,
        subject: &str,
        client_id: &str,
        scopes: &ScopeSet,
        now: DateTime<Utc>,
    ) -> Result<(), ProtocolError> {
        let existing = self
            .policy
            .run("find_consent", || self.store.find_consent(subject, client_id))
            .await?;

        let mut merged = scopes.clone();
        if let Some(existing) = existing.filter(|c| c.expires_at.map_or(true, |at| now < at)) {
            for scope in &existing.scopes {
                merged.insert(scope.clone());
            }
        }

        let consent = ConsentRecord {
            subject: subject.to_owned(),
            client_id: client_id.to_owned(),
            scopes: merged,
            created_at: now,
            expires_at: Some(now + Duration::seconds(lifetimes::CONSENT_SECS)),
        };
        self.policy
            .run("store_consent", || self.store.store_consent(&consent))
            .await
    }

    /// Delete codes, refresh tokens and consents that expired more than
    /// [`lifetimes::EXPIRED_GRANT_RETENTION_SECS`] before `now`
    ///
    /// Recently expired grants stay so a late presentation is reported as
    /// expired rather than unknown.
    ///
    /// # Errors
    ///
    /// Returns a store error if the purge fails
    pub async fn purge_expired(&self, now: DateTime<Utc>) -> Result<PurgeReport, ProtocolError> {
        let cutoff = now - Duration::seconds(lifetimes::EXPIRED_GRANT_RETENTION_SECS);
        self.policy
            .run("purge_expired", || self.store.purge_expired(cutoff))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;
    use arch_idp_core::models::{GrantType, TokenLifetimes};

    fn client() -> Client {
        let now = Utc::now();
        Client {
            client_id: "web-app".to_owned(),
            client_name: None,
            secret_hash: None,
            require_client_secret: false,
            allowed_grant_types: [GrantType::AuthorizationCode].into_iter().collect(),
            redirect_uris: ["https://app.example.com/cb".to_owned()].into_iter().collect(),
            allowed_scopes: ScopeSet::parse("openid profile offline_access"),
            lifetimes: TokenLifetimes::default(),
            allow_offline_access: true,
            require_pkce: false,
            require_consent: false,
            enabled: true,
            created_at: now,
            updated_at: now,
        }
    }

    fn manager() -> GrantManager {
        GrantManager::new(Arc::new(InMemoryStore::new()), StorePolicy::default())
    }

    #[tokio::test]
    async fn test_code_is_stored_by_hash_and_consumed_once() {
        let manager = manager();
        let client = client();
        let scopes = ScopeSet::parse("openid");
        let now = Utc::now();
        let code = manager
            .create_authorization_code(
                NewAuthorizationCode {
                    client: &client,
                    subject: "alice",
                    scopes: &scopes,
                    redirect_uri: "https://app.example.com/cb",
                    nonce: Some("n-1"),
                    pkce: None,
                    auth_time: now,
                },
                now,
            )
            .await
            .unwrap();

        let first = manager
            .consume_authorization_code(&code, "web-app", now)
            .await
            .unwrap();
        let ConsumeOutcome::Consumed(grant) = first else {
            panic!("expected consumption, got {first:?}");
        };
        assert_eq!(grant.nonce.as_deref(), Some("n-1"));
        assert_ne!(grant.code_hash, code);

        assert_eq!(
            manager
                .consume_authorization_code(&code, "web-app", now)
                .await
                .unwrap(),
            ConsumeOutcome::AlreadyConsumed
        );
    }

    #[tokio::test]
    async fn test_revocation_ignores_other_clients() {
        let manager = manager();
        let client = client();
        let now = Utc::now();
        let token = manager
            .issue_refresh_token(&client, "alice", &ScopeSet::parse("openid offline_access"), now, now)
            .await
            .unwrap();

        assert!(!manager.revoke_refresh_token(&token, "mobile-app").await.unwrap());
        assert!(manager.revoke_refresh_token(&token, "web-app").await.unwrap());
        assert!(matches!(
            manager.rotate_refresh_token(&token, "web-app", now).await,
            Err(ProtocolError::RefreshTokenRevoked)
        ));
    }

    #[tokio::test]
    async fn test_consent_merges_scopes() {
        let manager = manager();
        let now = Utc::now();
        manager
            .record_consent("alice", "web-app", &ScopeSet::parse("openid"), now)
            .await
            .unwrap();
        manager
            .record_consent("alice", "web-app", &ScopeSet::parse("profile"), now)
            .await
            .unwrap();
        assert!(manager
            .has_consent("alice", "web-app", &ScopeSet::parse("openid profile"), now)
            .await
            .unwrap());
        assert!(!manager
            .has_consent("alice", "web-app", &ScopeSet::parse("email"), now)
            .await
            .unwrap());
    }
}
