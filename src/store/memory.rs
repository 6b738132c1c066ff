// ABOUTME: In-memory storage adapter built on DashMap
// ABOUTME: Per-entry locks give atomic code consumption and refresh token rotation
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

use super::{
    ClientStore, GrantStore, PurgeReport, ResourceStore, SigningKeyStore, StoreResult,
};
use arch_idp_core::models::{
    ApiResource, AuthorizationGrant, Client, ConsentRecord, ConsumeOutcome, IdentityResource,
    RefreshTokenRecord, RefreshTokenStatus, RotateOutcome, SigningKeyRecord,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::debug;
use uuid::Uuid;

/// Process-local store for every capability
///
/// Refresh token mutations lock the family entry before any token entry,
/// and never hold a token entry while inserting into the token map.
#[derive(Default)]
pub struct InMemoryStore {
    clients: DashMap<String, Client>,
    codes: DashMap<String, AuthorizationGrant>,
    refresh_tokens: DashMap<String, RefreshTokenRecord>,
    families: DashMap<Uuid, Vec<String>>,
    consents: DashMap<(String, String), ConsentRecord>,
    identity_resources: DashMap<String, IdentityResource>,
    api_resources: DashMap<String, ApiResource>,
    signing_keys: DashMap<String, SigningKeyRecord>,
}

impl InMemoryStore {
    /// Empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Caller must hold the family entry
    fn revoke_hashes(&self, hashes: &[String]) -> u64 {
        let mut revoked = 0;
        for hash in hashes {
            if let Some(mut token) = self.refresh_tokens.get_mut(hash) {
                if token.status != RefreshTokenStatus::Revoked {
                    token.status = RefreshTokenStatus::Revoked;
                    revoked += 1;
                }
            }
        }
        revoked
    }
}

#[async_trait]
impl ClientStore for InMemoryStore {
    async fn get_client(&self, client_id: &str) -> StoreResult<Option<Client>> {
        Ok(self.clients.get(client_id).map(|c| c.value().clone()))
    }

    async fn insert_client_if_absent(&self, client: &Client) -> StoreResult<bool> {
        match self.clients.entry(client.client_id.clone()) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(slot) => {
                slot.insert(client.clone());
                Ok(true)
            }
        }
    }

    async fn upsert_client(&self, client: &Client) -> StoreResult<()> {
        self.clients.insert(client.client_id.clone(), client.clone());
        Ok(())
    }

    async fn list_clients(&self) -> StoreResult<Vec<Client>> {
        let mut clients: Vec<Client> = self.clients.iter().map(|c| c.value().clone()).collect();
        clients.sort_by(|a, b| a.client_id.cmp(&b.client_id));
        Ok(clients)
    }
}

#[async_trait]
impl GrantStore for InMemoryStore {
    async fn store_authorization_code(&self, grant: &AuthorizationGrant) -> StoreResult<()> {
        self.codes.insert(grant.code_hash.clone(), grant.clone());
        Ok(())
    }

    async fn consume_authorization_code(
        &self,
        code_hash: &str,
        client_id: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<ConsumeOutcome> {
        // The RefMut holds the shard write lock for the whole check-and-set
        let Some(mut grant) = self.codes.get_mut(code_hash) else {
            return Ok(ConsumeOutcome::NotFound);
        };
        if grant.client_id != client_id {
            return Ok(ConsumeOutcome::ClientMismatch);
        }
        if grant.is_expired_at(now) {
            return Ok(ConsumeOutcome::Expired);
        }
        if grant.consumed_at.is_some() {
            return Ok(ConsumeOutcome::AlreadyConsumed);
        }
        grant.consumed_at = Some(now);
        Ok(ConsumeOutcome::Consumed(grant.clone()))
    }

    async fn store_refresh_token(&self, record: &RefreshTokenRecord) -> StoreResult<()> {
        let mut family = self.families.entry(record.family_id).or_default();
        family.push(record.token_hash.clone());
        self.refresh_tokens
            .insert(record.token_hash.clone(), record.clone());
        drop(family);
        Ok(())
    }

    async fn find_refresh_token(
        &self,
        token_hash: &str,
    ) -> StoreResult<Option<RefreshTokenRecord>> {
        Ok(self.refresh_tokens.get(token_hash).map(|r| r.value().clone()))
    }

    async fn rotate_refresh_token(
        &self,
        token_hash: &str,
        client_id: &str,
        successor_hash: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<RotateOutcome> {
        let Some(family_id) = self.refresh_tokens.get(token_hash).map(|r| r.family_id) else {
            return Ok(RotateOutcome::NotFound);
        };

        let mut family = self.families.entry(family_id).or_default();

        let previous = {
            let Some(mut token) = self.refresh_tokens.get_mut(token_hash) else {
                return Ok(RotateOutcome::NotFound);
            };
            if token.client_id != client_id {
                return Ok(RotateOutcome::ClientMismatch);
            }
            match token.status {
                RefreshTokenStatus::Revoked => return Ok(RotateOutcome::Revoked),
                RefreshTokenStatus::Rotated => {
                    let generation = token.generation;
                    drop(token);
                    let revoked = self.revoke_hashes(&family);
                    return Ok(RotateOutcome::Reused {
                        family_id,
                        generation,
                        revoked,
                    });
                }
                RefreshTokenStatus::Active => {}
            }
            if token.is_expired_at(now) {
                return Ok(RotateOutcome::Expired);
            }
            token.status = RefreshTokenStatus::Rotated;
            token.clone()
        };

        let successor = previous.successor(successor_hash.to_owned(), now);
        family.push(successor.token_hash.clone());
        self.refresh_tokens
            .insert(successor.token_hash.clone(), successor);
        drop(family);

        Ok(RotateOutcome::Rotated { previous })
    }

    async fn revoke_family(&self, family_id: Uuid) -> StoreResult<u64> {
        let Some(family) = self.families.get_mut(&family_id) else {
            return Ok(0);
        };
        let revoked = self.revoke_hashes(&family);
        drop(family);
        Ok(revoked)
    }

    async fn store_consent(&self, consent: &ConsentRecord) -> StoreResult<()> {
        self.consents.insert(
            (consent.subject.clone(), consent.client_id.clone()),
            consent.clone(),
        );
        Ok(())
    }

    async fn find_consent(
        &self,
        subject: &str,
        client_id: &str,
    ) -> StoreResult<Option<ConsentRecord>> {
        Ok(self
            .consents
            .get(&(subject.to_owned(), client_id.to_owned()))
            .map(|c| c.value().clone()))
    }

    async fn purge_expired(&self, cutoff: DateTime<Utc>) -> StoreResult<PurgeReport> {
        let mut report = PurgeReport::default();

        let codes_before = self.codes.len();
        self.codes.retain(|_, grant| !grant.is_expired_at(cutoff));
        report.authorization_codes = (codes_before - self.codes.len()) as u64;

        let tokens_before = self.refresh_tokens.len();
        self.refresh_tokens.retain(|_, token| !token.is_expired_at(cutoff));
        report.refresh_tokens = (tokens_before - self.refresh_tokens.len()) as u64;
        self.families.retain(|_, hashes| {
            hashes.retain(|hash| self.refresh_tokens.contains_key(hash));
            !hashes.is_empty()
        });

        let consents_before = self.consents.len();
        self.consents.retain(|_, consent| {
            consent
                .expires_at
                .map_or(true, |expires_at| cutoff < expires_at)
        });
        report.consents = (consents_before - self.consents.len()) as u64;

        debug!(
            codes = report.authorization_codes,
            refresh_tokens = report.refresh_tokens,
            consents = report.consents,
            "Purged expired in-memory grants"
        );
        Ok(report)
    }
}

#[async_trait]
impl ResourceStore for InMemoryStore {
    async fn insert_identity_resource_if_absent(
        &self,
        resource: &IdentityResource,
    ) -> StoreResult<bool> {
        match self.identity_resources.entry(resource.name.clone()) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(slot) => {
                slot.insert(resource.clone());
                Ok(true)
            }
        }
    }

    async fn insert_api_resource_if_absent(&self, resource: &ApiResource) -> StoreResult<bool> {
        match self.api_resources.entry(resource.name.clone()) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(slot) => {
                slot.insert(resource.clone());
                Ok(true)
            }
        }
    }

    async fn list_identity_resources(&self) -> StoreResult<Vec<IdentityResource>> {
        let mut resources: Vec<IdentityResource> = self
            .identity_resources
            .iter()
            .map(|r| r.value().clone())
            .collect();
        resources.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(resources)
    }

    async fn list_api_resources(&self) -> StoreResult<Vec<ApiResource>> {
        let mut resources: Vec<ApiResource> = self
            .api_resources
            .iter()
            .map(|r| r.value().clone())
            .collect();
        resources.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(resources)
    }
}

#[async_trait]
impl SigningKeyStore for InMemoryStore {
    async fn save_signing_key(&self, record: &SigningKeyRecord) -> StoreResult<()> {
        self.signing_keys.insert(record.kid.clone(), record.clone());
        Ok(())
    }

    async fn load_signing_keys(&self) -> StoreResult<Vec<SigningKeyRecord>> {
        let mut keys: Vec<SigningKeyRecord> = self
            .signing_keys
            .iter()
            .map(|k| k.value().clone())
            .collect();
        keys.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(keys)
    }

    async fn delete_signing_key(&self, kid: &str) -> StoreResult<bool> {
        Ok(self.signing_keys.remove(kid).is_some())
    }
}
