// ABOUTME: Storage capability traits for clients, grants, resources, and signing keys
// ABOUTME: Adapters (in-memory and SQLite) are swappable behind these async traits
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

//! Persistence capabilities
//!
//! The protocol engine never talks to a database directly. It is handed a
//! [`Stores`] bundle at construction time and every operation it needs is a
//! method on one of the traits below. The atomic operations
//! ([`GrantStore::consume_authorization_code`] and
//! [`GrantStore::rotate_refresh_token`]) are single guarded state transitions
//! in every adapter.

/// `DashMap`-backed adapter for tests and single-process deployments
pub mod memory;
/// Timeout, retry and backoff boundary around store calls
pub mod resilience;

use crate::database::Database;
use crate::errors::StoreError;
use arch_idp_core::models::{
    ApiResource, AuthorizationGrant, Client, ConsentRecord, ConsumeOutcome, IdentityResource,
    RefreshTokenRecord, RotateOutcome, SigningKeyRecord,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

pub use memory::InMemoryStore;
pub use resilience::StorePolicy;

/// Result type for storage adapters
pub type StoreResult<T> = Result<T, StoreError>;

/// Rows removed by a maintenance purge
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PurgeReport {
    /// Expired authorization codes
    pub authorization_codes: u64,
    /// Expired refresh tokens (any status)
    pub refresh_tokens: u64,
    /// Expired consent records
    pub consents: u64,
}

impl PurgeReport {
    /// Total rows removed
    #[must_use]
    pub const fn total(&self) -> u64 {
        self.authorization_codes + self.refresh_tokens + self.consents
    }
}

/// Registered client persistence
#[async_trait]
pub trait ClientStore: Send + Sync {
    /// Fetch a client by id
    async fn get_client(&self, client_id: &str) -> StoreResult<Option<Client>>;

    /// Insert unless a client with the same id exists; returns whether a row was written
    async fn insert_client_if_absent(&self, client: &Client) -> StoreResult<bool>;

    /// Insert or replace (explicit admin update)
    async fn upsert_client(&self, client: &Client) -> StoreResult<()>;

    /// All registered clients ordered by id
    async fn list_clients(&self) -> StoreResult<Vec<Client>>;
}

/// Authorization code, refresh token and consent persistence
#[async_trait]
pub trait GrantStore: Send + Sync {
    /// Persist a freshly issued authorization code
    async fn store_authorization_code(&self, grant: &AuthorizationGrant) -> StoreResult<()>;

    /// Atomically consume a code
    ///
    /// Expiry is evaluated before consumption state: an expired code reports
    /// [`ConsumeOutcome::Expired`] whether or not it was ever exchanged. A
    /// code belonging to another client is left untouched.
    async fn consume_authorization_code(
        &self,
        code_hash: &str,
        client_id: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<ConsumeOutcome>;

    /// Persist a refresh token record
    async fn store_refresh_token(&self, record: &RefreshTokenRecord) -> StoreResult<()>;

    /// Look up a refresh token by hash without changing it
    async fn find_refresh_token(&self, token_hash: &str)
        -> StoreResult<Option<RefreshTokenRecord>>;

    /// Atomically rotate an active token to `successor_hash`
    ///
    /// On success the presented token becomes `Rotated` and its successor
    /// (see [`RefreshTokenRecord::successor`]) is stored in the same step.
    /// Presenting a token that is already `Rotated` revokes the entire
    /// family before returning [`RotateOutcome::Reused`].
    async fn rotate_refresh_token(
        &self,
        token_hash: &str,
        client_id: &str,
        successor_hash: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<RotateOutcome>;

    /// Revoke every token of a family; returns how many changed status
    async fn revoke_family(&self, family_id: Uuid) -> StoreResult<u64>;

    /// Record (or replace) a subject's consent for a client
    async fn store_consent(&self, consent: &ConsentRecord) -> StoreResult<()>;

    /// Find the consent a subject gave a client
    async fn find_consent(
        &self,
        subject: &str,
        client_id: &str,
    ) -> StoreResult<Option<ConsentRecord>>;

    /// Delete everything that expired at or before `cutoff`
    async fn purge_expired(&self, cutoff: DateTime<Utc>) -> StoreResult<PurgeReport>;
}

/// Identity and API resource persistence
#[async_trait]
pub trait ResourceStore: Send + Sync {
    /// Insert unless a resource with the same name exists
    async fn insert_identity_resource_if_absent(
        &self,
        resource: &IdentityResource,
    ) -> StoreResult<bool>;

    /// Insert unless a resource with the same name exists
    async fn insert_api_resource_if_absent(&self, resource: &ApiResource) -> StoreResult<bool>;

    /// All identity resources ordered by name
    async fn list_identity_resources(&self) -> StoreResult<Vec<IdentityResource>>;

    /// All API resources ordered by name
    async fn list_api_resources(&self) -> StoreResult<Vec<ApiResource>>;
}

/// Signing key persistence
#[async_trait]
pub trait SigningKeyStore: Send + Sync {
    /// Insert or update a key by `kid`
    async fn save_signing_key(&self, record: &SigningKeyRecord) -> StoreResult<()>;

    /// All persisted keys, newest first
    async fn load_signing_keys(&self) -> StoreResult<Vec<SigningKeyRecord>>;

    /// Remove a key whose verification window has closed
    async fn delete_signing_key(&self, kid: &str) -> StoreResult<bool>;
}

/// The storage capabilities handed to the engine
#[derive(Clone)]
pub struct Stores {
    /// Client registry persistence
    pub clients: Arc<dyn ClientStore>,
    /// Grant persistence
    pub grants: Arc<dyn GrantStore>,
    /// Resource persistence
    pub resources: Arc<dyn ResourceStore>,
    /// Signing key persistence
    pub signing_keys: Arc<dyn SigningKeyStore>,
}

impl Stores {
    /// Every capability backed by one in-memory adapter
    #[must_use]
    pub fn memory() -> Self {
        let store = Arc::new(InMemoryStore::new());
        Self {
            clients: store.clone(),
            grants: store.clone(),
            resources: store.clone(),
            signing_keys: store,
        }
    }

    /// Every capability backed by the `SQLite` adapter
    #[must_use]
    pub fn sqlite(database: &Database) -> Self {
        let database = Arc::new(database.clone());
        Self {
            clients: database.clone(),
            grants: database.clone(),
            resources: database.clone(),
            signing_keys: database,
        }
    }
}
