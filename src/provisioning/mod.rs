// ABOUTME: Idempotent provisioning of clients, identity resources, and API resources
// ABOUTME: Insert-if-absent only: existing records are never overwritten, concurrent runs never duplicate
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

//! Provisioning
//!
//! Seeding is an operator step (`arch-idp-admin seed`), not part of server
//! boot. Every record is written with an insert-if-absent keyed by its unique
//! name, so running the command twice, or from several instances at once,
//! leaves exactly one copy of each record.

/// Seed file model
pub mod seed;

use crate::errors::{AppError, AppResult};
use crate::oauth2_server::client_registry::{build_client, LifetimePolicy};
use crate::store::{StorePolicy, Stores};
use chrono::Utc;
use std::fmt;
use tracing::{debug, info};

pub use seed::{ClientSeed, SeedConfig};

/// Records written and skipped by one seeding run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeedReport {
    /// Clients inserted
    pub clients_created: usize,
    /// Clients already present
    pub clients_existing: usize,
    /// Identity resources inserted
    pub identity_resources_created: usize,
    /// Identity resources already present
    pub identity_resources_existing: usize,
    /// API resources inserted
    pub api_resources_created: usize,
    /// API resources already present
    pub api_resources_existing: usize,
}

impl SeedReport {
    /// Whether the run wrote anything
    #[must_use]
    pub const fn created_any(&self) -> bool {
        self.clients_created + self.identity_resources_created + self.api_resources_created > 0
    }
}

impl fmt::Display for SeedReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "clients {} created / {} existing, identity resources {} / {}, api resources {} / {}",
            self.clients_created,
            self.clients_existing,
            self.identity_resources_created,
            self.identity_resources_existing,
            self.api_resources_created,
            self.api_resources_existing,
        )
    }
}

/// Writes seed records through the storage capabilities
pub struct Provisioner {
    stores: Stores,
    policy: StorePolicy,
    lifetimes: LifetimePolicy,
}

impl Provisioner {
    /// Provisioner registering clients under `lifetimes`
    #[must_use]
    pub const fn new(stores: Stores, policy: StorePolicy, lifetimes: LifetimePolicy) -> Self {
        Self {
            stores,
            policy,
            lifetimes,
        }
    }

    /// Seed every record in `config`
    ///
    /// `secrets` resolves a client's `secret_env` name to the plaintext
    /// secret (normally `std::env::var`). Secrets are only resolved and
    /// hashed for clients that do not exist yet.
    ///
    /// # Errors
    ///
    /// Returns an error if a referenced secret is missing, a registration is
    /// invalid, or the store fails
    pub async fn seed(
        &self,
        config: &SeedConfig,
        secrets: &(dyn Fn(&str) -> Option<String> + Sync),
    ) -> AppResult<SeedReport> {
        let mut report = SeedReport::default();

        for resource in &config.identity_resources {
            let created = self
                .policy
                .run("insert_identity_resource", || {
                    self.stores.resources.insert_identity_resource_if_absent(resource)
                })
                .await?;
            if created {
                report.identity_resources_created += 1;
            } else {
                report.identity_resources_existing += 1;
            }
        }

        for resource in &config.api_resources {
            let created = self
                .policy
                .run("insert_api_resource", || {
                    self.stores.resources.insert_api_resource_if_absent(resource)
                })
                .await?;
            if created {
                report.api_resources_created += 1;
            } else {
                report.api_resources_existing += 1;
            }
        }

        for client in &config.clients {
            if self.seed_client(client, secrets).await? {
                report.clients_created += 1;
            } else {
                report.clients_existing += 1;
            }
        }

        info!(%report, "Provisioning complete");
        Ok(report)
    }

    async fn seed_client(
        &self,
        seed: &ClientSeed,
        secrets: &(dyn Fn(&str) -> Option<String> + Sync),
    ) -> AppResult<bool> {
        let client_id = seed.registration.client_id.as_str();
        let existing = self
            .policy
            .run("get_client", || self.stores.clients.get_client(client_id))
            .await?;
        if existing.is_some() {
            debug!(client_id, "Client already provisioned");
            return Ok(false);
        }

        let secret = match &seed.secret_env {
            Some(variable) => Some(secrets(variable).ok_or_else(|| {
                AppError::config(format!(
                    "Secret for client '{client_id}' not found: {variable} is not set"
                ))
            })?),
            None => None,
        };

        let client = build_client(
            seed.registration.clone(),
            secret.as_deref(),
            self.lifetimes,
            Utc::now(),
        )?;
        let created = self
            .policy
            .run("insert_client", || {
                self.stores.clients.insert_client_if_absent(&client)
            })
            .await?;
        if created {
            info!(client_id, "Client provisioned");
        }
        Ok(created)
    }
}
