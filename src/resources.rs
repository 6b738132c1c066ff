// ABOUTME: Centralized resource container for dependency injection in the HTTP server
// ABOUTME: Holds configuration, stores, signing keys, the protocol engine, and the subject authenticator
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

//! # Server Resources
//!
//! Everything a request handler needs is constructed once at startup and
//! shared behind `Arc`s. Nothing here is looked up from a global.

use crate::config::ServerConfig;
use crate::keys::SigningKeyManager;
use crate::oauth2_server::{ProfileProvider, ProtocolEngine, SubjectAuthenticator};
use crate::store::{StorePolicy, Stores};
use std::sync::Arc;

/// Shared server resources
#[derive(Clone)]
pub struct ServerResources {
    /// Loaded configuration
    pub config: Arc<ServerConfig>,
    /// Storage capabilities
    pub stores: Stores,
    /// Signing key set
    pub keys: Arc<SigningKeyManager>,
    /// Protocol engine
    pub engine: Arc<ProtocolEngine>,
    /// Resolves the subject behind authorize requests
    pub authenticator: Arc<dyn SubjectAuthenticator>,
}

impl ServerResources {
    /// Wire the engine from its collaborators
    #[must_use]
    pub fn new(
        config: ServerConfig,
        stores: Stores,
        keys: Arc<SigningKeyManager>,
        profiles: Arc<dyn ProfileProvider>,
        authenticator: Arc<dyn SubjectAuthenticator>,
    ) -> Self {
        let policy = StorePolicy::from(&config.store);
        let engine = Arc::new(ProtocolEngine::new(
            config.issuer_url.clone(),
            &stores,
            keys.clone(),
            profiles,
            policy,
        ));
        Self {
            config: Arc::new(config),
            stores,
            keys,
            engine,
            authenticator,
        }
    }

    /// Store policy derived from configuration
    #[must_use]
    pub fn store_policy(&self) -> StorePolicy {
        StorePolicy::from(&self.config.store)
    }
}
