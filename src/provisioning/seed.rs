// ABOUTME: YAML seed file model for clients, identity resources, and API resources
// ABOUTME: Client secrets are referenced by environment variable name, never stored in the file
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

use std::collections::BTreeSet;
use std::path::Path;

use arch_idp_core::models::{ApiResource, IdentityResource};
use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::errors::{AppError, AppResult};
use crate::oauth2_server::ClientRegistration;

fn default_identity_resources() -> Vec<IdentityResource> {
    IdentityResource::standard_set()
}

/// A client entry in the seed file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientSeed {
    /// Client registration
    #[serde(flatten)]
    pub registration: ClientRegistration,
    /// Environment variable holding the plaintext secret (confidential clients)
    #[serde(default)]
    pub secret_env: Option<String>,
}

/// Contents of the provisioning seed file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedConfig {
    /// Clients to register
    #[serde(default)]
    pub clients: Vec<ClientSeed>,
    /// Identity resources; the standard OIDC set when omitted
    #[serde(default = "default_identity_resources")]
    pub identity_resources: Vec<IdentityResource>,
    /// API resources
    #[serde(default)]
    pub api_resources: Vec<ApiResource>,
}

impl SeedConfig {
    /// Parse a seed document
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the YAML is malformed or names a
    /// client twice
    pub fn from_yaml_str(yaml: &str) -> AppResult<Self> {
        let config: Self = serde_yaml::from_str(yaml)
            .map_err(|e| AppError::config(format!("Invalid seed file: {e}")))?;

        let mut seen = BTreeSet::new();
        if let Some(duplicate) = config
            .clients
            .iter()
            .map(|client| client.registration.client_id.as_str())
            .find(|client_id| !seen.insert(*client_id))
        {
            return Err(AppError::config(format!(
                "Client '{duplicate}' appears more than once in the seed file"
            )));
        }
        Ok(config)
    }

    /// Read and parse a seed file
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the file cannot be read or parsed
    pub async fn from_file(path: &Path) -> AppResult<Self> {
        let yaml = fs::read_to_string(path).await.map_err(|e| {
            AppError::config(format!("Cannot read seed file {}: {e}", path.display()))
        })?;
        Self::from_yaml_str(&yaml)
    }
}
