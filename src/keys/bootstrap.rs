// ABOUTME: Signing key bootstrap at server start
// ABOUTME: Loads persisted keys, imports a configured PEM, or generates a developer key outside production
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

use super::{KeyRotationSettings, KeySet, SigningKey, SigningKeyManager};
use crate::config::ServerConfig;
use crate::errors::{AppError, AppResult};
use crate::store::{SigningKeyStore, StorePolicy};
use chrono::{Duration, Utc};
use std::sync::Arc;
use tokio::fs;
use tracing::{info, warn};

/// Rotation settings derived from configuration
#[must_use]
pub fn rotation_settings(config: &ServerConfig) -> KeyRotationSettings {
    KeyRotationSettings {
        key_bits: config.signing.key_bits,
        rotation_interval: Duration::days(config.signing.rotation_days),
        overlap: Duration::seconds(config.signing.overlap_secs),
    }
}

/// Publish the persisted keys whose verification window is still open
///
/// # Errors
///
/// Returns an error if the store is unavailable or a stored key is unreadable
pub async fn load_signing_keys(
    config: &ServerConfig,
    store: Arc<dyn SigningKeyStore>,
    policy: StorePolicy,
) -> AppResult<SigningKeyManager> {
    let now = Utc::now();
    let records = policy
        .run("load_signing_keys", || store.load_signing_keys())
        .await?;
    let persisted = records
        .iter()
        .filter(|record| record.verify_until.map_or(true, |until| now < until))
        .map(SigningKey::from_record)
        .collect::<AppResult<Vec<_>>>()?;

    Ok(SigningKeyManager::new(
        KeySet::from_keys(persisted),
        store,
        policy,
        rotation_settings(config),
    ))
}

/// Build the signing key manager for a server process
///
/// 1. A PEM file at `SIGNING_KEY_PATH` becomes the active key (the previous
///    active key, if different, is retired with the overlap window).
/// 2. Otherwise the newest persisted active key is used.
/// 3. Otherwise, outside production, a developer key is generated and
///    persisted.
///
/// # Errors
///
/// Returns `SigningKeyUnavailable` in production when no key material is
/// configured or persisted, and propagates unreadable key material
pub async fn bootstrap_signing_keys(
    config: &ServerConfig,
    store: Arc<dyn SigningKeyStore>,
    policy: StorePolicy,
) -> AppResult<SigningKeyManager> {
    let now = Utc::now();
    let manager = load_signing_keys(config, store, policy).await?;

    if let Some(path) = &config.signing.key_path {
        let pem = fs::read_to_string(path).await.map_err(|e| {
            AppError::signing_key(format!(
                "Cannot read signing key file {}: {e}",
                path.display()
            ))
        })?;
        let imported = SigningKey::from_pem(&pem, now)?;
        let already_active = manager
            .snapshot()
            .active()
            .is_some_and(|active| active.kid() == imported.kid());
        if already_active {
            info!(kid = %imported.kid(), "Configured signing key already active");
        } else {
            info!(kid = %imported.kid(), "Activating configured signing key");
            manager.rotate(imported, now).await?;
        }
        return Ok(manager);
    }

    if let Some(active) = manager.snapshot().active() {
        info!(kid = %active.kid(), "Loaded persisted signing key");
        return Ok(manager);
    }

    if !config.environment.allows_developer_signing_key() {
        return Err(AppError::signing_key(
            "No signing key available: set SIGNING_KEY_PATH or provision a key with `arch-idp-admin rotate-keys`",
        ));
    }

    warn!("No signing key configured; generating a developer signing credential");
    let kid = manager.rotate_generated(now).await?;
    info!(kid = %kid, "Developer signing key generated and persisted");
    Ok(manager)
}
