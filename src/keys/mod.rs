// ABOUTME: Signing key manager with copy-on-write key set publication
// ABOUTME: Serves the active key, retired-but-verifiable keys, JWKS, and scheduled rotation
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

//! Signing Key Management
//!
//! - Exactly one active key signs new tokens
//! - Retired keys keep verifying until `verify_until`, which is at least
//!   the longest token lifetime after retirement
//! - The key set is an immutable snapshot behind `RwLock<Arc<KeySet>>`;
//!   rotation builds a new snapshot and swaps the `Arc`, so readers see
//!   either the old set or the new one, never a mix

/// Startup loading and developer key generation
pub mod bootstrap;
/// RSA keys and the JWK wire format
pub mod jwk;

use crate::errors::ProtocolError;
use crate::store::{SigningKeyStore, StorePolicy};
use chrono::{DateTime, Duration, Utc};
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::Mutex;
use tokio::task::spawn_blocking;
use tracing::{info, warn};

pub use bootstrap::{bootstrap_signing_keys, load_signing_keys};
pub use jwk::{JsonWebKey, JsonWebKeySet, SigningKey};

/// Immutable published key set
#[derive(Debug, Default)]
pub struct KeySet {
    active: Option<Arc<SigningKey>>,
    retired: Vec<Arc<SigningKey>>,
}

impl KeySet {
    /// Build a snapshot from loaded keys; the newest unretired key wins
    #[must_use]
    pub fn from_keys(keys: Vec<SigningKey>) -> Self {
        let mut set = Self::default();
        let mut keys = keys;
        keys.sort_by(|a, b| b.created_at().cmp(&a.created_at()));
        for key in keys {
            if key.is_active() && set.active.is_none() {
                set.active = Some(Arc::new(key));
            } else {
                set.retired.push(Arc::new(key));
            }
        }
        set
    }

    /// Active key
    #[must_use]
    pub const fn active(&self) -> Option<&Arc<SigningKey>> {
        self.active.as_ref()
    }

    /// Active key followed by retired keys still inside their window
    fn verifiable(&self, now: DateTime<Utc>) -> impl Iterator<Item = &Arc<SigningKey>> {
        self.active
            .iter()
            .chain(self.retired.iter().filter(move |k| k.is_verifiable_at(now)))
    }
}

/// Rotation cadence and key size
#[derive(Debug, Clone, Copy)]
pub struct KeyRotationSettings {
    /// RSA modulus size for generated keys
    pub key_bits: usize,
    /// Age at which the active key is rotated
    pub rotation_interval: Duration,
    /// Verification window granted to a retired key
    pub overlap: Duration,
}

/// Owner of the published key set
pub struct SigningKeyManager {
    current: RwLock<Arc<KeySet>>,
    rotation: Mutex<()>,
    store: Arc<dyn SigningKeyStore>,
    policy: StorePolicy,
    settings: KeyRotationSettings,
}

impl SigningKeyManager {
    /// Manager publishing `keys`
    #[must_use]
    pub fn new(
        keys: KeySet,
        store: Arc<dyn SigningKeyStore>,
        policy: StorePolicy,
        settings: KeyRotationSettings,
    ) -> Self {
        Self {
            current: RwLock::new(Arc::new(keys)),
            rotation: Mutex::new(()),
            store,
            policy,
            settings,
        }
    }

    /// Current snapshot
    #[must_use]
    pub fn snapshot(&self) -> Arc<KeySet> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn publish(&self, keys: KeySet) {
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(keys);
    }

    /// Rotation settings
    #[must_use]
    pub const fn settings(&self) -> &KeyRotationSettings {
        &self.settings
    }

    /// The key that signs new tokens
    ///
    /// # Errors
    ///
    /// Returns `SigningKeyUnavailable` when no key is active
    pub fn active_key(&self) -> Result<Arc<SigningKey>, ProtocolError> {
        self.snapshot()
            .active
            .clone()
            .ok_or_else(|| ProtocolError::SigningKeyUnavailable {
                reason: "no active signing key".to_owned(),
            })
    }

    /// Active key plus retired keys whose window is still open
    #[must_use]
    pub fn public_keys(&self, now: DateTime<Utc>) -> Vec<Arc<SigningKey>> {
        self.snapshot().verifiable(now).cloned().collect()
    }

    /// JSON Web Key Set for publication
    #[must_use]
    pub fn jwks(&self, now: DateTime<Utc>) -> JsonWebKeySet {
        JsonWebKeySet {
            keys: self
                .snapshot()
                .verifiable(now)
                .map(|k| k.jwk().clone())
                .collect(),
        }
    }

    /// Key for verifying a token carrying `kid`
    #[must_use]
    pub fn verification_key(&self, kid: &str, now: DateTime<Utc>) -> Option<Arc<SigningKey>> {
        self.snapshot()
            .verifiable(now)
            .find(|k| k.kid() == kid)
            .cloned()
    }

    /// Whether the active key is older than the rotation interval
    #[must_use]
    pub fn should_rotate(&self, now: DateTime<Utc>) -> bool {
        self.snapshot().active.as_ref().map_or(true, |key| {
            now - key.created_at() >= self.settings.rotation_interval
        })
    }

    /// Make `new_key` active and retire the current key with the overlap window
    ///
    /// Both records are persisted before the new snapshot is published.
    /// Retired keys whose window has closed are pruned.
    ///
    /// # Errors
    ///
    /// Returns a store error if persistence fails; the published set is unchanged
    pub async fn rotate(&self, new_key: SigningKey, now: DateTime<Utc>) -> Result<(), ProtocolError> {
        let _guard = self.rotation.lock().await;
        let current = self.snapshot();

        let outgoing = current
            .active
            .as_ref()
            .map(|key| key.retired(now, self.settings.overlap));

        let mut retained = Vec::new();
        let mut expired = Vec::new();
        for key in &current.retired {
            if key.is_verifiable_at(now) {
                retained.push(key.clone());
            } else {
                expired.push(key.kid().to_owned());
            }
        }

        let new_record = new_key.to_record();
        self.policy
            .run("save_signing_key", || self.store.save_signing_key(&new_record))
            .await?;
        if let Some(outgoing) = &outgoing {
            let outgoing_record = outgoing.to_record();
            self.policy
                .run("save_signing_key", || self.store.save_signing_key(&outgoing_record))
                .await?;
        }

        let new_kid = new_key.kid().to_owned();
        let retired_kid = outgoing.as_ref().map(|k| k.kid().to_owned());
        if let Some(outgoing) = outgoing {
            retained.insert(0, Arc::new(outgoing));
        }
        self.publish(KeySet {
            active: Some(Arc::new(new_key)),
            retired: retained,
        });

        for kid in &expired {
            if let Err(e) = self
                .policy
                .run("delete_signing_key", || self.store.delete_signing_key(kid))
                .await
            {
                warn!(kid = %kid, error = %e, "Failed to prune expired signing key");
            }
        }

        info!(
            new_kid = %new_kid,
            retired_kid = retired_kid.as_deref().unwrap_or("none"),
            overlap_secs = self.settings.overlap.num_seconds(),
            pruned = expired.len(),
            "Signing key rotated"
        );
        Ok(())
    }

    /// Generate a key on a blocking thread and rotate to it
    ///
    /// # Errors
    ///
    /// Returns `SigningKeyUnavailable` if generation fails, or a store error
    pub async fn rotate_generated(&self, now: DateTime<Utc>) -> Result<String, ProtocolError> {
        let bits = self.settings.key_bits;
        let key = spawn_blocking(move || SigningKey::generate(bits, now))
            .await
            .map_err(|e| ProtocolError::internal(format!("key generation task failed: {e}")))?
            .map_err(|e| ProtocolError::SigningKeyUnavailable {
                reason: e.to_string(),
            })?;
        let kid = key.kid().to_owned();
        self.rotate(key, now).await?;
        Ok(kid)
    }

    /// Rotate if the active key has reached the rotation interval
    ///
    /// # Errors
    ///
    /// Returns an error if rotation fails
    pub async fn rotate_if_due(&self, now: DateTime<Utc>) -> Result<Option<String>, ProtocolError> {
        if self.should_rotate(now) {
            self.rotate_generated(now).await.map(Some)
        } else {
            Ok(None)
        }
    }
}
