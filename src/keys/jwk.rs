// ABOUTME: RSA signing key material and JSON Web Key representation
// ABOUTME: Builds encoding/decoding keys once at load time so signing never re-parses PEM
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

use crate::constants::oauth::SIGNING_ALGORITHM;
use crate::errors::{AppError, AppResult};
use arch_idp_core::models::SigningKeyRecord;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey};
use rand::rngs::OsRng;
use rsa::pkcs8::{DecodePrivateKey, EncodePrivateKey, LineEnding};
use rsa::traits::PublicKeyParts;
use rsa::{RsaPrivateKey, RsaPublicKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use uuid::Uuid;
use zeroize::Zeroizing;

/// JWK (JSON Web Key) representation for the JWKS endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JsonWebKey {
    /// Key type (always "RSA")
    pub kty: String,
    /// Public key use (always "sig")
    #[serde(rename = "use")]
    pub key_use: String,
    /// Key ID
    pub kid: String,
    /// Algorithm (RS256)
    pub alg: String,
    /// RSA modulus (base64url encoded)
    pub n: String,
    /// RSA exponent (base64url encoded)
    pub e: String,
}

impl JsonWebKey {
    fn from_public_key(kid: &str, public_key: &RsaPublicKey) -> Self {
        Self {
            kty: "RSA".to_owned(),
            key_use: "sig".to_owned(),
            kid: kid.to_owned(),
            alg: SIGNING_ALGORITHM.to_owned(),
            n: URL_SAFE_NO_PAD.encode(public_key.n().to_bytes_be()),
            e: URL_SAFE_NO_PAD.encode(public_key.e().to_bytes_be()),
        }
    }

    /// Verification key rebuilt from the published components
    ///
    /// # Errors
    ///
    /// Returns an error if `n` or `e` is not valid base64url
    pub fn decoding_key(&self) -> AppResult<DecodingKey> {
        DecodingKey::from_rsa_components(&self.n, &self.e)
            .map_err(|e| AppError::signing_key(format!("Invalid JWK components: {e}")))
    }
}

/// JWKS (JSON Web Key Set) container
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JsonWebKeySet {
    /// Published public keys
    pub keys: Vec<JsonWebKey>,
}

impl JsonWebKeySet {
    /// Find a key by `kid`
    #[must_use]
    pub fn find(&self, kid: &str) -> Option<&JsonWebKey> {
        self.keys.iter().find(|k| k.kid == kid)
    }
}

/// An RSA signing key with its lifecycle timestamps
#[derive(Clone)]
pub struct SigningKey {
    kid: String,
    created_at: DateTime<Utc>,
    retired_at: Option<DateTime<Utc>>,
    verify_until: Option<DateTime<Utc>>,
    private_key_pem: Zeroizing<String>,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    jwk: JsonWebKey,
}

impl SigningKey {
    /// Generate a new RSA key
    ///
    /// CPU-heavy; async callers should run it on a blocking thread.
    ///
    /// # Errors
    ///
    /// Returns an error if key generation or PEM encoding fails
    pub fn generate(bits: usize, now: DateTime<Utc>) -> AppResult<Self> {
        let private_key = RsaPrivateKey::new(&mut OsRng, bits)
            .map_err(|e| AppError::signing_key(format!("Failed to generate RSA key: {e}")))?;
        let kid = format!(
            "key_{}_{}",
            now.format("%Y%m%d%H%M%S"),
            &Uuid::new_v4().simple().to_string()[..8]
        );
        Self::from_private_key(kid, &private_key, now)
    }

    /// Import a PKCS#8 PEM key
    ///
    /// The `kid` is derived from the public modulus, so importing the same
    /// file twice yields the same identifier.
    ///
    /// # Errors
    ///
    /// Returns an error if the PEM cannot be parsed
    pub fn from_pem(pem: &str, now: DateTime<Utc>) -> AppResult<Self> {
        let private_key = RsaPrivateKey::from_pkcs8_pem(pem)
            .map_err(|e| AppError::signing_key(format!("Failed to parse private key PEM: {e}")))?;
        let digest = Sha256::digest(private_key.n().to_bytes_be());
        let kid = format!("pem_{}", &hex::encode(digest)[..16]);
        Self::from_private_key(kid, &private_key, now)
    }

    /// Rebuild a key from its persisted record
    ///
    /// # Errors
    ///
    /// Returns an error if the stored PEM is unusable
    pub fn from_record(record: &SigningKeyRecord) -> AppResult<Self> {
        if record.algorithm != SIGNING_ALGORITHM {
            return Err(AppError::signing_key(format!(
                "Key '{}' uses unsupported algorithm '{}'",
                record.kid, record.algorithm
            )));
        }
        let private_key = RsaPrivateKey::from_pkcs8_pem(&record.private_key_pem).map_err(|e| {
            AppError::signing_key(format!("Stored key '{}' is unreadable: {e}", record.kid))
        })?;
        let mut key = Self::from_private_key(record.kid.clone(), &private_key, record.created_at)?;
        key.retired_at = record.retired_at;
        key.verify_until = record.verify_until;
        Ok(key)
    }

    fn from_private_key(
        kid: String,
        private_key: &RsaPrivateKey,
        created_at: DateTime<Utc>,
    ) -> AppResult<Self> {
        let private_key_pem: Zeroizing<String> = private_key
            .to_pkcs8_pem(LineEnding::LF)
            .map_err(|e| AppError::signing_key(format!("Failed to encode private key: {e}")))?;
        let encoding_key = EncodingKey::from_rsa_pem(private_key_pem.as_bytes())
            .map_err(|e| AppError::signing_key(format!("Failed to build encoding key: {e}")))?;

        let public_key = RsaPublicKey::from(private_key);
        let jwk = JsonWebKey::from_public_key(&kid, &public_key);
        let decoding_key = jwk.decoding_key()?;

        Ok(Self {
            kid,
            created_at,
            retired_at: None,
            verify_until: None,
            private_key_pem,
            encoding_key,
            decoding_key,
            jwk,
        })
    }

    /// Key identifier
    #[must_use]
    pub fn kid(&self) -> &str {
        &self.kid
    }

    /// Creation time
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// When the key stopped signing
    #[must_use]
    pub const fn retired_at(&self) -> Option<DateTime<Utc>> {
        self.retired_at
    }

    /// End of the verification window
    #[must_use]
    pub const fn verify_until(&self) -> Option<DateTime<Utc>> {
        self.verify_until
    }

    /// Whether the key currently signs
    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.retired_at.is_none()
    }

    /// Whether tokens signed by this key still verify at `now`
    #[must_use]
    pub fn is_verifiable_at(&self, now: DateTime<Utc>) -> bool {
        self.verify_until.map_or(true, |until| now < until)
    }

    /// Copy of this key retired at `now` with an `overlap` verification window
    #[must_use]
    pub fn retired(&self, now: DateTime<Utc>, overlap: Duration) -> Self {
        let mut key = self.clone();
        key.retired_at = Some(now);
        key.verify_until = Some(now + overlap);
        key
    }

    /// Signing key
    #[must_use]
    pub const fn encoding_key(&self) -> &EncodingKey {
        &self.encoding_key
    }

    /// Verification key
    #[must_use]
    pub const fn decoding_key(&self) -> &DecodingKey {
        &self.decoding_key
    }

    /// Public JWK
    #[must_use]
    pub const fn jwk(&self) -> &JsonWebKey {
        &self.jwk
    }

    /// Persistable record
    #[must_use]
    pub fn to_record(&self) -> SigningKeyRecord {
        SigningKeyRecord {
            kid: self.kid.clone(),
            algorithm: SIGNING_ALGORITHM.to_owned(),
            private_key_pem: self.private_key_pem.to_string(),
            created_at: self.created_at,
            retired_at: self.retired_at,
            verify_until: self.verify_until,
        }
    }
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKey")
            .field("kid", &self.kid)
            .field("created_at", &self.created_at)
            .field("retired_at", &self.retired_at)
            .field("verify_until", &self.verify_until)
            .finish_non_exhaustive()
    }
}
