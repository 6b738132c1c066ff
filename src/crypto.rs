// ABOUTME: Opaque credential generation and hashing helpers
// ABOUTME: Authorization codes and refresh tokens are random strings stored only as SHA-256 digests
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

use crate::constants::defaults::OPAQUE_TOKEN_BYTES;
use crate::errors::ProtocolError;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use ring::rand::{SecureRandom, SystemRandom};
use sha2::{Digest, Sha256};
use zeroize::Zeroize;

/// Generate a URL-safe opaque credential with `OPAQUE_TOKEN_BYTES` of entropy
///
/// # Errors
///
/// Returns an error if the system random number generator fails
pub fn generate_opaque_token() -> Result<String, ProtocolError> {
    let rng = SystemRandom::new();
    let mut bytes = [0u8; OPAQUE_TOKEN_BYTES];
    rng.fill(&mut bytes)
        .map_err(|_| ProtocolError::internal("system random number generator failed"))?;
    let token = URL_SAFE_NO_PAD.encode(bytes);
    bytes.zeroize();
    Ok(token)
}

/// SHA-256 hex digest used as the storage key for an opaque credential
#[must_use]
pub fn hash_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}
