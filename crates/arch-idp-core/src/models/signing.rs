// ABOUTME: Persisted signing key record
// ABOUTME: Stores PEM key material together with its activation and verification window
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

use chrono::{DateTime, Utc};
use std::fmt;

/// Signing key as stored by the persistence adapter
#[derive(Clone, PartialEq, Eq)]
pub struct SigningKeyRecord {
    /// Key identifier published in the JWKS and JWT headers
    pub kid: String,
    /// JWS algorithm
    pub algorithm: String,
    /// PKCS#8 PEM private key
    pub private_key_pem: String,
    /// Generation or import time
    pub created_at: DateTime<Utc>,
    /// When the key stopped signing (None while active)
    pub retired_at: Option<DateTime<Utc>>,
    /// End of the verification window for a retired key
    pub verify_until: Option<DateTime<Utc>>,
}

impl SigningKeyRecord {
    /// Whether this record is the signing key
    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.retired_at.is_none()
    }
}

impl fmt::Debug for SigningKeyRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKeyRecord")
            .field("kid", &self.kid)
            .field("algorithm", &self.algorithm)
            .field("private_key_pem", &"[REDACTED]")
            .field("created_at", &self.created_at)
            .field("retired_at", &self.retired_at)
            .field("verify_until", &self.verify_until)
            .finish()
    }
}
