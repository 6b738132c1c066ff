// ABOUTME: Protocol constants for the identity provider core
// ABOUTME: Groups OAuth 2.0 and OpenID Connect identifiers, claim names, and lifetime defaults
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

//! Constants module

/// OAuth 2.0 / OpenID Connect wire identifiers
pub mod oauth;

/// Standard claim names
pub mod claims;

/// Default lifetimes applied when a client does not override them
pub mod lifetimes {
    /// Access token lifetime (1 hour)
    pub const ACCESS_TOKEN_SECS: i64 = 3600;
    /// Identity token lifetime (5 minutes)
    pub const IDENTITY_TOKEN_SECS: i64 = 300;
    /// Authorization code lifetime (5 minutes)
    pub const AUTHORIZATION_CODE_SECS: i64 = 300;
    /// Absolute refresh token lifetime (30 days)
    pub const REFRESH_TOKEN_SECS: i64 = 2_592_000;
    /// Remembered consent lifetime (90 days)
    pub const CONSENT_SECS: i64 = 7_776_000;
    /// How long expired codes and refresh tokens are kept before purging (1 day)
    pub const EXPIRED_GRANT_RETENTION_SECS: i64 = 86_400;
    /// Upper bound accepted for any configured lifetime (10 years)
    pub const MAX_SECS: i64 = 315_360_000;
}
