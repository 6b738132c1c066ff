// ABOUTME: Application constants for the identity provider host
// ABOUTME: Environment variable names, defaults, endpoint paths, and service identifiers
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

//! Application constants organized by domain

pub use arch_idp_core::constants::{claims, lifetimes, oauth};

/// Service names for structured logging
pub mod service_names {
    /// Server process
    pub const ARCH_IDP_SERVER: &str = "arch-idp-server";
    /// Administrative command
    pub const ARCH_IDP_ADMIN: &str = "arch-idp-admin";
}

/// HTTP endpoint paths
pub mod endpoints {
    /// Authorization endpoint
    pub const AUTHORIZE: &str = "/connect/authorize";
    /// Token endpoint
    pub const TOKEN: &str = "/connect/token";
    /// Userinfo endpoint
    pub const USERINFO: &str = "/connect/userinfo";
    /// Token revocation endpoint
    pub const REVOCATION: &str = "/connect/revocation";
    /// OpenID Connect discovery document
    pub const DISCOVERY: &str = "/.well-known/openid-configuration";
    /// JSON Web Key Set
    pub const JWKS: &str = "/.well-known/openid-configuration/jwks";
    /// Liveness probe
    pub const HEALTH: &str = "/health";
}

/// Environment variable names
pub mod env_vars {
    /// HTTP listen port
    pub const HTTP_PORT: &str = "HTTP_PORT";
    /// HTTP listen address
    pub const HOST: &str = "HOST";
    /// Public issuer URL (`iss`)
    pub const ISSUER_URL: &str = "ISSUER_URL";
    /// Deployment environment
    pub const ENVIRONMENT: &str = "ENVIRONMENT";
    /// Log level
    pub const LOG_LEVEL: &str = "LOG_LEVEL";
    /// Database connection URL
    pub const DATABASE_URL: &str = "DATABASE_URL";
    /// Run migrations at startup
    pub const AUTO_MIGRATE: &str = "AUTO_MIGRATE";
    /// Default access token lifetime for provisioned clients
    pub const ACCESS_TOKEN_LIFETIME_SECS: &str = "ACCESS_TOKEN_LIFETIME_SECS";
    /// Default identity token lifetime for provisioned clients
    pub const IDENTITY_TOKEN_LIFETIME_SECS: &str = "IDENTITY_TOKEN_LIFETIME_SECS";
    /// Default authorization code lifetime for provisioned clients
    pub const AUTHORIZATION_CODE_LIFETIME_SECS: &str = "AUTHORIZATION_CODE_LIFETIME_SECS";
    /// Default refresh token lifetime for provisioned clients
    pub const REFRESH_TOKEN_LIFETIME_SECS: &str = "REFRESH_TOKEN_LIFETIME_SECS";
    /// PEM file holding the production signing key
    pub const SIGNING_KEY_PATH: &str = "SIGNING_KEY_PATH";
    /// RSA modulus size for generated keys
    pub const SIGNING_KEY_BITS: &str = "SIGNING_KEY_BITS";
    /// Days between scheduled key rotations
    pub const KEY_ROTATION_DAYS: &str = "KEY_ROTATION_DAYS";
    /// Verification overlap for retired keys
    pub const KEY_OVERLAP_SECS: &str = "KEY_OVERLAP_SECS";
    /// Per-attempt store timeout
    pub const STORE_TIMEOUT_MS: &str = "STORE_TIMEOUT_MS";
    /// Store retry attempts for transient failures
    pub const STORE_MAX_RETRIES: &str = "STORE_MAX_RETRIES";
    /// Base backoff between store retries
    pub const STORE_BACKOFF_MS: &str = "STORE_BACKOFF_MS";
    /// Header carrying the authenticated subject from the login service
    pub const AUTH_SUBJECT_HEADER: &str = "AUTH_SUBJECT_HEADER";
    /// Header carrying scopes the subject just consented to
    pub const AUTH_CONSENT_HEADER: &str = "AUTH_CONSENT_HEADER";
    /// Interval of the grant purge / key rotation task
    pub const MAINTENANCE_INTERVAL_SECS: &str = "MAINTENANCE_INTERVAL_SECS";
    /// Provisioning seed file
    pub const SEED_CONFIG_PATH: &str = "SEED_CONFIG_PATH";
    /// External Google login client id
    pub const GOOGLE_CLIENT_ID: &str = "GOOGLE_CLIENT_ID";
    /// External Google login client secret
    pub const GOOGLE_CLIENT_SECRET: &str = "GOOGLE_CLIENT_SECRET";
}

/// Default configuration values
pub mod defaults {
    /// HTTP listen port
    pub const HTTP_PORT: u16 = 5000;
    /// HTTP listen address
    pub const HOST: &str = "127.0.0.1";
    /// Database URL
    pub const DATABASE_URL: &str = "sqlite:./data/arch-idp.db";
    /// RSA modulus size in bits
    pub const SIGNING_KEY_BITS: usize = 2048;
    /// Days between scheduled key rotations
    pub const KEY_ROTATION_DAYS: i64 = 90;
    /// Retired key verification overlap (24 hours)
    pub const KEY_OVERLAP_SECS: i64 = 86_400;
    /// Per-attempt store timeout
    pub const STORE_TIMEOUT_MS: u64 = 2_000;
    /// Store retry attempts
    pub const STORE_MAX_RETRIES: u32 = 3;
    /// Base backoff between store retries
    pub const STORE_BACKOFF_MS: u64 = 10;
    /// Subject header set by the fronting login service
    pub const AUTH_SUBJECT_HEADER: &str = "x-authenticated-subject";
    /// Consent header set by the fronting consent page
    pub const AUTH_CONSENT_HEADER: &str = "x-consented-scopes";
    /// Maintenance interval (5 minutes)
    pub const MAINTENANCE_INTERVAL_SECS: u64 = 300;
    /// Seed file location
    pub const SEED_CONFIG_PATH: &str = "./config/seed.yaml";
    /// HTTP request timeout
    pub const REQUEST_TIMEOUT_SECS: u64 = 30;
    /// Opaque code and refresh token entropy in bytes
    pub const OPAQUE_TOKEN_BYTES: usize = 32;
}

/// Minimum accepted RSA modulus size
pub const MIN_SIGNING_KEY_BITS: usize = 2048;
