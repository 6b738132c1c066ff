// ABOUTME: Main library entry point for the Arch identity provider
// ABOUTME: OpenID Connect / OAuth 2.0 authorization server issuing RS256 access and identity tokens
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

#![deny(unsafe_code)]

//! # Arch Identity Provider
//!
//! An OpenID Connect provider for first-party applications. It authenticates
//! registered clients, runs the authorization code (with PKCE), client
//! credentials, refresh token and implicit flows, and issues RS256-signed
//! access and identity tokens that relying parties verify through the
//! published JWKS.
//!
//! ## Architecture
//!
//! - **Client registry**: registered clients, exact redirect URI matching,
//!   Argon2 secret verification
//! - **Grant store**: single-use authorization codes, rotating refresh token
//!   families with reuse detection, consent records
//! - **Token issuer**: access and identity tokens, scope-driven claim release
//! - **Protocol engine**: request validation and the typestate flow
//! - **Signing keys**: copy-on-write key set with rotation overlap
//! - **Provisioning**: idempotent seeding of clients and resources
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use arch_idp::config::environment::ServerConfig;
//! use arch_idp::errors::AppResult;
//!
//! #[tokio::main]
//! async fn main() -> AppResult<()> {
//!     let config = ServerConfig::from_env()?;
//!     config.validate()?;
//!     println!("Issuer {} on port {}", config.issuer_url, config.http_port);
//!     Ok(())
//! }
//! ```

/// Configuration management
pub mod config;

/// Application constants and configuration values
pub mod constants;

/// Opaque credential generation and hashing
pub mod crypto;

/// `SQLite` persistence for clients, grants, resources and signing keys
pub mod database;

/// Unified error handling system with standard error codes and HTTP responses
pub mod errors;

/// Signing key set, rotation and JWKS publication
pub mod keys;

/// Structured logging setup
pub mod logging;

/// OpenID Connect / OAuth 2.0 protocol implementation
pub mod oauth2_server;

/// Idempotent seeding of clients and resources
pub mod provisioning;

/// Shared resources injected into request handlers
pub mod resources;

/// HTTP server assembly and background maintenance
pub mod server;

/// Storage capabilities, in-memory implementation and retry policy
pub mod store;
