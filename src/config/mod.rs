// ABOUTME: Configuration module for the identity provider server
// ABOUTME: Re-exports the environment-driven ServerConfig and its typed sections
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

//! Configuration management
//!
//! Configuration is resolved once from the environment and injected into
//! every component through its constructor.

/// Environment-driven server configuration
pub mod environment;

pub use environment::{
    AuthenticationConfig, DatabaseConfig, DatabaseUrl, Environment, ExternalProviderConfig,
    ExternalProvidersConfig, LogLevel, ServerConfig, SigningConfig, StorePolicyConfig,
};
