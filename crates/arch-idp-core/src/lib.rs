// ABOUTME: Core types and constants for the arch OpenID Connect provider
// ABOUTME: Foundation crate with error handling, protocol models, and constants
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

#![deny(unsafe_code)]

//! # Arch IdP Core
//!
//! Foundation crate providing shared types for the identity provider. It is
//! designed to change infrequently so the main crate recompiles without it.
//!
//! ## Modules
//!
//! - **errors**: `AppError`, `ErrorCode`, `StoreError` and the protocol error taxonomy
//! - **constants**: OAuth 2.0 / OpenID Connect identifiers and framework defaults
//! - **models**: clients, grants, refresh tokens, resources and signing key records

/// Unified error handling system with standard error codes and HTTP responses
pub mod errors;

/// Protocol constants organized by domain
pub mod constants;

/// Core data models shared by the engine and the persistence adapters
pub mod models;
