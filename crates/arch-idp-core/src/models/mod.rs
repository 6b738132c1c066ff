// ABOUTME: Core data models for the identity provider
// ABOUTME: Clients, grants, refresh token families, resources, subjects, and signing key records
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

//! Data models shared by the protocol engine and the persistence adapters

/// Registered client applications
pub mod client;
/// Authorization codes, refresh tokens, and consent records
pub mod grants;
/// Identity and API resource definitions
pub mod resources;
/// Space-delimited scope sets
pub mod scope;
/// Persisted signing key material
pub mod signing;
/// Authenticated subject profile
pub mod subject;

pub use client::{Client, GrantType, TokenLifetimes};
pub use grants::{
    AuthorizationGrant, ConsentRecord, ConsumeOutcome, PkceChallenge, PkceMethod,
    RefreshTokenRecord, RefreshTokenStatus, RotateOutcome,
};
pub use resources::{ApiResource, IdentityResource};
pub use scope::ScopeSet;
pub use signing::SigningKeyRecord;
pub use subject::SubjectProfile;
