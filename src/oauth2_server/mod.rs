// ABOUTME: OpenID Connect / OAuth 2.0 provider: client registry, grants, token issuance, and endpoints
// ABOUTME: The protocol engine validates requests and drives the typestate authorization flow
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

/// Registered clients, redirect URI matching, and secret verification
pub mod client_registry;
/// OpenID Connect discovery document
pub mod discovery;
/// Protocol engine for authorize, token, userinfo, and revocation
pub mod engine;
/// Typestate pattern for compile-time authorization flow safety
pub mod flow;
/// Authorization code, refresh token, and consent lifecycle
pub mod grants;
/// OAuth 2.0 data models and types
pub mod models;
/// PKCE (RFC 7636) challenge handling
pub mod pkce;
/// HTTP route handlers
pub mod routes;
/// Authenticated subjects and their profiles
pub mod subject;
/// Access and identity token issuance
pub mod token_issuer;

// Client registry

pub use client_registry::{
    ClientCredentials, ClientRegistration, ClientRegistry, LifetimePolicy,
};

// Protocol engine

/// Protocol engine
pub use engine::ProtocolEngine;
/// Authorize endpoint outcomes
pub use engine::{AuthorizationRedirect, AuthorizeError};

// Authorization flow typestate

pub use flow::{
    AuthorizationFlow, AuthorizationGranted, CodeIssued, Exchanged, Requested, ResponseMode,
    ResponseType, TokensIssued, ValidatedAuthorization,
};

// Grant lifecycle

pub use grants::{GrantManager, NewAuthorizationCode, RotatedRefreshToken};

// OAuth 2.0 data models and request/response types

/// Authorization request
pub use models::AuthorizeRequest;
/// OAuth 2.0 error response
pub use models::OAuth2Error;
/// Revocation request
pub use models::RevocationRequest;
/// Token exchange request
pub use models::TokenRequest;
/// Token exchange response
pub use models::TokenResponse;

/// HTTP routes
pub use routes::OidcRoutes;

// Subject authentication seams

pub use subject::{
    AuthenticatedSubject, InMemoryProfiles, ProfileProvider, SubjectAuthenticator,
    TrustedHeaderAuthenticator,
};

// Token issuance

pub use token_issuer::{AccessTokenClaims, IdentityTokenClaims, IssuedToken, TokenIssuer};
