// ABOUTME: OAuth 2.0 / OpenID Connect request and response wire types
// ABOUTME: Authorize and token requests, token responses, and RFC 6749 error bodies
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

use crate::constants::oauth::errors;
use crate::errors::ProtocolError;
use serde::{Deserialize, Serialize};

/// OAuth 2.0 Authorization Request
#[derive(Debug, Deserialize, Clone, Default)]
pub struct AuthorizeRequest {
    /// Response type (`code`, `token`, `id_token`, `id_token token`)
    pub response_type: String,
    /// Client identifier
    pub client_id: String,
    /// Redirect URI for response
    pub redirect_uri: String,
    /// Requested scopes
    pub scope: Option<String>,
    /// State parameter for CSRF protection
    pub state: Option<String>,
    /// OIDC nonce echoed in the identity token
    pub nonce: Option<String>,
    /// PKCE code challenge (RFC 7636)
    pub code_challenge: Option<String>,
    /// PKCE code challenge method (only S256)
    pub code_challenge_method: Option<String>,
    /// `query` or `fragment`
    pub response_mode: Option<String>,
}

/// OAuth 2.0 Token Request
///
/// Client credentials may arrive in the body (`client_secret_post`) or in
/// an `Authorization: Basic` header, so both fields are optional here.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct TokenRequest {
    /// Grant type (`authorization_code`, `client_credentials`, `refresh_token`)
    pub grant_type: String,
    /// Authorization code (for `authorization_code` grant)
    pub code: Option<String>,
    /// Redirect URI (must equal the one bound to the code)
    pub redirect_uri: Option<String>,
    /// PKCE code verifier (RFC 7636)
    pub code_verifier: Option<String>,
    /// Refresh token (for `refresh_token` grant)
    pub refresh_token: Option<String>,
    /// Requested scopes (`client_credentials` and `refresh_token` grants)
    pub scope: Option<String>,
    /// Client ID
    pub client_id: Option<String>,
    /// Client secret
    pub client_secret: Option<String>,
}

/// OAuth 2.0 Token Response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    /// Access token (JWT)
    pub access_token: String,
    /// Token type (always "Bearer")
    pub token_type: String,
    /// Access token lifetime in seconds
    pub expires_in: i64,
    /// Scopes granted
    pub scope: String,
    /// OpenID Connect identity token
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
    /// Refresh token
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
}

/// Token revocation request (RFC 7009)
#[derive(Debug, Deserialize, Clone, Default)]
pub struct RevocationRequest {
    /// Token to revoke
    pub token: String,
    /// `refresh_token` or `access_token`
    pub token_type_hint: Option<String>,
    /// Client ID
    pub client_id: Option<String>,
    /// Client secret
    pub client_secret: Option<String>,
}

/// OAuth 2.0 Error Response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuth2Error {
    /// Error code
    pub error: String,
    /// Human-readable error description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,
    /// URI for error information
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_uri: Option<String>,
}

const AUTHORIZE_ERRORS_URI: &str = "https://datatracker.ietf.org/doc/html/rfc6749#section-4.1.2.1";
const TOKEN_ERRORS_URI: &str = "https://datatracker.ietf.org/doc/html/rfc6749#section-5.2";

impl OAuth2Error {
    /// Create an `invalid_request` error
    #[must_use]
    pub fn invalid_request(description: &str) -> Self {
        Self {
            error: errors::INVALID_REQUEST.to_owned(),
            error_description: Some(description.to_owned()),
            error_uri: Some(AUTHORIZE_ERRORS_URI.to_owned()),
        }
    }
}

impl From<&ProtocolError> for OAuth2Error {
    fn from(error: &ProtocolError) -> Self {
        let code = error.oauth_error_code();
        let error_uri = match code {
            errors::INVALID_CLIENT
            | errors::INVALID_GRANT
            | errors::UNSUPPORTED_GRANT_TYPE => Some(TOKEN_ERRORS_URI.to_owned()),
            errors::INVALID_TOKEN | errors::SERVER_ERROR | errors::TEMPORARILY_UNAVAILABLE => None,
            _ => Some(AUTHORIZE_ERRORS_URI.to_owned()),
        };
        Self {
            error: code.to_owned(),
            error_description: Some(error.public_description()),
            error_uri,
        }
    }
}
