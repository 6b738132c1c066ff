// ABOUTME: Protocol error taxonomy for authorize, token, and refresh processing
// ABOUTME: Maps every failure onto a standard OAuth 2.0 / OIDC error code
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

use uuid::Uuid;

use super::store::StoreError;
use crate::constants::oauth::errors;

/// Failures raised while processing a protocol request
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Unknown, disabled or unauthenticated client
    #[error("Client '{client_id}' rejected: {reason}")]
    ClientError {
        /// Presented client identifier
        client_id: String,
        /// Why the client was rejected
        reason: &'static str,
    },

    /// Client is not registered for the grant or response type
    #[error("Client '{client_id}' is not allowed to use '{grant}'")]
    UnauthorizedClient {
        /// Client identifier
        client_id: String,
        /// Grant or response type that was refused
        grant: String,
    },

    /// Redirect URI does not exactly match a registered URI
    #[error("Redirect URI is not registered for client '{client_id}'")]
    RedirectMismatch {
        /// Client identifier
        client_id: String,
    },

    /// Requested scope outside what the client or grant allows
    #[error("Scope '{scope}' is not permitted")]
    ScopeDenied {
        /// Space-delimited scopes that were refused
        scope: String,
    },

    /// The grant is past its expiry timestamp
    #[error("Grant has expired")]
    GrantExpired,

    /// The grant was already exchanged
    #[error("Grant has already been consumed")]
    GrantAlreadyConsumed,

    /// No grant exists for the presented value
    #[error("Grant not found")]
    GrantNotFound,

    /// The grant does not belong to this request
    #[error("Grant does not match request: {reason}")]
    GrantMismatch {
        /// Which binding failed
        reason: &'static str,
    },

    /// A rotated refresh token was presented again
    #[error("Refresh token reuse detected in family {family_id} (generation {generation})")]
    RefreshReuseDetected {
        /// Revoked token family
        family_id: Uuid,
        /// Generation of the reused token
        generation: u32,
    },

    /// The refresh token (or its family) was revoked
    #[error("Refresh token has been revoked")]
    RefreshTokenRevoked,

    /// No active signing key
    #[error("Signing key unavailable: {reason}")]
    SigningKeyUnavailable {
        /// Why signing is impossible
        reason: String,
    },

    /// Store failed transiently and retries were exhausted
    #[error("Store unavailable during '{operation}' after {attempts} attempts")]
    StoreUnavailable {
        /// Operation name
        operation: &'static str,
        /// Attempts made
        attempts: u32,
        /// Last failure
        #[source]
        source: StoreError,
    },

    /// Store failed with a non-retryable error
    #[error("Store failure during '{operation}'")]
    StoreFailure {
        /// Operation name
        operation: &'static str,
        /// Underlying failure
        #[source]
        source: StoreError,
    },

    /// Malformed request
    #[error("Invalid request: {reason}")]
    InvalidRequest {
        /// What is wrong with the request
        reason: String,
    },

    /// Grant type not supported
    #[error("Unsupported grant type '{grant_type}'")]
    UnsupportedGrantType {
        /// Presented grant type
        grant_type: String,
    },

    /// Response type not supported
    #[error("Unsupported response type '{response_type}'")]
    UnsupportedResponseType {
        /// Presented response type
        response_type: String,
    },

    /// The subject has not consented to the requested scopes
    #[error("Consent required for client '{client_id}'")]
    ConsentRequired {
        /// Client identifier
        client_id: String,
    },

    /// No authenticated subject accompanies the authorize request
    #[error("End-user authentication required")]
    LoginRequired,

    /// Bearer token rejected at a protected endpoint
    #[error("Invalid token: {reason}")]
    InvalidToken {
        /// Why verification failed
        reason: String,
    },

    /// Unexpected internal condition
    #[error("Internal error: {reason}")]
    Internal {
        /// Diagnostic reason, never shown to callers
        reason: String,
    },
}

impl ProtocolError {
    /// Build an `InvalidRequest` error
    pub fn invalid_request(reason: impl Into<String>) -> Self {
        Self::InvalidRequest {
            reason: reason.into(),
        }
    }

    /// Build an `Internal` error
    pub fn internal(reason: impl Into<String>) -> Self {
        Self::Internal {
            reason: reason.into(),
        }
    }

    /// OAuth 2.0 error code for the wire
    #[must_use]
    pub const fn oauth_error_code(&self) -> &'static str {
        match self {
            Self::ClientError { .. } => errors::INVALID_CLIENT,
            Self::UnauthorizedClient { .. } => errors::UNAUTHORIZED_CLIENT,
            Self::RedirectMismatch { .. } | Self::InvalidRequest { .. } => errors::INVALID_REQUEST,
            Self::ScopeDenied { .. } => errors::INVALID_SCOPE,
            Self::GrantExpired
            | Self::GrantAlreadyConsumed
            | Self::GrantNotFound
            | Self::GrantMismatch { .. }
            | Self::RefreshReuseDetected { .. }
            | Self::RefreshTokenRevoked => errors::INVALID_GRANT,
            Self::UnsupportedGrantType { .. } => errors::UNSUPPORTED_GRANT_TYPE,
            Self::UnsupportedResponseType { .. } => errors::UNSUPPORTED_RESPONSE_TYPE,
            Self::ConsentRequired { .. } => errors::CONSENT_REQUIRED,
            Self::LoginRequired => errors::LOGIN_REQUIRED,
            Self::InvalidToken { .. } => errors::INVALID_TOKEN,
            Self::StoreUnavailable { .. } => errors::TEMPORARILY_UNAVAILABLE,
            Self::SigningKeyUnavailable { .. }
            | Self::StoreFailure { .. }
            | Self::Internal { .. } => errors::SERVER_ERROR,
        }
    }

    /// Description safe to return to the caller
    ///
    /// Infrastructure failures collapse to a generic sentence; protocol
    /// violations keep their specific reason.
    #[must_use]
    pub fn public_description(&self) -> String {
        match self {
            Self::ClientError { .. } => "Client authentication failed".to_owned(),
            Self::RefreshReuseDetected { .. } => {
                "Refresh token has already been used; the token family is revoked".to_owned()
            }
            Self::SigningKeyUnavailable { .. } | Self::StoreFailure { .. } | Self::Internal { .. } => {
                "The server encountered an unexpected condition".to_owned()
            }
            Self::StoreUnavailable { .. } => {
                "The server is temporarily unable to handle the request".to_owned()
            }
            other => other.to_string(),
        }
    }

    /// Whether the caller may retry the identical request
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::StoreUnavailable { .. })
    }

    /// Whether the error may be delivered to the client's redirect URI
    ///
    /// Errors about the client identity or the redirect URI itself must be
    /// shown to the user agent directly (RFC 6749 section 4.1.2.1).
    #[must_use]
    pub const fn is_redirectable(&self) -> bool {
        !matches!(
            self,
            Self::ClientError { .. } | Self::RedirectMismatch { .. }
        )
    }

    /// HTTP status for token endpoint responses
    #[must_use]
    pub const fn http_status(&self) -> u16 {
        match self {
            Self::ClientError { .. } | Self::InvalidToken { .. } => 401,
            Self::StoreUnavailable { .. } => 503,
            Self::SigningKeyUnavailable { .. }
            | Self::StoreFailure { .. }
            | Self::Internal { .. } => 500,
            _ => 400,
        }
    }
}
