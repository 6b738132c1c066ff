// ABOUTME: Unified error handling for the identity provider
// ABOUTME: Defines ErrorCode and AppError for startup, provisioning, and administrative failures
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

//! # Unified Error Handling System
//!
//! Standard error types and codes shared by the engine, the persistence
//! adapters and the administrative tooling. OAuth 2.0 wire errors are a
//! separate concern (`ProtocolError` maps onto them); `AppError` covers
//! everything that is not part of the protocol surface.

/// Persistence adapter errors with retryable classification
pub mod store;

/// OAuth 2.0 / OIDC protocol error taxonomy
pub mod protocol;

pub use protocol::ProtocolError;
pub use store::StoreError;

use serde::{Deserialize, Serialize};
use std::error::Error as StdError;
use std::fmt;
use thiserror::Error;

/// Standard error codes used throughout the application
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    // Validation (3000-3999)
    /// Invalid input
    #[serde(rename = "INVALID_INPUT")]
    InvalidInput = 3000,

    // Resource Management (4000-4999)
    /// Resource temporarily unavailable
    #[serde(rename = "RESOURCE_UNAVAILABLE")]
    ResourceUnavailable = 4003,

    // Configuration (6000-6999)
    /// Configuration error
    #[serde(rename = "CONFIG_ERROR")]
    ConfigError = 6000,

    // Cryptography (7000-7999)
    /// Signing key material missing or unusable
    #[serde(rename = "SIGNING_KEY_UNAVAILABLE")]
    SigningKeyUnavailable = 7000,

    // Internal Errors (9000-9999)
    /// Internal error
    #[serde(rename = "INTERNAL_ERROR")]
    InternalError = 9000,
    /// Database operation failed
    #[serde(rename = "DATABASE_ERROR")]
    DatabaseError = 9001,
}

impl ErrorCode {
    /// Get a user-friendly description of this error
    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::InvalidInput => "The provided input is invalid",
            Self::ResourceUnavailable => "The resource is temporarily unavailable",
            Self::ConfigError => "Configuration error encountered",
            Self::SigningKeyUnavailable => "No usable signing key is available",
            Self::InternalError => "An internal server error occurred",
            Self::DatabaseError => "Database operation failed",
        }
    }
}

/// Unified error type for the application
#[derive(Debug, Error)]
pub struct AppError {
    /// Error code
    pub code: ErrorCode,
    /// Human-readable error message
    pub message: String,
    /// Source error for error chaining
    #[source]
    pub source: Option<Box<dyn StdError + Send + Sync>>,
}

impl AppError {
    /// Create a new `AppError` with the given code and message
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            source: None,
        }
    }

    /// Add a source error for error chaining
    #[must_use]
    pub fn with_source(mut self, source: impl StdError + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code.description(), self.message)
    }
}

/// Result type alias for convenience
pub type AppResult<T> = Result<T, AppError>;

/// Convenience functions for creating common errors
impl AppError {
    /// Invalid input
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidInput, message)
    }

    /// Internal server error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }

    /// Database error
    pub fn database(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::DatabaseError, message)
    }

    /// Configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ConfigError, message)
    }

    /// Signing key missing or unusable
    pub fn signing_key(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::SigningKeyUnavailable, message)
    }
}

impl From<StoreError> for AppError {
    fn from(error: StoreError) -> Self {
        let code = if error.is_retryable() {
            ErrorCode::ResourceUnavailable
        } else {
            ErrorCode::DatabaseError
        };
        Self::new(code, error.to_string()).with_source(error)
    }
}

impl From<ProtocolError> for AppError {
    fn from(error: ProtocolError) -> Self {
        let code = match &error {
            ProtocolError::SigningKeyUnavailable { .. } => ErrorCode::SigningKeyUnavailable,
            ProtocolError::StoreUnavailable { .. } => ErrorCode::ResourceUnavailable,
            ProtocolError::StoreFailure { .. } => ErrorCode::DatabaseError,
            ProtocolError::Internal { .. } => ErrorCode::InternalError,
            _ => ErrorCode::InvalidInput,
        };
        Self::new(code, error.to_string()).with_source(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_error_display_includes_description() {
        let error = AppError::config("SIGNING_KEY_PATH missing");
        assert_eq!(error.code, ErrorCode::ConfigError);
        assert_eq!(
            error.to_string(),
            "Configuration error encountered: SIGNING_KEY_PATH missing"
        );
    }

    #[test]
    fn test_store_error_maps_to_unavailable_when_retryable() {
        let error = AppError::from(StoreError::Timeout {
            operation: "consume_authorization_code",
            timeout_ms: 250,
        });
        assert_eq!(error.code, ErrorCode::ResourceUnavailable);

        let error = AppError::from(StoreError::Corrupt {
            entity: "client",
            reason: "bad scope column".to_owned(),
        });
        assert_eq!(error.code, ErrorCode::DatabaseError);
    }

    #[test]
    fn test_protocol_error_keeps_its_source() {
        let error = AppError::from(ProtocolError::SigningKeyUnavailable {
            reason: "no active key".to_owned(),
        });
        assert_eq!(error.code, ErrorCode::SigningKeyUnavailable);
        assert!(StdError::source(&error).is_some());
    }
}
