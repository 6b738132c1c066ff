// ABOUTME: Seams to the external login collaborator: authenticated subjects and their profiles
// ABOUTME: Default authenticator trusts a header set by the fronting login service
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

use crate::config::AuthenticationConfig;
use crate::errors::{AppError, AppResult, ProtocolError};
use arch_idp_core::models::{ScopeSet, SubjectProfile};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use http::{HeaderMap, HeaderName};
use std::str::FromStr;

/// A subject the login collaborator has already authenticated
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedSubject {
    /// Subject identifier
    pub subject: String,
    /// When the subject authenticated
    pub auth_time: DateTime<Utc>,
    /// Scopes the subject approved on the consent page just now, if any
    pub consented_scopes: Option<ScopeSet>,
}

/// Resolves the subject behind an authorize request
pub trait SubjectAuthenticator: Send + Sync {
    /// The authenticated subject, or `None` when login is required
    fn authenticate(&self, headers: &HeaderMap, now: DateTime<Utc>) -> Option<AuthenticatedSubject>;
}

/// Trusts subject and consent headers injected by a fronting login service
///
/// Deploy only behind a proxy that strips these headers from client traffic.
#[derive(Debug, Clone)]
pub struct TrustedHeaderAuthenticator {
    subject_header: HeaderName,
    consent_header: HeaderName,
}

impl TrustedHeaderAuthenticator {
    /// Build from the configured header names
    ///
    /// # Errors
    ///
    /// Returns an error if a header name is invalid
    pub fn from_config(config: &AuthenticationConfig) -> AppResult<Self> {
        let parse = |name: &str| {
            HeaderName::from_str(name)
                .map_err(|_| AppError::config(format!("'{name}' is not a valid header name")))
        };
        Ok(Self {
            subject_header: parse(&config.subject_header)?,
            consent_header: parse(&config.consent_header)?,
        })
    }
}

impl SubjectAuthenticator for TrustedHeaderAuthenticator {
    fn authenticate(&self, headers: &HeaderMap, now: DateTime<Utc>) -> Option<AuthenticatedSubject> {
        let subject = headers
            .get(&self.subject_header)?
            .to_str()
            .ok()?
            .trim()
            .to_owned();
        if subject.is_empty() {
            return None;
        }
        let consented_scopes = headers
            .get(&self.consent_header)
            .and_then(|value| value.to_str().ok())
            .map(ScopeSet::parse);
        Some(AuthenticatedSubject {
            subject,
            auth_time: now,
            consented_scopes,
        })
    }
}

/// Source of the claims known about a subject
#[async_trait]
pub trait ProfileProvider: Send + Sync {
    /// Profile for `subject`
    async fn profile(&self, subject: &str) -> Result<SubjectProfile, ProtocolError>;
}

/// Profiles held in memory; unknown subjects get a profile without claims
#[derive(Default)]
pub struct InMemoryProfiles {
    profiles: DashMap<String, SubjectProfile>,
}

impl InMemoryProfiles {
    /// Empty directory
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a profile
    pub fn insert(&self, profile: SubjectProfile) {
        self.profiles.insert(profile.subject.clone(), profile);
    }
}

#[async_trait]
impl ProfileProvider for InMemoryProfiles {
    async fn profile(&self, subject: &str) -> Result<SubjectProfile, ProtocolError> {
        Ok(self
            .profiles
            .get(subject)
            .map_or_else(|| SubjectProfile::new(subject), |p| p.value().clone()))
    }
}
