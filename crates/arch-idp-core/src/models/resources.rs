// ABOUTME: Identity resource and API resource definitions
// ABOUTME: Identity resources map a scope to the user claims it releases
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use super::scope::ScopeSet;
use crate::constants::{claims, oauth::scopes};

const fn default_enabled() -> bool {
    true
}

/// A scope that releases identity claims about the subject
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityResource {
    /// Scope name (unique)
    pub name: String,
    /// Display name for consent screens
    #[serde(default)]
    pub display_name: Option<String>,
    /// Claims released when this scope is granted
    #[serde(default)]
    pub claims: BTreeSet<String>,
    /// Whether consent screens must keep it selected
    #[serde(default)]
    pub required: bool,
    /// Disabled resources release nothing
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

impl IdentityResource {
    fn standard(name: &str, display_name: &str, claim_names: &[&str], required: bool) -> Self {
        Self {
            name: name.to_owned(),
            display_name: Some(display_name.to_owned()),
            claims: claim_names.iter().map(|c| (*c).to_owned()).collect(),
            required,
            enabled: true,
        }
    }

    /// The `openid` scope (subject identifier only)
    #[must_use]
    pub fn openid() -> Self {
        Self::standard(scopes::OPENID, "Your user identifier", &[claims::SUBJECT], true)
    }

    /// The `profile` scope
    #[must_use]
    pub fn profile() -> Self {
        Self::standard(
            scopes::PROFILE,
            "User profile",
            claims::PROFILE_SCOPE_CLAIMS,
            false,
        )
    }

    /// The `email` scope
    #[must_use]
    pub fn email() -> Self {
        Self::standard(
            scopes::EMAIL,
            "Your email address",
            claims::EMAIL_SCOPE_CLAIMS,
            false,
        )
    }

    /// Standard OIDC identity resources
    #[must_use]
    pub fn standard_set() -> Vec<Self> {
        vec![Self::openid(), Self::profile(), Self::email()]
    }
}

/// A protected API and the scopes it defines
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiResource {
    /// API name (unique)
    pub name: String,
    /// Display name
    #[serde(default)]
    pub display_name: Option<String>,
    /// Scopes that grant access to this API
    #[serde(default)]
    pub scopes: ScopeSet,
    /// Disabled resources are hidden from discovery
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}
