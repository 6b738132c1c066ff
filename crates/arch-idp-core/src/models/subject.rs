// ABOUTME: Authenticated subject profile supplied by the login collaborator
// ABOUTME: Source of user claims filtered by granted identity scopes
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Subject identifier plus every claim known about the subject
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SubjectProfile {
    /// Subject identifier (`sub`)
    pub subject: String,
    /// All known claims; release is filtered per scope at issuance
    #[serde(default)]
    pub claims: Map<String, Value>,
}

impl SubjectProfile {
    /// Profile with no claims beyond the subject
    pub fn new(subject: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            claims: Map::new(),
        }
    }

    /// Builder-style claim insertion
    #[must_use]
    pub fn with_claim(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.claims.insert(name.into(), value.into());
        self
    }
}
