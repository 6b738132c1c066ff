// ABOUTME: Scope set type with OAuth 2.0 space-delimited parsing and formatting
// ABOUTME: Provides the subset and intersection operations used by scope validation
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

use serde::{Deserialize, Serialize};
use std::collections::btree_set;
use std::collections::BTreeSet;
use std::fmt;

/// Ordered, de-duplicated set of scope names
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScopeSet(BTreeSet<String>);

impl ScopeSet {
    /// Create an empty set
    #[must_use]
    pub const fn new() -> Self {
        Self(BTreeSet::new())
    }

    /// Parse a space-delimited scope string (RFC 6749 section 3.3)
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        raw.split_whitespace().collect()
    }

    /// Whether the set contains `scope`
    #[must_use]
    pub fn contains(&self, scope: &str) -> bool {
        self.0.contains(scope)
    }

    /// Whether every scope in `self` is also in `other`
    #[must_use]
    pub fn is_subset(&self, other: &Self) -> bool {
        self.0.is_subset(&other.0)
    }

    /// Scopes in `self` that are not in `other`
    #[must_use]
    pub fn difference(&self, other: &Self) -> Self {
        Self(self.0.difference(&other.0).cloned().collect())
    }

    /// Scopes present in both sets
    #[must_use]
    pub fn intersection(&self, other: &Self) -> Self {
        Self(self.0.intersection(&other.0).cloned().collect())
    }

    /// Add a scope
    pub fn insert(&mut self, scope: impl Into<String>) -> bool {
        self.0.insert(scope.into())
    }

    /// Remove a scope
    pub fn remove(&mut self, scope: &str) -> bool {
        self.0.remove(scope)
    }

    /// Number of scopes
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the set is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate scopes in order
    pub fn iter(&self) -> btree_set::Iter<'_, String> {
        self.0.iter()
    }
}

impl fmt::Display for ScopeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for scope in &self.0 {
            if !first {
                f.write_str(" ")?;
            }
            f.write_str(scope)?;
            first = false;
        }
        Ok(())
    }
}

impl<S: Into<String>> FromIterator<S> for ScopeSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

impl<'a> IntoIterator for &'a ScopeSet {
    type Item = &'a String;
    type IntoIter = btree_set::Iter<'a, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_deduplicates_and_orders() {
        let scopes = ScopeSet::parse("profile openid  profile\temail");
        assert_eq!(scopes.len(), 3);
        assert_eq!(scopes.to_string(), "email openid profile");
    }

    #[test]
    fn test_subset_and_difference() {
        let allowed = ScopeSet::parse("openid profile email");
        let requested = ScopeSet::parse("openid profile admin");

        assert!(!requested.is_subset(&allowed));
        assert_eq!(requested.difference(&allowed).to_string(), "admin");
        assert_eq!(
            requested.intersection(&allowed).to_string(),
            "openid profile"
        );
    }

    #[test]
    fn test_empty_string_parses_to_empty_set() {
        assert!(ScopeSet::parse("   ").is_empty());
    }
}
