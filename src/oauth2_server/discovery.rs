// ABOUTME: OpenID Connect discovery document built from the issuer URL and provisioned resources
// ABOUTME: Advertises endpoints, supported grants, response types, scopes, and claims
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

use crate::constants::endpoints;
use crate::constants::oauth::{
    grant_types, response_types, scopes, PKCE_METHOD_S256, SIGNING_ALGORITHM,
};
use arch_idp_core::models::{ApiResource, IdentityResource, ScopeSet};
use serde::Serialize;
use std::collections::BTreeSet;

/// OpenID Provider Metadata (OIDC Discovery 1.0 section 3)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiscoveryDocument {
    /// Issuer identifier, equal to the `iss` claim
    pub issuer: String,
    /// Authorize endpoint
    pub authorization_endpoint: String,
    /// Token endpoint
    pub token_endpoint: String,
    /// Userinfo endpoint
    pub userinfo_endpoint: String,
    /// Revocation endpoint (RFC 7009)
    pub revocation_endpoint: String,
    /// JWKS document
    pub jwks_uri: String,
    /// Scopes from enabled identity and API resources
    pub scopes_supported: Vec<String>,
    /// Claims released by enabled identity resources
    pub claims_supported: Vec<String>,
    /// Grant types
    pub grant_types_supported: Vec<&'static str>,
    /// Response types
    pub response_types_supported: Vec<&'static str>,
    /// Response modes
    pub response_modes_supported: Vec<&'static str>,
    /// Subject identifier types
    pub subject_types_supported: Vec<&'static str>,
    /// Identity token signing algorithms
    pub id_token_signing_alg_values_supported: Vec<&'static str>,
    /// Client authentication methods at the token endpoint
    pub token_endpoint_auth_methods_supported: Vec<&'static str>,
    /// PKCE methods
    pub code_challenge_methods_supported: Vec<&'static str>,
}

impl DiscoveryDocument {
    /// Metadata for `issuer` advertising the enabled resources
    #[must_use]
    pub fn new(
        issuer: &str,
        identity_resources: &[IdentityResource],
        api_resources: &[ApiResource],
    ) -> Self {
        let base = issuer.trim_end_matches('/');
        let endpoint = |path: &str| format!("{base}{path}");

        let mut scope_names: ScopeSet = identity_resources
            .iter()
            .filter(|resource| resource.enabled)
            .map(|resource| resource.name.clone())
            .collect();
        for api in api_resources.iter().filter(|api| api.enabled) {
            for scope in &api.scopes {
                scope_names.insert(scope.clone());
            }
        }
        scope_names.insert(scopes::OFFLINE_ACCESS);

        let claims: BTreeSet<String> = identity_resources
            .iter()
            .filter(|resource| resource.enabled)
            .flat_map(|resource| resource.claims.iter().cloned())
            .collect();

        Self {
            issuer: issuer.to_owned(),
            authorization_endpoint: endpoint(endpoints::AUTHORIZE),
            token_endpoint: endpoint(endpoints::TOKEN),
            userinfo_endpoint: endpoint(endpoints::USERINFO),
            revocation_endpoint: endpoint(endpoints::REVOCATION),
            jwks_uri: endpoint(endpoints::JWKS),
            scopes_supported: scope_names.iter().cloned().collect(),
            claims_supported: claims.into_iter().collect(),
            grant_types_supported: vec![
                grant_types::AUTHORIZATION_CODE,
                grant_types::IMPLICIT,
                grant_types::CLIENT_CREDENTIALS,
                grant_types::REFRESH_TOKEN,
            ],
            response_types_supported: vec![
                response_types::CODE,
                response_types::TOKEN,
                response_types::ID_TOKEN,
                response_types::ID_TOKEN_TOKEN,
            ],
            response_modes_supported: vec!["query", "fragment"],
            subject_types_supported: vec!["public"],
            id_token_signing_alg_values_supported: vec![SIGNING_ALGORITHM],
            token_endpoint_auth_methods_supported: vec![
                "client_secret_basic",
                "client_secret_post",
                "none",
            ],
            code_challenge_methods_supported: vec![PKCE_METHOD_S256],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_lists_enabled_resources_only() {
        let mut identity = IdentityResource::standard_set();
        identity[2].enabled = false;
        let api = vec![ApiResource {
            name: "orders".to_owned(),
            display_name: None,
            scopes: ScopeSet::parse("orders.read orders.write"),
            enabled: true,
        }];

        let document = DiscoveryDocument::new("https://id.example.com/", &identity, &api);
        assert_eq!(document.issuer, "https://id.example.com/");
        assert_eq!(
            document.jwks_uri,
            "https://id.example.com/.well-known/openid-configuration/jwks"
        );
        assert!(document.scopes_supported.contains(&"orders.read".to_owned()));
        assert!(document.scopes_supported.contains(&"offline_access".to_owned()));
        assert!(!document.scopes_supported.contains(&"email".to_owned()));
        assert!(document.claims_supported.contains(&"name".to_owned()));
    }
}
