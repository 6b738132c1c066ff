// ABOUTME: Shared test utilities and fixtures for integration tests
// ABOUTME: Builds stores, signing keys, registered clients, and a wired protocol engine
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence
#![allow(
    dead_code,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::must_use_candidate,
    clippy::unwrap_used,
    clippy::expect_used
)]
//! Shared test utilities for `arch_idp`

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::{Arc, Once};

use anyhow::Result;
use arch_idp::{
    config::environment::{
        AuthenticationConfig, DatabaseConfig, DatabaseUrl, Environment, ExternalProvidersConfig,
        LogLevel, ServerConfig, SigningConfig, StorePolicyConfig,
    },
    constants::defaults,
    database::Database,
    keys::{KeyRotationSettings, KeySet, SigningKey, SigningKeyManager},
    oauth2_server::{
        pkce::s256_challenge, AuthenticatedSubject, AuthorizeRequest, ClientCredentials,
        ClientRegistration, ClientRegistry, InMemoryProfiles, LifetimePolicy, ProtocolEngine,
        TokenRequest, TokenResponse,
    },
    store::{StorePolicy, Stores},
};
use arch_idp_core::models::{GrantType, ScopeSet, SubjectProfile, TokenLifetimes};
use chrono::{Duration, Utc};
use url::Url;

pub const ISSUER: &str = "https://id.example.com";
pub const WEB_APP: &str = "web-app";
pub const WEB_APP_SECRET: &str = "web-app-secret-0123456789";
pub const WEB_APP_REDIRECT: &str = "https://app.example.com/callback";
pub const MOBILE_APP: &str = "mobile-app";
pub const MOBILE_APP_REDIRECT: &str = "http://127.0.0.1:7890/callback";
pub const WORKER: &str = "orders-worker";
pub const WORKER_SECRET: &str = "orders-worker-secret-0123456789";
pub const SUBJECT: &str = "alice";
pub const PKCE_VERIFIER: &str = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk";

static INIT_LOGGER: Once = Once::new();

/// Initialize quiet logging for tests (call once per test process)
pub fn init_test_logging() {
    INIT_LOGGER.call_once(|| {
        let log_level = match std::env::var("TEST_LOG").as_deref() {
            Ok("TRACE") => tracing::Level::TRACE,
            Ok("DEBUG") => tracing::Level::DEBUG,
            Ok("INFO") => tracing::Level::INFO,
            _ => tracing::Level::WARN,
        };

        tracing_subscriber::fmt()
            .with_max_level(log_level)
            .with_test_writer()
            .init();
    });
}

/// Configuration for tests; nothing is read from the environment
pub fn test_config() -> ServerConfig {
    ServerConfig {
        http_port: 0,
        host: "127.0.0.1".to_owned(),
        issuer_url: ISSUER.to_owned(),
        environment: Environment::Testing,
        log_level: LogLevel::Warn,
        database: DatabaseConfig {
            url: DatabaseUrl::Memory,
            auto_migrate: true,
        },
        token_defaults: TokenLifetimes::default(),
        signing: SigningConfig {
            key_path: None,
            key_bits: 2048,
            rotation_days: 90,
            overlap_secs: 3600,
        },
        store: StorePolicyConfig::default(),
        authentication: AuthenticationConfig {
            subject_header: defaults::AUTH_SUBJECT_HEADER.to_owned(),
            consent_header: defaults::AUTH_CONSENT_HEADER.to_owned(),
        },
        external_providers: ExternalProvidersConfig::default(),
        maintenance_interval_secs: 300,
        seed_config_path: PathBuf::from("config/seed.yaml"),
    }
}

pub fn rotation_settings() -> KeyRotationSettings {
    KeyRotationSettings {
        key_bits: 2048,
        rotation_interval: Duration::days(90),
        overlap: Duration::hours(1),
    }
}

/// Signing key manager with one freshly generated active key
pub fn test_signing_keys(stores: &Stores) -> Arc<SigningKeyManager> {
    let key = SigningKey::generate(2048, Utc::now()).unwrap();
    Arc::new(SigningKeyManager::new(
        KeySet::from_keys(vec![key]),
        stores.signing_keys.clone(),
        StorePolicy::default(),
        rotation_settings(),
    ))
}

/// Confidential web client: code + refresh, offline access allowed
pub fn web_app_registration() -> ClientRegistration {
    ClientRegistration {
        client_id: WEB_APP.to_owned(),
        client_name: Some("Web Application".to_owned()),
        grant_types: [GrantType::AuthorizationCode, GrantType::RefreshToken]
            .into_iter()
            .collect(),
        redirect_uris: [WEB_APP_REDIRECT.to_owned()].into_iter().collect(),
        scopes: ScopeSet::parse("openid profile email offline_access"),
        lifetimes: None,
        require_client_secret: true,
        allow_offline_access: true,
        require_pkce: false,
        require_consent: false,
        enabled: true,
    }
}

/// Public native client: PKCE required, implicit allowed
pub fn mobile_app_registration() -> ClientRegistration {
    ClientRegistration {
        client_id: MOBILE_APP.to_owned(),
        client_name: Some("Mobile Application".to_owned()),
        grant_types: [GrantType::AuthorizationCode, GrantType::Implicit]
            .into_iter()
            .collect(),
        redirect_uris: [MOBILE_APP_REDIRECT.to_owned()].into_iter().collect(),
        scopes: ScopeSet::parse("openid profile"),
        lifetimes: None,
        require_client_secret: false,
        allow_offline_access: false,
        require_pkce: true,
        require_consent: true,
        enabled: true,
    }
}

/// Machine client using client credentials
pub fn worker_registration() -> ClientRegistration {
    ClientRegistration {
        client_id: WORKER.to_owned(),
        client_name: None,
        grant_types: [GrantType::ClientCredentials].into_iter().collect(),
        redirect_uris: BTreeSet::new(),
        scopes: ScopeSet::parse("orders.read orders.write"),
        lifetimes: None,
        require_client_secret: true,
        allow_offline_access: false,
        require_pkce: false,
        require_consent: false,
        enabled: true,
    }
}

/// A fully wired engine over `stores` with the three test clients registered
pub struct TestEnvironment {
    pub stores: Stores,
    pub keys: Arc<SigningKeyManager>,
    pub profiles: Arc<InMemoryProfiles>,
    pub engine: Arc<ProtocolEngine>,
}

impl TestEnvironment {
    pub async fn memory() -> Result<Self> {
        Self::over(Stores::memory()).await
    }

    pub async fn sqlite(url: &DatabaseUrl) -> Result<Self> {
        let database = Database::new(url).await?;
        database.migrate().await?;
        Self::over(Stores::sqlite(&database)).await
    }

    pub async fn over(stores: Stores) -> Result<Self> {
        init_test_logging();
        let keys = test_signing_keys(&stores);
        let profiles = Arc::new(InMemoryProfiles::new());
        profiles.insert(
            SubjectProfile::new(SUBJECT)
                .with_claim("name", "Alice Example")
                .with_claim("email", "alice@example.com")
                .with_claim("email_verified", true),
        );

        let registry = ClientRegistry::new(stores.clients.clone(), StorePolicy::default());
        let lifetimes = LifetimePolicy::default();
        registry
            .register(web_app_registration(), Some(WEB_APP_SECRET), lifetimes)
            .await?;
        registry
            .register(mobile_app_registration(), None, lifetimes)
            .await?;
        registry
            .register(worker_registration(), Some(WORKER_SECRET), lifetimes)
            .await?;

        let engine = Arc::new(ProtocolEngine::new(
            ISSUER,
            &stores,
            keys.clone(),
            profiles.clone(),
            StorePolicy::default(),
        ));
        Ok(Self {
            stores,
            keys,
            profiles,
            engine,
        })
    }
}

pub fn alice() -> AuthenticatedSubject {
    AuthenticatedSubject {
        subject: SUBJECT.to_owned(),
        auth_time: Utc::now(),
        consented_scopes: None,
    }
}

pub fn web_app_credentials() -> ClientCredentials {
    ClientCredentials {
        client_id: WEB_APP.to_owned(),
        client_secret: Some(WEB_APP_SECRET.to_owned()),
    }
}

pub fn mobile_app_credentials() -> ClientCredentials {
    ClientCredentials {
        client_id: MOBILE_APP.to_owned(),
        client_secret: None,
    }
}

pub fn worker_credentials() -> ClientCredentials {
    ClientCredentials {
        client_id: WORKER.to_owned(),
        client_secret: Some(WORKER_SECRET.to_owned()),
    }
}

pub fn web_app_authorize(scope: &str) -> AuthorizeRequest {
    AuthorizeRequest {
        response_type: "code".to_owned(),
        client_id: WEB_APP.to_owned(),
        redirect_uri: WEB_APP_REDIRECT.to_owned(),
        scope: Some(scope.to_owned()),
        state: Some("xyz".to_owned()),
        nonce: Some("n-0S6_WzA2Mj".to_owned()),
        ..AuthorizeRequest::default()
    }
}

pub fn mobile_app_authorize(scope: &str) -> AuthorizeRequest {
    AuthorizeRequest {
        response_type: "code".to_owned(),
        client_id: MOBILE_APP.to_owned(),
        redirect_uri: MOBILE_APP_REDIRECT.to_owned(),
        scope: Some(scope.to_owned()),
        state: Some("abc".to_owned()),
        code_challenge: Some(s256_challenge(PKCE_VERIFIER)),
        code_challenge_method: Some("S256".to_owned()),
        ..AuthorizeRequest::default()
    }
}

/// Value of `name` in the query of a redirect location
pub fn query_param(location: &str, name: &str) -> Option<String> {
    Url::parse(location)
        .unwrap()
        .query_pairs()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.into_owned())
}

/// Value of `name` in the fragment of a redirect location
pub fn fragment_param(location: &str, name: &str) -> Option<String> {
    let url = Url::parse(location).unwrap();
    url::form_urlencoded::parse(url.fragment().unwrap_or_default().as_bytes())
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.into_owned())
}

/// Run the web app through authorize and return the issued code
pub async fn web_app_code(engine: &ProtocolEngine, scope: &str) -> String {
    let redirect = engine
        .authorize(&web_app_authorize(scope), Some(alice()), Utc::now())
        .await
        .unwrap();
    query_param(&redirect.location, "code").unwrap()
}

pub fn code_exchange(code: &str) -> TokenRequest {
    TokenRequest {
        grant_type: "authorization_code".to_owned(),
        code: Some(code.to_owned()),
        redirect_uri: Some(WEB_APP_REDIRECT.to_owned()),
        ..TokenRequest::default()
    }
}

pub fn refresh_exchange(refresh_token: &str, scope: Option<&str>) -> TokenRequest {
    TokenRequest {
        grant_type: "refresh_token".to_owned(),
        refresh_token: Some(refresh_token.to_owned()),
        scope: scope.map(ToOwned::to_owned),
        ..TokenRequest::default()
    }
}

/// Authorize and exchange for the web app; the response carries rt-1
pub async fn web_app_tokens(engine: &ProtocolEngine, scope: &str) -> TokenResponse {
    let code = web_app_code(engine, scope).await;
    engine
        .exchange(&code_exchange(&code), &web_app_credentials(), Utc::now())
        .await
        .unwrap()
}
