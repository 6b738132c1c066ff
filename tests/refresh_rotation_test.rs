// ABOUTME: Integration tests for refresh token rotation, reuse detection, and scope narrowing
// ABOUTME: Replaying a rotated token revokes every token in its family
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs)]

mod common;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use arch_idp::config::environment::DatabaseUrl;
use arch_idp::errors::{ProtocolError, StoreError};
use arch_idp::oauth2_server::{ClientCredentials, RevocationRequest};
use arch_idp::store::{InMemoryStore, ResourceStore, StoreResult, Stores};
use arch_idp_core::models::{ApiResource, IdentityResource, RefreshTokenStatus};
use async_trait::async_trait;
use chrono::Utc;
use common::{
    refresh_exchange, web_app_credentials, web_app_tokens, worker_credentials, TestEnvironment,
};
use futures_util::future::join_all;
use tempfile::TempDir;

const OFFLINE_SCOPES: &str = "openid profile offline_access";
const CONTENDERS: usize = 8;

/// Resource store whose identity resource listing can be switched off
#[derive(Default)]
struct FlakyResources {
    inner: InMemoryStore,
    offline: AtomicBool,
}

#[async_trait]
impl ResourceStore for FlakyResources {
    async fn insert_identity_resource_if_absent(
        &self,
        resource: &IdentityResource,
    ) -> StoreResult<bool> {
        self.inner.insert_identity_resource_if_absent(resource).await
    }

    async fn insert_api_resource_if_absent(&self, resource: &ApiResource) -> StoreResult<bool> {
        self.inner.insert_api_resource_if_absent(resource).await
    }

    async fn list_identity_resources(&self) -> StoreResult<Vec<IdentityResource>> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable {
                context: "resource store offline".to_owned(),
            });
        }
        self.inner.list_identity_resources().await
    }

    async fn list_api_resources(&self) -> StoreResult<Vec<ApiResource>> {
        self.inner.list_api_resources().await
    }
}

async fn assert_reuse_revokes_family(env: &TestEnvironment) {
    let initial = web_app_tokens(&env.engine, OFFLINE_SCOPES).await;
    let rt1 = initial.refresh_token.unwrap();

    let rotated = env
        .engine
        .exchange(&refresh_exchange(&rt1, None), &web_app_credentials(), Utc::now())
        .await
        .unwrap();
    let rt2 = rotated.refresh_token.unwrap();
    assert_ne!(rt1, rt2);

    let replay = env
        .engine
        .exchange(&refresh_exchange(&rt1, None), &web_app_credentials(), Utc::now())
        .await;
    assert!(
        matches!(replay, Err(ProtocolError::RefreshReuseDetected { .. })),
        "{replay:?}"
    );

    // The legitimate successor died with the family
    let successor = env
        .engine
        .exchange(&refresh_exchange(&rt2, None), &web_app_credentials(), Utc::now())
        .await;
    assert!(
        matches!(successor, Err(ProtocolError::RefreshTokenRevoked)),
        "{successor:?}"
    );

    let grants = env.engine.grants();
    let rt1_record = grants.find_refresh_token(&rt1).await.unwrap().unwrap();
    let rt2_record = grants.find_refresh_token(&rt2).await.unwrap().unwrap();
    assert_eq!(rt1_record.family_id, rt2_record.family_id);
    assert_eq!(rt1_record.status, RefreshTokenStatus::Revoked);
    assert_eq!(rt2_record.status, RefreshTokenStatus::Revoked);
    assert_eq!(rt2_record.generation, 1);
}

#[tokio::test]
async fn test_reused_refresh_token_revokes_family_in_memory() {
    let env = TestEnvironment::memory().await.unwrap();
    assert_reuse_revokes_family(&env).await;
}

#[tokio::test]
async fn test_reused_refresh_token_revokes_family_in_sqlite() {
    let dir = TempDir::new().unwrap();
    let url = DatabaseUrl::SQLite {
        path: dir.path().join("refresh.db"),
    };
    let env = TestEnvironment::sqlite(&url).await.unwrap();
    assert_reuse_revokes_family(&env).await;
}

#[tokio::test]
async fn test_refresh_scope_escalation_is_denied_without_rotating() {
    let env = TestEnvironment::memory().await.unwrap();
    let initial = web_app_tokens(&env.engine, OFFLINE_SCOPES).await;
    let rt1 = initial.refresh_token.unwrap();

    let escalation = env
        .engine
        .exchange(
            &refresh_exchange(&rt1, Some("openid profile admin")),
            &web_app_credentials(),
            Utc::now(),
        )
        .await;
    match escalation {
        Err(ProtocolError::ScopeDenied { scope }) => assert_eq!(scope, "admin"),
        other => panic!("expected ScopeDenied, got {other:?}"),
    }

    // The refused request left rt-1 usable
    let record = env
        .engine
        .grants()
        .find_refresh_token(&rt1)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.status, RefreshTokenStatus::Active);
    let rotated = env
        .engine
        .exchange(&refresh_exchange(&rt1, None), &web_app_credentials(), Utc::now())
        .await;
    assert!(rotated.is_ok());
}

#[tokio::test]
async fn test_refresh_scope_can_be_narrowed() {
    let env = TestEnvironment::memory().await.unwrap();
    let initial = web_app_tokens(&env.engine, OFFLINE_SCOPES).await;
    assert!(initial.id_token.is_some());
    let rt1 = initial.refresh_token.unwrap();

    let narrowed = env
        .engine
        .exchange(
            &refresh_exchange(&rt1, Some("profile")),
            &web_app_credentials(),
            Utc::now(),
        )
        .await
        .unwrap();
    assert_eq!(narrowed.scope, "profile");
    assert!(narrowed.id_token.is_none());

    // The family keeps its original grant
    let rt2 = narrowed.refresh_token.unwrap();
    let record = env
        .engine
        .grants()
        .find_refresh_token(&rt2)
        .await
        .unwrap()
        .unwrap();
    assert!(record.scopes.contains("openid"));
    assert!(record.scopes.contains("offline_access"));
}

#[tokio::test]
async fn test_refresh_token_of_another_client_is_rejected() {
    let env = TestEnvironment::memory().await.unwrap();
    let initial = web_app_tokens(&env.engine, OFFLINE_SCOPES).await;
    let rt1 = initial.refresh_token.unwrap();

    let result = env
        .engine
        .exchange(&refresh_exchange(&rt1, None), &worker_credentials(), Utc::now())
        .await;
    // The worker may not use the refresh grant at all
    assert!(matches!(
        result,
        Err(ProtocolError::UnauthorizedClient { .. })
    ));
}

#[tokio::test]
async fn test_no_refresh_token_without_offline_access() {
    let env = TestEnvironment::memory().await.unwrap();
    let tokens = web_app_tokens(&env.engine, "openid profile").await;
    assert!(tokens.refresh_token.is_none());
}

#[tokio::test]
async fn test_revocation_revokes_family_and_ignores_unknown_tokens() {
    let env = TestEnvironment::memory().await.unwrap();
    let initial = web_app_tokens(&env.engine, OFFLINE_SCOPES).await;
    let rt1 = initial.refresh_token.unwrap();

    env.engine
        .revoke(
            &RevocationRequest {
                token: rt1.clone(),
                token_type_hint: Some("refresh_token".to_owned()),
                client_id: None,
                client_secret: None,
            },
            &web_app_credentials(),
        )
        .await
        .unwrap();
    let after = env
        .engine
        .exchange(&refresh_exchange(&rt1, None), &web_app_credentials(), Utc::now())
        .await;
    assert!(matches!(after, Err(ProtocolError::RefreshTokenRevoked)));

    let unknown = env
        .engine
        .revoke(
            &RevocationRequest {
                token: "not-a-token".to_owned(),
                token_type_hint: None,
                client_id: None,
                client_secret: None,
            },
            &web_app_credentials(),
        )
        .await;
    assert!(unknown.is_ok());

    let bad_secret = env
        .engine
        .revoke(
            &RevocationRequest {
                token: rt1,
                token_type_hint: None,
                client_id: None,
                client_secret: None,
            },
            &ClientCredentials {
                client_id: "web-app".to_owned(),
                client_secret: Some("wrong".to_owned()),
            },
        )
        .await;
    assert!(matches!(bad_secret, Err(ProtocolError::ClientError { .. })));
}

#[tokio::test]
async fn test_failed_refresh_leaves_token_usable() {
    let resources = Arc::new(FlakyResources::default());
    let mut stores = Stores::memory();
    stores.resources = resources.clone();
    let env = TestEnvironment::over(stores).await.unwrap();
    let rt1 = web_app_tokens(&env.engine, OFFLINE_SCOPES)
        .await
        .refresh_token
        .unwrap();

    resources.offline.store(true, Ordering::SeqCst);
    let during_outage = env
        .engine
        .exchange(&refresh_exchange(&rt1, None), &web_app_credentials(), Utc::now())
        .await;
    assert!(
        matches!(during_outage, Err(ProtocolError::StoreUnavailable { .. })),
        "{during_outage:?}"
    );
    let record = env
        .engine
        .grants()
        .find_refresh_token(&rt1)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.status, RefreshTokenStatus::Active);

    // The retry after recovery is an ordinary rotation, not a reuse
    resources.offline.store(false, Ordering::SeqCst);
    let retried = env
        .engine
        .exchange(&refresh_exchange(&rt1, None), &web_app_credentials(), Utc::now())
        .await
        .unwrap();
    assert!(retried.id_token.is_some());
    let rt2 = retried.refresh_token.unwrap();
    let successor = env
        .engine
        .grants()
        .find_refresh_token(&rt2)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(successor.status, RefreshTokenStatus::Active);
    assert_eq!(successor.generation, 1);
}

async fn race_refresh_rotation(env: &TestEnvironment) {
    let rt1 = web_app_tokens(&env.engine, OFFLINE_SCOPES)
        .await
        .refresh_token
        .unwrap();

    let handles = (0..CONTENDERS).map(|_| {
        let engine = env.engine.clone();
        let rt1 = rt1.clone();
        tokio::spawn(async move {
            engine
                .exchange(&refresh_exchange(&rt1, None), &web_app_credentials(), Utc::now())
                .await
        })
    });
    let results: Vec<_> = join_all(handles)
        .await
        .into_iter()
        .map(|joined| joined.unwrap())
        .collect();

    let successes = results.iter().filter(|result| result.is_ok()).count();
    assert_eq!(successes, 1, "exactly one rotation may win: {results:?}");
    let reused = results
        .iter()
        .filter(|result| matches!(result, Err(ProtocolError::RefreshReuseDetected { .. })))
        .count();
    assert!(reused >= 1, "a losing rotation must trip reuse detection: {results:?}");
    for result in results.iter().filter(|result| result.is_err()) {
        assert!(
            matches!(
                result,
                Err(ProtocolError::RefreshReuseDetected { .. } | ProtocolError::RefreshTokenRevoked)
            ),
            "losers must see reuse or a revoked family: {result:?}"
        );
    }

    let record = env
        .engine
        .grants()
        .find_refresh_token(&rt1)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.status, RefreshTokenStatus::Revoked);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_refresh_rotation_has_one_winner_in_memory() {
    let env = TestEnvironment::memory().await.unwrap();
    race_refresh_rotation(&env).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_refresh_rotation_has_one_winner_in_sqlite() {
    let dir = TempDir::new().unwrap();
    let url = DatabaseUrl::SQLite {
        path: dir.path().join("refresh-race.db"),
    };
    let env = TestEnvironment::sqlite(&url).await.unwrap();
    race_refresh_rotation(&env).await;
}
