// ABOUTME: Integration tests for authorization code consumption against both store adapters
// ABOUTME: Concurrent exchanges of one code must produce exactly one success
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs)]

mod common;

use arch_idp::config::environment::DatabaseUrl;
use arch_idp::crypto::hash_token;
use arch_idp::errors::ProtocolError;
use arch_idp::oauth2_server::NewAuthorizationCode;
use arch_idp::store::GrantStore;
use arch_idp_core::models::{ConsumeOutcome, ScopeSet};
use chrono::{DateTime, Duration, Utc};
use common::{
    code_exchange, web_app_code, web_app_credentials, TestEnvironment, SUBJECT, WEB_APP,
    WEB_APP_REDIRECT,
};
use futures_util::future::join_all;
use tempfile::TempDir;

const CONTENDERS: usize = 8;

async fn race_code_exchange(env: &TestEnvironment) {
    let code = web_app_code(&env.engine, "openid profile").await;

    let handles = (0..CONTENDERS).map(|_| {
        let engine = env.engine.clone();
        let code = code.clone();
        tokio::spawn(async move {
            engine
                .exchange(&code_exchange(&code), &web_app_credentials(), Utc::now())
                .await
        })
    });
    let results: Vec<_> = join_all(handles)
        .await
        .into_iter()
        .map(|joined| joined.unwrap())
        .collect();

    let successes = results.iter().filter(|result| result.is_ok()).count();
    assert_eq!(successes, 1, "exactly one exchange may win: {results:?}");
    for result in results.iter().filter(|result| result.is_err()) {
        assert!(
            matches!(result, Err(ProtocolError::GrantAlreadyConsumed)),
            "losers must see the code as consumed: {result:?}"
        );
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_code_exchange_has_one_winner_in_memory() {
    let env = TestEnvironment::memory().await.unwrap();
    race_code_exchange(&env).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_code_exchange_has_one_winner_in_sqlite() {
    let dir = TempDir::new().unwrap();
    let url = DatabaseUrl::SQLite {
        path: dir.path().join("grants.db"),
    };
    let env = TestEnvironment::sqlite(&url).await.unwrap();
    race_code_exchange(&env).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_store_consumption_in_sqlite() {
    let dir = TempDir::new().unwrap();
    let url = DatabaseUrl::SQLite {
        path: dir.path().join("consume.db"),
    };
    let env = TestEnvironment::sqlite(&url).await.unwrap();
    let client = env.engine.clients().lookup(WEB_APP).await.unwrap();
    let now = Utc::now();
    let code = env
        .engine
        .grants()
        .create_authorization_code(
            NewAuthorizationCode {
                client: &client,
                subject: SUBJECT,
                scopes: &ScopeSet::parse("openid"),
                redirect_uri: WEB_APP_REDIRECT,
                nonce: None,
                pkce: None,
                auth_time: now,
            },
            now,
        )
        .await
        .unwrap();

    let handles = (0..32).map(|_| {
        let grants = env.stores.grants.clone();
        let code_hash = hash_token(&code);
        tokio::spawn(async move {
            grants
                .consume_authorization_code(&code_hash, WEB_APP, now)
                .await
        })
    });
    let outcomes: Vec<ConsumeOutcome> = join_all(handles)
        .await
        .into_iter()
        .map(|joined| joined.unwrap().unwrap())
        .collect();

    let consumed = outcomes
        .iter()
        .filter(|outcome| matches!(outcome, ConsumeOutcome::Consumed(_)))
        .count();
    assert_eq!(consumed, 1);
    assert!(outcomes.iter().all(|outcome| matches!(
        outcome,
        ConsumeOutcome::Consumed(_) | ConsumeOutcome::AlreadyConsumed
    )));
}

async fn issue_code_at(env: &TestEnvironment, issued_at: DateTime<Utc>) -> String {
    let client = env.engine.clients().lookup(WEB_APP).await.unwrap();
    env.engine
        .grants()
        .create_authorization_code(
            NewAuthorizationCode {
                client: &client,
                subject: SUBJECT,
                scopes: &ScopeSet::parse("openid"),
                redirect_uri: WEB_APP_REDIRECT,
                nonce: None,
                pkce: None,
                auth_time: issued_at,
            },
            issued_at,
        )
        .await
        .unwrap()
}

#[tokio::test]
async fn test_expired_code_reports_expired_not_consumed() {
    let env = TestEnvironment::memory().await.unwrap();
    let issued_at = Utc::now() - Duration::seconds(301);
    let code = issue_code_at(&env, issued_at).await;

    let outcome = env
        .engine
        .grants()
        .consume_authorization_code(&code, WEB_APP, Utc::now())
        .await
        .unwrap();
    assert_eq!(outcome, ConsumeOutcome::Expired);

    // Still expired on a second attempt: the failed attempt consumed nothing
    let result = env
        .engine
        .exchange(&code_exchange(&code), &web_app_credentials(), Utc::now())
        .await;
    assert!(matches!(result, Err(ProtocolError::GrantExpired)));
}

#[tokio::test]
async fn test_consumed_code_reports_expired_once_past_expiry() {
    let env = TestEnvironment::memory().await.unwrap();
    let issued_at = Utc::now();
    let code = issue_code_at(&env, issued_at).await;
    let grants = env.engine.grants();

    let first = grants
        .consume_authorization_code(&code, WEB_APP, issued_at + Duration::seconds(1))
        .await
        .unwrap();
    assert!(matches!(first, ConsumeOutcome::Consumed(_)));

    let replay = grants
        .consume_authorization_code(&code, WEB_APP, issued_at + Duration::seconds(2))
        .await
        .unwrap();
    assert_eq!(replay, ConsumeOutcome::AlreadyConsumed);

    let late_replay = grants
        .consume_authorization_code(&code, WEB_APP, issued_at + Duration::seconds(300))
        .await
        .unwrap();
    assert_eq!(late_replay, ConsumeOutcome::Expired);
}

#[tokio::test]
async fn test_unknown_code_is_not_found() {
    let env = TestEnvironment::memory().await.unwrap();
    let result = env
        .engine
        .exchange(
            &code_exchange("never-issued"),
            &web_app_credentials(),
            Utc::now(),
        )
        .await;
    assert!(matches!(result, Err(ProtocolError::GrantNotFound)));
}

async fn assert_purge_keeps_recently_expired_codes(env: &TestEnvironment) {
    let now = Utc::now();
    let stale = issue_code_at(env, now - Duration::days(2)).await;
    let recent = issue_code_at(env, now - Duration::hours(1)).await;
    let fresh = issue_code_at(env, now).await;
    let grants = env.engine.grants();

    let report = grants.purge_expired(now).await.unwrap();
    assert_eq!(report.authorization_codes, 1);

    let purged = grants
        .consume_authorization_code(&stale, WEB_APP, now)
        .await
        .unwrap();
    assert_eq!(purged, ConsumeOutcome::NotFound);
    // Inside the retention window a late code still reads as expired
    let late = grants
        .consume_authorization_code(&recent, WEB_APP, now)
        .await
        .unwrap();
    assert_eq!(late, ConsumeOutcome::Expired);
    let kept = grants
        .consume_authorization_code(&fresh, WEB_APP, now)
        .await
        .unwrap();
    assert!(matches!(kept, ConsumeOutcome::Consumed(_)));
}

#[tokio::test]
async fn test_purge_keeps_recently_expired_codes_in_memory() {
    let env = TestEnvironment::memory().await.unwrap();
    assert_purge_keeps_recently_expired_codes(&env).await;
}

#[tokio::test]
async fn test_purge_keeps_recently_expired_codes_in_sqlite() {
    let dir = TempDir::new().unwrap();
    let url = DatabaseUrl::SQLite {
        path: dir.path().join("purge.db"),
    };
    let env = TestEnvironment::sqlite(&url).await.unwrap();
    assert_purge_keeps_recently_expired_codes(&env).await;
}
