// ABOUTME: HTTP-level tests for the provider router using tower's oneshot
// ABOUTME: Exercises status codes, cache headers, client authentication, and redirects
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs)]

mod common;

use std::error::Error;
use std::sync::Arc;

use arch_idp::constants::{defaults, endpoints};
use arch_idp::keys::JsonWebKeySet;
use arch_idp::oauth2_server::TrustedHeaderAuthenticator;
use arch_idp::resources::ServerResources;
use arch_idp::server::build_router;
use axum::{
    body::{to_bytes, Body},
    http::{
        header::{AUTHORIZATION, CACHE_CONTROL, CONTENT_TYPE, LOCATION, WWW_AUTHENTICATE},
        Request as HttpRequest, StatusCode,
    },
    response::Response,
    Router,
};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use common::{
    query_param, test_config, TestEnvironment, ISSUER, WEB_APP, WEB_APP_REDIRECT, WEB_APP_SECRET,
};
use serde_json::Value;
use tower::ServiceExt;

type TestResult = Result<(), Box<dyn Error>>;

async fn router() -> Router {
    let env = TestEnvironment::memory().await.unwrap();
    let config = test_config();
    let authenticator = TrustedHeaderAuthenticator::from_config(&config.authentication).unwrap();
    let resources = ServerResources::new(
        config,
        env.stores.clone(),
        env.keys.clone(),
        env.profiles.clone(),
        Arc::new(authenticator),
    );
    build_router(Arc::new(resources))
}

async fn json_body(response: Response) -> Result<Value, Box<dyn Error>> {
    let body = to_bytes(response.into_body(), usize::MAX).await?;
    Ok(serde_json::from_slice(&body)?)
}

fn basic_auth(client_id: &str, secret: &str) -> String {
    format!("Basic {}", STANDARD.encode(format!("{client_id}:{secret}")))
}

fn form_post(
    uri: &str,
    authorization: Option<&str>,
    fields: &[(&str, &str)],
) -> HttpRequest<Body> {
    let mut builder = HttpRequest::builder()
        .method("POST")
        .uri(uri)
        .header(CONTENT_TYPE, "application/x-www-form-urlencoded");
    if let Some(authorization) = authorization {
        builder = builder.header(AUTHORIZATION, authorization);
    }
    let body = serde_urlencoded::to_string(fields).unwrap();
    builder.body(Body::from(body)).unwrap()
}

fn authorize_uri(scope: &str) -> String {
    let query = serde_urlencoded::to_string([
        ("response_type", "code"),
        ("client_id", WEB_APP),
        ("redirect_uri", WEB_APP_REDIRECT),
        ("scope", scope),
        ("state", "xyz"),
        ("nonce", "n-0S6_WzA2Mj"),
    ])
    .unwrap();
    format!("{}?{query}", endpoints::AUTHORIZE)
}

/// Run authorize as alice and return the issued code
async fn authorize_code(app: &Router, scope: &str) -> String {
    let request = HttpRequest::builder()
        .uri(authorize_uri(scope))
        .header(defaults::AUTH_SUBJECT_HEADER, "alice")
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::FOUND);
    let location = response.headers()[LOCATION].to_str().unwrap();
    query_param(location, "code").unwrap()
}

#[tokio::test]
async fn test_discovery_document_advertises_endpoints() -> TestResult {
    let app = router().await;
    let request = HttpRequest::builder()
        .uri(endpoints::DISCOVERY)
        .body(Body::empty())?;
    let response = app.oneshot(request).await?;
    assert_eq!(response.status(), StatusCode::OK);

    let document = json_body(response).await?;
    assert_eq!(document["issuer"], ISSUER);
    assert_eq!(
        document["jwks_uri"],
        format!("{ISSUER}{}", endpoints::JWKS)
    );
    assert_eq!(
        document["token_endpoint"],
        format!("{ISSUER}{}", endpoints::TOKEN)
    );
    let algorithms = document["id_token_signing_alg_values_supported"]
        .as_array()
        .unwrap();
    assert!(algorithms.iter().any(|alg| alg == "RS256"));
    Ok(())
}

#[tokio::test]
async fn test_jwks_is_cacheable_and_parses() -> TestResult {
    let app = router().await;
    let request = HttpRequest::builder().uri(endpoints::JWKS).body(Body::empty())?;
    let response = app.oneshot(request).await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers()[CACHE_CONTROL]
        .to_str()?
        .contains("max-age"));

    let body = to_bytes(response.into_body(), usize::MAX).await?;
    let jwks: JsonWebKeySet = serde_json::from_slice(&body)?;
    assert_eq!(jwks.keys.len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_health_reports_ok_with_request_id() -> TestResult {
    let app = router().await;
    let request = HttpRequest::builder().uri(endpoints::HEALTH).body(Body::empty())?;
    let response = app.oneshot(request).await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-request-id"));
    assert_eq!(json_body(response).await?["status"], "ok");
    Ok(())
}

#[tokio::test]
async fn test_authorize_without_subject_redirects_login_required() -> TestResult {
    let app = router().await;
    let request = HttpRequest::builder()
        .uri(authorize_uri("openid"))
        .body(Body::empty())?;
    let response = app.oneshot(request).await?;
    assert_eq!(response.status(), StatusCode::FOUND);
    let location = response.headers()[LOCATION].to_str()?;
    assert_eq!(query_param(location, "error").as_deref(), Some("login_required"));
    assert_eq!(query_param(location, "state").as_deref(), Some("xyz"));
    Ok(())
}

#[tokio::test]
async fn test_authorize_with_unregistered_redirect_is_not_redirected() -> TestResult {
    let app = router().await;
    let query = serde_urlencoded::to_string([
        ("response_type", "code"),
        ("client_id", WEB_APP),
        ("redirect_uri", "https://evil.example.com/"),
        ("scope", "openid"),
    ])?;
    let request = HttpRequest::builder()
        .uri(format!("{}?{query}", endpoints::AUTHORIZE))
        .header(defaults::AUTH_SUBJECT_HEADER, "alice")
        .body(Body::empty())?;
    let response = app.oneshot(request).await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(!response.headers().contains_key(LOCATION));
    Ok(())
}

#[tokio::test]
async fn test_code_exchange_with_basic_auth_and_userinfo() -> TestResult {
    let app = router().await;
    let code = authorize_code(&app, "openid profile").await;

    let response = app
        .clone()
        .oneshot(form_post(
            endpoints::TOKEN,
            Some(&basic_auth(WEB_APP, WEB_APP_SECRET)),
            &[
                ("grant_type", "authorization_code"),
                ("code", code.as_str()),
                ("redirect_uri", WEB_APP_REDIRECT),
            ],
        ))
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[CACHE_CONTROL], "no-store");

    let tokens = json_body(response).await?;
    assert_eq!(tokens["token_type"], "Bearer");
    assert!(tokens["id_token"].is_string());
    let access_token = tokens["access_token"].as_str().unwrap();

    let request = HttpRequest::builder()
        .uri(endpoints::USERINFO)
        .header(AUTHORIZATION, format!("Bearer {access_token}"))
        .body(Body::empty())?;
    let response = app.clone().oneshot(request).await?;
    assert_eq!(response.status(), StatusCode::OK);
    let claims = json_body(response).await?;
    assert_eq!(claims["sub"], "alice");
    assert_eq!(claims["name"], "Alice Example");

    // The code is spent
    let replay = app
        .oneshot(form_post(
            endpoints::TOKEN,
            Some(&basic_auth(WEB_APP, WEB_APP_SECRET)),
            &[
                ("grant_type", "authorization_code"),
                ("code", code.as_str()),
                ("redirect_uri", WEB_APP_REDIRECT),
            ],
        ))
        .await?;
    assert_eq!(replay.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(replay).await?["error"], "invalid_grant");
    Ok(())
}

#[tokio::test]
async fn test_token_with_bad_secret_is_unauthorized() -> TestResult {
    let app = router().await;
    let response = app
        .oneshot(form_post(
            endpoints::TOKEN,
            Some(&basic_auth(WEB_APP, "wrong")),
            &[("grant_type", "client_credentials")],
        ))
        .await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(response.headers().contains_key(WWW_AUTHENTICATE));
    assert_eq!(json_body(response).await?["error"], "invalid_client");
    Ok(())
}

#[tokio::test]
async fn test_unsupported_grant_type_over_http() -> TestResult {
    let app = router().await;
    let response = app
        .oneshot(form_post(
            endpoints::TOKEN,
            None,
            &[
                ("grant_type", "password"),
                ("client_id", WEB_APP),
                ("client_secret", WEB_APP_SECRET),
            ],
        ))
        .await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await?["error"], "unsupported_grant_type");
    Ok(())
}

#[tokio::test]
async fn test_userinfo_without_bearer_is_unauthorized() -> TestResult {
    let app = router().await;
    let request = HttpRequest::builder()
        .uri(endpoints::USERINFO)
        .body(Body::empty())?;
    let response = app.clone().oneshot(request).await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(response.headers().contains_key(WWW_AUTHENTICATE));

    let request = HttpRequest::builder()
        .uri(endpoints::USERINFO)
        .header(AUTHORIZATION, "Bearer not-a-jwt")
        .body(Body::empty())?;
    let response = app.oneshot(request).await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(json_body(response).await?["error"], "invalid_token");
    Ok(())
}

#[tokio::test]
async fn test_revocation_succeeds_for_unknown_token() -> TestResult {
    let app = router().await;
    let response = app
        .oneshot(form_post(
            endpoints::REVOCATION,
            Some(&basic_auth(WEB_APP, WEB_APP_SECRET)),
            &[("token", "never-issued")],
        ))
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    Ok(())
}
