// ABOUTME: OpenID Connect HTTP route handlers for the axum web framework
// ABOUTME: Authorize, token, userinfo, revocation, discovery, JWKS, and health endpoints
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

//! OIDC Routes
//!
//! ## Endpoints
//!
//! - `GET /connect/authorize` - 302 to the client with a code, tokens, or an error
//! - `POST /connect/token` - form body, `client_secret_basic` or `client_secret_post`
//! - `GET /connect/userinfo` - bearer access token
//! - `POST /connect/revocation` - refresh token revocation (RFC 7009)
//! - `GET /.well-known/openid-configuration` - discovery document
//! - `GET /.well-known/openid-configuration/jwks` - JSON Web Key Set
//! - `GET /health` - liveness

use super::client_registry::ClientCredentials;
use super::discovery::DiscoveryDocument;
use super::engine::AuthorizeError;
use super::models::{AuthorizeRequest, OAuth2Error, RevocationRequest, TokenRequest};
use crate::constants::{endpoints, service_names};
use crate::errors::ProtocolError;
use crate::resources::ServerResources;
use axum::{
    extract::{
        rejection::{FormRejection, QueryRejection},
        Query, State,
    },
    http::{
        header::{AUTHORIZATION, CACHE_CONTROL, LOCATION, PRAGMA, WWW_AUTHENTICATE},
        HeaderMap, HeaderName, HeaderValue, StatusCode,
    },
    response::{IntoResponse, Response},
    routing::{get, post},
    Form, Json, Router,
};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, error, warn};

const NO_STORE: [(HeaderName, &str); 2] =
    [(CACHE_CONTROL, "no-store"), (PRAGMA, "no-cache")];

/// Routes for the OpenID Connect provider
pub struct OidcRoutes;

impl OidcRoutes {
    /// Create all provider routes
    pub fn routes(resources: Arc<ServerResources>) -> Router {
        Router::new()
            .route(endpoints::AUTHORIZE, get(Self::handle_authorize))
            .route(endpoints::TOKEN, post(Self::handle_token))
            .route(
                endpoints::USERINFO,
                get(Self::handle_userinfo).post(Self::handle_userinfo),
            )
            .route(endpoints::REVOCATION, post(Self::handle_revocation))
            .route(endpoints::DISCOVERY, get(Self::handle_discovery))
            .route(endpoints::JWKS, get(Self::handle_jwks))
            .route(endpoints::HEALTH, get(Self::handle_health))
            .with_state(resources)
    }

    /// Handle an authorize request (GET /connect/authorize)
    async fn handle_authorize(
        State(resources): State<Arc<ServerResources>>,
        headers: HeaderMap,
        query: Result<Query<AuthorizeRequest>, QueryRejection>,
    ) -> Response {
        let Query(request) = match query {
            Ok(query) => query,
            Err(rejection) => {
                debug!(error = %rejection, "Malformed authorize request");
                return (
                    StatusCode::BAD_REQUEST,
                    Json(OAuth2Error::invalid_request(&rejection.body_text())),
                )
                    .into_response();
            }
        };

        let now = Utc::now();
        let subject = resources.authenticator.authenticate(&headers, now);
        match resources.engine.authorize(&request, subject, now).await {
            Ok(redirect) => found(&redirect.location),
            Err(AuthorizeError::Redirect { location, .. }) => found(&location),
            Err(AuthorizeError::Direct(error)) => {
                warn!(client_id = %request.client_id, error = %error, "Authorize request refused");
                let status = match error {
                    ProtocolError::StoreUnavailable { .. }
                    | ProtocolError::StoreFailure { .. }
                    | ProtocolError::Internal { .. } => status_of(&error),
                    _ => StatusCode::BAD_REQUEST,
                };
                (status, Json(OAuth2Error::from(&error))).into_response()
            }
        }
    }

    /// Handle a token request (POST /connect/token)
    async fn handle_token(
        State(resources): State<Arc<ServerResources>>,
        headers: HeaderMap,
        form: Result<Form<TokenRequest>, FormRejection>,
    ) -> Response {
        let Form(request) = match form {
            Ok(form) => form,
            Err(rejection) => return form_rejection(&rejection),
        };
        let credentials = match client_credentials(
            &headers,
            request.client_id.as_deref(),
            request.client_secret.as_deref(),
        ) {
            Ok(credentials) => credentials,
            Err(error) => return token_error(&error),
        };

        // A consumed code stays consumed even if the caller goes away, so the
        // exchange runs to completion on its own task.
        let engine = resources.engine.clone();
        let exchange =
            tokio::spawn(async move { engine.exchange(&request, &credentials, Utc::now()).await })
                .await;

        match exchange {
            Ok(Ok(response)) => (StatusCode::OK, NO_STORE, Json(response)).into_response(),
            Ok(Err(error)) => token_error(&error),
            Err(join_error) => {
                error!(error = %join_error, "Token exchange task failed");
                token_error(&ProtocolError::internal("token exchange task failed"))
            }
        }
    }

    /// Handle a userinfo request (GET or POST /connect/userinfo)
    async fn handle_userinfo(
        State(resources): State<Arc<ServerResources>>,
        headers: HeaderMap,
    ) -> Response {
        let Some(token) = bearer_token(&headers) else {
            return (
                StatusCode::UNAUTHORIZED,
                [(WWW_AUTHENTICATE, "Bearer")],
                Json(OAuth2Error::invalid_request("bearer access token required")),
            )
                .into_response();
        };

        match resources.engine.userinfo(token, Utc::now()).await {
            Ok(claims) => (StatusCode::OK, NO_STORE, Json(claims)).into_response(),
            Err(error @ ProtocolError::InvalidToken { .. }) => {
                debug!(error = %error, "Userinfo bearer token rejected");
                (
                    StatusCode::UNAUTHORIZED,
                    [(WWW_AUTHENTICATE, "Bearer error=\"invalid_token\"")],
                    Json(OAuth2Error::from(&error)),
                )
                    .into_response()
            }
            Err(error) => (status_of(&error), Json(OAuth2Error::from(&error))).into_response(),
        }
    }

    /// Handle a revocation request (POST /connect/revocation)
    async fn handle_revocation(
        State(resources): State<Arc<ServerResources>>,
        headers: HeaderMap,
        form: Result<Form<RevocationRequest>, FormRejection>,
    ) -> Response {
        let Form(request) = match form {
            Ok(form) => form,
            Err(rejection) => return form_rejection(&rejection),
        };
        let credentials = match client_credentials(
            &headers,
            request.client_id.as_deref(),
            request.client_secret.as_deref(),
        ) {
            Ok(credentials) => credentials,
            Err(error) => return token_error(&error),
        };

        match resources.engine.revoke(&request, &credentials).await {
            Ok(()) => (StatusCode::OK, NO_STORE).into_response(),
            Err(error) => token_error(&error),
        }
    }

    /// Handle the discovery document (GET /.well-known/openid-configuration)
    async fn handle_discovery(State(resources): State<Arc<ServerResources>>) -> Response {
        let engine = &resources.engine;
        let resources_result = async {
            let identity = engine.identity_resources().await?;
            let api = engine.api_resources().await?;
            Ok::<_, ProtocolError>((identity, api))
        }
        .await;

        match resources_result {
            Ok((identity, api)) => Json(DiscoveryDocument::new(
                engine.issuer().issuer(),
                &identity,
                &api,
            ))
            .into_response(),
            Err(error) => (status_of(&error), Json(OAuth2Error::from(&error))).into_response(),
        }
    }

    /// Handle the JWKS document (GET /.well-known/openid-configuration/jwks)
    async fn handle_jwks(State(resources): State<Arc<ServerResources>>) -> Response {
        let jwks = resources.keys.jwks(Utc::now());
        (
            [(CACHE_CONTROL, "public, max-age=300")],
            Json(jwks),
        )
            .into_response()
    }

    /// Handle the liveness probe (GET /health)
    async fn handle_health() -> Response {
        Json(json!({
            "status": "ok",
            "service": service_names::ARCH_IDP_SERVER,
            "version": env!("CARGO_PKG_VERSION"),
        }))
        .into_response()
    }
}

fn found(location: &str) -> Response {
    match HeaderValue::from_str(location) {
        Ok(location) => (StatusCode::FOUND, [(LOCATION, location)]).into_response(),
        Err(e) => {
            error!(error = %e, "Redirect location is not a valid header value");
            let error = ProtocolError::internal("redirect location unrepresentable");
            (status_of(&error), Json(OAuth2Error::from(&error))).into_response()
        }
    }
}

fn status_of(error: &ProtocolError) -> StatusCode {
    StatusCode::from_u16(error.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}

/// Token endpoint error body (RFC 6749 section 5.2)
fn token_error(error: &ProtocolError) -> Response {
    let status = status_of(error);
    if status.is_server_error() {
        error!(error = %error, "Token endpoint failure");
    } else {
        debug!(error = %error, "Token request rejected");
    }
    let mut response = (status, NO_STORE, Json(OAuth2Error::from(error))).into_response();
    if status == StatusCode::UNAUTHORIZED {
        response.headers_mut().insert(
            WWW_AUTHENTICATE,
            HeaderValue::from_static("Basic realm=\"arch-idp\""),
        );
    }
    response
}

fn form_rejection(rejection: &FormRejection) -> Response {
    debug!(error = %rejection, "Malformed form body");
    token_error(&ProtocolError::invalid_request(rejection.body_text()))
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// Client credentials from `Authorization: Basic` or the form body
///
/// Using both methods in one request is rejected (RFC 6749 section 2.3).
fn client_credentials(
    headers: &HeaderMap,
    body_client_id: Option<&str>,
    body_client_secret: Option<&str>,
) -> Result<ClientCredentials, ProtocolError> {
    let Some(basic) = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Basic "))
    else {
        return Ok(ClientCredentials {
            client_id: body_client_id.unwrap_or_default().to_owned(),
            client_secret: body_client_secret
                .filter(|secret| !secret.is_empty())
                .map(ToOwned::to_owned),
        });
    };

    if body_client_secret.is_some() {
        return Err(ProtocolError::invalid_request(
            "client authenticated with more than one method",
        ));
    }

    let malformed = || ProtocolError::invalid_request("malformed Basic authorization header");
    let decoded = STANDARD.decode(basic.trim()).map_err(|_| malformed())?;
    let decoded = String::from_utf8(decoded).map_err(|_| malformed())?;
    let (client_id, client_secret) = decoded.split_once(':').ok_or_else(malformed)?;
    let client_id = urlencoding::decode(client_id).map_err(|_| malformed())?;
    let client_secret = urlencoding::decode(client_secret).map_err(|_| malformed())?;

    if body_client_id.is_some_and(|body_id| body_id != client_id) {
        return Err(ProtocolError::invalid_request(
            "client_id in body does not match the Authorization header",
        ));
    }

    Ok(ClientCredentials {
        client_id: client_id.into_owned(),
        client_secret: Some(client_secret.into_owned()),
    })
}
