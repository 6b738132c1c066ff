// ABOUTME: Protocol engine validating authorize, token, userinfo, and revocation requests
// ABOUTME: Drives the authorization flow typestate and maps every failure to an OAuth 2.0 error
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

//! Protocol Engine
//!
//! Authorize requests are validated in a fixed order. Failures about the
//! client or the redirect URI are shown to the user agent directly; every
//! later failure is delivered to the registered redirect URI. Token requests
//! authenticate the client first, then dispatch on the grant type.

use super::client_registry::{ClientCredentials, ClientRegistry};
use super::flow::{
    redirect_with, AuthorizationFlow, AuthorizationGranted, ResponseMode, ResponseType,
    ValidatedAuthorization,
};
use super::grants::{GrantManager, NewAuthorizationCode};
use super::models::{AuthorizeRequest, RevocationRequest, TokenRequest, TokenResponse};
use super::pkce;
use super::subject::{AuthenticatedSubject, ProfileProvider};
use super::token_issuer::{IdentityTokenRequest, IssuedToken, TokenIssuer};
use crate::constants::oauth::{scopes, TOKEN_TYPE_BEARER};
use crate::errors::ProtocolError;
use crate::keys::SigningKeyManager;
use crate::logging::AppLogger;
use crate::store::{ResourceStore, StorePolicy, Stores};
use arch_idp_core::models::{
    ApiResource, Client, ConsumeOutcome, GrantType, IdentityResource, RefreshTokenStatus, ScopeSet,
};
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Successful authorize response: where to send the user agent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationRedirect {
    /// `Location` header value
    pub location: String,
}

/// Failed authorize request
#[derive(Debug)]
pub enum AuthorizeError {
    /// Shown to the user agent; the redirect URI is not trusted
    Direct(ProtocolError),
    /// Delivered to the client's registered redirect URI
    Redirect {
        /// `Location` header value carrying `error`
        location: String,
        /// Underlying failure
        error: ProtocolError,
    },
}

impl AuthorizeError {
    /// Underlying protocol failure
    #[must_use]
    pub const fn error(&self) -> &ProtocolError {
        match self {
            Self::Direct(error) | Self::Redirect { error, .. } => error,
        }
    }
}

/// Who and what a set of tokens is minted for
#[derive(Debug, Clone, Copy)]
struct Issuance<'a> {
    client: &'a Client,
    subject: &'a str,
    scopes: &'a ScopeSet,
    nonce: Option<&'a str>,
    auth_time: DateTime<Utc>,
}

/// Tokens minted for one response
struct MintedTokens {
    access: IssuedToken,
    identity: Option<IssuedToken>,
}

/// The OpenID Connect / OAuth 2.0 protocol engine
pub struct ProtocolEngine {
    clients: ClientRegistry,
    grants: GrantManager,
    issuer: TokenIssuer,
    resources: Arc<dyn ResourceStore>,
    profiles: Arc<dyn ProfileProvider>,
    policy: StorePolicy,
}

impl ProtocolEngine {
    /// Wire the engine over its storage capabilities and signing keys
    #[must_use]
    pub fn new(
        issuer_url: impl Into<String>,
        stores: &Stores,
        keys: Arc<SigningKeyManager>,
        profiles: Arc<dyn ProfileProvider>,
        policy: StorePolicy,
    ) -> Self {
        Self {
            clients: ClientRegistry::new(stores.clients.clone(), policy),
            grants: GrantManager::new(stores.grants.clone(), policy),
            issuer: TokenIssuer::new(issuer_url, keys),
            resources: stores.resources.clone(),
            profiles,
            policy,
        }
    }

    /// Client registry
    #[must_use]
    pub const fn clients(&self) -> &ClientRegistry {
        &self.clients
    }

    /// Grant manager
    #[must_use]
    pub const fn grants(&self) -> &GrantManager {
        &self.grants
    }

    /// Token issuer
    #[must_use]
    pub const fn issuer(&self) -> &TokenIssuer {
        &self.issuer
    }

    /// Identity resources, falling back to the standard set when none are provisioned
    ///
    /// # Errors
    ///
    /// Returns a store error if the lookup fails
    pub async fn identity_resources(&self) -> Result<Vec<IdentityResource>, ProtocolError> {
        let resources = self
            .policy
            .run("list_identity_resources", || {
                self.resources.list_identity_resources()
            })
            .await?;
        if resources.is_empty() {
            return Ok(IdentityResource::standard_set());
        }
        Ok(resources)
    }

    /// Provisioned API resources
    ///
    /// # Errors
    ///
    /// Returns a store error if the lookup fails
    pub async fn api_resources(&self) -> Result<Vec<ApiResource>, ProtocolError> {
        self.policy
            .run("list_api_resources", || self.resources.list_api_resources())
            .await
    }

    // ========================================================================
    // Authorize
    // ========================================================================

    /// Process an authorize request for an (optionally) authenticated subject
    ///
    /// # Errors
    ///
    /// Returns `AuthorizeError::Direct` for client and redirect URI failures
    /// and `AuthorizeError::Redirect` for everything detected afterwards
    pub async fn authorize(
        &self,
        request: &AuthorizeRequest,
        subject: Option<AuthenticatedSubject>,
        now: DateTime<Utc>,
    ) -> Result<AuthorizationRedirect, AuthorizeError> {
        let client = self
            .clients
            .lookup(&request.client_id)
            .await
            .map_err(AuthorizeError::Direct)?;

        let response_type = ResponseType::parse(&request.response_type);
        let parsed_type = response_type.as_ref().ok().copied();
        if let Some(response_type) = parsed_type {
            if !client.allows_grant(response_type.grant_type()) {
                return Err(AuthorizeError::Direct(ProtocolError::UnauthorizedClient {
                    client_id: client.client_id,
                    grant: response_type.to_string(),
                }));
            }
        }

        if !ClientRegistry::validate_redirect_uri(&client, &request.redirect_uri) {
            AppLogger::log_security_event(
                "redirect_uri_mismatch",
                "medium",
                "authorize request redirect_uri is not registered",
                &client.client_id,
            );
            return Err(AuthorizeError::Direct(ProtocolError::RedirectMismatch {
                client_id: client.client_id,
            }));
        }

        match self
            .authorize_validated(&client, request, response_type, subject, now)
            .await
        {
            Ok(location) => Ok(AuthorizationRedirect { location }),
            Err(error) => Err(Self::error_redirect(request, parsed_type, error)),
        }
    }

    async fn authorize_validated(
        &self,
        client: &Client,
        request: &AuthorizeRequest,
        response_type: Result<ResponseType, ProtocolError>,
        subject: Option<AuthenticatedSubject>,
        now: DateTime<Utc>,
    ) -> Result<String, ProtocolError> {
        let response_type = response_type?;
        let response_mode = ResponseMode::resolve(request.response_mode.as_deref(), response_type)?;

        let requested = ScopeSet::parse(request.scope.as_deref().unwrap_or_default());
        if requested.is_empty() {
            return Err(ProtocolError::ScopeDenied {
                scope: String::new(),
            });
        }
        let denied = requested.difference(&client.allowed_scopes);
        if !denied.is_empty() {
            return Err(ProtocolError::ScopeDenied {
                scope: denied.to_string(),
            });
        }

        let pkce = pkce::parse_challenge(
            request.code_challenge.as_deref(),
            request.code_challenge_method.as_deref(),
        )?;
        if response_type == ResponseType::Code
            && pkce.is_none()
            && (client.require_pkce || !client.is_confidential())
        {
            return Err(ProtocolError::invalid_request(
                "code_challenge is required for this client",
            ));
        }
        if response_type.issues_identity_token() {
            if !requested.contains(scopes::OPENID) {
                return Err(ProtocolError::invalid_request(
                    "id_token response requires the openid scope",
                ));
            }
            if request.nonce.is_none() {
                return Err(ProtocolError::invalid_request(
                    "nonce is required when an id_token is returned from the authorize endpoint",
                ));
            }
        }

        let subject = subject.ok_or(ProtocolError::LoginRequired)?;
        self.check_consent(client, &subject, &requested, now).await?;

        let flow = AuthorizationFlow::new(ValidatedAuthorization {
            client_id: client.client_id.clone(),
            redirect_uri: request.redirect_uri.clone(),
            response_type,
            response_mode,
            scopes: requested,
            state: request.state.clone(),
            nonce: request.nonce.clone(),
            pkce,
        })
        .grant(subject);

        if response_type.is_implicit() {
            let response = self.implicit_tokens(client, &flow, now).await?;
            return flow.issue_tokens(response).redirect_location();
        }

        let validated = flow.request();
        let code = self
            .grants
            .create_authorization_code(
                NewAuthorizationCode {
                    client,
                    subject: &flow.subject().subject,
                    scopes: &validated.scopes,
                    redirect_uri: &validated.redirect_uri,
                    nonce: validated.nonce.as_deref(),
                    pkce: validated.pkce.clone(),
                    auth_time: flow.subject().auth_time,
                },
                now,
            )
            .await?;
        info!(
            client_id = %client.client_id,
            scopes = %validated.scopes,
            "Authorization code issued"
        );
        flow.issue_code(code).redirect_location()
    }

    async fn check_consent(
        &self,
        client: &Client,
        subject: &AuthenticatedSubject,
        requested: &ScopeSet,
        now: DateTime<Utc>,
    ) -> Result<(), ProtocolError> {
        if !client.require_consent {
            return Ok(());
        }
        if let Some(consented) = &subject.consented_scopes {
            if requested.is_subset(consented) {
                return self
                    .grants
                    .record_consent(&subject.subject, &client.client_id, requested, now)
                    .await;
            }
        }
        if self
            .grants
            .has_consent(&subject.subject, &client.client_id, requested, now)
            .await?
        {
            return Ok(());
        }
        debug!(client_id = %client.client_id, "Consent required");
        Err(ProtocolError::ConsentRequired {
            client_id: client.client_id.clone(),
        })
    }

    async fn implicit_tokens(
        &self,
        client: &Client,
        flow: &AuthorizationFlow<AuthorizationGranted>,
        now: DateTime<Utc>,
    ) -> Result<TokenResponse, ProtocolError> {
        let request = flow.request();
        let subject = flow.subject();
        let issuance = Issuance {
            client,
            subject: &subject.subject,
            scopes: &request.scopes,
            nonce: request.nonce.as_deref(),
            auth_time: subject.auth_time,
        };
        let tokens = self
            .mint(issuance, request.response_type.issues_identity_token(), now)
            .await?;
        AppLogger::log_tokens_issued(
            &client.client_id,
            GrantType::Implicit.as_str(),
            Some(&subject.subject),
            &tokens.access.kid,
        );
        let mut response = Self::token_response(tokens, &request.scopes, None);
        if !request.response_type.issues_access_token() {
            response.access_token.clear();
        }
        Ok(response)
    }

    fn error_redirect(
        request: &AuthorizeRequest,
        response_type: Option<ResponseType>,
        error: ProtocolError,
    ) -> AuthorizeError {
        if !error.is_redirectable() {
            return AuthorizeError::Direct(error);
        }
        let mode = response_type
            .and_then(|rt| ResponseMode::resolve(request.response_mode.as_deref(), rt).ok())
            .unwrap_or_else(|| ResponseMode::default_for(response_type));
        let description = error.public_description();
        let mut params = vec![
            ("error", error.oauth_error_code()),
            ("error_description", description.as_str()),
        ];
        if let Some(state) = &request.state {
            params.push(("state", state));
        }
        match redirect_with(&request.redirect_uri, mode, &params) {
            Ok(location) => {
                debug!(error = %error, "Authorize request rejected");
                AuthorizeError::Redirect { location, error }
            }
            Err(redirect_error) => AuthorizeError::Direct(redirect_error),
        }
    }

    // ========================================================================
    // Token
    // ========================================================================

    /// Process a token request for the presented client credentials
    ///
    /// # Errors
    ///
    /// Returns the `ProtocolError` describing the first failed check
    pub async fn exchange(
        &self,
        request: &TokenRequest,
        credentials: &ClientCredentials,
        now: DateTime<Utc>,
    ) -> Result<TokenResponse, ProtocolError> {
        let client = self.clients.authenticate(credentials).await?;

        let grant_type = request
            .grant_type
            .parse::<GrantType>()
            .ok()
            .filter(|grant| *grant != GrantType::Implicit)
            .ok_or_else(|| ProtocolError::UnsupportedGrantType {
                grant_type: request.grant_type.clone(),
            })?;
        if !client.allows_grant(grant_type) {
            return Err(ProtocolError::UnauthorizedClient {
                client_id: client.client_id,
                grant: grant_type.to_string(),
            });
        }

        match grant_type {
            GrantType::AuthorizationCode => self.exchange_code(&client, request, now).await,
            GrantType::ClientCredentials => {
                self.exchange_client_credentials(&client, request, now).await
            }
            GrantType::RefreshToken => self.exchange_refresh_token(&client, request, now).await,
            GrantType::Implicit => Err(ProtocolError::UnsupportedGrantType {
                grant_type: request.grant_type.clone(),
            }),
        }
    }

    async fn exchange_code(
        &self,
        client: &Client,
        request: &TokenRequest,
        now: DateTime<Utc>,
    ) -> Result<TokenResponse, ProtocolError> {
        let code = request
            .code
            .as_deref()
            .filter(|code| !code.is_empty())
            .ok_or_else(|| ProtocolError::invalid_request("code is required"))?;

        let grant = match self
            .grants
            .consume_authorization_code(code, &client.client_id, now)
            .await?
        {
            ConsumeOutcome::Consumed(grant) => grant,
            ConsumeOutcome::Expired => return Err(ProtocolError::GrantExpired),
            ConsumeOutcome::AlreadyConsumed => {
                warn!(client_id = %client.client_id, "Authorization code replayed");
                return Err(ProtocolError::GrantAlreadyConsumed);
            }
            ConsumeOutcome::NotFound => return Err(ProtocolError::GrantNotFound),
            ConsumeOutcome::ClientMismatch => {
                return Err(ProtocolError::GrantMismatch {
                    reason: "authorization code was issued to another client",
                })
            }
        };

        let flow = AuthorizationFlow::from_grant(grant);
        let grant = flow.grant();
        if request.redirect_uri.as_deref() != Some(grant.redirect_uri.as_str()) {
            return Err(ProtocolError::GrantMismatch {
                reason: "redirect_uri does not match the authorization request",
            });
        }
        pkce::verify(grant.pkce.as_ref(), request.code_verifier.as_deref())?;

        let issuance = Issuance {
            client,
            subject: &grant.subject,
            scopes: &grant.scopes,
            nonce: grant.nonce.as_deref(),
            auth_time: grant.auth_time,
        };
        let tokens = self
            .mint(issuance, TokenIssuer::wants_identity_token(&grant.scopes), now)
            .await?;
        let refresh_token = if Self::offline_access_granted(client, &grant.scopes) {
            Some(
                self.grants
                    .issue_refresh_token(client, &grant.subject, &grant.scopes, grant.auth_time, now)
                    .await?,
            )
        } else {
            None
        };

        AppLogger::log_tokens_issued(
            &client.client_id,
            GrantType::AuthorizationCode.as_str(),
            Some(&grant.subject),
            &tokens.access.kid,
        );
        let response = Self::token_response(tokens, &grant.scopes, refresh_token);
        Ok(flow.issue_tokens(response).into_response())
    }

    async fn exchange_client_credentials(
        &self,
        client: &Client,
        request: &TokenRequest,
        now: DateTime<Utc>,
    ) -> Result<TokenResponse, ProtocolError> {
        if !client.is_confidential() {
            return Err(ProtocolError::UnauthorizedClient {
                client_id: client.client_id.clone(),
                grant: GrantType::ClientCredentials.to_string(),
            });
        }

        let available = self.machine_scopes(client).await?;
        let scopes = match request.scope.as_deref().map(ScopeSet::parse) {
            Some(requested) if !requested.is_empty() => {
                let denied = requested.difference(&available);
                if !denied.is_empty() {
                    return Err(ProtocolError::ScopeDenied {
                        scope: denied.to_string(),
                    });
                }
                requested
            }
            _ => available,
        };

        let access = self
            .issuer
            .issue_access_token(&client.client_id, client, &scopes, now)?;
        AppLogger::log_tokens_issued(
            &client.client_id,
            GrantType::ClientCredentials.as_str(),
            None,
            &access.kid,
        );
        Ok(Self::token_response(
            MintedTokens {
                access,
                identity: None,
            },
            &scopes,
            None,
        ))
    }

    /// Allowed scopes that make sense without an end-user
    async fn machine_scopes(&self, client: &Client) -> Result<ScopeSet, ProtocolError> {
        let identity = self.identity_resources().await?;
        let mut available = client.allowed_scopes.clone();
        available.remove(scopes::OFFLINE_ACCESS);
        for resource in &identity {
            available.remove(&resource.name);
        }
        Ok(available)
    }

    async fn exchange_refresh_token(
        &self,
        client: &Client,
        request: &TokenRequest,
        now: DateTime<Utc>,
    ) -> Result<TokenResponse, ProtocolError> {
        let token = request
            .refresh_token
            .as_deref()
            .filter(|token| !token.is_empty())
            .ok_or_else(|| ProtocolError::invalid_request("refresh_token is required"))?;

        let record = self
            .grants
            .find_refresh_token(token)
            .await?
            .ok_or(ProtocolError::GrantNotFound)?;
        if record.client_id != client.client_id {
            AppLogger::log_security_event(
                "refresh_token_client_mismatch",
                "high",
                "refresh token presented by a client it was not issued to",
                &client.client_id,
            );
            return Err(ProtocolError::GrantMismatch {
                reason: "refresh token was issued to another client",
            });
        }

        // Narrowing is allowed; widening never is, and leaves the token untouched.
        let requested = request
            .scope
            .as_deref()
            .map(ScopeSet::parse)
            .filter(|requested| !requested.is_empty());
        let scopes = match requested {
            Some(requested) if record.status == RefreshTokenStatus::Active => {
                let escalated = requested.difference(&record.scopes);
                if !escalated.is_empty() {
                    warn!(
                        client_id = %client.client_id,
                        family_id = %record.family_id,
                        escalated = %escalated,
                        "Refresh token scope escalation refused"
                    );
                    return Err(ProtocolError::ScopeDenied {
                        scope: escalated.to_string(),
                    });
                }
                requested
            }
            _ => record.scopes.clone(),
        };

        let effective = scopes
            .intersection(&record.scopes)
            .intersection(&client.allowed_scopes);

        // Mint first: a failure here must leave the presented token active.
        // Tokens minted for a token that then fails rotation are dropped.
        let issuance = Issuance {
            client,
            subject: &record.subject,
            scopes: &effective,
            nonce: None,
            auth_time: record.auth_time,
        };
        let tokens = self
            .mint(issuance, TokenIssuer::wants_identity_token(&effective), now)
            .await?;
        let rotated = self
            .grants
            .rotate_refresh_token(token, &client.client_id, now)
            .await?;
        AppLogger::log_tokens_issued(
            &client.client_id,
            GrantType::RefreshToken.as_str(),
            Some(&rotated.previous.subject),
            &tokens.access.kid,
        );
        Ok(Self::token_response(tokens, &effective, Some(rotated.token)))
    }

    fn offline_access_granted(client: &Client, granted: &ScopeSet) -> bool {
        client.allow_offline_access
            && client.allows_grant(GrantType::RefreshToken)
            && granted.contains(scopes::OFFLINE_ACCESS)
    }

    async fn mint(
        &self,
        issuance: Issuance<'_>,
        with_identity: bool,
        now: DateTime<Utc>,
    ) -> Result<MintedTokens, ProtocolError> {
        let access =
            self.issuer
                .issue_access_token(issuance.subject, issuance.client, issuance.scopes, now)?;
        if !with_identity {
            return Ok(MintedTokens {
                access,
                identity: None,
            });
        }

        let profile = self.profiles.profile(issuance.subject).await?;
        let identity_resources = self.identity_resources().await?;
        let identity = self.issuer.issue_identity_token(
            IdentityTokenRequest {
                profile: &profile,
                client: issuance.client,
                scopes: issuance.scopes,
                identity_resources: &identity_resources,
                nonce: issuance.nonce,
                auth_time: issuance.auth_time,
                access_token: Some(&access.token),
            },
            now,
        )?;
        Ok(MintedTokens {
            access,
            identity: Some(identity),
        })
    }

    fn token_response(
        tokens: MintedTokens,
        scopes: &ScopeSet,
        refresh_token: Option<String>,
    ) -> TokenResponse {
        TokenResponse {
            expires_in: tokens.access.expires_in(),
            access_token: tokens.access.token,
            token_type: TOKEN_TYPE_BEARER.to_owned(),
            scope: scopes.to_string(),
            id_token: tokens.identity.map(|identity| identity.token),
            refresh_token,
        }
    }

    // ========================================================================
    // Userinfo and Revocation
    // ========================================================================

    /// Claims for the subject of a bearer access token
    ///
    /// # Errors
    ///
    /// Returns `InvalidToken` if the token fails verification or was not
    /// issued with the `openid` scope
    pub async fn userinfo(
        &self,
        access_token: &str,
        now: DateTime<Utc>,
    ) -> Result<Map<String, Value>, ProtocolError> {
        let claims = self.issuer.verify_access_token(access_token, None, now)?;
        let granted = claims.scopes();
        if !granted.contains(scopes::OPENID) {
            return Err(ProtocolError::InvalidToken {
                reason: "token was not issued for the openid scope".to_owned(),
            });
        }
        let profile = self.profiles.profile(&claims.sub).await?;
        let identity_resources = self.identity_resources().await?;
        Ok(TokenIssuer::userinfo_claims(
            &profile,
            &granted,
            &identity_resources,
        ))
    }

    /// Revoke a refresh token family (RFC 7009)
    ///
    /// Unknown tokens succeed silently. Access tokens are self-contained and
    /// expire on their own.
    ///
    /// # Errors
    ///
    /// Returns `ClientError` if the client fails authentication,
    /// `InvalidRequest` for an empty token, or a store error
    pub async fn revoke(
        &self,
        request: &RevocationRequest,
        credentials: &ClientCredentials,
    ) -> Result<(), ProtocolError> {
        let client = self.clients.authenticate(credentials).await?;
        if request.token.is_empty() {
            return Err(ProtocolError::invalid_request("token is required"));
        }
        let revoked = self
            .grants
            .revoke_refresh_token(&request.token, &client.client_id)
            .await?;
        info!(
            client_id = %client.client_id,
            revoked,
            hint = request.token_type_hint.as_deref().unwrap_or("none"),
            "Token revocation processed"
        );
        Ok(())
    }
}
