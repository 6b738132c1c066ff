// ABOUTME: Typestate model of the authorization flow from request to issued tokens
// ABOUTME: Requested -> AuthorizationGranted -> CodeIssued -> Exchanged -> TokensIssued, enforced at compile time
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

use std::collections::BTreeSet;
use std::fmt::{Display, Formatter, Result as FmtResult};

use arch_idp_core::models::{AuthorizationGrant, GrantType, PkceChallenge, ScopeSet};
use url::{form_urlencoded, Url};

use super::models::TokenResponse;
use super::subject::AuthenticatedSubject;
use crate::constants::oauth::response_types;
use crate::errors::ProtocolError;

// ============================================================================
// Response Types and Modes
// ============================================================================

/// Supported `response_type` values
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseType {
    /// Authorization code
    Code,
    /// Implicit access token
    Token,
    /// Implicit identity token
    IdToken,
    /// Implicit identity token and access token
    IdTokenToken,
}

impl ResponseType {
    /// Parse a space-delimited `response_type` (order-insensitive)
    ///
    /// # Errors
    ///
    /// Returns `UnsupportedResponseType` for any other combination
    pub fn parse(raw: &str) -> Result<Self, ProtocolError> {
        let parts: BTreeSet<&str> = raw.split_whitespace().collect();
        let parts: Vec<&str> = parts.into_iter().collect();
        match parts.as_slice() {
            [response_types::CODE] => Ok(Self::Code),
            [response_types::TOKEN] => Ok(Self::Token),
            [response_types::ID_TOKEN] => Ok(Self::IdToken),
            [response_types::ID_TOKEN, response_types::TOKEN] => Ok(Self::IdTokenToken),
            _ => Err(ProtocolError::UnsupportedResponseType {
                response_type: raw.to_owned(),
            }),
        }
    }

    /// Grant type the client must be registered for
    #[must_use]
    pub const fn grant_type(self) -> GrantType {
        match self {
            Self::Code => GrantType::AuthorizationCode,
            Self::Token | Self::IdToken | Self::IdTokenToken => GrantType::Implicit,
        }
    }

    /// Whether tokens are returned from the authorize endpoint directly
    #[must_use]
    pub const fn is_implicit(self) -> bool {
        !matches!(self, Self::Code)
    }

    /// Whether an access token is part of the response
    #[must_use]
    pub const fn issues_access_token(self) -> bool {
        matches!(self, Self::Token | Self::IdTokenToken)
    }

    /// Whether an identity token is part of the response
    #[must_use]
    pub const fn issues_identity_token(self) -> bool {
        matches!(self, Self::IdToken | Self::IdTokenToken)
    }

    /// Wire identifier
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Code => response_types::CODE,
            Self::Token => response_types::TOKEN,
            Self::IdToken => response_types::ID_TOKEN,
            Self::IdTokenToken => response_types::ID_TOKEN_TOKEN,
        }
    }
}

impl Display for ResponseType {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

/// Where authorize response parameters are placed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseMode {
    /// Query component (authorization code only)
    Query,
    /// Fragment component
    Fragment,
}

impl ResponseMode {
    /// Resolve the requested mode for `response_type`
    ///
    /// Tokens are never placed in the query component.
    ///
    /// # Errors
    ///
    /// Returns `InvalidRequest` for an unknown mode or query-mode tokens
    pub fn resolve(requested: Option<&str>, response_type: ResponseType) -> Result<Self, ProtocolError> {
        match (requested, response_type.is_implicit()) {
            (None, false) | (Some("query"), false) => Ok(Self::Query),
            (None | Some("fragment"), _) => Ok(Self::Fragment),
            (Some("query"), true) => Err(ProtocolError::invalid_request(
                "response_mode=query is not allowed when tokens are returned",
            )),
            (Some(other), _) => Err(ProtocolError::invalid_request(format!(
                "unsupported response_mode '{other}'"
            ))),
        }
    }

    /// Default mode for `response_type`, used for error redirects
    #[must_use]
    pub const fn default_for(response_type: Option<ResponseType>) -> Self {
        match response_type {
            Some(ResponseType::Token | ResponseType::IdToken | ResponseType::IdTokenToken) => {
                Self::Fragment
            }
            Some(ResponseType::Code) | None => Self::Query,
        }
    }
}

/// Append `params` to `redirect_uri` in the query or fragment component
///
/// # Errors
///
/// Returns `Internal` if the registered redirect URI does not parse
pub fn redirect_with(
    redirect_uri: &str,
    mode: ResponseMode,
    params: &[(&str, &str)],
) -> Result<String, ProtocolError> {
    let mut url = Url::parse(redirect_uri)
        .map_err(|e| ProtocolError::internal(format!("registered redirect URI unparseable: {e}")))?;
    match mode {
        ResponseMode::Query => {
            url.query_pairs_mut().extend_pairs(params);
        }
        ResponseMode::Fragment => {
            let fragment = form_urlencoded::Serializer::new(String::new())
                .extend_pairs(params)
                .finish();
            url.set_fragment(Some(&fragment));
        }
    }
    Ok(url.into())
}

// ============================================================================
// State Marker Types
// ============================================================================

/// An authorize request that passed validation
#[derive(Debug, Clone)]
pub struct ValidatedAuthorization {
    /// Client identifier
    pub client_id: String,
    /// Registered redirect URI (exact match)
    pub redirect_uri: String,
    /// Requested response type
    pub response_type: ResponseType,
    /// Parameter placement
    pub response_mode: ResponseMode,
    /// Requested scopes, all allowed for the client
    pub scopes: ScopeSet,
    /// Opaque client state echoed back
    pub state: Option<String>,
    /// OIDC nonce
    pub nonce: Option<String>,
    /// PKCE binding
    pub pkce: Option<PkceChallenge>,
}

/// Requested: the request is valid but no subject is attached yet
/// Valid transitions: -> `AuthorizationGranted`
#[derive(Debug)]
pub struct Requested;

/// `AuthorizationGranted`: an authenticated subject approved the request
/// Valid transitions: -> `CodeIssued` (code flow), -> `TokensIssued` (implicit)
#[derive(Debug)]
pub struct AuthorizationGranted {
    subject: AuthenticatedSubject,
}

/// `CodeIssued`: a single-use code was stored and is about to be delivered
/// Terminal on the authorize side; the token endpoint resumes at `Exchanged`
#[derive(Debug)]
pub struct CodeIssued {
    code: String,
}

/// Exchanged: the code was consumed by exactly this request
/// Valid transitions: -> `TokensIssued`
#[derive(Debug)]
pub struct Exchanged {
    grant: AuthorizationGrant,
}

/// `TokensIssued`: tokens were minted
#[derive(Debug)]
pub struct TokensIssued {
    response: TokenResponse,
}

// ============================================================================
// Authorization Flow with Typestate
// ============================================================================

/// Server-side authorization flow with compile-time state transitions
///
/// Transitions consume `self`, so a code can only be issued once per flow
/// and tokens can only be issued from a granted or exchanged flow.
#[derive(Debug)]
pub struct AuthorizationFlow<State> {
    request: ValidatedAuthorization,
    state: State,
}

impl AuthorizationFlow<Requested> {
    /// Start a flow from a validated request
    #[must_use]
    pub const fn new(request: ValidatedAuthorization) -> Self {
        Self {
            request,
            state: Requested,
        }
    }

    /// Attach the authenticated subject who approved the request
    #[must_use]
    pub fn grant(self, subject: AuthenticatedSubject) -> AuthorizationFlow<AuthorizationGranted> {
        AuthorizationFlow {
            request: self.request,
            state: AuthorizationGranted { subject },
        }
    }
}

impl AuthorizationFlow<AuthorizationGranted> {
    /// The approving subject
    #[must_use]
    pub const fn subject(&self) -> &AuthenticatedSubject {
        &self.state.subject
    }

    /// Record the issued code
    #[must_use]
    pub fn issue_code(self, code: String) -> AuthorizationFlow<CodeIssued> {
        AuthorizationFlow {
            request: self.request,
            state: CodeIssued { code },
        }
    }

    /// Record tokens minted directly at the authorize endpoint (implicit)
    #[must_use]
    pub fn issue_tokens(self, response: TokenResponse) -> AuthorizationFlow<TokensIssued> {
        AuthorizationFlow {
            request: self.request,
            state: TokensIssued { response },
        }
    }
}

impl AuthorizationFlow<CodeIssued> {
    /// Redirect carrying `code` and `state`
    ///
    /// # Errors
    ///
    /// Returns `Internal` if the redirect URI does not parse
    pub fn redirect_location(&self) -> Result<String, ProtocolError> {
        let mut params = vec![("code", self.state.code.as_str())];
        if let Some(state) = &self.request.state {
            params.push(("state", state));
        }
        redirect_with(&self.request.redirect_uri, self.request.response_mode, &params)
    }
}

impl AuthorizationFlow<Exchanged> {
    /// Resume at the token endpoint from a consumed grant
    #[must_use]
    pub fn from_grant(grant: AuthorizationGrant) -> Self {
        Self {
            request: ValidatedAuthorization {
                client_id: grant.client_id.clone(),
                redirect_uri: grant.redirect_uri.clone(),
                response_type: ResponseType::Code,
                response_mode: ResponseMode::Query,
                scopes: grant.scopes.clone(),
                state: None,
                nonce: grant.nonce.clone(),
                pkce: grant.pkce.clone(),
            },
            state: Exchanged { grant },
        }
    }

    /// The consumed grant
    #[must_use]
    pub const fn grant(&self) -> &AuthorizationGrant {
        &self.state.grant
    }

    /// Record the tokens minted for the exchange
    #[must_use]
    pub fn issue_tokens(self, response: TokenResponse) -> AuthorizationFlow<TokensIssued> {
        AuthorizationFlow {
            request: self.request,
            state: TokensIssued { response },
        }
    }
}

impl AuthorizationFlow<TokensIssued> {
    /// Redirect carrying the tokens in the fragment (implicit)
    ///
    /// # Errors
    ///
    /// Returns `Internal` if the redirect URI does not parse
    pub fn redirect_location(&self) -> Result<String, ProtocolError> {
        let response = &self.state.response;
        let expires_in = response.expires_in.to_string();
        let mut params = Vec::new();
        if self.request.response_type.issues_access_token() {
            params.push(("access_token", response.access_token.as_str()));
            params.push(("token_type", response.token_type.as_str()));
            params.push(("expires_in", expires_in.as_str()));
        }
        if let Some(id_token) = &response.id_token {
            params.push(("id_token", id_token));
        }
        params.push(("scope", response.scope.as_str()));
        if let Some(state) = &self.request.state {
            params.push(("state", state));
        }
        redirect_with(&self.request.redirect_uri, self.request.response_mode, &params)
    }

    /// Token endpoint body
    #[must_use]
    pub fn into_response(self) -> TokenResponse {
        self.state.response
    }
}

impl<State> AuthorizationFlow<State> {
    /// The validated request
    #[must_use]
    pub const fn request(&self) -> &ValidatedAuthorization {
        &self.request
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn request(response_type: ResponseType) -> ValidatedAuthorization {
        ValidatedAuthorization {
            client_id: "web-app".to_owned(),
            redirect_uri: "https://app.example.com/callback".to_owned(),
            response_type,
            response_mode: ResponseMode::resolve(None, response_type).unwrap(),
            scopes: ScopeSet::parse("openid profile"),
            state: Some("xyz 1".to_owned()),
            nonce: Some("n-1".to_owned()),
            pkce: None,
        }
    }

    fn subject() -> AuthenticatedSubject {
        AuthenticatedSubject {
            subject: "alice".to_owned(),
            auth_time: Utc::now(),
            consented_scopes: None,
        }
    }

    #[test]
    fn test_response_type_parsing_is_order_insensitive() {
        assert_eq!(ResponseType::parse("code").unwrap(), ResponseType::Code);
        assert_eq!(
            ResponseType::parse("token id_token").unwrap(),
            ResponseType::IdTokenToken
        );
        assert!(matches!(
            ResponseType::parse("code token"),
            Err(ProtocolError::UnsupportedResponseType { .. })
        ));
    }

    #[test]
    fn test_tokens_never_go_in_the_query() {
        assert!(ResponseMode::resolve(Some("query"), ResponseType::Token).is_err());
        assert_eq!(
            ResponseMode::resolve(None, ResponseType::IdToken).unwrap(),
            ResponseMode::Fragment
        );
    }

    #[test]
    fn test_code_redirect_uses_query_and_echoes_state() {
        let location = AuthorizationFlow::new(request(ResponseType::Code))
            .grant(subject())
            .issue_code("abc".to_owned())
            .redirect_location()
            .unwrap();
        assert_eq!(
            location,
            "https://app.example.com/callback?code=abc&state=xyz+1"
        );
    }

    #[test]
    fn test_implicit_redirect_uses_fragment() {
        let flow = AuthorizationFlow::new(request(ResponseType::IdTokenToken))
            .grant(subject())
            .issue_tokens(TokenResponse {
                access_token: "at".to_owned(),
                token_type: "Bearer".to_owned(),
                expires_in: 3600,
                scope: "openid profile".to_owned(),
                id_token: Some("it".to_owned()),
                refresh_token: None,
            });
        let location = flow.redirect_location().unwrap();
        let url = Url::parse(&location).unwrap();
        assert!(url.query().is_none());
        let fragment = url.fragment().unwrap();
        assert!(fragment.contains("access_token=at"));
        assert!(fragment.contains("id_token=it"));
        assert!(fragment.contains("state=xyz+1"));
    }
}
