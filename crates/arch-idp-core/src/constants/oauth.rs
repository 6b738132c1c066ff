// ABOUTME: OAuth 2.0 and OpenID Connect protocol identifiers
// ABOUTME: Grant types, response types, standard scopes, and error codes used on the wire
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

/// Grant type identifiers (RFC 6749)
pub mod grant_types {
    /// Authorization code grant
    pub const AUTHORIZATION_CODE: &str = "authorization_code";
    /// Implicit grant (front-channel tokens)
    pub const IMPLICIT: &str = "implicit";
    /// Client credentials grant
    pub const CLIENT_CREDENTIALS: &str = "client_credentials";
    /// Refresh token grant
    pub const REFRESH_TOKEN: &str = "refresh_token";
}

/// Response type identifiers
pub mod response_types {
    /// Authorization code
    pub const CODE: &str = "code";
    /// Implicit access token
    pub const TOKEN: &str = "token";
    /// Implicit identity token
    pub const ID_TOKEN: &str = "id_token";
    /// Implicit identity token and access token
    pub const ID_TOKEN_TOKEN: &str = "id_token token";
}

/// Standard scopes
pub mod scopes {
    /// Marks an OpenID Connect request
    pub const OPENID: &str = "openid";
    /// Default profile claims
    pub const PROFILE: &str = "profile";
    /// Email claims
    pub const EMAIL: &str = "email";
    /// Requests a refresh token
    pub const OFFLINE_ACCESS: &str = "offline_access";
}

/// Error codes from RFC 6749 section 4.1.2.1 / 5.2 and OIDC Core 3.1.2.6
pub mod errors {
    /// Malformed request
    pub const INVALID_REQUEST: &str = "invalid_request";
    /// Client authentication failed
    pub const INVALID_CLIENT: &str = "invalid_client";
    /// Grant invalid, expired, revoked or already used
    pub const INVALID_GRANT: &str = "invalid_grant";
    /// Requested scope exceeds what is allowed
    pub const INVALID_SCOPE: &str = "invalid_scope";
    /// Client not permitted to use this grant or response type
    pub const UNAUTHORIZED_CLIENT: &str = "unauthorized_client";
    /// Grant type not supported by the server
    pub const UNSUPPORTED_GRANT_TYPE: &str = "unsupported_grant_type";
    /// Response type not supported by the server
    pub const UNSUPPORTED_RESPONSE_TYPE: &str = "unsupported_response_type";
    /// Resource owner or server denied the request
    pub const ACCESS_DENIED: &str = "access_denied";
    /// End-user consent is required
    pub const CONSENT_REQUIRED: &str = "consent_required";
    /// End-user authentication is required
    pub const LOGIN_REQUIRED: &str = "login_required";
    /// Unexpected server condition
    pub const SERVER_ERROR: &str = "server_error";
    /// Transient overload or maintenance
    pub const TEMPORARILY_UNAVAILABLE: &str = "temporarily_unavailable";
    /// Bearer token rejected by a protected resource (RFC 6750)
    pub const INVALID_TOKEN: &str = "invalid_token";
}

/// Token type returned by the token endpoint
pub const TOKEN_TYPE_BEARER: &str = "Bearer";

/// JWS algorithm used for every issued token
pub const SIGNING_ALGORITHM: &str = "RS256";

/// JWT `typ` header for access tokens (RFC 9068)
pub const ACCESS_TOKEN_JWT_TYPE: &str = "at+jwt";

/// PKCE challenge method accepted by the server
pub const PKCE_METHOD_S256: &str = "S256";

/// Minimum PKCE verifier length (RFC 7636 section 4.1)
pub const PKCE_VERIFIER_MIN_LEN: usize = 43;

/// Maximum PKCE verifier length (RFC 7636 section 4.1)
pub const PKCE_VERIFIER_MAX_LEN: usize = 128;
