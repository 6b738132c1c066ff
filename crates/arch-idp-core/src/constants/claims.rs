// ABOUTME: JWT and OpenID Connect standard claim names
// ABOUTME: Shared by the token issuer, userinfo endpoint, and identity resource definitions
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

/// Subject identifier
pub const SUBJECT: &str = "sub";
/// Full name
pub const NAME: &str = "name";
/// Given name
pub const GIVEN_NAME: &str = "given_name";
/// Family name
pub const FAMILY_NAME: &str = "family_name";
/// Middle name
pub const MIDDLE_NAME: &str = "middle_name";
/// Casual name
pub const NICKNAME: &str = "nickname";
/// Shorthand login name
pub const PREFERRED_USERNAME: &str = "preferred_username";
/// Profile page URL
pub const PROFILE: &str = "profile";
/// Profile picture URL
pub const PICTURE: &str = "picture";
/// Web page URL
pub const WEBSITE: &str = "website";
/// Gender
pub const GENDER: &str = "gender";
/// Birthday
pub const BIRTHDATE: &str = "birthdate";
/// Time zone
pub const ZONEINFO: &str = "zoneinfo";
/// Locale
pub const LOCALE: &str = "locale";
/// Last profile update time
pub const UPDATED_AT: &str = "updated_at";
/// Email address
pub const EMAIL: &str = "email";
/// Whether the email address was verified
pub const EMAIL_VERIFIED: &str = "email_verified";

/// Claims released by the `profile` scope (OIDC Core 5.4)
pub const PROFILE_SCOPE_CLAIMS: &[&str] = &[
    NAME,
    FAMILY_NAME,
    GIVEN_NAME,
    MIDDLE_NAME,
    NICKNAME,
    PREFERRED_USERNAME,
    PROFILE,
    PICTURE,
    WEBSITE,
    GENDER,
    BIRTHDATE,
    ZONEINFO,
    LOCALE,
    UPDATED_AT,
];

/// Claims released by the `email` scope (OIDC Core 5.4)
pub const EMAIL_SCOPE_CLAIMS: &[&str] = &[EMAIL, EMAIL_VERIFIED];
