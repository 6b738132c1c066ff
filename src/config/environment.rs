// ABOUTME: Environment configuration management for deployment-specific settings
// ABOUTME: Resolves the injected ServerConfig from environment variables at process start
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

//! Environment-based configuration management
//!
//! Every secret and connection setting is read here once and passed down
//! by constructor injection. Nothing else in the crate reads the process
//! environment.

use crate::constants::{defaults, env_vars, lifetimes, MIN_SIGNING_KEY_BITS};
use crate::errors::{AppError, AppResult};
use arch_idp_core::models::TokenLifetimes;
use http::HeaderName;
use std::env;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::{info, warn};
use url::Url;

/// Strongly typed log level configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogLevel {
    /// Errors only
    Error,
    /// Warnings and errors
    Warn,
    /// Informational
    #[default]
    Info,
    /// Debugging
    Debug,
    /// Everything
    Trace,
}

impl LogLevel {
    /// Convert to `tracing::Level`
    #[must_use]
    pub const fn to_tracing_level(self) -> tracing::Level {
        match self {
            Self::Error => tracing::Level::ERROR,
            Self::Warn => tracing::Level::WARN,
            Self::Info => tracing::Level::INFO,
            Self::Debug => tracing::Level::DEBUG,
            Self::Trace => tracing::Level::TRACE,
        }
    }

    /// Parse from string with fallback
    #[must_use]
    pub fn from_str_or_default(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "error" => Self::Error,
            "warn" => Self::Warn,
            "debug" => Self::Debug,
            "trace" => Self::Trace,
            _ => Self::Info,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Error => "error",
            Self::Warn => "warn",
            Self::Info => "info",
            Self::Debug => "debug",
            Self::Trace => "trace",
        };
        f.write_str(name)
    }
}

/// Deployment environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Environment {
    /// Local development: developer signing credential allowed
    #[default]
    Development,
    /// Production: key material must be configured
    Production,
    /// Automated tests
    Testing,
}

impl Environment {
    /// Parse from string with fallback
    #[must_use]
    pub fn from_str_or_default(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "production" | "prod" => Self::Production,
            "testing" | "test" => Self::Testing,
            _ => Self::Development,
        }
    }

    /// Check if this is a production environment
    #[must_use]
    pub const fn is_production(self) -> bool {
        matches!(self, Self::Production)
    }

    /// Whether a signing key may be generated on the fly
    #[must_use]
    pub const fn allows_developer_signing_key(self) -> bool {
        !self.is_production()
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Development => "development",
            Self::Production => "production",
            Self::Testing => "testing",
        };
        f.write_str(name)
    }
}

/// Type-safe database location
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatabaseUrl {
    /// `SQLite` database file
    SQLite {
        /// File path
        path: PathBuf,
    },
    /// In-memory `SQLite` (for testing)
    Memory,
}

impl DatabaseUrl {
    /// Parse from string with validation
    ///
    /// # Errors
    ///
    /// Returns an error for URL schemes this build has no adapter for
    pub fn parse_url(s: &str) -> AppResult<Self> {
        if let Some(path_str) = s.strip_prefix("sqlite:") {
            if path_str == ":memory:" {
                Ok(Self::Memory)
            } else {
                Ok(Self::SQLite {
                    path: PathBuf::from(path_str.trim_start_matches("//")),
                })
            }
        } else if s.contains("://") {
            Err(AppError::config(format!(
                "Unsupported database URL scheme in '{}'; expected sqlite:<path>",
                s.split("://").next().unwrap_or_default()
            )))
        } else {
            Ok(Self::SQLite {
                path: PathBuf::from(s),
            })
        }
    }

    /// Convert to connection string
    #[must_use]
    pub fn to_connection_string(&self) -> String {
        match self {
            Self::SQLite { path } => format!("sqlite:{}", path.display()),
            Self::Memory => "sqlite::memory:".to_owned(),
        }
    }

    /// Check if this is an in-memory database
    #[must_use]
    pub const fn is_memory(&self) -> bool {
        matches!(self, Self::Memory)
    }
}

impl Default for DatabaseUrl {
    fn default() -> Self {
        Self::SQLite {
            path: PathBuf::from("./data/arch-idp.db"),
        }
    }
}

impl fmt::Display for DatabaseUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_connection_string())
    }
}

/// Database configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Database location
    pub url: DatabaseUrl,
    /// Run migrations at startup
    pub auto_migrate: bool,
}

/// Signing key configuration
#[derive(Debug, Clone)]
pub struct SigningConfig {
    /// PEM file with the production signing key
    pub key_path: Option<PathBuf>,
    /// RSA modulus size for generated keys
    pub key_bits: usize,
    /// Days between scheduled rotations
    pub rotation_days: i64,
    /// Verification overlap for retired keys, in seconds
    pub overlap_secs: i64,
}

/// Store timeout and retry policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StorePolicyConfig {
    /// Per-attempt timeout in milliseconds
    pub timeout_ms: u64,
    /// Attempts for retryable failures
    pub max_retries: u32,
    /// Base backoff in milliseconds, doubled per attempt
    pub backoff_ms: u64,
}

impl Default for StorePolicyConfig {
    fn default() -> Self {
        Self {
            timeout_ms: defaults::STORE_TIMEOUT_MS,
            max_retries: defaults::STORE_MAX_RETRIES,
            backoff_ms: defaults::STORE_BACKOFF_MS,
        }
    }
}

/// How the authorize endpoint learns who the end-user is
#[derive(Debug, Clone)]
pub struct AuthenticationConfig {
    /// Header set by the trusted login service
    pub subject_header: String,
    /// Header carrying freshly consented scopes
    pub consent_header: String,
}

/// External login provider credentials
#[derive(Clone)]
pub struct ExternalProviderConfig {
    /// OAuth client id at the provider
    pub client_id: String,
    /// OAuth client secret at the provider
    pub client_secret: String,
}

impl fmt::Debug for ExternalProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExternalProviderConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .finish()
    }
}

/// External login providers exposed to the login service
#[derive(Debug, Clone, Default)]
pub struct ExternalProvidersConfig {
    /// Google sign-in
    pub google: Option<ExternalProviderConfig>,
}

/// Complete server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// HTTP listen port
    pub http_port: u16,
    /// HTTP listen address
    pub host: String,
    /// Public issuer URL
    pub issuer_url: String,
    /// Deployment environment
    pub environment: Environment,
    /// Log level
    pub log_level: LogLevel,
    /// Database configuration
    pub database: DatabaseConfig,
    /// Lifetimes given to provisioned clients that do not set their own
    pub token_defaults: TokenLifetimes,
    /// Signing key settings
    pub signing: SigningConfig,
    /// Store timeout and retry policy
    pub store: StorePolicyConfig,
    /// Subject authentication collaborator settings
    pub authentication: AuthenticationConfig,
    /// External login providers
    pub external_providers: ExternalProvidersConfig,
    /// Interval of the maintenance task in seconds
    pub maintenance_interval_secs: u64,
    /// Provisioning seed file
    pub seed_config_path: PathBuf,
}

impl ServerConfig {
    /// Load configuration from environment variables
    ///
    /// # Errors
    ///
    /// Returns an error if a variable cannot be parsed or the result is inconsistent
    pub fn from_env() -> AppResult<Self> {
        info!("Loading configuration from environment variables");

        let environment = Environment::from_str_or_default(&env_var_or(
            env_vars::ENVIRONMENT,
            "development",
        ));
        let http_port: u16 = parse_env(env_vars::HTTP_PORT, defaults::HTTP_PORT)?;
        let host = env_var_or(env_vars::HOST, defaults::HOST);
        let issuer_url = env::var(env_vars::ISSUER_URL)
            .unwrap_or_else(|_| format!("http://{host}:{http_port}"))
            .trim_end_matches('/')
            .to_owned();

        let config = Self {
            http_port,
            host,
            issuer_url,
            environment,
            log_level: LogLevel::from_str_or_default(&env_var_or(env_vars::LOG_LEVEL, "info")),
            database: DatabaseConfig {
                url: DatabaseUrl::parse_url(&env_var_or(
                    env_vars::DATABASE_URL,
                    defaults::DATABASE_URL,
                ))?,
                auto_migrate: parse_env(env_vars::AUTO_MIGRATE, true)?,
            },
            token_defaults: Self::token_defaults_from_env()?,
            signing: SigningConfig {
                key_path: env::var(env_vars::SIGNING_KEY_PATH).ok().map(PathBuf::from),
                key_bits: parse_env(env_vars::SIGNING_KEY_BITS, defaults::SIGNING_KEY_BITS)?,
                rotation_days: parse_env(env_vars::KEY_ROTATION_DAYS, defaults::KEY_ROTATION_DAYS)?,
                overlap_secs: parse_env(env_vars::KEY_OVERLAP_SECS, defaults::KEY_OVERLAP_SECS)?,
            },
            store: StorePolicyConfig {
                timeout_ms: parse_env(env_vars::STORE_TIMEOUT_MS, defaults::STORE_TIMEOUT_MS)?,
                max_retries: parse_env(env_vars::STORE_MAX_RETRIES, defaults::STORE_MAX_RETRIES)?,
                backoff_ms: parse_env(env_vars::STORE_BACKOFF_MS, defaults::STORE_BACKOFF_MS)?,
            },
            authentication: AuthenticationConfig {
                subject_header: env_var_or(
                    env_vars::AUTH_SUBJECT_HEADER,
                    defaults::AUTH_SUBJECT_HEADER,
                )
                .to_lowercase(),
                consent_header: env_var_or(
                    env_vars::AUTH_CONSENT_HEADER,
                    defaults::AUTH_CONSENT_HEADER,
                )
                .to_lowercase(),
            },
            external_providers: ExternalProvidersConfig {
                google: external_provider_from_env(
                    env_vars::GOOGLE_CLIENT_ID,
                    env_vars::GOOGLE_CLIENT_SECRET,
                )?,
            },
            maintenance_interval_secs: parse_env(
                env_vars::MAINTENANCE_INTERVAL_SECS,
                defaults::MAINTENANCE_INTERVAL_SECS,
            )?,
            seed_config_path: PathBuf::from(env_var_or(
                env_vars::SEED_CONFIG_PATH,
                defaults::SEED_CONFIG_PATH,
            )),
        };

        config.validate()?;
        info!("Configuration loaded successfully");
        Ok(config)
    }

    fn token_defaults_from_env() -> AppResult<TokenLifetimes> {
        let fallback = TokenLifetimes::default();
        Ok(TokenLifetimes {
            access_token_secs: parse_env(
                env_vars::ACCESS_TOKEN_LIFETIME_SECS,
                fallback.access_token_secs,
            )?,
            identity_token_secs: parse_env(
                env_vars::IDENTITY_TOKEN_LIFETIME_SECS,
                fallback.identity_token_secs,
            )?,
            authorization_code_secs: parse_env(
                env_vars::AUTHORIZATION_CODE_LIFETIME_SECS,
                fallback.authorization_code_secs,
            )?,
            refresh_token_secs: parse_env(
                env_vars::REFRESH_TOKEN_LIFETIME_SECS,
                fallback.refresh_token_secs,
            )?,
        })
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns an error describing the first inconsistent setting
    pub fn validate(&self) -> AppResult<()> {
        let issuer = Url::parse(&self.issuer_url)
            .map_err(|e| AppError::config(format!("ISSUER_URL is not a valid URL: {e}")))?;
        if issuer.query().is_some() || issuer.fragment().is_some() {
            return Err(AppError::config(
                "ISSUER_URL must not contain a query or fragment",
            ));
        }
        if self.environment.is_production() && issuer.scheme() != "https" {
            return Err(AppError::config("ISSUER_URL must use https in production"));
        }

        if self.signing.key_bits < MIN_SIGNING_KEY_BITS {
            return Err(AppError::config(format!(
                "SIGNING_KEY_BITS must be at least {MIN_SIGNING_KEY_BITS}"
            )));
        }
        if self.signing.rotation_days <= 0
            || self.signing.rotation_days > lifetimes::MAX_SECS / 86_400
        {
            return Err(AppError::config(
                "KEY_ROTATION_DAYS must be positive and at most ten years",
            ));
        }
        let token_defaults = self.token_defaults;
        if [
            token_defaults.access_token_secs,
            token_defaults.identity_token_secs,
            token_defaults.authorization_code_secs,
            token_defaults.refresh_token_secs,
            self.signing.overlap_secs,
        ]
        .iter()
        .any(|secs| *secs <= 0 || *secs > lifetimes::MAX_SECS)
        {
            return Err(AppError::config(format!(
                "Token lifetimes and KEY_OVERLAP_SECS must be between 1 and {} seconds",
                lifetimes::MAX_SECS
            )));
        }
        let longest = self.token_defaults.longest_signed_token_secs();
        if self.signing.overlap_secs < longest {
            return Err(AppError::config(format!(
                "KEY_OVERLAP_SECS ({}) must cover the longest token lifetime ({longest}s)",
                self.signing.overlap_secs
            )));
        }

        if self.store.timeout_ms == 0 || self.store.max_retries == 0 {
            return Err(AppError::config(
                "STORE_TIMEOUT_MS and STORE_MAX_RETRIES must be positive",
            ));
        }

        for header in [
            &self.authentication.subject_header,
            &self.authentication.consent_header,
        ] {
            HeaderName::from_str(header)
                .map_err(|_| AppError::config(format!("'{header}' is not a valid header name")))?;
        }

        if self.environment.is_production() && self.signing.key_path.is_none() {
            warn!("SIGNING_KEY_PATH is not set; startup requires persisted signing keys");
        }

        Ok(())
    }

    /// Store policy as durations
    #[must_use]
    pub const fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store.timeout_ms)
    }

    /// Get a summary of the configuration for logging (without secrets)
    #[must_use]
    pub fn summary(&self) -> String {
        format!(
            "Arch IdP Configuration:\n\
             - Issuer: {}\n\
             - Listen: {}:{}\n\
             - Environment: {}\n\
             - Log Level: {}\n\
             - Database: {}\n\
             - Signing Key: {}\n\
             - Key Rotation: every {} days, {}s overlap\n\
             - Store Policy: {}ms timeout, {} attempts\n\
             - Google Login: {}",
            self.issuer_url,
            self.host,
            self.http_port,
            self.environment,
            self.log_level,
            if self.database.url.is_memory() {
                "SQLite (memory)"
            } else {
                "SQLite (file)"
            },
            if self.signing.key_path.is_some() {
                "configured PEM"
            } else {
                "persisted/generated"
            },
            self.signing.rotation_days,
            self.signing.overlap_secs,
            self.store.timeout_ms,
            self.store.max_retries,
            if self.external_providers.google.is_some() {
                "Enabled"
            } else {
                "Disabled"
            },
        )
    }
}

/// Get environment variable or default value
fn env_var_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_owned())
}

/// Parse an environment variable, falling back to `default` when unset
fn parse_env<T>(key: &str, default: T) -> AppResult<T>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    env::var(key).map_or(Ok(default), |raw| {
        raw.trim()
            .parse()
            .map_err(|e| AppError::config(format!("Invalid {key} value '{raw}': {e}")))
    })
}

/// Both halves of a provider credential must be present, or neither
fn external_provider_from_env(
    id_key: &str,
    secret_key: &str,
) -> AppResult<Option<ExternalProviderConfig>> {
    match (env::var(id_key).ok(), env::var(secret_key).ok()) {
        (Some(client_id), Some(client_secret)) => Ok(Some(ExternalProviderConfig {
            client_id,
            client_secret,
        })),
        (None, None) => Ok(None),
        _ => Err(AppError::config(format!(
            "{id_key} and {secret_key} must be set together"
        ))),
    }
}
