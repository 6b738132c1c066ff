// ABOUTME: SQLite persistence adapter for clients, grants, resources, and signing keys
// ABOUTME: Owns the connection pool and the schema migrations run at startup
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

//! # Database Management
//!
//! `SQLite` implementation of the storage capabilities in [`crate::store`].
//! Timestamps are stored as UTC milliseconds so expiry comparisons happen
//! inside the guarded `UPDATE` statements that make consumption and rotation
//! atomic.

mod clients;
mod grants;
mod resources;
mod signing_keys;

use crate::config::DatabaseUrl;
use crate::errors::{AppError, AppResult, StoreError};
use crate::store::StoreResult;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;
use std::time::Duration;
use tokio::fs;
use tracing::info;

/// Busy handler budget before `SQLITE_BUSY` is surfaced as retryable
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Database manager for the identity provider tables
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open (creating if missing) the database at `url`
    ///
    /// In-memory databases use a single connection so every query sees the
    /// same database.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established
    pub async fn new(url: &DatabaseUrl) -> AppResult<Self> {
        if let DatabaseUrl::SQLite { path } = url {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent).await.map_err(|e| {
                    AppError::database(format!("Failed to create database directory: {e}"))
                })?;
            }
        }

        let connection_string = url.to_connection_string();
        let options = SqliteConnectOptions::from_str(&connection_string)
            .map_err(|e| AppError::config(format!("Invalid database URL: {e}")))?
            .create_if_missing(true)
            .busy_timeout(BUSY_TIMEOUT);

        let (options, max_connections) = if url.is_memory() {
            (options, 1)
        } else {
            (options.journal_mode(SqliteJournalMode::Wal), 8)
        };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .map_err(|e| AppError::database(format!("Failed to open database: {e}")))?;

        info!(database = %url, "Database connection established");
        Ok(Self { pool })
    }

    /// Get a reference to the database pool for advanced operations
    #[must_use]
    pub const fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Run database migrations
    ///
    /// Every statement is idempotent; running it from several instances at
    /// once is safe.
    ///
    /// # Errors
    ///
    /// Returns an error if a schema statement fails
    pub async fn migrate(&self) -> AppResult<()> {
        self.migrate_configuration().await?;
        self.migrate_operational().await?;
        info!("Database migrations complete");
        Ok(())
    }

    /// Clients, identity resources, API resources
    async fn migrate_configuration(&self) -> AppResult<()> {
        for statement in [
            r"
            CREATE TABLE IF NOT EXISTS clients (
                client_id TEXT PRIMARY KEY,
                client_name TEXT,
                secret_hash TEXT,
                require_client_secret INTEGER NOT NULL,
                allowed_grant_types TEXT NOT NULL,
                redirect_uris TEXT NOT NULL,
                allowed_scopes TEXT NOT NULL,
                access_token_lifetime_secs INTEGER NOT NULL,
                identity_token_lifetime_secs INTEGER NOT NULL,
                authorization_code_lifetime_secs INTEGER NOT NULL,
                refresh_token_lifetime_secs INTEGER NOT NULL,
                allow_offline_access INTEGER NOT NULL,
                require_pkce INTEGER NOT NULL,
                require_consent INTEGER NOT NULL,
                enabled INTEGER NOT NULL DEFAULT 1,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            )
            ",
            r"
            CREATE TABLE IF NOT EXISTS identity_resources (
                name TEXT PRIMARY KEY,
                display_name TEXT,
                claims TEXT NOT NULL,
                required INTEGER NOT NULL DEFAULT 0,
                enabled INTEGER NOT NULL DEFAULT 1
            )
            ",
            r"
            CREATE TABLE IF NOT EXISTS api_resources (
                name TEXT PRIMARY KEY,
                display_name TEXT,
                scopes TEXT NOT NULL,
                enabled INTEGER NOT NULL DEFAULT 1
            )
            ",
        ] {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|e| AppError::database(format!("Configuration migration failed: {e}")))?;
        }
        Ok(())
    }

    /// Codes, refresh tokens, consents, signing keys
    async fn migrate_operational(&self) -> AppResult<()> {
        for statement in [
            r"
            CREATE TABLE IF NOT EXISTS authorization_codes (
                code_hash TEXT PRIMARY KEY,
                client_id TEXT NOT NULL,
                subject TEXT NOT NULL,
                scopes TEXT NOT NULL,
                redirect_uri TEXT NOT NULL,
                nonce TEXT,
                code_challenge TEXT,
                code_challenge_method TEXT,
                auth_time INTEGER NOT NULL,
                created_at INTEGER NOT NULL,
                expires_at INTEGER NOT NULL,
                consumed_at INTEGER
            )
            ",
            "CREATE INDEX IF NOT EXISTS idx_authorization_codes_expires_at ON authorization_codes(expires_at)",
            r"
            CREATE TABLE IF NOT EXISTS refresh_tokens (
                token_hash TEXT PRIMARY KEY,
                family_id TEXT NOT NULL,
                generation INTEGER NOT NULL,
                parent_hash TEXT,
                client_id TEXT NOT NULL,
                subject TEXT NOT NULL,
                scopes TEXT NOT NULL,
                auth_time INTEGER NOT NULL,
                created_at INTEGER NOT NULL,
                expires_at INTEGER NOT NULL,
                status TEXT NOT NULL CHECK (status IN ('active', 'rotated', 'revoked'))
            )
            ",
            "CREATE INDEX IF NOT EXISTS idx_refresh_tokens_family ON refresh_tokens(family_id)",
            "CREATE INDEX IF NOT EXISTS idx_refresh_tokens_expires_at ON refresh_tokens(expires_at)",
            r"
            CREATE TABLE IF NOT EXISTS consents (
                subject TEXT NOT NULL,
                client_id TEXT NOT NULL,
                scopes TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                expires_at INTEGER,
                PRIMARY KEY (subject, client_id)
            )
            ",
            r"
            CREATE TABLE IF NOT EXISTS signing_keys (
                kid TEXT PRIMARY KEY,
                algorithm TEXT NOT NULL,
                private_key_pem TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                retired_at INTEGER,
                verify_until INTEGER
            )
            ",
        ] {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|e| AppError::database(format!("Operational migration failed: {e}")))?;
        }
        Ok(())
    }
}

/// Encode a timestamp column
fn to_millis(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

/// Decode a timestamp column
fn from_millis(entity: &'static str, millis: i64) -> StoreResult<DateTime<Utc>> {
    DateTime::from_timestamp_millis(millis)
        .ok_or_else(|| StoreError::corrupt(entity, format!("timestamp {millis} out of range")))
}

/// Decode a nullable timestamp column
fn from_optional_millis(
    entity: &'static str,
    millis: Option<i64>,
) -> StoreResult<Option<DateTime<Utc>>> {
    millis.map(|m| from_millis(entity, m)).transpose()
}
