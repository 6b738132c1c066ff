// ABOUTME: Authorization code, refresh token family, and consent persistence for SQLite
// ABOUTME: Consumption and rotation are guarded single-statement state transitions
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

use super::{from_millis, from_optional_millis, to_millis, Database};
use crate::errors::StoreError;
use crate::store::{GrantStore, PurgeReport, StoreResult};
use arch_idp_core::models::{
    AuthorizationGrant, ConsentRecord, ConsumeOutcome, PkceChallenge, PkceMethod,
    RefreshTokenRecord, RefreshTokenStatus, RotateOutcome, ScopeSet,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::query::Query;
use sqlx::sqlite::{SqliteArguments, SqliteRow};
use sqlx::{Row, Sqlite};
use tracing::debug;
use uuid::Uuid;

const CODE_COLUMNS: &str = "code_hash, client_id, subject, scopes, redirect_uri, nonce, \
     code_challenge, code_challenge_method, auth_time, created_at, expires_at, consumed_at";

const REFRESH_COLUMNS: &str = "token_hash, family_id, generation, parent_hash, client_id, \
     subject, scopes, auth_time, created_at, expires_at, status";

fn code_from_row(row: &SqliteRow) -> StoreResult<AuthorizationGrant> {
    let challenge: Option<String> = row.try_get("code_challenge")?;
    let method: Option<String> = row.try_get("code_challenge_method")?;
    let pkce = match (challenge, method) {
        (Some(challenge), Some(method)) => Some(PkceChallenge {
            challenge,
            method: method
                .parse::<PkceMethod>()
                .map_err(|e| StoreError::corrupt("authorization_code", e))?,
        }),
        (None, None) => None,
        _ => {
            return Err(StoreError::corrupt(
                "authorization_code",
                "code_challenge without method",
            ))
        }
    };

    Ok(AuthorizationGrant {
        code_hash: row.try_get("code_hash")?,
        client_id: row.try_get("client_id")?,
        subject: row.try_get("subject")?,
        scopes: ScopeSet::parse(&row.try_get::<String, _>("scopes")?),
        redirect_uri: row.try_get("redirect_uri")?,
        nonce: row.try_get("nonce")?,
        pkce,
        auth_time: from_millis("authorization_code", row.try_get("auth_time")?)?,
        created_at: from_millis("authorization_code", row.try_get("created_at")?)?,
        expires_at: from_millis("authorization_code", row.try_get("expires_at")?)?,
        consumed_at: from_optional_millis("authorization_code", row.try_get("consumed_at")?)?,
    })
}

fn refresh_from_row(row: &SqliteRow) -> StoreResult<RefreshTokenRecord> {
    let family_id: String = row.try_get("family_id")?;
    let generation: i64 = row.try_get("generation")?;
    let status: String = row.try_get("status")?;

    Ok(RefreshTokenRecord {
        token_hash: row.try_get("token_hash")?,
        family_id: Uuid::parse_str(&family_id)
            .map_err(|e| StoreError::corrupt("refresh_token", format!("family_id: {e}")))?,
        generation: u32::try_from(generation)
            .map_err(|e| StoreError::corrupt("refresh_token", format!("generation: {e}")))?,
        parent_hash: row.try_get("parent_hash")?,
        client_id: row.try_get("client_id")?,
        subject: row.try_get("subject")?,
        scopes: ScopeSet::parse(&row.try_get::<String, _>("scopes")?),
        auth_time: from_millis("refresh_token", row.try_get("auth_time")?)?,
        created_at: from_millis("refresh_token", row.try_get("created_at")?)?,
        expires_at: from_millis("refresh_token", row.try_get("expires_at")?)?,
        status: status
            .parse::<RefreshTokenStatus>()
            .map_err(|e| StoreError::corrupt("refresh_token", e))?,
    })
}

fn consent_from_row(row: &SqliteRow) -> StoreResult<ConsentRecord> {
    Ok(ConsentRecord {
        subject: row.try_get("subject")?,
        client_id: row.try_get("client_id")?,
        scopes: ScopeSet::parse(&row.try_get::<String, _>("scopes")?),
        created_at: from_millis("consent", row.try_get("created_at")?)?,
        expires_at: from_optional_millis("consent", row.try_get("expires_at")?)?,
    })
}

const INSERT_REFRESH_SQL: &str = "INSERT INTO refresh_tokens (token_hash, family_id, generation, \
     parent_hash, client_id, subject, scopes, auth_time, created_at, expires_at, status) \
     VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)";

fn insert_refresh(record: &RefreshTokenRecord) -> Query<'_, Sqlite, SqliteArguments<'_>> {
    sqlx::query(INSERT_REFRESH_SQL)
        .bind(&record.token_hash)
        .bind(record.family_id.to_string())
        .bind(i64::from(record.generation))
        .bind(&record.parent_hash)
        .bind(&record.client_id)
        .bind(&record.subject)
        .bind(record.scopes.to_string())
        .bind(to_millis(record.auth_time))
        .bind(to_millis(record.created_at))
        .bind(to_millis(record.expires_at))
        .bind(record.status.as_str())
}

#[async_trait]
impl GrantStore for Database {
    async fn store_authorization_code(&self, grant: &AuthorizationGrant) -> StoreResult<()> {
        sqlx::query(&format!(
            "INSERT INTO authorization_codes ({CODE_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)"
        ))
        .bind(&grant.code_hash)
        .bind(&grant.client_id)
        .bind(&grant.subject)
        .bind(grant.scopes.to_string())
        .bind(&grant.redirect_uri)
        .bind(&grant.nonce)
        .bind(grant.pkce.as_ref().map(|p| p.challenge.clone()))
        .bind(grant.pkce.as_ref().map(|p| p.method.as_str()))
        .bind(to_millis(grant.auth_time))
        .bind(to_millis(grant.created_at))
        .bind(to_millis(grant.expires_at))
        .bind(grant.consumed_at.map(to_millis))
        .execute(self.pool())
        .await?;
        Ok(())
    }

    async fn consume_authorization_code(
        &self,
        code_hash: &str,
        client_id: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<ConsumeOutcome> {
        let now_millis = to_millis(now);

        // Exactly one concurrent caller can match `consumed_at IS NULL`
        let consumed = sqlx::query(&format!(
            "UPDATE authorization_codes SET consumed_at = $1 \
             WHERE code_hash = $2 AND client_id = $3 \
               AND consumed_at IS NULL AND expires_at > $1 \
             RETURNING {CODE_COLUMNS}"
        ))
        .bind(now_millis)
        .bind(code_hash)
        .bind(client_id)
        .fetch_optional(self.pool())
        .await?;

        if let Some(row) = consumed {
            return Ok(ConsumeOutcome::Consumed(code_from_row(&row)?));
        }

        let existing = sqlx::query(&format!(
            "SELECT {CODE_COLUMNS} FROM authorization_codes WHERE code_hash = $1"
        ))
        .bind(code_hash)
        .fetch_optional(self.pool())
        .await?;

        let outcome = match existing.as_ref().map(code_from_row).transpose()? {
            None => ConsumeOutcome::NotFound,
            Some(grant) if grant.client_id != client_id => ConsumeOutcome::ClientMismatch,
            Some(grant) if grant.is_expired_at(now) => ConsumeOutcome::Expired,
            Some(_) => ConsumeOutcome::AlreadyConsumed,
        };
        Ok(outcome)
    }

    async fn store_refresh_token(&self, record: &RefreshTokenRecord) -> StoreResult<()> {
        insert_refresh(record).execute(self.pool()).await?;
        Ok(())
    }

    async fn find_refresh_token(
        &self,
        token_hash: &str,
    ) -> StoreResult<Option<RefreshTokenRecord>> {
        let row = sqlx::query(&format!(
            "SELECT {REFRESH_COLUMNS} FROM refresh_tokens WHERE token_hash = $1"
        ))
        .bind(token_hash)
        .fetch_optional(self.pool())
        .await?;

        row.as_ref().map(refresh_from_row).transpose()
    }

    async fn rotate_refresh_token(
        &self,
        token_hash: &str,
        client_id: &str,
        successor_hash: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<RotateOutcome> {
        let mut tx = self.pool().begin().await?;

        // Writing first takes the database write lock for the whole transaction
        let rotated = sqlx::query(&format!(
            "UPDATE refresh_tokens SET status = 'rotated' \
             WHERE token_hash = $1 AND client_id = $2 \
               AND status = 'active' AND expires_at > $3 \
             RETURNING {REFRESH_COLUMNS}"
        ))
        .bind(token_hash)
        .bind(client_id)
        .bind(to_millis(now))
        .fetch_optional(&mut *tx)
        .await?;

        if let Some(row) = rotated {
            let previous = refresh_from_row(&row)?;
            let successor = previous.successor(successor_hash.to_owned(), now);
            insert_refresh(&successor).execute(&mut *tx).await?;
            tx.commit().await?;
            return Ok(RotateOutcome::Rotated { previous });
        }

        let existing = sqlx::query(&format!(
            "SELECT {REFRESH_COLUMNS} FROM refresh_tokens WHERE token_hash = $1"
        ))
        .bind(token_hash)
        .fetch_optional(&mut *tx)
        .await?;

        let outcome = match existing.as_ref().map(refresh_from_row).transpose()? {
            None => RotateOutcome::NotFound,
            Some(record) if record.client_id != client_id => RotateOutcome::ClientMismatch,
            Some(record) => match record.status {
                RefreshTokenStatus::Revoked => RotateOutcome::Revoked,
                RefreshTokenStatus::Rotated => {
                    let result = sqlx::query(
                        "UPDATE refresh_tokens SET status = 'revoked' \
                         WHERE family_id = $1 AND status != 'revoked'",
                    )
                    .bind(record.family_id.to_string())
                    .execute(&mut *tx)
                    .await?;
                    RotateOutcome::Reused {
                        family_id: record.family_id,
                        generation: record.generation,
                        revoked: result.rows_affected(),
                    }
                }
                // Still active, so the guarded update missed on expiry
                RefreshTokenStatus::Active => RotateOutcome::Expired,
            },
        };

        tx.commit().await?;
        Ok(outcome)
    }

    async fn revoke_family(&self, family_id: Uuid) -> StoreResult<u64> {
        let result = sqlx::query(
            "UPDATE refresh_tokens SET status = 'revoked' \
             WHERE family_id = $1 AND status != 'revoked'",
        )
        .bind(family_id.to_string())
        .execute(self.pool())
        .await?;
        Ok(result.rows_affected())
    }

    async fn store_consent(&self, consent: &ConsentRecord) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO consents (subject, client_id, scopes, created_at, expires_at) \
             VALUES ($1, $2, $3, $4, $5) \
             ON CONFLICT(subject, client_id) DO UPDATE SET \
                scopes = excluded.scopes, \
                created_at = excluded.created_at, \
                expires_at = excluded.expires_at",
        )
        .bind(&consent.subject)
        .bind(&consent.client_id)
        .bind(consent.scopes.to_string())
        .bind(to_millis(consent.created_at))
        .bind(consent.expires_at.map(to_millis))
        .execute(self.pool())
        .await?;
        Ok(())
    }

    async fn find_consent(
        &self,
        subject: &str,
        client_id: &str,
    ) -> StoreResult<Option<ConsentRecord>> {
        let row = sqlx::query(
            "SELECT subject, client_id, scopes, created_at, expires_at \
             FROM consents WHERE subject = $1 AND client_id = $2",
        )
        .bind(subject)
        .bind(client_id)
        .fetch_optional(self.pool())
        .await?;

        row.as_ref().map(consent_from_row).transpose()
    }

    async fn purge_expired(&self, cutoff: DateTime<Utc>) -> StoreResult<PurgeReport> {
        let cutoff_millis = to_millis(cutoff);
        let mut tx = self.pool().begin().await?;

        let codes = sqlx::query("DELETE FROM authorization_codes WHERE expires_at <= $1")
            .bind(cutoff_millis)
            .execute(&mut *tx)
            .await?;
        let tokens = sqlx::query("DELETE FROM refresh_tokens WHERE expires_at <= $1")
            .bind(cutoff_millis)
            .execute(&mut *tx)
            .await?;
        let consents = sqlx::query(
            "DELETE FROM consents WHERE expires_at IS NOT NULL AND expires_at <= $1",
        )
        .bind(cutoff_millis)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        let report = PurgeReport {
            authorization_codes: codes.rows_affected(),
            refresh_tokens: tokens.rows_affected(),
            consents: consents.rows_affected(),
        };
        debug!(
            codes = report.authorization_codes,
            refresh_tokens = report.refresh_tokens,
            consents = report.consents,
            "Purged expired grants"
        );
        Ok(report)
    }
}
