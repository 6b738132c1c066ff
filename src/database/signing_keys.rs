// ABOUTME: Signing key persistence for SQLite
// ABOUTME: Keeps the active key and retired keys until their verification window closes
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

use super::{from_millis, from_optional_millis, to_millis, Database};
use crate::store::{SigningKeyStore, StoreResult};
use arch_idp_core::models::SigningKeyRecord;
use async_trait::async_trait;
use sqlx::Row;

#[async_trait]
impl SigningKeyStore for Database {
    async fn save_signing_key(&self, record: &SigningKeyRecord) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO signing_keys (kid, algorithm, private_key_pem, created_at, retired_at, verify_until) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             ON CONFLICT(kid) DO UPDATE SET \
                retired_at = excluded.retired_at, \
                verify_until = excluded.verify_until",
        )
        .bind(&record.kid)
        .bind(&record.algorithm)
        .bind(&record.private_key_pem)
        .bind(to_millis(record.created_at))
        .bind(record.retired_at.map(to_millis))
        .bind(record.verify_until.map(to_millis))
        .execute(self.pool())
        .await?;
        Ok(())
    }

    async fn load_signing_keys(&self) -> StoreResult<Vec<SigningKeyRecord>> {
        let rows = sqlx::query(
            "SELECT kid, algorithm, private_key_pem, created_at, retired_at, verify_until \
             FROM signing_keys ORDER BY created_at DESC",
        )
        .fetch_all(self.pool())
        .await?;

        rows.iter()
            .map(|row| {
                Ok(SigningKeyRecord {
                    kid: row.try_get("kid")?,
                    algorithm: row.try_get("algorithm")?,
                    private_key_pem: row.try_get("private_key_pem")?,
                    created_at: from_millis("signing_key", row.try_get("created_at")?)?,
                    retired_at: from_optional_millis("signing_key", row.try_get("retired_at")?)?,
                    verify_until: from_optional_millis(
                        "signing_key",
                        row.try_get("verify_until")?,
                    )?,
                })
            })
            .collect()
    }

    async fn delete_signing_key(&self, kid: &str) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM signing_keys WHERE kid = $1")
            .bind(kid)
            .execute(self.pool())
            .await?;
        Ok(result.rows_affected() == 1)
    }
}
