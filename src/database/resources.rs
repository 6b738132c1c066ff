// ABOUTME: Identity resource and API resource persistence for SQLite
// ABOUTME: Inserts are conflict-free so concurrent provisioning never duplicates rows
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

use super::Database;
use crate::errors::StoreError;
use crate::store::{ResourceStore, StoreResult};
use arch_idp_core::models::{ApiResource, IdentityResource, ScopeSet};
use async_trait::async_trait;
use sqlx::Row;
use std::collections::BTreeSet;

#[async_trait]
impl ResourceStore for Database {
    async fn insert_identity_resource_if_absent(
        &self,
        resource: &IdentityResource,
    ) -> StoreResult<bool> {
        let claims =
            serde_json::to_string(&resource.claims).map_err(|source| StoreError::Serialization {
                context: "identity_resources.claims",
                source,
            })?;

        let result = sqlx::query(
            "INSERT INTO identity_resources (name, display_name, claims, required, enabled) \
             VALUES ($1, $2, $3, $4, $5) ON CONFLICT(name) DO NOTHING",
        )
        .bind(&resource.name)
        .bind(&resource.display_name)
        .bind(claims)
        .bind(resource.required)
        .bind(resource.enabled)
        .execute(self.pool())
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn insert_api_resource_if_absent(&self, resource: &ApiResource) -> StoreResult<bool> {
        let result = sqlx::query(
            "INSERT INTO api_resources (name, display_name, scopes, enabled) \
             VALUES ($1, $2, $3, $4) ON CONFLICT(name) DO NOTHING",
        )
        .bind(&resource.name)
        .bind(&resource.display_name)
        .bind(resource.scopes.to_string())
        .bind(resource.enabled)
        .execute(self.pool())
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn list_identity_resources(&self) -> StoreResult<Vec<IdentityResource>> {
        let rows = sqlx::query(
            "SELECT name, display_name, claims, required, enabled \
             FROM identity_resources ORDER BY name",
        )
        .fetch_all(self.pool())
        .await?;

        rows.iter()
            .map(|row| {
                let claims: String = row.try_get("claims")?;
                let claims: BTreeSet<String> = serde_json::from_str(&claims)
                    .map_err(|e| StoreError::corrupt("identity_resource", e.to_string()))?;
                Ok(IdentityResource {
                    name: row.try_get("name")?,
                    display_name: row.try_get("display_name")?,
                    claims,
                    required: row.try_get("required")?,
                    enabled: row.try_get("enabled")?,
                })
            })
            .collect()
    }

    async fn list_api_resources(&self) -> StoreResult<Vec<ApiResource>> {
        let rows = sqlx::query(
            "SELECT name, display_name, scopes, enabled FROM api_resources ORDER BY name",
        )
        .fetch_all(self.pool())
        .await?;

        rows.iter()
            .map(|row| {
                Ok(ApiResource {
                    name: row.try_get("name")?,
                    display_name: row.try_get("display_name")?,
                    scopes: ScopeSet::parse(&row.try_get::<String, _>("scopes")?),
                    enabled: row.try_get("enabled")?,
                })
            })
            .collect()
    }
}
