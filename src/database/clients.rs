// ABOUTME: Client registry persistence for the SQLite adapter
// ABOUTME: Insert-if-absent backs idempotent provisioning; upsert backs explicit admin updates
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

use super::{from_millis, to_millis, Database};
use crate::errors::StoreError;
use crate::store::{ClientStore, StoreResult};
use arch_idp_core::models::{Client, GrantType, ScopeSet, TokenLifetimes};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteArguments, SqliteRow};
use sqlx::query::Query;
use sqlx::{Row, Sqlite};
use std::collections::BTreeSet;

const CLIENT_COLUMNS: &str = "client_id, client_name, secret_hash, require_client_secret, \
     allowed_grant_types, redirect_uris, allowed_scopes, access_token_lifetime_secs, \
     identity_token_lifetime_secs, authorization_code_lifetime_secs, \
     refresh_token_lifetime_secs, allow_offline_access, require_pkce, require_consent, \
     enabled, created_at, updated_at";

const CLIENT_PLACEHOLDERS: &str = "?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?";

/// Serialized set columns of a client row
struct EncodedSets {
    grant_types: String,
    redirect_uris: String,
}

impl EncodedSets {
    fn encode(client: &Client) -> StoreResult<Self> {
        Ok(Self {
            grant_types: serde_json::to_string(&client.allowed_grant_types).map_err(|source| {
                StoreError::Serialization {
                    context: "clients.allowed_grant_types",
                    source,
                }
            })?,
            redirect_uris: serde_json::to_string(&client.redirect_uris).map_err(|source| {
                StoreError::Serialization {
                    context: "clients.redirect_uris",
                    source,
                }
            })?,
        })
    }
}

fn bind_client<'q>(
    query: Query<'q, Sqlite, SqliteArguments<'q>>,
    client: &'q Client,
    sets: &'q EncodedSets,
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    query
        .bind(&client.client_id)
        .bind(&client.client_name)
        .bind(&client.secret_hash)
        .bind(client.require_client_secret)
        .bind(&sets.grant_types)
        .bind(&sets.redirect_uris)
        .bind(client.allowed_scopes.to_string())
        .bind(client.lifetimes.access_token_secs)
        .bind(client.lifetimes.identity_token_secs)
        .bind(client.lifetimes.authorization_code_secs)
        .bind(client.lifetimes.refresh_token_secs)
        .bind(client.allow_offline_access)
        .bind(client.require_pkce)
        .bind(client.require_consent)
        .bind(client.enabled)
        .bind(to_millis(client.created_at))
        .bind(to_millis(client.updated_at))
}

fn client_from_row(row: &SqliteRow) -> StoreResult<Client> {
    let grant_types: String = row.try_get("allowed_grant_types")?;
    let redirect_uris: String = row.try_get("redirect_uris")?;
    let allowed_grant_types: BTreeSet<GrantType> = serde_json::from_str(&grant_types)
        .map_err(|e| StoreError::corrupt("client", format!("allowed_grant_types: {e}")))?;
    let redirect_uris: BTreeSet<String> = serde_json::from_str(&redirect_uris)
        .map_err(|e| StoreError::corrupt("client", format!("redirect_uris: {e}")))?;

    Ok(Client {
        client_id: row.try_get("client_id")?,
        client_name: row.try_get("client_name")?,
        secret_hash: row.try_get("secret_hash")?,
        require_client_secret: row.try_get("require_client_secret")?,
        allowed_grant_types,
        redirect_uris,
        allowed_scopes: ScopeSet::parse(&row.try_get::<String, _>("allowed_scopes")?),
        lifetimes: TokenLifetimes {
            access_token_secs: row.try_get("access_token_lifetime_secs")?,
            identity_token_secs: row.try_get("identity_token_lifetime_secs")?,
            authorization_code_secs: row.try_get("authorization_code_lifetime_secs")?,
            refresh_token_secs: row.try_get("refresh_token_lifetime_secs")?,
        },
        allow_offline_access: row.try_get("allow_offline_access")?,
        require_pkce: row.try_get("require_pkce")?,
        require_consent: row.try_get("require_consent")?,
        enabled: row.try_get("enabled")?,
        created_at: from_millis("client", row.try_get("created_at")?)?,
        updated_at: from_millis("client", row.try_get("updated_at")?)?,
    })
}

#[async_trait]
impl ClientStore for Database {
    async fn get_client(&self, client_id: &str) -> StoreResult<Option<Client>> {
        let row = sqlx::query(&format!(
            "SELECT {CLIENT_COLUMNS} FROM clients WHERE client_id = ?"
        ))
        .bind(client_id)
        .fetch_optional(self.pool())
        .await?;

        row.as_ref().map(client_from_row).transpose()
    }

    async fn insert_client_if_absent(&self, client: &Client) -> StoreResult<bool> {
        let sets = EncodedSets::encode(client)?;
        let sql = format!(
            "INSERT INTO clients ({CLIENT_COLUMNS}) VALUES ({CLIENT_PLACEHOLDERS}) \
             ON CONFLICT(client_id) DO NOTHING"
        );
        let result = bind_client(sqlx::query(&sql), client, &sets)
            .execute(self.pool())
            .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn upsert_client(&self, client: &Client) -> StoreResult<()> {
        let sets = EncodedSets::encode(client)?;
        let sql = format!(
            "INSERT INTO clients ({CLIENT_COLUMNS}) VALUES ({CLIENT_PLACEHOLDERS}) \
             ON CONFLICT(client_id) DO UPDATE SET \
                client_name = excluded.client_name, \
                secret_hash = excluded.secret_hash, \
                require_client_secret = excluded.require_client_secret, \
                allowed_grant_types = excluded.allowed_grant_types, \
                redirect_uris = excluded.redirect_uris, \
                allowed_scopes = excluded.allowed_scopes, \
                access_token_lifetime_secs = excluded.access_token_lifetime_secs, \
                identity_token_lifetime_secs = excluded.identity_token_lifetime_secs, \
                authorization_code_lifetime_secs = excluded.authorization_code_lifetime_secs, \
                refresh_token_lifetime_secs = excluded.refresh_token_lifetime_secs, \
                allow_offline_access = excluded.allow_offline_access, \
                require_pkce = excluded.require_pkce, \
                require_consent = excluded.require_consent, \
                enabled = excluded.enabled, \
                updated_at = excluded.updated_at"
        );
        bind_client(sqlx::query(&sql), client, &sets)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    async fn list_clients(&self) -> StoreResult<Vec<Client>> {
        let rows = sqlx::query(&format!(
            "SELECT {CLIENT_COLUMNS} FROM clients ORDER BY client_id"
        ))
        .fetch_all(self.pool())
        .await?;

        rows.iter().map(client_from_row).collect()
    }
}
