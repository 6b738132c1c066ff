// ABOUTME: Integration tests for idempotent seeding of clients and resources
// ABOUTME: Runs the shipped seed file against memory and SQLite stores, twice and concurrently
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs)]

mod common;

use std::path::PathBuf;

use arch_idp::config::environment::DatabaseUrl;
use arch_idp::database::Database;
use arch_idp::oauth2_server::LifetimePolicy;
use arch_idp::provisioning::{Provisioner, SeedConfig, SeedReport};
use arch_idp::store::{ClientStore, ResourceStore, StorePolicy, Stores};
use common::init_test_logging;
use futures_util::future::join_all;
use tempfile::TempDir;

fn seed_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("config/seed.yaml")
}

fn secrets(variable: &str) -> Option<String> {
    match variable {
        "WEB_APP_SECRET" => Some("web-app-secret-0123456789".to_owned()),
        "ORDERS_WORKER_SECRET" => Some("orders-worker-secret-0123456789".to_owned()),
        _ => None,
    }
}

fn provisioner(stores: &Stores) -> Provisioner {
    Provisioner::new(stores.clone(), StorePolicy::default(), LifetimePolicy::default())
}

async fn assert_seeding_is_idempotent(stores: Stores) {
    init_test_logging();
    let seed = SeedConfig::from_file(&seed_path()).await.unwrap();
    let provisioner = provisioner(&stores);

    let first = provisioner.seed(&seed, &secrets).await.unwrap();
    assert_eq!(
        first,
        SeedReport {
            clients_created: 3,
            clients_existing: 0,
            identity_resources_created: 3,
            identity_resources_existing: 0,
            api_resources_created: 1,
            api_resources_existing: 0,
        }
    );
    let worker = stores
        .clients
        .get_client("orders-worker")
        .await
        .unwrap()
        .unwrap();

    let second = provisioner.seed(&seed, &secrets).await.unwrap();
    assert!(!second.created_any());
    assert_eq!(second.clients_existing, 3);
    assert_eq!(second.identity_resources_existing, 3);
    assert_eq!(second.api_resources_existing, 1);

    assert_eq!(stores.clients.list_clients().await.unwrap().len(), 3);
    assert_eq!(stores.resources.list_identity_resources().await.unwrap().len(), 3);
    assert_eq!(stores.resources.list_api_resources().await.unwrap().len(), 1);

    // Existing records are never rewritten
    let unchanged = stores
        .clients
        .get_client("orders-worker")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(unchanged.secret_hash, worker.secret_hash);
    assert_eq!(unchanged.created_at, worker.created_at);
    assert_eq!(unchanged.lifetimes.access_token_secs, 900);
}

#[tokio::test]
async fn test_seeding_twice_creates_no_duplicates_in_memory() {
    assert_seeding_is_idempotent(Stores::memory()).await;
}

#[tokio::test]
async fn test_seeding_twice_creates_no_duplicates_in_sqlite() {
    let dir = TempDir::new().unwrap();
    let url = DatabaseUrl::SQLite {
        path: dir.path().join("seed.db"),
    };
    let database = Database::new(&url).await.unwrap();
    database.migrate().await.unwrap();
    assert_seeding_is_idempotent(Stores::sqlite(&database)).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_seeding_creates_each_record_once() {
    let dir = TempDir::new().unwrap();
    let url = DatabaseUrl::SQLite {
        path: dir.path().join("concurrent-seed.db"),
    };
    let database = Database::new(&url).await.unwrap();
    database.migrate().await.unwrap();
    let stores = Stores::sqlite(&database);
    let seed = SeedConfig::from_file(&seed_path()).await.unwrap();

    let runs = (0..4).map(|_| {
        let provisioner = provisioner(&stores);
        let seed = seed.clone();
        tokio::spawn(async move { provisioner.seed(&seed, &secrets).await })
    });
    let reports: Vec<SeedReport> = join_all(runs)
        .await
        .into_iter()
        .map(|joined| joined.unwrap().unwrap())
        .collect();

    let clients_created: usize = reports.iter().map(|report| report.clients_created).sum();
    let resources_created: usize = reports
        .iter()
        .map(|report| report.identity_resources_created)
        .sum();
    assert_eq!(clients_created, 3);
    assert_eq!(resources_created, 3);
    assert_eq!(stores.clients.list_clients().await.unwrap().len(), 3);
}

#[tokio::test]
async fn test_missing_secret_variable_fails_seeding() {
    init_test_logging();
    let stores = Stores::memory();
    let seed = SeedConfig::from_file(&seed_path()).await.unwrap();

    let result = provisioner(&stores).seed(&seed, &|_| None).await;
    assert!(result.is_err());
    assert!(stores
        .clients
        .get_client("web-app")
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_shipped_seed_file_describes_three_clients() {
    let seed = SeedConfig::from_file(&seed_path()).await.unwrap();
    let ids: Vec<&str> = seed
        .clients
        .iter()
        .map(|client| client.registration.client_id.as_str())
        .collect();
    assert_eq!(ids, ["web-app", "mobile-app", "orders-worker"]);

    let mobile = &seed.clients[1];
    assert!(mobile.secret_env.is_none());
    assert!(!mobile.registration.require_client_secret);
    assert!(mobile.registration.require_pkce);
}

#[test]
fn test_duplicate_client_in_seed_is_rejected() {
    let yaml = r"
clients:
  - client_id: twin
    grant_types: [client_credentials]
    scopes: [orders.read]
  - client_id: twin
    grant_types: [client_credentials]
    scopes: [orders.read]
";
    assert!(SeedConfig::from_yaml_str(yaml).is_err());
}
