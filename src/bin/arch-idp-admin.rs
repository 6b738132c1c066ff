// ABOUTME: Administrative command for provisioning clients and maintaining the identity provider
// ABOUTME: Seeds resources, registers clients, rotates signing keys, and purges expired grants
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

//! Administrative command for the Arch identity provider.
//!
//! Usage:
//! ```bash
//! # Seed clients and resources from the configured seed file
//! cargo run --bin arch-idp-admin -- seed
//!
//! # Seed from another file
//! cargo run --bin arch-idp-admin -- seed --file ./config/staging-seed.yaml
//!
//! # Register (or replace) one client; a secret is generated unless --secret-env is given
//! cargo run --bin arch-idp-admin -- register-client --file ./partner.yaml
//!
//! # Retire the active signing key and activate a fresh one
//! cargo run --bin arch-idp-admin -- rotate-keys
//!
//! # Delete expired codes, refresh tokens and consents
//! cargo run --bin arch-idp-admin -- purge-expired
//! ```

use std::env;
use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use arch_idp::{
    config::environment::{DatabaseUrl, ServerConfig},
    constants::service_names,
    keys::load_signing_keys,
    logging::LoggingConfig,
    oauth2_server::{
        client_registry::generate_client_secret, ClientRegistration, ClientRegistry, GrantManager,
        LifetimePolicy,
    },
    provisioning::{Provisioner, SeedConfig},
    server::open_stores,
    store::{StorePolicy, Stores},
};
use chrono::Utc;
use clap::{Parser, Subcommand};
use tokio::fs;
use tracing::info;

#[derive(Parser)]
#[command(
    name = "arch-idp-admin",
    about = "Arch identity provider administration",
    long_about = "Provision clients and resources, rotate signing keys, and purge expired grants"
)]
struct AdminArgs {
    #[command(subcommand)]
    command: AdminCommand,

    /// Database URL override
    #[arg(long)]
    database_url: Option<String>,
}

#[derive(Subcommand)]
enum AdminCommand {
    /// Insert the clients and resources of a seed file that do not exist yet
    Seed {
        /// Seed file (defaults to `SEED_CONFIG_PATH`)
        #[arg(long)]
        file: Option<PathBuf>,
    },

    /// Register or replace a single client from a YAML or JSON registration
    RegisterClient {
        /// Registration file
        #[arg(long)]
        file: PathBuf,

        /// Environment variable holding the secret; one is generated when omitted
        #[arg(long)]
        secret_env: Option<String>,
    },

    /// Retire the active signing key and activate a newly generated one
    RotateKeys,

    /// Delete expired authorization codes, refresh tokens and consents
    PurgeExpired,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = AdminArgs::parse();
    LoggingConfig::from_env_for(service_names::ARCH_IDP_ADMIN).init()?;

    let mut config = ServerConfig::from_env()?;
    if let Some(url) = &args.database_url {
        config.database.url = DatabaseUrl::parse_url(url)?;
    }

    let stores = open_stores(&config, true).await?;
    let policy = StorePolicy::from(&config.store);

    match args.command {
        AdminCommand::Seed { file } => {
            let path = file.unwrap_or_else(|| config.seed_config_path.clone());
            seed(&config, stores, policy, path).await
        }
        AdminCommand::RegisterClient { file, secret_env } => {
            register_client(&config, &stores, policy, file, secret_env).await
        }
        AdminCommand::RotateKeys => rotate_keys(&config, &stores, policy).await,
        AdminCommand::PurgeExpired => purge_expired(&stores, policy).await,
    }
}

async fn seed(config: &ServerConfig, stores: Stores, policy: StorePolicy, path: PathBuf) -> Result<()> {
    info!(path = %path.display(), "Seeding from file");
    let seed = SeedConfig::from_file(&path).await?;
    let report = Provisioner::new(stores, policy, LifetimePolicy::from_config(config))
        .seed(&seed, &|variable: &str| env::var(variable).ok())
        .await?;

    println!("Seed complete: {report}");
    if !report.created_any() {
        println!("Nothing to do: every record already exists");
    }
    Ok(())
}

async fn register_client(
    config: &ServerConfig,
    stores: &Stores,
    policy: StorePolicy,
    file: PathBuf,
    secret_env: Option<String>,
) -> Result<()> {
    let document = fs::read_to_string(&file)
        .await
        .with_context(|| format!("Cannot read registration file {}", file.display()))?;
    // YAML is a superset of JSON, so one parser accepts both
    let registration: ClientRegistration = serde_yaml::from_str(&document)
        .with_context(|| format!("Invalid registration in {}", file.display()))?;

    let (secret, generated) = match (registration.require_client_secret, secret_env) {
        (false, Some(_)) => return Err(anyhow!("Public clients do not take a secret")),
        (false, None) => (None, false),
        (true, Some(variable)) => {
            let secret = env::var(&variable)
                .with_context(|| format!("Environment variable {variable} is not set"))?;
            (Some(secret), false)
        }
        (true, None) => (Some(generate_client_secret()?), true),
    };

    let registry = ClientRegistry::new(stores.clients.clone(), policy);
    let client = registry
        .register(registration, secret.as_deref(), LifetimePolicy::from_config(config))
        .await?;

    println!("Client '{}' registered", client.client_id);
    if let (true, Some(secret)) = (generated, secret) {
        println!("Client secret (shown once, store it now): {secret}");
    }
    Ok(())
}

async fn rotate_keys(config: &ServerConfig, stores: &Stores, policy: StorePolicy) -> Result<()> {
    let manager = load_signing_keys(config, stores.signing_keys.clone(), policy).await?;
    let previous = manager.snapshot().active().map(|key| key.kid().to_owned());
    let kid = manager.rotate_generated(Utc::now()).await?;

    match previous {
        Some(previous) => println!("Signing key rotated: {previous} retired, {kid} active"),
        None => println!("Signing key {kid} active"),
    }
    Ok(())
}

async fn purge_expired(stores: &Stores, policy: StorePolicy) -> Result<()> {
    let report = GrantManager::new(stores.grants.clone(), policy)
        .purge_expired(Utc::now())
        .await?;
    println!(
        "Purged {} authorization codes, {} refresh tokens, {} consents",
        report.authorization_codes, report.refresh_tokens, report.consents
    );
    Ok(())
}
