// ABOUTME: Identity provider server binary
// ABOUTME: Loads configuration, bootstraps storage and signing keys, and serves the OIDC endpoints
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

//! # Arch Identity Provider Server Binary
//!
//! Starts the OpenID Connect provider. Configuration comes from the
//! environment; see `ServerConfig::from_env`.

use anyhow::Result;
use arch_idp::{
    config::environment::ServerConfig,
    constants::service_names,
    logging::LoggingConfig,
    server::{bootstrap, open_stores, run},
};
use clap::Parser;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "arch-idp-server")]
#[command(about = "Arch identity provider - OpenID Connect / OAuth 2.0 authorization server")]
pub struct Args {
    /// Override HTTP port
    #[arg(long)]
    http_port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    LoggingConfig::from_env_for(service_names::ARCH_IDP_SERVER).init()?;

    let mut config = ServerConfig::from_env()?;
    if let Some(http_port) = args.http_port {
        config.http_port = http_port;
    }
    config.validate()?;

    info!("Starting Arch identity provider");
    info!("{}", config.summary());

    let stores = open_stores(&config, false).await?;
    let resources = bootstrap(config, stores).await?;

    if let Err(e) = run(resources).await {
        error!(error = %e, "Server terminated with an error");
        return Err(e.into());
    }

    info!("Server stopped");
    Ok(())
}
