// ABOUTME: HTTP server assembly: resource bootstrap, router with tracing middleware, and graceful shutdown
// ABOUTME: Runs the background task that purges expired grants and rotates signing keys when due
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

use crate::config::ServerConfig;
use crate::constants::defaults;
use crate::database::Database;
use crate::errors::{AppError, AppResult};
use crate::keys::bootstrap_signing_keys;
use crate::oauth2_server::{InMemoryProfiles, OidcRoutes, TrustedHeaderAuthenticator};
use crate::resources::ServerResources;
use crate::store::{StorePolicy, Stores};
use axum::extract::Request;
use axum::http::HeaderName;
use axum::Router;
use chrono::Utc;
use std::future::pending;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, info_span, warn};

const REQUEST_ID_HEADER: &str = "x-request-id";

/// Open the configured database, migrating it when configured to
///
/// # Errors
///
/// Returns an error if the database cannot be opened or migrated
pub async fn open_stores(config: &ServerConfig, force_migrate: bool) -> AppResult<Stores> {
    let database = Database::new(&config.database.url).await?;
    if force_migrate || config.database.auto_migrate {
        database.migrate().await?;
    }
    Ok(Stores::sqlite(&database))
}

/// Build every shared resource the server needs
///
/// # Errors
///
/// Returns an error if storage, signing keys or the subject authenticator
/// cannot be initialized
pub async fn bootstrap(config: ServerConfig, stores: Stores) -> AppResult<Arc<ServerResources>> {
    let policy = StorePolicy::from(&config.store);
    let keys = bootstrap_signing_keys(&config, stores.signing_keys.clone(), policy).await?;
    let authenticator = TrustedHeaderAuthenticator::from_config(&config.authentication)?;

    Ok(Arc::new(ServerResources::new(
        config,
        stores,
        Arc::new(keys),
        Arc::new(InMemoryProfiles::new()),
        Arc::new(authenticator),
    )))
}

/// Router with request tracing, request ids and a request timeout
pub fn build_router(resources: Arc<ServerResources>) -> Router {
    let request_id = HeaderName::from_static(REQUEST_ID_HEADER);

    // Order matters: last added = first executed
    OidcRoutes::routes(resources)
        .layer(TimeoutLayer::new(Duration::from_secs(
            defaults::REQUEST_TIMEOUT_SECS,
        )))
        .layer(TraceLayer::new_for_http().make_span_with(|request: &Request| {
            let request_id = request
                .headers()
                .get(REQUEST_ID_HEADER)
                .and_then(|value| value.to_str().ok())
                .unwrap_or("-");
            info_span!(
                "http_request",
                method = %request.method(),
                path = %request.uri().path(),
                request_id = %request_id,
            )
        }))
        .layer(PropagateRequestIdLayer::new(request_id.clone()))
        .layer(SetRequestIdLayer::new(request_id, MakeRequestUuid))
}

/// Serve until SIGINT or SIGTERM
///
/// # Errors
///
/// Returns an error if the listener cannot be bound or the server fails
pub async fn run(resources: Arc<ServerResources>) -> AppResult<()> {
    let config = resources.config.clone();
    let address = format!("{}:{}", config.host, config.http_port);
    let listener = TcpListener::bind(&address)
        .await
        .map_err(|e| AppError::config(format!("Cannot bind {address}: {e}")))?;
    info!(address = %address, issuer = %config.issuer_url, "Identity provider listening");

    let maintenance = spawn_maintenance(
        resources.clone(),
        Duration::from_secs(config.maintenance_interval_secs),
    );
    let served = axum::serve(listener, build_router(resources))
        .with_graceful_shutdown(shutdown_signal())
        .await;
    maintenance.abort();

    served.map_err(|e| AppError::internal(format!("HTTP server error: {e}")))
}

/// Periodically purge expired grants and rotate the signing key when due
pub fn spawn_maintenance(resources: Arc<ServerResources>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(every);
        loop {
            ticker.tick().await;
            run_maintenance(&resources).await;
        }
    })
}

/// One maintenance pass
pub async fn run_maintenance(resources: &ServerResources) {
    let now = Utc::now();
    match resources.engine.grants().purge_expired(now).await {
        Ok(report) if report.total() > 0 => info!(
            authorization_codes = report.authorization_codes,
            refresh_tokens = report.refresh_tokens,
            consents = report.consents,
            "Expired grants purged"
        ),
        Ok(_) => debug!("No expired grants to purge"),
        Err(e) => warn!(error = %e, "Grant purge failed"),
    }

    match resources.keys.rotate_if_due(now).await {
        Ok(Some(kid)) => info!(kid = %kid, "Scheduled signing key rotation complete"),
        Ok(None) => {}
        Err(e) => error!(error = %e, "Scheduled signing key rotation failed"),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix;

        match unix::signal(unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("Graceful shutdown initiated");
}
