//! gophermart: loyalty points service
//!
//! Long-running service that:
//! - Accepts order numbers from authenticated users
//! - Polls the accrual service for each pending order and credits rewards
//! - Serves balances and records point withdrawals

mod accrual;
mod api;
mod auth;
mod config;
mod db;
mod error;
mod services;
mod state;
mod util;

use std::sync::Arc;
use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use tokio_util::sync::CancellationToken;

use accrual::{AccrualWorker, HttpAccrualClient};
use config::Config;
use db::{PgStore, Store};
use error::BoxError;
use state::AppState;

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    // Load .env file
    let _ = dotenvy::dotenv();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gophermart=info,tower_http=info".into()),
        )
        .init();

    let config = Config::load()?;

    tracing::info!(
        environment = %config.environment,
        accrual = %config.accrual_system_address,
        "Starting gophermart"
    );

    // Database
    let pool = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .connect(&config.database_uri)
        .await?;
    sqlx::migrate!("./migrations").run(&pool).await?;
    let store: Arc<dyn Store> = Arc::new(PgStore::new(pool));

    // Accrual worker
    let request_timeout = Duration::from_secs(config.accrual_request_timeout_secs);
    let client = HttpAccrualClient::new(&config.accrual_system_address, request_timeout)?;
    let shutdown = CancellationToken::new();
    let worker = AccrualWorker::new(
        store.clone(),
        Arc::new(client),
        Duration::from_secs(config.accrual_poll_interval_secs),
        request_timeout,
        shutdown.clone(),
    );
    let worker_handle = tokio::spawn(worker.run());

    // HTTP server
    let app = api::create_router(AppState::new(store, &config.jwt_secret));
    let listener = tokio::net::TcpListener::bind(&config.run_address).await?;
    tracing::info!("gophermart HTTP listening on {}", config.run_address);

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    shutdown.cancel();
    if let Err(e) = worker_handle.await {
        tracing::error!("Accrual worker task failed: {e}");
    }
    served?;

    tracing::info!("gophermart stopped");
    Ok(())
}

async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C signal, shutting down gracefully...");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM signal, shutting down gracefully...");
        },
    }
}
