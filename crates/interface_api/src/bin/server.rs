//! BrickBook Advance Ledger - API Server Binary
//!
//! # Usage
//!
//! ```bash
//! # PostgreSQL-backed ledger
//! API_DATABASE_URL=postgres://... cargo run --bin brickbook-api
//!
//! # Throwaway in-memory ledger
//! API_STORAGE=memory cargo run --bin brickbook-api
//! ```
//!
//! # Environment Variables
//!
//! * `API_HOST` - Server host (default: 0.0.0.0)
//! * `API_PORT` - Server port (default: 8080)
//! * `API_JWT_SECRET` - JWT signing secret (required in production)
//! * `API_JWT_EXPIRATION_SECS` - JWT token expiration in seconds (default: 3600)
//! * `API_DATABASE_URL` / `DATABASE_URL` - PostgreSQL connection string
//! * `API_LOG_LEVEL` - trace, debug, info, warn, error (default: info)
//! * `API_STORAGE` - `postgres` or `memory` (default: postgres)
//! * `API_LOCK_TIMEOUT_MS` - per-customer lock wait (default: 5000)
//! * `API_CURRENCY` - ISO 4217 code (default: INR)
//! * `API_TIMEZONE` - IANA zone for report periods (default: Asia/Kolkata)

use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use domain_ledger::{InMemoryDirectory, InMemoryLedgerStore};
use infra_db::{
    create_pool, run_migrations, DatabaseConfig, PostgresLedgerStore, PostgresReferenceDirectory,
};
use interface_api::{
    config::{ApiConfig, StorageBackend},
    create_router, AppState,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env file if present (useful for local development)
    dotenvy::dotenv().ok();

    let config = ApiConfig::from_env()?;
    init_tracing(&config.log_level);

    tracing::info!(
        host = %config.host,
        port = %config.port,
        storage = ?config.storage,
        currency = %config.currency,
        timezone = %config.timezone,
        "Starting BrickBook advance ledger API"
    );

    let state = build_state(config.clone()).await?;
    let app = create_router(state);

    let addr: SocketAddr = config.server_addr().parse()?;
    tracing::info!(%addr, "Server listening");

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Opens the configured store and wires it into the application state
async fn build_state(config: ApiConfig) -> Result<AppState, Box<dyn std::error::Error>> {
    let settings = config.ledger_settings()?;
    match config.storage {
        StorageBackend::Memory => {
            tracing::warn!("Using in-memory ledger; entries are lost on restart");
            let store = Arc::new(InMemoryLedgerStore::new(settings.lock_timeout));
            Ok(AppState::new(store, Arc::new(InMemoryDirectory::new()), config)?)
        }
        StorageBackend::Postgres => {
            tracing::info!("Connecting to database...");
            let pool = create_pool(DatabaseConfig::new(config.database_url.clone())).await?;
            run_migrations(&pool).await?;

            let store = Arc::new(PostgresLedgerStore::new(pool.clone(), settings.lock_timeout));
            let directory = Arc::new(PostgresReferenceDirectory::new(pool));
            Ok(AppState::new(store, directory, config)?)
        }
    }
}

fn init_tracing(log_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();
}

/// Waits for Ctrl+C or SIGTERM so in-flight requests can finish
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
