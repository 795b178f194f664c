//! HTTP API Layer
//!
//! REST API for the BrickBook customer advance ledger using Axum.
//!
//! # Architecture
//!
//! - **Handlers**: Request handlers for the ledger and health checks
//! - **Middleware**: Bearer authentication, tracing, audit logging
//! - **DTOs**: Request/Response data transfer objects
//! - **Error Handling**: `{error, code, retryable}` error bodies
//!
//! # Example
//!
//! ```rust,ignore
//! use interface_api::{create_router, AppState};
//!
//! let state = AppState::new(store, directory, config)?;
//! axum::serve(listener, create_router(state)).await?;
//! ```

pub mod auth;
pub mod config;
pub mod dto;
pub mod error;
pub mod handlers;
pub mod middleware;

use axum::{
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use core_kernel::{CoreError, HealthCheckable};
use domain_ledger::{
    LedgerReader, LedgerReports, LedgerService, LedgerStore, ReferenceDirectory,
};

use crate::config::ApiConfig;
use crate::handlers::{advance, health};
use crate::middleware::{audit_middleware, auth_middleware};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub ledger: Arc<LedgerService>,
    pub reports: Arc<LedgerReports>,
    pub directory: Arc<dyn ReferenceDirectory>,
    pub health: Arc<dyn HealthCheckable>,
    pub config: ApiConfig,
}

impl AppState {
    /// Wires the service, reports and health check to one store
    pub fn new<S>(
        store: Arc<S>,
        directory: Arc<dyn ReferenceDirectory>,
        config: ApiConfig,
    ) -> Result<Self, CoreError>
    where
        S: LedgerStore + 'static,
    {
        let settings = config.ledger_settings()?;
        let timezone = config.business_timezone()?;

        let writer: Arc<dyn LedgerStore> = store.clone();
        let reader: Arc<dyn LedgerReader> = store.clone();
        let health: Arc<dyn HealthCheckable> = store;

        Ok(Self {
            ledger: Arc::new(LedgerService::new(writer, settings)),
            reports: Arc::new(LedgerReports::new(reader, timezone)),
            directory,
            health,
            config,
        })
    }
}

/// Creates the main API router
pub fn create_router(state: AppState) -> Router {
    // Public routes (no auth required)
    let public_routes = Router::new()
        .route("/health", get(health::health_check))
        .route("/health/ready", get(health::readiness_check));

    let advance_routes = Router::new()
        .route("/", get(advance::list_balances).post(advance::add_funds))
        .route("/transactions", get(advance::transaction_feed))
        .route("/summary", get(advance::summary))
        .route("/breakdown", get(advance::breakdown))
        .route("/reconcile", get(advance::reconcile_all))
        .route("/customers/:id", get(advance::customer_balance))
        .route("/customers/:id/history", get(advance::customer_history))
        .route("/customers/:id/summary", get(advance::customer_summary))
        .route("/customers/:id/reconcile", get(advance::reconcile_customer))
        .route("/sales/:sale_id/consume", post(advance::consume_for_sale))
        .route("/sales/:sale_id/extra-payment", post(advance::record_extra_payment))
        .route("/entries/:id/reverse", post(advance::reverse_entry));

    // Protected API routes
    let api_routes = Router::new()
        .nest("/advance", advance_routes)
        .layer(axum_middleware::from_fn(audit_middleware))
        .layer(axum_middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .merge(public_routes)
        .nest("/api/v1", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}
