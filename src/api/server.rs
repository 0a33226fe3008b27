//! API Server Module
//!
//! Provides the Axum application builder and server startup logic.
//! Consolidates application state and router configuration.

use std::sync::Arc;

use axum::{
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};

use super::{handlers, middleware};
use crate::ledger::LedgerService;
use crate::provider::ProviderNotifier;
use crate::session::SessionService;
use crate::storage::SqliteCasinoStore;

/// Combined application state for all API endpoints
pub struct AppState {
    /// Idempotent ledger engine
    pub ledger: LedgerService,
    /// Session registry
    pub sessions: SessionService,
    /// Outbound provider notification
    pub notifier: Arc<dyn ProviderNotifier>,
    /// Verifies `x-provider-signature`. None answers 500 on gated routes.
    pub provider_secret: Option<String>,
}

/// Shared application state type
pub type SharedAppState = Arc<AppState>;

impl AppState {
    /// Create new application state over a shared store
    pub fn new(
        store: Arc<SqliteCasinoStore>,
        notifier: Arc<dyn ProviderNotifier>,
        provider_secret: Option<String>,
    ) -> SharedAppState {
        Arc::new(Self {
            ledger: LedgerService::new(store.clone()),
            sessions: SessionService::new(store),
            notifier,
            provider_secret,
        })
    }
}

/// Build the application router
pub fn create_router(state: SharedAppState) -> Router {
    // Money-moving callbacks sit behind the signature gate
    let callbacks = Router::new()
        .route("/casino/getBalance", post(handlers::handle_get_balance))
        .route("/casino/debit", post(handlers::handle_debit))
        .route("/casino/credit", post(handlers::handle_credit))
        .route("/casino/rollback", post(handlers::handle_rollback))
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::provider_signature_gate,
        ));

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .merge(callbacks)
        .route("/casino/launchGame", post(handlers::handle_launch_game))
        .route("/api/health", get(handlers::handle_health))
        .layer(cors)
        .with_state(state)
}

/// Start the API server
pub async fn start_server(state: SharedAppState, port: u16) -> Result<(), std::io::Error> {
    let app = create_router(state);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));

    println!("=== Casino Wallet API ===");
    println!("Listening on http://{}", addr);
    println!();
    println!("Endpoints:");
    println!("  POST /casino/launchGame  - Launch a game session (front-end)");
    println!("  POST /casino/getBalance  - Read wallet balance (signed)");
    println!("  POST /casino/debit       - Debit a bet (signed)");
    println!("  POST /casino/credit      - Credit a payout (signed)");
    println!("  POST /casino/rollback    - Roll back a bet (signed)");
    println!("  GET  /api/health         - Health check");
    println!();

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await
}

// =============================================================================
// Tests
// =============================================================================
