//! Route definitions.

use super::{handlers::*, service};
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

/// Build the API router with all endpoints.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        // Player routes (identity-integrity header)
        .route("/api/account", post(account_handler))
        .route("/api/board/:tier", get(board_handler))
        .route("/api/wager", post(wager_handler))
        .route("/api/wager/free", post(free_wager_handler))
        .route("/api/deposit/begin", post(deposit_begin_handler))
        .route("/api/deposit/verify", post(deposit_verify_handler))
        .route("/api/inventory", get(inventory_handler))
        .route("/api/inventory/convert", post(convert_handler))
        .route("/api/withdrawals", post(withdraw_handler))
        // Service routes (shared API key)
        .route("/svc/withdrawals/drain", post(service::drain_handler))
        .route("/svc/withdrawals/complete", post(service::complete_handler))
        .route("/svc/credits", post(service::credit_handler))
        .route("/svc/catalog", post(service::catalog_upsert_handler))
        .with_state(state)
}
