//! Player-facing request handlers.

use super::{
    auth::{IdentityVerifier, PlayerIdentity, IDENTITY_HEADER},
    errors::ApiError,
    middleware::RequestId,
    models::*,
};
use crate::{
    board::BoardCache,
    catalog::PriceCatalog,
    config::GameConfig,
    deposit::{DepositReconciler, VerifyOutcome},
    inventory::InventoryStore,
    ledger::Ledger,
    withdraw::WithdrawalQueue,
};
use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    Extension, Json,
};
use std::sync::Arc;

/// Shared application state.
pub struct AppState {
    pub ledger: Ledger,
    pub inventory: InventoryStore,
    pub catalog: PriceCatalog,
    pub boards: BoardCache,
    pub deposits: DepositReconciler,
    pub withdrawals: WithdrawalQueue,
    pub identity: IdentityVerifier,
    pub service_key_hash: String,
    pub game: GameConfig,
    pub version: String,
}

impl AppState {
    /// Authenticate a player route. Any failure is a uniform 401 with no
    /// side effects.
    fn player(&self, headers: &HeaderMap, request_id: &RequestId) -> Result<PlayerIdentity, ApiError> {
        let raw = headers
            .get(IDENTITY_HEADER)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| ApiError::unauthorized(request_id.0.clone()))?;
        self.identity
            .verify(raw)
            .ok_or_else(|| ApiError::unauthorized(request_id.0.clone()))
    }
}

/// GET /health
pub async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "Running".to_string(),
        version: state.version.clone(),
    })
}

/// POST /api/account — fetch-or-create the caller's account.
pub async fn account_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<AccountResponse>, ApiError> {
    let who = state.player(&headers, &request_id)?;
    let account = state
        .ledger
        .get_or_create(who.id, who.username, who.display_name)
        .await
        .map_err(|e| ApiError::from_engine(request_id.0.clone(), e))?;
    Ok(Json(account.into()))
}

/// GET /api/board/:tier?seed= — list the board and pin the seed for the
/// following wager call.
pub async fn board_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(tier_name): Path<String>,
    Query(query): Query<BoardQuery>,
) -> Result<Json<BoardResponse>, ApiError> {
    state.player(&headers, &request_id)?;
    if query.seed.is_empty() {
        return Err(ApiError::bad_request(
            request_id.0.clone(),
            "seed must not be empty".into(),
        ));
    }
    let tier = state.game.tiers.get(&tier_name).ok_or_else(|| {
        ApiError::bad_request_code(
            request_id.0.clone(),
            "UNKNOWN_TIER",
            format!("unknown stake tier '{tier_name}'"),
        )
    })?;

    let board = state
        .boards
        .get_or_generate(&query.seed, &tier_name, tier, &state.catalog)
        .map_err(|e| ApiError::from_engine(request_id.0.clone(), e))?;
    Ok(Json(BoardResponse::new(&board, tier.stake)))
}

/// POST /api/wager — settle one wager against the pinned board.
pub async fn wager_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<WagerRequest>,
) -> Result<Json<WagerResponse>, ApiError> {
    let who = state.player(&headers, &request_id)?;
    settle_wager(&state, &request_id, who, &request.tier, &request.seed, false).await
}

/// POST /api/wager/free — time-gated free wager on the configured tier.
pub async fn free_wager_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<FreeWagerRequest>,
) -> Result<Json<WagerResponse>, ApiError> {
    let who = state.player(&headers, &request_id)?;
    let free_tier = state.game.free_tier.clone();
    settle_wager(&state, &request_id, who, &free_tier, &request.seed, true).await
}

async fn settle_wager(
    state: &AppState,
    request_id: &RequestId,
    who: PlayerIdentity,
    tier_name: &str,
    seed: &str,
    free: bool,
) -> Result<Json<WagerResponse>, ApiError> {
    if seed.is_empty() {
        return Err(ApiError::bad_request(
            request_id.0.clone(),
            "seed must not be empty".into(),
        ));
    }
    let tier = state.game.tiers.get(tier_name).ok_or_else(|| {
        ApiError::bad_request_code(
            request_id.0.clone(),
            "UNKNOWN_TIER",
            format!("unknown stake tier '{tier_name}'"),
        )
    })?;

    state
        .ledger
        .get_or_create(who.id, who.username, who.display_name)
        .await
        .map_err(|e| ApiError::from_engine(request_id.0.clone(), e))?;

    // Settlement must run against the same cached board the listing showed.
    let board = state
        .boards
        .get_or_generate(seed, tier_name, tier, &state.catalog)
        .map_err(|e| ApiError::from_engine(request_id.0.clone(), e))?;

    let settled = state
        .ledger
        .settle(who.id, &board, free)
        .await
        .map_err(|e| ApiError::from_engine(request_id.0.clone(), e))?;

    Ok(Json(WagerResponse {
        prize: settled.item.prize.clone(),
        value: settled.record.awarded,
        slot_index: settled.record.slot_index,
        new_balance: settled.new_balance,
        item_id: settled.item.id,
        free,
    }))
}

/// POST /api/deposit/begin
pub async fn deposit_begin_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<DepositBeginResponse>, ApiError> {
    let who = state.player(&headers, &request_id)?;
    state
        .ledger
        .get_or_create(who.id, who.username, who.display_name)
        .await
        .map_err(|e| ApiError::from_engine(request_id.0.clone(), e))?;
    let intent = state
        .deposits
        .begin(who.id)
        .map_err(|e| ApiError::from_engine(request_id.0.clone(), e))?;
    Ok(Json(DepositBeginResponse::new(
        &intent,
        state.deposits.destination(),
    )))
}

/// POST /api/deposit/verify
pub async fn deposit_verify_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<DepositVerifyRequest>,
) -> Result<Json<DepositVerifyResponse>, ApiError> {
    let who = state.player(&headers, &request_id)?;
    let outcome = state
        .deposits
        .verify(who.id, &request.token)
        .await
        .map_err(|e| ApiError::from_engine(request_id.0.clone(), e))?;

    let response = match outcome {
        VerifyOutcome::NotFound => DepositVerifyResponse {
            status: "not_found".into(),
            credited: None,
            new_balance: None,
        },
        VerifyOutcome::Pending => DepositVerifyResponse {
            status: "pending".into(),
            credited: None,
            new_balance: None,
        },
        VerifyOutcome::Expired => DepositVerifyResponse {
            status: "expired".into(),
            credited: None,
            new_balance: None,
        },
        VerifyOutcome::Credited {
            amount,
            new_balance,
        } => DepositVerifyResponse {
            status: "success".into(),
            credited: Some(amount),
            new_balance: Some(new_balance),
        },
    };
    Ok(Json(response))
}

/// GET /api/inventory
pub async fn inventory_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<InventoryResponse>, ApiError> {
    let who = state.player(&headers, &request_id)?;
    let items = state
        .inventory
        .list(who.id)
        .map_err(|e| ApiError::from_engine(request_id.0.clone(), e))?;
    Ok(Json(InventoryResponse {
        items: items.into_iter().map(ItemView::from).collect(),
    }))
}

/// POST /api/inventory/convert
pub async fn convert_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<ConvertRequest>,
) -> Result<Json<ConvertResponse>, ApiError> {
    let who = state.player(&headers, &request_id)?;
    let conversion = state
        .inventory
        .convert(who.id, request.item_id)
        .await
        .map_err(|e| ApiError::from_engine(request_id.0.clone(), e))?;
    Ok(Json(ConvertResponse {
        payout: conversion.payout,
        new_balance: conversion.new_balance,
    }))
}

/// POST /api/withdrawals — queue a held prize for external fulfillment.
pub async fn withdraw_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<WithdrawRequest>,
) -> Result<Json<WithdrawResponse>, ApiError> {
    let who = state.player(&headers, &request_id)?;
    let item = state
        .inventory
        .get(who.id, request.item_id)
        .map_err(|e| ApiError::from_engine(request_id.0.clone(), e))?
        .ok_or_else(|| ApiError::not_found(request_id.0.clone(), "inventory item not found".into()))?;
    let task = state
        .withdrawals
        .enqueue(who.id, &item)
        .await
        .map_err(|e| ApiError::from_engine(request_id.0.clone(), e))?;
    Ok(Json(WithdrawResponse { task_id: task.id }))
}
