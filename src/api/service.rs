//! Service-to-service handlers: the fulfillment worker's pull interface,
//! external prize credits, and the price-refresh write path.
//!
//! All routes here require the shared API key; anything else gets a bare
//! 401 with no further detail.

use super::{
    auth::{service_key_matches, SERVICE_KEY_HEADER},
    errors::ApiError,
    handlers::AppState,
    middleware::RequestId,
    models::*,
};
use crate::errors::EngineError;
use axum::{extract::State, http::HeaderMap, Extension, Json};
use std::sync::Arc;

fn require_service_key(
    state: &AppState,
    headers: &HeaderMap,
    request_id: &RequestId,
) -> Result<(), ApiError> {
    let presented = headers
        .get(SERVICE_KEY_HEADER)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();
    if service_key_matches(&state.service_key_hash, presented) {
        Ok(())
    } else {
        Err(ApiError::unauthorized(request_id.0.clone()))
    }
}

/// POST /svc/withdrawals/drain — lease every pending withdrawal task.
pub async fn drain_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<DrainResponse>, ApiError> {
    require_service_key(&state, &headers, &request_id)?;
    let tasks = state
        .withdrawals
        .drain()
        .await
        .map_err(|e| ApiError::from_engine(request_id.0.clone(), e))?;
    Ok(Json(DrainResponse {
        tasks: tasks.into_iter().map(TaskView::from).collect(),
    }))
}

/// POST /svc/withdrawals/complete — acknowledge a fulfilled task.
pub async fn complete_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<CompleteRequest>,
) -> Result<Json<CompleteResponse>, ApiError> {
    require_service_key(&state, &headers, &request_id)?;
    state
        .withdrawals
        .complete(request.task_id)
        .await
        .map_err(|e| ApiError::from_engine(request_id.0.clone(), e))?;
    Ok(Json(CompleteResponse { completed: true }))
}

/// POST /svc/credits — credit the catalog value of a recognized prize name.
pub async fn credit_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<CreditRequest>,
) -> Result<Json<CreditResponse>, ApiError> {
    require_service_key(&state, &headers, &request_id)?;
    let entry = state
        .catalog
        .lookup(&request.prize)
        .map_err(|e| ApiError::from_engine(request_id.0.clone(), e))?
        .ok_or_else(|| {
            ApiError::from_engine(
                request_id.0.clone(),
                EngineError::UnknownPrize(request.prize.clone()),
            )
        })?;
    let new_balance = state
        .ledger
        .credit(request.account, entry.value)
        .await
        .map_err(|e| ApiError::from_engine(request_id.0.clone(), e))?;
    Ok(Json(CreditResponse {
        credited: entry.value,
        new_balance,
    }))
}

/// POST /svc/catalog — bulk upsert from the external price-refresh job.
pub async fn catalog_upsert_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<CatalogUpsertRequest>,
) -> Result<Json<CatalogUpsertResponse>, ApiError> {
    require_service_key(&state, &headers, &request_id)?;
    if request.entries.is_empty() {
        return Err(ApiError::bad_request(
            request_id.0.clone(),
            "entries must not be empty".into(),
        ));
    }
    let upserted = state
        .catalog
        .upsert_bulk(&request.entries)
        .map_err(|e| ApiError::from_engine(request_id.0.clone(), e))?;
    Ok(Json(CatalogUpsertResponse { upserted }))
}
