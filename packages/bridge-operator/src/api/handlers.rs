use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use prometheus::{Encoder, TextEncoder};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use bridge_core::store;
use bridge_core::types::{Direction, Transfer, TransferStatus};

use super::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    status: &'static str,
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

#[derive(Serialize)]
pub struct StatusResponse {
    halted: bool,
    pending_deposits: i64,
    pending_withdrawals: i64,
    proposed_finalizations: i64,
}

pub async fn status(State(state): State<AppState>) -> Result<Json<StatusResponse>, ApiError> {
    let pending_deposits = store::count_by_status(&state.engine.pool, Direction::Deposit, TransferStatus::Pending)
        .await
        .map_err(ApiError::internal)?;
    let pending_withdrawals = store::count_by_status(&state.engine.pool, Direction::Withdrawal, TransferStatus::Pending)
        .await
        .map_err(ApiError::internal)?;
    let proposed_finalizations = store::count_finalizations_by_state(&state.engine.pool, bridge_core::types::FinalizationState::Proposed)
        .await
        .map_err(ApiError::internal)?;

    Ok(Json(StatusResponse {
        halted: state.engine.safety.is_halted(),
        pending_deposits,
        pending_withdrawals,
        proposed_finalizations,
    }))
}

#[derive(Deserialize)]
pub struct ListTransfersQuery {
    direction: Option<Direction>,
    status: Option<TransferStatus>,
    limit: Option<i64>,
    offset: Option<i64>,
}

pub async fn list_transfers(State(state): State<AppState>, Query(q): Query<ListTransfersQuery>) -> Result<Json<Vec<Transfer>>, ApiError> {
    let transfers = store::list_transfers(&state.engine.pool, q.direction, q.status, q.limit.unwrap_or(50).min(500), q.offset.unwrap_or(0))
        .await
        .map_err(ApiError::internal)?;
    Ok(Json(transfers))
}

pub async fn retry_transfer(State(state): State<AppState>, headers: HeaderMap, Path(id): Path<Uuid>) -> Result<StatusCode, ApiError> {
    authorize(&headers, &state)?;

    let transfer = store::get_transfer(&state.engine.pool, id)
        .await
        .map_err(ApiError::internal)?
        .ok_or(ApiError::NotFound)?;

    if transfer.status != TransferStatus::Failed {
        return Err(ApiError::Conflict("transfer is not in FAILED state".to_string()));
    }

    let won = store::transition_transfer(&state.engine.pool, id, TransferStatus::Failed, TransferStatus::Pending, |_| {})
        .await
        .map_err(ApiError::internal)?;
    if !won {
        return Err(ApiError::Conflict("transfer state changed concurrently".to_string()));
    }
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Deserialize)]
pub struct ListFinalizationsQuery {
    limit: Option<i64>,
}

pub async fn list_finalizations(
    State(state): State<AppState>,
    Query(q): Query<ListFinalizationsQuery>,
) -> Result<Json<Vec<bridge_core::types::Finalization>>, ApiError> {
    let finalizations = store::list_finalizations(&state.engine.pool, q.limit.unwrap_or(50).min(500))
        .await
        .map_err(ApiError::internal)?;
    Ok(Json(finalizations))
}

pub async fn force_finalize(State(state): State<AppState>, headers: HeaderMap, Path(block): Path<i64>) -> Result<StatusCode, ApiError> {
    authorize(&headers, &state)?;

    let finalization = store::get_finalization(&state.engine.pool, block)
        .await
        .map_err(ApiError::internal)?
        .ok_or(ApiError::NotFound)?;
    if finalization.state != bridge_core::types::FinalizationState::Proposed {
        return Err(ApiError::Conflict("block is not in PROPOSED state".to_string()));
    }

    let tx_hash = state.engine.chain_a.finalize_block(block).await.map_err(ApiError::internal)?;
    store::mark_finalized(&state.engine.pool, block, &tx_hash, chrono::Utc::now())
        .await
        .map_err(ApiError::internal)?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Deserialize)]
pub struct HaltRequest {
    reason: String,
}

pub async fn halt(State(state): State<AppState>, headers: HeaderMap, Json(body): Json<HaltRequest>) -> Result<StatusCode, ApiError> {
    authorize(&headers, &state)?;
    state.engine.safety.trigger_emergency_halt(&state.engine.pool, &body.reason).await.map_err(ApiError::internal)?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Deserialize)]
pub struct UnhaltRequest {
    resolver: String,
    note: String,
}

pub async fn unhalt(State(state): State<AppState>, headers: HeaderMap, Json(body): Json<UnhaltRequest>) -> Result<StatusCode, ApiError> {
    authorize(&headers, &state)?;
    state.engine.safety.clear_emergency_halt(&state.engine.pool, &body.resolver, &body.note).await.map_err(ApiError::internal)?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Deserialize)]
pub struct PrincipalRequest {
    principal: String,
}

pub async fn blocklist(State(state): State<AppState>, headers: HeaderMap, Json(body): Json<PrincipalRequest>) -> Result<StatusCode, ApiError> {
    authorize(&headers, &state)?;
    state.engine.safety.add_to_blocklist(&body.principal);
    Ok(StatusCode::NO_CONTENT)
}

pub async fn allowlist(State(state): State<AppState>, headers: HeaderMap, Json(body): Json<PrincipalRequest>) -> Result<StatusCode, ApiError> {
    authorize(&headers, &state)?;
    state.engine.safety.add_to_allowlist(&body.principal);
    Ok(StatusCode::NO_CONTENT)
}

pub async fn metrics(State(state): State<AppState>) -> Response {
    let encoder = TextEncoder::new();
    let metric_families = state.engine.metrics.registry.gather();
    let mut buffer = Vec::new();
    if encoder.encode(&metric_families, &mut buffer).is_err() {
        return (StatusCode::INTERNAL_SERVER_ERROR, "failed to encode metrics").into_response();
    }
    match Response::builder().header(header::CONTENT_TYPE, encoder.format_type()).body(axum::body::Body::from(buffer)) {
        Ok(resp) => resp,
        Err(_) => (StatusCode::INTERNAL_SERVER_ERROR, "failed to build metrics response").into_response(),
    }
}

/// Narrow bearer-token auth seam for the mutating routes (§10.4) — a
/// full authentication system is out of scope, but this is where one
/// would be dropped in.
fn authorize(headers: &HeaderMap, state: &AppState) -> Result<(), ApiError> {
    let provided = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    match provided {
        Some(token) if token == state.engine.config.operator_auth_token => Ok(()),
        _ => Err(ApiError::Unauthorized),
    }
}

pub enum ApiError {
    NotFound,
    Conflict(String),
    Unauthorized,
    Internal(String),
}

impl ApiError {
    fn internal(e: impl std::fmt::Display) -> Self {
        ApiError::Internal(e.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound => (StatusCode::NOT_FOUND, "not found".to_string()),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, "missing or invalid bearer token".to_string()),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}
