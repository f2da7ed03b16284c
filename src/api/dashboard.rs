// =============================================================================
// Dashboard service — read-only aggregations + control endpoints (§2.14)
// =============================================================================
//
// Everything here requires the admin bearer token (`AuthBearer`), unlike the
// per-account api-key auth the ingestion surface uses — this is the human
// operator's surface, not the EA's.

use std::sync::Arc;

use axum::{
    extract::{Json, Path, State},
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::api::auth::AuthBearer;
use crate::api::error::{ApiError, ApiResult};
use crate::app_state::AppState;
use crate::db::repo;
use crate::types::{CloseReason, Direction, SymbolConfigStatus};

pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);

    Router::new()
        .route("/api/v1/health", get(health))
        .route("/api/v1/accounts", get(accounts))
        .route("/api/v1/accounts/:account_id/positions", get(positions))
        .route("/api/v1/decisions", get(decisions))
        .route("/api/v1/control/:account_id/enable", post(enable_trading))
        .route("/api/v1/control/:account_id/disable", post(disable_trading))
        .route("/api/v1/control/:account_id/close-all", post(close_all))
        .route("/api/v1/control/:account_id/pause-symbol", post(pause_symbol))
        .route("/api/v1/control/:account_id/reset-breaker", post(reset_breaker))
        .layer(cors)
        .with_state(state)
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    server_time: i64,
}

async fn health() -> impl IntoResponse {
    Json(HealthResponse { status: "ok", server_time: chrono::Utc::now().timestamp_millis() })
}

async fn accounts(_auth: AuthBearer, State(state): State<Arc<AppState>>) -> ApiResult<impl IntoResponse> {
    Ok(Json(repo::all_accounts(&state.db).await?))
}

async fn positions(_auth: AuthBearer, State(state): State<Arc<AppState>>, Path(account_id): Path<String>) -> ApiResult<impl IntoResponse> {
    Ok(Json(repo::open_trades(&state.db, Some(&account_id)).await?))
}

async fn decisions(_auth: AuthBearer, State(state): State<Arc<AppState>>) -> ApiResult<impl IntoResponse> {
    let rows = repo::recent_decisions(&state.db, 100).await?;
    let body: Vec<_> = rows.into_iter().map(|(id, decision_type, reason)| serde_json::json!({
        "id": id, "decision_type": decision_type, "reason": reason,
    })).collect();
    Ok(Json(body))
}

async fn require_account(state: &AppState, account_id: &str) -> ApiResult<crate::db::models::Account> {
    repo::get_account(&state.db, account_id)
        .await?
        .ok_or_else(|| ApiError::ValidationFailure(format!("unknown account {account_id}")))
}

async fn enable_trading(_auth: AuthBearer, State(state): State<Arc<AppState>>, Path(account_id): Path<String>) -> ApiResult<()> {
    require_account(&state, &account_id).await?;
    info!(account_id, "auto-trading enabled via dashboard");
    repo::set_auto_trading(&state.db, &account_id, true).await?;
    Ok(())
}

async fn disable_trading(_auth: AuthBearer, State(state): State<Arc<AppState>>, Path(account_id): Path<String>) -> ApiResult<()> {
    require_account(&state, &account_id).await?;
    info!(account_id, "auto-trading disabled via dashboard");
    repo::set_auto_trading(&state.db, &account_id, false).await?;
    Ok(())
}

/// Force-closes every open position for the account at the current market
/// price, the same emergency path §4.9's drawdown breaker uses.
async fn close_all(_auth: AuthBearer, State(state): State<Arc<AppState>>, Path(account_id): Path<String>) -> ApiResult<impl IntoResponse> {
    let account = require_account(&state, &account_id).await?;
    let mut closed = 0;
    for trade in repo::open_trades(&state.db, Some(&account_id)).await? {
        let price = repo::latest_tick(&state.db, &trade.instrument).await?.map(|t| t.bid).unwrap_or(trade.open_price);
        crate::trade_monitor::emergency_close(&state.db, &account, &trade, price, CloseReason::Manual, "dashboard close-all").await?;
        closed += 1;
    }
    info!(account_id, closed, "close-all executed via dashboard");
    Ok(Json(serde_json::json!({ "closed": closed })))
}

#[derive(Deserialize)]
struct PauseSymbolRequest {
    instrument: String,
    direction: Direction,
    reason: String,
}

async fn pause_symbol(
    _auth: AuthBearer,
    State(state): State<Arc<AppState>>,
    Path(account_id): Path<String>,
    Json(req): Json<PauseSymbolRequest>,
) -> ApiResult<()> {
    require_account(&state, &account_id).await?;
    let mut cfg = repo::get_symbol_config(&state.db, &account_id, &req.instrument, req.direction).await?;
    cfg.status = SymbolConfigStatus::Paused;
    cfg.pause_reason = Some(req.reason.clone());
    cfg.paused_at = Some(chrono::Utc::now());
    cfg.updated_by = Some("dashboard".to_string());
    repo::upsert_symbol_config(&state.db, &cfg).await?;
    info!(account_id, instrument = %req.instrument, reason = %req.reason, "symbol paused via dashboard");
    Ok(())
}

async fn reset_breaker(_auth: AuthBearer, State(state): State<Arc<AppState>>, Path(account_id): Path<String>) -> ApiResult<()> {
    require_account(&state, &account_id).await?;
    info!(account_id, "circuit breaker reset via dashboard");
    repo::reset_breaker(&state.db, &account_id).await?;
    repo::reset_command_failures(&state.db, &account_id).await?;
    Ok(())
}
