// =============================================================================
// EA Ingestion Surface — Axum 0.7 (§3)
// =============================================================================
//
// Seven endpoints accepting messages from the MT5 expert advisor: connect,
// heartbeat, tick_batch, ohlc_batch, trade_update, command_response, log.
// Authentication is per-account (api_key field or `x-api-key` header), not
// the admin bearer token used by the dashboard — each request is scoped to
// exactly one account and touches only that account's rows.
// =============================================================================

use std::sync::Arc;

use axum::{
    extract::{Json, State},
    routing::post,
    Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::api::error::{ApiError, ApiResult};
use crate::app_state::AppState;
use crate::command_queue;
use crate::db::models::{BrokerSymbol, Command, SubscribedSymbol, Tick, Trade};
use crate::db::repo;
use crate::types::{CloseReason, CommandStatus, Direction, TradeSource, TradeStatus};

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/v1/ea/connect", post(connect))
        .route("/api/v1/ea/heartbeat", post(heartbeat))
        .route("/api/v1/ea/tick_batch", post(tick_batch))
        .route("/api/v1/ea/ohlc_batch", post(ohlc_batch))
        .route("/api/v1/ea/trade_update", post(trade_update))
        .route("/api/v1/ea/command_response", post(command_response))
        .route("/api/v1/ea/log", post(log))
        .with_state(state)
}

/// Verify `api_key` against the stored account and return the row. A missing
/// account is also an `AuthFailure` — existence isn't distinguishable from a
/// bad key to the caller.
async fn authenticate(state: &AppState, account_id: &str, api_key: &str) -> ApiResult<crate::db::models::Account> {
    let account = repo::get_account(&state.db, account_id)
        .await?
        .ok_or(ApiError::AuthFailure("unknown account or api key"))?;
    if account.api_key != api_key {
        return Err(ApiError::AuthFailure("unknown account or api key"));
    }
    Ok(account)
}

// =============================================================================
// connect
// =============================================================================

#[derive(Deserialize)]
struct ConnectRequest {
    account: String,
    broker: String,
    symbols: Vec<BrokerSymbolPayload>,
}

#[derive(Deserialize)]
struct BrokerSymbolPayload {
    instrument: String,
    digits: i64,
    point: f64,
    min_volume: f64,
    max_volume: f64,
    step_volume: f64,
    contract_size: f64,
    tick_size: f64,
    tick_value: f64,
    stops_level: f64,
    #[serde(default = "default_max_spread_pips")]
    max_spread_pips: f64,
}

fn default_max_spread_pips() -> f64 {
    3.0
}

#[derive(Serialize)]
struct ConnectResponse {
    account: String,
    api_key: String,
}

/// First contact from an EA. Creates the account (server-issues an api key)
/// if it doesn't exist yet, and upserts every subscribed symbol's broker spec.
async fn connect(State(state): State<Arc<AppState>>, Json(req): Json<ConnectRequest>) -> ApiResult<Json<ConnectResponse>> {
    if req.account.trim().is_empty() {
        return Err(ApiError::ValidationFailure("account must not be empty".into()));
    }

    let account = match repo::get_account(&state.db, &req.account).await? {
        Some(existing) => existing,
        None => {
            let api_key = uuid::Uuid::new_v4().to_string();
            info!(account_id = %req.account, broker = %req.broker, "new account connected");
            repo::create_account(&state.db, &req.account, &req.broker, &api_key).await?
        }
    };

    for symbol in req.symbols {
        let broker_symbol = BrokerSymbol {
            instrument: symbol.instrument.clone(),
            digits: symbol.digits,
            point: symbol.point,
            min_volume: symbol.min_volume,
            max_volume: symbol.max_volume,
            step_volume: symbol.step_volume,
            contract_size: symbol.contract_size,
            tick_size: symbol.tick_size,
            tick_value: symbol.tick_value,
            stops_level: symbol.stops_level,
            max_spread_pips: symbol.max_spread_pips,
        };
        if !broker_symbol.is_valid() {
            warn!(instrument = %symbol.instrument, "rejected invalid broker symbol spec on connect");
            continue;
        }
        repo::upsert_broker_symbol(&state.db, &broker_symbol).await?;
        repo::upsert_subscribed_symbol(
            &state.db,
            &SubscribedSymbol { account_id: account.account_id.clone(), instrument: symbol.instrument, active: true, shadow_mode: false },
        )
        .await?;
    }

    Ok(Json(ConnectResponse { account: account.account_id, api_key: account.api_key }))
}

// =============================================================================
// heartbeat
// =============================================================================

#[derive(Deserialize)]
struct HeartbeatRequest {
    account: String,
    api_key: String,
    balance: f64,
    equity: f64,
    margin: f64,
    free_margin: f64,
    /// Tickets the EA currently sees open, used to detect trades MT5 has
    /// silently closed (§4.8 Stale reconciliation). Omitted by older EAs.
    #[serde(default)]
    open_tickets: Option<Vec<String>>,
}

#[derive(Serialize)]
struct HeartbeatResponse {
    symbols: Vec<String>,
    pending_commands: Vec<Command>,
}

/// Refreshes balance/equity/heartbeat timestamp and returns a batch of
/// pending commands, atomically transitioned to `in_flight` (§4.7).
async fn heartbeat(State(state): State<Arc<AppState>>, Json(req): Json<HeartbeatRequest>) -> ApiResult<Json<HeartbeatResponse>> {
    let account = authenticate(&state, &req.account, &req.api_key).await?;

    repo::touch_heartbeat(&state.db, &account.account_id, req.balance, req.equity, req.margin, req.free_margin).await?;
    repo::maybe_roll_daily_baseline(&state.db, &account).await?;
    repo::update_peak_equity(&state.db, &account.account_id, req.equity).await?;
    if let Some(tickets) = &req.open_tickets {
        repo::record_reconciliation(&state.db, &account.account_id, tickets).await?;
    }

    let subs = repo::subscribed_symbols(&state.db, &account.account_id).await?;
    let symbols = subs.into_iter().map(|s| s.instrument).collect();
    let pending_commands = command_queue::deliver_pending(&state.db, &account.account_id, command_queue::DEFAULT_DELIVERY_LIMIT).await?;

    Ok(Json(HeartbeatResponse { symbols, pending_commands }))
}

// =============================================================================
// tick_batch
// =============================================================================

#[derive(Deserialize)]
struct TickPayload {
    instrument: String,
    bid: f64,
    ask: f64,
    volume: f64,
    timestamp: DateTime<Utc>,
    tradeable: bool,
}

#[derive(Deserialize)]
struct TickBatchRequest {
    account: String,
    api_key: String,
    ticks: Vec<TickPayload>,
}

#[derive(Serialize)]
struct TickBatchResponse {
    accepted: usize,
    rejected: usize,
}

/// Deduplicates by (instrument, timestamp) and pushes the newest tick per
/// instrument into the cache (§3, target rate 50-250ms/1-50 ticks).
async fn tick_batch(State(state): State<Arc<AppState>>, Json(req): Json<TickBatchRequest>) -> ApiResult<Json<TickBatchResponse>> {
    authenticate(&state, &req.account, &req.api_key).await?;

    let mut accepted = 0;
    let mut rejected = 0;
    for payload in req.ticks {
        if payload.bid <= 0.0 || payload.ask <= 0.0 || payload.volume < 0.0 {
            rejected += 1;
            continue;
        }
        let tick = Tick {
            instrument: payload.instrument.clone(),
            timestamp: payload.timestamp,
            bid: payload.bid,
            ask: payload.ask,
            volume: payload.volume,
            tradeable: payload.tradeable,
        };
        if repo::insert_tick_if_new(&state.db, &tick).await? {
            state.caches.latest_tick.put(tick.instrument.clone(), tick);
            accepted += 1;
        }
    }

    Ok(Json(TickBatchResponse { accepted, rejected }))
}

// =============================================================================
// ohlc_batch
// =============================================================================

#[derive(Deserialize)]
struct OhlcPayload {
    instrument: String,
    timeframe: String,
    open_time: DateTime<Utc>,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: f64,
}

#[derive(Deserialize)]
struct OhlcBatchRequest {
    account: String,
    api_key: String,
    candles: Vec<OhlcPayload>,
}

#[derive(Serialize)]
struct OhlcBatchResponse {
    accepted: usize,
    rejected: usize,
}

async fn ohlc_batch(State(state): State<Arc<AppState>>, Json(req): Json<OhlcBatchRequest>) -> ApiResult<Json<OhlcBatchResponse>> {
    authenticate(&state, &req.account, &req.api_key).await?;

    let mut accepted = 0;
    let mut rejected = 0;
    for payload in req.candles {
        let candle = crate::db::models::Ohlc {
            instrument: payload.instrument,
            timeframe: payload.timeframe,
            open_time: payload.open_time,
            open: payload.open,
            high: payload.high,
            low: payload.low,
            close: payload.close,
            volume: payload.volume,
        };
        if !candle.is_valid() {
            rejected += 1;
            continue;
        }
        repo::upsert_ohlc(&state.db, &candle).await?;
        accepted += 1;
    }

    Ok(Json(OhlcBatchResponse { accepted, rejected }))
}

// =============================================================================
// trade_update
// =============================================================================

#[derive(Deserialize)]
struct TradeUpdateRequest {
    account: String,
    api_key: String,
    ticket: String,
    instrument: String,
    direction: Direction,
    volume: f64,
    open_price: f64,
    open_time: DateTime<Utc>,
    sl: f64,
    tp: f64,
    status: TradeStatus,
    close_price: Option<f64>,
    close_time: Option<DateTime<Utc>>,
    profit: Option<f64>,
    commission: f64,
    swap: f64,
    signal_id: Option<String>,
    command_id: Option<String>,
}

/// Opens a trade on first report (`status = open`), or closes it on a later
/// report (`status = closed`). A `trade_update` for an unknown ticket with
/// `status = open` is treated as an `ea_command`/manual fill the core never
/// itself requested.
async fn trade_update(State(state): State<Arc<AppState>>, Json(req): Json<TradeUpdateRequest>) -> ApiResult<()> {
    let account = authenticate(&state, &req.account, &req.api_key).await?;

    let existing = repo::get_trade(&state.db, &account.account_id, &req.ticket).await?;

    match (existing, req.status) {
        (None, TradeStatus::Open) => {
            let now = Utc::now();
            let tick = repo::latest_tick(&state.db, &req.instrument).await?;
            let source = if req.command_id.is_some() { TradeSource::Autotrade } else { TradeSource::EaCommand };
            let trade = Trade {
                account_id: account.account_id.clone(),
                ticket: req.ticket.clone(),
                instrument: req.instrument.clone(),
                direction: req.direction,
                volume: req.volume,
                open_price: req.open_price,
                open_time: req.open_time,
                close_price: None,
                close_time: None,
                sl: req.sl,
                tp: req.tp,
                initial_sl: req.sl,
                initial_tp: req.tp,
                profit: 0.0,
                commission: req.commission,
                swap: req.swap,
                status: TradeStatus::Open,
                source,
                close_reason: None,
                signal_id: req.signal_id,
                command_id: req.command_id,
                session: Some(crate::session::session_for(now).to_string()),
                trailing_stop_active: false,
                trailing_stop_moves: 0,
                tp_extended_count: 0,
                hold_duration_minutes: None,
                pips_captured: None,
                risk_reward_realized: None,
                mfe: 0.0,
                mae: 0.0,
                entry_volatility: None,
                entry_spread: tick.as_ref().map(|t| t.spread()),
                entry_bid: tick.as_ref().map(|t| t.bid),
                entry_ask: tick.as_ref().map(|t| t.ask),
                last_trail_update: None,
                last_reconcile_miss: false,
            };
            repo::insert_trade(&state.db, &trade).await?;
        }
        (Some(trade), TradeStatus::Closed) if trade.status == TradeStatus::Open => {
            let close_price = req.close_price.unwrap_or(trade.open_price);
            let close_time = req.close_time.unwrap_or_else(Utc::now);
            let profit = req.profit.unwrap_or(0.0);
            repo::close_trade(&state.db, &account.account_id, &req.ticket, close_price, close_time, profit, CloseReason::Manual).await?;
        }
        (Some(_), _) => {
            // Already-known, already-closed, or a redundant open report — no-op.
        }
        (None, TradeStatus::Closed) | (None, TradeStatus::Pending) => {
            return Err(ApiError::ConflictFailure(format!("unknown ticket {} reported with status {:?}", req.ticket, req.status)));
        }
    }

    Ok(())
}

// =============================================================================
// command_response
// =============================================================================

#[derive(Deserialize)]
struct CommandResponseRequest {
    account: String,
    api_key: String,
    command_id: String,
    success: bool,
    response: Option<String>,
    error_message: Option<String>,
    ticket: Option<String>,
}

async fn command_response(State(state): State<Arc<AppState>>, Json(req): Json<CommandResponseRequest>) -> ApiResult<()> {
    let account = authenticate(&state, &req.account, &req.api_key).await?;

    let command = repo::get_command(&state.db, &req.command_id)
        .await?
        .ok_or_else(|| ApiError::ValidationFailure(format!("unknown command {}", req.command_id)))?;
    if command.account_id != account.account_id {
        return Err(ApiError::ConflictFailure("command belongs to a different account".into()));
    }

    let status = if req.success { CommandStatus::Completed } else { CommandStatus::Failed };
    command_queue::acknowledge(&state.db, &req.command_id, status, req.response.as_deref(), req.error_message.as_deref(), req.ticket.as_deref())
        .await?;

    if req.success {
        repo::reset_command_failures(&state.db, &account.account_id).await?;
    } else {
        let failures = repo::increment_command_failures(&state.db, &account.account_id).await?;
        warn!(account_id = %account.account_id, command_id = %req.command_id, failures, "EA reported command failure");
        if failures >= state.config.auto_trader.consecutive_failure_breaker {
            repo::trip_breaker(&state.db, &account.account_id, "consecutive command failures", true).await?;
        }
    }

    Ok(())
}

// =============================================================================
// log
// =============================================================================

#[derive(Deserialize)]
struct LogRequest {
    account: String,
    api_key: String,
    level: String,
    message: String,
    details: Option<String>,
}

async fn log(State(state): State<Arc<AppState>>, Json(req): Json<LogRequest>) -> ApiResult<()> {
    let account = authenticate(&state, &req.account, &req.api_key).await?;
    repo::insert_log(&state.db, &req.level, &req.message, req.details.as_deref(), Some(&account.account_id)).await?;
    Ok(())
}
