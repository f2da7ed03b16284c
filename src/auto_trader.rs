// =============================================================================
// Auto-trader — gatekeeper from signals to trade commands (§4.6)
// =============================================================================
//
// Twelve gates run in sequence for every active, valid signal not yet acted
// on. The first gate that rejects stops the pipeline; every outcome (accept
// or reject) is written to the decision log. Grounded on the reference risk
// engine's circuit-breaker bookkeeping (`RwLock<Inner>` + persisted flags)
// and the execution engine's pre-check-then-act shape.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use serde_json::json;
use tracing::{info, warn};

use crate::correlation::correlation_group;
use crate::db::models::{Account, Command, TradingSignal};
use crate::db::{repo, Db};
use crate::types::{CommandStatus, CommandType, DecisionType, Direction, SymbolConfigStatus};

/// Tunable knobs for the gate pipeline (§4.6, defaults as specified).
#[derive(Debug, Clone, Copy)]
pub struct AutoTraderConfig {
    pub max_signal_age_secs: i64,
    pub signal_warn_age_secs: i64,
    pub max_correlated_positions: usize,
    pub max_open_positions: usize,
    pub max_tick_age_secs: i64,
    pub command_timeout_secs: i64,
    pub risk_per_trade_pct: f64,
    pub daily_loss_breaker_pct: f64,
    pub drawdown_breaker_pct: f64,
    pub consecutive_failure_breaker: i64,
    pub breaker_cooldown_secs: i64,
}

impl Default for AutoTraderConfig {
    fn default() -> Self {
        Self {
            max_signal_age_secs: 300,
            signal_warn_age_secs: 120,
            max_correlated_positions: 2,
            max_open_positions: 10,
            max_tick_age_secs: 60,
            command_timeout_secs: 300,
            risk_per_trade_pct: 1.0,
            daily_loss_breaker_pct: 5.0,
            drawdown_breaker_pct: 20.0,
            // The dedicated circuit-breaker threshold (≥5 consecutive command
            // failures) is authoritative over the acknowledgement note's "three
            // consecutive failures" — five is used everywhere in this module.
            consecutive_failure_breaker: 5,
            breaker_cooldown_secs: 300,
        }
    }
}

/// Outcome of running the gate pipeline for one signal.
#[derive(Debug, Clone)]
pub enum GateOutcome {
    Accepted { command_id: String },
    HandedToShadow,
    Rejected { step: &'static str, reason: String },
}

fn command_id(signal_id: &str, timestamp: DateTime<Utc>) -> String {
    let mut hasher = DefaultHasher::new();
    signal_id.hash(&mut hasher);
    timestamp.timestamp_nanos_opt().unwrap_or(0).hash(&mut hasher);
    format!("{:016x}", hasher.finish())
}

/// Evaluate and, if accepted, emit a command for `signal` on behalf of `account`.
pub async fn process_signal(
    db: &Db,
    account: &Account,
    signal: &TradingSignal,
    cfg: &AutoTraderConfig,
) -> Result<GateOutcome> {
    let now = Utc::now();

    // 1. Staleness gate.
    let age_secs = (now - signal.created_at).num_seconds();
    if age_secs >= cfg.max_signal_age_secs {
        return reject(db, account, signal, "staleness", "signal older than max age").await;
    }
    if age_secs > cfg.signal_warn_age_secs {
        warn!(signal_id = %signal.id, age_secs, "signal approaching staleness limit");
    }

    // 2. Global gate.
    if !account.auto_trading_enabled {
        return reject(db, account, signal, "global", "auto-trading disabled").await;
    }
    if account.breaker_tripped {
        return reject(db, account, signal, "global", "circuit breaker tripped").await;
    }

    // 3. Dynamic-risk gate.
    let daily_loss_pct = if account.daily_start_balance > 0.0 {
        ((account.daily_start_balance - account.equity) / account.daily_start_balance) * 100.0
    } else {
        0.0
    };
    if daily_loss_pct >= cfg.daily_loss_breaker_pct {
        return reject(db, account, signal, "dynamic_risk", "daily loss limit reached").await;
    }

    // 4. Symbol-config gate.
    let symbol_cfg =
        repo::get_symbol_config(db, &account.account_id, &signal.instrument, signal.direction).await?;
    match symbol_cfg.status {
        SymbolConfigStatus::Paused | SymbolConfigStatus::Disabled => {
            return reject(db, account, signal, "symbol_config", "symbol paused or disabled").await;
        }
        SymbolConfigStatus::ShadowTrade => {
            return Ok(GateOutcome::HandedToShadow);
        }
        SymbolConfigStatus::Active | SymbolConfigStatus::ReducedRisk => {}
    }

    // 5. Confidence gate.
    if signal.confidence < symbol_cfg.min_confidence_threshold {
        return reject(db, account, signal, "confidence", "confidence below symbol threshold").await;
    }

    // 6. Correlation gate.
    let open = repo::open_trades(db, Some(&account.account_id)).await?;
    let group = correlation_group(&signal.instrument);
    let correlated_count = open.iter().filter(|t| correlation_group(&t.instrument) == group).count();
    if correlated_count >= cfg.max_correlated_positions {
        return reject(db, account, signal, "correlation", "too many correlated positions open").await;
    }

    // 7. Position-count gate.
    if open.len() >= cfg.max_open_positions {
        return reject(db, account, signal, "position_count", "max open positions reached").await;
    }

    // 8. Spread gate.
    let tick = repo::latest_tick(db, &signal.instrument).await?;
    let tick = match tick {
        Some(t) => t,
        None => return reject(db, account, signal, "spread", "no tick available").await,
    };
    let tick_age = (now - tick.timestamp).num_seconds();
    if tick_age > cfg.max_tick_age_secs {
        return reject(db, account, signal, "spread", "latest tick is stale").await;
    }
    let broker = repo::get_broker_symbol(db, &signal.instrument)
        .await?
        .context("no broker symbol metadata for instrument")?;
    let spread_points = tick.spread() / broker.point;
    let rolling_avg = repo::rolling_avg_spread(db, &signal.instrument, 20)
        .await?
        .map(|avg| avg / broker.point)
        .unwrap_or(spread_points);
    let max_allowed = broker.max_spread_pips.max(3.0 * rolling_avg);
    if spread_points >= max_allowed {
        return reject(db, account, signal, "spread", "spread exceeds max allowed").await;
    }

    // 9. SL-enforcement gate (first-class): must be non-zero and on the
    // correct side of entry before anything downstream touches it.
    let sl_valid = match signal.direction {
        Direction::Buy => signal.sl > 0.0 && signal.sl < signal.entry,
        Direction::Sell => signal.sl > 0.0 && signal.sl > signal.entry,
    };
    if !sl_valid {
        return reject(db, account, signal, "sl_enforcement", "signal SL is zero or on the wrong side").await;
    }

    // 10. Position sizing.
    let confidence_factor = (signal.confidence / 100.0).clamp(0.1, 1.0);
    let volume = size_position(
        account.equity,
        cfg.risk_per_trade_pct / 100.0,
        symbol_cfg.risk_multiplier,
        confidence_factor,
        signal.entry,
        signal.sl,
        broker.tick_value,
        broker.point,
        broker.min_volume,
        broker.max_volume,
        broker.step_volume,
    );

    // 11. Command emission.
    let cmd_id = command_id(&signal.id, now);
    let payload = json!({
        "instrument": signal.instrument,
        "direction": signal.direction,
        "volume": volume,
        "sl": signal.sl,
        "tp": signal.tp,
        "entry_hint": signal.entry,
        "comment": signal.id,
    });

    let command = Command {
        id: cmd_id.clone(),
        account_id: account.account_id.clone(),
        command_type: CommandType::OpenTrade,
        payload: payload.to_string(),
        status: CommandStatus::Pending,
        created_at: now,
        picked_at: None,
        completed_at: None,
        timeout_at: now + Duration::minutes(5),
        error_message: None,
        response: None,
        ticket: None,
        redelivery_count: 0,
    };
    repo::insert_command(db, &command).await?;
    repo::mark_signal_status(db, &signal.id, crate::types::SignalStatus::Executed).await?;

    // 12. Decision log.
    repo::insert_decision(
        db,
        DecisionType::TradeOpen,
        Some(&account.account_id),
        Some(&signal.instrument),
        "ACCEPT",
        "all gates passed",
        Some(&payload.to_string()),
    )
    .await?;

    info!(signal_id = %signal.id, command_id = %cmd_id, volume, "signal accepted, command emitted");
    Ok(GateOutcome::Accepted { command_id: cmd_id })
}

async fn reject(
    db: &Db,
    account: &Account,
    signal: &TradingSignal,
    step: &'static str,
    reason: &str,
) -> Result<GateOutcome> {
    repo::insert_decision(
        db,
        DecisionType::TradeSkip,
        Some(&account.account_id),
        Some(&signal.instrument),
        "REJECT",
        &format!("{step}: {reason}"),
        None,
    )
    .await?;
    Ok(GateOutcome::Rejected { step, reason: reason.to_string() })
}

/// Risk-based position sizing (§4.6 step 10). Falls back to the 0.01 safety
/// floor on any degenerate input and never returns above the 1.0 lot cap.
#[allow(clippy::too_many_arguments)]
pub fn size_position(
    equity: f64,
    risk_per_trade: f64,
    risk_multiplier: f64,
    confidence_factor: f64,
    entry: f64,
    sl: f64,
    point_value: f64,
    point: f64,
    min_volume: f64,
    max_volume: f64,
    step_volume: f64,
) -> f64 {
    let sl_distance = (entry - sl).abs();
    if sl_distance <= 0.0 || point_value <= 0.0 || point <= 0.0 {
        return 0.01;
    }

    let risk_amount = equity * risk_per_trade * risk_multiplier * confidence_factor;
    let points = sl_distance / point;
    let raw = risk_amount / (points * point_value);

    if !raw.is_finite() || raw <= 0.0 {
        return 0.01;
    }

    let stepped = (raw / step_volume).floor() * step_volume;
    stepped.clamp(min_volume.max(0.01), max_volume.min(1.0))
}

/// Run every auto-trader loop (§4.6 Command acknowledgement): sweep commands
/// past `timeout_at`, and for any exhausted this sweep, bump the account's
/// consecutive-failure counter and trip the breaker once it reaches the
/// configured threshold.
pub async fn check_pending_commands(db: &Db, account: &Account, cfg: &AutoTraderConfig) -> Result<()> {
    let failed = crate::command_queue::sweep_stale(db).await?;
    for cmd in failed.into_iter().filter(|c| c.account_id == account.account_id) {
        warn!(command_id = %cmd.id, "COMMAND TIMEOUT");
        let failures = repo::increment_command_failures(db, &account.account_id).await?;
        if failures >= cfg.consecutive_failure_breaker {
            trip_for_failures(db, account, failures).await?;
        }
    }
    Ok(())
}

async fn trip_for_failures(db: &Db, account: &Account, failures: i64) -> Result<()> {
    let reason = format!("{failures} consecutive command failures");
    repo::trip_breaker(db, &account.account_id, &reason, true).await?;
    repo::insert_decision(
        db,
        DecisionType::CircuitBreaker,
        Some(&account.account_id),
        None,
        "TRIPPED",
        &reason,
        None,
    )
    .await?;
    Ok(())
}

/// Evaluate loss-type breaker conditions (§4.6 Circuit breaker (a)/(b)) and
/// trip if either is exceeded. Loss-type trips have no auto-resume.
pub async fn check_loss_breakers(db: &Db, account: &Account, cfg: &AutoTraderConfig) -> Result<()> {
    if account.breaker_tripped {
        return Ok(());
    }

    let daily_loss_pct = if account.daily_start_balance > 0.0 {
        ((account.daily_start_balance - account.equity) / account.daily_start_balance) * 100.0
    } else {
        0.0
    };
    if daily_loss_pct >= cfg.daily_loss_breaker_pct {
        let reason = format!("daily loss {daily_loss_pct:.2}% >= {:.2}%", cfg.daily_loss_breaker_pct);
        repo::trip_breaker(db, &account.account_id, &reason, false).await?;
        repo::insert_decision(db, DecisionType::CircuitBreaker, Some(&account.account_id), None, "TRIPPED", &reason, None)
            .await?;
        return Ok(());
    }

    let drawdown_pct = if account.peak_equity_today > 0.0 {
        ((account.peak_equity_today - account.equity) / account.peak_equity_today) * 100.0
    } else {
        0.0
    };
    if drawdown_pct >= cfg.drawdown_breaker_pct {
        let reason = format!("drawdown {drawdown_pct:.2}% >= {:.2}%", cfg.drawdown_breaker_pct);
        repo::trip_breaker(db, &account.account_id, &reason, false).await?;
        repo::insert_decision(db, DecisionType::CircuitBreaker, Some(&account.account_id), None, "TRIPPED", &reason, None)
            .await?;
    }
    Ok(())
}

/// Auto-resume failure-type trips once the cooldown has elapsed (§4.6).
/// Loss-type trips are excluded and require a manual reset.
pub async fn maybe_auto_resume(db: &Db, account: &Account, cfg: &AutoTraderConfig) -> Result<bool> {
    if !account.breaker_tripped || !account.breaker_is_failure_type {
        return Ok(false);
    }
    let Some(tripped_at) = account.breaker_tripped_at else {
        return Ok(false);
    };
    if (Utc::now() - tripped_at).num_seconds() < cfg.breaker_cooldown_secs {
        return Ok(false);
    }
    repo::reset_breaker(db, &account.account_id).await?;
    repo::set_auto_trading(db, &account.account_id, true).await?;
    repo::insert_decision(
        db,
        DecisionType::AutotradingEnabled,
        Some(&account.account_id),
        None,
        "AUTO_RESUME",
        "cooldown elapsed after failure-type breaker trip",
        None,
    )
    .await?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sizing_falls_back_on_zero_sl_distance() {
        let volume = size_position(10000.0, 0.01, 1.0, 1.0, 1.1000, 1.1000, 10.0, 0.0001, 0.01, 100.0, 0.01);
        assert_eq!(volume, 0.01);
    }

    #[test]
    fn sizing_respects_max_cap() {
        let volume = size_position(1_000_000.0, 0.05, 2.0, 1.0, 1.1000, 1.0000, 1000.0, 0.0001, 0.01, 100.0, 0.01);
        assert!(volume <= 1.0);
    }

    #[test]
    fn sizing_respects_min_floor() {
        let volume = size_position(100.0, 0.001, 0.1, 0.1, 1.1000, 1.0990, 1.0, 0.0001, 0.01, 100.0, 0.01);
        assert!(volume >= 0.01);
    }

    #[test]
    fn command_id_is_deterministic_for_same_inputs() {
        let ts = Utc::now();
        assert_eq!(command_id("abc", ts), command_id("abc", ts));
    }
}
