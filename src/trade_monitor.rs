// =============================================================================
// Trade monitor — per-open-trade lifecycle management (§4.8)
// =============================================================================
//
// Runs every 5s over every open trade. Steps are independent and all run
// each pass rather than short-circuiting on the first action: a trade can
// both trail its stop and take a partial close in the same tick. Grounded
// on the auto-trader's "gate records outcome via the decision log" shape,
// adapted here to a non-rejecting per-step model since there's no pipeline
// to abort — a trade stays open and gets re-evaluated next pass regardless.

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use crate::db::models::{Account, Command, Trade};
use crate::db::{repo, Db};
use crate::types::{CloseReason, CommandStatus, CommandType, DecisionType, Direction, Session};

/// Emit a command for the EA to execute against an already-open ticket. The
/// trade row is updated optimistically at the same time; the reconcile-miss
/// check is the safety net if the EA never applies it.
async fn emit_command(db: &Db, account: &Account, command_type: CommandType, payload: serde_json::Value, ticket: &str) -> Result<()> {
    let now = Utc::now();
    let command = Command {
        id: Uuid::new_v4().to_string(),
        account_id: account.account_id.clone(),
        command_type,
        payload: payload.to_string(),
        status: CommandStatus::Pending,
        created_at: now,
        picked_at: None,
        completed_at: None,
        timeout_at: now + Duration::minutes(5),
        error_message: None,
        response: None,
        ticket: Some(ticket.to_string()),
        redelivery_count: 0,
    };
    repo::insert_command(db, &command).await
}

/// Tunables for the four-stage trailing stop and related guardrails (§4.8).
#[derive(Debug, Clone, Copy)]
pub struct TrailingStopConfig {
    pub min_sl_distance_points: f64,
    pub max_sl_move_per_update: f64,
    pub rate_limit_secs: i64,
}

impl Default for TrailingStopConfig {
    fn default() -> Self {
        Self {
            min_sl_distance_points: 10.0,
            max_sl_move_per_update: 100.0,
            rate_limit_secs: 5,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct TradeMonitorConfig {
    pub trailing: TrailingStopConfig,
    pub scalping_max_hold_minutes: i64,
    pub swing_max_hold_minutes: i64,
    pub strategy_revalidation_loss_eur: f64,
}

impl Default for TradeMonitorConfig {
    fn default() -> Self {
        Self {
            trailing: TrailingStopConfig::default(),
            scalping_max_hold_minutes: 60,
            swing_max_hold_minutes: 1440,
            strategy_revalidation_loss_eur: -5.0,
        }
    }
}

/// Current price and point size needed to evaluate one trade this tick.
pub struct TradeTick {
    pub price: f64,
    pub point: f64,
}

/// What happened to a trade this pass. A trade can produce several.
#[derive(Debug, Clone)]
pub enum TradeAction {
    ModifiedSl { sl: f64 },
    PartialClosed { closed_volume: f64 },
    Closed(CloseReason),
    /// Caller must re-run signal generation for this instrument/direction and
    /// report back via [`apply_revalidation`] — the monitor has no access to
    /// the indicator/pattern pipeline itself.
    NeedsRevalidation,
}

/// Run every per-trade step for one open trade. `is_scalping` selects the
/// time-exit horizon. `reconcile_hit` is whether the EA's last reconciliation
/// report still listed this ticket as open.
pub async fn evaluate_trade(
    db: &Db,
    account: &Account,
    trade: &Trade,
    tick: &TradeTick,
    is_scalping: bool,
    reconcile_hit: bool,
    cfg: &TradeMonitorConfig,
) -> Result<Vec<TradeAction>> {
    let mut actions = Vec::new();
    let now = Utc::now();

    backfill_session(db, account, trade).await?;
    update_mfe_mae(db, account, trade, tick.price).await?;

    if trade.tp <= 0.0 || trade.sl <= 0.0 {
        close(db, account, trade, tick.price, now, CloseReason::Emergency, "TP or SL is zero").await?;
        actions.push(TradeAction::Closed(CloseReason::Emergency));
        return Ok(actions);
    }

    if !reconcile_hit {
        if trade.last_reconcile_miss {
            warn!(ticket = %trade.ticket, "second consecutive reconcile miss, closing as stale");
            close(db, account, trade, trade.open_price, now, CloseReason::StaleReconciled, "two consecutive reconcile misses").await?;
            actions.push(TradeAction::Closed(CloseReason::StaleReconciled));
            return Ok(actions);
        }
        mark_reconcile_miss(db, account, trade).await?;
    } else if trade.last_reconcile_miss {
        clear_reconcile_miss(db, account, trade).await?;
    }

    if let Some(action) = trail_stop(db, account, trade, tick, now, &cfg.trailing).await? {
        actions.push(action);
    }

    if let Some(action) = partial_close(db, account, trade, tick.price).await? {
        actions.push(action);
    }

    let max_hold = if is_scalping { cfg.scalping_max_hold_minutes } else { cfg.swing_max_hold_minutes };
    if (now - trade.open_time).num_minutes() > max_hold {
        close(db, account, trade, tick.price, now, CloseReason::TimeExit, "max hold time exceeded").await?;
        actions.push(TradeAction::Closed(CloseReason::TimeExit));
        return Ok(actions);
    }

    if trade.profit < cfg.strategy_revalidation_loss_eur {
        actions.push(TradeAction::NeedsRevalidation);
    }

    Ok(actions)
}

async fn backfill_session(db: &Db, account: &Account, trade: &Trade) -> Result<()> {
    if trade.session.is_some() {
        return Ok(());
    }
    let hour: u32 = trade.open_time.format("%H").to_string().parse().unwrap_or(0);
    let session = Session::from_utc_hour(hour);
    repo::update_trade_session(db, &account.account_id, &trade.ticket, &session.to_string()).await
}

async fn update_mfe_mae(db: &Db, account: &Account, trade: &Trade, price: f64) -> Result<()> {
    let favorable = match trade.direction {
        Direction::Buy => price - trade.open_price,
        Direction::Sell => trade.open_price - price,
    };
    let mfe = trade.mfe.max(favorable);
    let mae = trade.mae.max(-favorable);
    if mfe != trade.mfe || mae != trade.mae {
        repo::update_trade_mfe_mae(db, &account.account_id, &trade.ticket, mfe, mae).await?;
    }
    Ok(())
}

/// Four-stage trailing stop (§4.8): SL follows price by an increasing
/// fraction of the distance from entry to TP as the trade progresses. Never
/// widens the stop, never moves it within `min_sl_distance_points` of the
/// current price, caps any single move at `max_sl_move_per_update`, and
/// rate-limits to one move per `rate_limit_secs`.
async fn trail_stop(
    db: &Db,
    account: &Account,
    trade: &Trade,
    tick: &TradeTick,
    now: DateTime<Utc>,
    cfg: &TrailingStopConfig,
) -> Result<Option<TradeAction>> {
    if let Some(last) = trade.last_trail_update {
        if (now - last).num_seconds() < cfg.rate_limit_secs {
            return Ok(None);
        }
    }

    let progress = trade.tp_progress(tick.price);
    let tp_distance = (trade.tp - trade.open_price).abs();

    let stage_fraction = if progress >= 0.90 {
        Some(0.15)
    } else if progress >= 0.75 {
        Some(0.25)
    } else if progress >= 0.50 {
        Some(0.40)
    } else {
        None
    };

    let mut new_sl = if let Some(fraction) = stage_fraction {
        tick.price - trade.direction.sign() * fraction * tp_distance
    } else if progress >= 0.30 {
        trade.open_price + trade.direction.sign() * 5.0 * tick.point
    } else {
        return Ok(None);
    };

    let improves = match trade.direction {
        Direction::Buy => new_sl > trade.sl,
        Direction::Sell => new_sl < trade.sl,
    };
    if !improves {
        return Ok(None);
    }

    let min_gap = cfg.min_sl_distance_points * tick.point;
    let too_close = match trade.direction {
        Direction::Buy => tick.price - new_sl < min_gap,
        Direction::Sell => new_sl - tick.price < min_gap,
    };
    if too_close {
        return Ok(None);
    }

    let move_points = (new_sl - trade.sl).abs() / tick.point;
    if move_points > cfg.max_sl_move_per_update {
        new_sl = trade.sl + trade.direction.sign() * cfg.max_sl_move_per_update * tick.point;
    }

    repo::update_trade_sl_tp(db, &account.account_id, &trade.ticket, new_sl, trade.tp).await?;
    emit_command(db, account, CommandType::ModifySl, json!({"ticket": trade.ticket, "sl": new_sl}), &trade.ticket).await?;
    repo::insert_decision(
        db,
        DecisionType::TrailingStop,
        Some(&account.account_id),
        Some(&trade.instrument),
        "MODIFY_SL",
        &format!("trailing stop moved to {new_sl:.5} at {:.0}% TP progress", progress * 100.0),
        None,
    )
    .await?;

    info!(ticket = %trade.ticket, new_sl, progress, "MODIFY_SL");
    Ok(Some(TradeAction::ModifiedSl { sl: new_sl }))
}

/// Close half the remaining volume at 50% TP progress, and half of what's
/// left again at 75%, guarded so the remainder never drops below twice the
/// symbol's minimum volume (§4.8). `tp_extended_count` doubles as the
/// partial-close stage counter (0 = none taken, 1 = first taken) since this
/// schema has no dedicated column for it.
async fn partial_close(db: &Db, account: &Account, trade: &Trade, price: f64) -> Result<Option<TradeAction>> {
    let progress = trade.tp_progress(price);
    let threshold = if trade.tp_extended_count >= 1 { 0.75 } else { 0.50 };
    if progress < threshold || trade.tp_extended_count >= 2 {
        return Ok(None);
    }

    let broker = repo::get_broker_symbol(db, &trade.instrument).await?;
    let min_volume = broker.map(|b| b.min_volume).unwrap_or(0.01);
    let remaining_after = trade.volume / 2.0;
    if remaining_after < min_volume * 2.0 {
        return Ok(None);
    }

    let closed_volume = trade.volume - remaining_after;
    repo::reduce_trade_volume(db, &account.account_id, &trade.ticket, remaining_after).await?;
    emit_command(
        db,
        account,
        CommandType::PartialCloseTrade,
        json!({"ticket": trade.ticket, "close_volume": closed_volume}),
        &trade.ticket,
    )
    .await?;
    repo::insert_decision(
        db,
        DecisionType::TradeOpen,
        Some(&account.account_id),
        Some(&trade.instrument),
        "PARTIAL_CLOSE_TRADE",
        &format!("closed {closed_volume:.2} of {:.2} lots at {:.0}% TP progress", trade.volume, progress * 100.0),
        None,
    )
    .await?;

    info!(ticket = %trade.ticket, remaining_after, progress, "PARTIAL_CLOSE_TRADE");
    Ok(Some(TradeAction::PartialClosed { closed_volume }))
}

async fn mark_reconcile_miss(db: &Db, account: &Account, trade: &Trade) -> Result<()> {
    repo::set_reconcile_miss(db, &account.account_id, &trade.ticket, true).await?;
    repo::insert_decision(
        db,
        DecisionType::Mt5Disconnect,
        Some(&account.account_id),
        Some(&trade.instrument),
        "MISS",
        "trade missing from EA reconciliation report",
        None,
    )
    .await
}

async fn clear_reconcile_miss(db: &Db, account: &Account, trade: &Trade) -> Result<()> {
    repo::set_reconcile_miss(db, &account.account_id, &trade.ticket, false).await?;
    repo::insert_decision(
        db,
        DecisionType::Mt5Reconnect,
        Some(&account.account_id),
        Some(&trade.instrument),
        "RECOVERED",
        "trade seen again after a reconcile miss",
        None,
    )
    .await
}

/// Apply the outcome of a caller-driven strategy re-run for a trade flagged
/// `NeedsRevalidation`. Closes with [`CloseReason::StrategyInvalid`] when the
/// re-run no longer validates or flips direction.
pub async fn apply_revalidation(
    db: &Db,
    account: &Account,
    trade: &Trade,
    price: f64,
    still_valid: bool,
    flipped: bool,
) -> Result<bool> {
    if still_valid && !flipped {
        return Ok(false);
    }
    close(db, account, trade, price, Utc::now(), CloseReason::StrategyInvalid, "strategy re-validation failed").await?;
    Ok(true)
}

/// Force-close one trade from outside the normal per-tick evaluation (§4.9
/// emergency drawdown escalation has no tick of its own to evaluate against).
pub async fn emergency_close(db: &Db, account: &Account, trade: &Trade, price: f64, reason: CloseReason, detail: &str) -> Result<()> {
    close(db, account, trade, price, Utc::now(), reason, detail).await
}

async fn close(
    db: &Db,
    account: &Account,
    trade: &Trade,
    price: f64,
    now: DateTime<Utc>,
    reason: CloseReason,
    detail: &str,
) -> Result<()> {
    let profit = match trade.direction {
        Direction::Buy => (price - trade.open_price) * trade.volume,
        Direction::Sell => (trade.open_price - price) * trade.volume,
    };
    repo::close_trade(db, &account.account_id, &trade.ticket, price, now, profit, reason).await?;
    emit_command(db, account, CommandType::CloseTrade, json!({"ticket": trade.ticket, "reason": reason.to_string()}), &trade.ticket).await?;
    repo::insert_decision(
        db,
        DecisionType::TradeOpen,
        Some(&account.account_id),
        Some(&trade.instrument),
        &reason.to_string(),
        detail,
        None,
    )
    .await?;
    info!(ticket = %trade.ticket, %reason, "CLOSE_TRADE");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{TradeSource, TradeStatus};

    fn sample_trade(direction: Direction, open_price: f64, sl: f64, tp: f64) -> Trade {
        Trade {
            account_id: "acc1".into(),
            ticket: "t1".into(),
            instrument: "EURUSD".into(),
            direction,
            volume: 0.10,
            open_price,
            open_time: Utc::now() - Duration::minutes(10),
            close_price: None,
            close_time: None,
            sl,
            tp,
            initial_sl: sl,
            initial_tp: tp,
            profit: 0.0,
            commission: 0.0,
            swap: 0.0,
            status: TradeStatus::Open,
            source: TradeSource::Autotrade,
            close_reason: None,
            signal_id: None,
            command_id: None,
            session: None,
            trailing_stop_active: false,
            trailing_stop_moves: 0,
            tp_extended_count: 0,
            hold_duration_minutes: None,
            pips_captured: None,
            risk_reward_realized: None,
            mfe: 0.0,
            mae: 0.0,
            entry_volatility: None,
            entry_spread: None,
            entry_bid: None,
            entry_ask: None,
            last_trail_update: None,
            last_reconcile_miss: false,
        }
    }

    #[test]
    fn tp_progress_buy_reaches_break_even_threshold() {
        let trade = sample_trade(Direction::Buy, 1.1000, 1.0950, 1.1100);
        assert!(trade.tp_progress(1.1030) >= 0.30);
    }

    /// Drives the real four-stage sequence against the worked BUY EURUSD
    /// scenario (open=1.1000 sl=1.0950 tp=1.1100): 30/50/75/90% TP progress
    /// should land the stop at 1.1005, 1.1010, 1.1050, ~1.1075 — anchored to
    /// the current tick price from stage 2 on, not the entry price.
    #[tokio::test]
    async fn trail_stop_follows_worked_buy_sequence() {
        let db = Db::connect("sqlite::memory:").await.expect("in-memory db");
        let account = repo::create_account(&db, "acc1", "demo", "key").await.expect("create account");
        let trade = sample_trade(Direction::Buy, 1.1000, 1.0950, 1.1100);
        repo::insert_trade(&db, &trade).await.expect("insert trade");

        let cfg = TrailingStopConfig::default();
        let mut now = Utc::now();

        let expected = [(1.1030, 1.1005), (1.1050, 1.1010), (1.1075, 1.1050)];
        for (price, expected_sl) in expected {
            let trade = repo::get_trade(&db, "acc1", "t1").await.unwrap().unwrap();
            let tick = TradeTick { price, point: 0.0001 };
            let action = trail_stop(&db, &account, &trade, &tick, now, &cfg).await.unwrap();
            match action {
                Some(TradeAction::ModifiedSl { sl }) => {
                    assert!((sl - expected_sl).abs() < 1e-9, "at price {price}: expected sl {expected_sl}, got {sl}");
                }
                other => panic!("at price {price}: expected ModifiedSl, got {other:?}"),
            }
            now += Duration::seconds(cfg.rate_limit_secs + 1);
        }

        // 90% progress: stop keeps advancing toward the still-rising tick price,
        // landing a pip off the spec's rounded figure (~1.1076) since it anchors
        // to the exact tick rather than a pre-rounded one.
        let trade = repo::get_trade(&db, "acc1", "t1").await.unwrap().unwrap();
        let tick = TradeTick { price: 1.1090, point: 0.0001 };
        let action = trail_stop(&db, &account, &trade, &tick, now, &cfg).await.unwrap();
        match action {
            Some(TradeAction::ModifiedSl { sl }) => assert!((sl - 1.1075).abs() < 1e-6, "expected ~1.1075, got {sl}"),
            other => panic!("expected ModifiedSl, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn trail_stop_follows_worked_sell_sequence() {
        let db = Db::connect("sqlite::memory:").await.expect("in-memory db");
        let account = repo::create_account(&db, "acc1", "demo", "key").await.expect("create account");
        let trade = sample_trade(Direction::Sell, 1.1000, 1.1050, 1.0900);
        repo::insert_trade(&db, &trade).await.expect("insert trade");

        let cfg = TrailingStopConfig::default();
        let mut now = Utc::now();

        let expected = [(1.0970, 1.0995), (1.0950, 1.0990), (1.0925, 1.0950)];
        for (price, expected_sl) in expected {
            let trade = repo::get_trade(&db, "acc1", "t1").await.unwrap().unwrap();
            let tick = TradeTick { price, point: 0.0001 };
            let action = trail_stop(&db, &account, &trade, &tick, now, &cfg).await.unwrap();
            match action {
                Some(TradeAction::ModifiedSl { sl }) => {
                    assert!((sl - expected_sl).abs() < 1e-9, "at price {price}: expected sl {expected_sl}, got {sl}");
                }
                other => panic!("at price {price}: expected ModifiedSl, got {other:?}"),
            }
            now += Duration::seconds(cfg.rate_limit_secs + 1);
        }
    }

    #[test]
    fn partial_close_threshold_advances_after_first_stage() {
        let mut trade = sample_trade(Direction::Buy, 1.1000, 1.0950, 1.1100);
        trade.tp_extended_count = 1;
        assert_eq!(if trade.tp_extended_count >= 1 { 0.75 } else { 0.50 }, 0.75);
    }
}
