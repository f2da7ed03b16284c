// =============================================================================
// Worker scheduler — cadence-driven background loops (§5)
// =============================================================================
//
// Every periodic job gets its own task and its own interval; none depends on
// request-driven scheduling. A job's failure is logged and the loop ticks
// again at the next cadence rather than taking the task down, mirroring the
// reference strategy loop's "log and continue" shape.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::app_state::AppState;
use crate::auto_optimizer;
use crate::auto_trader::{self, GateOutcome};
use crate::db::repo;
use crate::drawdown;
use crate::indicators;
use crate::patterns;
use crate::regime::RegimeDetector;
use crate::shadow;
use crate::signals::signal_generator;
use crate::trade_monitor::{self, TradeTick};
use crate::types::AssetClass;

const TIMEFRAMES: [&str; 5] = ["M5", "M15", "H1", "H4", "D1"];
/// Per-timeframe OHLC retention (§3 Data model): shorter bars are pruned
/// sooner since they accumulate far more rows for the same time horizon.
const OHLC_RETENTION_DAYS: [(&str, i64); 5] = [("M5", 90), ("M15", 90), ("H1", 180), ("H4", 365), ("D1", 730)];
const OHLC_WINDOW: i64 = 200;
const MIN_BARS_FOR_BUNDLE: usize = 30;

/// Spawn every background worker and return their join handles so `main` can
/// hold them open for the life of the process.
pub fn spawn_all(state: Arc<AppState>) -> Vec<JoinHandle<()>> {
    vec![
        spawn_signal_generator(state.clone()),
        spawn_auto_trader(state.clone()),
        spawn_trade_monitor(state.clone()),
        spawn_drawdown_protection(state.clone()),
        spawn_dynamic_risk(state.clone()),
        spawn_cleanup(state.clone()),
        spawn_shadow_recovery(state.clone()),
    ]
}

fn spawn_signal_generator(state: Arc<AppState>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(state.config.cadence.signal_generator);
        let regime_detector = RegimeDetector::new();
        loop {
            interval.tick().await;
            if let Err(e) = run_signal_generator(&state, &regime_detector).await {
                error!(error = %e, "signal generator pass failed");
            }
        }
    })
}

async fn run_signal_generator(state: &AppState, regime_detector: &Arc<RegimeDetector>) -> anyhow::Result<()> {
    for account in repo::all_accounts(&state.db).await? {
        for sub in repo::subscribed_symbols(&state.db, &account.account_id).await? {
            let Some(broker) = repo::get_broker_symbol(&state.db, &sub.instrument).await? else {
                continue;
            };

            for timeframe in TIMEFRAMES {
                let candles = repo::recent_ohlc(&state.db, &sub.instrument, timeframe, OHLC_WINDOW).await?;
                if candles.len() < MIN_BARS_FOR_BUNDLE {
                    continue;
                }

                let bundle = match indicators::calculate_bundle(&candles) {
                    Ok(b) => b,
                    Err(reason) => {
                        warn!(instrument = %sub.instrument, timeframe, reason, "indicator bundle rejected");
                        continue;
                    }
                };

                let patterns = patterns::detect_patterns(&candles);
                for p in &patterns {
                    repo::insert_pattern_detection(&state.db, &sub.instrument, timeframe, p.name, p.direction, p.reliability)
                        .await?;
                }

                let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
                let Some(regime) = regime_detector.detect(&candles, &closes) else {
                    continue;
                };

                let subs = signal_generator::build_sub_signals(&state.db, &bundle).await?;
                let entry = match repo::latest_tick(&state.db, &sub.instrument).await? {
                    Some(tick) => (tick.bid + tick.ask) / 2.0,
                    None => candles.last().map(|c| c.close).unwrap_or(0.0),
                };

                let max_loss_currency = state.dynamic_risk.daily_sl_ceiling(&account.account_id);
                let ml_features = state.ml_scorer.as_ref().map(|_| {
                    serde_json::json!({
                        "instrument": sub.instrument,
                        "timeframe": timeframe,
                        "regime": regime.regime.to_string(),
                    })
                });

                let signal = signal_generator::generate_signal(
                    &state.db,
                    &sub.instrument,
                    timeframe,
                    entry,
                    &bundle,
                    &patterns,
                    &regime,
                    &broker,
                    &subs,
                    account.buy_signal_advantage,
                    account.buy_confidence_penalty,
                    max_loss_currency,
                    broker.min_volume,
                    state.news_calendar.as_ref(),
                    state.ml_scorer.as_deref(),
                    ml_features.as_ref(),
                )
                .await?;

                if let Some(signal) = signal {
                    info!(instrument = %signal.instrument, timeframe, direction = %signal.direction, confidence = signal.confidence, "signal generated");
                }
            }
        }
    }
    Ok(())
}

fn spawn_auto_trader(state: Arc<AppState>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(state.config.cadence.auto_trader);
        loop {
            interval.tick().await;
            if let Err(e) = run_auto_trader(&state).await {
                error!(error = %e, "auto-trader pass failed");
            }
        }
    })
}

async fn run_auto_trader(state: &AppState) -> anyhow::Result<()> {
    let cfg = &state.config.auto_trader;
    let active_signals = repo::active_signals(&state.db).await?;

    for account in repo::all_accounts(&state.db).await? {
        auto_trader::maybe_auto_resume(&state.db, &account, cfg).await?;
        auto_trader::check_pending_commands(&state.db, &account, cfg).await?;
        auto_trader::check_loss_breakers(&state.db, &account, cfg).await?;

        let Some(account) = repo::get_account(&state.db, &account.account_id).await? else {
            continue;
        };
        if !account.auto_trading_enabled || account.breaker_tripped {
            continue;
        }

        let subs = repo::subscribed_symbols(&state.db, &account.account_id).await?;
        let instruments: std::collections::HashSet<&str> = subs.iter().map(|s| s.instrument.as_str()).collect();

        for signal in active_signals.iter().filter(|s| instruments.contains(s.instrument.as_str())) {
            match auto_trader::process_signal(&state.db, &account, signal, cfg).await {
                Ok(GateOutcome::Accepted { command_id }) => {
                    info!(signal_id = %signal.id, command_id, "signal accepted");
                }
                Ok(GateOutcome::HandedToShadow) => {
                    if let Some(tick) = repo::latest_tick(&state.db, &signal.instrument).await? {
                        shadow::open_shadow_trade(&state.db, &account.account_id, signal, tick.bid, tick.ask).await?;
                    }
                }
                Ok(GateOutcome::Rejected { step, reason }) => {
                    warn!(signal_id = %signal.id, step, reason, "signal rejected");
                }
                Err(e) => error!(signal_id = %signal.id, error = %e, "process_signal failed"),
            }
        }
    }
    Ok(())
}

fn spawn_trade_monitor(state: Arc<AppState>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(state.config.cadence.trade_monitor);
        loop {
            interval.tick().await;
            if let Err(e) = run_trade_monitor(&state).await {
                error!(error = %e, "trade monitor pass failed");
            }
        }
    })
}

/// Crypto trades around the clock and is treated as the scalping horizon;
/// everything else uses the swing hold horizon. Trades carry no strategy-type
/// field of their own to key off per-position.
fn is_scalping(instrument: &str) -> bool {
    crate::asset_class::classify(instrument) == AssetClass::Crypto
}

async fn run_trade_monitor(state: &AppState) -> anyhow::Result<()> {
    for account in repo::all_accounts(&state.db).await? {
        for trade in repo::open_trades(&state.db, Some(&account.account_id)).await? {
            let Some(tick) = repo::latest_tick(&state.db, &trade.instrument).await? else {
                continue;
            };
            let Some(broker) = repo::get_broker_symbol(&state.db, &trade.instrument).await? else {
                continue;
            };
            let price = (tick.bid + tick.ask) / 2.0;
            let trade_tick = TradeTick { price, point: broker.point };

            let reconcile_hit = account.reconciles(&trade.ticket);
            let actions = trade_monitor::evaluate_trade(
                &state.db,
                &account,
                &trade,
                &trade_tick,
                is_scalping(&trade.instrument),
                reconcile_hit,
                &state.config.trade_monitor,
            )
            .await?;

            for action in actions {
                match action {
                    trade_monitor::TradeAction::NeedsRevalidation => {
                        if let Err(e) = revalidate_trade(state, &account, &trade, price).await {
                            error!(ticket = %trade.ticket, error = %e, "strategy revalidation failed");
                        }
                    }
                    trade_monitor::TradeAction::Closed(_) => {
                        on_trade_closed(state, &account, &trade.ticket).await;
                    }
                    _ => {}
                }
            }
        }
    }
    Ok(())
}

/// Feed a freshly-closed trade's outcome into the per-symbol auto-optimizer
/// (§4.12) once it has left the open set.
async fn on_trade_closed(state: &AppState, account: &crate::db::models::Account, ticket: &str) {
    match repo::get_trade(&state.db, &account.account_id, ticket).await {
        Ok(Some(trade)) => {
            if let Err(e) = auto_optimizer::apply_trade_outcome(&state.db, &trade).await {
                error!(ticket, error = %e, "auto-optimizer update failed");
            }
        }
        Ok(None) => {}
        Err(e) => error!(ticket, error = %e, "failed to reload closed trade"),
    }
}

/// Re-run signal generation for a losing trade's instrument/timeframe and
/// close it if the direction has flipped or the original setup no longer
/// aggregates to a tradeable bias (§4.8 strategy re-validation).
async fn revalidate_trade(
    state: &AppState,
    account: &crate::db::models::Account,
    trade: &crate::db::models::Trade,
    price: f64,
) -> anyhow::Result<()> {
    const REVALIDATION_TIMEFRAME: &str = "H1";

    let candles = repo::recent_ohlc(&state.db, &trade.instrument, REVALIDATION_TIMEFRAME, OHLC_WINDOW).await?;
    if candles.len() < MIN_BARS_FOR_BUNDLE {
        return Ok(());
    }
    let bundle = match indicators::calculate_bundle(&candles) {
        Ok(b) => b,
        Err(_) => return Ok(()),
    };
    let patterns = patterns::detect_patterns(&candles);
    let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
    let regime_detector = RegimeDetector::new();
    let Some(regime) = regime_detector.detect(&candles, &closes) else {
        if trade_monitor::apply_revalidation(&state.db, account, trade, price, false, false).await? {
            on_trade_closed(state, account, &trade.ticket).await;
        }
        return Ok(());
    };

    let subs = signal_generator::build_sub_signals(&state.db, &bundle).await?;
    let agg = signal_generator::aggregate(&subs, &regime);
    let current = signal_generator::pick_direction(&agg, account.buy_signal_advantage);

    let still_valid = current == Some(trade.direction);
    let flipped = matches!(current, Some(d) if d != trade.direction);
    if trade_monitor::apply_revalidation(&state.db, account, trade, price, still_valid, flipped).await? {
        on_trade_closed(state, account, &trade.ticket).await;
    }
    Ok(())
}

fn spawn_drawdown_protection(state: Arc<AppState>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(state.config.cadence.drawdown_protection);
        loop {
            interval.tick().await;
            for account in match repo::all_accounts(&state.db).await {
                Ok(accounts) => accounts,
                Err(e) => {
                    error!(error = %e, "failed to list accounts for drawdown protection");
                    continue;
                }
            } {
                if let Err(e) = drawdown::evaluate(&state.db, &account, &state.config.drawdown).await {
                    error!(account_id = %account.account_id, error = %e, "drawdown evaluation failed");
                }
            }
        }
    })
}

fn spawn_dynamic_risk(state: Arc<AppState>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(state.config.cadence.dynamic_risk_daily);
        loop {
            interval.tick().await;
            if let Err(e) = run_dynamic_risk(&state).await {
                error!(error = %e, "dynamic risk recompute failed");
            }
        }
    })
}

async fn run_dynamic_risk(state: &AppState) -> anyhow::Result<()> {
    for account in repo::all_accounts(&state.db).await? {
        let subs = repo::subscribed_symbols(&state.db, &account.account_id).await?;
        let symbol_weight = if subs.is_empty() {
            1.0
        } else {
            let baseline = crate::asset_class::default_config(AssetClass::ForexMajor).min_sl_pct.max(1e-9);
            let avg_min_sl_pct = subs
                .iter()
                .map(|s| crate::asset_class::default_config(crate::asset_class::classify(&s.instrument)).min_sl_pct)
                .sum::<f64>()
                / subs.len() as f64;
            avg_min_sl_pct / baseline
        };
        state.dynamic_risk.recompute_daily_ceiling(&state.db, &account, symbol_weight).await?;
        state.dynamic_risk.recompute_weekly_rr(&state.db, &account).await?;
        auto_optimizer::release_expired_pauses(&state.db).await?;
    }
    Ok(())
}

fn spawn_cleanup(state: Arc<AppState>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(state.config.cadence.cleanup);
        loop {
            interval.tick().await;
            if let Err(e) = run_cleanup(&state).await {
                error!(error = %e, "cleanup pass failed");
            }
        }
    })
}

async fn run_cleanup(state: &AppState) -> anyhow::Result<()> {
    let now = chrono::Utc::now();
    repo::sweep_signal_retention(&state.db, 600, 120).await?;
    repo::delete_ticks_older_than(&state.db, now - chrono::Duration::days(7)).await?;
    repo::delete_patterns_older_than(&state.db, now - chrono::Duration::days(30)).await?;

    for (timeframe, retention_days) in OHLC_RETENTION_DAYS {
        repo::delete_ohlc_older_than(&state.db, timeframe, now - chrono::Duration::days(retention_days)).await?;
    }

    let stale_cutoff = now - chrono::Duration::seconds(state.config.cadence.heartbeat_timeout.as_secs() as i64 * 3);
    for account in repo::accounts_disconnected_since(&state.db, stale_cutoff).await? {
        warn!(account_id = %account.account_id, "account heartbeat stale");
    }
    Ok(())
}

fn spawn_shadow_recovery(state: Arc<AppState>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(state.config.cadence.shadow_recovery);
        loop {
            interval.tick().await;
            if let Err(e) = shadow::check_shadow_trades(&state.db).await {
                error!(error = %e, "shadow trade check failed");
            }
            if let Err(e) = shadow::run_recovery_job(&state.db, &state.config.shadow_recovery).await {
                error!(error = %e, "shadow recovery job failed");
            }
        }
    })
}
