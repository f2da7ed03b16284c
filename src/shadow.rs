// =============================================================================
// Shadow trading engine (§4.10)
// =============================================================================
//
// A shadow trade never reaches the broker. It exists purely to measure
// whether a symbol/direction that auto-optimization paused into
// `shadow_trade` status would have been profitable, so the recovery job can
// decide whether to bring it back live. Grounded on the auto-trader's
// command-emission shape, minus the command: the "fill" is immediate at the
// current tick, and the "close" is a plain SL/TP price cross checked on the
// next tick for that instrument.

use anyhow::Result;
use chrono::{Duration, Utc};
use tracing::info;

use crate::db::models::{BrokerSymbol, ShadowTrade, TradingSignal};
use crate::db::{repo, Db};
use crate::types::{Direction, SymbolConfigStatus};

/// Thresholds for the 30-day recovery job (§4.10).
#[derive(Debug, Clone, Copy)]
pub struct RecoveryConfig {
    pub lookback_days: i64,
    pub min_win_rate: f64,
    pub min_total_profit: f64,
    pub min_trade_count: i64,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            lookback_days: 30,
            min_win_rate: 65.0,
            min_total_profit: 0.0,
            min_trade_count: 20,
        }
    }
}

/// Open a shadow position at the current bid/ask for `signal`'s direction.
pub async fn open_shadow_trade(db: &Db, account_id: &str, signal: &TradingSignal, bid: f64, ask: f64) -> Result<()> {
    let entry_price = match signal.direction {
        Direction::Buy => ask,
        Direction::Sell => bid,
    };
    let trade = ShadowTrade {
        id: uuid::Uuid::new_v4().to_string(),
        account_id: account_id.to_string(),
        instrument: signal.instrument.clone(),
        direction: signal.direction,
        signal_id: signal.id.clone(),
        entry_price,
        sl: signal.sl,
        tp: signal.tp,
        entry_time: Utc::now(),
        exit_price: None,
        exit_time: None,
        hypothetical_profit: None,
        closed: false,
    };
    repo::insert_shadow_trade(db, &trade).await?;
    info!(instrument = %signal.instrument, direction = %signal.direction, "shadow trade opened");
    Ok(())
}

/// Check every open shadow trade against the latest tick for its instrument
/// and close any that have crossed SL or TP.
pub async fn check_shadow_trades(db: &Db) -> Result<()> {
    for trade in repo::open_shadow_trades(db).await? {
        let Some(tick) = repo::latest_tick(db, &trade.instrument).await? else { continue };
        let price = match trade.direction {
            Direction::Buy => tick.bid,
            Direction::Sell => tick.ask,
        };

        let hit = match trade.direction {
            Direction::Buy => price >= trade.tp || price <= trade.sl,
            Direction::Sell => price <= trade.tp || price >= trade.sl,
        };
        if !hit {
            continue;
        }

        let broker = repo::get_broker_symbol(db, &trade.instrument).await?;
        let profit = hypothetical_profit(&trade, price, broker.as_ref());
        repo::close_shadow_trade(db, &trade.id, price, profit).await?;
        info!(instrument = %trade.instrument, profit, "shadow trade closed");
    }
    Ok(())
}

fn hypothetical_profit(trade: &ShadowTrade, exit_price: f64, broker: Option<&BrokerSymbol>) -> f64 {
    let pips = match trade.direction {
        Direction::Buy => exit_price - trade.entry_price,
        Direction::Sell => trade.entry_price - exit_price,
    };
    match broker {
        Some(b) if b.point > 0.0 => (pips / b.point) * b.tick_value,
        _ => pips,
    }
}

/// For every paused-into-shadow symbol config, check whether its trailing
/// window of shadow trades clears the recovery bar and reactivate it live.
pub async fn run_recovery_job(db: &Db, cfg: &RecoveryConfig) -> Result<()> {
    let since = Utc::now() - Duration::days(cfg.lookback_days);
    for mut symbol_cfg in repo::shadow_configs(db).await? {
        let trades = repo::shadow_trades_since(db, &symbol_cfg.account_id, &symbol_cfg.instrument, since)
            .await?
            .into_iter()
            .filter(|t| t.direction == symbol_cfg.direction)
            .collect::<Vec<_>>();

        if (trades.len() as i64) < cfg.min_trade_count {
            continue;
        }

        let wins = trades.iter().filter(|t| t.hypothetical_profit.unwrap_or(0.0) > 0.0).count();
        let win_rate = wins as f64 / trades.len() as f64 * 100.0;
        let total_profit: f64 = trades.iter().filter_map(|t| t.hypothetical_profit).sum();

        if win_rate >= cfg.min_win_rate && total_profit >= cfg.min_total_profit {
            symbol_cfg.status = SymbolConfigStatus::Active;
            symbol_cfg.pause_reason = None;
            symbol_cfg.paused_at = None;
            symbol_cfg.updated_by = Some("shadow_recovery".to_string());
            repo::upsert_symbol_config(db, &symbol_cfg).await?;
            repo::insert_decision(
                db,
                crate::types::DecisionType::SymbolRecovery,
                Some(&symbol_cfg.account_id),
                Some(&symbol_cfg.instrument),
                "REACTIVATED",
                &format!("shadow win_rate={win_rate:.1}% profit={total_profit:.2} over {} trades", trades.len()),
                None,
            )
            .await?;
            info!(instrument = %symbol_cfg.instrument, win_rate, total_profit, "symbol recovered from shadow mode");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_shadow(direction: Direction, entry: f64) -> ShadowTrade {
        ShadowTrade {
            id: "s1".into(),
            account_id: "acc1".into(),
            instrument: "EURUSD".into(),
            direction,
            signal_id: "sig1".into(),
            entry_price: entry,
            sl: entry - 0.0050,
            tp: entry + 0.0100,
            entry_time: Utc::now(),
            exit_price: None,
            exit_time: None,
            hypothetical_profit: None,
            closed: false,
        }
    }

    #[test]
    fn hypothetical_profit_uses_point_value_when_broker_known() {
        let trade = sample_shadow(Direction::Buy, 1.1000);
        let broker = BrokerSymbol {
            instrument: "EURUSD".into(),
            digits: 5,
            point: 0.0001,
            min_volume: 0.01,
            max_volume: 100.0,
            step_volume: 0.01,
            contract_size: 100_000.0,
            tick_size: 0.0001,
            tick_value: 1.0,
            stops_level: 0.0,
            max_spread_pips: 3.0,
        };
        let profit = hypothetical_profit(&trade, 1.1050, Some(&broker));
        assert!((profit - 50.0).abs() < 1e-6);
    }

    #[test]
    fn hypothetical_profit_falls_back_to_raw_pips_without_broker() {
        let trade = sample_shadow(Direction::Sell, 1.1000);
        let profit = hypothetical_profit(&trade, 1.0950, None);
        assert!((profit - 0.0050).abs() < 1e-9);
    }
}
