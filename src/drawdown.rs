// =============================================================================
// Account drawdown protection (§4.9)
// =============================================================================
//
// Runs every 60 s per account, comparing today's equity against the daily
// start balance across three escalating tiers. Grounded on the auto-trader's
// loss-breaker comparison (same daily_start_balance/equity arithmetic) but
// goes one step further: a soft warning, a trading pause (breaker trip, no
// auto-resume), and an emergency force-close of every open position. State is
// persisted through the breaker flag, so a restart cannot silently re-enable
// trading while a pause is in effect.

use anyhow::Result;
use tracing::{error, warn};

use crate::db::models::Account;
use crate::db::{repo, Db};
use crate::types::{CloseReason, DecisionType};

#[derive(Debug, Clone, Copy)]
pub struct DrawdownConfig {
    pub warn_pct: f64,
    pub pause_pct: f64,
    pub emergency_pct: f64,
}

impl Default for DrawdownConfig {
    fn default() -> Self {
        Self { warn_pct: 3.0, pause_pct: 5.0, emergency_pct: 10.0 }
    }
}

/// Evaluate one account's drawdown tier. Tiers are checked worst-first so an
/// emergency loss doesn't also log a redundant pause/warning.
pub async fn evaluate(db: &Db, account: &Account, cfg: &DrawdownConfig) -> Result<()> {
    if account.daily_start_balance <= 0.0 {
        return Ok(());
    }
    let loss_pct = ((account.daily_start_balance - account.equity) / account.daily_start_balance) * 100.0;

    if loss_pct >= cfg.emergency_pct {
        force_close_all(db, account, loss_pct).await?;
    } else if loss_pct >= cfg.pause_pct {
        if !account.breaker_tripped {
            let reason = format!("drawdown {loss_pct:.2}% >= pause threshold {:.2}%", cfg.pause_pct);
            repo::trip_breaker(db, &account.account_id, &reason, false).await?;
            repo::insert_decision(db, DecisionType::CircuitBreaker, Some(&account.account_id), None, "TRIPPED", &reason, None)
                .await?;
        }
    } else if loss_pct >= cfg.warn_pct {
        warn!(account_id = %account.account_id, loss_pct, "drawdown approaching pause threshold");
    }
    Ok(())
}

async fn force_close_all(db: &Db, account: &Account, loss_pct: f64) -> Result<()> {
    let reason = format!("drawdown {loss_pct:.2}% >= emergency threshold");
    if !account.breaker_tripped {
        repo::trip_breaker(db, &account.account_id, &reason, false).await?;
    }
    for trade in repo::open_trades(db, Some(&account.account_id)).await? {
        let price = repo::latest_tick(db, &trade.instrument).await?.map(|t| t.bid).unwrap_or(trade.open_price);
        if let Err(e) = crate::trade_monitor::emergency_close(db, account, &trade, price, CloseReason::Emergency, &reason).await {
            error!(ticket = %trade.ticket, error = %e, "failed to force-close trade during emergency drawdown");
        }
    }
    repo::insert_decision(db, DecisionType::CircuitBreaker, Some(&account.account_id), None, "EMERGENCY_CLOSE_ALL", &reason, None)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account(daily_start: f64, equity: f64) -> Account {
        Account {
            account_id: "a1".into(),
            broker: "demo".into(),
            api_key: "k".into(),
            balance: equity,
            equity,
            margin: 0.0,
            free_margin: equity,
            last_heartbeat: None,
            risk_profile: crate::types::RiskProfile::Moderate,
            auto_trading_enabled: true,
            breaker_tripped: false,
            breaker_reason: None,
            breaker_tripped_at: None,
            breaker_is_failure_type: false,
            consecutive_command_failures: 0,
            daily_start_balance: daily_start,
            daily_start_date: None,
            peak_equity_today: daily_start,
            initial_balance: daily_start,
            buy_signal_advantage: 2,
            buy_confidence_penalty: 3.0,
            last_reconcile_tickets: None,
            created_at: chrono::Utc::now(),
        }
    }

    #[test]
    fn loss_pct_crosses_tiers() {
        let cfg = DrawdownConfig::default();
        let a = account(1000.0, 965.0);
        let loss_pct = ((a.daily_start_balance - a.equity) / a.daily_start_balance) * 100.0;
        assert!(loss_pct >= cfg.pause_pct && loss_pct < cfg.emergency_pct);
    }

    #[test]
    fn no_baseline_yet_is_a_noop() {
        let a = account(0.0, 100.0);
        assert!(a.daily_start_balance <= 0.0);
    }
}
