// =============================================================================
// Dynamic risk manager (§4.11)
// =============================================================================
//
// Recomputes, per account, a daily stop-loss ceiling and a weekly risk:reward
// multiplier from recent trade performance. Neither figure is persisted —
// both are cheap to rederive from closed trades and the account row, so this
// module holds them in an in-memory `RwLock`-guarded map the way the
// reference risk engine holds its circuit-breaker counters, rather than
// adding more account columns for derived values.

use std::collections::HashMap;

use anyhow::Result;
use chrono::{Duration, Utc};
use parking_lot::RwLock;
use tracing::info;

use crate::db::models::Account;
use crate::db::{repo, Db};
use crate::types::RiskProfile;

/// Base daily-loss ceiling as a percentage of balance, before the growth and
/// performance factors are applied. Conservative accounts risk less of a
/// losing day; aggressive accounts risk more.
fn base_max_loss_pct(profile: RiskProfile) -> f64 {
    match profile {
        RiskProfile::Conservative => 2.0,
        RiskProfile::Moderate => 3.0,
        RiskProfile::Aggressive => 5.0,
    }
}

/// Piecewise performance factor from a trailing profit factor (§4.11).
fn performance_factor(profit_factor: f64) -> f64 {
    if profit_factor >= 2.0 {
        1.3
    } else if profit_factor >= 1.5 {
        1.2
    } else if profit_factor >= 1.0 {
        1.0
    } else if profit_factor >= 0.7 {
        0.8
    } else {
        0.6
    }
}

/// Gross wins / gross losses over a set of closed trades. Defined as 1.0
/// when there are no losses to avoid a divide-by-zero favoring an
/// unconstrained ceiling after a lossless week.
fn profit_factor(profits: &[f64]) -> f64 {
    let gross_win: f64 = profits.iter().filter(|p| **p > 0.0).sum();
    let gross_loss: f64 = profits.iter().filter(|p| **p < 0.0).map(|p| p.abs()).sum();
    if gross_loss <= 0.0 {
        if gross_win > 0.0 { 2.0 } else { 1.0 }
    } else {
        gross_win / gross_loss
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct RiskState {
    daily_sl_ceiling: f64,
    rr_multiplier: f64,
}

pub struct DynamicRiskManager {
    state: RwLock<HashMap<String, RiskState>>,
}

impl DynamicRiskManager {
    pub fn new() -> Self {
        Self { state: RwLock::new(HashMap::new()) }
    }

    /// Today's per-account loss ceiling in account currency, or `None` if it
    /// hasn't been computed yet this run.
    pub fn daily_sl_ceiling(&self, account_id: &str) -> Option<f64> {
        self.state.read().get(account_id).map(|s| s.daily_sl_ceiling)
    }

    /// Current R:R multiplier for the account, defaulting to 1.0.
    pub fn rr_multiplier(&self, account_id: &str) -> f64 {
        self.state.read().get(account_id).map(|s| s.rr_multiplier).unwrap_or(1.0)
    }

    /// Recompute the daily SL ceiling for `account` from its trailing 7-day
    /// profit factor, weighted by `symbol_weight` (product of each traded
    /// instrument's asset-class guardrail, supplied by the caller since this
    /// module has no indicator/symbol-config access of its own).
    pub async fn recompute_daily_ceiling(&self, db: &Db, account: &Account, symbol_weight: f64) -> Result<f64> {
        let since = Utc::now() - Duration::days(7);
        let trades = trailing_closed_trades(db, account, since).await?;
        let pf = profit_factor(&trades);
        let growth_factor = if account.initial_balance > 0.0 {
            account.balance / account.initial_balance
        } else {
            1.0
        };
        let max_loss_pct = base_max_loss_pct(account.risk_profile);
        let ceiling = account.balance * (max_loss_pct / 100.0) * growth_factor * performance_factor(pf) * symbol_weight;

        self.state.write().entry(account.account_id.clone()).or_default().daily_sl_ceiling = ceiling;
        info!(account_id = %account.account_id, ceiling, profit_factor = pf, "daily SL ceiling recomputed");
        Ok(ceiling)
    }

    /// Recompute the weekly R:R multiplier from the same trailing profit
    /// factor, applied as a scaling factor on top of the signal generator's
    /// base minimum-R:R requirement.
    pub async fn recompute_weekly_rr(&self, db: &Db, account: &Account) -> Result<f64> {
        let since = Utc::now() - Duration::days(7);
        let trades = trailing_closed_trades(db, account, since).await?;
        let pf = profit_factor(&trades);
        let multiplier = performance_factor(pf);

        self.state.write().entry(account.account_id.clone()).or_default().rr_multiplier = multiplier;
        info!(account_id = %account.account_id, multiplier, profit_factor = pf, "weekly R:R multiplier recomputed");
        Ok(multiplier)
    }
}

impl Default for DynamicRiskManager {
    fn default() -> Self {
        Self::new()
    }
}

async fn trailing_closed_trades(db: &Db, account: &Account, since: chrono::DateTime<Utc>) -> Result<Vec<f64>> {
    let mut profits = Vec::new();
    for sub in repo::subscribed_symbols(db, &account.account_id).await? {
        let trades = repo::closed_trades_since(db, &account.account_id, &sub.instrument, since).await?;
        profits.extend(trades.iter().map(|t| t.profit));
    }
    Ok(profits)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn performance_factor_rewards_strong_profit_factor() {
        assert_eq!(performance_factor(2.5), 1.3);
        assert_eq!(performance_factor(1.7), 1.2);
        assert_eq!(performance_factor(1.2), 1.0);
        assert_eq!(performance_factor(0.8), 0.8);
        assert_eq!(performance_factor(0.3), 0.6);
    }

    #[test]
    fn profit_factor_handles_no_losses() {
        assert_eq!(profit_factor(&[10.0, 20.0]), 2.0);
        assert_eq!(profit_factor(&[]), 1.0);
    }

    #[test]
    fn profit_factor_ratio_of_gross_win_to_gross_loss() {
        let pf = profit_factor(&[100.0, -50.0, 30.0, -20.0]);
        assert!((pf - (130.0 / 70.0)).abs() < 1e-9);
    }
}
