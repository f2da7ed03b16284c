// =============================================================================
// Auto-optimization — per-symbol confidence and risk adjustment (§4.12)
// =============================================================================
//
// Runs once per closed trade, mutating that trade's `SymbolTradingConfig`
// row. Grounded on the auto-trader's gate-then-persist shape: compute the
// new values, write them with one `upsert_symbol_config`, log the result.

use anyhow::Result;
use chrono::{Duration, Utc};
use tracing::info;

use crate::db::models::{SymbolTradingConfig, Trade};
use crate::db::{repo, Db};
use crate::types::{DecisionType, SymbolConfigStatus};

const MIN_CONFIDENCE_FLOOR: f64 = 45.0;
const MAX_CONFIDENCE_CAP: f64 = 80.0;
const MIN_RISK_MULTIPLIER: f64 = 0.10;
const MAX_RISK_MULTIPLIER: f64 = 2.00;
const ROLLING_WINDOW_MIN_TRADES: i64 = 10;
const AUTO_PAUSE_LOSS_STREAK: i64 = 3;
const AUTO_PAUSE_COOLDOWN_HOURS: i64 = 24;
const CATASTROPHIC_MIN_TRADES: i64 = 8;

/// Apply the per-trade adjustment rules to the symbol config for
/// `trade`'s (instrument, direction), then re-check the rolling window.
pub async fn apply_trade_outcome(db: &Db, trade: &Trade) -> Result<()> {
    let mut cfg = repo::get_symbol_config(db, &trade.account_id, &trade.instrument, trade.direction).await?;

    if trade.profit < 0.0 {
        apply_loss(&mut cfg);
    } else {
        apply_win(&mut cfg);
    }

    cfg.rolling_trades_count += 1;
    update_rolling_winrate(db, trade, &mut cfg).await?;

    if cfg.rolling_trades_count >= ROLLING_WINDOW_MIN_TRADES {
        apply_rolling_window_adjustment(&mut cfg);
    }

    if cfg.consecutive_losses >= AUTO_PAUSE_LOSS_STREAK && cfg.status == SymbolConfigStatus::Active {
        cfg.status = SymbolConfigStatus::Paused;
        cfg.pause_reason = Some(format!("{} consecutive losses", cfg.consecutive_losses));
        cfg.paused_at = Some(Utc::now());
        cfg.updated_by = Some("auto_optimizer".to_string());
    }

    if cfg.rolling_trades_count >= CATASTROPHIC_MIN_TRADES && cfg.rolling_winrate <= 0.0 {
        cfg.status = SymbolConfigStatus::ShadowTrade;
        cfg.pause_reason = Some("catastrophic performance: 0% win rate".to_string());
        cfg.paused_at = Some(Utc::now());
        cfg.updated_by = Some("auto_optimizer".to_string());
    }

    repo::upsert_symbol_config(db, &cfg).await?;
    repo::insert_decision(
        db,
        DecisionType::OptimizationRun,
        Some(&trade.account_id),
        Some(&trade.instrument),
        "ADJUSTED",
        &format!(
            "confidence={:.1} risk_mult={:.2} status={:?} wins={} losses={}",
            cfg.min_confidence_threshold, cfg.risk_multiplier, cfg.status, cfg.consecutive_wins, cfg.consecutive_losses
        ),
        None,
    )
    .await?;
    info!(instrument = %trade.instrument, confidence = cfg.min_confidence_threshold, risk_multiplier = cfg.risk_multiplier, "symbol config optimized");
    Ok(())
}

fn apply_loss(cfg: &mut SymbolTradingConfig) {
    cfg.min_confidence_threshold = (cfg.min_confidence_threshold + 5.0).min(MAX_CONFIDENCE_CAP);
    cfg.consecutive_losses += 1;
    cfg.consecutive_wins = 0;
    if cfg.consecutive_losses >= 2 {
        cfg.risk_multiplier = (cfg.risk_multiplier - 0.10).max(MIN_RISK_MULTIPLIER);
    }
}

fn apply_win(cfg: &mut SymbolTradingConfig) {
    cfg.min_confidence_threshold = (cfg.min_confidence_threshold - 1.0).max(MIN_CONFIDENCE_FLOOR);
    cfg.consecutive_wins += 1;
    cfg.consecutive_losses = 0;
    if cfg.consecutive_wins >= 3 {
        cfg.risk_multiplier = (cfg.risk_multiplier + 0.05).min(MAX_RISK_MULTIPLIER);
    }
}

async fn update_rolling_winrate(db: &Db, trade: &Trade, cfg: &mut SymbolTradingConfig) -> Result<()> {
    let since = Utc::now() - Duration::days(30);
    let recent = repo::closed_trades_since(db, &trade.account_id, &trade.instrument, since).await?;
    let sample: Vec<&Trade> = recent.iter().filter(|t| t.direction == trade.direction).collect();
    if sample.is_empty() {
        return Ok(());
    }
    let wins = sample.iter().filter(|t| t.profit > 0.0).count();
    cfg.rolling_winrate = wins as f64 / sample.len() as f64 * 100.0;
    Ok(())
}

fn apply_rolling_window_adjustment(cfg: &mut SymbolTradingConfig) {
    if cfg.rolling_winrate < 40.0 {
        cfg.min_confidence_threshold = (cfg.min_confidence_threshold + 5.0).min(MAX_CONFIDENCE_CAP);
        cfg.risk_multiplier = (cfg.risk_multiplier - 0.20).max(MIN_RISK_MULTIPLIER);
    } else if cfg.rolling_winrate > 65.0 {
        cfg.min_confidence_threshold = (cfg.min_confidence_threshold - 2.0).max(MIN_CONFIDENCE_FLOOR);
    }
}

/// Auto-pauses older than [`AUTO_PAUSE_COOLDOWN_HOURS`] are eligible to
/// resume to `active` with a fresh loss streak. Called on a slow cadence
/// alongside the shadow recovery job.
pub async fn release_expired_pauses(db: &Db) -> Result<()> {
    let cutoff = Utc::now() - Duration::hours(AUTO_PAUSE_COOLDOWN_HOURS);
    for mut cfg in repo::shadow_configs(db).await? {
        if cfg.status != SymbolConfigStatus::Paused {
            continue;
        }
        let Some(paused_at) = cfg.paused_at else { continue };
        if paused_at > cutoff {
            continue;
        }
        cfg.status = SymbolConfigStatus::Active;
        cfg.pause_reason = None;
        cfg.paused_at = None;
        cfg.consecutive_losses = 0;
        cfg.updated_by = Some("auto_optimizer".to_string());
        repo::upsert_symbol_config(db, &cfg).await?;
        info!(instrument = %cfg.instrument, "auto-pause cooldown elapsed, symbol resumed");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Direction;

    fn sample_cfg() -> SymbolTradingConfig {
        SymbolTradingConfig { account_id: "a1".into(), instrument: "EURUSD".into(), direction: Direction::Buy, ..Default::default() }
    }

    #[test]
    fn loss_raises_confidence_and_caps_at_80() {
        let mut cfg = sample_cfg();
        cfg.min_confidence_threshold = 79.0;
        apply_loss(&mut cfg);
        assert_eq!(cfg.min_confidence_threshold, 80.0);
    }

    #[test]
    fn win_lowers_confidence_and_floors_at_45() {
        let mut cfg = sample_cfg();
        cfg.min_confidence_threshold = 45.5;
        apply_win(&mut cfg);
        assert_eq!(cfg.min_confidence_threshold, 45.0);
    }

    #[test]
    fn two_consecutive_losses_cut_risk_multiplier() {
        let mut cfg = sample_cfg();
        apply_loss(&mut cfg);
        let before = cfg.risk_multiplier;
        apply_loss(&mut cfg);
        assert!(cfg.risk_multiplier < before);
    }

    #[test]
    fn three_consecutive_wins_raise_risk_multiplier() {
        let mut cfg = sample_cfg();
        apply_win(&mut cfg);
        apply_win(&mut cfg);
        let before = cfg.risk_multiplier;
        apply_win(&mut cfg);
        assert!(cfg.risk_multiplier > before);
    }

    #[test]
    fn rolling_window_penalizes_low_winrate() {
        let mut cfg = sample_cfg();
        cfg.rolling_winrate = 30.0;
        let before = cfg.risk_multiplier;
        apply_rolling_window_adjustment(&mut cfg);
        assert!(cfg.risk_multiplier < before);
    }
}
