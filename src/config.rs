// =============================================================================
// Runtime configuration — environment-driven engine settings
// =============================================================================
//
// Aurora has no hot-reloadable strategy knobs the way a single-account
// trading bot does (every account's risk profile, symbol config, and
// breaker state already lives in the database, mutated by the auto-trader
// and auto-optimizer). What's left to configure at process start is the
// connection surface and the scheduler cadences, so this is a thin
// env-var reader rather than the teacher's atomic-save JSON file.

use std::time::Duration;

use tracing::info;

use crate::auto_trader::AutoTraderConfig;
use crate::drawdown::DrawdownConfig;
use crate::shadow::RecoveryConfig;
use crate::trade_monitor::TradeMonitorConfig;

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_secs(key: &str, default: u64) -> Duration {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .map(Duration::from_secs)
        .unwrap_or_else(|| Duration::from_secs(default))
}

/// How often each periodic worker runs (§5 Concurrency & Resource Model —
/// every worker runs in its own task with an explicit cadence).
#[derive(Debug, Clone, Copy)]
pub struct CadenceConfig {
    pub signal_generator: Duration,
    pub auto_trader: Duration,
    pub trade_monitor: Duration,
    pub drawdown_protection: Duration,
    pub dynamic_risk_daily: Duration,
    pub cleanup: Duration,
    pub shadow_recovery: Duration,
    pub heartbeat_timeout: Duration,
}

impl Default for CadenceConfig {
    fn default() -> Self {
        Self {
            signal_generator: Duration::from_secs(30),
            auto_trader: Duration::from_secs(10),
            trade_monitor: Duration::from_secs(5),
            drawdown_protection: Duration::from_secs(60),
            dynamic_risk_daily: Duration::from_secs(24 * 3600),
            cleanup: Duration::from_secs(300),
            shadow_recovery: Duration::from_secs(3600),
            heartbeat_timeout: Duration::from_secs(120),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AuroraConfig {
    pub database_url: String,
    pub bind_addr: String,
    pub cadence: CadenceConfig,
    pub auto_trader: AutoTraderConfig,
    pub trade_monitor: TradeMonitorConfig,
    pub shadow_recovery: RecoveryConfig,
    pub drawdown: DrawdownConfig,
}

impl AuroraConfig {
    /// Build configuration from the environment, falling back to defaults
    /// tuned for a single-box demo deployment.
    pub fn from_env() -> Self {
        let cfg = Self {
            database_url: env_or("DATABASE_URL", "sqlite://aurora.db"),
            bind_addr: env_or("AURORA_BIND_ADDR", "0.0.0.0:3001"),
            cadence: CadenceConfig {
                signal_generator: env_secs("AURORA_SIGNAL_CADENCE_SECS", 30),
                auto_trader: env_secs("AURORA_AUTOTRADER_CADENCE_SECS", 10),
                trade_monitor: env_secs("AURORA_TRADE_MONITOR_CADENCE_SECS", 5),
                drawdown_protection: env_secs("AURORA_DRAWDOWN_CADENCE_SECS", 60),
                ..CadenceConfig::default()
            },
            auto_trader: AutoTraderConfig::default(),
            trade_monitor: TradeMonitorConfig::default(),
            shadow_recovery: RecoveryConfig::default(),
            drawdown: DrawdownConfig::default(),
        };

        info!(database_url = %cfg.database_url, bind_addr = %cfg.bind_addr, "configuration loaded from environment");
        cfg
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cadence_defaults_match_spec() {
        let cfg = CadenceConfig::default();
        assert_eq!(cfg.auto_trader, Duration::from_secs(10));
        assert_eq!(cfg.trade_monitor, Duration::from_secs(5));
        assert_eq!(cfg.drawdown_protection, Duration::from_secs(60));
    }
}
