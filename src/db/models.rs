// =============================================================================
// Row types for the persistence store
// =============================================================================

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{
    CloseReason, CommandStatus, CommandType, Direction, PatternDirection, RiskProfile,
    SignalStatus, SubscriptionState, SymbolConfigStatus, TradeSource, TradeStatus,
};

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Account {
    pub account_id: String,
    pub broker: String,
    pub api_key: String,
    pub balance: f64,
    pub equity: f64,
    pub margin: f64,
    pub free_margin: f64,
    pub last_heartbeat: Option<DateTime<Utc>>,
    pub risk_profile: RiskProfile,
    pub auto_trading_enabled: bool,
    pub breaker_tripped: bool,
    pub breaker_reason: Option<String>,
    pub breaker_tripped_at: Option<DateTime<Utc>>,
    /// Whether the current trip is a cooldown-eligible failure trip (command
    /// failures) as opposed to a loss trip (daily loss / drawdown), which
    /// requires a manual reset (§4.6 Circuit breaker).
    pub breaker_is_failure_type: bool,
    pub consecutive_command_failures: i64,
    pub daily_start_balance: f64,
    pub daily_start_date: Option<String>,
    pub peak_equity_today: f64,
    /// Balance on the first heartbeat, used as the denominator of the
    /// dynamic risk manager's growth factor (§4.11). Zero until set.
    pub initial_balance: f64,
    /// Net buy-vote advantage required before a BUY is emitted (§4.5
    /// Aggregation); configurable per account, default 2.
    pub buy_signal_advantage: i64,
    /// Confidence points subtracted from a BUY signal's rules score (§4.5
    /// Confidence); configurable per account, default 3.0.
    pub buy_confidence_penalty: f64,
    /// JSON-encoded array of tickets the EA's last reconciliation report
    /// (heartbeat `open_tickets`) listed as open. `None` until the first
    /// report arrives — no report yet means nothing can be flagged missing.
    pub last_reconcile_tickets: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Account {
    /// Whether the EA's last reconciliation report still lists `ticket` as
    /// open (§4.8 Stale reconciliation). Absent a report yet, everything
    /// reconciles — there's nothing to contradict.
    pub fn reconciles(&self, ticket: &str) -> bool {
        match &self.last_reconcile_tickets {
            None => true,
            Some(raw) => serde_json::from_str::<Vec<String>>(raw)
                .map(|tickets| tickets.iter().any(|t| t == ticket))
                .unwrap_or(true),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct BrokerSymbol {
    pub instrument: String,
    pub digits: i64,
    pub point: f64,
    pub min_volume: f64,
    pub max_volume: f64,
    pub step_volume: f64,
    pub contract_size: f64,
    pub tick_size: f64,
    pub tick_value: f64,
    pub stops_level: f64,
    /// Hard spread cap in points, independent of the rolling-average check
    /// (§4.6 step 8: reject when spread exceeds max(this, 3x rolling avg)).
    pub max_spread_pips: f64,
}

impl BrokerSymbol {
    /// Invariant from §3: point > 0, digits >= 0, min_volume > 0.
    pub fn is_valid(&self) -> bool {
        self.point > 0.0 && self.digits >= 0 && self.min_volume > 0.0
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct SubscribedSymbol {
    pub account_id: String,
    pub instrument: String,
    pub active: bool,
    pub shadow_mode: bool,
}

impl SubscribedSymbol {
    pub fn state(&self) -> SubscriptionState {
        if !self.active {
            SubscriptionState::Disabled
        } else if self.shadow_mode {
            SubscriptionState::Shadow
        } else {
            SubscriptionState::Live
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Tick {
    pub instrument: String,
    pub timestamp: DateTime<Utc>,
    pub bid: f64,
    pub ask: f64,
    pub volume: f64,
    pub tradeable: bool,
}

impl Tick {
    pub fn spread(&self) -> f64 {
        self.ask - self.bid
    }

    pub fn mid(&self) -> f64 {
        (self.ask + self.bid) / 2.0
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Ohlc {
    pub instrument: String,
    pub timeframe: String,
    pub open_time: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Ohlc {
    /// Invariant from §3: high >= max(open, close) >= min(open, close) >= low > 0.
    pub fn is_valid(&self) -> bool {
        if self.low <= 0.0 || self.open <= 0.0 || self.close <= 0.0 || self.high <= 0.0 {
            return false;
        }
        let hi = self.open.max(self.close);
        let lo = self.open.min(self.close);
        self.high >= hi && hi >= lo && lo >= self.low
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct TradingSignal {
    pub id: String,
    pub instrument: String,
    pub timeframe: String,
    pub direction: Direction,
    pub confidence: f64,
    pub entry: f64,
    pub sl: f64,
    pub tp: f64,
    pub status: SignalStatus,
    pub is_valid: bool,
    /// JSON-encoded `SignalSnapshot` (tagged-variant indicator/pattern/regime values).
    pub snapshot: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Trade {
    pub account_id: String,
    pub ticket: String,
    pub instrument: String,
    pub direction: Direction,
    pub volume: f64,
    pub open_price: f64,
    pub open_time: DateTime<Utc>,
    pub close_price: Option<f64>,
    pub close_time: Option<DateTime<Utc>>,
    pub sl: f64,
    pub tp: f64,
    pub initial_sl: f64,
    pub initial_tp: f64,
    pub profit: f64,
    pub commission: f64,
    pub swap: f64,
    pub status: TradeStatus,
    pub source: TradeSource,
    pub close_reason: Option<CloseReason>,
    pub signal_id: Option<String>,
    pub command_id: Option<String>,
    pub session: Option<String>,
    pub trailing_stop_active: bool,
    pub trailing_stop_moves: i64,
    pub tp_extended_count: i64,
    pub hold_duration_minutes: Option<f64>,
    pub pips_captured: Option<f64>,
    pub risk_reward_realized: Option<f64>,
    pub mfe: f64,
    pub mae: f64,
    pub entry_volatility: Option<f64>,
    pub entry_spread: Option<f64>,
    pub entry_bid: Option<f64>,
    pub entry_ask: Option<f64>,
    pub last_trail_update: Option<DateTime<Utc>>,
    pub last_reconcile_miss: bool,
}

impl Trade {
    /// Progress toward TP, 0 at entry, 1 at TP. Clamped to [0, 1].
    pub fn tp_progress(&self, current_price: f64) -> f64 {
        let tp_distance = (self.tp - self.open_price).abs();
        if tp_distance <= 0.0 {
            return 0.0;
        }
        let moved = match self.direction {
            Direction::Buy => current_price - self.open_price,
            Direction::Sell => self.open_price - current_price,
        };
        (moved / tp_distance).clamp(0.0, 1.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Command {
    pub id: String,
    pub account_id: String,
    pub command_type: CommandType,
    /// JSON-encoded payload (type-dependent: instrument/direction/volume/sl/tp/...).
    pub payload: String,
    pub status: CommandStatus,
    pub created_at: DateTime<Utc>,
    pub picked_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub timeout_at: DateTime<Utc>,
    pub error_message: Option<String>,
    pub response: Option<String>,
    pub ticket: Option<String>,
    pub redelivery_count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ShadowTrade {
    pub id: String,
    pub account_id: String,
    pub instrument: String,
    pub direction: Direction,
    pub signal_id: String,
    pub entry_price: f64,
    pub sl: f64,
    pub tp: f64,
    pub entry_time: DateTime<Utc>,
    pub exit_price: Option<f64>,
    pub exit_time: Option<DateTime<Utc>>,
    pub hypothetical_profit: Option<f64>,
    pub closed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct SymbolTradingConfig {
    pub account_id: String,
    pub instrument: String,
    pub direction: Direction,
    pub status: SymbolConfigStatus,
    pub min_confidence_threshold: f64,
    pub risk_multiplier: f64,
    pub consecutive_wins: i64,
    pub consecutive_losses: i64,
    pub rolling_winrate: f64,
    pub rolling_trades_count: i64,
    pub pause_reason: Option<String>,
    pub paused_at: Option<DateTime<Utc>>,
    pub updated_by: Option<String>,
}

impl Default for SymbolTradingConfig {
    fn default() -> Self {
        Self {
            account_id: String::new(),
            instrument: String::new(),
            direction: Direction::Buy,
            status: SymbolConfigStatus::Active,
            min_confidence_threshold: 60.0,
            risk_multiplier: 1.0,
            consecutive_wins: 0,
            consecutive_losses: 0,
            rolling_winrate: 0.0,
            rolling_trades_count: 0,
            pause_reason: None,
            paused_at: None,
            updated_by: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct IndicatorScore {
    pub instrument: String,
    pub timeframe: String,
    pub indicator: String,
    pub score: f64,
    pub sample_count: i64,
}

impl IndicatorScore {
    /// weight = 0.3 + 0.7 * score/100, gated to neutral 0.65 below the
    /// minimum-samples threshold (§4.5).
    pub fn weight(&self, min_samples: i64) -> f64 {
        if self.sample_count < min_samples {
            0.65
        } else {
            0.3 + 0.7 * (self.score / 100.0)
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct PatternDetection {
    pub id: i64,
    pub instrument: String,
    pub timeframe: String,
    pub name: String,
    pub direction: PatternDirection,
    pub reliability: f64,
    pub detected_at: DateTime<Utc>,
}
