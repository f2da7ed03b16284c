// =============================================================================
// Shared types used across the Aurora core
// =============================================================================

use serde::{Deserialize, Serialize};

/// Direction of a trade, signal, or pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "TEXT", rename_all = "UPPERCASE")]
pub enum Direction {
    Buy,
    Sell,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Buy => write!(f, "BUY"),
            Self::Sell => write!(f, "SELL"),
        }
    }
}

impl Direction {
    pub fn sign(self) -> f64 {
        match self {
            Self::Buy => 1.0,
            Self::Sell => -1.0,
        }
    }
}

/// Risk appetite for an account; scales base position risk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "TEXT", rename_all = "lowercase")]
pub enum RiskProfile {
    Conservative,
    Moderate,
    Aggressive,
}

impl Default for RiskProfile {
    fn default() -> Self {
        Self::Moderate
    }
}

/// Exactly three live states for a (account, instrument) subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "TEXT", rename_all = "lowercase")]
pub enum SubscriptionState {
    Live,
    Shadow,
    Disabled,
}

/// Status of a `SymbolTradingConfig` row — what the auto-trader may do for
/// this (account, instrument, direction).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "TEXT", rename_all = "snake_case")]
pub enum SymbolConfigStatus {
    Active,
    ReducedRisk,
    Paused,
    Disabled,
    ShadowTrade,
}

impl Default for SymbolConfigStatus {
    fn default() -> Self {
        Self::Active
    }
}

/// Status of a `TradingSignal` row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "TEXT", rename_all = "lowercase")]
pub enum SignalStatus {
    Active,
    Expired,
    Executed,
    Superseded,
}

/// Status of a `Trade` row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "TEXT", rename_all = "lowercase")]
pub enum TradeStatus {
    Open,
    Closed,
    Pending,
}

/// How a trade was originated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "TEXT", rename_all = "snake_case")]
pub enum TradeSource {
    Autotrade,
    EaCommand,
    Manual,
}

/// Enumerated close reasons — must account for every closed trade (invariant 5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "TEXT", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CloseReason {
    SlHit,
    TpHit,
    TrailingStop,
    TimeExit,
    Manual,
    PartialClose,
    Emergency,
    StrategyInvalid,
    StaleReconciled,
}

impl std::fmt::Display for CloseReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::SlHit => "SL_HIT",
            Self::TpHit => "TP_HIT",
            Self::TrailingStop => "TRAILING_STOP",
            Self::TimeExit => "TIME_EXIT",
            Self::Manual => "MANUAL",
            Self::PartialClose => "PARTIAL_CLOSE",
            Self::Emergency => "EMERGENCY",
            Self::StrategyInvalid => "STRATEGY_INVALID",
            Self::StaleReconciled => "STALE_RECONCILED",
        };
        write!(f, "{s}")
    }
}

/// Command type emitted by the auto-trader / trade monitor for the EA to execute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "TEXT", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CommandType {
    OpenTrade,
    CloseTrade,
    ModifySl,
    ModifyTp,
    PartialCloseTrade,
}

/// Command lifecycle status. Transitions are monotonic (invariant 4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "TEXT", rename_all = "lowercase")]
pub enum CommandStatus {
    Pending,
    InFlight,
    Completed,
    Failed,
    Timeout,
}

/// Time-of-day bucket used for analytics and session-aware sizing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "TEXT", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Session {
    Asian,
    London,
    Overlap,
    Us,
    AfterHours,
}

impl std::fmt::Display for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Asian => "ASIAN",
            Self::London => "LONDON",
            Self::Overlap => "OVERLAP",
            Self::Us => "US",
            Self::AfterHours => "AFTER_HOURS",
        };
        write!(f, "{s}")
    }
}

impl Session {
    /// Derive the session bucket from a UTC hour-of-day (0-23).
    pub fn from_utc_hour(hour: u32) -> Self {
        match hour {
            0..=7 => Self::Asian,
            8..=12 => Self::London,
            13..=15 => Self::Overlap,
            16..=21 => Self::Us,
            _ => Self::AfterHours,
        }
    }
}

/// Market regime classification (§4.3). `TooWeak` means the trend is too
/// indecisive to act on at all; both trend-following and mean-reversion
/// indicators are filtered out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Regime {
    Trending,
    Ranging,
    TooWeak,
}

impl std::fmt::Display for Regime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Trending => write!(f, "TRENDING"),
            Self::Ranging => write!(f, "RANGING"),
            Self::TooWeak => write!(f, "TOO_WEAK"),
        }
    }
}

/// Directional bias carried alongside a regime or pattern classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Bias {
    Bullish,
    Bearish,
    Neutral,
}

impl std::fmt::Display for Bias {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bullish => write!(f, "bullish"),
            Self::Bearish => write!(f, "bearish"),
            Self::Neutral => write!(f, "neutral"),
        }
    }
}

/// Qualitative strength bucket attached to compound indicator results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Strength {
    Weak,
    Medium,
    Strong,
    VeryStrong,
}

/// Asset class, used to pick ATR multipliers and correlation grouping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AssetClass {
    ForexMajor,
    ForexMinor,
    Metal,
    Index,
    Crypto,
}

/// The enumerated decision-log taxonomy (§6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "TEXT", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DecisionType {
    SignalGenerated,
    SignalExpired,
    TradeOpen,
    TradeSkip,
    TradeRetry,
    TradeFailed,
    CircuitBreaker,
    SpreadRejected,
    TickStale,
    ShadowTrade,
    SymbolRecovery,
    NewsPause,
    NewsResume,
    VolatilityHigh,
    LiquidityLow,
    MtfAlignment,
    TrailingStop,
    OptimizationRun,
    PerformanceAlert,
    Mt5Disconnect,
    Mt5Reconnect,
    AutotradingEnabled,
    AutotradingDisabled,
}

/// Direction implied by a detected candlestick pattern (§4.4). Distinct from
/// [`Bias`] — patterns can be genuinely indecisive rather than merely
/// neutral, so the pattern recognizer gets its own vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "TEXT", rename_all = "lowercase")]
pub enum PatternDirection {
    Bullish,
    Bearish,
    Indecision,
}

impl std::fmt::Display for PatternDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bullish => write!(f, "bullish"),
            Self::Bearish => write!(f, "bearish"),
            Self::Indecision => write!(f, "indecision"),
        }
    }
}
