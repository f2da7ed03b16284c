// =============================================================================
// Market Regime Detector
// =============================================================================
//
// Classifies the current market into exactly one of three regimes from ADX
// and its trend-strength derivatives. Each regime carries a direction and a
// 0-100 strength so downstream strategy modules know not just *whether* to
// trade but *which way*.
//
// Detection hierarchy (evaluated top-to-bottom; first match wins):
//
//   1. TOO_WEAK  — ADX < 12   (no tradeable edge in either direction)
//   2. TRENDING  — ADX > 25   (persistent directional move)
//   3. RANGING   — everything else, including the classic ADX <= 18 band and
//                  the 18-25 transition zone where neither extreme holds.
//
// In TRENDING, trend-following sub-signals are kept and mean-reversion ones
// are filtered out; in RANGING it's the reverse; in TOO_WEAK everything is
// filtered — the regime itself overrides the signal generator's aggregation.

use std::sync::Arc;
use std::time::Instant;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::db::models::Ohlc as Candle;
use crate::indicators::adx::calculate_adx;
use crate::indicators::bollinger::calculate_bollinger;
use crate::regime::entropy::ShannonEntropyFilter;
use crate::regime::hurst::calculate_hurst_exponent;
use crate::types::{Bias, Regime};

/// Whether a strategy type is compatible with the detected regime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyType {
    TrendFollowing,
    MeanReversion,
}

impl Regime {
    /// Whether sub-signals of `strategy` survive the regime filter (§4.4).
    pub fn allows(self, strategy: StrategyType) -> bool {
        match self {
            Regime::Trending => strategy == StrategyType::TrendFollowing,
            Regime::Ranging => strategy == StrategyType::MeanReversion,
            Regime::TooWeak => false,
        }
    }
}

/// Complete snapshot of the detected regime plus all contributing metrics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegimeState {
    pub regime: Regime,
    pub direction: Bias,
    /// Strength of the classification, 0-100.
    pub strength: f64,

    pub adx: f64,
    pub bbw: f64,
    pub hurst: f64,
    pub entropy: f64,

    /// Number of seconds the current regime has been active.
    pub regime_age_secs: f64,
}

/// Thread-safe regime detector that caches the latest regime state per
/// (instrument, timeframe) — callers key their own instances per pair.
pub struct RegimeDetector {
    state: RwLock<Option<RegimeState>>,
    last_change_time: RwLock<Instant>,
}

impl RegimeDetector {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: RwLock::new(None),
            last_change_time: RwLock::new(Instant::now()),
        })
    }

    /// Run full regime detection on the provided candles and closing prices.
    pub fn detect(&self, candles: &[Candle], closes: &[f64]) -> Option<RegimeState> {
        let adx_value = calculate_adx(candles, 14).unwrap_or(0.0);
        let bb_result = calculate_bollinger(closes, 20, 2.0)?;
        let bbw_value = bb_result.width;
        let hurst_value = calculate_hurst_exponent(closes).unwrap_or(0.50);
        let entropy_value = ShannonEntropyFilter::calculate(candles, 50).unwrap_or(0.0);

        let (regime, strength) = classify(adx_value, hurst_value, entropy_value);
        let direction = direction_bias(candles, regime);

        let now = Instant::now();
        let prev_regime = self.state.read().as_ref().map(|s| s.regime);
        if prev_regime != Some(regime) {
            *self.last_change_time.write() = now;
        }
        let regime_age_secs = now.duration_since(*self.last_change_time.read()).as_secs_f64();

        let new_state = RegimeState {
            regime,
            direction,
            strength,
            adx: adx_value,
            bbw: bbw_value,
            hurst: hurst_value,
            entropy: entropy_value,
            regime_age_secs,
        };

        debug!(
            regime = %regime,
            direction = ?direction,
            strength = format!("{:.1}", strength),
            adx = format!("{:.2}", adx_value),
            age_secs = format!("{:.1}", regime_age_secs),
            "Regime detected"
        );

        *self.state.write() = Some(new_state.clone());
        Some(new_state)
    }

    pub fn update(&self, candles: &[Candle]) -> Option<RegimeState> {
        let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
        self.detect(candles, &closes)
    }

    pub fn current_regime(&self) -> Option<RegimeState> {
        self.state.read().clone()
    }
}

impl Default for RegimeDetector {
    fn default() -> Self {
        Self {
            state: RwLock::new(None),
            last_change_time: RwLock::new(Instant::now()),
        }
    }
}

/// Classify regime and strength from ADX, Hurst and entropy.
fn classify(adx: f64, hurst: f64, entropy: f64) -> (Regime, f64) {
    if adx < 12.0 {
        let strength = remap(entropy, 0.95, 0.5, 80.0, 10.0);
        trace!(adx, "Regime: TOO_WEAK (adx < 12)");
        return (Regime::TooWeak, strength);
    }

    if adx > 25.0 {
        let strength = remap(adx, 25.0, 60.0, 50.0, 100.0).max(remap(hurst, 0.55, 0.9, 50.0, 100.0));
        return (Regime::Trending, strength);
    }

    let strength = remap(adx, 18.0, 0.0, 40.0, 80.0);
    (Regime::Ranging, strength)
}

/// Rough directional read from net price movement over the detection window;
/// TOO_WEAK always reports Neutral since no edge exists to act on.
fn direction_bias(candles: &[Candle], regime: Regime) -> Bias {
    if regime == Regime::TooWeak {
        return Bias::Neutral;
    }
    match (candles.first(), candles.last()) {
        (Some(first), Some(last)) if last.close > first.close => Bias::Bullish,
        (Some(first), Some(last)) if last.close < first.close => Bias::Bearish,
        _ => Bias::Neutral,
    }
}

fn remap(value: f64, in_lo: f64, in_hi: f64, out_lo: f64, out_hi: f64) -> f64 {
    let t = if (in_hi - in_lo).abs() < f64::EPSILON {
        0.5
    } else {
        (value - in_lo) / (in_hi - in_lo)
    };
    let clamped = t.clamp(0.0, 1.0);
    out_lo + clamped * (out_hi - out_lo)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_too_weak_below_twelve() {
        let (regime, _) = classify(8.0, 0.5, 0.5);
        assert_eq!(regime, Regime::TooWeak);
    }

    #[test]
    fn classify_trending_above_twentyfive() {
        let (regime, strength) = classify(30.0, 0.6, 0.5);
        assert_eq!(regime, Regime::Trending);
        assert!(strength >= 50.0);
    }

    #[test]
    fn classify_ranging_in_between() {
        let (regime, _) = classify(20.0, 0.5, 0.5);
        assert_eq!(regime, Regime::Ranging);
    }

    #[test]
    fn classify_ranging_at_low_adx() {
        let (regime, _) = classify(15.0, 0.5, 0.5);
        assert_eq!(regime, Regime::Ranging);
    }

    #[test]
    fn allows_trend_following_only_in_trending() {
        assert!(Regime::Trending.allows(StrategyType::TrendFollowing));
        assert!(!Regime::Trending.allows(StrategyType::MeanReversion));
        assert!(Regime::Ranging.allows(StrategyType::MeanReversion));
        assert!(!Regime::TooWeak.allows(StrategyType::TrendFollowing));
        assert!(!Regime::TooWeak.allows(StrategyType::MeanReversion));
    }

    #[test]
    fn regime_display() {
        assert_eq!(format!("{}", Regime::Trending), "TRENDING");
        assert_eq!(format!("{}", Regime::TooWeak), "TOO_WEAK");
    }
}
