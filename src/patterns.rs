// =============================================================================
// Candlestick pattern recognizer (§4.4)
// =============================================================================
//
// Consumes the same OHLC window the indicator bundle does and emits a list of
// named candlestick patterns. Patterns sharing a cluster (e.g. every
// bullish-reversal shape) are deduplicated down to the single highest-
// reliability member; anything left under the reliability floor is dropped.
// Volume confirmation and trend-context bonuses are applied before
// clustering, matching the order the indicator modules apply their own
// confirmation passes.

use crate::db::models::Ohlc;
use crate::types::PatternDirection;

const RELIABILITY_FLOOR: f64 = 60.0;
const VOLUME_CONFIRMATION_BONUS: f64 = 10.0;
const TREND_CONTEXT_BONUS: f64 = 8.0;
const VOLUME_LOOKBACK: usize = 20;

#[derive(Debug, Clone, PartialEq)]
pub enum PatternCluster {
    BullishReversal,
    BearishReversal,
    BullishContinuation,
    BearishContinuation,
    Indecision,
}

#[derive(Debug, Clone)]
pub struct PatternMatch {
    pub name: &'static str,
    pub direction: PatternDirection,
    pub cluster: PatternCluster,
    pub reliability: f64,
}

/// Detect every candlestick pattern on the most recent bar, apply volume and
/// trend-context bonuses, cluster-dedup, and drop anything below the
/// reliability floor.
pub fn detect_patterns(candles: &[Ohlc]) -> Vec<PatternMatch> {
    if candles.len() < 3 {
        return Vec::new();
    }

    let mut matches = Vec::new();
    matches.extend(detect_single_candle(candles));
    matches.extend(detect_two_candle(candles));
    matches.extend(detect_three_candle(candles));

    let volume_confirmed = is_volume_confirmed(candles);
    let trend_up = is_uptrend(candles);

    for m in &mut matches {
        if volume_confirmed {
            m.reliability += VOLUME_CONFIRMATION_BONUS;
        }
        let aligned_with_trend = matches!(
            (&m.cluster, trend_up),
            (PatternCluster::BullishContinuation, true) | (PatternCluster::BearishContinuation, false)
        );
        if aligned_with_trend {
            m.reliability += TREND_CONTEXT_BONUS;
        }
        m.reliability = m.reliability.min(100.0);
    }

    dedup_by_cluster(matches)
        .into_iter()
        .filter(|m| m.reliability >= RELIABILITY_FLOOR)
        .collect()
}

fn dedup_by_cluster(mut matches: Vec<PatternMatch>) -> Vec<PatternMatch> {
    matches.sort_by(|a, b| b.reliability.partial_cmp(&a.reliability).unwrap());
    let mut seen = Vec::new();
    let mut out = Vec::new();
    for m in matches {
        if seen.contains(&m.cluster) {
            continue;
        }
        seen.push(m.cluster.clone());
        out.push(m);
    }
    out
}

fn is_volume_confirmed(candles: &[Ohlc]) -> bool {
    let window_start = candles.len().saturating_sub(VOLUME_LOOKBACK);
    let window = &candles[window_start..candles.len().saturating_sub(1).max(window_start)];
    if window.is_empty() {
        return false;
    }
    let avg = window.iter().map(|c| c.volume).sum::<f64>() / window.len() as f64;
    candles.last().map(|c| c.volume > avg * 1.5).unwrap_or(false)
}

fn is_uptrend(candles: &[Ohlc]) -> bool {
    let window_start = candles.len().saturating_sub(10);
    match (candles.get(window_start), candles.last()) {
        (Some(first), Some(last)) => last.close > first.close,
        _ => false,
    }
}

fn body(c: &Ohlc) -> f64 {
    (c.close - c.open).abs()
}

fn range(c: &Ohlc) -> f64 {
    (c.high - c.low).max(1e-9)
}

fn upper_wick(c: &Ohlc) -> f64 {
    c.high - c.open.max(c.close)
}

fn lower_wick(c: &Ohlc) -> f64 {
    c.open.min(c.close) - c.low
}

fn is_bullish(c: &Ohlc) -> bool {
    c.close > c.open
}

// ---------------------------------------------------------------------------
// Single-candle patterns
// ---------------------------------------------------------------------------

fn detect_single_candle(candles: &[Ohlc]) -> Vec<PatternMatch> {
    let c = &candles[candles.len() - 1];
    let mut out = Vec::new();

    let b = body(c);
    let r = range(c);
    let uw = upper_wick(c);
    let lw = lower_wick(c);

    if b / r < 0.1 {
        out.push(PatternMatch {
            name: "doji",
            direction: PatternDirection::Indecision,
            cluster: PatternCluster::Indecision,
            reliability: 55.0,
        });
    }

    if lw > b * 2.0 && uw < b * 0.5 {
        out.push(PatternMatch {
            name: "hammer",
            direction: PatternDirection::Bullish,
            cluster: PatternCluster::BullishReversal,
            reliability: 65.0,
        });
    }

    if uw > b * 2.0 && lw < b * 0.5 {
        out.push(PatternMatch {
            name: "shooting_star",
            direction: PatternDirection::Bearish,
            cluster: PatternCluster::BearishReversal,
            reliability: 65.0,
        });
    }

    if b / r > 0.9 {
        if is_bullish(c) {
            out.push(PatternMatch {
                name: "marubozu_bullish",
                direction: PatternDirection::Bullish,
                cluster: PatternCluster::BullishContinuation,
                reliability: 62.0,
            });
        } else {
            out.push(PatternMatch {
                name: "marubozu_bearish",
                direction: PatternDirection::Bearish,
                cluster: PatternCluster::BearishContinuation,
                reliability: 62.0,
            });
        }
    }

    out
}

// ---------------------------------------------------------------------------
// Two-candle patterns
// ---------------------------------------------------------------------------

fn detect_two_candle(candles: &[Ohlc]) -> Vec<PatternMatch> {
    let prev = &candles[candles.len() - 2];
    let cur = &candles[candles.len() - 1];
    let mut out = Vec::new();

    let engulfs = cur.open <= prev.close.min(prev.open) && cur.close >= prev.close.max(prev.open);
    if engulfs && !is_bullish(prev) && is_bullish(cur) {
        out.push(PatternMatch {
            name: "bullish_engulfing",
            direction: PatternDirection::Bullish,
            cluster: PatternCluster::BullishReversal,
            reliability: 72.0,
        });
    }
    let bearish_engulfs = cur.open >= prev.close.max(prev.open) && cur.close <= prev.close.min(prev.open);
    if bearish_engulfs && is_bullish(prev) && !is_bullish(cur) {
        out.push(PatternMatch {
            name: "bearish_engulfing",
            direction: PatternDirection::Bearish,
            cluster: PatternCluster::BearishReversal,
            reliability: 72.0,
        });
    }

    if !is_bullish(prev) && is_bullish(cur) && cur.open < prev.close && cur.close > (prev.open + prev.close) / 2.0 {
        out.push(PatternMatch {
            name: "piercing_line",
            direction: PatternDirection::Bullish,
            cluster: PatternCluster::BullishReversal,
            reliability: 64.0,
        });
    }

    out
}

// ---------------------------------------------------------------------------
// Three-candle patterns
// ---------------------------------------------------------------------------

fn detect_three_candle(candles: &[Ohlc]) -> Vec<PatternMatch> {
    let a = &candles[candles.len() - 3];
    let b = &candles[candles.len() - 2];
    let c = &candles[candles.len() - 1];
    let mut out = Vec::new();

    let small_middle = body(b) / range(b) < 0.3;
    if !is_bullish(a) && small_middle && is_bullish(c) && c.close > (a.open + a.close) / 2.0 {
        out.push(PatternMatch {
            name: "morning_star",
            direction: PatternDirection::Bullish,
            cluster: PatternCluster::BullishReversal,
            reliability: 78.0,
        });
    }
    if is_bullish(a) && small_middle && !is_bullish(c) && c.close < (a.open + a.close) / 2.0 {
        out.push(PatternMatch {
            name: "evening_star",
            direction: PatternDirection::Bearish,
            cluster: PatternCluster::BearishReversal,
            reliability: 78.0,
        });
    }

    if is_bullish(a) && is_bullish(b) && is_bullish(c) && c.close > b.close && b.close > a.close {
        out.push(PatternMatch {
            name: "three_white_soldiers",
            direction: PatternDirection::Bullish,
            cluster: PatternCluster::BullishContinuation,
            reliability: 70.0,
        });
    }
    if !is_bullish(a) && !is_bullish(b) && !is_bullish(c) && c.close < b.close && b.close < a.close {
        out.push(PatternMatch {
            name: "three_black_crows",
            direction: PatternDirection::Bearish,
            cluster: PatternCluster::BearishContinuation,
            reliability: 70.0,
        });
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candle(open: f64, high: f64, low: f64, close: f64, volume: f64) -> Ohlc {
        Ohlc {
            instrument: "TEST".into(),
            timeframe: "H1".into(),
            open_time: chrono::Utc::now(),
            open,
            high,
            low,
            close,
            volume,
        }
    }

    #[test]
    fn detects_bullish_engulfing() {
        let candles = vec![
            candle(100.0, 100.0, 95.0, 96.0, 10.0),
            candle(95.0, 101.0, 94.0, 100.5, 10.0),
        ];
        let matches = detect_patterns(&candles);
        assert!(matches.iter().any(|m| m.name == "bullish_engulfing"));
    }

    #[test]
    fn dedup_keeps_highest_reliability_per_cluster() {
        let candles = vec![
            candle(100.0, 100.0, 95.0, 96.0, 10.0),
            candle(95.0, 101.0, 94.0, 100.5, 10.0),
        ];
        let matches = detect_patterns(&candles);
        let reversal_count = matches
            .iter()
            .filter(|m| m.cluster == PatternCluster::BullishReversal)
            .count();
        assert!(reversal_count <= 1);
    }

    #[test]
    fn short_series_yields_no_patterns() {
        let candles = vec![candle(100.0, 101.0, 99.0, 100.5, 10.0)];
        assert!(detect_patterns(&candles).is_empty());
    }

    #[test]
    fn reliability_floor_drops_weak_matches() {
        let candles = vec![candle(100.0, 100.1, 99.9, 100.0, 1.0)];
        let matches = detect_patterns(&candles);
        assert!(matches.iter().all(|m| m.reliability >= RELIABILITY_FLOOR));
    }
}
