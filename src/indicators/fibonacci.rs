// =============================================================================
// Fibonacci retracement levels over the most recent swing
// =============================================================================

use crate::db::models::Ohlc;

#[derive(Debug, Clone)]
pub struct FibonacciLevels {
    pub swing_high: f64,
    pub swing_low: f64,
    pub levels: Vec<(f64, f64)>, // (ratio, price)
}

const RATIOS: [f64; 5] = [0.236, 0.382, 0.5, 0.618, 0.786];

/// Compute retracement levels over the swing found in the trailing `lookback`
/// candles.
pub fn calculate_fibonacci(candles: &[Ohlc], lookback: usize) -> Option<FibonacciLevels> {
    if candles.is_empty() {
        return None;
    }
    let window = &candles[candles.len().saturating_sub(lookback)..];
    let swing_high = window.iter().map(|c| c.high).fold(f64::MIN, f64::max);
    let swing_low = window.iter().map(|c| c.low).fold(f64::MAX, f64::min);

    if swing_high <= swing_low {
        return None;
    }

    let range = swing_high - swing_low;
    let levels = RATIOS
        .iter()
        .map(|r| (*r, swing_high - range * r))
        .collect();

    Some(FibonacciLevels {
        swing_high,
        swing_low,
        levels,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candle(high: f64, low: f64) -> Ohlc {
        Ohlc {
            instrument: "TEST".into(),
            timeframe: "H1".into(),
            open_time: chrono::Utc::now(),
            open: (high + low) / 2.0,
            high,
            low,
            close: (high + low) / 2.0,
            volume: 1.0,
        }
    }

    #[test]
    fn fib_levels_between_swing() {
        let candles = vec![candle(110.0, 100.0), candle(108.0, 101.0)];
        let fib = calculate_fibonacci(&candles, 10).unwrap();
        assert_eq!(fib.swing_high, 110.0);
        assert_eq!(fib.swing_low, 100.0);
        for (_, price) in &fib.levels {
            assert!(*price > 100.0 && *price < 110.0);
        }
    }
}
