// =============================================================================
// SuperTrend(10, 3) — ATR-banded trend-following overlay
// =============================================================================

use super::atr::calculate_atr;
use crate::db::models::Ohlc;
use crate::types::Bias;

#[derive(Debug, Clone)]
pub struct SupertrendResult {
    pub value: f64,
    pub bias: Bias,
}

pub fn calculate_supertrend(candles: &[Ohlc], period: usize, multiplier: f64) -> Option<SupertrendResult> {
    if candles.len() < period + 1 {
        return None;
    }

    let mut upper = f64::NAN;
    let mut lower = f64::NAN;
    let mut bias = Bias::Neutral;
    let mut value = 0.0;

    for i in period..candles.len() {
        let window = &candles[..=i];
        let atr = calculate_atr(window, period)?;
        let candle = &candles[i];
        let mid = (candle.high + candle.low) / 2.0;

        let mut basic_upper = mid + multiplier * atr;
        let mut basic_lower = mid - multiplier * atr;

        if i > period {
            let prev_close = candles[i - 1].close;
            if !(basic_upper < upper || prev_close > upper) {
                basic_upper = upper;
            }
            if !(basic_lower > lower || prev_close < lower) {
                basic_lower = lower;
            }
        }

        upper = basic_upper;
        lower = basic_lower;

        bias = if candle.close > upper {
            Bias::Bullish
        } else if candle.close < lower {
            Bias::Bearish
        } else {
            bias
        };

        value = match bias {
            Bias::Bullish => lower,
            Bias::Bearish => upper,
            Bias::Neutral => mid,
        };
    }

    Some(SupertrendResult { value, bias })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candle(high: f64, low: f64, close: f64) -> Ohlc {
        Ohlc {
            instrument: "TEST".into(),
            timeframe: "H1".into(),
            open_time: chrono::Utc::now(),
            open: close,
            high,
            low,
            close,
            volume: 1.0,
        }
    }

    #[test]
    fn supertrend_uptrend_is_bullish() {
        let candles: Vec<Ohlc> = (0..30)
            .map(|i| candle(102.0 + i as f64, 98.0 + i as f64, 100.0 + i as f64))
            .collect();
        let result = calculate_supertrend(&candles, 10, 3.0).unwrap();
        assert_eq!(result.bias, Bias::Bullish);
        assert!(result.value < candles.last().unwrap().close);
    }

    #[test]
    fn supertrend_insufficient_data() {
        let candles: Vec<Ohlc> = (0..5).map(|i| candle(101.0, 99.0, 100.0 + i as f64)).collect();
        assert!(calculate_supertrend(&candles, 10, 3.0).is_none());
    }
}
