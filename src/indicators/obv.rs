// =============================================================================
// On-Balance Volume
// =============================================================================
//
// Running total: add volume on up-closes, subtract on down-closes, unchanged
// on flat closes. The absolute level is meaningless; only slope matters, so
// callers compare the latest value against its own short SMA to infer bias.
// =============================================================================

use crate::db::models::Ohlc;
use crate::types::Bias;

#[derive(Debug, Clone)]
pub struct ObvResult {
    pub obv: f64,
    pub bias: Bias,
}

pub fn calculate_obv(candles: &[Ohlc], trend_window: usize) -> Option<ObvResult> {
    if candles.len() < trend_window.max(2) {
        return None;
    }

    let mut running = 0.0;
    let mut series = Vec::with_capacity(candles.len());
    for pair in candles.windows(2) {
        let (prev, cur) = (&pair[0], &pair[1]);
        if cur.close > prev.close {
            running += cur.volume;
        } else if cur.close < prev.close {
            running -= cur.volume;
        }
        series.push(running);
    }

    if series.len() < trend_window {
        return None;
    }

    let window = &series[series.len() - trend_window..];
    let avg = window.iter().sum::<f64>() / trend_window as f64;
    let last = *series.last()?;

    let bias = if last > avg {
        Bias::Bullish
    } else if last < avg {
        Bias::Bearish
    } else {
        Bias::Neutral
    };

    Some(ObvResult { obv: last, bias })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candle(close: f64, volume: f64) -> Ohlc {
        Ohlc {
            instrument: "TEST".into(),
            timeframe: "H1".into(),
            open_time: chrono::Utc::now(),
            open: close,
            high: close + 1.0,
            low: close - 1.0,
            close,
            volume,
        }
    }

    #[test]
    fn obv_rising_volume_on_uptrend_is_bullish() {
        let candles: Vec<Ohlc> = (0..15).map(|i| candle(100.0 + i as f64, 10.0 + i as f64)).collect();
        let result = calculate_obv(&candles, 10).unwrap();
        assert_eq!(result.bias, Bias::Bullish);
    }

    #[test]
    fn obv_insufficient_data() {
        let candles: Vec<Ohlc> = (0..3).map(|i| candle(100.0 + i as f64, 10.0)).collect();
        assert!(calculate_obv(&candles, 10).is_none());
    }
}
