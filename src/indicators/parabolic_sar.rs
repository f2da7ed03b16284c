// =============================================================================
// Parabolic SAR (stop-and-reverse) — Wilder's original formulation
// =============================================================================

use crate::db::models::Ohlc;
use crate::types::Bias;

#[derive(Debug, Clone)]
pub struct SarResult {
    pub sar: f64,
    pub bias: Bias,
}

const DEFAULT_STEP: f64 = 0.02;
const MAX_STEP: f64 = 0.2;

/// Run the SAR recursion over the full candle series, returning the final
/// stop level and the trend it currently implies.
pub fn calculate_parabolic_sar(candles: &[Ohlc]) -> Option<SarResult> {
    if candles.len() < 3 {
        return None;
    }

    let mut rising = candles[1].close >= candles[0].close;
    let mut sar = if rising { candles[0].low } else { candles[0].high };
    let mut extreme = if rising { candles[0].high } else { candles[0].low };
    let mut step = DEFAULT_STEP;

    for candle in &candles[1..] {
        sar += step * (extreme - sar);

        if rising {
            sar = sar.min(candle.low);
            if candle.high > extreme {
                extreme = candle.high;
                step = (step + DEFAULT_STEP).min(MAX_STEP);
            }
            if candle.low < sar {
                rising = false;
                sar = extreme;
                extreme = candle.low;
                step = DEFAULT_STEP;
            }
        } else {
            sar = sar.max(candle.high);
            if candle.low < extreme {
                extreme = candle.low;
                step = (step + DEFAULT_STEP).min(MAX_STEP);
            }
            if candle.high > sar {
                rising = true;
                sar = extreme;
                extreme = candle.high;
                step = DEFAULT_STEP;
            }
        }
    }

    let bias = if rising { Bias::Bullish } else { Bias::Bearish };
    Some(SarResult { sar, bias })
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
    fn sar_tracks_uptrend_below_price() {
        let candles: Vec<Ohlc> = (0..20)
            .map(|i| candle(101.0 + i as f64, 99.0 + i as f64, 100.0 + i as f64))
            .collect();
        let result = calculate_parabolic_sar(&candles).unwrap();
        assert_eq!(result.bias, Bias::Bullish);
        assert!(result.sar < candles.last().unwrap().close);
    }

    #[test]
    fn sar_insufficient_data() {
        let candles = vec![candle(101.0, 99.0, 100.0), candle(102.0, 100.0, 101.0)];
        assert!(calculate_parabolic_sar(&candles).is_none());
    }
}
