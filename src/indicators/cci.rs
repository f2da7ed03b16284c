// =============================================================================
// Commodity Channel Index — CCI(20)
// =============================================================================
//
// typical price = (H + L + C) / 3
// CCI = (typical - SMA(typical, period)) / (0.015 * mean absolute deviation)
// =============================================================================

use crate::db::models::Ohlc;

pub fn calculate_cci(candles: &[Ohlc], period: usize) -> Option<f64> {
    if period == 0 || candles.len() < period {
        return None;
    }

    let window = &candles[candles.len() - period..];
    let typical: Vec<f64> = window
        .iter()
        .map(|c| (c.high + c.low + c.close) / 3.0)
        .collect();

    let mean = typical.iter().sum::<f64>() / period as f64;
    let mad = typical.iter().map(|t| (t - mean).abs()).sum::<f64>() / period as f64;

    if mad == 0.0 {
        return Some(0.0);
    }

    let last_typical = *typical.last()?;
    Some((last_typical - mean) / (0.015 * mad))
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
    fn cci_flat_series_is_zero() {
        let candles: Vec<Ohlc> = (0..20).map(|_| candle(101.0, 99.0, 100.0)).collect();
        let cci = calculate_cci(&candles, 20).unwrap();
        assert_eq!(cci, 0.0);
    }

    #[test]
    fn cci_uptrend_is_positive() {
        let candles: Vec<Ohlc> = (0..20)
            .map(|i| candle(101.0 + i as f64, 99.0 + i as f64, 100.0 + i as f64))
            .collect();
        let cci = calculate_cci(&candles, 20).unwrap();
        assert!(cci > 0.0);
    }

    #[test]
    fn cci_insufficient_data() {
        let candles: Vec<Ohlc> = (0..5).map(|_| candle(101.0, 99.0, 100.0)).collect();
        assert!(calculate_cci(&candles, 20).is_none());
    }
}
