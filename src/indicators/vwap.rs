// =============================================================================
// Volume-Weighted Average Price, session-anchored
// =============================================================================

use crate::db::models::Ohlc;

pub fn calculate_vwap(candles: &[Ohlc]) -> Option<f64> {
    if candles.is_empty() {
        return None;
    }

    let mut cum_pv = 0.0;
    let mut cum_vol = 0.0;
    for c in candles {
        let typical = (c.high + c.low + c.close) / 3.0;
        cum_pv += typical * c.volume;
        cum_vol += c.volume;
    }

    if cum_vol == 0.0 {
        return None;
    }

    Some(cum_pv / cum_vol)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candle(high: f64, low: f64, close: f64, volume: f64) -> Ohlc {
        Ohlc {
            instrument: "TEST".into(),
            timeframe: "H1".into(),
            open_time: chrono::Utc::now(),
            open: close,
            high,
            low,
            close,
            volume,
        }
    }

    #[test]
    fn vwap_weights_toward_high_volume_bars() {
        let candles = vec![
            candle(101.0, 99.0, 100.0, 1.0),
            candle(111.0, 109.0, 110.0, 100.0),
        ];
        let vwap = calculate_vwap(&candles).unwrap();
        assert!(vwap > 105.0);
    }

    #[test]
    fn vwap_empty_series() {
        assert!(calculate_vwap(&[]).is_none());
    }
}
