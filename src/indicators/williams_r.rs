// =============================================================================
// Williams %R(14)
// =============================================================================
//
// %R = (highest_high(period) - close) / (highest_high(period) - lowest_low(period)) * -100
// Range [-100, 0]; readings above -20 are overbought, below -80 oversold.
// =============================================================================

use crate::db::models::Ohlc;

pub fn calculate_williams_r(candles: &[Ohlc], period: usize) -> Option<f64> {
    if period == 0 || candles.len() < period {
        return None;
    }

    let window = &candles[candles.len() - period..];
    let highest = window.iter().map(|c| c.high).fold(f64::MIN, f64::max);
    let lowest = window.iter().map(|c| c.low).fold(f64::MAX, f64::min);
    let close = window.last()?.close;

    let range = highest - lowest;
    if range == 0.0 {
        return Some(-50.0);
    }

    Some((highest - close) / range * -100.0)
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
    fn williams_r_overbought_near_high() {
        let mut candles: Vec<Ohlc> = (0..14).map(|i| candle(100.0 + i as f64, 90.0 + i as f64, 95.0 + i as f64)).collect();
        candles.push(candle(120.0, 100.0, 119.0));
        let r = calculate_williams_r(&candles[candles.len() - 14..], 14).unwrap();
        assert!(r > -20.0);
    }

    #[test]
    fn williams_r_insufficient_data() {
        let candles: Vec<Ohlc> = (0..5).map(|_| candle(101.0, 99.0, 100.0)).collect();
        assert!(calculate_williams_r(&candles, 14).is_none());
    }
}
