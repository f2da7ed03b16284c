// =============================================================================
// Stochastic Oscillator — %K / %D
// =============================================================================
//
// %K = (close - lowest_low(period)) / (highest_high(period) - lowest_low(period)) * 100
// %D = SMA(%K, d_period)
// Standard parameters: (5, 3, 3).
// =============================================================================

use crate::db::models::Ohlc;

#[derive(Debug, Clone)]
pub struct StochasticResult {
    pub k: f64,
    pub d: f64,
}

pub fn calculate_stochastic(
    candles: &[Ohlc],
    k_period: usize,
    k_smooth: usize,
    d_period: usize,
) -> Option<StochasticResult> {
    if k_period == 0 || candles.len() < k_period + k_smooth + d_period {
        return None;
    }

    let mut raw_k = Vec::with_capacity(candles.len() - k_period + 1);
    for i in k_period - 1..candles.len() {
        let window = &candles[i + 1 - k_period..=i];
        let highest = window.iter().map(|c| c.high).fold(f64::MIN, f64::max);
        let lowest = window.iter().map(|c| c.low).fold(f64::MAX, f64::min);
        let close = candles[i].close;
        let range = highest - lowest;
        let k = if range > 0.0 {
            (close - lowest) / range * 100.0
        } else {
            50.0
        };
        raw_k.push(k);
    }

    let smoothed_k = sma_series(&raw_k, k_smooth)?;
    let d = sma_series(&smoothed_k, d_period)?;

    Some(StochasticResult {
        k: *smoothed_k.last()?,
        d: *d.last()?,
    })
}

fn sma_series(values: &[f64], period: usize) -> Option<Vec<f64>> {
    if period == 0 || values.len() < period {
        return None;
    }
    let mut out = Vec::with_capacity(values.len() - period + 1);
    for i in period - 1..values.len() {
        let window = &values[i + 1 - period..=i];
        out.push(window.iter().sum::<f64>() / period as f64);
    }
    Some(out)
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
    fn stochastic_overbought() {
        let candles: Vec<Ohlc> = (0..20)
            .map(|i| candle(100.0 + i as f64, 95.0 + i as f64, 100.0 + i as f64))
            .collect();
        let result = calculate_stochastic(&candles, 5, 3, 3).unwrap();
        assert!(result.k > 50.0);
    }

    #[test]
    fn stochastic_insufficient_data() {
        let candles: Vec<Ohlc> = (0..5).map(|i| candle(101.0, 99.0, 100.0 + i as f64)).collect();
        assert!(calculate_stochastic(&candles, 5, 3, 3).is_none());
    }
}
