// =============================================================================
// Heiken-Ashi with volume-confirmed trend signal
// =============================================================================
//
// Heiken-Ashi smooths price action into synthetic candles:
//   ha_close = (open + high + low + close) / 4
//   ha_open  = (prev_ha_open + prev_ha_close) / 2      (seeded from the raw
//              open/close of the first bar)
//   ha_high  = max(high, ha_open, ha_close)
//   ha_low   = min(low, ha_open, ha_close)
//
// The trend signal combines three independent reads so that a smooth but
// thin HA run doesn't get reported as a strong trend:
//   - body/wick geometry: a trending HA candle has little to no opposing
//     wick (the "textbook" HA trend bar)
//   - EMA(8) vs EMA(30) on the HA closes
//   - current bar volume vs the 20-period mean volume
// =============================================================================

use super::ema::calculate_ema;
use crate::db::models::Ohlc;
use crate::types::Bias;

#[derive(Debug, Clone)]
pub struct HeikenAshiCandle {
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

#[derive(Debug, Clone)]
pub struct HeikenAshiResult {
    pub candle: HeikenAshiCandle,
    pub bias: Bias,
    pub volume_confirmed: bool,
}

pub fn calculate_heiken_ashi(candles: &[Ohlc]) -> Vec<HeikenAshiCandle> {
    let mut out = Vec::with_capacity(candles.len());
    let mut prev: Option<HeikenAshiCandle> = None;

    for c in candles {
        let ha_close = (c.open + c.high + c.low + c.close) / 4.0;
        let ha_open = match &prev {
            Some(p) => (p.open + p.close) / 2.0,
            None => (c.open + c.close) / 2.0,
        };
        let ha_high = c.high.max(ha_open).max(ha_close);
        let ha_low = c.low.min(ha_open).min(ha_close);

        let ha = HeikenAshiCandle {
            open: ha_open,
            high: ha_high,
            low: ha_low,
            close: ha_close,
        };
        prev = Some(ha.clone());
        out.push(ha);
    }

    out
}

/// Evaluate the trend signal on the most recent bar. Requires at least 30
/// raw candles so the EMA(30) component has enough history.
pub fn calculate_trend_signal(candles: &[Ohlc]) -> Option<HeikenAshiResult> {
    if candles.len() < 30 {
        return None;
    }

    let ha_series = calculate_heiken_ashi(candles);
    let last = ha_series.last()?.clone();

    let body = (last.close - last.open).abs();
    let range = (last.high - last.low).max(1e-9);
    let upper_wick = last.high - last.open.max(last.close);
    let lower_wick = last.open.min(last.close) - last.low;
    let thin_wick = upper_wick.max(lower_wick) / range < 0.15;
    let is_bull_body = last.close > last.open;

    let ha_closes: Vec<f64> = ha_series.iter().map(|c| c.close).collect();
    let ema_fast = calculate_ema(&ha_closes, 8);
    let ema_slow = calculate_ema(&ha_closes, 30);
    let ema_bullish = match (ema_fast.last(), ema_slow.last()) {
        (Some(f), Some(s)) => f > s,
        _ => false,
    };

    let geometry_bullish = is_bull_body && thin_wick && body / range > 0.6;
    let geometry_bearish = !is_bull_body && thin_wick && body / range > 0.6;

    let bias = if geometry_bullish && ema_bullish {
        Bias::Bullish
    } else if geometry_bearish && !ema_bullish {
        Bias::Bearish
    } else {
        Bias::Neutral
    };

    let window_start = candles.len().saturating_sub(20);
    let avg_volume: f64 =
        candles[window_start..].iter().map(|c| c.volume).sum::<f64>() / (candles.len() - window_start) as f64;
    let volume_confirmed = candles.last()?.volume > avg_volume * 1.5;

    Some(HeikenAshiResult {
        candle: last,
        bias,
        volume_confirmed,
    })
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
    fn heiken_ashi_strong_uptrend_with_volume_is_bullish() {
        let mut candles: Vec<Ohlc> = (0..35)
            .map(|i| {
                let base = 100.0 + i as f64;
                candle(base, base + 1.0, base - 0.05, base + 0.95, 10.0)
            })
            .collect();
        let last_idx = candles.len() - 1;
        candles[last_idx].volume = 100.0;
        let result = calculate_trend_signal(&candles).unwrap();
        assert_eq!(result.bias, Bias::Bullish);
        assert!(result.volume_confirmed);
    }

    #[test]
    fn heiken_ashi_insufficient_data() {
        let candles: Vec<Ohlc> = (0..10).map(|i| candle(100.0 + i as f64, 101.0, 99.0, 100.5, 10.0)).collect();
        assert!(calculate_trend_signal(&candles).is_none());
    }
}
