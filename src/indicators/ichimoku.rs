// =============================================================================
// Ichimoku Kinko Hyo (simplified: Tenkan/Kijun/Senkou A/B, no chikou plot)
// =============================================================================

use crate::db::models::Ohlc;
use crate::types::Bias;

#[derive(Debug, Clone)]
pub struct IchimokuResult {
    pub tenkan_sen: f64,
    pub kijun_sen: f64,
    pub senkou_a: f64,
    pub senkou_b: f64,
    pub bias: Bias,
}

fn midpoint(candles: &[Ohlc], period: usize) -> Option<f64> {
    if candles.len() < period {
        return None;
    }
    let window = &candles[candles.len() - period..];
    let highest = window.iter().map(|c| c.high).fold(f64::MIN, f64::max);
    let lowest = window.iter().map(|c| c.low).fold(f64::MAX, f64::min);
    Some((highest + lowest) / 2.0)
}

pub fn calculate_ichimoku(candles: &[Ohlc]) -> Option<IchimokuResult> {
    let tenkan = midpoint(candles, 9)?;
    let kijun = midpoint(candles, 26)?;
    let senkou_a = (tenkan + kijun) / 2.0;
    let senkou_b = midpoint(candles, 52)?;

    let price = candles.last()?.close;
    let cloud_top = senkou_a.max(senkou_b);
    let cloud_bottom = senkou_a.min(senkou_b);

    let bias = if price > cloud_top {
        Bias::Bullish
    } else if price < cloud_bottom {
        Bias::Bearish
    } else {
        Bias::Neutral
    };

    Some(IchimokuResult {
        tenkan_sen: tenkan,
        kijun_sen: kijun,
        senkou_a,
        senkou_b,
        bias,
    })
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
    fn ichimoku_requires_52_bars() {
        let candles: Vec<Ohlc> = (0..40).map(|i| candle(101.0 + i as f64, 99.0 + i as f64, 100.0 + i as f64)).collect();
        assert!(calculate_ichimoku(&candles).is_none());
    }

    #[test]
    fn ichimoku_bullish_above_cloud() {
        let candles: Vec<Ohlc> = (0..60)
            .map(|i| candle(101.0 + i as f64, 99.0 + i as f64, 100.0 + i as f64))
            .collect();
        let result = calculate_ichimoku(&candles).unwrap();
        assert_eq!(result.bias, Bias::Bullish);
    }
}
