// =============================================================================
// MACD — Moving Average Convergence Divergence
// =============================================================================
//
// MACD line = EMA(fast) - EMA(slow); signal line = EMA(signal) of the MACD
// line; histogram = MACD - signal. Standard parameters: (12, 26, 9).
// =============================================================================

use super::ema::calculate_ema;
use crate::types::{Bias, Strength};

#[derive(Debug, Clone)]
pub struct MacdResult {
    pub macd: f64,
    pub signal: f64,
    pub histogram: f64,
    pub bias: Bias,
    pub strength: Strength,
}

pub fn calculate_macd(
    closes: &[f64],
    fast: usize,
    slow: usize,
    signal_period: usize,
) -> Option<MacdResult> {
    if closes.len() < slow + signal_period {
        return None;
    }

    let ema_fast = calculate_ema(closes, fast);
    let ema_slow = calculate_ema(closes, slow);
    if ema_fast.len() != ema_slow.len() {
        return None;
    }

    let macd_line: Vec<f64> = ema_fast
        .iter()
        .zip(ema_slow.iter())
        .map(|(f, s)| f - s)
        .collect();

    if macd_line.len() < signal_period {
        return None;
    }

    let signal_line = calculate_ema(&macd_line, signal_period);
    let macd = *macd_line.last()?;
    let signal = *signal_line.last()?;
    let histogram = macd - signal;

    let bias = if histogram > 0.0 {
        Bias::Bullish
    } else if histogram < 0.0 {
        Bias::Bearish
    } else {
        Bias::Neutral
    };

    let magnitude = histogram.abs() / closes.last()?.max(1e-9) * 100.0;
    let strength = strength_bucket(magnitude);

    Some(MacdResult {
        macd,
        signal,
        histogram,
        bias,
        strength,
    })
}

fn strength_bucket(pct: f64) -> Strength {
    if pct > 1.0 {
        Strength::VeryStrong
    } else if pct > 0.5 {
        Strength::Strong
    } else if pct > 0.15 {
        Strength::Medium
    } else {
        Strength::Weak
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn macd_uptrend_is_bullish() {
        let closes: Vec<f64> = (0..60).map(|i| 100.0 + i as f64 * 0.5).collect();
        let result = calculate_macd(&closes, 12, 26, 9).unwrap();
        assert_eq!(result.bias, Bias::Bullish);
        assert!(result.histogram > 0.0);
    }

    #[test]
    fn macd_insufficient_data() {
        let closes = vec![1.0, 2.0, 3.0];
        assert!(calculate_macd(&closes, 12, 26, 9).is_none());
    }
}
