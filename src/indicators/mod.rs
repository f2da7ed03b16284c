// =============================================================================
// Technical Indicators Module
// =============================================================================
//
// Pure, side-effect-free implementations of the core technical indicators used
// by the trading engine.  Every public function returns `Option<T>` (or an
// empty `Vec`) so callers are forced to handle insufficient-data and
// numerical-edge-case scenarios.
//
// `calculate_bundle` is the synchronized entry point: every enabled indicator
// is derived from the same OHLC snapshot and stamped with a single
// `calculated_at` timestamp, so a signal built from this bundle never mixes
// reads taken at different points in time.

pub mod adx;
pub mod atr;
pub mod bollinger;
pub mod cci;
pub mod ema;
pub mod fibonacci;
pub mod heiken_ashi;
pub mod ichimoku;
pub mod macd;
pub mod obv;
pub mod parabolic_sar;
pub mod pivot;
pub mod roc;
pub mod rsi;
pub mod stochastic;
pub mod supertrend;
pub mod vwap;
pub mod williams_r;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::db::models::Ohlc;
use crate::types::{Bias, Strength};

/// Rejects an OHLC window that would make every downstream indicator
/// computation unreliable. A single bad bar invalidates the whole bundle.
pub fn validate_ohlc(candles: &[Ohlc]) -> Result<(), String> {
    if candles.is_empty() {
        return Err("empty candle series".to_string());
    }

    for (i, c) in candles.iter().enumerate() {
        if !c.open.is_finite() || !c.high.is_finite() || !c.low.is_finite() || !c.close.is_finite() {
            return Err(format!("non-finite price at bar {i}"));
        }
        if c.open <= 0.0 || c.high <= 0.0 || c.low <= 0.0 || c.close <= 0.0 {
            return Err(format!("non-positive price at bar {i}"));
        }
        if c.high < c.open || c.high < c.close || c.high < c.low {
            return Err(format!("high below open/close/low at bar {i}"));
        }
        if c.low > c.open || c.low > c.close {
            return Err(format!("low above open/close at bar {i}"));
        }
    }

    for pair in candles.windows(2) {
        if pair[1].open_time <= pair[0].open_time {
            return Err("non-monotonic bar timestamps".to_string());
        }
    }

    Ok(())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndicatorBundle {
    pub instrument: String,
    pub timeframe: String,
    pub calculated_at: DateTime<Utc>,

    pub rsi: Option<f64>,
    pub macd: Option<macd::MacdResult>,
    pub ema_fast: Option<f64>,
    pub ema_slow: Option<f64>,
    pub bollinger: Option<bollinger::BollingerResult>,
    pub stochastic: Option<stochastic::StochasticResult>,
    pub atr: Option<f64>,
    pub adx: Option<f64>,
    pub ichimoku: Option<ichimoku::IchimokuResult>,
    pub fibonacci: Option<fibonacci::FibonacciLevels>,
    pub pivot: Option<pivot::PivotLevels>,
    pub parabolic_sar: Option<parabolic_sar::SarResult>,
    pub cci: Option<f64>,
    pub williams_r: Option<f64>,
    pub obv: Option<obv::ObvResult>,
    pub vwap: Option<f64>,
    pub supertrend: Option<supertrend::SupertrendResult>,
    pub heiken_ashi: Option<heiken_ashi::HeikenAshiResult>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompositeBias {
    pub bias: Bias,
    pub strength: Strength,
}

/// Calculate every enabled indicator from a single OHLC snapshot, stamped
/// with one `calculated_at` timestamp. Returns `Err` (an empty bundle) when
/// the input fails validation — callers must record the rejection reason in
/// the decision log rather than silently proceeding on bad data.
pub fn calculate_bundle(candles: &[Ohlc]) -> Result<IndicatorBundle, String> {
    validate_ohlc(candles)?;

    let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
    let last = candles.last().expect("validated non-empty above");

    Ok(IndicatorBundle {
        instrument: last.instrument.clone(),
        timeframe: last.timeframe.clone(),
        calculated_at: Utc::now(),

        rsi: rsi::current_rsi(&closes, 14).map(|(v, _)| v),
        macd: macd::calculate_macd(&closes, 12, 26, 9),
        ema_fast: ema::calculate_ema(&closes, 8).last().copied(),
        ema_slow: ema::calculate_ema(&closes, 30).last().copied(),
        bollinger: bollinger::calculate_bollinger(&closes, 20, 2.0),
        stochastic: stochastic::calculate_stochastic(candles, 5, 3, 3),
        atr: atr::calculate_atr(candles, 14),
        adx: adx::calculate_adx(candles, 14),
        ichimoku: ichimoku::calculate_ichimoku(candles),
        fibonacci: fibonacci::calculate_fibonacci(candles, 50),
        pivot: candles.len().checked_sub(2).map(|i| pivot::calculate_pivot(&candles[i])),
        parabolic_sar: parabolic_sar::calculate_parabolic_sar(candles),
        cci: cci::calculate_cci(candles, 20),
        williams_r: williams_r::calculate_williams_r(candles, 14),
        obv: obv::calculate_obv(candles, 20),
        vwap: vwap::calculate_vwap(candles),
        supertrend: supertrend::calculate_supertrend(candles, 10, 3.0),
        heiken_ashi: heiken_ashi::calculate_trend_signal(candles),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candle(i: usize) -> Ohlc {
        let base = 100.0 + i as f64;
        Ohlc {
            instrument: "EURUSD".into(),
            timeframe: "H1".into(),
            open_time: Utc::now() + chrono::Duration::hours(i as i64),
            open: base,
            high: base + 1.0,
            low: base - 1.0,
            close: base + 0.5,
            volume: 100.0,
        }
    }

    #[test]
    fn validate_rejects_empty() {
        assert!(validate_ohlc(&[]).is_err());
    }

    #[test]
    fn validate_rejects_inverted_high_low() {
        let mut bad = candle(0);
        bad.high = 50.0;
        assert!(validate_ohlc(&[bad]).is_err());
    }

    #[test]
    fn bundle_computes_on_sufficient_history() {
        let candles: Vec<Ohlc> = (0..60).map(candle).collect();
        let bundle = calculate_bundle(&candles).unwrap();
        assert!(bundle.rsi.is_some());
        assert!(bundle.macd.is_some());
        assert!(bundle.atr.is_some());
    }

    #[test]
    fn bundle_rejects_bad_input() {
        let mut candles: Vec<Ohlc> = (0..60).map(candle).collect();
        candles[10].close = f64::NAN;
        assert!(calculate_bundle(&candles).is_err());
    }
}
