// =============================================================================
// Classic pivot points (computed from the prior period's H/L/C)
// =============================================================================

use crate::db::models::Ohlc;

#[derive(Debug, Clone)]
pub struct PivotLevels {
    pub pivot: f64,
    pub r1: f64,
    pub r2: f64,
    pub s1: f64,
    pub s2: f64,
}

/// Compute pivot levels from the last *closed* prior-period candle.
pub fn calculate_pivot(prior: &Ohlc) -> PivotLevels {
    let pivot = (prior.high + prior.low + prior.close) / 3.0;
    let r1 = 2.0 * pivot - prior.low;
    let s1 = 2.0 * pivot - prior.high;
    let r2 = pivot + (prior.high - prior.low);
    let s2 = pivot - (prior.high - prior.low);
    PivotLevels { pivot, r1, r2, s1, s2 }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pivot_midpoint() {
        let prior = Ohlc {
            instrument: "TEST".into(),
            timeframe: "D1".into(),
            open_time: chrono::Utc::now(),
            open: 100.0,
            high: 110.0,
            low: 90.0,
            close: 105.0,
            volume: 1.0,
        };
        let levels = calculate_pivot(&prior);
        assert!((levels.pivot - 101.666_666_666_666_66).abs() < 1e-6);
        assert!(levels.r1 > levels.pivot);
        assert!(levels.s1 < levels.pivot);
    }
}
