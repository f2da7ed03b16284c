// =============================================================================
// Asset-class SL/TP configuration (§4.5)
// =============================================================================
//
// A small static table of ATR multipliers and guardrails per asset class.
// The dynamic risk manager mutates these weekly (§4.11); this module only
// supplies the classification and the starting defaults.

use crate::types::AssetClass;

#[derive(Debug, Clone, Copy)]
pub struct AssetClassConfig {
    pub atr_tp_multiplier: f64,
    pub atr_sl_multiplier: f64,
    pub trailing_multiplier: f64,
    pub max_tp_pct: f64,
    pub min_sl_pct: f64,
    pub fallback_atr_pct: f64,
}

/// Classify an instrument symbol into its asset class.
pub fn classify(instrument: &str) -> AssetClass {
    let s = instrument.to_uppercase();

    if s.starts_with("XAU") || s.starts_with("XAG") || s.contains("GOLD") || s.contains("SILVER") {
        return AssetClass::Metal;
    }
    if s.contains("BTC") || s.contains("ETH") || s.contains("CRYPTO") {
        return AssetClass::Crypto;
    }
    if ["US30", "US500", "NAS100", "GER40", "UK100", "JP225"]
        .iter()
        .any(|idx| s.starts_with(idx))
    {
        return AssetClass::Index;
    }

    const MAJORS: [&str; 7] = ["EURUSD", "GBPUSD", "USDJPY", "USDCHF", "AUDUSD", "USDCAD", "NZDUSD"];
    if MAJORS.contains(&s.as_str()) {
        return AssetClass::ForexMajor;
    }

    AssetClass::ForexMinor
}

/// Default configuration for each asset class, before any dynamic-risk
/// mutation has been applied.
pub fn default_config(class: AssetClass) -> AssetClassConfig {
    match class {
        AssetClass::ForexMajor => AssetClassConfig {
            atr_tp_multiplier: 2.0,
            atr_sl_multiplier: 1.2,
            trailing_multiplier: 1.0,
            max_tp_pct: 2.0,
            min_sl_pct: 0.1,
            fallback_atr_pct: 0.3,
        },
        AssetClass::ForexMinor => AssetClassConfig {
            atr_tp_multiplier: 2.2,
            atr_sl_multiplier: 1.4,
            trailing_multiplier: 1.1,
            max_tp_pct: 2.5,
            min_sl_pct: 0.15,
            fallback_atr_pct: 0.4,
        },
        AssetClass::Metal => AssetClassConfig {
            atr_tp_multiplier: 2.5,
            atr_sl_multiplier: 1.5,
            trailing_multiplier: 1.2,
            max_tp_pct: 3.0,
            min_sl_pct: 0.2,
            fallback_atr_pct: 0.5,
        },
        AssetClass::Index => AssetClassConfig {
            atr_tp_multiplier: 2.0,
            atr_sl_multiplier: 1.3,
            trailing_multiplier: 1.0,
            max_tp_pct: 2.5,
            min_sl_pct: 0.15,
            fallback_atr_pct: 0.4,
        },
        AssetClass::Crypto => AssetClassConfig {
            atr_tp_multiplier: 3.0,
            atr_sl_multiplier: 2.0,
            trailing_multiplier: 1.5,
            max_tp_pct: 5.0,
            min_sl_pct: 0.3,
            fallback_atr_pct: 1.0,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_metal() {
        assert_eq!(classify("XAUUSD"), AssetClass::Metal);
    }

    #[test]
    fn classifies_forex_major() {
        assert_eq!(classify("EURUSD"), AssetClass::ForexMajor);
    }

    #[test]
    fn classifies_forex_minor_by_default() {
        assert_eq!(classify("EURTRY"), AssetClass::ForexMinor);
    }

    #[test]
    fn crypto_has_widest_stops() {
        let crypto = default_config(AssetClass::Crypto);
        let major = default_config(AssetClass::ForexMajor);
        assert!(crypto.atr_sl_multiplier > major.atr_sl_multiplier);
    }
}
