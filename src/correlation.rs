// =============================================================================
// Correlation groups — static instrument -> group table (§4.6 step 6)
// =============================================================================
//
// Used by the auto-trader's correlation gate to cap the number of
// simultaneously open positions that share exposure to the same underlying
// currency or asset.

/// A correlation group. Two instruments in the same group move together
/// closely enough that holding both is treated as a single risk unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CorrelationGroup {
    Eur,
    Gbp,
    Jpy,
    Chf,
    Aud,
    Nzd,
    Cad,
    Gold,
    Silver,
    Oil,
    Index,
    Crypto,
    Other,
}

/// Resolve the correlation group for an instrument symbol (e.g. `EURUSD`,
/// `XAUUSD`, `US30`, `BTCUSD`). Matches on currency-code substrings since the
/// broker's symbol naming is consistent but not exhaustively enumerable.
pub fn correlation_group(instrument: &str) -> CorrelationGroup {
    let s = instrument.to_uppercase();

    if s.starts_with("XAU") || s.contains("GOLD") {
        return CorrelationGroup::Gold;
    }
    if s.starts_with("XAG") || s.contains("SILVER") {
        return CorrelationGroup::Silver;
    }
    if s.contains("OIL") || s.contains("WTI") || s.contains("BRENT") {
        return CorrelationGroup::Oil;
    }
    if s.contains("BTC") || s.contains("ETH") || s.contains("CRYPTO") {
        return CorrelationGroup::Crypto;
    }
    if ["US30", "US500", "NAS100", "GER40", "UK100", "JP225"]
        .iter()
        .any(|idx| s.starts_with(idx))
    {
        return CorrelationGroup::Index;
    }

    // Forex pairs: prefer the base currency, falling back to quote.
    for (code, group) in [
        ("EUR", CorrelationGroup::Eur),
        ("GBP", CorrelationGroup::Gbp),
        ("JPY", CorrelationGroup::Jpy),
        ("CHF", CorrelationGroup::Chf),
        ("AUD", CorrelationGroup::Aud),
        ("NZD", CorrelationGroup::Nzd),
        ("CAD", CorrelationGroup::Cad),
    ] {
        if s.starts_with(code) {
            return group;
        }
    }
    for (code, group) in [
        ("EUR", CorrelationGroup::Eur),
        ("GBP", CorrelationGroup::Gbp),
        ("JPY", CorrelationGroup::Jpy),
        ("CHF", CorrelationGroup::Chf),
        ("AUD", CorrelationGroup::Aud),
        ("NZD", CorrelationGroup::Nzd),
        ("CAD", CorrelationGroup::Cad),
    ] {
        if s.contains(code) {
            return group;
        }
    }

    CorrelationGroup::Other
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gold_symbol_groups_as_gold() {
        assert_eq!(correlation_group("XAUUSD"), CorrelationGroup::Gold);
    }

    #[test]
    fn eurusd_groups_as_eur() {
        assert_eq!(correlation_group("EURUSD"), CorrelationGroup::Eur);
    }

    #[test]
    fn usdjpy_groups_as_jpy_by_quote_currency() {
        assert_eq!(correlation_group("USDJPY"), CorrelationGroup::Jpy);
    }

    #[test]
    fn unknown_symbol_falls_back_to_other() {
        assert_eq!(correlation_group("ZZZXYZ"), CorrelationGroup::Other);
    }
}
