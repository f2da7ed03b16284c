// =============================================================================
// News calendar contract (§4.5, SPEC_FULL §B)
// =============================================================================
//
// The real news feed is out of scope; this narrow trait is the contract
// point where one plugs in. `NoNewsCalendar` is the in-memory stub used when
// no feed is configured — it always reports clear.

use chrono::{DateTime, Utc};

/// Severity of an upcoming news event for an instrument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NewsImpact {
    Low,
    Medium,
    High,
}

/// One calendar entry affecting an instrument, named so a block can be
/// traced back to the event that caused it (§4.5 News filter reason code
/// `news_filter:<event>`).
#[derive(Debug, Clone)]
pub struct NewsEvent {
    pub name: String,
    pub impact: NewsImpact,
}

pub trait NewsCalendar: Send + Sync {
    /// Highest-impact event affecting `instrument` within the window ending
    /// at `at`, if any. A `High` impact event within the pause window should
    /// block new trade entries (§4.5).
    fn upcoming_event(&self, instrument: &str, at: DateTime<Utc>) -> Option<NewsEvent>;
}

/// Default collaborator: no calendar configured, always clear to trade.
pub struct NoNewsCalendar;

impl NewsCalendar for NoNewsCalendar {
    fn upcoming_event(&self, _instrument: &str, _at: DateTime<Utc>) -> Option<NewsEvent> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_news_calendar_is_always_clear() {
        let cal = NoNewsCalendar;
        assert!(cal.upcoming_event("EURUSD", Utc::now()).is_none());
    }
}
