// =============================================================================
// Session classification (§4.8) — a pure function of a UTC hour
// =============================================================================

use chrono::{DateTime, Timelike, Utc};

use crate::types::Session;

/// Classify `timestamp` into its trading session by UTC hour.
pub fn session_for(timestamp: DateTime<Utc>) -> Session {
    Session::from_utc_hour(timestamp.hour())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn classifies_london_session() {
        let ts = Utc.with_ymd_and_hms(2026, 1, 1, 10, 0, 0).unwrap();
        assert_eq!(session_for(ts), Session::London);
    }

    #[test]
    fn classifies_after_hours() {
        let ts = Utc.with_ymd_and_hms(2026, 1, 1, 23, 0, 0).unwrap();
        assert_eq!(session_for(ts), Session::AfterHours);
    }
}
