// =============================================================================
// ML scoring contract (§6) — optional collaborator
// =============================================================================
//
// The signal generator may call into a machine-learned scorer before
// persisting a signal. Absence or failure of the scorer falls back
// transparently to rules-based confidence; this module only owns the
// contract and the A/B group assignment, never the model itself.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use serde_json::Value;

/// A/B test group a (instrument, direction) pair is assigned to. Assignment
/// is a stable hash so the same pair always lands in the same group across
/// restarts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbGroup {
    MlOnly,
    RulesOnly,
    Hybrid,
}

/// Assign an A/B group with 80/10/10 weights (ml_only/rules_only/hybrid is
/// the reference split: hybrid gets the lion's share of traffic, the other
/// two are held-out control arms).
pub fn assign_ab_group(instrument: &str, direction: &str) -> AbGroup {
    let mut hasher = DefaultHasher::new();
    instrument.hash(&mut hasher);
    direction.hash(&mut hasher);
    let bucket = hasher.finish() % 100;

    match bucket {
        0..=79 => AbGroup::Hybrid,
        80..=89 => AbGroup::MlOnly,
        _ => AbGroup::RulesOnly,
    }
}

impl AbGroup {
    pub fn as_str(self) -> &'static str {
        match self {
            AbGroup::MlOnly => "ml_only",
            AbGroup::RulesOnly => "rules_only",
            AbGroup::Hybrid => "hybrid",
        }
    }

    /// Blend the ML and rules-based confidence per this group's policy.
    pub fn blend(self, ml_confidence: f64, rules_confidence: f64) -> f64 {
        match self {
            AbGroup::MlOnly => ml_confidence,
            AbGroup::RulesOnly => rules_confidence,
            AbGroup::Hybrid => 0.6 * ml_confidence + 0.4 * rules_confidence,
        }
    }
}

/// Narrow contract for an ML confidence collaborator.
pub trait MlScorer: Send + Sync {
    /// `features` is the feature assembly (indicator snapshot + regime +
    /// session + rolling win rates); returns confidence in [0,1] and the
    /// model version string, or `None` on failure.
    fn score(&self, features: &Value) -> Option<(f64, String)>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ab_group_is_stable_across_calls() {
        let a = assign_ab_group("EURUSD", "BUY");
        let b = assign_ab_group("EURUSD", "BUY");
        assert_eq!(a, b);
    }

    #[test]
    fn hybrid_blend_weights_ml_more_heavily() {
        let blended = AbGroup::Hybrid.blend(1.0, 0.0);
        assert!((blended - 0.6).abs() < 1e-9);
    }

    #[test]
    fn ml_only_ignores_rules_confidence() {
        assert_eq!(AbGroup::MlOnly.blend(0.8, 0.1), 0.8);
    }
}
