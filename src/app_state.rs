// =============================================================================
// Central Application State — Aurora trading engine
// =============================================================================
//
// The single source of truth handed to every API route and scheduler task.
// The persistence store (`Db`) is the actual source of truth for account,
// trade, and command state; `AppState` only wraps it together with the
// advisory caches and process-lifetime managers that have no natural home
// in a row (the dynamic risk manager's derived ceilings, the news calendar,
// the ML scorer hook).
// =============================================================================

use std::sync::Arc;

use crate::cache::Caches;
use crate::config::AuroraConfig;
use crate::db::Db;
use crate::dynamic_risk::DynamicRiskManager;
use crate::news::{NewsCalendar, NoNewsCalendar};
use crate::signals::MlScorer;

/// Shared application state, wrapped in `Arc` and cloned into every task.
pub struct AppState {
    pub db: Db,
    pub config: AuroraConfig,
    pub caches: Caches,
    pub dynamic_risk: DynamicRiskManager,
    pub news_calendar: Arc<dyn NewsCalendar>,
    pub ml_scorer: Option<Arc<dyn MlScorer>>,
}

impl AppState {
    pub fn new(db: Db, config: AuroraConfig) -> Self {
        Self {
            db,
            config,
            caches: Caches::new(),
            dynamic_risk: DynamicRiskManager::new(),
            news_calendar: Arc::new(NoNewsCalendar),
            ml_scorer: None,
        }
    }

    /// Swap in a real ML scorer (e.g. a hosted inference client). Without
    /// one, signal confidence is the rules-based score alone (§4.5).
    pub fn with_ml_scorer(mut self, scorer: Arc<dyn MlScorer>) -> Self {
        self.ml_scorer = Some(scorer);
        self
    }

    /// Swap in a real news calendar feed. Without one, the news filter never
    /// blocks a signal.
    pub fn with_news_calendar(mut self, calendar: Arc<dyn NewsCalendar>) -> Self {
        self.news_calendar = calendar;
        self
    }
}
