// =============================================================================
// API module — EA ingestion surface + operator dashboard
// =============================================================================

pub mod auth;
pub mod dashboard;
pub mod error;
pub mod ingestion;

use std::sync::Arc;

use axum::Router;

use crate::app_state::AppState;

/// Merge the EA-facing ingestion router and the operator dashboard router
/// into a single app. Both are mounted under `/api/v1/` but authenticate
/// differently (per-account api key vs. admin bearer token, §3 / §2.14).
pub fn router(state: Arc<AppState>) -> Router {
    ingestion::router(state.clone()).merge(dashboard::router(state))
}
