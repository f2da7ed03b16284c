// =============================================================================
// Aurora Core — Main Entry Point
// =============================================================================
//
// Boots the persistence store, wires shared state, spawns the cadence-driven
// background workers (§5), and serves the ingestion + dashboard API. Every
// worker runs in its own task with its own interval; a worker's failure is
// logged and the loop continues rather than bringing the process down.
// =============================================================================

// ── Module declarations ──────────────────────────────────────────────────────
mod api;
mod app_state;
mod asset_class;
mod auto_optimizer;
mod auto_trader;
mod cache;
mod command_queue;
mod config;
mod correlation;
mod db;
mod drawdown;
mod dynamic_risk;
mod indicators;
mod news;
mod patterns;
mod regime;
mod scheduler;
mod session;
mod shadow;
mod signals;
mod trade_monitor;
mod types;

use std::sync::Arc;

use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::app_state::AppState;
use crate::config::AuroraConfig;
use crate::db::Db;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("╔══════════════════════════════════════════════════════════╗");
    info!("║                 Aurora Core — Starting Up                 ║");
    info!("╚══════════════════════════════════════════════════════════╝");

    let config = AuroraConfig::from_env();

    let db = Db::connect(&config.database_url).await?;
    let bind_addr = config.bind_addr.clone();

    let state = Arc::new(AppState::new(db, config));

    let workers = scheduler::spawn_all(state.clone());
    info!(count = workers.len(), "background workers spawned");

    let api_state = state.clone();
    let server = tokio::spawn(async move {
        let app = api::router(api_state);
        let listener = match tokio::net::TcpListener::bind(&bind_addr).await {
            Ok(listener) => listener,
            Err(e) => {
                error!(error = %e, addr = %bind_addr, "failed to bind API server");
                return;
            }
        };
        info!(addr = %bind_addr, "API server listening");
        if let Err(e) = axum::serve(listener, app).await {
            error!(error = %e, "API server exited");
        }
    });

    info!("All subsystems running. Press Ctrl+C to stop.");
    tokio::signal::ctrl_c().await?;
    warn!("Shutdown signal received — stopping gracefully");

    server.abort();
    for worker in workers {
        worker.abort();
    }

    info!("Aurora Core shut down complete.");
    Ok(())
}
