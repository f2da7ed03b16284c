// =============================================================================
// Persistence store — relational schema over SQLite (sqlx)
// =============================================================================
//
// The engine owns a single connection pool. Schema is created idempotently at
// startup with `CREATE TABLE IF NOT EXISTS` rather than a migration runner:
// there is no migration history to preserve, only a single current shape.
//
// Global tables (ticks, ohlc_data, trading_signals, broker_symbols,
// indicator_scores) carry no account foreign key. Account-scoped tables
// (trades, commands, logs, shadow_trades, symbol_trading_configs) always key
// on `account_id` (the MT5 account number).
// =============================================================================

pub mod models;
pub mod repo;

use anyhow::{Context, Result};
use sqlx::sqlite::{SqlitePoolOptions, SqliteConnectOptions};
use sqlx::SqlitePool;
use std::str::FromStr;
use tracing::info;

#[derive(Clone)]
pub struct Db {
    pub pool: SqlitePool,
}

impl Db {
    /// Connect to `database_url` (e.g. `sqlite://aurora.db`), creating the file
    /// if it doesn't exist, and apply the schema.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let opts = SqliteConnectOptions::from_str(database_url)
            .with_context(|| format!("invalid DATABASE_URL '{database_url}'"))?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(16)
            .connect_with(opts)
            .await
            .context("failed to open sqlite pool")?;

        let db = Self { pool };
        db.apply_schema().await?;
        info!(database_url, "persistence store ready");
        Ok(db)
    }

    async fn apply_schema(&self) -> Result<()> {
        sqlx::query(SCHEMA)
            .execute(&self.pool)
            .await
            .context("failed to apply schema")?;
        Ok(())
    }
}

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS accounts (
    account_id          TEXT PRIMARY KEY,
    broker              TEXT NOT NULL,
    api_key             TEXT NOT NULL,
    balance             REAL NOT NULL DEFAULT 0,
    equity              REAL NOT NULL DEFAULT 0,
    margin              REAL NOT NULL DEFAULT 0,
    free_margin         REAL NOT NULL DEFAULT 0,
    last_heartbeat       TEXT,
    risk_profile        TEXT NOT NULL DEFAULT 'moderate',
    auto_trading_enabled INTEGER NOT NULL DEFAULT 0,
    breaker_tripped      INTEGER NOT NULL DEFAULT 0,
    breaker_reason       TEXT,
    breaker_tripped_at   TEXT,
    breaker_is_failure_type INTEGER NOT NULL DEFAULT 0,
    consecutive_command_failures INTEGER NOT NULL DEFAULT 0,
    daily_start_balance  REAL NOT NULL DEFAULT 0,
    daily_start_date     TEXT,
    peak_equity_today    REAL NOT NULL DEFAULT 0,
    initial_balance      REAL NOT NULL DEFAULT 0,
    buy_signal_advantage INTEGER NOT NULL DEFAULT 2,
    buy_confidence_penalty REAL NOT NULL DEFAULT 3.0,
    last_reconcile_tickets TEXT,
    created_at           TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS broker_symbols (
    instrument   TEXT PRIMARY KEY,
    digits       INTEGER NOT NULL,
    point        REAL NOT NULL,
    min_volume   REAL NOT NULL,
    max_volume   REAL NOT NULL,
    step_volume  REAL NOT NULL,
    contract_size REAL NOT NULL,
    tick_size    REAL NOT NULL,
    tick_value   REAL NOT NULL,
    stops_level  REAL NOT NULL DEFAULT 0,
    max_spread_pips REAL NOT NULL DEFAULT 3.0
);

CREATE TABLE IF NOT EXISTS subscribed_symbols (
    account_id   TEXT NOT NULL,
    instrument   TEXT NOT NULL,
    active       INTEGER NOT NULL DEFAULT 1,
    shadow_mode  INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (account_id, instrument)
);

CREATE TABLE IF NOT EXISTS ticks (
    instrument  TEXT NOT NULL,
    timestamp   TEXT NOT NULL,
    bid         REAL NOT NULL,
    ask         REAL NOT NULL,
    volume      REAL NOT NULL DEFAULT 0,
    tradeable   INTEGER NOT NULL DEFAULT 1,
    PRIMARY KEY (instrument, timestamp)
);
CREATE INDEX IF NOT EXISTS idx_ticks_instrument_ts ON ticks(instrument, timestamp DESC);

CREATE TABLE IF NOT EXISTS ohlc_data (
    instrument  TEXT NOT NULL,
    timeframe   TEXT NOT NULL,
    open_time   TEXT NOT NULL,
    open        REAL NOT NULL,
    high        REAL NOT NULL,
    low         REAL NOT NULL,
    close       REAL NOT NULL,
    volume      REAL NOT NULL DEFAULT 0,
    PRIMARY KEY (instrument, timeframe, open_time)
);

CREATE TABLE IF NOT EXISTS trading_signals (
    id               TEXT PRIMARY KEY,
    instrument       TEXT NOT NULL,
    timeframe        TEXT NOT NULL,
    direction        TEXT NOT NULL,
    confidence       REAL NOT NULL,
    entry            REAL NOT NULL,
    sl               REAL NOT NULL,
    tp               REAL NOT NULL,
    status           TEXT NOT NULL,
    is_valid         INTEGER NOT NULL DEFAULT 1,
    snapshot         TEXT NOT NULL,
    created_at       TEXT NOT NULL,
    expires_at       TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_signals_active
    ON trading_signals(instrument, timeframe, direction) WHERE status = 'active';

CREATE TABLE IF NOT EXISTS trades (
    account_id              TEXT NOT NULL,
    ticket                  TEXT NOT NULL,
    instrument              TEXT NOT NULL,
    direction               TEXT NOT NULL,
    volume                  REAL NOT NULL,
    open_price              REAL NOT NULL,
    open_time               TEXT NOT NULL,
    close_price             REAL,
    close_time              TEXT,
    sl                      REAL NOT NULL DEFAULT 0,
    tp                      REAL NOT NULL DEFAULT 0,
    initial_sl              REAL NOT NULL DEFAULT 0,
    initial_tp              REAL NOT NULL DEFAULT 0,
    profit                  REAL NOT NULL DEFAULT 0,
    commission              REAL NOT NULL DEFAULT 0,
    swap                    REAL NOT NULL DEFAULT 0,
    status                  TEXT NOT NULL,
    source                  TEXT NOT NULL,
    close_reason            TEXT,
    signal_id               TEXT,
    command_id              TEXT,
    session                 TEXT,
    trailing_stop_active    INTEGER NOT NULL DEFAULT 0,
    trailing_stop_moves     INTEGER NOT NULL DEFAULT 0,
    tp_extended_count       INTEGER NOT NULL DEFAULT 0,
    hold_duration_minutes   REAL,
    pips_captured           REAL,
    risk_reward_realized    REAL,
    mfe                     REAL NOT NULL DEFAULT 0,
    mae                     REAL NOT NULL DEFAULT 0,
    entry_volatility        REAL,
    entry_spread            REAL,
    entry_bid               REAL,
    entry_ask               REAL,
    last_trail_update       TEXT,
    last_reconcile_miss     INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (account_id, ticket)
);
CREATE INDEX IF NOT EXISTS idx_trades_open ON trades(account_id, status) WHERE status = 'open';

CREATE TABLE IF NOT EXISTS commands (
    id           TEXT PRIMARY KEY,
    account_id   TEXT NOT NULL,
    command_type TEXT NOT NULL,
    payload      TEXT NOT NULL,
    status       TEXT NOT NULL,
    created_at   TEXT NOT NULL,
    picked_at    TEXT,
    completed_at TEXT,
    timeout_at   TEXT NOT NULL,
    error_message TEXT,
    response     TEXT,
    ticket       TEXT,
    redelivery_count INTEGER NOT NULL DEFAULT 0
);
CREATE INDEX IF NOT EXISTS idx_commands_pending
    ON commands(account_id, status, created_at);

CREATE TABLE IF NOT EXISTS shadow_trades (
    id           TEXT PRIMARY KEY,
    account_id   TEXT NOT NULL,
    instrument   TEXT NOT NULL,
    direction    TEXT NOT NULL,
    signal_id    TEXT NOT NULL,
    entry_price  REAL NOT NULL,
    sl           REAL NOT NULL,
    tp           REAL NOT NULL,
    entry_time   TEXT NOT NULL,
    exit_price   REAL,
    exit_time    TEXT,
    hypothetical_profit REAL,
    closed       INTEGER NOT NULL DEFAULT 0
);
CREATE INDEX IF NOT EXISTS idx_shadow_exit ON shadow_trades(exit_time DESC) WHERE exit_time IS NOT NULL;

CREATE TABLE IF NOT EXISTS symbol_trading_configs (
    account_id              TEXT NOT NULL,
    instrument              TEXT NOT NULL,
    direction                TEXT NOT NULL,
    status                  TEXT NOT NULL DEFAULT 'active',
    min_confidence_threshold REAL NOT NULL DEFAULT 60.0,
    risk_multiplier          REAL NOT NULL DEFAULT 1.0,
    consecutive_wins         INTEGER NOT NULL DEFAULT 0,
    consecutive_losses       INTEGER NOT NULL DEFAULT 0,
    rolling_winrate          REAL NOT NULL DEFAULT 0,
    rolling_trades_count     INTEGER NOT NULL DEFAULT 0,
    pause_reason             TEXT,
    paused_at                TEXT,
    updated_by               TEXT,
    PRIMARY KEY (account_id, instrument, direction)
);

CREATE TABLE IF NOT EXISTS pattern_detections (
    id           INTEGER PRIMARY KEY AUTOINCREMENT,
    instrument   TEXT NOT NULL,
    timeframe    TEXT NOT NULL,
    name         TEXT NOT NULL,
    direction    TEXT NOT NULL,
    reliability  REAL NOT NULL,
    detected_at  TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_patterns_recent ON pattern_detections(instrument, timeframe, detected_at DESC);

CREATE TABLE IF NOT EXISTS indicator_scores (
    instrument   TEXT NOT NULL,
    timeframe    TEXT NOT NULL,
    indicator    TEXT NOT NULL,
    score        REAL NOT NULL DEFAULT 50.0,
    sample_count INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (instrument, timeframe, indicator)
);

CREATE TABLE IF NOT EXISTS logs (
    id         INTEGER PRIMARY KEY AUTOINCREMENT,
    level      TEXT NOT NULL,
    message    TEXT NOT NULL,
    details    TEXT,
    account_id TEXT,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS ai_decisions (
    id             INTEGER PRIMARY KEY AUTOINCREMENT,
    decision_type  TEXT NOT NULL,
    account_id     TEXT,
    instrument     TEXT,
    outcome        TEXT NOT NULL,
    reason         TEXT NOT NULL,
    context        TEXT,
    created_at     TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_decisions_created ON ai_decisions(created_at DESC);
"#;
