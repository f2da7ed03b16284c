// =============================================================================
// Repository functions — one per access pattern, grouped by entity.
// =============================================================================
//
// These are deliberately thin: callers hold `&Db` and invoke the function that
// matches their access pattern, mirroring the reference implementation's
// style of small, single-purpose methods on each manager (`PositionManager`,
// `RiskEngine`) rather than a generic DAO.
// =============================================================================

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::Row;

use super::models::*;
use super::Db;
use crate::types::{CommandStatus, Direction, SignalStatus, SymbolConfigStatus, TradeStatus};

// ---------------------------------------------------------------------------
// Accounts
// ---------------------------------------------------------------------------

/// Fetch the account's api key if it already exists (idempotent connect/reconnect,
/// §8 round-trip property: same account_number always returns the same api_key).
pub async fn get_account(db: &Db, account_id: &str) -> Result<Option<Account>> {
    sqlx::query_as::<_, Account>("SELECT * FROM accounts WHERE account_id = ?")
        .bind(account_id)
        .fetch_optional(&db.pool)
        .await
        .context("get_account")
}

/// Create the account on first connect with a freshly issued api key.
pub async fn create_account(
    db: &Db,
    account_id: &str,
    broker: &str,
    api_key: &str,
) -> Result<Account> {
    let now = Utc::now();
    sqlx::query(
        "INSERT INTO accounts (account_id, broker, api_key, auto_trading_enabled, created_at)
         VALUES (?, ?, ?, 0, ?)",
    )
    .bind(account_id)
    .bind(broker)
    .bind(api_key)
    .bind(now)
    .execute(&db.pool)
    .await
    .context("create_account")?;

    get_account(db, account_id)
        .await?
        .context("account vanished immediately after insert")
}

pub async fn touch_heartbeat(
    db: &Db,
    account_id: &str,
    balance: f64,
    equity: f64,
    margin: f64,
    free_margin: f64,
) -> Result<()> {
    sqlx::query(
        "UPDATE accounts SET balance = ?, equity = ?, margin = ?, free_margin = ?,
         last_heartbeat = ?,
         initial_balance = CASE WHEN initial_balance = 0 THEN ? ELSE initial_balance END
         WHERE account_id = ?",
    )
    .bind(balance)
    .bind(equity)
    .bind(margin)
    .bind(free_margin)
    .bind(Utc::now())
    .bind(balance)
    .bind(account_id)
    .execute(&db.pool)
    .await
    .context("touch_heartbeat")?;
    Ok(())
}

pub async fn trip_breaker(db: &Db, account_id: &str, reason: &str, is_failure_type: bool) -> Result<()> {
    sqlx::query(
        "UPDATE accounts SET breaker_tripped = 1, breaker_reason = ?, breaker_tripped_at = ?,
         breaker_is_failure_type = ?, auto_trading_enabled = 0 WHERE account_id = ?",
    )
    .bind(reason)
    .bind(Utc::now())
    .bind(is_failure_type)
    .bind(account_id)
    .execute(&db.pool)
    .await
    .context("trip_breaker")?;
    Ok(())
}

pub async fn reset_breaker(db: &Db, account_id: &str) -> Result<()> {
    sqlx::query(
        "UPDATE accounts SET breaker_tripped = 0, breaker_reason = NULL, breaker_tripped_at = NULL,
         breaker_is_failure_type = 0, consecutive_command_failures = 0 WHERE account_id = ?",
    )
    .bind(account_id)
    .execute(&db.pool)
    .await
    .context("reset_breaker")?;
    Ok(())
}

/// Bump the consecutive-command-failure counter and return its new value.
pub async fn increment_command_failures(db: &Db, account_id: &str) -> Result<i64> {
    sqlx::query(
        "UPDATE accounts SET consecutive_command_failures = consecutive_command_failures + 1
         WHERE account_id = ?",
    )
    .bind(account_id)
    .execute(&db.pool)
    .await
    .context("increment_command_failures")?;

    let row = sqlx::query("SELECT consecutive_command_failures AS c FROM accounts WHERE account_id = ?")
        .bind(account_id)
        .fetch_one(&db.pool)
        .await
        .context("read consecutive_command_failures")?;
    Ok(row.try_get::<i64, _>("c")?)
}

pub async fn reset_command_failures(db: &Db, account_id: &str) -> Result<()> {
    sqlx::query("UPDATE accounts SET consecutive_command_failures = 0 WHERE account_id = ?")
        .bind(account_id)
        .execute(&db.pool)
        .await
        .context("reset_command_failures")?;
    Ok(())
}

/// Roll the daily P&L baseline forward when the calendar date changes,
/// seeding it from current balance (§4.9, §4.6 circuit breaker daily-loss check).
pub async fn maybe_roll_daily_baseline(db: &Db, account: &Account) -> Result<()> {
    let today = Utc::now().format("%Y-%m-%d").to_string();
    if account.daily_start_date.as_deref() == Some(today.as_str()) {
        return Ok(());
    }
    sqlx::query(
        "UPDATE accounts SET daily_start_balance = balance, daily_start_date = ?,
         peak_equity_today = equity WHERE account_id = ?",
    )
    .bind(&today)
    .bind(&account.account_id)
    .execute(&db.pool)
    .await
    .context("maybe_roll_daily_baseline")?;
    Ok(())
}

pub async fn update_peak_equity(db: &Db, account_id: &str, equity: f64) -> Result<()> {
    sqlx::query(
        "UPDATE accounts SET peak_equity_today = MAX(peak_equity_today, ?) WHERE account_id = ?",
    )
    .bind(equity)
    .bind(account_id)
    .execute(&db.pool)
    .await
    .context("update_peak_equity")?;
    Ok(())
}

pub async fn set_auto_trading(db: &Db, account_id: &str, enabled: bool) -> Result<()> {
    sqlx::query("UPDATE accounts SET auto_trading_enabled = ? WHERE account_id = ?")
        .bind(enabled)
        .bind(account_id)
        .execute(&db.pool)
        .await
        .context("set_auto_trading")?;
    Ok(())
}

/// Operator override of the per-account signal-generation knobs (§4.5
/// Aggregation: "both values are configurable per account").
pub async fn set_signal_advantage_config(
    db: &Db,
    account_id: &str,
    buy_signal_advantage: i64,
    buy_confidence_penalty: f64,
) -> Result<()> {
    sqlx::query("UPDATE accounts SET buy_signal_advantage = ?, buy_confidence_penalty = ? WHERE account_id = ?")
        .bind(buy_signal_advantage)
        .bind(buy_confidence_penalty)
        .bind(account_id)
        .execute(&db.pool)
        .await
        .context("set_signal_advantage_config")?;
    Ok(())
}

/// Record the EA's latest reconciliation report (heartbeat `open_tickets`),
/// feeding the §4.8 stale-reconciliation check on the next trade-monitor pass.
pub async fn record_reconciliation(db: &Db, account_id: &str, tickets: &[String]) -> Result<()> {
    let encoded = serde_json::to_string(tickets).context("encode reconciled tickets")?;
    sqlx::query("UPDATE accounts SET last_reconcile_tickets = ? WHERE account_id = ?")
        .bind(encoded)
        .bind(account_id)
        .execute(&db.pool)
        .await
        .context("record_reconciliation")?;
    Ok(())
}

pub async fn all_accounts(db: &Db) -> Result<Vec<Account>> {
    sqlx::query_as::<_, Account>("SELECT * FROM accounts")
        .fetch_all(&db.pool)
        .await
        .context("all_accounts")
}

pub async fn accounts_disconnected_since(db: &Db, cutoff: DateTime<Utc>) -> Result<Vec<Account>> {
    sqlx::query_as::<_, Account>(
        "SELECT * FROM accounts WHERE last_heartbeat IS NOT NULL AND last_heartbeat < ?",
    )
    .bind(cutoff)
    .fetch_all(&db.pool)
    .await
    .context("accounts_disconnected_since")
}

// ---------------------------------------------------------------------------
// Broker symbols
// ---------------------------------------------------------------------------

pub async fn get_broker_symbol(db: &Db, instrument: &str) -> Result<Option<BrokerSymbol>> {
    sqlx::query_as::<_, BrokerSymbol>("SELECT * FROM broker_symbols WHERE instrument = ?")
        .bind(instrument)
        .fetch_optional(&db.pool)
        .await
        .context("get_broker_symbol")
}

pub async fn upsert_broker_symbol(db: &Db, symbol: &BrokerSymbol) -> Result<()> {
    sqlx::query(
        "INSERT INTO broker_symbols
         (instrument, digits, point, min_volume, max_volume, step_volume,
          contract_size, tick_size, tick_value, stops_level, max_spread_pips)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT(instrument) DO UPDATE SET
            digits = excluded.digits, point = excluded.point,
            min_volume = excluded.min_volume, max_volume = excluded.max_volume,
            step_volume = excluded.step_volume, contract_size = excluded.contract_size,
            tick_size = excluded.tick_size, tick_value = excluded.tick_value,
            stops_level = excluded.stops_level, max_spread_pips = excluded.max_spread_pips",
    )
    .bind(&symbol.instrument)
    .bind(symbol.digits)
    .bind(symbol.point)
    .bind(symbol.min_volume)
    .bind(symbol.max_volume)
    .bind(symbol.step_volume)
    .bind(symbol.contract_size)
    .bind(symbol.tick_size)
    .bind(symbol.tick_value)
    .bind(symbol.stops_level)
    .bind(symbol.max_spread_pips)
    .execute(&db.pool)
    .await
    .context("upsert_broker_symbol")?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Subscribed symbols
// ---------------------------------------------------------------------------

pub async fn subscribed_symbols(db: &Db, account_id: &str) -> Result<Vec<SubscribedSymbol>> {
    sqlx::query_as::<_, SubscribedSymbol>(
        "SELECT * FROM subscribed_symbols WHERE account_id = ? AND active = 1",
    )
    .bind(account_id)
    .fetch_all(&db.pool)
    .await
    .context("subscribed_symbols")
}

pub async fn upsert_subscribed_symbol(db: &Db, sub: &SubscribedSymbol) -> Result<()> {
    sqlx::query(
        "INSERT INTO subscribed_symbols (account_id, instrument, active, shadow_mode)
         VALUES (?, ?, ?, ?)
         ON CONFLICT(account_id, instrument) DO UPDATE SET
            active = excluded.active, shadow_mode = excluded.shadow_mode",
    )
    .bind(&sub.account_id)
    .bind(&sub.instrument)
    .bind(sub.active)
    .bind(sub.shadow_mode)
    .execute(&db.pool)
    .await
    .context("upsert_subscribed_symbol")?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Ticks
// ---------------------------------------------------------------------------

/// Most recent tick for an instrument, used by gates that need current spread.
pub async fn latest_tick(db: &Db, instrument: &str) -> Result<Option<Tick>> {
    sqlx::query_as::<_, Tick>(
        "SELECT * FROM ticks WHERE instrument = ? ORDER BY timestamp DESC LIMIT 1",
    )
    .bind(instrument)
    .fetch_optional(&db.pool)
    .await
    .context("latest_tick")
}

/// Insert a tick, silently dropping on (instrument, timestamp) conflict —
/// duplicate-suppression invariant (§8 invariant 7, scenario S6).
/// Returns `true` if a new row was actually written.
pub async fn insert_tick_if_new(db: &Db, tick: &Tick) -> Result<bool> {
    let result = sqlx::query(
        "INSERT INTO ticks (instrument, timestamp, bid, ask, volume, tradeable)
         VALUES (?, ?, ?, ?, ?, ?)
         ON CONFLICT(instrument, timestamp) DO NOTHING",
    )
    .bind(&tick.instrument)
    .bind(tick.timestamp)
    .bind(tick.bid)
    .bind(tick.ask)
    .bind(tick.volume)
    .bind(tick.tradeable)
    .execute(&db.pool)
    .await
    .context("insert_tick_if_new")?;
    Ok(result.rows_affected() > 0)
}

pub async fn delete_ticks_older_than(db: &Db, cutoff: DateTime<Utc>) -> Result<u64> {
    let result = sqlx::query("DELETE FROM ticks WHERE timestamp < ?")
        .bind(cutoff)
        .execute(&db.pool)
        .await
        .context("delete_ticks_older_than")?;
    Ok(result.rows_affected())
}

/// Average spread (ask - bid) over the most recent `sample` ticks, used by
/// the spread gate's 3x-rolling-average check (§4.6 step 8). `None` when no
/// ticks exist yet for the instrument.
pub async fn rolling_avg_spread(db: &Db, instrument: &str, sample: i64) -> Result<Option<f64>> {
    let row: (Option<f64>,) = sqlx::query_as(
        "SELECT AVG(ask - bid) FROM (
            SELECT ask, bid FROM ticks WHERE instrument = ? ORDER BY timestamp DESC LIMIT ?
         ) AS recent",
    )
    .bind(instrument)
    .bind(sample)
    .fetch_one(&db.pool)
    .await
    .context("rolling_avg_spread")?;
    Ok(row.0)
}

// ---------------------------------------------------------------------------
// OHLC
// ---------------------------------------------------------------------------

pub async fn upsert_ohlc(db: &Db, candle: &Ohlc) -> Result<()> {
    sqlx::query(
        "INSERT INTO ohlc_data (instrument, timeframe, open_time, open, high, low, close, volume)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT(instrument, timeframe, open_time) DO UPDATE SET
            open = excluded.open, high = excluded.high, low = excluded.low,
            close = excluded.close, volume = excluded.volume",
    )
    .bind(&candle.instrument)
    .bind(&candle.timeframe)
    .bind(candle.open_time)
    .bind(candle.open)
    .bind(candle.high)
    .bind(candle.low)
    .bind(candle.close)
    .bind(candle.volume)
    .execute(&db.pool)
    .await
    .context("upsert_ohlc")?;
    Ok(())
}

/// Delete candles for one timeframe older than `cutoff` (§3 per-timeframe
/// OHLC retention: shorter timeframes are pruned more aggressively since
/// they accumulate the most rows).
pub async fn delete_ohlc_older_than(db: &Db, timeframe: &str, cutoff: DateTime<Utc>) -> Result<u64> {
    let result = sqlx::query("DELETE FROM ohlc_data WHERE timeframe = ? AND open_time < ?")
        .bind(timeframe)
        .bind(cutoff)
        .execute(&db.pool)
        .await
        .context("delete_ohlc_older_than")?;
    Ok(result.rows_affected())
}

/// Most recent `limit` closed candles, oldest-first, for (instrument, timeframe).
pub async fn recent_ohlc(
    db: &Db,
    instrument: &str,
    timeframe: &str,
    limit: i64,
) -> Result<Vec<Ohlc>> {
    let mut rows = sqlx::query_as::<_, Ohlc>(
        "SELECT * FROM ohlc_data WHERE instrument = ? AND timeframe = ?
         ORDER BY open_time DESC LIMIT ?",
    )
    .bind(instrument)
    .bind(timeframe)
    .bind(limit)
    .fetch_all(&db.pool)
    .await
    .context("recent_ohlc")?;
    rows.reverse();
    Ok(rows)
}

// ---------------------------------------------------------------------------
// Trading signals
// ---------------------------------------------------------------------------

/// Atomic upsert: mark any existing active signal for this
/// (instrument, timeframe, direction) as superseded, then insert the new one.
/// Enforces invariant 1 (at most one active signal per key).
pub async fn upsert_signal(db: &Db, signal: &TradingSignal) -> Result<()> {
    let mut tx = db.pool.begin().await.context("begin upsert_signal")?;

    sqlx::query(
        "UPDATE trading_signals SET status = 'superseded'
         WHERE instrument = ? AND timeframe = ? AND direction = ? AND status = 'active'",
    )
    .bind(&signal.instrument)
    .bind(&signal.timeframe)
    .bind(signal.direction)
    .execute(&mut *tx)
    .await
    .context("supersede prior active signal")?;

    sqlx::query(
        "INSERT INTO trading_signals
         (id, instrument, timeframe, direction, confidence, entry, sl, tp, status,
          is_valid, snapshot, created_at, expires_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&signal.id)
    .bind(&signal.instrument)
    .bind(&signal.timeframe)
    .bind(signal.direction)
    .bind(signal.confidence)
    .bind(signal.entry)
    .bind(signal.sl)
    .bind(signal.tp)
    .bind(signal.status)
    .bind(signal.is_valid)
    .bind(&signal.snapshot)
    .bind(signal.created_at)
    .bind(signal.expires_at)
    .execute(&mut *tx)
    .await
    .context("insert new signal")?;

    tx.commit().await.context("commit upsert_signal")?;
    Ok(())
}

pub async fn active_signals(db: &Db) -> Result<Vec<TradingSignal>> {
    sqlx::query_as::<_, TradingSignal>(
        "SELECT * FROM trading_signals WHERE status = 'active' ORDER BY created_at ASC",
    )
    .fetch_all(&db.pool)
    .await
    .context("active_signals")
}

/// Expire every active signal for an instrument, e.g. when a high-impact
/// news event blocks new entries (§4.5 News filter). `reason` is not
/// persisted on the signal row itself (no column for it); the caller logs it
/// to the decision log instead.
pub async fn expire_active_signals(db: &Db, instrument: &str, reason: &str) -> Result<u64> {
    let result = sqlx::query("UPDATE trading_signals SET status = 'expired' WHERE instrument = ? AND status = 'active'")
        .bind(instrument)
        .execute(&db.pool)
        .await
        .with_context(|| format!("expire_active_signals ({reason})"))?;
    Ok(result.rows_affected())
}

pub async fn mark_signal_status(db: &Db, id: &str, status: SignalStatus) -> Result<()> {
    sqlx::query("UPDATE trading_signals SET status = ? WHERE id = ?")
        .bind(status)
        .bind(id)
        .execute(&db.pool)
        .await
        .context("mark_signal_status")?;
    Ok(())
}

/// Two-tier retention (§4.5, SPEC_FULL open question 1): expire stale actives,
/// then delete long-expired rows. Returns (expired_count, deleted_count).
pub async fn sweep_signal_retention(
    db: &Db,
    active_ttl_secs: i64,
    expired_ttl_secs: i64,
) -> Result<(u64, u64)> {
    let now = Utc::now();
    let active_cutoff = now - chrono::Duration::seconds(active_ttl_secs);
    let expired_cutoff = now - chrono::Duration::seconds(expired_ttl_secs);

    let expired = sqlx::query(
        "UPDATE trading_signals SET status = 'expired'
         WHERE status = 'active' AND created_at < ?",
    )
    .bind(active_cutoff)
    .execute(&db.pool)
    .await
    .context("expire stale active signals")?;

    let deleted = sqlx::query(
        "DELETE FROM trading_signals WHERE status = 'expired' AND created_at < ?",
    )
    .bind(expired_cutoff)
    .execute(&db.pool)
    .await
    .context("delete long-expired signals")?;

    Ok((expired.rows_affected(), deleted.rows_affected()))
}

// ---------------------------------------------------------------------------
// Trades
// ---------------------------------------------------------------------------

pub async fn get_trade(db: &Db, account_id: &str, ticket: &str) -> Result<Option<Trade>> {
    sqlx::query_as::<_, Trade>("SELECT * FROM trades WHERE account_id = ? AND ticket = ?")
        .bind(account_id)
        .bind(ticket)
        .fetch_optional(&db.pool)
        .await
        .context("get_trade")
}

pub async fn open_trades(db: &Db, account_id: Option<&str>) -> Result<Vec<Trade>> {
    match account_id {
        Some(id) => sqlx::query_as::<_, Trade>(
            "SELECT * FROM trades WHERE account_id = ? AND status = 'open'",
        )
        .bind(id)
        .fetch_all(&db.pool)
        .await
        .context("open_trades(account)"),
        None => sqlx::query_as::<_, Trade>("SELECT * FROM trades WHERE status = 'open'")
            .fetch_all(&db.pool)
            .await
            .context("open_trades(all)"),
    }
}

pub async fn insert_trade(db: &Db, trade: &Trade) -> Result<()> {
    sqlx::query(
        "INSERT INTO trades
         (account_id, ticket, instrument, direction, volume, open_price, open_time,
          sl, tp, initial_sl, initial_tp, profit, commission, swap, status, source,
          signal_id, command_id, session, mfe, mae, entry_volatility, entry_spread,
          entry_bid, entry_ask)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&trade.account_id)
    .bind(&trade.ticket)
    .bind(&trade.instrument)
    .bind(trade.direction)
    .bind(trade.volume)
    .bind(trade.open_price)
    .bind(trade.open_time)
    .bind(trade.sl)
    .bind(trade.tp)
    .bind(trade.initial_sl)
    .bind(trade.initial_tp)
    .bind(trade.profit)
    .bind(trade.commission)
    .bind(trade.swap)
    .bind(trade.status)
    .bind(trade.source)
    .bind(&trade.signal_id)
    .bind(&trade.command_id)
    .bind(&trade.session)
    .bind(trade.mfe)
    .bind(trade.mae)
    .bind(trade.entry_volatility)
    .bind(trade.entry_spread)
    .bind(trade.entry_bid)
    .bind(trade.entry_ask)
    .execute(&db.pool)
    .await
    .context("insert_trade")?;
    Ok(())
}

pub async fn update_trade_sl_tp(
    db: &Db,
    account_id: &str,
    ticket: &str,
    sl: f64,
    tp: f64,
) -> Result<()> {
    sqlx::query(
        "UPDATE trades SET sl = ?, tp = ?, trailing_stop_active = 1,
         trailing_stop_moves = trailing_stop_moves + 1, last_trail_update = ?
         WHERE account_id = ? AND ticket = ?",
    )
    .bind(sl)
    .bind(tp)
    .bind(Utc::now())
    .bind(account_id)
    .bind(ticket)
    .execute(&db.pool)
    .await
    .context("update_trade_sl_tp")?;
    Ok(())
}

pub async fn update_trade_mfe_mae(
    db: &Db,
    account_id: &str,
    ticket: &str,
    mfe: f64,
    mae: f64,
) -> Result<()> {
    sqlx::query("UPDATE trades SET mfe = ?, mae = ? WHERE account_id = ? AND ticket = ?")
        .bind(mfe)
        .bind(mae)
        .bind(account_id)
        .bind(ticket)
        .execute(&db.pool)
        .await
        .context("update_trade_mfe_mae")?;
    Ok(())
}

/// Flip `last_reconcile_miss` (§4.8 stale reconciliation — two consecutive
/// misses close the trade; a hit after a miss clears the flag).
pub async fn set_reconcile_miss(db: &Db, account_id: &str, ticket: &str, miss: bool) -> Result<()> {
    sqlx::query("UPDATE trades SET last_reconcile_miss = ? WHERE account_id = ? AND ticket = ?")
        .bind(miss)
        .bind(account_id)
        .bind(ticket)
        .execute(&db.pool)
        .await
        .context("set_reconcile_miss")?;
    Ok(())
}

pub async fn update_trade_session(
    db: &Db,
    account_id: &str,
    ticket: &str,
    session: &str,
) -> Result<()> {
    sqlx::query("UPDATE trades SET session = ? WHERE account_id = ? AND ticket = ?")
        .bind(session)
        .bind(account_id)
        .bind(ticket)
        .execute(&db.pool)
        .await
        .context("update_trade_session")?;
    Ok(())
}

pub async fn reduce_trade_volume(
    db: &Db,
    account_id: &str,
    ticket: &str,
    new_volume: f64,
) -> Result<()> {
    sqlx::query(
        "UPDATE trades SET volume = ?, tp_extended_count = tp_extended_count + 1
         WHERE account_id = ? AND ticket = ?",
    )
    .bind(new_volume)
    .bind(account_id)
    .bind(ticket)
    .execute(&db.pool)
    .await
    .context("reduce_trade_volume")?;
    Ok(())
}

pub async fn close_trade(
    db: &Db,
    account_id: &str,
    ticket: &str,
    close_price: f64,
    close_time: DateTime<Utc>,
    profit: f64,
    reason: crate::types::CloseReason,
) -> Result<()> {
    let trade = get_trade(db, account_id, ticket)
        .await?
        .context("close_trade: trade not found")?;

    let hold_minutes = (close_time - trade.open_time).num_seconds() as f64 / 60.0;
    let rr = if (trade.open_price - trade.initial_sl).abs() > 0.0 {
        Some(profit / (trade.open_price - trade.initial_sl).abs())
    } else {
        None
    };
    let pips = match trade.direction {
        Direction::Buy => close_price - trade.open_price,
        Direction::Sell => trade.open_price - close_price,
    };

    sqlx::query(
        "UPDATE trades SET status = 'closed', close_price = ?, close_time = ?, profit = ?,
         close_reason = ?, hold_duration_minutes = ?, pips_captured = ?, risk_reward_realized = ?
         WHERE account_id = ? AND ticket = ?",
    )
    .bind(close_price)
    .bind(close_time)
    .bind(profit)
    .bind(reason)
    .bind(hold_minutes)
    .bind(pips)
    .bind(rr)
    .bind(account_id)
    .bind(ticket)
    .execute(&db.pool)
    .await
    .context("close_trade")?;
    Ok(())
}

/// Closed trades for an (account, instrument, direction) within the trailing
/// `lookback` window, newest first — used by the auto-optimizer and shadow
/// recovery job.
pub async fn closed_trades_since(
    db: &Db,
    account_id: &str,
    instrument: &str,
    since: DateTime<Utc>,
) -> Result<Vec<Trade>> {
    sqlx::query_as::<_, Trade>(
        "SELECT * FROM trades WHERE account_id = ? AND instrument = ? AND status = 'closed'
         AND close_time >= ? ORDER BY close_time DESC",
    )
    .bind(account_id)
    .bind(instrument)
    .bind(since)
    .fetch_all(&db.pool)
    .await
    .context("closed_trades_since")
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

pub async fn insert_command(db: &Db, command: &Command) -> Result<()> {
    sqlx::query(
        "INSERT INTO commands
         (id, account_id, command_type, payload, status, created_at, timeout_at)
         VALUES (?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT(id) DO NOTHING",
    )
    .bind(&command.id)
    .bind(&command.account_id)
    .bind(command.command_type)
    .bind(&command.payload)
    .bind(command.status)
    .bind(command.created_at)
    .bind(command.timeout_at)
    .execute(&db.pool)
    .await
    .context("insert_command")?;
    Ok(())
}

/// Atomically pick up to `limit` pending commands and transition them to
/// `in_flight` (heartbeat response, §4.7).
pub async fn pick_pending_commands(
    db: &Db,
    account_id: &str,
    limit: i64,
) -> Result<Vec<Command>> {
    let mut tx = db.pool.begin().await.context("begin pick_pending_commands")?;

    let rows = sqlx::query_as::<_, Command>(
        "SELECT * FROM commands WHERE account_id = ? AND status = 'pending'
         ORDER BY created_at ASC LIMIT ?",
    )
    .bind(account_id)
    .bind(limit)
    .fetch_all(&mut *tx)
    .await
    .context("select pending commands")?;

    for cmd in &rows {
        sqlx::query("UPDATE commands SET status = 'in_flight', picked_at = ? WHERE id = ?")
            .bind(Utc::now())
            .bind(&cmd.id)
            .execute(&mut *tx)
            .await
            .context("transition command to in_flight")?;
    }

    tx.commit().await.context("commit pick_pending_commands")?;
    Ok(rows)
}

pub async fn complete_command(
    db: &Db,
    id: &str,
    status: CommandStatus,
    response: Option<&str>,
    error_message: Option<&str>,
    ticket: Option<&str>,
) -> Result<()> {
    sqlx::query(
        "UPDATE commands SET status = ?, completed_at = ?, response = ?, error_message = ?,
         ticket = ? WHERE id = ?",
    )
    .bind(status)
    .bind(Utc::now())
    .bind(response)
    .bind(error_message)
    .bind(ticket)
    .bind(id)
    .execute(&db.pool)
    .await
    .context("complete_command")?;
    Ok(())
}

pub async fn get_command(db: &Db, id: &str) -> Result<Option<Command>> {
    sqlx::query_as::<_, Command>("SELECT * FROM commands WHERE id = ?")
        .bind(id)
        .fetch_optional(&db.pool)
        .await
        .context("get_command")
}

/// In-flight commands past `timeout_at` — redelivered at most twice, then failed.
pub async fn stale_in_flight_commands(db: &Db) -> Result<Vec<Command>> {
    sqlx::query_as::<_, Command>(
        "SELECT * FROM commands WHERE status = 'in_flight' AND timeout_at < ?",
    )
    .bind(Utc::now())
    .fetch_all(&db.pool)
    .await
    .context("stale_in_flight_commands")
}

pub async fn redeliver_command(db: &Db, id: &str, new_timeout_at: DateTime<Utc>) -> Result<()> {
    sqlx::query(
        "UPDATE commands SET status = 'pending', picked_at = NULL, timeout_at = ?,
         redelivery_count = redelivery_count + 1 WHERE id = ?",
    )
    .bind(new_timeout_at)
    .bind(id)
    .execute(&db.pool)
    .await
    .context("redeliver_command")?;
    Ok(())
}

pub async fn fail_command(db: &Db, id: &str, error_message: &str) -> Result<()> {
    complete_command(db, id, CommandStatus::Failed, None, Some(error_message), None).await
}

pub async fn pending_command_count(db: &Db, account_id: &str) -> Result<i64> {
    let row = sqlx::query(
        "SELECT COUNT(*) as c FROM commands WHERE account_id = ? AND status IN ('pending', 'in_flight')",
    )
    .bind(account_id)
    .fetch_one(&db.pool)
    .await
    .context("pending_command_count")?;
    Ok(row.try_get::<i64, _>("c")?)
}

// ---------------------------------------------------------------------------
// Symbol trading config
// ---------------------------------------------------------------------------

pub async fn get_symbol_config(
    db: &Db,
    account_id: &str,
    instrument: &str,
    direction: Direction,
) -> Result<SymbolTradingConfig> {
    let found = sqlx::query_as::<_, SymbolTradingConfig>(
        "SELECT * FROM symbol_trading_configs WHERE account_id = ? AND instrument = ? AND direction = ?",
    )
    .bind(account_id)
    .bind(instrument)
    .bind(direction)
    .fetch_optional(&db.pool)
    .await
    .context("get_symbol_config")?;

    Ok(found.unwrap_or_else(|| SymbolTradingConfig {
        account_id: account_id.to_string(),
        instrument: instrument.to_string(),
        direction,
        ..Default::default()
    }))
}

pub async fn upsert_symbol_config(db: &Db, cfg: &SymbolTradingConfig) -> Result<()> {
    sqlx::query(
        "INSERT INTO symbol_trading_configs
         (account_id, instrument, direction, status, min_confidence_threshold,
          risk_multiplier, consecutive_wins, consecutive_losses, rolling_winrate,
          rolling_trades_count, pause_reason, paused_at, updated_by)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT(account_id, instrument, direction) DO UPDATE SET
            status = excluded.status,
            min_confidence_threshold = excluded.min_confidence_threshold,
            risk_multiplier = excluded.risk_multiplier,
            consecutive_wins = excluded.consecutive_wins,
            consecutive_losses = excluded.consecutive_losses,
            rolling_winrate = excluded.rolling_winrate,
            rolling_trades_count = excluded.rolling_trades_count,
            pause_reason = excluded.pause_reason,
            paused_at = excluded.paused_at,
            updated_by = excluded.updated_by",
    )
    .bind(&cfg.account_id)
    .bind(&cfg.instrument)
    .bind(cfg.direction)
    .bind(cfg.status)
    .bind(cfg.min_confidence_threshold)
    .bind(cfg.risk_multiplier)
    .bind(cfg.consecutive_wins)
    .bind(cfg.consecutive_losses)
    .bind(cfg.rolling_winrate)
    .bind(cfg.rolling_trades_count)
    .bind(&cfg.pause_reason)
    .bind(cfg.paused_at)
    .bind(&cfg.updated_by)
    .execute(&db.pool)
    .await
    .context("upsert_symbol_config")?;
    Ok(())
}

pub async fn shadow_configs(db: &Db) -> Result<Vec<SymbolTradingConfig>> {
    sqlx::query_as::<_, SymbolTradingConfig>(
        "SELECT * FROM symbol_trading_configs WHERE status = 'shadow_trade'",
    )
    .fetch_all(&db.pool)
    .await
    .context("shadow_configs")
}

// ---------------------------------------------------------------------------
// Indicator scores
// ---------------------------------------------------------------------------

pub async fn get_indicator_score(
    db: &Db,
    instrument: &str,
    timeframe: &str,
    indicator: &str,
) -> Result<IndicatorScore> {
    let found = sqlx::query_as::<_, IndicatorScore>(
        "SELECT * FROM indicator_scores WHERE instrument = ? AND timeframe = ? AND indicator = ?",
    )
    .bind(instrument)
    .bind(timeframe)
    .bind(indicator)
    .fetch_optional(&db.pool)
    .await
    .context("get_indicator_score")?;

    Ok(found.unwrap_or(IndicatorScore {
        instrument: instrument.to_string(),
        timeframe: timeframe.to_string(),
        indicator: indicator.to_string(),
        score: 50.0,
        sample_count: 0,
    }))
}

pub async fn record_indicator_outcome(
    db: &Db,
    instrument: &str,
    timeframe: &str,
    indicator: &str,
    correct: bool,
) -> Result<()> {
    let mut current = get_indicator_score(db, instrument, timeframe, indicator).await?;
    current.sample_count += 1;
    let target = if correct { 100.0 } else { 0.0 };
    // Exponential update toward the outcome, heavier weight while young.
    let alpha = 1.0 / (current.sample_count.min(20) as f64);
    current.score = current.score * (1.0 - alpha) + target * alpha;

    sqlx::query(
        "INSERT INTO indicator_scores (instrument, timeframe, indicator, score, sample_count)
         VALUES (?, ?, ?, ?, ?)
         ON CONFLICT(instrument, timeframe, indicator) DO UPDATE SET
            score = excluded.score, sample_count = excluded.sample_count",
    )
    .bind(instrument)
    .bind(timeframe)
    .bind(indicator)
    .bind(current.score)
    .bind(current.sample_count)
    .execute(&db.pool)
    .await
    .context("record_indicator_outcome")?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Shadow trades
// ---------------------------------------------------------------------------

pub async fn insert_shadow_trade(db: &Db, trade: &ShadowTrade) -> Result<()> {
    sqlx::query(
        "INSERT INTO shadow_trades
         (id, account_id, instrument, direction, signal_id, entry_price, sl, tp, entry_time)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&trade.id)
    .bind(&trade.account_id)
    .bind(&trade.instrument)
    .bind(trade.direction)
    .bind(&trade.signal_id)
    .bind(trade.entry_price)
    .bind(trade.sl)
    .bind(trade.tp)
    .bind(trade.entry_time)
    .execute(&db.pool)
    .await
    .context("insert_shadow_trade")?;
    Ok(())
}

pub async fn open_shadow_trades(db: &Db) -> Result<Vec<ShadowTrade>> {
    sqlx::query_as::<_, ShadowTrade>("SELECT * FROM shadow_trades WHERE closed = 0")
        .fetch_all(&db.pool)
        .await
        .context("open_shadow_trades")
}

pub async fn close_shadow_trade(
    db: &Db,
    id: &str,
    exit_price: f64,
    hypothetical_profit: f64,
) -> Result<()> {
    sqlx::query(
        "UPDATE shadow_trades SET closed = 1, exit_price = ?, exit_time = ?,
         hypothetical_profit = ? WHERE id = ?",
    )
    .bind(exit_price)
    .bind(Utc::now())
    .bind(hypothetical_profit)
    .bind(id)
    .execute(&db.pool)
    .await
    .context("close_shadow_trade")?;
    Ok(())
}

pub async fn shadow_trades_since(
    db: &Db,
    account_id: &str,
    instrument: &str,
    since: DateTime<Utc>,
) -> Result<Vec<ShadowTrade>> {
    sqlx::query_as::<_, ShadowTrade>(
        "SELECT * FROM shadow_trades WHERE account_id = ? AND instrument = ? AND closed = 1
         AND exit_time >= ?",
    )
    .bind(account_id)
    .bind(instrument)
    .bind(since)
    .fetch_all(&db.pool)
    .await
    .context("shadow_trades_since")
}

// ---------------------------------------------------------------------------
// Logs & decisions
// ---------------------------------------------------------------------------

pub async fn insert_log(
    db: &Db,
    level: &str,
    message: &str,
    details: Option<&str>,
    account_id: Option<&str>,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO logs (level, message, details, account_id, created_at) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(level)
    .bind(message)
    .bind(details)
    .bind(account_id)
    .bind(Utc::now())
    .execute(&db.pool)
    .await
    .context("insert_log")?;
    Ok(())
}

pub async fn insert_decision(
    db: &Db,
    decision_type: crate::types::DecisionType,
    account_id: Option<&str>,
    instrument: Option<&str>,
    outcome: &str,
    reason: &str,
    context: Option<&str>,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO ai_decisions
         (decision_type, account_id, instrument, outcome, reason, context, created_at)
         VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(decision_type)
    .bind(account_id)
    .bind(instrument)
    .bind(outcome)
    .bind(reason)
    .bind(context)
    .bind(Utc::now())
    .execute(&db.pool)
    .await
    .context("insert_decision")?;
    Ok(())
}

pub async fn recent_decisions(db: &Db, limit: i64) -> Result<Vec<(i64, String, String)>> {
    let rows = sqlx::query("SELECT id, decision_type, reason FROM ai_decisions ORDER BY id DESC LIMIT ?")
        .bind(limit)
        .fetch_all(&db.pool)
        .await
        .context("recent_decisions")?;
    rows.iter()
        .map(|r| {
            Ok((
                r.try_get::<i64, _>("id")?,
                r.try_get::<String, _>("decision_type")?,
                r.try_get::<String, _>("reason")?,
            ))
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Pattern detections
// ---------------------------------------------------------------------------

pub async fn insert_pattern_detection(
    db: &Db,
    instrument: &str,
    timeframe: &str,
    name: &str,
    direction: crate::types::PatternDirection,
    reliability: f64,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO pattern_detections (instrument, timeframe, name, direction, reliability, detected_at)
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(instrument)
    .bind(timeframe)
    .bind(name)
    .bind(direction)
    .bind(reliability)
    .bind(Utc::now())
    .execute(&db.pool)
    .await
    .context("insert_pattern_detection")?;
    Ok(())
}

pub async fn recent_patterns(
    db: &Db,
    instrument: &str,
    timeframe: &str,
    limit: i64,
) -> Result<Vec<PatternDetection>> {
    sqlx::query_as::<_, PatternDetection>(
        "SELECT * FROM pattern_detections WHERE instrument = ? AND timeframe = ?
         ORDER BY detected_at DESC LIMIT ?",
    )
    .bind(instrument)
    .bind(timeframe)
    .bind(limit)
    .fetch_all(&db.pool)
    .await
    .context("recent_patterns")
}

pub async fn delete_patterns_older_than(db: &Db, cutoff: DateTime<Utc>) -> Result<u64> {
    let result = sqlx::query("DELETE FROM pattern_detections WHERE detected_at < ?")
        .bind(cutoff)
        .execute(&db.pool)
        .await
        .context("delete_patterns_older_than")?;
    Ok(result.rows_affected())
}
