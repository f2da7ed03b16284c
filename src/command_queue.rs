// =============================================================================
// Command Queue — durable FIFO per account (§4.7)
// =============================================================================
//
// Thin wrapper over the persistence layer's command primitives. Delivery and
// redelivery are both transitions on the `commands` table; this module only
// owns the cadence and redelivery-count bookkeeping, mirroring the execution
// engine's "gate then act" shape without holding any state of its own.

use anyhow::Result;
use chrono::{Duration, Utc};
use tracing::warn;

use crate::db::models::Command;
use crate::db::{repo, Db};
use crate::types::CommandStatus;

/// Heartbeat response size: up to this many pending commands per poll.
pub const DEFAULT_DELIVERY_LIMIT: i64 = 10;

/// In-flight commands older than this without a response are reverted.
pub const IN_FLIGHT_TIMEOUT_SECS: i64 = 120;

/// Redeliver at most this many times before marking a command `failed`.
pub const MAX_REDELIVERIES: i64 = 2;

/// Pick up to `limit` pending commands for `account_id` and atomically mark
/// them `in_flight` — the heartbeat response payload.
pub async fn deliver_pending(db: &Db, account_id: &str, limit: i64) -> Result<Vec<Command>> {
    repo::pick_pending_commands(db, account_id, limit).await
}

/// Record the EA's `command_response` for a delivered command.
pub async fn acknowledge(
    db: &Db,
    id: &str,
    status: CommandStatus,
    response: Option<&str>,
    error_message: Option<&str>,
    ticket: Option<&str>,
) -> Result<()> {
    repo::complete_command(db, id, status, response, error_message, ticket).await
}

/// Revert in-flight commands past [`IN_FLIGHT_TIMEOUT_SECS`] back to pending
/// for redelivery, up to [`MAX_REDELIVERIES`] times; beyond that, mark them
/// `failed`. Returns the commands that were marked `failed` this sweep, so
/// the auto-trader can react (failure counter, circuit breaker).
pub async fn sweep_stale(db: &Db) -> Result<Vec<Command>> {
    let stale = repo::stale_in_flight_commands(db).await?;
    let mut failed = Vec::new();

    for cmd in stale {
        if cmd.redelivery_count < MAX_REDELIVERIES {
            warn!(command_id = %cmd.id, attempt = cmd.redelivery_count + 1, "redelivering timed-out command");
            repo::redeliver_command(db, &cmd.id, Utc::now() + Duration::seconds(IN_FLIGHT_TIMEOUT_SECS)).await?;
        } else {
            warn!(command_id = %cmd.id, "command exhausted redelivery attempts, marking failed");
            repo::fail_command(db, &cmd.id, "exhausted redelivery attempts").await?;
            failed.push(cmd);
        }
    }

    Ok(failed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constants_match_spec_defaults() {
        assert_eq!(DEFAULT_DELIVERY_LIMIT, 10);
        assert_eq!(IN_FLIGHT_TIMEOUT_SECS, 120);
        assert_eq!(MAX_REDELIVERIES, 2);
    }
}
