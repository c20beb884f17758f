//! `rapo_checkpoint` bookkeeping (§3, §4.2 point 5): a lazily-created table
//! of `(control_id, process_id, added)`, unique on `control_id`, recording
//! which process_id a control is currently running under so a crashed
//! scheduler or API process's stale runs can be detected and swept at the
//! next startup.

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::error::{GatewayError, Result};

const TERMINAL_STATUSES: &[&str] = &["D", "E", "C", "X"];

pub const CHECKPOINT_TABLE: &str = "rapo_checkpoint";
pub const RUN_TABLE: &str = "rapo_log";

/// Record that `control_id` is now checkpointed against `process_id`,
/// replacing any prior checkpoint for the same control (the unique
/// constraint is on `control_id`, so a control has at most one live
/// checkpoint at a time).
pub async fn record(
    pool: &PgPool,
    checkpoint_table: &str,
    control_id: i64,
    process_id: i64,
    added: DateTime<Utc>,
) -> Result<()> {
    let sql = format!(
        "INSERT INTO {checkpoint_table} (control_id, process_id, added) VALUES ($1, $2, $3) \
         ON CONFLICT (control_id) DO UPDATE SET process_id = EXCLUDED.process_id, added = EXCLUDED.added"
    );
    sqlx::query(&sql)
        .bind(control_id)
        .bind(process_id)
        .bind(added)
        .execute(pool)
        .await
        .map_err(|source| GatewayError::Execute {
            statement: sql.clone(),
            source,
        })?;
    Ok(())
}

/// Clear a control's checkpoint once its run has reached a terminal state.
pub async fn clear(pool: &PgPool, checkpoint_table: &str, control_id: i64) -> Result<()> {
    let sql = format!("DELETE FROM {checkpoint_table} WHERE control_id = $1");
    sqlx::query(&sql)
        .bind(control_id)
        .execute(pool)
        .await
        .map_err(|source| GatewayError::Execute {
            statement: sql.clone(),
            source,
        })?;
    Ok(())
}

/// Remove checkpoint rows whose `process_id` names a run already in a
/// terminal state — survivors of a crash between the run finishing and its
/// own `clear` call.
pub async fn sweep_terminal(pool: &PgPool, checkpoint_table: &str, run_table: &str) -> Result<u64> {
    let sql = format!(
        "DELETE FROM {checkpoint_table} \
         WHERE process_id IN ( \
             SELECT process_id FROM {run_table} \
             WHERE status = ANY($1) \
         )"
    );
    let result = sqlx::query(&sql)
        .bind(TERMINAL_STATUSES)
        .execute(pool)
        .await
        .map_err(|source| GatewayError::Execute {
            statement: sql.clone(),
            source,
        })?;
    Ok(result.rows_affected())
}

/// Remove checkpoint rows added before `started_at` — stale survivors of a
/// process instance that no longer exists.
pub async fn sweep_stale(
    pool: &PgPool,
    checkpoint_table: &str,
    started_at: DateTime<Utc>,
) -> Result<u64> {
    let sql = format!("DELETE FROM {checkpoint_table} WHERE added < $1");
    let result = sqlx::query(&sql)
        .bind(started_at)
        .execute(pool)
        .await
        .map_err(|source| GatewayError::Execute {
            statement: sql.clone(),
            source,
        })?;
    Ok(result.rows_affected())
}

/// Run both sweeps, as done once at scheduler/API startup.
pub async fn sweep(
    pool: &PgPool,
    checkpoint_table: &str,
    run_table: &str,
    started_at: DateTime<Utc>,
) -> Result<u64> {
    let terminal = sweep_terminal(pool, checkpoint_table, run_table).await?;
    let stale = sweep_stale(pool, checkpoint_table, started_at).await?;
    Ok(terminal + stale)
}
