//! Control run supervisor (§4.7, §5): polls a running control's own log
//! row every 5 seconds, force-cancelling it on an externally written
//! `status = null` (the HTTP cancel protocol) or on exceeding its
//! configured `timeout`. One supervisor task is spawned alongside every
//! worker task a run launches.

use std::time::Duration;

use chrono::{DateTime, Utc};
use rapo_db::Gateway;
use tokio::task::JoinHandle;

use crate::lifecycle::{self, Run};

const POLL_INTERVAL: Duration = Duration::from_secs(5);

#[derive(sqlx::FromRow)]
struct RunState {
    status: Option<String>,
    start_date: Option<DateTime<Utc>>,
}

/// Watch `process_id` while `worker` runs. If the row's `status` is
/// observed cleared to `NULL` while working, or the run has been started
/// longer than `timeout_secs`, abort `worker` and run `_cancel` in its
/// place.
pub async fn supervise(gateway: Gateway, process_id: i64, timeout_secs: Option<i64>, mut worker: JoinHandle<()>) {
    loop {
        tokio::select! {
            _ = &mut worker => return,
            _ = tokio::time::sleep(POLL_INTERVAL) => {}
        }

        let state: Option<RunState> = match sqlx::query_as(
            "SELECT status, start_date FROM rapo_log WHERE process_id = $1",
        )
        .bind(process_id)
        .fetch_optional(gateway.pool())
        .await
        {
            Ok(row) => row,
            Err(err) => {
                tracing::error!(process_id, error = %err, "supervisor failed to read log row");
                continue;
            }
        };
        let Some(state) = state else { return };

        let cancel_requested = state.status.is_none();
        let timed_out = match (timeout_secs, state.start_date) {
            (Some(limit), Some(start)) if limit > 0 => (Utc::now() - start).num_seconds() > limit,
            _ => false,
        };
        if !cancel_requested && !timed_out {
            continue;
        }

        if timed_out {
            tracing::warn!(process_id, timeout_secs, "control run exceeded its timeout, cancelling");
        } else {
            tracing::info!(process_id, "external cancel observed, cancelling control run");
        }
        worker.abort();
        match Run::load(&gateway, process_id).await {
            Ok(run) => {
                if let Err(err) = lifecycle::cancel(&gateway, &run).await {
                    tracing::error!(process_id, error = %err, "failed to finish cancelling control run");
                }
            }
            Err(err) => tracing::error!(process_id, error = %err, "failed to reload run for cancellation"),
        }
        return;
    }
}
