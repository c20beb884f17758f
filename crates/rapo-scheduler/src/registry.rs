//! `rapo_scheduler` singleton row: records which process is currently
//! running the scheduler, so a second `start` refuses to run alongside a
//! live one (§4.7).

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::error::{Result, SchedulerError};

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SchedulerRow {
    pub id: i64,
    pub server: String,
    pub username: String,
    pub pid: i64,
    pub start_date: DateTime<Utc>,
    pub stop_date: Option<DateTime<Utc>>,
    pub status: String,
}

/// Register this process as the running scheduler. Fails if a previous
/// instance is recorded without a `stop_date` and its pid is still alive —
/// a row left behind by a process that died without shutting down cleanly
/// (no `stop_date`, pid gone) does not block a new claim.
pub async fn claim(
    pool: &PgPool,
    server: &str,
    username: &str,
    pid: u32,
    start_date: DateTime<Utc>,
) -> Result<i64> {
    let existing: Option<SchedulerRow> =
        sqlx::query_as("SELECT id, server, username, pid, start_date, stop_date, status FROM rapo_scheduler")
            .fetch_optional(pool)
            .await?;

    if let Some(row) = &existing {
        if row.stop_date.is_none() && pid_is_alive(row.pid) {
            return Err(SchedulerError::AlreadyRunning { pid: row.pid });
        }
    }

    sqlx::query("DELETE FROM rapo_scheduler").execute(pool).await?;

    let row: (i64,) = sqlx::query_as(
        "INSERT INTO rapo_scheduler (server, username, pid, start_date, status) \
         VALUES ($1, $2, $3, $4, 'W') RETURNING id",
    )
    .bind(server)
    .bind(username)
    .bind(pid as i64)
    .bind(start_date)
    .fetch_one(pool)
    .await?;

    Ok(row.0)
}

/// Read the currently registered scheduler row, if any.
pub async fn current(pool: &PgPool) -> Result<Option<SchedulerRow>> {
    let row = sqlx::query_as(
        "SELECT id, server, username, pid, start_date, stop_date, status FROM rapo_scheduler",
    )
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

/// Mark the registered scheduler as stopped.
pub async fn mark_stopped(pool: &PgPool, stop_date: DateTime<Utc>) -> Result<()> {
    sqlx::query("UPDATE rapo_scheduler SET stop_date = $1, status = 'S'")
        .bind(stop_date)
        .execute(pool)
        .await?;
    Ok(())
}

/// Whether `pid` still names a live process, probed with a signal-0 `kill`
/// (no signal is actually delivered). Conservatively assumes alive on a
/// platform where this can't be checked, or on an error other than
/// "no such process".
#[cfg(unix)]
fn pid_is_alive(pid: i64) -> bool {
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    match kill(Pid::from_raw(pid as i32), None) {
        Ok(()) => true,
        Err(nix::errno::Errno::ESRCH) => false,
        Err(_) => true,
    }
}

#[cfg(not(unix))]
fn pid_is_alive(_pid: i64) -> bool {
    true
}
