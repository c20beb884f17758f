//! `rapo_log` bookkeeping: one row per control run, carrying its status
//! and all metrics accumulated as the lifecycle progresses.

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::error::Result;

pub async fn insert(
    pool: &PgPool,
    control_id: i64,
    date_from: DateTime<Utc>,
    date_to: DateTime<Utc>,
) -> Result<i64> {
    let row: (i64,) = sqlx::query_as(
        "INSERT INTO rapo_log (control_id, added, status, date_from, date_to) \
         VALUES ($1, now(), 'I', $2, $3) RETURNING process_id",
    )
    .bind(control_id)
    .bind(date_from)
    .bind(date_to)
    .fetch_one(pool)
    .await?;
    Ok(row.0)
}

pub async fn set_status(pool: &PgPool, process_id: i64, status: &str) -> Result<()> {
    sqlx::query("UPDATE rapo_log SET status = $1, updated = now() WHERE process_id = $2")
        .bind(status)
        .bind(process_id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn set_status_and_start(pool: &PgPool, process_id: i64, status: &str, start_date: DateTime<Utc>) -> Result<()> {
    sqlx::query(
        "UPDATE rapo_log SET status = $1, start_date = $2, updated = now() WHERE process_id = $3",
    )
    .bind(status)
    .bind(start_date)
    .bind(process_id)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn set_status_and_end(pool: &PgPool, process_id: i64, status: &str, end_date: DateTime<Utc>) -> Result<()> {
    sqlx::query(
        "UPDATE rapo_log SET status = $1, end_date = $2, updated = now() WHERE process_id = $3",
    )
    .bind(status)
    .bind(end_date)
    .bind(process_id)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn set_prerequisite_value(pool: &PgPool, process_id: i64, value: Option<&str>) -> Result<()> {
    sqlx::query("UPDATE rapo_log SET prerequisite_value = $1, updated = now() WHERE process_id = $2")
        .bind(value)
        .bind(process_id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn set_text_message(pool: &PgPool, process_id: i64, message: &str) -> Result<()> {
    sqlx::query("UPDATE rapo_log SET text_message = $1, updated = now() WHERE process_id = $2")
        .bind(message)
        .bind(process_id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn set_text_error(pool: &PgPool, process_id: i64, error: &str) -> Result<()> {
    sqlx::query("UPDATE rapo_log SET text_error = $1, updated = now() WHERE process_id = $2")
        .bind(error)
        .bind(process_id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn set_fetched(pool: &PgPool, process_id: i64, fetched: i64) -> Result<()> {
    sqlx::query("UPDATE rapo_log SET fetched = $1, updated = now() WHERE process_id = $2")
        .bind(fetched)
        .bind(process_id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn set_fetched_sides(pool: &PgPool, process_id: i64, fetched_a: i64, fetched_b: i64) -> Result<()> {
    sqlx::query(
        "UPDATE rapo_log SET fetched_a = $1, fetched_b = $2, updated = now() WHERE process_id = $3",
    )
    .bind(fetched_a)
    .bind(fetched_b)
    .bind(process_id)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn set_result_counts(
    pool: &PgPool,
    process_id: i64,
    success: i64,
    errors: i64,
    error_level: f64,
) -> Result<()> {
    sqlx::query(
        "UPDATE rapo_log SET success = $1, errors = $2, error_level = $3, updated = now() \
         WHERE process_id = $4",
    )
    .bind(success)
    .bind(errors)
    .bind(error_level)
    .bind(process_id)
    .execute(pool)
    .await?;
    Ok(())
}

/// Is this status one of `S`, `P`, `F` — i.e. is the run still working?
pub fn is_working(status: &str) -> bool {
    matches!(status, "S" | "P" | "F")
}

/// `None` when the row doesn't exist; `Some(None)` when it exists but its
/// `status` is `NULL` (deinitiated, or externally cancel-requested).
pub async fn current_status(pool: &PgPool, process_id: i64) -> Result<Option<Option<String>>> {
    let row: Option<(Option<String>,)> =
        sqlx::query_as("SELECT status FROM rapo_log WHERE process_id = $1")
            .bind(process_id)
            .fetch_optional(pool)
            .await?;
    Ok(row.map(|(s,)| s))
}

/// The external-cancel signal (§5): clear `status` on a still-working run
/// so the run's own supervisor observes it within one poll and finishes
/// the cancellation. A no-op once the run has left `S`/`P`/`F`.
pub async fn request_cancel(pool: &PgPool, process_id: i64) -> Result<()> {
    sqlx::query(
        "UPDATE rapo_log SET status = NULL, updated = now() \
         WHERE process_id = $1 AND status IN ('S', 'P', 'F')",
    )
    .bind(process_id)
    .execute(pool)
    .await?;
    Ok(())
}
