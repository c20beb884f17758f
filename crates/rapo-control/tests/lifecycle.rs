//! End-to-end run of the `ANL` lifecycle against a real Postgres instance,
//! covering fetch -> analyze -> save -> done the way a scheduler-triggered
//! run actually exercises it.

use chrono::{TimeZone, Utc};
use rapo_control::lifecycle;
use rapo_db::Gateway;
use sqlx::PgPool;

async fn seed_source(pool: &PgPool) {
    sqlx::query("CREATE TABLE rapo_test_revenue (event_date DATE NOT NULL, amount NUMERIC NOT NULL)")
        .execute(pool)
        .await
        .unwrap();
    sqlx::query(
        "INSERT INTO rapo_test_revenue (event_date, amount) VALUES \
         ('2026-07-26', 100), ('2026-07-26', -5), ('2026-07-26', 250), ('2026-07-26', -1)",
    )
    .execute(pool)
    .await
    .unwrap();
}

async fn seed_control(pool: &PgPool) -> i64 {
    let (control_id,): (i64,) = sqlx::query_as(
        "INSERT INTO rapo_config \
           (control_name, control_type, source_name, source_date_field, error_config) \
         VALUES ('daily_revenue', 'ANL', 'rapo_test_revenue', 'event_date', 'amount < 0') \
         RETURNING control_id",
    )
    .fetch_one(pool)
    .await
    .unwrap();
    control_id
}

#[sqlx::test(migrations = "../../migrations")]
async fn anl_run_flags_negative_amounts_and_saves_them(pool: PgPool) -> sqlx::Result<()> {
    seed_source(&pool).await;
    seed_control(&pool).await;

    let gateway = Gateway::from_pool(pool.clone(), 63);
    let moment = Utc.with_ymd_and_hms(2026, 7, 27, 12, 0, 0).unwrap();
    lifecycle::run_by_name(&gateway, "daily_revenue", moment)
        .await
        .unwrap();

    let (status, fetched, success, errors): (Option<String>, Option<i64>, Option<i64>, Option<i64>) =
        sqlx::query_as("SELECT status, fetched, success, errors FROM rapo_log ORDER BY process_id DESC LIMIT 1")
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(status.as_deref(), Some("D"));
    assert_eq!(fetched, Some(4));
    assert_eq!(errors, Some(2));
    assert_eq!(success, Some(2));

    let (saved,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM rapo_rest_daily_revenue")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(saved, 2);

    let (checkpoints,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM rapo_checkpoint")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(checkpoints, 0, "checkpoint should be cleared once the run is done");

    let (leftover,): (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM information_schema.tables WHERE table_name LIKE 'rapo_temp_%'",
    )
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(leftover, 0, "temporary tables are dropped once the control finishes");

    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
async fn anl_run_with_no_matching_rows_skips_the_output_table(pool: PgPool) -> sqlx::Result<()> {
    sqlx::query("CREATE TABLE rapo_test_revenue (event_date DATE NOT NULL, amount NUMERIC NOT NULL)")
        .execute(&pool)
        .await
        .unwrap();
    seed_control(&pool).await;

    let gateway = Gateway::from_pool(pool.clone(), 63);
    let moment = Utc.with_ymd_and_hms(2026, 7, 27, 12, 0, 0).unwrap();
    lifecycle::run_by_name(&gateway, "daily_revenue", moment)
        .await
        .unwrap();

    let (status, fetched): (Option<String>, Option<i64>) =
        sqlx::query_as("SELECT status, fetched FROM rapo_log ORDER BY process_id DESC LIMIT 1")
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(status.as_deref(), Some("D"));
    assert_eq!(fetched, Some(0));

    assert!(!gateway.exists("rapo_rest_daily_revenue").await.unwrap());
    Ok(())
}
