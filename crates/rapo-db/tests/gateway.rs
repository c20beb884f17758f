//! Integration tests against a real Postgres instance (via `sqlx::test`'s
//! ephemeral per-test database), covering the reflection/execution surface
//! that can't be exercised with pure unit tests.

use rapo_db::Gateway;
use sqlx::PgPool;

fn gateway(pool: PgPool) -> Gateway {
    Gateway::from_pool(pool, 63)
}

#[sqlx::test(migrations = "../../migrations")]
async fn exists_reflects_table_lifecycle(pool: PgPool) -> sqlx::Result<()> {
    let gateway = gateway(pool);
    assert!(!gateway.exists("widgets").await.unwrap());

    gateway.execute("CREATE TABLE widgets (id BIGINT)").await.unwrap();
    assert!(gateway.exists("widgets").await.unwrap());
    assert!(gateway.is_table("widgets").await.unwrap());
    assert!(!gateway.is_view("widgets").await.unwrap());

    gateway.drop_table("widgets").await.unwrap();
    assert!(!gateway.exists("widgets").await.unwrap());
    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
async fn truncate_table_clears_rows_without_dropping(pool: PgPool) -> sqlx::Result<()> {
    let gateway = gateway(pool);
    gateway
        .execute("CREATE TABLE widgets (id BIGINT)")
        .await
        .unwrap();
    gateway
        .execute("INSERT INTO widgets VALUES (1), (2)")
        .await
        .unwrap();

    gateway.truncate_table("widgets").await.unwrap();
    assert!(gateway.exists("widgets").await.unwrap());

    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM widgets")
        .fetch_one(gateway.pool())
        .await
        .unwrap();
    assert_eq!(count, 0);
    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
async fn purge_table_is_a_no_op_for_a_missing_table(pool: PgPool) -> sqlx::Result<()> {
    let gateway = gateway(pool);
    gateway.purge_table("does_not_exist").await.unwrap();
    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
async fn check_identifier_rejects_names_over_the_limit(pool: PgPool) -> sqlx::Result<()> {
    let gateway = Gateway::from_pool(pool, 8);
    assert!(gateway.check_identifier("short").is_ok());
    assert!(gateway.check_identifier("far_too_long_for_the_limit").is_err());
    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
async fn parallelize_runs_every_group_and_reports_its_outcome(pool: PgPool) -> sqlx::Result<()> {
    let gateway = gateway(pool);
    let groups = vec![
        rapo_db::StatementGroup {
            name: "a".to_string(),
            statements: vec!["CREATE TABLE a (id BIGINT)".to_string()],
        },
        rapo_db::StatementGroup {
            name: "b".to_string(),
            statements: vec!["CREATE TABLE b (id BIGINT)".to_string()],
        },
    ];
    let outcomes = gateway.parallelize(groups).await;
    assert_eq!(outcomes.len(), 2);
    assert!(outcomes.iter().all(|o| o.result.is_ok()));
    assert!(gateway.exists("a").await.unwrap());
    assert!(gateway.exists("b").await.unwrap());
    Ok(())
}
