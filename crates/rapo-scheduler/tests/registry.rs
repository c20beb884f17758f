//! `rapo_scheduler` singleton-row claim semantics against a real Postgres
//! instance, including the pid-liveness probe that lets a new scheduler
//! reclaim a row left behind by one that died without shutting down.

use chrono::Utc;
use rapo_scheduler::error::SchedulerError;
use rapo_scheduler::registry;
use sqlx::PgPool;

#[sqlx::test(migrations = "../../migrations")]
async fn claim_succeeds_when_no_scheduler_is_registered(pool: PgPool) -> sqlx::Result<()> {
    let id = registry::claim(&pool, "host-a", "svc", std::process::id(), Utc::now())
        .await
        .unwrap();
    let current = registry::current(&pool).await.unwrap().unwrap();
    assert_eq!(current.id, id);
    assert_eq!(current.pid, std::process::id() as i64);
    assert!(current.stop_date.is_none());
    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
async fn claim_is_rejected_while_the_registered_pid_is_still_alive(pool: PgPool) -> sqlx::Result<()> {
    registry::claim(&pool, "host-a", "svc", std::process::id(), Utc::now())
        .await
        .unwrap();

    let err = registry::claim(&pool, "host-b", "svc", std::process::id(), Utc::now())
        .await
        .unwrap_err();
    assert!(matches!(err, SchedulerError::AlreadyRunning { .. }));
    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
async fn claim_reclaims_a_row_left_by_a_dead_pid(pool: PgPool) -> sqlx::Result<()> {
    // A pid this large is never a live process on the test host.
    let stale_pid: u32 = 2_147_483_600;
    registry::claim(&pool, "host-a", "svc", stale_pid, Utc::now())
        .await
        .unwrap();

    let id = registry::claim(&pool, "host-b", "svc", std::process::id(), Utc::now())
        .await
        .unwrap();
    let current = registry::current(&pool).await.unwrap().unwrap();
    assert_eq!(current.id, id);
    assert_eq!(current.server, "host-b");
    Ok(())
}

#[sqlx::test(migrations = "../../migrations")]
async fn claim_succeeds_after_a_clean_stop(pool: PgPool) -> sqlx::Result<()> {
    registry::claim(&pool, "host-a", "svc", std::process::id(), Utc::now())
        .await
        .unwrap();
    registry::mark_stopped(&pool, Utc::now()).await.unwrap();

    registry::claim(&pool, "host-b", "svc", std::process::id(), Utc::now())
        .await
        .unwrap();
    let current = registry::current(&pool).await.unwrap().unwrap();
    assert_eq!(current.server, "host-b");
    Ok(())
}
