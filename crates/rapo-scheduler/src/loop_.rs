//! The scheduler's own run loop (§4.7): a one-second tick that refreshes
//! the schedule on `refresh_interval`, matches each control's calendar
//! entry against the current moment, and dispatches due controls onto a
//! shared queue served by a fixed pool of executor tasks. A separate
//! maintainer task runs retention cleanup and pool reporting on their own
//! cadences.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Datelike, Timelike, Utc};
use sqlx::PgPool;
use tokio::sync::{mpsc, Mutex};

use crate::calendar::ScheduleEntry;
use crate::error::Result;

const DEFAULT_EXECUTORS: usize = 5;
const DEFAULT_REFRESH_INTERVAL_SECS: i64 = 300;
const DEFAULT_MAINTENANCE_INTERVAL_SECS: i64 = 3600;
const DEFAULT_DATABASE_REPORT_INTERVAL_SECS: i64 = 60;

struct ScheduledControl {
    status: bool,
    entry: ScheduleEntry,
}

/// A control name and the moment (scheduler tick, as seconds since epoch)
/// it was due at, mirroring the `(name, moment)` tuple the original queue
/// carries.
type Job = (String, i64);

/// The `[SCHEDULER]` config-file keys (§6.1) governing this loop's cadence.
#[derive(Debug, Clone, Copy)]
pub struct SchedulerIntervals {
    pub refresh_secs: i64,
    pub maintenance_secs: i64,
    pub database_report_secs: i64,
}

impl Default for SchedulerIntervals {
    fn default() -> Self {
        Self {
            refresh_secs: DEFAULT_REFRESH_INTERVAL_SECS,
            maintenance_secs: DEFAULT_MAINTENANCE_INTERVAL_SECS,
            database_report_secs: DEFAULT_DATABASE_REPORT_INTERVAL_SECS,
        }
    }
}

pub struct SchedulerLoop {
    pool: PgPool,
    gateway: rapo_db::Gateway,
    executors: usize,
    intervals: SchedulerIntervals,
}

impl SchedulerLoop {
    pub fn new(pool: PgPool, gateway: rapo_db::Gateway) -> Self {
        Self {
            pool,
            gateway,
            executors: DEFAULT_EXECUTORS,
            intervals: SchedulerIntervals::default(),
        }
    }

    pub fn with_executors(mut self, executors: usize) -> Self {
        self.executors = executors.max(1);
        self
    }

    pub fn with_intervals(mut self, intervals: SchedulerIntervals) -> Self {
        self.intervals = intervals;
        self
    }

    /// Run until `shutdown` resolves. Spawns the executor pool and the
    /// maintainer task, then loops the scheduling tick on the calling task.
    pub async fn run(self, shutdown: impl std::future::Future<Output = ()>) -> Result<()> {
        let (tx, rx) = mpsc::unbounded_channel::<Job>();
        let rx = Arc::new(Mutex::new(rx));

        let mut worker_handles = Vec::with_capacity(self.executors);
        for index in 0..self.executors {
            let gateway = self.gateway.clone();
            let rx = rx.clone();
            worker_handles.push(tokio::spawn(executor_loop(index, gateway, rx)));
        }

        let maintainer = tokio::spawn(maintainer_loop(self.gateway.clone(), self.intervals));
        let tick = tokio::spawn(tick_loop(self.pool, tx, self.intervals));

        tokio::pin!(shutdown);
        tokio::select! {
            _ = &mut shutdown => {
                tracing::info!("scheduler received shutdown signal");
            }
            result = tick => {
                if let Err(join_err) = result {
                    tracing::error!(error = %join_err, "schedule tick loop panicked");
                }
            }
        }

        maintainer.abort();
        for handle in worker_handles {
            handle.abort();
        }
        Ok(())
    }
}

/// The maintainer thread (§5): sweeps control-output retention on
/// `maintenance_interval` and logs pool occupancy on
/// `database_report_interval`, both independent of the 1 Hz tick loop.
async fn maintainer_loop(gateway: rapo_db::Gateway, intervals: SchedulerIntervals) {
    let mut since_maintenance = 0i64;
    let mut since_report = 0i64;
    let step = Duration::from_secs(1);
    loop {
        tokio::time::sleep(step).await;
        since_maintenance += 1;
        since_report += 1;

        if since_report >= intervals.database_report_secs.max(1) {
            since_report = 0;
            let pool = gateway.pool();
            tracing::info!(
                size = pool.size(),
                idle = pool.num_idle(),
                "database pool report"
            );
        }

        if since_maintenance >= intervals.maintenance_secs.max(1) {
            since_maintenance = 0;
            tracing::info!("running scheduler maintenance sweep");
            if let Err(err) = rapo_control::lifecycle::clean_all(&gateway).await {
                tracing::error!(error = %err, "maintenance sweep failed");
            }
        }
    }
}

async fn tick_loop(pool: PgPool, tx: mpsc::UnboundedSender<Job>, intervals: SchedulerIntervals) {
    let mut schedule = fetch_schedule(&pool).await.unwrap_or_else(|err| {
        tracing::error!(error = %err, "failed to load initial schedule");
        HashMap::new()
    });
    log_schedule(&schedule);

    let mut moment = Utc::now();
    loop {
        let tick_start = std::time::Instant::now();

        if moment.timestamp() % intervals.refresh_secs.max(1) == 0 {
            match fetch_schedule(&pool).await {
                Ok(refreshed) => {
                    schedule = refreshed;
                    log_schedule(&schedule);
                }
                Err(err) => tracing::error!(error = %err, "failed to refresh schedule"),
            }
        }

        let now = moment.naive_utc();
        let mday = now.day();
        let wday = now.weekday().num_days_from_monday() + 1;
        let hour = now.hour();
        let min = now.minute();
        let sec = now.second();

        for (name, scheduled) in schedule.iter() {
            if !scheduled.status {
                continue;
            }
            if scheduled.entry.matches(mday, wday, hour, min, sec) {
                tracing::info!(control = %name, moment = moment.timestamp(), "dispatching control");
                if tx.send((name.clone(), moment.timestamp())).is_err() {
                    tracing::error!(control = %name, "executor pool has shut down, dropping job");
                }
            }
        }

        let elapsed = tick_start.elapsed();
        let wait = Duration::from_secs(1).saturating_sub(elapsed);
        tokio::time::sleep(wait).await;
        moment += chrono::Duration::seconds(1);
    }
}

async fn executor_loop(
    index: usize,
    gateway: rapo_db::Gateway,
    rx: Arc<Mutex<mpsc::UnboundedReceiver<Job>>>,
) {
    loop {
        let job = {
            let mut guard = rx.lock().await;
            guard.recv().await
        };
        let Some((name, moment)) = job else {
            tracing::info!(executor = index, "job queue closed, executor exiting");
            return;
        };
        tracing::info!(executor = index, control = %name, moment, "initiating control");
        let started_at = DateTime::from_timestamp(moment, 0).unwrap_or_else(Utc::now);
        match rapo_control::lifecycle::run_by_name(&gateway, &name, started_at).await {
            Ok(()) => tracing::info!(executor = index, control = %name, "control performed"),
            Err(err) => tracing::error!(executor = index, control = %name, error = %err, "control failed"),
        }
    }
}

async fn fetch_schedule(pool: &PgPool) -> Result<HashMap<String, ScheduledControl>> {
    #[derive(sqlx::FromRow)]
    struct ConfigRow {
        control_name: String,
        status: String,
        schedule: Option<String>,
    }

    let rows: Vec<ConfigRow> =
        sqlx::query_as("SELECT control_name, status, schedule FROM rapo_config")
            .fetch_all(pool)
            .await?;

    let mut schedule = HashMap::with_capacity(rows.len());
    for row in rows {
        let entry = match &row.schedule {
            None => ScheduleEntry::default(),
            Some(raw) => match serde_json::from_str(raw) {
                Ok(entry) => entry,
                Err(err) => {
                    tracing::warn!(control = %row.control_name, error = %err, "unparseable schedule, skipping");
                    continue;
                }
            },
        };
        schedule.insert(
            row.control_name,
            ScheduledControl {
                status: row.status == "Y",
                entry,
            },
        );
    }
    Ok(schedule)
}

fn log_schedule(schedule: &HashMap<String, ScheduledControl>) {
    if schedule.is_empty() {
        tracing::debug!("schedule is empty");
    } else {
        tracing::debug!(count = schedule.len(), "schedule refreshed");
    }
}
