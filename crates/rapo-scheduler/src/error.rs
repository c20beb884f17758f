#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("scheduler already running at PID {pid}")]
    AlreadyRunning { pid: i64 },

    #[error("no scheduler is currently registered")]
    NotRunning,

    #[error("failed to signal process {pid}")]
    Signal { pid: i64, #[source] source: std::io::Error },

    #[error(transparent)]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Gateway(#[from] rapo_db::GatewayError),

    #[error(transparent)]
    Control(#[from] rapo_control::ControlError),
}

pub type Result<T> = std::result::Result<T, SchedulerError>;
