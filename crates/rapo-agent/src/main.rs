//! The RAPO agent binary: a CLI wrapping the scheduler and the control-plane
//! API, wired together the way `agent/src/main.rs` wires the control-plane
//! agent — structured logging first, config resolution second, a
//! multi-threaded runtime hosting whichever verb was asked for.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};

use rapo_config::Config;
use rapo_db::{Gateway, PoolConfig, Vendor};

/// RAPO is a data quality and revenue assurance control engine.
#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    /// Path to the `rapo.ini` configuration file.
    #[clap(long, env = "RAPO_CONFIG")]
    config: Option<PathBuf>,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Scheduler process control.
    Scheduler {
        #[clap(subcommand)]
        action: SchedulerAction,
    },
    /// Serve the HTTP control-plane API.
    Serve {
        /// Port to listen on for API requests.
        #[clap(long, default_value = "8080", env = "API_PORT")]
        port: u16,
        /// Directory of a bundled SPA frontend to serve as a fallback.
        #[clap(long, env = "STATIC_DIR")]
        static_dir: Option<PathBuf>,
    },
}

#[derive(Subcommand, Debug)]
enum SchedulerAction {
    /// Start the scheduler loop in this process.
    Start {
        /// Internal flag set by `scheduler start`'s own re-exec; runs the
        /// loop in the foreground instead of spawning a detached child.
        #[clap(long, hide = true)]
        foreground: bool,
    },
    /// Stop a running scheduler process.
    Stop,
}

fn main() -> anyhow::Result<()> {
    init_tracing();

    let args = Args::parse();
    tracing::info!(?args, "rapo-agent starting");

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    let result = runtime.block_on(async_main(args));
    runtime.shutdown_timeout(std::time::Duration::from_secs(5));
    result
}

fn init_tracing() {
    let ansi = !matches!(std::env::var("NO_COLOR"), Ok(v) if v == "1");
    let subscriber = tracing_subscriber::FmtSubscriber::builder()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_ansi(ansi)
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting tracing default failed");
}

async fn async_main(args: Args) -> anyhow::Result<()> {
    let config_path = Config::resolve_path(args.config).context("resolving configuration path")?;
    let config = Config::load(&config_path)
        .with_context(|| format!("loading configuration from {}", config_path.display()))?;

    let gateway = connect_gateway(&config).await?;
    sweep_checkpoints(&gateway).await;

    match args.command {
        Command::Scheduler { action } => run_scheduler(&config, action, gateway).await,
        Command::Serve { port, static_dir } => run_serve(&config, gateway, port, static_dir).await,
    }
}

/// Clear out `rapo_checkpoint` rows a prior crashed instance left behind
/// (§4.2 point 5): run once at every process startup, before the scheduler
/// or the API starts serving.
async fn sweep_checkpoints(gateway: &Gateway) {
    match rapo_db::cleanup::sweep(
        gateway.pool(),
        rapo_db::cleanup::CHECKPOINT_TABLE,
        rapo_db::cleanup::RUN_TABLE,
        chrono::Utc::now(),
    )
    .await
    {
        Ok(swept) if swept > 0 => tracing::info!(swept, "cleared stale checkpoints at startup"),
        Ok(_) => {}
        Err(err) => tracing::warn!(error = %err, "checkpoint sweep failed"),
    }
}

async fn connect_gateway(config: &Config) -> anyhow::Result<Gateway> {
    let database = &config.database;
    let vendor = database
        .get_str("vendor_name")
        .and_then(Vendor::parse)
        .unwrap_or(Vendor::Postgres);

    let pool_config = PoolConfig {
        vendor,
        host: database.get_str("host").map(str::to_string),
        port: database.get_i64("port").map(|p| p as u16),
        path: database.get_str("path").map(str::to_string),
        sid: database.get_str("sid").map(str::to_string),
        service_name: database.get_str("service_name").map(str::to_string),
        username: database.get_str("username").map(str::to_string),
        password: database.get_str("password").map(str::to_string),
        max_identifier_length: database
            .get_i64("max_identifier_length")
            .map(|v| v as usize)
            .unwrap_or(128),
        max_overflow: database.get_i64("max_overflow").map(|v| v as u32).unwrap_or(10),
        pool_pre_ping: database.get_bool("pool_pre_ping").unwrap_or(true),
        pool_size: database.get_i64("pool_size").map(|v| v as u32).unwrap_or(5),
        pool_recycle: database
            .get_i64("pool_recycle")
            .map(|s| std::time::Duration::from_secs(s as u64)),
        pool_timeout: std::time::Duration::from_secs(
            database.get_i64("pool_timeout").unwrap_or(30) as u64,
        ),
    };

    Gateway::connect(&pool_config)
        .await
        .context("connecting to the database")
}

async fn run_scheduler(config: &Config, action: SchedulerAction, gateway: Gateway) -> anyhow::Result<()> {
    match action {
        SchedulerAction::Start { foreground: true } => {
            let pool = gateway.pool().clone();
            let server = hostname();
            let username = std::env::var("USER").unwrap_or_else(|_| "rapo".to_string());
            let pid = std::process::id();

            rapo_scheduler::registry::claim(&pool, &server, &username, pid, chrono::Utc::now())
                .await
                .context("claiming the scheduler singleton")?;
            tracing::info!(pid, "scheduler registered");

            let scheduler = &config.scheduler;
            let intervals = rapo_scheduler::SchedulerIntervals {
                refresh_secs: scheduler.get_i64("refresh_interval").unwrap_or(300),
                maintenance_secs: scheduler.get_i64("maintenance_interval").unwrap_or(3600),
                database_report_secs: scheduler.get_i64("database_report_interval").unwrap_or(60),
            };
            let executors = scheduler
                .get_i64("control_parallelism")
                .map(|n| n as usize)
                .unwrap_or(5);

            rapo_scheduler::SchedulerLoop::new(pool, gateway)
                .with_executors(executors)
                .with_intervals(intervals)
                .run(rapo_scheduler::process::shutdown_signal())
                .await
                .context("scheduler loop failed")?;
            Ok(())
        }
        SchedulerAction::Start { foreground: false } => {
            let current_exe = std::env::current_exe().context("resolving current executable")?;
            rapo_scheduler::process::spawn_detached(
                &current_exe,
                &["scheduler", "start", "--foreground"],
            )
            .context("spawning detached scheduler process")?;
            rapo_scheduler::process::wait_for_registration(
                gateway.pool(),
                std::time::Duration::from_secs(10),
            )
            .await
            .context("waiting for scheduler to register")?;
            tracing::info!("scheduler started");
            Ok(())
        }
        SchedulerAction::Stop => {
            rapo_scheduler::process::stop(gateway.pool())
                .await
                .context("stopping scheduler")?;
            tracing::info!("scheduler stopped");
            Ok(())
        }
    }
}

async fn run_serve(
    config: &Config,
    gateway: Gateway,
    port: u16,
    static_dir: Option<PathBuf>,
) -> anyhow::Result<()> {
    let bearer_token = config
        .api
        .get_str("bearer_token")
        .map(str::to_string)
        .unwrap_or_else(|| {
            tracing::warn!("no [API] bearer_token configured, generating an ephemeral one");
            uuid::Uuid::new_v4().to_string()
        });

    let state = Arc::new(rapo_api::AppState {
        gateway,
        bearer_token,
    });
    let router = rapo_api::build_router(state, static_dir);

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port))
        .await
        .with_context(|| format!("binding API port {port}"))?;
    tracing::info!(port, "rapo-api listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(rapo_scheduler::process::shutdown_signal())
        .await
        .context("serving the API")?;
    Ok(())
}

fn hostname() -> String {
    std::env::var("HOSTNAME")
        .ok()
        .or_else(|| {
            hostname_fallback()
        })
        .unwrap_or_else(|| "rapo-agent".to_string())
}

#[cfg(unix)]
fn hostname_fallback() -> Option<String> {
    nix::unistd::gethostname()
        .ok()
        .and_then(|s| s.into_string().ok())
}

#[cfg(not(unix))]
fn hostname_fallback() -> Option<String> {
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_scheduler_start() {
        let args = Args::parse_from(["rapo-agent", "scheduler", "start"]);
        assert!(matches!(
            args.command,
            Command::Scheduler {
                action: SchedulerAction::Start { foreground: false }
            }
        ));
    }

    #[test]
    fn parses_serve_with_port() {
        let args = Args::parse_from(["rapo-agent", "serve", "--port", "9090"]);
        assert!(matches!(args.command, Command::Serve { port: 9090, .. }));
    }

    #[test]
    fn parses_scheduler_stop() {
        let args = Args::parse_from(["rapo-agent", "scheduler", "stop"]);
        assert!(matches!(
            args.command,
            Command::Scheduler {
                action: SchedulerAction::Stop
            }
        ));
    }
}
