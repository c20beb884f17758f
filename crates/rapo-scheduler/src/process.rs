//! Process-level `start`/`stop` control (§4.7): spawning a detached
//! scheduler process and signalling a running one to shut down, mirroring
//! the original's `Scheduler._start`/`_stop`/`_kill`.

use std::time::Duration;

use chrono::Utc;
use sqlx::PgPool;

use crate::error::{Result, SchedulerError};
use crate::registry;

/// Spawn a detached copy of the current executable with `--start`, the
/// way the original re-execs itself via `sp.Popen([exe, file, '--start'])`.
pub fn spawn_detached(current_exe: &std::path::Path, args: &[&str]) -> std::io::Result<()> {
    let mut command = tokio::process::Command::new(current_exe);
    command
        .args(args)
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null());
    command.spawn()?;
    Ok(())
}

/// Send the registered scheduler process a termination signal and mark it
/// stopped in the database.
pub async fn stop(pool: &PgPool) -> Result<()> {
    let current = registry::current(pool).await?.ok_or(SchedulerError::NotRunning)?;
    registry::mark_stopped(pool, Utc::now()).await?;
    signal_terminate(current.pid)?;
    Ok(())
}

#[cfg(unix)]
fn signal_terminate(pid: i64) -> Result<()> {
    use nix::sys::signal::{self, Signal};
    use nix::unistd::Pid;

    signal::kill(Pid::from_raw(pid as i32), Signal::SIGTERM).map_err(|errno| {
        SchedulerError::Signal {
            pid,
            source: std::io::Error::from_raw_os_error(errno as i32),
        }
    })
}

#[cfg(not(unix))]
fn signal_terminate(pid: i64) -> Result<()> {
    tracing::warn!(pid, "process signalling is only implemented for unix targets");
    Ok(())
}

/// A future that resolves when the process receives SIGINT or SIGTERM.
pub async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigint = signal(SignalKind::interrupt()).expect("install SIGINT handler");
        let mut sigterm = signal(SignalKind::terminate()).expect("install SIGTERM handler");
        tokio::select! {
            _ = sigint.recv() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

/// Used by callers that want a bounded wait for a freshly spawned process
/// to register itself before reporting success back to the CLI.
pub async fn wait_for_registration(pool: &PgPool, timeout: Duration) -> Result<()> {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if registry::current(pool).await?.is_some() {
            return Ok(());
        }
        if tokio::time::Instant::now() >= deadline {
            return Err(SchedulerError::NotRunning);
        }
        tokio::time::sleep(Duration::from_millis(200)).await;
    }
}
