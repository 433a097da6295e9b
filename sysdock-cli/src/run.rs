//! One supervised run of a container

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use sysdock_cgroup::{CgroupLayout, Migrator, ProcFs};
use sysdock_core::{ProcessId, RunContext};
use sysdock_notify::{ReadinessState, announce};
use sysdock_runtime::{DockerCli, Orchestrator, wait_for_exit};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::args;
use crate::cli::Cli;

/// How often the container state is re-checked while waiting for exit
const POLL_INTERVAL: Duration = Duration::from_secs(5);

/// How long a finished run waits for the health monitor to wind down
const MONITOR_GRACE: Duration = Duration::from_secs(2);

pub async fn execute(cli: Cli) -> Result<()> {
    let ctx = args::build_context(&cli, std::env::vars())?;

    if !nix::unistd::geteuid().is_root() {
        warn!("Not running as root, moving cgroups will likely fail");
    }

    let client = DockerCli::new(cli.docker_command.as_str());
    let orchestrator = Orchestrator::new(&client, &ctx);

    let resolved = orchestrator
        .resolve()
        .await
        .with_context(|| format!("Failed to start container '{}'", ctx.name))?;

    info!(container = %ctx.name, id = %resolved.id.short(), pid = %resolved.pid, "Container running");

    let procfs = ProcFs::new();
    let layout = CgroupLayout::detect(ctx.unified_hierarchy);
    debug!(mode = ?layout.mode(), "Detected cgroup layout");

    let moved = Migrator::new(layout, procfs.clone())
        .migrate(&ctx, resolved.pid)
        .await
        .context("Failed to move container processes")?;
    if !moved {
        info!(container = %ctx.name, "No processes needed moving");
    }

    let monitor = announce(&ctx, &resolved, &client, &procfs)
        .await
        .context("Failed to notify the supervisor")?;

    write_pid_file(&ctx, resolved.pid).await?;

    info!(container = %ctx.name, "Waiting for container to exit");
    wait_for_exit(&client, &resolved.id, POLL_INTERVAL).await?;

    if let Some(monitor) = monitor {
        settle(monitor).await;
    }

    orchestrator
        .cleanup(&resolved.id)
        .await
        .context("Failed to remove container")?;

    Ok(())
}

/// Give the health monitor a moment to see the exit and close its subscription
async fn settle(monitor: JoinHandle<sysdock_core::Result<ReadinessState>>) {
    match tokio::time::timeout(MONITOR_GRACE, monitor).await {
        Ok(Ok(Ok(state))) => debug!(?state, "Health check monitor finished"),
        Ok(Ok(Err(e))) => warn!(error = %e, "Health check monitor failed"),
        Ok(Err(e)) => warn!(error = %e, "Health check monitor panicked"),
        Err(_) => debug!("Health check monitor still running, abandoning it"),
    }
}

/// Write the container pid, when a pid file was requested
async fn write_pid_file(ctx: &RunContext, pid: ProcessId) -> Result<()> {
    let Some(path) = ctx.pid_file.as_deref() else {
        return Ok(());
    };
    if !pid.is_valid() {
        return Ok(());
    }

    write_pid(path, pid)
        .await
        .with_context(|| format!("Failed to write pid file {}", path.display()))
}

async fn write_pid(path: &Path, pid: ProcessId) -> std::io::Result<()> {
    tokio::fs::write(path, pid.to_string()).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use sysdock_core::ContainerName;

    fn context(pid_file: Option<std::path::PathBuf>) -> RunContext {
        RunContext::new(ContainerName::new("web").unwrap()).with_pid_file(pid_file)
    }

    #[tokio::test]
    async fn test_pid_file_written() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("web.pid");

        write_pid_file(&context(Some(path.clone())), ProcessId::from_raw(4242))
            .await
            .unwrap();

        assert_eq!(std::fs::read_to_string(path).unwrap(), "4242");
    }

    #[tokio::test]
    async fn test_pid_file_skipped_for_invalid_pid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("web.pid");

        write_pid_file(&context(Some(path.clone())), ProcessId::from_raw(0))
            .await
            .unwrap();

        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_pid_file_unwritable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("web.pid");

        let err = write_pid_file(&context(Some(path)), ProcessId::from_raw(4242))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Failed to write pid file"));
    }

    #[tokio::test]
    async fn test_no_pid_file() {
        write_pid_file(&context(None), ProcessId::from_raw(4242))
            .await
            .unwrap();
    }
}
