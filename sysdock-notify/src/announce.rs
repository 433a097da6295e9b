//! Notification step of a run

use sysdock_cgroup::ProcFs;
use sysdock_core::{Resolved, Result, RunContext};
use sysdock_runtime::RuntimeClient;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::channel::{Message, Notifier, NotifySocket};
use crate::monitor::{HealthMonitor, ReadinessState};

/// Hand the container over to the supervisor and arrange for readiness
///
/// Without a notification socket this does nothing. Otherwise `MAINPID` is
/// handed off first. When the container notifies on its own nothing else is
/// sent; when it has no health check `READY=1` is sent right away; else a
/// [`HealthMonitor`] is spawned and its handle returned.
///
/// Must run after cgroup migration: the supervisor looks at the cgroups of
/// the pid as soon as it receives `MAINPID`.
///
/// # Errors
/// Fails if the handoff fails, if the monitor cannot be created, or if the
/// unconditional `READY=1` cannot be sent.
pub async fn announce(
    ctx: &RunContext,
    resolved: &Resolved,
    client: &dyn RuntimeClient,
    procfs: &ProcFs,
) -> Result<Option<JoinHandle<Result<ReadinessState>>>> {
    let Some(socket) = NotifySocket::from_context(ctx) else {
        debug!("No notification socket, not notifying");
        return Ok(None);
    };

    socket.handoff(procfs, &ctx.name, resolved.pid).await?;
    info!(container = %ctx.name, pid = %resolved.pid, "Handed main process to the supervisor");

    if ctx.delegate_notify {
        debug!(container = %ctx.name, "Readiness is delegated to the container");
        return Ok(None);
    }

    match HealthMonitor::create(client, &resolved.id, socket.clone()).await? {
        Some(monitor) => Ok(Some(tokio::spawn(monitor.run()))),
        None => {
            socket.notify(Message::Ready).await?;
            info!(container = %ctx.name, "Signaled that the container is ready");
            Ok(None)
        }
    }
}
