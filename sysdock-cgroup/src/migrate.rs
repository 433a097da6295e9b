//! Relocation of a container's processes into the supervisor's cgroups

use std::path::Path;

use sysdock_core::{CgroupSelection, Error, ProcessId, Result, RunContext};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::layout::CgroupLayout;
use crate::liveness::ProcFs;
use crate::membership::Membership;

/// Moves processes from the container's cgroups into our own
///
/// Migration is a per-controller set difference: only controllers where the
/// container sits somewhere other than we do (and not at the root) are
/// touched. Every process listed in the container's cgroup is moved, so
/// children the workload already forked come along.
#[derive(Debug, Clone)]
pub struct Migrator {
    layout: CgroupLayout,
    procfs: ProcFs,
    self_pid: ProcessId,
}

impl Migrator {
    /// Create a migrator that moves processes next to the current process
    #[must_use]
    pub fn new(layout: CgroupLayout, procfs: ProcFs) -> Self {
        Self {
            layout,
            procfs,
            self_pid: ProcessId::current(),
        }
    }

    /// Use the cgroups of `pid` as the destination instead of our own
    #[must_use]
    pub fn with_self_pid(mut self, pid: ProcessId) -> Self {
        self.self_pid = pid;
        self
    }

    /// Cgroup layout in use
    #[must_use]
    pub const fn layout(&self) -> &CgroupLayout {
        &self.layout
    }

    /// Move the processes of container process `pid` into our cgroups
    ///
    /// Returns whether at least one process was moved. `false` is a normal
    /// outcome, e.g. when the container already shares our cgroups or every
    /// listed process exited before it could be moved.
    ///
    /// # Errors
    /// Fails if either membership file cannot be read, if a container procs
    /// list cannot be read while the container is still alive, or if writing
    /// a pid fails while that pid is still alive.
    pub async fn migrate(&self, ctx: &RunContext, pid: ProcessId) -> Result<bool> {
        self.migrate_checked(ctx, pid, |p| self.procfs.is_alive(p)).await
    }

    async fn migrate_checked<F>(
        &self,
        ctx: &RunContext,
        pid: ProcessId,
        is_alive: F,
    ) -> Result<bool>
    where
        F: Fn(ProcessId) -> bool,
    {
        let include_unified = self.layout.includes_unified();
        let own = Membership::read(&self.procfs, self.self_pid, include_unified).await?;
        let container = Membership::read(&self.procfs, pid, include_unified).await?;

        let controllers: Vec<&str> = match &ctx.cgroups {
            CgroupSelection::All => container.controllers().collect(),
            CgroupSelection::Named(names) => names.iter().map(String::as_str).collect(),
        };

        let mut moved = false;

        for controller in controllers {
            let (Some(own_path), Some(container_path)) =
                (own.get(controller), container.get(controller))
            else {
                debug!(controller, "Controller not shared, skipping");
                continue;
            };

            if own_path == container_path || container_path == "/" {
                continue;
            }

            let source = self.layout.procs_file(controller, container_path);
            let target = self.layout.procs_file(controller, own_path);

            let members = match read_procs(&source).await {
                Ok(members) => members,
                // The runtime removes the cgroup once the container is gone
                Err(e) if !is_alive(pid) => {
                    debug!(controller, pid = %pid, error = %e, "Container exited during migration");
                    continue;
                }
                Err(e) => return Err(Error::cgroup_io(&source, e)),
            };

            for member in members {
                if self.move_pid(member, &target, &is_alive).await? {
                    moved = true;
                }
            }
        }

        debug!(container = %ctx.name, pid = %pid, moved, "Cgroup migration finished");
        Ok(moved)
    }

    /// Returns `false` when `pid` was already gone
    async fn move_pid<F>(&self, pid: ProcessId, target: &Path, is_alive: &F) -> Result<bool>
    where
        F: Fn(ProcessId) -> bool,
    {
        if !is_alive(pid) {
            debug!(pid = %pid, "Process exited before it could be moved");
            return Ok(false);
        }

        info!(pid = %pid, path = %target.display(), "Moving process to cgroup");

        match write_pid(target, pid).await {
            Ok(()) => Ok(true),
            Err(e) if !is_alive(pid) => {
                debug!(pid = %pid, error = %e, "Process exited while being moved");
                Ok(false)
            }
            Err(e) => Err(Error::cgroup_io(target, e)),
        }
    }
}

async fn read_procs(path: &Path) -> std::io::Result<Vec<ProcessId>> {
    let content = fs::read_to_string(path).await?;

    Ok(content
        .lines()
        .filter_map(|line| line.parse().ok())
        .collect())
}

async fn write_pid(path: &Path, pid: ProcessId) -> std::io::Result<()> {
    let mut file = OpenOptions::new().append(true).open(path).await?;
    file.write_all(format!("{pid}\n").as_bytes()).await?;
    file.flush().await
}
