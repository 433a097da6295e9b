//! Process liveness checks against procfs

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use sysdock_core::ProcessId;

/// View of a procfs mount
///
/// Every race check in sysdock goes through [`ProcFs::is_alive`]: the
/// workload may exit at any point while it is being migrated or announced.
#[derive(Debug, Clone)]
pub struct ProcFs {
    root: PathBuf,
}

impl ProcFs {
    /// Use the system procfs at `/proc`
    #[must_use]
    pub fn new() -> Self {
        Self::with_root(crate::PROC_ROOT)
    }

    /// Use a procfs mounted (or faked) somewhere else
    #[must_use]
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory of this procfs
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory of one process
    #[must_use]
    pub fn process_dir(&self, pid: ProcessId) -> PathBuf {
        self.root.join(pid.to_string())
    }

    /// Membership file of one process (`/proc/<pid>/cgroup`)
    #[must_use]
    pub fn cgroup_file(&self, pid: ProcessId) -> PathBuf {
        self.process_dir(pid).join("cgroup")
    }

    /// Whether `pid` still has a process table entry
    ///
    /// Only a missing entry counts as dead. Any other failure (for example
    /// `EACCES` under hardened procfs mounts) is treated as alive.
    #[must_use]
    pub fn is_alive(&self, pid: ProcessId) -> bool {
        if !pid.is_valid() {
            return false;
        }

        match std::fs::symlink_metadata(self.process_dir(pid)) {
            Ok(_) => true,
            Err(e) => e.kind() != ErrorKind::NotFound,
        }
    }
}

impl Default for ProcFs {
    fn default() -> Self {
        Self::new()
    }
}
