//! Cgroup membership discovery and migration
//!
//! Moves a container's processes out of the cgroups the container runtime
//! created and into the cgroups of the calling (supervised) process, so the
//! supervisor accounts for and controls the real workload.

#![warn(missing_docs, clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(
    clippy::module_name_repetitions,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod layout;
pub mod liveness;
pub mod membership;
pub mod migrate;

pub use layout::{CgroupLayout, HierarchyMode};
pub use liveness::ProcFs;
pub use membership::Membership;
pub use migrate::Migrator;

/// Default cgroup filesystem mount point
pub const CGROUP_ROOT: &str = "/sys/fs/cgroup";

/// Default procfs mount point
pub const PROC_ROOT: &str = "/proc";

/// Per-cgroup file listing (and accepting) member processes
pub const CGROUP_PROCS: &str = "cgroup.procs";
