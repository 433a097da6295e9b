//! On-disk layout of the cgroup filesystem

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::CGROUP_PROCS;

/// Directory the v2 hierarchy is mounted at on hybrid hosts
pub const UNIFIED_DIR: &str = "unified";

/// How cgroup hierarchies are mounted on this host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HierarchyMode {
    /// v1 controllers only, one mount per controller
    Legacy,
    /// v1 controllers plus the v2 hierarchy under `unified/`
    Hybrid,
    /// v2 only, mounted at the root
    Unified,
}

/// Resolves `(controller, cgroup path)` pairs to files under the cgroup mount
#[derive(Debug, Clone)]
pub struct CgroupLayout {
    root: PathBuf,
    mode: HierarchyMode,
    unified_hierarchy: bool,
}

impl CgroupLayout {
    /// Inspect `/sys/fs/cgroup` to find the hierarchy mode
    ///
    /// `unified_hierarchy` opts in to migrating the v2 hierarchy on hybrid
    /// hosts.
    #[must_use]
    pub fn detect(unified_hierarchy: bool) -> Self {
        Self::detect_at(crate::CGROUP_ROOT, unified_hierarchy)
    }

    /// Like [`CgroupLayout::detect`] for a cgroup mount at `root`
    #[must_use]
    pub fn detect_at(root: impl Into<PathBuf>, unified_hierarchy: bool) -> Self {
        let root = root.into();

        let mode = if root.join("cgroup.controllers").exists() {
            HierarchyMode::Unified
        } else if root.join(UNIFIED_DIR).is_dir() {
            HierarchyMode::Hybrid
        } else {
            HierarchyMode::Legacy
        };

        debug!(root = %root.display(), ?mode, "Detected cgroup hierarchy");

        Self::new(root, mode, unified_hierarchy)
    }

    /// Build a layout without probing the filesystem
    #[must_use]
    pub fn new(root: impl Into<PathBuf>, mode: HierarchyMode, unified_hierarchy: bool) -> Self {
        Self {
            root: root.into(),
            mode,
            unified_hierarchy,
        }
    }

    /// Cgroup mount point
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Detected hierarchy mode
    #[must_use]
    pub const fn mode(&self) -> HierarchyMode {
        self.mode
    }

    /// Whether the unnamed (v2) hierarchy takes part in migration
    #[must_use]
    pub const fn includes_unified(&self) -> bool {
        self.unified_hierarchy || matches!(self.mode, HierarchyMode::Unified)
    }

    /// Directory of `cgroup_path` within `controller`'s hierarchy
    ///
    /// The empty controller is the v2 hierarchy: the mount root on pure v2
    /// hosts, `unified/` when the unified-hierarchy option is set. A `name=`
    /// prefix (named v1 hierarchies such as `name=systemd`) is stripped.
    #[must_use]
    pub fn cgroup_dir(&self, controller: &str, cgroup_path: &str) -> PathBuf {
        let mut dir = self.root.clone();

        if controller.is_empty() {
            if self.unified_hierarchy && self.mode != HierarchyMode::Unified {
                dir.push(UNIFIED_DIR);
            }
        } else {
            dir.push(controller.strip_prefix("name=").unwrap_or(controller));
        }

        let relative = cgroup_path.trim_start_matches('/');
        if !relative.is_empty() {
            dir.push(relative);
        }

        dir
    }

    /// `cgroup.procs` of `cgroup_path` within `controller`'s hierarchy
    #[must_use]
    pub fn procs_file(&self, controller: &str, cgroup_path: &str) -> PathBuf {
        self.cgroup_dir(controller, cgroup_path).join(CGROUP_PROCS)
    }
}
