//! Cgroup membership of a process, as listed in `/proc/<pid>/cgroup`

use std::collections::BTreeMap;

use sysdock_core::{Error, ProcessId, Result};
use tokio::fs;

use crate::liveness::ProcFs;

/// Map of controller name to the cgroup path a process occupies in it
///
/// The unnamed v2 hierarchy is stored under the empty controller name, and
/// only when requested.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Membership(BTreeMap<String, String>);

impl Membership {
    /// Parse the content of a membership file
    ///
    /// Each line is `hierarchy-id:controller-list:path`. Co-mounted
    /// controllers (`cpu,cpuacct`) each map to the shared path; the kernel
    /// provides a per-controller symlink under the cgroup mount for each of
    /// them.
    #[must_use]
    pub fn parse(content: &str, include_unified: bool) -> Self {
        let mut map = BTreeMap::new();

        for line in content.lines() {
            let mut fields = line.splitn(3, ':');
            let (Some(_id), Some(controllers), Some(path)) =
                (fields.next(), fields.next(), fields.next())
            else {
                continue;
            };

            if controllers.is_empty() {
                if include_unified {
                    map.insert(String::new(), path.to_string());
                }
                continue;
            }

            for controller in controllers.split(',').filter(|c| !c.is_empty()) {
                map.insert(controller.to_string(), path.to_string());
            }
        }

        Self(map)
    }

    /// Read the current membership of `pid`
    ///
    /// Never cached: membership changes while processes are moved.
    pub async fn read(procfs: &ProcFs, pid: ProcessId, include_unified: bool) -> Result<Self> {
        let path = procfs.cgroup_file(pid);
        let content = fs::read_to_string(&path)
            .await
            .map_err(|e| Error::cgroup_io(&path, e))?;

        Ok(Self::parse(&content, include_unified))
    }

    /// Path within `controller`, if the process belongs to it
    #[must_use]
    pub fn get(&self, controller: &str) -> Option<&str> {
        self.0.get(controller).map(String::as_str)
    }

    /// Controller names, in sorted order
    pub fn controllers(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Number of controllers
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the process belongs to no controller
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HYBRID: &str = "\
12:pids:/docker/abc
4:cpu,cpuacct:/docker/abc
3:memory:/docker/abc
1:name=systemd:/docker/abc
0::/docker/abc
";

    #[test]
    fn test_comounted_controllers_share_path() {
        let membership = Membership::parse("4:cpu,cpuacct:/docker/abc\n", false);
        assert_eq!(membership.get("cpu"), Some("/docker/abc"));
        assert_eq!(membership.get("cpuacct"), Some("/docker/abc"));
        assert_eq!(membership.len(), 2);
    }

    #[test]
    fn test_unnamed_hierarchy_is_opt_in() {
        let without = Membership::parse(HYBRID, false);
        assert_eq!(without.get(""), None);
        assert_eq!(without.get("name=systemd"), Some("/docker/abc"));
        assert_eq!(
            without.controllers().collect::<Vec<_>>(),
            vec!["cpu", "cpuacct", "memory", "name=systemd", "pids"]
        );

        let with = Membership::parse(HYBRID, true);
        assert_eq!(with.get(""), Some("/docker/abc"));
        assert_eq!(with.len(), 6);
    }

    #[test]
    fn test_malformed_lines_are_skipped() {
        let membership = Membership::parse("garbage\n7:blkio\n\n5:devices:/a:b\n", false);
        assert_eq!(membership.len(), 1);
        assert_eq!(membership.get("devices"), Some("/a:b"));
    }

    #[tokio::test]
    async fn test_read_missing_process() {
        let dir = tempfile::tempdir().unwrap();
        let procfs = ProcFs::with_root(dir.path());

        let err = Membership::read(&procfs, ProcessId::from_raw(99), false)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::CgroupIo { .. }));
    }

    #[tokio::test]
    async fn test_read_own_membership() {
        // Every Linux process belongs to at least one hierarchy
        let membership = Membership::read(&ProcFs::new(), ProcessId::current(), true)
            .await
            .unwrap();
        assert!(!membership.is_empty());
    }
}
