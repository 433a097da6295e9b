//! Run configuration for one supervised container
//!
//! A [`RunContext`] is built once from the command line and environment and
//! then only ever borrowed. The values that are discovered while running
//! (container id and pid) live in [`Resolved`] instead.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{ContainerId, ContainerName, Error, ProcessId, Result};

/// Which cgroup controllers to take ownership of
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CgroupSelection {
    /// Every controller the container belongs to
    #[default]
    All,
    /// Exactly these controllers
    Named(Vec<String>),
}

impl CgroupSelection {
    /// Build a selection from user input
    ///
    /// An empty list, or any entry equal to `all`, selects everything.
    #[must_use]
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut named = Vec::new();
        for name in names {
            let name = name.as_ref().trim();
            if name == "all" {
                return Self::All;
            }
            if !name.is_empty() && !named.iter().any(|n| n == name) {
                named.push(name.to_string());
            }
        }

        if named.is_empty() {
            Self::All
        } else {
            Self::Named(named)
        }
    }

    /// Whether every controller is selected
    #[must_use]
    pub const fn is_all(&self) -> bool {
        matches!(self, Self::All)
    }
}

/// Networks to join after the container is created, `name -> optional IP`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Networks(BTreeMap<String, Option<String>>);

impl Networks {
    /// Parse and merge one `NAME[:IP],NAME[:IP]` argument
    ///
    /// # Errors
    /// Returns error if any entry has an empty network name
    pub fn add(&mut self, value: &str) -> Result<()> {
        for part in value.split(',') {
            let (name, ip) = match part.split_once(':') {
                Some((name, ip)) => (name.trim(), Some(ip.trim())),
                None => (part.trim(), None),
            };

            if name.is_empty() {
                return Err(Error::InvalidConfig {
                    message: format!("network '{value}' has a wrong format"),
                });
            }

            let ip = ip.filter(|ip| !ip.is_empty()).map(str::to_string);
            self.0.insert(name.to_string(), ip);
        }
        Ok(())
    }

    /// Iterate `(network, ip)` pairs in name order
    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<&str>)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_deref()))
    }

    /// Number of networks
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether no networks were requested
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromStr for Networks {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let mut networks = Self::default();
        networks.add(s)?;
        Ok(networks)
    }
}

impl fmt::Display for Networks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (name, ip) in self.iter() {
            if !first {
                f.write_str(",")?;
            }
            first = false;
            match ip {
                Some(ip) => write!(f, "{name}:{ip}")?,
                None => f.write_str(name)?,
            }
        }
        Ok(())
    }
}

/// Immutable configuration of one sysdock invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunContext {
    /// Target container name
    pub name: ContainerName,

    /// Arguments passed to the runtime `create` command
    pub create_args: Vec<String>,

    /// Controllers to take ownership of
    pub cgroups: CgroupSelection,

    /// Also migrate the v2 hierarchy mounted under `unified/` on hybrid hosts
    pub unified_hierarchy: bool,

    /// Supervisor notification socket, `None` when not running under one
    pub notify_socket: Option<String>,

    /// The container sends `READY=1` itself
    pub delegate_notify: bool,

    /// Remove the container when it exits, and replace a stopped one
    pub remove_on_exit: bool,

    /// Networks to join after create
    pub networks: Networks,

    /// Where to write the container pid
    pub pid_file: Option<PathBuf>,
}

impl RunContext {
    /// Create a context with defaults for everything except the name
    #[must_use]
    pub fn new(name: ContainerName) -> Self {
        Self {
            name,
            create_args: Vec::new(),
            cgroups: CgroupSelection::All,
            unified_hierarchy: false,
            notify_socket: None,
            delegate_notify: false,
            remove_on_exit: false,
            networks: Networks::default(),
            pid_file: None,
        }
    }

    /// Set the runtime `create` arguments
    #[must_use]
    pub fn with_create_args(mut self, args: Vec<String>) -> Self {
        self.create_args = args;
        self
    }

    /// Set the controller selection
    #[must_use]
    pub fn with_cgroups(mut self, cgroups: CgroupSelection) -> Self {
        self.cgroups = cgroups;
        self
    }

    /// Enable migration of the hybrid-mode unified hierarchy
    #[must_use]
    pub fn with_unified_hierarchy(mut self, enable: bool) -> Self {
        self.unified_hierarchy = enable;
        self
    }

    /// Set the notification socket; an empty string means none
    #[must_use]
    pub fn with_notify_socket(mut self, socket: Option<String>) -> Self {
        self.notify_socket = socket.filter(|s| !s.is_empty());
        self
    }

    /// Let the container send its own readiness notification
    #[must_use]
    pub fn with_delegate_notify(mut self, enable: bool) -> Self {
        self.delegate_notify = enable;
        self
    }

    /// Remove the container on exit
    #[must_use]
    pub fn with_remove_on_exit(mut self, enable: bool) -> Self {
        self.remove_on_exit = enable;
        self
    }

    /// Set the networks to join
    #[must_use]
    pub fn with_networks(mut self, networks: Networks) -> Self {
        self.networks = networks;
        self
    }

    /// Set the pid file path
    #[must_use]
    pub fn with_pid_file(mut self, path: Option<PathBuf>) -> Self {
        self.pid_file = path;
        self
    }
}

/// Outcome of resolving the named container to a running process
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolved {
    /// Runtime container id
    pub id: ContainerId,
    /// Host pid of the container's main process
    pub pid: ProcessId,
}
