//! Runtime client trait for pluggable implementations

use std::time::SystemTime;

use async_trait::async_trait;
use sysdock_core::{ContainerId, ProcessId, Result};

use crate::events::EventStream;

/// What sysdock needs to know about a container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerInfo {
    /// Full container id
    pub id: ContainerId,
    /// Container name, without the leading `/`
    pub name: String,
    /// Whether the container is running
    pub running: bool,
    /// Host pid of the main process, 0 when not running
    pub pid: ProcessId,
    /// Configured health check test (`["CMD-SHELL", "..."]`), if any
    pub health_check: Option<Vec<String>>,
}

/// Event subscription scoped to one container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventFilter {
    /// Container to watch
    pub container: ContainerId,
    /// Event names (`die`, `health_status`, ...)
    pub events: Vec<String>,
    /// Replay events from this instant, closing the gap between a state
    /// check and the subscription
    pub since: Option<SystemTime>,
}

impl EventFilter {
    /// Watch `events` on `container`
    #[must_use]
    pub fn new<I, S>(container: ContainerId, events: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            container,
            events: events.into_iter().map(Into::into).collect(),
            since: None,
        }
    }

    /// Replay events that happened since `since`
    #[must_use]
    pub fn since(mut self, since: SystemTime) -> Self {
        self.since = Some(since);
        self
    }
}

/// Trait for container runtime backends
///
/// This allows for different implementations:
/// - [`DockerCli`](crate::DockerCli) - Production, drives the docker CLI
/// - [`MockRuntime`](crate::MockRuntime) - Testing without a daemon
///
/// # Thread Safety
/// All implementations must be `Send + Sync` for use across async tasks.
#[async_trait]
pub trait RuntimeClient: Send + Sync {
    /// Inspect a container by name or id
    ///
    /// Returns `Ok(None)` if no such container exists.
    async fn inspect(&self, name_or_id: &str) -> Result<Option<ContainerInfo>>;

    /// Create a container from `create` arguments, returning its id
    async fn create(&self, args: &[String]) -> Result<ContainerId>;

    /// Attach a created container to a network
    async fn connect_network(&self, network: &str, ip: Option<&str>, id: &ContainerId)
        -> Result<()>;

    /// Start a created or stopped container
    async fn start(&self, id: &ContainerId) -> Result<()>;

    /// Force-remove a container
    async fn remove(&self, id: &ContainerId) -> Result<()>;

    /// Subscribe to container events
    async fn events(&self, filter: &EventFilter) -> Result<Box<dyn EventStream>>;
}
