//! Container resolution: absent, stopped or running

use sysdock_core::{ContainerId, Error, Resolved, Result, RunContext};
use tracing::{debug, info};

use crate::client::{ContainerInfo, RuntimeClient};

/// Resolves the named container to a running process
///
/// | state   | action                                                   |
/// |---------|----------------------------------------------------------|
/// | absent  | create, join networks, start, re-inspect                 |
/// | running | reuse as is                                              |
/// | stopped | remove and create when removal is requested, else start  |
pub struct Orchestrator<'a> {
    client: &'a dyn RuntimeClient,
    ctx: &'a RunContext,
}

impl<'a> Orchestrator<'a> {
    /// Resolve containers for `ctx` through `client`
    #[must_use]
    pub fn new(client: &'a dyn RuntimeClient, ctx: &'a RunContext) -> Self {
        Self { client, ctx }
    }

    /// Bring the container to a running state and return its id and pid
    ///
    /// # Errors
    /// Returns [`Error::Launch`] if the container does not end up running
    /// with a valid pid. Runtime failures are propagated unchanged.
    pub async fn resolve(&self) -> Result<Resolved> {
        let name = self.ctx.name.as_str();

        let info = match self.client.inspect(name).await? {
            None => self.launch().await?,
            Some(info) if info.running => {
                info!(container = name, id = %info.id.short(), "Container already running");
                info
            }
            Some(info) if self.ctx.remove_on_exit => {
                info!(container = name, id = %info.id.short(), "Replacing stopped container");
                self.client.remove(&info.id).await?;
                self.launch().await?
            }
            Some(info) => {
                info!(container = name, id = %info.id.short(), "Starting stopped container");
                self.client.start(&info.id).await?;
                self.reinspect(&info.id).await?
            }
        };

        self.running(info)
    }

    /// Remove the container after it exited, when removal was requested
    pub async fn cleanup(&self, id: &ContainerId) -> Result<()> {
        if !self.ctx.remove_on_exit {
            return Ok(());
        }

        info!(container = %self.ctx.name, id = %id.short(), "Removing container");
        self.client.remove(id).await
    }

    async fn launch(&self) -> Result<ContainerInfo> {
        let id = self.client.create(&self.ctx.create_args).await?;

        for (network, ip) in self.ctx.networks.iter() {
            debug!(network, ip, id = %id.short(), "Joining network");
            self.client.connect_network(network, ip, &id).await?;
        }

        self.client.start(&id).await?;
        self.reinspect(&id).await
    }

    async fn reinspect(&self, id: &ContainerId) -> Result<ContainerInfo> {
        self.client
            .inspect(id.as_str())
            .await?
            .ok_or_else(|| Error::Launch {
                message: format!("container {} disappeared after start", id.short()),
            })
    }

    fn running(&self, info: ContainerInfo) -> Result<Resolved> {
        if !info.running || !info.pid.is_valid() {
            return Err(Error::Launch {
                message: format!(
                    "container {} is not running (pid {})",
                    self.ctx.name, info.pid
                ),
            });
        }

        Ok(Resolved {
            id: info.id,
            pid: info.pid,
        })
    }
}

impl std::fmt::Debug for Orchestrator<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("container", &self.ctx.name)
            .finish_non_exhaustive()
    }
}
