//! Health check driven readiness
//!
//! The runtime runs the container's health check itself; the monitor only
//! watches the resulting events. A check counts as passed when the runtime
//! reports the container healthy, or when an exec of the health check
//! command exits with code 0. The first pass sends `READY=1`, every later
//! one `WATCHDOG=1`.

use std::fmt;
use std::time::SystemTime;

use sysdock_core::{ContainerId, Error, HealthStatus, Result, RuntimeEvent};
use sysdock_runtime::{EventFilter, EventStream, RuntimeClient};
use tracing::{debug, error, info, warn};

use crate::channel::{Message, Notifier};

/// Events the monitor subscribes to
pub const MONITOR_EVENTS: [&str; 5] = ["health_status", "exec_start", "exec_die", "die", "stop"];

/// Mechanism markers that may lead a health check test
const CHECK_MARKERS: [&str; 2] = ["CMD", "CMD-SHELL"];

/// Health check command, as it appears in `exec_start` events
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthCheck(String);

impl HealthCheck {
    /// Reduce a configured test (`["CMD-SHELL", "curl -f localhost"]`) to
    /// its command text
    ///
    /// Returns `None` when there is nothing to run, including `["NONE"]`,
    /// which disables an image's health check.
    #[must_use]
    pub fn from_test(test: &[String]) -> Option<Self> {
        let args = match test.split_first() {
            None => return None,
            Some((first, _)) if first == "NONE" => return None,
            Some((first, rest)) if CHECK_MARKERS.contains(&first.as_str()) => rest,
            Some(_) => test,
        };

        let command = args.join(" ");
        if command.trim().is_empty() {
            None
        } else {
            Some(Self(command))
        }
    }

    /// Command text
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether an exec'd command is a run of this health check
    ///
    /// The runtime may wrap the command (`/bin/sh -c ...`), so only the
    /// tail has to match.
    #[must_use]
    pub fn matches(&self, command: &str) -> bool {
        command.ends_with(&self.0)
    }
}

impl fmt::Display for HealthCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Whether `READY=1` has been delivered
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ReadinessState {
    /// Waiting for the first passing health check
    #[default]
    NotReady,
    /// `READY=1` was delivered; only watchdog pulses follow
    Ready,
}

/// Event-driven health check monitor for one container
pub struct HealthMonitor<N> {
    container: ContainerId,
    check: HealthCheck,
    events: Box<dyn EventStream>,
    notifier: N,
    state: ReadinessState,
    last_exec: Option<String>,
}

impl<N: Notifier> HealthMonitor<N> {
    /// Subscribe to the health check events of container `id`
    ///
    /// Returns `Ok(None)` if the container has no health check.
    ///
    /// # Errors
    /// Returns error if the container cannot be inspected or the event
    /// subscription fails.
    pub async fn create(
        client: &dyn RuntimeClient,
        id: &ContainerId,
        notifier: N,
    ) -> Result<Option<Self>> {
        let info = client.inspect(id.as_str()).await?.ok_or_else(|| Error::Launch {
            message: format!("container {} disappeared", id.short()),
        })?;

        let Some(check) = info.health_check.as_deref().and_then(HealthCheck::from_test) else {
            info!(container = %info.name, "No health check, skipping monitor");
            return Ok(None);
        };

        info!(container = %info.name, check = %check, "Creating health check monitor");

        let events = client
            .events(&EventFilter::new(id.clone(), MONITOR_EVENTS).since(SystemTime::now()))
            .await?;

        Ok(Some(Self::new(id.clone(), check, events, notifier)))
    }

    /// Monitor an already established subscription
    #[must_use]
    pub fn new(
        container: ContainerId,
        check: HealthCheck,
        events: Box<dyn EventStream>,
        notifier: N,
    ) -> Self {
        Self {
            container,
            check,
            events,
            notifier,
            state: ReadinessState::NotReady,
            last_exec: None,
        }
    }

    /// Current readiness
    #[must_use]
    pub const fn state(&self) -> ReadinessState {
        self.state
    }

    /// Process events until the container stops
    ///
    /// The subscription is closed exactly once, however the loop ends.
    ///
    /// # Errors
    /// Returns [`Error::EventStreamClosed`] if the subscription ends before
    /// the container stops.
    pub async fn run(mut self) -> Result<ReadinessState> {
        info!(id = %self.container.short(), "Starting health check monitor");

        let outcome = self.event_loop().await;

        debug!(id = %self.container.short(), "Closing health check monitor");
        if let Err(e) = self.events.close().await {
            warn!(error = %e, "Failed to close health check subscription");
        }

        outcome.map(|()| self.state)
    }

    async fn event_loop(&mut self) -> Result<()> {
        loop {
            let event = self.events.recv().await.ok_or(Error::EventStreamClosed)?;
            if !self.handle(event).await {
                return Ok(());
            }
        }
    }

    /// Returns `false` once the container stopped
    async fn handle(&mut self, event: RuntimeEvent) -> bool {
        match event {
            RuntimeEvent::HealthStatus {
                status: HealthStatus::Healthy,
            } => self.passed().await,
            RuntimeEvent::Stopped { action } => {
                info!(
                    id = %self.container.short(),
                    action = %action,
                    "Container stopped, ending health check monitor"
                );
                return false;
            }
            RuntimeEvent::ExecStart { exec_id, command }
                if !exec_id.is_empty() && self.check.matches(&command) =>
            {
                self.last_exec = Some(exec_id);
            }
            RuntimeEvent::ExecDie { exec_id, exit_code }
                if self.last_exec.as_deref() == Some(exec_id.as_str()) =>
            {
                if exit_code == Some(0) {
                    self.passed().await;
                } else {
                    debug!(exec_id = %exec_id, exit_code, "Health check failed, skipping notify");
                }
            }
            _ => {}
        }
        true
    }

    async fn passed(&mut self) {
        if let Err(e) = self.notify_ready().await {
            error!(error = %e, "Failed to signal that the container is healthy");
        }
    }

    /// First success sends `READY=1`, later ones `WATCHDOG=1`
    ///
    /// A failed `READY=1` leaves the state unchanged so the next passing
    /// check retries. A failed watchdog pulse never regresses the state.
    async fn notify_ready(&mut self) -> Result<()> {
        match self.state {
            ReadinessState::NotReady => {
                self.notifier.notify(Message::Ready).await?;
                self.state = ReadinessState::Ready;
                info!(id = %self.container.short(), "Signaled that the container is healthy");
            }
            ReadinessState::Ready => {
                if let Err(e) = self.notifier.notify(Message::Watchdog).await {
                    warn!(error = %e, "Failed to send watchdog pulse");
                } else {
                    debug!(id = %self.container.short(), "Signaled watchdog");
                }
            }
        }
        Ok(())
    }
}

impl<N> fmt::Debug for HealthMonitor<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HealthMonitor")
            .field("container", &self.container)
            .field("check", &self.check)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}
