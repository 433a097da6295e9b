//! Datagram channel to the supervisor

use std::fmt;
use std::os::linux::net::SocketAddrExt;
use std::sync::Arc;

use async_trait::async_trait;
use sysdock_cgroup::ProcFs;
use sysdock_core::{ContainerName, Error, ProcessId, Result, RunContext};
use tokio::net::UnixDatagram;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// A notification payload, sent as one datagram
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Message {
    /// `MAINPID=<pid>`
    MainPid(ProcessId),
    /// `READY=1`
    Ready,
    /// `WATCHDOG=1`
    Watchdog,
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MainPid(pid) => write!(f, "MAINPID={pid}"),
            Self::Ready => f.write_str("READY=1"),
            Self::Watchdog => f.write_str("WATCHDOG=1"),
        }
    }
}

/// Destination for readiness and watchdog messages
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver one message
    async fn notify(&self, message: Message) -> Result<()>;
}

/// The supervisor's notification socket
///
/// A path starting with `@` names a socket in the abstract namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotifySocket {
    path: String,
}

impl NotifySocket {
    /// Socket at `path`
    #[must_use]
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }

    /// Socket configured for this run, if any
    #[must_use]
    pub fn from_context(ctx: &RunContext) -> Option<Self> {
        ctx.notify_socket.as_deref().map(Self::new)
    }

    /// Socket path as given
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    fn connect(&self) -> Result<UnixDatagram> {
        let socket = if let Some(name) = self.path.strip_prefix('@') {
            let addr = std::os::unix::net::SocketAddr::from_abstract_name(name.as_bytes())?;
            let socket = std::os::unix::net::UnixDatagram::unbound()?;
            socket.connect_addr(&addr)?;
            socket.set_nonblocking(true)?;
            UnixDatagram::from_std(socket)?
        } else {
            let socket = UnixDatagram::unbound()?;
            socket.connect(&self.path)?;
            socket
        };
        Ok(socket)
    }

    async fn send_on(socket: &UnixDatagram, message: Message) -> Result<()> {
        debug!(%message, "Notifying supervisor");
        socket.send(message.to_string().as_bytes()).await?;
        Ok(())
    }

    /// Tell the supervisor that `pid` is the main process of this service
    ///
    /// Liveness is checked before connecting and again right after the
    /// send. If the process died in between, `MAINPID` is pointed back at
    /// us so the supervisor is never left tracking a dead pid.
    ///
    /// # Errors
    /// Returns [`Error::ProcessExitedBeforeNotify`] if the process is gone
    /// before or right after the handoff, or a socket error.
    pub async fn handoff(
        &self,
        procfs: &ProcFs,
        name: &ContainerName,
        pid: ProcessId,
    ) -> Result<()> {
        self.handoff_checked(name, pid, |p| procfs.is_alive(p)).await
    }

    async fn handoff_checked(
        &self,
        name: &ContainerName,
        pid: ProcessId,
        is_alive: impl Fn(ProcessId) -> bool + Send + Sync,
    ) -> Result<()> {
        let exited = || Error::ProcessExitedBeforeNotify {
            name: name.to_string(),
        };

        if !is_alive(pid) {
            return Err(exited());
        }

        let socket = self.connect()?;
        Self::send_on(&socket, Message::MainPid(pid)).await?;

        if !is_alive(pid) {
            let own = ProcessId::current();
            warn!(pid = %pid, own = %own, "Container exited during handoff, reclaiming MAINPID");
            Self::send_on(&socket, Message::MainPid(own)).await?;
            return Err(exited());
        }

        Ok(())
    }
}

#[async_trait]
impl Notifier for NotifySocket {
    async fn notify(&self, message: Message) -> Result<()> {
        let socket = self.connect()?;
        Self::send_on(&socket, message).await
    }
}

/// Notifier double that records messages instead of sending them
///
/// Clones share the same record.
#[derive(Debug, Clone, Default)]
pub struct RecordingNotifier {
    state: Arc<Mutex<Recording>>,
}

#[derive(Debug, Default)]
struct Recording {
    sent: Vec<Message>,
    failures: usize,
}

impl RecordingNotifier {
    /// Create an empty recorder
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `count` sends
    pub async fn fail_next(&self, count: usize) {
        self.state.lock().await.failures = count;
    }

    /// Messages delivered so far
    pub async fn sent(&self) -> Vec<Message> {
        self.state.lock().await.sent.clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, message: Message) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.failures > 0 {
            state.failures -= 1;
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "supervisor socket unavailable",
            )));
        }
        state.sent.push(message);
        Ok(())
    }
}
