//! Readiness notification for a supervised container
//!
//! Implements the subset of the service manager notification protocol a
//! container workload needs:
//! - `MAINPID=<pid>` hands ownership of the container process to the
//!   supervisor ([`NotifySocket::handoff`])
//! - `READY=1` once the container is healthy
//! - `WATCHDOG=1` on every later successful health check
//!
//! [`HealthMonitor`] derives the last two from the runtime's health check
//! events; [`announce`] ties everything together.

#![warn(missing_docs, clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(
    clippy::module_name_repetitions,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod announce;
pub mod channel;
pub mod monitor;

pub use announce::announce;
pub use channel::{Message, Notifier, NotifySocket, RecordingNotifier};
pub use monitor::{HealthCheck, HealthMonitor, MONITOR_EVENTS, ReadinessState};

/// Environment variable carrying the supervisor's socket path
pub const NOTIFY_SOCKET_ENV: &str = "NOTIFY_SOCKET";
