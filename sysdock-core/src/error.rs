//! Error types for sysdock

use std::path::PathBuf;

use thiserror::Error;

/// Sysdock error types
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A membership or procs-list file could not be read or written
    #[error("cgroup I/O error on {}: {source}", path.display())]
    CgroupIo {
        /// File that failed
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// The workload died before the MAINPID handoff completed
    #[error("container '{name}' exited before the supervisor could be notified")]
    ProcessExitedBeforeNotify {
        /// Container name
        name: String,
    },

    /// The container never reached a running state with a valid pid
    #[error("failed to launch container: {message}")]
    Launch {
        /// Error message
        message: String,
    },

    /// The runtime event subscription terminated unexpectedly
    #[error("event listener closed")]
    EventStreamClosed,

    /// A container runtime command failed
    #[error("'{command}' failed: {message}")]
    Runtime {
        /// Command line that was run
        command: String,
        /// Error message
        message: String,
    },

    /// Malformed runtime output
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid configuration
    #[error("Invalid configuration: {message}")]
    InvalidConfig {
        /// Error message
        message: String,
    },
}

impl Error {
    /// Build a [`Error::CgroupIo`] for `path`
    pub fn cgroup_io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::CgroupIo {
            path: path.into(),
            source,
        }
    }
}

/// Result type alias for sysdock operations
pub type Result<T> = std::result::Result<T, Error>;
