//! Container runtime events relevant to supervision

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Health status reported by the runtime's own health checker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    /// Probes have not settled yet
    Starting,
    /// Last probes succeeded
    Healthy,
    /// Too many consecutive probes failed
    Unhealthy,
}

impl HealthStatus {
    fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "starting" => Some(Self::Starting),
            "healthy" => Some(Self::Healthy),
            "unhealthy" => Some(Self::Unhealthy),
            _ => None,
        }
    }
}

/// A container event, reduced to what the health monitor and exit wait need
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RuntimeEvent {
    /// `health_status: <status>`
    HealthStatus {
        /// Reported status
        status: HealthStatus,
    },

    /// `exec_start: <command>`
    ExecStart {
        /// Runtime exec id
        exec_id: String,
        /// Command text as reported by the runtime
        command: String,
    },

    /// `exec_die`
    ExecDie {
        /// Runtime exec id
        exec_id: String,
        /// Exit code of the exec'd command, if reported
        exit_code: Option<i32>,
    },

    /// `die` or `stop`: the container is no longer running
    Stopped {
        /// Raw action name
        action: String,
    },

    /// Anything else
    Other {
        /// Raw action name
        action: String,
    },
}

impl RuntimeEvent {
    /// Classify a raw `(action, actor attributes)` pair
    #[must_use]
    pub fn from_action(action: &str, attributes: &HashMap<String, String>) -> Self {
        let exec_id = || attributes.get("execID").cloned().unwrap_or_default();

        if let Some(status) = action.strip_prefix("health_status:") {
            if let Some(status) = HealthStatus::parse(status) {
                return Self::HealthStatus { status };
            }
        } else if let Some(command) = action.strip_prefix("exec_start:") {
            return Self::ExecStart {
                exec_id: exec_id(),
                command: command.trim().to_string(),
            };
        } else if action == "exec_die" {
            return Self::ExecDie {
                exec_id: exec_id(),
                exit_code: attributes
                    .get("exitCode")
                    .and_then(|code| code.trim().parse().ok()),
            };
        } else if action == "die" || action == "stop" {
            return Self::Stopped {
                action: action.to_string(),
            };
        }

        Self::Other {
            action: action.to_string(),
        }
    }

    /// Whether this event means the container has stopped running
    #[must_use]
    pub const fn is_stop(&self) -> bool {
        matches!(self, Self::Stopped { .. })
    }
}

impl fmt::Display for RuntimeEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::HealthStatus { status } => write!(f, "health_status: {status:?}"),
            Self::ExecStart { exec_id, command } => {
                write!(f, "exec_start [{exec_id}]: {command}")
            }
            Self::ExecDie { exec_id, exit_code } => match exit_code {
                Some(code) => write!(f, "exec_die [{exec_id}] exit code {code}"),
                None => write!(f, "exec_die [{exec_id}]"),
            },
            Self::Stopped { action } | Self::Other { action } => f.write_str(action),
        }
    }
}
