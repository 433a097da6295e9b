//! Sysdock Core - shared types, errors and run configuration
//!
//! This crate provides the abstractions used by every other sysdock crate.

#![warn(missing_docs, clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod context;
pub mod error;
pub mod events;
pub mod types;

pub use context::{CgroupSelection, Networks, Resolved, RunContext};
pub use error::{Error, Result};
pub use events::{HealthStatus, RuntimeEvent};
pub use types::{ContainerId, ContainerName, ProcessId};
