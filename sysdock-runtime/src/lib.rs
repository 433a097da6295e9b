//! Container runtime collaborators
//!
//! This crate hides the container runtime behind the [`RuntimeClient`] and
//! [`EventStream`] traits:
//! - [`DockerCli`] - production backend driving the `docker` binary
//! - [`MockRuntime`] / [`ScriptedEvents`] - in-memory doubles for tests
//!
//! On top of them it implements container resolution ([`Orchestrator`]) and
//! waiting for the container to exit.

#![warn(missing_docs, clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(
    clippy::module_name_repetitions,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod client;
pub mod docker;
pub mod events;
pub mod lifecycle;
pub mod mock;
pub mod wait;

pub use client::{ContainerInfo, EventFilter, RuntimeClient};
pub use docker::DockerCli;
pub use events::{DockerEvents, EventStream, ScriptedEvents};
pub use lifecycle::Orchestrator;
pub use mock::{Call, MockRuntime};
pub use wait::wait_for_exit;
