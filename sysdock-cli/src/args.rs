//! Translation of the command line into a run configuration
//!
//! The docker flags after `--` are passed to `docker create` mostly as is.
//! A few are taken over by sysdock: `--rm` becomes removal on exit, and
//! `--detach` and `--log-driver` make no sense for a supervised container.

use anyhow::{Context, Result, bail};
use sysdock_core::{CgroupSelection, ContainerName, Networks, RunContext};
use tracing::warn;

use crate::cli::Cli;

/// Docker flags after rewriting
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DockerArgs {
    /// Value of `--name`
    pub name: String,
    /// `--rm` was given (and not `--rm=false`)
    pub remove: bool,
    /// A `--log-opt tag=...` was given
    pub log_tag: bool,
    /// Remaining arguments for `docker create`
    pub args: Vec<String>,
}

/// Flag name and inline value of `-flag`, `--flag` or `--flag=value`
fn split_flag(arg: &str) -> Option<(&str, Option<&str>)> {
    let body = arg.strip_prefix("--").or_else(|| arg.strip_prefix('-'))?;
    Some(match body.split_once('=') {
        Some((flag, value)) => (flag, Some(value)),
        None => (body, None),
    })
}

/// Boolean literals as docker's flag parser accepts them
fn parse_bool(value: &str) -> Option<bool> {
    match value {
        "1" | "t" | "T" | "true" | "TRUE" | "True" => Some(true),
        "0" | "f" | "F" | "false" | "FALSE" | "False" => Some(false),
        _ => None,
    }
}

/// Rewrite the user's docker flags
pub fn rewrite(args: &[String]) -> Result<DockerArgs> {
    let mut name = None;
    let mut remove = false;
    let mut log_tag = false;
    let mut kept = Vec::with_capacity(args.len());
    let mut skip_value = false;

    for (i, arg) in args.iter().enumerate() {
        if std::mem::take(&mut skip_value) {
            continue;
        }
        let next = args.get(i + 1).map(String::as_str);

        match split_flag(arg) {
            Some(("rm", value)) => {
                remove = match value {
                    None => true,
                    Some(v) => parse_bool(v)
                        .with_context(|| format!("invalid value '{v}' for docker flag 'rm'"))?,
                };
                continue;
            }
            Some(("d" | "detach", None)) => {
                warn!("docker flag 'detach' is ignored");
                continue;
            }
            Some(("log-driver", value)) => {
                warn!("docker flag 'log-driver' is ignored");
                skip_value = value.is_none();
                continue;
            }
            Some(("name", value)) => {
                name = value.or(next).map(str::to_string);
            }
            Some(("log-opt", value)) => {
                if value.or(next).is_some_and(|v| v.starts_with("tag=")) {
                    log_tag = true;
                }
            }
            _ => {}
        }

        kept.push(arg.clone());
    }

    let Some(name) = name.filter(|n| !n.is_empty()) else {
        bail!("required docker flag 'name' is not set");
    };

    Ok(DockerArgs {
        name,
        remove,
        log_tag,
        args: kept,
    })
}

/// Arguments sysdock adds in front of the user's flags
pub fn auto_args<I>(cli: &Cli, docker: &DockerArgs, environment: I) -> Vec<String>
where
    I: IntoIterator<Item = (String, String)>,
{
    let mut auto = Vec::new();

    if cli.logs {
        auto.extend(["--log-driver".to_string(), "journald".to_string()]);
        if !docker.log_tag {
            auto.extend(["--log-opt".to_string(), format!("tag={}", docker.name)]);
        }
    }

    if cli.notify {
        match cli.notify_socket.as_deref().filter(|s| !s.is_empty()) {
            Some(socket) => {
                auto.extend(["-e".to_string(), format!("NOTIFY_SOCKET={socket}")]);
                // Abstract sockets are reachable through the network namespace, not a mount
                if !socket.starts_with('@') {
                    auto.extend(["-v".to_string(), format!("{socket}:{socket}")]);
                }
            }
            None => warn!("No NOTIFY_SOCKET found, 'notify' flag will have no effect"),
        }
    }

    if cli.env {
        for (key, value) in environment {
            if key != "HOME" && key != "PATH" {
                auto.extend(["-e".to_string(), format!("{key}={value}")]);
            }
        }
    }

    auto
}

/// Build the immutable run configuration
pub fn build_context<I>(cli: &Cli, environment: I) -> Result<RunContext>
where
    I: IntoIterator<Item = (String, String)>,
{
    let docker = rewrite(&cli.docker_args)?;
    let name = ContainerName::new(docker.name.as_str())
        .with_context(|| format!("invalid container name '{}'", docker.name))?;

    let mut networks = Networks::default();
    for value in &cli.networks {
        networks.add(value)?;
    }

    let mut create_args = auto_args(cli, &docker, environment);
    create_args.extend(docker.args.iter().cloned());

    Ok(RunContext::new(name)
        .with_create_args(create_args)
        .with_cgroups(CgroupSelection::from_names(&cli.cgroups))
        .with_unified_hierarchy(cli.unified_hierarchy)
        .with_notify_socket(cli.notify_socket.clone())
        .with_delegate_notify(cli.notify)
        .with_remove_on_exit(docker.remove)
        .with_networks(networks)
        .with_pid_file(cli.pid_file.clone()))
}
