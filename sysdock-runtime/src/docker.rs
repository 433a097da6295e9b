//! Docker CLI backend

use std::process::{ExitStatus, Stdio};
use std::time::UNIX_EPOCH;

use async_trait::async_trait;
use serde::Deserialize;
use sysdock_core::{ContainerId, Error, ProcessId, Result};
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tracing::{debug, info};

use crate::client::{ContainerInfo, EventFilter, RuntimeClient};
use crate::events::{DockerEvents, EventStream};

/// Binary used when `DOCKER_COMMAND` is not set
pub const DEFAULT_DOCKER_COMMAND: &str = "docker";

/// Runtime backend that shells out to the docker CLI
///
/// The daemon endpoint is whatever the CLI resolves (`DOCKER_HOST`,
/// contexts); it is not configured here.
#[derive(Debug, Clone)]
pub struct DockerCli {
    program: String,
}

impl DockerCli {
    /// Drive `program` (e.g. `docker`, `podman`)
    #[must_use]
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Use `$DOCKER_COMMAND`, falling back to `docker`
    #[must_use]
    pub fn from_env() -> Self {
        match std::env::var("DOCKER_COMMAND") {
            Ok(program) if !program.is_empty() => Self::new(program),
            _ => Self::new(DEFAULT_DOCKER_COMMAND),
        }
    }

    /// Program being run
    #[must_use]
    pub fn program(&self) -> &str {
        &self.program
    }

    fn command(&self, args: &[&str]) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(args);
        cmd
    }

    fn describe(&self, args: &[&str]) -> String {
        format!("{} {}", self.program, args.join(" "))
    }

    /// Run a command to completion, returning its stdout
    ///
    /// stderr is copied to our own stderr while the command runs.
    async fn run(&self, args: &[&str]) -> Result<String> {
        let command = self.describe(args);
        debug!(command = %command, "Running runtime command");

        let mut child = self
            .command(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| Error::Runtime {
                command: command.clone(),
                message: e.to_string(),
            })?;

        if let Some(mut stderr) = child.stderr.take() {
            tokio::spawn(async move {
                let _ = tokio::io::copy(&mut stderr, &mut tokio::io::stderr()).await;
            });
        }

        let mut stdout = String::new();
        if let Some(mut out) = child.stdout.take() {
            out.read_to_string(&mut stdout).await?;
        }

        let status = child.wait().await?;
        check_status(&command, status)?;

        Ok(stdout)
    }
}

fn check_status(command: &str, status: ExitStatus) -> Result<()> {
    if status.success() {
        return Ok(());
    }

    Err(Error::Runtime {
        command: command.to_string(),
        message: match status.code() {
            Some(code) => format!("exit code {code}"),
            None => "terminated by signal".to_string(),
        },
    })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Inspect {
    id: String,
    #[serde(default)]
    name: String,
    state: InspectState,
    #[serde(default)]
    config: Option<InspectConfig>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InspectState {
    #[serde(default)]
    running: bool,
    #[serde(default)]
    pid: i32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InspectConfig {
    #[serde(default)]
    healthcheck: Option<InspectHealthcheck>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InspectHealthcheck {
    #[serde(default)]
    test: Option<Vec<String>>,
}

impl TryFrom<Inspect> for ContainerInfo {
    type Error = Error;

    fn try_from(raw: Inspect) -> Result<Self> {
        Ok(Self {
            id: ContainerId::new(raw.id)?,
            name: raw.name.trim_start_matches('/').to_string(),
            running: raw.state.running,
            pid: ProcessId::from_raw(raw.state.pid),
            health_check: raw
                .config
                .and_then(|c| c.healthcheck)
                .and_then(|h| h.test)
                .filter(|test| !test.is_empty()),
        })
    }
}

pub(crate) fn parse_inspect(json: &str) -> Result<Option<ContainerInfo>> {
    let mut containers: Vec<Inspect> = serde_json::from_str(json)?;
    if containers.is_empty() {
        return Ok(None);
    }
    ContainerInfo::try_from(containers.swap_remove(0)).map(Some)
}

fn is_not_found(stderr: &str) -> bool {
    stderr.contains("No such container") || stderr.contains("No such object")
}

#[async_trait]
impl RuntimeClient for DockerCli {
    async fn inspect(&self, name_or_id: &str) -> Result<Option<ContainerInfo>> {
        let args = ["inspect", "--type", "container", name_or_id];
        let command = self.describe(&args);

        let output = self
            .command(&args)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| Error::Runtime {
                command: command.clone(),
                message: e.to_string(),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if is_not_found(&stderr) {
                return Ok(None);
            }
            return Err(Error::Runtime {
                command,
                message: stderr.trim().to_string(),
            });
        }

        parse_inspect(&String::from_utf8_lossy(&output.stdout))
    }

    async fn create(&self, args: &[String]) -> Result<ContainerId> {
        let mut full = vec!["create"];
        full.extend(args.iter().map(String::as_str));

        let stdout = self.run(&full).await?;
        let id = ContainerId::new(stdout.as_str()).map_err(|_| Error::Launch {
            message: format!("unexpected output from create: '{}'", stdout.trim()),
        })?;

        info!(id = %id.short(), "Container created");
        Ok(id)
    }

    async fn connect_network(
        &self,
        network: &str,
        ip: Option<&str>,
        id: &ContainerId,
    ) -> Result<()> {
        let mut args = vec!["network", "connect"];
        if let Some(ip) = ip {
            args.extend(["--ip", ip]);
        }
        args.extend([network, id.as_str()]);

        self.run(&args).await?;
        Ok(())
    }

    async fn start(&self, id: &ContainerId) -> Result<()> {
        self.run(&["start", id.as_str()]).await?;
        Ok(())
    }

    async fn remove(&self, id: &ContainerId) -> Result<()> {
        self.run(&["rm", "--force", id.as_str()]).await?;
        Ok(())
    }

    async fn events(&self, filter: &EventFilter) -> Result<Box<dyn EventStream>> {
        let mut args = vec![
            "events".to_string(),
            "--format".to_string(),
            "{{json .}}".to_string(),
            "--filter".to_string(),
            "type=container".to_string(),
            "--filter".to_string(),
            format!("container={}", filter.container),
        ];
        for event in &filter.events {
            args.push("--filter".to_string());
            args.push(format!("event={event}"));
        }
        if let Some(since) = filter.since {
            let secs = since.duration_since(UNIX_EPOCH).unwrap_or_default().as_secs();
            args.push("--since".to_string());
            args.push(secs.to_string());
        }

        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        let command = self.describe(&args);
        debug!(command = %command, "Subscribing to runtime events");

        let child = self
            .command(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::Runtime {
                command,
                message: e.to_string(),
            })?;

        Ok(Box::new(DockerEvents::spawn(child)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const INSPECT: &str = r#"[
        {
            "Id": "4f1c2e9d0a7b4f1c2e9d0a7b4f1c2e9d0a7b4f1c2e9d0a7b4f1c2e9d0a7b4f1c",
            "Name": "/registry",
            "State": {"Status": "running", "Running": true, "Pid": 4242, "ExitCode": 0},
            "Config": {
                "Image": "registry:2",
                "Healthcheck": {"Test": ["CMD-SHELL", "wget -q -O- http://localhost:5000/"], "Interval": 30000000000}
            }
        }
    ]"#;

    #[test]
    fn test_parse_inspect() {
        let info = parse_inspect(INSPECT).unwrap().unwrap();
        assert_eq!(info.name, "registry");
        assert!(info.running);
        assert_eq!(info.pid, ProcessId::from_raw(4242));
        assert_eq!(
            info.health_check,
            Some(vec![
                "CMD-SHELL".to_string(),
                "wget -q -O- http://localhost:5000/".to_string()
            ])
        );
    }

    #[test]
    fn test_parse_inspect_without_healthcheck() {
        let json = r#"[{"Id": "abc123", "Name": "/web", "State": {"Running": false, "Pid": 0}, "Config": {"Image": "nginx"}}]"#;
        let info = parse_inspect(json).unwrap().unwrap();
        assert!(!info.running);
        assert!(!info.pid.is_valid());
        assert_eq!(info.health_check, None);
    }

    #[test]
    fn test_parse_inspect_empty() {
        assert_eq!(parse_inspect("[]").unwrap(), None);
    }

    #[test]
    fn test_not_found_detection() {
        assert!(is_not_found("Error: No such container: web\n"));
        assert!(is_not_found("Error: No such object: web"));
        assert!(!is_not_found("Cannot connect to the Docker daemon"));
    }

    #[test]
    fn test_from_env_default() {
        // DOCKER_COMMAND is not expected to be set under test
        if std::env::var_os("DOCKER_COMMAND").is_none() {
            assert_eq!(DockerCli::from_env().program(), DEFAULT_DOCKER_COMMAND);
        }
    }

    #[tokio::test]
    async fn test_failing_command_is_runtime_error() {
        let cli = DockerCli::new("false");
        let err = cli.start(&ContainerId::new("abc").unwrap()).await.unwrap_err();
        assert!(matches!(err, Error::Runtime { .. }));
    }

    #[tokio::test]
    async fn test_missing_binary_is_runtime_error() {
        let cli = DockerCli::new("/nonexistent/sysdock-docker");
        let err = cli.inspect("web").await.unwrap_err();
        assert!(matches!(err, Error::Runtime { .. }));
    }

    #[tokio::test]
    async fn test_create_reads_id_from_stdout() {
        // `echo create --name web` prints the arguments, which is not an id
        let cli = DockerCli::new("echo");
        let err = cli
            .create(&["--name".to_string(), "web".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Launch { .. }));
    }
}
