//! CLI argument definitions

use std::path::PathBuf;

use clap::{ArgAction, Parser, ValueEnum};

#[derive(Parser, Debug)]
#[command(name = "sysdock")]
#[command(about = "Run docker containers as systemd services", long_about = None)]
#[command(version)]
#[command(after_help = "Example:\n  sysdock --pid-file=/run/registry.pid --networks backend,metrics:192.168.98.4 -- \\\n    --name registry --publish 5000:5000 registry:2")]
pub struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Where log lines go
    #[arg(long, value_enum, default_value_t = LogFormat::Auto)]
    pub log_format: LogFormat,

    /// Path to write the container pid to
    #[arg(short, long, value_name = "PATH")]
    pub pid_file: Option<PathBuf>,

    /// Send container output to journald
    #[arg(
        short,
        long,
        action = ArgAction::Set,
        default_value_t = true,
        num_args = 0..=1,
        default_missing_value = "true"
    )]
    pub logs: bool,

    /// Let the container send READY=1 itself
    #[arg(short, long)]
    pub notify: bool,

    /// Pass our environment on to the container
    #[arg(short, long)]
    pub env: bool,

    /// Cgroup controllers to take ownership of, or 'all'
    #[arg(short, long, value_delimiter = ',', value_name = "CONTROLLER")]
    pub cgroups: Vec<String>,

    /// Also take over the cgroup v2 hierarchy of a hybrid host
    #[arg(long)]
    pub unified_hierarchy: bool,

    /// Networks to join, NAME[:IP]
    #[arg(long, value_name = "NAME[:IP]")]
    pub networks: Vec<String>,

    /// Docker binary to run
    #[arg(long, env = "DOCKER_COMMAND", default_value = "docker")]
    pub docker_command: String,

    /// Supervisor notification socket
    #[arg(long, env = "NOTIFY_SOCKET", hide = true)]
    pub notify_socket: Option<String>,

    /// Flags for 'docker create', followed by the image and its command
    #[arg(last = true, required = true, value_name = "DOCKER FLAGS")]
    pub docker_args: Vec<String>,
}

/// Log output selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// journald when started by systemd, text otherwise
    Auto,
    /// Plain text on stderr
    Text,
    /// Native journald protocol
    Journald,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_defaults() {
        let cli = Cli::try_parse_from(["sysdock", "--", "--name", "web", "nginx"]).unwrap();
        assert!(cli.logs);
        assert!(!cli.notify);
        assert!(cli.cgroups.is_empty());
        assert_eq!(cli.log_format, LogFormat::Auto);
        assert_eq!(cli.docker_args, vec!["--name", "web", "nginx"]);
    }

    #[test]
    fn test_logs_flag_forms() {
        let off = Cli::try_parse_from(["sysdock", "--logs=false", "--", "nginx"]).unwrap();
        assert!(!off.logs);

        let bare = Cli::try_parse_from(["sysdock", "-l", "--", "nginx"]).unwrap();
        assert!(bare.logs);
    }

    #[test]
    fn test_repeated_and_delimited_lists() {
        let cli = Cli::try_parse_from([
            "sysdock",
            "-c",
            "cpu,memory",
            "--cgroups",
            "pids",
            "--networks",
            "backend:10.0.0.5",
            "--",
            "nginx",
        ])
        .unwrap();
        assert_eq!(cli.cgroups, vec!["cpu", "memory", "pids"]);
        assert_eq!(cli.networks, vec!["backend:10.0.0.5"]);
    }
}
