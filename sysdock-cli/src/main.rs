//! sysdock
//!
//! Runs a docker container so that systemd supervises the container's own
//! processes instead of the docker client.

use clap::Parser;
use std::process;

mod args;
mod cli;
mod logging;
mod run;

use cli::Cli;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    logging::init(cli.log_format, cli.verbose);

    if let Err(e) = run::execute(cli).await {
        tracing::error!("{e:#}");
        process::exit(1);
    }
}
