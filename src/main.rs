//! Binary entry point for the quayside CLI.

use std::io::{self, Write};
use std::process;

use clap::Parser;
use thiserror::Error;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use quayside::{BuildRequest, ConfigReport, DockerEngine, LatentSlave, SlaveConfig};

mod cli;

use cli::{Cli, UpCommand};

#[derive(Debug, Error)]
enum CliError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error("engine error: {0}")]
    Engine(String),
    #[error("{0}")]
    Slave(String),
    #[error("failed to listen for Ctrl-C: {0}")]
    Signal(String),
}

#[tokio::main]
async fn main() {
    init_tracing();
    let cli = Cli::parse();
    let exit_code = match dispatch(cli).await {
        Ok(code) => code,
        Err(err) => {
            write_error(io::stderr(), &err);
            1
        }
    };

    process::exit(exit_code);
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

async fn dispatch(cli: Cli) -> Result<i32, CliError> {
    let config =
        SlaveConfig::load_without_cli_args().map_err(|err| CliError::Config(err.to_string()))?;
    match cli {
        Cli::Check => Ok(check(&config)),
        Cli::Up(command) => up(&config, command).await,
    }
}

fn check(config: &SlaveConfig) -> i32 {
    let report = config.validate();
    write_report(io::stdout(), &report);
    i32::from(report.has_fatal())
}

async fn up(config: &SlaveConfig, args: UpCommand) -> Result<i32, CliError> {
    let report = config.validate();
    for err in &report.errors {
        warn!(error = %err, "configuration problem");
    }
    if report.has_fatal() {
        return Err(CliError::Config(String::from(
            "refusing to start; run `quayside check` for details",
        )));
    }

    let settings = config
        .settings()
        .map_err(|err| CliError::Config(err.to_string()))?;
    let params = config
        .client_params()
        .map_err(|err| CliError::Config(err.to_string()))?;
    let engine = DockerEngine::new(params).map_err(|err| CliError::Engine(err.to_string()))?;
    let slave = LatentSlave::new(settings, engine);

    let build = BuildRequest {
        builder: args.builder,
        number: args.build_number,
    };
    let record = slave
        .start(&build)
        .map_err(|err| CliError::Slave(err.to_string()))?
        .await
        .map_err(|err| CliError::Slave(err.to_string()))?;
    writeln!(io::stdout(), "instance {} image {}", record.id, record.image).ok();

    let signal = tokio::signal::ctrl_c().await;
    slave
        .stop(args.fast)
        .map_err(|err| CliError::Slave(err.to_string()))?
        .await
        .map_err(|err| CliError::Slave(err.to_string()))?;
    signal.map_err(|err| CliError::Signal(err.to_string()))?;
    Ok(0)
}

fn write_report(mut target: impl Write, report: &ConfigReport) {
    for mount in report.mounts.mounts() {
        writeln!(target, "mount {}", mount.bind_string()).ok();
    }
    for err in &report.errors {
        let level = if err.is_fatal() { "error" } else { "warning" };
        writeln!(target, "{level}: {err}").ok();
    }
}

fn write_error(mut target: impl Write, err: &CliError) {
    writeln!(target, "{err}").ok();
}
