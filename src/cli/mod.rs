//! Command-line interface definitions for the `quayside` binary.
//!
//! This module centralises the clap parser structures so both the main binary
//! and the build script can reuse them when generating the manual page.

use clap::Parser;

/// Top-level CLI for the `quayside` binary.
#[derive(Debug, Parser)]
#[command(
    name = "quayside",
    about = "Run a build slave in a throwaway docker container",
    arg_required_else_help = true
)]
pub(crate) enum Cli {
    /// Start a slave container and stop it again on Ctrl-C.
    #[command(name = "up", about = "Start a slave container and stop it again on Ctrl-C")]
    Up(UpCommand),
    /// Validate configuration and print the resolved mount table.
    #[command(name = "check", about = "Validate configuration and print the mount table")]
    Check,
}

/// Arguments for the `quayside up` subcommand.
#[derive(Debug, Parser)]
pub(crate) struct UpCommand {
    /// Remove the container without waiting for it to exit.
    #[arg(long)]
    pub(crate) fast: bool,
    /// Build number recorded in log context.
    #[arg(long, value_name = "N")]
    pub(crate) build_number: Option<u64>,
    /// Builder name recorded in log context.
    #[arg(long, value_name = "NAME", default_value = "manual")]
    pub(crate) builder: String,
}
