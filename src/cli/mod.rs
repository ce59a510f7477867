//! Command-line interface definitions for the `ferry` binary.
//!
//! This module centralises the clap parser structures so both the main binary
//! and the build script can reuse them when generating the manual page.

use clap::Parser;

/// Top-level CLI for the `ferry` binary.
#[derive(Debug, Parser)]
#[command(
    name = "ferry",
    about = "Mirror your workspace to a Termux device and run commands over SSH",
    arg_required_else_help = true
)]
pub(crate) enum Cli {
    /// Mirror the workspace to the device without running anything.
    #[command(name = "sync", about = "Mirror the workspace to the device")]
    Sync(SyncCommand),
    /// Mirror the workspace, then run the configured test command.
    #[command(name = "test", about = "Sync, then run the configured test command")]
    Test(TestCommand),
    /// Mirror the workspace, then run an arbitrary command.
    #[command(name = "run", about = "Sync, then run a command over SSH")]
    Run(RunCommand),
    /// Record the device host in the configuration file.
    #[command(name = "init", about = "Record the device host in ferry.toml")]
    Init(InitCommand),
}

/// Arguments for the `ferry sync` subcommand.
#[derive(Debug, Parser)]
pub(crate) struct SyncCommand {}

/// Arguments for the `ferry test` subcommand.
#[derive(Debug, Parser)]
pub(crate) struct TestCommand {}

/// Arguments for the `ferry run` subcommand.
#[derive(Debug, Parser)]
pub(crate) struct RunCommand {
    /// Command to execute on the device (use -- to separate flags).
    #[arg(required = true, trailing_var_arg = true)]
    pub(crate) command: Vec<String>,
}

/// Arguments for the `ferry init` subcommand.
#[derive(Debug, Parser)]
pub(crate) struct InitCommand {
    /// Hostname or IP address of the device.
    #[arg(value_name = "HOST")]
    pub(crate) host: String,
    /// Overwrite an existing host in configuration.
    #[arg(long)]
    pub(crate) force: bool,
}
