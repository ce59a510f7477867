//! Binary entry point for the Ferry CLI.

use std::env;
use std::io::{self, Write};
use std::process;

use camino::Utf8PathBuf;
use clap::Parser;
use shell_escape::unix::escape;
use thiserror::Error;

use ferry::{
    ConfigStore, ConfigWriter, DeployError, DeployOrchestrator, StreamingCommandRunner,
    SyncConfig, SyncError, Syncer,
};

mod cli;

use cli::{Cli, InitCommand, RunCommand, SyncCommand, TestCommand};

#[derive(Debug, Error)]
enum CliError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error("sync error: {0}")]
    Sync(String),
    #[error(
        "no test_command configured: set FERRY_SYNC_TEST_COMMAND or add test_command to [sync] in ferry.toml"
    )]
    MissingTestCommand,
    #[error("remote command terminated without an exit status")]
    MissingExitCode,
    #[error("deploy failed: {0}")]
    Deploy(#[from] DeployError),
    #[error("init failed: {0}")]
    Init(String),
    #[error("invalid command argument: {0}")]
    InvalidCommand(String),
}

fn main() {
    let cli = Cli::parse();
    let exit_code = match dispatch(cli) {
        Ok(code) => code,
        Err(err) => {
            report_error(&err);
            1
        }
    };

    process::exit(exit_code);
}

fn dispatch(cli: Cli) -> Result<i32, CliError> {
    match cli {
        Cli::Sync(command) => sync_command(&command),
        Cli::Test(command) => test_command(&command),
        Cli::Run(command) => run_command(&command),
        Cli::Init(command) => init_command(&command),
    }
}

fn sync_command(_args: &SyncCommand) -> Result<i32, CliError> {
    if let Some(err) = prefail_from_env() {
        return Err(err);
    }

    let orchestrator = build_orchestrator()?;
    let source = resolve_source(orchestrator.syncer().config())?;
    let device = orchestrator.syncer().config().device_endpoint();
    orchestrator.sync(&source, &device)?;
    Ok(0)
}

fn test_command(_args: &TestCommand) -> Result<i32, CliError> {
    if let Some(result) = fake_run_from_env() {
        return result;
    }

    if let Some(err) = prefail_from_env() {
        return Err(err);
    }

    let orchestrator = build_orchestrator()?;
    let remote_command = orchestrator
        .syncer()
        .config()
        .test_command
        .clone()
        .ok_or(CliError::MissingTestCommand)?;
    deploy_with(&orchestrator, &remote_command)
}

fn run_command(args: &RunCommand) -> Result<i32, CliError> {
    if let Some(result) = fake_run_from_env() {
        return result;
    }

    if let Some(err) = prefail_from_env() {
        return Err(err);
    }

    validate_command_args(&args.command)?;
    let remote_command = render_remote_command(&args.command);
    let orchestrator = build_orchestrator()?;
    deploy_with(&orchestrator, &remote_command)
}

fn init_command(args: &InitCommand) -> Result<i32, CliError> {
    let store = ConfigStore::new();
    let path = store
        .write_remote_host(&args.host, args.force)
        .map_err(|err| CliError::Init(err.to_string()))?;
    writeln!(io::stdout(), "recorded remote host {} in {path}", args.host).ok();
    Ok(0)
}

fn build_orchestrator() -> Result<DeployOrchestrator<StreamingCommandRunner>, CliError> {
    let config =
        SyncConfig::load_without_cli_args().map_err(|err| CliError::Config(err.to_string()))?;
    let syncer = Syncer::new(config, StreamingCommandRunner)
        .map_err(|err| CliError::Sync(err.to_string()))?;
    Ok(DeployOrchestrator::new(syncer))
}

fn resolve_source(config: &SyncConfig) -> Result<Utf8PathBuf, CliError> {
    let cwd_raw = env::current_dir().map_err(|err| CliError::Config(err.to_string()))?;
    let cwd = Utf8PathBuf::from_path_buf(cwd_raw)
        .map_err(|path| CliError::Config(path.display().to_string()))?;
    Ok(config.source_dir_or(&cwd))
}

fn deploy_with(
    orchestrator: &DeployOrchestrator<StreamingCommandRunner>,
    remote_command: &str,
) -> Result<i32, CliError> {
    let source = resolve_source(orchestrator.syncer().config())?;
    let device = orchestrator.syncer().config().device_endpoint();
    let output = orchestrator.execute(&source, &device, remote_command)?;
    output.exit_code.ok_or(CliError::MissingExitCode)
}

fn render_remote_command(args: &[String]) -> String {
    let mut result = String::new();
    let mut first = true;

    for arg in args {
        if first {
            first = false;
        } else {
            result.push(' ');
        }

        let escaped = escape(arg.as_str().into());
        result.push_str(escaped.as_ref());
    }

    result
}

fn validate_command_args(args: &[String]) -> Result<(), CliError> {
    for arg in args {
        if arg
            .chars()
            .any(|ch| matches!(ch, '\n' | '\r' | '\u{0000}'..='\u{001F}' | '\u{007F}'))
        {
            return Err(CliError::InvalidCommand(String::from(concat!(
                "command arguments must not contain control characters (ASCII ",
                "0x00-0x1F or 0x7F, e.g. newline, carriage return, tab, NUL)"
            ))));
        }
    }
    Ok(())
}

fn report_error(err: &CliError) {
    write_error(io::stderr(), err);
}

fn write_error(mut target: impl Write, err: &CliError) {
    writeln!(target, "{err}").ok();
}

fn fake_run_from_env() -> Option<Result<i32, CliError>> {
    let mode = env::var("FERRY_FAKE_RUN_MODE").ok()?;
    match mode.as_str() {
        "exit-0" => {
            writeln!(io::stdout(), "fake-stdout").ok();
            writeln!(io::stderr(), "fake-stderr").ok();
            Some(Ok(0))
        }
        "exit-7" => {
            writeln!(io::stdout(), "fake-stdout").ok();
            writeln!(io::stderr(), "fake-stderr").ok();
            Some(Ok(7))
        }
        "missing-exit" => {
            writeln!(io::stdout(), "fake-stdout").ok();
            writeln!(io::stderr(), "fake-stderr").ok();
            Some(Err(CliError::MissingExitCode))
        }
        _ => None,
    }
}

fn prefail_from_env() -> Option<CliError> {
    let mode = env::var("FERRY_FAKE_RUN_PREFAIL").ok()?;
    match mode.as_str() {
        "config" => Some(CliError::Config(String::from("fake"))),
        "sync" => Some(CliError::Sync(String::from("fake"))),
        "deploy" => Some(CliError::Deploy(DeployError::Sync {
            source: SyncError::Spawn {
                program: String::from("rsync"),
                message: String::from("fake"),
            },
        })),
        _ => None,
    }
}
