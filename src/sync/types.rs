//! Core sync types and command runner abstractions.

use std::ffi::OsString;
use std::io::{self, Read, Write};
use std::process::{Command, Stdio};
use std::thread;

use camino::Utf8PathBuf;

use crate::sync::SyncError;

/// Network coordinates of the target device.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DeviceEndpoint {
    /// Hostname or IP address the SSH client connects to.
    pub host: String,
    /// Port the device's sshd listens on.
    pub ssh_port: u16,
}

/// Target for rsync either on the device or locally (used for tests).
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum SyncDestination {
    /// Remote sync target.
    Remote {
        /// User used to authenticate via SSH.
        user: String,
        /// Hostname or IP address.
        host: String,
        /// SSH port exposed by the device.
        port: u16,
        /// Path on the device that receives files.
        path: Utf8PathBuf,
    },
    /// Local path used for behavioural tests and dry-runs.
    Local {
        /// Destination path for the synchronised content.
        path: Utf8PathBuf,
    },
}

/// Result of running an external command.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CommandOutput {
    /// Exit code reported by the process, if available.
    pub code: Option<i32>,
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
}

impl CommandOutput {
    /// Returns `true` when the exit code equals zero.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self.code, Some(0))
    }
}

/// Output captured from a remote command executed over SSH.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RemoteCommandOutput {
    /// Exit code reported by the remote command, when the transport yields one.
    pub exit_code: Option<i32>,
    /// Captured standard output stream.
    pub stdout: String,
    /// Captured standard error stream.
    pub stderr: String,
}

/// Abstraction over command execution to support fakes in tests.
pub trait CommandRunner {
    /// Runs `program` with the given arguments, capturing stdout and stderr.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Spawn`] if the command cannot be started.
    fn run(&self, program: &str, args: &[OsString]) -> Result<CommandOutput, SyncError>;
}

/// Real command runner that shells out to the host operating system.
#[derive(Clone, Debug, Default)]
pub struct ProcessCommandRunner;

impl CommandRunner for ProcessCommandRunner {
    fn run(&self, program: &str, args: &[OsString]) -> Result<CommandOutput, SyncError> {
        let output = Command::new(program)
            .args(args)
            .output()
            .map_err(|err| SyncError::Spawn {
                program: program.to_owned(),
                message: err.to_string(),
            })?;

        Ok(CommandOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Command runner that forwards child output to the parent's streams while
/// also capturing it.
///
/// rsync progress lines and remote test output stay visible live, and the
/// captured copy remains available for error reporting afterwards. The two
/// forwarding threads live only for the duration of one child process and are
/// joined before the runner returns.
#[derive(Clone, Debug, Default)]
pub struct StreamingCommandRunner;

impl CommandRunner for StreamingCommandRunner {
    fn run(&self, program: &str, args: &[OsString]) -> Result<CommandOutput, SyncError> {
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::inherit())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|err| spawn_error(program, &err.to_string()))?;

        let stdout_pipe = child
            .stdout
            .take()
            .ok_or_else(|| spawn_error(program, "child stdout was not captured"))?;
        let stderr_pipe = child
            .stderr
            .take()
            .ok_or_else(|| spawn_error(program, "child stderr was not captured"))?;

        let stdout_forwarder = thread::spawn(move || forward(stdout_pipe, io::stdout()));
        let stderr_forwarder = thread::spawn(move || forward(stderr_pipe, io::stderr()));

        let status = child
            .wait()
            .map_err(|err| spawn_error(program, &err.to_string()))?;
        let stdout = join_forwarder(stdout_forwarder, program)?;
        let stderr = join_forwarder(stderr_forwarder, program)?;

        Ok(CommandOutput {
            code: status.code(),
            stdout: String::from_utf8_lossy(&stdout).into_owned(),
            stderr: String::from_utf8_lossy(&stderr).into_owned(),
        })
    }
}

fn spawn_error(program: &str, message: &str) -> SyncError {
    SyncError::Spawn {
        program: program.to_owned(),
        message: message.to_owned(),
    }
}

/// Writer that duplicates everything into an in-memory buffer.
struct Tee<W: Write> {
    sink: W,
    captured: Vec<u8>,
}

impl<W: Write> Write for Tee<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.sink.write_all(buf)?;
        self.sink.flush()?;
        self.captured.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.sink.flush()
    }
}

fn forward(mut source: impl Read, sink: impl Write) -> io::Result<Vec<u8>> {
    let mut tee = Tee {
        sink,
        captured: Vec::new(),
    };
    io::copy(&mut source, &mut tee)?;
    Ok(tee.captured)
}

fn join_forwarder(
    handle: thread::JoinHandle<io::Result<Vec<u8>>>,
    program: &str,
) -> Result<Vec<u8>, SyncError> {
    handle
        .join()
        .map_err(|_| spawn_error(program, "output forwarding thread panicked"))?
        .map_err(|err| spawn_error(program, &err.to_string()))
}
