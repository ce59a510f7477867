//! Synchronisation configuration structures and validation.
//!
//! This module defines [`SyncConfig`] for SSH and rsync settings, along with
//! associated error types. Configuration is loaded via `ortho-config` which
//! merges defaults, configuration files, and environment variables.

use camino::{Utf8Path, Utf8PathBuf};
use ortho_config::OrthoConfig;
use serde::Deserialize;
use thiserror::Error;

use super::types::{DeviceEndpoint, SyncDestination};
use super::util::expand_tilde;

/// Default remote working directory, resolved against the remote home.
pub const DEFAULT_REMOTE_PATH: &str = "project";

/// Default SSH port (the Termux sshd listens here out of the box).
pub const DEFAULT_SSH_PORT: u16 = 8022;

/// Paths never transferred to the device, and removed there when present.
pub const DEFAULT_EXCLUDES: &[&str] = &[".venv/", ".git/", ".vscode/"];

fn default_excludes() -> Vec<String> {
    DEFAULT_EXCLUDES.iter().map(|p| (*p).to_owned()).collect()
}

/// Synchronisation and SSH settings loaded via `ortho-config`.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(
    prefix = "FERRY_SYNC",
    discovery(
        app_name = "ferry",
        env_var = "FERRY_CONFIG_PATH",
        config_file_name = "ferry.toml",
        dotfile_name = ".ferry.toml",
        project_file_name = "ferry.toml"
    )
)]
#[expect(
    clippy::struct_excessive_bools,
    reason = "configuration struct with user-facing toggle settings that are naturally expressed as booleans"
)]
pub struct SyncConfig {
    /// Path to the `rsync` executable.
    #[ortho_config(default = "rsync".to_owned())]
    pub rsync_bin: String,
    /// Path to the `ssh` executable.
    #[ortho_config(default = "ssh".to_owned())]
    pub ssh_bin: String,
    /// Remote user to connect as. The Termux sshd accepts any name, so the
    /// default only needs to be non-empty.
    #[ortho_config(default = "termux".to_owned())]
    pub ssh_user: String,
    /// Hostname or IP address of the device. Required; `ferry init` records
    /// it.
    pub remote_host: String,
    /// Port the device's sshd listens on, used for both sync and remote
    /// execution.
    #[ortho_config(default = DEFAULT_SSH_PORT)]
    pub ssh_port: u16,
    /// Remote path that receives the workspace contents.
    #[ortho_config(default = DEFAULT_REMOTE_PATH.to_owned())]
    pub remote_path: String,
    /// Local directory to mirror. Supports tilde expansion; when not
    /// provided, the invoking working directory is used.
    pub source_dir: Option<String>,
    /// Path patterns that are never transferred, even when already present
    /// on the device from an earlier run.
    #[ortho_config(default = default_excludes())]
    pub excludes: Vec<String>,
    /// Command `ferry test` executes in the remote path after sync.
    pub test_command: Option<String>,
    /// Path to the SSH private key file for remote authentication. Supports
    /// tilde expansion (`~/.ssh/id_ed25519`). Optional; when not provided,
    /// SSH falls back to default key locations. Validation rejects empty or
    /// whitespace-only values.
    pub ssh_identity_file: Option<String>,
    /// Whether to force batch mode for SSH to avoid password prompts.
    #[ortho_config(default = true)]
    pub ssh_batch_mode: bool,
    /// Whether to enforce host key checking. The device is persistent, so
    /// the ambient known_hosts semantics stay on by default.
    #[ortho_config(default = true)]
    pub ssh_strict_host_key_checking: bool,
    /// Known hosts file override; empty means no override.
    #[ortho_config(default = String::new())]
    pub ssh_known_hosts_file: String,
    /// Whether to allocate a pseudo-terminal for the remote command so
    /// progress bars and colored test output render.
    #[ortho_config(default = true)]
    pub ssh_force_tty: bool,
}

/// Errors raised when loading the sync configuration from layered sources.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum SyncConfigLoadError {
    /// Indicates that parsing or merging configuration layers failed.
    #[error("sync configuration parsing failed: {0}")]
    Parse(String),
}

impl SyncConfig {
    /// Ensures configuration values are present after trimming whitespace.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::InvalidConfig`] when any required field is empty.
    pub fn validate(&self) -> Result<(), SyncError> {
        Self::require_value(&self.rsync_bin, "rsync_bin")?;
        Self::require_value(&self.ssh_bin, "ssh_bin")?;
        Self::require_value(&self.ssh_user, "ssh_user")?;
        Self::require_value(&self.remote_host, "remote_host")?;
        Self::require_value(&self.remote_path, "remote_path")?;
        Self::require_optional_value(self.source_dir.as_deref(), "source_dir")?;
        Self::require_optional_value(self.test_command.as_deref(), "test_command")?;
        Self::require_optional_value(self.ssh_identity_file.as_deref(), "ssh_identity_file")?;
        for pattern in &self.excludes {
            Self::require_value(pattern, "excludes")?;
        }
        Ok(())
    }

    fn require_optional_value(value: Option<&str>, field: &str) -> Result<(), SyncError> {
        match value {
            None => Ok(()), // Not configured; the caller's fallback applies
            Some(v) if !v.trim().is_empty() => Ok(()),
            Some(_) => Err(SyncError::InvalidConfig {
                field: field.to_owned(),
            }),
        }
    }

    /// Loads configuration from defaults, configuration files, and
    /// environment variables, without parsing CLI arguments.
    ///
    /// # Errors
    ///
    /// Returns [`SyncConfigLoadError::Parse`] when merging sources fails.
    pub fn load_without_cli_args() -> Result<Self, SyncConfigLoadError> {
        Self::load_from_iter([std::ffi::OsString::from("ferry")])
            .map_err(|err| SyncConfigLoadError::Parse(err.to_string()))
    }

    /// Loads configuration using the default argument iterator.
    ///
    /// # Errors
    ///
    /// Returns [`SyncConfigLoadError::Parse`] when merging sources fails.
    pub fn load_from_sources() -> Result<Self, SyncConfigLoadError> {
        Self::load().map_err(|err| SyncConfigLoadError::Parse(err.to_string()))
    }

    /// Builds the device endpoint from the configured host and port.
    #[must_use]
    pub fn device_endpoint(&self) -> DeviceEndpoint {
        DeviceEndpoint {
            host: self.remote_host.clone(),
            ssh_port: self.ssh_port,
        }
    }

    /// Builds a remote destination using the supplied device endpoint.
    #[must_use]
    pub fn remote_destination(&self, device: &DeviceEndpoint) -> SyncDestination {
        SyncDestination::Remote {
            user: self.ssh_user.clone(),
            host: device.host.clone(),
            port: device.ssh_port,
            path: Utf8PathBuf::from(&self.remote_path),
        }
    }

    /// Resolves the source directory, expanding a leading tilde and falling
    /// back to `fallback` when none is configured.
    #[must_use]
    pub fn source_dir_or(&self, fallback: &Utf8Path) -> Utf8PathBuf {
        self.source_dir.as_deref().map_or_else(
            || fallback.to_path_buf(),
            |dir| Utf8PathBuf::from(expand_tilde(dir)),
        )
    }

    fn require_value(value: &str, field: &str) -> Result<(), SyncError> {
        Self::require_optional_value(Some(value), field)
    }
}

/// Errors surfaced while performing synchronisation or remote execution.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum SyncError {
    /// Raised when configuration is missing required values. The error message
    /// includes guidance on how to provide the value via environment variable
    /// or configuration file.
    #[error("missing {field}: set FERRY_SYNC_{env_suffix} or add {field} to [sync] in ferry.toml", env_suffix = field.to_uppercase())]
    InvalidConfig {
        /// Configuration field that failed validation.
        field: String,
    },
    /// Raised when the source directory does not exist.
    #[error("sync source directory missing: {path}")]
    MissingSource {
        /// Path that was expected to be synchronised.
        path: Utf8PathBuf,
    },
    /// Raised when a command cannot be spawned.
    #[error("failed to spawn {program}: {message}")]
    Spawn {
        /// Command that failed to start.
        program: String,
        /// Operating system error string.
        message: String,
    },
    /// Raised when `rsync` completes with a non-zero exit code.
    #[error("{program} exited with status {status_text}: {stderr}")]
    CommandFailure {
        /// Command name used for the attempted operation.
        program: String,
        /// Exit status as reported by the OS.
        status: Option<i32>,
        /// Human readable representation of the exit status.
        status_text: String,
        /// Stderr captured from the process.
        stderr: String,
    },
}
