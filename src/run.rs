//! Orchestrates the deploy-and-test flow against a fixed device.
//!
//! The workflow mirrors the local workspace onto the device, then executes a
//! remote command there using the system `ssh` client. The sync must succeed
//! before the remote command is attempted; testing unsynced code answers
//! nothing. Remote exit codes are preserved so callers observe the same
//! status locally.

use camino::Utf8Path;
use thiserror::Error;

use crate::sync::{CommandRunner, DeviceEndpoint, RemoteCommandOutput, SyncError, Syncer};

/// Errors surfaced while performing a deploy run.
///
/// The two variants distinguish which phase failed: a [`DeployError::Sync`]
/// means the remote command was never attempted. A remote command that runs
/// and exits non-zero is not an error at this layer; its status is carried in
/// the returned [`RemoteCommandOutput`].
#[derive(Debug, Error)]
pub enum DeployError {
    /// Raised when workspace synchronisation fails.
    #[error("workspace sync failed: {source}")]
    Sync {
        /// Underlying synchronisation error.
        #[source]
        source: SyncError,
    },
    /// Raised when the remote command fails to start.
    #[error("remote command failed to start: {source}")]
    Remote {
        /// Underlying synchronisation error.
        #[source]
        source: SyncError,
    },
}

/// Executes the deploy flow using the provided syncer.
#[derive(Debug)]
pub struct DeployOrchestrator<R: CommandRunner> {
    syncer: Syncer<R>,
}

impl<R: CommandRunner> DeployOrchestrator<R> {
    /// Creates a new orchestrator.
    #[must_use]
    pub const fn new(syncer: Syncer<R>) -> Self {
        Self { syncer }
    }

    /// Returns a reference to the wrapped syncer.
    #[must_use]
    pub const fn syncer(&self) -> &Syncer<R> {
        &self.syncer
    }

    /// Mirrors the workspace onto the device without running anything.
    ///
    /// # Errors
    ///
    /// Returns [`DeployError::Sync`] when synchronisation fails.
    pub fn sync(&self, source: &Utf8Path, device: &DeviceEndpoint) -> Result<(), DeployError> {
        let destination = self.syncer.destination_for(device);
        self.syncer
            .sync(source, &destination)
            .map_err(|err| DeployError::Sync { source: err })
    }

    /// Runs the end-to-end workflow and returns the remote command output.
    ///
    /// The remote exit code is returned even when non-zero, so the caller can
    /// propagate it as its own exit status.
    ///
    /// # Errors
    ///
    /// Returns [`DeployError`] when synchronisation or remote execution fail.
    pub fn execute(
        &self,
        source: &Utf8Path,
        device: &DeviceEndpoint,
        remote_command: &str,
    ) -> Result<RemoteCommandOutput, DeployError> {
        self.sync(source, device)?;
        self.syncer
            .run_remote(device, remote_command)
            .map_err(|err| DeployError::Remote { source: err })
    }
}
