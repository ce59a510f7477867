//! Core library for the Ferry deploy-and-remote-test tool.
//!
//! The crate mirrors a local workspace onto an SSH-reachable device (such as
//! an Android phone running the Termux sshd) with rsync, then executes a
//! remote command in the synced directory, streaming its output back and
//! preserving its exit status.

pub mod config_store;
pub mod run;
pub mod sync;
pub mod test_support;

pub use config_store::{ConfigStore, ConfigStoreError, ConfigWriter};
pub use run::{DeployError, DeployOrchestrator};
pub use sync::{
    CommandOutput, CommandRunner, DEFAULT_EXCLUDES, DEFAULT_REMOTE_PATH, DEFAULT_SSH_PORT,
    DeviceEndpoint, ProcessCommandRunner, RemoteCommandOutput, StreamingCommandRunner, SyncConfig,
    SyncConfigLoadError, SyncDestination, SyncError, Syncer,
};
