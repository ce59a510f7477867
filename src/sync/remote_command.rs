//! Remote command wrapping.
//!
//! Remote commands run in a predictable working directory: the remote path
//! that received the workspace. This module centralises the string-building
//! logic so the top-level sync module remains focused on orchestration.

use shell_escape::unix::escape;

use super::SyncConfig;

/// Builds the remote command string executed after a sync.
///
/// The remote path is shell-escaped and the user command is wrapped with a
/// directory change; the command itself is passed through verbatim.
pub(crate) fn build_remote_command(config: &SyncConfig, remote_command: &str) -> String {
    let escaped_path = escape(config.remote_path.as_str().into());
    format!("cd {escaped_path} && {remote_command}")
}
