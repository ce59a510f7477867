//! Behavioural coverage for workspace mirroring and remote command handling.

use std::collections::HashSet;
use std::ffi::OsString;
use std::fs::{DirEntry, FileType, copy, create_dir_all, read_dir, read_to_string, remove_dir_all, remove_file, write};
use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};
use ferry::sync::{
    CommandOutput, DeviceEndpoint, RemoteCommandOutput, SyncConfig, SyncDestination, SyncError,
    Syncer,
};
use ferry::test_support::ScriptedRunner;
use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};
use tempfile::TempDir;

fn base_config(remote_path: String) -> SyncConfig {
    SyncConfig {
        rsync_bin: String::from("rsync"),
        ssh_bin: String::from("ssh"),
        ssh_user: String::from("termux"),
        remote_host: String::from("phone.local"),
        ssh_port: 8022,
        remote_path,
        source_dir: None,
        excludes: vec![String::from(".venv/"), String::from(".git/")],
        test_command: None,
        ssh_identity_file: None,
        ssh_batch_mode: true,
        ssh_strict_host_key_checking: true,
        ssh_known_hosts_file: String::new(),
        ssh_force_tty: true,
    }
}

#[derive(Clone, Debug)]
struct Workspace {
    local_root: Utf8PathBuf,
    remote_root: Utf8PathBuf,
    _local_tmp: Arc<TempDir>,
    _remote_tmp: Arc<TempDir>,
}

impl Workspace {
    fn new() -> Self {
        let local_tmp = Arc::new(temp_dir("create local workspace temp directory"));
        let remote_tmp = Arc::new(temp_dir("create remote workspace temp directory"));

        let local_root = utf8_path(
            local_tmp.path().to_path_buf(),
            "local path should be valid UTF-8",
        );
        let remote_root = utf8_path(
            remote_tmp.path().to_path_buf(),
            "remote path should be valid UTF-8",
        );

        Self {
            local_root,
            remote_root,
            _local_tmp: local_tmp,
            _remote_tmp: remote_tmp,
        }
    }
}

fn write_file(path: &Utf8Path, contents: &str) {
    if let Some(parent) = path.parent() {
        create_dir_all(parent)
            .unwrap_or_else(|err| panic!("create parent directories for {path}: {err}"));
    }
    write(path, contents)
        .unwrap_or_else(|err| panic!("write {path} content for test fixture: {err}"));
}

fn temp_dir(label: &str) -> TempDir {
    TempDir::new().unwrap_or_else(|err| panic!("{label}: {err}"))
}

fn utf8_path(path: std::path::PathBuf, label: &str) -> Utf8PathBuf {
    Utf8PathBuf::from_path_buf(path).unwrap_or_else(|err| panic!("{label}: {}", err.display()))
}

#[fixture]
fn workspace() -> Workspace {
    Workspace::new()
}

#[fixture]
fn scripted_context() -> ScriptedContext {
    build_scripted_context(ScriptedRunner::new(), "scripted context fixture")
}

#[fixture]
fn output() -> RemoteCommandOutput {
    RemoteCommandOutput {
        exit_code: Some(0),
        stdout: String::new(),
        stderr: String::new(),
    }
}

#[fixture]
fn error() -> SyncError {
    SyncError::Spawn {
        program: String::from("rsync"),
        message: String::from("placeholder"),
    }
}

#[derive(Clone, Debug)]
struct ExcludeRules {
    dirs: HashSet<String>,
    files: HashSet<String>,
}

fn parse_exclude_rules(patterns: &[String]) -> ExcludeRules {
    let mut dirs = HashSet::new();
    let mut files = HashSet::new();
    for pattern in patterns {
        match pattern.strip_suffix('/') {
            Some(stripped) => {
                dirs.insert(stripped.to_owned());
            }
            None => {
                files.insert(pattern.clone());
            }
        }
    }
    ExcludeRules { dirs, files }
}

fn is_excluded(relative: &Utf8Path, rules: &ExcludeRules) -> bool {
    for component in relative.components() {
        if rules.dirs.contains(component.as_str()) {
            return true;
        }
    }

    relative
        .file_name()
        .is_some_and(|name| rules.files.contains(name))
}

/// Mirrors `source` into `destination` the way the real rsync invocation
/// would: excluded paths are neither copied nor left behind on the
/// destination (`--delete --delete-excluded`).
fn simulate_rsync(
    source: &Utf8Path,
    destination: &Utf8Path,
    rules: &ExcludeRules,
) -> Result<(), SyncError> {
    let mut kept: HashSet<Utf8PathBuf> = HashSet::new();
    copy_tree(source, destination, rules, &mut kept)?;
    prune_destination(destination, destination, &kept)?;
    Ok(())
}

fn map_io_error(err: &impl ToString) -> SyncError {
    SyncError::Spawn {
        program: String::from("rsync"),
        message: err.to_string(),
    }
}

fn copy_tree(
    source_root: &Utf8Path,
    destination_root: &Utf8Path,
    rules: &ExcludeRules,
    kept: &mut HashSet<Utf8PathBuf>,
) -> Result<(), SyncError> {
    copy_subtree(source_root, source_root, destination_root, rules, kept)
}

fn copy_subtree(
    source_root: &Utf8Path,
    current: &Utf8Path,
    destination_root: &Utf8Path,
    rules: &ExcludeRules,
    kept: &mut HashSet<Utf8PathBuf>,
) -> Result<(), SyncError> {
    for source_entry in read_dir(current).map_err(|err| map_io_error(&err))? {
        let entry = source_entry.map_err(|err| map_io_error(&err))?;
        let path =
            Utf8PathBuf::from_path_buf(entry.path()).map_err(|err| map_io_error(&err.display()))?;
        let relative = path
            .strip_prefix(source_root)
            .map_err(|err| map_io_error(&err))?;

        if is_excluded(relative, rules) {
            continue;
        }

        let destination_path = destination_root.join(relative);
        let file_type = entry.file_type().map_err(|err| map_io_error(&err))?;

        if file_type.is_dir() {
            create_dir_all(&destination_path).map_err(|err| map_io_error(&err))?;
            kept.insert(relative.to_path_buf());
            copy_subtree(source_root, &path, destination_root, rules, kept)?;
        } else {
            if let Some(parent) = destination_path.parent() {
                create_dir_all(parent).map_err(|err| map_io_error(&err))?;
            }
            copy(&path, &destination_path).map_err(|err| map_io_error(&err))?;
            kept.insert(relative.to_path_buf());
        }
    }

    Ok(())
}

fn should_keep_entry(relative: &Utf8Path, file_type: FileType, kept: &HashSet<Utf8PathBuf>) -> bool {
    let has_children = kept.iter().any(|kept_path| kept_path.starts_with(relative));
    kept.contains(relative) || (file_type.is_dir() && has_children)
}

fn remove_entry(path: &Utf8Path, is_dir: bool) -> Result<(), SyncError> {
    if is_dir {
        remove_dir_all(path).map_err(|err| map_io_error(&err))
    } else {
        remove_file(path).map_err(|err| map_io_error(&err))
    }
}

fn process_destination_entry(
    entry: &DirEntry,
    destination_root: &Utf8Path,
    kept: &HashSet<Utf8PathBuf>,
) -> Result<(), SyncError> {
    let path =
        Utf8PathBuf::from_path_buf(entry.path()).map_err(|err| map_io_error(&err.display()))?;
    let relative = path
        .strip_prefix(destination_root)
        .map_err(|err| map_io_error(&err))?;

    let file_type = entry.file_type().map_err(|err| map_io_error(&err))?;

    if should_keep_entry(relative, file_type, kept) {
        if file_type.is_dir() {
            prune_destination(destination_root, &path, kept)?;
        }
        return Ok(());
    }

    remove_entry(&path, file_type.is_dir())
}

fn prune_destination(
    destination_root: &Utf8Path,
    current: &Utf8Path,
    kept: &HashSet<Utf8PathBuf>,
) -> Result<(), SyncError> {
    if !current.exists() {
        return Ok(());
    }

    for destination_entry in read_dir(current).map_err(|err| map_io_error(&err))? {
        let entry = destination_entry.map_err(|err| map_io_error(&err))?;
        process_destination_entry(&entry, destination_root, kept)?;
    }

    Ok(())
}

/// Command runner that simulates the rsync invocation against local paths.
#[derive(Clone, Debug, Default)]
struct LocalCopyRunner;

impl LocalCopyRunner {
    fn parse_invocation(args: &[OsString]) -> Result<(Utf8PathBuf, Utf8PathBuf, Vec<String>), SyncError> {
        if args.len() < 2 {
            return Err(SyncError::Spawn {
                program: String::from("rsync"),
                message: String::from("missing source or destination argument"),
            });
        }

        let mut excludes = Vec::new();
        let mut iter = args.iter();
        while let Some(arg) = iter.next() {
            if arg == "--exclude"
                && let Some(pattern) = iter.next()
            {
                excludes.push(pattern.to_string_lossy().into_owned());
            }
        }

        let source_arg = args
            .get(args.len() - 2)
            .and_then(|value| value.to_str())
            .ok_or_else(|| SyncError::Spawn {
                program: String::from("rsync"),
                message: String::from("invalid source path"),
            })?;
        let destination_arg = args
            .last()
            .and_then(|value| value.to_str())
            .ok_or_else(|| SyncError::Spawn {
                program: String::from("rsync"),
                message: String::from("invalid destination path"),
            })?;

        Ok((
            Utf8PathBuf::from(source_arg.trim_end_matches('/')),
            Utf8PathBuf::from(destination_arg),
            excludes,
        ))
    }
}

impl ferry::sync::CommandRunner for LocalCopyRunner {
    fn run(&self, program: &str, args: &[OsString]) -> Result<CommandOutput, SyncError> {
        if program != "rsync" {
            return Err(SyncError::Spawn {
                program: program.to_owned(),
                message: String::from("local runner only simulates rsync"),
            });
        }

        let (source, destination, excludes) = Self::parse_invocation(args)?;
        let rules = parse_exclude_rules(&excludes);
        simulate_rsync(&source, &destination, &rules)?;

        Ok(CommandOutput {
            code: Some(0),
            stdout: String::new(),
            stderr: String::new(),
        })
    }
}

#[derive(Clone, Debug)]
struct ScriptedContext {
    runner: ScriptedRunner,
    config: SyncConfig,
    device: DeviceEndpoint,
    source: Utf8PathBuf,
    _source_tmp: Arc<TempDir>,
}

fn build_scripted_context(runner: ScriptedRunner, label: &str) -> ScriptedContext {
    let source_tmp = Arc::new(temp_dir(label));
    let source_path = utf8_path(
        source_tmp.path().to_path_buf(),
        "scripted context source path",
    );
    let config = base_config(String::from("project"));
    let device = config.device_endpoint();

    ScriptedContext {
        runner,
        config,
        device,
        source: source_path,
        _source_tmp: source_tmp,
    }
}

#[given("a workspace with an excluded virtualenv seeded on the remote")]
fn workspace_with_seeded_virtualenv() -> Workspace {
    let workspace = Workspace::new();

    write_file(
        workspace.local_root.join("a").join("b.txt").as_path(),
        "ping\n",
    );
    write_file(
        workspace
            .local_root
            .join(".venv")
            .join("lib")
            .join("site.py")
            .as_path(),
        "local only",
    );

    // Simulates artifacts left behind by earlier runs or placed by hand.
    write_file(
        workspace
            .remote_root
            .join(".venv")
            .join("cache.bin")
            .as_path(),
        "stale virtualenv",
    );
    write_file(
        workspace.remote_root.join("stale.txt").as_path(),
        "remove me",
    );

    workspace
}

#[when("I run the mirroring sync to the remote path")]
fn run_mirroring_sync(workspace: &Workspace) -> Result<Workspace, SyncError> {
    let config = base_config(workspace.remote_root.to_string());

    let syncer = Syncer::new(config, LocalCopyRunner)?;
    let destination = SyncDestination::Local {
        path: workspace.remote_root.clone(),
    };
    syncer.sync(&workspace.local_root, &destination)?;

    Ok(workspace.clone())
}

#[then("nested files appear under the remote path without extra nesting")]
fn nested_files_mirrored(workspace: &Workspace) {
    let synced_file = workspace.remote_root.join("a").join("b.txt");
    let contents = read_to_string(&synced_file)
        .unwrap_or_else(|err| panic!("read synced file {synced_file}: {err}"));
    assert_eq!(contents, "ping\n", "synced contents should be identical");

    let local_basename = workspace
        .local_root
        .file_name()
        .unwrap_or_else(|| panic!("local root should have a basename"));
    assert!(
        !workspace.remote_root.join(local_basename).exists(),
        "remote tree must not gain an extra copy of the source basename"
    );

    assert!(
        !workspace.remote_root.join("stale.txt").exists(),
        "files absent locally should be removed from the remote"
    );
}

#[then("excluded paths are absent from the remote")]
fn excluded_paths_absent(workspace: &Workspace) {
    assert!(
        !workspace.remote_root.join(".venv").exists(),
        "excluded directories must be removed from the remote even when seeded there"
    );
}

#[given("a scripted runner that succeeds at sync")]
fn scripted_runner() -> ScriptedContext {
    let runner = ScriptedRunner::new();
    runner.push_success(); // rsync success

    build_scripted_context(runner, "temp source for scripted runner")
}

#[when("the remote command exits with \"{code}\"")]
fn remote_command_exits(scripted_context: &ScriptedContext, code: i32) -> RemoteCommandOutput {
    scripted_context.runner.push_exit_code(code);
    let syncer = Syncer::new(
        scripted_context.config.clone(),
        scripted_context.runner.clone(),
    )
    .unwrap_or_else(|err| panic!("failed to build syncer: {err}"));
    syncer
        .sync_and_run(
            &scripted_context.source,
            &scripted_context.device,
            "echo ok",
        )
        .unwrap_or_else(|err| panic!("remote command failed: {err}"))
}

#[then("the orchestrator reports exit code \"{code}\"")]
fn orchestrator_reports_exit_code(output: &RemoteCommandOutput, code: i32) {
    assert_eq!(output.exit_code, Some(code));
}

#[given("a scripted runner that fails during sync")]
fn scripted_runner_with_failure() -> ScriptedContext {
    let runner = ScriptedRunner::new();
    runner.push_failure(12);

    build_scripted_context(runner, "temp source for scripted runner failure")
}

#[when("I trigger the deploy against the workspace")]
fn trigger_deploy(scripted_context: &ScriptedContext) -> SyncError {
    let syncer = Syncer::new(
        scripted_context.config.clone(),
        scripted_context.runner.clone(),
    )
    .unwrap_or_else(|err| panic!("failed to build syncer: {err}"));
    match syncer.sync_and_run(
        &scripted_context.source,
        &scripted_context.device,
        "echo ok",
    ) {
        Ok(_) => panic!("deploy should fail when sync fails"),
        Err(err) => err,
    }
}

#[then("the sync error mentions the rsync exit code")]
fn sync_error_mentions_status(error: &SyncError) {
    let SyncError::CommandFailure { status, .. } = error else {
        panic!("expected sync command failure");
    };
    assert_eq!(*status, Some(12));
}

#[then("the remote command is never attempted")]
fn remote_command_never_attempted(scripted_context: &ScriptedContext) {
    let invocations = scripted_context.runner.invocations();
    assert_eq!(
        invocations.len(),
        1,
        "only the rsync invocation should have happened"
    );
    assert_eq!(
        invocations.first().map(|i| i.program.clone()),
        Some(String::from("rsync"))
    );
}

#[scenario(
    path = "tests/features/sync.feature",
    name = "Mirror workspace contents to the device path"
)]
fn scenario_mirror_contents(workspace: Workspace) {
    let _ = workspace;
}

#[scenario(
    path = "tests/features/sync.feature",
    name = "Propagate remote exit codes"
)]
fn scenario_propagate_exit_codes(scripted_context: ScriptedContext, output: RemoteCommandOutput) {
    let _ = (scripted_context, output);
}

#[scenario(path = "tests/features/sync.feature", name = "Abort the run when sync fails")]
fn scenario_abort_on_sync_failure(scripted_context: ScriptedContext, error: SyncError) {
    let _ = (scripted_context, error);
}
