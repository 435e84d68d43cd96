// Licensed under the Apache License, Version 2.0.
//
// The external execution adapter (spec.md §4.7): the scheduler never runs a process
// itself, but a snapshotted-process run is the canonical function body a `Runnable`
// batch element may carry. Grounded on the teacher's `process_execution` crate's
// request/result shapes (`ExecuteProcessRequest`/`FallibleExecuteProcessResult`),
// adapted from its tokio-based `CommandRunner` to plain `std::process::Command` since
// this workspace's scheduler loop is synchronous rather than async.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Command;

use engine_core::Failure;

/// A content-addressed bundle of files materializable into a sandbox directory. A real
/// implementation would resolve `name` against a persistent content-addressed store
/// (out of scope per spec.md §1, which names "persistent content-addressed storage
/// beyond the interning contract it must expose" as an external collaborator); this
/// crate only needs the bundle's contents in memory to extract them.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Snapshot {
    pub name: String,
    pub files: Vec<(PathBuf, Vec<u8>)>,
}

impl Snapshot {
    pub fn new(name: impl Into<String>, files: Vec<(PathBuf, Vec<u8>)>) -> Snapshot {
        Snapshot { name: name.into(), files }
    }
}

/// A request to run one subprocess in a fresh sandbox: a binary, its arguments, the
/// input snapshots that must be materialized into the sandbox before it runs, and the
/// names of output directories the caller expects to read back afterwards.
#[derive(Clone, Debug)]
pub struct ProcessRequest {
    pub binary: PathBuf,
    pub args: Vec<String>,
    pub env: BTreeMap<String, String>,
    pub input_snapshots: Vec<Snapshot>,
    pub output_directories: Vec<PathBuf>,
    pub description: String,
}

impl ProcessRequest {
    pub fn new(binary: impl Into<PathBuf>, args: Vec<String>) -> ProcessRequest {
        ProcessRequest {
            binary: binary.into(),
            args,
            env: BTreeMap::new(),
            input_snapshots: Vec::new(),
            output_directories: Vec::new(),
            description: String::new(),
        }
    }
}

/// The outcome of running a `ProcessRequest` to completion. A non-zero `exit_code` is
/// NOT itself an error here: per spec.md §4.7, surfacing it as a graph-level `Throw` is
/// the calling rule's job (the intrinsic that wraps `Executor::execute`), since a
/// fallible subprocess exit is ordinary data a rule might legitimately want to inspect.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ProcessResult {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub exit_code: i32,
    pub output_directory: PathBuf,
}

impl ProcessResult {
    pub fn is_success(&self) -> bool {
        self.exit_code == 0
    }
}

/// The contract the scheduler's external execution adapter hands batch elements to.
/// `Failure` here means the process could not be run at all (bad binary, sandbox setup
/// failed) — distinct from `ProcessResult::exit_code != 0`, which means it ran and
/// failed on its own terms.
pub trait Executor {
    fn execute(&self, request: &ProcessRequest) -> Result<ProcessResult, Failure>;
}

/// Runs processes locally: extracts every input snapshot into a fresh `tempfile`
/// sandbox directory, spawns the binary with that directory as its working directory,
/// and collects stdout/stderr/exit code. Output directories are left in place under the
/// sandbox for the caller to read and are not cleaned up by `execute` itself (the
/// sandbox `TempDir` is leaked into a plain path on success; the caller owns cleanup, as
/// spec.md §6 describes: "Sandbox directories are created per process-execution and may
/// be cleaned by the caller.").
pub struct LocalExecutor {
    work_dir_base: PathBuf,
}

impl LocalExecutor {
    pub fn new(work_dir_base: impl Into<PathBuf>) -> LocalExecutor {
        LocalExecutor { work_dir_base: work_dir_base.into() }
    }

    fn materialize_sandbox(&self, request: &ProcessRequest) -> Result<tempfile::TempDir, Failure> {
        std::fs::create_dir_all(&self.work_dir_base)
            .map_err(|e| Failure::new(format!("failed to create sandbox base dir: {e}")))?;
        let sandbox = tempfile::Builder::new()
            .prefix("pg-sandbox-")
            .tempdir_in(&self.work_dir_base)
            .map_err(|e| Failure::new(format!("failed to create sandbox dir: {e}")))?;

        for snapshot in &request.input_snapshots {
            for (relative_path, content) in &snapshot.files {
                write_into_sandbox(sandbox.path(), relative_path, content)?;
            }
        }
        for output_dir in &request.output_directories {
            std::fs::create_dir_all(sandbox.path().join(output_dir))
                .map_err(|e| Failure::new(format!("failed to pre-create output dir {output_dir:?}: {e}")))?;
        }
        Ok(sandbox)
    }
}

fn write_into_sandbox(sandbox_root: &Path, relative_path: &Path, content: &[u8]) -> Result<(), Failure> {
    let target = sandbox_root.join(relative_path);
    if let Some(parent) = target.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| Failure::new(format!("failed to create {parent:?}: {e}")))?;
    }
    let mut file = std::fs::File::create(&target)
        .map_err(|e| Failure::new(format!("failed to create {target:?}: {e}")))?;
    file
        .write_all(content)
        .map_err(|e| Failure::new(format!("failed to write {target:?}: {e}")))
}

impl Executor for LocalExecutor {
    fn execute(&self, request: &ProcessRequest) -> Result<ProcessResult, Failure> {
        log::debug!("executing process {:?} ({})", request.binary, request.description);
        let sandbox = self.materialize_sandbox(request)?;

        let mut command = Command::new(&request.binary);
        command.args(&request.args).current_dir(sandbox.path());
        command.env_clear();
        for (key, value) in &request.env {
            command.env(key, value);
        }

        let output = command
            .output()
            .map_err(|e| Failure::new(format!("failed to spawn {:?}: {e}", request.binary)))?;

        let output_directory = request
            .output_directories
            .first()
            .map(|d| sandbox.path().join(d))
            .unwrap_or_else(|| sandbox.path().to_path_buf());

        // Keep the sandbox on disk past this call: the caller may still need to read
        // output_directory before cleaning up, per spec.md §6.
        let _ = sandbox.into_path();

        Ok(ProcessResult {
            stdout: output.stdout,
            stderr: output.stderr,
            exit_code: output.status.code().unwrap_or(-1),
            output_directory,
        })
    }
}

/// A test double for `Executor` that never touches the filesystem or spawns a process:
/// it replays one pre-recorded `ProcessResult` per call, in order.
#[derive(Default)]
pub struct ScriptedExecutor {
    results: std::sync::Mutex<std::collections::VecDeque<Result<ProcessResult, Failure>>>,
}

impl ScriptedExecutor {
    pub fn new(results: Vec<Result<ProcessResult, Failure>>) -> ScriptedExecutor {
        ScriptedExecutor { results: std::sync::Mutex::new(results.into()) }
    }
}

impl Executor for ScriptedExecutor {
    fn execute(&self, _request: &ProcessRequest) -> Result<ProcessResult, Failure> {
        self
            .results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(Failure::new("ScriptedExecutor ran out of scripted results")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_executor_runs_a_binary_in_its_sandbox() {
        let base = tempfile::tempdir().unwrap();
        let executor = LocalExecutor::new(base.path());
        let mut request = ProcessRequest::new("/bin/sh", vec!["-c".to_string(), "echo hi".to_string()]);
        request.description = "echo hi".to_string();

        let result = executor.execute(&request).unwrap();
        assert!(result.is_success());
        assert_eq!(String::from_utf8_lossy(&result.stdout).trim(), "hi");
    }

    #[test]
    fn local_executor_materializes_input_snapshots() {
        let base = tempfile::tempdir().unwrap();
        let executor = LocalExecutor::new(base.path());
        let mut request = ProcessRequest::new("/bin/cat", vec!["input.txt".to_string()]);
        request.input_snapshots.push(Snapshot::new(
            "inputs",
            vec![(PathBuf::from("input.txt"), b"hello from a snapshot".to_vec())],
        ));

        let result = executor.execute(&request).unwrap();
        assert_eq!(result.stdout, b"hello from a snapshot");
    }

    #[test]
    fn nonzero_exit_is_not_itself_an_error() {
        let base = tempfile::tempdir().unwrap();
        let executor = LocalExecutor::new(base.path());
        let request = ProcessRequest::new("/bin/sh", vec!["-c".to_string(), "exit 3".to_string()]);

        let result = executor.execute(&request).unwrap();
        assert!(!result.is_success());
        assert_eq!(result.exit_code, 3);
    }

    #[test]
    fn scripted_executor_replays_results_in_order() {
        let executor = ScriptedExecutor::new(vec![
            Ok(ProcessResult {
                stdout: b"first".to_vec(),
                stderr: Vec::new(),
                exit_code: 0,
                output_directory: PathBuf::new(),
            }),
            Err(Failure::new("boom")),
        ]);
        let request = ProcessRequest::new("irrelevant", vec![]);
        assert_eq!(executor.execute(&request).unwrap().stdout, b"first");
        assert_eq!(executor.execute(&request).unwrap_err(), Failure::new("boom"));
    }
}
