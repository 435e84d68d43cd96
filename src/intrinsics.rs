// Licensed under the Apache License, Version 2.0.
//
// Built-in rules wiring `globs` and `process_exec` into the scheduler as ordinary
// (subject_type, product_type) intrinsics, per spec.md §4.6/§4.7: path-glob expansion
// and process execution are rule invocations discovered by the scheduler, not
// special-cased procedural calls. Grounded on
// `examples/original_source/src/python/pants/engine/fs.py`'s `create_fs_tasks()`
// (which this collapses from ~10 tasks into one intrinsic plus three field-projection
// rules — noted as a deliberate simplification in DESIGN.md) and the teacher's
// `src/rust/engine/src/intrinsics.rs` module, which plays the analogous role of
// registering built-in (subject_type, product_type) defaults.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use engine_core::{Failure, Function, TypeId, TypeRegistry, Value};
use globs::{PathStat, Paths, Stat, Vfs};
use process_exec::{Executor, ProcessRequest, ProcessResult, Snapshot};
use selectors::Selector;
use tasks::Rules;

/// The product/subject types registered by `register_path_globs`, handed back so the
/// caller can build `Select`/`SelectDependencies` clauses against them.
#[derive(Clone, Copy, Debug)]
pub struct PathGlobTypes {
    pub path_globs: TypeId,
    pub paths: TypeId,
    pub files: TypeId,
    pub dirs: TypeId,
    pub links: TypeId,
}

/// Registers the `PathGlobs -> Paths` intrinsic plus `Files`/`Dirs`/`Links` extraction
/// rules that project one field of `Paths` each, against `vfs`.
pub fn register_path_globs(
    registry: &mut TypeRegistry,
    rules: &mut Rules,
    vfs: Arc<dyn Vfs + Send + Sync>,
) -> PathGlobTypes {
    let types = PathGlobTypes {
        path_globs: registry.intern("PathGlobs"),
        paths: registry.intern("Paths"),
        files: registry.intern("Files"),
        dirs: registry.intern("Dirs"),
        links: registry.intern("Links"),
    };

    rules.register_intrinsic(
        types.path_globs,
        types.paths,
        Function::new("resolve_path_globs"),
        Arc::new(move |subject, _args| {
            let patterns = decode_patterns(subject)?;
            let paths = globs::resolve(vfs.as_ref(), &patterns).map_err(|e| Failure::new(e.to_string()))?;
            Ok(encode_paths(&paths))
        }),
    );

    rules.register_rule(
        types.files,
        vec![Selector::select(types.paths)],
        Function::new("extract_files"),
        Arc::new(|_subject, deps| deps[0].field("files").map(Value::clone).map_err(Failure::new)),
    );
    rules.register_rule(
        types.dirs,
        vec![Selector::select(types.paths)],
        Function::new("extract_dirs"),
        Arc::new(|_subject, deps| deps[0].field("dirs").map(Value::clone).map_err(Failure::new)),
    );
    rules.register_rule(
        types.links,
        vec![Selector::select(types.paths)],
        Function::new("extract_links"),
        Arc::new(|_subject, deps| deps[0].field("links").map(Value::clone).map_err(Failure::new)),
    );

    types
}

fn decode_patterns(subject: &Value) -> Result<Vec<String>, Failure> {
    subject
        .as_list()
        .ok_or_else(|| Failure::new("PathGlobs subject must be a list of pattern strings"))?
        .iter()
        .map(|v| {
            v.as_str()
                .map(str::to_string)
                .ok_or_else(|| Failure::new(format!("non-string pattern in PathGlobs: {v:?}")))
        })
        .collect()
}

pub fn encode_patterns(patterns: &[String]) -> Value {
    Value::List(patterns.iter().map(|p| Value::Str(p.clone())).collect())
}

fn encode_path_stat(path_stat: &PathStat) -> Value {
    let (kind, canonical_path) = match &path_stat.stat {
        Stat::Dir(p) => ("dir", p),
        Stat::File(p) => ("file", p),
        Stat::Link(p) => ("link", p),
    };
    let mut fields = BTreeMap::new();
    fields.insert(
        "symbolic_path".to_string(),
        Value::Str(path_stat.symbolic_path.to_string_lossy().into_owned()),
    );
    fields.insert("canonical_path".to_string(), Value::Str(canonical_path.to_string_lossy().into_owned()));
    fields.insert("kind".to_string(), Value::Str(kind.to_string()));
    Value::Map(fields)
}

fn decode_path_stat(value: &Value) -> Option<PathStat> {
    let fields = value.as_map()?;
    let symbolic_path = PathBuf::from(fields.get("symbolic_path")?.as_str()?);
    let canonical_path = PathBuf::from(fields.get("canonical_path")?.as_str()?);
    let stat = match fields.get("kind")?.as_str()? {
        "dir" => Stat::Dir(canonical_path),
        "file" => Stat::File(canonical_path),
        "link" => Stat::Link(canonical_path),
        _ => return None,
    };
    Some(PathStat { symbolic_path, stat })
}

pub fn encode_paths(paths: &Paths) -> Value {
    let mut fields = BTreeMap::new();
    fields.insert("files".to_string(), Value::List(paths.files.iter().map(encode_path_stat).collect()));
    fields.insert("dirs".to_string(), Value::List(paths.dirs.iter().map(encode_path_stat).collect()));
    fields.insert("links".to_string(), Value::List(paths.links.iter().map(encode_path_stat).collect()));
    Value::Map(fields)
}

/// Decodes a `Files`/`Dirs`/`Links` list value (or a full `Paths` map) back into
/// `PathStat`s, for callers that want to inspect a resolved glob's results directly.
pub fn decode_path_stats(value: &Value) -> Vec<PathStat> {
    value.as_list().map(|items| items.iter().filter_map(decode_path_stat).collect()).unwrap_or_default()
}

pub fn decode_paths(value: &Value) -> Paths {
    let mut result = Paths::default();
    if let Some(fields) = value.as_map() {
        if let Some(files) = fields.get("files") {
            for stat in decode_path_stats(files) {
                result.files.push(stat);
            }
        }
        if let Some(dirs) = fields.get("dirs") {
            for stat in decode_path_stats(dirs) {
                result.dirs.push(stat);
            }
        }
        if let Some(links) = fields.get("links") {
            for stat in decode_path_stats(links) {
                result.links.push(stat);
            }
        }
    }
    result
}

/// The product/subject types registered by `register_process_execution`.
#[derive(Clone, Copy, Debug)]
pub struct ProcessExecTypes {
    pub process_request: TypeId,
    pub process_result: TypeId,
}

/// Registers the `ProcessRequest -> ProcessResult` intrinsic: extracting every input
/// snapshot into a sandbox and spawning a subprocess is delegated to `executor`, per
/// spec.md §4.7. `Executor::execute` itself failing outright (bad binary, sandbox setup)
/// becomes a hard `Throw`; a process that ran to completion but exited non-zero is
/// translated into `Throw` here too, per spec.md §4.7's "a non-zero exit is surfaced as
/// `Throw`" — the lower `process_exec::Executor` layer only reports the raw result, this
/// intrinsic is the "calling rule" that decides what a failing exit code means.
pub fn register_process_execution(
    registry: &mut TypeRegistry,
    rules: &mut Rules,
    executor: Arc<dyn Executor + Send + Sync>,
) -> ProcessExecTypes {
    let types = ProcessExecTypes {
        process_request: registry.intern("ProcessRequest"),
        process_result: registry.intern("ProcessResult"),
    };

    rules.register_intrinsic(
        types.process_request,
        types.process_result,
        Function::new("execute_process"),
        Arc::new(move |subject, _args| {
            let request = decode_process_request(subject)?;
            let result = executor.execute(&request)?;
            if result.exit_code != 0 {
                return Err(Failure::new(format!(
                    "process {} {:?} exited with code {}",
                    request.binary.display(),
                    request.args,
                    result.exit_code
                )));
            }
            Ok(encode_process_result(&result))
        }),
    );

    types
}

pub fn encode_process_request(request: &ProcessRequest) -> Value {
    let mut fields = BTreeMap::new();
    fields.insert("binary".to_string(), Value::Str(request.binary.to_string_lossy().into_owned()));
    fields.insert("args".to_string(), Value::List(request.args.iter().map(|a| Value::Str(a.clone())).collect()));
    let env: BTreeMap<String, Value> =
        request.env.iter().map(|(k, v)| (k.clone(), Value::Str(v.clone()))).collect();
    fields.insert("env".to_string(), Value::Map(env));
    fields.insert(
        "input_snapshots".to_string(),
        Value::List(request.input_snapshots.iter().map(encode_snapshot).collect()),
    );
    fields.insert(
        "output_directories".to_string(),
        Value::List(request.output_directories.iter().map(|p| Value::Str(p.to_string_lossy().into_owned())).collect()),
    );
    fields.insert("description".to_string(), Value::Str(request.description.clone()));
    Value::Map(fields)
}

fn encode_snapshot(snapshot: &Snapshot) -> Value {
    let mut fields = BTreeMap::new();
    fields.insert("name".to_string(), Value::Str(snapshot.name.clone()));
    fields.insert(
        "files".to_string(),
        Value::List(
            snapshot
                .files
                .iter()
                .map(|(path, content)| {
                    let mut file_fields = BTreeMap::new();
                    file_fields.insert("path".to_string(), Value::Str(path.to_string_lossy().into_owned()));
                    file_fields.insert("content".to_string(), Value::Bytes(content.clone()));
                    Value::Map(file_fields)
                })
                .collect(),
        ),
    );
    Value::Map(fields)
}

fn decode_process_request(value: &Value) -> Result<ProcessRequest, Failure> {
    let fields = value.as_map().ok_or_else(|| Failure::new("ProcessRequest subject must be a map"))?;
    let binary = fields
        .get("binary")
        .and_then(Value::as_str)
        .ok_or_else(|| Failure::new("ProcessRequest missing `binary`"))?;
    let args = fields
        .get("args")
        .and_then(Value::as_list)
        .ok_or_else(|| Failure::new("ProcessRequest missing `args`"))?
        .iter()
        .map(|v| v.as_str().map(str::to_string).ok_or_else(|| Failure::new("non-string arg")))
        .collect::<Result<Vec<_>, _>>()?;

    let mut request = ProcessRequest::new(binary, args);

    if let Some(env) = fields.get("env").and_then(Value::as_map) {
        for (key, value) in env {
            if let Some(v) = value.as_str() {
                request.env.insert(key.clone(), v.to_string());
            }
        }
    }
    if let Some(snapshots) = fields.get("input_snapshots").and_then(Value::as_list) {
        for snapshot_value in snapshots {
            request.input_snapshots.push(decode_snapshot(snapshot_value)?);
        }
    }
    if let Some(output_dirs) = fields.get("output_directories").and_then(Value::as_list) {
        for v in output_dirs {
            if let Some(s) = v.as_str() {
                request.output_directories.push(PathBuf::from(s));
            }
        }
    }
    if let Some(description) = fields.get("description").and_then(Value::as_str) {
        request.description = description.to_string();
    }

    Ok(request)
}

fn decode_snapshot(value: &Value) -> Result<Snapshot, Failure> {
    let fields = value.as_map().ok_or_else(|| Failure::new("snapshot must be a map"))?;
    let name = fields
        .get("name")
        .and_then(Value::as_str)
        .ok_or_else(|| Failure::new("snapshot missing `name`"))?
        .to_string();
    let mut files = Vec::new();
    for file_value in fields.get("files").and_then(Value::as_list).unwrap_or(&[]) {
        let file_fields = file_value.as_map().ok_or_else(|| Failure::new("snapshot file must be a map"))?;
        let path = file_fields
            .get("path")
            .and_then(Value::as_str)
            .ok_or_else(|| Failure::new("snapshot file missing `path`"))?;
        let content = match file_fields.get("content") {
            Some(Value::Bytes(b)) => b.clone(),
            _ => return Err(Failure::new("snapshot file missing `content`")),
        };
        files.push((PathBuf::from(path), content));
    }
    Ok(Snapshot::new(name, files))
}

pub fn encode_process_result(result: &ProcessResult) -> Value {
    let mut fields = BTreeMap::new();
    fields.insert("stdout".to_string(), Value::Bytes(result.stdout.clone()));
    fields.insert("stderr".to_string(), Value::Bytes(result.stderr.clone()));
    fields.insert("exit_code".to_string(), Value::Int(result.exit_code as i64));
    fields.insert(
        "output_directory".to_string(),
        Value::Str(result.output_directory.to_string_lossy().into_owned()),
    );
    Value::Map(fields)
}

pub fn decode_process_result(value: &Value) -> Result<ProcessResult, Failure> {
    let fields = value.as_map().ok_or_else(|| Failure::new("ProcessResult must be a map"))?;
    let stdout = match fields.get("stdout") {
        Some(Value::Bytes(b)) => b.clone(),
        _ => return Err(Failure::new("ProcessResult missing `stdout`")),
    };
    let stderr = match fields.get("stderr") {
        Some(Value::Bytes(b)) => b.clone(),
        _ => return Err(Failure::new("ProcessResult missing `stderr`")),
    };
    let exit_code = fields
        .get("exit_code")
        .and_then(Value::as_int)
        .ok_or_else(|| Failure::new("ProcessResult missing `exit_code`"))? as i32;
    let output_directory = fields
        .get("output_directory")
        .and_then(Value::as_str)
        .map(PathBuf::from)
        .unwrap_or_default();
    Ok(ProcessResult { stdout, stderr, exit_code, output_directory })
}
