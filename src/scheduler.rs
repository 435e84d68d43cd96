// Licensed under the Apache License, Version 2.0.
//
// `Scheduler`: owns the rule registry, type registry, interning store, and product
// graph, and exposes the caller-facing API of spec.md §6. Grounded on the teacher's
// `Core` (`src/rust/engine/src/context.rs`), which plays the analogous role of holding
// the engine's long-lived state behind one entry point, and on `scheduler.py`'s
// `LocalScheduler`, which owns the equivalent state in the original.

use std::path::PathBuf;
use std::rc::Rc;
use std::sync::Arc;

use engine_core::{Failure, Interner, Key, TypeId, TypeRegistry, Value};
use globs::{RealFs, Vfs};
use graph::ProductGraph;
use process_exec::{Executor, LocalExecutor, ProcessRequest, ProcessResult};
use rule_graph::ValidationError;
use selectors::Selector;
use tasks::{RuleFn, RuleId, Rules};

use crate::intrinsics::{self, PathGlobTypes, ProcessExecTypes};
use crate::session::Session;
use crate::ExecutionRequest;

/// How process-execution intrinsics actually run a subprocess. `Local` is the default,
/// real-filesystem strategy; `Scripted` replays fixed results without spawning
/// anything, for hermetic tests — mirroring the teacher's `ExecutionStrategyOptions`
/// choosing between the real local runner and a test double.
pub enum ExecutionStrategy {
    Local,
    Scripted(Vec<Result<ProcessResult, Failure>>),
}

/// Construction-time configuration, mirroring the teacher's separation of
/// `Core`/`ExecutionStrategyOptions` from the engine's internals (SPEC_FULL.md §2).
pub struct SchedulerOptions {
    pub build_root: PathBuf,
    /// Subject type names the caller intends to request roots against. Interned eagerly
    /// by `Scheduler::new` so `validate_ruleset` has a fixed, named set of legal roots to
    /// check reachability from (spec.md §4.3/§6).
    pub legal_root_subject_types: Vec<&'static str>,
    pub execution_strategy: ExecutionStrategy,
}

impl SchedulerOptions {
    pub fn new(build_root: impl Into<PathBuf>) -> SchedulerOptions {
        SchedulerOptions {
            build_root: build_root.into(),
            legal_root_subject_types: Vec::new(),
            execution_strategy: ExecutionStrategy::Local,
        }
    }
}

/// The five error kinds of spec.md §7 that surface synchronously rather than as a node
/// state: ruleset validation gaps, and overlapping `schedule` calls.
#[derive(Clone, Debug)]
pub enum SchedulerError {
    Validation(ValidationError),
    ConcurrentExecution,
}

impl std::fmt::Display for SchedulerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SchedulerError::Validation(e) => write!(f, "{e}"),
            SchedulerError::ConcurrentExecution => {
                write!(f, "a schedule() request is already outstanding on this scheduler")
            }
        }
    }
}

impl std::error::Error for SchedulerError {}

/// The state a `Scheduler` and every `Session` it hands out share. Held behind an
/// `Rc<RefCell<_>>` rather than relied on purely via borrow-checker lifetimes, so that
/// the "only one outstanding session" rule of spec.md §4.5/§7 is an explicit, testable
/// runtime check (`session_active`) rather than something only a compile error could
/// catch — which would make the `concurrent_execution` error path itself impossible to
/// exercise in a test.
pub(crate) struct Inner {
    pub(crate) type_registry: TypeRegistry,
    pub(crate) rules: Rules,
    pub(crate) interner: Interner,
    pub(crate) graph: ProductGraph,
    pub(crate) session_active: bool,
}

pub struct Scheduler {
    pub(crate) inner: Rc<std::cell::RefCell<Inner>>,
    legal_root_subject_types: Vec<TypeId>,
    path_globs: PathGlobTypes,
    process_exec: ProcessExecTypes,
}

impl Scheduler {
    /// Builds a scheduler backed by the real filesystem rooted at
    /// `options.build_root`, and a process executor chosen by `options.execution_strategy`.
    pub fn new(options: SchedulerOptions) -> Scheduler {
        let vfs: Arc<dyn Vfs + Send + Sync> = Arc::new(RealFs::new(options.build_root.clone()));
        let executor: Arc<dyn Executor + Send + Sync> = match options.execution_strategy {
            ExecutionStrategy::Local => Arc::new(LocalExecutor::new(options.build_root.join(".sandboxes"))),
            ExecutionStrategy::Scripted(results) => Arc::new(process_exec::ScriptedExecutor::new(results)),
        };
        Scheduler::with_collaborators(options.legal_root_subject_types, vfs, executor)
    }

    /// As `new`, but with an explicit `Vfs`/`Executor` pair — the hook tests use to
    /// substitute `globs::InMemoryVfs`/`process_exec::ScriptedExecutor` for the real
    /// filesystem and subprocess machinery.
    pub fn with_collaborators(
        legal_root_subject_type_names: Vec<&'static str>,
        vfs: Arc<dyn Vfs + Send + Sync>,
        executor: Arc<dyn Executor + Send + Sync>,
    ) -> Scheduler {
        let mut type_registry = TypeRegistry::new();
        let mut rules = Rules::new();

        let path_globs = intrinsics::register_path_globs(&mut type_registry, &mut rules, vfs);
        let process_exec = intrinsics::register_process_execution(&mut type_registry, &mut rules, executor);

        let legal_root_subject_types =
            legal_root_subject_type_names.into_iter().map(|name| type_registry.intern(name)).collect();

        Scheduler {
            inner: Rc::new(std::cell::RefCell::new(Inner {
                type_registry,
                rules,
                interner: Interner::new(),
                graph: ProductGraph::new(),
                session_active: false,
            })),
            legal_root_subject_types,
            path_globs,
            process_exec,
        }
    }

    /// Interns a named subject/product type, idempotently.
    pub fn intern_type(&mut self, name: &'static str) -> TypeId {
        self.inner.borrow_mut().type_registry.intern(name)
    }

    pub fn put(&mut self, value: Value) -> Key {
        self.inner.borrow_mut().interner.put(value)
    }

    pub fn put_typed(&mut self, value: Value, type_id: TypeId) -> Key {
        self.inner.borrow_mut().interner.put_typed(value, type_id)
    }

    pub fn get(&self, key: Key) -> Value {
        self.inner.borrow().interner.get(key).clone()
    }

    /// Adds a cacheable user rule producing `product` from `clause`.
    pub fn register_rule(
        &mut self,
        product: TypeId,
        clause: Vec<Selector>,
        func: engine_core::Function,
        body: RuleFn,
    ) -> RuleId {
        self.inner.borrow_mut().rules.register_rule(product, clause, func, body)
    }

    /// Adds a non-cacheable default for `(subject_type, product_type)`.
    pub fn register_intrinsic(
        &mut self,
        subject_type: TypeId,
        product: TypeId,
        func: engine_core::Function,
        body: RuleFn,
    ) -> RuleId {
        self.inner.borrow_mut().rules.register_intrinsic(subject_type, product, func, body)
    }

    /// The subject/product types the built-in path-glob intrinsic and its field
    /// extraction rules are registered against (spec.md §4.6).
    pub fn path_globs_types(&self) -> PathGlobTypes {
        self.path_globs
    }

    /// The subject/product types the built-in process-execution intrinsic is
    /// registered against (spec.md §4.7).
    pub fn process_exec_types(&self) -> ProcessExecTypes {
        self.process_exec
    }

    /// Interns a `PathGlobs` subject from a list of glob pattern strings.
    pub fn path_globs(&mut self, patterns: Vec<String>) -> Key {
        let value = intrinsics::encode_patterns(&patterns);
        self.put_typed(value, self.path_globs.path_globs)
    }

    /// Interns a `ProcessRequest` subject.
    pub fn process_request(&mut self, request: &ProcessRequest) -> Key {
        let value = intrinsics::encode_process_request(request);
        self.put_typed(value, self.process_exec.process_request)
    }

    /// Runs the ruleset validator of spec.md §4.3 against the legal root subject types
    /// declared in `SchedulerOptions`, checking that every product in `goals` is
    /// reachable from each of them.
    pub fn validate_ruleset(&self, goals: &[TypeId]) -> Result<(), ValidationError> {
        let inner = self.inner.borrow();
        rule_graph::validate_ruleset(&inner.rules, &self.legal_root_subject_types, goals)
    }

    /// Builds the cartesian product of `products` x `subjects` as an `ExecutionRequest`
    /// (spec.md §6).
    pub fn execution_request(&self, products: &[TypeId], subjects: &[Key]) -> ExecutionRequest {
        let mut roots = Vec::with_capacity(products.len() * subjects.len());
        for &subject in subjects {
            for &product in products {
                roots.push((subject, product));
            }
        }
        ExecutionRequest { roots }
    }

    /// Admits `request` for execution, returning a `Session` that exposes the
    /// batch/resume protocol of spec.md §4.5. Only one `Session` may be outstanding per
    /// `Scheduler` at a time (spec.md §4.5/§7, scenario 6 of §8).
    pub fn schedule(&mut self, request: &ExecutionRequest) -> Result<Session, SchedulerError> {
        {
            let mut inner = self.inner.borrow_mut();
            if inner.session_active {
                return Err(SchedulerError::ConcurrentExecution);
            }
            inner.session_active = true;
        }
        Ok(Session::new(Rc::clone(&self.inner), request.clone()))
    }

    /// Marks dirty any filesystem-derived (`PathGlobs`-subject) node whose patterns
    /// could match one of `changed_paths`, plus every transitive ancestor (spec.md §4.4,
    /// §9's resolved `invalidate_files` Open Question). Returns the number of nodes
    /// removed.
    pub fn invalidate_files(&mut self, changed_paths: &[PathBuf]) -> usize {
        let changed: Vec<String> = changed_paths.iter().map(|p| p.to_string_lossy().into_owned()).collect();
        let path_globs_type = self.path_globs.path_globs;
        let mut inner = self.inner.borrow_mut();
        let Inner { graph, interner, .. } = &mut *inner;
        let interner: &Interner = interner;
        graph.invalidate(|node| {
            if node.subject().type_id() != path_globs_type {
                return false;
            }
            let patterns = match interner.get(node.subject()).as_list() {
                Some(items) => items,
                None => return false,
            };
            patterns.iter().any(|pattern_value| {
                pattern_value
                    .as_str()
                    .map(|pattern| {
                        changed.iter().any(|path| {
                            glob::Pattern::new(pattern).map(|p| p.matches(path)).unwrap_or(false)
                        })
                    })
                    .unwrap_or(false)
            })
        })
    }

    /// Renders a DOT digraph of every node reachable from `roots` (spec.md §6).
    pub fn visualize(&self, roots: &[graph::EntryId]) -> String {
        self.inner.borrow().graph.visualize(roots)
    }

    /// A human-readable trace of how `root` reached its current state.
    pub fn trace(&self, root: graph::EntryId) -> String {
        self.inner.borrow().graph.trace(root)
    }

    pub fn graph_len(&self) -> usize {
        self.inner.borrow().graph.len()
    }
}
