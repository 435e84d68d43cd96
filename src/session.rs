// Licensed under the Apache License, Version 2.0.
//
// `Session`: the pull-based batch/resume protocol of spec.md §4.5, translated from the
// teacher's Python `LocalScheduler.schedule` generator (`execution_next` / yield batch /
// resume with completions) into an explicit state machine, since stable Rust has no
// generators. Grounded in naming on `_teacher_ref/legacy_src/scheduler.rs`'s
// `Scheduler`/`root_states` (`add_root_select`, `execute`, `root_states`) and the
// teacher's current `src/rust/engine/src/session.rs`, which plays the analogous role of
// tracking one in-flight request's roots against the shared `Core`.

use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;
use std::sync::Arc;

use engine_core::{Failure, Function, Key, NoopReason, TypeId, Value, Variants};
use graph::{EntryId, GraphContext, NodeKey, NodeState, SelectKey};
use tasks::RuleId;

use crate::scheduler::Inner;
use crate::ExecutionRequest;

/// One node the caller should execute: invoke `rule_id`'s function (reachable via the
/// scheduler's own rule registry) with `subject` and `args`, then call
/// `Session::complete` with the outcome. Mirrors `graph::Runnable`, plus the owning
/// node's `entry_id` so the caller can report its result back.
#[derive(Clone, Debug)]
pub struct BatchElement {
    pub entry_id: EntryId,
    pub rule_id: RuleId,
    pub func: Function,
    pub subject: Key,
    pub args: Vec<Key>,
    pub cacheable: bool,
}

/// The terminal (or still-pending) state of one requested root, per spec.md §6's
/// `root_entries(request) → map[(subject, product) → Return|Throw|Noop|None]`.
#[derive(Clone, Debug)]
pub enum RootOutcome {
    Return(Key),
    Throw(Failure),
    Noop(NoopReason),
    Pending,
}

/// One outstanding execution request against a `Scheduler`. Only one `Session` may be
/// live per scheduler at a time — `Scheduler::schedule` enforces this by setting
/// `Inner::session_active` on construction; `Drop` clears it, so the slot frees up
/// whether the caller drove the session to completion or abandoned it early (spec.md
/// §5's cancellation policy: abandoned runnables may still report in, but nothing
/// downstream of this `Session` depends on them once it is dropped).
pub struct Session {
    inner: Rc<RefCell<Inner>>,
    roots: Vec<(Key, TypeId, EntryId)>,
    dispatched: HashSet<EntryId>,
}

impl Session {
    pub(crate) fn new(inner: Rc<RefCell<Inner>>, request: ExecutionRequest) -> Session {
        let roots = {
            let mut inner_mut = inner.borrow_mut();
            request
                .roots
                .iter()
                .map(|&(subject, product)| {
                    let node_key = NodeKey::Select(SelectKey {
                        subject,
                        product,
                        variant_key: None,
                        variants: Variants::default(),
                    });
                    let entry_id = inner_mut.graph.demand(node_key);
                    (subject, product, entry_id)
                })
                .collect()
        };
        Session { inner, roots, dispatched: HashSet::new() }
    }

    fn root_ids(&self) -> Vec<EntryId> {
        self.roots.iter().map(|&(_, _, id)| id).collect()
    }

    /// Repeatedly advances every node reachable from `root_ids` until a full pass
    /// changes nothing: neither the reachable set (no new dependency edges) nor any
    /// reachable node's state. Settling one node (e.g. closing a cycle) can unblock an
    /// already-visited node earlier in the same walk order, so a pass with a stable node
    /// *count* is not enough — the next pass must see the update too before we stop.
    fn drive(inner: &mut Inner, root_ids: &[EntryId]) {
        let mut previous_states: Option<Vec<NodeState>> = None;
        for _ in 0..256 {
            let ids: Vec<EntryId> = inner.graph.walk(root_ids.iter().copied(), false).map(|e| e.id()).collect();
            {
                let Inner { rules, interner, graph, .. } = inner;
                let mut ctx = GraphContext { rules, interner };
                for &id in &ids {
                    graph.advance(&mut ctx, id);
                }
            }
            let states: Vec<NodeState> = ids.iter().map(|&id| inner.graph.entry_for_id(id).state().clone()).collect();
            if previous_states.as_ref() == Some(&states) {
                break;
            }
            previous_states = Some(states);
        }
    }

    /// Advances the graph and returns every node that became `Runnable` since the last
    /// call that has not already been yielded (spec.md §4.5 steps 2-3). Returns an empty
    /// batch once scheduling has reached a fixed point.
    pub fn next_batch(&mut self) -> Vec<BatchElement> {
        let root_ids = self.root_ids();
        let mut inner = self.inner.borrow_mut();
        Session::drive(&mut inner, &root_ids);

        let reachable: Vec<EntryId> = inner.graph.walk(root_ids.iter().copied(), false).map(|e| e.id()).collect();
        let mut batch = Vec::new();
        for id in reachable {
            if self.dispatched.contains(&id) {
                continue;
            }
            if let NodeState::Runnable(runnable) = inner.graph.entry_for_id(id).state().clone() {
                self.dispatched.insert(id);
                batch.push(BatchElement {
                    entry_id: id,
                    rule_id: runnable.rule_id,
                    func: runnable.func,
                    subject: runnable.subject,
                    args: runnable.args,
                    cacheable: runnable.cacheable,
                });
            }
        }
        batch
    }

    /// Reports the outcome of running `entry_id`'s captured function (spec.md §4.5 step
    /// 4). Must be called at most once per `BatchElement` yielded by `next_batch`.
    pub fn complete(&mut self, entry_id: EntryId, result: Result<Key, Failure>) {
        self.inner.borrow_mut().graph.complete(entry_id, result);
        self.dispatched.remove(&entry_id);
    }

    /// The current outcome of every requested root, per spec.md §6.
    pub fn root_entries(&self) -> Vec<(Key, TypeId, RootOutcome)> {
        let inner = self.inner.borrow();
        self
            .roots
            .iter()
            .map(|&(key, type_id, entry_id)| {
                let outcome = match inner.graph.entry_for_id(entry_id).state() {
                    NodeState::Return(k) => RootOutcome::Return(*k),
                    NodeState::Throw(f) => RootOutcome::Throw(f.clone()),
                    NodeState::Noop(r) => RootOutcome::Noop(*r),
                    NodeState::Waiting | NodeState::Runnable(_) => RootOutcome::Pending,
                };
                (key, type_id, outcome)
            })
            .collect()
    }

    /// True once every root has settled and nothing remains dispatched but unreported.
    pub fn is_finished(&self) -> bool {
        if !self.dispatched.is_empty() {
            return false;
        }
        self.root_entries().iter().all(|(_, _, outcome)| !matches!(outcome, RootOutcome::Pending))
    }

    /// Drives the session to completion using the scheduler's own rule bodies as the
    /// execution pool, rather than handing batches to an external caller. This is the
    /// adapter every end-to-end caller of this crate actually wants: the "external
    /// execution pool" spec.md §1 calls out as an out-of-scope collaborator is a bigger
    /// build tool's thread pool, but the rule bodies registered here (including the
    /// `globs`/`process_exec` intrinsics) are plain Rust closures that can simply be
    /// invoked, so a synchronous default runner needs no pool at all.
    pub fn run_to_completion(&mut self) {
        loop {
            let batch = self.next_batch();
            if batch.is_empty() {
                break;
            }
            for element in batch {
                let body = {
                    let inner = self.inner.borrow();
                    Arc::clone(&inner.rules.get(element.rule_id).body)
                };
                let (subject_value, args): (Value, Vec<Value>) = {
                    let inner = self.inner.borrow();
                    (
                        inner.interner.get(element.subject).clone(),
                        element.args.iter().map(|&k| inner.interner.get(k).clone()).collect(),
                    )
                };
                let result = body(&subject_value, &args);
                let result_key = {
                    let mut inner = self.inner.borrow_mut();
                    result.map(|value| inner.interner.put(value))
                };
                self.complete(element.entry_id, result_key);
            }
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.inner.borrow_mut().session_active = false;
    }
}
