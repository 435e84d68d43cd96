// Licensed under the Apache License, Version 2.0.
//
// The product graph: an arena of memoized nodes, keyed by (subject, product, variants,
// selector shape), advanced towards a terminal state as their dependencies settle.

mod node;

pub use crate::node::{
    NodeKey, NodeState, Runnable, RuleKey, SelectDependenciesKey, SelectKey, SelectLiteralKey,
    SelectProjectionKey,
};

use std::collections::{HashMap, HashSet, VecDeque};

use engine_core::{Failure, Interner, Key, NoopReason, Value, FNV};
use tasks::Rules;

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Ord, PartialOrd)]
pub struct EntryId(usize);

/// Borrowed view of the collaborators an `Advance` needs to dispatch rules and read
/// interned values. Bundled together so every advance function takes one argument
/// instead of threading both through separately.
pub struct GraphContext<'a> {
    pub rules: &'a Rules,
    pub interner: &'a mut Interner,
}

/// Where a `SelectDependencies` node is in its two-step expansion: first resolve the
/// product holding the dependency list, then resolve one child per listed element.
#[derive(Clone, Debug)]
enum SelectDependenciesPhase {
    AwaitingDepProduct,
    AwaitingElements { element_ids: Vec<EntryId> },
}

/// Where a `SelectProjection` node is in its two-step expansion: first resolve the
/// input product, then resolve the product against the projected subject.
#[derive(Clone, Debug)]
enum SelectProjectionPhase {
    AwaitingInput,
    AwaitingProjected { entry_id: EntryId },
}

#[derive(Clone, Debug)]
enum Scratch {
    None,
    SelectDependencies(SelectDependenciesPhase),
    SelectProjection(SelectProjectionPhase),
}

pub struct Entry {
    id: EntryId,
    node: NodeKey,
    state: NodeState,
    initialized: bool,
    dependencies: Vec<EntryId>,
    dependents: Vec<EntryId>,
    cyclic_dependencies: Vec<EntryId>,
    scratch: Scratch,
}

impl Entry {
    pub fn id(&self) -> EntryId {
        self.id
    }

    pub fn node(&self) -> &NodeKey {
        &self.node
    }

    pub fn state(&self) -> &NodeState {
        &self.state
    }

    pub fn dependencies(&self) -> &[EntryId] {
        &self.dependencies
    }

    pub fn dependents(&self) -> &[EntryId] {
        &self.dependents
    }
}

type Nodes = HashMap<NodeKey, EntryId, FNV>;
type Entries = HashMap<EntryId, Entry, FNV>;

/// An arena-backed, content-addressed DAG of nodes. Nodes are indices into a table
/// rather than reference-counted pointers, which is what lets `invalidate` tear down a
/// subgraph by id without fighting the borrow checker over back-edges.
#[derive(Default)]
pub struct ProductGraph {
    id_generator: usize,
    nodes: Nodes,
    entries: Entries,
}

impl ProductGraph {
    pub fn new() -> ProductGraph {
        ProductGraph::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entry_for_id(&self, id: EntryId) -> &Entry {
        self.entries.get(&id).unwrap_or_else(|| panic!("invalid EntryId: {id:?}"))
    }

    fn entry_for_id_mut(&mut self, id: EntryId) -> &mut Entry {
        self.entries.get_mut(&id).unwrap_or_else(|| panic!("invalid EntryId: {id:?}"))
    }

    pub fn entry(&self, node: &NodeKey) -> Option<&Entry> {
        self.nodes.get(node).map(|&id| self.entry_for_id(id))
    }

    /// Returns the node for `key`, creating it in `Waiting` if absent. Idempotent.
    pub fn demand(&mut self, key: NodeKey) -> EntryId {
        if let Some(&id) = self.nodes.get(&key) {
            return id;
        }
        let id = EntryId(self.id_generator);
        self.id_generator += 1;
        self.nodes.insert(key.clone(), id);
        self.entries.insert(
            id,
            Entry {
                id,
                node: key,
                state: NodeState::Waiting,
                initialized: false,
                dependencies: Vec::new(),
                dependents: Vec::new(),
                cyclic_dependencies: Vec::new(),
                scratch: Scratch::None,
            },
        );
        id
    }

    fn set_state(&mut self, id: EntryId, state: NodeState) {
        log::trace!("{id:?} -> {state:?}");
        self.entry_for_id_mut(id).state = state;
    }

    fn dependencies_all<P: Fn(&Entry) -> bool>(&self, id: EntryId, predicate: P) -> bool {
        self.entry_for_id(id).dependencies.iter().all(|&d| predicate(self.entry_for_id(d)))
    }

    /// True if linking `src -> dst` would close a cycle (`dst` can already reach `src`
    /// through a chain of incomplete dependencies).
    fn would_cycle(&self, src: EntryId, dst: EntryId) -> bool {
        if self.dependencies_all(dst, |e| e.state.is_complete()) {
            return false;
        }
        let mut walked = HashSet::new();
        let mut deque = VecDeque::new();
        deque.push_back(dst);
        while let Some(id) = deque.pop_front() {
            if !walked.insert(id) {
                continue;
            }
            if id == src {
                return true;
            }
            let entry = self.entry_for_id(id);
            if entry.state.is_complete() {
                continue;
            }
            deque.extend(entry.dependencies.iter().copied());
        }
        false
    }

    /// Demands `dep_key` and records an edge `src -> dep`. Returns `None` (and records
    /// the edge as cyclic instead) when linking would close a cycle: the caller should
    /// treat that dependency as having settled `Noop(Cycle)` without waiting on it.
    fn add_dependency(&mut self, src: EntryId, dep_key: NodeKey) -> Option<EntryId> {
        let dep_id = self.demand(dep_key);
        if self.entry_for_id(src).dependencies.contains(&dep_id) {
            return Some(dep_id);
        }
        if self.entry_for_id(src).cyclic_dependencies.contains(&dep_id) {
            return None;
        }
        if self.would_cycle(src, dep_id) {
            self.entry_for_id_mut(src).cyclic_dependencies.push(dep_id);
            return None;
        }
        self.entry_for_id_mut(src).dependencies.push(dep_id);
        self.entry_for_id_mut(dep_id).dependents.push(src);
        Some(dep_id)
    }

    /// Advances `id` by one step: on a node's first visit, computes and links its
    /// dependencies (without waiting on them); on later visits, checks whether enough
    /// of them have settled to compute this node's own state. A no-op on nodes already
    /// in a terminal state or already `Runnable`.
    pub fn advance(&mut self, ctx: &mut GraphContext, id: EntryId) {
        if self.entry_for_id(id).state.is_complete() {
            return;
        }
        if matches!(self.entry_for_id(id).state, NodeState::Runnable(_)) {
            return;
        }
        match self.entry_for_id(id).node.clone() {
            NodeKey::Select(key) => self.advance_select(ctx, id, &key),
            NodeKey::SelectLiteral(key) => self.advance_select_literal(id, &key),
            NodeKey::SelectDependencies(key) => self.advance_select_dependencies(ctx, id, &key),
            NodeKey::SelectProjection(key) => self.advance_select_projection(ctx, id, &key),
            NodeKey::Rule(key) => self.advance_rule(ctx, id, &key),
        }
    }

    fn advance_select(&mut self, ctx: &mut GraphContext, id: EntryId, key: &SelectKey) {
        if !self.entry_for_id(id).initialized {
            self.entry_for_id_mut(id).initialized = true;

            if let Some(variant_key) = &key.variant_key {
                if key.variants.find(variant_key).is_none() {
                    self.set_state(id, NodeState::Noop(NoopReason::NoMatchingVariant));
                    return;
                }
            }

            let candidates = ctx.rules.candidates(key.subject.type_id(), key.product);
            if candidates.is_empty() {
                self.set_state(id, NodeState::Noop(NoopReason::NoSuchRule));
                return;
            }
            for rule_id in candidates {
                let dep_key = NodeKey::Rule(RuleKey {
                    rule_id,
                    subject: key.subject,
                    variants: key.variants.clone(),
                });
                self.add_dependency(id, dep_key);
            }
            return;
        }

        let dependencies = self.entry_for_id(id).dependencies.clone();
        let cyclic_count = self.entry_for_id(id).cyclic_dependencies.len();
        let mut returns = Vec::new();
        let mut noop_reasons = Vec::new();
        for dep_id in &dependencies {
            match self.entry_for_id(*dep_id).state() {
                NodeState::Throw(f) => {
                    self.set_state(id, NodeState::Throw(f.clone()));
                    return;
                }
                NodeState::Return(k) => returns.push(*k),
                NodeState::Noop(reason) => noop_reasons.push(*reason),
                NodeState::Waiting | NodeState::Runnable(_) => return,
            }
        }

        if returns.len() > 1 {
            self.set_state(
                id,
                NodeState::Throw(Failure::new("conflicting values produced for subject and product")),
            );
        } else if let Some(k) = returns.pop() {
            self.set_state(id, NodeState::Return(k));
        } else {
            if cyclic_count > 0 {
                noop_reasons.push(NoopReason::Cycle);
            }
            // A dependency Noop'd for several reasons at once (e.g. its own candidates
            // were all rejected for a mix of reasons, or one of them was itself a cycle);
            // keep the most surprising one, per `NoopReason`'s derived ordering.
            let reason = noop_reasons.into_iter().max().unwrap_or(NoopReason::NoApplicableCandidate);
            self.set_state(id, NodeState::Noop(reason));
        }
    }

    fn advance_select_literal(&mut self, id: EntryId, key: &SelectLiteralKey) {
        if !self.entry_for_id(id).initialized {
            self.entry_for_id_mut(id).initialized = true;
            let dep_key = NodeKey::Select(SelectKey {
                subject: key.subject,
                product: key.product,
                variant_key: None,
                variants: key.variants.clone(),
            });
            if self.add_dependency(id, dep_key).is_none() {
                self.set_state(id, NodeState::Noop(NoopReason::Cycle));
            }
            return;
        }

        let dep_id = self.entry_for_id(id).dependencies[0];
        self.forward(id, dep_id);
    }

    /// Copies a dependency's terminal state onto `id` verbatim. Used by node kinds that
    /// are pure pass-throughs once their one real dependency resolves.
    fn forward(&mut self, id: EntryId, dep_id: EntryId) {
        let state = match self.entry_for_id(dep_id).state() {
            NodeState::Waiting | NodeState::Runnable(_) => return,
            NodeState::Return(k) => NodeState::Return(*k),
            NodeState::Throw(f) => NodeState::Throw(f.clone()),
            NodeState::Noop(r) => NodeState::Noop(*r),
        };
        self.set_state(id, state);
    }

    fn advance_select_dependencies(
        &mut self,
        ctx: &mut GraphContext,
        id: EntryId,
        key: &SelectDependenciesKey,
    ) {
        if !self.entry_for_id(id).initialized {
            self.entry_for_id_mut(id).initialized = true;
            self.entry_for_id_mut(id).scratch =
                Scratch::SelectDependencies(SelectDependenciesPhase::AwaitingDepProduct);
            let dep_key = NodeKey::Select(SelectKey {
                subject: key.subject,
                product: key.selector.dep_product,
                variant_key: None,
                variants: key.variants.clone(),
            });
            if self.add_dependency(id, dep_key).is_none() {
                self.set_state(id, NodeState::Noop(NoopReason::Cycle));
            }
            return;
        }

        let phase = match &self.entry_for_id(id).scratch {
            Scratch::SelectDependencies(phase) => phase.clone(),
            _ => unreachable!("SelectDependencies entry without SelectDependencies scratch"),
        };

        match phase {
            SelectDependenciesPhase::AwaitingDepProduct => {
                let dep_product_id = self.entry_for_id(id).dependencies[0];
                let dep_product_key = match self.entry_for_id(dep_product_id).state() {
                    NodeState::Waiting | NodeState::Runnable(_) => return,
                    NodeState::Throw(f) => {
                        let f = f.clone();
                        self.set_state(id, NodeState::Throw(f));
                        return;
                    }
                    NodeState::Noop(r) => {
                        let r = *r;
                        self.set_state(id, NodeState::Noop(r));
                        return;
                    }
                    NodeState::Return(k) => *k,
                };

                let elements: Vec<Value> = match ctx.interner.get(dep_product_key).as_list() {
                    Some(items) => items.to_vec(),
                    None => {
                        self.set_state(
                            id,
                            NodeState::Throw(Failure::new(format!(
                                "field {:?} on {:?} is not a list",
                                key.selector.field, key.selector.dep_product
                            ))),
                        );
                        return;
                    }
                };

                if elements.is_empty() {
                    let empty = ctx.interner.put(Value::List(Vec::new()));
                    self.set_state(id, NodeState::Return(empty));
                    return;
                }

                let mut element_ids = Vec::with_capacity(elements.len());
                for element in elements {
                    let element_key = ctx.interner.put(element);
                    let dep_key = NodeKey::Select(SelectKey {
                        subject: element_key,
                        product: key.selector.product,
                        variant_key: None,
                        variants: key.variants.clone(),
                    });
                    match self.add_dependency(id, dep_key) {
                        Some(dep_id) => element_ids.push(dep_id),
                        None => {
                            self.set_state(id, NodeState::Noop(NoopReason::Cycle));
                            return;
                        }
                    }
                }
                self.entry_for_id_mut(id).scratch =
                    Scratch::SelectDependencies(SelectDependenciesPhase::AwaitingElements { element_ids });
            }
            SelectDependenciesPhase::AwaitingElements { element_ids } => {
                let mut values = Vec::with_capacity(element_ids.len());
                for element_id in &element_ids {
                    match self.entry_for_id(*element_id).state() {
                        NodeState::Waiting | NodeState::Runnable(_) => return,
                        NodeState::Throw(f) => {
                            let f = f.clone();
                            self.set_state(id, NodeState::Throw(f));
                            return;
                        }
                        NodeState::Noop(r) => {
                            let r = *r;
                            self.set_state(id, NodeState::Noop(r));
                            return;
                        }
                        NodeState::Return(k) => values.push(ctx.interner.get(*k).clone()),
                    }
                }
                let list_key = ctx.interner.put(Value::List(values));
                self.set_state(id, NodeState::Return(list_key));
            }
        }
    }

    fn advance_select_projection(
        &mut self,
        ctx: &mut GraphContext,
        id: EntryId,
        key: &SelectProjectionKey,
    ) {
        if !self.entry_for_id(id).initialized {
            self.entry_for_id_mut(id).initialized = true;
            self.entry_for_id_mut(id).scratch =
                Scratch::SelectProjection(SelectProjectionPhase::AwaitingInput);
            let dep_key = NodeKey::Select(SelectKey {
                subject: key.subject,
                product: key.selector.input_product,
                variant_key: None,
                variants: key.variants.clone(),
            });
            if self.add_dependency(id, dep_key).is_none() {
                self.set_state(id, NodeState::Noop(NoopReason::Cycle));
            }
            return;
        }

        let phase = match &self.entry_for_id(id).scratch {
            Scratch::SelectProjection(phase) => phase.clone(),
            _ => unreachable!("SelectProjection entry without SelectProjection scratch"),
        };

        match phase {
            SelectProjectionPhase::AwaitingInput => {
                let input_id = self.entry_for_id(id).dependencies[0];
                let input_key = match self.entry_for_id(input_id).state() {
                    NodeState::Waiting | NodeState::Runnable(_) => return,
                    NodeState::Throw(f) => {
                        let f = f.clone();
                        self.set_state(id, NodeState::Throw(f));
                        return;
                    }
                    NodeState::Noop(r) => {
                        let r = *r;
                        self.set_state(id, NodeState::Noop(r));
                        return;
                    }
                    NodeState::Return(k) => *k,
                };

                let projected = match ctx.interner.get(input_key).field(&key.selector.field) {
                    Ok(v) => v.clone(),
                    Err(msg) => {
                        self.set_state(id, NodeState::Throw(Failure::new(msg)));
                        return;
                    }
                };
                let projected_key = ctx.interner.put_typed(projected, key.selector.projected_subject_type);
                let dep_key = NodeKey::Select(SelectKey {
                    subject: projected_key,
                    product: key.selector.product,
                    variant_key: None,
                    variants: key.variants.clone(),
                });
                match self.add_dependency(id, dep_key) {
                    Some(entry_id) => {
                        self.entry_for_id_mut(id).scratch =
                            Scratch::SelectProjection(SelectProjectionPhase::AwaitingProjected { entry_id });
                    }
                    None => self.set_state(id, NodeState::Noop(NoopReason::Cycle)),
                }
            }
            SelectProjectionPhase::AwaitingProjected { entry_id } => self.forward(id, entry_id),
        }
    }

    fn advance_rule(&mut self, ctx: &mut GraphContext, id: EntryId, key: &RuleKey) {
        if !self.entry_for_id(id).initialized {
            self.entry_for_id_mut(id).initialized = true;
            let rule = ctx.rules.get(key.rule_id);
            let clause = rule.clause.clone();
            for selector in &clause {
                let dep_key = NodeKey::from_selector(selector, key.subject, &key.variants);
                if self.add_dependency(id, dep_key).is_none() {
                    self.set_state(id, NodeState::Noop(NoopReason::Cycle));
                    return;
                }
            }
            if clause.is_empty() {
                let rule = ctx.rules.get(key.rule_id);
                self.set_state(
                    id,
                    NodeState::Runnable(Runnable {
                        rule_id: key.rule_id,
                        func: rule.func.clone(),
                        subject: key.subject,
                        args: Vec::new(),
                        cacheable: rule.cacheable,
                    }),
                );
            }
            return;
        }

        let dependencies = self.entry_for_id(id).dependencies.clone();
        let mut args = Vec::with_capacity(dependencies.len());
        for dep_id in &dependencies {
            match self.entry_for_id(*dep_id).state() {
                NodeState::Waiting | NodeState::Runnable(_) => return,
                NodeState::Throw(f) => {
                    let f = f.clone();
                    self.set_state(id, NodeState::Throw(f));
                    return;
                }
                NodeState::Noop(r) => {
                    let r = *r;
                    self.set_state(id, NodeState::Noop(r));
                    return;
                }
                NodeState::Return(k) => args.push(*k),
            }
        }
        let rule = ctx.rules.get(key.rule_id);
        self.set_state(
            id,
            NodeState::Runnable(Runnable {
                rule_id: key.rule_id,
                func: rule.func.clone(),
                subject: key.subject,
                args,
                cacheable: rule.cacheable,
            }),
        );
    }

    /// Transitions a `Runnable` node to a terminal state. Must be called exactly once
    /// per `Runnable` instance, with the result of invoking the function it captured.
    pub fn complete(&mut self, id: EntryId, result: Result<Key, Failure>) {
        let entry = self.entry_for_id(id);
        assert!(
            matches!(entry.state, NodeState::Runnable(_)),
            "complete() called on non-Runnable node {id:?}: {:?}",
            entry.state
        );
        let state = match result {
            Ok(k) => NodeState::Return(k),
            Err(f) => NodeState::Throw(f),
        };
        self.set_state(id, state);
    }

    /// Removes every node whose `NodeKey` matches `predicate`, plus every ancestor that
    /// transitively depends on one (directly or not), returning the number removed.
    pub fn invalidate<P: Fn(&NodeKey) -> bool>(&mut self, predicate: P) -> usize {
        let roots: VecDeque<EntryId> = self
            .nodes
            .iter()
            .filter_map(|(node, &id)| if predicate(node) { Some(id) } else { None })
            .collect();

        let ids: HashSet<EntryId> = self.walk(roots, true).map(|e| e.id()).collect();
        if ids.is_empty() {
            return 0;
        }

        for &id in &ids {
            let dep_ids = self.entries[&id].dependencies.clone();
            for dep_id in dep_ids {
                if let Some(entry) = self.entries.get_mut(&dep_id) {
                    entry.dependents.retain(|&d| d != id);
                }
            }
            self.entries.remove(&id);
        }
        self.nodes.retain(|_, id| !ids.contains(id));

        ids.len()
    }

    /// Walks the graph from `roots`, following dependents when `dependents` is true and
    /// dependencies otherwise, yielding each reachable entry exactly once.
    pub fn walk(&self, roots: impl IntoIterator<Item = EntryId>, dependents: bool) -> Walk<'_> {
        Walk {
            graph: self,
            dependents,
            deque: roots.into_iter().collect(),
            walked: HashSet::new(),
        }
    }

    /// Renders the subgraph reachable from `roots` as a DOT digraph for debugging.
    pub fn visualize(&self, roots: &[EntryId]) -> String {
        let mut out = String::new();
        out.push_str("digraph plans {\n");
        out.push_str("  concentrate=true;\n  rankdir=LR;\n");

        for entry in self.walk(roots.iter().copied(), false) {
            let label = format!(
                "{}:{:?} == {:?}",
                entry.node().format(),
                entry.node().subject(),
                entry.state()
            )
            .replace('"', "\\\"");
            let color = match entry.state() {
                NodeState::Return(_) => "palegreen",
                NodeState::Throw(_) => "tomato",
                NodeState::Noop(_) => "white",
                NodeState::Waiting | NodeState::Runnable(_) => "lightgray",
            };
            out.push_str(&format!("  \"{label}\" [style=filled, fillcolor={color}];\n"));
            for &dep_id in entry.dependencies() {
                let dep = self.entry_for_id(dep_id);
                let dep_label = format!(
                    "{}:{:?} == {:?}",
                    dep.node().format(),
                    dep.node().subject(),
                    dep.state()
                )
                .replace('"', "\\\"");
                out.push_str(&format!("  \"{label}\" -> \"{dep_label}\";\n"));
            }
        }
        out.push_str("}\n");
        out
    }

    /// Renders a depth-first trace of how `root` reached its current state, for
    /// debugging a `Noop` or `Throw` that surprised a caller.
    pub fn trace(&self, root: EntryId) -> String {
        let mut out = String::new();
        self.trace_into(root, 0, &mut out);
        out
    }

    fn trace_into(&self, id: EntryId, depth: usize, out: &mut String) {
        let entry = self.entry_for_id(id);
        let indent = "  ".repeat(depth);
        out.push_str(&format!(
            "{indent}{} for {:?}: {:?}\n",
            entry.node().format(),
            entry.node().subject(),
            entry.state()
        ));
        for &dep_id in entry.dependencies() {
            self.trace_into(dep_id, depth + 1, out);
        }
    }
}

pub struct Walk<'a> {
    graph: &'a ProductGraph,
    dependents: bool,
    deque: VecDeque<EntryId>,
    walked: HashSet<EntryId>,
}

impl<'a> Iterator for Walk<'a> {
    type Item = &'a Entry;

    fn next(&mut self) -> Option<&'a Entry> {
        while let Some(id) = self.deque.pop_front() {
            if !self.walked.insert(id) {
                continue;
            }
            let entry = self.graph.entry_for_id(id);
            if self.dependents {
                self.deque.extend(entry.dependents.iter().copied());
            } else {
                self.deque.extend(entry.dependencies.iter().copied());
            }
            return Some(entry);
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use engine_core::{Function, TypeId, TypeRegistry, Variants};
    use selectors::Selector;
    use std::sync::Arc;

    fn harness() -> (ProductGraph, Interner, Rules, TypeRegistry) {
        (ProductGraph::new(), Interner::new(), Rules::new(), TypeRegistry::new())
    }

    fn echo_body() -> tasks::RuleFn {
        Arc::new(|subject, _deps| Ok(subject.clone()))
    }

    #[test]
    fn select_with_no_candidates_noops() {
        let (mut graph, mut interner, rules, _types) = harness();
        let subject = interner.put_typed(Value::Int(1), TypeId::new(1));
        let product = TypeId::new(2);

        let id = graph.demand(NodeKey::Select(SelectKey {
            subject,
            product,
            variant_key: None,
            variants: Variants::default(),
        }));
        let mut ctx = GraphContext { rules: &rules, interner: &mut interner };
        graph.advance(&mut ctx, id);

        assert!(matches!(graph.entry_for_id(id).state(), NodeState::Noop(NoopReason::NoSuchRule)));
    }

    #[test]
    fn rule_with_empty_clause_is_immediately_runnable() {
        let (mut graph, mut interner, mut rules, _types) = harness();
        let subject_type = TypeId::new(1);
        let product = TypeId::new(2);
        let rule_id = rules.register_intrinsic(subject_type, product, Function::new("stat"), echo_body());
        let subject = interner.put_typed(Value::Str("x".to_string()), subject_type);

        let id = graph.demand(NodeKey::Rule(RuleKey {
            rule_id,
            subject,
            variants: Variants::default(),
        }));
        let mut ctx = GraphContext { rules: &rules, interner: &mut interner };
        graph.advance(&mut ctx, id);

        assert!(matches!(graph.entry_for_id(id).state(), NodeState::Runnable(_)));
    }

    #[test]
    fn select_memoizes_identical_demands() {
        let (mut graph, mut interner, _rules, _types) = harness();
        let subject = interner.put_typed(Value::Int(7), TypeId::new(1));
        let key = NodeKey::Select(SelectKey {
            subject,
            product: TypeId::new(2),
            variant_key: None,
            variants: Variants::default(),
        });
        let a = graph.demand(key.clone());
        let b = graph.demand(key);
        assert_eq!(a, b);
        assert_eq!(graph.len(), 1);
    }

    #[test]
    fn full_chain_select_of_select_returns() {
        // Int <- Select(Str)(len), Str <- Select()(load)
        let (mut graph, mut interner, mut rules, _types) = harness();
        let subject_type = TypeId::new(1);
        let str_ty = TypeId::new(2);
        let int_ty = TypeId::new(3);

        rules.register_rule(str_ty, vec![], Function::new("load"), Arc::new(|_s, _d| Ok(Value::Str("hello".to_string()))));
        rules.register_rule(
            int_ty,
            vec![Selector::select(str_ty)],
            Function::new("len"),
            Arc::new(|_s, deps| Ok(Value::Int(deps[0].as_str().unwrap().len() as i64))),
        );

        let subject = interner.put_typed(Value::Str("addr-x".to_string()), subject_type);
        let root = graph.demand(NodeKey::Select(SelectKey {
            subject,
            product: int_ty,
            variant_key: None,
            variants: Variants::default(),
        }));

        // Drive to a fixed point: repeatedly advance every known entry.
        for _ in 0..10 {
            let ids: Vec<EntryId> = graph.entries.keys().copied().collect();
            let mut ctx = GraphContext { rules: &rules, interner: &mut interner };
            for id in ids {
                graph.advance(&mut ctx, id);
            }
            // Resolve any newly-runnable rule nodes synchronously, as a test double for
            // the external execution adapter.
            let runnable: Vec<(EntryId, Runnable)> = graph
                .entries
                .values()
                .filter_map(|e| match e.state() {
                    NodeState::Runnable(r) => Some((e.id(), r.clone())),
                    _ => None,
                })
                .collect();
            for (id, runnable) in runnable {
                let rule = rules.get(runnable.rule_id);
                let subject_value = interner.get(runnable.subject).clone();
                let args: Vec<Value> = runnable.args.iter().map(|k| interner.get(*k).clone()).collect();
                let result = (rule.body)(&subject_value, &args).map(|v| interner.put(v));
                graph.complete(id, result);
            }
        }

        match graph.entry_for_id(root).state() {
            NodeState::Return(k) => assert_eq!(interner.get(*k), &Value::Int(5)),
            other => panic!("expected Return, got {other:?}"),
        }
        // three nodes: the root Select, its one candidate Rule, and the nested Select(Str)
        // plus its candidate Rule -> four entries total.
        assert_eq!(graph.len(), 4);
    }

    #[test]
    fn cycle_settles_as_noop_not_panic() {
        // A <- Select(B), B <- Select(A): requesting A from any subject must terminate.
        let (mut graph, mut interner, mut rules, _types) = harness();
        let a_ty = TypeId::new(10);
        let b_ty = TypeId::new(11);
        rules.register_rule(a_ty, vec![Selector::select(b_ty)], Function::new("a"), echo_body());
        rules.register_rule(b_ty, vec![Selector::select(a_ty)], Function::new("b"), echo_body());

        let subject = interner.put_typed(Value::Int(1), TypeId::new(1));
        let root = graph.demand(NodeKey::Select(SelectKey {
            subject,
            product: a_ty,
            variant_key: None,
            variants: Variants::default(),
        }));

        for _ in 0..20 {
            let ids: Vec<EntryId> = graph.entries.keys().copied().collect();
            let mut ctx = GraphContext { rules: &rules, interner: &mut interner };
            for id in ids {
                graph.advance(&mut ctx, id);
            }
        }

        assert!(matches!(graph.entry_for_id(root).state(), NodeState::Noop(NoopReason::Cycle)));
    }

    #[test]
    fn invalidate_removes_dependents_transitively() {
        let (mut graph, mut interner, _rules, _types) = harness();
        let subject = interner.put_typed(Value::Int(1), TypeId::new(1));
        let leaf_key = NodeKey::Select(SelectKey {
            subject,
            product: TypeId::new(2),
            variant_key: None,
            variants: Variants::default(),
        });
        let leaf = graph.demand(leaf_key.clone());
        let parent = graph.demand(NodeKey::SelectLiteral(SelectLiteralKey {
            subject,
            product: TypeId::new(2),
            variants: Variants::default(),
        }));
        graph.add_dependency(parent, leaf_key);
        assert_eq!(graph.len(), 2);

        let removed = graph.invalidate(|n| n.subject() == subject && matches!(n, NodeKey::Select(_)));
        assert_eq!(removed, 2);
        assert!(graph.entry(&NodeKey::Select(SelectKey {
            subject,
            product: TypeId::new(2),
            variant_key: None,
            variants: Variants::default(),
        })).is_none());
        let _ = leaf;
    }
}
