// Licensed under the Apache License, Version 2.0.

use engine_core::{Failure, Function, Key, NoopReason, TypeId, Variants};
use selectors::{Selector, SelectDependencies, SelectProjection};
use tasks::RuleId;

/// Requests `product` for `subject`, narrowed by `variant_key` when one is declared.
/// Backs both `Select` and `SelectVariant` selectors: the only difference between them
/// is whether `variant_key` is populated, and both dispatch to the rule registry the
/// same way once that narrowing check passes.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct SelectKey {
    pub subject: Key,
    pub product: TypeId,
    pub variant_key: Option<String>,
    pub variants: Variants,
}

#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct SelectLiteralKey {
    pub subject: Key,
    pub product: TypeId,
    pub variants: Variants,
}

#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct SelectDependenciesKey {
    pub subject: Key,
    pub selector: SelectDependencies,
    pub variants: Variants,
}

#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct SelectProjectionKey {
    pub subject: Key,
    pub selector: SelectProjection,
    pub variants: Variants,
}

/// One attempt to satisfy a `Select`-shaped demand by running a specific candidate
/// rule's clause to completion and then invoking the rule's function.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct RuleKey {
    pub rule_id: RuleId,
    pub subject: Key,
    pub variants: Variants,
}

/// Uniquely identifies a node in the product graph. Two keys that compare equal are the
/// same node: nodes are deduplicated by this identity, which is how memoization works.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub enum NodeKey {
    Select(SelectKey),
    SelectLiteral(SelectLiteralKey),
    SelectDependencies(SelectDependenciesKey),
    SelectProjection(SelectProjectionKey),
    Rule(RuleKey),
}

impl NodeKey {
    /// Builds the node key a selector evaluates to when run against `subject` with the
    /// given `variants`. `SelectLiteral` ignores `subject` entirely, per its contract.
    pub fn from_selector(selector: &Selector, subject: Key, variants: &Variants) -> NodeKey {
        match selector {
            Selector::Select(s) => NodeKey::Select(SelectKey {
                subject,
                product: s.product,
                variant_key: None,
                variants: variants.clone(),
            }),
            Selector::SelectVariant(s) => NodeKey::Select(SelectKey {
                subject,
                product: s.product,
                variant_key: Some(s.variant_key.clone()),
                variants: variants.clone(),
            }),
            Selector::SelectLiteral(s) => NodeKey::SelectLiteral(SelectLiteralKey {
                subject: s.subject,
                product: s.product,
                variants: variants.clone(),
            }),
            Selector::SelectDependencies(s) => NodeKey::SelectDependencies(SelectDependenciesKey {
                subject,
                selector: s.clone(),
                variants: variants.clone(),
            }),
            Selector::SelectProjection(s) => NodeKey::SelectProjection(SelectProjectionKey {
                subject,
                selector: s.clone(),
                variants: variants.clone(),
            }),
        }
    }

    /// The product this node resolves to, for node kinds where that's defined
    /// independent of any rule dispatch. `Rule` nodes have none of their own: their
    /// product is whatever the wrapping `Select` demanded.
    pub fn product(&self) -> Option<TypeId> {
        match self {
            NodeKey::Select(s) => Some(s.product),
            NodeKey::SelectLiteral(s) => Some(s.product),
            NodeKey::SelectDependencies(s) => Some(s.selector.product),
            NodeKey::SelectProjection(s) => Some(s.selector.product),
            NodeKey::Rule(_) => None,
        }
    }

    pub fn subject(&self) -> Key {
        match self {
            NodeKey::Select(s) => s.subject,
            NodeKey::SelectLiteral(s) => s.subject,
            NodeKey::SelectDependencies(s) => s.subject,
            NodeKey::SelectProjection(s) => s.subject,
            NodeKey::Rule(s) => s.subject,
        }
    }

    pub fn format(&self) -> String {
        match self {
            NodeKey::Select(s) => format!("Select({:?})", s.product),
            NodeKey::SelectLiteral(s) => format!("SelectLiteral({:?})", s.product),
            NodeKey::SelectDependencies(s) => format!("SelectDependencies({:?})", s.selector.product),
            NodeKey::SelectProjection(s) => format!("SelectProjection({:?})", s.selector.product),
            NodeKey::Rule(s) => format!("Rule({:?})", s.rule_id),
        }
    }
}

/// A node settled as `Runnable`: the caller should invoke `rule_id`'s function with
/// `subject` and `args` (already-resolved clause values, in clause order) and report
/// the outcome back via `ProductGraph::complete`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Runnable {
    pub rule_id: RuleId,
    pub func: Function,
    pub subject: Key,
    pub args: Vec<Key>,
    pub cacheable: bool,
}

/// The state of one node. Only `Rule` nodes ever become `Runnable`; every other node
/// kind settles purely by composing the states of its dependencies.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum NodeState {
    Waiting,
    Runnable(Runnable),
    Return(Key),
    Throw(Failure),
    Noop(NoopReason),
}

impl NodeState {
    pub fn is_complete(&self) -> bool {
        !matches!(self, NodeState::Waiting | NodeState::Runnable(_))
    }

    pub fn as_return(&self) -> Option<Key> {
        match self {
            NodeState::Return(k) => Some(*k),
            _ => None,
        }
    }
}
