// Licensed under the Apache License, Version 2.0.
//
// Interning store and subject/product data model shared by every other crate in this
// workspace.

mod interning;
mod value;

pub use crate::interning::{Id, Interner, Key};
pub use crate::value::Value;

use std::hash;

/// `FNV` is used anywhere a `Key`/`TypeId`-keyed map needs a cheap, non-cryptographic
/// hasher: these maps are populated by trusted, already-hashed internal ids, so there's
/// no adversarial-input reason to pay for SipHash.
pub type FNV = hash::BuildHasherDefault<fnv::FnvHasher>;

/// A tag identifying a product or subject type. Product types form a closed set:
/// callers register a small, fixed number of named types up front via `TypeRegistry`,
/// and every `TypeId` in a running scheduler was handed out by exactly one registry.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Ord, PartialOrd)]
pub struct TypeId(u32);

impl TypeId {
    pub fn new(id: u32) -> TypeId {
        TypeId(id)
    }
}

/// The implicit type tag used by `Interner::put` for values whose type is not
/// otherwise meaningful to the scheduler.
pub const ANY_TYPE: TypeId = TypeId(0);

/// A registry of the closed set of subject/product type names a scheduler instance
/// knows about. `TypeId`s are only comparable meaningfully within one `TypeRegistry`.
#[derive(Default)]
pub struct TypeRegistry {
    names: Vec<&'static str>,
    by_name: std::collections::HashMap<&'static str, TypeId, FNV>,
}

impl TypeRegistry {
    pub fn new() -> TypeRegistry {
        let mut registry = TypeRegistry::default();
        // Reserve id 0 for ANY_TYPE so that user-registered types never collide with it.
        registry.names.push("<any>");
        registry.by_name.insert("<any>", ANY_TYPE);
        registry
    }

    /// Interns `name`, returning the same `TypeId` for repeated registrations of the
    /// same name (a rule registry commonly registers a product type once per rule that
    /// produces it).
    pub fn intern(&mut self, name: &'static str) -> TypeId {
        if let Some(&id) = self.by_name.get(name) {
            return id;
        }
        let id = TypeId(self.names.len() as u32);
        self.names.push(name);
        self.by_name.insert(name, id);
        id
    }

    pub fn name(&self, type_id: TypeId) -> &'static str {
        self.names[type_id.0 as usize]
    }
}

/// A string->string map, stored sorted for hashability and deterministic merging.
#[derive(Clone, Debug, Default, Eq, Hash, PartialEq)]
pub struct Variants(pub Vec<(String, String)>);

impl Variants {
    pub fn find(&self, key: &str) -> Option<&str> {
        self.0.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
    }

    /// Merges `right` over `self` (by key, then sorted by key).
    pub fn merge(&self, right: &Variants) -> Variants {
        let mut merged: std::collections::BTreeMap<String, String> =
            self.0.iter().cloned().collect();
        merged.extend(right.0.iter().cloned());
        Variants(merged.into_iter().collect())
    }
}

/// Identifies the pure function a runnable node should invoke. Identity is by name:
/// two `Function`s with the same name are the same function.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct Function(pub std::sync::Arc<str>);

impl Function {
    pub fn new(name: impl Into<std::sync::Arc<str>>) -> Function {
        Function(name.into())
    }
}

impl std::fmt::Display for Function {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Why a node settled as `Noop` rather than computing a value. Variants are ordered
/// from "most expected" to "most surprising" so that a parent combining several
/// Noop'd alternatives (a failed candidate yields Noop; the next is tried) can
/// deterministically keep the most informative one.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd)]
pub enum NoopReason {
    /// No registered rule could produce the requested product for the subject type.
    NoSuchRule,
    /// A candidate rule's `SelectVariant` key was not present in the subject's variants.
    NoMatchingVariant,
    /// Every candidate rule for a product was tried and none matched.
    NoApplicableCandidate,
    /// Adding this dependency edge would have closed a cycle in the product graph.
    Cycle,
}

impl std::fmt::Display for NoopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let msg = match self {
            NoopReason::NoSuchRule => "no rule was registered for this subject/product pair",
            NoopReason::NoMatchingVariant => "no matching variant key was configured",
            NoopReason::NoApplicableCandidate => "no candidate rule could be satisfied",
            NoopReason::Cycle => "dependency graph would have contained a cycle",
        };
        write!(f, "{msg}")
    }
}

/// A rule raised an error, or an intrinsic hit a hard I/O fault.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Failure(pub String);

impl std::fmt::Display for Failure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Failure {
    pub fn new(msg: impl Into<String>) -> Failure {
        Failure(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_registry_interns_idempotently() {
        let mut registry = TypeRegistry::new();
        let a = registry.intern("Address");
        let b = registry.intern("Address");
        assert_eq!(a, b);
        assert_eq!(registry.name(a), "Address");
    }

    #[test]
    fn variants_merge_prefers_right_and_sorts() {
        let left = Variants(vec![("a".to_string(), "1".to_string())]);
        let right = Variants(vec![
            ("a".to_string(), "2".to_string()),
            ("b".to_string(), "3".to_string()),
        ]);
        let merged = left.merge(&right);
        assert_eq!(
            merged.0,
            vec![("a".to_string(), "2".to_string()), ("b".to_string(), "3".to_string())]
        );
    }

    #[test]
    fn noop_reason_orders_cycle_as_most_surprising() {
        assert!(NoopReason::NoSuchRule < NoopReason::Cycle);
    }
}
