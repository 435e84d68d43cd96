// Licensed under the Apache License, Version 2.0.
//
// The rule registry: holds user rules and intrinsic (built-in) rules, indexed by
// output product type, and resolves candidates for a given subject/product demand.

use std::collections::HashMap;
use std::sync::Arc;

use engine_core::{Failure, Function, TypeId, Value, FNV};
use selectors::Selector;

/// A rule invocation body: given the current subject and the (already-resolved)
/// values its selector clause asked for, in clause order, produce a product value or
/// fail. Intrinsics are registered with an empty clause, so they only ever see the
/// subject; ordinary rules are registered with the clause they declare.
pub type RuleFn = Arc<dyn Fn(&Value, &[Value]) -> Result<Value, Failure> + Send + Sync>;

/// Identifies one registered rule within a `Rules` registry. Cheap to copy and to use
/// as a graph-node key component (unlike `Rule` itself, which embeds a non-`Hash`
/// closure).
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Ord, PartialOrd)]
pub struct RuleId(usize);

/// A concrete rule: an output product, an ordered selector clause, and the pure
/// function that computes the product from the clause's resolved values.
pub struct Rule {
    pub id: RuleId,
    pub subject_type: Option<TypeId>,
    pub product: TypeId,
    pub clause: Vec<Selector>,
    pub func: Function,
    /// False for intrinsic rules: their results are never memoized across
    /// invalidations, since they represent a direct read of external, possibly-dirty
    /// state (filesystem stats, process execution).
    pub cacheable: bool,
    pub body: RuleFn,
}

impl std::fmt::Debug for Rule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rule")
            .field("id", &self.id)
            .field("subject_type", &self.subject_type)
            .field("product", &self.product)
            .field("clause", &self.clause)
            .field("func", &self.func)
            .field("cacheable", &self.cacheable)
            .finish()
    }
}

/// Registry of rules able to produce each product type, plus the intrinsics that are
/// the default for a specific `(subject_type, product_type)` pair.
///
/// Candidate order for a demand is: intrinsics for `(subject_type, product_type)`
/// first, then user rules for `product_type`, each group in registration order.
#[derive(Default)]
pub struct Rules {
    all: Vec<Rule>,
    intrinsics_by_demand: HashMap<(TypeId, TypeId), Vec<RuleId>, FNV>,
    rules_by_product: HashMap<TypeId, Vec<RuleId>, FNV>,
}

impl Rules {
    pub fn new() -> Rules {
        Rules::default()
    }

    /// Registers a cacheable user rule producing `product` from `clause`.
    pub fn register_rule(
        &mut self,
        product: TypeId,
        clause: Vec<Selector>,
        func: Function,
        body: RuleFn,
    ) -> RuleId {
        let id = RuleId(self.all.len());
        self.all.push(Rule {
            id,
            subject_type: None,
            product,
            clause,
            func,
            cacheable: true,
            body,
        });
        self
            .rules_by_product
            .entry(product)
            .or_default()
            .push(id);
        log::debug!("registered rule {id:?} producing {product:?}");
        id
    }

    /// Registers a non-cacheable default for `(subject_type, product_type)`. An
    /// intrinsic's clause is empty: its body receives the subject directly and no
    /// resolved selector values.
    pub fn register_intrinsic(
        &mut self,
        subject_type: TypeId,
        product: TypeId,
        func: Function,
        body: RuleFn,
    ) -> RuleId {
        let id = RuleId(self.all.len());
        self.all.push(Rule {
            id,
            subject_type: Some(subject_type),
            product,
            clause: Vec::new(),
            func,
            cacheable: false,
            body,
        });
        self
            .intrinsics_by_demand
            .entry((subject_type, product))
            .or_default()
            .push(id);
        log::debug!("registered intrinsic {id:?} for ({subject_type:?}, {product:?})");
        id
    }

    pub fn get(&self, id: RuleId) -> &Rule {
        &self.all[id.0]
    }

    /// Enumerates candidate rules for a `(subject_type, product_type)` demand:
    /// intrinsics first, then user rules, each in registration order.
    pub fn candidates(&self, subject_type: TypeId, product: TypeId) -> Vec<RuleId> {
        let mut candidates = self
            .intrinsics_by_demand
            .get(&(subject_type, product))
            .cloned()
            .unwrap_or_default();
        candidates.extend(
            self.rules_by_product
                .get(&product)
                .cloned()
                .unwrap_or_default(),
        );
        candidates
    }

    /// All distinct product types any rule (intrinsic or user) can produce — used by
    /// a ruleset validator to know which demands are even candidates for reachability.
    pub fn all_products(&self) -> Vec<TypeId> {
        let mut products: Vec<TypeId> = self.all.iter().map(|r| r.product).collect();
        products.sort_by_key(|t| format!("{t:?}"));
        products.dedup();
        products
    }

    pub fn all_rules(&self) -> &[Rule] {
        &self.all
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop_fn() -> RuleFn {
        Arc::new(|_subject, _deps| Ok(Value::Unit))
    }

    #[test]
    fn intrinsics_precede_user_rules() {
        let mut rules = Rules::new();
        let subject_type = TypeId::new(1);
        let product = TypeId::new(2);

        let user_rule = rules.register_rule(product, vec![], Function::new("user"), noop_fn());
        let intrinsic = rules.register_intrinsic(
            subject_type,
            product,
            Function::new("intrinsic"),
            noop_fn(),
        );

        let candidates = rules.candidates(subject_type, product);
        assert_eq!(candidates, vec![intrinsic, user_rule]);
    }

    #[test]
    fn registration_order_breaks_ties_among_user_rules() {
        let mut rules = Rules::new();
        let product = TypeId::new(2);
        let first = rules.register_rule(product, vec![], Function::new("first"), noop_fn());
        let second = rules.register_rule(product, vec![], Function::new("second"), noop_fn());

        let candidates = rules.candidates(TypeId::new(99), product);
        assert_eq!(candidates, vec![first, second]);
    }

    #[test]
    fn no_candidates_for_unregistered_demand() {
        let rules = Rules::new();
        assert!(rules.candidates(TypeId::new(1), TypeId::new(2)).is_empty());
    }
}
