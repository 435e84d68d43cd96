// Licensed under the Apache License, Version 2.0.
//
// Static ruleset validation: walks the rule set as a bipartite graph from
// `(subject_type, product_type)` demands to the rules that can satisfy them, starting
// from the legal root subject types the caller declares, and reports every demand that
// turns out to be unreachable. Runs once, after every rule is registered and before any
// root is admitted, so a misspelled selector or a missing rule is a startup error
// rather than a runtime Noop three layers deep.

use std::collections::{HashSet, VecDeque};

use engine_core::TypeId;
use selectors::Selector;
use tasks::Rules;

/// One `(subject_type, product_type)` demand that no registered rule can satisfy from
/// any subject type reachable from the declared roots.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct UnreachableDemand {
    pub subject_type: TypeId,
    pub product: TypeId,
}

/// Collects every unreachable demand found during one validation pass. Empty means the
/// ruleset is sound: every demand reachable from the declared roots has a candidate.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ValidationError {
    pub unreachable: Vec<UnreachableDemand>,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "ruleset validation failed: {} unreachable demand(s)", self.unreachable.len())?;
        for demand in &self.unreachable {
            writeln!(
                f,
                "  no rule produces {:?} from subject type {:?}",
                demand.product, demand.subject_type
            )?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

/// Validates that every product reachable from `legal_root_subject_types`, transitively
/// through the selectors of already-reachable rules, is actually producible by some
/// registered rule or intrinsic.
///
/// `goals` names the products the caller intends to request directly against a root
/// subject type; these are checked for every declared root subject type, in addition to
/// whatever is discovered to be reachable by walking rule clauses.
pub fn validate_ruleset(
    rules: &Rules,
    legal_root_subject_types: &[TypeId],
    goals: &[TypeId],
) -> Result<(), ValidationError> {
    let mut reachable: HashSet<(TypeId, TypeId)> = HashSet::new();
    let mut queue: VecDeque<(TypeId, TypeId)> = VecDeque::new();

    for &subject_type in legal_root_subject_types {
        for &product in goals {
            if reachable.insert((subject_type, product)) {
                queue.push_back((subject_type, product));
            }
        }
    }

    let mut unreachable = Vec::new();

    while let Some((subject_type, product)) = queue.pop_front() {
        let candidates = rules.candidates(subject_type, product);
        if candidates.is_empty() {
            unreachable.push(UnreachableDemand { subject_type, product });
            continue;
        }

        for rule_id in candidates {
            let rule = rules.get(rule_id);
            for selector in &rule.clause {
                for (next_subject, next_product) in demands_of(selector, subject_type) {
                    if reachable.insert((next_subject, next_product)) {
                        queue.push_back((next_subject, next_product));
                    }
                }
            }
        }
    }

    unreachable.sort_by_key(|d| (format!("{:?}", d.subject_type), format!("{:?}", d.product)));
    unreachable.dedup();

    if unreachable.is_empty() {
        Ok(())
    } else {
        Err(ValidationError { unreachable })
    }
}

/// The `(subject_type, product_type)` demands a single selector introduces when
/// evaluated against `current_subject_type`.
///
/// `SelectDependencies`'s `field_types` stands in for the subject types of whatever
/// ends up in the named field at runtime, since the validator has no execution trace
/// to draw them from.
fn demands_of(selector: &Selector, current_subject_type: TypeId) -> Vec<(TypeId, TypeId)> {
    match selector {
        Selector::Select(s) => vec![(current_subject_type, s.product)],
        Selector::SelectVariant(s) => vec![(current_subject_type, s.product)],
        Selector::SelectLiteral(s) => vec![(s.subject.type_id(), s.product)],
        Selector::SelectDependencies(s) => {
            let mut demands = vec![(current_subject_type, s.dep_product)];
            demands.extend(s.field_types.iter().map(|&field_type| (field_type, s.product)));
            demands
        }
        Selector::SelectProjection(s) => {
            vec![
                (current_subject_type, s.input_product),
                (s.projected_subject_type, s.product),
            ]
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use engine_core::{Function, Value};
    use std::sync::Arc;

    fn noop_fn() -> tasks::RuleFn {
        Arc::new(|_subject, _deps| Ok(Value::Unit))
    }

    #[test]
    fn direct_root_demand_with_matching_rule_is_sound() {
        let subject = TypeId::new(1);
        let product = TypeId::new(2);
        let mut rules = Rules::new();
        rules.register_rule(product, vec![], Function::new("f"), noop_fn());

        assert!(validate_ruleset(&rules, &[subject], &[product]).is_ok());
    }

    #[test]
    fn missing_direct_rule_is_reported() {
        let subject = TypeId::new(1);
        let product = TypeId::new(2);
        let rules = Rules::new();

        let err = validate_ruleset(&rules, &[subject], &[product]).unwrap_err();
        assert_eq!(
            err.unreachable,
            vec![UnreachableDemand { subject_type: subject, product }]
        );
    }

    #[test]
    fn transitive_demand_through_select_is_checked() {
        let subject = TypeId::new(1);
        let int_ty = TypeId::new(2);
        let str_ty = TypeId::new(3);
        let mut rules = Rules::new();
        // Int <- Select(Str)
        rules.register_rule(
            int_ty,
            vec![Selector::select(str_ty)],
            Function::new("len"),
            noop_fn(),
        );
        // no rule produces Str from `subject`.
        let err = validate_ruleset(&rules, &[subject], &[int_ty]).unwrap_err();
        assert_eq!(
            err.unreachable,
            vec![UnreachableDemand { subject_type: subject, product: str_ty }]
        );

        rules.register_rule(str_ty, vec![], Function::new("load"), noop_fn());
        assert!(validate_ruleset(&rules, &[subject], &[int_ty]).is_ok());
    }

    #[test]
    fn select_dependencies_field_types_feed_the_walk() {
        let subject = TypeId::new(1);
        let dep_list = TypeId::new(2);
        let element = TypeId::new(3);
        let target = TypeId::new(4);
        let mut rules = Rules::new();
        rules.register_rule(
            target,
            vec![Selector::select_dependencies(
                target,
                dep_list,
                "deps",
                vec![element],
            )],
            Function::new("transitive"),
            noop_fn(),
        );
        rules.register_rule(dep_list, vec![], Function::new("list_deps"), noop_fn());

        // `target` is never producible from `element`, so this must fail.
        let err = validate_ruleset(&rules, &[subject], &[target]).unwrap_err();
        assert!(err.unreachable.contains(&UnreachableDemand {
            subject_type: element,
            product: target
        }));

        rules.register_rule(target, vec![], Function::new("leaf"), noop_fn());
        assert!(validate_ruleset(&rules, &[subject], &[target]).is_ok());
    }

    #[test]
    fn intrinsics_satisfy_demands_like_user_rules() {
        let subject = TypeId::new(1);
        let product = TypeId::new(2);
        let mut rules = Rules::new();
        rules.register_intrinsic(subject, product, Function::new("stat"), noop_fn());

        assert!(validate_ruleset(&rules, &[subject], &[product]).is_ok());
    }
}
