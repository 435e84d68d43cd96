// Licensed under the Apache License, Version 2.0.
//
// The selector model: a closed, five-variant sum type describing how a rule obtains
// one input, independent of how that input ends up getting computed.

use engine_core::{Key, TypeId};

/// Request `product` for the current subject.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct Select {
    pub product: TypeId,
}

/// As `Select`, but narrowed via the subject's `Variants` map: the rule is only a
/// candidate when the subject's variants contain `variant_key`.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct SelectVariant {
    pub product: TypeId,
    pub variant_key: String,
}

/// Request `product` for a fixed subject, ignoring the current subject entirely.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct SelectLiteral {
    pub subject: Key,
    pub product: TypeId,
}

/// First request `dep_product` for the current subject; then, for each element of its
/// named `field`, request `product`; collect into an ordered list in field order.
///
/// `field_types` declares the possible subject types of the named field's elements:
/// since the field's actual contents are only known at rule-execution time, a static
/// ruleset validator needs this declared ahead of time to prove the `product` demand
/// is reachable for whatever ends up flowing through the field.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct SelectDependencies {
    pub product: TypeId,
    pub dep_product: TypeId,
    pub field: String,
    pub field_types: Vec<TypeId>,
}

/// First request `input_product` for the current subject; project its `field` as a new
/// subject of type `projected_subject_type`; request `product` against that.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct SelectProjection {
    pub product: TypeId,
    pub projected_subject_type: TypeId,
    pub field: String,
    pub input_product: TypeId,
}

#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub enum Selector {
    Select(Select),
    SelectVariant(SelectVariant),
    SelectLiteral(SelectLiteral),
    SelectDependencies(SelectDependencies),
    SelectProjection(SelectProjection),
}

impl Selector {
    pub fn select(product: TypeId) -> Selector {
        Selector::Select(Select { product })
    }

    pub fn select_variant(product: TypeId, variant_key: impl Into<String>) -> Selector {
        Selector::SelectVariant(SelectVariant {
            product,
            variant_key: variant_key.into(),
        })
    }

    pub fn select_literal(subject: Key, product: TypeId) -> Selector {
        Selector::SelectLiteral(SelectLiteral { subject, product })
    }

    pub fn select_dependencies(
        product: TypeId,
        dep_product: TypeId,
        field: impl Into<String>,
        field_types: Vec<TypeId>,
    ) -> Selector {
        Selector::SelectDependencies(SelectDependencies {
            product,
            dep_product,
            field: field.into(),
            field_types,
        })
    }

    pub fn select_projection(
        product: TypeId,
        projected_subject_type: TypeId,
        field: impl Into<String>,
        input_product: TypeId,
    ) -> Selector {
        Selector::SelectProjection(SelectProjection {
            product,
            projected_subject_type,
            field: field.into(),
            input_product,
        })
    }

    /// The product type this selector ultimately resolves to for its dependent.
    pub fn product(&self) -> TypeId {
        match self {
            Selector::Select(s) => s.product,
            Selector::SelectVariant(s) => s.product,
            Selector::SelectLiteral(s) => s.product,
            Selector::SelectDependencies(s) => s.product,
            Selector::SelectProjection(s) => s.product,
        }
    }

    /// True for selectors whose subject is the current node's subject (i.e. everything
    /// except `SelectLiteral`, which always roots a fresh subgraph at a fixed subject).
    pub fn uses_current_subject(&self) -> bool {
        !matches!(self, Selector::SelectLiteral(_))
    }
}
