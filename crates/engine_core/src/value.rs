// Licensed under the Apache License, Version 2.0.

use std::collections::BTreeMap;
use std::fmt;

/// The closed set of dynamically-typed data the scheduler passes between rules.
///
/// Subjects, products, and selector literals are all `Value`s. There is deliberately no
/// `Float` variant: every `Value` must be `Hash + Eq` so that the interning store in
/// `interning.rs` can deduplicate by content, and floats are not totally ordered.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub enum Value {
    Unit,
    Bool(bool),
    Int(i64),
    Str(String),
    Bytes(Vec<u8>),
    List(Vec<Value>),
    // A `Map` with a `__type__` entry doubles as a lightweight struct: rules that need
    // named fields store them as string keys of a `Map`, rather than requiring a
    // trait-object downcast. `BTreeMap` (not `HashMap`) so that two structurally-equal
    // maps always hash and compare equal regardless of insertion order.
    Map(BTreeMap<String, Value>),
}

impl Value {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items.as_slice()),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Map(fields) => Some(fields),
            _ => None,
        }
    }

    /// Projects a named field out of a `Map` value.
    ///
    /// Used by `SelectDependencies` (to walk the named field of a dependency product) and
    /// `SelectProjection` (to read the field being projected into a new subject).
    pub fn field(&self, name: &str) -> Result<&Value, String> {
        self
            .as_map()
            .and_then(|fields| fields.get(name))
            .ok_or_else(|| format!("No field {name:?} on value {self:?}"))
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Unit => write!(f, "()"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Str(s) => write!(f, "{s:?}"),
            Value::Bytes(b) => write!(f, "bytes(len={})", b.len()),
            Value::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            Value::Map(fields) => {
                write!(f, "{{")?;
                for (i, (k, v)) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{k}: {v}")?;
                }
                write!(f, "}}")
            }
        }
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Value {
        Value::Int(i)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Value {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Value {
        Value::Str(s)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Value {
        Value::List(items.into_iter().map(Into::into).collect())
    }
}
