// Licensed under the Apache License, Version 2.0.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};

use crate::{TypeId, Value, ANY_TYPE, FNV};

/// Opaque, process-wide identifier for an interned value. Two `Id`s are equal iff the
/// values they were interned from are equal (for a fixed `TypeId`).
pub type Id = u64;

/// A `Key` pairs an interned `Id` with the `TypeId` it was interned under. `Key`'s
/// `Eq`/`Hash` are by `id` alone: two `Key`s can only ever carry the same `id` if they
/// were produced for the same `(TypeId, Value)` pair, since `Interner::put_typed`
/// assigns a fresh `id` per distinct pair.
#[derive(Clone, Copy, Debug)]
pub struct Key {
    id: Id,
    type_id: TypeId,
}

impl Key {
    pub fn id(&self) -> Id {
        self.id
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }
}

impl Eq for Key {}

impl PartialEq for Key {
    fn eq(&self, other: &Key) -> bool {
        self.id == other.id
    }
}

impl Hash for Key {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl Ord for Key {
    fn cmp(&self, other: &Key) -> std::cmp::Ordering {
        self.id.cmp(&other.id)
    }
}

impl PartialOrd for Key {
    fn partial_cmp(&self, other: &Key) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

fn content_hash(type_id: TypeId, value: &Value) -> u64 {
    let mut hasher = DefaultHasher::new();
    type_id.hash(&mut hasher);
    value.hash(&mut hasher);
    hasher.finish()
}

/// A process-wide content-addressed map from `Key`s to `(TypeId, Value)` pairs.
///
/// Storage is append-only within a scheduler's lifetime: values are never mutated or
/// removed once interned, which is what lets the scheduler treat key equality as a
/// proxy for structural equality everywhere else.
#[derive(Default)]
pub struct Interner {
    next_id: Id,
    by_content: HashMap<(TypeId, u64), Id, FNV>,
    values: HashMap<Id, (TypeId, Value), FNV>,
}

impl Interner {
    pub fn new() -> Interner {
        Interner::default()
    }

    /// Interns `value` tagged with `ANY_TYPE`. Equal values (under `ANY_TYPE`) yield
    /// equal keys.
    pub fn put(&mut self, value: Value) -> Key {
        self.put_typed(value, ANY_TYPE)
    }

    /// Interns `value` tagged with the given `type_id`. Equal `(type_id, value)` pairs
    /// yield equal keys; the same `value` interned under two different `type_id`s
    /// yields two distinct keys.
    pub fn put_typed(&mut self, value: Value, type_id: TypeId) -> Key {
        let hash = content_hash(type_id, &value);
        if let Some(&id) = self.by_content.get(&(type_id, hash)) {
            return Key { id, type_id };
        }

        let id = self.next_id;
        self.next_id += 1;
        self.by_content.insert((type_id, hash), id);
        self.values.insert(id, (type_id, value));
        log::trace!("interned new key {id} of type {type_id:?}");
        Key { id, type_id }
    }

    pub fn get(&self, key: Key) -> &Value {
        &self
            .values
            .get(&key.id)
            .unwrap_or_else(|| panic!("Key {key:?} was never interned in this store"))
            .1
    }

    pub fn get_type(&self, key: Key) -> TypeId {
        key.type_id
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_values_yield_equal_keys() {
        let mut interner = Interner::new();
        let a = interner.put(Value::Str("x".to_string()));
        let b = interner.put(Value::Str("x".to_string()));
        assert_eq!(a, b);
        assert_eq!(interner.len(), 1);
    }

    #[test]
    fn distinct_values_yield_distinct_keys() {
        let mut interner = Interner::new();
        let a = interner.put(Value::Str("x".to_string()));
        let b = interner.put(Value::Str("y".to_string()));
        assert_ne!(a, b);
    }

    #[test]
    fn same_value_different_type_is_distinct() {
        let mut interner = Interner::new();
        let t1 = TypeId::new(1);
        let t2 = TypeId::new(2);
        let a = interner.put_typed(Value::Str("x".to_string()), t1);
        let b = interner.put_typed(Value::Str("x".to_string()), t2);
        assert_ne!(a, b);
    }

    #[test]
    fn get_round_trips() {
        let mut interner = Interner::new();
        let key = interner.put(Value::Int(42));
        assert_eq!(interner.get(key), &Value::Int(42));
    }
}
