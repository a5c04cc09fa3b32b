//! The dynamic payload carried by vertex values, message content, and edge properties.
//!
//! The source system treats these as untyped values (numbers, mappings, lists, or opaque
//! scalars). Rather than pass a `Box<dyn Any>` through the engine, [`Value`] is a concrete
//! tagged sum type: it can be cloned, compared, logged, and serialized without the caller
//! downcasting anything.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// A dynamically-typed value.
///
/// `Map` uses [`IndexMap`] rather than a [`std::collections::HashMap`] so that key-wise
/// merges and iteration are insertion-ordered and therefore deterministic — the same
/// property [`crate::edge::Edge`] relies on for its own outgoing-edge ordering.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// Absence of a value. The initial value of a vertex that was not given one, and the
    /// aggregated payload of an empty inbox.
    #[default]
    Nil,
    /// A numeric value. Two messages are "all numeric" (for aggregation) only if every one
    /// of them is this variant.
    Number(f64),
    /// A boolean scalar.
    Bool(bool),
    /// A string scalar.
    String(String),
    /// An ordered list of values.
    List(Vec<Value>),
    /// A string-keyed mapping, insertion-ordered.
    Map(IndexMap<String, Value>),
}

/// The four dispatch categories used by the aggregation and merge rules.
///
/// `Nil`, `Bool`, and `String` all fall into `Opaque`: they are atomic, non-composite
/// values that are neither numeric nor a collection, so none of the type-directed rules
/// below apply special handling to them beyond "replace wholesale".
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Category {
    /// [`Value::Number`].
    Number,
    /// [`Value::Map`].
    Map,
    /// [`Value::List`].
    List,
    /// [`Value::Nil`], [`Value::Bool`], [`Value::String`].
    Opaque,
}

impl Value {
    /// The aggregation/merge dispatch category for this value.
    pub fn category(&self) -> Category {
        match self {
            Value::Number(_) => Category::Number,
            Value::Map(_) => Category::Map,
            Value::List(_) => Category::List,
            Value::Nil | Value::Bool(_) | Value::String(_) => Category::Opaque,
        }
    }

    /// Merge `new` into `base` using a type-directed rule: maps are merged key-wise with
    /// `new`'s keys winning on conflict; anything else is a wholesale replacement of
    /// `base` by `new`.
    pub fn merge(new: Value, base: Value) -> Value {
        match (new, base) {
            (Value::Map(new_map), Value::Map(mut base_map)) => {
                for (k, v) in new_map {
                    base_map.insert(k, v);
                }
                Value::Map(base_map)
            }
            (new, _base) => new,
        }
    }
}

/// Aggregate a round's raw incoming messages into a single payload:
///
/// - an empty inbox aggregates to [`Value::Nil`];
/// - if every message content is [`Value::Number`], the aggregate is their arithmetic sum;
/// - if every message content is [`Value::Map`], the aggregate is their left-to-right
///   key-wise merge (later messages overwrite earlier keys for the same key);
/// - otherwise, the aggregate is the ordered [`Value::List`] of message contents.
pub fn aggregate(contents: &[Value]) -> Value {
    if contents.is_empty() {
        return Value::Nil;
    }

    if contents.iter().all(|v| v.category() == Category::Number) {
        let sum: f64 = contents
            .iter()
            .map(|v| match v {
                Value::Number(n) => *n,
                _ => unreachable!("checked all() above"),
            })
            .sum();
        return Value::Number(sum);
    }

    if contents.iter().all(|v| v.category() == Category::Map) {
        let mut merged = IndexMap::new();
        for v in contents {
            if let Value::Map(m) = v {
                for (k, v) in m {
                    merged.insert(k.clone(), v.clone());
                }
            }
        }
        return Value::Map(merged);
    }

    Value::List(contents.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(pairs: &[(&str, Value)]) -> Value {
        let mut m = IndexMap::new();
        for (k, v) in pairs {
            m.insert((*k).to_string(), v.clone());
        }
        Value::Map(m)
    }

    #[test]
    fn empty_aggregates_to_nil() {
        let values: Vec<Value> = vec![];
        assert_eq!(aggregate(&values), Value::Nil);
    }

    #[test]
    fn all_numeric_sums() {
        let values = vec![Value::Number(1.0), Value::Number(2.5), Value::Number(3.0)];
        assert_eq!(aggregate(&values), Value::Number(6.5));
    }

    #[test]
    fn all_maps_key_merge_left_to_right() {
        let values = vec![
            map(&[("a", Value::Number(1.0))]),
            map(&[("a", Value::Number(2.0)), ("b", Value::Number(3.0))]),
        ];
        let expected = map(&[("a", Value::Number(2.0)), ("b", Value::Number(3.0))]);
        assert_eq!(aggregate(&values), expected);
    }

    #[test]
    fn mixed_contents_become_a_list() {
        let values = vec![Value::Number(1.0), Value::String("x".into())];
        assert_eq!(
            aggregate(&values),
            Value::List(vec![Value::Number(1.0), Value::String("x".into())])
        );
    }

    #[test]
    fn merge_maps_new_wins_on_conflict() {
        let base = map(&[("a", Value::Number(1.0)), ("b", Value::Number(2.0))]);
        let new = map(&[("a", Value::Number(99.0))]);
        let merged = Value::merge(new, base);
        assert_eq!(
            merged,
            map(&[("a", Value::Number(99.0)), ("b", Value::Number(2.0))])
        );
    }

    #[test]
    fn merge_non_map_replaces_wholesale() {
        let base = Value::Number(1.0);
        let new = Value::Number(2.0);
        assert_eq!(Value::merge(new, base), Value::Number(2.0));
    }
}
