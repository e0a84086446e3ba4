//! Deterministic flattening of nested values into strings.

use crate::record::Value;
use std::collections::BTreeMap;

/// Separator between flattened pairs or list elements.
pub const ITEM_SEPARATOR: &str = "|";

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::Null | Value::List(_) | Value::Map(_) => None,
        Value::Str(s) if s.trim().is_empty() => None,
        other => other.to_cell(),
    }
}

fn flatten_pairs(map: &BTreeMap<String, Value>) -> Option<String> {
    let pairs: Vec<String> = map
        .iter()
        .filter_map(|(key, value)| scalar_text(value).map(|text| format!("{key}:{text}")))
        .collect();
    (!pairs.is_empty()).then(|| pairs.join(ITEM_SEPARATOR))
}

/// Flattens a mapping into `key1:v1|key2:v2` with keys ascending.
///
/// Only scalar values contribute; nulls, blanks and nested containers are
/// skipped. Strings pass through, so the function is idempotent.
#[must_use]
pub fn flatten_mapping(value: &Value) -> Value {
    match value {
        Value::Map(map) => flatten_pairs(map).map_or(Value::Null, Value::Str),
        Value::List(_) => Value::Null,
        other => other.clone(),
    }
}

/// Flattens a list by joining its elements with `|`.
///
/// A list whose non-null elements are all mappings flattens each one with
/// [`flatten_mapping`]; otherwise scalar elements are stringified and
/// nested containers dropped.
#[must_use]
pub fn flatten_list(value: &Value) -> Value {
    let Value::List(items) = value else {
        return match value {
            Value::Map(_) => flatten_mapping(value),
            other => other.clone(),
        };
    };

    let present: Vec<&Value> = items.iter().filter(|v| !v.is_null()).collect();
    let all_mappings = !present.is_empty() && present.iter().all(|v| matches!(v, Value::Map(_)));

    let parts: Vec<String> = if all_mappings {
        present
            .iter()
            .filter_map(|v| match v {
                Value::Map(map) => flatten_pairs(map),
                _ => None,
            })
            .collect()
    } else {
        present.iter().filter_map(|v| scalar_text(v)).collect()
    };

    if parts.is_empty() {
        Value::Null
    } else {
        Value::Str(parts.join(ITEM_SEPARATOR))
    }
}
