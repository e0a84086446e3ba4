//! Record model shared by every stage.
//!
//! Raw records are open-key mappings of [`Value`]s. After normalization and
//! schema coercion they travel as rows of a [`Table`] whose column list is the
//! schema-level column-order contract.

mod table;
mod value;

pub use table::Table;
pub use value::Value;

use std::collections::BTreeMap;

/// An unordered field-name to value mapping.
///
/// Backed by a `BTreeMap` so iteration is always key-sorted.
pub type Record = BTreeMap<String, Value>;

/// Converts a JSON object into a [`Record`]; non-objects yield `None`.
#[must_use]
pub fn record_from_json(value: serde_json::Value) -> Option<Record> {
    match value {
        serde_json::Value::Object(map) => {
            Some(map.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
        }
        _ => None,
    }
}
