//! Canonical row serialization and SHA-256 hashing.

use crate::normalize::{round_to, FLOAT_DECIMALS};
use crate::record::{Record, Value};
use sha2::{Digest, Sha256};

/// Separator between `name=value` pairs (ASCII unit separator).
pub const FIELD_SEPARATOR: &str = "\u{1f}";

/// Rendering of null values.
pub const NULL_SENTINEL: &str = "__NULL__";

/// Renders a float with exactly three decimals; `-0.000` becomes `0.000`.
#[must_use]
pub fn format_float(value: f64) -> String {
    let rounded = round_to(value, FLOAT_DECIMALS);
    let text = format!("{rounded:.3}");
    if text == "-0.000" {
        "0.000".to_string()
    } else {
        text
    }
}

/// Escapes backslashes and [`FIELD_SEPARATOR`]; a literal [`NULL_SENTINEL`]
/// gets a leading backslash so it cannot read as null.
fn escape(text: &str) -> String {
    if text == NULL_SENTINEL {
        return format!("\\{text}");
    }
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\u{1f}' => out.push_str("\\x1f"),
            other => out.push(other),
        }
    }
    out
}

/// Canonical text of one value.
#[must_use]
pub fn canonical_value(value: &Value) -> String {
    match value {
        Value::Null => NULL_SENTINEL.to_string(),
        Value::Float(f) => format_float(*f),
        other => other
            .to_cell()
            .map_or_else(|| NULL_SENTINEL.to_string(), |text| escape(&text)),
    }
}

/// `name=value` pairs for `columns`, in that order, joined by [`FIELD_SEPARATOR`].
#[must_use]
pub fn canonical_row<S: AsRef<str>>(row: &Record, columns: &[S]) -> String {
    columns
        .iter()
        .map(|column| {
            let column = column.as_ref();
            let value = row.get(column).unwrap_or(&Value::Null);
            format!("{column}={}", canonical_value(value))
        })
        .collect::<Vec<_>>()
        .join(FIELD_SEPARATOR)
}

/// Lower-case hex SHA-256 of `text`.
#[must_use]
pub fn sha256_hex(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hex::encode(hasher.finalize())
}

/// Hash of the canonical serialization over `columns`.
#[must_use]
pub fn hash_row<S: AsRef<str>>(row: &Record, columns: &[S]) -> String {
    sha256_hex(&canonical_row(row, columns))
}

/// Hash over the business-key fields; `None` if any of them is null.
#[must_use]
pub fn hash_business_key<S: AsRef<str>>(row: &Record, key_fields: &[S]) -> Option<String> {
    if key_fields.is_empty() {
        return None;
    }
    let any_null = key_fields
        .iter()
        .any(|field| row.get(field.as_ref()).map_or(true, Value::is_null));
    if any_null {
        None
    } else {
        Some(hash_row(row, key_fields))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use regex::Regex;

    fn row(pairs: &[(&str, Value)]) -> Record {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.clone()))
            .collect()
    }

    fn is_hex64(s: &str) -> bool {
        Regex::new("^[a-f0-9]{64}$").unwrap().is_match(s)
    }

    #[test]
    fn test_float_rendering() {
        assert_eq!(format_float(1.0), "1.000");
        assert_eq!(format_float(2.34567), "2.346");
        assert_eq!(format_float(-0.0001), "0.000");
    }

    #[test]
    fn test_canonical_row_uses_column_order_and_sentinel() {
        let r = row(&[("b", Value::Int(1)), ("a", Value::Null), ("c", Value::Float(0.5))]);
        assert_eq!(
            canonical_row(&r, &["b", "a", "c"]),
            "b=1\u{1f}a=__NULL__\u{1f}c=0.500"
        );
    }

    #[test]
    fn test_hash_row_shape_and_sensitivity() {
        let a = row(&[("id", Value::from("CHEMBL1")), ("v", Value::Float(1.0))]);
        let b = row(&[("id", Value::from("CHEMBL1")), ("v", Value::Float(1.0004))]);
        let c = row(&[("id", Value::from("CHEMBL1")), ("v", Value::Float(1.01))]);

        let ha = hash_row(&a, &["id", "v"]);
        assert!(is_hex64(&ha));
        // equal after three-decimal rounding
        assert_eq!(ha, hash_row(&b, &["id", "v"]));
        assert_ne!(ha, hash_row(&c, &["id", "v"]));
        assert_ne!(ha, hash_row(&a, &["v", "id"]));
    }

    #[test]
    fn test_business_key_null_iff_any_field_null() {
        let full = row(&[("a", Value::Int(1)), ("b", Value::from("x"))]);
        let partial = row(&[("a", Value::Int(1)), ("b", Value::Null)]);
        let missing = row(&[("a", Value::Int(1))]);

        assert!(is_hex64(&hash_business_key(&full, &["a", "b"]).unwrap()));
        assert_eq!(hash_business_key(&partial, &["a", "b"]), None);
        assert_eq!(hash_business_key(&missing, &["a", "b"]), None);
    }

    #[test]
    fn test_embedded_separator_cannot_forge_fields() {
        let left = row(&[("a", Value::from("p\u{1f}b=q")), ("b", Value::from("r"))]);
        let right = row(&[("a", Value::from("p")), ("b", Value::from("q\u{1f}b=r"))]);
        assert_ne!(hash_row(&left, &["a", "b"]), hash_row(&right, &["a", "b"]));
        assert_eq!(canonical_value(&Value::from("x\u{1f}y")), "x\\x1fy");

        let literal = row(&[("a", Value::from("x\\x1fy"))]);
        let control = row(&[("a", Value::from("x\u{1f}y"))]);
        assert_ne!(hash_row(&literal, &["a"]), hash_row(&control, &["a"]));
    }

    #[test]
    fn test_sentinel_text_differs_from_null() {
        let text = row(&[("a", Value::from(NULL_SENTINEL))]);
        let null = row(&[("a", Value::Null)]);
        assert_ne!(hash_row(&text, &["a"]), hash_row(&null, &["a"]));
        assert_eq!(canonical_value(&Value::from("plain")), "plain");
    }

    #[test]
    fn test_known_digest() {
        assert_eq!(
            sha256_hex(""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }
}
