//! Generic scalar normalizers.

use crate::record::Value;

/// Decimal places kept by [`normalize_float`] and by hash canonicalization.
pub const FLOAT_DECIMALS: i32 = 3;

/// Trims and upper-cases strings; blank strings become null.
#[must_use]
pub fn normalize_id(value: &Value) -> Value {
    map_text(value, str::to_uppercase)
}

/// Trims and lower-cases strings; blank strings become null.
#[must_use]
pub fn normalize_text(value: &Value) -> Value {
    map_text(value, str::to_lowercase)
}

/// Trims strings without changing case; blank strings become null.
#[must_use]
pub fn normalize_trim(value: &Value) -> Value {
    map_text(value, str::to_string)
}

fn map_text(value: &Value, f: impl Fn(&str) -> String) -> Value {
    match value {
        Value::Str(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                Value::Null
            } else {
                Value::Str(f(trimmed))
            }
        }
        other => other.clone(),
    }
}

/// Rounds to [`FLOAT_DECIMALS`] places.
///
/// Numeric strings are parsed; anything else non-numeric becomes null.
#[must_use]
pub fn normalize_float(value: &Value) -> Value {
    let number = match value {
        Value::Int(_) | Value::Float(_) => value.as_f64(),
        Value::Str(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    number
        .filter(|n| n.is_finite())
        .map_or(Value::Null, |n| Value::Float(round_to(n, FLOAT_DECIMALS)))
}

/// Rounds half away from zero to `decimals` places.
#[must_use]
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    let rounded = (value * factor).round() / factor;
    if rounded == 0.0 {
        0.0
    } else {
        rounded
    }
}
