//! Schema enforcement: type coercion plus constraint checks.

use super::column::{ColumnSpec, DataType};
use super::entities::EntitySchema;
use crate::errors::{FailureCase, ValidationError};
use crate::record::{Record, Table, Value};

/// Check name used for coercion failures, e.g. `dtype[int64]`.
fn dtype_check(dtype: DataType) -> String {
    format!("dtype[{dtype}]")
}

/// Coerces `value` to `dtype` when the mapping is unambiguous.
///
/// Blank strings and non-finite floats become null. Returns `None` when
/// the value cannot be represented as `dtype`.
#[must_use]
pub fn coerce(value: &Value, dtype: DataType) -> Option<Value> {
    if value.is_blank() {
        return Some(Value::Null);
    }
    if let Value::Float(f) = value {
        if !f.is_finite() {
            return Some(Value::Null);
        }
    }

    match (dtype, value) {
        (_, Value::List(_) | Value::Map(_)) => None,

        (DataType::String, Value::Str(s)) => Some(Value::Str(s.clone())),
        (DataType::String, other) => other.to_cell().map(Value::Str),

        (DataType::Int64, Value::Int(i)) => Some(Value::Int(*i)),
        (DataType::Int64, Value::Float(f)) => float_to_int(*f),
        (DataType::Int64, Value::Str(s)) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .map(Value::Int)
                .or_else(|| s.parse::<f64>().ok().and_then(float_to_int))
        }

        (DataType::Float64, Value::Int(_) | Value::Float(_)) => value.as_f64().map(Value::Float),
        (DataType::Float64, Value::Str(s)) => s
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|f| f.is_finite())
            .map(Value::Float),

        (DataType::Bool, Value::Bool(b)) => Some(Value::Bool(*b)),
        (DataType::Bool, Value::Int(0)) => Some(Value::Bool(false)),
        (DataType::Bool, Value::Int(1)) => Some(Value::Bool(true)),
        (DataType::Bool, Value::Str(s)) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" => Some(Value::Bool(true)),
            "false" | "0" => Some(Value::Bool(false)),
            _ => None,
        },

        _ => None,
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
fn float_to_int(f: f64) -> Option<Value> {
    (f.is_finite() && f.fract() == 0.0 && f.abs() < i64::MAX as f64).then(|| Value::Int(f as i64))
}

/// Validates and coerces tables against an [`EntitySchema`].
#[derive(Debug, Clone, Copy)]
pub struct SchemaValidator<'a> {
    schema: &'a EntitySchema,
}

impl<'a> SchemaValidator<'a> {
    /// Creates a validator for `schema`.
    #[must_use]
    pub fn new(schema: &'a EntitySchema) -> Self {
        Self { schema }
    }

    /// Coerces every declared column and checks all constraints.
    ///
    /// Collects every failure before returning. The result holds exactly the
    /// declared columns in schema order.
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError`] listing every failure case.
    pub fn validate(&self, table: &Table) -> Result<Table, ValidationError> {
        let columns = self.schema.column_names();
        let mut failures = Vec::new();
        let mut rows = Vec::with_capacity(table.len());

        for (index, row) in table.rows().iter().enumerate() {
            let mut out = Record::new();
            for spec in &self.schema.columns {
                let raw = row.get(&spec.name).unwrap_or(&Value::Null);
                let value = check_cell(spec, raw, index, &mut failures);
                out.insert(spec.name.clone(), value);
            }
            rows.push(out);
        }

        if failures.is_empty() {
            Ok(Table::from_rows(columns, rows))
        } else {
            tracing::warn!(
                entity = %self.schema.entity,
                failures = failures.len(),
                "Schema validation failed"
            );
            Err(ValidationError::new(self.schema.entity.clone(), failures))
        }
    }
}

fn check_cell(spec: &ColumnSpec, raw: &Value, row: usize, failures: &mut Vec<FailureCase>) -> Value {
    let Some(value) = coerce(raw, spec.dtype) else {
        failures.push(FailureCase::new(
            &spec.name,
            raw.to_string(),
            dtype_check(spec.dtype),
            Some(row),
        ));
        return raw.clone();
    };

    if value.is_null() {
        if !spec.nullable {
            failures.push(FailureCase::new(&spec.name, "null", "not_nullable", Some(row)));
        }
        return value;
    }

    let text = value.to_string();

    if let (Some(pattern), Some(check)) = (&spec.pattern, spec.pattern_check()) {
        if !pattern.is_match(&text) {
            failures.push(FailureCase::new(&spec.name, text.clone(), check, Some(row)));
        }
    }

    if let (Some(domain), Some(check)) = (&spec.domain, spec.domain_check()) {
        if !domain.iter().any(|allowed| allowed == &text) {
            failures.push(FailureCase::new(&spec.name, text.clone(), check, Some(row)));
        }
    }

    if let (Some((min, max)), Some(check)) = (spec.range, spec.range_check()) {
        if let Some(number) = value.as_f64() {
            if number < min || number > max {
                failures.push(FailureCase::new(&spec.name, text, check, Some(row)));
            }
        }
    }

    value
}
