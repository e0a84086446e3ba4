//! Column descriptors.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Semantic column type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    /// UTF-8 text.
    String,
    /// 64-bit integer.
    Int64,
    /// 64-bit float.
    Float64,
    /// Boolean.
    Bool,
}

impl DataType {
    /// Lower-case type name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Int64 => "int64",
            Self::Float64 => "float64",
            Self::Bool => "bool",
        }
    }

    /// True for `int64` and `float64`.
    #[must_use]
    pub fn is_numeric(&self) -> bool {
        matches!(self, Self::Int64 | Self::Float64)
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One typed column with its constraints.
#[derive(Debug, Clone)]
pub struct ColumnSpec {
    /// Column name.
    pub name: String,
    /// Declared type.
    pub dtype: DataType,
    /// Whether nulls are allowed.
    pub nullable: bool,
    /// Regex every non-null value must match.
    pub pattern: Option<Regex>,
    /// Allowed values.
    pub domain: Option<Vec<String>>,
    /// Inclusive numeric bounds.
    pub range: Option<(f64, f64)>,
}

impl ColumnSpec {
    /// Creates a nullable column without constraints.
    #[must_use]
    pub fn new(name: impl Into<String>, dtype: DataType) -> Self {
        Self {
            name: name.into(),
            dtype,
            nullable: true,
            pattern: None,
            domain: None,
            range: None,
        }
    }

    /// Nullable string column.
    #[must_use]
    pub fn string(name: &str) -> Self {
        Self::new(name, DataType::String)
    }

    /// Nullable integer column.
    #[must_use]
    pub fn int(name: &str) -> Self {
        Self::new(name, DataType::Int64)
    }

    /// Nullable float column.
    #[must_use]
    pub fn float(name: &str) -> Self {
        Self::new(name, DataType::Float64)
    }

    /// Nullable boolean column.
    #[must_use]
    pub fn boolean(name: &str) -> Self {
        Self::new(name, DataType::Bool)
    }

    /// Marks the column non-nullable.
    #[must_use]
    pub fn required(mut self) -> Self {
        self.nullable = false;
        self
    }

    /// Adds a pattern constraint.
    ///
    /// # Panics
    ///
    /// Panics if `pattern` is not a valid regex; patterns are compile-time constants.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn pattern(mut self, pattern: &str) -> Self {
        self.pattern = Some(Regex::new(pattern).expect("column pattern is valid"));
        self
    }

    /// Adds a domain constraint.
    #[must_use]
    pub fn domain(mut self, values: &[&str]) -> Self {
        self.domain = Some(values.iter().map(|v| (*v).to_string()).collect());
        self
    }

    /// Adds an inclusive range constraint.
    #[must_use]
    pub fn range(mut self, min: f64, max: f64) -> Self {
        self.range = Some((min, max));
        self
    }

    /// Check identifier for the pattern constraint.
    #[must_use]
    pub fn pattern_check(&self) -> Option<String> {
        self.pattern
            .as_ref()
            .map(|p| format!("str_matches[{}]", p.as_str()))
    }

    /// Check identifier for the domain constraint, e.g. `isin[B,F,A,T,P,U]`.
    #[must_use]
    pub fn domain_check(&self) -> Option<String> {
        self.domain
            .as_ref()
            .map(|d| format!("isin[{}]", d.join(",")))
    }

    /// Check identifier for the range constraint.
    #[must_use]
    pub fn range_check(&self) -> Option<String> {
        self.range.map(|(min, max)| format!("in_range[{min},{max}]"))
    }
}
