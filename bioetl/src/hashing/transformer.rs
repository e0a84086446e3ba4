//! Provenance transformer chain.
//!
//! Steps run in a fixed order: hash columns, index, database version,
//! extraction timestamp.

use super::canonical::{hash_business_key, hash_row};
use crate::record::{Table, Value};
use crate::schema::{DATABASE_VERSION, DERIVED_COLUMNS, EXTRACTED_AT, HASH_BUSINESS_KEY, HASH_ROW, INDEX};
use chrono::{DateTime, Utc};
use std::cmp::Ordering;

/// Timestamp layout of `extracted_at`.
pub const EXTRACTED_AT_FORMAT: &str = "%Y-%m-%dT%H:%M:%S+00:00";

/// Formats a UTC instant as `YYYY-MM-DDTHH:MM:SS+00:00`.
#[must_use]
pub fn format_extracted_at(at: &DateTime<Utc>) -> String {
    at.format(EXTRACTED_AT_FORMAT).to_string()
}

/// One step of the provenance chain.
pub trait RowTransformer: Send + Sync {
    /// Step name for logs.
    fn name(&self) -> &'static str;

    /// Transforms the table in place.
    fn apply(&self, table: &mut Table);
}

/// Adds `hash_row` and `hash_business_key`.
#[derive(Debug, Clone)]
pub struct HashColumns {
    business_key: Vec<String>,
}

impl HashColumns {
    /// Creates the step for the given business-key fields.
    #[must_use]
    pub fn new(business_key: Vec<String>) -> Self {
        Self { business_key }
    }
}

impl RowTransformer for HashColumns {
    fn name(&self) -> &'static str {
        "hash_columns"
    }

    fn apply(&self, table: &mut Table) {
        let data_columns: Vec<String> = table
            .columns()
            .iter()
            .filter(|c| !DERIVED_COLUMNS.contains(&c.as_str()))
            .cloned()
            .collect();

        for row in table.rows_mut() {
            let row_hash = hash_row(row, &data_columns);
            let key_hash = hash_business_key(row, &self.business_key);
            row.insert(HASH_ROW.to_string(), Value::Str(row_hash));
            row.insert(HASH_BUSINESS_KEY.to_string(), Value::from(key_hash));
        }
        table.ensure_column(HASH_ROW);
        table.ensure_column(HASH_BUSINESS_KEY);
    }
}

/// Adds the zero-based `index`.
#[derive(Debug, Clone, Copy, Default)]
pub struct IndexColumn;

impl RowTransformer for IndexColumn {
    fn name(&self) -> &'static str {
        "index"
    }

    fn apply(&self, table: &mut Table) {
        for (position, row) in table.rows_mut().iter_mut().enumerate() {
            let position = i64::try_from(position).unwrap_or(i64::MAX);
            row.insert(INDEX.to_string(), Value::Int(position));
        }
        table.ensure_column(INDEX);
    }
}

/// Stamps the release version on every row.
#[derive(Debug, Clone)]
pub struct DatabaseVersionColumn {
    version: Option<String>,
}

impl DatabaseVersionColumn {
    /// Creates the step; `None` writes null.
    #[must_use]
    pub fn new(version: Option<String>) -> Self {
        Self { version }
    }
}

impl RowTransformer for DatabaseVersionColumn {
    fn name(&self) -> &'static str {
        "database_version"
    }

    fn apply(&self, table: &mut Table) {
        table.fill_column(DATABASE_VERSION, &Value::from(self.version.clone()));
    }
}

/// Stamps the run-wide extraction timestamp on every row.
#[derive(Debug, Clone)]
pub struct TimestampColumn {
    extracted_at: String,
}

impl TimestampColumn {
    /// Creates the step for `at`.
    #[must_use]
    pub fn new(at: &DateTime<Utc>) -> Self {
        Self {
            extracted_at: format_extracted_at(at),
        }
    }
}

impl RowTransformer for TimestampColumn {
    fn name(&self) -> &'static str {
        "extracted_at"
    }

    fn apply(&self, table: &mut Table) {
        table.fill_column(EXTRACTED_AT, &Value::Str(self.extracted_at.clone()));
    }
}

/// Ordered list of transformer steps.
#[derive(Default)]
pub struct TransformerChain {
    steps: Vec<Box<dyn RowTransformer>>,
}

impl TransformerChain {
    /// Creates an empty chain.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The four provenance steps in their fixed order.
    #[must_use]
    pub fn provenance(
        business_key: Vec<String>,
        database_version: Option<String>,
        extracted_at: &DateTime<Utc>,
    ) -> Self {
        Self::new()
            .with_step(HashColumns::new(business_key))
            .with_step(IndexColumn)
            .with_step(DatabaseVersionColumn::new(database_version))
            .with_step(TimestampColumn::new(extracted_at))
    }

    /// Appends a step.
    #[must_use]
    pub fn with_step(mut self, step: impl RowTransformer + 'static) -> Self {
        self.steps.push(Box::new(step));
        self
    }

    /// Step names in order.
    #[must_use]
    pub fn step_names(&self) -> Vec<&'static str> {
        self.steps.iter().map(|s| s.name()).collect()
    }

    /// Runs every step.
    pub fn apply(&self, table: &mut Table) {
        for step in &self.steps {
            step.apply(table);
            tracing::trace!(step = step.name(), rows = table.len(), "Transformer step applied");
        }
    }
}

/// Stable sort by `keys`; rows with equal keys keep their order.
pub fn sort_rows(table: &mut Table, keys: &[String]) {
    if keys.is_empty() {
        return;
    }
    table.rows_mut().sort_by(|a, b| {
        for key in keys {
            let left = a.get(key).unwrap_or(&Value::Null);
            let right = b.get(key).unwrap_or(&Value::Null);
            match left.sort_cmp(right) {
                Ordering::Equal => continue,
                other => return other,
            }
        }
        Ordering::Equal
    });
}
