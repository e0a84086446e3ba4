//! Row-oriented table with an explicit column order.

use super::{Record, Value};

/// Rows sharing one ordered column list.
///
/// Rows may hold keys outside `columns`; they are ignored by
/// [`Table::project`] and by writers.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Record>,
}

impl Table {
    /// Creates an empty table with the given column order.
    #[must_use]
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// Creates a table from rows.
    #[must_use]
    pub fn from_rows(columns: Vec<String>, rows: Vec<Record>) -> Self {
        Self { columns, rows }
    }

    /// Returns the column order.
    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Returns the rows.
    #[must_use]
    pub fn rows(&self) -> &[Record] {
        &self.rows
    }

    /// Returns the rows mutably.
    pub fn rows_mut(&mut self) -> &mut Vec<Record> {
        &mut self.rows
    }

    /// Consumes the table and returns its rows.
    #[must_use]
    pub fn into_rows(self) -> Vec<Record> {
        self.rows
    }

    /// Number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Returns true when there are no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Appends a row.
    pub fn push(&mut self, row: Record) {
        self.rows.push(row);
    }

    /// Keeps at most `limit` rows.
    pub fn truncate(&mut self, limit: usize) {
        self.rows.truncate(limit);
    }

    /// Returns true if `name` is part of the column order.
    #[must_use]
    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c == name)
    }

    /// Appends `name` to the column order if absent.
    pub fn ensure_column(&mut self, name: &str) {
        if !self.has_column(name) {
            self.columns.push(name.to_string());
        }
    }

    /// Iterates a column's values; absent cells read as null.
    pub fn column_values<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Value> + 'a {
        static NULL: Value = Value::Null;
        self.rows.iter().map(move |row| row.get(name).unwrap_or(&NULL))
    }

    /// Writes the same value into every row of `name`.
    pub fn fill_column(&mut self, name: &str, value: &Value) {
        self.ensure_column(name);
        for row in &mut self.rows {
            row.insert(name.to_string(), value.clone());
        }
    }

    /// Reorders to `columns`, filling absent cells with null and dropping
    /// keys not listed.
    #[must_use]
    pub fn project(&self, columns: &[String]) -> Self {
        let rows = self
            .rows
            .iter()
            .map(|row| {
                columns
                    .iter()
                    .map(|c| (c.clone(), row.get(c).cloned().unwrap_or(Value::Null)))
                    .collect()
            })
            .collect();
        Self {
            columns: columns.to_vec(),
            rows,
        }
    }
}
