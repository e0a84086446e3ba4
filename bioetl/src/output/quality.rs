//! Column quality and correlation reports.

use crate::errors::{EtlError, Result};
use crate::hashing::format_float;
use crate::record::{Table, Value};
use crate::schema::{EntitySchema, HASH_BUSINESS_KEY, INDEX};
use serde::Serialize;
use std::collections::HashSet;

/// File name of the per-column report.
pub const QUALITY_REPORT_FILE: &str = "quality_report.csv";

/// File name of the correlation matrix.
pub const CORRELATION_REPORT_FILE: &str = "correlation_report.csv";

/// Quality figures for one column.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnQuality {
    /// Column name.
    pub column: String,
    /// Declared type.
    pub dtype: String,
    /// Null cells.
    pub null_count: usize,
    /// Non-null cells.
    pub non_null_count: usize,
    /// Distinct non-null values.
    pub unique_count: usize,
    /// `non_null_count / rows`.
    pub coverage: f64,
    /// `coverage >= min_coverage`.
    pub coverage_ok: bool,
}

fn declared_dtype(schema: &EntitySchema, column: &str) -> &'static str {
    match schema.dtype(column) {
        Some(dtype) => dtype.as_str(),
        None if column == INDEX => "int64",
        None => "string",
    }
}

/// Per-column figures over `columns`.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn column_quality(
    table: &Table,
    schema: &EntitySchema,
    columns: &[String],
    min_coverage: f64,
) -> Vec<ColumnQuality> {
    let rows = table.len();
    columns
        .iter()
        .map(|column| {
            let mut distinct = HashSet::new();
            let mut non_null = 0;
            for value in table.column_values(column).filter(|v| !v.is_null()) {
                non_null += 1;
                distinct.insert(value.to_cell().unwrap_or_default());
            }
            let coverage = if rows == 0 { 0.0 } else { non_null as f64 / rows as f64 };
            ColumnQuality {
                column: column.clone(),
                dtype: declared_dtype(schema, column).to_string(),
                null_count: rows - non_null,
                non_null_count: non_null,
                unique_count: distinct.len(),
                coverage,
                coverage_ok: coverage >= min_coverage,
            }
        })
        .collect()
}

/// Rows whose non-null `hash_business_key` already appeared earlier.
#[must_use]
pub fn duplicate_business_keys(table: &Table) -> usize {
    let mut seen = HashSet::new();
    table
        .column_values(HASH_BUSINESS_KEY)
        .filter_map(Value::as_str)
        .filter(|key| !seen.insert(*key))
        .count()
}

/// Pearson correlation over pairwise-complete observations.
///
/// `None` with fewer than two pairs or zero variance.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn pearson(xs: &[Option<f64>], ys: &[Option<f64>]) -> Option<f64> {
    let pairs: Vec<(f64, f64)> = xs
        .iter()
        .zip(ys)
        .filter_map(|(x, y)| Some(((*x)?, (*y)?)))
        .collect();
    if pairs.len() < 2 {
        return None;
    }
    let n = pairs.len() as f64;
    let mean_x = pairs.iter().map(|p| p.0).sum::<f64>() / n;
    let mean_y = pairs.iter().map(|p| p.1).sum::<f64>() / n;
    let (mut cov, mut var_x, mut var_y) = (0.0, 0.0, 0.0);
    for (x, y) in &pairs {
        let dx = x - mean_x;
        let dy = y - mean_y;
        cov += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }
    let denominator = (var_x * var_y).sqrt();
    (denominator > 0.0).then(|| (cov / denominator).clamp(-1.0, 1.0))
}

/// Square correlation matrix over numeric schema columns, sorted by name.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CorrelationReport {
    /// Column names, sorted.
    pub columns: Vec<String>,
    /// `values[i][j]` correlates `columns[i]` with `columns[j]`.
    pub values: Vec<Vec<Option<f64>>>,
}

/// Correlations between every pair of numeric schema columns.
#[must_use]
pub fn correlation_report(table: &Table, schema: &EntitySchema) -> CorrelationReport {
    let mut columns: Vec<String> = schema
        .columns
        .iter()
        .filter(|c| c.dtype.is_numeric())
        .map(|c| c.name.clone())
        .collect();
    columns.sort();

    let series: Vec<Vec<Option<f64>>> = columns
        .iter()
        .map(|c| table.column_values(c).map(Value::as_f64).collect())
        .collect();
    let values = series
        .iter()
        .map(|a| series.iter().map(|b| pearson(a, b)).collect())
        .collect();
    CorrelationReport { columns, values }
}

/// Renders the quality report as CSV.
///
/// # Errors
///
/// Returns a CSV error if serialization fails.
pub fn render_quality_csv(report: &[ColumnQuality]) -> Result<Vec<u8>> {
    let mut writer = csv::WriterBuilder::new()
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(Vec::new());
    writer.write_record([
        "column",
        "dtype",
        "null_count",
        "non_null_count",
        "unique_count",
        "coverage",
        "coverage_ok",
    ])?;
    for q in report {
        writer.write_record([
            q.column.clone(),
            q.dtype.clone(),
            q.null_count.to_string(),
            q.non_null_count.to_string(),
            q.unique_count.to_string(),
            format_float(q.coverage),
            q.coverage_ok.to_string(),
        ])?;
    }
    writer
        .into_inner()
        .map_err(|e| EtlError::write(format!("cannot finish quality report: {e}")))
}

/// Renders the correlation matrix as CSV; undefined cells are empty.
///
/// # Errors
///
/// Returns a CSV error if serialization fails.
pub fn render_correlation_csv(report: &CorrelationReport) -> Result<Vec<u8>> {
    let mut writer = csv::WriterBuilder::new()
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(Vec::new());
    let header = std::iter::once("column".to_string()).chain(report.columns.iter().cloned());
    writer.write_record(header)?;
    for (name, row) in report.columns.iter().zip(&report.values) {
        let cells = row.iter().map(|v| v.map(|r| format!("{r:.6}")).unwrap_or_default());
        writer.write_record(std::iter::once(name.clone()).chain(cells))?;
    }
    writer
        .into_inner()
        .map_err(|e| EtlError::write(format!("cannot finish correlation report: {e}")))
}
