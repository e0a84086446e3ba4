//! Deterministic output: tabular files, sidecar metadata and quality reports.

mod metadata;
#[cfg(feature = "parquet")]
mod parquet_file;
mod quality;
mod writer;

pub use metadata::{OutputFile, QcSummary, RunMetadata, META_FILE};
pub use quality::{
    column_quality, correlation_report, duplicate_business_keys, pearson, render_correlation_csv,
    render_quality_csv, ColumnQuality, CorrelationReport, CORRELATION_REPORT_FILE,
    QUALITY_REPORT_FILE,
};
pub use writer::{atomic_write, render_csv, sha256_file, temp_path, TableWriter, WriteResult, CHECKSUM_CHUNK};
