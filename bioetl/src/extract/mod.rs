//! Extraction: paginated and batched fetches, and the record sources built on them.

mod service;
mod source;

pub use service::{ExtractionService, ExtractionSettings};
pub use source::{detect_csv_shape, CsvShape, Extracted, RecordSource, SourceMetadata};
