//! Row hashing and provenance columns.

mod canonical;
mod transformer;

pub use canonical::{
    canonical_row, canonical_value, format_float, hash_business_key, hash_row, sha256_hex,
    FIELD_SEPARATOR, NULL_SENTINEL,
};
pub use transformer::{
    format_extracted_at, sort_rows, DatabaseVersionColumn, HashColumns, IndexColumn,
    RowTransformer, TimestampColumn, TransformerChain, EXTRACTED_AT_FORMAT,
};
