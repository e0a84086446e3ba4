//! Entity schemas, the schema registry and the validator.

mod column;
pub mod entities;
mod registry;
mod validator;

pub use column::{ColumnSpec, DataType};
pub use entities::EntitySchema;
pub use registry::{RegistrySnapshot, SchemaRegistry};
pub use validator::{coerce, SchemaValidator};

/// Hex SHA-256 over the whole row.
pub const HASH_ROW: &str = "hash_row";
/// Hex SHA-256 over the business-key fields, or null.
pub const HASH_BUSINESS_KEY: &str = "hash_business_key";
/// Zero-based position in the final ordering.
pub const INDEX: &str = "index";
/// Release version of the remote source.
pub const DATABASE_VERSION: &str = "database_version";
/// Run-wide extraction timestamp.
pub const EXTRACTED_AT: &str = "extracted_at";

/// Columns excluded from `hash_row`.
pub const DERIVED_COLUMNS: &[&str] = &[HASH_ROW, HASH_BUSINESS_KEY, INDEX, DATABASE_VERSION, EXTRACTED_AT];
