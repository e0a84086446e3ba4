//! # bioetl
//!
//! Deterministic extraction of ChEMBL bio-entities into reproducible tabular
//! datasets.
//!
//! A run moves one entity through a fixed stage sequence:
//!
//! - **extract**: paginated API reads, or a local CSV (full rows or bare IDs)
//! - **transform**: per-field normalization
//! - **validate**: schema coercion and constraint checks
//! - **hash**: optional configured ordering plus provenance columns
//! - **write** / **meta**: atomic output files and a `meta.yaml` sidecar
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use bioetl::prelude::*;
//!
//! let config = ConfigLoader::from_env().load("activity_chembl")?;
//! let result = Pipeline::new(config)?.run(RunOptions::default()).await?;
//! println!("{}", result.summary());
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod cancellation;
pub mod client;
pub mod config;
pub mod errors;
pub mod extract;
pub mod hashing;
pub mod logging;
pub mod normalize;
pub mod observability;
pub mod output;
pub mod pipeline;
pub mod record;
pub mod resilience;
pub mod schema;
pub mod testing;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::cancellation::CancellationToken;
    pub use crate::client::{HttpClient, ReqwestTransport, Transport};
    pub use crate::config::{ConfigLoader, InputMode, OutputFormat, PipelineConfig};
    pub use crate::errors::{ErrorKind, EtlError, Result};
    pub use crate::logging::{init_logging, LoggingConfig};
    pub use crate::pipeline::{
        ErrorPolicy, Pipeline, PipelineHooks, RunOptions, RunResult, Stage, StageResult,
    };
    pub use crate::record::{Record, Table, Value};
    pub use crate::schema::{EntitySchema, SchemaRegistry};
}
