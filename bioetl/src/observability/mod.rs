//! Observability utilities.

pub mod metrics;

pub use metrics::{status_class, PipelineMetrics};
