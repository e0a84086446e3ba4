//! Stage and run results.

use super::stage::Stage;
use crate::errors::{EtlError, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

/// Outcome of one stage.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageResult {
    /// Stage name.
    pub stage_name: String,
    /// Whether the stage finished without error.
    pub success: bool,
    /// Rows handed to the next stage.
    pub records_processed: usize,
    /// Wall time across all attempts.
    pub duration_sec: f64,
    /// Error messages, one per failed attempt.
    pub errors: Vec<String>,
    /// Attempts made.
    pub attempts: u32,
}

impl StageResult {
    /// A successful stage.
    #[must_use]
    pub fn succeeded(stage: Stage, records: usize, elapsed: Duration, attempts: u32) -> Self {
        Self {
            stage_name: stage.to_string(),
            success: true,
            records_processed: records,
            duration_sec: elapsed.as_secs_f64(),
            errors: Vec::new(),
            attempts,
        }
    }

    /// A failed stage.
    #[must_use]
    pub fn failed(stage: Stage, errors: Vec<String>, elapsed: Duration, attempts: u32) -> Self {
        Self {
            stage_name: stage.to_string(),
            success: false,
            records_processed: 0,
            duration_sec: elapsed.as_secs_f64(),
            errors,
            attempts,
        }
    }
}

/// Outcome of a whole run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunResult {
    /// Run identifier.
    pub run_id: String,
    /// True when every executed stage succeeded.
    pub success: bool,
    /// Entity name.
    pub entity: String,
    /// Provider name.
    pub provider: String,
    /// Rows in the final dataset.
    pub row_count: usize,
    /// Tabular output file; `None` on dry runs.
    pub output_path: Option<PathBuf>,
    /// Run wall time.
    pub duration_sec: f64,
    /// Stage results in execution order.
    pub stages: Vec<StageResult>,
    /// Errors recorded by skipped stages.
    pub errors: Vec<String>,
    /// Run metadata, as written to `meta.yaml`.
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl RunResult {
    /// Result for `stage`, if it ran.
    #[must_use]
    pub fn stage(&self, stage: Stage) -> Option<&StageResult> {
        self.stages.iter().find(|s| s.stage_name == stage.as_str())
    }

    /// `Ok` for a clean run, `Incomplete` when skipped stages failed.
    ///
    /// # Errors
    ///
    /// Returns [`EtlError::Incomplete`] carrying the recorded errors.
    pub fn ensure_success(&self) -> Result<()> {
        if self.success {
            return Ok(());
        }
        Err(EtlError::Incomplete {
            failures: self.errors.clone(),
        })
    }

    /// One-line summary for logs and the CLI.
    #[must_use]
    pub fn summary(&self) -> String {
        let status = if self.success { "succeeded" } else { "completed with errors" };
        match &self.output_path {
            Some(path) => format!(
                "{}/{} {status}: {} rows -> {} in {:.2}s",
                self.entity,
                self.provider,
                self.row_count,
                path.display(),
                self.duration_sec
            ),
            None => format!(
                "{}/{} {status} (dry run): {} rows in {:.2}s",
                self.entity, self.provider, self.row_count, self.duration_sec
            ),
        }
    }
}
