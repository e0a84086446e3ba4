//! The fixed stage sequence.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Stage names in execution order.
pub const STAGES: &[&str] = &["extract", "transform", "validate", "hash", "write", "meta"];

/// One pipeline stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    /// Pull raw records from the record source.
    Extract,
    /// Normalize fields.
    Transform,
    /// Coerce and check against the entity schema.
    Validate,
    /// Sort, hash and stamp provenance columns.
    Hash,
    /// Write the tabular output.
    Write,
    /// Write `meta.yaml` and the quality reports.
    Meta,
}

impl Stage {
    /// All stages in order.
    pub const ALL: [Self; 6] = [
        Self::Extract,
        Self::Transform,
        Self::Validate,
        Self::Hash,
        Self::Write,
        Self::Meta,
    ];

    /// Stage name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Extract => "extract",
            Self::Transform => "transform",
            Self::Validate => "validate",
            Self::Hash => "hash",
            Self::Write => "write",
            Self::Meta => "meta",
        }
    }

    /// Whether the stage produces files; skipped on dry runs.
    #[must_use]
    pub fn writes_output(&self) -> bool {
        matches!(self, Self::Write | Self::Meta)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
