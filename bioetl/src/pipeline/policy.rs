//! Stage error policy.

use super::stage::Stage;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// What the orchestrator does when a stage fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorPolicy {
    /// Abort the run and surface the error.
    #[default]
    Fail,
    /// Record the failure and continue with the next stage.
    Skip,
    /// Re-run the stage up to the retry policy's attempt limit, then fail.
    Retry,
}

impl fmt::Display for ErrorPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fail => write!(f, "fail"),
            Self::Skip => write!(f, "skip"),
            Self::Retry => write!(f, "retry"),
        }
    }
}

/// Default policy plus per-stage overrides.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PolicyTable {
    default: ErrorPolicy,
    overrides: BTreeMap<String, ErrorPolicy>,
}

impl PolicyTable {
    /// Creates a table.
    #[must_use]
    pub fn new(default: ErrorPolicy, overrides: BTreeMap<String, ErrorPolicy>) -> Self {
        Self { default, overrides }
    }

    /// Overrides one stage.
    #[must_use]
    pub fn with_stage(mut self, stage: Stage, policy: ErrorPolicy) -> Self {
        self.overrides.insert(stage.as_str().to_string(), policy);
        self
    }

    /// Policy for `stage`.
    #[must_use]
    pub fn for_stage(&self, stage: Stage) -> ErrorPolicy {
        self.overrides
            .get(stage.as_str())
            .copied()
            .unwrap_or(self.default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overrides_fall_back_to_default() {
        let table = PolicyTable::new(ErrorPolicy::Fail, BTreeMap::new())
            .with_stage(Stage::Validate, ErrorPolicy::Skip);
        assert_eq!(table.for_stage(Stage::Validate), ErrorPolicy::Skip);
        assert_eq!(table.for_stage(Stage::Extract), ErrorPolicy::Fail);
    }

    #[test]
    fn test_serde_names() {
        let policy: ErrorPolicy = serde_yaml::from_str("retry").unwrap();
        assert_eq!(policy, ErrorPolicy::Retry);
        assert_eq!(ErrorPolicy::Skip.to_string(), "skip");
        assert!(serde_yaml::from_str::<ErrorPolicy>("ignore").is_err());
    }
}
