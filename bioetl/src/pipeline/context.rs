//! Per-run identity and resolved settings.

use crate::config::PipelineConfig;
use chrono::{DateTime, SubsecRound, Utc};
use std::sync::Arc;
use uuid::Uuid;

/// Immutable facts about one run.
#[derive(Debug, Clone)]
pub struct RunContext {
    run_id: Uuid,
    started_at: DateTime<Utc>,
    extracted_at: DateTime<Utc>,
    dry_run: bool,
    limit: Option<usize>,
    config: Arc<PipelineConfig>,
    fingerprint: String,
}

impl RunContext {
    /// Starts a run now.
    #[must_use]
    pub fn new(config: PipelineConfig, dry_run: bool, limit: Option<usize>) -> Self {
        Self::started_at(config, dry_run, limit, Utc::now())
    }

    /// Starts a run at an explicit instant.
    #[must_use]
    pub fn started_at(
        config: PipelineConfig,
        dry_run: bool,
        limit: Option<usize>,
        started_at: DateTime<Utc>,
    ) -> Self {
        let extracted_at = config
            .features
            .determinism
            .frozen_extracted_at
            .unwrap_or(started_at)
            .trunc_subsecs(0);
        let fingerprint = config.fingerprint();
        Self {
            run_id: Uuid::new_v4(),
            started_at,
            extracted_at,
            dry_run,
            limit,
            config: Arc::new(config),
            fingerprint,
        }
    }

    /// Run identifier.
    #[must_use]
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Wall-clock start.
    #[must_use]
    pub fn started(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Timestamp stamped into `extracted_at`; frozen when configured.
    #[must_use]
    pub fn extracted_at(&self) -> DateTime<Utc> {
        self.extracted_at
    }

    /// Whether output writing is skipped.
    #[must_use]
    pub fn dry_run(&self) -> bool {
        self.dry_run
    }

    /// Record limit.
    #[must_use]
    pub fn limit(&self) -> Option<usize> {
        self.limit
    }

    /// Resolved config snapshot.
    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Config fingerprint, computed once.
    #[must_use]
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// Pipeline identifier.
    #[must_use]
    pub fn pipeline_id(&self) -> &str {
        &self.config.id
    }

    /// Entity name.
    #[must_use]
    pub fn entity(&self) -> &str {
        &self.config.entity
    }

    /// Provider name.
    #[must_use]
    pub fn provider(&self) -> &str {
        &self.config.provider
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_frozen_timestamp_wins() {
        let mut config = PipelineConfig::new("chembl", "assay");
        let frozen = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        config.features.determinism.frozen_extracted_at = Some(frozen);

        let ctx = RunContext::new(config, false, None);
        assert_eq!(ctx.extracted_at(), frozen);
        assert_ne!(ctx.started(), frozen);
    }

    #[test]
    fn test_run_ids_are_unique() {
        let a = RunContext::new(PipelineConfig::new("chembl", "assay"), true, Some(3));
        let b = RunContext::new(PipelineConfig::new("chembl", "assay"), true, Some(3));
        assert_ne!(a.run_id(), b.run_id());
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_eq!(a.pipeline_id(), "assay_chembl");
        assert!(a.dry_run());
    }
}
