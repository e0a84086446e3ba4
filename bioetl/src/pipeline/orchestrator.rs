//! Runs the fixed stage sequence for one entity.
//!
//! `extract -> transform -> validate -> hash -> write -> meta`. Dry runs stop
//! after `hash`. Each stage runs under the error policy configured for it, and
//! cancellation is observed between stages and inside extraction.

use super::context::RunContext;
use super::hooks::{HookChain, LoggingHooks, PipelineHooks};
use super::policy::{ErrorPolicy, PolicyTable};
use super::result::{RunResult, StageResult};
use super::stage::Stage;
use crate::cancellation::CancellationToken;
use crate::client::{ReqwestTransport, Transport};
use crate::config::{PipelineConfig, ProviderRegistry};
use crate::errors::{EtlError, FailureCase, PipelineStageError, Result, ValidationError};
use crate::extract::{ExtractionService, RecordSource, SourceMetadata};
use crate::hashing::{format_extracted_at, hash_business_key, sort_rows, TransformerChain};
use crate::normalize::NormalizationService;
use crate::observability::PipelineMetrics;
use crate::output::{
    atomic_write, column_quality, correlation_report, render_correlation_csv, render_quality_csv,
    sha256_file, OutputFile, QcSummary, RunMetadata, TableWriter, WriteResult,
    CORRELATION_REPORT_FILE, QUALITY_REPORT_FILE,
};
use crate::record::{Record, Table};
use crate::schema::{EntitySchema, SchemaRegistry, SchemaValidator};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{info, info_span, warn, Instrument};

/// Per-invocation options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunOptions {
    /// Skip `write` and `meta`.
    pub dry_run: bool,
    /// Maximum records to extract.
    pub limit: Option<usize>,
}

impl RunOptions {
    /// A dry run.
    #[must_use]
    pub fn dry_run() -> Self {
        Self {
            dry_run: true,
            limit: None,
        }
    }

    /// Caps extraction at `limit` records.
    #[must_use]
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Data handed from stage to stage.
#[derive(Debug, Default)]
struct RunState {
    raw: Vec<Record>,
    source: SourceMetadata,
    table: Table,
    duplicates: usize,
    output: Option<WriteResult>,
    metadata: Option<RunMetadata>,
}

/// One configured entity pipeline.
pub struct Pipeline {
    config: PipelineConfig,
    schema: Arc<EntitySchema>,
    business_key: Vec<String>,
    sort_keys: Vec<String>,
    transport: Arc<dyn Transport>,
    hooks: HookChain,
    policies: PolicyTable,
    cancel: CancellationToken,
    metrics: Arc<PipelineMetrics>,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("id", &self.config.id)
            .field("entity", &self.schema.entity)
            .field("hooks", &self.hooks.len())
            .finish_non_exhaustive()
    }
}

impl Pipeline {
    /// Validates `config` and wires a live HTTP transport.
    ///
    /// # Errors
    ///
    /// Returns `CONFIG_VALIDATION` if the config is rejected or the HTTP
    /// client cannot be built.
    pub fn new(config: PipelineConfig) -> Result<Self> {
        let transport = Arc::new(ReqwestTransport::new()?);
        Self::with_transport(config, transport)
    }

    /// Validates `config` and uses `transport` for every request.
    ///
    /// # Errors
    ///
    /// Returns `CONFIG_VALIDATION` if the config is rejected.
    pub fn with_transport(config: PipelineConfig, transport: Arc<dyn Transport>) -> Result<Self> {
        config.validate()?;
        let schema = config.schema()?;
        let business_key = config.business_key()?;
        let sort_keys = config.sort_keys();
        let policies = PolicyTable::new(
            config.features.error_policy,
            config.features.stage_policies.clone(),
        );
        let metrics = Arc::new(PipelineMetrics::new(&config.id, &config.provider, &config.entity));
        let mut hooks = HookChain::new();
        hooks.add(Arc::new(LoggingHooks));

        Ok(Self {
            config,
            schema,
            business_key,
            sort_keys,
            transport,
            hooks,
            policies,
            cancel: CancellationToken::new(),
            metrics,
        })
    }

    /// Adds a lifecycle observer after the built-in logging hook.
    #[must_use]
    pub fn with_hook(mut self, hook: Arc<dyn PipelineHooks>) -> Self {
        self.hooks.add(hook);
        self
    }

    /// Observes `token` for cooperative cancellation.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Overrides the error policy of one stage.
    #[must_use]
    pub fn with_stage_policy(mut self, stage: Stage, policy: ErrorPolicy) -> Self {
        self.policies = self.policies.with_stage(stage, policy);
        self
    }

    /// The resolved config.
    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Metric sink shared with the HTTP client.
    #[must_use]
    pub fn metrics(&self) -> &Arc<PipelineMetrics> {
        &self.metrics
    }

    /// Stages executed for `options`, in order.
    #[must_use]
    pub fn planned_stages(options: RunOptions) -> Vec<Stage> {
        Stage::ALL
            .iter()
            .copied()
            .filter(|s| !(options.dry_run && s.writes_output()))
            .collect()
    }

    /// Runs every stage once.
    ///
    /// A stage under the `skip` policy records its failure and the run
    /// continues; the returned result then has `success == false`.
    ///
    /// # Errors
    ///
    /// Returns `PIPELINE_STAGE` wrapping the cause when a stage fails under
    /// `fail` or exhausts `retry`, and `CANCELLED` when the token fires
    /// between stages.
    pub async fn run(&self, options: RunOptions) -> Result<RunResult> {
        SchemaRegistry::global().freeze();
        ProviderRegistry::global().freeze();

        let ctx = RunContext::new(self.config.clone(), options.dry_run, options.limit);
        let span = info_span!(
            "pipeline_run",
            run_id = %ctx.run_id(),
            pipeline = %ctx.pipeline_id(),
            entity = %ctx.entity(),
            provider = %ctx.provider(),
            dry_run = options.dry_run,
        );
        self.run_with_context(&ctx).instrument(span).await
    }

    /// Runs every stage against an existing context.
    ///
    /// # Errors
    ///
    /// See [`Pipeline::run`].
    pub async fn run_with_context(&self, ctx: &RunContext) -> Result<RunResult> {
        let started = Instant::now();
        info!(limit = ?ctx.limit(), fingerprint = %ctx.fingerprint(), "Pipeline run starting");

        let service = Arc::new(
            ExtractionService::from_config(&self.config, Arc::clone(&self.transport), Some(Arc::clone(&self.metrics)))?
                .with_cancellation(self.cancel.clone()),
        );

        let options = RunOptions {
            dry_run: ctx.dry_run(),
            limit: ctx.limit(),
        };
        let mut state = RunState::default();
        let mut stages = Vec::new();
        let mut skipped_errors = Vec::new();

        for stage in Self::planned_stages(options) {
            self.cancel.check()?;
            let result = self.run_stage(ctx, stage, &service, &mut state).await?;
            if !result.success {
                skipped_errors.extend(result.errors.iter().cloned());
            }
            stages.push(result);
        }

        let metadata = match state.metadata.take() {
            Some(meta) => meta,
            None => self.build_metadata(ctx, &state, Vec::new()),
        };
        let result = RunResult {
            run_id: ctx.run_id().to_string(),
            success: stages.iter().all(|s| s.success),
            entity: ctx.entity().to_string(),
            provider: ctx.provider().to_string(),
            row_count: state.table.len(),
            output_path: state.output.as_ref().map(|w| w.path.clone()),
            duration_sec: started.elapsed().as_secs_f64(),
            stages,
            errors: skipped_errors,
            metadata: metadata.to_map(),
        };
        info!(
            success = result.success,
            rows = result.row_count,
            duration_sec = result.duration_sec,
            "{}",
            result.summary()
        );
        Ok(result)
    }

    async fn run_stage(
        &self,
        ctx: &RunContext,
        stage: Stage,
        service: &Arc<ExtractionService>,
        state: &mut RunState,
    ) -> Result<StageResult> {
        let policy = self.policies.for_stage(stage);
        let retries = &self.config.provider_config.retries;
        let max_attempts = match policy {
            ErrorPolicy::Retry => retries.max_attempts.max(1),
            ErrorPolicy::Fail | ErrorPolicy::Skip => 1,
        };

        self.hooks.on_stage_start(ctx, stage).await;
        let started = Instant::now();
        let mut errors = Vec::new();
        let mut attempt = 1;

        loop {
            let span = info_span!("stage", stage = %stage, attempt);
            let outcome = self.execute(ctx, stage, service, state).instrument(span).await;
            let cause = match outcome {
                Ok(records) => {
                    let result = StageResult::succeeded(stage, records, started.elapsed(), attempt);
                    self.finish_stage(ctx, &result).await;
                    return Ok(result);
                }
                Err(cause) => cause,
            };

            let cancelled = matches!(cause, EtlError::Cancelled(_));
            let err = PipelineStageError::wrap(
                ctx.run_id().to_string(),
                ctx.provider(),
                ctx.entity(),
                stage.as_str(),
                attempt,
                cause,
            );
            self.hooks.on_error(ctx, stage, &err).await;
            errors.push(err.to_string());

            if !cancelled && attempt < max_attempts {
                let delay = retries.get_delay(attempt);
                warn!(stage = %stage, attempt, delay = ?delay, error = %err, "Retrying stage");
                tokio::time::sleep(delay).await;
                attempt += 1;
                continue;
            }

            let result = StageResult::failed(stage, errors, started.elapsed(), attempt);
            self.finish_stage(ctx, &result).await;
            if policy == ErrorPolicy::Skip && !cancelled {
                warn!(stage = %stage, error = %err, "Stage failed, continuing under skip policy");
                self.skip_fallback(stage, state);
                return Ok(result);
            }
            return Err(err);
        }
    }

    async fn finish_stage(&self, ctx: &RunContext, result: &StageResult) {
        self.metrics.record_stage(
            &result.stage_name,
            result.success,
            std::time::Duration::from_secs_f64(result.duration_sec),
        );
        self.hooks.on_stage_end(ctx, result).await;
    }

    /// Keeps downstream stages fed after a skipped failure.
    fn skip_fallback(&self, stage: Stage, state: &mut RunState) {
        match stage {
            Stage::Transform => {
                state.table = Table::from_rows(self.schema.column_names(), state.raw.clone());
            }
            Stage::Validate => {
                state.table = state.table.project(&self.schema.column_names());
            }
            Stage::Extract | Stage::Hash | Stage::Write | Stage::Meta => {}
        }
    }

    async fn execute(
        &self,
        ctx: &RunContext,
        stage: Stage,
        service: &Arc<ExtractionService>,
        state: &mut RunState,
    ) -> Result<usize> {
        match stage {
            Stage::Extract => self.extract(ctx, service, state).await,
            Stage::Transform => Ok(self.transform(state)),
            Stage::Validate => self.validate(state),
            Stage::Hash => Ok(self.hash(ctx, state)),
            Stage::Write => self.write(state).await,
            Stage::Meta => self.meta(ctx, state).await,
        }
    }

    async fn extract(
        &self,
        ctx: &RunContext,
        service: &Arc<ExtractionService>,
        state: &mut RunState,
    ) -> Result<usize> {
        let source = RecordSource::from_config(&self.config, &self.schema, Arc::clone(service))?;
        let extracted = source.read(&self.schema, ctx.limit()).await?;
        state.raw = extracted.records;
        state.source = extracted.metadata;
        Ok(state.raw.len())
    }

    fn transform(&self, state: &mut RunState) -> usize {
        let normalizer = NormalizationService::for_schema(&self.schema, &self.config.normalization.fields);
        let table = Table::from_rows(self.schema.column_names(), state.raw.clone());
        state.table = normalizer.normalize_table(table);
        state.table.len()
    }

    fn validate(&self, state: &mut RunState) -> Result<usize> {
        let validated = SchemaValidator::new(&self.schema).validate(&state.table)?;

        let key = &self.business_key;
        let mut seen = HashSet::new();
        let mut failures = Vec::new();
        for (row_index, row) in validated.rows().iter().enumerate() {
            if let Some(hash) = hash_business_key(row, key) {
                if !seen.insert(hash.clone()) {
                    failures.push(FailureCase::new(key.join("+"), hash, "unique", Some(row_index)));
                }
            }
        }
        state.duplicates = failures.len();
        if !failures.is_empty() {
            if self.config.qc.fail_on_duplicates {
                return Err(ValidationError::new(self.schema.entity.clone(), failures).into());
            }
            warn!(duplicates = failures.len(), "Duplicate business keys");
        }

        state.table = validated;
        Ok(state.table.len())
    }

    fn hash(&self, ctx: &RunContext, state: &mut RunState) -> usize {
        let mut table = state.table.clone();
        sort_rows(&mut table, &self.sort_keys);
        TransformerChain::provenance(
            self.business_key.clone(),
            state.source.release_version.clone(),
            &ctx.extracted_at(),
        )
        .apply(&mut table);
        state.table = table;
        state.table.len()
    }

    async fn write(&self, state: &mut RunState) -> Result<usize> {
        let writer = TableWriter::new(self.config.features.output_format);
        let path = writer.output_file(&self.config.output_path, &self.schema.entity);
        let result = writer.write(&state.table, &self.schema.output_types(), &path).await?;
        let rows = result.row_count;
        state.output = Some(result);
        Ok(rows)
    }

    async fn meta(&self, ctx: &RunContext, state: &mut RunState) -> Result<usize> {
        let dir = self.config.output_path.as_path();
        let mut files = Vec::new();
        if let Some(output) = &state.output {
            files.push(OutputFile {
                name: file_name(&output.path),
                checksum: output.checksum.clone(),
            });
        }

        let qc = &self.config.qc;
        if qc.quality_report {
            let report = column_quality(&state.table, &self.schema, &self.schema.output_view(), qc.min_coverage);
            files.push(write_report(dir, QUALITY_REPORT_FILE, &render_quality_csv(&report)?).await?);
        }
        if qc.correlation_report {
            let report = correlation_report(&state.table, &self.schema);
            files.push(write_report(dir, CORRELATION_REPORT_FILE, &render_correlation_csv(&report)?).await?);
        }

        let metadata = self.build_metadata(ctx, state, files);
        metadata.write(dir).await?;
        let rows = metadata.row_count;
        state.metadata = Some(metadata);
        Ok(rows)
    }

    fn build_metadata(&self, ctx: &RunContext, state: &RunState, files: Vec<OutputFile>) -> RunMetadata {
        let low_coverage_columns = column_quality(
            &state.table,
            &self.schema,
            &self.schema.output_view(),
            self.config.qc.min_coverage,
        )
        .into_iter()
        .filter(|q| !q.coverage_ok)
        .map(|q| q.column)
        .collect();

        RunMetadata {
            run_id: ctx.run_id().to_string(),
            pipeline_id: ctx.pipeline_id().to_string(),
            entity: self.schema.entity.clone(),
            provider: ctx.provider().to_string(),
            schema_version: self.schema.version.clone(),
            timestamp: format_extracted_at(&ctx.extracted_at()),
            row_count: state.table.len(),
            checksum: state
                .output
                .as_ref()
                .map(|w| w.checksum.clone())
                .unwrap_or_default(),
            columns: self.schema.output_view(),
            files,
            source: state.source.clone(),
            config_fingerprint: ctx.fingerprint().to_string(),
            qc: QcSummary {
                duplicate_business_keys: state.duplicates,
                low_coverage_columns,
            },
        }
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

async fn write_report(dir: &Path, name: &str, bytes: &[u8]) -> Result<OutputFile> {
    let path = dir.join(name);
    atomic_write(&path, bytes).await?;
    Ok(OutputFile {
        name: name.to_string(),
        checksum: sha256_file(&path).await?,
    })
}

/// Runs the pipeline named by `config`, writing to its output path.
///
/// # Errors
///
/// See [`Pipeline::run`].
pub async fn run_pipeline(config: PipelineConfig, options: RunOptions) -> Result<RunResult> {
    Pipeline::new(config)?.run(options).await
}

/// Stage name to success flag.
#[must_use]
pub fn stage_summary(result: &RunResult) -> BTreeMap<String, bool> {
    result
        .stages
        .iter()
        .map(|s| (s.stage_name.clone(), s.success))
        .collect()
}
