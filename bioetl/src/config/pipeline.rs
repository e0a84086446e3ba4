//! Pipeline configuration document.

use super::providers::{ProviderDefaults, ProviderRegistry};
use crate::errors::{EtlError, Result};
use crate::logging::LoggingConfig;
use crate::normalize::FieldNormalizer;
use crate::pipeline::ErrorPolicy;
use crate::record::Value;
use crate::resilience::{CircuitBreakerConfig, RateLimitConfig, RetryPolicy};
use crate::schema::{EntitySchema, SchemaRegistry};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Where records come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputMode {
    /// Paginated REST extraction.
    #[default]
    Api,
    /// CSV whose columns already match the schema.
    CsvFull,
    /// CSV holding only IDs; records are fetched in batches.
    CsvIds,
    /// CSV whose shape is detected from its header.
    Csv,
}

impl InputMode {
    /// True for the CSV modes.
    #[must_use]
    pub fn needs_input_path(&self) -> bool {
        !matches!(self, Self::Api)
    }
}

/// Tabular output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Comma-separated values with header.
    #[default]
    Csv,
    /// Apache Parquet; needs the `parquet` cargo feature.
    Parquet,
}

impl OutputFormat {
    /// File extension without the dot.
    #[must_use]
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Parquet => "parquet",
        }
    }
}

/// The `provider_config` section: remote source settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderConfig {
    /// Base URL; defaults to the provider registry entry.
    #[serde(default)]
    pub base_url: Option<String>,
    /// Release probe endpoint; defaults to the provider registry entry.
    #[serde(default)]
    pub status_endpoint: Option<String>,
    /// Key of the release identifier in the status payload.
    #[serde(default)]
    pub release_key: Option<String>,
    /// Per-attempt deadline in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_seconds: f64,
    /// Records requested per page.
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    /// Longest URL the client will send.
    #[serde(default = "default_max_url_length")]
    pub max_url_length: usize,
    /// ID batches fetched concurrently; results keep input order.
    #[serde(default = "default_max_concurrent_batches")]
    pub max_concurrent_batches: usize,
    /// Retry policy.
    #[serde(default)]
    pub retries: RetryPolicy,
    /// Rate-limit budget.
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    /// Circuit breaker parameters.
    #[serde(default)]
    pub circuit_breaker: CircuitBreakerConfig,
    /// Query filters applied to API extraction.
    #[serde(default)]
    pub filters: BTreeMap<String, Value>,
    /// Extra request headers.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

fn default_timeout() -> f64 {
    30.0
}

fn default_page_size() -> usize {
    1000
}

fn default_max_url_length() -> usize {
    2000
}

fn default_max_concurrent_batches() -> usize {
    1
}

fn default_batch_size() -> usize {
    25
}

fn default_output_path() -> PathBuf {
    PathBuf::from("output")
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            status_endpoint: None,
            release_key: None,
            timeout_seconds: default_timeout(),
            page_size: default_page_size(),
            max_url_length: default_max_url_length(),
            max_concurrent_batches: default_max_concurrent_batches(),
            retries: RetryPolicy::default(),
            rate_limit: RateLimitConfig::default(),
            circuit_breaker: CircuitBreakerConfig::default(),
            filters: BTreeMap::new(),
            headers: BTreeMap::new(),
        }
    }
}

impl ProviderConfig {
    /// Per-attempt deadline.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs_f64(self.timeout_seconds.max(0.0))
    }
}

/// The `normalization` section.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NormalizationConfig {
    /// Per-field normalizer overrides.
    #[serde(default)]
    pub fields: BTreeMap<String, FieldNormalizer>,
}

/// Supported hash algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    /// SHA-256, hex encoded.
    #[default]
    Sha256,
}

/// The `hashing` section.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HashingConfig {
    /// Algorithm.
    #[serde(default)]
    pub algorithm: HashAlgorithm,
    /// Business-key fields; defaults to the entity schema's key.
    #[serde(default)]
    pub business_key: Option<Vec<String>>,
}

/// The `qc` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QcConfig {
    /// Write `quality_report.csv`.
    #[serde(default = "default_true")]
    pub quality_report: bool,
    /// Write `correlation_report.csv`.
    #[serde(default = "default_true")]
    pub correlation_report: bool,
    /// Minimum non-null ratio for a column's coverage flag.
    #[serde(default)]
    pub min_coverage: f64,
    /// Turn duplicate business keys into a validation error.
    #[serde(default)]
    pub fail_on_duplicates: bool,
}

fn default_true() -> bool {
    true
}

impl Default for QcConfig {
    fn default() -> Self {
        Self {
            quality_report: true,
            correlation_report: true,
            min_coverage: 0.0,
            fail_on_duplicates: false,
        }
    }
}

/// `features.determinism`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeterminismConfig {
    /// Sort keys applied before `index`; defaults to the business key.
    #[serde(default)]
    pub sort_by: Option<Vec<String>>,
    /// Pins `extracted_at` instead of the run start time.
    #[serde(default)]
    pub frozen_extracted_at: Option<DateTime<Utc>>,
}

/// The `features` section.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FeaturesConfig {
    /// Output format.
    #[serde(default)]
    pub output_format: OutputFormat,
    /// Determinism flags.
    #[serde(default)]
    pub determinism: DeterminismConfig,
    /// Default stage error policy.
    #[serde(default)]
    pub error_policy: ErrorPolicy,
    /// Per-stage overrides of `error_policy`.
    #[serde(default)]
    pub stage_policies: BTreeMap<String, ErrorPolicy>,
}

/// A validated pipeline configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineConfig {
    /// Pipeline identifier, e.g. `activity_chembl`.
    pub id: String,
    /// Provider name, e.g. `chembl`.
    pub provider: String,
    /// Entity name, e.g. `activity`.
    pub entity: String,
    /// Input mode.
    #[serde(default)]
    pub input_mode: InputMode,
    /// Input CSV for the CSV modes.
    #[serde(default)]
    pub input_path: Option<PathBuf>,
    /// Output directory.
    #[serde(default = "default_output_path")]
    pub output_path: PathBuf,
    /// IDs per batched request.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Remote source settings.
    #[serde(default)]
    pub provider_config: ProviderConfig,
    /// Normalizer overrides.
    #[serde(default)]
    pub normalization: NormalizationConfig,
    /// Hashing settings.
    #[serde(default)]
    pub hashing: HashingConfig,
    /// Quality checks.
    #[serde(default)]
    pub qc: QcConfig,
    /// Logging.
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Feature flags.
    #[serde(default)]
    pub features: FeaturesConfig,
}

/// Provider settings with registry defaults filled in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSource {
    /// Base URL.
    pub base_url: String,
    /// Release probe endpoint.
    pub status_endpoint: String,
    /// Release identifier key.
    pub release_key: String,
}

impl PipelineConfig {
    /// Creates a minimal config for `entity` from `provider`.
    #[must_use]
    pub fn new(provider: impl Into<String>, entity: impl Into<String>) -> Self {
        let provider = provider.into();
        let entity = entity.into();
        Self {
            id: format!("{entity}_{provider}"),
            provider,
            entity,
            input_mode: InputMode::default(),
            input_path: None,
            output_path: default_output_path(),
            batch_size: default_batch_size(),
            provider_config: ProviderConfig::default(),
            normalization: NormalizationConfig::default(),
            hashing: HashingConfig::default(),
            qc: QcConfig::default(),
            logging: LoggingConfig::default(),
            features: FeaturesConfig::default(),
        }
    }

    /// Parses and validates a YAML document.
    ///
    /// # Errors
    ///
    /// Returns `CONFIG_VALIDATION` on syntax errors, unknown keys, or failed
    /// semantic checks.
    pub fn from_yaml_str(text: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a YAML file.
    ///
    /// # Errors
    ///
    /// See [`PipelineConfig::from_yaml_str`]; a missing file is also a config error.
    pub fn from_path(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            EtlError::config(format!("cannot read config {}: {e}", path.display()))
        })?;
        Self::from_yaml_str(&text).map_err(|e| match e {
            EtlError::Yaml(inner) => {
                EtlError::config(format!("{}: {inner}", path.display()))
            }
            other => other,
        })
    }

    /// Entity schema from the global registry.
    ///
    /// # Errors
    ///
    /// Returns `CONFIG_VALIDATION` for an unknown entity.
    pub fn schema(&self) -> Result<std::sync::Arc<EntitySchema>> {
        SchemaRegistry::global().require(&self.entity)
    }

    /// Business-key fields: configured or the schema's.
    ///
    /// # Errors
    ///
    /// Returns `CONFIG_VALIDATION` for an unknown entity.
    pub fn business_key(&self) -> Result<Vec<String>> {
        match &self.hashing.business_key {
            Some(fields) => Ok(fields.clone()),
            None => Ok(self.schema()?.business_key.clone()),
        }
    }

    /// Configured sort keys. Empty keeps the extraction order.
    pub fn sort_keys(&self) -> Vec<String> {
        self.features.determinism.sort_by.clone().unwrap_or_default()
    }

    /// Provider settings with registry defaults applied.
    ///
    /// # Errors
    ///
    /// Returns `CONFIG_VALIDATION` when neither the config nor the registry
    /// supplies a base URL.
    pub fn resolved_source(&self) -> Result<ResolvedSource> {
        let defaults: Option<ProviderDefaults> = ProviderRegistry::global().get(&self.provider);
        let pc = &self.provider_config;

        let base_url = pc
            .base_url
            .clone()
            .or_else(|| defaults.as_ref().map(|d| d.base_url.clone()))
            .ok_or_else(|| {
                EtlError::config(format!(
                    "provider '{}' has no base_url and no registry default",
                    self.provider
                ))
            })?;
        let status_endpoint = pc
            .status_endpoint
            .clone()
            .or_else(|| defaults.as_ref().map(|d| d.status_endpoint.clone()))
            .unwrap_or_else(|| "status".to_string());
        let release_key = pc
            .release_key
            .clone()
            .or_else(|| defaults.as_ref().map(|d| d.release_key.clone()))
            .unwrap_or_else(|| "version".to_string());

        Ok(ResolvedSource {
            base_url,
            status_endpoint,
            release_key,
        })
    }

    /// Semantic checks beyond deserialization.
    ///
    /// # Errors
    ///
    /// Returns `CONFIG_VALIDATION` describing the first problem found.
    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(EtlError::config("id must not be empty"));
        }
        let schema = self.schema()?;
        self.resolved_source()?;

        let pc = &self.provider_config;
        pc.retries.validate()?;
        pc.circuit_breaker.validate()?;
        crate::resilience::RateLimiter::from_config(&pc.rate_limit)?;

        if self.batch_size == 0 {
            return Err(EtlError::config("batch_size must be >= 1"));
        }
        if pc.page_size == 0 {
            return Err(EtlError::config("provider_config.page_size must be >= 1"));
        }
        if pc.max_concurrent_batches == 0 {
            return Err(EtlError::config(
                "provider_config.max_concurrent_batches must be >= 1",
            ));
        }
        if !(pc.timeout_seconds.is_finite() && pc.timeout_seconds > 0.0) {
            return Err(EtlError::config("provider_config.timeout_seconds must be > 0"));
        }
        if self.input_mode.needs_input_path() && self.input_path.is_none() {
            return Err(EtlError::config(format!(
                "input_mode {:?} requires input_path",
                self.input_mode
            )));
        }
        if !(0.0..=1.0).contains(&self.qc.min_coverage) {
            return Err(EtlError::config("qc.min_coverage must be within [0, 1]"));
        }

        let key = self.business_key()?;
        if key.is_empty() {
            return Err(EtlError::config("hashing.business_key must not be empty"));
        }
        for field in key.iter().chain(self.sort_keys().iter()) {
            if schema.column(field).is_none() {
                return Err(EtlError::config(format!(
                    "field '{field}' is not a column of entity '{}'",
                    self.entity
                )));
            }
        }

        for stage in self.features.stage_policies.keys() {
            if !crate::pipeline::STAGES.contains(&stage.as_str()) {
                return Err(EtlError::config(format!(
                    "features.stage_policies: unknown stage '{stage}'"
                )));
            }
        }

        if self.features.output_format == OutputFormat::Parquet && !cfg!(feature = "parquet") {
            return Err(EtlError::config(
                "output_format parquet requires building with the `parquet` feature",
            ));
        }
        Ok(())
    }

    /// SHA-256 over the key-sorted JSON form of this config.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        let json = serde_json::to_value(self).unwrap_or(serde_json::Value::Null);
        crate::hashing::sha256_hex(&json.to_string())
    }
}
