//! Record sources: REST API, full CSV, and ID-only CSV.

use super::service::ExtractionService;
use crate::client::QueryParams;
use crate::config::{InputMode, PipelineConfig};
use crate::errors::{EtlError, Result};
use crate::record::{Record, Value};
use crate::schema::EntitySchema;
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

/// Input CSV shape, decided from its header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CsvShape {
    /// Columns already match the entity schema.
    Full,
    /// At most two columns, one of them the entity's ID column.
    IdOnly,
}

/// Classifies `path` by inspecting its header row.
///
/// # Errors
///
/// Returns an IO or CSV error when the file cannot be read.
pub fn detect_csv_shape(path: &Path, id_column: &str) -> Result<CsvShape> {
    let mut reader = csv::Reader::from_path(path)?;
    let headers = reader.headers()?;
    let has_id = headers.iter().any(|h| h.trim() == id_column);
    if headers.len() <= 2 && has_id {
        Ok(CsvShape::IdOnly)
    } else {
        Ok(CsvShape::Full)
    }
}

/// Description of where a run's records came from.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SourceMetadata {
    /// `api`, `csv_full` or `csv_ids`.
    pub source_type: String,
    /// Input CSV, for the CSV variants.
    pub input_path: Option<String>,
    /// Release identifier of the remote snapshot.
    pub release_version: Option<String>,
    /// API filters.
    pub filters: BTreeMap<String, Value>,
    /// IDs requested but not returned by the remote.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub missing_ids: Vec<String>,
    /// Repeated IDs dropped from the input.
    #[serde(skip_serializing_if = "is_zero")]
    pub duplicate_ids: usize,
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn is_zero(n: &usize) -> bool {
    *n == 0
}

/// Raw records plus their provenance.
#[derive(Debug, Clone, Default)]
pub struct Extracted {
    /// Records in logical input order.
    pub records: Vec<Record>,
    /// Provenance for `meta.yaml`.
    pub metadata: SourceMetadata,
}

/// Where raw records come from; chosen once from the input mode.
#[derive(Debug, Clone)]
pub enum RecordSource {
    /// Paginated API extraction with filters.
    Api {
        /// Extraction service.
        service: Arc<ExtractionService>,
        /// Query filters.
        filters: QueryParams,
    },
    /// CSV whose columns already match the schema.
    FullCsv {
        /// Input file.
        path: PathBuf,
    },
    /// CSV of IDs enriched through batched requests.
    IdOnlyCsv {
        /// Input file.
        path: PathBuf,
        /// Extraction service.
        service: Arc<ExtractionService>,
    },
}

impl RecordSource {
    /// Picks the variant for `config`; `csv` mode inspects the file header.
    ///
    /// # Errors
    ///
    /// Returns `CONFIG_VALIDATION` if a CSV mode lacks `input_path`, or an IO
    /// error when shape detection cannot read the file.
    pub fn from_config(
        config: &PipelineConfig,
        schema: &EntitySchema,
        service: Arc<ExtractionService>,
    ) -> Result<Self> {
        let input_path = || {
            config
                .input_path
                .clone()
                .ok_or_else(|| EtlError::config("input_path is required for CSV input"))
        };
        let source = match config.input_mode {
            InputMode::Api => Self::Api {
                service,
                filters: config.provider_config.filters.clone(),
            },
            InputMode::CsvFull => Self::FullCsv { path: input_path()? },
            InputMode::CsvIds => Self::IdOnlyCsv {
                path: input_path()?,
                service,
            },
            InputMode::Csv => {
                let path = input_path()?;
                match detect_csv_shape(&path, &schema.id_column)? {
                    CsvShape::Full => Self::FullCsv { path },
                    CsvShape::IdOnly => Self::IdOnlyCsv { path, service },
                }
            }
        };
        info!(source = source.kind(), entity = %schema.entity, "Record source selected");
        Ok(source)
    }

    /// Variant name.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Api { .. } => "api",
            Self::FullCsv { .. } => "csv_full",
            Self::IdOnlyCsv { .. } => "csv_ids",
        }
    }

    /// Static provenance; `read` adds the release and missing IDs.
    #[must_use]
    pub fn metadata(&self) -> SourceMetadata {
        let (input_path, filters) = match self {
            Self::Api { filters, .. } => (None, filters.clone()),
            Self::FullCsv { path } | Self::IdOnlyCsv { path, .. } => {
                (Some(path.display().to_string()), BTreeMap::new())
            }
        };
        SourceMetadata {
            source_type: self.kind().to_string(),
            input_path,
            filters,
            ..SourceMetadata::default()
        }
    }

    /// Reads every record, truncated to `limit`. Each call starts over.
    ///
    /// # Errors
    ///
    /// Propagates IO, CSV and extraction errors.
    pub async fn read(&self, schema: &EntitySchema, limit: Option<usize>) -> Result<Extracted> {
        let mut metadata = self.metadata();
        let records = match self {
            Self::Api { service, filters } => {
                metadata.release_version = service.get_release_version().await?;
                service.extract_all(schema, filters, limit).await?
            }
            Self::FullCsv { path } => read_full_csv(path, limit)?,
            Self::IdOnlyCsv { path, service } => {
                let (ids, duplicates) = read_id_column(path, &schema.id_column)?;
                metadata.release_version = service.get_release_version().await?;
                metadata.duplicate_ids = duplicates;

                let records = service.request_batch(schema, &ids, limit).await?;
                let requested = limit.map_or(ids.len(), |l| l.min(ids.len()));
                metadata.missing_ids = missing_ids(&ids[..requested], &records, &schema.id_column);
                if !metadata.missing_ids.is_empty() {
                    warn!(
                        entity = %schema.entity,
                        missing = metadata.missing_ids.len(),
                        "Remote returned no record for some IDs"
                    );
                }
                records
            }
        };
        Ok(Extracted { records, metadata })
    }
}

fn read_full_csv(path: &Path, limit: Option<usize>) -> Result<Vec<Record>> {
    let mut reader = csv::Reader::from_path(path)?;
    let headers: Vec<String> = reader.headers()?.iter().map(|h| h.trim().to_string()).collect();
    let mut records = Vec::new();
    for row in reader.records() {
        if limit.is_some_and(|l| records.len() >= l) {
            break;
        }
        let row = row?;
        let record: Record = headers
            .iter()
            .zip(row.iter())
            .map(|(name, cell)| {
                let value = if cell.is_empty() {
                    Value::Null
                } else {
                    Value::Str(cell.to_string())
                };
                (name.clone(), value)
            })
            .collect();
        records.push(record);
    }
    Ok(records)
}

/// Returns the unique non-blank IDs in file order and the number of repeats dropped.
fn read_id_column(path: &Path, id_column: &str) -> Result<(Vec<String>, usize)> {
    let mut reader = csv::Reader::from_path(path)?;
    let position = reader
        .headers()?
        .iter()
        .position(|h| h.trim() == id_column)
        .ok_or_else(|| {
            EtlError::parse(format!("{} has no '{id_column}' column", path.display()))
        })?;

    let mut seen = HashSet::new();
    let mut ids = Vec::new();
    let mut duplicates = 0;
    for row in reader.records() {
        let row = row?;
        let Some(id) = row.get(position).map(str::trim).filter(|s| !s.is_empty()) else {
            continue;
        };
        if seen.insert(id.to_string()) {
            ids.push(id.to_string());
        } else {
            duplicates += 1;
        }
    }
    Ok((ids, duplicates))
}

fn missing_ids(requested: &[String], records: &[Record], id_column: &str) -> Vec<String> {
    let returned: HashSet<String> = records
        .iter()
        .filter_map(|r| r.get(id_column).and_then(Value::to_cell))
        .collect();
    requested
        .iter()
        .filter(|id| !returned.contains(*id))
        .cloned()
        .collect()
}
