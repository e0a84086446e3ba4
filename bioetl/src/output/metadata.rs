//! The `meta.yaml` sidecar.

use super::writer::{atomic_write, sha256_file, WriteResult};
use crate::errors::Result;
use crate::extract::SourceMetadata;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use tokio::time::Instant;

/// Sidecar file name.
pub const META_FILE: &str = "meta.yaml";

/// One file produced by the run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutputFile {
    /// File name relative to the output directory.
    pub name: String,
    /// Hex SHA-256.
    pub checksum: String,
}

/// Quality summary embedded in the sidecar.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct QcSummary {
    /// Rows repeating an earlier business key.
    pub duplicate_business_keys: usize,
    /// Columns under the configured coverage minimum.
    pub low_coverage_columns: Vec<String>,
}

/// Everything recorded about a run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunMetadata {
    /// Run identifier.
    pub run_id: String,
    /// Pipeline identifier.
    pub pipeline_id: String,
    /// Entity name.
    pub entity: String,
    /// Provider name.
    pub provider: String,
    /// Entity schema version.
    pub schema_version: String,
    /// Extraction timestamp, `YYYY-MM-DDTHH:MM:SS+00:00`.
    pub timestamp: String,
    /// Rows in the tabular output.
    pub row_count: usize,
    /// Checksum of the tabular output.
    pub checksum: String,
    /// Output column order.
    pub columns: Vec<String>,
    /// Files written, tabular output first.
    pub files: Vec<OutputFile>,
    /// Record source provenance.
    pub source: SourceMetadata,
    /// Fingerprint of the resolved config.
    pub config_fingerprint: String,
    /// Quality summary.
    pub qc: QcSummary,
}

impl RunMetadata {
    /// Key-sorted JSON object form.
    #[must_use]
    pub fn to_map(&self) -> BTreeMap<String, serde_json::Value> {
        match serde_json::to_value(self) {
            Ok(serde_json::Value::Object(map)) => map.into_iter().collect(),
            _ => BTreeMap::new(),
        }
    }

    /// YAML with keys sorted at every level.
    ///
    /// # Errors
    ///
    /// Returns a YAML error if serialization fails.
    pub fn to_yaml(&self) -> Result<String> {
        // serde_json maps are ordered by key
        let sorted = serde_json::to_value(self)?;
        Ok(serde_yaml::to_string(&sorted)?)
    }

    /// Writes `meta.yaml` under `dir` atomically.
    ///
    /// # Errors
    ///
    /// Returns `WRITE_ERROR` on IO failures.
    pub async fn write(&self, dir: &Path) -> Result<WriteResult> {
        let started = Instant::now();
        let path = dir.join(META_FILE);
        atomic_write(&path, self.to_yaml()?.as_bytes()).await?;
        Ok(WriteResult {
            checksum: sha256_file(&path).await?,
            path,
            row_count: self.row_count,
            duration_sec: started.elapsed().as_secs_f64(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Value;

    fn sample() -> RunMetadata {
        RunMetadata {
            run_id: "r-1".into(),
            pipeline_id: "target_chembl".into(),
            entity: "target".into(),
            provider: "chembl".into(),
            schema_version: "1.0.0".into(),
            timestamp: "2024-01-01T00:00:00+00:00".into(),
            row_count: 2,
            checksum: "ab".repeat(32),
            columns: vec!["target_chembl_id".into()],
            files: vec![OutputFile {
                name: "target.csv".into(),
                checksum: "ab".repeat(32),
            }],
            source: SourceMetadata {
                source_type: "api".into(),
                filters: BTreeMap::from([("organism".to_string(), Value::from("Homo sapiens"))]),
                ..SourceMetadata::default()
            },
            config_fingerprint: "cd".repeat(32),
            qc: QcSummary::default(),
        }
    }

    #[test]
    fn test_yaml_keys_are_sorted() {
        let yaml = sample().to_yaml().unwrap();
        let top: Vec<&str> = yaml
            .lines()
            .filter(|l| !l.starts_with(' ') && !l.starts_with('-') && l.contains(':'))
            .map(|l| l.split(':').next().unwrap())
            .collect();
        let mut sorted = top.clone();
        sorted.sort_unstable();
        assert_eq!(top, sorted);
        assert!(yaml.contains("row_count: 2"));
        assert!(yaml.contains("duplicate_business_keys: 0"));
    }

    #[tokio::test]
    async fn test_write_creates_sidecar() {
        let dir = tempfile::tempdir().unwrap();
        let result = sample().write(dir.path()).await.unwrap();
        assert_eq!(result.path, dir.path().join(META_FILE));

        let parsed: serde_yaml::Value = serde_yaml::from_str(&std::fs::read_to_string(&result.path).unwrap()).unwrap();
        assert_eq!(parsed["entity"], serde_yaml::Value::from("target"));
        assert_eq!(parsed["source"]["filters"]["organism"], serde_yaml::Value::from("Homo sapiens"));
    }
}
