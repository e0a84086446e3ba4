//! Locating pipeline documents under the config root.

use super::pipeline::PipelineConfig;
use crate::errors::{EtlError, Result};
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

/// Environment variable selecting the config root.
pub const CONFIG_ROOT_ENV: &str = "BIOETL_CONFIG_ROOT";

/// Config root used when the variable is unset.
pub const DEFAULT_CONFIG_ROOT: &str = "configs";

/// Resolves pipeline names to documents under `<root>/pipelines/<provider>/<entity>.yaml`.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    root: PathBuf,
}

impl ConfigLoader {
    /// Loader rooted at `root`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Loader rooted at `$BIOETL_CONFIG_ROOT`, or `configs`.
    #[must_use]
    pub fn from_env() -> Self {
        let root = std::env::var_os(CONFIG_ROOT_ENV)
            .map_or_else(|| PathBuf::from(DEFAULT_CONFIG_ROOT), PathBuf::from);
        Self::new(root)
    }

    /// Config root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Splits `activity_chembl` into (`activity`, `chembl`) at the last underscore.
    ///
    /// # Errors
    ///
    /// Returns `CONFIG_VALIDATION` when the name has no underscore.
    pub fn split_name(name: &str) -> Result<(&str, &str)> {
        match name.rsplit_once('_') {
            Some((entity, provider)) if !entity.is_empty() && !provider.is_empty() => {
                Ok((entity, provider))
            }
            _ => Err(EtlError::config(format!(
                "pipeline name '{name}' must look like <entity>_<provider>"
            ))),
        }
    }

    /// Document path for a pipeline name.
    ///
    /// # Errors
    ///
    /// See [`ConfigLoader::split_name`].
    pub fn path_for(&self, name: &str) -> Result<PathBuf> {
        let (entity, provider) = Self::split_name(name)?;
        Ok(self
            .root
            .join("pipelines")
            .join(provider)
            .join(format!("{entity}.yaml")))
    }

    /// Loads and validates a pipeline by name.
    ///
    /// # Errors
    ///
    /// Returns `CONFIG_VALIDATION` for unknown names or invalid documents.
    pub fn load(&self, name: &str) -> Result<PipelineConfig> {
        let path = self.path_for(name)?;
        if !path.is_file() {
            return Err(EtlError::config(format!(
                "unknown pipeline '{name}': {} not found",
                path.display()
            )));
        }
        debug!(pipeline = name, path = %path.display(), "Loading pipeline config");
        let config = PipelineConfig::from_path(&path)?;
        if config.id != name {
            return Err(EtlError::config(format!(
                "{} declares id '{}' but was loaded as '{name}'",
                path.display(),
                config.id
            )));
        }
        Ok(config)
    }

    /// Pipeline names found under the root, sorted.
    pub fn list_pipelines(&self) -> Vec<String> {
        let base = self.root.join("pipelines");
        let mut names: Vec<String> = WalkDir::new(&base)
            .min_depth(2)
            .max_depth(2)
            .into_iter()
            .filter_map(std::result::Result::ok)
            .filter(|entry| entry.file_type().is_file())
            .filter_map(|entry| {
                let path = entry.path();
                if path.extension().and_then(|e| e.to_str()) != Some("yaml") {
                    return None;
                }
                let entity = path.file_stem()?.to_str()?;
                let provider = path.parent()?.file_name()?.to_str()?;
                Some(format!("{entity}_{provider}"))
            })
            .collect();
        names.sort();
        names
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::from_env()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(root: &Path, provider: &str, entity: &str, body: &str) {
        let dir = root.join("pipelines").join(provider);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join(format!("{entity}.yaml")), body).unwrap();
    }

    #[test]
    fn test_split_name_uses_last_underscore() {
        assert_eq!(ConfigLoader::split_name("activity_chembl").unwrap(), ("activity", "chembl"));
        assert_eq!(ConfigLoader::split_name("a_b_c").unwrap(), ("a_b", "c"));
        assert!(ConfigLoader::split_name("activity").is_err());
        assert!(ConfigLoader::split_name("_chembl").is_err());
    }

    #[test]
    fn test_load_and_list() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "chembl", "assay", "id: assay_chembl\nprovider: chembl\nentity: assay\n");
        write(dir.path(), "chembl", "target", "id: target_chembl\nprovider: chembl\nentity: target\n");
        std::fs::write(dir.path().join("pipelines").join("chembl").join("notes.txt"), "x").unwrap();

        let loader = ConfigLoader::new(dir.path());
        assert_eq!(loader.list_pipelines(), vec!["assay_chembl", "target_chembl"]);

        let config = loader.load("assay_chembl").unwrap();
        assert_eq!(config.entity, "assay");
        assert_eq!(loader.load("document_chembl").unwrap_err().exit_code(), 2);
    }

    #[test]
    fn test_id_mismatch_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "chembl", "assay", "id: other_chembl\nprovider: chembl\nentity: assay\n");
        assert!(ConfigLoader::new(dir.path()).load("assay_chembl").is_err());
    }

    #[test]
    fn test_missing_root_lists_nothing() {
        let loader = ConfigLoader::new("/definitely/not/here");
        assert!(loader.list_pipelines().is_empty());
    }
}
