//! Process-wide provider registry.

use crate::errors::{EtlError, Result};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::LazyLock;

/// Default source settings for one provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderDefaults {
    /// Provider name.
    pub name: String,
    /// Base URL of the REST service.
    pub base_url: String,
    /// Release probe endpoint.
    pub status_endpoint: String,
    /// Key of the release identifier in the status payload.
    pub release_key: String,
}

impl ProviderDefaults {
    /// The public ChEMBL data service.
    #[must_use]
    pub fn chembl() -> Self {
        Self {
            name: "chembl".to_string(),
            base_url: "https://www.ebi.ac.uk/chembl/api/data".to_string(),
            status_endpoint: "status".to_string(),
            release_key: "chembl_db_version".to_string(),
        }
    }
}

/// Provider name to default settings. Read-only once frozen.
#[derive(Debug, Default)]
pub struct ProviderRegistry {
    providers: RwLock<BTreeMap<String, ProviderDefaults>>,
    frozen: AtomicBool,
}

static GLOBAL: LazyLock<ProviderRegistry> = LazyLock::new(ProviderRegistry::with_builtins);

impl ProviderRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry holding the built-in providers.
    #[must_use]
    pub fn with_builtins() -> Self {
        let registry = Self::new();
        let chembl = ProviderDefaults::chembl();
        registry.providers.write().insert(chembl.name.clone(), chembl);
        registry
    }

    /// The process-wide registry.
    pub fn global() -> &'static Self {
        &GLOBAL
    }

    /// Adds or replaces a provider.
    ///
    /// # Errors
    ///
    /// Returns `CONFIG_VALIDATION` once the registry is frozen.
    pub fn register(&self, defaults: ProviderDefaults) -> Result<()> {
        if self.is_frozen() {
            return Err(EtlError::config(format!(
                "provider registry is frozen; cannot register '{}'",
                defaults.name
            )));
        }
        self.providers.write().insert(defaults.name.clone(), defaults);
        Ok(())
    }

    /// Looks up a provider.
    pub fn get(&self, name: &str) -> Option<ProviderDefaults> {
        self.providers.read().get(name).cloned()
    }

    /// Registered provider names, sorted.
    pub fn names(&self) -> Vec<String> {
        self.providers.read().keys().cloned().collect()
    }

    /// Rejects further registration.
    pub fn freeze(&self) {
        self.frozen.store(true, Ordering::SeqCst);
    }

    /// Whether the registry is frozen.
    pub fn is_frozen(&self) -> bool {
        self.frozen.load(Ordering::SeqCst)
    }

    /// Restores the built-in contents and unfreezes.
    pub fn reset_for_tests(&self) {
        let fresh = Self::with_builtins();
        *self.providers.write() = fresh.providers.into_inner();
        self.frozen.store(false, Ordering::SeqCst);
    }
}
