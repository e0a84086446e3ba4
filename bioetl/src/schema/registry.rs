//! Process-wide schema registry.

use super::entities::{builtin, EntitySchema};
use crate::errors::{EtlError, Result};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, LazyLock};

/// Registry of entity schemas keyed by entity name.
///
/// Registration is allowed until [`SchemaRegistry::freeze`] is called, which
/// the orchestrator does before the first run.
#[derive(Debug, Default)]
pub struct SchemaRegistry {
    entries: RwLock<BTreeMap<String, Arc<EntitySchema>>>,
    frozen: AtomicBool,
}

/// Saved registry contents for [`SchemaRegistry::restore`].
#[derive(Debug, Clone)]
pub struct RegistrySnapshot {
    entries: BTreeMap<String, Arc<EntitySchema>>,
    frozen: bool,
}

impl SchemaRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry holding the built-in ChEMBL schemas.
    #[must_use]
    pub fn with_builtins() -> Self {
        let registry = Self::new();
        {
            let mut entries = registry.entries.write();
            for schema in builtin() {
                entries.insert(schema.entity.clone(), Arc::new(schema));
            }
        }
        registry
    }

    /// The process-wide registry.
    #[must_use]
    pub fn global() -> &'static Self {
        &GLOBAL
    }

    /// Adds or replaces a schema.
    ///
    /// # Errors
    ///
    /// Returns a configuration error once the registry is frozen.
    pub fn register(&self, schema: EntitySchema) -> Result<()> {
        if self.is_frozen() {
            return Err(EtlError::config(format!(
                "schema registry is frozen; cannot register '{}'",
                schema.entity
            )));
        }
        self.entries
            .write()
            .insert(schema.entity.clone(), Arc::new(schema));
        Ok(())
    }

    /// Looks up a schema.
    #[must_use]
    pub fn get(&self, entity: &str) -> Option<Arc<EntitySchema>> {
        self.entries.read().get(entity).cloned()
    }

    /// Looks up a schema or fails with a configuration error.
    ///
    /// # Errors
    ///
    /// Returns `CONFIG_VALIDATION` for unknown entities.
    pub fn require(&self, entity: &str) -> Result<Arc<EntitySchema>> {
        self.get(entity).ok_or_else(|| {
            EtlError::config(format!(
                "unknown entity '{entity}'; known: {}",
                self.entities().join(", ")
            ))
        })
    }

    /// Registered entity names, sorted.
    #[must_use]
    pub fn entities(&self) -> Vec<String> {
        self.entries.read().keys().cloned().collect()
    }

    /// Makes the registry read-only.
    pub fn freeze(&self) {
        self.frozen.store(true, Ordering::SeqCst);
    }

    /// True once frozen.
    #[must_use]
    pub fn is_frozen(&self) -> bool {
        self.frozen.load(Ordering::SeqCst)
    }

    /// Captures the current contents.
    #[must_use]
    pub fn snapshot(&self) -> RegistrySnapshot {
        RegistrySnapshot {
            entries: self.entries.read().clone(),
            frozen: self.is_frozen(),
        }
    }

    /// Puts back a snapshot, including its frozen flag. Test fixtures only.
    pub fn restore(&self, snapshot: RegistrySnapshot) {
        *self.entries.write() = snapshot.entries;
        self.frozen.store(snapshot.frozen, Ordering::SeqCst);
    }

    /// Resets to the built-in schemas and unfreezes. Test fixtures only.
    pub fn reset_for_tests(&self) {
        let fresh = Self::with_builtins();
        self.restore(fresh.snapshot());
    }
}

static GLOBAL: LazyLock<SchemaRegistry> = LazyLock::new(SchemaRegistry::with_builtins);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::entities;

    #[test]
    fn test_builtins_registered() {
        let registry = SchemaRegistry::with_builtins();
        assert_eq!(
            registry.entities(),
            vec!["activity", "assay", "document", "target", "testitem"]
        );
        assert_eq!(registry.require("assay").unwrap().endpoint, "assay");
        assert!(registry.require("nope").is_err());
    }

    #[test]
    fn test_frozen_registry_rejects_registration() {
        let registry = SchemaRegistry::with_builtins();
        registry.freeze();
        let err = registry.register(entities::assay()).unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn test_snapshot_restore() {
        let registry = SchemaRegistry::new();
        let snapshot = registry.snapshot();

        let mut custom = entities::assay();
        custom.entity = "custom".into();
        registry.register(custom).unwrap();
        registry.freeze();
        assert!(registry.get("custom").is_some());

        registry.restore(snapshot);
        assert!(registry.get("custom").is_none());
        assert!(!registry.is_frozen());

        registry.reset_for_tests();
        assert!(registry.get("target").is_some());
    }

    #[test]
    fn test_global_has_builtins() {
        assert!(SchemaRegistry::global().get("document").is_some());
    }
}
