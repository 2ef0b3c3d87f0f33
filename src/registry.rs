use std::collections::{BTreeMap, BTreeSet};
use std::sync::RwLock;

use serde::{Deserialize, Serialize};

use crate::error::LedgerError;
use crate::object::ObjectType;

/// Answers which integrations are currently configured to sync which object
/// types. Queried fresh on every record call; enablement may change between
/// calls and no retroactive consistency is guaranteed.
pub trait SyncEnablement: Send + Sync {
    /// All integration names currently enabled for sync, in name order.
    fn enabled_integrations(&self) -> Result<Vec<String>, LedgerError>;

    /// Whether at least one enabled integration syncs the given object type.
    fn has_object_sync_enabled(&self, object_type: ObjectType) -> Result<bool, LedgerError>;

    /// The enabled integrations that sync the given object type, in name
    /// order.
    fn integrations_syncing(&self, object_type: ObjectType) -> Result<Vec<String>, LedgerError>;
}

/// What a registered integration is willing to sync.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct IntegrationDefinition {
    pub synced_objects: BTreeSet<ObjectType>,
}

impl IntegrationDefinition {
    pub fn syncing(objects: impl IntoIterator<Item = ObjectType>) -> Self {
        Self {
            synced_objects: objects.into_iter().collect(),
        }
    }
}

/// Per-integration entry in a [`RegistryConfig`].
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct IntegrationConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub objects: Vec<ObjectType>,
}

/// Serde-friendly registry configuration, e.g. loaded from a JSON settings
/// file by the embedding application.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RegistryConfig {
    pub integrations: BTreeMap<String, IntegrationConfig>,
}

#[derive(Default)]
struct RegistryInner {
    definitions: BTreeMap<String, IntegrationDefinition>,
    enabled: BTreeSet<String>,
}

/// In-process enablement registry. Registration (the installed integration
/// definitions) and enablement (the configured name set) are independent, so
/// a configuration can reference an integration that is not installed; the
/// query methods surface that as [`LedgerError::IntegrationNotFound`].
pub struct IntegrationRegistry {
    inner: RwLock<RegistryInner>,
}

impl IntegrationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a registry from configuration: every listed integration is
    /// registered with its object set, and enabled when flagged.
    pub fn from_config(config: &RegistryConfig) -> Result<Self, LedgerError> {
        let registry = Self::new();
        for (name, integration) in &config.integrations {
            registry.register(
                name,
                IntegrationDefinition::syncing(integration.objects.iter().copied()),
            )?;
            if integration.enabled {
                registry.enable(name)?;
            }
        }
        Ok(registry)
    }

    /// Parses a JSON [`RegistryConfig`] and builds a registry from it.
    pub fn from_json(json: &str) -> Result<Self, LedgerError> {
        let config: RegistryConfig = serde_json::from_str(json)?;
        Self::from_config(&config)
    }

    pub fn register(&self, name: &str, definition: IntegrationDefinition) -> Result<(), LedgerError> {
        let mut inner = self.inner.write().map_err(|_| LedgerError::LockPoisoned)?;
        inner.definitions.insert(name.to_string(), definition);
        Ok(())
    }

    /// Marks an integration enabled. The name is not validated against the
    /// registered definitions; configuration can arrive before installation.
    pub fn enable(&self, name: &str) -> Result<(), LedgerError> {
        let mut inner = self.inner.write().map_err(|_| LedgerError::LockPoisoned)?;
        inner.enabled.insert(name.to_string());
        Ok(())
    }

    pub fn disable(&self, name: &str) -> Result<(), LedgerError> {
        let mut inner = self.inner.write().map_err(|_| LedgerError::LockPoisoned)?;
        inner.enabled.remove(name);
        Ok(())
    }
}

impl Default for IntegrationRegistry {
    fn default() -> Self {
        Self {
            inner: RwLock::new(RegistryInner::default()),
        }
    }
}

impl SyncEnablement for IntegrationRegistry {
    fn enabled_integrations(&self) -> Result<Vec<String>, LedgerError> {
        let inner = self.inner.read().map_err(|_| LedgerError::LockPoisoned)?;
        Ok(inner.enabled.iter().cloned().collect())
    }

    fn has_object_sync_enabled(&self, object_type: ObjectType) -> Result<bool, LedgerError> {
        Ok(!self.integrations_syncing(object_type)?.is_empty())
    }

    fn integrations_syncing(&self, object_type: ObjectType) -> Result<Vec<String>, LedgerError> {
        let inner = self.inner.read().map_err(|_| LedgerError::LockPoisoned)?;
        let mut names = Vec::new();
        for name in &inner.enabled {
            let definition =
                inner
                    .definitions
                    .get(name)
                    .ok_or_else(|| LedgerError::IntegrationNotFound {
                        name: name.clone(),
                    })?;
            if definition.synced_objects.contains(&object_type) {
                names.push(name.clone());
            }
        }
        Ok(names)
    }
}
