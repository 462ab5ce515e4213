//! Service catalog
//!
//! The set of deployment targets the orchestrator knows about, loaded once
//! at start-up from a JSON list of service definitions.

use cutover_core::domain::spec::{ServiceDefinition, SpecError};
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("failed to read service file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse service file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("service '{service}': {source}")]
    Invalid { service: String, source: SpecError },

    #[error("service '{0}' is defined more than once")]
    Duplicate(String),
}

/// Validated, name-indexed service definitions
#[derive(Debug, Clone, Default)]
pub struct ServiceCatalog {
    services: BTreeMap<String, ServiceDefinition>,
}

impl ServiceCatalog {
    pub fn new(definitions: Vec<ServiceDefinition>) -> Result<Self, CatalogError> {
        let mut services = BTreeMap::new();

        for definition in definitions {
            definition
                .validate()
                .map_err(|source| CatalogError::Invalid {
                    service: definition.name.clone(),
                    source,
                })?;

            if services.contains_key(&definition.name) {
                return Err(CatalogError::Duplicate(definition.name));
            }
            services.insert(definition.name.clone(), definition);
        }

        Ok(Self { services })
    }

    pub fn from_json(json: &str) -> Result<Self, CatalogError> {
        Self::new(serde_json::from_str(json)?)
    }

    pub async fn load(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let json = tokio::fs::read_to_string(path).await?;
        Self::from_json(&json)
    }

    pub fn get(&self, name: &str) -> Option<&ServiceDefinition> {
        self.services.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ServiceDefinition> {
        self.services.values()
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}
