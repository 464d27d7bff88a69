//! Entry point tying configuration, registry and strategies together.

use std::path::Path;
use std::sync::Arc;

use serde::Serialize;
use tracing::info;

use crate::config::{ConfigDocument, DatasetConfig, RunOverrides};
use crate::error::HarvestError;
use crate::registry::ComponentRegistry;
use crate::strategies::{RunReport, StrategyArgs};

/// One configured dataset as listed by [`DataFacade::datasets`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DatasetSummary {
    pub source: String,
    pub name: String,
    pub strategy: String,
}

/// Resolves datasets by name and runs them with the registered components.
#[derive(Debug, Clone)]
pub struct DataFacade {
    document: ConfigDocument,
    registry: Arc<ComponentRegistry>,
}

impl DataFacade {
    pub fn from_document(document: ConfigDocument) -> Self {
        Self {
            document,
            registry: ComponentRegistry::global(),
        }
    }

    pub fn load(path: &Path) -> Result<Self, HarvestError> {
        Ok(Self::from_document(ConfigDocument::load(path)?))
    }

    /// Replaces the builtin registry, e.g. with extra components.
    pub fn with_registry(mut self, registry: Arc<ComponentRegistry>) -> Self {
        self.registry = registry;
        self
    }

    pub fn registry(&self) -> &ComponentRegistry {
        &self.registry
    }

    pub fn document(&self) -> &ConfigDocument {
        &self.document
    }

    pub fn datasets(&self) -> Vec<DatasetSummary> {
        self.document
            .dataset_names()
            .into_iter()
            .map(|(source, name)| {
                let strategy = self
                    .document
                    .find(&format!("{source}/{name}"))
                    .map(|(_, _, _, entry)| entry.strategy.clone())
                    .unwrap_or_default();
                DatasetSummary {
                    source,
                    name,
                    strategy,
                }
            })
            .collect()
    }

    pub fn resolve(&self, name: &str, overrides: &RunOverrides) -> Result<DatasetConfig, HarvestError> {
        self.document.resolve(name, overrides)
    }

    /// Resolves `name` and runs it to completion.
    ///
    /// Sinks come from `overrides.sinks`, else from the dataset entry.
    pub fn run(&self, name: &str, overrides: &RunOverrides) -> Result<RunReport, HarvestError> {
        let config = Arc::new(self.resolve(name, overrides)?);
        let mut strategy = self.registry.create_strategy(
            &config.strategy,
            StrategyArgs {
                config: Arc::clone(&config),
                registry: Arc::clone(&self.registry),
            },
        )?;
        info!(dataset = %config.qualified_name(), strategy = strategy.name(), "dispatching run");
        strategy.run(&config.sinks)
    }
}
