//! Name-keyed constructors for every pipeline role.

use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::sync::{Arc, OnceLock};

use serde::Serialize;
use tracing::{debug, warn};

use crate::connectors::{self, Connector, ConnectorArgs};
use crate::datasources::{self, DataSource};
use crate::error::HarvestError;
use crate::parsers::{self, Parser};
use crate::strategies::{self, Strategy, StrategyArgs};
use crate::transformers::{self, Transformer};

/// Capability role of a registered component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentRole {
    Connector,
    Parser,
    DataSource,
    Transformer,
    Strategy,
}

impl ComponentRole {
    pub const ALL: [Self; 5] = [
        Self::Connector,
        Self::Parser,
        Self::DataSource,
        Self::Transformer,
        Self::Strategy,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Connector => "connector",
            Self::Parser => "parser",
            Self::DataSource => "datasource",
            Self::Transformer => "transformer",
            Self::Strategy => "strategy",
        }
    }
}

impl Display for ComponentRole {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

type ConnectorFactory =
    Arc<dyn Fn(&ConnectorArgs) -> Result<Box<dyn Connector>, HarvestError> + Send + Sync>;
type ParserFactory = Arc<dyn Fn() -> Result<Box<dyn Parser>, HarvestError> + Send + Sync>;
type DataSourceFactory = Arc<dyn Fn() -> Result<Box<dyn DataSource>, HarvestError> + Send + Sync>;
type TransformerFactory =
    Arc<dyn Fn() -> Result<Box<dyn Transformer>, HarvestError> + Send + Sync>;
type StrategyFactory =
    Arc<dyn Fn(StrategyArgs) -> Result<Box<dyn Strategy>, HarvestError> + Send + Sync>;

/// Registry of component constructors, one map per role.
///
/// Populated before any lookup and read-only afterwards; share it through
/// an `Arc`. The first registration of a name wins.
#[derive(Default, Clone)]
pub struct ComponentRegistry {
    connectors: BTreeMap<String, ConnectorFactory>,
    parsers: BTreeMap<String, ParserFactory>,
    datasources: BTreeMap<String, DataSourceFactory>,
    transformers: BTreeMap<String, TransformerFactory>,
    strategies: BTreeMap<String, StrategyFactory>,
}

impl std::fmt::Debug for ComponentRegistry {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let mut debug = f.debug_struct("ComponentRegistry");
        for role in ComponentRole::ALL {
            debug.field(role.as_str(), &self.names(role));
        }
        debug.finish()
    }
}

impl ComponentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every built-in component.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        connectors::register(&mut registry);
        parsers::register(&mut registry);
        datasources::register(&mut registry);
        transformers::register(&mut registry);
        strategies::register(&mut registry);
        debug!(registry = ?registry, "built-in components registered");
        registry
    }

    /// Process-wide built-in registry.
    pub fn global() -> Arc<Self> {
        static GLOBAL: OnceLock<Arc<ComponentRegistry>> = OnceLock::new();
        Arc::clone(GLOBAL.get_or_init(|| Arc::new(Self::with_builtins())))
    }

    pub fn register_connector<F>(&mut self, name: &str, factory: F) -> bool
    where
        F: Fn(&ConnectorArgs) -> Result<Box<dyn Connector>, HarvestError> + Send + Sync + 'static,
    {
        let factory: ConnectorFactory = Arc::new(factory);
        insert_first(&mut self.connectors, ComponentRole::Connector, name, factory)
    }

    pub fn register_parser<F>(&mut self, name: &str, factory: F) -> bool
    where
        F: Fn() -> Result<Box<dyn Parser>, HarvestError> + Send + Sync + 'static,
    {
        let factory: ParserFactory = Arc::new(factory);
        insert_first(&mut self.parsers, ComponentRole::Parser, name, factory)
    }

    pub fn register_datasource<F>(&mut self, name: &str, factory: F) -> bool
    where
        F: Fn() -> Result<Box<dyn DataSource>, HarvestError> + Send + Sync + 'static,
    {
        let factory: DataSourceFactory = Arc::new(factory);
        insert_first(&mut self.datasources, ComponentRole::DataSource, name, factory)
    }

    pub fn register_transformer<F>(&mut self, name: &str, factory: F) -> bool
    where
        F: Fn() -> Result<Box<dyn Transformer>, HarvestError> + Send + Sync + 'static,
    {
        let factory: TransformerFactory = Arc::new(factory);
        insert_first(&mut self.transformers, ComponentRole::Transformer, name, factory)
    }

    pub fn register_strategy<F>(&mut self, name: &str, factory: F) -> bool
    where
        F: Fn(StrategyArgs) -> Result<Box<dyn Strategy>, HarvestError> + Send + Sync + 'static,
    {
        let factory: StrategyFactory = Arc::new(factory);
        insert_first(&mut self.strategies, ComponentRole::Strategy, name, factory)
    }

    pub fn create_connector(
        &self,
        name: &str,
        args: &ConnectorArgs,
    ) -> Result<Box<dyn Connector>, HarvestError> {
        let factory = lookup(&self.connectors, ComponentRole::Connector, name)?;
        factory(args)
    }

    pub fn create_parser(&self, name: &str) -> Result<Box<dyn Parser>, HarvestError> {
        let factory = lookup(&self.parsers, ComponentRole::Parser, name)?;
        factory()
    }

    pub fn create_datasource(&self, name: &str) -> Result<Box<dyn DataSource>, HarvestError> {
        let factory = lookup(&self.datasources, ComponentRole::DataSource, name)?;
        factory()
    }

    pub fn create_transformer(&self, name: &str) -> Result<Box<dyn Transformer>, HarvestError> {
        let factory = lookup(&self.transformers, ComponentRole::Transformer, name)?;
        factory()
    }

    pub fn create_strategy(
        &self,
        name: &str,
        args: StrategyArgs,
    ) -> Result<Box<dyn Strategy>, HarvestError> {
        let factory = lookup(&self.strategies, ComponentRole::Strategy, name)?;
        factory(args)
    }

    pub fn contains(&self, role: ComponentRole, name: &str) -> bool {
        match role {
            ComponentRole::Connector => self.connectors.contains_key(name),
            ComponentRole::Parser => self.parsers.contains_key(name),
            ComponentRole::DataSource => self.datasources.contains_key(name),
            ComponentRole::Transformer => self.transformers.contains_key(name),
            ComponentRole::Strategy => self.strategies.contains_key(name),
        }
    }

    /// Registered names for `role`, sorted.
    pub fn names(&self, role: ComponentRole) -> Vec<String> {
        match role {
            ComponentRole::Connector => self.connectors.keys().cloned().collect(),
            ComponentRole::Parser => self.parsers.keys().cloned().collect(),
            ComponentRole::DataSource => self.datasources.keys().cloned().collect(),
            ComponentRole::Transformer => self.transformers.keys().cloned().collect(),
            ComponentRole::Strategy => self.strategies.keys().cloned().collect(),
        }
    }
}

fn insert_first<V>(
    map: &mut BTreeMap<String, V>,
    role: ComponentRole,
    name: &str,
    factory: V,
) -> bool {
    if map.contains_key(name) {
        warn!(%role, name, "component already registered; keeping the first registration");
        return false;
    }
    map.insert(name.to_string(), factory);
    true
}

fn lookup<'a, V>(
    map: &'a BTreeMap<String, V>,
    role: ComponentRole,
    name: &str,
) -> Result<&'a V, HarvestError> {
    map.get(name).ok_or_else(|| HarvestError::UnknownComponent {
        role,
        name: name.to_string(),
        available: map.keys().cloned().collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transformers::IdentityTransformer;

    #[test]
    fn test_first_registration_wins() {
        let mut registry = ComponentRegistry::new();
        assert!(registry.register_transformer("identity", || Ok(Box::new(IdentityTransformer))));
        assert!(!registry.register_transformer("identity", || {
            Err(HarvestError::config("shadowed"))
        }));
        assert!(registry.create_transformer("identity").is_ok());
    }

    #[test]
    fn test_unknown_names_list_sorted_registrations() {
        let registry = ComponentRegistry::with_builtins();
        let Err(HarvestError::UnknownComponent {
            role,
            name,
            available,
        }) = registry.create_parser("xml")
        else {
            panic!("expected unknown component");
        };
        assert_eq!(role, ComponentRole::Parser);
        assert_eq!(name, "xml");
        assert_eq!(available, ["html"]);
    }
}
