//! Behavior tests for named component registration and lookup.

use std::sync::Arc;

use statharvest_core::transformers::IdentityTransformer;
use statharvest_core::{
    ComponentRegistry, ComponentRole, ConfigDocument, ConnectorArgs, HarvestError, RecordBatch,
    RunOverrides, StrategyArgs, Transformer,
};

fn dataset_config() -> statharvest_core::DatasetConfig {
    ConfigDocument::from_json(
        r#"{"datasources": {"site": {"base_url": "https://stats.test", "datasource": "html_table",
            "datasets": {"d": {"strategy": "parameter_sweep", "endpoint_template": "p.htm", "table_id": "t"}}}}}"#,
    )
    .expect("document")
    .resolve("d", &RunOverrides::default())
    .expect("resolved")
}

#[test]
fn when_builtins_are_loaded_then_every_registered_name_creates_its_component() {
    // Given: the built-in registry
    let registry = ComponentRegistry::with_builtins();
    let args = ConnectorArgs::default();
    let config = Arc::new(dataset_config());

    // When / Then: each registered name constructs a component reporting a name
    for name in registry.names(ComponentRole::Connector) {
        let connector = registry.create_connector(&name, &args).expect("connector");
        assert!(!connector.name().is_empty());
    }
    for name in registry.names(ComponentRole::Parser) {
        assert_eq!(registry.create_parser(&name).expect("parser").name(), name);
    }
    for name in registry.names(ComponentRole::DataSource) {
        assert!(registry.create_datasource(&name).is_ok(), "{name}");
    }
    for name in registry.names(ComponentRole::Transformer) {
        assert_eq!(registry.create_transformer(&name).expect("transformer").name(), name);
    }
    for name in registry.names(ComponentRole::Strategy) {
        let args = StrategyArgs {
            config: Arc::clone(&config),
            registry: Arc::new(registry.clone()),
        };
        assert!(registry.create_strategy(&name, args).is_ok(), "{name}");
    }
}

#[test]
fn when_builtins_are_loaded_then_the_documented_names_exist() {
    let registry = ComponentRegistry::global();
    for (role, name) in [
        (ComponentRole::Connector, "http"),
        (ComponentRole::Connector, "browser"),
        (ComponentRole::Connector, "bulk_file"),
        (ComponentRole::Connector, "sql"),
        (ComponentRole::Parser, "html"),
        (ComponentRole::DataSource, "profootballreference"),
        (ComponentRole::DataSource, "fantasypros"),
        (ComponentRole::Transformer, "pfr_year_by_year"),
        (ComponentRole::Transformer, "pfr_game_by_game"),
        (ComponentRole::Transformer, "fantasy_pros_rankings"),
        (ComponentRole::Strategy, "year_by_year"),
        (ComponentRole::Strategy, "game_by_game"),
        (ComponentRole::Strategy, "nflfastr"),
    ] {
        assert!(registry.contains(role, name), "{role}/{name}");
    }
}

#[test]
fn when_name_is_unknown_then_lookup_lists_sorted_alternatives() {
    // Given: the built-in registry
    let registry = ComponentRegistry::with_builtins();

    // When: an unregistered transformer is requested
    let error = registry.create_transformer("espn").err().expect("unknown");

    // Then: the error names the role, the key and the sorted alternatives
    match error {
        HarvestError::UnknownComponent {
            role,
            name,
            available,
        } => {
            assert_eq!(role, ComponentRole::Transformer);
            assert_eq!(name, "espn");
            let mut sorted = available.clone();
            sorted.sort();
            assert_eq!(available, sorted);
            assert!(available.contains(&String::from("identity")));
        }
        other => panic!("unexpected error: {other}"),
    }
}

struct Uppercase;

impl Transformer for Uppercase {
    fn name(&self) -> &str {
        "identity"
    }

    fn transform(&self, batch: RecordBatch) -> Result<RecordBatch, HarvestError> {
        let (columns, rows) = batch.into_parts();
        RecordBatch::new(columns.into_iter().map(|c| c.to_uppercase()).collect(), rows)
    }
}

#[test]
fn when_name_is_registered_twice_then_the_first_registration_wins() {
    // Given: a registry with the built-in identity transformer
    let mut registry = ComponentRegistry::with_builtins();

    // When: another component claims the same name
    let accepted = registry.register_transformer("identity", || Ok(Box::new(Uppercase)));

    // Then: the registration is rejected and the first component stays
    assert!(!accepted);
    let batch = RecordBatch::new(vec![String::from("yds")], vec![]).unwrap();
    let out = registry.create_transformer("identity").unwrap().transform(batch).unwrap();
    assert_eq!(out.columns(), ["yds"]);
}

#[test]
fn when_registry_is_empty_then_custom_components_can_be_added() {
    let mut registry = ComponentRegistry::new();
    assert!(registry.register_transformer("identity", || Ok(Box::new(IdentityTransformer))));
    assert_eq!(registry.names(ComponentRole::Transformer), ["identity"]);
    assert!(registry.names(ComponentRole::Strategy).is_empty());
}
