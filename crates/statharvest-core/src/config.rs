//! Declarative dataset configuration and its resolution into a validated
//! [`DatasetConfig`].

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use statharvest_warehouse::{IfExists, TableRef, WarehouseConfig};

use crate::connectors::{BrowserOptions, Compression, ConnectorArgs, WaitCondition};
use crate::datasources::{MetadataRule, DEFAULT_CROSS_REFERENCE_PATTERN};
use crate::domain::{Cell, EndpointTemplate};
use crate::error::HarvestError;
use crate::http_client::HttpClient;
use crate::retry::{RetryPolicy, RetrySettings};
use crate::sinks::SinkMode;

/// Schema used by the database sink when a dataset names none.
pub const DEFAULT_SINK_SCHEMA: &str = "raw";

/// Largest number of values a `{from, to}` axis may expand to.
pub const MAX_RANGE_VALUES: u64 = 1_000;

/// Top-level configuration document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigDocument {
    #[serde(default)]
    pub defaults: SourceDefaults,
    #[serde(default)]
    pub datasources: BTreeMap<String, SourceConfig>,
}

/// Settings applied to every source unless the source overrides them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceDefaults {
    pub timeout_ms: Option<u64>,
    pub retry: Option<RetrySettings>,
    pub iteration_delay_ms: Option<u64>,
    pub headers: BTreeMap<String, String>,
}

/// One upstream site and its datasets.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub base_url: String,
    pub connector: Option<String>,
    pub parser: Option<String>,
    /// Defaults to the source's own key.
    pub datasource: Option<String>,
    pub headers: BTreeMap<String, String>,
    pub timeout_ms: Option<u64>,
    pub retry: Option<RetrySettings>,
    pub iteration_delay_ms: Option<u64>,
    pub browser: Option<BrowserOptions>,
    pub compression: Option<Compression>,
    pub datasets: BTreeMap<String, DatasetEntry>,
}

/// A parameter axis: explicit values or an inclusive integer range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParameterAxis {
    Range { from: i64, to: i64 },
    Values(Vec<Value>),
}

impl ParameterAxis {
    pub fn values(&self) -> Vec<Cell> {
        match self {
            Self::Range { from, to } => (*from..=*to).map(Cell::Int).collect(),
            Self::Values(values) => values.iter().map(Cell::from_json).collect(),
        }
    }
}

/// Copies an axis value into a column: either the axis name alone or a
/// full `{axis, column, upper_case}` spec.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TagColumn {
    Axis(String),
    Spec {
        axis: String,
        #[serde(default)]
        column: Option<String>,
        #[serde(default)]
        upper_case: bool,
    },
}

/// A resolved tag column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagSpec {
    pub axis: String,
    pub column: String,
    pub upper_case: bool,
}

impl TagSpec {
    /// Value for this tag, upper-cased when requested.
    pub fn value(&self, parameters: &crate::domain::Parameters) -> Option<Cell> {
        let value = parameters.get(&self.axis)?;
        Some(match value {
            Cell::Text(text) if self.upper_case => Cell::text(text.to_uppercase()),
            other => other.clone(),
        })
    }
}

/// One dataset entry as written in the configuration document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasetEntry {
    pub strategy: String,
    pub transformer: Option<String>,
    pub connector: Option<String>,
    pub parser: Option<String>,
    pub datasource: Option<String>,
    pub endpoint_template: String,
    pub table_id: Option<String>,
    pub axes: BTreeMap<String, ParameterAxis>,
    pub tag_columns: Vec<TagColumn>,
    pub upper_case_columns: Vec<String>,
    pub sinks: Vec<SinkMode>,
    pub index_template: Option<String>,
    pub index_table_id: Option<String>,
    pub cross_reference_pattern: Option<String>,
    pub max_details: Option<usize>,
    pub detail_delay_ms: Option<u64>,
    pub iteration_delay_ms: Option<u64>,
    pub metadata: Vec<MetadataRule>,
    pub table: Option<String>,
    pub schema: Option<String>,
    pub if_exists: Option<IfExists>,
    pub chunk_rows: Option<usize>,
    pub wait_for: Option<WaitCondition>,
}

/// Call-time overrides applied on top of the document.
#[derive(Debug, Clone, Default)]
pub struct RunOverrides {
    /// Replaces the named axes; other axes keep their configured values.
    pub axes: BTreeMap<String, ParameterAxis>,
    pub sinks: Option<Vec<SinkMode>>,
    pub output_dir: Option<PathBuf>,
    pub max_details: Option<usize>,
    pub iteration_delay_ms: Option<u64>,
    pub detail_delay_ms: Option<u64>,
    pub warehouse_home: Option<PathBuf>,
    /// Transport injected into HTTP-based connectors.
    pub http_client: Option<Arc<dyn HttpClient>>,
}

/// Master/detail settings.
#[derive(Debug, Clone)]
pub struct DetailSettings {
    pub index_template: EndpointTemplate,
    pub index_table_id: String,
    pub cross_reference_pattern: Regex,
    pub max_details: Option<usize>,
    pub detail_delay: Duration,
}

/// Where the database sink writes.
#[derive(Debug, Clone)]
pub struct DatabaseTarget {
    pub table: TableRef,
    pub mode: IfExists,
    pub chunk_rows: Option<usize>,
}

/// Validated, immutable description of one dataset run.
#[derive(Debug, Clone)]
pub struct DatasetConfig {
    pub source: String,
    pub name: String,
    pub strategy: String,
    pub transformer: String,
    pub connector: String,
    pub parser: String,
    pub datasource: String,
    pub endpoint_template: EndpointTemplate,
    pub table_id: Option<String>,
    pub axes: BTreeMap<String, Vec<Cell>>,
    pub tag_columns: Vec<TagSpec>,
    pub sinks: Vec<SinkMode>,
    pub metadata: Vec<MetadataRule>,
    pub detail: Option<DetailSettings>,
    pub connector_args: ConnectorArgs,
    pub iteration_delay: Duration,
    pub output_dir: PathBuf,
    pub database: DatabaseTarget,
}

impl DatasetConfig {
    /// `source/dataset`.
    pub fn qualified_name(&self) -> String {
        format!("{}/{}", self.source, self.name)
    }
}

impl ConfigDocument {
    pub fn from_json(text: &str) -> Result<Self, HarvestError> {
        serde_json::from_str(text)
            .map_err(|error| HarvestError::config(format!("invalid configuration: {error}")))
    }

    pub fn load(path: &Path) -> Result<Self, HarvestError> {
        let text = std::fs::read_to_string(path).map_err(|error| {
            HarvestError::config(format!("cannot read {}: {error}", path.display()))
        })?;
        Self::from_json(&text)
    }

    /// Every `(source, dataset)` pair in document order.
    pub fn dataset_names(&self) -> Vec<(String, String)> {
        self.datasources
            .iter()
            .flat_map(|(source, config)| {
                config
                    .datasets
                    .keys()
                    .map(move |dataset| (source.clone(), dataset.clone()))
            })
            .collect()
    }

    /// Finds a dataset by bare name or `source/dataset`.
    pub fn find(&self, name: &str) -> Result<(&str, &SourceConfig, &str, &DatasetEntry), HarvestError> {
        if let Some((source, dataset)) = name.split_once('/') {
            let (source_key, source_config) = self
                .datasources
                .get_key_value(source)
                .ok_or_else(|| HarvestError::config(format!("unknown source '{source}'")))?;
            let (dataset_key, entry) = source_config
                .datasets
                .get_key_value(dataset)
                .ok_or_else(|| HarvestError::config(format!("unknown dataset '{name}'")))?;
            return Ok((source_key.as_str(), source_config, dataset_key.as_str(), entry));
        }

        let matches: Vec<_> = self
            .datasources
            .iter()
            .filter_map(|(source, config)| {
                config
                    .datasets
                    .get_key_value(name)
                    .map(|(dataset, entry)| (source.as_str(), config, dataset.as_str(), entry))
            })
            .collect();
        match matches.as_slice() {
            [] => Err(HarvestError::config(format!("unknown dataset '{name}'"))),
            [found] => Ok(*found),
            many => Err(HarvestError::config(format!(
                "dataset '{name}' is ambiguous; use one of: {}",
                many.iter()
                    .map(|(source, _, dataset, _)| format!("{source}/{dataset}"))
                    .collect::<Vec<_>>()
                    .join(", ")
            ))),
        }
    }

    /// Merges defaults, source and dataset settings with `overrides` and
    /// validates the result.
    pub fn resolve(&self, name: &str, overrides: &RunOverrides) -> Result<DatasetConfig, HarvestError> {
        let (source_name, source, dataset_name, entry) = self.find(name)?;
        let qualified = format!("{source_name}/{dataset_name}");

        if entry.strategy.trim().is_empty() {
            return Err(HarvestError::config(format!("{qualified}: strategy is required")));
        }
        if entry.endpoint_template.trim().is_empty() {
            return Err(HarvestError::config(format!(
                "{qualified}: endpoint_template is required"
            )));
        }

        let mut raw_axes = entry.axes.clone();
        raw_axes.extend(overrides.axes.clone());
        let mut axes = BTreeMap::new();
        for (axis, values) in &raw_axes {
            if let ParameterAxis::Range { from, to } = values {
                if from > to {
                    return Err(HarvestError::config(format!(
                        "{qualified}: axis '{axis}' range {from}..={to} is empty"
                    )));
                }
                if to.abs_diff(*from) >= MAX_RANGE_VALUES {
                    return Err(HarvestError::config(format!(
                        "{qualified}: axis '{axis}' range {from}..={to} exceeds \
                         {MAX_RANGE_VALUES} values"
                    )));
                }
            }
            let values = values.values();
            if values.is_empty() {
                return Err(HarvestError::config(format!(
                    "{qualified}: axis '{axis}' has no values"
                )));
            }
            axes.insert(axis.clone(), values);
        }
        let axis_names: BTreeSet<&str> = axes.keys().map(String::as_str).collect();

        let endpoint_template = EndpointTemplate::parse(entry.endpoint_template.clone())?;

        let detail = match &entry.index_template {
            Some(index_template) => {
                let index_template = EndpointTemplate::parse(index_template.clone())?;
                require_covered(&qualified, &index_template, &axis_names)?;
                let pattern_text = entry
                    .cross_reference_pattern
                    .as_deref()
                    .unwrap_or(DEFAULT_CROSS_REFERENCE_PATTERN);
                let cross_reference_pattern = Regex::new(pattern_text).map_err(|error| {
                    HarvestError::config(format!(
                        "{qualified}: invalid cross_reference_pattern: {error}"
                    ))
                })?;
                let mut detail_names = axis_names.clone();
                detail_names.extend(cross_reference_pattern.capture_names().flatten());
                require_covered(&qualified, &endpoint_template, &detail_names)?;

                let index_table_id = entry
                    .index_table_id
                    .clone()
                    .or_else(|| entry.table_id.clone())
                    .ok_or_else(|| {
                        HarvestError::config(format!("{qualified}: index_table_id is required"))
                    })?;
                Some(DetailSettings {
                    index_template,
                    index_table_id,
                    cross_reference_pattern,
                    max_details: overrides.max_details.or(entry.max_details),
                    detail_delay: Duration::from_millis(
                        overrides.detail_delay_ms.or(entry.detail_delay_ms).unwrap_or(0),
                    ),
                })
            }
            None => {
                require_covered(&qualified, &endpoint_template, &axis_names)?;
                None
            }
        };

        let tag_columns = entry
            .tag_columns
            .iter()
            .map(|tag| {
                let (axis, column, upper_case) = match tag {
                    TagColumn::Axis(axis) => (axis.clone(), axis.clone(), false),
                    TagColumn::Spec {
                        axis,
                        column,
                        upper_case,
                    } => (
                        axis.clone(),
                        column.clone().unwrap_or_else(|| axis.clone()),
                        *upper_case,
                    ),
                };
                let upper_case = upper_case || entry.upper_case_columns.contains(&column);
                if !axis_names.contains(axis.as_str()) {
                    return Err(HarvestError::config(format!(
                        "{qualified}: tag column '{column}' refers to unknown axis '{axis}'"
                    )));
                }
                Ok(TagSpec {
                    axis,
                    column: column.to_lowercase(),
                    upper_case,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let sinks = match &overrides.sinks {
            Some(sinks) => sinks.clone(),
            None if entry.sinks.is_empty() => vec![SinkMode::Memory],
            None => entry.sinks.clone(),
        };

        let retry_settings = source
            .retry
            .clone()
            .or_else(|| self.defaults.retry.clone())
            .unwrap_or_default();
        let mut headers = self.defaults.headers.clone();
        headers.extend(source.headers.clone());
        let mut browser = source.browser.clone().unwrap_or_default();
        if let Some(wait) = &entry.wait_for {
            browser.wait = wait.clone();
        }
        let warehouse = overrides
            .warehouse_home
            .as_ref()
            .map(WarehouseConfig::in_home)
            .unwrap_or_default();

        let connector_args = ConnectorArgs {
            base_url: source.base_url.clone(),
            headers,
            timeout: Duration::from_millis(
                source.timeout_ms.or(self.defaults.timeout_ms).unwrap_or(10_000),
            ),
            retry: RetryPolicy::from(&retry_settings),
            browser,
            compression: source.compression.unwrap_or_default(),
            chunk_rows: entry.chunk_rows,
            warehouse,
            http_client: overrides.http_client.clone(),
        };

        let table = TableRef::new(entry.table.clone().unwrap_or_else(|| dataset_name.to_string()))
            .with_schema(
                entry
                    .schema
                    .clone()
                    .unwrap_or_else(|| String::from(DEFAULT_SINK_SCHEMA)),
            );

        Ok(DatasetConfig {
            source: source_name.to_string(),
            name: dataset_name.to_string(),
            strategy: entry.strategy.clone(),
            transformer: entry
                .transformer
                .clone()
                .unwrap_or_else(|| String::from("identity")),
            connector: entry
                .connector
                .clone()
                .or_else(|| source.connector.clone())
                .unwrap_or_else(|| String::from("http")),
            parser: entry
                .parser
                .clone()
                .or_else(|| source.parser.clone())
                .unwrap_or_else(|| String::from("html")),
            datasource: entry
                .datasource
                .clone()
                .or_else(|| source.datasource.clone())
                .unwrap_or_else(|| source_name.to_string()),
            endpoint_template,
            table_id: entry.table_id.clone(),
            axes,
            tag_columns,
            sinks,
            metadata: entry.metadata.clone(),
            detail,
            connector_args,
            iteration_delay: Duration::from_millis(
                overrides
                    .iteration_delay_ms
                    .or(entry.iteration_delay_ms)
                    .or(source.iteration_delay_ms)
                    .or(self.defaults.iteration_delay_ms)
                    .unwrap_or(0),
            ),
            output_dir: overrides
                .output_dir
                .clone()
                .unwrap_or_else(|| PathBuf::from(".")),
            database: DatabaseTarget {
                table,
                mode: entry.if_exists.unwrap_or_default(),
                chunk_rows: entry.chunk_rows,
            },
        })
    }
}

fn require_covered(
    qualified: &str,
    template: &EndpointTemplate,
    names: &BTreeSet<&str>,
) -> Result<(), HarvestError> {
    let missing: Vec<String> = template
        .placeholders()
        .into_iter()
        .filter(|placeholder| !names.contains(placeholder.as_str()))
        .collect();
    if missing.is_empty() {
        return Ok(());
    }
    Err(HarvestError::config(format!(
        "{qualified}: template '{}' uses placeholders with no axis: {}",
        template.as_str(),
        missing.join(", ")
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOCUMENT: &str = r#"{
        "defaults": { "timeout_ms": 5000, "retry": { "max_retries": 1, "initial_delay_ms": 10 } },
        "datasources": {
            "profootballreference": {
                "base_url": "https://www.pro-football-reference.com",
                "datasets": {
                    "year_by_year": {
                        "strategy": "year_by_year",
                        "transformer": "pfr_year_by_year",
                        "endpoint_template": "years/{year}/fantasy.htm",
                        "table_id": "fantasy",
                        "axes": { "year": { "from": 2022, "to": 2023 } },
                        "tag_columns": ["year"]
                    },
                    "rankings": {
                        "strategy": "parameter_sweep",
                        "endpoint_template": "years/{year}/rankings.htm",
                        "axes": { "year": [2023] }
                    }
                }
            },
            "fantasypros": {
                "base_url": "https://www.fantasypros.com",
                "connector": "browser",
                "datasets": {
                    "rankings": {
                        "strategy": "fantasypros",
                        "endpoint_template": "nfl/rankings/{position}.php",
                        "table_id": "ranking-table",
                        "axes": { "position": ["qb", "rb"] },
                        "tag_columns": [{ "axis": "position", "column": "pos", "upper_case": true }],
                        "sinks": ["memory", "csv"]
                    }
                }
            }
        }
    }"#;

    fn document() -> ConfigDocument {
        ConfigDocument::from_json(DOCUMENT).expect("valid document")
    }

    #[test]
    fn test_resolve_merges_source_and_defaults() {
        let config = document()
            .resolve("year_by_year", &RunOverrides::default())
            .expect("resolve");
        assert_eq!(config.datasource, "profootballreference");
        assert_eq!(config.connector, "http");
        assert_eq!(config.parser, "html");
        assert_eq!(config.connector_args.timeout, Duration::from_secs(5));
        assert_eq!(config.connector_args.retry.max_retries, 1);
        assert_eq!(config.axes["year"], [Cell::Int(2022), Cell::Int(2023)]);
        assert_eq!(config.sinks, [SinkMode::Memory]);
        assert_eq!(config.database.table.to_string(), "raw.year_by_year");
    }

    #[test]
    fn test_ambiguous_names_need_a_source() {
        let error = document()
            .resolve("rankings", &RunOverrides::default())
            .expect_err("ambiguous");
        assert!(error.to_string().contains("fantasypros/rankings"));

        let config = document()
            .resolve("fantasypros/rankings", &RunOverrides::default())
            .expect("qualified");
        assert_eq!(config.connector, "browser");
        assert_eq!(
            config.tag_columns,
            [TagSpec {
                axis: String::from("position"),
                column: String::from("pos"),
                upper_case: true,
            }]
        );
    }

    #[test]
    fn test_overrides_replace_axes_and_sinks() {
        let overrides = RunOverrides {
            axes: BTreeMap::from([(String::from("year"), ParameterAxis::Values(vec![Value::from(2021)]))]),
            sinks: Some(vec![SinkMode::Csv]),
            ..RunOverrides::default()
        };
        let config = document().resolve("year_by_year", &overrides).expect("resolve");
        assert_eq!(config.axes["year"], [Cell::Int(2021)]);
        assert_eq!(config.sinks, [SinkMode::Csv]);
    }

    fn with_year_range(from: i64, to: i64) -> RunOverrides {
        RunOverrides {
            axes: BTreeMap::from([(String::from("year"), ParameterAxis::Range { from, to })]),
            ..RunOverrides::default()
        }
    }

    #[test]
    fn test_reversed_and_oversized_ranges_are_rejected() {
        let reversed = document().resolve("year_by_year", &with_year_range(2024, 2023));
        assert!(matches!(reversed, Err(HarvestError::Configuration(_))));

        let typo = document()
            .resolve("year_by_year", &with_year_range(2022, 20230))
            .expect_err("typo in the upper bound");
        assert!(matches!(typo, HarvestError::Configuration(_)));
        assert!(typo.to_string().contains("exceeds"));

        let wide = document()
            .resolve("year_by_year", &with_year_range(1, i64::try_from(MAX_RANGE_VALUES).unwrap()))
            .expect("a range at the limit is accepted");
        assert_eq!(wide.axes["year"].len() as u64, MAX_RANGE_VALUES);
        assert!(document()
            .resolve("year_by_year", &with_year_range(i64::MIN, i64::MAX))
            .is_err());
    }

    #[test]
    fn test_uncovered_placeholders_are_rejected() {
        let mut broken = document();
        if let Some(source) = broken.datasources.get_mut("profootballreference") {
            if let Some(dataset) = source.datasets.get_mut("year_by_year") {
                dataset.endpoint_template = String::from("years/{season}/fantasy.htm");
            }
        }
        let error = broken
            .resolve("year_by_year", &RunOverrides::default())
            .expect_err("season has no axis");
        assert!(error.to_string().contains("season"));
    }
}
