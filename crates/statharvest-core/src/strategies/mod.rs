//! Strategies orchestrate one dataset end-to-end: resolve components,
//! iterate the parameter space, and fan batches out to sinks.

mod master_detail;
mod parameter_sweep;

use std::sync::Arc;

use serde::Serialize;

use crate::config::{DatasetConfig, TagSpec};
use crate::connectors::ConnectorSession;
use crate::datasources::DataSource;
use crate::domain::{Cell, Parameters, RecordBatch};
use crate::error::HarvestError;
use crate::parsers::Parser;
use crate::registry::ComponentRegistry;
use crate::sinks::{build_sink, Sink, SinkMode};
use crate::transformers::Transformer;

pub use master_detail::MasterDetailStrategy;
pub use parameter_sweep::ParameterSweepStrategy;

/// Lifecycle of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Idle,
    Resolving,
    Iterating,
    Fetching,
    Transforming,
    Sinking,
    Done,
    /// Finished, but at least one unit failed.
    PartialFailure,
}

/// A unit of work that failed and was skipped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IterationFailure {
    pub label: String,
    pub message: String,
}

/// Outcome of a run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: String,
    pub dataset: String,
    #[serde(skip)]
    pub batch: Option<RecordBatch>,
    pub attempted: usize,
    pub succeeded: usize,
    pub failures: Vec<IterationFailure>,
    pub state: RunState,
}

impl RunReport {
    fn new(run_id: &str, dataset: String) -> Self {
        Self {
            run_id: run_id.to_string(),
            dataset,
            batch: None,
            attempted: 0,
            succeeded: 0,
            failures: Vec::new(),
            state: RunState::Iterating,
        }
    }

    fn fail(&mut self, label: String, error: &HarvestError) {
        self.failures.push(IterationFailure {
            label,
            message: error.to_string(),
        });
    }

    pub fn is_partial(&self) -> bool {
        !self.failures.is_empty()
    }

    pub fn rows(&self) -> usize {
        self.batch.as_ref().map_or(0, RecordBatch::num_rows)
    }
}

/// Construction arguments handed to strategy factories.
#[derive(Debug, Clone)]
pub struct StrategyArgs {
    pub config: Arc<DatasetConfig>,
    pub registry: Arc<ComponentRegistry>,
}

/// Orchestration capability.
pub trait Strategy {
    fn name(&self) -> &str;

    fn state(&self) -> RunState;

    /// Runs the dataset. An empty `sinks` uses the configured sinks.
    ///
    /// Per-unit failures are recorded in the report; only resolution and
    /// configuration failures return `Err`.
    fn run(&mut self, sinks: &[SinkMode]) -> Result<RunReport, HarvestError>;
}

/// Cartesian product of `axes` in key order. No axes yield one empty point.
pub fn parameter_space(axes: &std::collections::BTreeMap<String, Vec<Cell>>) -> Vec<Parameters> {
    axes.iter().fold(vec![Parameters::new()], |points, (axis, values)| {
        points
            .iter()
            .flat_map(|point| {
                values.iter().map(move |value| {
                    let mut next = point.clone();
                    next.insert(axis.clone(), value.clone());
                    next
                })
            })
            .collect()
    })
}

/// `year=2023, position=qb` style label for logs and reports.
pub fn describe(parameters: &Parameters) -> String {
    if parameters.is_empty() {
        return String::from("(no parameters)");
    }
    parameters
        .iter()
        .map(|(name, value)| format!("{name}={value}"))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Applies configured tag columns.
pub fn tag(batch: RecordBatch, tags: &[TagSpec], parameters: &Parameters) -> RecordBatch {
    tags.iter().fold(batch, |batch, tag| match tag.value(parameters) {
        Some(value) => batch.with_constant_column(&tag.column, value),
        None => batch,
    })
}

/// Components resolved for one run. The connector session closes on drop.
pub(crate) struct Components {
    pub connector: ConnectorSession,
    pub parser: Box<dyn Parser>,
    pub datasource: Box<dyn DataSource>,
    pub transformer: Box<dyn Transformer>,
}

pub(crate) fn resolve_components(
    config: &DatasetConfig,
    registry: &ComponentRegistry,
) -> Result<Components, HarvestError> {
    let connector = registry.create_connector(&config.connector, &config.connector_args)?;
    let parser = registry.create_parser(&config.parser)?;
    let datasource = registry.create_datasource(&config.datasource)?;
    let transformer = registry.create_transformer(&config.transformer)?;

    if datasource.requires_target() && config.table_id.is_none() {
        return Err(HarvestError::config(format!(
            "{}: data source '{}' needs a table_id",
            config.qualified_name(),
            config.datasource
        )));
    }

    Ok(Components {
        connector: ConnectorSession::open(connector)?,
        parser,
        datasource,
        transformer,
    })
}

/// Sinks of one run. Each sink's first successful write replaces, later
/// writes append.
///
/// The memory sink is always written last and only once every other sink
/// took the batch, so the returned batch holds exactly the rows of the units
/// the report counts as succeeded.
pub(crate) struct SinkSet {
    sinks: Vec<(SinkMode, Box<dyn Sink>, bool)>,
}

impl SinkSet {
    pub fn new(modes: &[SinkMode], config: &DatasetConfig, run_id: &str) -> Self {
        let mut unique: Vec<SinkMode> = Vec::with_capacity(modes.len());
        for mode in modes {
            if !unique.contains(mode) {
                unique.push(*mode);
            }
        }
        unique.sort_by_key(|mode| *mode == SinkMode::Memory);
        Self {
            sinks: unique
                .into_iter()
                .map(|mode| (mode, build_sink(mode, config, run_id), false))
                .collect(),
        }
    }

    /// Offers `batch` to every sink; a failing sink does not stop the others.
    pub fn accept(&mut self, batch: &RecordBatch) -> Result<(), HarvestError> {
        let mut failures = Vec::new();
        for (mode, sink, written) in &mut self.sinks {
            if *mode == SinkMode::Memory && !failures.is_empty() {
                continue;
            }
            match sink.accept(batch, *written) {
                Ok(()) => *written = true,
                Err(error) => failures.push(format!("{mode} sink: {error}")),
            }
        }
        if failures.is_empty() {
            Ok(())
        } else {
            Err(HarvestError::Sink(failures.join("; ")))
        }
    }

    /// Finishes every sink; returns the memory sink's batch.
    pub fn finish(self) -> Result<Option<RecordBatch>, HarvestError> {
        let mut collected = None;
        for (mode, sink, _) in self.sinks {
            let batch = sink.finish()?;
            if mode == SinkMode::Memory {
                collected = batch;
            }
        }
        Ok(collected)
    }
}

pub fn register(registry: &mut ComponentRegistry) {
    for name in ["parameter_sweep", "year_by_year", "fantasypros", "nflfastr"] {
        registry.register_strategy(name, |args| Ok(Box::new(ParameterSweepStrategy::new(args))));
    }
    for name in ["master_detail", "game_by_game"] {
        registry.register_strategy(name, |args| Ok(Box::new(MasterDetailStrategy::new(args))));
    }
}
