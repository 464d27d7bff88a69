use std::sync::Arc;

use tracing::{debug, error, info, info_span};
use uuid::Uuid;

use super::{
    describe, parameter_space, resolve_components, tag, Components, RunReport, RunState, SinkSet,
    Strategy, StrategyArgs,
};
use crate::config::DatasetConfig;
use crate::datasources::attach_constants;
use crate::domain::{Endpoint, Parameters};
use crate::error::HarvestError;
use crate::registry::ComponentRegistry;
use crate::sinks::SinkMode;
use crate::throttling::Throttle;

/// Fetches one page or file per point of the parameter space.
///
/// Every chunk is tagged, transformed and handed to the sinks before the
/// next one is read, so chunked bulk files never sit in memory whole.
pub struct ParameterSweepStrategy {
    config: Arc<DatasetConfig>,
    registry: Arc<ComponentRegistry>,
    state: RunState,
}

impl ParameterSweepStrategy {
    pub fn new(args: StrategyArgs) -> Self {
        Self {
            config: args.config,
            registry: args.registry,
            state: RunState::Idle,
        }
    }

    fn iterate(
        &mut self,
        components: &mut Components,
        sinks: &mut SinkSet,
        parameters: &Parameters,
    ) -> Result<usize, HarvestError> {
        let config = Arc::clone(&self.config);
        self.state = RunState::Fetching;
        let path = config.endpoint_template.render(parameters)?;
        let endpoint = Endpoint::new(config.connector_args.base_url.clone(), path);
        let stream = components.datasource.assemble_batches(
            &mut *components.connector,
            components.parser.as_mut(),
            &endpoint,
            config.table_id.as_deref(),
        )?;

        let mut rows = 0;
        for chunk in stream {
            let mut batch = chunk?;
            if !config.metadata.is_empty() {
                let values = components
                    .datasource
                    .page_metadata(components.parser.as_ref(), &config.metadata)?;
                batch = attach_constants(batch, &values);
            }
            let batch = tag(batch, &config.tag_columns, parameters);

            self.state = RunState::Transforming;
            let batch = components.transformer.transform(batch)?;

            self.state = RunState::Sinking;
            sinks.accept(&batch)?;
            rows += batch.num_rows();
            self.state = RunState::Fetching;
        }
        Ok(rows)
    }
}

impl Strategy for ParameterSweepStrategy {
    fn name(&self) -> &str {
        "parameter_sweep"
    }

    fn state(&self) -> RunState {
        self.state
    }

    fn run(&mut self, sinks: &[SinkMode]) -> Result<RunReport, HarvestError> {
        let config = Arc::clone(&self.config);
        let run_id = Uuid::new_v4().to_string();
        let span = info_span!("run", dataset = %config.qualified_name(), run_id = %run_id);
        let _guard = span.enter();

        self.state = RunState::Resolving;
        let mut components = match resolve_components(&config, &self.registry) {
            Ok(components) => components,
            Err(error) => {
                self.state = RunState::Idle;
                return Err(error);
            }
        };

        let modes = if sinks.is_empty() { &config.sinks[..] } else { sinks };
        let mut sink_set = SinkSet::new(modes, &config, &run_id);
        let points = parameter_space(&config.axes);
        let throttle = Throttle::per_interval(config.iteration_delay);
        info!(iterations = points.len(), connector = %config.connector, "run started");

        let mut report = RunReport::new(&run_id, config.qualified_name());
        self.state = RunState::Iterating;
        for parameters in &points {
            throttle.wait();
            report.attempted += 1;
            let label = describe(parameters);
            match self.iterate(&mut components, &mut sink_set, parameters) {
                Ok(rows) => {
                    report.succeeded += 1;
                    debug!(iteration = %label, rows, "iteration complete");
                }
                Err(failure) => {
                    error!(iteration = %label, error = %failure, "iteration failed");
                    report.fail(label, &failure);
                }
            }
            self.state = RunState::Iterating;
        }

        drop(components);
        report.batch = sink_set.finish()?;
        self.state = if report.is_partial() {
            RunState::PartialFailure
        } else {
            RunState::Done
        };
        report.state = self.state;
        info!(
            attempted = report.attempted,
            succeeded = report.succeeded,
            rows = report.rows(),
            "run finished"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConfigDocument, RunOverrides};
    use crate::domain::Cell;
    use crate::http_client::{FixtureHttpClient, HttpClient, HttpResponse};

    const PAGE: &str = r#"<html><body><table id="stats">
        <thead><tr><th>Player</th><th>Yds</th></tr></thead>
        <tbody><tr><td>A</td><td>10</td></tr></tbody>
    </table></body></html>"#;

    fn config(client: FixtureHttpClient) -> DatasetConfig {
        let document = ConfigDocument::from_json(
            r#"{"datasources": {"site": {
                "base_url": "https://stats.test",
                "datasource": "html_table",
                "datasets": {"passing": {
                    "strategy": "parameter_sweep",
                    "endpoint_template": "years/{year}/passing.htm",
                    "table_id": "stats",
                    "axes": {"year": {"from": 2021, "to": 2023}},
                    "tag_columns": ["year"]
                }}
            }}}"#,
        )
        .expect("document");
        let overrides = RunOverrides {
            http_client: Some(Arc::new(client) as Arc<dyn HttpClient>),
            ..RunOverrides::default()
        };
        document.resolve("passing", &overrides).expect("resolved")
    }

    fn strategy(config: DatasetConfig) -> ParameterSweepStrategy {
        ParameterSweepStrategy::new(StrategyArgs {
            config: Arc::new(config),
            registry: ComponentRegistry::global(),
        })
    }

    #[test]
    fn test_failed_iteration_is_skipped() {
        let client = FixtureHttpClient::new()
            .with_response("https://stats.test/years/2021/passing.htm", HttpResponse::ok(PAGE))
            .with_response("https://stats.test/years/2023/passing.htm", HttpResponse::ok(PAGE));
        let mut run = strategy(config(client));

        let report = run.run(&[]).expect("run");

        assert_eq!(report.attempted, 3);
        assert_eq!(report.succeeded, 2);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].label, "year=2022");
        assert_eq!(report.state, RunState::PartialFailure);
        assert_eq!(run.state(), RunState::PartialFailure);

        let batch = report.batch.expect("memory batch");
        let years: Vec<&Cell> = batch.column_values("year").expect("year column");
        assert_eq!(years, [&Cell::Int(2021), &Cell::Int(2023)]);
    }

    #[test]
    fn test_clean_run_ends_done() {
        let mut client = FixtureHttpClient::new();
        for year in 2021..=2023 {
            client = client.with_response(
                format!("https://stats.test/years/{year}/passing.htm"),
                HttpResponse::ok(PAGE),
            );
        }
        let mut run = strategy(config(client));
        let report = run.run(&[]).expect("run");
        assert_eq!(report.state, RunState::Done);
        assert_eq!(report.rows(), 3);
    }

    #[test]
    fn test_missing_target_is_a_configuration_error() {
        let mut config = config(FixtureHttpClient::new());
        config.table_id = None;
        let mut run = strategy(config);
        let error = run.run(&[]).expect_err("needs a table");
        assert!(matches!(error, HarvestError::Configuration(_)));
        assert_eq!(run.state(), RunState::Idle);
    }
}
