use std::sync::Arc;

use tracing::{debug, error, info, info_span, warn};
use uuid::Uuid;

use super::{
    describe, parameter_space, resolve_components, tag, Components, RunReport, RunState, SinkSet,
    Strategy, StrategyArgs,
};
use crate::config::{DatasetConfig, DetailSettings};
use crate::datasources::attach_constants;
use crate::domain::{Endpoint, Parameters, RecordBatch};
use crate::error::HarvestError;
use crate::registry::ComponentRegistry;
use crate::sinks::SinkMode;
use crate::throttling::Throttle;

/// Two-level crawl: an index page per outer point lists detail pages,
/// each detail page contributes one table.
///
/// A failed detail is logged and skipped; the remaining details of the
/// same outer point are still sunk together.
pub struct MasterDetailStrategy {
    config: Arc<DatasetConfig>,
    registry: Arc<ComponentRegistry>,
    state: RunState,
}

fn detail_settings(config: &DatasetConfig) -> Result<&DetailSettings, HarvestError> {
    config.detail.as_ref().ok_or_else(|| {
        HarvestError::config(format!(
            "{}: master_detail needs index_template and index_table_id",
            config.qualified_name()
        ))
    })
}

impl MasterDetailStrategy {
    pub fn new(args: StrategyArgs) -> Self {
        Self {
            config: args.config,
            registry: args.registry,
            state: RunState::Idle,
        }
    }

    fn references(
        &mut self,
        components: &mut Components,
        outer: &Parameters,
    ) -> Result<Vec<Parameters>, HarvestError> {
        let config = Arc::clone(&self.config);
        let detail = detail_settings(&config)?;
        self.state = RunState::Fetching;

        let index = Endpoint::new(
            config.connector_args.base_url.clone(),
            detail.index_template.render(outer)?,
        );
        components.datasource.load(
            &mut *components.connector,
            components.parser.as_mut(),
            &index,
        )?;
        let mut references = components.datasource.cross_references(
            components.parser.as_ref(),
            &detail.index_table_id,
            &detail.cross_reference_pattern,
        )?;
        if let Some(limit) = detail.max_details {
            references.truncate(limit);
        }
        debug!(index = %index, details = references.len(), "index loaded");
        Ok(references)
    }

    fn detail(
        &mut self,
        components: &mut Components,
        parameters: &Parameters,
        captures: &Parameters,
    ) -> Result<RecordBatch, HarvestError> {
        let config = Arc::clone(&self.config);
        let target = config.table_id.as_deref().ok_or_else(|| {
            HarvestError::config(format!("{}: detail pages need a table_id", config.qualified_name()))
        })?;
        self.state = RunState::Fetching;

        let endpoint = Endpoint::new(
            config.connector_args.base_url.clone(),
            config.endpoint_template.render(parameters)?,
        );
        let mut batch = components.datasource.assemble(
            &mut *components.connector,
            components.parser.as_mut(),
            &endpoint,
            target,
        )?;
        if !config.metadata.is_empty() {
            let values = components
                .datasource
                .page_metadata(components.parser.as_ref(), &config.metadata)?;
            batch = attach_constants(batch, &values);
        }
        let batch = attach_constants(batch, captures);
        let batch = tag(batch, &config.tag_columns, parameters);

        self.state = RunState::Transforming;
        components.transformer.transform(batch)
    }
}

impl Strategy for MasterDetailStrategy {
    fn name(&self) -> &str {
        "master_detail"
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
        let resolved = detail_settings(&config)
            .map(|detail| detail.detail_delay)
            .and_then(|delay| {
                resolve_components(&config, &self.registry).map(|components| (delay, components))
            });
        let (detail_delay, mut components) = match resolved {
            Ok(resolved) => resolved,
            Err(error) => {
                self.state = RunState::Idle;
                return Err(error);
            }
        };

        let modes = if sinks.is_empty() { &config.sinks[..] } else { sinks };
        let mut sink_set = SinkSet::new(modes, &config, &run_id);
        let points = parameter_space(&config.axes);
        let throttle = Throttle::per_interval(config.iteration_delay);
        let detail_throttle = Throttle::per_interval(detail_delay);
        info!(iterations = points.len(), "run started");

        let mut report = RunReport::new(&run_id, config.qualified_name());
        for outer in &points {
            self.state = RunState::Iterating;
            throttle.wait();
            let outer_label = describe(outer);
            let references = match self.references(&mut components, outer) {
                Ok(references) => references,
                Err(failure) => {
                    report.attempted += 1;
                    error!(iteration = %outer_label, error = %failure, "index failed");
                    report.fail(outer_label, &failure);
                    continue;
                }
            };
            if references.is_empty() {
                warn!(iteration = %outer_label, "index lists no detail pages");
                continue;
            }

            let mut batches = Vec::with_capacity(references.len());
            for captures in &references {
                detail_throttle.wait();
                report.attempted += 1;
                let mut parameters = outer.clone();
                parameters.extend(captures.iter().map(|(k, v)| (k.clone(), v.clone())));
                let label = describe(&parameters);
                match self.detail(&mut components, &parameters, captures) {
                    Ok(batch) => {
                        debug!(detail = %label, rows = batch.num_rows(), "detail complete");
                        batches.push(batch);
                    }
                    Err(failure) => {
                        error!(detail = %label, error = %failure, "detail failed");
                        report.fail(label, &failure);
                    }
                }
            }

            if batches.is_empty() {
                continue;
            }
            self.state = RunState::Sinking;
            let sunk = batches.len();
            let combined = RecordBatch::concat(batches);
            match sink_set.accept(&combined) {
                Ok(()) => report.succeeded += sunk,
                Err(failure) => {
                    error!(iteration = %outer_label, error = %failure, "sink failed");
                    report.fail(outer_label, &failure);
                }
            }
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

    const INDEX: &str = r#"<html><body><table id="fantasy"><tbody>
        <tr><td><a href="/players/A/AllenJo00.htm">Josh Allen</a></td></tr>
        <tr><td><a href="/players/H/HurtJa00.htm">Jalen Hurts</a></td></tr>
        <tr><td><a href="/players/A/AllenJo00.htm">Josh Allen</a></td></tr>
    </tbody></table></body></html>"#;

    const GAMELOG: &str = r#"<html><body><table id="stats">
        <thead><tr><th>Week</th><th>Yds</th></tr></thead>
        <tbody><tr><td>1</td><td>297</td></tr><tr><td>2</td><td>317</td></tr></tbody>
    </table></body></html>"#;

    fn config(client: FixtureHttpClient, max_details: Option<usize>) -> DatasetConfig {
        let document = ConfigDocument::from_json(&format!(
            r#"{{"datasources": {{"pfr": {{
                "base_url": "https://pfr.test",
                "datasource": "profootballreference",
                "datasets": {{"game_logs": {{
                    "strategy": "master_detail",
                    "index_template": "years/{{year}}/fantasy.htm",
                    "index_table_id": "fantasy",
                    "endpoint_template": "players/{{letter}}/{{player_id}}/gamelog/{{year}}/",
                    "cross_reference_pattern": "/players/(?P<letter>[A-Z])/(?P<player_id>[A-Za-z0-9]+)\\.htm",
                    "table_id": "stats",
                    "axes": {{"year": [2023]}},
                    "tag_columns": ["year"],
                    "max_details": {}
                }}}}
            }}}}}}"#,
            max_details.map_or(String::from("null"), |n| n.to_string())
        ))
        .expect("document");
        let overrides = RunOverrides {
            http_client: Some(Arc::new(client) as Arc<dyn HttpClient>),
            ..RunOverrides::default()
        };
        document.resolve("game_logs", &overrides).expect("resolved")
    }

    fn client() -> FixtureHttpClient {
        FixtureHttpClient::new()
            .with_response("https://pfr.test/years/2023/fantasy.htm", HttpResponse::ok(INDEX))
            .with_response(
                "https://pfr.test/players/A/AllenJo00/gamelog/2023/",
                HttpResponse::ok(GAMELOG),
            )
    }

    fn run(config: DatasetConfig) -> RunReport {
        MasterDetailStrategy::new(StrategyArgs {
            config: Arc::new(config),
            registry: ComponentRegistry::global(),
        })
        .run(&[])
        .expect("run")
    }

    #[test]
    fn test_details_are_tagged_and_deduplicated() {
        let report = run(config(client(), None));

        assert_eq!(report.attempted, 2);
        assert_eq!(report.succeeded, 1);
        assert_eq!(report.failures.len(), 1);
        assert!(report.failures[0].label.contains("player_id=HurtJa00"));

        let batch = report.batch.expect("batch");
        assert_eq!(batch.num_rows(), 2);
        assert_eq!(batch.get(0, "player_id"), Some(&Cell::text("AllenJo00")));
        assert_eq!(batch.get(1, "year"), Some(&Cell::Int(2023)));
    }

    #[test]
    fn test_max_details_caps_the_crawl() {
        let report = run(config(client(), Some(1)));
        assert_eq!(report.attempted, 1);
        assert_eq!(report.state, RunState::Done);
    }

    #[test]
    fn test_missing_index_counts_one_failure() {
        let report = run(config(FixtureHttpClient::new(), None));
        assert_eq!(report.attempted, 1);
        assert_eq!(report.succeeded, 0);
        assert_eq!(report.state, RunState::PartialFailure);
        assert!(report.batch.is_none() || report.rows() == 0);
    }
}
