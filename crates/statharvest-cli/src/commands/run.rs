use std::collections::BTreeMap;

use serde_json::Value;
use statharvest_core::{DataFacade, ParameterAxis, RunOverrides, SinkMode};
use tracing::info;

use crate::cli::RunArgs;
use crate::error::CliError;
use crate::output::render_batch;

pub fn run(args: &RunArgs, facade: &DataFacade) -> Result<(), CliError> {
    let overrides = overrides(args)?;
    let report = facade.run(&args.dataset, &overrides)?;

    if let Some(batch) = &report.batch {
        render_batch(batch, args.format)?;
    }
    info!(
        dataset = %report.dataset,
        run_id = %report.run_id,
        rows = report.rows(),
        failed = report.failures.len(),
        "run complete"
    );

    if report.is_partial() {
        return Err(CliError::PartialFailure {
            failed: report.failures.len(),
            attempted: report.attempted,
        });
    }
    Ok(())
}

fn overrides(args: &RunArgs) -> Result<RunOverrides, CliError> {
    let axes = args
        .axes
        .iter()
        .map(|raw| parse_axis(raw))
        .collect::<Result<BTreeMap<_, _>, _>>()?;
    let sinks = (!args.sinks.is_empty())
        .then(|| args.sinks.iter().copied().map(SinkMode::from).collect());

    Ok(RunOverrides {
        axes,
        sinks,
        output_dir: args.output_dir.clone(),
        max_details: args.max_details,
        iteration_delay_ms: args.delay_ms,
        ..RunOverrides::default()
    })
}

/// `year=2020..2023` is an inclusive range, `position=qb,rb` a value list.
fn parse_axis(raw: &str) -> Result<(String, ParameterAxis), CliError> {
    let (name, values) = raw
        .split_once('=')
        .filter(|(name, values)| !name.trim().is_empty() && !values.trim().is_empty())
        .ok_or_else(|| CliError::Usage(format!("axis '{raw}' must look like name=values")))?;

    if let Some((from, to)) = values.split_once("..") {
        let bound = |text: &str| {
            text.trim()
                .parse::<i64>()
                .map_err(|_| CliError::Usage(format!("axis '{raw}' has a non-integer bound")))
        };
        let (from, to) = (bound(from)?, bound(to)?);
        if from > to {
            return Err(CliError::Usage(format!("axis '{raw}' is an empty range")));
        }
        return Ok((name.trim().to_string(), ParameterAxis::Range { from, to }));
    }

    let values = values
        .split(',')
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(|value| match value.parse::<i64>() {
            Ok(number) => Value::from(number),
            Err(_) => Value::from(value),
        })
        .collect();
    Ok((name.trim().to_string(), ParameterAxis::Values(values)))
}
