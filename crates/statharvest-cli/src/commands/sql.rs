use serde::Serialize;
use serde_json::Value;
use statharvest_core::{QueryGuardrails, Warehouse};

use crate::cli::SqlArgs;
use crate::error::CliError;
use crate::output::render_json;

#[derive(Debug, Serialize)]
struct SqlColumn {
    name: String,
    #[serde(rename = "type")]
    r#type: String,
}

#[derive(Debug, Serialize)]
struct SqlResponse {
    columns: Vec<SqlColumn>,
    rows: Vec<Vec<Value>>,
    row_count: usize,
    truncated: bool,
}

pub fn run(args: &SqlArgs) -> Result<(), CliError> {
    let query = args.query.trim();
    if query.is_empty() {
        return Err(CliError::Usage(String::from("query must not be empty")));
    }

    let warehouse = Warehouse::open_default()?;
    let guardrails = QueryGuardrails {
        max_rows: args.max_rows,
        query_timeout_ms: args.query_timeout_ms,
    };
    let result = warehouse.execute_query(query, guardrails, args.write)?;
    if result.truncated {
        tracing::warn!(rows = result.row_count, "result truncated; raise --max-rows to see more");
    }

    render_json(&SqlResponse {
        columns: result
            .columns
            .into_iter()
            .map(|column| SqlColumn {
                name: column.name,
                r#type: column.r#type,
            })
            .collect(),
        rows: result.rows,
        row_count: result.row_count,
        truncated: result.truncated,
    })
}
