//! Relational-store connector backed by the local `DuckDB` warehouse.

use serde_json::Value;
use statharvest_warehouse::{
    ColumnSpec, PublishOptions, PublishReport, QueryGuardrails, QueryResult, SqlType, TableRef,
    Warehouse, WarehouseConfig,
};
use tracing::{debug, info};

use super::{Connector, ConnectorArgs, Fetched};
use crate::domain::{unique_column_names, Cell, Endpoint, RecordBatch};
use crate::error::HarvestError;
use crate::retry::RetryPolicy;

/// Reads from and publishes to the warehouse.
///
/// The warehouse is opened on first use and released on close. Reads take
/// the endpoint path as a read-only SQL statement.
pub struct SqlConnector {
    config: WarehouseConfig,
    warehouse: Option<Warehouse>,
    guardrails: QueryGuardrails,
    retry: RetryPolicy,
}

impl SqlConnector {
    pub fn new(args: &ConnectorArgs) -> Self {
        Self {
            config: args.warehouse.clone(),
            warehouse: None,
            guardrails: QueryGuardrails::default(),
            retry: args.retry.clone(),
        }
    }

    pub fn with_guardrails(mut self, guardrails: QueryGuardrails) -> Self {
        self.guardrails = guardrails;
        self
    }

    fn warehouse(&mut self) -> Result<&Warehouse, HarvestError> {
        if self.warehouse.is_none() {
            let config = &self.config;
            let warehouse = self.retry.run("open warehouse", || {
                Warehouse::open(config.clone()).map_err(HarvestError::from)
            })?;
            info!(db = %warehouse.db_path().display(), "warehouse opened");
            self.warehouse = Some(warehouse);
        }
        self.warehouse
            .as_ref()
            .ok_or_else(|| HarvestError::config("warehouse unavailable"))
    }

    /// Publishes `batch` with column types inferred from its values.
    pub fn publish(
        &mut self,
        batch: &RecordBatch,
        table: &TableRef,
        options: &PublishOptions,
    ) -> Result<PublishReport, HarvestError> {
        let columns = column_specs(batch);
        self.publish_with_columns(batch, &columns, table, options)
    }

    /// Publishes `batch` using explicit column types.
    ///
    /// Not retried: chunks already committed would be written twice.
    pub fn publish_with_columns(
        &mut self,
        batch: &RecordBatch,
        columns: &[ColumnSpec],
        table: &TableRef,
        options: &PublishOptions,
    ) -> Result<PublishReport, HarvestError> {
        let rows: Vec<Vec<Value>> = batch
            .rows()
            .iter()
            .map(|row| row.iter().map(Cell::to_json).collect())
            .collect();
        let report = self.warehouse()?.publish(table, columns, &rows, options)?;
        Ok(report)
    }
}

impl Connector for SqlConnector {
    fn name(&self) -> &str {
        "sql"
    }

    fn fetch(&mut self, endpoint: &Endpoint) -> Result<Fetched, HarvestError> {
        let sql = endpoint.path().to_string();
        let guardrails = self.guardrails;
        debug!(sql = %sql, "querying warehouse");
        let result = self.warehouse()?.execute_query(&sql, guardrails, false)?;
        Ok(Fetched::Table(query_result_to_batch(result)?))
    }

    fn close(&mut self) {
        if self.warehouse.take().is_some() {
            debug!("warehouse released");
        }
    }
}

/// Infers one column spec per batch column.
pub fn column_specs(batch: &RecordBatch) -> Vec<ColumnSpec> {
    batch
        .columns()
        .iter()
        .enumerate()
        .map(|(index, name)| {
            let values: Vec<Value> = batch.rows().iter().map(|row| row[index].to_json()).collect();
            ColumnSpec::new(name.clone(), SqlType::infer(values.iter()))
        })
        .collect()
}

fn query_result_to_batch(result: QueryResult) -> Result<RecordBatch, HarvestError> {
    let columns = unique_column_names(result.columns.into_iter().map(|column| column.name));
    let rows = result
        .rows
        .iter()
        .map(|row| row.iter().map(Cell::from_json).collect())
        .collect();
    RecordBatch::new(columns, rows)
}
