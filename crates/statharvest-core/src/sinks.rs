//! Output destinations for transformed batches.

use std::fmt::{Display, Formatter};
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use statharvest_warehouse::{IfExists, PublishOptions, SqlType};
use time::format_description::well_known::Rfc3339;
use time::{Date, OffsetDateTime};
use tracing::{debug, info, warn};

use crate::config::{DatabaseTarget, DatasetConfig};
use crate::connectors::sql::column_specs;
use crate::connectors::{Connector, SqlConnector};
use crate::datasources::format_date;
use crate::domain::{Cell, RecordBatch};
use crate::error::HarvestError;

/// Column stamped on every row written to the database.
pub const INGESTED_AT_COLUMN: &str = "ingested_at";

/// Sink selector used in configuration and on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SinkMode {
    Memory,
    Csv,
    Database,
}

impl SinkMode {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::Csv => "csv",
            Self::Database => "database",
        }
    }
}

impl Display for SinkMode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SinkMode {
    type Err = HarvestError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "csv" => Ok(Self::Csv),
            "database" | "db" => Ok(Self::Database),
            other => Err(HarvestError::config(format!(
                "unknown sink '{other}', expected memory, csv or database"
            ))),
        }
    }
}

/// A destination for batches.
pub trait Sink {
    fn name(&self) -> &str;

    /// Writes `batch`. The first write of a run passes `append = false`.
    fn accept(&mut self, batch: &RecordBatch, append: bool) -> Result<(), HarvestError>;

    /// Flushes and releases the sink; the memory sink returns its contents.
    fn finish(self: Box<Self>) -> Result<Option<RecordBatch>, HarvestError>;
}

/// Builds the sink for `mode`.
pub fn build_sink(
    mode: SinkMode,
    config: &DatasetConfig,
    run_id: &str,
) -> Box<dyn Sink> {
    match mode {
        SinkMode::Memory => Box::new(MemorySink::default()),
        SinkMode::Csv => Box::new(CsvSink::new(&config.output_dir, &config.name)),
        SinkMode::Database => Box::new(DatabaseSink::new(
            SqlConnector::new(&config.connector_args),
            config.database.clone(),
            run_id,
        )),
    }
}

/// Accumulates batches and concatenates them on finish.
#[derive(Debug, Default)]
pub struct MemorySink {
    batches: Vec<RecordBatch>,
}

impl Sink for MemorySink {
    fn name(&self) -> &str {
        "memory"
    }

    fn accept(&mut self, batch: &RecordBatch, append: bool) -> Result<(), HarvestError> {
        if !append {
            self.batches.clear();
        }
        self.batches.push(batch.clone());
        Ok(())
    }

    fn finish(self: Box<Self>) -> Result<Option<RecordBatch>, HarvestError> {
        if self.batches.is_empty() {
            return Ok(None);
        }
        Ok(Some(RecordBatch::concat(self.batches)))
    }
}

/// Writes `{dataset}_{YYYY-MM-DD}.csv` in an output directory.
///
/// The header is written only when the file is created or truncated.
/// Appended batches are aligned to the header already on disk.
#[derive(Debug, Clone)]
pub struct CsvSink {
    path: PathBuf,
}

impl CsvSink {
    pub fn new(output_dir: &Path, dataset: &str) -> Self {
        Self::for_date(output_dir, dataset, OffsetDateTime::now_utc().date())
    }

    pub fn for_date(output_dir: &Path, dataset: &str, date: Date) -> Self {
        let stamp = format_date(date).unwrap_or_else(|_| date.to_string());
        Self {
            path: output_dir.join(format!("{dataset}_{stamp}.csv")),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn existing_header(&self) -> Result<Option<Vec<String>>, HarvestError> {
        let has_content = fs::metadata(&self.path)
            .map(|metadata| metadata.len() > 0)
            .unwrap_or(false);
        if !has_content {
            return Ok(None);
        }
        let mut reader = csv::ReaderBuilder::new().from_path(&self.path)?;
        Ok(Some(reader.headers()?.iter().map(str::to_string).collect()))
    }
}

impl Sink for CsvSink {
    fn name(&self) -> &str {
        "csv"
    }

    fn accept(&mut self, batch: &RecordBatch, append: bool) -> Result<(), HarvestError> {
        if batch.num_columns() == 0 {
            return Ok(());
        }
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let header = if append { self.existing_header()? } else { None };
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .append(append)
            .truncate(!append)
            .open(&self.path)?;
        let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(file);

        let aligned = match &header {
            Some(header) => {
                if header.as_slice() != batch.columns() {
                    warn!(
                        path = %self.path.display(),
                        "batch columns differ from the file header; aligning to the header"
                    );
                }
                let order: Vec<&str> = header.iter().map(String::as_str).collect();
                batch.reindex(&order, &Cell::Null)?
            }
            None => {
                writer.write_record(batch.columns())?;
                batch.clone()
            }
        };
        for row in aligned.rows() {
            writer.write_record(row.iter().map(Cell::to_string))?;
        }
        writer.flush()?;
        debug!(path = %self.path.display(), rows = aligned.num_rows(), append, "csv written");
        Ok(())
    }

    fn finish(self: Box<Self>) -> Result<Option<RecordBatch>, HarvestError> {
        info!(path = %self.path.display(), "csv output complete");
        Ok(None)
    }
}

/// Publishes batches into the warehouse, stamping `ingested_at`.
pub struct DatabaseSink {
    connector: SqlConnector,
    target: DatabaseTarget,
    run_id: String,
}

impl DatabaseSink {
    pub fn new(connector: SqlConnector, target: DatabaseTarget, run_id: &str) -> Self {
        Self {
            connector,
            target,
            run_id: run_id.to_string(),
        }
    }
}

impl Sink for DatabaseSink {
    fn name(&self) -> &str {
        "database"
    }

    fn accept(&mut self, batch: &RecordBatch, append: bool) -> Result<(), HarvestError> {
        let ingested_at = OffsetDateTime::now_utc()
            .replace_nanosecond(0)
            .unwrap_or_else(|_| OffsetDateTime::now_utc())
            .format(&Rfc3339)
            .map_err(|error| HarvestError::Sink(format!("cannot format timestamp: {error}")))?;
        let stamped = batch
            .clone()
            .with_constant_column(INGESTED_AT_COLUMN, Cell::text(ingested_at));

        let mut columns = column_specs(&stamped);
        if let Some(column) = columns
            .iter_mut()
            .find(|column| column.name == INGESTED_AT_COLUMN)
        {
            column.sql_type = SqlType::Timestamp;
        }

        let options = PublishOptions {
            mode: if append { IfExists::Append } else { self.target.mode },
            chunk_rows: self.target.chunk_rows,
            run_id: Some(self.run_id.clone()),
        };
        let report = self
            .connector
            .publish_with_columns(&stamped, &columns, &self.target.table, &options)?;
        info!(
            table = %report.table,
            mode = report.mode.as_str(),
            rows = report.rows_written,
            chunks = report.chunks,
            "batch published"
        );
        Ok(())
    }

    fn finish(mut self: Box<Self>) -> Result<Option<RecordBatch>, HarvestError> {
        self.connector.close();
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows(n: i64) -> RecordBatch {
        RecordBatch::new(
            vec!["player".into(), "yds".into()],
            (0..n).map(|i| vec![Cell::text(format!("p{i}")), Cell::Int(i)]).collect(),
        )
        .expect("batch")
    }

    #[test]
    fn memory_sink_concatenates_in_order() {
        let mut sink = Box::new(MemorySink::default());
        sink.accept(&rows(2), false).expect("first");
        sink.accept(&rows(1), true).expect("second");
        let batch = sink.finish().expect("finish").expect("batch");
        assert_eq!(batch.num_rows(), 3);
        assert_eq!(batch.get(2, "player"), Some(&Cell::text("p0")));
    }

    #[test]
    fn empty_memory_sink_yields_nothing() {
        let sink = Box::new(MemorySink::default());
        assert!(sink.finish().expect("finish").is_none());
    }

    #[test]
    fn sink_mode_parses_names() {
        assert_eq!("CSV".parse::<SinkMode>().expect("csv"), SinkMode::Csv);
        assert!("parquet".parse::<SinkMode>().is_err());
    }
}
