//! # Statharvest Warehouse
//!
//! DuckDB-backed storage for harvested record batches.
//!
//! The warehouse owns a small connection pool, applies its own migrations on
//! open, runs guarded ad-hoc queries and publishes tabular data into
//! schema-qualified tables with `fail`, `replace` or `append` semantics.
//!
//! ```rust,no_run
//! use serde_json::json;
//! use statharvest_warehouse::{
//!     ColumnSpec, IfExists, PublishOptions, SqlType, TableRef, Warehouse,
//! };
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let warehouse = Warehouse::open_default()?;
//!     let columns = vec![
//!         ColumnSpec::new("player_name", SqlType::Varchar),
//!         ColumnSpec::new("passing_yds", SqlType::BigInt),
//!     ];
//!     let rows = vec![vec![json!("Patrick Mahomes"), json!(5250)]];
//!     let report = warehouse.publish(
//!         &TableRef::new("year_by_year").with_schema("raw"),
//!         &columns,
//!         &rows,
//!         &PublishOptions { mode: IfExists::Append, ..PublishOptions::default() },
//!     )?;
//!     println!("wrote {} rows", report.rows_written);
//!     Ok(())
//! }
//! ```
//!
//! ## Tables
//!
//! | Table | Description |
//! |-------|-------------|
//! | `schema_migrations` | Applied migration versions |
//! | `harvest_log` | One row per publish call |

pub mod duckdb;
pub mod migrations;
pub mod publish;

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use ::duckdb::types::Value as DuckValue;
use ::duckdb::{params_from_iter, Connection, ToSql};
use serde::Serialize;
use serde_json::{Number, Value};
use thiserror::Error;
use tracing::{debug, info};

pub use duckdb::{DuckDbConnectionManager, PooledConnection};
pub use publish::{
    ColumnSpec, IfExists, PublishOptions, PublishReport, SqlType, TableRef, DEFAULT_SCHEMA,
};

use publish::{quote_identifier, validate_column_name};

/// Environment variable overriding the warehouse home directory.
pub const HOME_ENV_VAR: &str = "STATHARVEST_HOME";

/// Errors that can occur during warehouse operations.
#[derive(Debug, Error)]
pub enum WarehouseError {
    /// `DuckDB` database error.
    #[error(transparent)]
    DuckDb(#[from] ::duckdb::Error),

    /// I/O error (file system operations).
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Query was rejected due to policy violation.
    #[error("query rejected: {0}")]
    QueryRejected(String),

    /// Query execution timed out.
    #[error("query timed out after {timeout_ms}ms")]
    QueryTimeout { timeout_ms: u64 },

    /// Publish with [`IfExists::Fail`] found an existing table.
    #[error("table {table} already exists")]
    TableExists { table: String },

    #[error("invalid identifier '{0}'")]
    InvalidIdentifier(String),

    #[error("connection pool lock poisoned")]
    PoolPoisoned,
}

/// Configuration for the warehouse database.
#[derive(Debug, Clone)]
pub struct WarehouseConfig {
    /// Root directory for statharvest data.
    pub home: PathBuf,
    /// Path to the `DuckDB` database file.
    pub db_path: PathBuf,
    /// Maximum number of idle connections kept in the pool.
    pub max_pool_size: usize,
}

impl Default for WarehouseConfig {
    fn default() -> Self {
        Self::in_home(resolve_statharvest_home())
    }
}

impl WarehouseConfig {
    /// Configuration rooted at `home`, with the database at `home/warehouse.duckdb`.
    pub fn in_home(home: impl Into<PathBuf>) -> Self {
        let home = home.into();
        let db_path = home.join("warehouse.duckdb");
        Self {
            home,
            db_path,
            max_pool_size: 4,
        }
    }
}

/// Guardrails for query execution to prevent resource exhaustion.
#[derive(Debug, Clone, Copy)]
pub struct QueryGuardrails {
    /// Maximum number of rows to return.
    pub max_rows: usize,
    /// Query timeout in milliseconds.
    pub query_timeout_ms: u64,
}

impl Default for QueryGuardrails {
    fn default() -> Self {
        Self {
            max_rows: 10_000,
            query_timeout_ms: 5_000,
        }
    }
}

impl QueryGuardrails {
    fn timeout(self) -> Duration {
        Duration::from_millis(self.query_timeout_ms.max(1))
    }

    fn validate(self) -> Result<(), WarehouseError> {
        if self.max_rows == 0 {
            return Err(WarehouseError::QueryRejected(String::from(
                "max_rows must be greater than zero",
            )));
        }
        if self.query_timeout_ms == 0 {
            return Err(WarehouseError::QueryRejected(String::from(
                "query_timeout_ms must be greater than zero",
            )));
        }
        Ok(())
    }
}

/// Column metadata for query results.
#[derive(Debug, Clone, Serialize)]
pub struct SqlColumn {
    /// Column name.
    pub name: String,
    /// Column data type.
    #[serde(rename = "type")]
    pub r#type: String,
}

/// Result of a SQL query execution.
#[derive(Debug, Clone, Serialize)]
pub struct QueryResult {
    /// Column definitions.
    pub columns: Vec<SqlColumn>,
    /// Row data as JSON values.
    pub rows: Vec<Vec<Value>>,
    /// Number of rows returned.
    pub row_count: usize,
    /// Whether results were truncated due to max_rows limit.
    pub truncated: bool,
}

/// The warehouse handle. Cheap to clone; clones share the pool.
#[derive(Clone)]
pub struct Warehouse {
    config: WarehouseConfig,
    manager: DuckDbConnectionManager,
}

impl Warehouse {
    /// Open a warehouse with default configuration.
    pub fn open_default() -> Result<Self, WarehouseError> {
        Self::open(WarehouseConfig::default())
    }

    /// Open a warehouse with the specified configuration.
    pub fn open(config: WarehouseConfig) -> Result<Self, WarehouseError> {
        if let Some(parent) = config.db_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let manager = DuckDbConnectionManager::new(config.db_path.clone(), config.max_pool_size);
        let warehouse = Self { config, manager };
        warehouse.initialize()?;
        Ok(warehouse)
    }

    /// Apply pending migrations.
    pub fn initialize(&self) -> Result<(), WarehouseError> {
        let connection = self.manager.acquire()?;
        migrations::apply_migrations(&connection)?;
        Ok(())
    }

    /// Get the path to the database file.
    pub fn db_path(&self) -> &Path {
        self.manager.db_path()
    }

    pub fn home(&self) -> &Path {
        self.config.home.as_path()
    }

    /// Execute a SQL query with guardrails.
    ///
    /// Only SELECT-like single statements are accepted unless `allow_write`
    /// is true.
    pub fn execute_query(
        &self,
        sql: &str,
        guardrails: QueryGuardrails,
        allow_write: bool,
    ) -> Result<QueryResult, WarehouseError> {
        guardrails.validate()?;
        let sql = normalize_sql(sql)?;

        if !allow_write {
            enforce_read_only_query(sql)?;
        }

        let connection = self.manager.acquire()?;
        execute_with_guardrails(&connection, sql, guardrails, allow_write)
    }

    /// Whether `table` exists.
    pub fn table_exists(&self, table: &TableRef) -> Result<bool, WarehouseError> {
        let connection = self.manager.acquire()?;
        table_exists(&connection, table)
    }

    /// Publish rows into `table`.
    ///
    /// Each chunk of `options.chunk_rows` rows is written in its own
    /// transaction, so a failure rolls back only the chunk in flight. Rows
    /// must have exactly one value per column.
    ///
    /// # Security
    /// Table and schema names are validated identifiers and column names are
    /// quoted; all values are bound as parameters.
    pub fn publish(
        &self,
        table: &TableRef,
        columns: &[ColumnSpec],
        rows: &[Vec<Value>],
        options: &PublishOptions,
    ) -> Result<PublishReport, WarehouseError> {
        let qualified = table.qualified()?;
        for column in columns {
            validate_column_name(&column.name)?;
        }
        if columns.is_empty() {
            return Err(WarehouseError::QueryRejected(format!(
                "cannot publish {table} without columns"
            )));
        }
        if let Some(index) = rows.iter().position(|row| row.len() != columns.len()) {
            return Err(WarehouseError::QueryRejected(format!(
                "row {index} has {} values but {} columns were declared",
                rows[index].len(),
                columns.len()
            )));
        }

        let connection = self.manager.acquire()?;
        connection.execute_batch(&format!(
            "CREATE SCHEMA IF NOT EXISTS {}",
            quote_identifier(table.schema())
        ))?;

        let exists = table_exists(&connection, table)?;
        let columns = match options.mode {
            IfExists::Fail if exists => {
                return Err(WarehouseError::TableExists {
                    table: table.to_string(),
                });
            }
            IfExists::Replace => {
                connection.execute_batch(&format!("DROP TABLE IF EXISTS {qualified}"))?;
                create_table(&connection, &qualified, columns)?;
                columns.to_vec()
            }
            IfExists::Append if exists => reconcile_columns(&connection, table, columns, rows)?,
            IfExists::Fail | IfExists::Append => {
                create_table(&connection, &qualified, columns)?;
                columns.to_vec()
            }
        };

        let insert = insert_statement(&qualified, &columns);
        let chunk_rows = options.chunk_rows.unwrap_or(rows.len()).max(1);
        let mut chunks = 0;
        for chunk in rows.chunks(chunk_rows) {
            connection.execute_batch("BEGIN TRANSACTION")?;
            let result = (|| -> Result<(), WarehouseError> {
                let mut statement = connection.prepare(&insert)?;
                for row in chunk {
                    let values: Vec<DuckValue> = row
                        .iter()
                        .zip(&columns)
                        .map(|(value, column)| column.sql_type.bind(value))
                        .collect();
                    statement.execute(params_from_iter(values.iter()))?;
                }
                Ok(())
            })();
            finalize_transaction(&connection, result)?;
            chunks += 1;
            debug!(table = %table, chunk = chunks, rows = chunk.len(), "published chunk");
        }

        let mode = options.mode.as_str();
        let row_count = i64::try_from(rows.len()).unwrap_or(i64::MAX);
        let chunk_count = i64::try_from(chunks).unwrap_or(i64::MAX);
        let table_name = table.to_string();
        let params: [&dyn ToSql; 5] = [
            &options.run_id,
            &table_name,
            &mode,
            &row_count,
            &chunk_count,
        ];
        connection.execute(
            "INSERT INTO harvest_log (run_id, table_name, mode, row_count, chunk_count, published_at) \
             VALUES (?, ?, ?, ?, ?, CURRENT_TIMESTAMP)",
            params.as_slice(),
        )?;

        info!(table = %table, mode, rows = rows.len(), chunks, "publish complete");
        Ok(PublishReport {
            table: table_name,
            mode: options.mode,
            rows_written: rows.len(),
            chunks,
        })
    }
}

fn table_exists(connection: &Connection, table: &TableRef) -> Result<bool, WarehouseError> {
    let count: i64 = connection.query_row(
        "SELECT COUNT(*) FROM information_schema.tables WHERE table_schema = ? AND table_name = ?",
        [table.schema(), table.name()],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

fn create_table(
    connection: &Connection,
    qualified: &str,
    columns: &[ColumnSpec],
) -> Result<(), WarehouseError> {
    let definitions = columns
        .iter()
        .map(|column| {
            format!(
                "{} {}",
                quote_identifier(&column.name),
                column.sql_type.as_sql()
            )
        })
        .collect::<Vec<_>>()
        .join(", ");
    connection.execute_batch(&format!(
        "CREATE TABLE IF NOT EXISTS {qualified} ({definitions})"
    ))?;
    Ok(())
}

/// Brings an existing table in line with an appended batch.
///
/// Columns the table has not seen yet are added. A column whose stored type
/// cannot hold the incoming values is widened in place (`BIGINT` to `DOUBLE`
/// to `VARCHAR`); incoming columns that are entirely null keep the stored
/// type. Returns the column specs the rows must be bound with.
fn reconcile_columns(
    connection: &Connection,
    table: &TableRef,
    columns: &[ColumnSpec],
    rows: &[Vec<Value>],
) -> Result<Vec<ColumnSpec>, WarehouseError> {
    let mut statement = connection.prepare(
        "SELECT column_name, data_type FROM information_schema.columns \
         WHERE table_schema = ? AND table_name = ?",
    )?;
    let existing = statement
        .query_map([table.schema(), table.name()], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let qualified = table.qualified()?;
    let mut reconciled = Vec::with_capacity(columns.len());
    for (index, column) in columns.iter().enumerate() {
        let stored = existing
            .iter()
            .find(|(name, _)| name == &column.name)
            .map(|(_, data_type)| SqlType::from_duckdb(data_type));
        let sql_type = match stored {
            None => {
                connection.execute_batch(&format!(
                    "ALTER TABLE {qualified} ADD COLUMN {} {}",
                    quote_identifier(&column.name),
                    column.sql_type.as_sql()
                ))?;
                column.sql_type
            }
            // Unrecognized storage type: let DuckDB cast on insert.
            Some(None) => column.sql_type,
            Some(Some(current)) if rows.iter().all(|row| row[index].is_null()) => current,
            Some(Some(current)) => {
                let widened = current.widen(column.sql_type);
                if widened != current {
                    info!(
                        table = %table,
                        column = %column.name,
                        from = current.as_sql(),
                        to = widened.as_sql(),
                        "widening column type"
                    );
                    connection.execute_batch(&format!(
                        "ALTER TABLE {qualified} ALTER COLUMN {} TYPE {}",
                        quote_identifier(&column.name),
                        widened.as_sql()
                    ))?;
                }
                widened
            }
        };
        reconciled.push(ColumnSpec::new(column.name.clone(), sql_type));
    }
    Ok(reconciled)
}

fn insert_statement(qualified: &str, columns: &[ColumnSpec]) -> String {
    let names = columns
        .iter()
        .map(|column| quote_identifier(&column.name))
        .collect::<Vec<_>>()
        .join(", ");
    let placeholders = columns
        .iter()
        .map(|column| column.sql_type.placeholder())
        .collect::<Vec<_>>()
        .join(", ");
    format!("INSERT INTO {qualified} ({names}) VALUES ({placeholders})")
}

/// Finalize a transaction, committing on success or rolling back on failure.
fn finalize_transaction<T>(
    connection: &Connection,
    result: Result<T, WarehouseError>,
) -> Result<T, WarehouseError> {
    match result {
        Ok(value) => {
            connection.execute_batch("COMMIT")?;
            Ok(value)
        }
        Err(error) => {
            let _ = connection.execute_batch("ROLLBACK");
            Err(error)
        }
    }
}

fn execute_with_guardrails(
    connection: &Connection,
    sql: &str,
    guardrails: QueryGuardrails,
    allow_write: bool,
) -> Result<QueryResult, WarehouseError> {
    let started = Instant::now();
    if is_select_like(sql) {
        execute_select_query(connection, sql, guardrails, started)
    } else if allow_write {
        connection.execute_batch(sql)?;
        ensure_timeout(started, guardrails.timeout())?;
        Ok(QueryResult {
            columns: Vec::new(),
            rows: Vec::new(),
            row_count: 0,
            truncated: false,
        })
    } else {
        Err(WarehouseError::QueryRejected(String::from(
            "only SELECT/CTE queries are allowed unless writes are enabled",
        )))
    }
}

fn execute_select_query(
    connection: &Connection,
    sql: &str,
    guardrails: QueryGuardrails,
    started: Instant,
) -> Result<QueryResult, WarehouseError> {
    let mut statement = connection.prepare(sql)?;
    // Column metadata is only populated once the statement has run.
    let _ = statement.query([] as [&dyn ToSql; 0])?;

    let column_count = statement.column_count();
    let mut columns = Vec::with_capacity(column_count);
    for index in 0..column_count {
        let name = statement.column_name(index)?.to_string();
        let dtype = statement.column_type(index);
        columns.push(SqlColumn {
            name,
            r#type: dtype.to_string(),
        });
    }

    let mut rows_cursor = statement.query([] as [&dyn ToSql; 0])?;
    let mut rows = Vec::new();
    let mut truncated = false;

    while let Some(row) = rows_cursor.next()? {
        ensure_timeout(started, guardrails.timeout())?;

        if rows.len() >= guardrails.max_rows {
            truncated = true;
            break;
        }

        rows.push(read_row(row, column_count)?);
    }

    ensure_timeout(started, guardrails.timeout())?;

    Ok(QueryResult {
        columns,
        row_count: rows.len(),
        rows,
        truncated,
    })
}

fn read_row(row: &::duckdb::Row<'_>, column_count: usize) -> Result<Vec<Value>, ::duckdb::Error> {
    let mut output = Vec::with_capacity(column_count);
    for index in 0..column_count {
        let value: DuckValue = row.get(index)?;
        output.push(to_json_value(value));
    }
    Ok(output)
}

fn to_json_value(value: DuckValue) -> Value {
    match value {
        DuckValue::Null => Value::Null,
        DuckValue::Boolean(value) => Value::Bool(value),
        DuckValue::TinyInt(value) => Value::Number(Number::from(value)),
        DuckValue::SmallInt(value) => Value::Number(Number::from(value)),
        DuckValue::Int(value) => Value::Number(Number::from(value)),
        DuckValue::BigInt(value) => Value::Number(Number::from(value)),
        DuckValue::UTinyInt(value) => Value::Number(Number::from(value)),
        DuckValue::USmallInt(value) => Value::Number(Number::from(value)),
        DuckValue::UInt(value) => Value::Number(Number::from(value)),
        DuckValue::UBigInt(value) => Value::Number(Number::from(value)),
        DuckValue::Float(value) => number_from_f64(f64::from(value)),
        DuckValue::Double(value) => number_from_f64(value),
        DuckValue::Text(value) => Value::String(value),
        DuckValue::Blob(value) => Value::String(hex::encode(value)),
        other => Value::String(format!("{other:?}")),
    }
}

/// NaN and infinities have no JSON form and map to null.
fn number_from_f64(value: f64) -> Value {
    Number::from_f64(value)
        .map(Value::Number)
        .unwrap_or(Value::Null)
}

fn normalize_sql(sql: &str) -> Result<&str, WarehouseError> {
    let normalized = sql.trim();
    if normalized.is_empty() {
        return Err(WarehouseError::QueryRejected(String::from(
            "query must not be empty",
        )));
    }
    Ok(normalized.trim_end_matches(';').trim())
}

fn enforce_read_only_query(sql: &str) -> Result<(), WarehouseError> {
    if !is_select_like(sql) {
        return Err(WarehouseError::QueryRejected(String::from(
            "read-only mode accepts only SELECT/CTE queries",
        )));
    }
    if has_multiple_statements(sql) {
        return Err(WarehouseError::QueryRejected(String::from(
            "multiple SQL statements are not allowed in read-only mode",
        )));
    }
    Ok(())
}

fn is_select_like(sql: &str) -> bool {
    let first_keyword = sql
        .split_whitespace()
        .next()
        .unwrap_or_default()
        .to_ascii_uppercase();
    matches!(
        first_keyword.as_str(),
        "SELECT" | "WITH" | "EXPLAIN" | "SHOW" | "DESCRIBE"
    )
}

fn has_multiple_statements(sql: &str) -> bool {
    sql.split(';')
        .filter(|part| !part.trim().is_empty())
        .count()
        > 1
}

fn ensure_timeout(started: Instant, timeout: Duration) -> Result<(), WarehouseError> {
    if started.elapsed() > timeout {
        return Err(WarehouseError::QueryTimeout {
            timeout_ms: timeout.as_millis().min(u128::from(u64::MAX)) as u64,
        });
    }
    Ok(())
}

/// `$STATHARVEST_HOME`, else `$HOME/.statharvest`, else `./.statharvest`.
pub fn resolve_statharvest_home() -> PathBuf {
    if let Some(path) = env::var_os(HOME_ENV_VAR) {
        let path = PathBuf::from(path);
        if !path.as_os_str().is_empty() {
            return path;
        }
    }

    if let Some(home) = env::var_os("HOME") {
        return PathBuf::from(home).join(".statharvest");
    }

    PathBuf::from(".statharvest")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    fn open_temp(temp: &tempfile::TempDir) -> Warehouse {
        Warehouse::open(WarehouseConfig {
            home: temp.path().to_path_buf(),
            db_path: temp.path().join("warehouse.duckdb"),
            max_pool_size: 2,
        })
        .expect("warehouse open")
    }

    fn sample_columns() -> Vec<ColumnSpec> {
        vec![
            ColumnSpec::new("player_name", SqlType::Varchar),
            ColumnSpec::new("rushing_y/a", SqlType::Double),
            ColumnSpec::new("ingested_at", SqlType::Timestamp),
        ]
    }

    #[test]
    fn initializes_harvest_log() {
        let temp = tempdir().expect("tempdir");
        let warehouse = open_temp(&temp);

        let query = warehouse
            .execute_query(
                "SELECT COUNT(*) AS c FROM information_schema.tables WHERE table_name = 'harvest_log'",
                QueryGuardrails::default(),
                false,
            )
            .expect("query");
        assert_eq!(query.rows[0][0], json!(1));
    }

    #[test]
    fn read_only_mode_rejects_write_query() {
        let temp = tempdir().expect("tempdir");
        let warehouse = open_temp(&temp);

        let error = warehouse
            .execute_query(
                "CREATE TABLE test_write (id INTEGER)",
                QueryGuardrails::default(),
                false,
            )
            .expect_err("should reject");

        assert!(matches!(error, WarehouseError::QueryRejected(_)));
    }

    #[test]
    fn publish_creates_schema_and_binds_punctuated_columns() {
        let temp = tempdir().expect("tempdir");
        let warehouse = open_temp(&temp);
        let table = TableRef::new("rushing").with_schema("raw");

        let rows = vec![
            vec![json!("Derrick Henry"), json!(5.4), json!("2024-01-01T00:00:00Z")],
            vec![json!("Bijan Robinson"), Value::Null, json!("2024-01-01T00:00:00Z")],
        ];
        let report = warehouse
            .publish(&table, &sample_columns(), &rows, &PublishOptions::default())
            .expect("publish");
        assert_eq!(report.rows_written, 2);
        assert_eq!(report.chunks, 1);

        let result = warehouse
            .execute_query(
                "SELECT player_name, \"rushing_y/a\" FROM raw.rushing ORDER BY player_name",
                QueryGuardrails::default(),
                false,
            )
            .expect("query");
        assert_eq!(result.rows[0], vec![json!("Bijan Robinson"), Value::Null]);
        assert_eq!(result.rows[1], vec![json!("Derrick Henry"), json!(5.4)]);
    }

    #[test]
    fn publish_fail_mode_refuses_existing_table() {
        let temp = tempdir().expect("tempdir");
        let warehouse = open_temp(&temp);
        let table = TableRef::new("once");
        let options = PublishOptions {
            mode: IfExists::Fail,
            ..PublishOptions::default()
        };
        let rows = vec![vec![json!("a"), json!(1.0), Value::Null]];

        warehouse
            .publish(&table, &sample_columns(), &rows, &options)
            .expect("first publish");
        let error = warehouse
            .publish(&table, &sample_columns(), &rows, &options)
            .expect_err("second publish must fail");
        assert!(matches!(error, WarehouseError::TableExists { .. }));
    }

    #[test]
    fn publish_records_chunk_count_in_harvest_log() {
        let temp = tempdir().expect("tempdir");
        let warehouse = open_temp(&temp);
        let rows: Vec<Vec<Value>> = (0..5)
            .map(|i| vec![json!(format!("p{i}")), json!(i), Value::Null])
            .collect();
        let options = PublishOptions {
            mode: IfExists::Replace,
            chunk_rows: Some(2),
            run_id: Some(String::from("run-1")),
        };

        let report = warehouse
            .publish(&TableRef::new("chunked"), &sample_columns(), &rows, &options)
            .expect("publish");
        assert_eq!(report.chunks, 3);

        let log = warehouse
            .execute_query(
                "SELECT run_id, mode, row_count, chunk_count FROM harvest_log",
                QueryGuardrails::default(),
                false,
            )
            .expect("log query");
        assert_eq!(
            log.rows[0],
            vec![json!("run-1"), json!("replace"), json!(5), json!(3)]
        );
    }

    #[test]
    fn append_widens_an_integer_column_instead_of_truncating() {
        let temp = tempdir().expect("tempdir");
        let warehouse = open_temp(&temp);
        let table = TableRef::new("widening");
        let append = PublishOptions {
            mode: IfExists::Append,
            ..PublishOptions::default()
        };

        warehouse
            .publish(
                &table,
                &[ColumnSpec::new("x", SqlType::BigInt)],
                &[vec![json!(1)]],
                &PublishOptions {
                    mode: IfExists::Replace,
                    ..PublishOptions::default()
                },
            )
            .expect("replace");
        warehouse
            .publish(&table, &[ColumnSpec::new("x", SqlType::Double)], &[vec![json!(2.5)]], &append)
            .expect("append double");

        let result = warehouse
            .execute_query(
                "SELECT x FROM main.widening ORDER BY x",
                QueryGuardrails::default(),
                false,
            )
            .expect("query");
        assert_eq!(result.rows, vec![vec![json!(1.0)], vec![json!(2.5)]]);

        warehouse
            .publish(&table, &[ColumnSpec::new("x", SqlType::Varchar)], &[vec![json!("n/a")]], &append)
            .expect("append text");
        let result = warehouse
            .execute_query(
                "SELECT typeof(x), COUNT(*) FROM main.widening GROUP BY 1",
                QueryGuardrails::default(),
                false,
            )
            .expect("query");
        assert_eq!(result.rows, vec![vec![json!("VARCHAR"), json!(3)]]);
    }

    #[test]
    fn append_keeps_stored_type_for_all_null_columns() {
        let temp = tempdir().expect("tempdir");
        let warehouse = open_temp(&temp);
        let table = TableRef::new("sparse");
        let columns = [ColumnSpec::new("x", SqlType::BigInt)];

        warehouse
            .publish(&table, &columns, &[vec![json!(7)]], &PublishOptions::default())
            .expect("first");
        warehouse
            .publish(
                &table,
                &[ColumnSpec::new("x", SqlType::Varchar)],
                &[vec![Value::Null]],
                &PublishOptions {
                    mode: IfExists::Append,
                    ..PublishOptions::default()
                },
            )
            .expect("append nulls");

        let result = warehouse
            .execute_query(
                "SELECT DISTINCT typeof(x) FROM main.sparse",
                QueryGuardrails::default(),
                false,
            )
            .expect("query");
        assert_eq!(result.rows, vec![vec![json!("BIGINT")]]);
    }

    #[test]
    fn publish_rejects_ragged_rows() {
        let temp = tempdir().expect("tempdir");
        let warehouse = open_temp(&temp);
        let rows = vec![vec![json!("only one value")]];

        let error = warehouse
            .publish(
                &TableRef::new("ragged"),
                &sample_columns(),
                &rows,
                &PublishOptions::default(),
            )
            .expect_err("ragged rows");
        assert!(matches!(error, WarehouseError::QueryRejected(_)));
    }
}
