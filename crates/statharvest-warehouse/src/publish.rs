//! Table targets, column typing and write modes for [`Warehouse::publish`](crate::Warehouse::publish).

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use ::duckdb::types::Value as DuckValue;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::WarehouseError;

/// Schema used when a [`TableRef`] has none.
pub const DEFAULT_SCHEMA: &str = "main";

/// Behavior when the target table already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IfExists {
    /// Refuse to write into an existing table.
    Fail,
    /// Drop and recreate the table.
    Replace,
    /// Insert into the existing table, adding any new columns.
    #[default]
    Append,
}

impl IfExists {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Fail => "fail",
            Self::Replace => "replace",
            Self::Append => "append",
        }
    }
}

impl FromStr for IfExists {
    type Err = WarehouseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "fail" => Ok(Self::Fail),
            "replace" => Ok(Self::Replace),
            "append" => Ok(Self::Append),
            other => Err(WarehouseError::QueryRejected(format!(
                "unknown if-exists mode '{other}', expected fail, replace or append"
            ))),
        }
    }
}

/// Schema-qualified table name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRef {
    schema: Option<String>,
    name: String,
}

impl TableRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            schema: None,
            name: name.into(),
        }
    }

    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    pub fn schema(&self) -> &str {
        self.schema.as_deref().unwrap_or(DEFAULT_SCHEMA)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Quoted `"schema"."name"` after validating both parts.
    pub fn qualified(&self) -> Result<String, WarehouseError> {
        validate_identifier(self.schema())?;
        validate_identifier(&self.name)?;
        Ok(format!(
            "{}.{}",
            quote_identifier(self.schema()),
            quote_identifier(&self.name)
        ))
    }
}

impl Display for TableRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.schema(), self.name)
    }
}

/// Storage type chosen for a published column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlType {
    Boolean,
    BigInt,
    Double,
    Varchar,
    Timestamp,
}

impl SqlType {
    pub const fn as_sql(self) -> &'static str {
        match self {
            Self::Boolean => "BOOLEAN",
            Self::BigInt => "BIGINT",
            Self::Double => "DOUBLE",
            Self::Varchar => "VARCHAR",
            Self::Timestamp => "TIMESTAMP",
        }
    }

    /// Narrowest type that holds every non-null value. All-null columns are `VARCHAR`.
    pub fn infer<'a>(values: impl IntoIterator<Item = &'a Value>) -> Self {
        let mut inferred: Option<Self> = None;
        for value in values {
            let candidate = match value {
                Value::Null => continue,
                Value::Bool(_) => Self::Boolean,
                Value::Number(number) if number.is_i64() || number.is_u64() => Self::BigInt,
                Value::Number(_) => Self::Double,
                _ => Self::Varchar,
            };
            inferred = Some(match inferred {
                None => candidate,
                Some(current) => current.widen(candidate),
            });
        }
        inferred.unwrap_or(Self::Varchar)
    }

    /// Narrowest type holding values of both `self` and `other`.
    pub fn widen(self, other: Self) -> Self {
        match (self, other) {
            (current, other) if current == other => current,
            (Self::BigInt, Self::Double) | (Self::Double, Self::BigInt) => Self::Double,
            _ => Self::Varchar,
        }
    }

    /// Maps a DuckDB `data_type` name back onto a storage type.
    pub fn from_duckdb(data_type: &str) -> Option<Self> {
        let upper = data_type.trim().to_ascii_uppercase();
        match upper.as_str() {
            "BOOLEAN" => Some(Self::Boolean),
            "TINYINT" | "SMALLINT" | "INTEGER" | "BIGINT" | "HUGEINT" | "UTINYINT"
            | "USMALLINT" | "UINTEGER" | "UBIGINT" => Some(Self::BigInt),
            "FLOAT" | "REAL" | "DOUBLE" => Some(Self::Double),
            "VARCHAR" | "TEXT" => Some(Self::Varchar),
            _ if upper.starts_with("DECIMAL") => Some(Self::Double),
            _ if upper.starts_with("TIMESTAMP") => Some(Self::Timestamp),
            _ => None,
        }
    }

    pub(crate) const fn placeholder(self) -> &'static str {
        match self {
            Self::Timestamp => "TRY_CAST(? AS TIMESTAMP)",
            _ => "?",
        }
    }

    /// Converts a JSON cell into a parameter of this column's type.
    pub(crate) fn bind(self, value: &Value) -> DuckValue {
        match (self, value) {
            (_, Value::Null) => DuckValue::Null,
            (Self::Boolean, Value::Bool(flag)) => DuckValue::Boolean(*flag),
            (Self::BigInt, Value::Number(number)) => number
                .as_i64()
                .map(DuckValue::BigInt)
                .unwrap_or(DuckValue::Null),
            (Self::Double, Value::Number(number)) => number
                .as_f64()
                .map(DuckValue::Double)
                .unwrap_or(DuckValue::Null),
            (Self::Varchar | Self::Timestamp, Value::String(text)) => DuckValue::Text(text.clone()),
            (Self::Varchar | Self::Timestamp, other) => DuckValue::Text(other.to_string()),
            _ => DuckValue::Null,
        }
    }
}

/// Column definition for a published table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSpec {
    pub name: String,
    pub sql_type: SqlType,
}

impl ColumnSpec {
    pub fn new(name: impl Into<String>, sql_type: SqlType) -> Self {
        Self {
            name: name.into(),
            sql_type,
        }
    }
}

/// Options controlling a single publish call.
#[derive(Debug, Clone, Default)]
pub struct PublishOptions {
    pub mode: IfExists,
    /// Rows per transaction; `None` writes everything in one transaction.
    pub chunk_rows: Option<usize>,
    /// Recorded in `harvest_log` to correlate writes with a harvest run.
    pub run_id: Option<String>,
}

/// Outcome of a publish call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublishReport {
    pub table: String,
    pub mode: IfExists,
    pub rows_written: usize,
    pub chunks: usize,
}

/// Schema and table names: ASCII letters, digits and underscores, not starting with a digit.
pub(crate) fn validate_identifier(identifier: &str) -> Result<(), WarehouseError> {
    let mut chars = identifier.chars();
    let valid_start = chars
        .next()
        .is_some_and(|first| first.is_ascii_alphabetic() || first == '_');
    if valid_start && chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        Ok(())
    } else {
        Err(WarehouseError::InvalidIdentifier(identifier.to_string()))
    }
}

/// Column names are always quoted, so only quotes and control characters are refused.
pub(crate) fn validate_column_name(name: &str) -> Result<(), WarehouseError> {
    if name.trim().is_empty() || name.contains('"') || name.chars().any(char::is_control) {
        return Err(WarehouseError::InvalidIdentifier(name.to_string()));
    }
    Ok(())
}

pub(crate) fn quote_identifier(identifier: &str) -> String {
    format!("\"{identifier}\"")
}
