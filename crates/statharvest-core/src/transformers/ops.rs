//! Composable batch primitives shared by the concrete transformers.

use crate::domain::{Cell, DType, RecordBatch};
use crate::error::HarvestError;

/// Renames by `(from, to)` pairs in order.
pub fn rename(batch: RecordBatch, pairs: &[(&str, &str)]) -> RecordBatch {
    pairs
        .iter()
        .fold(batch, |batch, (from, to)| batch.rename_column(from, to))
}

/// Drops `names`; absent names are ignored.
pub fn drop_columns(batch: RecordBatch, names: &[&str]) -> RecordBatch {
    names
        .iter()
        .fold(batch, |batch, name| batch.drop_column(name))
}

pub fn drop_columns_where(batch: RecordBatch, predicate: impl Fn(&str) -> bool) -> RecordBatch {
    let doomed: Vec<String> = batch
        .columns()
        .iter()
        .filter(|name| predicate(name))
        .cloned()
        .collect();
    doomed
        .iter()
        .fold(batch, |batch, name| batch.drop_column(name))
}

/// Projects onto `order`. Absent columns and null cells take `fill`; listed
/// columns are then coerced to their `DType`.
pub fn reindex(
    batch: &RecordBatch,
    order: &[&str],
    fill: &Cell,
    dtypes: &[(&str, DType)],
) -> Result<RecordBatch, HarvestError> {
    let mut projected = batch.reindex(order, fill)?;
    for name in order {
        projected = projected.map_column(name, |cell| {
            if cell.is_null() {
                fill.clone()
            } else {
                cell.clone()
            }
        });
    }
    for (name, dtype) in dtypes {
        projected = projected.map_column(name, |cell| cell.coerce(*dtype));
    }
    Ok(projected)
}

/// Row filters for [`drop_rows`].
#[derive(Debug, Clone, PartialEq)]
pub enum RowPredicate {
    /// Cell text equals the value exactly.
    Equals(String),
    /// Cell text contains the value.
    Contains(String),
    IsNull,
}

impl RowPredicate {
    pub fn matches(&self, cell: &Cell) -> bool {
        match self {
            Self::Equals(value) => !cell.is_null() && cell.to_string() == *value,
            Self::Contains(value) => !cell.is_null() && cell.to_string().contains(value.as_str()),
            Self::IsNull => cell.is_null(),
        }
    }
}

/// Drops rows whose `column` cell matches. A missing column drops nothing.
pub fn drop_rows(batch: RecordBatch, column: &str, predicate: &RowPredicate) -> RecordBatch {
    let Some(index) = batch.column_index(column) else {
        return batch;
    };
    batch.retain_rows(|_, row| !predicate.matches(&row[index]))
}

/// Replaces or appends `name` with a value computed per row.
pub fn derive<F>(batch: RecordBatch, name: &str, derive: F) -> RecordBatch
where
    F: FnMut(&RecordBatch, usize) -> Cell,
{
    batch.with_derived_column(name, derive)
}

/// Text of a cell, `None` for nulls.
pub(crate) fn text_of(cell: Option<&Cell>) -> Option<String> {
    cell.filter(|cell| !cell.is_null()).map(Cell::to_string)
}
