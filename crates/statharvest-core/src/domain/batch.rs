use std::collections::BTreeSet;

use serde_json::{Map, Value};

use super::Cell;
use crate::error::HarvestError;

/// Ordered, column-named rows.
///
/// Column names are unique and lower-cased, and every row holds exactly one
/// cell per column. All mutating operations preserve both properties.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RecordBatch {
    columns: Vec<String>,
    rows: Vec<Vec<Cell>>,
}

impl RecordBatch {
    /// Builds a batch, lower-casing column names.
    ///
    /// # Errors
    /// Returns [`HarvestError::InvalidBatch`] for duplicate names or ragged rows.
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Cell>>) -> Result<Self, HarvestError> {
        let columns: Vec<String> = columns
            .into_iter()
            .map(|name| name.trim().to_lowercase())
            .collect();

        let mut seen = BTreeSet::new();
        for name in &columns {
            if !seen.insert(name.as_str()) {
                return Err(HarvestError::InvalidBatch(format!(
                    "duplicate column '{name}'"
                )));
            }
        }

        if let Some(index) = rows.iter().position(|row| row.len() != columns.len()) {
            return Err(HarvestError::InvalidBatch(format!(
                "row {index} has {} cells, expected {}",
                rows[index].len(),
                columns.len()
            )));
        }

        Ok(Self { columns, rows })
    }

    pub fn with_columns(columns: Vec<String>) -> Result<Self, HarvestError> {
        Self::new(columns, Vec::new())
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Cell>] {
        &self.rows
    }

    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|column| column == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    pub fn get(&self, row: usize, column: &str) -> Option<&Cell> {
        let index = self.column_index(column)?;
        self.rows.get(row).map(|cells| &cells[index])
    }

    pub fn column_values(&self, name: &str) -> Option<Vec<&Cell>> {
        let index = self.column_index(name)?;
        Some(self.rows.iter().map(|row| &row[index]).collect())
    }

    pub fn push_row(&mut self, row: Vec<Cell>) -> Result<(), HarvestError> {
        if row.len() != self.columns.len() {
            return Err(HarvestError::InvalidBatch(format!(
                "row has {} cells, expected {}",
                row.len(),
                self.columns.len()
            )));
        }
        self.rows.push(row);
        Ok(())
    }

    /// Sets every row's `name` cell to `value`, appending the column if needed.
    pub fn with_constant_column(mut self, name: &str, value: Cell) -> Self {
        let name = name.trim().to_lowercase();
        match self.column_index(&name) {
            Some(index) => {
                for row in &mut self.rows {
                    row[index] = value.clone();
                }
            }
            None => {
                self.columns.push(name);
                for row in &mut self.rows {
                    row.push(value.clone());
                }
            }
        }
        self
    }

    /// Replaces or appends column `name` with values computed per row.
    pub fn with_derived_column<F>(mut self, name: &str, mut derive: F) -> Self
    where
        F: FnMut(&RecordBatch, usize) -> Cell,
    {
        let values: Vec<Cell> = (0..self.rows.len()).map(|row| derive(&self, row)).collect();
        let name = name.trim().to_lowercase();
        match self.column_index(&name) {
            Some(index) => {
                for (row, value) in self.rows.iter_mut().zip(values) {
                    row[index] = value;
                }
            }
            None => {
                self.columns.push(name);
                for (row, value) in self.rows.iter_mut().zip(values) {
                    row.push(value);
                }
            }
        }
        self
    }

    /// Renames `from` to `to`. An existing `to` column is replaced, keeping
    /// the position of `from`. Missing `from` is a no-op.
    pub fn rename_column(mut self, from: &str, to: &str) -> Self {
        let to = to.trim().to_lowercase();
        let Some(source) = self.column_index(from) else {
            return self;
        };
        if from == to {
            return self;
        }
        if let Some(existing) = self.column_index(&to) {
            self = self.remove_column_at(existing);
        }
        let source = self.column_index(from).unwrap_or(source);
        self.columns[source] = to;
        self
    }

    pub fn drop_column(self, name: &str) -> Self {
        match self.column_index(name) {
            Some(index) => self.remove_column_at(index),
            None => self,
        }
    }

    fn remove_column_at(mut self, index: usize) -> Self {
        self.columns.remove(index);
        for row in &mut self.rows {
            row.remove(index);
        }
        self
    }

    /// Projects onto `order`, creating absent columns filled with `fill`.
    pub fn reindex(&self, order: &[&str], fill: &Cell) -> Result<Self, HarvestError> {
        let lookup: Vec<Option<usize>> = order
            .iter()
            .map(|name| self.column_index(name))
            .collect();
        let rows = self
            .rows
            .iter()
            .map(|row| {
                lookup
                    .iter()
                    .map(|index| match index {
                        Some(index) => row[*index].clone(),
                        None => fill.clone(),
                    })
                    .collect()
            })
            .collect();
        Self::new(order.iter().map(|name| (*name).to_string()).collect(), rows)
    }

    /// Keeps rows for which `keep` returns true.
    pub fn retain_rows<F>(mut self, mut keep: F) -> Self
    where
        F: FnMut(&[String], &[Cell]) -> bool,
    {
        let columns = std::mem::take(&mut self.columns);
        self.rows.retain(|row| keep(&columns, row));
        self.columns = columns;
        self
    }

    /// Applies `map` to every cell of `name`. Missing columns are ignored.
    pub fn map_column<F>(mut self, name: &str, mut map: F) -> Self
    where
        F: FnMut(&Cell) -> Cell,
    {
        if let Some(index) = self.column_index(name) {
            for row in &mut self.rows {
                row[index] = map(&row[index]);
            }
        }
        self
    }

    /// Concatenates batches, taking the ordered union of their columns and
    /// filling missing cells with `Null`.
    pub fn concat(batches: impl IntoIterator<Item = RecordBatch>) -> RecordBatch {
        let batches: Vec<RecordBatch> = batches.into_iter().collect();
        let mut columns: Vec<String> = Vec::new();
        for batch in &batches {
            for name in &batch.columns {
                if !columns.contains(name) {
                    columns.push(name.clone());
                }
            }
        }

        let mut rows = Vec::with_capacity(batches.iter().map(RecordBatch::num_rows).sum());
        for batch in batches {
            let lookup: Vec<Option<usize>> =
                columns.iter().map(|name| batch.column_index(name)).collect();
            for row in batch.rows {
                rows.push(
                    lookup
                        .iter()
                        .map(|index| index.map(|index| row[index].clone()).unwrap_or_default())
                        .collect(),
                );
            }
        }

        RecordBatch { columns, rows }
    }

    /// Rows as JSON objects keyed by column name.
    pub fn to_json_records(&self) -> Vec<Value> {
        self.rows
            .iter()
            .map(|row| {
                let object: Map<String, Value> = self
                    .columns
                    .iter()
                    .zip(row)
                    .map(|(name, cell)| (name.clone(), cell.to_json()))
                    .collect();
                Value::Object(object)
            })
            .collect()
    }

    pub fn into_parts(self) -> (Vec<String>, Vec<Vec<Cell>>) {
        (self.columns, self.rows)
    }
}

/// Normalizes raw header labels into valid batch column names.
///
/// Names are trimmed and lower-cased; blanks become `unnamed_{i}` and repeats
/// get `.1`, `.2` suffixes in order of appearance.
pub fn unique_column_names(raw: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut seen = BTreeSet::new();
    let mut names = Vec::new();
    for (index, name) in raw.into_iter().enumerate() {
        let mut base = name.trim().to_lowercase();
        if base.is_empty() {
            base = format!("unnamed_{index}");
        }
        let mut candidate = base.clone();
        let mut suffix = 1;
        while !seen.insert(candidate.clone()) {
            candidate = format!("{base}.{suffix}");
            suffix += 1;
        }
        names.push(candidate);
    }
    names
}
