use super::Transformer;
use crate::domain::{DType, RecordBatch};
use crate::error::HarvestError;

/// Play-by-play release files. Identifier columns are kept as text so ids
/// such as `00-0033873` never turn numeric.
#[derive(Debug, Clone, Copy, Default)]
pub struct NflfastrTransformer;

impl Transformer for NflfastrTransformer {
    fn name(&self) -> &str {
        "nflfastr"
    }

    fn transform(&self, batch: RecordBatch) -> Result<RecordBatch, HarvestError> {
        let id_columns: Vec<String> = batch
            .columns()
            .iter()
            .filter(|name| name.ends_with("_id"))
            .cloned()
            .collect();
        Ok(id_columns.iter().fold(batch, |batch, name| {
            batch.map_column(name, |cell| cell.coerce(DType::Text))
        }))
    }
}
