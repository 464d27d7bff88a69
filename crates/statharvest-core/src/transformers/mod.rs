//! Pure batch-to-batch transformers, one per (source, table shape).

mod fantasy_pros;
mod nflfastr;
pub mod ops;
mod pfr;

use crate::domain::RecordBatch;
use crate::error::HarvestError;
use crate::registry::ComponentRegistry;

pub use fantasy_pros::{DraftTransformer, ProjectionsTransformer, RankingsTransformer};
pub use nflfastr::NflfastrTransformer;
pub use pfr::{GameByGameTransformer, YearByYearTransformer};

/// Transformers hold no mutable state and may be shared between runs.
pub trait Transformer: Send + Sync {
    fn name(&self) -> &str;

    fn transform(&self, batch: RecordBatch) -> Result<RecordBatch, HarvestError>;

    /// Final column order, or empty when the input order is kept.
    fn output_columns(&self) -> &[&str] {
        &[]
    }
}

/// Returns batches unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityTransformer;

impl Transformer for IdentityTransformer {
    fn name(&self) -> &str {
        "identity"
    }

    fn transform(&self, batch: RecordBatch) -> Result<RecordBatch, HarvestError> {
        Ok(batch)
    }
}

pub fn register(registry: &mut ComponentRegistry) {
    registry.register_transformer("identity", || Ok(Box::new(IdentityTransformer)));
    registry.register_transformer("pfr_year_by_year", || Ok(Box::new(YearByYearTransformer)));
    registry.register_transformer("pfr_game_by_game", || Ok(Box::new(GameByGameTransformer)));
    registry.register_transformer("fantasy_pros_rankings", || {
        Ok(Box::new(RankingsTransformer))
    });
    registry.register_transformer("fantasy_pros_projections", || {
        Ok(Box::new(ProjectionsTransformer))
    });
    registry.register_transformer("fantasy_pros_draft", || Ok(Box::new(DraftTransformer)));
    registry.register_transformer("nflfastr", || Ok(Box::new(NflfastrTransformer)));
}
