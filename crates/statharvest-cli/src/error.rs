use statharvest_core::{HarvestError, WarehouseError};
use thiserror::Error;

/// CLI-level error categories mapped to exit codes.
#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Harvest(#[from] HarvestError),

    #[error(transparent)]
    Warehouse(#[from] WarehouseError),

    #[error("invalid argument: {0}")]
    Usage(String),

    #[error("run finished with {failed} of {attempted} units failed")]
    PartialFailure { failed: usize, attempted: usize },

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CliError {
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::Usage(_) | Self::Warehouse(WarehouseError::QueryRejected(_)) => 2,
            Self::Harvest(error) if error.is_fatal() => 2,
            Self::PartialFailure { .. } => 3,
            Self::Serialization(_) | Self::Csv(_) => 4,
            Self::Harvest(_) | Self::Warehouse(_) | Self::Io(_) => 10,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_follow_categories() {
        assert_eq!(CliError::Harvest(HarvestError::config("bad")).exit_code(), 2);
        assert_eq!(
            CliError::PartialFailure { failed: 1, attempted: 3 }.exit_code(),
            3
        );
        assert_eq!(
            CliError::Harvest(HarvestError::Parse(String::from("x"))).exit_code(),
            10
        );
        assert_eq!(
            CliError::Warehouse(WarehouseError::QueryRejected(String::from("ddl"))).exit_code(),
            2
        );
    }
}
