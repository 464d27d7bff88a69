use statharvest_warehouse::WarehouseError;
use thiserror::Error;

use crate::registry::ComponentRole;

/// Errors that can be retried by [`RetryPolicy`](crate::retry::RetryPolicy).
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

/// Error taxonomy shared by every pipeline component.
///
/// `Network` and `Render` are transient and retried locally. `Parse` and
/// `NotFound` mean the source changed shape. `UnknownComponent` and
/// `Configuration` are raised while resolving a run and abort it.
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("network error for {url}: {message}")]
    Network {
        url: String,
        message: String,
        retryable: bool,
    },

    #[error("render error for {url}: {message}")]
    Render { url: String, message: String },

    #[error("parse error: {0}")]
    Parse(String),

    #[error("{what} not found at {location}")]
    NotFound { what: String, location: String },

    #[error(
        "unknown {role} '{name}'; registered: [{}]",
        .available.join(", ")
    )]
    UnknownComponent {
        role: ComponentRole,
        name: String,
        available: Vec<String>,
    },

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("invalid record batch: {0}")]
    InvalidBatch(String),

    #[error("sink error: {0}")]
    Sink(String),

    #[error(transparent)]
    Warehouse(#[from] WarehouseError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl HarvestError {
    pub fn network(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Network {
            url: url.into(),
            message: message.into(),
            retryable: true,
        }
    }

    pub fn not_found(what: impl Into<String>, location: impl Into<String>) -> Self {
        Self::NotFound {
            what: what.into(),
            location: location.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Resolution-time errors invalidate the whole run.
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::UnknownComponent { .. } | Self::Configuration(_)
        )
    }
}

impl Retryable for HarvestError {
    fn is_retryable(&self) -> bool {
        match self {
            Self::Network { retryable, .. } => *retryable,
            Self::Render { .. } => true,
            Self::Warehouse(WarehouseError::DuckDb(_) | WarehouseError::Io(_)) => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_component_lists_registered_names() {
        let error = HarvestError::UnknownComponent {
            role: ComponentRole::Parser,
            name: String::from("xml"),
            available: vec![String::from("html")],
        };
        assert_eq!(error.to_string(), "unknown parser 'xml'; registered: [html]");
        assert!(error.is_fatal());
    }

    #[test]
    fn only_transient_errors_are_retryable() {
        assert!(HarvestError::network("https://example.test", "timeout").is_retryable());
        assert!(!HarvestError::Network {
            url: String::from("https://example.test"),
            message: String::from("HTTP 404"),
            retryable: false,
        }
        .is_retryable());
        assert!(!HarvestError::Parse(String::from("bad table")).is_retryable());
        assert!(!HarvestError::not_found("table #fantasy", "page").is_retryable());
    }
}
