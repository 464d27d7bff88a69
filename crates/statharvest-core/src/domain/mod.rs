mod batch;
mod cell;
mod endpoint;

use std::collections::BTreeMap;

pub use batch::{unique_column_names, RecordBatch};
pub use cell::{Cell, DType};
pub use endpoint::{Endpoint, EndpointTemplate};

/// Named values for one point in a parameter space, or one set of
/// cross-reference captures.
pub type Parameters = BTreeMap<String, Cell>;

/// Raw content returned by a connector, tagged with where it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawDocument {
    pub url: String,
    pub body: String,
}

impl RawDocument {
    pub fn new(url: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            body: body.into(),
        }
    }
}
