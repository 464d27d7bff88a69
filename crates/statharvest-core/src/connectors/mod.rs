//! Connectors fetch raw content (or tables) from remote endpoints.
//!
//! Every connector retries its own I/O through a [`RetryPolicy`] and releases
//! its resources in [`Connector::close`]. Strategies hold connectors through a
//! [`ConnectorSession`], which guarantees `close` runs on every exit path.

pub mod browser;
pub mod bulk_file;
pub mod http;
pub mod sql;

use std::collections::BTreeMap;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::time::Duration;

use statharvest_warehouse::WarehouseConfig;
use tracing::debug;

use crate::domain::{Endpoint, RawDocument, RecordBatch};
use crate::error::HarvestError;
use crate::http_client::HttpClient;
use crate::registry::ComponentRegistry;
use crate::retry::RetryPolicy;

pub use browser::{
    BrowserConnector, BrowserDriver, BrowserOptions, BrowserSession, ChromeProcessDriver,
    WaitCondition,
};
pub use bulk_file::{BulkFileConnector, Compression};
pub use http::HttpConnector;
pub use sql::SqlConnector;

/// Lazily produced record batches, used for bounded-memory tabular fetches.
pub type BatchStream = Box<dyn Iterator<Item = Result<RecordBatch, HarvestError>> + Send>;

/// What a connector returned.
pub enum Fetched {
    /// Markup to be handed to a parser.
    Document(RawDocument),
    /// A complete table; parsers are bypassed.
    Table(RecordBatch),
    /// A table delivered in chunks.
    Chunks(BatchStream),
}

impl Fetched {
    pub fn into_document(self) -> Result<RawDocument, HarvestError> {
        match self {
            Self::Document(document) => Ok(document),
            Self::Table(_) | Self::Chunks(_) => Err(HarvestError::Parse(String::from(
                "connector returned tabular data where a document was expected",
            ))),
        }
    }
}

impl std::fmt::Debug for Fetched {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Document(document) => f.debug_tuple("Document").field(&document.url).finish(),
            Self::Table(batch) => f.debug_tuple("Table").field(&batch.num_rows()).finish(),
            Self::Chunks(_) => f.write_str("Chunks(..)"),
        }
    }
}

/// Fetch capability.
pub trait Connector: Send {
    fn name(&self) -> &str;

    /// Acquires long-lived resources such as a browser process.
    fn open(&mut self) -> Result<(), HarvestError> {
        Ok(())
    }

    fn fetch(&mut self, endpoint: &Endpoint) -> Result<Fetched, HarvestError>;

    /// Releases resources. Must be safe to call more than once.
    fn close(&mut self) {}
}

/// Scoped ownership of an open connector; closes it when dropped.
pub struct ConnectorSession {
    connector: Box<dyn Connector>,
}

impl ConnectorSession {
    /// Opens `connector`. If opening fails the connector is closed before the
    /// error is returned, so partially acquired resources are released.
    pub fn open(mut connector: Box<dyn Connector>) -> Result<Self, HarvestError> {
        if let Err(error) = connector.open() {
            connector.close();
            return Err(error);
        }
        debug!(connector = connector.name(), "connector session opened");
        Ok(Self { connector })
    }
}

impl Deref for ConnectorSession {
    type Target = dyn Connector;

    fn deref(&self) -> &Self::Target {
        self.connector.as_ref()
    }
}

impl DerefMut for ConnectorSession {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.connector.as_mut()
    }
}

impl Drop for ConnectorSession {
    fn drop(&mut self) {
        self.connector.close();
        debug!(connector = self.connector.name(), "connector session closed");
    }
}

/// Construction arguments shared by all connector variants.
#[derive(Debug, Clone)]
pub struct ConnectorArgs {
    pub base_url: String,
    pub headers: BTreeMap<String, String>,
    pub timeout: Duration,
    pub retry: RetryPolicy,
    pub browser: BrowserOptions,
    pub compression: Compression,
    pub chunk_rows: Option<usize>,
    pub warehouse: WarehouseConfig,
    /// Injected transport; connectors build their own pool when absent.
    pub http_client: Option<Arc<dyn HttpClient>>,
}

impl Default for ConnectorArgs {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            headers: BTreeMap::new(),
            timeout: Duration::from_secs(10),
            retry: RetryPolicy::default(),
            browser: BrowserOptions::default(),
            compression: Compression::Auto,
            chunk_rows: None,
            warehouse: WarehouseConfig::default(),
            http_client: None,
        }
    }
}

pub fn register(registry: &mut ComponentRegistry) {
    registry.register_connector("http", |args| Ok(Box::new(HttpConnector::new(args))));
    registry.register_connector("browser", |args| {
        Ok(Box::new(BrowserConnector::new(
            Box::new(ChromeProcessDriver::new(args.browser.clone())),
            args,
        )))
    });
    registry.register_connector("bulk_file", |args| {
        Ok(Box::new(BulkFileConnector::new(args)))
    });
    registry.register_connector("github", |args| Ok(Box::new(BulkFileConnector::new(args))));
    registry.register_connector("sql", |args| Ok(Box::new(SqlConnector::new(args))));
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingConnector {
        opens: Arc<AtomicUsize>,
        closes: Arc<AtomicUsize>,
        fail_open: bool,
    }

    impl Connector for CountingConnector {
        fn name(&self) -> &str {
            "counting"
        }

        fn open(&mut self) -> Result<(), HarvestError> {
            self.opens.fetch_add(1, Ordering::SeqCst);
            if self.fail_open {
                return Err(HarvestError::Render {
                    url: String::from("about:blank"),
                    message: String::from("launch failed"),
                });
            }
            Ok(())
        }

        fn fetch(&mut self, endpoint: &Endpoint) -> Result<Fetched, HarvestError> {
            Err(HarvestError::network(endpoint.url(), "unreachable"))
        }

        fn close(&mut self) {
            self.closes.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn counting(fail_open: bool) -> (CountingConnector, Arc<AtomicUsize>) {
        let closes = Arc::new(AtomicUsize::new(0));
        (
            CountingConnector {
                opens: Arc::new(AtomicUsize::new(0)),
                closes: Arc::clone(&closes),
                fail_open,
            },
            closes,
        )
    }

    #[test]
    fn session_closes_connector_when_dropped_after_error() {
        let (connector, closes) = counting(false);
        {
            let mut session = ConnectorSession::open(Box::new(connector)).expect("open");
            let result = session.fetch(&Endpoint::new("https://example.test", "x"));
            assert!(result.is_err());
        }
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn failed_open_still_releases_resources() {
        let (connector, closes) = counting(true);
        let result = ConnectorSession::open(Box::new(connector));
        assert!(result.is_err());
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }
}
