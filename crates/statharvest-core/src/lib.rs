//! # Statharvest Core
//!
//! Pluggable pipeline for harvesting sports statistics from web pages and
//! bulk files into record batches, CSV files and the embedded warehouse.
//!
//! ## Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`config`] | Configuration document and resolved dataset configs |
//! | [`connectors`] | HTTP, headless browser, bulk file and SQL connectors |
//! | [`datasources`] | Table and metadata extraction from parsed pages |
//! | [`domain`] | Cells, record batches, endpoints |
//! | [`error`] | Core error type |
//! | [`facade`] | Run datasets by name |
//! | [`http_client`] | HTTP transport abstraction |
//! | [`logging`] | Tracing subscriber setup |
//! | [`parsers`] | HTML parsing and element selection |
//! | [`registry`] | Named component factories |
//! | [`retry`] | Retry with backoff |
//! | [`sinks`] | Memory, CSV and database outputs |
//! | [`strategies`] | Run orchestration |
//! | [`throttling`] | Delay between requests |
//! | [`transformers`] | Per-dataset column cleanup |
//!
//! ## Pipeline
//!
//! ```text
//! Strategy ──▶ Connector ──▶ Parser ──▶ DataSource ──▶ Transformer ──▶ Sink
//!    │             │
//!    │             └── RetryPolicy, HttpClient / BrowserDriver / Warehouse
//!    └── parameter space, throttle, failure isolation per iteration
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use statharvest_core::{DataFacade, RunOverrides};
//!
//! let facade = DataFacade::load("statharvest.json".as_ref())?;
//! let report = facade.run("year_by_year", &RunOverrides::default())?;
//! println!("{} rows, {} failures", report.rows(), report.failures.len());
//! ```

pub mod config;
pub mod connectors;
pub mod datasources;
pub mod domain;
pub mod error;
pub mod facade;
pub mod http_client;
pub mod logging;
pub mod parsers;
pub mod registry;
pub mod retry;
pub mod sinks;
pub mod strategies;
pub mod throttling;
pub mod transformers;

pub use config::{ConfigDocument, DatasetConfig, ParameterAxis, RunOverrides};
pub use connectors::{Connector, ConnectorArgs, ConnectorSession, Fetched};
pub use datasources::DataSource;
pub use domain::{Cell, DType, Endpoint, EndpointTemplate, Parameters, RawDocument, RecordBatch};
pub use error::{HarvestError, Retryable};
pub use facade::{DataFacade, DatasetSummary};
pub use http_client::{FixtureHttpClient, HttpClient, HttpResponse, ReqwestHttpClient};
pub use logging::{init_logging, LogConfig, LogFormat, LogLevel};
pub use parsers::{ElementSelector, Parser};
pub use registry::{ComponentRegistry, ComponentRole};
pub use retry::{RetryPolicy, RetrySettings};
pub use sinks::{Sink, SinkMode};
pub use strategies::{RunReport, RunState, Strategy, StrategyArgs};
pub use throttling::Throttle;
pub use transformers::Transformer;

pub use statharvest_warehouse::{
    IfExists, QueryGuardrails, QueryResult, TableRef, Warehouse, WarehouseConfig, WarehouseError,
};
