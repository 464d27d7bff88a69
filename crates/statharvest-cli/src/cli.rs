//! Command-line argument definitions.
//!
//! # Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `run` | Harvest one configured dataset |
//! | `datasets` | List configured datasets |
//! | `components` | List registered components per role |
//! | `sql` | Query the local DuckDB warehouse |
//!
//! # Examples
//!
//! ```bash
//! statharvest --config statharvest.json run year_by_year --axis year=2022..2023
//! statharvest run game_by_game --sink csv --output-dir out --max-details 5
//! statharvest sql "SELECT count(*) FROM raw.year_by_year"
//! ```

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use statharvest_core::{LogFormat, LogLevel, SinkMode};

#[derive(Debug, Parser)]
#[command(
    name = "statharvest",
    author,
    version,
    about = "Harvest sports statistics into CSV files and a local warehouse"
)]
pub struct Cli {
    /// Configuration document.
    #[arg(long, global = true, default_value = "statharvest.json")]
    pub config: PathBuf,

    #[arg(long, global = true, value_enum, default_value_t = LevelArg::Info)]
    pub log_level: LevelArg,

    #[arg(long, global = true, value_enum, default_value_t = LogFormatArg::Compact)]
    pub log_format: LogFormatArg,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run a dataset and print the collected rows.
    Run(RunArgs),
    /// List configured datasets with their source and strategy.
    Datasets,
    /// List registered component names per role.
    Components,
    /// Execute a guarded SQL query against the warehouse.
    Sql(SqlArgs),
}

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Dataset name, or `source/dataset` when ambiguous.
    pub dataset: String,

    /// Output sinks; repeat for several. Defaults to the configured sinks.
    #[arg(long = "sink", value_enum)]
    pub sinks: Vec<SinkArg>,

    /// Directory for CSV sink files.
    #[arg(long)]
    pub output_dir: Option<PathBuf>,

    /// Stdout format for the collected rows.
    #[arg(long, value_enum, default_value_t = BatchFormat::Csv)]
    pub format: BatchFormat,

    /// Cap on detail pages per index page.
    #[arg(long)]
    pub max_details: Option<usize>,

    /// Replace an axis: `name=FROM..TO` or `name=a,b,c`.
    #[arg(long = "axis", value_name = "NAME=VALUES")]
    pub axes: Vec<String>,

    /// Delay between iterations in milliseconds.
    #[arg(long)]
    pub delay_ms: Option<u64>,
}

#[derive(Debug, Args)]
pub struct SqlArgs {
    pub query: String,

    /// Allow statements that modify the warehouse.
    #[arg(long, default_value_t = false)]
    pub write: bool,

    #[arg(long, default_value_t = 10_000)]
    pub max_rows: usize,

    #[arg(long, default_value_t = 5_000)]
    pub query_timeout_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SinkArg {
    Memory,
    Csv,
    Database,
}

impl From<SinkArg> for SinkMode {
    fn from(value: SinkArg) -> Self {
        match value {
            SinkArg::Memory => Self::Memory,
            SinkArg::Csv => Self::Csv,
            SinkArg::Database => Self::Database,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum BatchFormat {
    Csv,
    Json,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LevelArg {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl From<LevelArg> for LogLevel {
    fn from(value: LevelArg) -> Self {
        match value {
            LevelArg::Trace => Self::Trace,
            LevelArg::Debug => Self::Debug,
            LevelArg::Info => Self::Info,
            LevelArg::Warn => Self::Warn,
            LevelArg::Error => Self::Error,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormatArg {
    Pretty,
    Json,
    Compact,
}

impl From<LogFormatArg> for LogFormat {
    fn from(value: LogFormatArg) -> Self {
        match value {
            LogFormatArg::Pretty => Self::Pretty,
            LogFormatArg::Json => Self::Json,
            LogFormatArg::Compact => Self::Compact,
        }
    }
}
