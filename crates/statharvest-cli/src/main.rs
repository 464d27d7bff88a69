mod cli;
mod commands;
mod error;
mod output;

use std::process::ExitCode;

use clap::Parser;
use statharvest_core::{init_logging, LogConfig};

use crate::cli::Cli;
use crate::error::CliError;

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("error: {error}");
            ExitCode::from(error.exit_code())
        }
    }
}

fn run() -> Result<(), CliError> {
    let cli = Cli::parse();
    let log_config = LogConfig::default()
        .with_level(cli.log_level.into())
        .with_format(cli.log_format.into());
    init_logging(&log_config)?;

    commands::run(&cli)
}
