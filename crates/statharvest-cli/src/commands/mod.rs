mod components;
mod datasets;
mod run;
mod sql;

use statharvest_core::DataFacade;

use crate::cli::{Cli, Command};
use crate::error::CliError;

pub fn run(cli: &Cli) -> Result<(), CliError> {
    match &cli.command {
        Command::Run(args) => run::run(args, &facade(cli)?),
        Command::Datasets => datasets::run(&facade(cli)?),
        Command::Components => components::run(),
        Command::Sql(args) => sql::run(args),
    }
}

fn facade(cli: &Cli) -> Result<DataFacade, CliError> {
    Ok(DataFacade::load(&cli.config)?)
}
