use statharvest_core::DataFacade;

use crate::error::CliError;
use crate::output::render_json;

pub fn run(facade: &DataFacade) -> Result<(), CliError> {
    render_json(&facade.datasets())
}
