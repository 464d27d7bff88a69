use std::collections::BTreeMap;

use statharvest_core::{ComponentRegistry, ComponentRole};

use crate::error::CliError;
use crate::output::render_json;

pub fn run() -> Result<(), CliError> {
    render_json(&listing(&ComponentRegistry::global()))
}

fn listing(registry: &ComponentRegistry) -> BTreeMap<&'static str, Vec<String>> {
    ComponentRole::ALL
        .into_iter()
        .map(|role| (role.as_str(), registry.names(role)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn listing_covers_every_role() {
        let listing = listing(&ComponentRegistry::with_builtins());
        assert_eq!(listing.len(), ComponentRole::ALL.len());
        assert!(listing["strategy"].contains(&String::from("year_by_year")));
        assert!(listing["datasource"].contains(&String::from("profootballreference")));
    }
}
