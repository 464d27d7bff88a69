//! Data sources combine a connector and a parser into normalized batches.

mod metadata;
mod sources;
mod table;

use std::collections::BTreeSet;

use regex::Regex;

use crate::connectors::{BatchStream, Connector, Fetched};
use crate::domain::{Cell, Endpoint, Parameters, RecordBatch};
use crate::error::HarvestError;
use crate::parsers::{compile, loaded, ElementSelector, Parser};
use crate::registry::ComponentRegistry;

pub(crate) use metadata::format_date;
pub use metadata::{page_metadata, parse_month_day_year, MetadataRule};
pub use sources::{BulkFileSource, FantasyProsSource, HtmlTableSource, ProFootballReferenceSource};
pub use table::{table_batch, table_to_batch};

/// Player links on the football reference site.
pub const DEFAULT_CROSS_REFERENCE_PATTERN: &str =
    r"/players/(?P<last_name_letter>[A-Z])/(?P<player_id>[A-Za-z0-9.]+)\.htm";

/// Assembles record batches from fetched documents.
pub trait DataSource: Send + Sync {
    fn name(&self) -> &str;

    /// Whether target tables may be hidden inside HTML comments.
    fn search_comments(&self) -> bool {
        false
    }

    /// Whether datasets must name a target element.
    fn requires_target(&self) -> bool {
        true
    }

    /// Fetches `endpoint` and loads it into `parser`.
    fn load(
        &self,
        connector: &mut dyn Connector,
        parser: &mut dyn Parser,
        endpoint: &Endpoint,
    ) -> Result<(), HarvestError> {
        let document = connector.fetch(endpoint)?.into_document()?;
        parser.parse(&document)
    }

    /// Post-processing applied to every extracted table, with the page still loaded.
    fn decorate(&self, _parser: &dyn Parser, batch: RecordBatch) -> Result<RecordBatch, HarvestError> {
        Ok(batch)
    }

    /// Converts table `target` of the loaded document.
    fn extract_table(&self, parser: &dyn Parser, target: &str) -> Result<RecordBatch, HarvestError> {
        let batch = table_batch(loaded(parser)?, target, self.search_comments())?;
        self.decorate(parser, batch)
    }

    /// Fetch, parse, locate `target` and convert it.
    fn assemble(
        &self,
        connector: &mut dyn Connector,
        parser: &mut dyn Parser,
        endpoint: &Endpoint,
        target: &str,
    ) -> Result<RecordBatch, HarvestError> {
        self.load(connector, parser, endpoint)?;
        self.extract_table(parser, target)
    }

    /// Like [`assemble`](Self::assemble), but passes tabular fetches through,
    /// chunked when the connector streams.
    fn assemble_batches(
        &self,
        connector: &mut dyn Connector,
        parser: &mut dyn Parser,
        endpoint: &Endpoint,
        target: Option<&str>,
    ) -> Result<BatchStream, HarvestError> {
        match connector.fetch(endpoint)? {
            Fetched::Document(document) => {
                let target = target.ok_or_else(|| {
                    HarvestError::config(format!("data source '{}' needs a table_id", self.name()))
                })?;
                parser.parse(&document)?;
                let batch = self.extract_table(parser, target)?;
                Ok(Box::new(std::iter::once(Ok(batch))))
            }
            Fetched::Table(batch) => Ok(Box::new(std::iter::once(Ok(batch)))),
            Fetched::Chunks(stream) => Ok(stream),
        }
    }

    /// Named captures of every link inside `target` whose `href` matches
    /// `pattern`, first occurrence kept.
    fn cross_references(
        &self,
        parser: &dyn Parser,
        target: &str,
        pattern: &Regex,
    ) -> Result<Vec<Parameters>, HarvestError> {
        let document = loaded(parser)?;
        let links = compile("a[href]")?;
        let hrefs = document
            .find_map(&ElementSelector::by_id(target).to_css(), self.search_comments(), |element| {
                element
                    .select(&links)
                    .filter_map(|link| link.value().attr("href").map(str::to_string))
                    .collect::<Vec<_>>()
            })?
            .ok_or_else(|| HarvestError::not_found(format!("element #{target}"), document.url()))?;

        let mut seen = BTreeSet::new();
        let mut references = Vec::new();
        for href in hrefs {
            let Some(captures) = pattern.captures(&href) else {
                continue;
            };
            let matched = captures.get(0).map_or("", |m| m.as_str()).to_string();
            if !seen.insert(matched) {
                continue;
            }
            let values: Parameters = pattern
                .capture_names()
                .flatten()
                .filter_map(|name| {
                    captures
                        .name(name)
                        .map(|value| (name.to_string(), Cell::text(value.as_str())))
                })
                .collect();
            references.push(values);
        }
        Ok(references)
    }

    fn page_metadata(
        &self,
        parser: &dyn Parser,
        rules: &[MetadataRule],
    ) -> Result<Parameters, HarvestError> {
        page_metadata(loaded(parser)?, rules)
    }
}

/// Attaches every parameter as a constant column.
pub fn attach_constants(batch: RecordBatch, values: &Parameters) -> RecordBatch {
    values
        .iter()
        .fold(batch, |batch, (name, value)| batch.with_constant_column(name, value.clone()))
}

pub fn register(registry: &mut ComponentRegistry) {
    registry.register_datasource("html_table", || Ok(Box::new(HtmlTableSource)));
    registry.register_datasource("profootballreference", || {
        Ok(Box::new(ProFootballReferenceSource))
    });
    registry.register_datasource("fantasypros", || Ok(Box::new(FantasyProsSource)));
    registry.register_datasource("bulk_file", || Ok(Box::new(BulkFileSource)));
}
