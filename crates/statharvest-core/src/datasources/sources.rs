use super::{attach_constants, DataSource, MetadataRule};
use crate::connectors::{BatchStream, Connector, Fetched};
use crate::domain::{Endpoint, RecordBatch};
use crate::error::HarvestError;
use crate::parsers::{loaded, Parser};

/// Any page whose target is a `<table id=...>`.
#[derive(Debug, Clone, Copy, Default)]
pub struct HtmlTableSource;

impl DataSource for HtmlTableSource {
    fn name(&self) -> &str {
        "html_table"
    }
}

/// Football reference pages, which ship secondary tables inside comments.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProFootballReferenceSource;

impl DataSource for ProFootballReferenceSource {
    fn name(&self) -> &str {
        "profootballreference"
    }

    fn search_comments(&self) -> bool {
        true
    }
}

/// Rankings pages; every row carries the page's `as_of_date`.
#[derive(Debug, Clone, Copy, Default)]
pub struct FantasyProsSource;

impl DataSource for FantasyProsSource {
    fn name(&self) -> &str {
        "fantasypros"
    }

    fn decorate(&self, parser: &dyn Parser, batch: RecordBatch) -> Result<RecordBatch, HarvestError> {
        let rule = MetadataRule::TimeTag {
            column: String::from("as_of_date"),
        };
        let values = super::page_metadata(loaded(parser)?, std::slice::from_ref(&rule))?;
        Ok(attach_constants(batch, &values))
    }
}

/// Pass-through for connectors that already return tables.
#[derive(Debug, Clone, Copy, Default)]
pub struct BulkFileSource;

impl DataSource for BulkFileSource {
    fn name(&self) -> &str {
        "bulk_file"
    }

    fn requires_target(&self) -> bool {
        false
    }

    fn assemble(
        &self,
        connector: &mut dyn Connector,
        parser: &mut dyn Parser,
        endpoint: &Endpoint,
        target: &str,
    ) -> Result<RecordBatch, HarvestError> {
        let batches = self
            .assemble_batches(connector, parser, endpoint, Some(target))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(RecordBatch::concat(batches))
    }

    fn assemble_batches(
        &self,
        connector: &mut dyn Connector,
        _parser: &mut dyn Parser,
        endpoint: &Endpoint,
        _target: Option<&str>,
    ) -> Result<BatchStream, HarvestError> {
        match connector.fetch(endpoint)? {
            Fetched::Table(batch) => Ok(Box::new(std::iter::once(Ok(batch)))),
            Fetched::Chunks(stream) => Ok(stream),
            Fetched::Document(document) => Err(HarvestError::Parse(format!(
                "bulk_file source expected tabular data from {}",
                document.url
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Cell, RawDocument};
    use crate::parsers::HtmlParser;

    struct PageConnector(&'static str);

    impl Connector for PageConnector {
        fn name(&self) -> &str {
            "page"
        }

        fn fetch(&mut self, endpoint: &Endpoint) -> Result<Fetched, HarvestError> {
            Ok(Fetched::Document(RawDocument::new(endpoint.url(), self.0)))
        }
    }

    const RANKINGS: &str = r#"<html><body>
        <div class="primary-heading-subheading"><time datetime="2023-10-09">Oct 9, 2023</time></div>
        <table id="ranking-table"><thead><tr><th>RK</th><th>Player Name</th></tr></thead>
        <tbody><tr><td>1</td><td>Josh Allen (BUF)</td></tr></tbody></table>
        </body></html>"#;

    #[test]
    fn fantasy_pros_rows_carry_as_of_date() {
        let mut connector = PageConnector(RANKINGS);
        let mut parser = HtmlParser::new();
        let batch = FantasyProsSource
            .assemble(
                &mut connector,
                &mut parser,
                &Endpoint::new("https://example.test", "nfl/rankings/qb.php"),
                "ranking-table",
            )
            .expect("assemble");

        assert_eq!(batch.columns(), ["rk", "player name", "as_of_date"]);
        assert_eq!(batch.get(0, "as_of_date"), Some(&Cell::text("2023-10-09")));
    }

    #[test]
    fn pro_football_reference_finds_commented_tables() {
        let mut connector = PageConnector(
            r#"<div id="all_passing"><!--
                <table id="passing"><tr><th>Year</th></tr><tr><td>2023</td></tr></table>
            --></div>"#,
        );
        let mut parser = HtmlParser::new();
        let endpoint = Endpoint::new("https://example.test", "players/M/MahoPa00.htm");

        let batch = ProFootballReferenceSource
            .assemble(&mut connector, &mut parser, &endpoint, "passing")
            .expect("assemble");
        assert_eq!(batch.get(0, "year"), Some(&Cell::Int(2023)));

        let hidden = HtmlTableSource.assemble(&mut connector, &mut parser, &endpoint, "passing");
        assert!(matches!(hidden, Err(HarvestError::NotFound { .. })));
    }

    #[test]
    fn bulk_file_rejects_documents() {
        let mut connector = PageConnector("<html></html>");
        let mut parser = HtmlParser::new();
        let result = BulkFileSource.assemble_batches(
            &mut connector,
            &mut parser,
            &Endpoint::new("https://example.test", "pbp.csv.gz"),
            None,
        );
        assert!(matches!(result, Err(HarvestError::Parse(_))));
    }
}
