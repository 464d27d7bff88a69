use super::{ParsedDocument, Parser};
use crate::domain::RawDocument;
use crate::error::HarvestError;

/// HTML parser backed by `scraper`.
#[derive(Debug, Default)]
pub struct HtmlParser {
    document: Option<ParsedDocument>,
}

impl HtmlParser {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Parser for HtmlParser {
    fn name(&self) -> &str {
        "html"
    }

    fn parse(&mut self, document: &RawDocument) -> Result<(), HarvestError> {
        self.document = Some(ParsedDocument::parse(document)?);
        Ok(())
    }

    fn document(&self) -> Option<&ParsedDocument> {
        self.document.as_ref()
    }
}
