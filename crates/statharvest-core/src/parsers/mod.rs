//! Parsers turn raw documents into queryable trees.

mod html;

use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

use scraper::{ElementRef, Html, Node, Selector};

use crate::domain::RawDocument;
use crate::error::HarvestError;
use crate::registry::ComponentRegistry;

pub use html::HtmlParser;

/// Parse capability. Holds the most recently parsed document.
pub trait Parser {
    fn name(&self) -> &str;

    /// Loads `document`, replacing any previously loaded one.
    fn parse(&mut self, document: &RawDocument) -> Result<(), HarvestError>;

    fn document(&self) -> Option<&ParsedDocument>;

    /// Extracts every element matching `selector` from the loaded document.
    fn extract(&self, selector: &ElementSelector) -> Result<Vec<Element>, HarvestError> {
        loaded(self)?.select(selector)
    }
}

/// The loaded document, or the caller error of using a parser before `parse`.
pub fn loaded<P: Parser + ?Sized>(parser: &P) -> Result<&ParsedDocument, HarvestError> {
    parser
        .document()
        .ok_or_else(|| HarvestError::Parse(String::from("no document loaded")))
}

/// Element query built from tag, id and attribute constraints, or raw CSS.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ElementSelector {
    tag: Option<String>,
    id: Option<String>,
    attrs: Vec<(String, Option<String>)>,
    css: Option<String>,
}

impl ElementSelector {
    pub fn tag(tag: impl Into<String>) -> Self {
        Self {
            tag: Some(tag.into()),
            ..Self::default()
        }
    }

    pub fn by_id(id: impl Into<String>) -> Self {
        Self::default().with_id(id)
    }

    pub fn css(css: impl Into<String>) -> Self {
        Self {
            css: Some(css.into()),
            ..Self::default()
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attrs.push((name.into(), Some(value.into())));
        self
    }

    pub fn with_attr_present(mut self, name: impl Into<String>) -> Self {
        self.attrs.push((name.into(), None));
        self
    }

    /// Equivalent CSS selector text.
    pub fn to_css(&self) -> String {
        if let Some(css) = &self.css {
            return css.clone();
        }
        let mut css = self.tag.clone().unwrap_or_else(|| String::from("*"));
        if let Some(id) = &self.id {
            css.push_str(&format!("[id=\"{}\"]", escape(id)));
        }
        for (name, value) in &self.attrs {
            match value {
                Some(value) => css.push_str(&format!("[{name}=\"{}\"]", escape(value))),
                None => css.push_str(&format!("[{name}]")),
            }
        }
        css
    }
}

impl Display for ElementSelector {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_css())
    }
}

fn escape(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

/// An extracted sub-tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub tag: String,
    pub attrs: BTreeMap<String, String>,
    /// Whitespace-collapsed text content.
    pub text: String,
    /// Outer markup.
    pub html: String,
}

impl Element {
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs.get(name).map(String::as_str)
    }

    fn from_ref(element: ElementRef<'_>) -> Self {
        Self {
            tag: element.value().name().to_string(),
            attrs: element
                .value()
                .attrs()
                .map(|(name, value)| (name.to_string(), value.to_string()))
                .collect(),
            text: element_text(element),
            html: element.html(),
        }
    }
}

/// Text of `element` with whitespace runs collapsed to single spaces.
pub fn element_text(element: ElementRef<'_>) -> String {
    collapse_whitespace(&element.text().collect::<Vec<_>>().join(" "))
}

pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// A parsed HTML document.
pub struct ParsedDocument {
    url: String,
    html: Html,
}

impl std::fmt::Debug for ParsedDocument {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParsedDocument")
            .field("url", &self.url)
            .finish_non_exhaustive()
    }
}

impl ParsedDocument {
    pub fn parse(document: &RawDocument) -> Result<Self, HarvestError> {
        if document.body.trim().is_empty() {
            return Err(HarvestError::Parse(format!(
                "empty document from {}",
                document.url
            )));
        }
        Ok(Self {
            url: document.url.clone(),
            html: Html::parse_document(&document.body),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn html(&self) -> &Html {
        &self.html
    }

    pub fn select(&self, selector: &ElementSelector) -> Result<Vec<Element>, HarvestError> {
        let compiled = compile(&selector.to_css())?;
        Ok(self.html.select(&compiled).map(Element::from_ref).collect())
    }

    /// Applies `visit` to the first element matching `css`. With
    /// `search_comments`, markup inside HTML comments is searched when the
    /// live tree has no match.
    pub fn find_map<T>(
        &self,
        css: &str,
        search_comments: bool,
        mut visit: impl FnMut(ElementRef<'_>) -> T,
    ) -> Result<Option<T>, HarvestError> {
        let compiled = compile(css)?;
        if let Some(element) = self.html.select(&compiled).next() {
            return Ok(Some(visit(element)));
        }
        if search_comments {
            for fragment in self.commented_fragments() {
                if let Some(element) = fragment.select(&compiled).next() {
                    return Ok(Some(visit(element)));
                }
            }
        }
        Ok(None)
    }

    fn commented_fragments(&self) -> Vec<Html> {
        self.html
            .tree
            .nodes()
            .filter_map(|node| match node.value() {
                Node::Comment(comment) if comment.contains('<') => {
                    Some(Html::parse_fragment(comment))
                }
                _ => None,
            })
            .collect()
    }
}

pub(crate) fn compile(css: &str) -> Result<Selector, HarvestError> {
    Selector::parse(css)
        .map_err(|error| HarvestError::Parse(format!("invalid selector '{css}': {error:?}")))
}

pub fn register(registry: &mut ComponentRegistry) {
    registry.register_parser("html", || Ok(Box::new(HtmlParser::new())));
}
