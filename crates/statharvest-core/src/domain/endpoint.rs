use std::fmt::{Display, Formatter};

use super::Parameters;
use crate::error::HarvestError;

/// A remote resource: base location, relative path and query parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    base: String,
    path: String,
    query: Vec<(String, String)>,
}

impl Endpoint {
    /// Builds an endpoint. A `?` in `path` is split off into query parameters.
    pub fn new(base: impl Into<String>, path: impl Into<String>) -> Self {
        let path = path.into();
        let (path, query) = match path.split_once('?') {
            Some((path, query)) => (path.to_string(), parse_query(query)),
            None => (path, Vec::new()),
        };
        Self {
            base: base.into(),
            path,
            query,
        }
    }

    pub fn with_query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn query(&self) -> &[(String, String)] {
        &self.query
    }

    /// Absolute URL with exactly one `/` between base and path.
    pub fn url(&self) -> String {
        let base = self.base.trim_end_matches('/');
        let path = self.path.trim_start_matches('/');
        let mut url = match (base.is_empty(), path.is_empty()) {
            (true, _) => path.to_string(),
            (false, true) => base.to_string(),
            (false, false) => format!("{base}/{path}"),
        };
        if !self.query.is_empty() {
            let query = self
                .query
                .iter()
                .map(|(name, value)| {
                    format!(
                        "{}={}",
                        urlencoding::encode(name),
                        urlencoding::encode(value)
                    )
                })
                .collect::<Vec<_>>()
                .join("&");
            url.push('?');
            url.push_str(&query);
        }
        url
    }
}

impl Display for Endpoint {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.url())
    }
}

fn parse_query(query: &str) -> Vec<(String, String)> {
    query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (name, value) = pair.split_once('=').unwrap_or((pair, ""));
            (decode(name), decode(value))
        })
        .collect()
}

fn decode(value: &str) -> String {
    urlencoding::decode(value)
        .map(|decoded| decoded.into_owned())
        .unwrap_or_else(|_| value.to_string())
}

/// Path template with `{name}` placeholders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointTemplate {
    raw: String,
}

impl EndpointTemplate {
    /// # Errors
    /// Fails on an unterminated or empty placeholder.
    pub fn parse(raw: impl Into<String>) -> Result<Self, HarvestError> {
        let template = Self { raw: raw.into() };
        template.segments()?;
        Ok(template)
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Placeholder names in order of first appearance.
    pub fn placeholders(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for segment in self.segments().unwrap_or_default() {
            if let Segment::Placeholder(name) = segment {
                if !names.iter().any(|existing| existing == name) {
                    names.push(name.to_string());
                }
            }
        }
        names
    }

    /// Substitutes every placeholder from `params`.
    ///
    /// # Errors
    /// Returns [`HarvestError::Configuration`] when a placeholder has no value.
    pub fn render(&self, params: &Parameters) -> Result<String, HarvestError> {
        let mut rendered = String::with_capacity(self.raw.len());
        for segment in self.segments()? {
            match segment {
                Segment::Literal(text) => rendered.push_str(text),
                Segment::Placeholder(name) => {
                    let value = params.get(name).ok_or_else(|| {
                        HarvestError::config(format!(
                            "endpoint template '{}' references unknown placeholder '{{{name}}}'",
                            self.raw
                        ))
                    })?;
                    rendered.push_str(&value.to_string());
                }
            }
        }
        Ok(rendered)
    }

    fn segments(&self) -> Result<Vec<Segment<'_>>, HarvestError> {
        let mut segments = Vec::new();
        let mut rest = self.raw.as_str();
        while let Some(start) = rest.find('{') {
            if start > 0 {
                segments.push(Segment::Literal(&rest[..start]));
            }
            let after = &rest[start + 1..];
            let end = after.find('}').ok_or_else(|| {
                HarvestError::config(format!("unterminated placeholder in '{}'", self.raw))
            })?;
            let name = after[..end].trim();
            if name.is_empty() {
                return Err(HarvestError::config(format!(
                    "empty placeholder in '{}'",
                    self.raw
                )));
            }
            segments.push(Segment::Placeholder(name));
            rest = &after[end + 1..];
        }
        if !rest.is_empty() {
            segments.push(Segment::Literal(rest));
        }
        Ok(segments)
    }
}

enum Segment<'a> {
    Literal(&'a str),
    Placeholder(&'a str),
}
