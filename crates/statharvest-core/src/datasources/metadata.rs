//! Page-level metadata rules.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use time::macros::format_description;
use time::{Date, Month};
use tracing::warn;

use crate::domain::{Cell, Parameters};
use crate::error::HarvestError;
use crate::parsers::{collapse_whitespace, compile, element_text, ParsedDocument};

/// One value to lift off a page into a constant column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MetadataRule {
    /// Text of the first element matching `selector`.
    Heading { column: String, selector: String },
    /// Value following `Label:` in a paragraph.
    LabeledField { column: String, label: String },
    /// Date of the first `<time>` element, as `YYYY-MM-DD`.
    TimeTag { column: String },
}

impl MetadataRule {
    pub fn column(&self) -> &str {
        match self {
            Self::Heading { column, .. }
            | Self::LabeledField { column, .. }
            | Self::TimeTag { column } => column,
        }
    }

    /// Evaluates the rule; `None` when the page does not carry the value.
    pub fn evaluate(&self, document: &ParsedDocument) -> Result<Option<String>, HarvestError> {
        match self {
            Self::Heading { selector, .. } => Ok(document
                .find_map(selector, false, element_text)?
                .filter(|text| !text.is_empty())),
            Self::LabeledField { label, .. } => labeled_field(document, label),
            Self::TimeTag { .. } => time_tag(document),
        }
    }
}

/// Evaluates `rules`; values the page lacks become `Null`.
pub fn page_metadata(
    document: &ParsedDocument,
    rules: &[MetadataRule],
) -> Result<Parameters, HarvestError> {
    let mut values = Parameters::new();
    for rule in rules {
        let value = match rule.evaluate(document)? {
            Some(value) => Cell::text(value),
            None => {
                warn!(url = document.url(), column = rule.column(), "page metadata missing");
                Cell::Null
            }
        };
        values.insert(rule.column().to_lowercase(), value);
    }
    Ok(values)
}

fn labeled_field(document: &ParsedDocument, label: &str) -> Result<Option<String>, HarvestError> {
    let paragraphs = compile("p")?;
    let marker = format!("{label}:");
    for paragraph in document.html().select(&paragraphs) {
        let raw: String = paragraph.text().collect();
        let Some(start) = raw.find(&marker) else {
            continue;
        };
        let rest = &raw[start + marker.len()..];
        let end = [rest.find('\u{a0}'), rest.find('\n'), rest.find("  ")]
            .into_iter()
            .flatten()
            .min()
            .unwrap_or(rest.len());
        let value = collapse_whitespace(&rest[..end]);
        if !value.is_empty() {
            return Ok(Some(value));
        }
    }
    Ok(None)
}

fn time_tag(document: &ParsedDocument) -> Result<Option<String>, HarvestError> {
    let found = document.find_map("time", false, |time| {
        (
            time.value().attr("datetime").map(str::to_string),
            element_text(time),
        )
    })?;
    let Some((datetime, text)) = found else {
        return Ok(None);
    };

    let date = datetime
        .as_deref()
        .and_then(parse_iso_date)
        .or_else(|| parse_month_day_year(&text));
    date.map(format_date).transpose()
}

fn parse_iso_date(raw: &str) -> Option<Date> {
    let prefix = raw.trim().get(..10)?;
    Date::parse(prefix, format_description!("[year]-[month]-[day]")).ok()
}

static MONTH_DAY_YEAR: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"([A-Za-z]{3})[A-Za-z]*\.?\s+(\d{1,2}),\s*(\d{4})").ok());

/// Parses `Oct 9, 2023` style dates.
pub fn parse_month_day_year(raw: &str) -> Option<Date> {
    let captures = MONTH_DAY_YEAR.as_ref()?.captures(raw)?;
    let month = month_from_abbreviation(&captures[1])?;
    let day = captures[2].parse::<u8>().ok()?;
    let year = captures[3].parse::<i32>().ok()?;
    Date::from_calendar_date(year, month, day).ok()
}

fn month_from_abbreviation(abbreviation: &str) -> Option<Month> {
    let month = match abbreviation.to_lowercase().as_str() {
        "jan" => Month::January,
        "feb" => Month::February,
        "mar" => Month::March,
        "apr" => Month::April,
        "may" => Month::May,
        "jun" => Month::June,
        "jul" => Month::July,
        "aug" => Month::August,
        "sep" => Month::September,
        "oct" => Month::October,
        "nov" => Month::November,
        "dec" => Month::December,
        _ => return None,
    };
    Some(month)
}

pub(crate) fn format_date(date: Date) -> Result<String, HarvestError> {
    date.format(format_description!("[year]-[month]-[day]"))
        .map_err(|error| HarvestError::Parse(format!("cannot format date: {error}")))
}
