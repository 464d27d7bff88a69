//! HTML table to [`RecordBatch`] conversion with header normalization.

use scraper::ElementRef;

use crate::domain::{unique_column_names, Cell, RecordBatch};
use crate::error::HarvestError;
use crate::parsers::{collapse_whitespace, ElementSelector, ParsedDocument};

/// Row classes that mark header rows repeated inside a table body.
const REPEATED_HEADER_CLASSES: [&str; 2] = ["thead", "over_header"];

/// Finds table `table_id` and converts it.
pub fn table_batch(
    document: &ParsedDocument,
    table_id: &str,
    search_comments: bool,
) -> Result<RecordBatch, HarvestError> {
    let css = ElementSelector::tag("table").with_id(table_id).to_css();
    document
        .find_map(&css, search_comments, table_to_batch)?
        .unwrap_or_else(|| Err(HarvestError::not_found(format!("table #{table_id}"), document.url())))
}

/// Converts a `<table>` element into a batch.
///
/// Multi-level headers are expanded by `colspan` and joined with `_`,
/// skipping blank and `Unnamed` levels. Blank headers fall back to the
/// `data-stat` attribute of the first body row.
pub fn table_to_batch(table: ElementRef<'_>) -> Result<RecordBatch, HarvestError> {
    let (header_rows, body_rows) = split_rows(table);

    let header_grid: Vec<Vec<String>> = header_rows.iter().map(|row| expand_cells(*row)).collect();
    let body: Vec<Vec<(String, Option<String>)>> = body_rows
        .iter()
        .filter(|row| !is_repeated_header(**row))
        .map(|row| body_cells(*row))
        .filter(|cells| !cells.is_empty())
        .collect();

    let width = header_grid
        .iter()
        .map(Vec::len)
        .chain(body.iter().map(Vec::len))
        .max()
        .unwrap_or(0);

    let raw_names = (0..width).map(|index| {
        let joined = header_grid
            .iter()
            .filter_map(|level| level.get(index))
            .filter(|label| !is_decorative(label))
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join("_");
        if joined.is_empty() {
            body.first()
                .and_then(|cells| cells.get(index))
                .and_then(|(_, stat)| stat.clone())
                .unwrap_or_default()
        } else {
            joined
        }
    });
    let columns = unique_column_names(raw_names);

    let rows = body
        .into_iter()
        .map(|cells| {
            let mut row: Vec<Cell> = cells.iter().map(|(text, _)| Cell::infer(text)).collect();
            row.resize(width, Cell::Null);
            row
        })
        .collect();

    RecordBatch::new(columns, rows)
}

fn is_decorative(label: &str) -> bool {
    label.is_empty() || label.starts_with("Unnamed")
}

fn child_elements<'a>(
    element: ElementRef<'a>,
    names: &'a [&'a str],
) -> impl Iterator<Item = ElementRef<'a>> + 'a {
    element
        .children()
        .filter_map(ElementRef::wrap)
        .filter(move |child| names.contains(&child.value().name()))
}

/// Header rows come from `<thead>`; without one, a leading row made only of
/// `<th>` cells is the header.
fn split_rows(table: ElementRef<'_>) -> (Vec<ElementRef<'_>>, Vec<ElementRef<'_>>) {
    let mut header = Vec::new();
    let mut body = Vec::new();
    for section in table.children().filter_map(ElementRef::wrap) {
        match section.value().name() {
            "thead" => header.extend(child_elements(section, &["tr"])),
            "tbody" => body.extend(child_elements(section, &["tr"])),
            "tr" => body.push(section),
            _ => {}
        }
    }

    if header.is_empty() {
        let leading_th_row = body.first().copied().filter(|row| {
            let mut cells = child_elements(*row, &["th", "td"]).peekable();
            cells.peek().is_some() && cells.all(|cell| cell.value().name() == "th")
        });
        if let Some(row) = leading_th_row {
            header.push(row);
            body.remove(0);
        }
    }
    (header, body)
}

fn is_repeated_header(row: ElementRef<'_>) -> bool {
    row.value()
        .classes()
        .any(|class| REPEATED_HEADER_CLASSES.contains(&class))
}

fn colspan(cell: ElementRef<'_>) -> usize {
    cell.value()
        .attr("colspan")
        .and_then(|span| span.trim().parse::<usize>().ok())
        .filter(|span| *span > 0)
        .unwrap_or(1)
}

fn cell_text(cell: ElementRef<'_>) -> String {
    collapse_whitespace(&cell.text().collect::<Vec<_>>().join(" "))
}

fn expand_cells(row: ElementRef<'_>) -> Vec<String> {
    let mut labels = Vec::new();
    for cell in child_elements(row, &["th", "td"]) {
        let text = cell_text(cell);
        labels.extend(std::iter::repeat(text).take(colspan(cell)));
    }
    labels
}

fn body_cells(row: ElementRef<'_>) -> Vec<(String, Option<String>)> {
    let mut cells = Vec::new();
    for cell in child_elements(row, &["th", "td"]) {
        let text = cell_text(cell);
        let stat = cell.value().attr("data-stat").map(str::to_string);
        for _ in 0..colspan(cell) {
            cells.push((text.clone(), stat.clone()));
        }
    }
    cells
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::RawDocument;

    const FANTASY: &str = r#"
        <table id="fantasy">
          <thead>
            <tr class="over_header">
              <th colspan="3"></th><th colspan="2">Passing</th><th></th>
            </tr>
            <tr>
              <th data-stat="ranker">Rk</th><th>Player</th><th>FantPos</th>
              <th>Yds</th><th>TD</th><th></th>
            </tr>
          </thead>
          <tbody>
            <tr><th data-stat="ranker">1</th><td>Josh Allen*</td><td>QB</td>
                <td>4306</td><td>29</td><td data-stat="awards">PB</td></tr>
            <tr class="thead"><th>Rk</th><td>Player</td><td>FantPos</td>
                <td>Yds</td><td>TD</td><td></td></tr>
            <tr><th data-stat="ranker">2</th><td>Jalen Hurts</td><td>QB</td>
                <td>3858</td><td>23</td><td data-stat="awards"></td></tr>
          </tbody>
        </table>"#;

    fn document(body: &str) -> ParsedDocument {
        ParsedDocument::parse(&RawDocument::new("https://example.test/fantasy", body))
            .expect("parse")
    }

    #[test]
    fn multi_level_headers_are_flattened() {
        let batch = table_batch(&document(FANTASY), "fantasy", false).expect("table");

        assert_eq!(
            batch.columns(),
            ["rk", "player", "fantpos", "passing_yds", "passing_td", "awards"]
        );
        assert_eq!(batch.num_rows(), 2);
        assert_eq!(batch.get(0, "passing_yds"), Some(&Cell::Int(4306)));
        assert_eq!(batch.get(1, "awards"), Some(&Cell::Null));
    }

    #[test]
    fn table_ids_need_not_be_css_identifiers() {
        let page = FANTASY.replace(r#"id="fantasy""#, r#"id="2023:fantasy.v2""#);
        let batch = table_batch(&document(&page), "2023:fantasy.v2", false).expect("table");
        assert_eq!(batch.num_rows(), 2);
    }

    #[test]
    fn missing_table_is_not_found() {
        let error = table_batch(&document(FANTASY), "passing", false).expect_err("absent");
        assert!(matches!(error, HarvestError::NotFound { .. }));
    }

    #[test]
    fn header_row_without_thead_is_detected() {
        let batch = table_batch(
            &document(
                r#"<table id="ranks"><tr><th>Rk</th><th>Rk</th></tr><tr><td>1</td><td>2</td></tr></table>"#,
            ),
            "ranks",
            false,
        )
        .expect("table");
        assert_eq!(batch.columns(), ["rk", "rk.1"]);
        assert_eq!(batch.num_rows(), 1);
    }
}
