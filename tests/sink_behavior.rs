//! Behavior tests for CSV and database outputs.

use std::fs;

use serde_json::json;
use statharvest_core::config::DatabaseTarget;
use statharvest_core::connectors::SqlConnector;
use statharvest_core::sinks::{CsvSink, DatabaseSink, INGESTED_AT_COLUMN};
use statharvest_core::{
    Cell, ConnectorArgs, HarvestError, IfExists, QueryGuardrails, RecordBatch, Sink, TableRef,
    Warehouse, WarehouseConfig, WarehouseError,
};
use tempfile::tempdir;
use time::macros::date;

fn season(players: &[(&str, i64)]) -> RecordBatch {
    RecordBatch::new(
        vec![String::from("player_name"), String::from("passing_yds")],
        players
            .iter()
            .map(|(name, yards)| vec![Cell::text(*name), Cell::Int(*yards)])
            .collect(),
    )
    .expect("batch")
}

#[test]
fn when_two_batches_are_appended_then_the_file_has_one_header() {
    // Given: an empty output directory
    let dir = tempdir().unwrap();
    let mut sink = CsvSink::for_date(dir.path(), "year_by_year", date!(2023 - 10 - 09));

    // When: two batches are appended
    sink.accept(&season(&[("Josh Allen", 4306), ("Jalen Hurts", 3858)]), true)
        .unwrap();
    sink.accept(&season(&[("Patrick Mahomes", 4183)]), true).unwrap();

    // Then: one header line and every data row
    assert!(sink.path().ends_with("year_by_year_2023-10-09.csv"));
    let text = fs::read_to_string(sink.path()).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 4);
    assert_eq!(lines[0], "player_name,passing_yds");
    assert_eq!(text.matches("player_name").count(), 1);
}

#[test]
fn when_a_later_run_appends_then_rows_follow_the_header_on_disk() {
    // Given: a file written by an earlier run
    let dir = tempdir().unwrap();
    let day = date!(2023 - 10 - 09);
    let mut first = CsvSink::for_date(dir.path(), "rankings", day);
    first.accept(&season(&[("Josh Allen", 4306)]), false).unwrap();

    // When: a new sink appends a batch with the columns in another order
    let reordered = RecordBatch::new(
        vec![String::from("passing_yds"), String::from("player_name")],
        vec![vec![Cell::Int(3858), Cell::text("Jalen Hurts")]],
    )
    .unwrap();
    let mut second = CsvSink::for_date(dir.path(), "rankings", day);
    second.accept(&reordered, true).unwrap();

    // Then: the header is not repeated and values line up with it
    let text = fs::read_to_string(second.path()).unwrap();
    assert_eq!(text, "player_name,passing_yds\nJosh Allen,4306\nJalen Hurts,3858\n");
}

#[test]
fn when_a_write_does_not_append_then_the_file_is_replaced() {
    let dir = tempdir().unwrap();
    let mut sink = CsvSink::for_date(dir.path(), "draft", date!(2024 - 08 - 01));
    sink.accept(&season(&[("A", 1), ("B", 2)]), false).unwrap();
    sink.accept(&season(&[("C", 3)]), false).unwrap();

    let text = fs::read_to_string(sink.path()).unwrap();
    assert_eq!(text, "player_name,passing_yds\nC,3\n");
}

fn database_sink(home: &std::path::Path, mode: IfExists) -> Box<DatabaseSink> {
    let args = ConnectorArgs {
        warehouse: WarehouseConfig::in_home(home),
        ..ConnectorArgs::default()
    };
    Box::new(DatabaseSink::new(
        SqlConnector::new(&args),
        DatabaseTarget {
            table: TableRef::new("season").with_schema("raw"),
            mode,
            chunk_rows: Some(1),
        },
        "run-1",
    ))
}

fn count(home: &std::path::Path) -> serde_json::Value {
    let warehouse = Warehouse::open(WarehouseConfig::in_home(home)).unwrap();
    let result = warehouse
        .execute_query("SELECT count(*) FROM raw.season", QueryGuardrails::default(), false)
        .unwrap();
    result.rows[0][0].clone()
}

#[test]
fn when_database_mode_is_replace_then_each_run_starts_over_and_later_batches_append() {
    // Given: a warehouse in a temporary home
    let home = tempdir().unwrap();

    // When: two runs publish, each with two batches
    for _ in 0..2 {
        let mut sink = database_sink(home.path(), IfExists::Replace);
        sink.accept(&season(&[("Josh Allen", 4306), ("Jalen Hurts", 3858)]), false)
            .unwrap();
        sink.accept(&season(&[("Patrick Mahomes", 4183)]), true).unwrap();
        sink.finish().unwrap();
    }

    // Then: only the last run's three rows remain, stamped with ingested_at
    assert_eq!(count(home.path()), json!(3));
    let warehouse = Warehouse::open(WarehouseConfig::in_home(home.path())).unwrap();
    let typed = warehouse
        .execute_query(
            &format!("SELECT typeof({INGESTED_AT_COLUMN}) FROM raw.season LIMIT 1"),
            QueryGuardrails::default(),
            false,
        )
        .unwrap();
    assert_eq!(typed.rows[0][0], json!("TIMESTAMP"));
}

#[test]
fn when_database_mode_is_append_then_runs_accumulate() {
    let home = tempdir().unwrap();
    for _ in 0..2 {
        let mut sink = database_sink(home.path(), IfExists::Append);
        sink.accept(&season(&[("Josh Allen", 4306)]), false).unwrap();
        sink.finish().unwrap();
    }
    assert_eq!(count(home.path()), json!(2));
}

#[test]
fn when_database_mode_is_fail_then_an_existing_table_is_refused() {
    // Given: a table published by an earlier run
    let home = tempdir().unwrap();
    let mut first = database_sink(home.path(), IfExists::Fail);
    first.accept(&season(&[("Josh Allen", 4306)]), false).unwrap();
    first.finish().unwrap();

    // When: a second run publishes in fail mode
    let mut second = database_sink(home.path(), IfExists::Fail);
    let error = second
        .accept(&season(&[("Jalen Hurts", 3858)]), false)
        .unwrap_err();
    drop(second);

    // Then: the table is left untouched
    assert!(matches!(
        error,
        HarvestError::Warehouse(WarehouseError::TableExists { .. })
    ));
    assert_eq!(count(home.path()), json!(1));
}
