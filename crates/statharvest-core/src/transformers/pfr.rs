use tracing::debug;

use super::ops::{self, RowPredicate};
use super::Transformer;
use crate::domain::{Cell, DType, RecordBatch};
use crate::error::HarvestError;

const FANTASY_SCORING_COLUMNS: [&str; 5] = [
    "fantasy_fantpt",
    "fantasy_ppr",
    "fantasy_dkpt",
    "fantasy_fdpt",
    "fantasy_vbd",
];

const YEAR_BY_YEAR_RENAMES: [(&str, &str); 7] = [
    ("player", "player_name"),
    ("fumbles_fmb", "fumbles"),
    ("fumbles_fl", "fumbles_lost"),
    ("games_g", "games"),
    ("games_gs", "games_started"),
    ("fantpos", "pos"),
    ("year_", "year"),
];

const YEAR_BY_YEAR_COLUMNS: [&str; 27] = [
    "rk",
    "player_name",
    "pos",
    "year",
    "age",
    "tm",
    "games",
    "games_started",
    "passing_cmp",
    "passing_att",
    "passing_yds",
    "passing_td",
    "passing_int",
    "rushing_att",
    "rushing_yds",
    "rushing_y/a",
    "rushing_td",
    "receiving_tgt",
    "receiving_rec",
    "receiving_yds",
    "receiving_y/r",
    "receiving_td",
    "scoring_2pm",
    "fumbles",
    "fumbles_lost",
    "fantasy_posrank",
    "fantasy_ovrank",
];

const GAME_BY_GAME_RENAMES: [(&str, &str); 3] = [
    ("fumbles_fmb", "fumbles"),
    ("fumbles_fl", "fumbles_lost"),
    ("game_date", "date"),
];

const GAME_BY_GAME_COLUMNS: [&str; 27] = [
    "date",
    "week",
    "player_id",
    "player_name",
    "pos",
    "year",
    "age",
    "tm",
    "home/away",
    "opp",
    "result",
    "passing_cmp",
    "passing_att",
    "passing_yds",
    "passing_td",
    "passing_int",
    "rushing_att",
    "rushing_yds",
    "rushing_y/a",
    "rushing_td",
    "receiving_tgt",
    "receiving_rec",
    "receiving_yds",
    "receiving_y/r",
    "receiving_td",
    "fumbles",
    "fumbles_lost",
];

/// Season fantasy table from the football reference site.
#[derive(Debug, Clone, Copy, Default)]
pub struct YearByYearTransformer;

impl Transformer for YearByYearTransformer {
    fn name(&self) -> &str {
        "pfr_year_by_year"
    }

    fn transform(&self, batch: RecordBatch) -> Result<RecordBatch, HarvestError> {
        debug!(rows = batch.num_rows(), "transforming year-by-year table");
        let batch = ops::drop_columns(batch, &FANTASY_SCORING_COLUMNS);
        let batch = ops::rename(batch, &YEAR_BY_YEAR_RENAMES);
        let batch = batch.map_column("player_name", strip_honors);
        let batch = ops::drop_rows(batch, "rk", &RowPredicate::Equals(String::from("Rk")));
        ops::reindex(
            &batch,
            &YEAR_BY_YEAR_COLUMNS,
            &Cell::Int(0),
            &[("year", DType::Int)],
        )
    }

    fn output_columns(&self) -> &[&str] {
        &YEAR_BY_YEAR_COLUMNS
    }
}

/// Drops the Pro Bowl (`*`) and All-Pro (`+`) markers after a player's name.
fn strip_honors(cell: &Cell) -> Cell {
    match cell {
        Cell::Text(name) => {
            let name = name.split('*').next().unwrap_or_default();
            let name = name.split('+').next().unwrap_or_default();
            Cell::text(name.trim())
        }
        other => other.clone(),
    }
}

/// Per-game log table from a player's page.
#[derive(Debug, Clone, Copy, Default)]
pub struct GameByGameTransformer;

impl Transformer for GameByGameTransformer {
    fn name(&self) -> &str {
        "pfr_game_by_game"
    }

    fn transform(&self, batch: RecordBatch) -> Result<RecordBatch, HarvestError> {
        debug!(rows = batch.num_rows(), "transforming game-by-game table");
        let batch = match location_column(&batch) {
            Some(column) => batch.rename_column(&column, "home/away"),
            None => batch,
        };
        let batch = batch.map_column("home/away", |cell| match cell {
            Cell::Null => Cell::text("Home"),
            Cell::Text(marker) if marker == "@" => Cell::text("Away"),
            other => other.clone(),
        });
        let batch = ops::rename(batch, &GAME_BY_GAME_RENAMES);
        let batch = ops::drop_rows(batch, "date", &RowPredicate::IsNull);
        let batch = ops::drop_rows(batch, "date", &RowPredicate::Equals(String::from("Date")));
        ops::reindex(
            &batch,
            &GAME_BY_GAME_COLUMNS,
            &Cell::Int(0),
            &[("year", DType::Int)],
        )
    }

    fn output_columns(&self) -> &[&str] {
        &GAME_BY_GAME_COLUMNS
    }
}

/// The venue column is headerless: `game_location` when the page labels it,
/// otherwise an unnamed column holding only `@` markers.
fn location_column(batch: &RecordBatch) -> Option<String> {
    if batch.has_column("game_location") {
        return Some(String::from("game_location"));
    }
    batch
        .columns()
        .iter()
        .filter(|name| name.starts_with("unnamed"))
        .find(|name| {
            batch.column_values(name).is_some_and(|values| {
                values.iter().any(|cell| cell.as_str() == Some("@"))
                    && values
                        .iter()
                        .all(|cell| cell.is_null() || cell.as_str() == Some("@"))
            })
        })
        .cloned()
}
