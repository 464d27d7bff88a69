use regex::Regex;
use tracing::debug;

use super::ops::{self, text_of, RowPredicate};
use super::Transformer;
use crate::domain::{Cell, DType, RecordBatch};
use crate::error::HarvestError;

const RANKINGS_COLUMNS: [&str; 9] = [
    "rk",
    "as_of_date",
    "player_name",
    "pos",
    "team",
    "opp",
    "matchup_rating",
    "start_sit_rating",
    "projected_fantasy_points",
];

const PROJECTIONS_COLUMNS: [&str; 17] = [
    "as_of_date",
    "player_name",
    "pos",
    "team",
    "receiving_rec",
    "receiving_yds",
    "receiving_tds",
    "rushing_att",
    "rushing_yds",
    "rushing_tds",
    "passing_att",
    "passing_cmp",
    "passing_yds",
    "passing_tds",
    "passing_ints",
    "fumbles_lost",
    "projected_fantasy_points",
];

const DRAFT_COLUMNS: [&str; 9] = [
    "rk",
    "player_name",
    "pos",
    "pos_rk",
    "team",
    "bye",
    "strength_of_schedule",
    "ecr_vs_adp",
    "as_of_date",
];

/// Weekly start/sit rankings.
#[derive(Debug, Clone, Copy, Default)]
pub struct RankingsTransformer;

impl Transformer for RankingsTransformer {
    fn name(&self) -> &str {
        "fantasy_pros_rankings"
    }

    fn transform(&self, batch: RecordBatch) -> Result<RecordBatch, HarvestError> {
        debug!(rows = batch.num_rows(), "transforming rankings");
        let batch = ops::drop_columns(batch, &["wsis"]);
        let batch = ops::rename(
            batch,
            &[
                ("player name", "player_name"),
                ("matchup (?)", "matchup_rating"),
                ("start/sit", "start_sit_rating"),
                ("proj. fpts", "projected_fantasy_points"),
            ],
        );
        let batch = ops::drop_rows(batch, "matchup_rating", &RowPredicate::Equals(String::from("-")));
        let batch = batch.map_column("matchup_rating", leading_integer);
        let batch = if batch.has_column("player_name") {
            let batch = ops::derive(batch, "team", |batch, row| {
                text_of(batch.get(row, "player_name"))
                    .and_then(|name| parenthesized_team(&name))
                    .map_or(Cell::Null, Cell::text)
            });
            batch.map_column("player_name", |cell| match cell {
                Cell::Text(name) => Cell::text(name.split('(').next().unwrap_or_default().trim()),
                other => other.clone(),
            })
        } else {
            batch
        };
        ops::reindex(
            &batch,
            &RANKINGS_COLUMNS,
            &Cell::Int(0),
            &[("rk", DType::Int), ("matchup_rating", DType::Int)],
        )
    }

    fn output_columns(&self) -> &[&str] {
        &RANKINGS_COLUMNS
    }
}

/// `Josh Allen (BUF)` to `BUF`, using the last parenthesized group.
fn parenthesized_team(name: &str) -> Option<String> {
    let (_, tail) = name.rsplit_once('(')?;
    let team = tail.split(')').next().unwrap_or_default().trim();
    (!team.is_empty()).then(|| team.to_string())
}

/// Integer value of the first whitespace-separated token.
fn leading_integer(cell: &Cell) -> Cell {
    match cell {
        Cell::Text(text) => text
            .split_whitespace()
            .next()
            .map_or(Cell::Null, |token| Cell::infer(token).coerce(DType::Int)),
        other => other.coerce(DType::Int),
    }
}

/// Weekly stat projections.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProjectionsTransformer;

impl Transformer for ProjectionsTransformer {
    fn name(&self) -> &str {
        "fantasy_pros_projections"
    }

    fn transform(&self, batch: RecordBatch) -> Result<RecordBatch, HarvestError> {
        debug!(rows = batch.num_rows(), "transforming projections");
        let batch = ops::rename(
            batch,
            &[
                ("player", "player_name"),
                ("misc_fpts", "projected_fantasy_points"),
                ("misc_fl", "fumbles_lost"),
            ],
        );
        let batch = ops::derive(batch, "team", |batch, row| {
            text_of(batch.get(row, "player_name"))
                .and_then(|name| name.rsplit_once(' ').map(|(_, team)| team.trim().to_string()))
                .map_or(Cell::Null, Cell::text)
        });
        let batch = batch.map_column("player_name", |cell| match cell {
            Cell::Text(name) => match name.trim().rsplit_once(' ') {
                Some((player, _)) => Cell::text(player.trim()),
                None => cell.clone(),
            },
            other => other.clone(),
        });
        ops::reindex(&batch, &PROJECTIONS_COLUMNS, &Cell::Int(0), &[])
    }

    fn output_columns(&self) -> &[&str] {
        &PROJECTIONS_COLUMNS
    }
}

/// Season draft cheat sheet.
#[derive(Debug, Clone, Copy, Default)]
pub struct DraftTransformer;

impl Transformer for DraftTransformer {
    fn name(&self) -> &str {
        "fantasy_pros_draft"
    }

    fn transform(&self, batch: RecordBatch) -> Result<RecordBatch, HarvestError> {
        debug!(rows = batch.num_rows(), "transforming draft rankings");
        let team_pattern = compile(r"\((\w+)\)")?;
        let name_pattern = compile(r"^(.*) \(\w+\)")?;
        let letters = compile(r"([A-Za-z]+)")?;

        let batch = ops::rename(
            batch,
            &[
                ("player name", "player_name"),
                ("sos", "strength_of_schedule"),
                ("ecr vs adp", "ecr_vs_adp"),
                ("pos", "pos_rk"),
            ],
        );
        let batch = ops::drop_rows(batch, "player_name", &RowPredicate::IsNull);
        let batch = ops::derive(batch, "team", |batch, row| {
            capture(&team_pattern, text_of(batch.get(row, "player_name")))
        });
        let batch = batch.map_column("player_name", |cell| {
            capture(&name_pattern, text_of(Some(cell)))
        });
        let batch = batch.map_column("strength_of_schedule", |cell| match cell {
            Cell::Text(text) => match text.split_whitespace().next() {
                Some("-") | None => Cell::Int(0),
                Some(token) => Cell::infer(token).coerce(DType::Int),
            },
            other => other.coerce(DType::Int),
        });
        let batch = ops::derive(batch, "pos", |batch, row| {
            capture(&letters, text_of(batch.get(row, "pos_rk")))
        });
        ops::reindex(
            &batch,
            &DRAFT_COLUMNS,
            &Cell::Int(0),
            &[("rk", DType::Int), ("strength_of_schedule", DType::Int)],
        )
    }

    fn output_columns(&self) -> &[&str] {
        &DRAFT_COLUMNS
    }
}

fn compile(pattern: &str) -> Result<Regex, HarvestError> {
    Regex::new(pattern).map_err(|error| HarvestError::config(format!("bad pattern {pattern}: {error}")))
}

fn capture(pattern: &Regex, text: Option<String>) -> Cell {
    text.as_deref()
        .and_then(|text| pattern.captures(text))
        .and_then(|captures| captures.get(1))
        .map_or(Cell::Null, |value| Cell::text(value.as_str().trim()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn batch(columns: &[&str], rows: Vec<Vec<Cell>>) -> RecordBatch {
        RecordBatch::new(columns.iter().map(|c| (*c).to_string()).collect(), rows)
            .expect("batch")
    }

    #[test]
    fn rankings_split_team_and_parse_matchup() {
        let input = batch(
            &["rk", "wsis", "player name", "opp", "matchup (?)", "start/sit", "proj. fpts", "as_of_date"],
            vec![
                vec![Cell::Int(1), Cell::Null, "Josh Allen (BUF)".into(), "vs. NYG".into(), "4 out of 5 stars".into(), "A+".into(), Cell::Float(23.4), "2023-10-09".into()],
                vec![Cell::Int(2), Cell::Null, "Bye Week (KC)".into(), "-".into(), "-".into(), "-".into(), Cell::Null, "2023-10-09".into()],
            ],
        );

        let output = RankingsTransformer.transform(input).expect("transform");
        assert_eq!(output.columns(), RANKINGS_COLUMNS);
        assert_eq!(output.num_rows(), 1);
        assert_eq!(output.get(0, "player_name"), Some(&Cell::text("Josh Allen")));
        assert_eq!(output.get(0, "team"), Some(&Cell::text("BUF")));
        assert_eq!(output.get(0, "matchup_rating"), Some(&Cell::Int(4)));
        assert_eq!(output.get(0, "pos"), Some(&Cell::Int(0)));
    }

    #[test]
    fn projections_take_team_from_last_token() {
        let input = batch(
            &["player", "misc_fpts", "misc_fl", "as_of_date"],
            vec![vec!["Amon-Ra St. Brown DET".into(), Cell::Float(17.2), Cell::Float(0.1), "2023-10-09".into()]],
        );
        let output = ProjectionsTransformer.transform(input).expect("transform");
        assert_eq!(output.get(0, "player_name"), Some(&Cell::text("Amon-Ra St. Brown")));
        assert_eq!(output.get(0, "team"), Some(&Cell::text("DET")));
        assert_eq!(output.get(0, "projected_fantasy_points"), Some(&Cell::Float(17.2)));
        assert_eq!(output.get(0, "passing_yds"), Some(&Cell::Int(0)));
    }

    #[test]
    fn draft_derives_position_and_schedule() {
        let input = batch(
            &["rk", "player name", "pos", "bye", "sos", "ecr vs adp"],
            vec![
                vec![Cell::Int(1), "Christian McCaffrey (SF)".into(), "RB1".into(), Cell::Int(9), "3 out of 5 stars".into(), "0".into()],
                vec![Cell::Int(2), "Tyreek Hill (MIA)".into(), "WR1".into(), Cell::Int(10), "-".into(), "+1".into()],
                vec![Cell::Null, Cell::Null, Cell::Null, Cell::Null, Cell::Null, Cell::Null],
            ],
        );
        let output = DraftTransformer.transform(input).expect("transform");
        assert_eq!(output.num_rows(), 2);
        assert_eq!(output.get(0, "pos"), Some(&Cell::text("RB")));
        assert_eq!(output.get(0, "pos_rk"), Some(&Cell::text("RB1")));
        assert_eq!(output.get(0, "team"), Some(&Cell::text("SF")));
        assert_eq!(output.get(0, "strength_of_schedule"), Some(&Cell::Int(3)));
        assert_eq!(output.get(1, "strength_of_schedule"), Some(&Cell::Int(0)));
        assert_eq!(output.get(1, "player_name"), Some(&Cell::text("Tyreek Hill")));
    }
}
