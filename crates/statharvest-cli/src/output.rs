use std::io::{self, Write};

use statharvest_core::RecordBatch;

use crate::cli::BatchFormat;
use crate::error::CliError;

pub fn render_batch(batch: &RecordBatch, format: BatchFormat) -> Result<(), CliError> {
    let stdout = io::stdout();
    write_batch(stdout.lock(), batch, format)
}

pub fn render_json<T: serde::Serialize>(value: &T) -> Result<(), CliError> {
    let payload = serde_json::to_string_pretty(value)?;
    println!("{payload}");
    Ok(())
}

pub fn write_batch<W: Write>(
    mut writer: W,
    batch: &RecordBatch,
    format: BatchFormat,
) -> Result<(), CliError> {
    match format {
        BatchFormat::Csv => {
            let mut csv = csv::Writer::from_writer(writer);
            csv.write_record(batch.columns())?;
            for row in batch.rows() {
                csv.write_record(row.iter().map(ToString::to_string))?;
            }
            csv.flush()?;
        }
        BatchFormat::Json => {
            serde_json::to_writer_pretty(&mut writer, &batch.to_json_records())?;
            writeln!(writer)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use statharvest_core::Cell;

    fn batch() -> RecordBatch {
        RecordBatch::new(
            vec![String::from("player"), String::from("yds")],
            vec![vec![Cell::text("Josh Allen"), Cell::Int(4306)], vec![Cell::text("Hurts"), Cell::Null]],
        )
        .unwrap()
    }

    #[test]
    fn csv_output_writes_header_then_rows() {
        let mut buffer = Vec::new();
        write_batch(&mut buffer, &batch(), BatchFormat::Csv).unwrap();
        assert_eq!(String::from_utf8(buffer).unwrap(), "player,yds\nJosh Allen,4306\nHurts,\n");
    }

    #[test]
    fn json_output_is_an_array_of_records() {
        let mut buffer = Vec::new();
        write_batch(&mut buffer, &batch(), BatchFormat::Json).unwrap();
        let parsed: serde_json::Value = serde_json::from_slice(&buffer).unwrap();
        assert_eq!(parsed[0]["yds"], 4306);
        assert!(parsed[1]["yds"].is_null());
    }
}
