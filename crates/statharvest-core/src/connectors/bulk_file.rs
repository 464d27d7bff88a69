//! Connector for published bulk CSV files, optionally gzip-compressed.

use std::collections::BTreeMap;
use std::io::Read;
use std::sync::Arc;
use std::time::Duration;

use flate2::read::GzDecoder;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::http::{status_error, transport_error};
use super::{BatchStream, Connector, ConnectorArgs, Fetched};
use crate::domain::{unique_column_names, Cell, Endpoint, RecordBatch};
use crate::error::HarvestError;
use crate::http_client::{BodyReader, HttpClient, HttpRequest, ReqwestHttpClient};
use crate::retry::RetryPolicy;

/// Field values read as missing.
const NULL_MARKERS: [&str; 2] = ["NA", "NaN"];

/// Body compression of a bulk file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    /// Gzip when the URL path ends in `.gz`.
    #[default]
    Auto,
    Gzip,
    None,
}

impl Compression {
    fn is_gzip(self, url: &str) -> bool {
        match self {
            Self::Gzip => true,
            Self::None => false,
            Self::Auto => {
                let path = url.split(['?', '#']).next().unwrap_or(url);
                path.ends_with(".gz")
            }
        }
    }
}

/// Streams a remote CSV into record batches.
///
/// Opening the body is retried; once rows are flowing, read errors end the
/// stream. With `chunk_rows` set the file is delivered as a [`BatchStream`]
/// so memory stays bounded by one chunk.
#[derive(Debug)]
pub struct BulkFileConnector {
    client: Arc<dyn HttpClient>,
    headers: BTreeMap<String, String>,
    timeout: Duration,
    retry: RetryPolicy,
    compression: Compression,
    chunk_rows: Option<usize>,
}

impl BulkFileConnector {
    pub fn new(args: &ConnectorArgs) -> Self {
        Self {
            client: args
                .http_client
                .clone()
                .unwrap_or_else(|| Arc::new(ReqwestHttpClient::new())),
            headers: args.headers.clone(),
            timeout: args.timeout,
            retry: args.retry.clone(),
            compression: args.compression,
            chunk_rows: args.chunk_rows.filter(|rows| *rows > 0),
        }
    }

    fn open_body(&self, url: &str) -> Result<BodyReader, HarvestError> {
        let request = HttpRequest::get(url)
            .with_headers(&self.headers)
            .with_timeout_ms(u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX));

        let body = self.retry.run(&format!("GET {url}"), || {
            let (status, body) = self
                .client
                .open_stream(&request)
                .map_err(|error| transport_error(url, &error))?;
            if !(200..300).contains(&status) {
                return Err(status_error(url, status, &self.retry));
            }
            Ok(body)
        })?;

        if self.compression.is_gzip(url) {
            debug!(url, "decompressing gzip body");
            Ok(Box::new(GzDecoder::new(body)))
        } else {
            Ok(body)
        }
    }
}

impl Connector for BulkFileConnector {
    fn name(&self) -> &str {
        "bulk_file"
    }

    fn fetch(&mut self, endpoint: &Endpoint) -> Result<Fetched, HarvestError> {
        let url = endpoint.url();
        info!(url = %url, chunk_rows = ?self.chunk_rows, "downloading bulk file");
        let mut chunks = CsvChunks::open(self.open_body(&url)?, self.chunk_rows)?;

        if self.chunk_rows.is_some() {
            return Ok(Fetched::Chunks(Box::new(chunks)));
        }
        let batch = match chunks.next() {
            Some(batch) => batch?,
            None => RecordBatch::with_columns(chunks.columns.clone())?,
        };
        debug!(url = %url, rows = batch.num_rows(), "bulk file loaded");
        Ok(Fetched::Table(batch))
    }
}

struct CsvChunks {
    records: csv::StringRecordsIntoIter<Box<dyn Read + Send>>,
    columns: Vec<String>,
    chunk_rows: Option<usize>,
    finished: bool,
}

impl CsvChunks {
    fn open(body: BodyReader, chunk_rows: Option<usize>) -> Result<Self, HarvestError> {
        let mut reader = csv::ReaderBuilder::new().from_reader(body);
        let columns = unique_column_names(reader.headers()?.iter().map(String::from));
        Ok(Self {
            records: reader.into_records(),
            columns,
            chunk_rows,
            finished: false,
        })
    }

    fn next_chunk(&mut self) -> Result<Option<RecordBatch>, HarvestError> {
        let limit = self.chunk_rows.unwrap_or(usize::MAX);
        let mut rows = Vec::new();
        while rows.len() < limit {
            match self.records.next() {
                Some(record) => rows.push(record?.iter().map(parse_field).collect()),
                None => {
                    self.finished = true;
                    break;
                }
            }
        }
        if rows.is_empty() && self.chunk_rows.is_some() {
            return Ok(None);
        }
        RecordBatch::new(self.columns.clone(), rows).map(Some)
    }
}

impl Iterator for CsvChunks {
    type Item = Result<RecordBatch, HarvestError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        match self.next_chunk() {
            Ok(batch) => batch.map(Ok),
            Err(error) => {
                self.finished = true;
                Some(Err(error))
            }
        }
    }
}

fn parse_field(raw: &str) -> Cell {
    if NULL_MARKERS.contains(&raw.trim()) {
        return Cell::Null;
    }
    Cell::infer(raw)
}

/// Collects a chunked fetch into one batch.
pub fn collect_stream(stream: BatchStream) -> Result<RecordBatch, HarvestError> {
    let batches = stream.collect::<Result<Vec<_>, _>>()?;
    Ok(RecordBatch::concat(batches))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http_client::{FixtureHttpClient, HttpResponse};
    use flate2::write::GzEncoder;
    use std::io::Write;

    const PBP: &str = "game_id,play_id,posteam,yards_gained,epa\n\
        2023_01_DET_KC,1,KC,5,0.31\n\
        2023_01_DET_KC,2,KC,-2,NA\n\
        2023_01_DET_KC,3,DET,12,1.05\n\
        2023_01_DET_KC,4,DET,0,-0.4\n\
        2023_01_DET_KC,5,KC,7,0.2\n";

    fn gzip(text: &str) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(text.as_bytes()).expect("compress");
        encoder.finish().expect("finish gzip")
    }

    fn connector(client: FixtureHttpClient, chunk_rows: Option<usize>) -> BulkFileConnector {
        BulkFileConnector::new(&ConnectorArgs {
            retry: RetryPolicy::fixed(Duration::ZERO, 1),
            chunk_rows,
            http_client: Some(Arc::new(client) as Arc<dyn HttpClient>),
            ..ConnectorArgs::default()
        })
    }

    #[test]
    fn gzip_csv_is_decoded_into_typed_table() {
        let url = "https://files.test/pbp/play_by_play_2023.csv.gz";
        let client = FixtureHttpClient::new().with_response(url, HttpResponse::ok(gzip(PBP)));
        let mut bulk = connector(client, None);

        let Fetched::Table(batch) = bulk
            .fetch(&Endpoint::new("https://files.test", "pbp/play_by_play_2023.csv.gz"))
            .expect("fetch")
        else {
            panic!("expected a single table");
        };

        assert_eq!(batch.num_rows(), 5);
        assert_eq!(batch.get(1, "yards_gained"), Some(&Cell::Int(-2)));
        assert_eq!(batch.get(1, "epa"), Some(&Cell::Null));
        assert_eq!(batch.get(2, "posteam"), Some(&Cell::text("DET")));
    }

    #[test]
    fn chunked_fetch_bounds_each_batch() {
        let url = "https://files.test/pbp.csv";
        let client = FixtureHttpClient::new().with_response(url, HttpResponse::ok(PBP));
        let mut bulk = connector(client, Some(2));

        let Fetched::Chunks(stream) = bulk
            .fetch(&Endpoint::new("https://files.test", "pbp.csv"))
            .expect("fetch")
        else {
            panic!("expected chunks");
        };
        let sizes: Vec<usize> = stream
            .map(|chunk| chunk.expect("chunk").num_rows())
            .collect();
        assert_eq!(sizes, [2, 2, 1]);
    }

    #[test]
    fn missing_file_is_a_non_retryable_network_error() {
        let client = Arc::new(FixtureHttpClient::new());
        let mut bulk = BulkFileConnector::new(&ConnectorArgs {
            retry: RetryPolicy::fixed(Duration::ZERO, 3),
            http_client: Some(client.clone() as Arc<dyn HttpClient>),
            ..ConnectorArgs::default()
        });

        let error = bulk
            .fetch(&Endpoint::new("https://files.test", "missing.csv.gz"))
            .expect_err("404");
        assert!(matches!(error, HarvestError::Network { retryable: false, .. }));
        assert_eq!(client.requested_urls().len(), 1);
    }

    #[test]
    fn collect_stream_concatenates_chunks() {
        let url = "https://files.test/pbp.csv";
        let client = FixtureHttpClient::new().with_response(url, HttpResponse::ok(PBP));
        let mut bulk = connector(client, Some(3));
        let Fetched::Chunks(stream) = bulk
            .fetch(&Endpoint::new("https://files.test", "pbp.csv"))
            .expect("fetch")
        else {
            panic!("expected chunks");
        };
        assert_eq!(collect_stream(stream).expect("collect").num_rows(), 5);
    }
}
