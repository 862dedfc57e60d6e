//! Streaming CSV ingestion into an in-memory record batch.
//!
//! The source file is consumed through a buffered reader on a blocking
//! worker thread, so only one buffer's worth of raw bytes is held at a time
//! while parsed rows accumulate in the batch. The batch is returned only
//! once the reader reaches end-of-input.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, BufReader, ErrorKind, Read};
use std::path::Path;

use csv::{ReaderBuilder, StringRecord};

use crate::error::AppError;

/// Read buffer size (64 KB).
const BUFFER_SIZE: usize = 64 * 1024;

/// Unicode byte-order mark as it appears after UTF-8 decoding.
const BOM_CHAR: char = '\u{feff}';

/// UTF-8 encoding of the byte-order mark.
const BOM_BYTES: [u8; 3] = [0xEF, 0xBB, 0xBF];

/// One CSV row keyed by header name.
pub type Record = BTreeMap<String, String>;

/// Every data row of a CSV file, in file order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordBatch {
    /// Header names in their original column order.
    pub headers: Vec<String>,
    /// One record per non-empty data row.
    pub records: Vec<Record>,
}

impl RecordBatch {
    /// Number of records in the batch.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns true if the batch has no records.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Reads a CSV file from disk into a fully materialized [`RecordBatch`].
///
/// # Errors
///
/// - `AppError::PathNotFound` if the file does not exist
/// - `AppError::NotUtf8` if the content is not valid UTF-8
/// - `AppError::CsvInvalid` for a missing header, inconsistent rows or a
///   quoted field that is never closed
pub async fn read_record_batch(path: &Path) -> Result<RecordBatch, AppError> {
    let path = path.to_owned();

    tokio::task::spawn_blocking(move || read_record_batch_blocking(&path))
        .await
        .map_err(|e| AppError::Internal(format!("CSV reader task failed: {}", e)))?
}

fn read_record_batch_blocking(path: &Path) -> Result<RecordBatch, AppError> {
    let file = File::open(path).map_err(|e| match e.kind() {
        ErrorKind::NotFound => AppError::PathNotFound(path.to_owned()),
        _ => AppError::Internal(format!("Failed to open CSV file: {}", e)),
    })?;

    let batch = parse_records(BufReader::with_capacity(BUFFER_SIZE, file))?;

    if batch.headers.is_empty() {
        return Err(AppError::CsvInvalid("CSV file has no header row".to_string()));
    }

    tracing::debug!(
        source = %path.display(),
        columns = batch.headers.len(),
        rows = batch.len(),
        "CSV ingestion complete"
    );

    Ok(batch)
}

/// Parses CSV content with a header row into a [`RecordBatch`].
///
/// Empty lines are skipped and a leading byte-order mark is removed from the
/// first header. Input with no header at all yields an empty batch.
pub fn parse_records<R: Read>(reader: R) -> Result<RecordBatch, AppError> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(false)
        .from_reader(QuoteTracker::new(reader));

    let header_row = match reader.headers().cloned() {
        Ok(row) => row,
        Err(err) => return Err(read_failure(&reader, err)),
    };
    let headers: Vec<String> = header_row
        .iter()
        .enumerate()
        .map(|(i, name)| {
            if i == 0 {
                name.trim_start_matches(BOM_CHAR).to_string()
            } else {
                name.to_string()
            }
        })
        .collect();

    let mut records = Vec::new();
    let mut row = StringRecord::new();
    loop {
        match reader.read_record(&mut row) {
            Ok(true) => records.push(to_record(&headers, &row)),
            Ok(false) => break,
            Err(err) => return Err(read_failure(&reader, err)),
        }
    }

    reader.get_ref().ensure_quotes_closed()?;

    if headers.iter().all(|h| h.is_empty()) {
        return Ok(RecordBatch::default());
    }

    Ok(RecordBatch { headers, records })
}

/// An open quote swallows the rest of the file, so when the parser fails at
/// end-of-input the quote is the cause worth reporting.
fn read_failure<R: Read>(reader: &csv::Reader<QuoteTracker<R>>, err: csv::Error) -> AppError {
    match reader.get_ref().ensure_quotes_closed() {
        Err(unclosed) => unclosed,
        Ok(()) => map_csv_error(err),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum QuoteState {
    FieldStart,
    Unquoted,
    Quoted,
    /// A quote seen inside a quoted field: either a close or half of `""`.
    QuoteInQuoted,
}

/// Follows field quoting over the raw bytes handed to the CSV parser.
///
/// The `csv` crate accepts a quoted field left open at end-of-input as a
/// field running to EOF; this records where such a field started.
struct QuoteTracker<R> {
    inner: R,
    state: QuoteState,
    offset: usize,
    line: u64,
    quote_line: u64,
    at_eof: bool,
}

impl<R> QuoteTracker<R> {
    fn new(inner: R) -> Self {
        Self {
            inner,
            state: QuoteState::FieldStart,
            offset: 0,
            line: 1,
            quote_line: 0,
            at_eof: false,
        }
    }

    fn observe(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            let in_bom = self.offset < BOM_BYTES.len() && byte == BOM_BYTES[self.offset];
            self.offset += 1;
            if byte == b'\n' {
                self.line += 1;
            }
            if in_bom && self.state == QuoteState::FieldStart {
                continue;
            }

            self.state = match (self.state, byte) {
                (QuoteState::Quoted, b'"') => QuoteState::QuoteInQuoted,
                (QuoteState::Quoted, _) => QuoteState::Quoted,
                (QuoteState::QuoteInQuoted, b'"') => QuoteState::Quoted,
                (QuoteState::FieldStart, b'"') => {
                    self.quote_line = self.line;
                    QuoteState::Quoted
                }
                (_, b',' | b'\n' | b'\r') => QuoteState::FieldStart,
                _ => QuoteState::Unquoted,
            };
        }
    }

    fn ensure_quotes_closed(&self) -> Result<(), AppError> {
        if self.at_eof && self.state == QuoteState::Quoted {
            return Err(AppError::CsvInvalid(format!(
                "line {}: quoted field is never closed",
                self.quote_line
            )));
        }
        Ok(())
    }
}

impl<R: Read> Read for QuoteTracker<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        if n == 0 && !buf.is_empty() {
            self.at_eof = true;
        }
        self.observe(&buf[..n]);
        Ok(n)
    }
}

fn to_record(headers: &[String], row: &StringRecord) -> Record {
    headers
        .iter()
        .cloned()
        .zip(row.iter().map(str::to_string))
        .collect()
}

fn map_csv_error(err: csv::Error) -> AppError {
    match err.kind() {
        csv::ErrorKind::Utf8 { .. } => AppError::NotUtf8,
        csv::ErrorKind::UnequalLengths {
            pos,
            expected_len,
            len,
        } => {
            let line = pos.as_ref().map(|p| p.line()).unwrap_or_default();
            AppError::CsvInvalid(format!(
                "line {}: expected {} fields, found {}",
                line, expected_len, len
            ))
        }
        csv::ErrorKind::Io(e) => AppError::Internal(format!("Failed to read CSV: {}", e)),
        _ => AppError::CsvInvalid(err.to_string()),
    }
}
