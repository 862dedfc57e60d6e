//! Serializes a record batch back to CSV for upload.

use csv::{Terminator, WriterBuilder};

use crate::error::AppError;
use crate::streaming::RecordBatch;

/// Writes the batch as CSV: header row first, then one LF-terminated line per
/// record. Fields missing from a record are written as empty values.
pub fn write_batch_csv(batch: &RecordBatch) -> Result<Vec<u8>, AppError> {
    let mut writer = WriterBuilder::new()
        .has_headers(false)
        .terminator(Terminator::Any(b'\n'))
        .from_writer(Vec::with_capacity(batch.len() * 64));

    writer
        .write_record(&batch.headers)
        .map_err(|e| AppError::Internal(format!("Failed to serialize CSV header: {}", e)))?;

    for record in &batch.records {
        let row = batch
            .headers
            .iter()
            .map(|h| record.get(h).map(String::as_str).unwrap_or(""));
        writer
            .write_record(row)
            .map_err(|e| AppError::Internal(format!("Failed to serialize record: {}", e)))?;
    }

    writer
        .into_inner()
        .map_err(|e| AppError::Internal(format!("Failed to flush CSV writer: {}", e)))
}
