//! CSV ingestion and serialization for bulk jobs.
//!
//! Input files are streamed through a buffered, record-aware reader that
//! handles quoted fields with embedded commas and newlines, strips a leading
//! byte-order mark, and skips empty lines. Batches are written back out as
//! CSV for upload.

mod record_reader;
mod record_writer;

pub use record_reader::{parse_records, read_record_batch, Record, RecordBatch};
pub use record_writer::write_batch_csv;
