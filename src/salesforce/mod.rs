//! Salesforce Bulk API v2 connection layer.
//!
//! - **Credentials** held in `secrecy::SecretString`, never logged
//! - **Ingest client** covering job open, upload, close, status and results
//! - **`BulkApi` trait** as the seam commands depend on, so orchestration can
//!   be exercised against a fake connection

pub mod bulk_ingest_v2;
pub mod client;

use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::streaming::RecordBatch;

pub use bulk_ingest_v2::{
    BulkIngestJobInfo, BulkIngestV2Client, BulkOperation, JobDescriptor, JobResults,
};
pub use client::{connect, OrgCredentials};

/// API version used when none is configured.
pub const DEFAULT_API_VERSION: &str = "v60.0";

/// Lifecycle state of a Bulk API v2 job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BulkJobState {
    /// Created and accepting data.
    Open,
    /// All data uploaded; queued for processing.
    UploadComplete,
    /// Being processed.
    InProgress,
    /// Finished processing.
    JobComplete,
    /// Failed as a whole.
    Failed,
    /// Aborted by a user or the service.
    Aborted,
    /// A state this client does not know, kept verbatim.
    #[serde(untagged)]
    Other(String),
}

impl BulkJobState {
    /// Returns true once the job will no longer change state.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            BulkJobState::JobComplete | BulkJobState::Failed | BulkJobState::Aborted
        )
    }
}

/// Boxed future returned by [`BulkApi`] methods.
pub type BulkFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, AppError>> + Send + 'a>>;

/// Remote operations a bulk ingest job goes through.
///
/// The HTTP client implements this for real orgs; tests provide fakes that
/// record the calls they receive.
pub trait BulkApi: Send + Sync {
    /// Creates the job on the server, leaving it open for data.
    fn open_job<'a>(&'a self, descriptor: &'a JobDescriptor) -> BulkFuture<'a, BulkIngestJobInfo>;

    /// Uploads the complete batch as the job's data.
    fn upload_data<'a>(&'a self, job_id: &'a str, batch: &'a RecordBatch) -> BulkFuture<'a, ()>;

    /// Marks the upload complete so the server starts processing.
    fn close_job<'a>(&'a self, job_id: &'a str) -> BulkFuture<'a, BulkIngestJobInfo>;

    /// Fetches a point-in-time snapshot of the job.
    fn check_job<'a>(&'a self, job_id: &'a str) -> BulkFuture<'a, BulkIngestJobInfo>;

    /// Fetches successful, failed and unprocessed records.
    fn get_all_results<'a>(&'a self, job_id: &'a str) -> BulkFuture<'a, JobResults>;
}
