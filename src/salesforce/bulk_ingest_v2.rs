//! Salesforce Bulk API v2 ingest client.
//!
//! This module provides functionality to:
//! - Open bulk ingest jobs (insert, update, upsert, delete)
//! - Upload a record batch as the job's CSV data
//! - Close jobs so Salesforce starts processing
//! - Check job status
//! - Retrieve successful, failed and unprocessed records
//!
//! # Security
//!
//! - Raw CSV contents are never logged
//! - Auth headers and tokens are never logged
//! - Only HTTP method, path, and status codes are logged

use std::sync::Arc;

use reqwest::{Client, RequestBuilder, Response, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::info;
use url::Url;

use crate::error::AppError;
use crate::salesforce::{BulkApi, BulkFuture, BulkJobState};
use crate::streaming::{parse_records, write_batch_csv, Record, RecordBatch};

// ─────────────────────────────────────────────────────────────────────────────
// Public Types
// ─────────────────────────────────────────────────────────────────────────────

/// Bulk ingest operation type.
///
/// IMPORTANT: Uses `#[serde(rename_all = "lowercase")]` to match Salesforce API
/// which expects lowercase values ("insert", "update", "upsert", "delete").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BulkOperation {
    /// Insert new records.
    Insert,
    /// Update existing records by ID.
    Update,
    /// Insert or update records based on external ID field.
    Upsert,
    /// Delete records by ID.
    Delete,
}

/// Line ending of the uploaded CSV. Uploads are always written with LF.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LineEnding {
    LF,
}

/// Describes the job to open. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobDescriptor {
    object: String,
    operation: BulkOperation,
    /// Skipped when None because Salesforce rejects null values for this
    /// field on non-upsert operations.
    #[serde(skip_serializing_if = "Option::is_none")]
    external_id_field_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    assignment_rule_id: Option<String>,
    line_ending: LineEnding,
}

impl JobDescriptor {
    /// An upsert job matching rows on `external_id_field`.
    pub fn upsert(
        object: impl Into<String>,
        external_id_field: impl Into<String>,
        assignment_rule_id: Option<String>,
    ) -> Self {
        Self {
            object: object.into(),
            operation: BulkOperation::Upsert,
            external_id_field_name: Some(external_id_field.into()),
            assignment_rule_id,
            // Matches the terminator `write_batch_csv` emits.
            line_ending: LineEnding::LF,
        }
    }

    pub fn object(&self) -> &str {
        &self.object
    }

    pub fn operation(&self) -> BulkOperation {
        self.operation
    }

    pub fn external_id_field_name(&self) -> Option<&str> {
        self.external_id_field_name.as_deref()
    }

    pub fn assignment_rule_id(&self) -> Option<&str> {
        self.assignment_rule_id.as_deref()
    }
}

/// Snapshot of a Bulk API v2 ingest job.
///
/// Fields the service returns beyond the typed ones are kept in `extra` so
/// they survive presentation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkIngestJobInfo {
    /// Unique identifier for the job.
    pub id: String,
    /// Current state of the job.
    pub state: BulkJobState,
    /// The Salesforce object being processed.
    pub object: String,
    /// The operation being performed, as the service names it.
    pub operation: String,
    /// Number of records processed so far.
    #[serde(default, rename = "numberRecordsProcessed", skip_serializing_if = "Option::is_none")]
    pub processed_records: Option<u64>,
    /// Number of records that failed processing.
    #[serde(default, rename = "numberRecordsFailed", skip_serializing_if = "Option::is_none")]
    pub failed_records: Option<u64>,
    /// Error message if job failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// Remaining job metadata, as returned.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Per-record outcomes of a processed job.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobResults {
    pub successful_results: Vec<Record>,
    pub failed_results: Vec<Record>,
    pub unprocessed_records: Vec<Record>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Internal Wire Types
// ─────────────────────────────────────────────────────────────────────────────

/// Request body for changing job state.
#[derive(Debug, Serialize)]
struct UpdateJobStateRequest {
    state: &'static str,
}

/// Salesforce API error response format.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SalesforceError {
    message: String,
    error_code: String,
}

/// Result set endpoints under a job.
#[derive(Debug, Clone, Copy)]
enum ResultKind {
    Successful,
    Failed,
    Unprocessed,
}

impl ResultKind {
    fn path_segment(self) -> &'static str {
        match self {
            ResultKind::Successful => "successfulResults",
            ResultKind::Failed => "failedResults",
            ResultKind::Unprocessed => "unprocessedrecords",
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// BulkIngestV2Client
// ─────────────────────────────────────────────────────────────────────────────

/// Client for Salesforce Bulk API v2 ingest operations.
#[derive(Clone)]
pub struct BulkIngestV2Client {
    /// Shared HTTP client.
    client: Arc<Client>,
    /// Base instance URL (e.g., "https://na1.salesforce.com").
    base_url: Url,
    /// API version path segment (e.g., "v60.0").
    api_version: String,
    /// Access token for authentication.
    access_token: SecretString,
}

impl BulkIngestV2Client {
    /// Creates a new Bulk API v2 ingest client.
    pub fn new(
        client: Arc<Client>,
        base_url: Url,
        api_version: String,
        access_token: SecretString,
    ) -> Self {
        Self {
            client,
            base_url,
            api_version,
            access_token,
        }
    }

    /// Creates the job on the server in the `Open` state.
    ///
    /// # Errors
    ///
    /// - `AppError::SalesforceError` - API error
    /// - `AppError::RateLimited` - Rate limit exceeded
    /// - `AppError::ConnectionFailed` - Network error
    pub async fn open_job(&self, descriptor: &JobDescriptor) -> Result<BulkIngestJobInfo, AppError> {
        let url = self.build_jobs_url()?;

        // Build request body - merge with contentType: "CSV"
        let mut body = serde_json::to_value(descriptor).map_err(|e| {
            AppError::Internal(format!("Failed to serialize job request: {}", e))
        })?;
        body.as_object_mut()
            .ok_or_else(|| AppError::Internal("Expected object in JSON".to_string()))?
            .insert("contentType".to_string(), serde_json::json!("CSV"));

        info!(
            "[BULK-INGEST] POST /jobs/ingest (creating {} job for {})",
            body["operation"].as_str().unwrap_or_default(),
            descriptor.object
        );

        let request = self.client.post(url).json(&body);
        let response = self
            .send(request, "POST", "/jobs/ingest".to_string(), "Ingest job creation")
            .await?;

        response.json().await.map_err(|e| {
            AppError::SalesforceError(format!("Failed to parse job creation response: {}", e))
        })
    }

    /// Uploads the whole batch as the job's CSV data.
    ///
    /// # Errors
    ///
    /// - `AppError::Internal` - Batch serialization error
    /// - `AppError::SalesforceError` - API error
    /// - `AppError::ConnectionFailed` - Network error
    pub async fn upload_job_data(&self, job_id: &str, batch: &RecordBatch) -> Result<(), AppError> {
        let url = self.build_job_url(job_id, Some("batches"))?;
        let body = write_batch_csv(batch)?;

        info!(
            "[BULK-INGEST] PUT /jobs/ingest/{}/batches ({} records, {} bytes)",
            redact_id(job_id),
            batch.len(),
            body.len()
        );

        let request = self
            .client
            .put(url)
            .header("Content-Type", "text/csv")
            .body(body);
        self.send(
            request,
            "PUT",
            format!("/jobs/ingest/{}/batches", redact_id(job_id)),
            "CSV upload",
        )
        .await?;

        Ok(())
    }

    /// Marks the job upload complete so Salesforce starts processing.
    ///
    /// # Errors
    ///
    /// - `AppError::SalesforceError` - API error
    /// - `AppError::ConnectionFailed` - Network error
    pub async fn close_job(&self, job_id: &str) -> Result<BulkIngestJobInfo, AppError> {
        let url = self.build_job_url(job_id, None)?;

        info!(
            "[BULK-INGEST] PATCH /jobs/ingest/{} (closing)",
            redact_id(job_id)
        );

        let request = self.client.patch(url).json(&UpdateJobStateRequest {
            state: "UploadComplete",
        });
        let response = self
            .send(
                request,
                "PATCH",
                format!("/jobs/ingest/{}", redact_id(job_id)),
                "Job close",
            )
            .await?;

        response.json().await.map_err(|e| {
            AppError::SalesforceError(format!("Failed to parse job close response: {}", e))
        })
    }

    /// Gets the current status of a bulk ingest job.
    ///
    /// A job in the `Failed` state is returned as a normal snapshot.
    ///
    /// # Errors
    ///
    /// - `AppError::NotFound` - Job not found
    /// - `AppError::SalesforceError` - API error
    pub async fn get_job_status(&self, job_id: &str) -> Result<BulkIngestJobInfo, AppError> {
        let url = self.build_job_url(job_id, None)?;

        info!(
            "[BULK-INGEST] GET /jobs/ingest/{} (status)",
            redact_id(job_id)
        );

        let response = self
            .send(
                self.client.get(url),
                "GET",
                format!("/jobs/ingest/{}", redact_id(job_id)),
                "Job status check",
            )
            .await?;

        response.json().await.map_err(|e| {
            AppError::SalesforceError(format!("Failed to parse job status response: {}", e))
        })
    }

    /// Fetches all three result sets of a job.
    ///
    /// Requests run one after another; the first failure aborts the rest.
    pub async fn get_all_results(&self, job_id: &str) -> Result<JobResults, AppError> {
        Ok(JobResults {
            successful_results: self.get_results(job_id, ResultKind::Successful).await?,
            failed_results: self.get_results(job_id, ResultKind::Failed).await?,
            unprocessed_records: self.get_results(job_id, ResultKind::Unprocessed).await?,
        })
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Private Helpers
    // ─────────────────────────────────────────────────────────────────────────

    /// Downloads one result CSV and parses it into records.
    async fn get_results(&self, job_id: &str, kind: ResultKind) -> Result<Vec<Record>, AppError> {
        let segment = kind.path_segment();
        let url = self.build_job_url(job_id, Some(segment))?;

        let response = self
            .send(
                self.client.get(url),
                "GET",
                format!("/jobs/ingest/{}/{}", redact_id(job_id), segment),
                segment,
            )
            .await?;

        let body = response.bytes().await.map_err(|e| {
            AppError::ConnectionFailed(format!("Error reading {} body: {}", segment, e))
        })?;
        let batch = parse_records(body.as_ref())?;

        info!(
            "[BULK-INGEST] {} for job {}: {} records",
            segment,
            redact_id(job_id),
            batch.len()
        );

        Ok(batch.records)
    }

    /// Sends an authenticated request, logs the outcome, and maps non-2xx
    /// responses to errors.
    async fn send(
        &self,
        request: RequestBuilder,
        method: &str,
        log_path: String,
        action: &str,
    ) -> Result<Response, AppError> {
        let response = request
            .bearer_auth(self.access_token.expose_secret())
            .send()
            .await
            .map_err(|e| AppError::ConnectionFailed(format!("{} failed: {}", action, e)))?;

        let status = response.status();
        info!("[BULK-INGEST] {} {} -> {}", method, log_path, status.as_u16());

        if !status.is_success() {
            return Err(parse_error_response(response, status).await);
        }

        Ok(response)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // URL Builders
    // ─────────────────────────────────────────────────────────────────────────

    /// Builds the base jobs URL: /services/data/vXX.X/jobs/ingest
    fn build_jobs_url(&self) -> Result<Url, AppError> {
        let path = format!("/services/data/{}/jobs/ingest", self.api_version);
        self.base_url
            .join(&path)
            .map_err(|e| AppError::Internal(format!("Failed to build jobs URL: {}", e)))
    }

    /// Builds a job URL, optionally with a trailing segment:
    /// /services/data/vXX.X/jobs/ingest/{job_id}[/{segment}]
    fn build_job_url(&self, job_id: &str, segment: Option<&str>) -> Result<Url, AppError> {
        let mut path = format!("/services/data/{}/jobs/ingest/{}", self.api_version, job_id);
        if let Some(segment) = segment {
            path.push('/');
            path.push_str(segment);
        }
        self.base_url
            .join(&path)
            .map_err(|e| AppError::Internal(format!("Failed to build job URL: {}", e)))
    }
}

impl BulkApi for BulkIngestV2Client {
    fn open_job<'a>(&'a self, descriptor: &'a JobDescriptor) -> BulkFuture<'a, BulkIngestJobInfo> {
        Box::pin(BulkIngestV2Client::open_job(self, descriptor))
    }

    fn upload_data<'a>(&'a self, job_id: &'a str, batch: &'a RecordBatch) -> BulkFuture<'a, ()> {
        Box::pin(self.upload_job_data(job_id, batch))
    }

    fn close_job<'a>(&'a self, job_id: &'a str) -> BulkFuture<'a, BulkIngestJobInfo> {
        Box::pin(BulkIngestV2Client::close_job(self, job_id))
    }

    fn check_job<'a>(&'a self, job_id: &'a str) -> BulkFuture<'a, BulkIngestJobInfo> {
        Box::pin(self.get_job_status(job_id))
    }

    fn get_all_results<'a>(&'a self, job_id: &'a str) -> BulkFuture<'a, JobResults> {
        Box::pin(BulkIngestV2Client::get_all_results(self, job_id))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Error Handling
// ─────────────────────────────────────────────────────────────────────────────

/// Parses an error response and maps to appropriate AppError.
async fn parse_error_response(response: Response, status: StatusCode) -> AppError {
    if status == StatusCode::TOO_MANY_REQUESTS {
        let retry_after = response
            .headers()
            .get("Retry-After")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse::<u64>().ok());
        return AppError::RateLimited {
            retry_after_secs: retry_after,
        };
    }

    if status == StatusCode::UNAUTHORIZED {
        return AppError::NotAuthenticated;
    }

    if status == StatusCode::NOT_FOUND {
        return AppError::NotFound("Bulk ingest job not found".to_string());
    }

    let body = response
        .text()
        .await
        .unwrap_or_else(|_| String::from("Unable to read error body"));

    if let Ok(errors) = serde_json::from_str::<Vec<SalesforceError>>(&body) {
        if let Some(first_error) = errors.first() {
            if first_error.error_code == "REQUEST_LIMIT_EXCEEDED" {
                return AppError::RateLimited {
                    retry_after_secs: None,
                };
            }

            return AppError::SalesforceError(format!(
                "[{}] {}",
                first_error.error_code, first_error.message
            ));
        }
    }

    AppError::SalesforceError(format!(
        "HTTP {} - {}",
        status.as_u16(),
        status.canonical_reason().unwrap_or("Unknown error")
    ))
}

// ─────────────────────────────────────────────────────────────────────────────
// Helper Functions
// ─────────────────────────────────────────────────────────────────────────────

/// Redacts a job ID for logging (shows first 8 chars).
fn redact_id(id: &str) -> String {
    match id.char_indices().nth(8) {
        Some((idx, _)) => format!("{}...", &id[..idx]),
        None => id.to_string(),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
