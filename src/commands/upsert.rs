//! `upsert`: load a CSV file into a new Bulk API v2 upsert job.

use std::time::Duration;

use tokio::time::Instant;
use tracing::{info, warn};

use crate::commands::{ensure_path_exists, Ux};
use crate::config::UpsertConfig;
use crate::error::AppError;
use crate::salesforce::{BulkApi, BulkIngestJobInfo, JobDescriptor};
use crate::streaming::{read_record_batch, RecordBatch};

/// Delay between status checks while waiting for a job.
const POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Reads the CSV, submits it as an upsert job and returns the job snapshot.
///
/// Without `wait` the snapshot is the one returned by close; with `wait` it is
/// the last one seen while polling.
pub async fn run(
    api: &dyn BulkApi,
    ux: &mut Ux,
    config: &UpsertConfig,
) -> Result<BulkIngestJobInfo, AppError> {
    ux.start_spinner("Bulk Upsert");

    if config.serial {
        warn!("--serial has no effect: Bulk API v2 ingest jobs always run in parallel");
    }

    ensure_path_exists(&config.csv_file).await?;
    let batch = read_record_batch(&config.csv_file).await?;
    info!(
        records = batch.len(),
        object = %config.sobject_type,
        "Parsed CSV for upsert"
    );

    let descriptor = JobDescriptor::upsert(
        config.sobject_type.clone(),
        config.external_id.clone(),
        config.assignment_rule_id.clone(),
    );
    let mut job_info = submit_batch(api, &descriptor, &batch).await?;
    ux.stop_spinner();

    ux.log(&format!("Job ID: {}", job_info.id));
    ux.log(&status_hint(&job_info.id));

    if let Some(budget) = config.wait {
        ux.start_spinner("Waiting for job to finish");
        job_info = wait_for_completion(api, &job_info.id, budget, POLL_INTERVAL).await?;
        ux.stop_spinner();
    }

    Ok(job_info)
}

/// Opens the job, uploads the whole batch and closes the job, in that order.
///
/// A failure at any step returns immediately; the remote job is left in
/// whatever state the last successful step produced.
pub async fn submit_batch(
    api: &dyn BulkApi,
    descriptor: &JobDescriptor,
    batch: &RecordBatch,
) -> Result<BulkIngestJobInfo, AppError> {
    let opened = api.open_job(descriptor).await?;
    info!(job_id = %opened.id, "Job opened");

    api.upload_data(&opened.id, batch).await?;
    info!(job_id = %opened.id, records = batch.len(), "Batch uploaded");

    let closed = api.close_job(&opened.id).await?;
    info!(job_id = %closed.id, state = ?closed.state, "Job closed");

    Ok(closed)
}

/// Checks the job every `interval` until it reaches a terminal state or
/// `budget` runs out, and returns the last snapshot either way.
pub async fn wait_for_completion(
    api: &dyn BulkApi,
    job_id: &str,
    budget: Duration,
    interval: Duration,
) -> Result<BulkIngestJobInfo, AppError> {
    // A budget past the clock's range never expires.
    let deadline = Instant::now().checked_add(budget);

    loop {
        let info = api.check_job(job_id).await?;
        if info.state.is_terminal() {
            return Ok(info);
        }

        let now = Instant::now();
        let pause = match deadline {
            Some(deadline) if now >= deadline => {
                warn!(
                    job_id,
                    state = ?info.state,
                    "Job did not finish within the wait time"
                );
                return Ok(info);
            }
            Some(deadline) => interval.min(deadline - now),
            None => interval,
        };

        tokio::time::sleep(pause).await;
    }
}

/// The hint printed after submission.
pub fn status_hint(job_id: &str) -> String {
    format!(
        "Check the job's status with: stampede status --jobid {}",
        job_id
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::fake_api::{Call, FailAt, FakeBulkApi, FAKE_JOB_ID};
    use crate::salesforce::{BulkJobState, BulkOperation};
    use crate::streaming::{parse_records, Record};
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn write_csv(dir: &TempDir, content: &str) -> PathBuf {
        let path = dir.path().join("contacts.csv");
        std::fs::write(&path, content).unwrap();
        path
    }

    fn config(csv_file: PathBuf) -> UpsertConfig {
        UpsertConfig {
            external_id: "id".to_string(),
            csv_file,
            sobject_type: "Contact".to_string(),
            assignment_rule_id: None,
            wait: None,
            serial: false,
        }
    }

    fn record(pairs: &[(&str, &str)]) -> Record {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[tokio::test]
    async fn upsert_opens_uploads_and_closes_in_order() {
        let dir = TempDir::new().unwrap();
        let path = write_csv(&dir, "id,name\n1,Alice\n2,Bob\n");
        let api = FakeBulkApi::new();

        let info = run(&api, &mut Ux::quiet(), &config(path)).await.unwrap();

        assert_eq!(info.id, FAKE_JOB_ID);
        assert_eq!(info.state, BulkJobState::UploadComplete);

        let calls = api.calls();
        assert_eq!(calls.len(), 3, "calls: {:?}", calls);

        match &calls[0] {
            Call::Open(descriptor) => {
                assert_eq!(descriptor.object(), "Contact");
                assert_eq!(descriptor.operation(), BulkOperation::Upsert);
                assert_eq!(descriptor.external_id_field_name(), Some("id"));
                assert_eq!(descriptor.assignment_rule_id(), None);
            }
            other => panic!("Expected open first, got: {:?}", other),
        }
        match &calls[1] {
            Call::Upload { job_id, batch } => {
                assert_eq!(job_id, FAKE_JOB_ID);
                assert_eq!(
                    batch.records,
                    vec![
                        record(&[("id", "1"), ("name", "Alice")]),
                        record(&[("id", "2"), ("name", "Bob")]),
                    ]
                );
            }
            other => panic!("Expected upload second, got: {:?}", other),
        }
        assert_eq!(calls[2], Call::Close(FAKE_JOB_ID.to_string()));
    }

    #[tokio::test]
    async fn assignment_rule_reaches_job_creation() {
        let dir = TempDir::new().unwrap();
        let path = write_csv(&dir, "Lead_Key__c,LastName\nk1,Smith\n");
        let api = FakeBulkApi::new();
        let mut config = config(path);
        config.assignment_rule_id = Some("01Qxx0000001AbC".to_string());

        run(&api, &mut Ux::quiet(), &config).await.unwrap();

        match &api.calls()[0] {
            Call::Open(descriptor) => {
                assert_eq!(descriptor.assignment_rule_id(), Some("01Qxx0000001AbC"))
            }
            other => panic!("Expected open, got: {:?}", other),
        }
    }

    #[tokio::test]
    async fn missing_file_fails_before_any_remote_call() {
        let dir = TempDir::new().unwrap();
        let api = FakeBulkApi::new();

        let result = run(&api, &mut Ux::quiet(), &config(dir.path().join("nope.csv"))).await;

        assert!(matches!(result, Err(AppError::PathNotFound(_))));
        assert!(api.calls().is_empty());
    }

    #[tokio::test]
    async fn malformed_csv_fails_before_any_remote_call() {
        let dir = TempDir::new().unwrap();
        let path = write_csv(&dir, "id,name\n1,Alice,extra\n");
        let api = FakeBulkApi::new();

        let result = run(&api, &mut Ux::quiet(), &config(path)).await;

        assert!(matches!(result, Err(AppError::CsvInvalid(_))));
        assert!(api.calls().is_empty());
    }

    #[tokio::test]
    async fn upload_failure_skips_close() {
        let batch = parse_records("id\n1\n".as_bytes()).unwrap();
        let api = FakeBulkApi::new().failing_at(FailAt::Upload);
        let descriptor = JobDescriptor::upsert("Contact", "id", None);

        let result = submit_batch(&api, &descriptor, &batch).await;

        assert!(matches!(result, Err(AppError::SalesforceError(_))));
        let calls = api.calls();
        assert_eq!(calls.len(), 2);
        assert!(matches!(calls[0], Call::Open(_)));
        assert!(matches!(calls[1], Call::Upload { .. }));
    }

    #[tokio::test]
    async fn open_failure_stops_everything() {
        let batch = parse_records("id\n1\n".as_bytes()).unwrap();
        let api = FakeBulkApi::new().failing_at(FailAt::Open);
        let descriptor = JobDescriptor::upsert("Contact", "id", None);

        assert!(submit_batch(&api, &descriptor, &batch).await.is_err());
        assert_eq!(api.calls().len(), 1);
    }

    #[tokio::test]
    async fn close_failure_propagates() {
        let batch = parse_records("id\n1\n".as_bytes()).unwrap();
        let api = FakeBulkApi::new().failing_at(FailAt::Close);
        let descriptor = JobDescriptor::upsert("Contact", "id", None);

        assert!(submit_batch(&api, &descriptor, &batch).await.is_err());
        assert_eq!(api.calls().len(), 3);
    }

    #[tokio::test]
    async fn wait_polls_until_terminal() {
        let api = FakeBulkApi::new().with_check_states(&[
            BulkJobState::UploadComplete,
            BulkJobState::InProgress,
            BulkJobState::JobComplete,
        ]);

        let info = wait_for_completion(
            &api,
            FAKE_JOB_ID,
            Duration::from_secs(10),
            Duration::from_millis(1),
        )
        .await
        .unwrap();

        assert_eq!(info.state, BulkJobState::JobComplete);
        assert_eq!(api.calls().len(), 3);
    }

    #[tokio::test]
    async fn wait_returns_last_snapshot_when_budget_runs_out() {
        let api = FakeBulkApi::new().with_check_states(&[BulkJobState::InProgress]);

        let info = wait_for_completion(
            &api,
            FAKE_JOB_ID,
            Duration::from_millis(30),
            Duration::from_millis(5),
        )
        .await
        .unwrap();

        assert_eq!(info.state, BulkJobState::InProgress);
        assert!(!api.calls().is_empty());
    }

    #[tokio::test]
    async fn wait_with_huge_budget_still_polls_to_completion() {
        let api = FakeBulkApi::new()
            .with_check_states(&[BulkJobState::InProgress, BulkJobState::JobComplete]);

        let info = wait_for_completion(&api, FAKE_JOB_ID, Duration::MAX, Duration::from_millis(1))
            .await
            .unwrap();

        assert_eq!(info.state, BulkJobState::JobComplete);
        assert_eq!(api.calls().len(), 2);
    }

    #[tokio::test]
    async fn upsert_with_wait_reports_final_state() {
        let dir = TempDir::new().unwrap();
        let path = write_csv(&dir, "id\n1\n");
        let api = FakeBulkApi::new().with_check_states(&[BulkJobState::JobComplete]);
        let mut config = config(path);
        config.wait = Some(Duration::from_secs(60));

        let info = run(&api, &mut Ux::quiet(), &config).await.unwrap();

        assert_eq!(info.state, BulkJobState::JobComplete);
        assert_eq!(api.calls().last(), Some(&Call::Check(FAKE_JOB_ID.to_string())));
    }

    #[test]
    fn hint_names_the_job() {
        assert!(status_hint("750xx1").ends_with("status --jobid 750xx1"));
    }
}
