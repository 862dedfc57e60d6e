//! `status`: report a bulk ingest job, optionally with its per-record results.

use serde_json::Value;
use tracing::info;

use crate::commands::{to_json, Ux};
use crate::config::StatusConfig;
use crate::error::AppError;
use crate::salesforce::BulkApi;

/// Checks the job once and returns the snapshot as JSON.
///
/// With `show_records`, the three result sets are fetched as well and merged
/// into the snapshot object.
pub async fn run(api: &dyn BulkApi, ux: &mut Ux, config: &StatusConfig) -> Result<Value, AppError> {
    ux.start_spinner("Getting Status");
    let job_info = api.check_job(&config.job_id).await?;
    ux.stop_spinner();

    info!(job_id = %job_info.id, state = ?job_info.state, "Job status retrieved");

    let snapshot = to_json(&job_info)?;
    if !config.show_records {
        return Ok(snapshot);
    }

    ux.start_spinner("Getting Results");
    let results = api.get_all_results(&config.job_id).await?;
    ux.stop_spinner();

    info!(
        successful = results.successful_results.len(),
        failed = results.failed_results.len(),
        unprocessed = results.unprocessed_records.len(),
        "Job results retrieved"
    );

    merge_shallow(snapshot, to_json(&results)?)
}

/// Combines two JSON objects key by key; `overlay` wins on collisions.
pub fn merge_shallow(base: Value, overlay: Value) -> Result<Value, AppError> {
    match (base, overlay) {
        (Value::Object(mut base), Value::Object(overlay)) => {
            base.extend(overlay);
            Ok(Value::Object(base))
        }
        _ => Err(AppError::Internal(
            "Job status and results must both be JSON objects".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::fake_api::{Call, FailAt, FakeBulkApi, FAKE_JOB_ID};
    use crate::salesforce::JobResults;
    use crate::streaming::Record;
    use serde_json::json;

    fn config(show_records: bool) -> StatusConfig {
        StatusConfig {
            job_id: FAKE_JOB_ID.to_string(),
            show_records,
        }
    }

    fn results() -> JobResults {
        let mut ok = Record::new();
        ok.insert("sf__Id".to_string(), "003xx1".to_string());
        ok.insert("sf__Created".to_string(), "true".to_string());
        JobResults {
            successful_results: vec![ok],
            failed_results: vec![],
            unprocessed_records: vec![],
        }
    }

    #[tokio::test]
    async fn without_flag_returns_bare_snapshot() {
        let api = FakeBulkApi::new().with_results(results());

        let report = run(&api, &mut Ux::quiet(), &config(false)).await.unwrap();

        assert_eq!(report["id"], FAKE_JOB_ID);
        assert_eq!(report["state"], "JobComplete");
        assert!(report.get("successfulResults").is_none());
        assert_eq!(api.calls(), vec![Call::Check(FAKE_JOB_ID.to_string())]);
    }

    #[tokio::test]
    async fn with_flag_merges_results_into_snapshot() {
        let api = FakeBulkApi::new().with_results(results());

        let report = run(&api, &mut Ux::quiet(), &config(true)).await.unwrap();

        assert_eq!(report["id"], FAKE_JOB_ID);
        assert_eq!(report["operation"], "upsert");
        assert_eq!(report["successfulResults"][0]["sf__Id"], "003xx1");
        assert_eq!(report["failedResults"], json!([]));
        assert_eq!(report["unprocessedRecords"], json!([]));
        assert_eq!(
            api.calls(),
            vec![
                Call::Check(FAKE_JOB_ID.to_string()),
                Call::GetAllResults(FAKE_JOB_ID.to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn check_failure_propagates_without_fetching_results() {
        let api = FakeBulkApi::new().failing_at(FailAt::Check);

        let result = run(&api, &mut Ux::quiet(), &config(true)).await;

        assert!(matches!(result, Err(AppError::SalesforceError(_))));
        assert_eq!(api.calls().len(), 1);
    }

    #[tokio::test]
    async fn results_failure_propagates() {
        let api = FakeBulkApi::new().failing_at(FailAt::Results);

        assert!(run(&api, &mut Ux::quiet(), &config(true)).await.is_err());
    }

    #[test]
    fn overlay_keys_win_on_collision() {
        let merged = merge_shallow(
            json!({ "id": "750xx", "state": "JobComplete", "note": "from snapshot" }),
            json!({ "note": "from results", "failedResults": [] }),
        )
        .unwrap();

        assert_eq!(
            merged,
            json!({
                "id": "750xx",
                "state": "JobComplete",
                "note": "from results",
                "failedResults": []
            })
        );
    }

    #[test]
    fn merge_rejects_non_objects() {
        assert!(merge_shallow(json!([]), json!({})).is_err());
    }
}
