//! In-memory [`BulkApi`] that records every call it receives.

use std::collections::VecDeque;
use std::sync::Mutex;

use serde_json::Map;

use crate::error::AppError;
use crate::salesforce::{
    BulkApi, BulkFuture, BulkIngestJobInfo, BulkJobState, JobDescriptor, JobResults,
};
use crate::streaming::RecordBatch;

pub(crate) const FAKE_JOB_ID: &str = "750xx000000001ABC";

/// One observed call, with the arguments that matter for assertions.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Call {
    Open(JobDescriptor),
    Upload { job_id: String, batch: RecordBatch },
    Close(String),
    Check(String),
    GetAllResults(String),
}

/// Which step should fail, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FailAt {
    Nothing,
    Open,
    Upload,
    Close,
    Check,
    Results,
}

pub(crate) struct FakeBulkApi {
    calls: Mutex<Vec<Call>>,
    fail_at: FailAt,
    /// States returned by successive `check_job` calls; the last repeats.
    check_states: Mutex<VecDeque<BulkJobState>>,
    results: JobResults,
}

impl FakeBulkApi {
    pub(crate) fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            fail_at: FailAt::Nothing,
            check_states: Mutex::new(VecDeque::from([BulkJobState::JobComplete])),
            results: JobResults::default(),
        }
    }

    pub(crate) fn failing_at(mut self, step: FailAt) -> Self {
        self.fail_at = step;
        self
    }

    pub(crate) fn with_check_states(self, states: &[BulkJobState]) -> Self {
        *self.check_states.lock().unwrap() = states.iter().cloned().collect();
        self
    }

    pub(crate) fn with_results(mut self, results: JobResults) -> Self {
        self.results = results;
        self
    }

    pub(crate) fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    fn outcome<T>(&self, step: FailAt, value: T) -> Result<T, AppError> {
        if self.fail_at == step {
            Err(AppError::SalesforceError(format!("[TEST] {:?} failed", step)))
        } else {
            Ok(value)
        }
    }

    fn next_state(&self) -> BulkJobState {
        let mut states = self.check_states.lock().unwrap();
        if states.len() > 1 {
            states.pop_front().unwrap_or(BulkJobState::JobComplete)
        } else {
            states.front().cloned().unwrap_or(BulkJobState::JobComplete)
        }
    }
}

pub(crate) fn job_info(state: BulkJobState) -> BulkIngestJobInfo {
    BulkIngestJobInfo {
        id: FAKE_JOB_ID.to_string(),
        state,
        object: "Contact".to_string(),
        operation: "upsert".to_string(),
        processed_records: Some(0),
        failed_records: Some(0),
        error_message: None,
        extra: Map::new(),
    }
}

impl BulkApi for FakeBulkApi {
    fn open_job<'a>(&'a self, descriptor: &'a JobDescriptor) -> BulkFuture<'a, BulkIngestJobInfo> {
        self.record(Call::Open(descriptor.clone()));
        let result = self.outcome(FailAt::Open, job_info(BulkJobState::Open));
        Box::pin(async move { result })
    }

    fn upload_data<'a>(&'a self, job_id: &'a str, batch: &'a RecordBatch) -> BulkFuture<'a, ()> {
        self.record(Call::Upload {
            job_id: job_id.to_string(),
            batch: batch.clone(),
        });
        let result = self.outcome(FailAt::Upload, ());
        Box::pin(async move { result })
    }

    fn close_job<'a>(&'a self, job_id: &'a str) -> BulkFuture<'a, BulkIngestJobInfo> {
        self.record(Call::Close(job_id.to_string()));
        let result = self.outcome(FailAt::Close, job_info(BulkJobState::UploadComplete));
        Box::pin(async move { result })
    }

    fn check_job<'a>(&'a self, job_id: &'a str) -> BulkFuture<'a, BulkIngestJobInfo> {
        self.record(Call::Check(job_id.to_string()));
        let result = self.outcome(FailAt::Check, job_info(self.next_state()));
        Box::pin(async move { result })
    }

    fn get_all_results<'a>(&'a self, job_id: &'a str) -> BulkFuture<'a, JobResults> {
        self.record(Call::GetAllResults(job_id.to_string()));
        let result = self.outcome(FailAt::Results, self.results.clone());
        Box::pin(async move { result })
    }
}
