//! Typed command configuration, validated once after argument parsing.

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;
use url::Url;

use crate::cli::{Cli, StatusArgs, UpsertArgs};
use crate::error::AppError;
use crate::salesforce::OrgCredentials;

/// Settings for one `upsert` invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpsertConfig {
    /// External id field name. Required.
    pub external_id: String,
    /// CSV input path. Required; existence is checked when the command runs.
    pub csv_file: PathBuf,
    /// Target object API name. Required.
    pub sobject_type: String,
    /// Assignment rule id passed at job creation. Default: none.
    pub assignment_rule_id: Option<String>,
    /// How long to wait for a terminal state after close. Default: don't wait.
    pub wait: Option<Duration>,
    /// Serial processing request. Default: false. Has no effect on v2 ingest.
    pub serial: bool,
}

impl TryFrom<UpsertArgs> for UpsertConfig {
    type Error = AppError;

    fn try_from(args: UpsertArgs) -> Result<Self, Self::Error> {
        Ok(Self {
            external_id: required("externalid", args.externalid)?,
            csv_file: args.csvfile,
            sobject_type: required("sobjecttype", args.sobjecttype)?,
            assignment_rule_id: args
                .assignmentruleid
                .map(|id| id.trim().to_string())
                .filter(|id| !id.is_empty()),
            wait: wait_budget(args.wait)?,
            serial: args.serial,
        })
    }
}

/// Settings for one `status` invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusConfig {
    /// Job to check. Required.
    pub job_id: String,
    /// Also fetch per-record results. Default: false.
    pub show_records: bool,
}

impl TryFrom<StatusArgs> for StatusConfig {
    type Error = AppError;

    fn try_from(args: StatusArgs) -> Result<Self, Self::Error> {
        Ok(Self {
            job_id: required("jobid", args.jobid)?,
            show_records: args.showrecords,
        })
    }
}

/// Builds org credentials from the global connection flags.
///
/// # Errors
///
/// - `AppError::NotAuthenticated` if the instance URL or token is missing
/// - `AppError::InvalidConfig` if the URL or API version is malformed
pub fn org_credentials(cli: &Cli) -> Result<OrgCredentials, AppError> {
    let instance_url = cli
        .instance_url
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or(AppError::NotAuthenticated)?;
    let access_token = cli
        .access_token
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or(AppError::NotAuthenticated)?;

    let instance_url = Url::parse(instance_url)
        .map_err(|e| AppError::InvalidConfig(format!("instance URL is not a valid URL: {}", e)))?;
    if !matches!(instance_url.scheme(), "https" | "http") {
        return Err(AppError::InvalidConfig(format!(
            "instance URL must use https, got '{}'",
            instance_url.scheme()
        )));
    }

    let api_version = normalize_api_version(&cli.api_version)?;

    Ok(OrgCredentials {
        instance_url,
        access_token: SecretString::from(access_token.to_string()),
        api_version,
    })
}

/// Accepts "60.0" or "v60.0" and returns the "vNN.N" path form.
fn normalize_api_version(raw: &str) -> Result<String, AppError> {
    let trimmed = raw.trim();
    let number = trimmed.strip_prefix('v').unwrap_or(trimmed);

    let valid = match number.split_once('.') {
        Some((major, minor)) => {
            !major.is_empty()
                && !minor.is_empty()
                && major.bytes().all(|b| b.is_ascii_digit())
                && minor.bytes().all(|b| b.is_ascii_digit())
        }
        None => false,
    };

    if !valid {
        return Err(AppError::InvalidConfig(format!(
            "API version must look like v60.0, got '{}'",
            raw
        )));
    }

    Ok(format!("v{}", number))
}

/// Converts `--wait` minutes into a polling budget; 0 means don't wait.
fn wait_budget(minutes: Option<u64>) -> Result<Option<Duration>, AppError> {
    match minutes {
        None | Some(0) => Ok(None),
        Some(minutes) => minutes
            .checked_mul(60)
            .map(|secs| Some(Duration::from_secs(secs)))
            .ok_or_else(|| {
                AppError::InvalidConfig(format!("--wait {} minutes is too large", minutes))
            }),
    }
}

fn required(flag: &str, value: String) -> Result<String, AppError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(AppError::InvalidConfig(format!("--{} must not be empty", flag)));
    }
    Ok(trimmed.to_string())
}
