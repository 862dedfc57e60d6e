//! Command handlers and the helpers they share.
//!
//! Each command receives its collaborators explicitly: a [`BulkApi`]
//! connection, the [`Ux`] console, and its validated config.

pub mod status;
pub mod upsert;
mod ux;

#[cfg(test)]
pub(crate) mod fake_api;

use std::path::Path;

use serde::Serialize;
use serde_json::Value;
use tracing::info;

use crate::cli::{Cli, Command};
use crate::config::{org_credentials, StatusConfig, UpsertConfig};
use crate::error::AppError;
use crate::salesforce::connect;

pub use ux::{render_styled_object, Ux};

/// Parses config, connects, runs the selected command and prints its result.
pub async fn run(cli: Cli) -> Result<(), AppError> {
    let mut ux = Ux::new(cli.json);
    let creds = org_credentials(&cli)?;

    match cli.command {
        Command::Upsert(args) => {
            let config = UpsertConfig::try_from(args)?;
            let api = connect(&creds)?;
            let job_info = upsert::run(&api, &mut ux, &config).await?;
            ux.styled_object(&to_json(&job_info)?);
        }
        Command::Status(args) => {
            let config = StatusConfig::try_from(args)?;
            let api = connect(&creds)?;
            let report = status::run(&api, &mut ux, &config).await?;
            ux.styled_object(&report);
        }
    }

    info!("Command complete");
    Ok(())
}

/// Fails with `AppError::PathNotFound` unless `path` exists.
pub async fn ensure_path_exists(path: &Path) -> Result<(), AppError> {
    match tokio::fs::try_exists(path).await {
        Ok(true) => Ok(()),
        Ok(false) => Err(AppError::PathNotFound(path.to_owned())),
        Err(e) => Err(AppError::Internal(format!(
            "Failed to check {}: {}",
            path.display(),
            e
        ))),
    }
}

pub(crate) fn to_json<T: Serialize>(value: &T) -> Result<Value, AppError> {
    serde_json::to_value(value)
        .map_err(|e| AppError::Internal(format!("Failed to serialize output: {}", e)))
}
