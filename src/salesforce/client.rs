//! Org credentials and connection acquisition.

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use secrecy::{ExposeSecret, SecretString};
use url::Url;

use crate::error::AppError;
use crate::salesforce::BulkIngestV2Client;

// ─────────────────────────────────────────────────────────────────────────────
// Constants
// ─────────────────────────────────────────────────────────────────────────────

/// User agent string for all Salesforce API requests.
const CLIENT_USER_AGENT: &str = concat!("stampede-bulk/", env!("CARGO_PKG_VERSION"));

/// Default request timeout in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 300;

// ─────────────────────────────────────────────────────────────────────────────
// OrgCredentials
// ─────────────────────────────────────────────────────────────────────────────

/// Credentials for an already-authenticated org.
///
/// The access token is wrapped in `SecretString` to prevent accidental
/// exposure through `Debug` or logging.
#[derive(Clone)]
pub struct OrgCredentials {
    /// Instance URL (e.g., "https://na1.salesforce.com")
    pub instance_url: Url,
    /// OAuth access token or session id
    pub access_token: SecretString,
    /// Salesforce API version (e.g., "v60.0")
    pub api_version: String,
}

impl std::fmt::Debug for OrgCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrgCredentials")
            .field("instance_url", &self.instance_url.as_str())
            .field("access_token", &"[REDACTED]")
            .field("api_version", &self.api_version)
            .finish()
    }
}

/// Opens a connection to the org described by `creds`.
///
/// No request is sent here; the first network call happens when a job is
/// opened or checked.
///
/// # Errors
///
/// - `AppError::NotAuthenticated` if the access token is empty
/// - `AppError::Internal` if the HTTP client fails to initialize
pub fn connect(creds: &OrgCredentials) -> Result<BulkIngestV2Client, AppError> {
    if creds.access_token.expose_secret().trim().is_empty() {
        return Err(AppError::NotAuthenticated);
    }

    let http = build_http_client()?;

    tracing::debug!(
        host = creds.instance_url.host_str().unwrap_or("-"),
        api_version = %creds.api_version,
        "Connection ready"
    );

    Ok(BulkIngestV2Client::new(
        Arc::new(http),
        creds.instance_url.clone(),
        creds.api_version.clone(),
        creds.access_token.clone(),
    ))
}

/// Builds the configured HTTP client.
fn build_http_client() -> Result<reqwest::Client, AppError> {
    let mut headers = HeaderMap::new();
    headers.insert(USER_AGENT, HeaderValue::from_static(CLIENT_USER_AGENT));

    reqwest::Client::builder()
        .default_headers(headers)
        .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
        .build()
        .map_err(|e| AppError::Internal(format!("Failed to build HTTP client: {}", e)))
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
