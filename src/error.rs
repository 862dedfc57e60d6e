use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

/// Patterns (lowercase) that indicate sensitive data not safe for console display.
/// Used by `contains_sensitive()` for case-insensitive matching.
pub(crate) const SENSITIVE_PATTERNS: &[&str] = &[
    "bearer ",
    "refresh_token",
    "access_token",
    "client_secret",
    "authorization:",
];

/// Returns true if the message contains any sensitive pattern (case-insensitive).
fn contains_sensitive(msg: &str) -> bool {
    let lower = msg.to_ascii_lowercase();
    SENSITIVE_PATTERNS.iter().any(|p| lower.contains(p))
}

/// Sanitizes a message for console display.
/// If sensitive content is detected, returns the fallback instead.
fn sanitize_message(msg: &str, fallback: &str) -> String {
    if contains_sensitive(msg) {
        fallback.into()
    } else {
        msg.to_string()
    }
}

/// User-facing rendering of an error, printed to stderr on failure.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorPresentation {
    pub title: String,
    pub message: String,
    pub action: Option<String>,
}

/// Application-wide error type.
#[derive(Debug, Error)]
pub enum AppError {
    // ── Input ─────────────────────────────────────────────────────────────────
    #[error("No such file: {}", .0.display())]
    PathNotFound(PathBuf),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── File / CSV ────────────────────────────────────────────────────────────
    #[error("File is not valid UTF-8")]
    NotUtf8,

    #[error("Invalid CSV: {0}")]
    CsvInvalid(String),

    // ── Remote ────────────────────────────────────────────────────────────────
    #[error("Not authenticated")]
    NotAuthenticated,

    #[error("Salesforce error: {0}")]
    SalesforceError(String),

    #[error("Rate limited")]
    RateLimited { retry_after_secs: Option<u64> },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    // ── Generic fallback ──────────────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Converts the error into a presentation suitable for the console.
    /// Never leaks secrets, tokens, or sensitive URL parameters.
    pub fn to_presentation(&self) -> ErrorPresentation {
        match self {
            // ── Input ─────────────────────────────────────────────────────────
            AppError::PathNotFound(path) => ErrorPresentation {
                title: "File Not Found".into(),
                message: format!("No such file: {}", path.display()),
                action: Some("Check the --csvfile path and try again".into()),
            },

            AppError::InvalidConfig(msg) => ErrorPresentation {
                title: "Invalid Configuration".into(),
                message: sanitize_message(msg, "A configuration value is invalid."),
                action: Some("Fix the flag or environment variable and try again".into()),
            },

            // ── File / CSV ────────────────────────────────────────────────────
            AppError::NotUtf8 => ErrorPresentation {
                title: "Invalid File Encoding".into(),
                message: "The file must be UTF-8 encoded. Please re-save your file with UTF-8 encoding.".into(),
                action: Some("Convert file to UTF-8".into()),
            },

            AppError::CsvInvalid(msg) => ErrorPresentation {
                title: "Invalid CSV".into(),
                message: format!("The CSV file has a formatting problem: {}", msg),
                action: Some("Fix the CSV file and try again".into()),
            },

            // ── Remote ────────────────────────────────────────────────────────
            AppError::NotAuthenticated => ErrorPresentation {
                title: "Not Logged In".into(),
                message: "No Salesforce instance URL or access token was provided.".into(),
                action: Some("Set SF_INSTANCE_URL and SF_ACCESS_TOKEN, or log in again".into()),
            },

            AppError::SalesforceError(msg) => ErrorPresentation {
                title: "Salesforce Error".into(),
                message: sanitize_message(msg, "A Salesforce error occurred."),
                action: None,
            },

            AppError::RateLimited { retry_after_secs } => {
                let wait_msg = match retry_after_secs {
                    Some(secs) => format!("Please wait {} seconds before trying again.", secs),
                    None => "Please wait a moment before trying again.".into(),
                };
                ErrorPresentation {
                    title: "Too Many Requests".into(),
                    message: format!("Salesforce is limiting requests. {}", wait_msg),
                    action: Some("Wait and retry".into()),
                }
            }

            AppError::NotFound(msg) => ErrorPresentation {
                title: "Not Found".into(),
                message: sanitize_message(msg, "The requested resource was not found."),
                action: Some("Check the job id and try again".into()),
            },

            AppError::ConnectionFailed(_) => ErrorPresentation {
                title: "Connection Failed".into(),
                message: "Could not connect to Salesforce. Please check your internet connection.".into(),
                action: Some("Check network and retry".into()),
            },

            // ── Generic ───────────────────────────────────────────────────────
            AppError::Internal(msg) => ErrorPresentation {
                title: "Unexpected Error".into(),
                message: sanitize_message(msg, "Something went wrong. Please try again."),
                action: None,
            },
        }
    }
}

impl Serialize for AppError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.to_presentation().serialize(serializer)
    }
}
