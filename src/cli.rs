//! Command-line surface and tracing setup.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::salesforce::DEFAULT_API_VERSION;

/// Upsert CSV data with Salesforce Bulk API v2 and check on jobs.
#[derive(Debug, Parser)]
#[command(
    name = "stampede",
    version,
    about = "Upsert CSV data with Salesforce Bulk API v2 and check job status.",
    long_about = None,
)]
pub struct Cli {
    /// Org instance URL, e.g. https://mydomain.my.salesforce.com.
    #[arg(long, env = "SF_INSTANCE_URL", global = true)]
    pub instance_url: Option<String>,

    /// Access token (or session id) for the org.
    #[arg(long, env = "SF_ACCESS_TOKEN", hide_env_values = true, global = true)]
    pub access_token: Option<String>,

    /// API version to target.
    #[arg(long, env = "SF_API_VERSION", default_value = DEFAULT_API_VERSION, global = true)]
    pub api_version: String,

    /// Print results as JSON instead of a styled listing.
    #[arg(long, global = true)]
    pub json: bool,

    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

/// Top-level subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Bulk upsert records from a CSV file.
    Upsert(UpsertArgs),

    /// Show the status of a bulk ingest job.
    Status(StatusArgs),
}

#[derive(Debug, Args)]
pub struct UpsertArgs {
    /// Name of the external id field used to match rows to existing records.
    #[arg(short = 'i', long = "externalid")]
    pub externalid: String,

    /// Path to the CSV file with the records to upsert.
    #[arg(short = 'f', long = "csvfile")]
    pub csvfile: PathBuf,

    /// API name of the object to upsert into, e.g. Contact.
    #[arg(short = 's', long = "sobjecttype")]
    pub sobjecttype: String,

    /// Id of the assignment rule to apply (Case and Lead only).
    #[arg(short = 'a', long = "assignmentruleid")]
    pub assignmentruleid: Option<String>,

    /// Minutes to wait for the job to finish processing.
    #[arg(short = 'w', long = "wait")]
    pub wait: Option<u64>,

    /// Request serial processing. Bulk API v2 ingest always runs in parallel.
    #[arg(short = 'r', long = "serial")]
    pub serial: bool,
}

#[derive(Debug, Args)]
pub struct StatusArgs {
    /// Id of the job to check.
    #[arg(short = 'i', long = "jobid")]
    pub jobid: String,

    /// Also fetch successful, failed and unprocessed records.
    #[arg(long = "showrecords")]
    pub showrecords: bool,
}

/// Installs the global tracing subscriber, writing to stderr.
///
/// `RUST_LOG` takes precedence over `-v`.
pub fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = match cli.verbose {
        0 => "stampede_bulk=warn",
        1 => "stampede_bulk=info",
        2 => "stampede_bulk=debug",
        _ => "stampede_bulk=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .with_target(false)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}
