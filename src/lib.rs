//! Upsert CSV data through Salesforce Bulk API v2 and report on jobs.

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod salesforce;
pub mod streaming;
