use chrono::{SecondsFormat, Utc};
use serde::Serialize;

use crate::error::Result;
use crate::{AuditReport, BatchReport};

#[derive(Serialize)]
struct JsonReport<'a> {
    generated_at: String,
    tool_version: &'static str,
    #[serde(flatten)]
    report: &'a AuditReport,
}

#[derive(Serialize)]
struct JsonError<'a> {
    package: &'a str,
    error: String,
    retryable: bool,
}

#[derive(Serialize)]
struct JsonBatch<'a> {
    generated_at: String,
    tool_version: &'static str,
    reports: Vec<&'a AuditReport>,
    errors: Vec<JsonError<'a>>,
    exit_code: i32,
}

fn timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Render a report as JSON.
pub fn render(report: &AuditReport) -> Result<String> {
    let doc = JsonReport {
        generated_at: timestamp(),
        tool_version: env!("CARGO_PKG_VERSION"),
        report,
    };
    Ok(serde_json::to_string_pretty(&doc)?)
}

/// Render a batch as JSON. Per-package errors are listed beside the reports.
pub fn render_batch(batch: &BatchReport) -> Result<String> {
    let doc = JsonBatch {
        generated_at: timestamp(),
        tool_version: env!("CARGO_PKG_VERSION"),
        reports: batch.reports().collect(),
        errors: batch
            .errors()
            .map(|(package, e)| JsonError {
                package,
                error: e.to_string(),
                retryable: e.is_retryable(),
            })
            .collect(),
        exit_code: batch.exit_code(),
    };
    Ok(serde_json::to_string_pretty(&doc)?)
}
