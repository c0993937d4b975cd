//! Attempt report artifact (`implementation-report.md`).
//!
//! Rewritten after every attempt so a crash mid-run leaves the latest round
//! inspectable. The remaining-tasks JSON block is machine-parseable by
//! downstream tooling; the rest is for humans.

use std::fs;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::debug;

use crate::core::types::{Mode, VerifierStatus};
use crate::io::spec_store::SpecResources;

#[derive(Serialize)]
struct RemainingBlock<'a> {
    #[serde(rename = "remainingTasks")]
    remaining_tasks: &'a [String],
}

/// Write the report for the given attempt, replacing any previous report.
pub fn write_report(
    spec: &SpecResources,
    mode: Mode,
    max_attempts: u32,
    attempt: u32,
    status: VerifierStatus,
    remaining: &[String],
    worker_output: &str,
) -> Result<()> {
    let block = serde_json::to_string_pretty(&RemainingBlock {
        remaining_tasks: remaining,
    })
    .context("encode remaining tasks")?;

    let mut buf = String::new();
    buf.push_str(&format!(
        "# Implementation Report for {} - {}\n\n",
        spec.id, spec.name
    ));
    buf.push_str(&format!("- Mode: {mode}\n"));
    buf.push_str(&format!("- Max attempts: {max_attempts}\n"));
    buf.push_str(&format!("- Attempts performed: {attempt}\n"));
    buf.push_str(&format!("- Final verifier status: {status}\n\n"));
    buf.push_str("## Remaining tasks\n\n");
    buf.push_str(&block);
    buf.push_str("\n\n## Final worker output\n\n");
    buf.push_str(worker_output);
    buf.push('\n');

    fs::write(&spec.report_path, buf)
        .with_context(|| format!("write report {}", spec.report_path.display()))?;
    debug!(path = %spec.report_path.display(), attempt, status = %status, "report written");
    Ok(())
}
