//! Incremental parsing of scanner output lines into findings.
//!
//! The scanner interleaves banner and log text with JSON result lines, so
//! parsing is tolerant by contract: a line that is not a result record is
//! counted and skipped, never an error.

use chrono::Utc;
use scanforge_core::{Finding, ScanTask};
use serde_json::Value;
use tracing::trace;

/// Try to parse one output line as a result record.
///
/// A record is a JSON object carrying a template identifier under
/// `templateID` (classic spelling) or `template-id`. The target lives under
/// `matched-at`; severity under `info.severity`, defaulting to "unknown".
/// The raw payload is preserved verbatim.
pub fn parse_finding(line: &str) -> Option<Finding> {
    let value: Value = serde_json::from_str(line.trim()).ok()?;
    let obj = value.as_object()?;

    let template_id = obj
        .get("templateID")
        .or_else(|| obj.get("template-id"))
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())?
        .to_string();

    let matched_at = obj
        .get("matched-at")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    let severity = obj
        .get("info")
        .and_then(|info| info.get("severity"))
        .and_then(Value::as_str)
        .unwrap_or("unknown")
        .to_string();

    Some(Finding {
        template_id,
        matched_at,
        severity,
        raw: value,
        observed_at: Utc::now(),
    })
}

/// Feed one output line into a task.
///
/// Appends a finding on success; otherwise bumps the malformed-line counter.
/// Blank lines are ignored entirely. Never fails and never aborts the
/// enclosing read loop.
pub fn feed(task: &mut ScanTask, line: &str) {
    if line.trim().is_empty() {
        return;
    }
    task.lines_processed += 1;
    match parse_finding(line) {
        Some(finding) => task.findings.push(finding),
        None => {
            trace!(task_id = %task.id, "skipping non-result output line");
            task.malformed_lines += 1;
        }
    }
}
