//! Finding records parsed from scanner output.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One structured match reported by the scanner.
///
/// Owned exclusively by its task, appended by the result accumulator and
/// never mutated after creation. The raw payload is preserved verbatim for
/// later inspection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    /// Identifier of the template that matched.
    pub template_id: String,

    /// The target (URL/host) the template matched at.
    pub matched_at: String,

    /// Severity as reported by the scanner ("unknown" when absent).
    pub severity: String,

    /// Raw JSON payload exactly as emitted by the scanner.
    pub raw: serde_json::Value,

    /// When the line was consumed from the output stream.
    pub observed_at: DateTime<Utc>,
}

/// Count findings per severity.
pub fn summarize_by_severity(findings: &[Finding]) -> HashMap<String, usize> {
    let mut summary = HashMap::new();
    for finding in findings {
        *summary.entry(finding.severity.clone()).or_insert(0) += 1;
    }
    summary
}

#[cfg(test)]
mod tests {
    use super::*;

    fn finding(severity: &str) -> Finding {
        Finding {
            template_id: "tmpl".into(),
            matched_at: "http://a".into(),
            severity: severity.into(),
            raw: serde_json::Value::Null,
            observed_at: Utc::now(),
        }
    }

    #[test]
    fn test_summarize_counts_by_severity() {
        let findings = vec![finding("high"), finding("high"), finding("medium")];
        let summary = summarize_by_severity(&findings);
        assert_eq!(summary.get("high"), Some(&2));
        assert_eq!(summary.get("medium"), Some(&1));
        assert_eq!(summary.get("low"), None);
    }

    #[test]
    fn test_summarize_empty() {
        assert!(summarize_by_severity(&[]).is_empty());
    }
}
