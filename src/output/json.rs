//! JSON output formatter

use super::OutputFormatter;
use crate::engine::{EvaluationReport, RuleFailure, UnitTrace};
use crate::finding::{Finding, FixRegex};
use crate::pattern_match::MetavariableBinding;
use serde::Serialize;
use std::collections::BTreeMap;

/// JSON formatter for machine-readable output
#[derive(Default)]
pub struct JsonFormatter {
    /// Pretty print with indentation
    pub pretty: bool,
}

impl JsonFormatter {
    /// Create a new JSON formatter
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable pretty printing
    pub fn pretty(mut self) -> Self {
        self.pretty = true;
        self
    }

    fn render<T: Serialize>(&self, value: &T) -> String {
        if self.pretty {
            serde_json::to_string_pretty(value).unwrap_or_default()
        } else {
            serde_json::to_string(value).unwrap_or_default()
        }
    }
}

#[derive(Serialize)]
struct JsonOutput<'a> {
    findings: Vec<JsonFinding<'a>>,
    failures: &'a [RuleFailure],
    #[serde(skip_serializing_if = "no_traces")]
    traces: &'a [UnitTrace],
    summary: JsonSummary,
}

#[derive(Serialize)]
struct JsonFinding<'a> {
    rule_id: &'a str,
    severity: String,
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    path: Option<String>,
    start: usize,
    end: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    fix: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    fix_regex: Option<&'a FixRegex>,
    #[serde(skip_serializing_if = "is_empty_map")]
    metadata: &'a BTreeMap<String, serde_json::Value>,
    #[serde(skip_serializing_if = "is_empty_map")]
    metavariables: &'a BTreeMap<String, MetavariableBinding>,
}

impl<'a> From<&'a Finding> for JsonFinding<'a> {
    fn from(f: &'a Finding) -> Self {
        Self {
            rule_id: &f.rule_id,
            severity: f.severity.to_string(),
            message: &f.message,
            path: f.path.as_ref().map(|p| p.display().to_string()),
            start: f.range.start,
            end: f.range.end,
            fix: f.fix.as_deref(),
            fix_regex: f.fix_regex.as_ref(),
            metadata: &f.metadata,
            metavariables: &f.metavariables,
        }
    }
}

fn no_traces(traces: &&[UnitTrace]) -> bool {
    traces.is_empty()
}

fn is_empty_map<K, V>(map: &&BTreeMap<K, V>) -> bool {
    map.is_empty()
}

#[derive(Serialize)]
struct JsonSummary {
    units_processed: usize,
    units_skipped: usize,
    finding_count: usize,
    failure_count: usize,
    exit_code: i32,
    duration_ms: u128,
}

impl OutputFormatter for JsonFormatter {
    fn format(&self, report: &EvaluationReport) -> String {
        let output = JsonOutput {
            findings: report.findings.iter().map(JsonFinding::from).collect(),
            failures: &report.failures,
            traces: &report.traces,
            summary: JsonSummary {
                units_processed: report.units_processed,
                units_skipped: report.units_skipped,
                finding_count: report.findings.len(),
                failure_count: report.failures.len(),
                exit_code: report.exit_code(),
                duration_ms: report.duration.as_millis(),
            },
        };
        self.render(&output)
    }

    fn format_finding(&self, finding: &Finding) -> String {
        self.render(&JsonFinding::from(finding))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::finding::Severity;
    use crate::range::Range;
    use crate::trace::Trace;
    use std::path::PathBuf;

    fn finding() -> Finding {
        Finding::new("no-eval", Range::new(10, 20), "eval is dangerous", Severity::Error)
            .with_path(PathBuf::from("app.py"))
            .with_fix("safe_eval(x)")
    }

    #[test]
    fn test_json_format_finding() {
        let output = JsonFormatter::new().format_finding(&finding());
        assert!(output.contains("\"rule_id\":\"no-eval\""));
        assert!(output.contains("\"severity\":\"error\""));
        assert!(output.contains("\"start\":10"));
        assert!(output.contains("\"path\":\"app.py\""));
        assert!(output.contains("\"fix\":\"safe_eval(x)\""));
        assert!(!output.contains("metadata"));
    }

    #[test]
    fn test_json_format_report() {
        let report = EvaluationReport {
            findings: vec![finding()],
            failures: vec![RuleFailure {
                rule_id: "bad".to_string(),
                path: None,
                kind: ErrorKind::UnknownOperator,
                message: "unknown operator 'X'".to_string(),
            }],
            units_processed: 5,
            ..Default::default()
        };

        let output = JsonFormatter::new().format(&report);
        let value: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(value["summary"]["units_processed"], 5);
        assert_eq!(value["summary"]["exit_code"], 2);
        assert_eq!(value["failures"][0]["kind"], "unknown-operator");
        assert_eq!(value["findings"][0]["end"], 20);
        assert!(value.get("traces").is_none());
    }

    #[test]
    fn test_json_includes_traces() {
        let report = EvaluationReport {
            traces: vec![UnitTrace {
                rule_id: "r".to_string(),
                path: None,
                trace: Trace::default(),
            }],
            ..Default::default()
        };
        let output = JsonFormatter::new().pretty().format(&report);
        assert!(output.contains('\n'));
        assert!(output.contains("\"traces\""));
    }
}
