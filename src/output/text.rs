//! Human-readable text output formatter

use super::OutputFormatter;
use crate::engine::{EvaluationReport, RuleFailure, UnitTrace};
use crate::finding::{Finding, Severity};
use colored::*;
use std::collections::BTreeMap;
use std::path::Path;

/// Text formatter with optional color support
pub struct TextFormatter {
    /// Enable colored output
    pub colored: bool,

    /// Show fix suggestions
    pub show_fixes: bool,

    /// Show evaluation traces
    pub show_traces: bool,

    /// Show statistics
    pub show_stats: bool,
}

impl Default for TextFormatter {
    fn default() -> Self {
        Self {
            colored: true,
            show_fixes: true,
            show_traces: false,
            show_stats: true,
        }
    }
}

impl TextFormatter {
    /// Create a new text formatter
    pub fn new() -> Self {
        Self::default()
    }

    /// Disable colors
    pub fn without_color(mut self) -> Self {
        self.colored = false;
        self
    }

    /// Print evaluation traces after the findings
    pub fn with_traces(mut self) -> Self {
        self.show_traces = true;
        self
    }

    fn severity_str(&self, severity: Severity) -> ColoredString {
        let s = format!("{}", severity);
        if !self.colored {
            return s.normal();
        }
        match severity {
            Severity::Error => s.red().bold(),
            Severity::Warning => s.yellow().bold(),
            Severity::Info => s.blue(),
        }
    }

    fn paint(&self, text: &str, style: fn(&str) -> ColoredString) -> String {
        if self.colored {
            style(text).to_string()
        } else {
            text.to_string()
        }
    }

    fn path_str(path: Option<&Path>) -> String {
        path.map(|p| p.display().to_string())
            .unwrap_or_else(|| "<unknown>".to_string())
    }

    fn format_failure(&self, failure: &RuleFailure) -> String {
        format!(
            "{}: {}[{}]: {}\n",
            Self::path_str(failure.path.as_deref()),
            self.paint("failed", |s| s.red().bold()),
            self.paint(&failure.kind.to_string(), |s| s.cyan()),
            failure.message
        )
    }

    fn format_trace(&self, unit: &UnitTrace) -> String {
        let mut output = format!(
            "{} {}\n",
            self.paint(&unit.rule_id, |s| s.cyan()),
            Self::path_str(unit.path.as_deref())
        );
        for (pattern_id, ranges) in &unit.trace.initial {
            let ranges: Vec<String> = ranges.iter().map(|r| r.to_string()).collect();
            output.push_str(&format!("   {} {}: {{{}}}\n", "·", pattern_id, ranges.join(", ")));
        }
        for step in &unit.trace.steps {
            output.push_str(&format!("   {} {}\n", self.paint("→", |s| s.blue()), step));
        }
        output
    }

    fn plural(count: usize, singular: &str, plural: &str) -> String {
        format!("{} {}", count, if count == 1 { singular } else { plural })
    }
}

impl OutputFormatter for TextFormatter {
    fn format(&self, report: &EvaluationReport) -> String {
        let mut output = String::new();

        // Group findings by file, keeping report order within each file
        let mut by_file: BTreeMap<String, Vec<&Finding>> = BTreeMap::new();
        for finding in &report.findings {
            by_file
                .entry(Self::path_str(finding.path.as_deref()))
                .or_default()
                .push(finding);
        }

        for (file, findings) in &by_file {
            output.push_str(&format!("{}\n", self.paint(file, |s| s.underline())));
            for finding in findings {
                output.push_str(&self.format_finding(finding));
            }
            output.push('\n');
        }

        if !report.failures.is_empty() {
            output.push_str(&format!("{}\n", self.paint("Failures", |s| s.underline())));
            for failure in &report.failures {
                output.push_str(&self.format_failure(failure));
            }
            output.push('\n');
        }

        if self.show_traces && !report.traces.is_empty() {
            output.push_str(&format!("{}\n", self.paint("Traces", |s| s.underline())));
            for unit in &report.traces {
                output.push_str(&self.format_trace(unit));
            }
            output.push('\n');
        }

        if self.show_stats {
            output.push_str(&format!(
                "{} evaluated",
                Self::plural(report.units_processed, "unit", "units")
            ));
            if report.units_skipped > 0 {
                output.push_str(&format!(" ({} skipped)", report.units_skipped));
            }

            let mut counts = Vec::new();
            let errors = report.count(Severity::Error);
            if errors > 0 {
                counts.push(self.paint(&Self::plural(errors, "error", "errors"), |s| s.red()));
            }
            let warnings = report.count(Severity::Warning);
            if warnings > 0 {
                counts.push(
                    self.paint(&Self::plural(warnings, "warning", "warnings"), |s| s.yellow()),
                );
            }
            let infos = report.count(Severity::Info);
            if infos > 0 {
                counts.push(self.paint(&Self::plural(infos, "info", "infos"), |s| s.blue()));
            }
            if report.has_failures() {
                counts.push(self.paint(
                    &Self::plural(report.failures.len(), "failure", "failures"),
                    |s| s.red().bold(),
                ));
            }

            if !counts.is_empty() {
                output.push_str(&format!(": {}", counts.join(", ")));
            }
            output.push('\n');

            output.push_str(&format!(
                "Finished in {:.2}s\n",
                report.duration.as_secs_f64()
            ));
        }

        output
    }

    fn format_finding(&self, finding: &Finding) -> String {
        let mut output = format!(
            "{}:{}: {}[{}]: {}\n",
            Self::path_str(finding.path.as_deref()),
            finding.range,
            self.severity_str(finding.severity),
            self.paint(&finding.rule_id, |s| s.cyan()),
            finding.message
        );

        if self.show_fixes {
            if let Some(fix) = &finding.fix {
                output.push_str(&format!(
                    "   {} fix: {}\n",
                    self.paint("=", |s| s.green()),
                    self.paint(fix, |s| s.green())
                ));
            }
            if let Some(fix_regex) = &finding.fix_regex {
                output.push_str(&format!(
                    "   {} fix-regex: s/{}/{}/\n",
                    self.paint("=", |s| s.green()),
                    fix_regex.regex,
                    fix_regex.replacement
                ));
            }
        }

        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::range::{Range, RangeSet};
    use crate::trace::{EvaluationStep, Trace};
    use std::path::PathBuf;

    #[test]
    fn test_format_finding() {
        let formatter = TextFormatter::new().without_color();
        let finding = Finding::new("no-eval", Range::new(10, 20), "eval of $X", Severity::Error)
            .with_path(PathBuf::from("app.py"))
            .with_fix("safe_eval(x)");

        let output = formatter.format_finding(&finding);
        assert!(output.starts_with("app.py:[10, 20): error[no-eval]: eval of $X"));
        assert!(output.contains("fix: safe_eval(x)"));
    }

    #[test]
    fn test_format_report() {
        let formatter = TextFormatter::new().without_color();
        let report = EvaluationReport {
            findings: vec![Finding::new("r", Range::new(0, 1), "m", Severity::Warning)],
            failures: vec![RuleFailure {
                rule_id: "w".to_string(),
                path: Some(PathBuf::from("b.py")),
                kind: ErrorKind::ExecutionNotAllowed,
                message: "needs exec".to_string(),
            }],
            units_processed: 2,
            ..Default::default()
        };

        let output = formatter.format(&report);
        assert!(output.contains("<unknown>"));
        assert!(output.contains("b.py: failed[execution-not-allowed]: needs exec"));
        assert!(output.contains("2 units evaluated: 1 warning, 1 failure"));
        assert!(output.contains("Finished in"));
    }

    #[test]
    fn test_traces_only_when_requested() {
        let ranges: RangeSet = [Range::new(1, 2)].into_iter().collect();
        let mut trace = Trace::default();
        trace.push(EvaluationStep::new("pattern", Some("p1"), &ranges));
        let report = EvaluationReport {
            traces: vec![UnitTrace {
                rule_id: "r".to_string(),
                path: None,
                trace,
            }],
            ..Default::default()
        };

        let plain = TextFormatter::new().without_color();
        assert!(!plain.format(&report).contains("Traces"));

        let output = TextFormatter::new().without_color().with_traces().format(&report);
        assert!(output.contains("Traces"));
        assert!(output.contains("pattern (p1): {[1, 2)}"));
    }
}
