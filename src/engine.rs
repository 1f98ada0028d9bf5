//! Batch evaluation engine
//!
//! Each (rule, file) unit is evaluated independently, in parallel when the
//! configuration allows it. A fatal error in one unit becomes a
//! [`RuleFailure`] in the report and never stops the other units.

use crate::config::Config;
use crate::error::{ErrorKind, RuleError, FATAL_EXIT_CODE, NEED_ARBITRARY_CODE_EXEC_EXIT_CODE};
use crate::evaluator::evaluate;
use crate::finding::{Finding, Severity};
use crate::pattern_match::PatternMatch;
use crate::rule::Rule;
use crate::trace::Trace;
use log::{debug, error, warn};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use thiserror::Error;

/// The matches of one rule in one file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EvaluationUnit {
    pub rule_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,

    #[serde(default)]
    pub matches: Vec<PatternMatch>,
}

impl EvaluationUnit {
    pub fn new(rule_id: &str, matches: Vec<PatternMatch>) -> Self {
        Self {
            rule_id: rule_id.to_string(),
            path: None,
            matches,
        }
    }

    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }
}

/// Error loading evaluation units
#[derive(Debug, Error)]
pub enum UnitLoadError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error in {file}: {message}")]
    Parse { file: String, message: String },

    #[error("Unsupported match file format: {0}")]
    UnsupportedFormat(String),
}

/// Load a `.yaml`, `.yml` or `.json` list of evaluation units
pub fn load_units(path: &Path) -> Result<Vec<EvaluationUnit>, UnitLoadError> {
    let content = std::fs::read_to_string(path)?;
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
    let parse_error = |message: String| UnitLoadError::Parse {
        file: path.display().to_string(),
        message,
    };

    match ext {
        "yaml" | "yml" => serde_yaml::from_str(&content).map_err(|e| parse_error(e.to_string())),
        "json" => serde_json::from_str(&content).map_err(|e| parse_error(e.to_string())),
        _ => Err(UnitLoadError::UnsupportedFormat(ext.to_string())),
    }
}

/// A unit whose evaluation failed fatally
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleFailure {
    pub rule_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,

    pub kind: ErrorKind,

    pub message: String,
}

impl RuleFailure {
    fn from_error(err: &RuleError, path: Option<PathBuf>) -> Self {
        Self {
            rule_id: err.rule_id.clone(),
            path,
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

/// Trace of one evaluated unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitTrace {
    pub rule_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,

    pub trace: Trace,
}

/// Per-rule timing statistics
#[derive(Debug, Clone, Default)]
pub struct RuleTiming {
    /// Rule ID
    pub rule_id: String,
    /// Total time spent on this rule
    pub total_time: Duration,
    /// Number of times the rule was evaluated
    pub evaluation_count: usize,
    /// Number of findings produced
    pub finding_count: usize,
}

impl RuleTiming {
    /// Create a new timing entry
    pub fn new(rule_id: &str) -> Self {
        Self {
            rule_id: rule_id.to_string(),
            ..Default::default()
        }
    }

    /// Average time per evaluation
    pub fn avg_time(&self) -> Duration {
        if self.evaluation_count > 0 {
            self.total_time / self.evaluation_count as u32
        } else {
            Duration::ZERO
        }
    }
}

/// Result of evaluating a batch of units
#[derive(Debug, Default)]
pub struct EvaluationReport {
    /// Findings, in unit order then match order
    pub findings: Vec<Finding>,

    /// Units that failed fatally
    pub failures: Vec<RuleFailure>,

    /// Traces, when collection is enabled
    pub traces: Vec<UnitTrace>,

    /// Units evaluated (failed ones included)
    pub units_processed: usize,

    /// Units skipped because their rule is disabled
    pub units_skipped: usize,

    /// Processing duration
    pub duration: Duration,

    /// Per-rule timing statistics (rule_id -> timing)
    pub rule_timings: HashMap<String, RuleTiming>,
}

impl EvaluationReport {
    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }

    /// Number of findings with the given severity
    pub fn count(&self, severity: Severity) -> usize {
        self.findings.iter().filter(|f| f.severity == severity).count()
    }

    /// Get exit code (0 = clean, 1 = findings, 2 = failures, 6 = a rule
    /// needed arbitrary code execution)
    pub fn exit_code(&self) -> i32 {
        if self
            .failures
            .iter()
            .any(|f| f.kind == ErrorKind::ExecutionNotAllowed)
        {
            NEED_ARBITRARY_CODE_EXEC_EXIT_CODE
        } else if self.has_failures() {
            FATAL_EXIT_CODE
        } else if !self.findings.is_empty() {
            1
        } else {
            0
        }
    }

    /// Merge another report into this one
    pub fn merge(&mut self, other: EvaluationReport) {
        self.findings.extend(other.findings);
        self.failures.extend(other.failures);
        self.traces.extend(other.traces);
        self.units_processed += other.units_processed;
        self.units_skipped += other.units_skipped;

        for (rule_id, timing) in other.rule_timings {
            let entry = self
                .rule_timings
                .entry(rule_id)
                .or_insert_with(|| RuleTiming::new(&timing.rule_id));
            entry.total_time += timing.total_time;
            entry.evaluation_count += timing.evaluation_count;
            entry.finding_count += timing.finding_count;
        }
    }

    /// Get rule timings sorted by total time (descending)
    pub fn sorted_timings(&self) -> Vec<&RuleTiming> {
        let mut timings: Vec<_> = self.rule_timings.values().collect();
        timings.sort_by(|a, b| b.total_time.cmp(&a.total_time));
        timings
    }

    /// Format timing statistics as a string
    pub fn format_timings(&self) -> String {
        let timings = self.sorted_timings();
        if timings.is_empty() {
            return "No timing data available".to_string();
        }

        let mut output = String::new();
        output.push_str("Rule Timing Statistics:\n");
        output.push_str(&format!(
            "{:<40} {:>12} {:>12} {:>10} {:>12}\n",
            "Rule ID", "Total", "Avg", "Evals", "Findings"
        ));
        output.push_str(&"-".repeat(90));
        output.push('\n');

        for timing in timings {
            let total_ms = timing.total_time.as_secs_f64() * 1000.0;
            let avg_us = timing.avg_time().as_secs_f64() * 1_000_000.0;
            output.push_str(&format!(
                "{:<40} {:>10.2}ms {:>10.2}µs {:>10} {:>12}\n",
                timing.rule_id, total_ms, avg_us, timing.evaluation_count, timing.finding_count
            ));
        }

        output
    }
}

/// The batch evaluation engine
pub struct Engine {
    config: Config,
}

impl Engine {
    /// Create a new engine with configuration
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Evaluate every unit against its rule
    pub fn evaluate_all(&self, rules: &[Rule], units: &[EvaluationUnit]) -> EvaluationReport {
        let start = Instant::now();
        let by_id: HashMap<&str, &Rule> = rules.iter().map(|r| (r.id.as_str(), r)).collect();

        let pool = if self.config.engine.parallel {
            self.build_pool()
        } else {
            None
        };
        let results: Vec<EvaluationReport> = match pool {
            Some(pool) => pool.install(|| {
                units
                    .par_iter()
                    .map(|unit| self.evaluate_unit(&by_id, unit))
                    .collect()
            }),
            None => units
                .iter()
                .map(|unit| self.evaluate_unit(&by_id, unit))
                .collect(),
        };

        let mut combined = EvaluationReport::default();
        for result in results {
            combined.merge(result);
        }

        combined.duration = start.elapsed();
        combined
    }

    fn build_pool(&self) -> Option<rayon::ThreadPool> {
        let threads = if self.config.engine.jobs > 0 {
            self.config.engine.jobs
        } else {
            num_cpus::get()
        };
        match rayon::ThreadPoolBuilder::new().num_threads(threads).build() {
            Ok(pool) => Some(pool),
            Err(e) => {
                warn!("could not build a thread pool ({}); evaluating sequentially", e);
                None
            }
        }
    }

    /// Evaluate a single unit
    pub fn evaluate_unit(
        &self,
        rules: &HashMap<&str, &Rule>,
        unit: &EvaluationUnit,
    ) -> EvaluationReport {
        let mut report = EvaluationReport::default();

        let Some(rule) = rules.get(unit.rule_id.as_str()) else {
            report.units_processed = 1;
            report.failures.push(RuleFailure {
                rule_id: unit.rule_id.clone(),
                path: unit.path.clone(),
                kind: ErrorKind::SchemaViolation,
                message: format!("unknown rule id '{}'", unit.rule_id),
            });
            return report;
        };

        if !self.config.is_rule_enabled(&rule.id) {
            debug!("skipping disabled rule '{}'", rule.id);
            report.units_skipped = 1;
            return report;
        }

        let rule: Cow<'_, Rule> = match self.config.get_severity_override(&rule.id) {
            Some(severity) => Cow::Owned((*rule).clone().with_severity(severity)),
            None => Cow::Borrowed(*rule),
        };

        let start = Instant::now();
        let allow_exec = self.config.evaluation.allow_arbitrary_code_execution;
        let outcome = evaluate(&rule, &unit.matches, allow_exec);
        let elapsed = start.elapsed();

        let mut timing = RuleTiming::new(&rule.id);
        timing.total_time = elapsed;
        timing.evaluation_count = 1;

        match outcome {
            Ok((findings, trace)) => {
                timing.finding_count = findings.len();
                report.findings = findings
                    .into_iter()
                    .map(|f| match &unit.path {
                        Some(path) => f.with_path(path.clone()),
                        None => f,
                    })
                    .collect();
                if self.config.evaluation.collect_traces {
                    report.traces.push(UnitTrace {
                        rule_id: rule.id.clone(),
                        path: unit.path.clone(),
                        trace,
                    });
                }
            }
            Err(err) => {
                error!("{}", err);
                report.failures.push(RuleFailure::from_error(&err, unit.path.clone()));
            }
        }

        report.units_processed = 1;
        report.rule_timings.insert(rule.id.clone(), timing);
        report
    }
}
