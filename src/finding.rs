//! Findings produced by rule evaluation

use crate::error::EvalError;
use crate::pattern_match::MetavariableBinding;
use crate::range::Range;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Severity level of a rule and its findings
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Informational message
    #[serde(alias = "INFO")]
    Info,
    /// Warning - potential issue
    #[default]
    #[serde(alias = "WARNING")]
    Warning,
    /// Error - definite problem
    #[serde(alias = "ERROR")]
    Error,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Info => write!(f, "info"),
            Severity::Warning => write!(f, "warning"),
            Severity::Error => write!(f, "error"),
        }
    }
}

impl std::str::FromStr for Severity {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "info" | "hint" | "note" => Ok(Severity::Info),
            "warning" | "warn" => Ok(Severity::Warning),
            "error" | "err" => Ok(Severity::Error),
            _ => Err(()),
        }
    }
}

/// Regex-based autofix: replace `regex` with `replacement` in the matched text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixRegex {
    pub regex: String,

    pub replacement: String,

    /// Replace only the first `count` occurrences
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<usize>,
}

impl FixRegex {
    pub fn new(regex: &str, replacement: &str) -> Self {
        Self {
            regex: regex.to_string(),
            replacement: replacement.to_string(),
            count: None,
        }
    }

    pub fn with_count(mut self, count: usize) -> Self {
        self.count = Some(count);
        self
    }

    /// Apply the replacement to `text`
    pub fn apply(&self, text: &str) -> Result<String, EvalError> {
        let regex = Regex::new(&self.regex).map_err(|source| EvalError::InvalidRegex {
            pattern: self.regex.clone(),
            source,
        })?;
        let replaced = match self.count {
            Some(count) => regex.replacen(text, count, self.replacement.as_str()),
            None => regex.replace_all(text, self.replacement.as_str()),
        };
        Ok(replaced.into_owned())
    }
}

/// A reported rule match
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    pub rule_id: String,

    /// File the matches came from, when known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,

    pub range: Range,

    /// Message with metavariables interpolated
    pub message: String,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, serde_json::Value>,

    pub severity: Severity,

    /// Fix text with metavariables interpolated
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fix: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fix_regex: Option<FixRegex>,

    /// Bindings of the match this finding came from
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metavariables: BTreeMap<String, MetavariableBinding>,
}

impl Finding {
    pub fn new(rule_id: &str, range: Range, message: &str, severity: Severity) -> Self {
        Self {
            rule_id: rule_id.to_string(),
            path: None,
            range,
            message: message.to_string(),
            metadata: BTreeMap::new(),
            severity,
            fix: None,
            fix_regex: None,
            metavariables: BTreeMap::new(),
        }
    }

    pub fn with_path(mut self, path: PathBuf) -> Self {
        self.path = Some(path);
        self
    }

    pub fn with_fix(mut self, fix: &str) -> Self {
        self.fix = Some(fix.to_string());
        self
    }

    pub fn with_fix_regex(mut self, fix_regex: FixRegex) -> Self {
        self.fix_regex = Some(fix_regex);
        self
    }

    pub fn with_metadata(mut self, metadata: BTreeMap<String, serde_json::Value>) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_metavariables(mut self, metavariables: BTreeMap<String, MetavariableBinding>) -> Self {
        self.metavariables = metavariables;
        self
    }

    pub fn has_fix(&self) -> bool {
        self.fix.is_some() || self.fix_regex.is_some()
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }

    pub fn is_warning(&self) -> bool {
        self.severity == Severity::Warning
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Error > Severity::Warning);
        assert!(Severity::Warning > Severity::Info);
    }

    #[test]
    fn test_severity_from_str() {
        assert_eq!("error".parse::<Severity>(), Ok(Severity::Error));
        assert_eq!("WARNING".parse::<Severity>(), Ok(Severity::Warning));
        assert_eq!("hint".parse::<Severity>(), Ok(Severity::Info));
        assert!("fatal".parse::<Severity>().is_err());
    }

    #[test]
    fn test_severity_deserialize_upper_case() {
        let sev: Severity = serde_yaml::from_str("ERROR").unwrap();
        assert_eq!(sev, Severity::Error);
        let sev: Severity = serde_yaml::from_str("info").unwrap();
        assert_eq!(sev, Severity::Info);
    }

    #[test]
    fn test_fix_regex_apply() {
        let fix = FixRegex::new(r"(\w+)\.unwrap\(\)", "$1?");
        assert_eq!(fix.apply("a.unwrap() + b.unwrap()").unwrap(), "a? + b?");

        let first_only = fix.clone().with_count(1);
        assert_eq!(first_only.apply("a.unwrap() + b.unwrap()").unwrap(), "a? + b.unwrap()");

        let broken = FixRegex::new("(", "");
        assert!(broken.apply("x").is_err());
    }

    #[test]
    fn test_finding_builder() {
        let finding = Finding::new("no-eval", Range::new(0, 4), "avoid eval", Severity::Error)
            .with_path(PathBuf::from("app.py"))
            .with_fix("safe_eval");
        assert!(finding.is_error());
        assert!(!finding.is_warning());
        assert!(finding.has_fix());
        assert_eq!(finding.path.as_deref(), Some(std::path::Path::new("app.py")));
    }
}
