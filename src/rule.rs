//! Rule definitions and rule files

use crate::error::EvalError;
use crate::expression::BooleanRuleExpression;
use crate::finding::{FixRegex, Severity};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::path::Path;
use thiserror::Error;

/// How a rule's matches are turned into findings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RuleMode {
    /// Filter matches through the rule's expression
    #[default]
    Search,
    /// Accept every match; taint analysis already filtered them
    Taint,
}

impl fmt::Display for RuleMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleMode::Search => write!(f, "search"),
            RuleMode::Taint => write!(f, "taint"),
        }
    }
}

/// A rule definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rule {
    /// Unique rule identifier (e.g., "no-eval")
    pub id: String,

    /// Message template; `$NAME` placeholders are interpolated
    pub message: String,

    #[serde(default)]
    pub severity: Severity,

    #[serde(default)]
    pub mode: RuleMode,

    /// Root of the matching logic; may be omitted in taint mode
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expression: Option<BooleanRuleExpression>,

    /// Fix template; `$NAME` placeholders are interpolated
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fix: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fix_regex: Option<FixRegex>,

    /// Free-form metadata copied onto every finding
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,

    #[serde(default)]
    pub languages: Vec<String>,
}

impl Rule {
    /// Create a search-mode rule
    pub fn new(id: &str, expression: BooleanRuleExpression, message: &str) -> Self {
        Self {
            id: id.to_string(),
            message: message.to_string(),
            severity: Severity::Warning,
            mode: RuleMode::Search,
            expression: Some(expression),
            fix: None,
            fix_regex: None,
            metadata: BTreeMap::new(),
            languages: Vec::new(),
        }
    }

    /// Create a taint-mode rule
    pub fn taint(id: &str, message: &str) -> Self {
        Self {
            id: id.to_string(),
            message: message.to_string(),
            severity: Severity::Warning,
            mode: RuleMode::Taint,
            expression: None,
            fix: None,
            fix_regex: None,
            metadata: BTreeMap::new(),
            languages: Vec::new(),
        }
    }

    /// Set the severity
    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    /// Set the mode
    pub fn with_mode(mut self, mode: RuleMode) -> Self {
        self.mode = mode;
        self
    }

    /// Set the fix template
    pub fn with_fix(mut self, fix: &str) -> Self {
        self.fix = Some(fix.to_string());
        self
    }

    pub fn with_fix_regex(mut self, fix_regex: FixRegex) -> Self {
        self.fix_regex = Some(fix_regex);
        self
    }

    /// Add a metadata entry
    pub fn with_metadata(mut self, key: &str, value: serde_json::Value) -> Self {
        self.metadata.insert(key.to_string(), value);
        self
    }

    pub fn with_language(mut self, language: &str) -> Self {
        self.languages.push(language.to_string());
        self
    }

    pub fn is_taint(&self) -> bool {
        self.mode == RuleMode::Taint
    }

    /// The expression a search-mode rule evaluates
    pub fn expression(&self) -> Result<&BooleanRuleExpression, EvalError> {
        self.expression.as_ref().ok_or_else(|| {
            EvalError::schema(format!("rule '{}' has no expression", self.id))
        })
    }

    /// Whether evaluating this rule needs the arbitrary-code-execution capability
    pub fn needs_code_execution(&self) -> bool {
        !self.is_taint()
            && self
                .expression
                .as_ref()
                .is_some_and(BooleanRuleExpression::uses_where_predicate)
    }

    /// Check the rule is usable
    pub fn validate(&self) -> Result<(), RuleLoadError> {
        if self.id.trim().is_empty() {
            return Err(RuleLoadError::Invalid("rule id must not be empty".to_string()));
        }
        if self.mode == RuleMode::Search && self.expression.is_none() {
            return Err(RuleLoadError::Invalid(format!(
                "search rule '{}' needs an expression",
                self.id
            )));
        }
        Ok(())
    }
}

/// Error loading rules
#[derive(Debug, Error)]
pub enum RuleLoadError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error in {file}: {message}")]
    Parse { file: String, message: String },

    #[error("Invalid rule: {0}")]
    Invalid(String),
}

/// Rule file format (for loading from YAML/JSON)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleFile {
    /// File format version
    #[serde(default)]
    pub version: Option<String>,

    /// Rules defined in this file
    pub rules: Vec<Rule>,
}

impl RuleFile {
    /// Load and validate a `.yaml`, `.yml` or `.json` rule file
    pub fn load(path: &Path) -> Result<Self, RuleLoadError> {
        let content = std::fs::read_to_string(path)?;
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        let parse_error = |message: String| RuleLoadError::Parse {
            file: path.display().to_string(),
            message,
        };

        let file: RuleFile = match ext {
            "yaml" | "yml" => {
                serde_yaml::from_str(&content).map_err(|e| parse_error(e.to_string()))?
            }
            "json" => serde_json::from_str(&content).map_err(|e| parse_error(e.to_string()))?,
            _ => {
                return Err(RuleLoadError::Invalid(format!(
                    "Unsupported rule file format: {}",
                    ext
                )))
            }
        };
        file.validate()?;
        Ok(file)
    }

    /// Validate every rule and reject duplicate ids
    pub fn validate(&self) -> Result<(), RuleLoadError> {
        let mut seen = HashSet::new();
        for rule in &self.rules {
            rule.validate()?;
            if !seen.insert(rule.id.as_str()) {
                return Err(RuleLoadError::Invalid(format!(
                    "duplicate rule id '{}'",
                    rule.id
                )));
            }
        }
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<&Rule> {
        self.rules.iter().find(|r| r.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::expression::LeafOperator;
    use std::io::Write;
    use tempfile::Builder;

    #[test]
    fn test_rule_creation() {
        let rule = Rule::new(
            "no-eval",
            BooleanRuleExpression::leaf(LeafOperator::And, "p1"),
            "avoid $FUNC",
        );
        assert_eq!(rule.id, "no-eval");
        assert_eq!(rule.mode, RuleMode::Search);
        assert_eq!(rule.severity, Severity::Warning);
        assert!(rule.expression().is_ok());
        assert!(!rule.needs_code_execution());
    }

    #[test]
    fn test_rule_builder() {
        let rule = Rule::taint("tainted-sql", "user input reaches $SINK")
            .with_severity(Severity::Error)
            .with_fix("escape($SINK)")
            .with_metadata("cwe", serde_json::json!("CWE-89"))
            .with_language("python");

        assert!(rule.is_taint());
        assert_eq!(rule.severity, Severity::Error);
        assert_eq!(rule.fix.as_deref(), Some("escape($SINK)"));
        assert_eq!(rule.metadata["cwe"], "CWE-89");
        assert_eq!(rule.languages, vec!["python"]);
        assert!(rule.validate().is_ok());
    }

    #[test]
    fn test_search_rule_needs_expression() {
        let rule = Rule::taint("x", "m").with_mode(RuleMode::Search);
        assert!(matches!(rule.validate(), Err(RuleLoadError::Invalid(_))));
        assert_eq!(rule.expression().unwrap_err().kind(), ErrorKind::SchemaViolation);
    }

    #[test]
    fn test_rule_file_deserialize() {
        let yaml = r#"
version: "1.0"
rules:
  - id: eval-in-function
    severity: ERROR
    message: "found $FUNC calling $X"
    fix: "safe_eval($X)"
    metadata:
      category: security
    expression:
      operator: patterns
      children:
        - operator: pattern
          pattern_id: call
        - operator: pattern-inside
          pattern_id: func
  - id: taint-rule
    mode: taint
    message: "tainted"
"#;

        let file: RuleFile = serde_yaml::from_str(yaml).unwrap();
        file.validate().unwrap();
        assert_eq!(file.version, Some("1.0".to_string()));
        assert_eq!(file.rules.len(), 2);

        let rule = file.get("eval-in-function").unwrap();
        assert_eq!(rule.severity, Severity::Error);
        assert_eq!(rule.expression().unwrap().pattern_ids(), vec!["call", "func"]);
        assert_eq!(rule.metadata["category"], "security");

        assert!(file.get("taint-rule").unwrap().is_taint());
        assert!(file.get("missing").is_none());
    }

    #[test]
    fn test_needs_code_execution() {
        let yaml = r#"
id: where-rule
message: m
expression:
  operator: patterns
  children:
    - operator: pattern
      pattern_id: p1
    - operator: pattern-where
      operand: "$X == 'a'"
"#;
        let rule: Rule = serde_yaml::from_str(yaml).unwrap();
        assert!(rule.needs_code_execution());
        assert!(!rule.clone().with_mode(RuleMode::Taint).needs_code_execution());
    }

    #[test]
    fn test_load_rule_file() {
        let mut file = Builder::new().suffix(".json").tempfile().unwrap();
        write!(
            file,
            r#"{{"rules": [{{"id": "r1", "message": "m", "expression": {{"operator": "AND", "pattern_id": "p1"}}}}]}}"#
        )
        .unwrap();

        let loaded = RuleFile::load(file.path()).unwrap();
        assert_eq!(loaded.rules.len(), 1);
        assert_eq!(loaded.rules[0].id, "r1");
    }

    #[test]
    fn test_load_rejects_duplicates_and_bad_input() {
        let mut file = Builder::new().suffix(".yaml").tempfile().unwrap();
        write!(
            file,
            "rules:\n  - {{id: r1, message: m, mode: taint}}\n  - {{id: r1, message: m, mode: taint}}\n"
        )
        .unwrap();
        let err = RuleFile::load(file.path()).unwrap_err();
        assert!(err.to_string().contains("duplicate rule id 'r1'"));

        let mut bad = Builder::new().suffix(".yaml").tempfile().unwrap();
        write!(
            bad,
            "rules:\n  - id: r2\n    message: m\n    expression: {{operator: AND_MAYBE}}\n"
        )
        .unwrap();
        assert!(matches!(
            RuleFile::load(bad.path()),
            Err(RuleLoadError::Parse { .. })
        ));

        let txt = Builder::new().suffix(".txt").tempfile().unwrap();
        assert!(matches!(
            RuleFile::load(txt.path()),
            Err(RuleLoadError::Invalid(_))
        ));
    }

    #[test]
    fn test_rule_load_error_display() {
        let err = RuleLoadError::Parse {
            file: "rules.yaml".to_string(),
            message: "invalid syntax".to_string(),
        };
        assert_eq!(format!("{}", err), "Parse error in rules.yaml: invalid syntax");
    }
}
