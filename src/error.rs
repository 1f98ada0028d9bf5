//! Error types for rule evaluation
//!
//! Fatal errors abort the evaluation of one rule against one file and are
//! surfaced as [`RuleError`]. Non-fatal conditions (a metavariable missing in
//! a range, a comparison operand that is not a number, a failing predicate)
//! never become errors: they are logged and the affected range is dropped.

use crate::predicate::PredicateError;
use std::fmt;
use thiserror::Error;

/// Exit code for fatal schema-class errors
pub const FATAL_EXIT_CODE: i32 = 2;

/// Exit code when a rule needs arbitrary code execution but it was not allowed
pub const NEED_ARBITRARY_CODE_EXEC_EXIT_CODE: i32 = 6;

/// Caller-visible discriminant for evaluation errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorKind {
    /// Expression tree or operand does not have the expected shape
    SchemaViolation,
    /// Operator tag is not one the evaluator knows
    UnknownOperator,
    /// `pattern-where` used without the arbitrary-code-execution capability
    ExecutionNotAllowed,
    /// A metavariable was looked up but is not bound
    BindingMiss,
    /// A fix template references a metavariable the match does not bind
    FixBindingMiss,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::SchemaViolation => write!(f, "schema-violation"),
            ErrorKind::UnknownOperator => write!(f, "unknown-operator"),
            ErrorKind::ExecutionNotAllowed => write!(f, "execution-not-allowed"),
            ErrorKind::BindingMiss => write!(f, "binding-miss"),
            ErrorKind::FixBindingMiss => write!(f, "fix-binding-miss"),
        }
    }
}

/// Error raised while building or evaluating a rule expression
#[derive(Debug, Error)]
pub enum EvalError {
    #[error("unknown operator '{0}'")]
    UnknownOperator(String),

    #[error("schema violation: {0}")]
    SchemaViolation(String),

    #[error("invalid regex '{pattern}': {source}")]
    InvalidRegex {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("invalid expression '{expression}': {source}")]
    InvalidExpression {
        expression: String,
        #[source]
        source: PredicateError,
    },

    #[error(
        "at least one rule needs to execute arbitrary code; this is dangerous! \
         if you want to continue, enable the flag: allow_arbitrary_code_execution"
    )]
    ExecutionNotAllowed,

    #[error("metavariable '{0}' is not bound")]
    NotBound(String),

    #[error("fix template references metavariable '{0}' which is not bound by the match")]
    FixBindingMiss(String),
}

impl EvalError {
    /// The caller-visible discriminant of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            EvalError::UnknownOperator(_) => ErrorKind::UnknownOperator,
            EvalError::SchemaViolation(_)
            | EvalError::InvalidRegex { .. }
            | EvalError::InvalidExpression { .. } => ErrorKind::SchemaViolation,
            EvalError::ExecutionNotAllowed => ErrorKind::ExecutionNotAllowed,
            EvalError::NotBound(_) => ErrorKind::BindingMiss,
            EvalError::FixBindingMiss(_) => ErrorKind::FixBindingMiss,
        }
    }

    /// Process exit code a caller should use when reporting this error
    pub fn exit_code(&self) -> i32 {
        match self.kind() {
            ErrorKind::ExecutionNotAllowed => NEED_ARBITRARY_CODE_EXEC_EXIT_CODE,
            _ => FATAL_EXIT_CODE,
        }
    }

    pub(crate) fn schema(message: impl Into<String>) -> Self {
        EvalError::SchemaViolation(message.into())
    }
}

/// A fatal evaluation error tagged with the rule it came from
#[derive(Debug, Error)]
#[error("rule '{rule_id}': {source}")]
pub struct RuleError {
    pub rule_id: String,
    #[source]
    pub source: EvalError,
}

impl RuleError {
    pub fn new(rule_id: &str, source: EvalError) -> Self {
        Self {
            rule_id: rule_id.to_string(),
            source,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.source.kind()
    }

    pub fn exit_code(&self) -> i32 {
        self.source.exit_code()
    }
}
