//! match-eval - rule expression evaluation for a pattern matching engine
//!
//! A matcher finds every occurrence of each sub-pattern of a rule. This crate
//! takes those pattern matches and decides which of them become findings, by
//! evaluating the rule's boolean expression over their source ranges.
//!
//! # Architecture
//!
//! ```text
//! CLI/API -> Engine -> evaluate -> Evaluator -> filters -> materialize -> Finding
//! ```
//!
//! The engine loads configuration, evaluates every (rule, file) unit in
//! parallel, and collects findings, failures and traces into a report.
//!
//! # Rule format
//!
//! ```yaml
//! rules:
//!   - id: eval-in-function
//!     message: "$FUNC calls eval on $X"
//!     severity: error
//!     expression:
//!       operator: patterns
//!       children:
//!         - operator: pattern
//!           pattern_id: call
//!         - operator: pattern-inside
//!           pattern_id: func
//!         - operator: metavariable-regex
//!           operand: {metavariable: $X, regex: "user_.*"}
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod evaluator;
pub mod expression;
pub mod filters;
pub mod finding;
pub mod materialize;
pub mod output;
pub mod pattern_match;
pub mod predicate;
pub mod range;
pub mod registry;
pub mod rule;
pub mod trace;

// Re-export main types
pub use config::Config;
pub use engine::{Engine, EvaluationReport, EvaluationUnit, RuleFailure, RuleTiming};
pub use error::{ErrorKind, EvalError, RuleError};
pub use evaluator::{evaluate, evaluate_expression, EvaluationFlags};
pub use expression::{
    BooleanRuleExpression, CompositeOperator, LeafExpression, LeafOperator, MetavariableOperand,
    Operand, Operator,
};
pub use finding::{Finding, FixRegex, Severity};
pub use output::{JsonFormatter, OutputFormat, OutputFormatter, TextFormatter};
pub use pattern_match::{MetavariableBinding, PatternMatch};
pub use predicate::Predicate;
pub use range::{Range, RangeSet};
pub use registry::PatternMatchRegistry;
pub use rule::{Rule, RuleFile, RuleMode};
pub use trace::{EvaluationStep, Trace};
