//! Boolean rule expressions
//!
//! A rule's matching logic is a tree of operators. Leaves filter the current
//! candidate ranges against one pattern's matches (or against metavariable
//! values); composites combine the results of their children.
//!
//! Leaves have no children and composites always have at least one, which
//! is enforced when the tree is built or deserialized.

use crate::error::EvalError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Operators that filter ranges on their own
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LeafOperator {
    And,
    AndNot,
    AndInside,
    AndNotInside,
    Regex,
    NotRegex,
    MetavariableRegex,
    MetavariableComparison,
    WherePredicate,
}

impl LeafOperator {
    pub const ALL: [LeafOperator; 9] = [
        LeafOperator::And,
        LeafOperator::AndNot,
        LeafOperator::AndInside,
        LeafOperator::AndNotInside,
        LeafOperator::Regex,
        LeafOperator::NotRegex,
        LeafOperator::MetavariableRegex,
        LeafOperator::MetavariableComparison,
        LeafOperator::WherePredicate,
    ];

    /// Upper-case tag, e.g. `AND_INSIDE`
    pub fn tag(self) -> &'static str {
        match self {
            LeafOperator::And => "AND",
            LeafOperator::AndNot => "AND_NOT",
            LeafOperator::AndInside => "AND_INSIDE",
            LeafOperator::AndNotInside => "AND_NOT_INSIDE",
            LeafOperator::Regex => "REGEX",
            LeafOperator::NotRegex => "NOT_REGEX",
            LeafOperator::MetavariableRegex => "METAVARIABLE_REGEX",
            LeafOperator::MetavariableComparison => "METAVARIABLE_COMPARISON",
            LeafOperator::WherePredicate => "WHERE_PREDICATE",
        }
    }

    /// Rule-syntax name, e.g. `pattern-inside`; used in traces
    pub fn display_name(self) -> &'static str {
        match self {
            LeafOperator::And => "pattern",
            LeafOperator::AndNot => "pattern-not",
            LeafOperator::AndInside => "pattern-inside",
            LeafOperator::AndNotInside => "pattern-not-inside",
            LeafOperator::Regex => "pattern-regex",
            LeafOperator::NotRegex => "pattern-not-regex",
            LeafOperator::MetavariableRegex => "metavariable-regex",
            LeafOperator::MetavariableComparison => "metavariable-comparison",
            LeafOperator::WherePredicate => "pattern-where",
        }
    }
}

/// Operators that combine child expressions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompositeOperator {
    /// Union of the children (logical OR)
    AndEither,
    /// Intersection of the children (logical AND)
    AndAll,
}

impl CompositeOperator {
    pub fn tag(self) -> &'static str {
        match self {
            CompositeOperator::AndEither => "AND_EITHER",
            CompositeOperator::AndAll => "AND_ALL",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            CompositeOperator::AndEither => "pattern-either",
            CompositeOperator::AndAll => "patterns",
        }
    }
}

/// Any operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Leaf(LeafOperator),
    Composite(CompositeOperator),
}

impl Operator {
    pub fn tag(self) -> &'static str {
        match self {
            Operator::Leaf(op) => op.tag(),
            Operator::Composite(op) => op.tag(),
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Operator::Leaf(op) => op.display_name(),
            Operator::Composite(op) => op.display_name(),
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

impl FromStr for Operator {
    type Err = EvalError;

    /// Accepts both the tag (`AND_NOT`) and the display name (`pattern-not`)
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(op) = LeafOperator::ALL
            .iter()
            .find(|op| op.tag() == s || op.display_name() == s)
        {
            return Ok(Operator::Leaf(*op));
        }
        [CompositeOperator::AndEither, CompositeOperator::AndAll]
            .iter()
            .find(|op| op.tag() == s || op.display_name() == s)
            .map(|op| Operator::Composite(*op))
            .ok_or_else(|| EvalError::UnknownOperator(s.to_string()))
    }
}

/// Structured operand of the metavariable-scoped operators
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetavariableOperand {
    /// Metavariable the filter applies to, e.g. `$X`
    pub metavariable: String,

    /// Regex for `metavariable-regex`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub regex: Option<String>,

    /// Predicate for `metavariable-comparison`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comparison: Option<String>,

    /// Strip surrounding quotes before parsing the bound text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strip: Option<bool>,

    /// Integer base for parsing the bound text (default 10)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base: Option<u32>,
}

impl MetavariableOperand {
    pub fn new(metavariable: &str) -> Self {
        Self {
            metavariable: metavariable.to_string(),
            regex: None,
            comparison: None,
            strip: None,
            base: None,
        }
    }

    pub fn with_regex(mut self, regex: &str) -> Self {
        self.regex = Some(regex.to_string());
        self
    }

    pub fn with_comparison(mut self, comparison: &str) -> Self {
        self.comparison = Some(comparison.to_string());
        self
    }

    pub fn with_strip(mut self, strip: bool) -> Self {
        self.strip = Some(strip);
        self
    }

    pub fn with_base(mut self, base: u32) -> Self {
        self.base = Some(base);
        self
    }
}

/// Payload attached to a leaf
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Operand {
    Text(String),
    Metavariable(MetavariableOperand),
}

impl From<&str> for Operand {
    fn from(text: &str) -> Self {
        Operand::Text(text.to_string())
    }
}

impl From<MetavariableOperand> for Operand {
    fn from(operand: MetavariableOperand) -> Self {
        Operand::Metavariable(operand)
    }
}

/// A leaf of the expression tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeafExpression {
    pub operator: LeafOperator,
    pub pattern_id: Option<String>,
    pub operand: Option<Operand>,
}

impl LeafExpression {
    pub fn new(operator: LeafOperator, pattern_id: Option<&str>) -> Self {
        Self {
            operator,
            pattern_id: pattern_id.map(String::from),
            operand: None,
        }
    }

    pub fn with_operand(mut self, operand: impl Into<Operand>) -> Self {
        self.operand = Some(operand.into());
        self
    }

    /// The operand as a string, or a schema violation
    pub fn text_operand(&self) -> Result<&str, EvalError> {
        match &self.operand {
            Some(Operand::Text(text)) => Ok(text),
            Some(Operand::Metavariable(_)) => Err(EvalError::schema(format!(
                "{} expects a string operand, got a structured one",
                self.operator.display_name()
            ))),
            None => Err(EvalError::schema(format!(
                "{} requires an operand",
                self.operator.display_name()
            ))),
        }
    }

    /// The operand as a metavariable record, or a schema violation
    pub fn metavariable_operand(&self) -> Result<&MetavariableOperand, EvalError> {
        match &self.operand {
            Some(Operand::Metavariable(operand)) => Ok(operand),
            Some(Operand::Text(_)) => Err(EvalError::schema(format!(
                "{} expects a metavariable operand, got a string",
                self.operator.display_name()
            ))),
            None => Err(EvalError::schema(format!(
                "{} requires an operand",
                self.operator.display_name()
            ))),
        }
    }
}

/// A composite node; always has at least one child
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompositeExpression {
    operator: CompositeOperator,
    children: Vec<BooleanRuleExpression>,
}

impl CompositeExpression {
    pub fn new(
        operator: CompositeOperator,
        children: Vec<BooleanRuleExpression>,
    ) -> Result<Self, EvalError> {
        if children.is_empty() {
            return Err(EvalError::schema(format!(
                "{} must have at least one child",
                operator.display_name()
            )));
        }
        Ok(Self { operator, children })
    }

    pub fn operator(&self) -> CompositeOperator {
        self.operator
    }

    pub fn children(&self) -> &[BooleanRuleExpression] {
        &self.children
    }
}

/// A node of the rule expression tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawExpression", into = "RawExpression")]
pub enum BooleanRuleExpression {
    Leaf(LeafExpression),
    Composite(CompositeExpression),
}

/// One node of [`BooleanRuleExpression::flatten`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpressionNode<'a> {
    pub operator: Operator,
    pub pattern_id: Option<&'a str>,
    pub operand: Option<&'a Operand>,
    pub depth: usize,
}

impl BooleanRuleExpression {
    /// Leaf referencing the matches of `pattern_id`
    pub fn leaf(operator: LeafOperator, pattern_id: &str) -> Self {
        LeafExpression::new(operator, Some(pattern_id)).into()
    }

    pub fn composite(
        operator: CompositeOperator,
        children: Vec<BooleanRuleExpression>,
    ) -> Result<Self, EvalError> {
        CompositeExpression::new(operator, children).map(BooleanRuleExpression::Composite)
    }

    /// `pattern-either` over `children`
    pub fn either(children: Vec<BooleanRuleExpression>) -> Result<Self, EvalError> {
        Self::composite(CompositeOperator::AndEither, children)
    }

    /// `patterns` over `children`
    pub fn all(children: Vec<BooleanRuleExpression>) -> Result<Self, EvalError> {
        Self::composite(CompositeOperator::AndAll, children)
    }

    pub fn operator(&self) -> Operator {
        match self {
            BooleanRuleExpression::Leaf(leaf) => Operator::Leaf(leaf.operator),
            BooleanRuleExpression::Composite(c) => Operator::Composite(c.operator),
        }
    }

    pub fn pattern_id(&self) -> Option<&str> {
        match self {
            BooleanRuleExpression::Leaf(leaf) => leaf.pattern_id.as_deref(),
            BooleanRuleExpression::Composite(_) => None,
        }
    }

    /// Pre-order listing of the tree; a composite appears before its children
    pub fn flatten(&self) -> Vec<ExpressionNode<'_>> {
        let mut nodes = Vec::new();
        self.flatten_into(0, &mut nodes);
        nodes
    }

    fn flatten_into<'a>(&'a self, depth: usize, nodes: &mut Vec<ExpressionNode<'a>>) {
        match self {
            BooleanRuleExpression::Leaf(leaf) => nodes.push(ExpressionNode {
                operator: Operator::Leaf(leaf.operator),
                pattern_id: leaf.pattern_id.as_deref(),
                operand: leaf.operand.as_ref(),
                depth,
            }),
            BooleanRuleExpression::Composite(composite) => {
                nodes.push(ExpressionNode {
                    operator: Operator::Composite(composite.operator),
                    pattern_id: None,
                    operand: None,
                    depth,
                });
                for child in &composite.children {
                    child.flatten_into(depth + 1, nodes);
                }
            }
        }
    }

    /// Distinct pattern ids referenced by leaves, in tree order
    pub fn pattern_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = Vec::new();
        for node in self.flatten() {
            if let Some(id) = node.pattern_id {
                if !ids.contains(&id) {
                    ids.push(id);
                }
            }
        }
        ids
    }

    /// Whether any leaf needs the arbitrary-code-execution capability
    pub fn uses_where_predicate(&self) -> bool {
        self.flatten()
            .iter()
            .any(|node| node.operator == Operator::Leaf(LeafOperator::WherePredicate))
    }
}

impl From<LeafExpression> for BooleanRuleExpression {
    fn from(leaf: LeafExpression) -> Self {
        BooleanRuleExpression::Leaf(leaf)
    }
}

impl From<CompositeExpression> for BooleanRuleExpression {
    fn from(composite: CompositeExpression) -> Self {
        BooleanRuleExpression::Composite(composite)
    }
}

/// Flat wire form: `{operator, pattern_id?, operand?, children?}`
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawExpression {
    operator: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pattern_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    operand: Option<Operand>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    children: Option<Vec<BooleanRuleExpression>>,
}

impl TryFrom<RawExpression> for BooleanRuleExpression {
    type Error = EvalError;

    fn try_from(raw: RawExpression) -> Result<Self, Self::Error> {
        match raw.operator.parse::<Operator>()? {
            Operator::Leaf(operator) => {
                if raw.children.is_some() {
                    return Err(EvalError::schema(format!(
                        "leaf operator {} must not have children",
                        operator.display_name()
                    )));
                }
                Ok(BooleanRuleExpression::Leaf(LeafExpression {
                    operator,
                    pattern_id: raw.pattern_id,
                    operand: raw.operand,
                }))
            }
            Operator::Composite(operator) => {
                if raw.pattern_id.is_some() || raw.operand.is_some() {
                    return Err(EvalError::schema(format!(
                        "composite operator {} must not carry a pattern id or operand",
                        operator.display_name()
                    )));
                }
                Self::composite(operator, raw.children.unwrap_or_default())
            }
        }
    }
}

impl From<BooleanRuleExpression> for RawExpression {
    fn from(expr: BooleanRuleExpression) -> Self {
        match expr {
            BooleanRuleExpression::Leaf(leaf) => RawExpression {
                operator: leaf.operator.tag().to_string(),
                pattern_id: leaf.pattern_id,
                operand: leaf.operand,
                children: None,
            },
            BooleanRuleExpression::Composite(composite) => RawExpression {
                operator: composite.operator.tag().to_string(),
                pattern_id: None,
                operand: None,
                children: Some(composite.children),
            },
        }
    }
}
