//! Recursive evaluation of rule expressions over pattern-match ranges
//!
//! Evaluation starts from the union of all match ranges and lets each
//! operator narrow it. Composite children each receive their own copy of the
//! incoming set, so siblings never observe each other's filtering.

use crate::error::{EvalError, RuleError};
use crate::expression::{BooleanRuleExpression, CompositeOperator, LeafExpression, LeafOperator};
use crate::filters;
use crate::finding::Finding;
use crate::materialize::materialize;
use crate::pattern_match::PatternMatch;
use crate::range::{Range, RangeSet};
use crate::registry::PatternMatchRegistry;
use crate::rule::Rule;
use crate::trace::{EvaluationStep, Trace};
use log::debug;
use serde::{Deserialize, Serialize};

/// Capabilities granted to an evaluation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluationFlags {
    /// Allow `pattern-where` predicates to run
    #[serde(default)]
    pub allow_arbitrary_code_execution: bool,
}

impl EvaluationFlags {
    pub fn allow_exec(allow: bool) -> Self {
        Self {
            allow_arbitrary_code_execution: allow,
        }
    }
}

/// Evaluate `root` against every match in `registry`.
///
/// Returns the surviving ranges and the trace of every step, starting with
/// the per-pattern ranges before filtering.
pub fn evaluate_expression(
    root: &BooleanRuleExpression,
    registry: &PatternMatchRegistry<'_>,
    flags: &EvaluationFlags,
) -> Result<(RangeSet, Trace), EvalError> {
    let mut trace = Trace::new(registry.ranges_by_pattern());
    let evaluator = Evaluator {
        registry,
        flags,
        all_matches: registry.all_matches().collect(),
    };
    let ranges = evaluator.eval(root, registry.all_ranges(), &mut trace)?;
    Ok((ranges, trace))
}

/// Evaluate `rule` over the matches of one file and build its findings
pub fn evaluate(
    rule: &Rule,
    matches: &[PatternMatch],
    allow_exec: bool,
) -> Result<(Vec<Finding>, Trace), RuleError> {
    let registry = PatternMatchRegistry::new(matches);
    let flags = EvaluationFlags::allow_exec(allow_exec);

    let (valid_ranges, trace) = if rule.is_taint() {
        let ranges: RangeSet = matches.iter().map(|pm| pm.range.clone()).collect();
        (ranges, Trace::new(registry.ranges_by_pattern()))
    } else {
        let root = rule
            .expression()
            .map_err(|e| RuleError::new(&rule.id, e))?;
        evaluate_expression(root, &registry, &flags).map_err(|e| RuleError::new(&rule.id, e))?
    };
    debug!("rule '{}' compiled result {:?}", rule.id, valid_ranges);

    let findings =
        materialize(rule, &valid_ranges, matches).map_err(|e| RuleError::new(&rule.id, e))?;
    Ok((findings, trace))
}

struct Evaluator<'r, 'a> {
    registry: &'r PatternMatchRegistry<'a>,
    flags: &'r EvaluationFlags,
    all_matches: Vec<&'a PatternMatch>,
}

impl Evaluator<'_, '_> {
    fn eval(
        &self,
        expr: &BooleanRuleExpression,
        candidates: RangeSet,
        trace: &mut Trace,
    ) -> Result<RangeSet, EvalError> {
        match expr {
            BooleanRuleExpression::Leaf(leaf) => self.eval_leaf(leaf, candidates, trace),
            BooleanRuleExpression::Composite(composite) => {
                let mut ranges = candidates;
                match composite.operator() {
                    CompositeOperator::AndEither => {
                        let mut union = RangeSet::new();
                        for child in composite.children() {
                            union.extend(self.eval(child, ranges.clone(), trace)?);
                        }
                        ranges.retain(|r| union.contains(r));
                    }
                    CompositeOperator::AndAll => {
                        // every child sees the set as it was on entry
                        let incoming = ranges.clone();
                        for child in composite.children() {
                            let kept = self.eval(child, incoming.clone(), trace)?;
                            ranges.retain(|r| kept.contains(r));
                        }
                    }
                }
                let name = composite.operator().display_name();
                debug!("after filter `{}`: {:?}", name, ranges);
                trace.push(EvaluationStep::new(name, None, &ranges));
                Ok(ranges)
            }
        }
    }

    fn eval_leaf(
        &self,
        leaf: &LeafExpression,
        mut candidates: RangeSet,
        trace: &mut Trace,
    ) -> Result<RangeSet, EvalError> {
        let pattern_id = leaf.pattern_id.as_deref();
        let pattern_ranges = self.registry.ranges_for(pattern_id);
        let produced = |r: &Range| pattern_ranges.iter().any(|p| *p == r);
        let enclosed = |r: &Range| pattern_ranges.iter().any(|p| p.encloses_or_equals(r));

        let output = match leaf.operator {
            LeafOperator::And | LeafOperator::Regex => {
                candidates.retain(|r| produced(r));
                candidates
            }
            LeafOperator::AndNot => {
                candidates.retain(|r| !produced(r));
                candidates
            }
            LeafOperator::AndInside => {
                candidates.retain(|r| enclosed(r));
                candidates
            }
            LeafOperator::AndNotInside => {
                candidates.retain(|r| !enclosed(r));
                candidates
            }
            LeafOperator::NotRegex => {
                candidates.retain(|r| !pattern_ranges.iter().any(|p| r.encloses_or_equals(p)));
                candidates
            }
            LeafOperator::MetavariableRegex => filters::metavariable_regex(
                &candidates,
                &self.all_matches,
                leaf.metavariable_operand()?,
            )?,
            LeafOperator::MetavariableComparison => filters::metavariable_comparison(
                &candidates,
                &self.all_matches,
                leaf.metavariable_operand()?,
            )?,
            LeafOperator::WherePredicate => {
                if !self.flags.allow_arbitrary_code_execution {
                    return Err(EvalError::ExecutionNotAllowed);
                }
                filters::where_predicate(&candidates, &self.all_matches, leaf.text_operand()?)?
            }
        };

        let name = leaf.operator.display_name();
        debug!("after filter `{}`: {:?}", name, output);
        trace.push(
            EvaluationStep::new(name, pattern_id, &output)
                .with_metavariables(self.registry.metavariable_bindings(pattern_id)),
        );
        Ok(output)
    }
}
