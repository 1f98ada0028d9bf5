//! Metavariable-scoped range filters
//!
//! These back the `metavariable-regex`, `metavariable-comparison` and
//! `pattern-where` operators. A range or match that a filter cannot judge
//! (missing binding, unparseable number, failing predicate) is dropped with
//! a log line; only malformed operands are errors.

use crate::error::EvalError;
use crate::expression::MetavariableOperand;
use crate::pattern_match::PatternMatch;
use crate::predicate::{Predicate, PredicateError, Scope, Value};
use crate::range::{Range, RangeSet};
use log::{debug, error};
use regex::Regex;
use std::collections::BTreeMap;
use std::num::IntErrorKind;

/// Compile `pattern` so it only matches at the start of the text
pub fn anchored_regex(pattern: &str) -> Result<Regex, EvalError> {
    Regex::new(&format!(r"\A(?:{})", pattern)).map_err(|source| EvalError::InvalidRegex {
        pattern: pattern.to_string(),
        source,
    })
}

/// Keep candidate ranges where some match at that range binds the
/// metavariable to text matching the operand's regex at its start
pub fn metavariable_regex(
    candidates: &RangeSet,
    matches: &[&PatternMatch],
    operand: &MetavariableOperand,
) -> Result<RangeSet, EvalError> {
    let pattern = operand.regex.as_deref().ok_or_else(|| {
        EvalError::schema(format!(
            "metavariable-regex on '{}' requires a regex",
            operand.metavariable
        ))
    })?;
    let regex = anchored_regex(pattern)?;
    let metavariable = operand.metavariable.as_str();

    Ok(retain_bound(candidates, metavariable, |range| {
        matches.iter().any(|pm| {
            pm.range == *range
                && pm
                    .metavariable_value(metavariable)
                    .is_ok_and(|text| regex.is_match(text))
        })
    }))
}

/// Keep candidate ranges where some match at that range binds the
/// metavariable to a number satisfying the operand's comparison
pub fn metavariable_comparison(
    candidates: &RangeSet,
    matches: &[&PatternMatch],
    operand: &MetavariableOperand,
) -> Result<RangeSet, EvalError> {
    let source = operand.comparison.as_deref().ok_or_else(|| {
        EvalError::schema(format!(
            "metavariable-comparison on '{}' requires a comparison",
            operand.metavariable
        ))
    })?;
    let comparison =
        Predicate::parse(source).map_err(|source_err| EvalError::InvalidExpression {
            expression: source.to_string(),
            source: source_err,
        })?;
    let metavariable = operand.metavariable.as_str();
    let strip = operand.strip.unwrap_or(false);

    Ok(retain_bound(candidates, metavariable, |range| {
        matches.iter().any(|pm| {
            if pm.range != *range {
                return false;
            }
            let Ok(text) = pm.metavariable_value(metavariable) else {
                return false;
            };
            let Some(number) = parse_number(text, strip, operand.base) else {
                debug!(
                    "metavariable '{}' incorrect comparison type '{}'",
                    metavariable, text
                );
                return false;
            };
            let scope = Scope::new().with(metavariable, number);
            match comparison.evaluate(&scope) {
                Ok(value) => value.truthy(),
                Err(e) => {
                    debug!("comparison '{}' failed on {}: {}", source, range, e);
                    false
                }
            }
        })
    }))
}

fn retain_bound<F>(candidates: &RangeSet, metavariable: &str, mut keep: F) -> RangeSet
where
    F: FnMut(&Range) -> bool,
{
    candidates
        .iter()
        .filter(|range| {
            if !range.binds(metavariable) {
                debug!("metavariable '{}' missing in range '{}'", metavariable, range);
                return false;
            }
            keep(range)
        })
        .cloned()
        .collect()
}

/// Parse bound text as a number: a float when it contains `.`, otherwise an
/// integer in `base` (10 when absent). Integers too wide for `i64` become
/// floats.
pub fn parse_number(text: &str, strip: bool, base: Option<u32>) -> Option<Value> {
    let text = if strip {
        text.trim_matches(|c: char| matches!(c, '"' | '\'' | '`'))
    } else {
        text
    };
    if text.contains('.') {
        return parse_float(text).map(Value::Float);
    }
    parse_int(text, base.unwrap_or(10))
}

fn parse_float(text: &str) -> Option<f64> {
    let cleaned = strip_separators(text.trim())?;
    cleaned.parse::<f64>().ok()
}

/// Integer literal with optional sign, `_` separators and a base prefix
fn parse_int(text: &str, base: u32) -> Option<Value> {
    if !(2..=36).contains(&base) {
        return None;
    }
    let text = text.trim();
    let (negative, digits) = match text.as_bytes().first() {
        Some(b'-') => (true, &text[1..]),
        Some(b'+') => (false, &text[1..]),
        _ => (false, text),
    };
    let prefix = match base {
        16 => ["0x", "0X"],
        8 => ["0o", "0O"],
        2 => ["0b", "0B"],
        _ => ["", ""],
    };
    let digits = prefix
        .iter()
        .filter(|p| !p.is_empty())
        .find_map(|p| digits.strip_prefix(*p))
        .map(|rest| rest.strip_prefix('_').unwrap_or(rest))
        .unwrap_or(digits);
    let digits = strip_separators(digits)?;
    if digits.is_empty() || digits.starts_with(['+', '-']) {
        return None;
    }
    let signed = if negative {
        format!("-{}", digits)
    } else {
        digits.clone()
    };
    match i64::from_str_radix(&signed, base) {
        Ok(n) => Some(Value::Int(n)),
        Err(e) if matches!(e.kind(), IntErrorKind::PosOverflow | IntErrorKind::NegOverflow) => {
            let magnitude = wide_magnitude(&digits, base)?;
            Some(Value::Float(if negative { -magnitude } else { magnitude }))
        }
        Err(_) => None,
    }
}

fn wide_magnitude(digits: &str, base: u32) -> Option<f64> {
    if base == 10 {
        return digits.parse::<f64>().ok();
    }
    digits.chars().try_fold(0f64, |acc, c| {
        c.to_digit(base)
            .map(|d| acc * f64::from(base) + f64::from(d))
    })
}

/// Remove single `_` separators between digits; reject misplaced ones
fn strip_separators(text: &str) -> Option<String> {
    if text.starts_with('_') || text.ends_with('_') || text.contains("__") {
        return None;
    }
    Some(text.replace('_', ""))
}

/// Keep the ranges of matches inside the candidate set whose bindings
/// satisfy `predicate`.
///
/// A predicate that does not parse, or that fails on a match, rejects that
/// match. A predicate that evaluates to anything other than a boolean is a
/// schema violation.
pub fn where_predicate(
    candidates: &RangeSet,
    matches: &[&PatternMatch],
    source: &str,
) -> Result<RangeSet, EvalError> {
    let predicate = match Predicate::parse(source) {
        Ok(predicate) => predicate,
        Err(e) => {
            error!(
                "received error '{}' while evaluating where expression '{}'",
                e, source
            );
            return Ok(RangeSet::new());
        }
    };

    let mut output = RangeSet::new();
    for pm in matches {
        if !candidates.contains(&pm.range) {
            continue;
        }
        if predicate_holds(&predicate, pm)? {
            output.insert(pm.range.clone());
        }
    }
    Ok(output)
}

fn predicate_holds(predicate: &Predicate, pm: &PatternMatch) -> Result<bool, EvalError> {
    let vars: BTreeMap<String, Value> = pm
        .metavariables
        .iter()
        .map(|(name, binding)| (name.clone(), Value::Str(binding.abstract_content.clone())))
        .collect();
    let mut scope = Scope::new();
    for (name, value) in &vars {
        scope.bind(name.clone(), value.clone());
    }
    scope.bind("vars", Value::Map(vars));

    match predicate.evaluate(&scope) {
        Ok(Value::Bool(b)) => Ok(b),
        Ok(other) => Err(EvalError::schema(format!(
            "where expression '{}' needs boolean output but got {}",
            predicate.source(),
            other
        ))),
        Err(PredicateError::UnboundVariable(name)) => {
            error!(
                "could not find metavariable {} while evaluating where expression '{}', \
                 consider case where metavariable is missing",
                name,
                predicate.source()
            );
            Ok(false)
        }
        Err(e) => {
            error!(
                "received error '{}' while evaluating where expression '{}'",
                e,
                predicate.source()
            );
            Ok(false)
        }
    }
}
