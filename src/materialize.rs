//! Turning surviving ranges into findings
//!
//! Messages may reference metavariables bound by an enclosing match (for
//! example a `pattern-inside` that binds `$FUNC`), so message interpolation
//! looks beyond the match itself. Fix interpolation does not.

use crate::error::EvalError;
use crate::finding::Finding;
use crate::pattern_match::PatternMatch;
use crate::range::RangeSet;
use crate::rule::Rule;
use regex::Regex;

/// Anything in a fix template that may name a binding, e.g. `$X`, `$...ARGS`, `$1`
const FIX_TOKEN: &str = r"\$(?:\.\.\.)?[A-Za-z0-9_]+";

/// Shape of a metavariable name: `$NAME` or `$...NAME`
const METAVARIABLE_NAME: &str = r"\A\$(?:\.\.\.)?[A-Z_][A-Z0-9_]*\z";

fn compile(pattern: &str) -> Result<Regex, EvalError> {
    Regex::new(pattern).map_err(|source| EvalError::InvalidRegex {
        pattern: pattern.to_string(),
        source,
    })
}

/// Metavariable names across `matches`, in first-seen order
fn metavariable_names(matches: &[PatternMatch]) -> Vec<&str> {
    let mut names: Vec<&str> = Vec::new();
    for pm in matches {
        for name in pm.metavariables.keys() {
            if !names.contains(&name.as_str()) {
                names.push(name);
            }
        }
    }
    names
}

/// Substitute metavariables in `template` for the finding built from `pm`.
///
/// A name the match does not bind takes its value from the first match in
/// `matches` that binds it and encloses `pm`. Names bound nowhere suitable
/// are left as written.
pub fn interpolate_message(template: &str, pm: &PatternMatch, matches: &[PatternMatch]) -> String {
    let mut message = template.to_string();
    for name in metavariable_names(matches) {
        if !message.contains(name) {
            continue;
        }
        let replacement = pm.metavariable_value(name).ok().or_else(|| {
            matches
                .iter()
                .filter(|other| other.binds(name))
                .find(|other| other.range.encloses_or_equals(&pm.range))
                .and_then(|other| other.metavariable_value(name).ok())
        });
        if let Some(text) = replacement {
            message = message.replace(name, text);
        }
    }
    message
}

/// Substitute every binding of `pm` into a fix template.
///
/// Each token takes the longest binding name it starts with, so `$XY` is
/// never read as `$X`. A token shaped like a metavariable that `pm` does not
/// bind is an error; other unbound tokens (`$1`, `$home`) stay as written.
pub fn interpolate_fix(template: &str, pm: &PatternMatch) -> Result<String, EvalError> {
    let token = compile(FIX_TOKEN)?;
    let metavariable = compile(METAVARIABLE_NAME)?;

    let mut names: Vec<&str> = pm.metavariables.keys().map(String::as_str).collect();
    names.sort_by_key(|name| std::cmp::Reverse(name.len()));

    let mut fix = String::with_capacity(template.len());
    let mut last = 0;
    for m in token.find_iter(template) {
        let text = m.as_str();
        fix.push_str(&template[last..m.start()]);
        match names.iter().find(|name| text.starts_with(**name)) {
            Some(name) => {
                fix.push_str(pm.metavariable_value(name)?);
                fix.push_str(&text[name.len()..]);
            }
            None if metavariable.is_match(text) => {
                return Err(EvalError::FixBindingMiss(text.to_string()));
            }
            None => fix.push_str(text),
        }
        last = m.end();
    }
    fix.push_str(&template[last..]);
    Ok(fix)
}

/// One finding per match whose range survived, in input match order
pub fn materialize(
    rule: &Rule,
    valid_ranges: &RangeSet,
    matches: &[PatternMatch],
) -> Result<Vec<Finding>, EvalError> {
    let mut findings = Vec::new();
    for pm in matches {
        if !valid_ranges.contains(&pm.range) {
            continue;
        }
        let message = interpolate_message(&rule.message, pm, matches);
        let mut finding = Finding::new(&rule.id, pm.range.clone(), &message, rule.severity)
            .with_metadata(rule.metadata.clone())
            .with_metavariables(pm.metavariables.clone());
        if let Some(template) = &rule.fix {
            finding = finding.with_fix(&interpolate_fix(template, pm)?);
        }
        if let Some(fix_regex) = &rule.fix_regex {
            finding = finding.with_fix_regex(fix_regex.clone());
        }
        findings.push(finding);
    }
    Ok(findings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::expression::{BooleanRuleExpression, LeafOperator};
    use crate::finding::FixRegex;
    use crate::range::Range;
    use pretty_assertions::assert_eq;

    fn rule(message: &str) -> Rule {
        Rule::new("r", BooleanRuleExpression::leaf(LeafOperator::And, "call"), message)
    }

    #[test]
    fn test_message_uses_enclosing_binding() {
        let matches = vec![
            PatternMatch::bare("func", 0, 100).bind("$X", "bar"),
            PatternMatch::bare("call", 10, 20).bind("$FUNC", "foo"),
        ];
        let message = interpolate_message("found $FUNC calling $X", &matches[1], &matches);
        assert_eq!(message, "found foo calling bar");
    }

    #[test]
    fn test_message_prefers_own_binding() {
        let matches = vec![
            PatternMatch::bare("outer", 0, 100).bind("$X", "outer"),
            PatternMatch::bare("inner", 10, 20).bind("$X", "inner"),
        ];
        assert_eq!(interpolate_message("$X", &matches[1], &matches), "inner");
    }

    #[test]
    fn test_message_fallback_takes_first_enclosing_in_order() {
        let matches = vec![
            PatternMatch::bare("wide", 0, 100).bind("$C", "wide"),
            PatternMatch::bare("narrow", 5, 50).bind("$C", "narrow"),
            PatternMatch::bare("call", 10, 20),
        ];
        assert_eq!(interpolate_message("in $C", &matches[2], &matches), "in wide");
    }

    #[test]
    fn test_message_leaves_unresolvable_names() {
        let matches = vec![
            PatternMatch::bare("elsewhere", 200, 300).bind("$X", "far"),
            PatternMatch::bare("call", 10, 20),
        ];
        assert_eq!(
            interpolate_message("$X and $UNSEEN", &matches[1], &matches),
            "$X and $UNSEEN"
        );
    }

    #[test]
    fn test_fix_uses_only_own_bindings() {
        let pm = PatternMatch::bare("call", 0, 10)
            .bind("$F", "eval")
            .bind("$...ARGS", "a, b");
        assert_eq!(
            interpolate_fix("safe_$F($...ARGS) # $1", &pm).unwrap(),
            "safe_eval(a, b) # $1"
        );

        let err = interpolate_fix("$F($Y)", &pm).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::FixBindingMiss);
        assert!(err.to_string().contains("$Y"));
    }

    #[test]
    fn test_fix_substitutes_capture_groups_and_lowercase_names() {
        let pm = PatternMatch::bare("re", 0, 10)
            .bind("$1", "abc")
            .bind("$2", "def")
            .bind("$name", "n");
        assert_eq!(interpolate_fix("x($1)", &pm).unwrap(), "x(abc)");
        assert_eq!(interpolate_fix("$2-$1-$name", &pm).unwrap(), "def-abc-n");
        assert_eq!(interpolate_fix("$3 $other", &pm).unwrap(), "$3 $other");
    }

    #[test]
    fn test_fix_binding_prefix_of_longer_token() {
        let pm = PatternMatch::bare("call", 0, 10).bind("$X", "a");
        assert_eq!(interpolate_fix("$X_suffix", &pm).unwrap(), "a_suffix");
    }

    #[test]
    fn test_fix_does_not_clobber_longer_names() {
        let pm = PatternMatch::bare("call", 0, 10)
            .bind("$X", "a")
            .bind("$XY", "b");
        assert_eq!(interpolate_fix("$XY + $X", &pm).unwrap(), "b + a");
    }

    #[test]
    fn test_materialize_keeps_input_order() {
        let matches = vec![
            PatternMatch::bare("call", 30, 40).bind("$F", "c"),
            PatternMatch::bare("call", 0, 10).bind("$F", "a"),
            PatternMatch::bare("call", 50, 60).bind("$F", "dropped"),
            PatternMatch::bare("call", 0, 10).bind("$F", "b"),
        ];
        let valid: RangeSet = [Range::new(0, 10), Range::new(30, 40)].into_iter().collect();
        let rule = rule("call to $F")
            .with_fix("$F()")
            .with_fix_regex(FixRegex::new("x", "y"))
            .with_metadata("cwe", serde_json::json!(95));

        let findings = materialize(&rule, &valid, &matches).unwrap();
        let messages: Vec<_> = findings.iter().map(|f| f.message.as_str()).collect();
        assert_eq!(messages, vec!["call to c", "call to a", "call to b"]);
        assert_eq!(findings[1].fix.as_deref(), Some("a()"));
        assert_eq!(findings[0].fix_regex, Some(FixRegex::new("x", "y")));
        assert_eq!(findings[0].metadata["cwe"], 95);
        assert_eq!(findings[2].metavariables["$F"].abstract_content, "b");
    }

    #[test]
    fn test_materialize_fix_binding_miss_is_fatal() {
        let matches = vec![PatternMatch::bare("call", 0, 10)];
        let valid: RangeSet = [Range::new(0, 10)].into_iter().collect();
        let rule = rule("m").with_fix("$MISSING");
        let err = materialize(&rule, &valid, &matches).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::FixBindingMiss);
    }
}
