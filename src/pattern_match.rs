//! Pattern matches handed over by the upstream matcher

use crate::error::EvalError;
use crate::range::Range;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Identifier of the sub-pattern that produced a match
pub type PatternId = String;

/// The source text a metavariable was bound to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetavariableBinding {
    /// Bound source text
    pub abstract_content: String,

    /// Start offset of the bound text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<usize>,

    /// End offset of the bound text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<usize>,
}

impl MetavariableBinding {
    pub fn new(abstract_content: &str) -> Self {
        Self {
            abstract_content: abstract_content.to_string(),
            start: None,
            end: None,
        }
    }

    /// Attach the offsets of the bound text
    pub fn at(mut self, start: usize, end: usize) -> Self {
        self.start = Some(start);
        self.end = Some(end);
        self
    }
}

/// One occurrence of a sub-pattern matching source code
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawPatternMatch", into = "RawPatternMatch")]
pub struct PatternMatch {
    pub pattern_id: PatternId,
    pub range: Range,
    pub metavariables: BTreeMap<String, MetavariableBinding>,
}

impl PatternMatch {
    /// Create a match; the range's bound names are taken from `metavariables`
    pub fn new(
        pattern_id: &str,
        start: usize,
        end: usize,
        metavariables: BTreeMap<String, MetavariableBinding>,
    ) -> Self {
        let range = Range::new(start, end).with_vars(metavariables.keys().cloned());
        Self {
            pattern_id: pattern_id.to_string(),
            range,
            metavariables,
        }
    }

    /// Create a match without metavariable bindings
    pub fn bare(pattern_id: &str, start: usize, end: usize) -> Self {
        Self::new(pattern_id, start, end, BTreeMap::new())
    }

    /// Add a binding of `name` to `text`
    pub fn bind(mut self, name: &str, text: &str) -> Self {
        self.metavariables
            .insert(name.to_string(), MetavariableBinding::new(text));
        self.range.vars.insert(name.to_string());
        self
    }

    /// Whether this match binds `name`
    pub fn binds(&self, name: &str) -> bool {
        self.metavariables.contains_key(name)
    }

    /// Bound text of `name`
    pub fn metavariable_value(&self, name: &str) -> Result<&str, EvalError> {
        self.metavariables
            .get(name)
            .map(|b| b.abstract_content.as_str())
            .ok_or_else(|| EvalError::NotBound(name.to_string()))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawPatternMatch {
    #[serde(alias = "id")]
    pattern_id: PatternId,
    start: usize,
    end: usize,
    #[serde(default)]
    metavariables: BTreeMap<String, MetavariableBinding>,
}

impl From<RawPatternMatch> for PatternMatch {
    fn from(raw: RawPatternMatch) -> Self {
        PatternMatch::new(&raw.pattern_id, raw.start, raw.end, raw.metavariables)
    }
}

impl From<PatternMatch> for RawPatternMatch {
    fn from(pm: PatternMatch) -> Self {
        RawPatternMatch {
            pattern_id: pm.pattern_id,
            start: pm.range.start,
            end: pm.range.end,
            metavariables: pm.metavariables,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_range_vars_follow_bindings() {
        let pm = PatternMatch::bare("p1", 0, 10).bind("$X", "foo").bind("$Y", "bar");
        assert!(pm.range.binds("$X"));
        assert!(pm.range.binds("$Y"));
        assert_eq!(pm.range.vars.len(), 2);
    }

    #[test]
    fn test_metavariable_value() {
        let pm = PatternMatch::bare("p1", 0, 10).bind("$X", "foo");
        assert_eq!(pm.metavariable_value("$X").unwrap(), "foo");

        let err = pm.metavariable_value("$Z").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BindingMiss);
    }

    #[test]
    fn test_deserialize_pattern_match() {
        let json = r#"{
            "pattern_id": "p1",
            "start": 4,
            "end": 12,
            "metavariables": {
                "$FUNC": {"abstract_content": "eval", "start": 4, "end": 8}
            }
        }"#;
        let pm: PatternMatch = serde_json::from_str(json).unwrap();
        assert_eq!(pm.pattern_id, "p1");
        assert_eq!(pm.range, Range::new(4, 12));
        assert!(pm.range.binds("$FUNC"));
        assert_eq!(
            pm.metavariables["$FUNC"],
            MetavariableBinding::new("eval").at(4, 8)
        );
    }

    #[test]
    fn test_serialize_flat_shape() {
        let pm = PatternMatch::bare("p2", 1, 3).bind("$X", "a");
        let value = serde_json::to_value(&pm).unwrap();
        assert_eq!(value["pattern_id"], "p2");
        assert_eq!(value["start"], 1);
        assert_eq!(value["end"], 3);
        assert_eq!(value["metavariables"]["$X"]["abstract_content"], "a");
    }
}
