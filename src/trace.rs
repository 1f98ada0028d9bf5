//! Step-by-step record of how an expression narrowed the candidate ranges
//!
//! Traces exist for explain/debug output only. Evaluation results never
//! depend on them.

use crate::pattern_match::MetavariableBinding;
use crate::range::{Range, RangeSet};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// The ranges surviving one operator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationStep {
    /// Display name of the operator, e.g. `pattern-inside`
    pub filter: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern_id: Option<String>,

    pub ranges: Vec<Range>,

    /// Bindings seen across the leaf's pattern matches; absent for composites
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metavar_ranges: Option<BTreeMap<String, Vec<MetavariableBinding>>>,
}

impl EvaluationStep {
    pub fn new(filter: &str, pattern_id: Option<&str>, ranges: &RangeSet) -> Self {
        Self {
            filter: filter.to_string(),
            pattern_id: pattern_id.map(String::from),
            ranges: ranges.iter().cloned().collect(),
            metavar_ranges: None,
        }
    }

    pub fn with_metavariables(
        mut self,
        metavar_ranges: BTreeMap<String, Vec<MetavariableBinding>>,
    ) -> Self {
        self.metavar_ranges = Some(metavar_ranges);
        self
    }
}

impl fmt::Display for EvaluationStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.filter)?;
        if let Some(id) = &self.pattern_id {
            write!(f, " ({})", id)?;
        }
        write!(f, ": ")?;
        let ranges: Vec<String> = self.ranges.iter().map(|r| r.to_string()).collect();
        write!(f, "{{{}}}", ranges.join(", "))
    }
}

/// The full record of one evaluation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Trace {
    /// Distinct ranges produced by each pattern before any filtering
    pub initial: BTreeMap<String, Vec<Range>>,

    /// Operator steps, in the order they finished
    pub steps: Vec<EvaluationStep>,
}

impl Trace {
    pub fn new(initial: BTreeMap<String, Vec<Range>>) -> Self {
        Self {
            initial,
            steps: Vec::new(),
        }
    }

    pub fn push(&mut self, step: EvaluationStep) {
        self.steps.push(step);
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// The last step, which holds the final surviving ranges
    pub fn last(&self) -> Option<&EvaluationStep> {
        self.steps.last()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_display() {
        let ranges: RangeSet = [Range::new(0, 4), Range::new(6, 9)].into_iter().collect();
        let step = EvaluationStep::new("pattern-inside", Some("p1"), &ranges);
        assert_eq!(step.to_string(), "pattern-inside (p1): {[0, 4), [6, 9)}");

        let step = EvaluationStep::new("patterns", None, &RangeSet::new());
        assert_eq!(step.to_string(), "patterns: {}");
    }

    #[test]
    fn test_composite_steps_omit_metavariables() {
        let step = EvaluationStep::new("pattern-either", None, &RangeSet::new());
        let value = serde_json::to_value(&step).unwrap();
        assert!(value.get("metavar_ranges").is_none());
        assert!(value.get("pattern_id").is_none());

        let leaf = EvaluationStep::new("pattern", Some("p1"), &RangeSet::new())
            .with_metavariables(BTreeMap::new());
        let value = serde_json::to_value(&leaf).unwrap();
        assert!(value["metavar_ranges"].as_object().unwrap().is_empty());
    }

    #[test]
    fn test_trace_push() {
        let mut trace = Trace::default();
        assert!(trace.is_empty());
        trace.push(EvaluationStep::new("pattern", Some("p1"), &RangeSet::new()));
        assert_eq!(trace.len(), 1);
        assert_eq!(trace.last().unwrap().filter, "pattern");
    }
}
