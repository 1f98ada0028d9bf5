//! Source ranges produced by pattern matches

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Ordered set of ranges; iteration order is by `(start, end)`.
pub type RangeSet = BTreeSet<Range>;

/// An interval of source offsets plus the metavariable names bound in it.
///
/// Identity is the interval alone: two ranges with the same `start` and
/// `end` are equal (and hash and order the same) even when their bound
/// names differ.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Range {
    /// Start offset (inclusive)
    pub start: usize,
    /// End offset (exclusive)
    pub end: usize,
    /// Metavariable names bound by the match that produced this range
    #[serde(default)]
    pub vars: BTreeSet<String>,
}

impl Range {
    pub fn new(start: usize, end: usize) -> Self {
        Self {
            start,
            end,
            vars: BTreeSet::new(),
        }
    }

    /// Attach bound metavariable names
    pub fn with_vars<I, S>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.vars = vars.into_iter().map(Into::into).collect();
        self
    }

    /// `self` contains `other` (inclusive of equality)
    pub fn encloses_or_equals(&self, other: &Range) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    /// Whether `name` is bound in this range
    pub fn binds(&self, name: &str) -> bool {
        self.vars.contains(name)
    }

    /// Length of the interval
    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl PartialEq for Range {
    fn eq(&self, other: &Self) -> bool {
        self.start == other.start && self.end == other.end
    }
}

impl Eq for Range {}

impl Hash for Range {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.start.hash(state);
        self.end.hash(state);
    }
}

impl PartialOrd for Range {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Range {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.start, self.end).cmp(&(other.start, other.end))
    }
}

impl fmt::Display for Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}
