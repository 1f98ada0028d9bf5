//! Pattern matches grouped by the pattern that produced them

use crate::pattern_match::{MetavariableBinding, PatternMatch};
use crate::range::{Range, RangeSet};
use std::collections::BTreeMap;

/// Group matches by pattern id, keeping input order within each group
pub fn group_by_pattern_id(matches: &[PatternMatch]) -> BTreeMap<&str, Vec<&PatternMatch>> {
    let mut by_id: BTreeMap<&str, Vec<&PatternMatch>> = BTreeMap::new();
    for pm in matches {
        by_id.entry(pm.pattern_id.as_str()).or_default().push(pm);
    }
    by_id
}

/// Read-only view over the matches of one (rule, file) pair
#[derive(Debug, Clone)]
pub struct PatternMatchRegistry<'a> {
    by_id: BTreeMap<&'a str, Vec<&'a PatternMatch>>,
}

impl<'a> PatternMatchRegistry<'a> {
    pub fn new(matches: &'a [PatternMatch]) -> Self {
        Self {
            by_id: group_by_pattern_id(matches),
        }
    }

    /// Matches produced by `pattern_id` (empty if none)
    pub fn matches_for(&self, pattern_id: &str) -> &[&'a PatternMatch] {
        self.by_id.get(pattern_id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Ranges produced by `pattern_id`, with duplicates
    pub fn ranges_for(&self, pattern_id: Option<&str>) -> Vec<&'a Range> {
        match pattern_id {
            Some(id) => self.matches_for(id).iter().map(|pm| &pm.range).collect(),
            None => Vec::new(),
        }
    }

    /// Every match, flattened group by group
    pub fn all_matches(&self) -> impl Iterator<Item = &'a PatternMatch> + '_ {
        self.by_id.values().flat_map(|group| group.iter().copied())
    }

    /// Union of the ranges of every match: the initial candidate set
    pub fn all_ranges(&self) -> RangeSet {
        self.all_matches().map(|pm| pm.range.clone()).collect()
    }

    /// Distinct ranges per pattern id
    pub fn ranges_by_pattern(&self) -> BTreeMap<String, Vec<Range>> {
        self.by_id
            .iter()
            .map(|(id, group)| {
                let ranges: RangeSet = group.iter().map(|pm| pm.range.clone()).collect();
                (id.to_string(), ranges.into_iter().collect())
            })
            .collect()
    }

    /// Bindings observed across the matches of `pattern_id`, keyed by name
    pub fn metavariable_bindings(
        &self,
        pattern_id: Option<&str>,
    ) -> BTreeMap<String, Vec<MetavariableBinding>> {
        let mut by_name: BTreeMap<String, Vec<MetavariableBinding>> = BTreeMap::new();
        let Some(id) = pattern_id else {
            return by_name;
        };
        for pm in self.matches_for(id) {
            for (name, binding) in &pm.metavariables {
                by_name.entry(name.clone()).or_default().push(binding.clone());
            }
        }
        by_name
    }

    pub fn pattern_ids(&self) -> impl Iterator<Item = &'a str> + '_ {
        self.by_id.keys().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}
