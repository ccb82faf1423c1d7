//! # range_map
//!
//! why: map sequential key ranges to values where the highest range never ends
//! relations: used by raft-segments to find the segment version holding a log index
//! what: OpenEndRangeMap, ValueRange

use std::collections::BTreeMap;
use std::ops::Bound::{Excluded, Unbounded};

/// Result of a lookup: the covering value and where its range stops.
///
/// `limit` is the exclusive upper bound of the range, `None` for the open range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValueRange<K, V> {
    pub limit: Option<K>,
    pub value: Option<V>,
}

/// Ranges `[start, next_start)` keyed by their start, the highest one open-ended.
///
/// Not synchronized: guard it with whatever serializes the owning log's writes.
#[derive(Debug, Clone)]
pub struct OpenEndRangeMap<K, V> {
    tree: BTreeMap<K, V>,
    end: Option<(K, V)>,
}

impl<K, V> Default for OpenEndRangeMap<K, V> {
    fn default() -> Self {
        Self {
            tree: BTreeMap::new(),
            end: None,
        }
    }
}

impl<K: Ord + Clone, V: Clone> OpenEndRangeMap<K, V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install `[from, ∞) -> value`, returning the values of every range starting at or after `from`.
    ///
    /// A range starting exactly at `from` is silently replaced.
    pub fn replace_from(&mut self, from: K, value: V) -> Vec<V> {
        let removed = self.tree.split_off(&from);
        self.tree.insert(from.clone(), value.clone());
        self.end = Some((from, value));
        removed.into_values().collect()
    }

    pub fn lookup(&self, at: &K) -> ValueRange<K, V> {
        if let Some((end_key, end_value)) = &self.end {
            if end_key <= at {
                return ValueRange {
                    limit: None,
                    value: Some(end_value.clone()),
                };
            }
        }

        let value = self.tree.range(..=at).next_back().map(|(_, v)| v.clone());
        let limit = self
            .tree
            .range((Excluded(at), Unbounded))
            .next()
            .map(|(k, _)| k.clone());
        ValueRange { limit, value }
    }

    /// Value of the open range
    pub fn last(&self) -> Option<V> {
        self.end.as_ref().map(|(_, v)| v.clone())
    }

    /// Evict every range lying strictly below the range that covers `less_than`.
    pub fn remove(&mut self, less_than: &K) -> Vec<V> {
        let floor = match self.tree.range(..=less_than).next_back() {
            Some((k, _)) => k.clone(),
            None => return Vec::new(),
        };

        let kept = self.tree.split_off(&floor);
        let removed = std::mem::replace(&mut self.tree, kept);
        if self.tree.is_empty() {
            self.end = None;
        }
        removed.into_values().collect()
    }

    /// All ranges by ascending start; the open range comes last.
    pub fn entries(&self) -> impl Iterator<Item = (&K, &V)> {
        self.tree.iter()
    }

    pub fn len(&self) -> usize {
        self.tree.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_map_covers_nothing() {
        let map: OpenEndRangeMap<i64, &str> = OpenEndRangeMap::new();
        assert_eq!(map.lookup(&5), ValueRange { limit: None, value: None });
        assert_eq!(map.last(), None);
    }

    #[test]
    fn lookup_below_first_range_reports_its_start() {
        let mut map = OpenEndRangeMap::new();
        map.replace_from(10, "a");
        assert_eq!(map.lookup(&3), ValueRange { limit: Some(10), value: None });
    }

    #[test]
    fn closed_ranges_report_their_limit() {
        let mut map = OpenEndRangeMap::new();
        map.replace_from(0, "a");
        map.replace_from(10, "b");
        map.replace_from(20, "c");

        assert_eq!(map.lookup(&0), ValueRange { limit: Some(10), value: Some("a") });
        assert_eq!(map.lookup(&15), ValueRange { limit: Some(20), value: Some("b") });
        assert_eq!(map.lookup(&25), ValueRange { limit: None, value: Some("c") });
        assert_eq!(map.last(), Some("c"));
    }

    #[test]
    fn replace_from_returns_superseded_values_in_order() {
        let mut map = OpenEndRangeMap::new();
        map.replace_from(0, "a");
        map.replace_from(10, "b");
        map.replace_from(20, "c");

        assert_eq!(map.replace_from(5, "d"), vec!["b", "c"]);
        assert_eq!(map.lookup(&4).value, Some("a"));
        assert_eq!(map.lookup(&30), ValueRange { limit: None, value: Some("d") });
    }

    #[test]
    fn replace_from_same_start_replaces() {
        let mut map = OpenEndRangeMap::new();
        map.replace_from(7, "a");
        assert_eq!(map.replace_from(7, "b"), vec!["a"]);
        assert_eq!(map.len(), 1);
        assert_eq!(map.last(), Some("b"));
    }

    #[test]
    fn remove_keeps_the_covering_range() {
        let mut map = OpenEndRangeMap::new();
        map.replace_from(0, "a");
        map.replace_from(10, "b");
        map.replace_from(20, "c");

        assert_eq!(map.remove(&15), vec!["a"]);
        assert_eq!(map.lookup(&5).value, None);
        assert_eq!(map.lookup(&12).value, Some("b"));
        assert_eq!(map.remove(&100), vec!["b"]);
        assert_eq!(map.entries().collect::<Vec<_>>(), vec![(&20, &"c")]);
        assert_eq!(map.last(), Some("c"));
    }

    #[test]
    fn remove_below_everything_is_a_no_op() {
        let mut map = OpenEndRangeMap::new();
        map.replace_from(10, "a");
        assert!(map.remove(&5).is_empty());
        assert_eq!(map.last(), Some("a"));
    }
}
