//! Summary of the index and interval predicates of a WHERE clause.

use super::interval::{self, Interval};
use crate::ast::NodeId;
use alloc::string::String;
use alloc::vec::Vec;
use strata_core::Result;

/// Tri-state outcome of predicate folding.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum IntrinsicValue {
    #[default]
    Undefined,
    /// Always satisfied, drop from the residual filter.
    True,
    /// Never satisfied, the query returns nothing.
    False,
}

/// Key lookups and timestamp intervals extracted from a WHERE clause.
///
/// A key value of `None` stands for null.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct IntrinsicModel {
    pub key_column: Option<String>,
    pub key_values: Vec<Option<String>>,
    pub key_value_positions: Vec<usize>,
    /// Key values come from the sub-query in `key_values_lambda`.
    pub key_values_is_lambda: bool,
    pub key_values_lambda: Option<NodeId>,
    /// None means unbounded.
    pub intervals: Option<Vec<Interval>>,
    /// Residual filter.
    pub filter: Option<NodeId>,
    pub intrinsic_value: IntrinsicValue,
}

impl IntrinsicModel {
    /// Creates an empty model.
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops the key column and its values.
    pub fn clear_keys(&mut self) {
        self.key_column = None;
        self.key_values.clear();
        self.key_value_positions.clear();
        self.key_values_is_lambda = false;
        self.key_values_lambda = None;
    }

    /// Removes a value from the key set. An emptied set makes the model FALSE.
    pub fn exclude_value(&mut self, value: &Option<String>) {
        if let Some(i) = self.key_values.iter().position(|v| v == value) {
            self.key_values.remove(i);
            self.key_value_positions.remove(i);
        }
        if self.key_values.is_empty() {
            self.intrinsic_value = IntrinsicValue::False;
        }
    }

    /// Narrows the intervals to `[lo, hi]`. An inverted range matches nothing.
    pub fn intersect_intervals(&mut self, lo: i64, hi: i64) {
        let mut list = Vec::new();
        interval::append(&mut list, lo, hi);
        self.intersect_with(list);
    }

    /// Narrows the intervals to an interval literal.
    pub fn intersect_interval_text(&mut self, text: &str, position: usize) -> Result<()> {
        let parsed = interval::parse_interval_ex(text, position)?;
        self.intersect_with(parsed);
        Ok(())
    }

    /// Removes `[lo, hi]` from the intervals.
    pub fn subtract_intervals(&mut self, lo: i64, hi: i64) {
        let mut list = Vec::new();
        interval::append(&mut list, lo, hi);
        self.subtract_with(&list);
    }

    /// Removes an interval literal from the intervals.
    pub fn subtract_interval_text(&mut self, text: &str, position: usize) -> Result<()> {
        let parsed = interval::parse_interval_ex(text, position)?;
        self.subtract_with(&parsed);
        Ok(())
    }

    fn intersect_with(&mut self, list: Vec<Interval>) {
        let next = match &self.intervals {
            None => list,
            Some(current) => interval::intersect(&list, current),
        };
        self.set_intervals(next);
    }

    fn subtract_with(&mut self, list: &[Interval]) {
        let inverted = interval::invert(list);
        let next = match &self.intervals {
            None => inverted,
            Some(current) => interval::intersect(&inverted, current),
        };
        self.set_intervals(next);
    }

    fn set_intervals(&mut self, list: Vec<Interval>) {
        if list.is_empty() {
            self.intrinsic_value = IntrinsicValue::False;
        }
        self.intervals = Some(list);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::ToString;

    #[test]
    fn test_intersect_narrows() {
        let mut m = IntrinsicModel::new();
        m.intersect_intervals(0, 100);
        m.intersect_intervals(50, 200);
        assert_eq!(m.intervals, Some(alloc::vec![Interval::new(50, 100)]));
        assert_eq!(m.intrinsic_value, IntrinsicValue::Undefined);

        m.intersect_intervals(300, 400);
        assert_eq!(m.intrinsic_value, IntrinsicValue::False);
    }

    #[test]
    fn test_inverted_range_is_false() {
        let mut m = IntrinsicModel::new();
        m.intersect_intervals(100, 10);
        assert_eq!(m.intervals, Some(Vec::new()));
        assert_eq!(m.intrinsic_value, IntrinsicValue::False);

        let mut m = IntrinsicModel::new();
        m.subtract_intervals(100, 10);
        assert_eq!(m.intervals, Some(alloc::vec![Interval::new(i64::MIN, i64::MAX)]));
        assert_eq!(m.intrinsic_value, IntrinsicValue::Undefined);
    }

    #[test]
    fn test_subtract_from_unbounded() {
        let mut m = IntrinsicModel::new();
        m.subtract_intervals(10, 20);
        assert_eq!(
            m.intervals,
            Some(alloc::vec![
                Interval::new(i64::MIN, 9),
                Interval::new(21, i64::MAX)
            ])
        );
    }

    #[test]
    fn test_exclude_value() {
        let mut m = IntrinsicModel::new();
        m.key_values.push(Some("A".to_string()));
        m.key_value_positions.push(3);
        m.key_values.push(None);
        m.key_value_positions.push(8);

        m.exclude_value(&None);
        assert_eq!(m.key_values, [Some("A".to_string())]);
        assert_eq!(m.key_value_positions, [3]);
        m.exclude_value(&Some("A".to_string()));
        assert_eq!(m.intrinsic_value, IntrinsicValue::False);
    }

    #[test]
    fn test_interval_text() {
        let mut m = IntrinsicModel::new();
        m.intersect_interval_text("2015-02", 0).unwrap();
        m.subtract_interval_text("2015-02-10", 0).unwrap();
        assert_eq!(m.intervals.as_ref().map(Vec::len), Some(2));
        assert!(m.intersect_interval_text("x", 4).is_err());
    }
}
