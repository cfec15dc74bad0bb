/*!
Row-group statistics (spec §4.6, §4.8). Min/max are tracked per column when
the column's type supports ordering; null counts are tracked unconditionally.
These are what the query planner's `rowGroupMightMatch` uses for predicate
pushdown.
*/

use serde::{Deserialize, Serialize};

use crate::model::entity::FieldValue;

/// Statistics for one column within one row group.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ColumnStats {
    /// Column (field) name.
    pub column: String,
    /// Minimum non-null value, when the type is orderable.
    pub min: Option<FieldValue>,
    /// Maximum non-null value, when the type is orderable.
    pub max: Option<FieldValue>,
    /// Count of null/absent values in the row group.
    pub null_count: u64,
    /// Whether min/max were computed at all (false for unorderable types,
    /// e.g. maps and lists, or when statistics collection was skipped).
    pub has_stats: bool,
}

/// Order two field values for min/max tracking. Returns `None` for types
/// that do not have a total order (lists, maps, bytes).
fn compare(a: &FieldValue, b: &FieldValue) -> Option<std::cmp::Ordering> {
    use FieldValue::*;
    match (a, b) {
        (Int(x), Int(y)) => x.partial_cmp(y),
        (Float(x), Float(y)) => x.partial_cmp(y),
        (Int(x), Float(y)) => (*x as f64).partial_cmp(y),
        (Float(x), Int(y)) => x.partial_cmp(&(*y as f64)),
        (String(x), String(y)) => x.partial_cmp(y),
        (Bool(x), Bool(y)) => x.partial_cmp(y),
        (Timestamp(x), Timestamp(y)) => x.partial_cmp(y),
        _ => None,
    }
}

/// Accumulate [ColumnStats] for a single column across a row group's worth
/// of values.
pub struct StatsBuilder {
    column: String,
    min: Option<FieldValue>,
    max: Option<FieldValue>,
    null_count: u64,
    orderable: bool,
    saw_value: bool,
}

impl StatsBuilder {
    /// Start a new stats accumulator for `column`.
    pub fn new(column: impl Into<String>) -> Self {
        StatsBuilder {
            column: column.into(),
            min: None,
            max: None,
            null_count: 0,
            orderable: true,
            saw_value: false,
        }
    }

    /// Fold in one value, updating min/max/null-count.
    pub fn observe(&mut self, value: &FieldValue) {
        if value.is_null() {
            self.null_count += 1;
            return;
        }
        if matches!(value, FieldValue::List(_) | FieldValue::Map(_) | FieldValue::Bytes(_)) {
            self.orderable = false;
            return;
        }
        self.saw_value = true;
        match &self.min {
            None => self.min = Some(value.clone()),
            Some(current_min) => {
                if let Some(std::cmp::Ordering::Less) = compare(value, current_min) {
                    self.min = Some(value.clone());
                }
            }
        }
        match &self.max {
            None => self.max = Some(value.clone()),
            Some(current_max) => {
                if let Some(std::cmp::Ordering::Greater) = compare(value, current_max) {
                    self.max = Some(value.clone());
                }
            }
        }
    }

    /// Finalize into a [ColumnStats].
    pub fn finish(self) -> ColumnStats {
        let has_stats = self.orderable && self.saw_value;
        ColumnStats {
            column: self.column,
            min: if has_stats { self.min } else { None },
            max: if has_stats { self.max } else { None },
            null_count: self.null_count,
            has_stats,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracks_min_max_and_nulls() {
        let mut builder = StatsBuilder::new("age");
        builder.observe(&FieldValue::Int(5));
        builder.observe(&FieldValue::Int(1));
        builder.observe(&FieldValue::Null);
        builder.observe(&FieldValue::Int(9));
        let stats = builder.finish();
        assert_eq!(stats.min, Some(FieldValue::Int(1)));
        assert_eq!(stats.max, Some(FieldValue::Int(9)));
        assert_eq!(stats.null_count, 1);
        assert!(stats.has_stats);
    }

    #[test]
    fn lists_are_not_orderable() {
        let mut builder = StatsBuilder::new("tags");
        builder.observe(&FieldValue::List(vec![FieldValue::Int(1)]));
        let stats = builder.finish();
        assert!(!stats.has_stats);
    }
}
