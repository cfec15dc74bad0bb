/*!
Query planning (spec §4.8): route `$id` filters to point-lookup, `$text`
filters to FTS, and everything else through statistics-based row-group
pushdown before falling back to a full post-read filter pass.
*/

use crate::model::entity::FieldValue;
use crate::parquet_io::stats::ColumnStats;

use super::filter::{split_id_clause, Filter, Op};

/// Which path the planner chose for a given filter.
#[derive(Debug, Clone, PartialEq)]
pub enum PlanRoute {
    PointLookup(FieldValue),
    Fts,
    Scan,
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueryPlan {
    pub route: PlanRoute,
    /// Remaining predicate to apply after the routed lookup/scan, or the
    /// whole filter when the route is `Scan`.
    pub remaining: Option<Filter>,
}

/// Choose a plan for `filter` (spec §4.8 steps 1-2, 4).
pub fn plan(filter: Option<Filter>) -> QueryPlan {
    let Some(filter) = filter else {
        return QueryPlan { route: PlanRoute::Scan, remaining: None };
    };
    if filter.has_text_clause() {
        return QueryPlan { route: PlanRoute::Fts, remaining: Some(filter) };
    }
    let (id, remaining) = split_id_clause(filter);
    match id {
        Some(value) => QueryPlan { route: PlanRoute::PointLookup(value), remaining },
        None => QueryPlan { route: PlanRoute::Scan, remaining },
    }
}

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

/// Whether a row group's statistics for `field` rule it out for `op`.
/// Conservative: missing stats, or stats the planner can't reason about,
/// always return `true` (include).
fn stats_might_match(stats: &ColumnStats, op: &Op) -> bool {
    if !stats.has_stats {
        return true;
    }
    let (Some(min), Some(max)) = (&stats.min, &stats.max) else {
        return true;
    };
    match op {
        Op::Eq(v) => compare(min, v).is_some_and(|o| o.is_le()) && compare(max, v).is_some_and(|o| o.is_ge()),
        Op::Gt(v) => compare(max, v).is_some_and(|o| o.is_gt()),
        Op::Gte(v) => compare(max, v).is_some_and(|o| o.is_ge()),
        Op::Lt(v) => compare(min, v).is_some_and(|o| o.is_lt()),
        Op::Lte(v) => compare(min, v).is_some_and(|o| o.is_le()),
        Op::In(values) => values.iter().any(|v| {
            compare(min, v).is_some_and(|o| o.is_le()) && compare(max, v).is_some_and(|o| o.is_ge())
        }),
        // Every other operator either has no statistical short-circuit
        // (regex/startsWith/contains/size/all) or is already handled by
        // the point-lookup/FTS routes, so it must be included.
        _ => true,
    }
}

/// Whether a row group described by `row_groups` might contain a match for
/// `filter` (spec §4.8 step 3). Scanning walks every `Field` leaf; logical
/// combinators are evaluated conservatively (an `$or`/`$not` with any
/// operand that can't be ruled out keeps the row group).
pub fn row_group_might_match(filter: &Filter, row_groups: &[ColumnStats]) -> bool {
    match filter {
        Filter::Field(name, op) => {
            let matching: Vec<&ColumnStats> = row_groups.iter().filter(|s| &s.column == name).collect();
            matching.is_empty() || matching.iter().any(|stats| stats_might_match(stats, op))
        }
        Filter::And(clauses) => clauses.iter().all(|c| row_group_might_match(c, row_groups)),
        Filter::Or(clauses) => clauses.iter().any(|c| row_group_might_match(c, row_groups)),
        Filter::Not(_) | Filter::Nor(_) | Filter::Text(_) | Filter::Id(_) => true,
    }
}
