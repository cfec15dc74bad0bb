/*!
Filter language (spec §4.8): per-field leaf operators plus logical
combinators, `$text` for FTS and `$id` for primary-key lookup.
*/

use std::collections::BTreeMap;

use regex::{Regex, RegexBuilder};

use crate::error::{ParqueError, Result};
use crate::model::entity::{Entity, FieldValue};

/// A single field-level leaf operator.
#[derive(Debug, Clone, PartialEq)]
pub enum Op {
    Eq(FieldValue),
    Ne(FieldValue),
    Gt(FieldValue),
    Gte(FieldValue),
    Lt(FieldValue),
    Lte(FieldValue),
    In(Vec<FieldValue>),
    Nin(Vec<FieldValue>),
    Exists(bool),
    Regex { pattern: String, case_insensitive: bool },
    StartsWith(String),
    EndsWith(String),
    Contains(String),
    All(Vec<FieldValue>),
    Size(usize),
}

/// A filter tree: leaves bind one field to an [Op]; logical nodes combine
/// subtrees; `Text`/`Id` are routed to the index substrate rather than
/// evaluated by the in-memory matcher.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Field(String, Op),
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Not(Box<Filter>),
    Nor(Vec<Filter>),
    Text(String),
    Id(FieldValue),
}

impl Filter {
    /// Collect every field name this filter reads, including `$id` when a
    /// direct/`$eq` lookup binds it. Used by the planner for column
    /// pruning and pushdown.
    pub fn referenced_fields(&self, out: &mut Vec<String>) {
        match self {
            Filter::Field(name, _) => out.push(name.clone()),
            Filter::And(clauses) | Filter::Or(clauses) | Filter::Nor(clauses) => {
                for clause in clauses {
                    clause.referenced_fields(out);
                }
            }
            Filter::Not(inner) => inner.referenced_fields(out),
            Filter::Text(_) => {}
            Filter::Id(_) => out.push("$id".to_string()),
        }
    }

    /// The bound `$id` value, if this filter (at the top level, inside an
    /// `$and`) pins a primary key directly.
    pub fn bound_id(&self) -> Option<&FieldValue> {
        match self {
            Filter::Id(value) => Some(value),
            Filter::Field(name, Op::Eq(value)) if name == "$id" => Some(value),
            Filter::And(clauses) => clauses.iter().find_map(Filter::bound_id),
            _ => None,
        }
    }

    /// Whether this filter contains a `$text` clause anywhere.
    pub fn has_text_clause(&self) -> bool {
        match self {
            Filter::Text(_) => true,
            Filter::And(clauses) | Filter::Or(clauses) | Filter::Nor(clauses) => {
                clauses.iter().any(Filter::has_text_clause)
            }
            Filter::Not(inner) => inner.has_text_clause(),
            _ => false,
        }
    }
}

/// Order two [FieldValue]s for `$gt`/`$gte`/`$lt`/`$lte`. Types without a
/// total order (lists, maps, bytes) never compare.
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

/// Patterns that are rejected outright rather than compiled, since they are
/// the classic catastrophic-backtracking shapes (nested quantifiers).
const CATASTROPHIC_MARKERS: [&str; 4] = ["(a+)+", "(a*)*", "(.+)+", "(.*)+"];

fn compile_regex(pattern: &str, case_insensitive: bool) -> Result<Regex> {
    if pattern.len() > 512 {
        return Err(ParqueError::Other(anyhow::anyhow!("regex pattern too long")));
    }
    for marker in CATASTROPHIC_MARKERS {
        if pattern.contains(marker) {
            return Err(ParqueError::Other(anyhow::anyhow!(
                "regex pattern rejected: looks catastrophic ({marker})"
            )));
        }
    }
    RegexBuilder::new(pattern)
        .case_insensitive(case_insensitive)
        .build()
        .map_err(|e| ParqueError::Other(anyhow::anyhow!("invalid regex: {e}")))
}

/// Resolve a dotted field path against `entity`, checking core attributes
/// first and falling back to the fields map (recursing into nested maps).
pub fn field_value(entity: &Entity, path: &str) -> Option<FieldValue> {
    match path {
        "$id" | "id" => return Some(FieldValue::String(entity.id.clone())),
        "$type" | "type" => return Some(FieldValue::String(entity.type_.clone())),
        "version" => return Some(FieldValue::Int(entity.version as i64)),
        "createdAt" => return Some(FieldValue::Timestamp(entity.created_at)),
        "updatedAt" => return Some(FieldValue::Timestamp(entity.updated_at)),
        "deletedAt" => return entity.deleted_at.map(FieldValue::Timestamp),
        _ => {}
    }
    let mut segments = path.split('.');
    let first = segments.next()?;
    let mut current = entity.fields.get(first)?.clone();
    for segment in segments {
        match current {
            FieldValue::Map(ref map) => current = map.get(segment)?.clone(),
            _ => return None,
        }
    }
    Some(current)
}

fn matches_op(value: Option<&FieldValue>, op: &Op) -> bool {
    match op {
        Op::Eq(target) => value == Some(target),
        Op::Ne(target) => value != Some(target),
        Op::Gt(target) => value.and_then(|v| compare(v, target)).is_some_and(|o| o.is_gt()),
        Op::Gte(target) => value.and_then(|v| compare(v, target)).is_some_and(|o| o.is_ge()),
        Op::Lt(target) => value.and_then(|v| compare(v, target)).is_some_and(|o| o.is_lt()),
        Op::Lte(target) => value.and_then(|v| compare(v, target)).is_some_and(|o| o.is_le()),
        Op::In(options) => value.is_some_and(|v| options.contains(v)),
        Op::Nin(options) => !value.is_some_and(|v| options.contains(v)),
        Op::Exists(expected) => value.is_some_and(|v| !v.is_null()) == *expected,
        Op::Regex { pattern, case_insensitive } => match (value, compile_regex(pattern, *case_insensitive)) {
            (Some(FieldValue::String(s)), Ok(re)) => re.is_match(s),
            _ => false,
        },
        Op::StartsWith(prefix) => matches!(value, Some(FieldValue::String(s)) if s.starts_with(prefix.as_str())),
        Op::EndsWith(suffix) => matches!(value, Some(FieldValue::String(s)) if s.ends_with(suffix.as_str())),
        Op::Contains(needle) => matches!(value, Some(FieldValue::String(s)) if s.contains(needle.as_str())),
        Op::All(required) => match value {
            Some(FieldValue::List(items)) => required.iter().all(|r| items.contains(r)),
            _ => false,
        },
        Op::Size(expected) => match value {
            Some(FieldValue::List(items)) => items.len() == *expected,
            _ => false,
        },
    }
}

/// Evaluate `filter` against `entity`. `$text` clauses always match here
/// (they are resolved by the FTS index before or after in-memory
/// filtering, per the planner); `$id` clauses are plain equality checks.
pub fn matches(filter: &Filter, entity: &Entity) -> bool {
    match filter {
        Filter::Field(name, op) => matches_op(field_value(entity, name).as_ref(), op),
        Filter::And(clauses) => clauses.iter().all(|c| matches(c, entity)),
        Filter::Or(clauses) => clauses.iter().any(|c| matches(c, entity)),
        Filter::Not(inner) => !matches(inner, entity),
        Filter::Nor(clauses) => !clauses.iter().any(|c| matches(c, entity)),
        Filter::Text(_) => true,
        Filter::Id(value) => field_value(entity, "$id").as_ref() == Some(value),
    }
}

/// Pull out the top-level `$id` subclause for point-lookup intersection
/// (spec §4.8 step 4), returning the remaining filter to apply post-read.
pub fn split_id_clause(filter: Filter) -> (Option<FieldValue>, Option<Filter>) {
    match filter {
        Filter::Id(value) => (Some(value), None),
        Filter::Field(name, Op::Eq(value)) if name == "$id" => (Some(value), None),
        Filter::And(clauses) => {
            let mut id = None;
            let mut rest = Vec::new();
            for clause in clauses {
                if id.is_none() {
                    if let (Some(value), None) = split_id_clause(clause.clone()) {
                        id = Some(value);
                        continue;
                    }
                }
                rest.push(clause);
            }
            let remainder = match rest.len() {
                0 => None,
                1 => Some(rest.into_iter().next().unwrap()),
                _ => Some(Filter::And(rest)),
            };
            (id, remainder)
        }
        other => (None, Some(other)),
    }
}

/// Used by callers that need a stable key for deduplicating matched
/// entities across row groups.
pub fn entity_key(entity: &Entity) -> BTreeMap<&'static str, String> {
    BTreeMap::from([("id", entity.id.clone())])
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn entity() -> Entity {
        Entity {
            id: "posts/1".to_string(),
            type_: "post".to_string(),
            name: None,
            created_at: Utc::now(),
            created_by: None,
            updated_at: Utc::now(),
            updated_by: None,
            deleted_at: None,
            deleted_by: None,
            version: 3,
            fields: [
                ("title".to_string(), FieldValue::String("Hello world".to_string())),
                ("views".to_string(), FieldValue::Int(42)),
                (
                    "tags".to_string(),
                    FieldValue::List(vec![FieldValue::String("rust".to_string())]),
                ),
            ]
            .into_iter()
            .collect(),
        }
    }

    #[test]
    fn eq_and_gt_on_core_and_custom_fields() {
        let e = entity();
        assert!(matches(&Filter::Field("version".to_string(), Op::Eq(FieldValue::Int(3))), &e));
        assert!(matches(&Filter::Field("views".to_string(), Op::Gt(FieldValue::Int(10))), &e));
        assert!(!matches(&Filter::Field("views".to_string(), Op::Lt(FieldValue::Int(10))), &e));
    }

    #[test]
    fn and_or_not_compose() {
        let e = entity();
        let f = Filter::And(vec![
            Filter::Field("views".to_string(), Op::Gte(FieldValue::Int(42))),
            Filter::Not(Box::new(Filter::Field(
                "title".to_string(),
                Op::Eq(FieldValue::String("nope".to_string())),
            ))),
        ]);
        assert!(matches(&f, &e));
    }

    #[test]
    fn starts_with_and_contains() {
        let e = entity();
        assert!(matches(&Filter::Field("title".to_string(), Op::StartsWith("Hello".to_string())), &e));
        assert!(matches(&Filter::Field("title".to_string(), Op::Contains("world".to_string())), &e));
        assert!(!matches(&Filter::Field("title".to_string(), Op::EndsWith("world!".to_string())), &e));
    }

    #[test]
    fn all_and_size_on_lists() {
        let e = entity();
        assert!(matches(
            &Filter::Field("tags".to_string(), Op::All(vec![FieldValue::String("rust".to_string())])),
            &e
        ));
        assert!(matches(&Filter::Field("tags".to_string(), Op::Size(1)), &e));
    }

    #[test]
    fn catastrophic_regex_pattern_is_rejected() {
        let e = entity();
        assert!(!matches(
            &Filter::Field(
                "title".to_string(),
                Op::Regex { pattern: "(a+)+$".to_string(), case_insensitive: false }
            ),
            &e
        ));
    }

    #[test]
    fn split_id_clause_extracts_direct_and_anded_id() {
        let (id, rest) = split_id_clause(Filter::Id(FieldValue::String("posts/1".to_string())));
        assert_eq!(id, Some(FieldValue::String("posts/1".to_string())));
        assert!(rest.is_none());

        let combined = Filter::And(vec![
            Filter::Field("$id".to_string(), Op::Eq(FieldValue::String("posts/1".to_string()))),
            Filter::Field("views".to_string(), Op::Gt(FieldValue::Int(1))),
        ]);
        let (id, rest) = split_id_clause(combined);
        assert!(id.is_some());
        assert!(rest.is_some());
    }
}
