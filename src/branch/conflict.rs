/*!
Conflict detection and resolution (spec §4.12): classify divergent field
values between branches and apply a resolution strategy, manual or
otherwise.
*/

use crate::model::entity::FieldValue;

/// The kind of divergence detected between two branches' view of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictKind {
    /// Both sides changed the same field to different values since the
    /// common base.
    ConcurrentUpdate,
    /// One side deleted the entity while the other updated it.
    DeleteUpdate,
    /// Both sides created an entity at the same target independently.
    CreateCreate,
}

/// One detected conflict: the field, the base/ours/theirs values and each
/// side's event timestamp (used by the `latest` strategy).
#[derive(Debug, Clone, PartialEq)]
pub struct Conflict {
    pub target: String,
    pub field: Option<String>,
    pub kind: ConflictKind,
    pub base: Option<FieldValue>,
    pub ours: Option<FieldValue>,
    pub ours_ts: i64,
    pub theirs: Option<FieldValue>,
    pub theirs_ts: i64,
}

/// Outcome of resolving one [Conflict].
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub resolved_value: Option<FieldValue>,
    pub strategy: String,
    pub requires_manual_resolution: bool,
    pub explanation: Option<String>,
}

/// A resolution strategy. `Custom` receives the full [Conflict] and
/// produces a [Resolution] directly, matching spec §4.12's "custom
/// functions receive full conflict info".
pub enum Strategy {
    Ours,
    Theirs,
    /// Picks the event with the greater timestamp; ties favor `ours`.
    Latest,
    Manual,
    /// Try each strategy in order, taking the first one that does not
    /// require manual resolution.
    Fallback(Vec<Strategy>),
    /// Resolve by field name, falling back to `default` when unlisted.
    ByField { fields: Vec<(String, Strategy)>, default: Box<Strategy> },
    /// Prefer whichever side's predicate returns true; `ours` on a tie.
    Preference(fn(&FieldValue) -> bool),
    /// Prefer whichever side is non-null; `ours` if both or neither are.
    NonNullPreference,
    /// Concatenate string values; non-strings fall back to `ours`.
    StringConcat { separator: String },
    /// Union two list values, preserving first-seen order; non-lists fall
    /// back to `ours`.
    ArrayUnionMerge,
    Custom(Box<dyn Fn(&Conflict) -> Resolution + Send + Sync>),
}

fn is_list(value: &Option<FieldValue>) -> Option<&Vec<FieldValue>> {
    match value {
        Some(FieldValue::List(items)) => Some(items),
        _ => None,
    }
}

fn is_string(value: &Option<FieldValue>) -> Option<&str> {
    match value {
        Some(FieldValue::String(s)) => Some(s.as_str()),
        _ => None,
    }
}

fn resolved(value: Option<FieldValue>, strategy: &str) -> Resolution {
    Resolution { resolved_value: value, strategy: strategy.to_string(), requires_manual_resolution: false, explanation: None }
}

fn manual(conflict: &Conflict) -> Resolution {
    Resolution {
        resolved_value: None,
        strategy: "manual".to_string(),
        requires_manual_resolution: true,
        explanation: Some(format!("conflict on {} requires manual resolution", conflict.target)),
    }
}

/// Resolve one [Conflict] with `strategy`.
pub fn resolve(conflict: &Conflict, strategy: &Strategy) -> Resolution {
    match strategy {
        Strategy::Ours => resolved(conflict.ours.clone(), "ours"),
        Strategy::Theirs => resolved(conflict.theirs.clone(), "theirs"),
        Strategy::Latest => {
            if conflict.theirs_ts > conflict.ours_ts {
                resolved(conflict.theirs.clone(), "latest")
            } else {
                resolved(conflict.ours.clone(), "latest")
            }
        }
        Strategy::Manual => manual(conflict),
        Strategy::Fallback(chain) => {
            for candidate in chain {
                let result = resolve(conflict, candidate);
                if !result.requires_manual_resolution {
                    return result;
                }
            }
            manual(conflict)
        }
        Strategy::ByField { fields, default } => {
            let chosen = conflict
                .field
                .as_deref()
                .and_then(|name| fields.iter().find(|(f, _)| f == name))
                .map(|(_, s)| s)
                .unwrap_or(default.as_ref());
            resolve(conflict, chosen)
        }
        Strategy::Preference(predicate) => match (&conflict.ours, &conflict.theirs) {
            (Some(ours), _) if predicate(ours) => resolved(conflict.ours.clone(), "preference"),
            (_, Some(theirs)) if predicate(theirs) => resolved(conflict.theirs.clone(), "preference"),
            _ => resolved(conflict.ours.clone(), "preference"),
        },
        Strategy::NonNullPreference => match (&conflict.ours, &conflict.theirs) {
            (Some(ours), None) => resolved(Some(ours.clone()), "non-null-preference"),
            (None, Some(theirs)) => resolved(Some(theirs.clone()), "non-null-preference"),
            _ => resolved(conflict.ours.clone(), "non-null-preference"),
        },
        Strategy::StringConcat { separator } => match (is_string(&conflict.ours), is_string(&conflict.theirs)) {
            (Some(ours), Some(theirs)) => {
                resolved(Some(FieldValue::String(format!("{ours}{separator}{theirs}"))), "string-concatenate")
            }
            _ => resolved(conflict.ours.clone(), "string-concatenate"),
        },
        Strategy::ArrayUnionMerge => match (is_list(&conflict.ours), is_list(&conflict.theirs)) {
            (Some(ours), Some(theirs)) => {
                let mut merged = ours.clone();
                for item in theirs {
                    if !merged.contains(item) {
                        merged.push(item.clone());
                    }
                }
                resolved(Some(FieldValue::List(merged)), "array-union-merge")
            }
            _ => resolved(conflict.ours.clone(), "array-union-merge"),
        },
        Strategy::Custom(f) => f(conflict),
    }
}

/// Resolve every conflict in `conflicts` with the same `strategy`.
pub fn resolve_all(conflicts: &[Conflict], strategy: &Strategy) -> Vec<(Conflict, Resolution)> {
    conflicts.iter().map(|c| (c.clone(), resolve(c, strategy))).collect()
}

/// Whether every resolution in `resolutions` is final (no manual items
/// remain).
pub fn all_resolved(resolutions: &[(Conflict, Resolution)]) -> bool {
    resolutions.iter().all(|(_, r)| !r.requires_manual_resolution)
}

/// Convert a manual conflict into a resolved one with the user-supplied
/// value, tagging the strategy `manual-resolved`.
pub fn apply_manual_resolution(user_value: FieldValue) -> Resolution {
    Resolution {
        resolved_value: Some(user_value),
        strategy: "manual-resolved".to_string(),
        requires_manual_resolution: false,
        explanation: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conflict(ours: &str, theirs: &str, ours_ts: i64, theirs_ts: i64) -> Conflict {
        Conflict {
            target: "posts/1".to_string(),
            field: Some("title".to_string()),
            kind: ConflictKind::ConcurrentUpdate,
            base: Some(FieldValue::String("base".to_string())),
            ours: Some(FieldValue::String(ours.to_string())),
            ours_ts,
            theirs: Some(FieldValue::String(theirs.to_string())),
            theirs_ts,
        }
    }

    #[test]
    fn latest_picks_greater_timestamp_and_ties_favor_ours() {
        let c = conflict("mine", "theirs", 1000, 2000);
        assert_eq!(resolve(&c, &Strategy::Latest).resolved_value, Some(FieldValue::String("theirs".to_string())));

        let tie = conflict("mine", "theirs", 1000, 1000);
        assert_eq!(resolve(&tie, &Strategy::Latest).resolved_value, Some(FieldValue::String("mine".to_string())));
    }

    #[test]
    fn manual_requires_resolution() {
        let c = conflict("mine", "theirs", 1000, 2000);
        let result = resolve(&c, &Strategy::Manual);
        assert!(result.requires_manual_resolution);
    }

    #[test]
    fn fallback_chain_uses_first_non_manual_strategy() {
        let c = conflict("mine", "theirs", 1000, 2000);
        let chain = Strategy::Fallback(vec![Strategy::Manual, Strategy::Theirs]);
        let result = resolve(&c, &chain);
        assert!(!result.requires_manual_resolution);
        assert_eq!(result.strategy, "theirs");
    }

    #[test]
    fn string_concat_joins_both_sides() {
        let c = conflict("mine", "theirs", 1000, 2000);
        let result = resolve(&c, &Strategy::StringConcat { separator: "|".to_string() });
        assert_eq!(result.resolved_value, Some(FieldValue::String("mine|theirs".to_string())));
    }

    #[test]
    fn array_union_merge_deduplicates() {
        let mut c = conflict("ignored", "ignored", 1000, 2000);
        c.ours = Some(FieldValue::List(vec![FieldValue::String("a".to_string())]));
        c.theirs = Some(FieldValue::List(vec![FieldValue::String("a".to_string()), FieldValue::String("b".to_string())]));
        let result = resolve(&c, &Strategy::ArrayUnionMerge);
        assert_eq!(
            result.resolved_value,
            Some(FieldValue::List(vec![FieldValue::String("a".to_string()), FieldValue::String("b".to_string())]))
        );
    }

    #[test]
    fn all_resolved_is_false_while_any_manual_item_remains() {
        let conflicts = vec![conflict("a", "b", 1, 2), conflict("c", "d", 3, 4)];
        let resolved = resolve_all(&conflicts, &Strategy::Manual);
        assert!(!all_resolved(&resolved));
    }
}
