/*!
Multi-field stable sort (spec §4.8): `asc|1` and `desc|-1` per field; nulls
and missing values sort last regardless of direction.
*/

use std::cmp::Ordering;

use crate::model::entity::{Entity, FieldValue};

use super::filter::field_value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

impl Direction {
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            1 => Some(Direction::Asc),
            -1 => Some(Direction::Desc),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SortKey {
    pub field: String,
    pub direction: Direction,
}

fn order_field_values(a: &FieldValue, b: &FieldValue) -> Ordering {
    use FieldValue::*;
    match (a, b) {
        (Int(x), Int(y)) => x.cmp(y),
        (Float(x), Float(y)) => x.partial_cmp(y).unwrap_or(Ordering::Equal),
        (Int(x), Float(y)) => (*x as f64).partial_cmp(y).unwrap_or(Ordering::Equal),
        (Float(x), Int(y)) => x.partial_cmp(&(*y as f64)).unwrap_or(Ordering::Equal),
        (String(x), String(y)) => x.cmp(y),
        (Bool(x), Bool(y)) => x.cmp(y),
        (Timestamp(x), Timestamp(y)) => x.cmp(y),
        _ => Ordering::Equal,
    }
}

/// Stable multi-field sort. Missing/null values always sort after present
/// ones, independent of `direction`.
pub fn sort_entities(entities: &mut [Entity], keys: &[SortKey]) {
    entities.sort_by(|a, b| {
        for key in keys {
            let va = field_value(a, &key.field).filter(|v| !v.is_null());
            let vb = field_value(b, &key.field).filter(|v| !v.is_null());
            let ordering = match (va, vb) {
                (None, None) => Ordering::Equal,
                (None, Some(_)) => Ordering::Greater,
                (Some(_), None) => Ordering::Less,
                (Some(x), Some(y)) => {
                    let base = order_field_values(&x, &y);
                    match key.direction {
                        Direction::Asc => base,
                        Direction::Desc => base.reverse(),
                    }
                }
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use proptest::prelude::*;

    fn entity(id: &str, views: Option<i64>) -> Entity {
        Entity {
            id: id.to_string(),
            type_: "post".to_string(),
            name: None,
            created_at: Utc::now(),
            created_by: None,
            updated_at: Utc::now(),
            updated_by: None,
            deleted_at: None,
            deleted_by: None,
            version: 1,
            fields: views
                .map(|v| [("views".to_string(), FieldValue::Int(v))].into_iter().collect())
                .unwrap_or_default(),
        }
    }

    #[test]
    fn ascending_sort_with_nulls_last() {
        let mut entities = vec![entity("a", Some(3)), entity("b", None), entity("c", Some(1))];
        sort_entities(
            &mut entities,
            &[SortKey { field: "views".to_string(), direction: Direction::Asc }],
        );
        assert_eq!(entities.iter().map(|e| e.id.as_str()).collect::<Vec<_>>(), vec!["c", "a", "b"]);
    }

    #[test]
    fn descending_sort_still_puts_nulls_last() {
        let mut entities = vec![entity("a", Some(3)), entity("b", None), entity("c", Some(1))];
        sort_entities(
            &mut entities,
            &[SortKey { field: "views".to_string(), direction: Direction::Desc }],
        );
        assert_eq!(entities.iter().map(|e| e.id.as_str()).collect::<Vec<_>>(), vec!["a", "c", "b"]);
    }

    proptest! {
        #[test]
        fn nulls_always_sort_last_regardless_of_direction(
            values in prop::collection::vec(prop::option::of(any::<i64>()), 0..20),
            desc in any::<bool>(),
        ) {
            let mut entities: Vec<Entity> = values
                .iter()
                .enumerate()
                .map(|(i, v)| entity(&i.to_string(), *v))
                .collect();
            let direction = if desc { Direction::Desc } else { Direction::Asc };
            sort_entities(&mut entities, &[SortKey { field: "views".to_string(), direction }]);

            let none_count = values.iter().filter(|v| v.is_none()).count();
            let tail = &entities[entities.len() - none_count..];
            prop_assert!(tail.iter().all(|e| e.fields.get("views").is_none()));

            let present: Vec<i64> = entities[..entities.len() - none_count]
                .iter()
                .map(|e| match e.fields.get("views") {
                    Some(FieldValue::Int(n)) => *n,
                    other => panic!("expected present Int field, got {other:?}"),
                })
                .collect();
            let mut expected = present.clone();
            if desc {
                expected.sort_by(|a, b| b.cmp(a));
            } else {
                expected.sort();
            }
            prop_assert_eq!(present, expected);
        }
    }
}
