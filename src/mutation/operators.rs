/*!
Update operators (spec §4.9): `$set`, `$unset`, `$inc`, applied to an
entity's field map in that fixed order.
*/

use std::collections::BTreeMap;

use crate::model::entity::FieldValue;

/// The update document accepted by `update`/`upsert`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateOps {
    pub set: BTreeMap<String, FieldValue>,
    pub unset: Vec<String>,
    pub inc: BTreeMap<String, FieldValue>,
}

impl UpdateOps {
    pub fn is_empty(&self) -> bool {
        self.set.is_empty() && self.unset.is_empty() && self.inc.is_empty()
    }
}

/// Merge `value` into `fields[key]`. When both the existing and new value
/// are maps, merge them key by key instead of overwriting wholesale.
fn set_field(fields: &mut BTreeMap<String, FieldValue>, key: &str, value: FieldValue) {
    match (fields.get_mut(key), &value) {
        (Some(FieldValue::Map(existing)), FieldValue::Map(incoming)) => {
            for (k, v) in incoming {
                existing.insert(k.clone(), v.clone());
            }
        }
        _ => {
            fields.insert(key.to_string(), value);
        }
    }
}

fn as_f64(value: &FieldValue) -> Option<f64> {
    match value {
        FieldValue::Int(i) => Some(*i as f64),
        FieldValue::Float(f) => Some(*f),
        _ => None,
    }
}

/// `$inc` only touches fields (existing or absent) whose current value is
/// numeric or missing; non-numeric existing values are left untouched.
fn inc_field(fields: &mut BTreeMap<String, FieldValue>, key: &str, delta: &FieldValue) {
    let Some(delta) = as_f64(delta) else { return };
    match fields.get(key) {
        None => {
            fields.insert(key.to_string(), FieldValue::Float(delta));
        }
        Some(FieldValue::Int(current)) => {
            fields.insert(key.to_string(), FieldValue::Int(current + delta as i64));
        }
        Some(FieldValue::Float(current)) => {
            fields.insert(key.to_string(), FieldValue::Float(current + delta));
        }
        Some(_) => {}
    }
}

/// Apply `ops` to `fields` in the fixed `$set` → `$unset` → `$inc` order.
pub fn apply_update_ops(fields: &mut BTreeMap<String, FieldValue>, ops: &UpdateOps) {
    for (key, value) in &ops.set {
        set_field(fields, key, value.clone());
    }
    for key in &ops.unset {
        fields.remove(key);
    }
    for (key, delta) in &ops.inc {
        inc_field(fields, key, delta);
    }
}
