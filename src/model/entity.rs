/*!
The [Entity] record and the [FieldValue] tagged variant used for dynamic,
user-defined fields (spec §3, §9 "Dynamic entity field types").
*/

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A dynamically typed field value. Avoids an inheritance hierarchy in favor
/// of a closed sum type matched exhaustively by the mutation operators and
/// the variant encoder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    /// Absent value; never actually serialized (elided on write, per §4.6).
    Null,
    /// A boolean.
    Bool(bool),
    /// A 64-bit signed integer.
    Int(i64),
    /// A 64-bit float.
    Float(f64),
    /// A UTF-8 string.
    String(String),
    /// Raw bytes.
    Bytes(#[serde(with = "serde_bytes")] Vec<u8>),
    /// A millisecond-precision timestamp.
    Timestamp(DateTime<Utc>),
    /// An ordered list of values.
    List(Vec<FieldValue>),
    /// A nested map of values, ordered for deterministic canonicalization.
    Map(BTreeMap<String, FieldValue>),
}

impl FieldValue {
    /// True for [FieldValue::Null].
    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    /// Numeric view used by the `$inc` operator; non-numeric values return `None`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Int(i) => Some(*i as f64),
            FieldValue::Float(f) => Some(*f),
            _ => None,
        }
    }
}

/// An entity's reserved attributes plus an open bag of user fields.
///
/// `$id` has the shape `<namespace>/<ulid>` and is immutable once assigned;
/// `version` increases monotonically with every successful mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    /// `<namespace>/<ulid>`, immutable.
    #[serde(rename = "$id")]
    pub id: String,
    /// User-facing entity type tag.
    #[serde(rename = "$type")]
    pub type_: String,
    /// Display name, a user field promoted to a reserved attribute.
    pub name: Option<String>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Actor that created the entity.
    pub created_by: Option<String>,
    /// Last-mutation timestamp.
    pub updated_at: DateTime<Utc>,
    /// Actor that performed the last mutation.
    pub updated_by: Option<String>,
    /// Soft-delete timestamp, if deleted.
    pub deleted_at: Option<DateTime<Utc>>,
    /// Actor that soft-deleted the entity.
    pub deleted_by: Option<String>,
    /// Monotonically increasing version counter.
    pub version: u64,
    /// Arbitrary user-defined fields, keyed by field name.
    #[serde(flatten)]
    pub fields: BTreeMap<String, FieldValue>,
}

impl Entity {
    /// Namespace portion of `$id`, i.e. everything before the final `/`.
    pub fn namespace(&self) -> &str {
        self.id.split('/').next().unwrap_or(&self.id)
    }

    /// Whether this entity is currently soft-deleted.
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// The reserved field names that are always present and never dropped by
    /// schema evolution (spec §3 invariants).
    pub fn core_field_names() -> &'static [&'static str] {
        &[
            "$id",
            "$type",
            "name",
            "createdAt",
            "createdBy",
            "updatedAt",
            "updatedBy",
            "deletedAt",
            "deletedBy",
            "version",
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn namespace_is_prefix_of_id() {
        let mut entity = sample_entity();
        entity.id = "users/01H9Z".to_string();
        assert_eq!(entity.namespace(), "users");
    }

    fn sample_entity() -> Entity {
        Entity {
            id: "users/01H9Z".to_string(),
            type_: "user".to_string(),
            name: Some("Alice".to_string()),
            created_at: Utc::now(),
            created_by: None,
            updated_at: Utc::now(),
            updated_by: None,
            deleted_at: None,
            deleted_by: None,
            version: 1,
            fields: BTreeMap::new(),
        }
    }

    #[test]
    fn not_deleted_by_default() {
        assert!(!sample_entity().is_deleted());
    }
}
