/*!
Table schema types (spec §3). Grounded on the teacher's
`model::schema::PrimitiveType`/`SchemaStruct` pair: a closed primitive-type
enum plus a `Vec<Field>` struct, with evolution kept append-only so core
fields are never dropped.
*/

use serde::{Deserialize, Serialize};

/// The closed set of field types a [Schema] can describe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    /// UTF-8 text.
    String,
    /// 32-bit signed integer.
    Int,
    /// 64-bit signed integer.
    Long,
    /// 32-bit IEEE-754 float.
    Float,
    /// 64-bit IEEE-754 float.
    Double,
    /// True/false.
    Boolean,
    /// Raw bytes.
    Binary,
    /// Millisecond-precision timestamp.
    Timestamp,
}

/// A single field in a [Schema].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    /// Field name as it appears on entities.
    pub name: String,
    /// The field's declared type.
    #[serde(rename = "type")]
    pub type_: FieldType,
    /// Whether the field must always be present.
    #[serde(default)]
    pub required: bool,
    /// Whether the field may hold a null value.
    #[serde(default = "default_nullable")]
    pub nullable: bool,
    /// When this field replaces an older field, the prior name (spec §8 scenario 2).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub renamed_from: Option<String>,
}

fn default_nullable() -> bool {
    true
}

/// A versioned, named table schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    /// Schema name (typically the namespace name).
    pub name: String,
    /// Monotonically increasing schema version, bumped on every evolution.
    #[serde(default)]
    pub version: Option<u32>,
    /// Declared fields, core fields first by convention.
    pub fields: Vec<Field>,
}

impl Schema {
    /// Fields that are always injected and never dropped on evolution
    /// (spec §3 invariant "Core fields of a schema are always present").
    pub fn core_fields() -> Vec<Field> {
        use FieldType::*;
        vec![
            Field {
                name: "$id".to_string(),
                type_: String,
                required: true,
                nullable: false,
                renamed_from: None,
            },
            Field {
                name: "$type".to_string(),
                type_: FieldType::String,
                required: true,
                nullable: false,
                renamed_from: None,
            },
            Field {
                name: "name".to_string(),
                type_: FieldType::String,
                required: false,
                nullable: true,
                renamed_from: None,
            },
            Field {
                name: "createdAt".to_string(),
                type_: Timestamp,
                required: true,
                nullable: false,
                renamed_from: None,
            },
            Field {
                name: "createdBy".to_string(),
                type_: FieldType::String,
                required: false,
                nullable: true,
                renamed_from: None,
            },
            Field {
                name: "updatedAt".to_string(),
                type_: Timestamp,
                required: true,
                nullable: false,
                renamed_from: None,
            },
            Field {
                name: "updatedBy".to_string(),
                type_: FieldType::String,
                required: false,
                nullable: true,
                renamed_from: None,
            },
            Field {
                name: "deletedAt".to_string(),
                type_: Timestamp,
                required: false,
                nullable: true,
                renamed_from: None,
            },
            Field {
                name: "deletedBy".to_string(),
                type_: FieldType::String,
                required: false,
                nullable: true,
                renamed_from: None,
            },
            Field {
                name: "version".to_string(),
                type_: FieldType::Long,
                required: true,
                nullable: false,
                renamed_from: None,
            },
        ]
    }

    /// Create a new schema for `name`, seeded with the core fields.
    pub fn new(name: impl Into<String>) -> Self {
        Schema {
            name: name.into(),
            version: Some(0),
            fields: Schema::core_fields(),
        }
    }

    /// Find a field by name.
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Evolve the schema by applying a set of field changes, preserving core
    /// fields and honoring `renamed_from` for rename-in-place evolution
    /// (spec §8 scenario 2: `username` replaces `user_name`).
    pub fn evolve(&self, new_fields: Vec<Field>) -> Schema {
        let core_names: Vec<&str> = Schema::core_fields().iter().map(|f| f.name.as_str()).collect();
        let mut fields: Vec<Field> = self
            .fields
            .iter()
            .filter(|f| core_names.contains(&f.name.as_str()))
            .cloned()
            .collect();

        let renamed_away: Vec<&str> = new_fields
            .iter()
            .filter_map(|f| f.renamed_from.as_deref())
            .collect();

        for existing in self
            .fields
            .iter()
            .filter(|f| !core_names.contains(&f.name.as_str()))
        {
            if renamed_away.contains(&existing.name.as_str()) {
                continue;
            }
            if !new_fields.iter().any(|f| f.name == existing.name) {
                fields.push(existing.clone());
            }
        }

        for field in new_fields {
            fields.push(field);
        }

        Schema {
            name: self.name.clone(),
            version: Some(self.version.unwrap_or(0) + 1),
            fields,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evolve_rename_drops_old_keeps_core() {
        let mut schema = Schema::new("users");
        schema.fields.push(Field {
            name: "user_name".to_string(),
            type_: FieldType::String,
            required: false,
            nullable: true,
            renamed_from: None,
        });

        let evolved = schema.evolve(vec![Field {
            name: "username".to_string(),
            type_: FieldType::String,
            required: false,
            nullable: true,
            renamed_from: Some("user_name".to_string()),
        }]);

        assert!(evolved.field("username").is_some());
        assert!(evolved.field("user_name").is_none());
        for core in core_field_names() {
            assert!(evolved.field(core).is_some(), "missing core field {core}");
        }
    }

    fn core_field_names() -> &'static [&'static str] {
        &[
            "$id", "$type", "name", "createdAt", "createdBy", "updatedAt", "updatedBy",
            "deletedAt", "deletedBy", "version",
        ]
    }
}
