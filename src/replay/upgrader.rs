/*!
Schema version upgraders (spec §4.4): applied to events during replay when
the engine's current schema version is newer than the event's recorded
`schema_version`, so old events can be reinterpreted under the current
field names without rewriting history.
*/

use std::collections::HashMap;

use crate::model::entity::Entity;
use crate::model::event::EventMetadata;

/// Transforms an event's `before`/`after` state from one schema version to
/// the next, stamping `metadata.upgraded_from` so the upgrade is auditable.
pub trait SchemaUpgrader: Send + Sync {
    /// The schema version this upgrader produces once applied.
    fn target_version(&self) -> u32;

    fn upgrade(&self, before: &mut Option<Entity>, after: &mut Option<Entity>, metadata: &mut EventMetadata);
}

/// Renames fields, carrying their values across the rename, on both sides
/// of an event.
pub struct FieldRenameUpgrader {
    pub target_version: u32,
    pub renames: HashMap<String, String>,
}

impl FieldRenameUpgrader {
    pub fn new(target_version: u32, renames: HashMap<String, String>) -> Self {
        FieldRenameUpgrader { target_version, renames }
    }

    fn apply(&self, entity: &mut Entity) {
        for (old_name, new_name) in &self.renames {
            if let Some(value) = entity.fields.remove(old_name) {
                entity.fields.insert(new_name.clone(), value);
            }
        }
    }
}

impl SchemaUpgrader for FieldRenameUpgrader {
    fn target_version(&self) -> u32 {
        self.target_version
    }

    fn upgrade(&self, before: &mut Option<Entity>, after: &mut Option<Entity>, metadata: &mut EventMetadata) {
        if let Some(entity) = before {
            self.apply(entity);
        }
        if let Some(entity) = after {
            self.apply(entity);
        }
        metadata.upgraded_from = Some(metadata.schema_version.unwrap_or(0));
        metadata.schema_version = Some(self.target_version);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::entity::FieldValue;
    use chrono::Utc;

    fn entity_with(field: &str, value: &str) -> Entity {
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
            version: 1,
            fields: [(field.to_string(), FieldValue::String(value.to_string()))]
                .into_iter()
                .collect(),
        }
    }

    #[test]
    fn rename_upgrader_moves_values_and_stamps_metadata() {
        let upgrader = FieldRenameUpgrader::new(
            2,
            [("headline".to_string(), "title".to_string())].into_iter().collect(),
        );
        let mut before = Some(entity_with("headline", "old"));
        let mut after = Some(entity_with("headline", "new"));
        let mut metadata = EventMetadata {
            schema_version: Some(1),
            upgraded_from: None,
        };

        upgrader.upgrade(&mut before, &mut after, &mut metadata);

        assert_eq!(
            after.unwrap().fields.get("title"),
            Some(&FieldValue::String("new".to_string()))
        );
        assert_eq!(metadata.upgraded_from, Some(1));
        assert_eq!(metadata.schema_version, Some(2));
    }

    #[test]
    fn rename_upgrader_ignores_absent_fields() {
        let upgrader = FieldRenameUpgrader::new(2, [("missing".to_string(), "present".to_string())].into_iter().collect());
        let mut before = None;
        let mut after = Some(entity_with("headline", "new"));
        let mut metadata = EventMetadata::default();

        upgrader.upgrade(&mut before, &mut after, &mut metadata);

        assert!(after.unwrap().fields.contains_key("headline"));
    }
}
