/*!
Projection (spec §4.8): inclusion or exclusion, never mixed; an empty
projection is the identity.
*/

use crate::error::{ParqueError, Result};
use crate::model::entity::Entity;

#[derive(Debug, Clone, PartialEq)]
pub enum Projection {
    /// No projection: return the entity unchanged.
    Identity,
    Include(Vec<String>),
    Exclude(Vec<String>),
}

impl Default for Projection {
    fn default() -> Self {
        Projection::Identity
    }
}

impl Projection {
    /// Build a projection from `{field: 1|true}` or `{field: 0|false}`
    /// pairs. Mixing inclusion and exclusion is rejected.
    pub fn from_spec(spec: &[(String, bool)]) -> Result<Self> {
        if spec.is_empty() {
            return Ok(Projection::Identity);
        }
        let include_count = spec.iter().filter(|(_, keep)| *keep).count();
        if include_count != 0 && include_count != spec.len() {
            return Err(ParqueError::Other(anyhow::anyhow!(
                "projection cannot mix inclusion and exclusion"
            )));
        }
        let fields = spec.iter().map(|(name, _)| name.clone()).collect();
        if include_count == spec.len() {
            Ok(Projection::Include(fields))
        } else {
            Ok(Projection::Exclude(fields))
        }
    }

    /// Apply this projection to `entity`, returning a new entity with only
    /// the selected custom fields. Core attributes are always kept;
    /// include-lists naming core attributes are accepted but have no
    /// further effect since those fields are not part of `fields`.
    pub fn apply(&self, entity: Entity) -> Entity {
        match self {
            Projection::Identity => entity,
            Projection::Include(names) => {
                let mut projected = entity.clone();
                projected.fields = entity
                    .fields
                    .into_iter()
                    .filter(|(name, _)| names.contains(name))
                    .collect();
                projected
            }
            Projection::Exclude(names) => {
                let mut projected = entity.clone();
                projected.fields = entity
                    .fields
                    .into_iter()
                    .filter(|(name, _)| !names.contains(name))
                    .collect();
                projected
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::entity::FieldValue;
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
            version: 1,
            fields: [
                ("title".to_string(), FieldValue::String("hi".to_string())),
                ("views".to_string(), FieldValue::Int(1)),
            ]
            .into_iter()
            .collect(),
        }
    }

    #[test]
    fn mixed_projection_is_rejected() {
        let spec = vec![("title".to_string(), true), ("views".to_string(), false)];
        assert!(Projection::from_spec(&spec).is_err());
    }

    #[test]
    fn inclusion_keeps_only_named_fields() {
        let projection = Projection::from_spec(&[("title".to_string(), true)]).unwrap();
        let projected = projection.apply(entity());
        assert!(projected.fields.contains_key("title"));
        assert!(!projected.fields.contains_key("views"));
    }

    #[test]
    fn exclusion_drops_named_fields() {
        let projection = Projection::from_spec(&[("views".to_string(), false)]).unwrap();
        let projected = projection.apply(entity());
        assert!(projected.fields.contains_key("title"));
        assert!(!projected.fields.contains_key("views"));
    }

    #[test]
    fn empty_projection_is_identity() {
        let projection = Projection::from_spec(&[]).unwrap();
        let projected = projection.apply(entity());
        assert_eq!(projected.fields.len(), 2);
    }
}
