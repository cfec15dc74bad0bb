/*!
The mutation executor (spec §4.9): create/update/delete/restore/upsert,
applied as [Event]s against the write-ahead log, with version checks and
read-only enforcement.
*/

use std::sync::Arc;

use chrono::Utc;
use ulid::Ulid;

use crate::config::DatabaseConfig;
use crate::error::{ParqueError, Result};
use crate::model::entity::Entity;
use crate::model::event::{Event, Op};
use crate::wal::EventLog;

use super::operators::{apply_update_ops, UpdateOps};

/// Outcome of a `delete` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeleteOutcome {
    pub deleted_count: u32,
}

/// Options accepted by `update`/`upsert`.
#[derive(Debug, Clone, Default)]
pub struct UpdateOptions {
    pub expected_version: Option<u64>,
    pub upsert: bool,
    pub actor: Option<String>,
}

/// Applies mutations to entities by appending events to the log and
/// returning the resulting in-memory state. Does not itself materialize
/// Parquet rows; that happens when the event log is replayed/compacted
/// into the table (spec §4.3, §4.4).
pub struct MutationExecutor {
    log: Arc<EventLog>,
    config: DatabaseConfig,
}

impl MutationExecutor {
    pub fn new(log: Arc<EventLog>, config: DatabaseConfig) -> Self {
        MutationExecutor { log, config }
    }

    fn check_read_only(&self) -> Result<()> {
        if self.config.read_only {
            return Err(ParqueError::ReadOnly);
        }
        Ok(())
    }

    /// Create a new entity of `type_` at `target` with the given initial
    /// fields. Fails with `ReadOnly` under a read-only config.
    pub async fn create(&self, target: &str, type_: &str, fields: std::collections::BTreeMap<String, crate::model::entity::FieldValue>, actor: Option<String>) -> Result<Entity> {
        self.check_read_only()?;
        let now = Utc::now();
        let entity = Entity {
            id: target.to_string(),
            type_: type_.to_string(),
            name: None,
            created_at: now,
            created_by: actor.clone(),
            updated_at: now,
            updated_by: actor.clone(),
            deleted_at: None,
            deleted_by: None,
            version: 1,
            fields,
        };
        self.emit(target, Op::Create, None, Some(entity.clone()), actor).await?;
        Ok(entity)
    }

    /// Apply `ops` to `current`, checking `expected_version` first. On
    /// absence with `upsert: true`, creates a new entity with `$type =
    /// "unknown"` (unless the caller's ops provide one) instead.
    pub async fn update(&self, target: &str, current: Option<Entity>, ops: UpdateOps, options: UpdateOptions) -> Result<Entity> {
        self.check_read_only()?;
        match current {
            None if options.upsert => {
                let mut fields = std::collections::BTreeMap::new();
                apply_update_ops(&mut fields, &ops);
                let now = Utc::now();
                let entity = Entity {
                    id: target.to_string(),
                    type_: "unknown".to_string(),
                    name: None,
                    created_at: now,
                    created_by: options.actor.clone(),
                    updated_at: now,
                    updated_by: options.actor.clone(),
                    deleted_at: None,
                    deleted_by: None,
                    version: 1,
                    fields,
                };
                self.emit(target, Op::Create, None, Some(entity.clone()), options.actor).await?;
                Ok(entity)
            }
            None => Err(ParqueError::NotFound(target.to_string())),
            Some(before) => {
                if let Some(expected) = options.expected_version {
                    if expected != before.version {
                        return Err(ParqueError::VersionConflict {
                            target: target.to_string(),
                            expected,
                            found: before.version,
                        });
                    }
                }
                let mut after = before.clone();
                apply_update_ops(&mut after.fields, &ops);
                after.version += 1;
                after.updated_at = Utc::now();
                after.updated_by = options.actor.clone();
                self.emit(target, Op::Update, Some(before), Some(after.clone()), options.actor).await?;
                Ok(after)
            }
        }
    }

    /// Soft delete: stamps `deletedAt`/`deletedBy`. A second delete of an
    /// already-deleted entity returns `deleted_count: 0` without emitting
    /// another event.
    pub async fn delete(&self, target: &str, current: Option<Entity>, actor: Option<String>) -> Result<DeleteOutcome> {
        self.check_read_only()?;
        let Some(before) = current else {
            return Ok(DeleteOutcome { deleted_count: 0 });
        };
        if before.deleted_at.is_some() {
            return Ok(DeleteOutcome { deleted_count: 0 });
        }
        let mut after = before.clone();
        after.deleted_at = Some(Utc::now());
        after.deleted_by = actor.clone();
        after.version += 1;
        self.emit(target, Op::Delete, Some(before), Some(after), actor).await?;
        Ok(DeleteOutcome { deleted_count: 1 })
    }

    /// Clear `deletedAt`/`deletedBy`, preserving every other field, and
    /// bump `version`.
    pub async fn restore(&self, target: &str, current: Entity, actor: Option<String>) -> Result<Entity> {
        self.check_read_only()?;
        let before = current.clone();
        let mut after = current;
        after.deleted_at = None;
        after.deleted_by = None;
        after.version += 1;
        after.updated_at = Utc::now();
        after.updated_by = actor.clone();
        self.emit(target, Op::Update, Some(before), Some(after.clone()), actor).await?;
        Ok(after)
    }

    async fn emit(&self, target: &str, op: Op, before: Option<Entity>, after: Option<Entity>, actor: Option<String>) -> Result<()> {
        let event = Event {
            id: Ulid::new(),
            ts: Utc::now().timestamp_millis(),
            op,
            target: target.to_string(),
            before,
            after,
            actor,
            metadata: None,
        };
        self.log.append(event).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory_store;
    use std::collections::BTreeMap;

    async fn executor() -> MutationExecutor {
        let storage = memory_store();
        let log = EventLog::open(storage, "posts", "wh/db/posts", DatabaseConfig::default())
            .await
            .unwrap();
        MutationExecutor::new(Arc::new(log), DatabaseConfig::default())
    }

    #[tokio::test]
    async fn create_stamps_version_one_and_audit_fields() {
        let executor = executor().await;
        let entity = executor
            .create("posts:1", "post", BTreeMap::new(), Some("alice".to_string()))
            .await
            .unwrap();
        assert_eq!(entity.version, 1);
        assert_eq!(entity.created_by, Some("alice".to_string()));
    }

    #[tokio::test]
    async fn update_bumps_version_and_rejects_mismatched_expected_version() {
        let executor = executor().await;
        let created = executor.create("posts:1", "post", BTreeMap::new(), None).await.unwrap();

        let mut ops = UpdateOps::default();
        ops.set.insert("title".to_string(), crate::model::entity::FieldValue::String("hi".to_string()));

        let result = executor
            .update(
                "posts:1",
                Some(created.clone()),
                ops.clone(),
                UpdateOptions { expected_version: Some(99), ..Default::default() },
            )
            .await;
        assert!(matches!(result, Err(ParqueError::VersionConflict { .. })));

        let updated = executor
            .update("posts:1", Some(created), ops, UpdateOptions { expected_version: Some(1), ..Default::default() })
            .await
            .unwrap();
        assert_eq!(updated.version, 2);
    }

    #[tokio::test]
    async fn upsert_creates_unknown_typed_entity_when_absent() {
        let executor = executor().await;
        let mut ops = UpdateOps::default();
        ops.set.insert("title".to_string(), crate::model::entity::FieldValue::String("hi".to_string()));
        let entity = executor
            .update("posts:1", None, ops, UpdateOptions { upsert: true, ..Default::default() })
            .await
            .unwrap();
        assert_eq!(entity.type_, "unknown");
        assert_eq!(entity.version, 1);
    }

    #[tokio::test]
    async fn second_delete_is_a_no_op() {
        let executor = executor().await;
        let created = executor.create("posts:1", "post", BTreeMap::new(), None).await.unwrap();
        let first = executor.delete("posts:1", Some(created.clone()), None).await.unwrap();
        assert_eq!(first.deleted_count, 1);

        let mut deleted = created;
        deleted.deleted_at = Some(Utc::now());
        let second = executor.delete("posts:1", Some(deleted), None).await.unwrap();
        assert_eq!(second.deleted_count, 0);
    }

    #[tokio::test]
    async fn restore_clears_deletion_and_bumps_version() {
        let executor = executor().await;
        let created = executor.create("posts:1", "post", BTreeMap::new(), None).await.unwrap();
        let mut deleted = created;
        deleted.deleted_at = Some(Utc::now());
        deleted.version = 2;
        let restored = executor.restore("posts:1", deleted, None).await.unwrap();
        assert!(restored.deleted_at.is_none());
        assert_eq!(restored.version, 3);
    }

    #[tokio::test]
    async fn read_only_config_rejects_every_mutation() {
        let storage = memory_store();
        let mut config = DatabaseConfig::default();
        config.read_only = true;
        let log = EventLog::open(storage, "posts", "wh/db/posts", config.clone()).await.unwrap();
        let executor = MutationExecutor::new(Arc::new(log), config);
        let result = executor.create("posts:1", "post", BTreeMap::new(), None).await;
        assert!(matches!(result, Err(ParqueError::ReadOnly)));
    }
}
