/*!
Event replay (spec §4.4): reconstructing target state at an arbitrary point
in time from the event log, accelerated by periodic snapshots and carrying
old events forward through schema upgrades as needed.
*/

pub mod backward;
pub mod forward;
pub mod snapshot_cache;
pub mod upgrader;

pub use backward::backward_replay;
pub use forward::{forward_replay, forward_replay_from, ReplayResult};
pub use snapshot_cache::{EntitySnapshot, SnapshotStore};
pub use upgrader::{FieldRenameUpgrader, SchemaUpgrader};

use std::sync::Arc;

use crate::config::DatabaseConfig;
use crate::error::Result;
use crate::model::event::Event;
use crate::storage::Storage;

/// Ties snapshot lookup, schema upgrading and the forward/backward replay
/// primitives together into one entry point.
pub struct Replayer {
    config: DatabaseConfig,
    snapshots: SnapshotStore,
    upgraders: Vec<Box<dyn SchemaUpgrader>>,
    current_schema_version: u32,
}

impl Replayer {
    pub fn new(storage: Arc<dyn Storage>, location: impl Into<String>, config: DatabaseConfig, current_schema_version: u32) -> Self {
        Replayer {
            config,
            snapshots: SnapshotStore::new(storage, location),
            upgraders: Vec::new(),
            current_schema_version,
        }
    }

    pub fn with_upgrader(mut self, upgrader: Box<dyn SchemaUpgrader>) -> Self {
        self.upgraders.push(upgrader);
        self
    }

    /// Apply every registered upgrader whose `target_version` exceeds the
    /// event's recorded schema version, in ascending `target_version` order.
    fn maybe_upgrade(&self, event: &mut Event) {
        let mut metadata = event.metadata.clone().unwrap_or_default();
        let mut recorded = metadata.schema_version.unwrap_or(0);
        if recorded >= self.current_schema_version {
            return;
        }
        let mut pending: Vec<&Box<dyn SchemaUpgrader>> = self
            .upgraders
            .iter()
            .filter(|u| u.target_version() > recorded)
            .collect();
        pending.sort_by_key(|u| u.target_version());
        for upgrader in pending {
            upgrader.upgrade(&mut event.before, &mut event.after, &mut metadata);
            recorded = metadata.schema_version.unwrap_or(recorded);
        }
        event.metadata = Some(metadata);
    }

    /// Replay `target`'s state at `at`, starting from the nearest snapshot
    /// at or before `at` when one exists, applying schema upgrades to each
    /// event along the way. Returns the result and, when the walked delta
    /// reached `snapshot_threshold`, a fresh snapshot to persist.
    pub async fn replay(&self, target: &str, events: &[Event], at: i64) -> Result<(ReplayResult, Option<EntitySnapshot>)> {
        let snapshot = self.snapshots.latest_before(target, at).await?;
        let (base_state, base_ts, base_count) = match &snapshot {
            Some(s) => (s.state.clone(), s.ts, s.event_count),
            None => (None, i64::MIN, 0),
        };

        let mut upgraded: Vec<Event> = events
            .iter()
            .filter(|e| e.ts > base_ts && e.ts <= at)
            .cloned()
            .collect();
        for event in &mut upgraded {
            self.maybe_upgrade(event);
        }

        let result = forward_replay_from(base_state, &upgraded, at);

        let new_snapshot = if result.events_replayed >= self.config.snapshot_threshold {
            let last_event_id = upgraded.iter().map(|e| e.id).max();
            Some(EntitySnapshot {
                target: target.to_string(),
                ts: at,
                state: result.state.clone(),
                event_count: base_count + result.events_replayed,
                last_event_id,
            })
        } else {
            None
        };

        Ok((result, new_snapshot))
    }

    /// Persist `snapshot` for later acceleration.
    pub async fn save_snapshot(&self, snapshot: &EntitySnapshot) -> Result<()> {
        self.snapshots.save(snapshot).await
    }

    /// Undo events after `to_ts`, given the state as of `current_ts`.
    pub fn rewind(&self, current_state: Option<crate::model::entity::Entity>, events: &[Event], to_ts: i64) -> ReplayResult {
        backward_replay(current_state, events, to_ts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::entity::{Entity, FieldValue};
    use crate::model::event::Op;
    use crate::storage::memory_store;
    use chrono::Utc;
    use ulid::Ulid;

    fn entity(title: &str) -> Entity {
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
            fields: [(title.to_string(), FieldValue::String(title.to_string()))]
                .into_iter()
                .collect(),
        }
    }

    fn event(ts: i64, op: Op, after: Option<Entity>, schema_version: Option<u32>) -> Event {
        Event {
            id: Ulid::new(),
            ts,
            op,
            target: "posts:1".to_string(),
            before: None,
            after,
            actor: None,
            metadata: Some(crate::model::event::EventMetadata {
                schema_version,
                upgraded_from: None,
            }),
        }
    }

    #[tokio::test]
    async fn replay_without_snapshot_walks_from_the_beginning() {
        let replayer = Replayer::new(memory_store(), "wh/db/posts", DatabaseConfig::default(), 1);
        let events = vec![
            event(1000, Op::Create, Some(entity("first")), Some(1)),
            event(2000, Op::Update, Some(entity("second")), Some(1)),
        ];
        let (result, snapshot) = replayer.replay("posts:1", &events, 2000).await.unwrap();
        assert!(result.existed);
        assert_eq!(result.events_replayed, 2);
        assert!(snapshot.is_none());
    }

    #[tokio::test]
    async fn replay_uses_snapshot_to_skip_earlier_events() {
        let storage = memory_store();
        let replayer = Replayer::new(storage.clone(), "wh/db/posts", DatabaseConfig::default(), 1);
        replayer
            .save_snapshot(&EntitySnapshot {
                target: "posts:1".to_string(),
                ts: 1500,
                state: Some(entity("first")),
                event_count: 1,
                last_event_id: None,
            })
            .await
            .unwrap();

        let events = vec![
            event(1000, Op::Create, Some(entity("first")), Some(1)),
            event(2000, Op::Update, Some(entity("second")), Some(1)),
        ];
        let (result, _) = replayer.replay("posts:1", &events, 2000).await.unwrap();
        assert_eq!(result.events_replayed, 1);
        assert_eq!(
            result.state.unwrap().fields.get("second"),
            Some(&FieldValue::String("second".to_string()))
        );
    }

    #[tokio::test]
    async fn replay_reaching_snapshot_threshold_proposes_a_snapshot() {
        let mut config = DatabaseConfig::default();
        config.snapshot_threshold = 2;
        let replayer = Replayer::new(memory_store(), "wh/db/posts", config, 1);
        let events = vec![
            event(1000, Op::Create, Some(entity("first")), Some(1)),
            event(2000, Op::Update, Some(entity("second")), Some(1)),
        ];
        let (_, snapshot) = replayer.replay("posts:1", &events, 2000).await.unwrap();
        assert!(snapshot.is_some());
        assert_eq!(snapshot.unwrap().event_count, 2);
    }

    #[tokio::test]
    async fn replay_applies_schema_upgrade_to_older_events() {
        let mut renames = std::collections::HashMap::new();
        renames.insert("headline".to_string(), "title".to_string());
        let replayer = Replayer::new(memory_store(), "wh/db/posts", DatabaseConfig::default(), 2)
            .with_upgrader(Box::new(FieldRenameUpgrader::new(2, renames)));

        let old_entity = Entity {
            fields: [("headline".to_string(), FieldValue::String("hi".to_string()))]
                .into_iter()
                .collect(),
            ..entity("ignored")
        };
        let events = vec![event(1000, Op::Create, Some(old_entity), Some(1))];
        let (result, _) = replayer.replay("posts:1", &events, 1000).await.unwrap();
        assert_eq!(
            result.state.unwrap().fields.get("title"),
            Some(&FieldValue::String("hi".to_string()))
        );
    }
}
