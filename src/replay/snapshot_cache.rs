/*!
Entity snapshots (spec §4.4): materialized state at a point in time, keyed
on `(target, ts)`, used to accelerate replay by giving it a starting point
closer to the query time than the beginning of history.
*/

use std::sync::Arc;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::error::{ParqueError, Result};
use crate::model::entity::Entity;
use crate::storage::Storage;

/// Materialized state of one target at `ts`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EntitySnapshot {
    pub target: String,
    pub ts: i64,
    pub state: Option<Entity>,
    /// Total events applied to reach this state, from the beginning of history.
    pub event_count: usize,
    pub last_event_id: Option<Ulid>,
}

fn sanitize_target(target: &str) -> String {
    target.replace([':', '/'], "_")
}

fn snapshot_path(location: &str, target: &str, ts: i64) -> String {
    format!("{location}/snapshots/{}/{ts}.json", sanitize_target(target))
}

fn snapshot_prefix(location: &str, target: &str) -> String {
    format!("{location}/snapshots/{}/", sanitize_target(target))
}

/// Storage-backed snapshot store for one namespace's targets.
pub struct SnapshotStore {
    storage: Arc<dyn Storage>,
    location: String,
}

impl SnapshotStore {
    pub fn new(storage: Arc<dyn Storage>, location: impl Into<String>) -> Self {
        SnapshotStore {
            storage,
            location: location.into(),
        }
    }

    /// Persist `snapshot`, keyed by `(target, ts)`.
    pub async fn save(&self, snapshot: &EntitySnapshot) -> Result<()> {
        let path = snapshot_path(&self.location, &snapshot.target, snapshot.ts);
        let bytes = serde_json::to_vec(snapshot).map_err(|e| ParqueError::Other(e.into()))?;
        self.storage.write(&path, Bytes::from(bytes), Default::default()).await?;
        Ok(())
    }

    /// The most recent snapshot for `target` with `ts <= at`, if any.
    pub async fn latest_before(&self, target: &str, at: i64) -> Result<Option<EntitySnapshot>> {
        let prefix = snapshot_prefix(&self.location, target);
        let paths = self.storage.list(&prefix).await?;
        let mut best_ts: Option<i64> = None;
        let mut best_path: Option<String> = None;
        for path in paths {
            let Some(file_name) = path.rsplit('/').next() else { continue };
            let Some(stem) = file_name.strip_suffix(".json") else { continue };
            let Ok(ts) = stem.parse::<i64>() else { continue };
            if ts <= at && best_ts.map_or(true, |b| ts > b) {
                best_ts = Some(ts);
                best_path = Some(path);
            }
        }
        let Some(path) = best_path else { return Ok(None) };
        let bytes = self.storage.read(&path).await?;
        let snapshot: EntitySnapshot = serde_json::from_slice(&bytes).map_err(|e| ParqueError::CorruptedManifest {
            which: "local",
            message: format!("failed to parse snapshot {path}: {e}"),
        })?;
        Ok(Some(snapshot))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory_store;

    fn sample(target: &str, ts: i64, event_count: usize) -> EntitySnapshot {
        EntitySnapshot {
            target: target.to_string(),
            ts,
            state: None,
            event_count,
            last_event_id: None,
        }
    }

    #[tokio::test]
    async fn latest_before_picks_the_closest_snapshot_not_exceeding_at() {
        let store = SnapshotStore::new(memory_store(), "wh/db/posts");
        store.save(&sample("posts:1", 1000, 5)).await.unwrap();
        store.save(&sample("posts:1", 3000, 12)).await.unwrap();
        store.save(&sample("posts:1", 5000, 20)).await.unwrap();

        let found = store.latest_before("posts:1", 4000).await.unwrap().unwrap();
        assert_eq!(found.ts, 3000);
        assert_eq!(found.event_count, 12);
    }

    #[tokio::test]
    async fn no_snapshot_before_at_returns_none() {
        let store = SnapshotStore::new(memory_store(), "wh/db/posts");
        store.save(&sample("posts:1", 5000, 20)).await.unwrap();
        assert!(store.latest_before("posts:1", 1000).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn snapshots_for_distinct_targets_do_not_collide() {
        let store = SnapshotStore::new(memory_store(), "wh/db/posts");
        store.save(&sample("posts:1", 1000, 1)).await.unwrap();
        store.save(&sample("posts:2", 1000, 1)).await.unwrap();
        assert!(store.latest_before("posts:3", 1000).await.unwrap().is_none());
    }
}
