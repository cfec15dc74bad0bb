/*!
The `Database` facade (spec §2): wires the storage abstraction through the
committer, event log, replay, query/mutation executors and the sync/branch
layers for one namespace, in that dependency order.
*/

use std::sync::Arc;

use crate::branch::BranchManager;
use crate::catalog::Namespace;
use crate::config::DatabaseConfig;
use crate::error::Result;
use crate::mutation::MutationExecutor;
use crate::query::QueryExecutor;
use crate::replay::Replayer;
use crate::storage::Storage;
use crate::table::{Committer, Table};
use crate::wal::EventLog;

/// One namespace's database: the table (committed Parquet snapshots), the
/// event log backing it, and the query/mutation/replay/branch surfaces
/// built on top.
pub struct Database {
    namespace: Namespace,
    location: String,
    config: DatabaseConfig,
    table: Arc<Table>,
    event_log: Arc<EventLog>,
    replayer: Replayer,
    query: QueryExecutor,
    mutation: MutationExecutor,
    branch: BranchManager,
}

impl Database {
    /// Open (or create) the database for `namespace` at `location`, given a
    /// storage backend and config. Current schema version starts at 1;
    /// callers register upgraders via [Replayer::with_upgrader] separately
    /// if they need schema migration on replay.
    pub async fn open(
        storage: Arc<dyn Storage>,
        namespace: &str,
        location: impl Into<String>,
        config: DatabaseConfig,
    ) -> Result<Self> {
        let namespace = Namespace::try_new(namespace)?;
        let location = location.into();

        let committer = Arc::new(Committer::new(storage.clone(), config.clone()));
        let table = Arc::new(Table::new(namespace.clone(), location.clone(), storage.clone(), committer, config.clone()));
        let event_log = Arc::new(EventLog::open(storage.clone(), namespace.as_str(), &location, config.clone()).await?);
        let replayer = Replayer::new(storage.clone(), &location, config.clone(), 1);
        let query = QueryExecutor::new(table.clone());
        let mutation = MutationExecutor::new(event_log.clone(), config.clone());
        let branch = BranchManager::new(storage.clone(), &location);

        Ok(Database {
            namespace,
            location,
            config,
            table,
            event_log,
            replayer,
            query,
            mutation,
            branch,
        })
    }

    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    pub fn table(&self) -> &Arc<Table> {
        &self.table
    }

    pub fn event_log(&self) -> &Arc<EventLog> {
        &self.event_log
    }

    pub fn query(&self) -> &QueryExecutor {
        &self.query
    }

    pub fn mutation(&self) -> &MutationExecutor {
        &self.mutation
    }

    pub fn replayer(&self) -> &Replayer {
        &self.replayer
    }

    pub fn branch(&self) -> &BranchManager {
        &self.branch
    }

    /// Force the event log's pending queue to disk now, instead of waiting
    /// for the adaptive threshold to trigger it.
    pub async fn flush_events(&self) -> Result<()> {
        self.event_log.flush().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory_store;

    #[tokio::test]
    async fn open_wires_every_layer_without_error() {
        let storage = memory_store();
        let db = Database::open(storage, "posts", "wh/db/posts", DatabaseConfig::default()).await.unwrap();
        assert_eq!(db.namespace().as_str(), "posts");
        assert_eq!(db.event_log().pending_len().await, 0);
    }

    #[tokio::test]
    async fn create_then_query_round_trips_through_the_facade() {
        let storage = memory_store();
        let db = Database::open(storage, "posts", "wh/db/posts", DatabaseConfig::default()).await.unwrap();

        db.mutation()
            .create("posts:1", "post", Default::default(), Some("alice".to_string()))
            .await
            .unwrap();

        assert_eq!(db.event_log().pending_len().await, 1);
    }
}
