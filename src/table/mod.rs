/*!
The table layer (spec §4.2): ties the OCC committer to the Parquet writer,
turning appended entities into data files plus a new metadata snapshot.
*/

pub mod backoff;
pub mod committer;
pub mod version_hint;

use std::sync::Arc;

use bytes::Bytes;
use uuid::Uuid;

use crate::catalog::Namespace;
use crate::config::DatabaseConfig;
use crate::error::Result;
use crate::index::encoding::fnv1a_32;
use crate::model::entity::Entity;
use crate::model::manifest::{DataFileEntry, FileStatus, TableManifest};
use crate::model::metadata::TableMetadata;
use crate::parquet_io;
use crate::storage::Storage;

pub use backoff::AbortSignal;
pub use committer::Committer;

/// One namespace's table: its storage location, committer, and the config
/// tunables (shred fields, row-group size) governing how it writes data.
pub struct Table {
    namespace: Namespace,
    location: String,
    storage: Arc<dyn Storage>,
    committer: Arc<Committer>,
    config: DatabaseConfig,
}

impl Table {
    pub fn new(
        namespace: Namespace,
        location: impl Into<String>,
        storage: Arc<dyn Storage>,
        committer: Arc<Committer>,
        config: DatabaseConfig,
    ) -> Self {
        Table {
            namespace,
            location: location.into(),
            storage,
            committer,
            config,
        }
    }

    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    /// Current metadata, read fresh from storage.
    pub async fn metadata(&self) -> Result<TableMetadata> {
        self.committer
            .read_metadata(self.namespace.as_str(), &self.location)
            .await
    }

    /// The manifest of live data files, exposing per-file row-group
    /// statistics for the query planner's pushdown (spec §4.8).
    pub async fn manifest(&self) -> Result<TableManifest> {
        self.committer
            .read_manifest(self.namespace.as_str(), &self.location)
            .await
    }

    /// Decode every entity stored at `path`.
    pub async fn read_file(&self, path: &str) -> Result<Vec<Entity>> {
        let bytes = self.storage.read(path).await?;
        parquet_io::read_entities(&bytes)
    }

    /// Every live entity in the table, decoded from every live data file.
    pub async fn read_all(&self) -> Result<Vec<Entity>> {
        let manifest = self.manifest().await?;
        let mut entities = Vec::new();
        for file in manifest.live_files() {
            entities.extend(self.read_file(&file.path).await?);
        }
        Ok(entities)
    }

    /// Checksum one row-group worth of entities, used for the index
    /// substrate's change-detection diff (spec §4.5).
    fn row_group_checksums(entities: &[Entity], row_group_size: usize) -> Result<Vec<u32>> {
        let size = row_group_size.max(1);
        let mut checksums = Vec::new();
        for chunk in entities.chunks(size) {
            let bytes = serde_json::to_vec(chunk).map_err(|e| crate::error::ParqueError::Other(e.into()))?;
            checksums.push(fnv1a_32(&bytes));
        }
        Ok(checksums)
    }

    /// Write `entities` to a new data file and commit a snapshot that adds
    /// it to the manifest alongside every previously live file.
    pub async fn append_entities(&self, entities: Vec<Entity>) -> Result<TableMetadata> {
        if self.config.read_only {
            return Err(crate::error::ParqueError::ReadOnly);
        }
        if entities.is_empty() {
            return self.metadata().await;
        }

        let row_group_size = parquet_io::DEFAULT_ROW_GROUP_SIZE;
        let (bytes, row_group_stats) =
            parquet_io::write_entities(&entities, &self.config.shred_fields, row_group_size)?;
        let checksums = Self::row_group_checksums(&entities, row_group_size)?;

        let data_path = version_hint::data_file_path(&self.location, Uuid::new_v4());
        self.storage
            .write(&data_path, Bytes::from(bytes.clone()), Default::default())
            .await?;

        let new_entry = DataFileEntry {
            path: data_path,
            size_bytes: bytes.len() as u64,
            record_count: entities.len() as u64,
            status: FileStatus::Added,
            row_groups: row_group_stats.into_iter().flatten().collect(),
            row_group_checksums: checksums,
        };

        let namespace = self.namespace.as_str().to_string();
        self.committer
            .commit(
                &namespace,
                &self.location,
                None,
                move |_metadata, manifest| {
                    let mut files: Vec<DataFileEntry> = manifest
                        .live_files()
                        .map(|f| DataFileEntry {
                            status: FileStatus::Existing,
                            ..f.clone()
                        })
                        .collect();
                    files.push(new_entry.clone());
                    Ok(TableManifest { files })
                },
            )
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory_store;

    fn sample_entity(id: &str) -> Entity {
        Entity {
            id: id.to_string(),
            type_: "user".to_string(),
            name: None,
            created_at: chrono::Utc::now(),
            created_by: None,
            updated_at: chrono::Utc::now(),
            updated_by: None,
            deleted_at: None,
            deleted_by: None,
            version: 1,
            fields: Default::default(),
        }
    }

    #[tokio::test]
    async fn append_then_read_round_trips() {
        let storage = memory_store();
        let namespace = Namespace::try_new("users").unwrap();
        let committer = Arc::new(Committer::new(storage.clone(), DatabaseConfig::default()));
        let table = Table::new(
            namespace,
            "wh/db/users",
            storage,
            committer,
            DatabaseConfig::default(),
        );

        table
            .append_entities(vec![sample_entity("users/1"), sample_entity("users/2")])
            .await
            .unwrap();

        let entities = table.read_all().await.unwrap();
        assert_eq!(entities.len(), 2);
    }

    #[tokio::test]
    async fn two_appends_accumulate_live_files() {
        let storage = memory_store();
        let namespace = Namespace::try_new("users").unwrap();
        let committer = Arc::new(Committer::new(storage.clone(), DatabaseConfig::default()));
        let table = Table::new(
            namespace,
            "wh/db/users",
            storage,
            committer,
            DatabaseConfig::default(),
        );

        table.append_entities(vec![sample_entity("users/1")]).await.unwrap();
        table.append_entities(vec![sample_entity("users/2")]).await.unwrap();

        let entities = table.read_all().await.unwrap();
        assert_eq!(entities.len(), 2);
    }

    #[tokio::test]
    async fn read_only_rejects_appends() {
        let storage = memory_store();
        let namespace = Namespace::try_new("users").unwrap();
        let committer = Arc::new(Committer::new(storage.clone(), DatabaseConfig::default()));
        let mut config = DatabaseConfig::default();
        config.read_only = true;
        let table = Table::new(namespace, "wh/db/users", storage, committer, config);

        let result = table.append_entities(vec![sample_entity("users/1")]).await;
        assert!(matches!(result, Err(crate::error::ParqueError::ReadOnly)));
    }
}
