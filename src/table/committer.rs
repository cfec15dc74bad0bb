/*!
The table committer: OCC commit protocol over `version-hint.text` (spec
§4.2). Produces new immutable metadata files and atomically advances the
version hint with compare-and-swap on its ETag, retrying on conflict with
exponential backoff and jitter.
*/

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex as SyncMutex;
use tokio::sync::Mutex as AsyncMutex;
use tokio::time::{timeout, Duration};
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::DatabaseConfig;
use crate::error::{ParqueError, Result};
use crate::model::manifest::TableManifest;
use crate::model::metadata::TableMetadata;
use crate::model::schema::Schema;
use crate::storage::Storage;

use super::backoff::{backoff_delay_ms, AbortSignal};
use super::version_hint::{manifest_path, metadata_path, version_hint_path};

/// Current metadata plus the manifest describing its live data files, as
/// read (or freshly initialized) at the start of a commit attempt.
struct CurrentState {
    metadata: TableMetadata,
    manifest: TableManifest,
    /// `None` when the namespace has no metadata yet (first commit).
    etag: Option<String>,
}

/// Coordinates commits to table metadata across namespaces, serializing
/// commits to the same namespace in-process while letting independent
/// namespaces proceed concurrently (spec §5).
pub struct Committer {
    storage: Arc<dyn Storage>,
    config: DatabaseConfig,
    locks: SyncMutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl Committer {
    pub fn new(storage: Arc<dyn Storage>, config: DatabaseConfig) -> Self {
        Committer {
            storage,
            config,
            locks: SyncMutex::new(HashMap::new()),
        }
    }

    fn namespace_lock(&self, namespace: &str) -> Arc<AsyncMutex<()>> {
        let mut locks = self.locks.lock();
        locks
            .entry(namespace.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    /// Drop a namespace's lock entry, e.g. after a timed-out acquisition so a
    /// stuck lock cannot permanently block the namespace (spec §4.2 step 6).
    fn clear_lock(&self, namespace: &str) {
        self.locks.lock().remove(namespace);
    }

    async fn read_current(&self, namespace: &str, location: &str) -> Result<CurrentState> {
        let hint_path = version_hint_path(location);
        match self.storage.read_with_etag(&hint_path).await {
            Ok((bytes, etag)) => {
                let metadata_file = String::from_utf8(bytes.to_vec())
                    .map_err(|e| ParqueError::CorruptedManifest {
                        which: "local",
                        message: format!("version-hint.text was not valid utf-8: {e}"),
                    })?;
                let metadata_bytes = self.storage.read(&metadata_file).await?;
                let metadata: TableMetadata = serde_json::from_slice(&metadata_bytes)
                    .map_err(|e| ParqueError::CorruptedManifest {
                        which: "local",
                        message: format!("failed to parse {metadata_file}: {e}"),
                    })?;
                let manifest = match metadata.current_snapshot() {
                    Some(snapshot) => {
                        let bytes = self.storage.read(&snapshot.manifest_list).await?;
                        serde_json::from_slice(&bytes).map_err(|e| ParqueError::CorruptedManifest {
                            which: "local",
                            message: format!("failed to parse manifest: {e}"),
                        })?
                    }
                    None => TableManifest::default(),
                };
                Ok(CurrentState {
                    metadata,
                    manifest,
                    etag: Some(etag),
                })
            }
            Err(ParqueError::NotFound(_)) => Ok(CurrentState {
                metadata: TableMetadata::new(location, Schema::new(namespace)),
                manifest: TableManifest::default(),
                etag: None,
            }),
            Err(other) => Err(other),
        }
    }

    /// Run the OCC commit protocol. `build` receives the currently-live
    /// metadata and manifest and returns the manifest to publish in the new
    /// snapshot; it may be invoked more than once if the commit races another
    /// writer and must rebuild against a newer parent.
    pub async fn commit<F>(
        &self,
        namespace: &str,
        location: &str,
        abort: Option<&AbortSignal>,
        mut build: F,
    ) -> Result<TableMetadata>
    where
        F: FnMut(&TableMetadata, &TableManifest) -> Result<TableManifest>,
    {
        if abort.is_some_and(|a| a.is_aborted()) {
            return Err(ParqueError::Aborted);
        }

        let lock = self.namespace_lock(namespace);
        let _guard = match timeout(
            Duration::from_millis(self.config.write_lock_timeout_ms),
            lock.lock(),
        )
        .await
        {
            Ok(guard) => guard,
            Err(_) => {
                self.clear_lock(namespace);
                return Err(ParqueError::WriteLockTimeout {
                    ns: namespace.to_string(),
                    timeout_ms: self.config.write_lock_timeout_ms,
                });
            }
        };

        let mut attempt = 0u32;
        loop {
            if abort.is_some_and(|a| a.is_aborted()) {
                return Err(ParqueError::Aborted);
            }

            let current = self.read_current(namespace, location).await?;
            let new_manifest = build(&current.metadata, &current.manifest)?;

            let n = current.metadata.snapshots.len() as u64 + 1;
            let manifest_file = manifest_path(location, current.metadata.next_snapshot_id());
            let manifest_bytes =
                serde_json::to_vec(&new_manifest).map_err(|e| ParqueError::Other(e.into()))?;
            self.storage
                .write_conditional(&manifest_file, Bytes::from(manifest_bytes), None)
                .await?;

            let new_metadata = current.metadata.with_new_snapshot(manifest_file);
            let metadata_file = metadata_path(location, n, Uuid::new_v4());
            let metadata_bytes =
                serde_json::to_vec(&new_metadata).map_err(|e| ParqueError::Other(e.into()))?;
            self.storage
                .write_conditional(&metadata_file, Bytes::from(metadata_bytes), None)
                .await?;

            let hint_path = version_hint_path(location);
            match self
                .storage
                .write_conditional(
                    &hint_path,
                    Bytes::from(metadata_file.clone().into_bytes()),
                    current.etag.as_deref(),
                )
                .await
            {
                Ok(_) => {
                    info!(namespace, snapshot_id = new_metadata.current_snapshot_id, "committed");
                    return Ok(new_metadata);
                }
                Err(ParqueError::ETagMismatch { .. }) => {
                    attempt += 1;
                    if attempt > self.config.max_retries {
                        return Err(ParqueError::CommitConflict {
                            ns: namespace.to_string(),
                            attempts: attempt,
                        });
                    }
                    let delay = backoff_delay_ms(
                        attempt - 1,
                        self.config.base_backoff_ms,
                        self.config.max_backoff_ms,
                    );
                    warn!(namespace, attempt, delay, "commit lost CAS race, retrying");
                    tokio::time::sleep(Duration::from_millis(delay)).await;
                }
                Err(other) => return Err(other),
            }
        }
    }

    /// Read the current metadata without starting a commit.
    pub async fn read_metadata(&self, namespace: &str, location: &str) -> Result<TableMetadata> {
        Ok(self.read_current(namespace, location).await?.metadata)
    }

    /// Read the current manifest without starting a commit.
    pub async fn read_manifest(&self, namespace: &str, location: &str) -> Result<TableManifest> {
        Ok(self.read_current(namespace, location).await?.manifest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory_store;

    #[tokio::test]
    async fn first_commit_creates_metadata_with_one_snapshot() {
        let committer = Committer::new(memory_store(), DatabaseConfig::default());
        let metadata = committer
            .commit("users", "wh/db/users", None, |_meta, manifest| {
                Ok(manifest.clone())
            })
            .await
            .unwrap();
        assert_eq!(metadata.snapshots.len(), 1);
        assert_eq!(metadata.current_snapshot_id, Some(1));
    }

    #[tokio::test]
    async fn sequential_commits_advance_snapshot_chain() {
        let committer = Committer::new(memory_store(), DatabaseConfig::default());
        for _ in 0..3 {
            committer
                .commit("users", "wh/db/users", None, |_meta, manifest| Ok(manifest.clone()))
                .await
                .unwrap();
        }
        let metadata = committer.read_metadata("users", "wh/db/users").await.unwrap();
        assert!(metadata.validate_snapshot_chain());
        assert_eq!(metadata.snapshots.len(), 3);
    }

    #[tokio::test]
    async fn aborted_signal_short_circuits_before_any_io() {
        let committer = Committer::new(memory_store(), DatabaseConfig::default());
        let abort = AbortSignal::new();
        abort.abort();
        let result = committer
            .commit("users", "wh/db/users", Some(&abort), |_meta, manifest| {
                Ok(manifest.clone())
            })
            .await;
        assert!(matches!(result, Err(ParqueError::Aborted)));
    }
}
