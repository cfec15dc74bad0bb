/*!
Push/pull sync engine (spec §4.10): uploads changed and new local files to
a remote store, downloads remote-only and mismatching files, and keeps
per-file failures from blocking the rest of the batch.
*/

use std::sync::Arc;

use bytes::Bytes;
use chrono::Utc;
use tracing::{info, warn};

use crate::error::Result;
use crate::storage::Storage;

use super::manifest::{build_manifest, diff_manifests, parse_manifest, DiffKind, SyncManifest, Visibility};

/// One file-level failure during push or pull; the rest of the batch still
/// proceeds (spec §4.10 "errors are collected per file").
#[derive(Debug, Clone, PartialEq)]
pub struct SyncFileError {
    pub path: String,
    pub operation: &'static str,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PushResult {
    pub uploaded: Vec<String>,
    pub errors: Vec<SyncFileError>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PullResult {
    pub downloaded: Vec<String>,
    pub errors: Vec<SyncFileError>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncResult {
    pub push: PushResult,
    pub pull: PullResult,
}

/// Drives push/pull/sync between a local and a remote [Storage], rooted at
/// the same relative path in both (e.g. a database's warehouse location).
pub struct SyncEngine {
    local: Arc<dyn Storage>,
    remote: Arc<dyn Storage>,
    root: String,
    database_id: String,
    name: String,
    visibility: Visibility,
}

impl SyncEngine {
    pub fn new(
        local: Arc<dyn Storage>,
        remote: Arc<dyn Storage>,
        root: impl Into<String>,
        database_id: impl Into<String>,
        name: impl Into<String>,
        visibility: Visibility,
    ) -> Self {
        SyncEngine {
            local,
            remote,
            root: root.into(),
            database_id: database_id.into(),
            name: name.into(),
            visibility,
        }
    }

    fn manifest_path(&self) -> String {
        format!("{}/_meta/sync-manifest.json", self.root.trim_end_matches('/'))
    }

    fn file_path(&self, relative: &str) -> String {
        format!("{}/{}", self.root.trim_end_matches('/'), relative)
    }

    async fn read_manifest(&self, storage: &Arc<dyn Storage>, which: &'static str) -> Result<SyncManifest> {
        match storage.read(&self.manifest_path()).await {
            Ok(bytes) => parse_manifest(&bytes, which),
            Err(crate::error::ParqueError::NotFound(_)) => {
                Ok(SyncManifest::new(&self.database_id, &self.name, self.visibility))
            }
            Err(other) => Err(other),
        }
    }

    async fn write_manifest(&self, storage: &Arc<dyn Storage>, manifest: &SyncManifest) -> Result<()> {
        let bytes = serde_json::to_vec(manifest).map_err(|e| crate::error::ParqueError::Other(e.into()))?;
        storage
            .write(&self.manifest_path(), Bytes::from(bytes), Default::default())
            .await?;
        Ok(())
    }

    /// Upload every new or changed local file to the remote.
    pub async fn push(&self) -> Result<PushResult> {
        let local_manifest = build_manifest(self.local.as_ref(), &self.root, &self.database_id, &self.name, self.visibility).await?;
        let remote_manifest = self.read_manifest(&self.remote, "remote").await?;

        let mut result = PushResult::default();
        for diff in diff_manifests(&local_manifest, &remote_manifest) {
            if !matches!(diff.kind, DiffKind::OnlyLocal | DiffKind::HashMismatch) {
                continue;
            }
            match self.local.read(&self.file_path(&diff.path)).await {
                Ok(bytes) => match self.remote.write(&self.file_path(&diff.path), bytes, Default::default()).await {
                    Ok(_) => {
                        info!(path = %diff.path, "pushed file to remote");
                        result.uploaded.push(diff.path);
                    }
                    Err(e) => {
                        warn!(path = %diff.path, error = %e, "push upload failed");
                        result.errors.push(SyncFileError { path: diff.path, operation: "upload", message: e.to_string() });
                    }
                },
                Err(e) => {
                    result.errors.push(SyncFileError { path: diff.path, operation: "upload", message: e.to_string() });
                }
            }
        }

        if !result.uploaded.is_empty() {
            let mut updated = local_manifest;
            updated.last_synced_at = Some(Utc::now().timestamp_millis());
            self.write_manifest(&self.remote, &updated).await?;
        }

        Ok(result)
    }

    /// Download every remote-only or mismatching file to local.
    pub async fn pull(&self) -> Result<PullResult> {
        let local_manifest = build_manifest(self.local.as_ref(), &self.root, &self.database_id, &self.name, self.visibility).await?;
        let remote_manifest = self.read_manifest(&self.remote, "remote").await?;

        let mut result = PullResult::default();
        for diff in diff_manifests(&local_manifest, &remote_manifest) {
            if !matches!(diff.kind, DiffKind::OnlyRemote | DiffKind::HashMismatch) {
                continue;
            }
            match self.remote.read(&self.file_path(&diff.path)).await {
                Ok(bytes) => match self.local.write(&self.file_path(&diff.path), bytes, Default::default()).await {
                    Ok(_) => {
                        info!(path = %diff.path, "pulled file from remote");
                        result.downloaded.push(diff.path);
                    }
                    Err(e) => {
                        warn!(path = %diff.path, error = %e, "pull write failed");
                        result.errors.push(SyncFileError { path: diff.path, operation: "download", message: e.to_string() });
                    }
                },
                Err(e) => {
                    result.errors.push(SyncFileError { path: diff.path, operation: "download", message: e.to_string() });
                }
            }
        }

        if !result.downloaded.is_empty() {
            let mut updated = build_manifest(self.local.as_ref(), &self.root, &self.database_id, &self.name, self.visibility).await?;
            updated.last_synced_at = Some(Utc::now().timestamp_millis());
            self.write_manifest(&self.local, &updated).await?;
        }

        Ok(result)
    }

    /// Push, then pull. Upload and download failures are independent.
    pub async fn sync(&self) -> Result<SyncResult> {
        let push = self.push().await?;
        let pull = self.pull().await?;
        Ok(SyncResult { push, pull })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory_store;

    async fn write(storage: &Arc<dyn Storage>, path: &str, content: &str) {
        storage.write(path, Bytes::from(content.to_string()), Default::default()).await.unwrap();
    }

    #[tokio::test]
    async fn push_uploads_new_local_files_and_writes_remote_manifest() {
        let local = memory_store();
        let remote = memory_store();
        write(&local, "wh/db/data/a.parquet", "hello").await;

        let engine = SyncEngine::new(local, remote.clone(), "wh/db", "db1", "demo", Visibility::Private);
        let result = engine.push().await.unwrap();
        assert_eq!(result.uploaded, vec!["data/a.parquet".to_string()]);
        assert!(remote.read("wh/db/data/a.parquet").await.is_ok());
    }

    #[tokio::test]
    async fn pull_downloads_remote_only_files() {
        let local = memory_store();
        let remote = memory_store();
        write(&remote, "wh/db/data/b.parquet", "world").await;

        let engine = SyncEngine::new(local.clone(), remote, "wh/db", "db1", "demo", Visibility::Private);
        let result = engine.pull().await.unwrap();
        assert_eq!(result.downloaded, vec!["data/b.parquet".to_string()]);
        assert!(local.read("wh/db/data/b.parquet").await.is_ok());
    }

    #[tokio::test]
    async fn sync_pushes_then_pulls_independently() {
        let local = memory_store();
        let remote = memory_store();
        write(&local, "wh/db/data/a.parquet", "local-only").await;
        write(&remote, "wh/db/data/b.parquet", "remote-only").await;

        let engine = SyncEngine::new(local.clone(), remote.clone(), "wh/db", "db1", "demo", Visibility::Private);
        let result = engine.sync().await.unwrap();
        assert_eq!(result.push.uploaded.len(), 1);
        assert_eq!(result.pull.downloaded.len(), 1);
        assert!(remote.read("wh/db/data/a.parquet").await.is_ok());
        assert!(local.read("wh/db/data/b.parquet").await.is_ok());
    }
}
