/*!
Commit creation and checkout (spec §4.11): wraps [crate::model::commit::Commit]
with object storage, and implements the checkout protocol that materializes
a commit's state back into the working tree.
*/

use std::collections::BTreeMap;
use std::sync::Arc;

use bytes::Bytes;

use crate::error::{ParqueError, Result};
use crate::model::commit::{Commit, DatabaseState};
use crate::storage::Storage;

use super::objects::ObjectStore;
use super::refs::RefManager;

/// Path -> object hash, the shape of the stored forward/reverse
/// relationship manifests (spec §4.11 step 4).
pub type RelationshipManifest = BTreeMap<String, String>;

/// Options for [BranchManager::checkout].
#[derive(Debug, Clone, Default)]
pub struct CheckoutOptions {
    /// Create the branch (from the current `HEAD`'s commit) if it does not
    /// already exist.
    pub create: bool,
}

/// Ties commit storage, the object store and ref management together.
pub struct BranchManager {
    storage: Arc<dyn Storage>,
    root: String,
    objects: ObjectStore,
    refs: RefManager,
}

impl BranchManager {
    pub fn new(storage: Arc<dyn Storage>, root: impl Into<String>) -> Self {
        let root = root.into();
        BranchManager {
            objects: ObjectStore::new(storage.clone(), root.clone()),
            refs: RefManager::new(storage.clone(), root.clone()),
            storage,
            root,
        }
    }

    fn commit_path(&self, hash: &str) -> String {
        format!("{}/_meta/commits/{}", self.root.trim_end_matches('/'), hash)
    }

    pub fn refs(&self) -> &RefManager {
        &self.refs
    }

    /// Create a commit from `state`, persisting it under `_meta/commits/<hash>`.
    pub async fn commit(
        &self,
        state: DatabaseState,
        parents: Vec<String>,
        message: impl Into<String>,
        author: impl Into<String>,
        timestamp: i64,
    ) -> Result<Commit> {
        let commit = Commit::new(state, parents, message, author, timestamp);
        let bytes = serde_json::to_vec(&commit).map_err(|e| ParqueError::Other(e.into()))?;
        self.storage.write(&self.commit_path(&commit.hash), Bytes::from(bytes), Default::default()).await?;
        Ok(commit)
    }

    async fn load_commit(&self, hash: &str) -> Result<Commit> {
        let bytes = self.storage.read(&self.commit_path(hash)).await.map_err(|e| match e {
            ParqueError::NotFound(_) => ParqueError::NotFound(format!("commit not found: {hash}")),
            other => other,
        })?;
        serde_json::from_slice(&bytes).map_err(|e| ParqueError::Other(e.into()))
    }

    async fn load_relationship_manifest(&self, hash: &str) -> Result<RelationshipManifest> {
        let bytes = self.objects.get(hash).await?;
        serde_json::from_slice(&bytes).map_err(|e| ParqueError::Other(e.into()))
    }

    fn data_path(&self, collection: &str) -> String {
        format!("{}/data/{}.parquet", self.root.trim_end_matches('/'), collection)
    }

    fn schema_path(&self, collection: &str) -> String {
        format!("{}/schema/{}.json", self.root.trim_end_matches('/'), collection)
    }

    /// Resolve `name` to a commit hash, load its state, write every
    /// collection's data/schema/relationship files into the working tree,
    /// delete collections not present in the target state, then point
    /// `HEAD` at `name` (spec §4.11 "Checkout").
    pub async fn checkout(&self, name: &str, options: CheckoutOptions) -> Result<DatabaseState> {
        let hash = match self.refs.resolve(name).await {
            Ok(hash) => hash,
            Err(ParqueError::NotFound(_)) if options.create => {
                let current_branch = self.refs.current_branch().await?;
                let base_hash = self.refs.resolve(&current_branch).await?;
                self.refs.set_ref(name, &base_hash).await?;
                base_hash
            }
            Err(other) => return Err(other),
        };

        let commit = self.load_commit(&hash).await?;
        let state = commit.state.clone();

        let existing_data = self.list_materialized(&self.data_dir()).await?;
        let existing_schema = self.list_materialized(&self.schema_dir()).await?;

        for (collection, summary) in &state.collections {
            let data_bytes = self.objects.get(&summary.data_hash).await?;
            self.storage.write(&self.data_path(collection), data_bytes, Default::default()).await?;
            let schema_bytes = self.objects.get(&summary.schema_hash).await?;
            self.storage.write(&self.schema_path(collection), schema_bytes, Default::default()).await?;
        }

        for manifest_hash in [&state.forward_hash, &state.reverse_hash] {
            if manifest_hash.is_empty() {
                continue;
            }
            let manifest = self.load_relationship_manifest(manifest_hash).await?;
            for (path, object_hash) in manifest {
                let bytes = self.objects.get(&object_hash).await?;
                let full_path = format!("{}/{}", self.root.trim_end_matches('/'), path);
                self.storage.write(&full_path, bytes, Default::default()).await?;
            }
        }

        let kept_collections: Vec<&str> = state.collections.keys().map(String::as_str).collect();
        for path in existing_data {
            if !kept_collections.iter().any(|c| path.ends_with(&format!("{c}.parquet"))) {
                self.storage.delete(&path).await?;
            }
        }
        for path in existing_schema {
            if !kept_collections.iter().any(|c| path.ends_with(&format!("{c}.json"))) {
                self.storage.delete(&path).await?;
            }
        }

        self.refs.set_head(name).await?;
        Ok(state)
    }

    fn data_dir(&self) -> String {
        format!("{}/data/", self.root.trim_end_matches('/'))
    }

    fn schema_dir(&self) -> String {
        format!("{}/schema/", self.root.trim_end_matches('/'))
    }

    async fn list_materialized(&self, prefix: &str) -> Result<Vec<String>> {
        self.storage.list(prefix).await
    }
}
