/*!
Content-addressed blob storage (spec §4.11): objects live under
`_meta/objects/<hh>/<hash>` where `hh` is the first two hex characters of
the SHA-256 of the content. Writes are idempotent since identical content
always hashes to the same path.
*/

use std::sync::Arc;

use bytes::Bytes;
use sha2::{Digest, Sha256};

use crate::error::{ParqueError, Result};
use crate::storage::Storage;

fn hex_encode(bytes: impl AsRef<[u8]>) -> String {
    bytes.as_ref().iter().map(|b| format!("{b:02x}")).collect()
}

/// SHA-256 hex digest of `bytes`.
pub fn hash_content(bytes: &[u8]) -> String {
    hex_encode(Sha256::digest(bytes))
}

/// Content-addressed object store rooted at `<root>/_meta/objects`.
pub struct ObjectStore {
    storage: Arc<dyn Storage>,
    root: String,
}

impl ObjectStore {
    pub fn new(storage: Arc<dyn Storage>, root: impl Into<String>) -> Self {
        ObjectStore { storage, root: root.into() }
    }

    fn path_for(&self, hash: &str) -> String {
        let shard = &hash[..hash.len().min(2)];
        format!("{}/_meta/objects/{}/{}", self.root.trim_end_matches('/'), shard, hash)
    }

    /// Store `bytes`, returning their content hash. A no-op if an object
    /// with that hash already exists.
    pub async fn put(&self, bytes: Bytes) -> Result<String> {
        let hash = hash_content(&bytes);
        let path = self.path_for(&hash);
        if !self.storage.exists(&path).await? {
            self.storage.write(&path, bytes, Default::default()).await?;
        }
        Ok(hash)
    }

    /// Retrieve the object stored under `hash`.
    pub async fn get(&self, hash: &str) -> Result<Bytes> {
        let path = self.path_for(hash);
        self.storage.read(&path).await.map_err(|e| match e {
            ParqueError::NotFound(_) => ParqueError::NotFound(format!("object not found: {hash}")),
            other => other,
        })
    }
}
