/*!
Branch refs (spec §4.11): each branch is a file under `_meta/refs/<name>`
containing a commit hash; `HEAD` is a pointer file naming the current
branch.
*/

use std::sync::Arc;

use bytes::Bytes;

use crate::error::{ParqueError, Result};
use crate::storage::Storage;

pub const DEFAULT_BRANCH: &str = "main";

/// Manages branch ref files and the `HEAD` pointer under `<root>/_meta`.
pub struct RefManager {
    storage: Arc<dyn Storage>,
    root: String,
}

impl RefManager {
    pub fn new(storage: Arc<dyn Storage>, root: impl Into<String>) -> Self {
        RefManager { storage, root: root.into() }
    }

    fn ref_path(&self, name: &str) -> String {
        format!("{}/_meta/refs/{}", self.root.trim_end_matches('/'), name)
    }

    fn head_path(&self) -> String {
        format!("{}/_meta/HEAD", self.root.trim_end_matches('/'))
    }

    /// The commit hash `name` currently points to.
    pub async fn resolve(&self, name: &str) -> Result<String> {
        let bytes = self.storage.read(&self.ref_path(name)).await.map_err(|e| match e {
            ParqueError::NotFound(_) => ParqueError::NotFound(format!("branch not found: {name}")),
            other => other,
        })?;
        Ok(String::from_utf8_lossy(&bytes).trim().to_string())
    }

    pub async fn branch_exists(&self, name: &str) -> Result<bool> {
        self.storage.exists(&self.ref_path(name)).await
    }

    /// Point `name` at `commit_hash`, creating the ref if absent.
    pub async fn set_ref(&self, name: &str, commit_hash: &str) -> Result<()> {
        self.storage
            .write(&self.ref_path(name), Bytes::from(commit_hash.to_string()), Default::default())
            .await?;
        Ok(())
    }

    /// The branch `HEAD` currently names, defaulting to [DEFAULT_BRANCH]
    /// when no `HEAD` file exists yet.
    pub async fn current_branch(&self) -> Result<String> {
        match self.storage.read(&self.head_path()).await {
            Ok(bytes) => Ok(String::from_utf8_lossy(&bytes).trim().to_string()),
            Err(ParqueError::NotFound(_)) => Ok(DEFAULT_BRANCH.to_string()),
            Err(other) => Err(other),
        }
    }

    /// Point `HEAD` at `name`.
    pub async fn set_head(&self, name: &str) -> Result<()> {
        self.storage
            .write(&self.head_path(), Bytes::from(name.to_string()), Default::default())
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory_store;

    #[tokio::test]
    async fn current_branch_defaults_to_main_when_head_is_absent() {
        let refs = RefManager::new(memory_store(), "wh/db");
        assert_eq!(refs.current_branch().await.unwrap(), "main");
    }

    #[tokio::test]
    async fn set_ref_then_resolve_round_trips() {
        let refs = RefManager::new(memory_store(), "wh/db");
        refs.set_ref("main", "abc123").await.unwrap();
        assert_eq!(refs.resolve("main").await.unwrap(), "abc123");
    }

    #[tokio::test]
    async fn resolving_unknown_branch_is_not_found() {
        let refs = RefManager::new(memory_store(), "wh/db");
        assert!(matches!(refs.resolve("missing").await, Err(ParqueError::NotFound(_))));
    }

    #[tokio::test]
    async fn set_head_updates_current_branch() {
        let refs = RefManager::new(memory_store(), "wh/db");
        refs.set_head("feature").await.unwrap();
        assert_eq!(refs.current_branch().await.unwrap(), "feature");
    }
}
