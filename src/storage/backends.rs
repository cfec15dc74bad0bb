/*!
Concrete [super::Storage] constructors. The teacher crate re-exports
`object_store` directly for callers to build their own client; ParqueDB keeps
that spirit but wraps the result in [super::ObjectStoreBackend] so the rest
of the engine only ever sees the [super::Storage] trait.
*/

use std::path::Path as FsPath;
use std::sync::Arc;

use object_store::local::LocalFileSystem;
use object_store::memory::InMemory;

use super::{ObjectStoreBackend, Storage};

/// An in-memory backend, useful for tests and ephemeral databases.
pub fn memory_store() -> Arc<dyn Storage> {
    Arc::new(ObjectStoreBackend::new(Arc::new(InMemory::new())))
}

/// A local-filesystem backend rooted at `root`.
pub fn local_fs_store(root: impl AsRef<FsPath>) -> Result<Arc<dyn Storage>, anyhow::Error> {
    let fs = LocalFileSystem::new_with_prefix(root)?;
    Ok(Arc::new(ObjectStoreBackend::new(Arc::new(fs))))
}
