/*!
The storage abstraction is the trust boundary for all concurrency control in
ParqueDB (spec §4.1). Every component above this layer treats
[Storage::write_conditional] as the sole atomicity primitive; nothing reaches
past it to talk to the underlying object store directly.

The abstraction is backed by the [object_store] crate. We layer our own
ETag-conditional semantics on top of `ObjectStore::put_opts` so that a single
trait works uniformly across local filesystem, in-memory, and cloud backends.
*/

mod backends;

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use object_store::path::Path as ObjectPath;
use object_store::{Error as OsError, ObjectStore as DynObjectStore, PutMode, PutOptions};

use crate::error::{ParqueError, Result};

pub use backends::{local_fs_store, memory_store};

/// Preconditions for a conditional write (spec §4.1).
#[derive(Debug, Clone, Default)]
pub struct WriteOptions {
    /// Succeed only if the current ETag equals this value.
    pub if_match: Option<String>,
    /// Succeed only if the path does not currently exist.
    pub if_none_match: bool,
}

/// Result of a successful write: the ETag assigned to the new content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteOutcome {
    /// ETag of the written object, used as the `expectedEtag` of the next CAS.
    pub etag: String,
}

/// Uniform key-value-blob interface over an object-store-like backend.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Read the full contents at `path`, or `NotFound`.
    async fn read(&self, path: &str) -> Result<Bytes>;

    /// Read the contents at `path` along with its current ETag.
    async fn read_with_etag(&self, path: &str) -> Result<(Bytes, String)>;

    /// Write `bytes` to `path`, honoring the preconditions in `opts`.
    async fn write(&self, path: &str, bytes: Bytes, opts: WriteOptions) -> Result<WriteOutcome>;

    /// Convenience wrapper: `write_conditional(path, bytes, None)` creates the
    /// path only if absent; `Some(etag)` requires the current ETag to match.
    async fn write_conditional(
        &self,
        path: &str,
        bytes: Bytes,
        expected_etag: Option<&str>,
    ) -> Result<WriteOutcome> {
        let opts = match expected_etag {
            None => WriteOptions {
                if_match: None,
                if_none_match: true,
            },
            Some(etag) => WriteOptions {
                if_match: Some(etag.to_string()),
                if_none_match: false,
            },
        };
        self.write(path, bytes, opts).await
    }

    /// Does `path` currently exist?
    async fn exists(&self, path: &str) -> Result<bool>;

    /// List every path under `prefix`, lexicographically ordered.
    async fn list(&self, prefix: &str) -> Result<Vec<String>>;

    /// Delete `path`. Deleting a missing path is not an error.
    async fn delete(&self, path: &str) -> Result<()>;
}

/// [Storage] implementation generic over any [object_store::ObjectStore].
pub struct ObjectStoreBackend {
    inner: Arc<dyn DynObjectStore>,
}

impl ObjectStoreBackend {
    /// Wrap an existing `object_store::ObjectStore` implementation.
    pub fn new(inner: Arc<dyn DynObjectStore>) -> Self {
        ObjectStoreBackend { inner }
    }
}

fn classify_put_error(path: &str, err: OsError) -> ParqueError {
    match err {
        OsError::AlreadyExists { .. } | OsError::Precondition { .. } => {
            ParqueError::ETagMismatch {
                path: path.to_string(),
            }
        }
        OsError::NotFound { .. } => ParqueError::NotFound(path.to_string()),
        other => ParqueError::BucketOperationError {
            operation: "write",
            path: path.to_string() + ": " + &other.to_string(),
        },
    }
}

#[async_trait]
impl Storage for ObjectStoreBackend {
    async fn read(&self, path: &str) -> Result<Bytes> {
        let object_path = ObjectPath::from(path);
        match self.inner.get(&object_path).await {
            Ok(result) => Ok(result
                .bytes()
                .await
                .map_err(|e| ParqueError::BucketOperationError {
                    operation: "read",
                    path: format!("{path}: {e}"),
                })?),
            Err(OsError::NotFound { .. }) => Err(ParqueError::NotFound(path.to_string())),
            Err(e) => Err(ParqueError::BucketOperationError {
                operation: "read",
                path: format!("{path}: {e}"),
            }),
        }
    }

    async fn read_with_etag(&self, path: &str) -> Result<(Bytes, String)> {
        let object_path = ObjectPath::from(path);
        let result = self.inner.get(&object_path).await.map_err(|e| match e {
            OsError::NotFound { .. } => ParqueError::NotFound(path.to_string()),
            other => ParqueError::BucketOperationError {
                operation: "read",
                path: format!("{path}: {other}"),
            },
        })?;
        let etag = result
            .meta
            .e_tag
            .clone()
            .unwrap_or_else(|| result.meta.location.to_string());
        let bytes = result
            .bytes()
            .await
            .map_err(|e| ParqueError::BucketOperationError {
                operation: "read",
                path: format!("{path}: {e}"),
            })?;
        Ok((bytes, etag))
    }

    async fn write(&self, path: &str, bytes: Bytes, opts: WriteOptions) -> Result<WriteOutcome> {
        let object_path = ObjectPath::from(path);
        let mode = if opts.if_none_match {
            PutMode::Create
        } else if let Some(etag) = &opts.if_match {
            PutMode::Update(object_store::UpdateVersion {
                e_tag: Some(etag.clone()),
                version: None,
            })
        } else {
            PutMode::Overwrite
        };
        let put_opts = PutOptions {
            mode,
            ..Default::default()
        };
        let result = self
            .inner
            .put_opts(&object_path, bytes, put_opts)
            .await
            .map_err(|e| classify_put_error(path, e))?;
        Ok(WriteOutcome {
            etag: result.e_tag.unwrap_or_else(|| path.to_string()),
        })
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        let object_path = ObjectPath::from(path);
        match self.inner.head(&object_path).await {
            Ok(_) => Ok(true),
            Err(OsError::NotFound { .. }) => Ok(false),
            Err(e) => Err(ParqueError::BucketOperationError {
                operation: "exists",
                path: format!("{path}: {e}"),
            }),
        }
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        use futures::TryStreamExt;
        let object_prefix = if prefix.is_empty() {
            None
        } else {
            Some(ObjectPath::from(prefix))
        };
        let mut paths: Vec<String> = self
            .inner
            .list(object_prefix.as_ref())
            .map_ok(|meta| meta.location.to_string())
            .try_collect()
            .await
            .map_err(|e| ParqueError::BucketOperationError {
                operation: "list",
                path: format!("{prefix}: {e}"),
            })?;
        paths.sort();
        Ok(paths)
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let object_path = ObjectPath::from(path);
        match self.inner.delete(&object_path).await {
            Ok(()) | Err(OsError::NotFound { .. }) => Ok(()),
            Err(e) => Err(ParqueError::BucketOperationError {
                operation: "delete",
                path: format!("{path}: {e}"),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_if_absent_then_conflict() {
        let storage = memory_store();
        let first = storage
            .write_conditional("a/b.txt", Bytes::from_static(b"one"), None)
            .await
            .expect("first create should succeed");
        let second = storage
            .write_conditional("a/b.txt", Bytes::from_static(b"two"), None)
            .await;
        assert!(matches!(second, Err(ParqueError::ETagMismatch { .. })));

        let updated = storage
            .write_conditional("a/b.txt", Bytes::from_static(b"three"), Some(&first.etag))
            .await
            .expect("update with correct etag should succeed");
        assert_ne!(updated.etag, first.etag);
    }

    #[tokio::test]
    async fn read_missing_is_not_found() {
        let storage = memory_store();
        let err = storage.read("missing").await.unwrap_err();
        assert!(matches!(err, ParqueError::NotFound(_)));
    }

    #[tokio::test]
    async fn list_is_sorted() {
        let storage = memory_store();
        for name in ["c", "a", "b"] {
            storage
                .write_conditional(&format!("ns/{name}"), Bytes::from_static(b"x"), None)
                .await
                .unwrap();
        }
        let listed = storage.list("ns/").await.unwrap();
        assert_eq!(listed, vec!["ns/a", "ns/b", "ns/c"]);
    }
}
