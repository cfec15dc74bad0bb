/*!
The sync engine (spec §4.10): manifest diffing plus a push/pull engine for
replicating a database between a local and remote [crate::storage::Storage].
*/

pub mod engine;
pub mod manifest;

pub use engine::{PullResult, PushResult, SyncEngine, SyncFileError, SyncResult};
pub use manifest::{build_manifest, content_hash, diff_manifests, DiffKind, FileDiff, SyncManifest, Visibility};
