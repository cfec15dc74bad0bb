/*!
The sync manifest (spec §4.10): a listing of a database's tracked files and
their canonical content hashes, compared between a local and remote copy to
drive push/pull.
*/

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{ParqueError, Result};
use crate::storage::Storage;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Private,
    Public,
}

/// One tracked file's path (relative to the sync root) and content hash.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncFileEntry {
    pub path: String,
    pub hash: String,
    pub size_bytes: u64,
}

/// Manifest describing the state of a synced database (spec §4.10).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncManifest {
    pub version: u32,
    #[serde(rename = "databaseId")]
    pub database_id: String,
    pub name: String,
    pub visibility: Visibility,
    #[serde(rename = "lastSyncedAt")]
    pub last_synced_at: Option<i64>,
    pub files: Vec<SyncFileEntry>,
}

impl SyncManifest {
    pub fn new(database_id: impl Into<String>, name: impl Into<String>, visibility: Visibility) -> Self {
        SyncManifest {
            version: 1,
            database_id: database_id.into(),
            name: name.into(),
            visibility,
            last_synced_at: None,
            files: Vec::new(),
        }
    }

    pub fn file(&self, path: &str) -> Option<&SyncFileEntry> {
        self.files.iter().find(|f| f.path == path)
    }
}

/// SHA-256 hex digest of `bytes`, used as each file's canonical hash.
pub fn content_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex_encode(hasher.finalize())
}

/// Minimal hex encoder, avoiding a dependency purely for digest formatting
/// (mirrors the one in [crate::model::commit]).
fn hex_encode(bytes: impl AsRef<[u8]>) -> String {
    bytes.as_ref().iter().map(|b| format!("{b:02x}")).collect()
}

/// Build a manifest by listing every object under `root` and hashing its
/// content. Paths in the resulting manifest are relative to `root`.
pub async fn build_manifest(
    storage: &dyn Storage,
    root: &str,
    database_id: &str,
    name: &str,
    visibility: Visibility,
) -> Result<SyncManifest> {
    let prefix = format!("{}/", root.trim_end_matches('/'));
    let mut manifest = SyncManifest::new(database_id, name, visibility);
    for path in storage.list(&prefix).await? {
        // `_meta/` holds sync/branch bookkeeping (the manifest itself,
        // commit objects, refs), not tracked database content.
        if path.contains("/_meta/") {
            continue;
        }
        let bytes = storage.read(&path).await?;
        let relative = path.strip_prefix(&prefix).unwrap_or(&path).to_string();
        manifest.files.push(SyncFileEntry {
            path: relative,
            hash: content_hash(&bytes),
            size_bytes: bytes.len() as u64,
        });
    }
    manifest.files.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(manifest)
}

/// Parse a manifest, surfacing any failure as `CorruptedManifest` with a
/// descriptive `which` tag (spec §4.10 "Manifest corruption").
pub fn parse_manifest(bytes: &[u8], which: &'static str) -> Result<SyncManifest> {
    serde_json::from_slice(bytes).map_err(|e| ParqueError::CorruptedManifest {
        which,
        message: format!("{which} manifest: {e}"),
    })
}

/// Classification of one path in the union of a local/remote manifest pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffKind {
    OnlyLocal,
    OnlyRemote,
    HashMatch,
    HashMismatch,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FileDiff {
    pub path: String,
    pub kind: DiffKind,
}

/// Diff two manifests over the union of their file paths (spec §4.10
/// "Manifest diff").
pub fn diff_manifests(local: &SyncManifest, remote: &SyncManifest) -> Vec<FileDiff> {
    let mut paths: Vec<&str> = local
        .files
        .iter()
        .chain(remote.files.iter())
        .map(|f| f.path.as_str())
        .collect();
    paths.sort_unstable();
    paths.dedup();

    paths
        .into_iter()
        .map(|path| {
            let kind = match (local.file(path), remote.file(path)) {
                (Some(_), None) => DiffKind::OnlyLocal,
                (None, Some(_)) => DiffKind::OnlyRemote,
                (Some(l), Some(r)) if l.hash == r.hash => DiffKind::HashMatch,
                (Some(_), Some(_)) => DiffKind::HashMismatch,
                (None, None) => unreachable!("path came from one of the two manifests"),
            };
            FileDiff { path: path.to_string(), kind }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manifest(files: &[(&str, &str)]) -> SyncManifest {
        let mut m = SyncManifest::new("db1", "demo", Visibility::Private);
        m.files = files
            .iter()
            .map(|(p, h)| SyncFileEntry { path: p.to_string(), hash: h.to_string(), size_bytes: 1 })
            .collect();
        m
    }

    #[test]
    fn diff_classifies_all_four_kinds() {
        let local = manifest(&[("a", "h1"), ("b", "h2"), ("c", "h3")]);
        let remote = manifest(&[("b", "h2"), ("c", "different"), ("d", "h4")]);
        let diffs = diff_manifests(&local, &remote);

        let kind_of = |path: &str| diffs.iter().find(|d| d.path == path).map(|d| d.kind);
        assert_eq!(kind_of("a"), Some(DiffKind::OnlyLocal));
        assert_eq!(kind_of("d"), Some(DiffKind::OnlyRemote));
        assert_eq!(kind_of("b"), Some(DiffKind::HashMatch));
        assert_eq!(kind_of("c"), Some(DiffKind::HashMismatch));
    }

    #[test]
    fn corrupted_manifest_surfaces_descriptive_error() {
        let result = parse_manifest(b"not json", "remote");
        assert!(matches!(result, Err(ParqueError::CorruptedManifest { which: "remote", .. })));
    }
}
