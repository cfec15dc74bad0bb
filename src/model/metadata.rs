/*!
Iceberg-shaped table metadata (spec §3, §6). Grounded directly on the
teacher's `model::metadata::MetadataV2` / `model::snapshot::SnapshotV2`: the
same `kebab-case` wire shape, minus the v1-compat machinery this engine does
not need (ParqueDB tables are always written at the current format version).
*/

use std::collections::HashMap;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::schema::Schema;

/// A single immutable commit of a table's data files, with a parent pointer
/// forming the snapshot chain (spec §3 invariant: acyclic, single parent).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub struct Snapshot {
    /// Strictly increasing identifier; larger than every prior snapshot.
    pub snapshot_id: i64,
    /// The snapshot this one was built on top of; `None` for the first snapshot.
    pub parent_snapshot_id: Option<i64>,
    /// Creation time in epoch milliseconds.
    pub timestamp_ms: i64,
    /// Path to the manifest list enumerating this snapshot's data files.
    pub manifest_list: String,
    /// Schema id active when the snapshot was written.
    pub schema_id: i32,
}

/// Per-namespace table metadata, the payload behind `version-hint.text`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub struct TableMetadata {
    /// Format version; always 2 for tables written by this engine.
    pub format_version: u8,
    /// A UUID identifying the table, stable across metadata rewrites.
    pub table_uuid: Uuid,
    /// Base location of the table, e.g. `<warehouse>/<db>/<namespace>`.
    pub location: String,
    /// All schema versions ever committed, in ascending order.
    pub schemas: Vec<Schema>,
    /// Partition specs; ParqueDB tables are unpartitioned, so this is always
    /// a single empty spec, kept for forward compatibility with the Iceberg
    /// metadata shape.
    pub partition_specs: Vec<PartitionSpec>,
    /// All valid snapshots, oldest first.
    pub snapshots: Vec<Snapshot>,
    /// The snapshot readers should use; `None` for an empty table.
    pub current_snapshot_id: Option<i64>,
    /// Arbitrary table properties (compaction thresholds, retention, etc).
    pub properties: HashMap<String, String>,
}

/// A (degenerate, unpartitioned) partition spec, kept only so the metadata
/// JSON matches the Iceberg shape external tooling expects.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub struct PartitionSpec {
    /// Spec identifier.
    pub spec_id: i32,
    /// Partition fields; always empty for ParqueDB tables.
    pub fields: Vec<String>,
}

impl TableMetadata {
    /// Build the initial, snapshot-less metadata for a brand new namespace.
    pub fn new(location: impl Into<String>, schema: Schema) -> Self {
        TableMetadata {
            format_version: 2,
            table_uuid: Uuid::new_v4(),
            location: location.into(),
            schemas: vec![schema],
            partition_specs: vec![PartitionSpec {
                spec_id: 0,
                fields: vec![],
            }],
            snapshots: vec![],
            current_snapshot_id: None,
            properties: HashMap::new(),
        }
    }

    /// The schema most recently appended (the table's active schema).
    pub fn current_schema(&self) -> &Schema {
        self.schemas.last().expect("table must have a schema")
    }

    /// The currently referenced snapshot, if any.
    pub fn current_snapshot(&self) -> Option<&Snapshot> {
        self.current_snapshot_id
            .and_then(|id| self.snapshots.iter().find(|s| s.snapshot_id == id))
    }

    /// Next snapshot id, strictly larger than every prior one
    /// (spec §4.2 invariant: snapshot IDs strictly increase).
    pub fn next_snapshot_id(&self) -> i64 {
        self.snapshots.iter().map(|s| s.snapshot_id).max().unwrap_or(0) + 1
    }

    /// Build and append a new snapshot on top of the current one, returning
    /// the updated metadata. Does not touch storage.
    pub fn with_new_snapshot(&self, manifest_list_path: String) -> TableMetadata {
        let mut next = self.clone();
        let snapshot = Snapshot {
            snapshot_id: self.next_snapshot_id(),
            parent_snapshot_id: self.current_snapshot_id,
            timestamp_ms: Utc::now().timestamp_millis(),
            manifest_list: manifest_list_path,
            schema_id: (next.schemas.len() as i32) - 1,
        };
        next.current_snapshot_id = Some(snapshot.snapshot_id);
        next.snapshots.push(snapshot);
        next
    }

    /// Validate the snapshot chain invariant: every non-initial snapshot has
    /// exactly one parent, which exists, and whose id is strictly smaller.
    pub fn validate_snapshot_chain(&self) -> bool {
        self.snapshots.iter().all(|s| match s.parent_snapshot_id {
            None => true,
            Some(parent_id) => self
                .snapshots
                .iter()
                .any(|p| p.snapshot_id == parent_id && p.snapshot_id < s.snapshot_id),
        })
    }
}
