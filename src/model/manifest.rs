/*!
The table-side manifest: the list of data files that make up a snapshot.
Grounded on the teacher's `model::manifest::DataFile`/`Status`, simplified to
what ParqueDB's single-file-format writer needs: one JSON manifest per
snapshot rather than an Avro manifest-list plus Avro manifests.
*/

use serde::{Deserialize, Serialize};

use crate::parquet_io::stats::ColumnStats;

/// Tracks additions and removals the same way Iceberg manifest entries do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileStatus {
    /// File existed before this snapshot and is carried forward.
    Existing,
    /// File was added in this snapshot.
    Added,
    /// File was logically removed in this snapshot (e.g. by compaction).
    Deleted,
}

/// One data file entry inside a [TableManifest].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataFileEntry {
    /// Path to the Parquet data file, relative to the table location.
    pub path: String,
    /// File size in bytes.
    pub size_bytes: u64,
    /// Number of entity rows in the file.
    pub record_count: u64,
    /// Status of this entry relative to the prior snapshot.
    pub status: FileStatus,
    /// Per-row-group column statistics, used by the query planner for
    /// predicate pushdown (spec §4.8).
    pub row_groups: Vec<ColumnStats>,
    /// FNV-1a checksum of each row group's bytes, used by the index
    /// substrate to detect added/modified/removed row groups (spec §4.5).
    pub row_group_checksums: Vec<u32>,
}

/// Lists the data files that make up one snapshot (spec §3 "Manifest").
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TableManifest {
    /// Every data file considered live as of the owning snapshot.
    pub files: Vec<DataFileEntry>,
}

impl TableManifest {
    /// Total row count across all live (non-deleted) files.
    pub fn total_rows(&self) -> u64 {
        self.files
            .iter()
            .filter(|f| f.status != FileStatus::Deleted)
            .map(|f| f.record_count)
            .sum()
    }

    /// Live files only, in manifest order.
    pub fn live_files(&self) -> impl Iterator<Item = &DataFileEntry> {
        self.files.iter().filter(|f| f.status != FileStatus::Deleted)
    }
}
