/*!
Content-addressed commits tying a [DatabaseState] to its parents (spec §3,
§4.11). Unlike the table-level [super::metadata::Snapshot] chain (one table,
linear history), a [Commit] spans every collection in the database and may
have more than one parent once merges are supported.
*/

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Summary of one collection's on-disk state at commit time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CollectionState {
    /// Content hash of the collection's data file(s).
    pub data_hash: String,
    /// Content hash of the collection's schema.
    pub schema_hash: String,
    /// Row count at commit time.
    pub row_count: u64,
}

/// Position in the event log a commit was taken at, so checkout can resume
/// replay from the right offset.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct EventLogPosition {
    /// Segment sequence number.
    pub segment_id: u32,
    /// Offset within the segment.
    pub offset: u64,
}

/// The full state captured by a commit: every collection plus the
/// relationship manifests and the event-log position.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DatabaseState {
    /// Collection name -> summary state, ordered for canonicalization.
    pub collections: BTreeMap<String, CollectionState>,
    /// Hash of the forward relationship manifest.
    pub forward_hash: String,
    /// Hash of the reverse relationship manifest.
    pub reverse_hash: String,
    /// Event-log position this state corresponds to.
    pub event_log_position: EventLogPosition,
}

/// A content-addressed commit record (spec §3, §4.11).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Commit {
    /// SHA-256 of the canonicalized `{state, parents, message, author, timestamp}`.
    pub hash: String,
    /// Parent commit hashes; empty for the initial commit.
    pub parents: Vec<String>,
    /// Human-readable commit message.
    pub message: String,
    /// Actor that made the commit.
    pub author: String,
    /// Commit time in epoch milliseconds.
    pub timestamp: i64,
    /// The state this commit captures.
    pub state: DatabaseState,
}

/// Fields hashed to produce a [Commit::hash], kept separate so the exact set
/// of hashed fields is explicit and stable (spec §9 open question: the
/// canonical serializer for object hashing is fixed here as
/// `serde_json::to_vec` over this struct, whose field order is the
/// declaration order below — `serde_json` preserves struct field order).
#[derive(Serialize)]
struct HashedCommitContent<'a> {
    state: &'a DatabaseState,
    parents: &'a [String],
    message: &'a str,
    author: &'a str,
    timestamp: i64,
}

impl Commit {
    /// Construct a commit, computing its content hash.
    pub fn new(
        state: DatabaseState,
        parents: Vec<String>,
        message: impl Into<String>,
        author: impl Into<String>,
        timestamp: i64,
    ) -> Self {
        let message = message.into();
        let author = author.into();
        let hash = Commit::compute_hash(&state, &parents, &message, &author, timestamp);
        Commit {
            hash,
            parents,
            message,
            author,
            timestamp,
            state,
        }
    }

    /// Compute the SHA-256 hash of the canonicalized commit content.
    pub fn compute_hash(
        state: &DatabaseState,
        parents: &[String],
        message: &str,
        author: &str,
        timestamp: i64,
    ) -> String {
        let content = HashedCommitContent {
            state,
            parents,
            message,
            author,
            timestamp,
        };
        let bytes = serde_json::to_vec(&content).expect("commit content always serializes");
        let digest = Sha256::digest(&bytes);
        hex::encode(digest)
    }
}

/// Minimal hex encoder, avoiding a dependency purely for `Sha256::digest`
/// formatting; mirrors the `<hh>/<hash>` object-path convention in spec §4.11.
mod hex {
    pub fn encode(bytes: impl AsRef<[u8]>) -> String {
        bytes.as_ref().iter().map(|b| format!("{b:02x}")).collect()
    }
}
