/*!
The write-ahead event log (spec §4.3): append-only segments of [Event]s,
flushed from a bounded in-memory queue under adaptive backpressure, then
compacted, archived and pruned over time.
*/

pub mod archive;
pub mod backpressure;
pub mod compaction;
pub mod log;
pub mod segment;

pub use archive::{plan_archival, plan_pruning, ArchivalAction};
pub use backpressure::AdaptiveThreshold;
pub use compaction::{plan_compaction, CompactionPlan};
pub use log::{EventLog, EventManifest};
pub use segment::{archive_path, decode_segment, encode_segment, segment_path, SegmentEntry};
