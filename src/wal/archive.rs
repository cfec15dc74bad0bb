/*!
Archival and pruning planning (spec §4.3 "Archival", "Pruning"): segments
older than `archive_after_days` move to `archive/YYYY/MM/`, keyed on the
segment's `minTs`; archived segments older than `retention_days` are purged.
*/

use chrono::{Datelike, TimeZone, Utc};

use super::segment::{archive_path, SegmentEntry};

const MS_PER_DAY: i64 = 86_400_000;

/// One segment's archival destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchivalAction {
    pub segment: SegmentEntry,
    pub destination: String,
}

/// Segments whose age (by `min_ts`) exceeds `archive_after_days` as of `now_ms`.
pub fn plan_archival(location: &str, segments: &[SegmentEntry], archive_after_days: i64, now_ms: i64) -> Vec<ArchivalAction> {
    let cutoff_ms = archive_after_days * MS_PER_DAY;
    segments
        .iter()
        .filter(|s| now_ms - s.min_ts >= cutoff_ms)
        .map(|s| {
            let dt = Utc.timestamp_millis_opt(s.min_ts).single().unwrap_or_else(Utc::now);
            ArchivalAction {
                segment: s.clone(),
                destination: archive_path(location, s.seq, dt.year(), dt.month()),
            }
        })
        .collect()
}

/// Archived segments whose age exceeds `retention_days` as of `now_ms` and
/// should be permanently deleted.
pub fn plan_pruning(segments: &[SegmentEntry], retention_days: i64, now_ms: i64) -> Vec<SegmentEntry> {
    let cutoff_ms = retention_days * MS_PER_DAY;
    segments
        .iter()
        .filter(|s| now_ms - s.min_ts >= cutoff_ms)
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segment_at(seq: u32, min_ts: i64) -> SegmentEntry {
        SegmentEntry {
            seq,
            path: format!("seg-{seq:04}.parquet"),
            min_ts,
            max_ts: min_ts + 1,
            count: 1,
            size_bytes: 10,
            created_at_ms: min_ts,
        }
    }

    #[test]
    fn recent_segments_are_not_archived() {
        let now = 1_700_000_000_000i64;
        let segments = vec![segment_at(0, now - MS_PER_DAY)];
        let plan = plan_archival("wh/db/users", &segments, 30, now);
        assert!(plan.is_empty());
    }

    #[test]
    fn old_segments_are_archived_by_year_month() {
        let now = 1_700_000_000_000i64;
        let old_ts = now - 40 * MS_PER_DAY;
        let segments = vec![segment_at(3, old_ts)];
        let plan = plan_archival("wh/db/users", &segments, 30, now);
        assert_eq!(plan.len(), 1);
        assert!(plan[0].destination.starts_with("wh/db/users/events/archive/"));
    }

    #[test]
    fn pruning_targets_only_retention_expired_segments() {
        let now = 1_700_000_000_000i64;
        let segments = vec![segment_at(0, now - 400 * MS_PER_DAY), segment_at(1, now - 10 * MS_PER_DAY)];
        let pruned = plan_pruning(&segments, 365, now);
        assert_eq!(pruned.len(), 1);
        assert_eq!(pruned[0].seq, 0);
    }
}
