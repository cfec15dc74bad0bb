/*!
Compaction planning (spec §4.3): decide which small segments to merge into
one, once a namespace has accumulated at least `compaction_min_batches` of
them, targeting `compaction_target_events` events in the compacted segment.
*/

use super::segment::SegmentEntry;

/// Segments selected for compaction, oldest-first, and the events count they
/// carry in total.
pub struct CompactionPlan {
    pub segments: Vec<SegmentEntry>,
    pub total_events: usize,
}

/// Decide whether `segments` (oldest first) should be compacted, and if so,
/// which prefix of them to merge.
pub fn plan_compaction(
    segments: &[SegmentEntry],
    min_batches: usize,
    target_events: usize,
) -> Option<CompactionPlan> {
    if segments.len() < min_batches {
        return None;
    }
    let mut chosen = Vec::new();
    let mut total = 0usize;
    for segment in segments {
        chosen.push(segment.clone());
        total += segment.count;
        if total >= target_events {
            break;
        }
    }
    if chosen.len() < 2 {
        return None;
    }
    Some(CompactionPlan {
        segments: chosen,
        total_events: total,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segment(seq: u32, count: usize) -> SegmentEntry {
        SegmentEntry {
            seq,
            path: format!("seg-{seq:04}.parquet"),
            min_ts: seq as i64 * 1000,
            max_ts: seq as i64 * 1000 + 999,
            count,
            size_bytes: count * 10,
            created_at_ms: 0,
        }
    }

    #[test]
    fn below_min_batches_does_not_compact() {
        let segments = vec![segment(0, 10), segment(1, 10)];
        assert!(plan_compaction(&segments, 8, 100).is_none());
    }

    #[test]
    fn accumulates_until_target_events_reached() {
        let segments: Vec<SegmentEntry> = (0..10).map(|i| segment(i, 100)).collect();
        let plan = plan_compaction(&segments, 8, 250).unwrap();
        assert_eq!(plan.segments.len(), 3);
        assert_eq!(plan.total_events, 300);
    }
}
