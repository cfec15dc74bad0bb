/*!
Per-instance configuration for a [crate::db::Database]. There is no process
wide singleton; every component that needs a tunable is handed a reference
to a [DatabaseConfig] at construction time.
*/

/// Tunables for the commit protocol, event log, replay and index substrate.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Timeout for acquiring the per-namespace commit lock (§4.2, §5).
    pub write_lock_timeout_ms: u64,
    /// Base delay for the exponential-backoff-with-jitter retry schedule.
    pub base_backoff_ms: u64,
    /// Cap on the backoff delay.
    pub max_backoff_ms: u64,
    /// Maximum number of OCC retries before surfacing `CommitConflict`.
    pub max_retries: u32,

    /// Bound on `pendingEvents`; 0 disables the backpressure check.
    pub max_pending_events: usize,
    /// Lower bound of the adaptive flush threshold.
    pub min_batch_threshold: usize,
    /// Upper bound of the adaptive flush threshold.
    pub max_batch_threshold: usize,
    /// Width of the sliding window used to estimate event arrival rate.
    pub adaptive_window_secs: u64,

    /// Minimum number of small batches before compaction kicks in.
    pub compaction_min_batches: usize,
    /// Target event count a compacted segment should reach.
    pub compaction_target_events: usize,
    /// Age (in days, by `minTs`) after which a segment is archived.
    pub archive_after_days: i64,
    /// Age (in days) after which an archived segment is purged.
    pub retention_days: i64,

    /// Minimum number of events replayed before a snapshot is considered.
    pub snapshot_threshold: usize,

    /// Fields promoted to top-level Parquet columns instead of the `$data` blob.
    pub shred_fields: Vec<String>,

    /// When true, all mutating operations fail with `ReadOnly`.
    pub read_only: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        DatabaseConfig {
            write_lock_timeout_ms: 30_000,
            base_backoff_ms: 100,
            max_backoff_ms: 5_000,
            max_retries: 10,

            max_pending_events: 0,
            min_batch_threshold: 50,
            max_batch_threshold: 2_000,
            adaptive_window_secs: 60,

            compaction_min_batches: 8,
            compaction_target_events: 5_000,
            archive_after_days: 30,
            retention_days: 365,

            snapshot_threshold: 500,

            shred_fields: Vec::new(),

            read_only: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_values() {
        let cfg = DatabaseConfig::default();
        assert_eq!(cfg.write_lock_timeout_ms, 30_000);
        assert_eq!(cfg.base_backoff_ms, 100);
        assert_eq!(cfg.max_backoff_ms, 5_000);
        assert_eq!(cfg.max_retries, 10);
        assert_eq!(cfg.max_pending_events, 0);
    }
}
