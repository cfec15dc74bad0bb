/*!
Exponential backoff with jitter and a minimal cooperative abort signal (spec
§4.2 step 5, §5 "Timeouts & backoff", "Cancellation"). Shared by the table
committer's OCC retry loop and the event log's flush retries.
*/

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rand::Rng;

/// `delay_k = min(maxBackoffMs, baseBackoffMs * 2^k) + rand(0, baseBackoffMs)`.
pub fn backoff_delay_ms(attempt: u32, base_ms: u64, max_ms: u64) -> u64 {
    let exp = base_ms.saturating_mul(1u64 << attempt.min(32));
    let capped = exp.min(max_ms);
    let jitter = if base_ms == 0 {
        0
    } else {
        rand::thread_rng().gen_range(0..base_ms)
    };
    capped + jitter
}

/// A cooperative cancellation flag checked at retry-loop boundaries.
///
/// Asserting it before a retry loop starts causes an immediate `Aborted`
/// without invoking the underlying operation; asserting it mid-retry lets
/// the in-flight attempt finish but stops further attempts.
#[derive(Clone, Default)]
pub struct AbortSignal(Arc<AtomicBool>);

impl AbortSignal {
    pub fn new() -> Self {
        AbortSignal(Arc::new(AtomicBool::new(false)))
    }

    pub fn abort(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_aborted(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_is_bounded_by_base_and_max() {
        for attempt in 0..6 {
            let delay = backoff_delay_ms(attempt, 100, 10_000);
            let exp_cap = (100u64 * (1 << attempt)).min(10_000);
            assert!(delay >= exp_cap);
            assert!(delay < exp_cap + 100);
        }
    }

    #[test]
    fn delay_saturates_at_max_backoff() {
        let delay = backoff_delay_ms(10, 1_000, 2_000);
        assert!(delay >= 2_000);
        assert!(delay < 2_000 + 1_000);
    }

    #[test]
    fn abort_signal_starts_clear() {
        let signal = AbortSignal::new();
        assert!(!signal.is_aborted());
        signal.abort();
        assert!(signal.is_aborted());
    }
}
