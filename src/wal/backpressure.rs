/*!
Adaptive flush-threshold optimizer (spec §4.3 "Adaptive thresholds"): scales
the flush trigger between `minBatchThreshold` and `maxBatchThreshold` based
on recent event arrival rate, tracked in a sliding window.
*/

use std::collections::VecDeque;

/// Tracks event arrival timestamps in a sliding window and derives a flush
/// threshold that scales up under high arrival rate and down when quiet.
pub struct AdaptiveThreshold {
    arrivals: VecDeque<i64>,
    window_ms: i64,
    min_threshold: usize,
    max_threshold: usize,
}

impl AdaptiveThreshold {
    pub fn new(window_secs: u64, min_threshold: usize, max_threshold: usize) -> Self {
        AdaptiveThreshold {
            arrivals: VecDeque::new(),
            window_ms: (window_secs as i64) * 1000,
            min_threshold,
            max_threshold: max_threshold.max(min_threshold),
        }
    }

    /// Record one event arrival at `now_ms`, evicting anything outside the window.
    pub fn record_arrival(&mut self, now_ms: i64) {
        self.arrivals.push_back(now_ms);
        self.evict_stale(now_ms);
    }

    fn evict_stale(&mut self, now_ms: i64) {
        while let Some(&front) = self.arrivals.front() {
            if now_ms - front > self.window_ms {
                self.arrivals.pop_front();
            } else {
                break;
            }
        }
    }

    /// Events/second observed within the current window.
    fn rate_per_sec(&self, now_ms: i64) -> f64 {
        if self.arrivals.is_empty() || self.window_ms == 0 {
            return 0.0;
        }
        let span_ms = (now_ms - *self.arrivals.front().unwrap()).max(1);
        self.arrivals.len() as f64 / (span_ms as f64 / 1000.0)
    }

    /// Current flush threshold, linearly interpolated between `min` and `max`
    /// as the observed rate grows from 0 to a saturation point of
    /// `max_threshold` events/sec (spec §9: interpolation curve is an
    /// implementation choice, fixed here as linear).
    pub fn threshold(&self, now_ms: i64) -> usize {
        let rate = self.rate_per_sec(now_ms);
        let saturation = self.max_threshold as f64;
        let fraction = (rate / saturation).clamp(0.0, 1.0);
        let span = (self.max_threshold - self.min_threshold) as f64;
        self.min_threshold + (span * fraction).round() as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idle_window_yields_min_threshold() {
        let threshold = AdaptiveThreshold::new(60, 50, 2_000);
        assert_eq!(threshold.threshold(0), 50);
    }

    #[test]
    fn high_rate_saturates_to_max_threshold() {
        let mut threshold = AdaptiveThreshold::new(60, 50, 2_000);
        for i in 0..2_000 {
            threshold.record_arrival(i);
        }
        assert_eq!(threshold.threshold(2_000), 2_000);
    }

    #[test]
    fn stale_arrivals_are_evicted() {
        let mut threshold = AdaptiveThreshold::new(1, 50, 2_000);
        for i in 0..100 {
            threshold.record_arrival(i);
        }
        threshold.evict_stale(100_000);
        assert!(threshold.arrivals.is_empty());
    }
}
