/*!
A classic Bloom filter (spec §4.5): per-index global filter plus per-row-group
filters, used to prune row groups before scanning them. Never false
negative; may be false positive.
*/

use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

/// A bit-set-backed Bloom filter sized from the expected item count and
/// target false-positive rate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BloomFilter {
    bits: Vec<u64>,
    num_bits: usize,
    num_hashes: u32,
}

/// Standard Bloom filter sizing formulas.
pub fn calculate_optimal_params(expected_items: usize, target_fpr: f64) -> (usize, u32) {
    let n = expected_items.max(1) as f64;
    let p = target_fpr.clamp(f64::MIN_POSITIVE, 0.9999);
    let m = (-(n * p.ln()) / (std::f64::consts::LN_2.powi(2))).ceil();
    let m = m.max(64.0) as usize;
    let k = ((m as f64 / n) * std::f64::consts::LN_2).round().max(1.0) as u32;
    (m, k)
}

impl BloomFilter {
    /// Build an empty filter sized for `expected_items` at `target_fpr`.
    pub fn new(expected_items: usize, target_fpr: f64) -> Self {
        let (num_bits, num_hashes) = calculate_optimal_params(expected_items, target_fpr);
        let words = (num_bits + 63) / 64;
        BloomFilter {
            bits: vec![0u64; words],
            num_bits,
            num_hashes,
        }
    }

    fn hash_pair(value: &[u8]) -> (u64, u64) {
        let mut hasher1 = std::collections::hash_map::DefaultHasher::new();
        value.hash(&mut hasher1);
        let h1 = hasher1.finish();
        // A distinct seed for the second hash avoids correlated collisions
        // under Kirsch-Mitzenmacher double hashing.
        let mut hasher2 = std::collections::hash_map::DefaultHasher::new();
        (value, 0x9e3779b97f4a7c15u64).hash(&mut hasher2);
        let h2 = hasher2.finish();
        (h1, h2)
    }

    fn bit_positions(&self, value: &[u8]) -> Vec<usize> {
        let (h1, h2) = Self::hash_pair(value);
        (0..self.num_hashes)
            .map(|i| {
                let combined = h1.wrapping_add((i as u64).wrapping_mul(h2));
                (combined as usize) % self.num_bits
            })
            .collect()
    }

    /// Add `value` to the filter.
    pub fn add(&mut self, value: &[u8]) {
        for pos in self.bit_positions(value) {
            self.bits[pos / 64] |= 1 << (pos % 64);
        }
    }

    /// Test whether `value` might be present. Never a false negative.
    pub fn might_contain(&self, value: &[u8]) -> bool {
        self.bit_positions(value)
            .into_iter()
            .all(|pos| self.bits[pos / 64] & (1 << (pos % 64)) != 0)
    }

    /// Current configured bit width, for diagnostics/tests.
    pub fn num_bits(&self) -> usize {
        self.num_bits
    }

    /// Current configured hash count, for diagnostics/tests.
    pub fn num_hashes(&self) -> u32 {
        self.num_hashes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn added_values_are_always_found() {
        let mut filter = BloomFilter::new(1_000, 0.01);
        for i in 0..1_000u32 {
            filter.add(&i.to_le_bytes());
        }
        for i in 0..1_000u32 {
            assert!(filter.might_contain(&i.to_le_bytes()));
        }
    }

    #[test]
    fn false_positive_rate_is_within_margin() {
        let n = 2_000usize;
        let target_fpr = 0.02;
        let mut filter = BloomFilter::new(n, target_fpr);
        for i in 0..n as u32 {
            filter.add(&i.to_le_bytes());
        }
        let trials = 20_000u32;
        let mut false_positives = 0u32;
        for i in (n as u32)..(n as u32 + trials) {
            if filter.might_contain(&i.to_le_bytes()) {
                false_positives += 1;
            }
        }
        let observed_fpr = false_positives as f64 / trials as f64;
        assert!(
            observed_fpr <= target_fpr + 0.02,
            "observed fpr {observed_fpr} exceeded target {target_fpr} plus margin"
        );
    }
}
