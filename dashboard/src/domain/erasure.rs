//! Erasure simulation
//!
//! Marks revealed steps as "erased" to visualize a noisy decoding channel.
//! The mask is a pure function of `(rate, cursor)`: index `i` is erased iff
//! `(i * 2654435761) mod 100 < rate`. The multiplier is part of the contract
//! since other renderings of the same trajectory must produce the same mask.

use std::collections::BTreeSet;

use crate::core::constants::MAX_ERASURE_RATE;

/// Knuth's multiplicative hash constant
pub const ERASURE_HASH_MULTIPLIER: u64 = 2_654_435_761;

/// Bucket of index `i` in `[0, 100)`
pub fn erasure_hash(index: usize) -> u32 {
    // 128-bit product keeps the result exact for every usize
    ((index as u128 * ERASURE_HASH_MULTIPLIER as u128) % 100) as u32
}

/// Indices in `[0, upper_inclusive]` erased at `rate` percent
pub fn erased_indices(rate: u32, upper_inclusive: usize) -> BTreeSet<usize> {
    if rate == 0 {
        return BTreeSet::new();
    }
    (0..=upper_inclusive)
        .filter(|&i| erasure_hash(i) < rate)
        .collect()
}

/// Erasure mask for the current view
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErasureView {
    pub rate: u32,
    pub cursor: usize,
    pub erased: BTreeSet<usize>,
}

impl ErasureView {
    pub fn compute(rate: u32, cursor: usize) -> Self {
        let rate = rate.min(MAX_ERASURE_RATE);
        Self {
            rate,
            cursor,
            erased: erased_indices(rate, cursor),
        }
    }

    pub fn is_erased(&self, index: usize) -> bool {
        self.erased.contains(&index)
    }
}
