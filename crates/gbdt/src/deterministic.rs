//! Seeded randomness and ordering helpers
//!
//! Row shuffles and split selection must not depend on platform RNGs or hash
//! iteration order; everything here is a pure function of its inputs.

/// 31-bit linear congruential generator (glibc `rand` constants)
#[derive(Clone, Debug)]
pub struct LcgRng {
    state: u64,
}

impl LcgRng {
    const A: u64 = 1_103_515_245;
    const C: u64 = 12_345;
    const MASK: u64 = (1 << 31) - 1;

    pub fn new(seed: i64) -> Self {
        Self {
            state: seed.unsigned_abs() & Self::MASK,
        }
    }

    /// Next value in `[0, 2^31)`
    pub fn next_i64(&mut self) -> i64 {
        self.state = self.state.wrapping_mul(Self::A).wrapping_add(Self::C) & Self::MASK;
        self.state as i64
    }

    /// Next value in `[0, bound)`; 0 when `bound` is 0
    pub fn next_range(&mut self, bound: usize) -> usize {
        match bound {
            0 => 0,
            b => (self.next_i64() as u64 % b as u64) as usize,
        }
    }
}

/// Fisher-Yates shuffle of `0..n` driven by [`LcgRng`]
pub fn permutation(n: usize, seed: i64) -> Vec<usize> {
    let mut rng = LcgRng::new(seed);
    let mut order: Vec<usize> = (0..n).collect();
    for last in (1..n).rev() {
        let pick = rng.next_range(last + 1);
        order.swap(last, pick);
    }
    order
}

/// Total order over candidate splits with equal gain.
///
/// Lower `(feature_idx, threshold, node_id)` wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct SplitTieBreaker {
    pub feature_idx: usize,
    pub threshold: i64,
    pub node_id: usize,
}

impl SplitTieBreaker {
    pub fn new(feature_idx: usize, threshold: i64, node_id: usize) -> Self {
        Self {
            feature_idx,
            threshold,
            node_id,
        }
    }
}
