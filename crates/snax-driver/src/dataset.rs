// SPDX-License-Identifier: AGPL-3.0-only

//! Test vectors
//!
//! Inputs and golden output for one run. Random vectors draw elements from
//! `[0, 100)` so products stay far from 32-bit wrap-around.

use crate::error::{Result, SnaxError};
use crate::kernels::Offload;

/// Upper bound (exclusive) of randomly drawn elements.
pub const RANDOM_ELEMENT_BOUND: u32 = 100;

// ── PRNG ─────────────────────────────────────────────────────────────────────

/// xoshiro128** over the 32-bit element width, seeded with two splitmix64
/// steps so neighbouring seeds give unrelated vectors.
struct ElementRng {
    s: [u32; 4],
}

impl ElementRng {
    #[allow(clippy::cast_possible_truncation)]
    fn new(seed: u64) -> Self {
        let mut state = seed;
        let lo = splitmix64(&mut state);
        let hi = splitmix64(&mut state);
        let mut s = [lo as u32, (lo >> 32) as u32, hi as u32, (hi >> 32) as u32];
        if s == [0; 4] {
            s[0] = 1;
        }
        Self { s }
    }

    fn next_u32(&mut self) -> u32 {
        let result = self.s[1].wrapping_mul(5).rotate_left(7).wrapping_mul(9);
        let t = self.s[1] << 9;
        self.s[2] ^= self.s[0];
        self.s[3] ^= self.s[1];
        self.s[1] ^= self.s[2];
        self.s[0] ^= self.s[3];
        self.s[2] ^= t;
        self.s[3] = self.s[3].rotate_left(11);
        result
    }

    /// Element in `[0, bound)` by multiply-shift.
    #[allow(clippy::cast_possible_truncation)]
    fn below(&mut self, bound: u32) -> u32 {
        ((u64::from(self.next_u32()) * u64::from(bound)) >> 32) as u32
    }
}

fn splitmix64(state: &mut u64) -> u64 {
    *state = state.wrapping_add(0x9e37_79b9_7f4a_7c15);
    let mut z = *state;
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}

// ── Dataset ──────────────────────────────────────────────────────────────────

/// Two input vectors and the expected output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dataset {
    /// First input
    pub a: Vec<u32>,
    /// Second input
    pub b: Vec<u32>,
    /// Expected output
    pub golden: Vec<u32>,
}

impl Dataset {
    /// Assemble a dataset from explicit vectors.
    ///
    /// # Errors
    ///
    /// Returns error if the three vectors differ in length.
    pub fn new(a: Vec<u32>, b: Vec<u32>, golden: Vec<u32>) -> Result<Self> {
        if a.len() != b.len() || a.len() != golden.len() {
            return Err(SnaxError::invalid_plan(format!(
                "dataset vectors differ in length: a={} b={} golden={}",
                a.len(),
                b.len(),
                golden.len()
            )));
        }
        Ok(Self { a, b, golden })
    }

    /// Inputs with the golden output computed by `kernel`'s reference.
    ///
    /// # Errors
    ///
    /// Returns error if `a` and `b` differ in length.
    pub fn from_inputs<K: Offload + ?Sized>(a: Vec<u32>, b: Vec<u32>, kernel: &K) -> Result<Self> {
        let golden = a.iter().zip(&b).map(|(&x, &y)| kernel.reference(x, y)).collect();
        Self::new(a, b, golden)
    }

    /// `len` random elements per input from `seed`, golden output for an
    /// elementwise multiply.
    pub fn random(len: usize, seed: u64) -> Self {
        let mut rng = ElementRng::new(seed);
        let a: Vec<u32> = (0..len).map(|_| rng.below(RANDOM_ELEMENT_BOUND)).collect();
        let b: Vec<u32> = (0..len).map(|_| rng.below(RANDOM_ELEMENT_BOUND)).collect();
        let golden = a.iter().zip(&b).map(|(&x, &y)| x.wrapping_mul(y)).collect();
        Self { a, b, golden }
    }

    /// Recompute the golden output with `kernel`'s reference.
    #[must_use]
    pub fn with_golden_for<K: Offload + ?Sized>(mut self, kernel: &K) -> Self {
        self.golden = self
            .a
            .iter()
            .zip(&self.b)
            .map(|(&x, &y)| kernel.reference(x, y))
            .collect();
        self
    }

    /// Fixed 20-element vectors of the tiled MAC test.
    pub fn snax_mac_reference() -> Self {
        let a = vec![
            99, 67, 39, 26, 62, 14, 17, 18, 54, 16, 44, 9, 26, 85, 72, 66, 95, 65, 43, 84,
        ];
        let b = vec![
            86, 10, 14, 11, 38, 41, 94, 82, 97, 25, 96, 71, 44, 59, 93, 38, 57, 21, 84, 29,
        ];
        let golden = vec![
            8514, 670, 546, 286, 2356, 574, 1598, 1476, 5238, 400, 4224, 639, 1144, 5015, 6696,
            2508, 5415, 1365, 3612, 2436,
        ];
        Self { a, b, golden }
    }

    /// Elements per vector.
    pub fn len(&self) -> usize {
        self.golden.len()
    }

    /// True for an empty dataset.
    pub fn is_empty(&self) -> bool {
        self.golden.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernels::{AluMode, AluOffload, MacMultiply};

    #[test]
    fn reference_golden_is_the_product() {
        let d = Dataset::snax_mac_reference();
        assert_eq!(d.len(), 20);
        for i in 0..d.len() {
            assert_eq!(d.golden[i], d.a[i] * d.b[i]);
        }
    }

    #[test]
    fn random_is_seeded_and_bounded() {
        let d1 = Dataset::random(64, 7);
        let d2 = Dataset::random(64, 7);
        let d3 = Dataset::random(64, 8);
        assert_eq!(d1, d2);
        assert_ne!(d1, d3);
        assert!(d1.a.iter().chain(&d1.b).all(|&x| x < RANDOM_ELEMENT_BOUND));
        assert_eq!(d1, d1.clone().with_golden_for(&MacMultiply));
    }

    #[test]
    fn random_covers_the_element_range() {
        let d = Dataset::random(4096, 1);
        let mut seen = [false; RANDOM_ELEMENT_BOUND as usize];
        for &x in d.a.iter().chain(&d.b) {
            seen[x as usize] = true;
        }
        assert!(seen.iter().all(|&s| s));
    }

    #[test]
    fn golden_follows_kernel() {
        let d = Dataset::from_inputs(vec![5, 1], vec![3, 2], &AluOffload::new(AluMode::Sub)).unwrap();
        assert_eq!(d.golden, vec![2, u32::MAX]);
    }

    #[test]
    fn mismatched_lengths_rejected() {
        assert!(Dataset::new(vec![1], vec![1, 2], vec![1]).is_err());
    }
}
