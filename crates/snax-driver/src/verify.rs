// SPDX-License-Identifier: AGPL-3.0-only

//! Result verification
//!
//! Mismatches are counted, never fatal: a run always completes and reports
//! a tally. Two checks are made, the device output against the golden
//! vector and the host reference against the golden vector, so a bad
//! dataset is told apart from a bad device.

use crate::dataset::Dataset;
use crate::kernels::Offload;
use tracing::warn;

/// Count positions where `actual` and `expected` differ.
///
/// Elements missing from the shorter slice count as mismatches.
pub fn compare(actual: &[u32], expected: &[u32]) -> usize {
    let differing = actual.iter().zip(expected).filter(|(a, e)| a != e).count();
    differing + actual.len().abs_diff(expected.len())
}

/// Outcome of checking one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Verification {
    /// Device output elements differing from the golden vector
    pub device_mismatches: usize,
    /// Host reference elements differing from the golden vector
    pub host_mismatches: usize,
    /// Elements checked
    pub checked: usize,
}

impl Verification {
    /// Check `output` and the host reference of `kernel` against `dataset`.
    pub fn check<K: Offload + ?Sized>(output: &[u32], dataset: &Dataset, kernel: &K) -> Self {
        let host: Vec<u32> = dataset
            .a
            .iter()
            .zip(&dataset.b)
            .map(|(&a, &b)| kernel.reference(a, b))
            .collect();

        let v = Self {
            device_mismatches: compare(output, &dataset.golden),
            host_mismatches: compare(&host, &dataset.golden),
            checked: dataset.golden.len(),
        };
        if !v.passed() {
            warn!(
                "{}: {} device / {} host mismatches out of {}",
                kernel.name(),
                v.device_mismatches,
                v.host_mismatches,
                v.checked
            );
        }
        v
    }

    /// Total mismatches of both checks.
    pub const fn total(&self) -> usize {
        self.device_mismatches + self.host_mismatches
    }

    /// True when both checks found nothing.
    pub const fn passed(&self) -> bool {
        self.total() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernels::{AluMode, AluOffload, MacMultiply};

    #[test]
    fn compare_counts_differences_and_length() {
        assert_eq!(compare(&[1, 2, 3], &[1, 2, 3]), 0);
        assert_eq!(compare(&[1, 0, 3], &[1, 2, 4]), 2);
        assert_eq!(compare(&[1, 2], &[1, 2, 3, 4]), 2);
        assert_eq!(compare(&[], &[]), 0);
    }

    #[test]
    fn reference_dataset_checks_clean() {
        let d = Dataset::snax_mac_reference();
        let v = Verification::check(&d.golden, &d, &MacMultiply);
        assert!(v.passed());
        assert_eq!(v.checked, 20);
    }

    #[test]
    fn wrong_kernel_shows_as_host_mismatch() {
        let d = Dataset::snax_mac_reference();
        let v = Verification::check(&d.golden, &d, &AluOffload::new(AluMode::Add));
        assert_eq!(v.device_mismatches, 0);
        assert_eq!(v.host_mismatches, 20);
        assert!(!v.passed());
    }
}
