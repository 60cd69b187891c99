// SPDX-License-Identifier: AGPL-3.0-only

//! Cluster core layout.
//!
//! A Snitch cluster pairs eight integer compute cores with one extra core
//! whose only job is driving the cluster DMA. SNAX attaches accelerators to
//! the CSR port of compute core 0.
//!
//! ```text
//! core  0      1 .. 7      8
//!      ┌────┐ ┌────────┐ ┌────┐
//!      │ CC │ │   CC   │ │ DM │
//!      └─┬──┘ └────────┘ └─┬──┘
//!        │ CSR             │ DMA
//!      ┌─▼────────┐     ┌──▼──────────┐
//!      │ SNAX acc │◄───►│ TCDM (L1)   │◄──► L3
//!      └──────────┘     └─────────────┘
//! ```

/// Static core layout of one cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClusterShape {
    /// Total cores taking part in cluster barriers.
    pub cores: u32,
    /// Index of the data-mover core.
    pub dm_core: u32,
    /// Index of the compute core whose CSR port drives the accelerator.
    pub accel_core: u32,
}

impl ClusterShape {
    /// Reference SNAX cluster: 8 compute cores + 1 DM core.
    pub const SNAX: Self = Self { cores: 9, dm_core: 8, accel_core: 0 };

    /// Number of compute (non-DM) cores.
    #[must_use]
    pub const fn compute_cores(&self) -> u32 {
        self.cores - 1
    }
}

/// Three-stage offload pipeline: load, compute, store.
pub const PIPELINE_STAGES: usize = 3;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snax_cluster_layout() {
        let c = ClusterShape::SNAX;
        assert_eq!(c.compute_cores(), 8);
        assert!(c.dm_core < c.cores);
        assert_ne!(c.dm_core, c.accel_core);
    }
}
