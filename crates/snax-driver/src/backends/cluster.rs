// SPDX-License-Identifier: AGPL-3.0-only

//! Software cluster
//!
//! Runs the tile pipeline with one OS thread per execution unit:
//!
//! ```text
//!   unit 0 (compute) ── ComputeEngine ── SoftwareAccelerator ─┐
//!   unit 1..7 (idle)                                          ├── SimMemory
//!   unit 8 (mover) ──── SoftwareDma ──────────────────────────┘  (L3 + TCDM)
//!          └──────── FlushingBarrier ── std::sync::Barrier ──────┘
//! ```
//!
//! The dataset is placed in simulated backing storage, the pipeline runs,
//! and the output vector is read back and verified.

use super::memory::SimMemory;
use super::software::{FlushingBarrier, Personality, SoftwareAccelerator, SoftwareDma};
use crate::barrier::CancelToken;
use crate::completion::{CompletionWaiter, WaitPolicy};
use crate::dataset::Dataset;
use crate::device::DeviceHandle;
use crate::error::{Result, SnaxError};
use crate::kernels::Offload;
use crate::role::{ClusterTopology, Role};
use crate::scheduler::{
    BackingBuffers, BufferDepth, ComputeEngine, PipelineConfig, TilePlan, TileScheduler,
    UnitPorts, UnitReport, ELEMENT_BYTES,
};
use crate::scratchpad::ScratchpadAllocator;
use crate::transfer::TransferEngine;
use crate::verify::Verification;
use snax_chip::tcdm;
use std::sync::{Arc, Barrier};
use tracing::info;

/// Default busy polls the software accelerator reports per launch.
pub const DEFAULT_LATENCY_POLLS: u32 = 4;

/// Outcome of one pipeline run on the software cluster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineReport {
    /// Kernel name
    pub kernel: &'static str,
    /// Tiles processed
    pub tiles: usize,
    /// Iterations run, drain included
    pub iterations: usize,
    /// Buffer depth used
    pub depth: BufferDepth,
    /// Output vector read back from backing storage
    pub output: Vec<u32>,
    /// Verification tally
    pub verification: Verification,
    /// Completed accelerator launches
    pub launches: u64,
    /// DMA transfers issued
    pub transfers: u32,
    /// Per-unit reports, by unit id
    pub units: Vec<UnitReport>,
}

impl PipelineReport {
    /// Report of the first unit holding `role`.
    pub fn unit_with_role(&self, role: Role) -> Option<&UnitReport> {
        self.units.iter().find(|u| u.role == role)
    }

    /// Status polls spent waiting for the accelerator.
    pub fn polls(&self) -> u64 {
        self.units.iter().map(|u| u.polls).sum()
    }
}

/// Host-side cluster built from the software platform models.
#[derive(Debug, Clone)]
pub struct SoftwareCluster {
    topology: ClusterTopology,
    allocator: ScratchpadAllocator,
    latency_polls: u32,
    stuck: bool,
    cancel: CancelToken,
}

impl SoftwareCluster {
    /// Cluster with the given wiring and scratchpad.
    pub fn new(topology: ClusterTopology, allocator: ScratchpadAllocator) -> Self {
        Self {
            topology,
            allocator,
            latency_polls: DEFAULT_LATENCY_POLLS,
            stuck: false,
            cancel: CancelToken::new(),
        }
    }

    /// Nine-core SNAX cluster over the full TCDM.
    pub fn snax_default() -> Self {
        Self::new(ClusterTopology::snax(), ScratchpadAllocator::snax_tcdm())
    }

    /// Busy polls per accelerator launch.
    #[must_use]
    pub const fn with_latency_polls(mut self, polls: u32) -> Self {
        self.latency_polls = polls;
        self
    }

    /// Make the accelerator never complete.
    #[must_use]
    pub const fn with_stuck_device(mut self, stuck: bool) -> Self {
        self.stuck = stuck;
        self
    }

    /// Use an externally owned cancel token.
    ///
    /// Every run watches it through a fresh child token, so a failed run
    /// does not cancel the next one; raising `cancel` cancels all later runs.
    #[must_use]
    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Cluster wiring.
    pub const fn topology(&self) -> &ClusterTopology {
        &self.topology
    }

    /// Scratchpad allocator.
    pub const fn allocator(&self) -> &ScratchpadAllocator {
        &self.allocator
    }

    /// External cancel token watched by every run.
    pub const fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    /// Backing storage layout for a `len`-element dataset: A, B and O back
    /// to back from the L3 base. Returns the buffers and their total size.
    ///
    /// # Errors
    ///
    /// Returns error if the vectors do not fit in the simulated L3 window.
    pub fn backing_for(len: usize) -> Result<(BackingBuffers, usize)> {
        let align = tcdm::DEFAULT_ALIGNMENT;
        let vec_bytes = len
            .checked_mul(ELEMENT_BYTES)
            .and_then(|b| b.checked_add(align - 1))
            .map(|b| b & !(align - 1))
            .ok_or_else(|| SnaxError::invalid_plan(format!("dataset of {len} elements overflows")))?;
        let total = vec_bytes.saturating_mul(3);
        if total > tcdm::L3_SIM_SIZE {
            return Err(SnaxError::AddressOutOfRange {
                addr: u64::from(tcdm::L3_BASE),
                len: total,
            });
        }
        // total <= L3_SIM_SIZE, so both offsets fit in u32
        let stride = u32::try_from(vec_bytes).map_err(|_| SnaxError::AddressOutOfRange {
            addr: u64::from(tcdm::L3_BASE),
            len: total,
        })?;
        let backing = BackingBuffers {
            a: tcdm::L3_BASE,
            b: tcdm::L3_BASE + stride,
            o: tcdm::L3_BASE + 2 * stride,
        };
        Ok((backing, total))
    }

    /// Run the tiled pipeline over `dataset` with `kernel`.
    ///
    /// # Errors
    ///
    /// Returns a configuration error before any unit starts, or the error of
    /// the unit that failed ([`SnaxError::Cancelled`] only if the run was
    /// cancelled from outside). Output mismatches are not errors; they are
    /// tallied in the report.
    pub fn run<K: Offload>(
        &self,
        dataset: &Dataset,
        kernel: K,
        config: &PipelineConfig,
    ) -> Result<PipelineReport> {
        let len = dataset.len();
        let (backing, backing_bytes) = Self::backing_for(len)?;
        let plan = TilePlan::new(len, config, &self.allocator, backing)?;

        let personality = Personality::for_map(&kernel.register_map()).ok_or_else(|| {
            SnaxError::invalid_plan(format!(
                "no software model for {}",
                kernel.register_map().name
            ))
        })?;

        let memory = Arc::new(SimMemory::snax(backing_bytes)?);
        memory.write_words(backing.a, &dataset.a)?;
        memory.write_words(backing.b, &dataset.b)?;

        let name = kernel.name();
        let accel = SoftwareAccelerator::new(personality, Arc::clone(&memory))
            .with_latency_polls(self.latency_polls)
            .with_stuck(self.stuck);
        let device = DeviceHandle::new(accel, kernel.register_map());
        let mut engine = ComputeEngine::new(device, kernel, CompletionWaiter::new(config.wait))?;
        let dma = SoftwareDma::new(Arc::clone(&memory));
        let barrier = Barrier::new(self.topology.unit_count() as usize);
        let scheduler = TileScheduler::new(plan, self.topology).with_cancel(self.cancel.child());

        info!(
            "{name}: running {} tiles over {} units",
            scheduler.plan().tiles(),
            self.topology.unit_count()
        );

        let results = self.run_units(&scheduler, &barrier, &dma, &mut engine);

        let mut units = Vec::with_capacity(results.len());
        let mut failure = None;
        let mut cancelled = None;
        for result in results {
            match result {
                Ok(report) => units.push(report),
                Err(e @ SnaxError::Cancelled { .. }) => {
                    cancelled.get_or_insert(e);
                }
                Err(e) => {
                    failure.get_or_insert(e);
                }
            }
        }
        if let Some(e) = failure.or(cancelled) {
            return Err(e);
        }
        if let Some(e) = dma.take_fault() {
            return Err(e);
        }

        let output = memory.read_words(backing.o, len)?;
        let verification = Verification::check(&output, dataset, engine.kernel());
        let report = PipelineReport {
            kernel: name,
            tiles: scheduler.plan().tiles(),
            iterations: scheduler.plan().iterations(),
            depth: scheduler.plan().depth(),
            output,
            verification,
            launches: engine.device().launches(),
            transfers: dma.issued(),
            units,
        };
        info!(
            "{name}: {} tiles, {} launches, {} transfers, {} mismatches",
            report.tiles,
            report.launches,
            report.transfers,
            report.verification.total()
        );
        Ok(report)
    }

    /// Single non-pipelined pass: load everything, compute once, store.
    ///
    /// # Errors
    ///
    /// See [`run`](Self::run).
    pub fn run_untiled<K: Offload>(
        &self,
        dataset: &Dataset,
        kernel: K,
        wait: WaitPolicy,
    ) -> Result<PipelineReport> {
        self.run(dataset, kernel, &PipelineConfig::untiled(dataset.len()).with_wait(wait))
    }

    fn run_units<K: Offload>(
        &self,
        scheduler: &TileScheduler,
        barrier: &Barrier,
        dma: &SoftwareDma,
        engine: &mut ComputeEngine<SoftwareAccelerator, K>,
    ) -> Vec<Result<UnitReport>> {
        let mut engine = Some(engine);
        std::thread::scope(|s| {
            let handles: Vec<_> = self
                .topology
                .units()
                .map(|unit| {
                    let role = scheduler.roles().role_of(unit);
                    let engine = if role == Role::Compute { engine.take() } else { None };
                    let dma = (role == Role::DataMover).then_some(dma);
                    let handle = s.spawn(move || {
                        let flushing = FlushingBarrier::new(barrier, dma);
                        let ports = UnitPorts {
                            barrier: &flushing,
                            dma: dma.map(|d| d as &dyn TransferEngine),
                            engine,
                        };
                        scheduler.run_unit(unit, ports)
                    });
                    (unit, handle)
                })
                .collect();

            handles
                .into_iter()
                .map(|(unit, handle)| {
                    handle.join().unwrap_or_else(|_| {
                        Err(SnaxError::device_fault(format!("unit {unit} panicked")))
                    })
                })
                .collect()
        })
    }
}

impl Default for SoftwareCluster {
    fn default() -> Self {
        Self::snax_default()
    }
}
