// SPDX-License-Identifier: AGPL-3.0-only

//! Three-stage tile pipeline
//!
//! A dataset of `n` tiles is processed in `n + 2` iterations. In each
//! iteration the data mover loads the next tile and stores the oldest
//! finished one while the compute unit runs the accelerator on the tile
//! loaded one iteration earlier:
//!
//! ```text
//! iteration   0     1     2     3    ...   n     n+1
//! Load        t0    t1    t2    t3         -     -
//! Compute     -     t0    t1    t2         tn-1  -
//! Store       -     -     t0    t1         tn-2  tn-1
//!             ╞═════╪═════╪═════╪═══ barrier after every iteration ═══╡
//! ```
//!
//! Every unit calls the barrier once per iteration whatever its role, which
//! is what makes a transfer started in iteration `i` safe to read in
//! iteration `i + 1`.

use crate::barrier::{CancelToken, ClusterBarrier};
use crate::completion::{Completion, CompletionWaiter, WaitPolicy};
use crate::device::{DeviceHandle, RegisterBus};
use crate::error::{Result, SnaxError};
use crate::kernels::Offload;
use crate::role::{ClusterTopology, Role, RoleDispatcher, UnitId};
use crate::scratchpad::{OperandSpec, ScratchpadAllocator, ScratchpadLayout, ScratchpadRegion};
use crate::transfer::TransferEngine;
use snax_chip::cluster::PIPELINE_STAGES;
use std::panic::{self, AssertUnwindSafe};
use tracing::{debug, info, warn};

/// Number of pipeline stages (Load, Compute, Store).
pub const PIPELINE_DEPTH: usize = PIPELINE_STAGES;

/// Size of one vector element in bytes.
pub const ELEMENT_BYTES: usize = 4;

// ── Configuration ────────────────────────────────────────────────────────────

/// How many scratchpad slots each operand gets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum BufferDepth {
    /// One slot per operand. Only valid for a single tile.
    Single,
    /// Two slots per operand, alternating between even and odd tiles.
    #[default]
    Double,
    /// One slot per tile: the whole dataset stays resident.
    Resident,
}

impl BufferDepth {
    /// Slots per operand for a run of `tiles` tiles.
    pub const fn slots(self, tiles: usize) -> usize {
        match self {
            Self::Single => 1,
            Self::Double => if tiles < 2 { tiles } else { 2 },
            Self::Resident => tiles,
        }
    }
}

impl std::fmt::Display for BufferDepth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Single => write!(f, "single"),
            Self::Double => write!(f, "double"),
            Self::Resident => write!(f, "resident"),
        }
    }
}

/// Pipeline parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Elements per tile
    pub tile_len: usize,
    /// Scratchpad slots per operand
    pub depth: BufferDepth,
    /// Completion wait bounds for each launch
    pub wait: WaitPolicy,
}

impl PipelineConfig {
    /// Double-buffered pipeline over tiles of `tile_len` elements.
    pub fn new(tile_len: usize) -> Self {
        Self {
            tile_len,
            depth: BufferDepth::Double,
            wait: WaitPolicy::default(),
        }
    }

    /// Single pass over a whole `len`-element vector: one resident tile.
    pub fn untiled(len: usize) -> Self {
        Self {
            tile_len: len,
            depth: BufferDepth::Resident,
            wait: WaitPolicy::default(),
        }
    }

    /// Replace the buffer depth.
    #[must_use]
    pub const fn with_depth(mut self, depth: BufferDepth) -> Self {
        self.depth = depth;
        self
    }

    /// Replace the wait policy.
    #[must_use]
    pub const fn with_wait(mut self, wait: WaitPolicy) -> Self {
        self.wait = wait;
        self
    }
}

/// Addresses of the full A, B and O vectors in backing storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackingBuffers {
    /// First input
    pub a: u32,
    /// Second input
    pub b: u32,
    /// Output
    pub o: u32,
}

// ── Plan ─────────────────────────────────────────────────────────────────────

/// Which tile each stage works on in one iteration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Stages {
    /// Tile being loaded
    pub load: Option<usize>,
    /// Tile being computed
    pub compute: Option<usize>,
    /// Tile being stored
    pub store: Option<usize>,
}

/// Stage assignment of iteration `i` for a run of `tiles` tiles.
pub const fn stages_at(i: usize, tiles: usize) -> Stages {
    Stages {
        load: if i < tiles { Some(i) } else { None },
        compute: if i > 0 && i <= tiles { Some(i - 1) } else { None },
        store: if i > 1 && i < tiles + 2 { Some(i - 2) } else { None },
    }
}

/// Addresses of one tile's A, B and O data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileRegions {
    /// Tile index
    pub index: usize,
    /// First input
    pub a: u32,
    /// Second input
    pub b: u32,
    /// Output
    pub o: u32,
    /// Elements in the tile
    pub elements: usize,
    /// Bytes per element
    pub element_bytes: usize,
}

impl TileRegions {
    /// Bytes per operand.
    pub const fn bytes(&self) -> usize {
        self.elements * self.element_bytes
    }
}

/// Validated placement of a tiled run: tile shape, scratchpad slots and
/// backing addresses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TilePlan {
    dataset_len: usize,
    tile_len: usize,
    tiles: usize,
    depth: BufferDepth,
    slots: usize,
    layout: ScratchpadLayout,
    a: ScratchpadRegion,
    b: ScratchpadRegion,
    o: ScratchpadRegion,
    backing: BackingBuffers,
}

impl TilePlan {
    /// Build and check a plan. Everything that can be wrong with a run
    /// short of a device failure is reported here.
    ///
    /// # Errors
    ///
    /// Returns error if the tile length is zero or does not divide the
    /// dataset, the buffer depth is unsafe for the tile count, or the
    /// operand slots do not fit in the scratchpad.
    pub fn new(
        dataset_len: usize,
        config: &PipelineConfig,
        allocator: &ScratchpadAllocator,
        backing: BackingBuffers,
    ) -> Result<Self> {
        let tile_len = config.tile_len;
        if dataset_len == 0 || tile_len == 0 {
            return Err(SnaxError::invalid_plan(format!(
                "dataset length {dataset_len} and tile length {tile_len} must be non-zero"
            )));
        }
        if dataset_len % tile_len != 0 {
            return Err(SnaxError::invalid_plan(format!(
                "tile length {tile_len} does not divide dataset length {dataset_len}"
            )));
        }
        let tiles = dataset_len / tile_len;

        if config.depth == BufferDepth::Single && tiles > 1 {
            return Err(SnaxError::buffer_hazard(format!(
                "single buffering with {tiles} tiles: load of tile i overwrites the slot \
                 compute is reading for tile i-1"
            )));
        }

        let tile_bytes = tile_len.checked_mul(ELEMENT_BYTES).ok_or_else(|| {
            SnaxError::invalid_plan(format!("tile length {tile_len} overflows"))
        })?;
        for (name, addr) in [("a", backing.a), ("b", backing.b), ("o", backing.o)] {
            if addr as usize % ELEMENT_BYTES != 0 {
                return Err(SnaxError::misaligned(
                    format!("backing buffer {name}"),
                    u64::from(addr),
                    ELEMENT_BYTES,
                ));
            }
        }

        let slots = config.depth.slots(tiles);
        let slot_bytes = slots.checked_mul(tile_bytes).ok_or_else(|| {
            SnaxError::invalid_plan(format!("{slots} slots of {tile_bytes} bytes overflow"))
        })?;
        let layout = allocator.allocate(&[
            OperandSpec::new("a", slot_bytes),
            OperandSpec::new("b", slot_bytes),
            OperandSpec::new("o", slot_bytes),
        ])?;
        let region = |name: &str| {
            layout
                .get(name)
                .ok_or_else(|| SnaxError::invalid_plan(format!("operand {name} not placed")))
        };
        let (a, b, o) = (region("a")?, region("b")?, region("o")?);

        info!(
            "Tile plan: {dataset_len} elements, {tiles} tiles of {tile_len}, {} buffering ({slots} slots), {} of {} scratchpad bytes",
            config.depth,
            layout.used_bytes(),
            layout.capacity()
        );

        Ok(Self {
            dataset_len,
            tile_len,
            tiles,
            depth: config.depth,
            slots,
            layout,
            a,
            b,
            o,
            backing,
        })
    }

    /// Elements in the dataset.
    pub const fn dataset_len(&self) -> usize {
        self.dataset_len
    }

    /// Elements per tile.
    pub const fn tile_len(&self) -> usize {
        self.tile_len
    }

    /// Bytes per operand per tile.
    pub const fn tile_bytes(&self) -> usize {
        self.tile_len * ELEMENT_BYTES
    }

    /// Number of tiles.
    pub const fn tiles(&self) -> usize {
        self.tiles
    }

    /// Pipeline iterations, drain included.
    pub const fn iterations(&self) -> usize {
        self.tiles + PIPELINE_DEPTH - 1
    }

    /// Buffer depth in use.
    pub const fn depth(&self) -> BufferDepth {
        self.depth
    }

    /// Slots per operand.
    pub const fn slots(&self) -> usize {
        self.slots
    }

    /// Scratchpad layout of the operand slot arrays.
    pub const fn layout(&self) -> &ScratchpadLayout {
        &self.layout
    }

    /// Backing storage addresses.
    pub const fn backing(&self) -> BackingBuffers {
        self.backing
    }

    /// Stage assignment of iteration `i`.
    pub const fn stages(&self, i: usize) -> Stages {
        stages_at(i, self.tiles)
    }

    /// Scratchpad addresses of `tile`.
    ///
    /// # Errors
    ///
    /// Returns error if `tile` is not part of the plan.
    pub fn tile_regions(&self, tile: usize) -> Result<TileRegions> {
        self.check_tile(tile)?;
        let slot = tile % self.slots;
        let bytes = self.tile_bytes();
        Ok(TileRegions {
            index: tile,
            a: self.a.slot_addr(slot, bytes)?,
            b: self.b.slot_addr(slot, bytes)?,
            o: self.o.slot_addr(slot, bytes)?,
            elements: self.tile_len,
            element_bytes: ELEMENT_BYTES,
        })
    }

    /// Backing storage addresses of `tile`.
    ///
    /// # Errors
    ///
    /// Returns error if `tile` is not part of the plan or the address
    /// does not fit in 32 bits.
    pub fn backing_regions(&self, tile: usize) -> Result<TileRegions> {
        self.check_tile(tile)?;
        let offset = u32::try_from(tile * self.tile_bytes()).map_err(|_| SnaxError::AddressOutOfRange {
            addr: u64::from(self.backing.a),
            len: self.dataset_len * ELEMENT_BYTES,
        })?;
        let at = |base: u32| {
            base.checked_add(offset).ok_or(SnaxError::AddressOutOfRange {
                addr: u64::from(base) + u64::from(offset),
                len: self.tile_bytes(),
            })
        };
        Ok(TileRegions {
            index: tile,
            a: at(self.backing.a)?,
            b: at(self.backing.b)?,
            o: at(self.backing.o)?,
            elements: self.tile_len,
            element_bytes: ELEMENT_BYTES,
        })
    }

    fn check_tile(&self, tile: usize) -> Result<()> {
        if tile < self.tiles {
            Ok(())
        } else {
            Err(SnaxError::invalid_plan(format!(
                "tile {tile} out of range (plan has {})",
                self.tiles
            )))
        }
    }
}

// ── Compute engine ───────────────────────────────────────────────────────────

/// Device, kernel and wait bounds owned by the compute unit.
#[derive(Debug)]
pub struct ComputeEngine<B: RegisterBus, K: Offload> {
    device: DeviceHandle<B>,
    kernel: K,
    waiter: CompletionWaiter,
}

impl<B: RegisterBus, K: Offload> ComputeEngine<B, K> {
    /// Pair a device with the kernel that drives it.
    ///
    /// # Errors
    ///
    /// Returns error if the kernel was written for another accelerator.
    pub fn new(device: DeviceHandle<B>, kernel: K, waiter: CompletionWaiter) -> Result<Self> {
        if *device.map() != kernel.register_map() {
            return Err(SnaxError::invalid_plan(format!(
                "kernel {} drives {}, device is {}",
                kernel.name(),
                kernel.register_map().name,
                device.map().name
            )));
        }
        Ok(Self { device, kernel, waiter })
    }

    /// Describe, start and wait for one tile.
    ///
    /// # Errors
    ///
    /// Returns error if the descriptor is rejected, the device faults, or
    /// completion is not seen within the wait policy.
    pub fn run_tile(&mut self, tile: &TileRegions) -> Result<Completion> {
        let descriptor = self.kernel.descriptor(tile)?;
        self.device.start(&descriptor)?;
        self.waiter.wait(&mut self.device)
    }

    /// Device handle.
    pub const fn device(&self) -> &DeviceHandle<B> {
        &self.device
    }

    /// Kernel.
    pub const fn kernel(&self) -> &K {
        &self.kernel
    }

    /// Release the device handle.
    pub fn into_device(self) -> DeviceHandle<B> {
        self.device
    }
}

// ── Scheduler ────────────────────────────────────────────────────────────────

/// Pipeline stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Inputs copied into the scratchpad
    Load,
    /// Accelerator run on scratchpad data
    Compute,
    /// Output copied back to backing storage
    Store,
}

/// One unit of stage work performed by a unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageEvent {
    /// Iteration the work belongs to
    pub iteration: usize,
    /// Stage performed
    pub stage: Stage,
    /// Tile processed
    pub tile: usize,
}

/// Platform resources one unit brings into a run.
///
/// The data mover needs `dma`, the compute unit needs `engine`; idle units
/// only need the barrier.
pub struct UnitPorts<'a, B: RegisterBus, K: Offload> {
    /// Cluster barrier
    pub barrier: &'a dyn ClusterBarrier,
    /// Transfer engine (data mover)
    pub dma: Option<&'a dyn TransferEngine>,
    /// Accelerator (compute unit)
    pub engine: Option<&'a mut ComputeEngine<B, K>>,
}

impl<'a, B: RegisterBus, K: Offload> UnitPorts<'a, B, K> {
    /// Ports of a unit that only synchronizes.
    pub fn idle(barrier: &'a dyn ClusterBarrier) -> Self {
        Self {
            barrier,
            dma: None,
            engine: None,
        }
    }
}

/// What one unit did during a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitReport {
    /// Unit
    pub unit: UnitId,
    /// Role it held
    pub role: Role,
    /// Stage work performed, in order
    pub events: Vec<StageEvent>,
    /// Barriers passed
    pub barriers: usize,
    /// Status polls spent waiting for the device
    pub polls: u64,
}

impl UnitReport {
    fn record(&mut self, iteration: usize, stage: Stage, tile: usize) {
        debug!("unit {}: iteration {iteration}: {stage:?} tile {tile}", self.unit);
        self.events.push(StageEvent { iteration, stage, tile });
    }

    /// Events of one stage, in order.
    pub fn stage_events(&self, stage: Stage) -> impl Iterator<Item = &StageEvent> + '_ {
        self.events.iter().filter(move |e| e.stage == stage)
    }
}

/// Runs the pipeline program on one unit.
///
/// Every unit of the cluster calls [`run_unit`](Self::run_unit) on the same
/// scheduler; the role dispatcher decides what each one does.
#[derive(Debug, Clone)]
pub struct TileScheduler {
    plan: TilePlan,
    roles: RoleDispatcher,
    cancel: CancelToken,
}

impl TileScheduler {
    /// Scheduler for `plan` on `topology`.
    pub fn new(plan: TilePlan, topology: ClusterTopology) -> Self {
        Self {
            plan,
            roles: RoleDispatcher::new(topology),
            cancel: CancelToken::new(),
        }
    }

    /// Share an externally owned cancel token.
    #[must_use]
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Plan being run.
    pub const fn plan(&self) -> &TilePlan {
        &self.plan
    }

    /// Role dispatcher.
    pub const fn roles(&self) -> &RoleDispatcher {
        &self.roles
    }

    /// Cancel token shared by all units.
    pub const fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    /// Run every iteration of the pipeline as `unit`.
    ///
    /// The unit passes exactly [`TilePlan::iterations`] barriers even when
    /// it fails or panics: the first error raises the cancel token, later
    /// stage work is skipped, and the error is returned after the last
    /// barrier.
    ///
    /// # Errors
    ///
    /// Returns the first error this unit hit, [`SnaxError::Cancelled`] if
    /// another unit cancelled the run, or an error if the unit lacks the
    /// port its role needs.
    pub fn run_unit<B: RegisterBus, K: Offload>(
        &self,
        unit: UnitId,
        mut ports: UnitPorts<'_, B, K>,
    ) -> Result<UnitReport> {
        let role = self.roles.role_of(unit);
        let mut report = UnitReport {
            unit,
            role,
            events: Vec::new(),
            barriers: 0,
            polls: 0,
        };

        let mut failure = Self::check_ports(unit, role, &ports).err();
        if failure.is_some() {
            self.cancel.cancel();
        }

        for i in 0..self.plan.iterations() {
            if failure.is_none() {
                if self.cancel.is_cancelled() {
                    debug!("unit {unit}: cancelled before iteration {i}");
                    failure = Some(SnaxError::Cancelled { iteration: i });
                } else if let Err(e) =
                    self.guarded_step(unit, i, role, &mut ports, &mut report)
                {
                    warn!("unit {unit} ({role}): iteration {i} failed: {e}");
                    self.cancel.cancel();
                    failure = Some(e);
                }
            }
            ports.barrier.barrier();
            report.barriers += 1;
        }

        match failure {
            Some(e) => Err(e),
            None => Ok(report),
        }
    }

    /// [`step`](Self::step) with a panic turned into a unit error, so the
    /// unit still reaches every remaining barrier.
    fn guarded_step<B: RegisterBus, K: Offload>(
        &self,
        unit: UnitId,
        iteration: usize,
        role: Role,
        ports: &mut UnitPorts<'_, B, K>,
        report: &mut UnitReport,
    ) -> Result<()> {
        panic::catch_unwind(AssertUnwindSafe(|| self.step(iteration, role, ports, report)))
            .unwrap_or_else(|_| {
                Err(SnaxError::device_fault(format!(
                    "unit {unit} panicked in iteration {iteration}"
                )))
            })
    }

    fn check_ports<B: RegisterBus, K: Offload>(
        unit: UnitId,
        role: Role,
        ports: &UnitPorts<'_, B, K>,
    ) -> Result<()> {
        match role {
            Role::DataMover if ports.dma.is_none() => Err(SnaxError::invalid_plan(format!(
                "unit {unit} is the data mover but has no transfer engine"
            ))),
            Role::Compute if ports.engine.is_none() => Err(SnaxError::invalid_plan(format!(
                "unit {unit} is the compute unit but has no device"
            ))),
            _ => Ok(()),
        }
    }

    fn step<B: RegisterBus, K: Offload>(
        &self,
        iteration: usize,
        role: Role,
        ports: &mut UnitPorts<'_, B, K>,
        report: &mut UnitReport,
    ) -> Result<()> {
        let stages = self.plan.stages(iteration);

        match role {
            Role::DataMover => {
                let Some(dma) = ports.dma else {
                    return Err(SnaxError::invalid_plan("data mover without transfer engine"));
                };
                if let Some(tile) = stages.load {
                    let dst = self.plan.tile_regions(tile)?;
                    let src = self.plan.backing_regions(tile)?;
                    dma.start_transfer(dst.a, src.a, dst.bytes())?;
                    dma.start_transfer(dst.b, src.b, dst.bytes())?;
                    report.record(iteration, Stage::Load, tile);
                }
                if let Some(tile) = stages.store {
                    let src = self.plan.tile_regions(tile)?;
                    let dst = self.plan.backing_regions(tile)?;
                    dma.start_transfer(dst.o, src.o, src.bytes())?;
                    report.record(iteration, Stage::Store, tile);
                }
            }
            Role::Compute => {
                if let Some(tile) = stages.compute {
                    let Some(engine) = ports.engine.as_deref_mut() else {
                        return Err(SnaxError::invalid_plan("compute unit without device"));
                    };
                    let regions = self.plan.tile_regions(tile)?;
                    let completion = engine.run_tile(&regions)?;
                    report.polls += completion.polls;
                    report.record(iteration, Stage::Compute, tile);
                }
            }
            Role::Idle => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use snax_chip::tcdm;

    const BACKING: BackingBuffers = BackingBuffers {
        a: tcdm::L3_BASE,
        b: tcdm::L3_BASE + 0x1000,
        o: tcdm::L3_BASE + 0x2000,
    };

    fn plan(len: usize, tile: usize, depth: BufferDepth) -> Result<TilePlan> {
        TilePlan::new(
            len,
            &PipelineConfig::new(tile).with_depth(depth),
            &ScratchpadAllocator::snax_tcdm(),
            BACKING,
        )
    }

    #[test]
    fn twenty_by_four_schedule() {
        let p = plan(20, 4, BufferDepth::Double).unwrap();
        assert_eq!(p.tiles(), 5);
        assert_eq!(p.iterations(), 7);
        let loads: Vec<usize> = (0..7).filter(|&i| p.stages(i).load.is_some()).collect();
        let computes: Vec<usize> = (0..7).filter(|&i| p.stages(i).compute.is_some()).collect();
        let stores: Vec<usize> = (0..7).filter(|&i| p.stages(i).store.is_some()).collect();
        assert_eq!(loads, vec![0, 1, 2, 3, 4]);
        assert_eq!(computes, vec![1, 2, 3, 4, 5]);
        assert_eq!(stores, vec![2, 3, 4, 5, 6]);
    }

    #[test]
    fn stages_advance_in_tile_order() {
        for tiles in 1..10 {
            let mut seen = (Vec::new(), Vec::new(), Vec::new());
            for i in 0..tiles + PIPELINE_DEPTH - 1 {
                let s = stages_at(i, tiles);
                if let (Some(l), Some(c)) = (s.load, s.compute) {
                    assert_eq!(l, c + 1);
                }
                if let (Some(c), Some(st)) = (s.compute, s.store) {
                    assert_eq!(c, st + 1);
                }
                seen.0.extend(s.load);
                seen.1.extend(s.compute);
                seen.2.extend(s.store);
            }
            let expected: Vec<usize> = (0..tiles).collect();
            assert_eq!(seen.0, expected);
            assert_eq!(seen.1, expected);
            assert_eq!(seen.2, expected);
        }
    }

    #[test]
    fn single_tile_schedule() {
        let p = plan(20, 20, BufferDepth::Single).unwrap();
        assert_eq!(p.iterations(), 3);
        assert_eq!(p.stages(0), Stages { load: Some(0), ..Stages::default() });
        assert_eq!(p.stages(1), Stages { compute: Some(0), ..Stages::default() });
        assert_eq!(p.stages(2), Stages { store: Some(0), ..Stages::default() });
    }

    #[test]
    fn single_buffering_many_tiles_is_a_hazard() {
        let err = plan(20, 4, BufferDepth::Single).unwrap_err();
        assert!(matches!(err, SnaxError::BufferHazard { .. }));
        assert!(err.is_configuration_error());
    }

    #[test]
    fn tile_must_divide_dataset() {
        assert!(matches!(
            plan(20, 3, BufferDepth::Double).unwrap_err(),
            SnaxError::InvalidPlan { .. }
        ));
        assert!(plan(20, 0, BufferDepth::Double).is_err());
        assert!(plan(0, 4, BufferDepth::Double).is_err());
    }

    #[test]
    fn double_buffering_alternates_slots() {
        let p = plan(20, 4, BufferDepth::Double).unwrap();
        let t0 = p.tile_regions(0).unwrap();
        let t1 = p.tile_regions(1).unwrap();
        let t2 = p.tile_regions(2).unwrap();
        assert_ne!(t0.a, t1.a);
        assert_eq!(t0.a, t2.a);
        assert_eq!(t1.a - t0.a, 16);
        // load(i) and compute(i-1) never share a slot
        for i in 1..p.tiles() {
            let load = p.tile_regions(i).unwrap();
            let compute = p.tile_regions(i - 1).unwrap();
            assert_ne!(load.a, compute.a);
            assert_ne!(load.b, compute.b);
        }
    }

    #[test]
    fn resident_gives_every_tile_its_own_slot() {
        let p = plan(20, 4, BufferDepth::Resident).unwrap();
        assert_eq!(p.slots(), 5);
        let addrs: Vec<u32> = (0..5).map(|t| p.tile_regions(t).unwrap().o).collect();
        for w in addrs.windows(2) {
            assert_eq!(w[1] - w[0], 16);
        }
    }

    #[test]
    fn backing_regions_are_contiguous() {
        let p = plan(20, 4, BufferDepth::Double).unwrap();
        let t3 = p.backing_regions(3).unwrap();
        assert_eq!(t3.a, BACKING.a + 48);
        assert_eq!(t3.o, BACKING.o + 48);
        assert!(p.backing_regions(5).is_err());
    }

    #[test]
    fn oversized_plan_overflows_scratchpad() {
        let alloc = ScratchpadAllocator::with_alignment(0x1000_0000, 256, 8).unwrap();
        let err = TilePlan::new(
            64,
            &PipelineConfig::new(16),
            &alloc,
            BACKING,
        )
        .unwrap_err();
        assert!(matches!(err, SnaxError::ScratchpadOverflow { requested: 384, capacity: 256 }));
    }
}
