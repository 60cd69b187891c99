// SPDX-License-Identifier: AGPL-3.0-only

//! Software platform models
//!
//! Host-side stand-ins for the three platform primitives of a cluster:
//!
//! - [`SoftwareDma`]: queues transfers and performs them when its unit
//!   reaches the barrier, so a transfer is never visible before the barrier
//!   that follows it.
//! - [`FlushingBarrier`]: a `std::sync::Barrier` that first drains the
//!   unit's DMA queue.
//! - [`SoftwareAccelerator`]: a register file that computes the configured
//!   kernel on start, then reports busy for a number of polls. It can be
//!   made to never finish.

use super::memory::SimMemory;
use crate::barrier::ClusterBarrier;
use crate::device::{RegisterBus, RegisterMap};
use crate::error::{Result, SnaxError};
use crate::kernels::AluMode;
use crate::scheduler::ELEMENT_BYTES;
use crate::transfer::{Transfer, TransferEngine, TransferId};
use snax_chip::regs::{alu, mac};
use snax_chip::tcdm;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Barrier, Mutex};
use tracing::{debug, warn};

// ── DMA ──────────────────────────────────────────────────────────────────────

/// Transfer engine over [`SimMemory`] with barrier-deferred completion.
#[derive(Debug)]
pub struct SoftwareDma {
    memory: Arc<SimMemory>,
    pending: Mutex<Vec<Transfer>>,
    issued: AtomicU32,
    fault: Mutex<Option<SnaxError>>,
}

impl SoftwareDma {
    /// Engine copying inside `memory`.
    pub fn new(memory: Arc<SimMemory>) -> Self {
        Self {
            memory,
            pending: Mutex::new(Vec::new()),
            issued: AtomicU32::new(0),
            fault: Mutex::new(None),
        }
    }

    /// Transfers started so far.
    pub fn issued(&self) -> u32 {
        self.issued.load(Ordering::Relaxed)
    }

    /// Transfers started but not yet performed.
    pub fn pending(&self) -> usize {
        self.pending.lock().map_or(0, |p| p.len())
    }

    /// Perform every queued transfer in issue order.
    ///
    /// # Errors
    ///
    /// Returns the first copy error; later transfers of the batch are dropped.
    pub fn flush(&self) -> Result<usize> {
        let batch = {
            let mut pending = self
                .pending
                .lock()
                .map_err(|_| SnaxError::transfer_failed("DMA queue poisoned"))?;
            std::mem::take(&mut *pending)
        };
        for t in &batch {
            self.memory.copy(t.dst, t.src, t.len)?;
        }
        if !batch.is_empty() {
            debug!("DMA: {} transfers landed", batch.len());
        }
        Ok(batch.len())
    }

    /// First flush error seen by a [`FlushingBarrier`], if any.
    pub fn take_fault(&self) -> Option<SnaxError> {
        self.fault.lock().ok().and_then(|mut f| f.take())
    }

    fn record_fault(&self, err: SnaxError) {
        if let Ok(mut f) = self.fault.lock() {
            f.get_or_insert(err);
        }
    }
}

impl TransferEngine for SoftwareDma {
    fn start_transfer(&self, dst: u32, src: u32, len: usize) -> Result<TransferId> {
        for (side, addr) in [("source", src), ("destination", dst)] {
            if !self.memory.contains(addr, len) {
                return Err(SnaxError::transfer_failed(format!(
                    "{side} {addr:#010x} (+{len} bytes) not mapped"
                )));
            }
        }
        self.pending
            .lock()
            .map_err(|_| SnaxError::transfer_failed("DMA queue poisoned"))?
            .push(Transfer { dst, src, len });
        let id = self.issued.fetch_add(1, Ordering::Relaxed);
        Ok(TransferId::new(id))
    }
}

// ── Barrier ──────────────────────────────────────────────────────────────────

/// Cluster barrier that lands the unit's outstanding transfers before
/// waiting for the other units.
#[derive(Debug)]
pub struct FlushingBarrier<'a> {
    barrier: &'a Barrier,
    dma: Option<&'a SoftwareDma>,
}

impl<'a> FlushingBarrier<'a> {
    /// Wrap `barrier`; `dma` is the unit's transfer engine, if it has one.
    pub const fn new(barrier: &'a Barrier, dma: Option<&'a SoftwareDma>) -> Self {
        Self { barrier, dma }
    }
}

impl ClusterBarrier for FlushingBarrier<'_> {
    fn barrier(&self) {
        if let Some(dma) = self.dma {
            if let Err(e) = dma.flush() {
                warn!("DMA flush failed: {e}");
                dma.record_fault(e);
            }
        }
        self.barrier.wait();
    }
}

// ── Accelerator ──────────────────────────────────────────────────────────────

/// Register interface the software accelerator presents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Personality {
    /// HWPE MAC
    Mac,
    /// Streamer ALU
    Alu,
}

impl Personality {
    /// Control registers of this personality.
    pub const fn register_map(self) -> RegisterMap {
        match self {
            Self::Mac => RegisterMap::SNAX_MAC,
            Self::Alu => RegisterMap::SNAX_ALU,
        }
    }

    /// Personality presenting `map`, if one exists.
    pub fn for_map(map: &RegisterMap) -> Option<Self> {
        [Self::Mac, Self::Alu]
            .into_iter()
            .find(|p| p.register_map() == *map)
    }
}

/// Behavioural accelerator model behind a [`RegisterBus`].
#[derive(Debug)]
pub struct SoftwareAccelerator {
    personality: Personality,
    memory: Arc<SimMemory>,
    regs: HashMap<u32, u32>,
    latency_polls: u32,
    busy_left: u32,
    running: bool,
    stuck: bool,
    launches: u64,
    elements: u64,
}

impl SoftwareAccelerator {
    /// Accelerator reading and writing operands in `memory`.
    pub fn new(personality: Personality, memory: Arc<SimMemory>) -> Self {
        Self {
            personality,
            memory,
            regs: HashMap::new(),
            latency_polls: 0,
            busy_left: 0,
            running: false,
            stuck: false,
            launches: 0,
            elements: 0,
        }
    }

    /// Report busy for `polls` status reads after each start.
    #[must_use]
    pub const fn with_latency_polls(mut self, polls: u32) -> Self {
        self.latency_polls = polls;
        self
    }

    /// Never report completion.
    #[must_use]
    pub const fn with_stuck(mut self, stuck: bool) -> Self {
        self.stuck = stuck;
        self
    }

    /// Personality presented.
    pub const fn personality(&self) -> Personality {
        self.personality
    }

    /// Starts accepted.
    pub const fn launches(&self) -> u64 {
        self.launches
    }

    fn reg(&self, addr: u32) -> u32 {
        self.regs.get(&addr).copied().unwrap_or(0)
    }

    fn execute(&mut self) -> Result<()> {
        match self.personality {
            Personality::Mac => {
                if self.reg(mac::MODE) != mac::mode::SIMPLE_MULT {
                    return Err(SnaxError::device_fault(format!(
                        "snax-mac: unsupported mode {}",
                        self.reg(mac::MODE)
                    )));
                }
                if self.reg(mac::ITERATIONS) != 1 {
                    return Err(SnaxError::device_fault(format!(
                        "snax-mac: unsupported iteration count {}",
                        self.reg(mac::ITERATIONS)
                    )));
                }
                let len = self.reg(mac::VECTOR_LEN) as usize;
                let (a, b, o) = (self.reg(mac::PTR_A), self.reg(mac::PTR_B), self.reg(mac::PTR_O));
                self.apply(a, b, o, len, u32::wrapping_mul)
            }
            Personality::Alu => {
                let mode = AluMode::from_register(self.reg(alu::MODE)).ok_or_else(|| {
                    SnaxError::device_fault(format!("snax-alu: unknown mode {}", self.reg(alu::MODE)))
                })?;
                let strides = [
                    alu::TSTRIDE_A,
                    alu::TSTRIDE_B,
                    alu::TSTRIDE_O,
                    alu::SSTRIDE_A,
                    alu::SSTRIDE_B,
                    alu::SSTRIDE_O,
                ];
                if let Some(&reg) = strides.iter().find(|&&r| self.reg(r) != alu::UNIT_STRIDE) {
                    return Err(SnaxError::device_fault(format!(
                        "snax-alu: stride register {reg:#x} = {}, only unit strides are modelled",
                        self.reg(reg)
                    )));
                }
                if self.reg(alu::LOOP_BOUND) != self.reg(alu::LENGTH) {
                    return Err(SnaxError::device_fault(format!(
                        "snax-alu: loop bound {} differs from length {}",
                        self.reg(alu::LOOP_BOUND),
                        self.reg(alu::LENGTH)
                    )));
                }
                let len = self.reg(alu::LENGTH) as usize;
                let (a, b, o) = (self.reg(alu::PTR_A), self.reg(alu::PTR_B), self.reg(alu::PTR_O));
                self.apply(a, b, o, len, move |x, y| mode.apply(x, y))
            }
        }
    }

    fn apply(&mut self, a: u32, b: u32, o: u32, len: usize, op: impl Fn(u32, u32) -> u32) -> Result<()> {
        let bytes = len * ELEMENT_BYTES;
        if let Some(&ptr) = [a, b, o].iter().find(|&&p| !tcdm::in_tcdm(p, bytes)) {
            return Err(SnaxError::device_fault(format!(
                "{}: operand {ptr:#010x} (+{bytes} bytes) outside the TCDM",
                self.personality.register_map().name
            )));
        }
        let xs = self.memory.read_words(a, len)?;
        let ys = self.memory.read_words(b, len)?;
        let out: Vec<u32> = xs.iter().zip(&ys).map(|(&x, &y)| op(x, y)).collect();
        self.memory.write_words(o, &out)?;
        self.elements += len as u64;
        Ok(())
    }
}

impl RegisterBus for SoftwareAccelerator {
    fn write_register(&mut self, addr: u32, value: u32) -> Result<()> {
        let map = self.personality.register_map();
        if addr == map.start {
            if self.running {
                return Err(SnaxError::device_fault(format!("{}: start while busy", map.name)));
            }
            self.execute()?;
            self.running = true;
            self.busy_left = self.latency_polls;
            self.launches += 1;
        } else if map.clear == Some(addr) {
            self.running = false;
        } else if addr == map.status {
            return Err(SnaxError::device_fault(format!(
                "{}: status register {addr:#x} is read-only",
                map.name
            )));
        } else {
            self.regs.insert(addr, value);
        }
        Ok(())
    }

    #[allow(clippy::cast_possible_truncation)]
    fn read_register(&mut self, addr: u32) -> Result<u32> {
        let map = self.personality.register_map();
        if addr == map.status {
            if !self.running {
                return Ok(0);
            }
            if self.stuck {
                return Ok(map.busy_mask);
            }
            if self.busy_left > 0 {
                self.busy_left -= 1;
                return Ok(map.busy_mask);
            }
            if map.clear.is_none() {
                self.running = false;
            }
            return Ok(0);
        }
        if self.personality == Personality::Alu && addr == alu::PERF {
            // free-running counter, wraps like the hardware one
            return Ok(self.elements as u32);
        }
        Ok(self.reg(addr))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::DescriptorBuilder;
    use crate::device::{CompletionStatus, DeviceHandle};
    use snax_chip::tcdm::{L3_BASE, TCDM_BASE};

    fn memory() -> Arc<SimMemory> {
        Arc::new(SimMemory::snax(256).unwrap())
    }

    #[test]
    fn transfers_land_only_on_flush() {
        let mem = memory();
        mem.write_words(L3_BASE, &[5, 6]).unwrap();
        let dma = SoftwareDma::new(Arc::clone(&mem));
        dma.start_transfer(TCDM_BASE, L3_BASE, 8).unwrap();
        assert_eq!(dma.pending(), 1);
        assert_eq!(mem.read_words(TCDM_BASE, 2).unwrap(), vec![0, 0]);
        assert_eq!(dma.flush().unwrap(), 1);
        assert_eq!(mem.read_words(TCDM_BASE, 2).unwrap(), vec![5, 6]);
        assert_eq!(dma.pending(), 0);
        assert_eq!(dma.issued(), 1);
    }

    #[test]
    fn unmapped_transfer_rejected_at_start() {
        let dma = SoftwareDma::new(memory());
        let err = dma.start_transfer(TCDM_BASE, 0x4000_0000, 4).unwrap_err();
        assert!(matches!(err, SnaxError::TransferFailed { .. }));
        assert_eq!(dma.pending(), 0);
    }

    #[test]
    fn flushing_barrier_drains_queue() {
        let mem = memory();
        mem.write_words(L3_BASE, &[9]).unwrap();
        let dma = SoftwareDma::new(Arc::clone(&mem));
        let barrier = Barrier::new(1);
        dma.start_transfer(TCDM_BASE, L3_BASE, 4).unwrap();
        FlushingBarrier::new(&barrier, Some(&dma)).barrier();
        assert_eq!(mem.read_words(TCDM_BASE, 1).unwrap(), vec![9]);
        assert!(dma.take_fault().is_none());
    }

    #[test]
    fn mac_model_multiplies_and_needs_clear() {
        let mem = memory();
        mem.write_words(TCDM_BASE, &[2, 3, 4, 5]).unwrap();
        let accel = SoftwareAccelerator::new(Personality::Mac, Arc::clone(&mem)).with_latency_polls(2);
        let mut dev = DeviceHandle::new(accel, RegisterMap::SNAX_MAC);
        let d = DescriptorBuilder::new(RegisterMap::SNAX_MAC)
            .base_addr(mac::PTR_A, TCDM_BASE)
            .base_addr(mac::PTR_B, TCDM_BASE + 8)
            .base_addr(mac::PTR_O, TCDM_BASE + 16)
            .shape(mac::ITERATIONS, 1)
            .shape(mac::VECTOR_LEN, 2)
            .write(mac::MODE, mac::mode::SIMPLE_MULT)
            .build()
            .unwrap();
        dev.start(&d).unwrap();
        assert_eq!(dev.poll().unwrap(), CompletionStatus::Busy);
        assert_eq!(dev.poll().unwrap(), CompletionStatus::Busy);
        assert_eq!(dev.poll().unwrap(), CompletionStatus::Done);
        dev.clear().unwrap();
        assert_eq!(mem.read_words(TCDM_BASE + 16, 2).unwrap(), vec![8, 15]);
        // a second launch is accepted after the clear
        dev.start(&d).unwrap();
    }

    #[test]
    fn unsupported_mode_faults_on_start() {
        let mut accel = SoftwareAccelerator::new(Personality::Mac, memory());
        accel.write_register(mac::MODE, 0).unwrap();
        accel.write_register(mac::ITERATIONS, 1).unwrap();
        assert!(matches!(
            accel.write_register(mac::START, 0),
            Err(SnaxError::DeviceFault { .. })
        ));
    }

    #[test]
    fn operands_must_sit_in_tcdm() {
        let mut accel = SoftwareAccelerator::new(Personality::Mac, memory());
        accel.write_register(mac::MODE, mac::mode::SIMPLE_MULT).unwrap();
        accel.write_register(mac::ITERATIONS, 1).unwrap();
        accel.write_register(mac::VECTOR_LEN, 2).unwrap();
        accel.write_register(mac::PTR_A, L3_BASE).unwrap();
        accel.write_register(mac::PTR_B, TCDM_BASE).unwrap();
        accel.write_register(mac::PTR_O, TCDM_BASE + 8).unwrap();
        assert!(accel.write_register(mac::START, 0).is_err());
        assert_eq!(accel.launches(), 0);
    }

    #[test]
    fn byte_strides_are_rejected() {
        let mut accel = SoftwareAccelerator::new(Personality::Alu, memory());
        for r in [alu::TSTRIDE_A, alu::TSTRIDE_B, alu::TSTRIDE_O, alu::SSTRIDE_A, alu::SSTRIDE_B, alu::SSTRIDE_O] {
            accel.write_register(r, 4).unwrap();
        }
        accel.write_register(alu::MODE, alu::mode::ADD).unwrap();
        accel.write_register(alu::PTR_A, TCDM_BASE).unwrap();
        accel.write_register(alu::PTR_B, TCDM_BASE).unwrap();
        accel.write_register(alu::PTR_O, TCDM_BASE).unwrap();
        assert!(matches!(
            accel.write_register(alu::START, 1),
            Err(SnaxError::DeviceFault { .. })
        ));
    }

    #[test]
    fn stuck_model_stays_busy() {
        let mut accel = SoftwareAccelerator::new(Personality::Alu, memory()).with_stuck(true);
        for r in [alu::TSTRIDE_A, alu::TSTRIDE_B, alu::TSTRIDE_O, alu::SSTRIDE_A, alu::SSTRIDE_B, alu::SSTRIDE_O] {
            accel.write_register(r, alu::UNIT_STRIDE).unwrap();
        }
        accel.write_register(alu::PTR_A, TCDM_BASE).unwrap();
        accel.write_register(alu::PTR_B, TCDM_BASE).unwrap();
        accel.write_register(alu::PTR_O, TCDM_BASE).unwrap();
        accel.write_register(alu::START, 1).unwrap();
        for _ in 0..100 {
            assert_eq!(accel.read_register(alu::BUSY).unwrap(), alu::BUSY_MASK);
        }
    }

    #[test]
    fn personality_follows_register_map() {
        assert_eq!(Personality::for_map(&RegisterMap::SNAX_MAC), Some(Personality::Mac));
        assert_eq!(Personality::for_map(&RegisterMap::SNAX_ALU), Some(Personality::Alu));
    }
}
