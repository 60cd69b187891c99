// SPDX-License-Identifier: AGPL-3.0-only

//! Accelerator device handle
//!
//! A [`DeviceHandle`] owns the register bus of one accelerator instance
//! together with its [`RegisterMap`]. All register traffic goes through its
//! typed methods, which also enforce the device lifecycle:
//!
//! ```text
//!          configure()          launch()           poll() == Done
//!   Idle ─────────────▶ Configured ───────▶ Running ───────────────▶ Done
//!    ▲                                                                 │
//!    └──────────────────────────── clear() ────────────────────────────┘
//! ```

use crate::descriptor::DeviceDescriptor;
use crate::error::{Result, SnaxError};
use snax_chip::regs;
use std::fmt::Debug;
use tracing::debug;

/// Raw register access for one accelerator.
///
/// Addresses are whatever the bus decodes: CSR numbers on the core's
/// accelerator port, byte offsets inside a mapped window, or keys of a
/// software register file.
pub trait RegisterBus: Debug + Send {
    /// Write one 32-bit register.
    ///
    /// # Errors
    ///
    /// Returns error if the address is not decoded or the device rejects the write.
    fn write_register(&mut self, addr: u32, value: u32) -> Result<()>;

    /// Read one 32-bit register.
    ///
    /// # Errors
    ///
    /// Returns error if the address is not decoded.
    fn read_register(&mut self, addr: u32) -> Result<u32>;
}

/// Control registers of one accelerator type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterMap {
    /// Accelerator name, for logs
    pub name: &'static str,
    /// Register whose write commits the configuration and starts execution
    pub start: u32,
    /// Value written to `start`
    pub start_value: u32,
    /// Status register polled for completion
    pub status: u32,
    /// Status bits meaning "busy"
    pub busy_mask: u32,
    /// Status bits meaning "failed" (0 if the device has none)
    pub error_mask: u32,
    /// Register written after completion to return to idle, if required
    pub clear: Option<u32>,
}

impl RegisterMap {
    /// HWPE MAC: start `0x3c0`, busy `0x3c3`, software clear `0x3c5`.
    pub const SNAX_MAC: Self = Self {
        name: "snax-mac",
        start: regs::mac::START,
        start_value: 0,
        status: regs::mac::BUSY,
        busy_mask: regs::mac::BUSY_MASK,
        error_mask: 0,
        clear: Some(regs::mac::CLEAR),
    };

    /// Streamer ALU: start `0x3de`, busy `0x3df`, no clear.
    pub const SNAX_ALU: Self = Self {
        name: "snax-alu",
        start: regs::alu::START,
        start_value: 1,
        status: regs::alu::BUSY,
        busy_mask: regs::alu::BUSY_MASK,
        error_mask: 0,
        clear: None,
    };

    /// True if `addr` is one of the control registers (start, status, clear).
    pub fn is_control(&self, addr: u32) -> bool {
        addr == self.start || addr == self.status || self.clear == Some(addr)
    }
}

/// Completion state derived from one status read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionStatus {
    /// Device still running
    Busy,
    /// Device finished
    Done,
}

impl CompletionStatus {
    /// True while the device is still running.
    pub const fn is_busy(self) -> bool {
        matches!(self, Self::Busy)
    }
}

/// Lifecycle state tracked by the handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceState {
    /// Ready for a new configuration
    Idle,
    /// Configuration written, not started
    Configured,
    /// Started, completion not yet observed
    Running,
    /// Completion observed, clear pending
    Done,
}

/// Capability object for one accelerator instance.
#[derive(Debug)]
pub struct DeviceHandle<B: RegisterBus> {
    bus: B,
    map: RegisterMap,
    state: DeviceState,
    launches: u64,
}

impl<B: RegisterBus> DeviceHandle<B> {
    /// Wrap a register bus with the map of the accelerator behind it.
    pub const fn new(bus: B, map: RegisterMap) -> Self {
        Self {
            bus,
            map,
            state: DeviceState::Idle,
            launches: 0,
        }
    }

    /// Register map of this device.
    pub const fn map(&self) -> &RegisterMap {
        &self.map
    }

    /// Current lifecycle state.
    pub const fn state(&self) -> DeviceState {
        self.state
    }

    /// Number of completed launches.
    pub const fn launches(&self) -> u64 {
        self.launches
    }

    /// Borrow the underlying bus.
    pub const fn bus(&self) -> &B {
        &self.bus
    }

    /// Release the underlying bus.
    pub fn into_bus(self) -> B {
        self.bus
    }

    /// Write every configuration entry of `descriptor` (all but the start write).
    ///
    /// # Errors
    ///
    /// Returns error if the device is not idle, the descriptor was built for
    /// another start register, or a register write fails.
    pub fn configure(&mut self, descriptor: &DeviceDescriptor) -> Result<()> {
        self.expect_state(DeviceState::Idle, "configure")?;
        let start = descriptor.start();
        if start.addr != self.map.start {
            return Err(SnaxError::invalid_descriptor(format!(
                "descriptor starts {:#x}, {} starts at {:#x}",
                start.addr, self.map.name, self.map.start
            )));
        }
        for w in descriptor.config_writes() {
            self.bus.write_register(w.addr, w.value)?;
        }
        self.state = DeviceState::Configured;
        Ok(())
    }

    /// Commit the configuration by writing the start register.
    ///
    /// # Errors
    ///
    /// Returns error if the device is not configured or the write fails.
    pub fn launch(&mut self) -> Result<()> {
        self.expect_state(DeviceState::Configured, "launch")?;
        self.bus.write_register(self.map.start, self.map.start_value)?;
        self.state = DeviceState::Running;
        debug!("{}: launched", self.map.name);
        Ok(())
    }

    /// Configure and launch: the full ordered write sequence of `descriptor`.
    ///
    /// # Errors
    ///
    /// See [`configure`](Self::configure) and [`launch`](Self::launch).
    pub fn start(&mut self, descriptor: &DeviceDescriptor) -> Result<()> {
        self.configure(descriptor)?;
        self.launch()
    }

    /// Read the status register once.
    ///
    /// # Errors
    ///
    /// Returns error if the device was not started, the read fails, or the
    /// status reports an error.
    pub fn poll(&mut self) -> Result<CompletionStatus> {
        match self.state {
            DeviceState::Running => {}
            DeviceState::Done => return Ok(CompletionStatus::Done),
            other => {
                return Err(SnaxError::device_fault(format!(
                    "{}: poll while {other:?}",
                    self.map.name
                )))
            }
        }
        let status = self.bus.read_register(self.map.status)?;
        if status & self.map.error_mask != 0 {
            return Err(SnaxError::device_fault(format!(
                "{}: error status {status:#x}",
                self.map.name
            )));
        }
        if status & self.map.busy_mask != 0 {
            return Ok(CompletionStatus::Busy);
        }
        self.state = DeviceState::Done;
        self.launches += 1;
        Ok(CompletionStatus::Done)
    }

    /// Return a finished device to idle, writing the clear register if the
    /// device has one.
    ///
    /// # Errors
    ///
    /// Returns error if completion has not been observed or the write fails.
    pub fn clear(&mut self) -> Result<()> {
        self.expect_state(DeviceState::Done, "clear")?;
        if let Some(reg) = self.map.clear {
            self.bus.write_register(reg, 0)?;
        }
        self.state = DeviceState::Idle;
        Ok(())
    }

    fn expect_state(&self, want: DeviceState, op: &str) -> Result<()> {
        if self.state == want {
            Ok(())
        } else {
            Err(SnaxError::device_fault(format!(
                "{}: cannot {op} while {:?}",
                self.map.name, self.state
            )))
        }
    }
}
