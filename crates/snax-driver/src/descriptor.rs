// SPDX-License-Identifier: AGPL-3.0-only

//! Device descriptors
//!
//! A descriptor is one configuration transaction: an ordered list of register
//! writes whose last entry is always the start register. Everything before
//! the start write may land in any order; the start write commits.

use crate::device::RegisterMap;
use crate::error::{Result, SnaxError};

/// One register write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterWrite {
    /// Register address
    pub addr: u32,
    /// Value written
    pub value: u32,
}

/// Ordered register writes ending in the start write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceDescriptor {
    writes: Vec<RegisterWrite>,
}

impl DeviceDescriptor {
    /// All writes, start write last.
    pub fn writes(&self) -> &[RegisterWrite] {
        &self.writes
    }

    /// Configuration writes (everything but the start write).
    pub fn config_writes(&self) -> &[RegisterWrite] {
        &self.writes[..self.writes.len() - 1]
    }

    /// The start write.
    pub fn start(&self) -> RegisterWrite {
        // build() always pushes the start write
        self.writes[self.writes.len() - 1]
    }

    /// Value written to `addr`, if any.
    pub fn value_of(&self, addr: u32) -> Option<u32> {
        self.writes.iter().find(|w| w.addr == addr).map(|w| w.value)
    }

    /// Number of writes, start included.
    pub fn len(&self) -> usize {
        self.writes.len()
    }

    /// Never true: a descriptor always carries its start write.
    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }
}

/// Assembles a [`DeviceDescriptor`] for one accelerator.
///
/// Writes keep the order they were added in: base addresses, shapes and
/// strides as the caller lists them, then the start write.
#[derive(Debug, Clone)]
pub struct DescriptorBuilder {
    map: RegisterMap,
    writes: Vec<RegisterWrite>,
}

impl DescriptorBuilder {
    /// Start a descriptor for the device described by `map`.
    pub const fn new(map: RegisterMap) -> Self {
        Self {
            map,
            writes: Vec::new(),
        }
    }

    /// Operand base address.
    #[must_use]
    pub fn base_addr(self, reg: u32, addr: u32) -> Self {
        self.write(reg, addr)
    }

    /// Shape parameter (length, loop bound, iteration count).
    #[must_use]
    pub fn shape(self, reg: u32, value: u32) -> Self {
        self.write(reg, value)
    }

    /// Stride parameter.
    #[must_use]
    pub fn stride(self, reg: u32, value: u32) -> Self {
        self.write(reg, value)
    }

    /// Any other configuration register (mode bits, streamer commit).
    #[must_use]
    pub fn write(mut self, reg: u32, value: u32) -> Self {
        self.writes.push(RegisterWrite { addr: reg, value });
        self
    }

    /// Finish the descriptor, appending the start write.
    ///
    /// # Errors
    ///
    /// Returns error if no configuration was given, a register is written
    /// twice, or a configuration entry targets a control register.
    pub fn build(self) -> Result<DeviceDescriptor> {
        if self.writes.is_empty() {
            return Err(SnaxError::invalid_descriptor(format!(
                "{}: descriptor has no configuration writes",
                self.map.name
            )));
        }
        for (i, w) in self.writes.iter().enumerate() {
            if self.map.is_control(w.addr) {
                return Err(SnaxError::invalid_descriptor(format!(
                    "{}: register {:#x} is a control register",
                    self.map.name, w.addr
                )));
            }
            if self.writes[..i].iter().any(|p| p.addr == w.addr) {
                return Err(SnaxError::invalid_descriptor(format!(
                    "{}: register {:#x} written twice",
                    self.map.name, w.addr
                )));
            }
        }

        let mut writes = self.writes;
        writes.push(RegisterWrite {
            addr: self.map.start,
            value: self.map.start_value,
        });
        Ok(DeviceDescriptor { writes })
    }
}

/// Build a descriptor from `(register, value)` lists of base addresses,
/// shape parameters and strides, in that order.
///
/// # Errors
///
/// See [`DescriptorBuilder::build`].
pub fn build(
    map: RegisterMap,
    base_addrs: &[(u32, u32)],
    shape_params: &[(u32, u32)],
    stride_params: &[(u32, u32)],
) -> Result<DeviceDescriptor> {
    let mut b = DescriptorBuilder::new(map);
    for &(reg, addr) in base_addrs {
        b = b.base_addr(reg, addr);
    }
    for &(reg, v) in shape_params {
        b = b.shape(reg, v);
    }
    for &(reg, v) in stride_params {
        b = b.stride(reg, v);
    }
    b.build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use snax_chip::regs::alu;

    #[test]
    fn start_is_always_last() {
        let d = build(
            RegisterMap::SNAX_ALU,
            &[(alu::PTR_A, 0x100), (alu::PTR_B, 0x200), (alu::PTR_O, 0x300)],
            &[(alu::LOOP_BOUND, 8), (alu::LENGTH, 8)],
            &[(alu::TSTRIDE_A, 4)],
        )
        .unwrap();
        assert_eq!(d.len(), 7);
        assert_eq!(d.start().addr, alu::START);
        assert_eq!(d.config_writes().len(), 6);
        assert!(d.config_writes().iter().all(|w| w.addr != alu::START));
    }

    #[test]
    fn build_is_deterministic() {
        let mk = || {
            build(
                RegisterMap::SNAX_ALU,
                &[(alu::PTR_A, 0x100)],
                &[(alu::LENGTH, 4)],
                &[],
            )
            .unwrap()
        };
        assert_eq!(mk(), mk());
    }

    #[test]
    fn order_is_preserved() {
        let d = DescriptorBuilder::new(RegisterMap::SNAX_ALU)
            .base_addr(alu::PTR_B, 2)
            .base_addr(alu::PTR_A, 1)
            .shape(alu::LENGTH, 3)
            .build()
            .unwrap();
        let addrs: Vec<u32> = d.writes().iter().map(|w| w.addr).collect();
        assert_eq!(addrs, vec![alu::PTR_B, alu::PTR_A, alu::LENGTH, alu::START]);
        assert_eq!(d.value_of(alu::PTR_A), Some(1));
    }

    #[test]
    fn control_registers_rejected() {
        for reg in [alu::START, alu::BUSY] {
            let err = DescriptorBuilder::new(RegisterMap::SNAX_ALU)
                .write(reg, 1)
                .build()
                .unwrap_err();
            assert!(err.is_configuration_error());
        }
    }

    #[test]
    fn duplicates_and_empty_rejected() {
        assert!(DescriptorBuilder::new(RegisterMap::SNAX_ALU).build().is_err());
        assert!(DescriptorBuilder::new(RegisterMap::SNAX_ALU)
            .shape(alu::LENGTH, 1)
            .shape(alu::LENGTH, 2)
            .build()
            .is_err());
    }
}
