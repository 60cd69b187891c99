// SPDX-License-Identifier: AGPL-3.0-only

//! Offload kernels
//!
//! A kernel knows two things about its accelerator: which registers describe
//! one tile, and what the accelerator computes per element (used as the host
//! reference when verifying). The numeric work itself happens on the device.

use crate::descriptor::{DescriptorBuilder, DeviceDescriptor};
use crate::device::RegisterMap;
use crate::error::{Result, SnaxError};
use crate::scheduler::TileRegions;
use snax_chip::regs::{alu, mac};
use std::fmt::Debug;

/// Maps a tile's scratchpad placement onto one accelerator launch.
pub trait Offload: Debug + Send + Sync {
    /// Kernel name, for logs and reports.
    fn name(&self) -> &'static str;

    /// Control registers of the accelerator this kernel drives.
    fn register_map(&self) -> RegisterMap;

    /// Register writes that make the accelerator process `tile`.
    ///
    /// # Errors
    ///
    /// Returns error if the tile shape cannot be expressed in the registers.
    fn descriptor(&self, tile: &TileRegions) -> Result<DeviceDescriptor>;

    /// Host-side value the accelerator must produce for inputs `a` and `b`.
    fn reference(&self, a: u32, b: u32) -> u32;
}

fn reg_u32(what: &str, value: usize) -> Result<u32> {
    u32::try_from(value)
        .map_err(|_| SnaxError::invalid_descriptor(format!("{what} {value} exceeds 32 bits")))
}

/// HWPE MAC in simple-multiply mode: `o[i] = a[i] * b[i]`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MacMultiply;

impl Offload for MacMultiply {
    fn name(&self) -> &'static str {
        "mac-mult"
    }

    fn register_map(&self) -> RegisterMap {
        RegisterMap::SNAX_MAC
    }

    fn descriptor(&self, tile: &TileRegions) -> Result<DeviceDescriptor> {
        DescriptorBuilder::new(RegisterMap::SNAX_MAC)
            .base_addr(mac::PTR_A, tile.a)
            .base_addr(mac::PTR_B, tile.b)
            .base_addr(mac::PTR_O, tile.o)
            .shape(mac::ITERATIONS, 1)
            .shape(mac::VECTOR_LEN, reg_u32("vector length", tile.elements)?)
            .write(mac::MODE, mac::mode::SIMPLE_MULT)
            .build()
    }

    fn reference(&self, a: u32, b: u32) -> u32 {
        a.wrapping_mul(b)
    }
}

/// Operation of the streamer ALU.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AluMode {
    /// `a + b`
    Add,
    /// `a - b`
    Sub,
    /// `a * b`
    Mul,
    /// `a ^ b`
    Xor,
}

impl AluMode {
    /// Value of the mode register.
    pub const fn register_value(self) -> u32 {
        match self {
            Self::Add => alu::mode::ADD,
            Self::Sub => alu::mode::SUB,
            Self::Mul => alu::mode::MUL,
            Self::Xor => alu::mode::XOR,
        }
    }

    /// Decode a mode register value.
    pub const fn from_register(value: u32) -> Option<Self> {
        match value {
            alu::mode::ADD => Some(Self::Add),
            alu::mode::SUB => Some(Self::Sub),
            alu::mode::MUL => Some(Self::Mul),
            alu::mode::XOR => Some(Self::Xor),
            _ => None,
        }
    }

    /// Apply the operation with 32-bit wrap-around.
    pub const fn apply(self, a: u32, b: u32) -> u32 {
        match self {
            Self::Add => a.wrapping_add(b),
            Self::Sub => a.wrapping_sub(b),
            Self::Mul => a.wrapping_mul(b),
            Self::Xor => a ^ b,
        }
    }
}

/// Streamer-fed ALU: contiguous streams in, one operation per element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AluOffload {
    mode: AluMode,
}

impl AluOffload {
    /// ALU kernel running `mode`.
    pub const fn new(mode: AluMode) -> Self {
        Self { mode }
    }

    /// Operation performed.
    pub const fn mode(&self) -> AluMode {
        self.mode
    }
}

impl Offload for AluOffload {
    fn name(&self) -> &'static str {
        match self.mode {
            AluMode::Add => "alu-add",
            AluMode::Sub => "alu-sub",
            AluMode::Mul => "alu-mul",
            AluMode::Xor => "alu-xor",
        }
    }

    fn register_map(&self) -> RegisterMap {
        RegisterMap::SNAX_ALU
    }

    fn descriptor(&self, tile: &TileRegions) -> Result<DeviceDescriptor> {
        let len = reg_u32("loop bound", tile.elements)?;
        let stride = alu::UNIT_STRIDE;
        DescriptorBuilder::new(RegisterMap::SNAX_ALU)
            .shape(alu::LOOP_BOUND, len)
            .stride(alu::TSTRIDE_A, stride)
            .stride(alu::TSTRIDE_B, stride)
            .stride(alu::TSTRIDE_O, stride)
            .stride(alu::SSTRIDE_A, stride)
            .stride(alu::SSTRIDE_B, stride)
            .stride(alu::SSTRIDE_O, stride)
            .base_addr(alu::PTR_A, tile.a)
            .base_addr(alu::PTR_B, tile.b)
            .base_addr(alu::PTR_O, tile.o)
            .write(alu::STREAMER_COMMIT, 1)
            .write(alu::MODE, self.mode.register_value())
            .shape(alu::LENGTH, len)
            .build()
    }

    fn reference(&self, a: u32, b: u32) -> u32 {
        self.mode.apply(a, b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tile() -> TileRegions {
        TileRegions {
            index: 3,
            a: 0x1000_0000,
            b: 0x1000_0020,
            o: 0x1000_0040,
            elements: 4,
            element_bytes: 4,
        }
    }

    #[test]
    fn mac_descriptor_matches_register_map() {
        let d = MacMultiply.descriptor(&tile()).unwrap();
        assert_eq!(d.value_of(mac::PTR_A), Some(0x1000_0000));
        assert_eq!(d.value_of(mac::PTR_B), Some(0x1000_0020));
        assert_eq!(d.value_of(mac::PTR_O), Some(0x1000_0040));
        assert_eq!(d.value_of(mac::VECTOR_LEN), Some(4));
        assert_eq!(d.value_of(mac::MODE), Some(mac::mode::SIMPLE_MULT));
        assert_eq!(d.start().addr, mac::START);
    }

    #[test]
    fn alu_descriptor_sets_streamer_then_alu() {
        let d = AluOffload::new(AluMode::Xor).descriptor(&tile()).unwrap();
        let addrs: Vec<u32> = d.writes().iter().map(|w| w.addr).collect();
        let commit = addrs.iter().position(|&a| a == alu::STREAMER_COMMIT).unwrap();
        let mode = addrs.iter().position(|&a| a == alu::MODE).unwrap();
        assert!(commit < mode);
        assert_eq!(d.value_of(alu::MODE), Some(alu::mode::XOR));
        assert_eq!(d.start().addr, alu::START);
    }

    #[test]
    fn alu_strides_count_elements() {
        let d = AluOffload::new(AluMode::Add).descriptor(&tile()).unwrap();
        for r in [alu::TSTRIDE_A, alu::TSTRIDE_B, alu::TSTRIDE_O, alu::SSTRIDE_A, alu::SSTRIDE_B, alu::SSTRIDE_O] {
            assert_eq!(d.value_of(r), Some(alu::UNIT_STRIDE), "register {r:#x}");
        }
        assert_eq!(d.value_of(alu::LOOP_BOUND), Some(4));
    }

    #[test]
    fn references_wrap() {
        assert_eq!(MacMultiply.reference(0x1_0000, 0x1_0000), 0);
        assert_eq!(AluOffload::new(AluMode::Sub).reference(1, 2), u32::MAX);
        assert_eq!(AluOffload::new(AluMode::Add).reference(u32::MAX, 1), 0);
    }

    #[test]
    fn alu_mode_register_round_trip() {
        for m in [AluMode::Add, AluMode::Sub, AluMode::Mul, AluMode::Xor] {
            assert_eq!(AluMode::from_register(m.register_value()), Some(m));
        }
        assert_eq!(AluMode::from_register(9), None);
    }
}
