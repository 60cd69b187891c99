// SPDX-License-Identifier: AGPL-3.0-only

//! Scratchpad placement
//!
//! Lays operand buffers out back to back inside the TCDM, in the order they
//! are declared, padding only to reach the next alignment boundary:
//!
//! ```text
//! base                                                       base + capacity
//! ├── A ──────┤pad├── B ──────┤pad├── O ──────┤··· unused ···┤
//! ```
//!
//! Placement is a pure function of the operand sizes. Overflow is reported
//! when the plan is built so no pipeline ever starts with a layout that does
//! not fit.

use crate::error::{Result, SnaxError};
use snax_chip::tcdm;
use tracing::debug;

/// One operand buffer inside local memory.
///
/// Opaque handle: callers get addresses through [`addr`](Self::addr) and
/// [`slot_addr`](Self::slot_addr) instead of doing pointer arithmetic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScratchpadRegion {
    base: u32,
    offset: usize,
    len: usize,
}

impl ScratchpadRegion {
    /// Absolute start address.
    #[allow(clippy::cast_possible_truncation)]
    pub const fn addr(&self) -> u32 {
        // offset <= capacity and base + capacity < 2^32
        self.base + self.offset as u32
    }

    /// Offset from the scratchpad base.
    pub const fn offset(&self) -> usize {
        self.offset
    }

    /// Length in bytes.
    pub const fn len(&self) -> usize {
        self.len
    }

    /// True for a zero-length region.
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Offset one past the last byte.
    pub const fn end_offset(&self) -> usize {
        self.offset + self.len
    }

    /// True if the two regions share at least one byte.
    pub const fn overlaps(&self, other: &Self) -> bool {
        self.offset < other.end_offset() && other.offset < self.end_offset()
    }

    /// Address of slot `index` when the region is divided into `slot_len`-byte slots.
    ///
    /// # Errors
    ///
    /// Returns error if the slot does not lie entirely inside the region.
    #[allow(clippy::cast_possible_truncation)]
    pub fn slot_addr(&self, index: usize, slot_len: usize) -> Result<u32> {
        let start = index
            .checked_mul(slot_len)
            .filter(|s| s.saturating_add(slot_len) <= self.len)
            .ok_or_else(|| {
                SnaxError::invalid_plan(format!(
                    "slot {index} of {slot_len} bytes outside {}-byte region",
                    self.len
                ))
            })?;
        Ok(self.addr() + start as u32)
    }
}

/// Requested buffer for one logical operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperandSpec {
    /// Operand name (`"a"`, `"b"`, `"o"`, ...)
    pub name: &'static str,
    /// Size in bytes
    pub bytes: usize,
}

impl OperandSpec {
    /// Create an operand request
    pub const fn new(name: &'static str, bytes: usize) -> Self {
        Self { name, bytes }
    }
}

/// Result of one allocation: regions in declaration order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScratchpadLayout {
    regions: Vec<(&'static str, ScratchpadRegion)>,
    used: usize,
    capacity: usize,
}

impl ScratchpadLayout {
    /// Region of the named operand.
    pub fn get(&self, name: &str) -> Option<ScratchpadRegion> {
        self.regions
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, r)| *r)
    }

    /// All regions in declaration order.
    pub fn regions(&self) -> impl Iterator<Item = (&'static str, ScratchpadRegion)> + '_ {
        self.regions.iter().copied()
    }

    /// Bytes from the base to the end of the last region.
    pub const fn used_bytes(&self) -> usize {
        self.used
    }

    /// Capacity of the memory the layout was made for.
    pub const fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Computes operand placement inside a fixed-size local memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScratchpadAllocator {
    base: u32,
    capacity: usize,
    alignment: usize,
}

impl ScratchpadAllocator {
    /// Create an allocator for `capacity` bytes starting at `base`.
    ///
    /// # Errors
    ///
    /// Returns error if the memory would reach the end of the 32-bit
    /// address space or `base` is not on the default bank boundary.
    pub fn new(base: u32, capacity: usize) -> Result<Self> {
        Self::with_alignment(base, capacity, tcdm::DEFAULT_ALIGNMENT)
    }

    /// Create an allocator with an explicit placement alignment.
    ///
    /// # Errors
    ///
    /// Returns error if `alignment` is not a power of two, `base` is not
    /// aligned to it, or the memory would reach the end of the 32-bit address
    /// space (the one-past-the-end address of every region must fit in `u32`).
    pub fn with_alignment(base: u32, capacity: usize, alignment: usize) -> Result<Self> {
        if !alignment.is_power_of_two() {
            return Err(SnaxError::invalid_plan(format!(
                "alignment {alignment} is not a power of two"
            )));
        }
        if base as usize % alignment != 0 {
            return Err(SnaxError::misaligned("scratchpad base", u64::from(base), alignment));
        }
        if u64::from(base) + capacity as u64 >= 1u64 << 32 {
            return Err(SnaxError::AddressOutOfRange {
                addr: u64::from(base),
                len: capacity,
            });
        }
        Ok(Self { base, capacity, alignment })
    }

    /// The whole cluster TCDM with bank-word alignment.
    pub const fn snax_tcdm() -> Self {
        Self {
            base: tcdm::TCDM_BASE,
            capacity: tcdm::TCDM_SIZE,
            alignment: tcdm::DEFAULT_ALIGNMENT,
        }
    }

    /// Base address.
    pub const fn base(&self) -> u32 {
        self.base
    }

    /// Capacity in bytes.
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Placement alignment in bytes.
    pub const fn alignment(&self) -> usize {
        self.alignment
    }

    /// Place `operands` consecutively in declaration order.
    ///
    /// # Errors
    ///
    /// Returns [`SnaxError::ScratchpadOverflow`] if the operands plus
    /// alignment padding exceed the capacity.
    pub fn allocate(&self, operands: &[OperandSpec]) -> Result<ScratchpadLayout> {
        let mut regions = Vec::with_capacity(operands.len());
        let mut cursor = 0usize;

        for op in operands {
            let offset = align_up(cursor, self.alignment).ok_or(SnaxError::ScratchpadOverflow {
                requested: usize::MAX,
                capacity: self.capacity,
            })?;
            let end = offset.checked_add(op.bytes).ok_or(SnaxError::ScratchpadOverflow {
                requested: usize::MAX,
                capacity: self.capacity,
            })?;
            regions.push((
                op.name,
                ScratchpadRegion {
                    base: self.base,
                    offset,
                    len: op.bytes,
                },
            ));
            cursor = end;
        }

        if cursor > self.capacity {
            return Err(SnaxError::ScratchpadOverflow {
                requested: cursor,
                capacity: self.capacity,
            });
        }

        debug!(
            "Scratchpad layout: {} operands, {} of {} bytes",
            regions.len(),
            cursor,
            self.capacity
        );

        Ok(ScratchpadLayout {
            regions,
            used: cursor,
            capacity: self.capacity,
        })
    }
}

const fn align_up(value: usize, align: usize) -> Option<usize> {
    match value.checked_add(align - 1) {
        Some(v) => Some(v & !(align - 1)),
        None => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn abo(a: usize, b: usize, o: usize) -> [OperandSpec; 3] {
        [
            OperandSpec::new("a", a),
            OperandSpec::new("b", b),
            OperandSpec::new("o", o),
        ]
    }

    #[test]
    fn regions_follow_declaration_order() {
        let alloc = ScratchpadAllocator::snax_tcdm();
        let layout = alloc.allocate(&abo(80, 80, 80)).unwrap();
        let a = layout.get("a").unwrap();
        let b = layout.get("b").unwrap();
        let o = layout.get("o").unwrap();

        assert_eq!(a.addr(), tcdm::TCDM_BASE);
        assert!(b.offset() >= a.end_offset());
        assert!(o.offset() >= b.end_offset());
        assert_eq!(layout.used_bytes(), 240);
    }

    #[test]
    fn padding_only_reaches_alignment() {
        let alloc = ScratchpadAllocator::snax_tcdm();
        let layout = alloc.allocate(&abo(12, 4, 4)).unwrap();
        assert_eq!(layout.get("b").unwrap().offset(), 16);
        assert_eq!(layout.get("o").unwrap().offset(), 24);
    }

    #[test]
    fn allocation_is_idempotent() {
        let alloc = ScratchpadAllocator::snax_tcdm();
        let ops = abo(100, 36, 4096);
        assert_eq!(alloc.allocate(&ops).unwrap(), alloc.allocate(&ops).unwrap());
    }

    #[test]
    fn regions_never_overlap() {
        let alloc = ScratchpadAllocator::with_alignment(0x1000, 64 * 1024, 16).unwrap();
        for a in [0usize, 1, 7, 16, 333] {
            for b in [0usize, 3, 64, 1000] {
                for o in [1usize, 8, 2048] {
                    let layout = alloc.allocate(&abo(a, b, o)).unwrap();
                    let regions: Vec<_> = layout.regions().map(|(_, r)| r).collect();
                    for (i, r) in regions.iter().enumerate() {
                        assert_eq!(r.offset() % 16, 0);
                        for other in &regions[i + 1..] {
                            if !r.is_empty() && !other.is_empty() {
                                assert!(!r.overlaps(other), "{r:?} overlaps {other:?}");
                            }
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn overflow_is_rejected() {
        let alloc = ScratchpadAllocator::with_alignment(0, 256, 8).unwrap();
        let err = alloc.allocate(&abo(100, 100, 100)).unwrap_err();
        assert!(matches!(
            err,
            SnaxError::ScratchpadOverflow { requested: 308, capacity: 256 }
        ));
        assert!(err.is_configuration_error());
    }

    #[test]
    fn exact_fit_is_accepted() {
        let alloc = ScratchpadAllocator::with_alignment(0, 96, 8).unwrap();
        assert_eq!(alloc.allocate(&abo(32, 32, 32)).unwrap().used_bytes(), 96);
    }

    #[test]
    fn bad_alignment_rejected() {
        assert!(ScratchpadAllocator::with_alignment(0, 64, 3).is_err());
        assert!(ScratchpadAllocator::with_alignment(4, 64, 8).is_err());
    }

    #[test]
    fn memory_must_end_below_address_space_top() {
        assert!(matches!(
            ScratchpadAllocator::with_alignment(0xFFFF_FF00, 0x100, 8),
            Err(SnaxError::AddressOutOfRange { .. })
        ));

        let alloc = ScratchpadAllocator::with_alignment(0xFFFF_FF00, 0xF8, 8).unwrap();
        let layout = alloc
            .allocate(&[OperandSpec::new("a", 0xF8), OperandSpec::new("b", 0)])
            .unwrap();
        let b = layout.get("b").unwrap();
        assert!(b.is_empty());
        assert_eq!(b.addr(), 0xFFFF_FFF8);
    }

    #[test]
    fn slot_addresses_stay_inside_region() {
        let alloc = ScratchpadAllocator::snax_tcdm();
        let layout = alloc.allocate(&abo(32, 32, 32)).unwrap();
        let b = layout.get("b").unwrap();
        assert_eq!(b.slot_addr(0, 16).unwrap(), b.addr());
        assert_eq!(b.slot_addr(1, 16).unwrap(), b.addr() + 16);
        assert!(b.slot_addr(2, 16).is_err());
    }
}
