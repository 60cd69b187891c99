// SPDX-License-Identifier: AGPL-3.0-only

//! Simulated cluster memory
//!
//! A set of disjoint address ranges (backing storage, TCDM) shared by the
//! software DMA and the software accelerator. Each range is a word vector
//! behind its own lock; byte-granular copies go through a `bytemuck` view
//! of the same words.

use crate::error::{Result, SnaxError};
use snax_chip::tcdm;
use std::sync::{Mutex, MutexGuard};

const WORD: usize = 4;

#[derive(Debug)]
struct Bank {
    name: &'static str,
    base: u32,
    bytes: usize,
    words: Mutex<Vec<u32>>,
}

impl Bank {
    fn end(&self) -> u64 {
        u64::from(self.base) + self.bytes as u64
    }

    fn lock(&self) -> Result<MutexGuard<'_, Vec<u32>>> {
        self.words
            .lock()
            .map_err(|_| SnaxError::device_fault(format!("memory bank {} poisoned", self.name)))
    }
}

/// Address-decoded simulated memory.
#[derive(Debug, Default)]
pub struct SimMemory {
    banks: Vec<Bank>,
}

impl SimMemory {
    /// Memory with no ranges.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a zero-filled range of `bytes` bytes at `base`.
    ///
    /// # Errors
    ///
    /// Returns error if the range is not word aligned, wraps the address
    /// space, or overlaps an existing range.
    pub fn with_region(mut self, name: &'static str, base: u32, bytes: usize) -> Result<Self> {
        if base as usize % WORD != 0 {
            return Err(SnaxError::misaligned(format!("{name} base"), u64::from(base), WORD));
        }
        if bytes % WORD != 0 {
            return Err(SnaxError::misaligned(format!("{name} size"), bytes as u64, WORD));
        }
        let end = u64::from(base) + bytes as u64;
        if end > 1u64 << 32 {
            return Err(SnaxError::AddressOutOfRange {
                addr: u64::from(base),
                len: bytes,
            });
        }
        if let Some(other) = self
            .banks
            .iter()
            .find(|b| u64::from(base) < b.end() && u64::from(b.base) < end)
        {
            return Err(SnaxError::invalid_plan(format!(
                "memory region {name} overlaps {}",
                other.name
            )));
        }
        self.banks.push(Bank {
            name,
            base,
            bytes,
            words: Mutex::new(vec![0; bytes / WORD]),
        });
        Ok(self)
    }

    /// Backing storage of `backing_bytes` at the L3 base plus the full TCDM.
    ///
    /// # Errors
    ///
    /// Returns error if `backing_bytes` exceeds the simulated L3 window or
    /// is not word aligned.
    pub fn snax(backing_bytes: usize) -> Result<Self> {
        if backing_bytes > tcdm::L3_SIM_SIZE {
            return Err(SnaxError::AddressOutOfRange {
                addr: u64::from(tcdm::L3_BASE),
                len: backing_bytes,
            });
        }
        Self::new()
            .with_region("l3", tcdm::L3_BASE, backing_bytes)?
            .with_region("tcdm", tcdm::TCDM_BASE, tcdm::TCDM_SIZE)
    }

    /// True if `[addr, addr + len)` lies inside one range.
    pub fn contains(&self, addr: u32, len: usize) -> bool {
        self.locate(addr, len).is_ok()
    }

    fn locate(&self, addr: u32, len: usize) -> Result<(usize, usize)> {
        let end = u64::from(addr) + len as u64;
        self.banks
            .iter()
            .position(|b| addr >= b.base && end <= b.end())
            .map(|i| (i, (addr - self.banks[i].base) as usize))
            .ok_or(SnaxError::AddressOutOfRange {
                addr: u64::from(addr),
                len,
            })
    }

    fn locate_words(&self, addr: u32, count: usize) -> Result<(usize, usize)> {
        if addr as usize % WORD != 0 {
            return Err(SnaxError::misaligned("word access", u64::from(addr), WORD));
        }
        let (bank, offset) = self.locate(addr, count * WORD)?;
        Ok((bank, offset / WORD))
    }

    /// Read `count` words starting at `addr`.
    ///
    /// # Errors
    ///
    /// Returns error if the access is misaligned or not inside one range.
    pub fn read_words(&self, addr: u32, count: usize) -> Result<Vec<u32>> {
        let (bank, index) = self.locate_words(addr, count)?;
        let words = self.banks[bank].lock()?;
        Ok(words[index..index + count].to_vec())
    }

    /// Write `data` starting at `addr`.
    ///
    /// # Errors
    ///
    /// Returns error if the access is misaligned or not inside one range.
    pub fn write_words(&self, addr: u32, data: &[u32]) -> Result<()> {
        let (bank, index) = self.locate_words(addr, data.len())?;
        let mut words = self.banks[bank].lock()?;
        words[index..index + data.len()].copy_from_slice(data);
        Ok(())
    }

    /// Copy `len` bytes from `src` to `dst`. Overlapping copies inside one
    /// range behave like `memmove`.
    ///
    /// # Errors
    ///
    /// Returns error if either side is not inside one range.
    pub fn copy(&self, dst: u32, src: u32, len: usize) -> Result<()> {
        let (d, doff) = self.locate(dst, len)?;
        let (s, soff) = self.locate(src, len)?;

        if d == s {
            let mut words = self.banks[d].lock()?;
            let bytes: &mut [u8] = bytemuck::cast_slice_mut(&mut words[..]);
            bytes.copy_within(soff..soff + len, doff);
            return Ok(());
        }

        // lock in bank order so concurrent copies cannot deadlock
        let (mut dst_words, src_words) = if d < s {
            let dw = self.banks[d].lock()?;
            (dw, self.banks[s].lock()?)
        } else {
            let sw = self.banks[s].lock()?;
            (self.banks[d].lock()?, sw)
        };
        let dst_bytes: &mut [u8] = bytemuck::cast_slice_mut(&mut dst_words[..]);
        let src_bytes: &[u8] = bytemuck::cast_slice(&src_words[..]);
        dst_bytes[doff..doff + len].copy_from_slice(&src_bytes[soff..soff + len]);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn words_round_trip_through_a_bank() {
        let mem = SimMemory::snax(64).unwrap();
        mem.write_words(tcdm::TCDM_BASE + 8, &[1, 2, 3]).unwrap();
        assert_eq!(mem.read_words(tcdm::TCDM_BASE + 8, 3).unwrap(), vec![1, 2, 3]);
        assert_eq!(mem.read_words(tcdm::TCDM_BASE, 2).unwrap(), vec![0, 0]);
    }

    #[test]
    fn copy_between_banks() {
        let mem = SimMemory::snax(64).unwrap();
        mem.write_words(tcdm::L3_BASE, &[7, 8, 9, 10]).unwrap();
        mem.copy(tcdm::TCDM_BASE + 4, tcdm::L3_BASE + 4, 8).unwrap();
        assert_eq!(mem.read_words(tcdm::TCDM_BASE, 4).unwrap(), vec![0, 8, 9, 0]);
    }

    #[test]
    fn copy_within_a_bank() {
        let mem = SimMemory::snax(64).unwrap();
        mem.write_words(tcdm::TCDM_BASE, &[1, 2, 3, 4]).unwrap();
        mem.copy(tcdm::TCDM_BASE + 4, tcdm::TCDM_BASE, 12).unwrap();
        assert_eq!(mem.read_words(tcdm::TCDM_BASE, 4).unwrap(), vec![1, 1, 2, 3]);
    }

    #[test]
    fn accesses_outside_ranges_rejected() {
        let mem = SimMemory::snax(64).unwrap();
        assert!(!mem.contains(tcdm::L3_BASE + 60, 8));
        assert!(mem.contains(tcdm::L3_BASE + 56, 8));
        assert!(matches!(
            mem.read_words(tcdm::TCDM_BASE - 4, 1),
            Err(SnaxError::AddressOutOfRange { .. })
        ));
        assert!(matches!(
            mem.read_words(tcdm::TCDM_BASE + 2, 1),
            Err(SnaxError::Misaligned { .. })
        ));
        assert!(mem.copy(tcdm::TCDM_BASE, 0, 4).is_err());
    }

    #[test]
    fn overlapping_regions_rejected() {
        let err = SimMemory::new()
            .with_region("x", 0x1000, 0x100)
            .unwrap()
            .with_region("y", 0x10f0, 0x100)
            .unwrap_err();
        assert!(matches!(err, SnaxError::InvalidPlan { .. }));
        assert!(SimMemory::snax(tcdm::L3_SIM_SIZE + 4).is_err());
    }
}
