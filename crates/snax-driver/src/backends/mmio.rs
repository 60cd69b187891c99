// SPDX-License-Identifier: AGPL-3.0-only

//! Memory-mapped register window
//!
//! Maps a register window exposed as a file (`/dev/mem` at an offset, a UIO
//! map, or a sysfs `resource` file) and performs volatile 32-bit accesses on
//! it. The only unsafe code of the driver lives here.
//!
//! Accelerator CSR `n` sits at byte `4 * n` of the window.

use crate::device::RegisterBus;
use crate::error::{Result, SnaxError};
use rustix::mm::{mmap, munmap, MapFlags, ProtFlags};
use std::fs::{File, OpenOptions};
use std::os::unix::io::AsFd;
use std::path::{Path, PathBuf};
use std::ptr::NonNull;

/// Bytes per register.
pub const REGISTER_BYTES: usize = 4;

/// Mapped register window.
#[derive(Debug)]
pub struct MmioBus {
    ptr: NonNull<u8>,
    size: usize,
    _file: File,
    path: PathBuf,
}

// SAFETY: the mapping is owned exclusively by this value and is valid for
// the whole process; moving it to another thread does not invalidate it.
unsafe impl Send for MmioBus {}

impl MmioBus {
    /// Map `size` bytes of `path` starting at `offset` (page aligned).
    /// A `size` of 0 maps the whole file from `offset`.
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be opened, the window is empty or
    /// `offset` is not page aligned, or mmap fails.
    pub fn open(path: impl AsRef<Path>, offset: u64, size: usize) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        tracing::debug!("Mapping register window: {}", path.display());

        let file = OpenOptions::new().read(true).write(true).open(&path)?;

        let size = if size == 0 {
            let len = file.metadata()?.len().saturating_sub(offset);
            usize::try_from(len).map_err(|_| SnaxError::AddressOutOfRange {
                addr: offset,
                len: usize::MAX,
            })?
        } else {
            size
        };
        if size == 0 {
            return Err(SnaxError::device_fault(format!(
                "{}: register window is empty",
                path.display()
            )));
        }
        let page = rustix::param::page_size();
        if offset % page as u64 != 0 {
            return Err(SnaxError::misaligned("mapping offset", offset, page));
        }

        // SAFETY: the fd is open for read and write, size is non-zero, the
        // offset is page aligned, and the file is kept alive in the struct
        // until Drop unmaps the region.
        let addr = unsafe {
            mmap(
                std::ptr::null_mut(),
                size,
                ProtFlags::READ | ProtFlags::WRITE,
                MapFlags::SHARED,
                file.as_fd(),
                offset,
            )
        }
        .map_err(|e| SnaxError::device_fault(format!("mmap {} failed: {e}", path.display())))?;

        let ptr = NonNull::new(addr.cast::<u8>())
            .ok_or_else(|| SnaxError::device_fault("mmap returned a null mapping"))?;

        tracing::info!("Mapped {} bytes of {} at {ptr:p}", size, path.display());

        Ok(Self {
            ptr,
            size,
            _file: file,
            path,
        })
    }

    /// Window size in bytes.
    pub const fn size(&self) -> usize {
        self.size
    }

    /// Mapped file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the 32-bit word at byte `offset`.
    ///
    /// # Errors
    ///
    /// Returns error if the access is misaligned or outside the window.
    pub fn read_u32(&self, offset: usize) -> Result<u32> {
        self.check(offset)?;
        // SAFETY: check() guarantees offset + 4 <= size and 4-byte alignment;
        // the pointer comes from a live mapping. Volatile because the device
        // may change the value behind the compiler's back.
        #[allow(clippy::cast_ptr_alignment)]
        let value = unsafe { self.ptr.as_ptr().add(offset).cast::<u32>().read_volatile() };
        tracing::trace!("Read u32 @ {offset:#x} = {value:#x}");
        Ok(value)
    }

    /// Write the 32-bit word at byte `offset`.
    ///
    /// # Errors
    ///
    /// Returns error if the access is misaligned or outside the window.
    pub fn write_u32(&mut self, offset: usize, value: u32) -> Result<()> {
        self.check(offset)?;
        tracing::trace!("Write u32 @ {offset:#x} = {value:#x}");
        // SAFETY: as in read_u32; volatile because writes trigger device
        // side effects and must not be merged or reordered.
        #[allow(clippy::cast_ptr_alignment)]
        unsafe {
            self.ptr.as_ptr().add(offset).cast::<u32>().write_volatile(value);
        }
        Ok(())
    }

    fn check(&self, offset: usize) -> Result<()> {
        if offset % REGISTER_BYTES != 0 {
            return Err(SnaxError::misaligned("register offset", offset as u64, REGISTER_BYTES));
        }
        if offset.checked_add(REGISTER_BYTES).map_or(true, |end| end > self.size) {
            return Err(SnaxError::AddressOutOfRange {
                addr: offset as u64,
                len: REGISTER_BYTES,
            });
        }
        Ok(())
    }
}

impl RegisterBus for MmioBus {
    fn write_register(&mut self, addr: u32, value: u32) -> Result<()> {
        self.write_u32(addr as usize * REGISTER_BYTES, value)
    }

    fn read_register(&mut self, addr: u32) -> Result<u32> {
        self.read_u32(addr as usize * REGISTER_BYTES)
    }
}

impl Drop for MmioBus {
    fn drop(&mut self) {
        // SAFETY: ptr and size are exactly what mmap returned in open(), and
        // Drop runs once.
        unsafe {
            let _ = munmap(self.ptr.as_ptr().cast(), self.size);
        }
        tracing::debug!("Unmapped {}", self.path.display());
    }
}
