// SPDX-License-Identifier: AGPL-3.0-only

//! Memory map seen by the cluster.
//!
//! ```text
//! Region  Base          Size     Purpose
//! ─────── ───────────── ──────── ──────────────────────────────────────
//!  TCDM   0x1000_0000   128 KB   Tightly-coupled data memory (L1 scratchpad)
//!  L3     0x8000_0000   (board)  Backing storage holding datasets + golden data
//! ```
//!
//! The TCDM is split into 32 banks of 64-bit words; buffers placed on a bank
//! word boundary let the streamer issue one access per bank per cycle.

/// TCDM base address.
pub const TCDM_BASE: u32 = 0x1000_0000;

/// TCDM capacity in bytes.
pub const TCDM_SIZE: usize = 128 * 1024;

/// Number of TCDM banks.
pub const TCDM_BANKS: usize = 32;

/// Width of one bank word in bytes.
pub const BANK_WORD_BYTES: usize = 8;

/// Default placement alignment for scratchpad buffers.
pub const DEFAULT_ALIGNMENT: usize = BANK_WORD_BYTES;

/// Base of off-cluster backing storage.
pub const L3_BASE: u32 = 0x8000_0000;

/// Size of the L3 window modelled by host-side simulation.
pub const L3_SIM_SIZE: usize = 4 * 1024 * 1024;

/// Returns `true` if `[addr, addr + len)` lies inside the TCDM.
#[must_use]
pub fn in_tcdm(addr: u32, len: usize) -> bool {
    let start = addr as usize;
    let base = TCDM_BASE as usize;
    start >= base && start.saturating_add(len) <= base + TCDM_SIZE
}
