// SPDX-License-Identifier: AGPL-3.0-only

//! Transfer engine interface
//!
//! The cluster DMA is fire-and-forget from the issuing unit's point of view.
//! A started transfer is only guaranteed visible to other units after the
//! next cluster barrier.

use crate::error::Result;
use std::fmt::Debug;

/// Handle returned for a started transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransferId(u32);

impl TransferId {
    /// Create new transfer handle
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Get transfer ID
    pub const fn id(&self) -> u32 {
        self.0
    }
}

/// One 1-D copy request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transfer {
    /// Destination address
    pub dst: u32,
    /// Source address
    pub src: u32,
    /// Length in bytes
    pub len: usize,
}

/// Asynchronous copy engine driven by the data-mover unit.
pub trait TransferEngine: Debug + Send + Sync {
    /// Start copying `len` bytes from `src` to `dst` and return immediately.
    ///
    /// # Errors
    ///
    /// Returns error if the engine rejects the request (bad address range).
    fn start_transfer(&self, dst: u32, src: u32, len: usize) -> Result<TransferId>;
}
