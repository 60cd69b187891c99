// SPDX-License-Identifier: AGPL-3.0-only

//! Error types for SNAX pipeline operations

use thiserror::Error;

/// Result type alias for SNAX operations
pub type Result<T> = std::result::Result<T, SnaxError>;

/// Errors that can occur while planning or running an offload pipeline
#[derive(Debug, Error)]
pub enum SnaxError {
    /// Operand buffers do not fit in local memory
    #[error("Scratchpad overflow: {requested} bytes requested, {capacity} bytes available")]
    ScratchpadOverflow {
        /// Bytes needed by the layout, alignment padding included
        requested: usize,
        /// Local memory capacity
        capacity: usize,
    },

    /// Address or alignment not on the required boundary
    #[error("Misaligned {what}: {value:#x} is not a multiple of {align}")]
    Misaligned {
        /// What was misaligned
        what: String,
        /// Offending value
        value: u64,
        /// Required alignment
        align: usize,
    },

    /// Cluster topology rejected at construction
    #[error("Invalid topology: {reason}")]
    InvalidTopology {
        /// Reason for rejection
        reason: String,
    },

    /// Register-write sequence rejected by the builder or the device
    #[error("Invalid descriptor: {reason}")]
    InvalidDescriptor {
        /// Reason for rejection
        reason: String,
    },

    /// Buffer depth would let a load overwrite data still being computed on
    #[error("Buffer hazard: {reason}")]
    BufferHazard {
        /// Description of the hazard
        reason: String,
    },

    /// Tile plan rejected (shape, sizes, missing unit resources)
    #[error("Invalid plan: {reason}")]
    InvalidPlan {
        /// Reason for rejection
        reason: String,
    },

    /// Device never reported completion within the wait bound
    #[error("Device timeout after {polls} polls ({elapsed_ms}ms)")]
    Timeout {
        /// Status reads performed before giving up
        polls: u64,
        /// Wall time spent polling in milliseconds
        elapsed_ms: u64,
    },

    /// Device reported an error or was driven out of its lifecycle
    #[error("Device fault: {reason}")]
    DeviceFault {
        /// Reason for failure
        reason: String,
    },

    /// Access outside any mapped memory or register window
    #[error("Address {addr:#010x} (+{len} bytes) is outside any mapped region")]
    AddressOutOfRange {
        /// Start address of the access
        addr: u64,
        /// Access length in bytes
        len: usize,
    },

    /// Data transfer failed
    #[error("Transfer failed: {reason}")]
    TransferFailed {
        /// Reason for failure
        reason: String,
    },

    /// Run stopped by a raised cancel token
    #[error("Pipeline cancelled at iteration {iteration}")]
    Cancelled {
        /// First iteration whose stage work was skipped
        iteration: usize,
    },

    /// I/O error (register window mapping)
    #[error("I/O error: {source}")]
    Io {
        /// Underlying I/O error
        #[from]
        source: std::io::Error,
    },
}

impl SnaxError {
    /// Create an invalid topology error
    pub fn invalid_topology(reason: impl Into<String>) -> Self {
        Self::InvalidTopology {
            reason: reason.into(),
        }
    }

    /// Create an invalid descriptor error
    pub fn invalid_descriptor(reason: impl Into<String>) -> Self {
        Self::InvalidDescriptor {
            reason: reason.into(),
        }
    }

    /// Create a buffer hazard error
    pub fn buffer_hazard(reason: impl Into<String>) -> Self {
        Self::BufferHazard {
            reason: reason.into(),
        }
    }

    /// Create an invalid plan error
    pub fn invalid_plan(reason: impl Into<String>) -> Self {
        Self::InvalidPlan {
            reason: reason.into(),
        }
    }

    /// Create a device fault error
    pub fn device_fault(reason: impl Into<String>) -> Self {
        Self::DeviceFault {
            reason: reason.into(),
        }
    }

    /// Create a transfer failed error
    pub fn transfer_failed(reason: impl Into<String>) -> Self {
        Self::TransferFailed {
            reason: reason.into(),
        }
    }

    /// Create a misalignment error
    pub fn misaligned(what: impl Into<String>, value: u64, align: usize) -> Self {
        Self::Misaligned {
            what: what.into(),
            value,
            align,
        }
    }

    /// True for errors raised while building a plan, before any device access
    pub const fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            Self::ScratchpadOverflow { .. }
                | Self::Misaligned { .. }
                | Self::InvalidTopology { .. }
                | Self::InvalidDescriptor { .. }
                | Self::BufferHazard { .. }
                | Self::InvalidPlan { .. }
        )
    }
}
