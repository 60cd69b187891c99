// SPDX-License-Identifier: AGPL-3.0-only

//! CSR maps of the SNAX accelerators.
//!
//! Accelerators hang off the CSR port of the accelerator host core. Every
//! map follows the same contract: a block of configuration CSRs, one start
//! CSR whose write commits the configuration, and one read-only busy CSR.
//!
//! ```text
//! MAC        0x3c0 start   0x3c3 busy   0x3c5 clear   0x3d0..0x3d6 config
//! ALU        0x3d0..0x3da streamer      0x3dc..0x3dd config
//!            0x3de start   0x3df busy   0x3e0 perf
//! ```

// ── MAC (HWPE multiply-accumulate) ───────────────────────────────────────────

/// HWPE MAC accelerator.
pub mod mac {
    /// Launch (write any value to start).
    pub const START: u32 = 0x3C0;
    /// Busy status, non-zero while running.
    pub const BUSY: u32 = 0x3C3;
    /// Software clear, required before the next launch.
    pub const CLEAR: u32 = 0x3C5;

    /// Pointer to operand A in TCDM.
    pub const PTR_A: u32 = 0x3D0;
    /// Pointer to operand B in TCDM.
    pub const PTR_B: u32 = 0x3D1;
    /// Pointer to output O in TCDM.
    pub const PTR_O: u32 = 0x3D3;
    /// Number of iterations over the vectors.
    pub const ITERATIONS: u32 = 0x3D4;
    /// Vector length in elements.
    pub const VECTOR_LEN: u32 = 0x3D5;
    /// Operating mode.
    pub const MODE: u32 = 0x3D6;

    /// Mode values for [`MODE`].
    pub mod mode {
        /// `o[i] = a[i] * b[i]` in 32 bits.
        pub const SIMPLE_MULT: u32 = 1;
    }

    /// Bits of [`BUSY`] that mean "still running".
    pub const BUSY_MASK: u32 = 0xFFFF_FFFF;
}

// ── Streamer + ALU ───────────────────────────────────────────────────────────

/// Streamer-fed ALU accelerator.
pub mod alu {
    /// Loop bound shared by all streamer ports.
    pub const LOOP_BOUND: u32 = 0x3D0;
    /// Temporal stride of input A, in elements.
    pub const TSTRIDE_A: u32 = 0x3D1;
    /// Temporal stride of input B, in elements.
    pub const TSTRIDE_B: u32 = 0x3D2;
    /// Temporal stride of output O, in elements.
    pub const TSTRIDE_O: u32 = 0x3D3;
    /// Spatial stride of input A, in elements.
    pub const SSTRIDE_A: u32 = 0x3D4;
    /// Spatial stride of input B, in elements.
    pub const SSTRIDE_B: u32 = 0x3D5;
    /// Spatial stride of output O, in elements.
    pub const SSTRIDE_O: u32 = 0x3D6;
    /// Stride value for contiguous streams.
    pub const UNIT_STRIDE: u32 = 1;
    /// Base pointer of input A.
    pub const PTR_A: u32 = 0x3D7;
    /// Base pointer of input B.
    pub const PTR_B: u32 = 0x3D8;
    /// Base pointer of output O.
    pub const PTR_O: u32 = 0x3D9;
    /// Push the streamer configuration.
    pub const STREAMER_COMMIT: u32 = 0x3DA;
    /// Streamer performance counter (RO).
    pub const STREAMER_PERF: u32 = 0x3DB;

    /// ALU operation.
    pub const MODE: u32 = 0x3DC;
    /// Data length in elements.
    pub const LENGTH: u32 = 0x3DD;
    /// Push the ALU configuration and start.
    pub const START: u32 = 0x3DE;
    /// Busy status (RO).
    pub const BUSY: u32 = 0x3DF;
    /// ALU performance counter (RO).
    pub const PERF: u32 = 0x3E0;

    /// Mode values for [`MODE`].
    pub mod mode {
        /// `o = a + b`
        pub const ADD: u32 = 0;
        /// `o = a - b`
        pub const SUB: u32 = 1;
        /// `o = a * b`
        pub const MUL: u32 = 2;
        /// `o = a ^ b`
        pub const XOR: u32 = 3;
    }

    /// Bits of [`BUSY`] that mean "still running".
    pub const BUSY_MASK: u32 = 0x1;
}
