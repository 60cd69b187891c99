// SPDX-License-Identifier: AGPL-3.0-only

//! Tiled accelerator-offload pipeline for SNAX clusters.
//!
//! Streams two input vectors through a register-mapped accelerator in tiles,
//! overlapping the DMA of the next tile and the write-back of the previous
//! one with the accelerator run on the current one. One unit of the cluster
//! moves data, one drives the accelerator, the rest only join the barriers.
//!
//! # Components
//!
//! ```text
//! TileScheduler ── RoleDispatcher           who does what
//!      │
//!      ├── data mover:  TransferEngine      start_transfer(dst, src, len)
//!      ├── compute:     ComputeEngine
//!      │                  ├── Offload       tile → DeviceDescriptor
//!      │                  ├── DeviceHandle  configure / launch / poll / clear
//!      │                  └── CompletionWaiter (bounded by WaitPolicy)
//!      └── every unit:  ClusterBarrier      once per iteration
//!
//! TilePlan ── ScratchpadAllocator           operand slots inside the TCDM
//! ```
//!
//! # Quick start
//!
//! ```no_run
//! use snax_driver::prelude::*;
//!
//! # fn main() -> snax_driver::Result<()> {
//! let dataset = Dataset::snax_mac_reference();
//! let report = SoftwareCluster::snax_default()
//!     .run(&dataset, MacMultiply, &PipelineConfig::new(4))?;
//! assert!(report.verification.passed());
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::doc_markdown)]

pub mod backends;
pub mod barrier;
pub mod completion;
pub mod dataset;
pub mod descriptor;
pub mod device;
mod error;
pub mod kernels;
pub mod role;
pub mod scheduler;
pub mod scratchpad;
pub mod transfer;
pub mod verify;

pub use backends::{MmioBus, PipelineReport, SimMemory, SoftwareCluster};
pub use barrier::{CancelToken, ClusterBarrier};
pub use completion::{Completion, CompletionWaiter, WaitPolicy};
pub use dataset::Dataset;
pub use descriptor::{DescriptorBuilder, DeviceDescriptor, RegisterWrite};
pub use device::{CompletionStatus, DeviceHandle, DeviceState, RegisterBus, RegisterMap};
pub use error::{Result, SnaxError};
pub use kernels::{AluMode, AluOffload, MacMultiply, Offload};
pub use role::{ClusterTopology, Role, RoleDispatcher, UnitId};
pub use scheduler::{
    BackingBuffers, BufferDepth, ComputeEngine, PipelineConfig, Stage, StageEvent, Stages,
    TilePlan, TileRegions, TileScheduler, UnitPorts, UnitReport,
};
pub use scratchpad::{OperandSpec, ScratchpadAllocator, ScratchpadLayout, ScratchpadRegion};
pub use transfer::{TransferEngine, TransferId};
pub use verify::{compare, Verification};

/// Commonly used types.
pub mod prelude {
    pub use crate::{
        AluMode, AluOffload, BufferDepth, CancelToken, ClusterTopology, Dataset, MacMultiply,
        Offload, PipelineConfig, PipelineReport, Result, Role, ScratchpadAllocator,
        SnaxError, SoftwareCluster, TilePlan, TileScheduler, WaitPolicy,
    };
}
