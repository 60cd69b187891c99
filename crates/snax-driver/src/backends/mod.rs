// SPDX-License-Identifier: AGPL-3.0-only

//! Platform backends
//!
//! - **Software**: simulated memory, DMA, barrier and accelerators running
//!   the whole cluster on host threads (tests, CI, development)
//! - **MMIO**: mmap-backed register window for driving a real accelerator

pub mod cluster;
pub mod memory;
pub mod mmio;
pub mod software;

pub use cluster::{PipelineReport, SoftwareCluster};
pub use memory::SimMemory;
pub use mmio::MmioBus;
pub use software::{FlushingBarrier, Personality, SoftwareAccelerator, SoftwareDma};
