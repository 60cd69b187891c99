// SPDX-License-Identifier: AGPL-3.0-only

//! Silicon model of a SNAX cluster.
//!
//! This crate has **no dependencies** and **no hardware access**. It is a
//! pure model of the cluster as the offload pipeline sees it: how many cores
//! there are and which one owns the DMA, where the TCDM scratchpad and the
//! backing memory live, and the CSR maps of the accelerators attached to the
//! compute core.
//!
//! # Crate organisation
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`cluster`] | Core count, data-mover core, accelerator host core |
//! | [`tcdm`] | TCDM scratchpad and L3 address map, bank geometry |
//! | [`regs`] | CSR maps: MAC (`0x3c0..`) and streamer ALU (`0x3d0..`) |

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod cluster;
pub mod regs;
pub mod tcdm;
