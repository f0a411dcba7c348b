//! A virtual ARM GICv2 distributor: shadow register state, the per-vCPU
//! interrupt-injection pipeline, SGI cross-vCPU dispatch, and the MMIO
//! fault dispatcher that ties them together.
//!
//! The fault-delivery mechanism, the `load_list_reg` hypercall, and VM/vCPU
//! bring-up are external to this crate — callers implement [`HostEnv`] and
//! either implement [`MmioFault`] on their own trap type or decode into
//! [`GuestFault`] and drive [`gicv2::handle_dist_fault`] directly.
#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod config;
pub mod error;
pub mod fault;
pub mod gicv2;
pub mod host;

pub use config::GicConfig;
pub use error::{GicError, GicResult};
pub use fault::{GuestFault, MmioFault};
pub use gicv2::{handle_dist_fault, Vgic};
pub use host::HostEnv;
