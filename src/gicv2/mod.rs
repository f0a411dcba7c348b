//! GICv2 distributor emulation: register offsets, shadow state, the handler
//! registry, per-vCPU injection pipelines, the write-side semantic
//! operations, and the MMIO dispatcher that ties them together.

pub mod consts;
pub mod dist;
pub mod handler;
pub mod inject;
pub mod mmio;
pub mod vgic;

pub use handler::{AckFn, Token};
pub use mmio::handle_dist_fault;
pub use vgic::Vgic;
