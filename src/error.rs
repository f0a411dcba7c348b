//! Error taxonomy shared by every fallible operation in the distributor core.
//!
//! Mirrors the `HvError`/`HvResult` idiom used elsewhere in this codebase
//! (`crate::error::HvResult` is threaded through the PCI and virtio device
//! models) rather than pulling in an external error-derive crate: the
//! variant set here is small, fixed by the GICv2 register semantics, and
//! every caller needs to match on it, not just display it.

use core::fmt;

/// Everything that can go wrong emulating the distributor, per the error
/// taxonomy. Each variant names the condition, not the call site, so it
/// reads the same whether it surfaced from the MMIO path or from the
/// injection API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GicError {
    /// `set_pending_irq`/`inject_irq` found no handler, the distributor is
    /// disabled, or the IRQ is disabled on the target vCPU.
    NotDeliverable,
    /// `register_irq` was called twice for the same vCPU + SGI/PPI slot.
    AlreadyRegistered,
    /// `register_irq` for an SPI found the global handler table full.
    NoSpace,
    /// The per-vCPU overflow FIFO was full when `set_pending_irq` tried to
    /// enqueue. Treated as a fatal configuration error: the queue depth is
    /// a tunable, and hitting this means it was undersized for the
    /// workload.
    QueueFull,
    /// A write landed on an offset this emulation does not implement
    /// (reserved ranges and unknown offsets). The guest is still resumed;
    /// this is surfaced so a caller that wants to count or rate-limit
    /// these can.
    IgnoredAccess,
    /// A write landed on CPENDSGIR/SPENDSGIR, which this emulation does
    /// not implement (SGI set-pending/clear-pending via these registers
    /// is a declared non-goal). Distinct from [`GicError::IgnoredAccess`]
    /// so a caller can tell "unknown register" apart from "known, but
    /// deliberately unimplemented, register".
    UnimplementedSgiPendingWrite,
}

impl fmt::Display for GicError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            GicError::NotDeliverable => "virq is not deliverable on this vcpu",
            GicError::AlreadyRegistered => "virq already has a registered handler",
            GicError::NoSpace => "no free slot in the virq handler table",
            GicError::QueueFull => "per-vcpu overflow queue is full",
            GicError::IgnoredAccess => "access to an unknown or reserved register",
            GicError::UnimplementedSgiPendingWrite => "write to CPENDSGIR/SPENDSGIR is unimplemented",
        };
        f.write_str(msg)
    }
}

/// Crate-wide result alias, mirroring the teacher's `HvResult<T>`.
pub type GicResult<T = ()> = Result<T, GicError>;
