//! Runtime configuration for a [`crate::Vgic`] instance.
//!
//! The distributor core has no file- or environment-based configuration
//! layer: the handful of values that differ per platform (LR count, queue
//! depth, maximum virq table size) are architectural/platform constants the
//! integrating VMM already knows when it stands the vGIC up, so they are
//! passed in as a plain `Copy` struct, the same way the teacher's
//! `HvArchZoneConfig` and `HvConfigMemoryRegion` are caller-supplied structs
//! rather than parsed from a config file.

/// Number of hardware list registers per vCPU (GICv2 typically has 4).
pub const NUM_LIST_REGS: usize = 4;

/// Capacity of the per-vCPU overflow FIFO. Must be a power of two.
pub const MAX_IRQ_QUEUE_LEN: usize = 64;

/// Size of the global SPI handler table.
pub const MAX_VIRQS: usize = 200;

/// Number of banked SGI+PPI virqs (IRQ 0..32).
pub const GIC_SPI_IRQ_MIN: u32 = 32;

/// Number of SGI virqs (IRQ 0..16). SGIs cannot be disabled.
pub const NUM_SGI_VIRQS: u32 = 16;

/// Total virq space, architecturally `[0, 1020)`.
pub const MAX_VIRQ_ID: u32 = 1020;

/// Tunables for one [`crate::Vgic`] instance.
///
/// Constructed once, at [`crate::Vgic::new`], and never mutated afterwards.
#[derive(Debug, Clone, Copy)]
pub struct GicConfig {
    /// Hardware list registers available per vCPU.
    pub num_list_regs: usize,
    /// Capacity of the per-vCPU overflow FIFO. Must be a power of two.
    pub max_irq_queue_len: usize,
    /// Size of the global SPI handler table.
    pub max_virqs: usize,
}

impl GicConfig {
    /// Default tunables matching the plain GICv2 architectural defaults.
    pub const fn new() -> Self {
        Self {
            num_list_regs: NUM_LIST_REGS,
            max_irq_queue_len: MAX_IRQ_QUEUE_LEN,
            max_virqs: MAX_VIRQS,
        }
    }

    /// Panics (in debug builds) if `max_irq_queue_len` is not a power of
    /// two, since the ring buffer's `next(i) = (i + 1) & (cap - 1)`
    /// discipline depends on it.
    pub(crate) fn validate(&self) {
        debug_assert!(
            self.max_irq_queue_len.is_power_of_two(),
            "GicConfig::max_irq_queue_len must be a power of two, got {}",
            self.max_irq_queue_len
        );
        debug_assert!(self.num_list_regs > 0, "GicConfig::num_list_regs must be > 0");
        debug_assert!(self.max_virqs > 0, "GicConfig::max_virqs must be > 0");
    }
}

impl Default for GicConfig {
    fn default() -> Self {
        Self::new()
    }
}
