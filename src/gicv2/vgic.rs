//! The `Vgic` aggregate: owns the distributor shadow state, the handler
//! table and every vCPU's injection pipeline, and exposes the write-side
//! semantic operations (component E) and the public injection API
//! (component F) that the MMIO dispatcher and external IRQ sources call
//! into.

use alloc::vec;
use alloc::vec::Vec;

use log::{debug, warn};

use crate::config::{GicConfig, NUM_SGI_VIRQS};
use crate::error::{GicError, GicResult};
use crate::host::HostEnv;

use super::consts::TargetListFilter;
use super::dist::DistState;
use super::handler::{AckFn, HandlerTable, Token};
use super::inject::VcpuInject;

/// The vGIC distributor core: shadow register state, the registered-handler
/// table, and one injection pipeline per vCPU.
pub struct Vgic {
    dist: DistState,
    handlers: HandlerTable,
    inject: Vec<VcpuInject>,
    config: GicConfig,
}

impl Vgic {
    /// Builds a fresh vGIC instance for a VM with `num_vcpus` vCPUs.
    pub fn new(config: GicConfig, num_vcpus: usize) -> Self {
        config.validate();
        Self {
            dist: DistState::new(num_vcpus, config.max_virqs),
            handlers: HandlerTable::new(num_vcpus, config.max_virqs),
            inject: (0..num_vcpus)
                .map(|_| VcpuInject::new(config.num_list_regs, config.max_irq_queue_len))
                .collect(),
            config,
        }
    }

    /// Read-only access to the distributor shadow state, e.g. for the MMIO
    /// dispatcher's read path.
    pub fn dist(&self) -> &DistState {
        &self.dist
    }

    pub(crate) fn dist_mut(&mut self) -> &mut DistState {
        &mut self.dist
    }

    pub(crate) fn config(&self) -> &GicConfig {
        &self.config
    }

    /// Read-only access to a vCPU's injection pipeline, e.g. for test
    /// assertions against `lr_shadow`/the overflow queue.
    pub fn inject_state(&self, vcpu: usize) -> &VcpuInject {
        &self.inject[vcpu]
    }

    // ---- component B: handler registration ----

    /// Registers `ack`/`token` as the handler for `virq` on `vcpu`.
    pub fn register_irq(&mut self, vcpu: usize, virq: u32, ack: AckFn, token: Token) -> GicResult<()> {
        self.handlers.register(vcpu, virq, ack, token)
    }

    // ---- component E: write-side semantic operations ----

    /// Sets the enable bit for `virq` on `vcpu`. If a handler is registered
    /// and the IRQ is not currently pending, acks it — enabling an
    /// already-retired IRQ tells the backend it may re-raise.
    pub fn enable_irq(&mut self, vcpu: usize, virq: u32) {
        self.dist.set_enable(virq, true, vcpu);
        if let Some(handler) = self.handlers.find(vcpu, virq) {
            if !self.dist.is_pending(virq, vcpu) {
                self.handlers.ack(vcpu, handler);
            }
        }
    }

    /// Clears the enable bit for `virq` on `vcpu`. SGIs (`virq < 16`)
    /// cannot be disabled and this is silently ignored for them — guests
    /// routinely attempt it on boot.
    pub fn disable_irq(&mut self, vcpu: usize, virq: u32) {
        if virq < NUM_SGI_VIRQS {
            return;
        }
        self.dist.set_enable(virq, false, vcpu);
    }

    /// Sets `virq` pending on `vcpu` and drives it through the injection
    /// pipeline: enqueue into the overflow FIFO, then promote into a free
    /// LR if one is available.
    ///
    /// Returns `NotDeliverable` without mutating state if there is no
    /// handler, the distributor is globally disabled, or the IRQ is not
    /// enabled on this vCPU. A no-op (already pending) succeeds.
    pub fn set_pending_irq(
        &mut self,
        vcpu: usize,
        virq: u32,
        host: &mut dyn HostEnv,
    ) -> GicResult<()> {
        if self.handlers.find(vcpu, virq).is_none()
            || !self.dist.is_dist_enabled()
            || !self.dist.is_enabled(virq, vcpu)
        {
            debug!(
                "vgic: virq {virq} not deliverable to vcpu {vcpu} (no handler / dist disabled / irq disabled)"
            );
            return Err(GicError::NotDeliverable);
        }

        if self.dist.is_pending(virq, vcpu) {
            return Ok(());
        }

        self.dist.set_pending(virq, true, vcpu);
        self.inject[vcpu].enqueue(virq).map_err(|e| {
            warn!("vgic: overflow queue full on vcpu {vcpu}, dropping virq {virq}");
            e
        })?;

        self.promote_pending(vcpu, host)
    }

    /// Clears `virq` pending on `vcpu`. Does not attempt to unload an
    /// already-loaded LR (a known limitation, not required by this spec).
    pub fn clr_pending_irq(&mut self, vcpu: usize, virq: u32) {
        self.dist.set_pending(virq, false, vcpu);
    }

    /// Decodes an SGIR write and fans the SGI out to its target vCPUs.
    pub fn dispatch_sgi(&mut self, requester: usize, value: u32, host: &mut dyn HostEnv) {
        let filter = TargetListFilter::from_bits((value >> 24) & 0b11);
        let explicit_list = (value >> 16) & 0xff;
        let virq = value & 0xf;

        let num_vcpus = host.num_vcpus();
        let target_mask: u32 = match filter {
            TargetListFilter::Spec => explicit_list,
            TargetListFilter::Others => {
                let all = if num_vcpus >= 32 {
                    u32::MAX
                } else {
                    (1u32 << num_vcpus) - 1
                };
                all & !(1 << requester)
            }
            TargetListFilter::SelfOnly => 1 << requester,
        };

        for i in 0..num_vcpus {
            if target_mask & (1 << i) != 0 && host.is_vcpu_online(i) {
                let _ = self.inject_irq(i, virq, host);
            }
        }
    }

    // ---- component F: public injection API ----

    /// Entry point for external IRQ sources (and SGI dispatch): a synonym
    /// for [`Vgic::set_pending_irq`].
    pub fn inject_irq(&mut self, vcpu: usize, virq: u32, host: &mut dyn HostEnv) -> GicResult<()> {
        self.set_pending_irq(vcpu, virq, host)
    }

    // ---- maintenance hook ----

    /// Called when the physical maintenance handler observes LR `lr_idx` on
    /// `vcpu` becoming free: clears that LR's shadow, then dequeues one
    /// pending virq (if any) and loads it into the now-free LR.
    pub fn on_lr_freed(&mut self, vcpu: usize, lr_idx: usize, host: &mut dyn HostEnv) -> GicResult<()> {
        self.inject[vcpu].clear_lr(lr_idx);
        self.promote_pending(vcpu, host)
    }

    /// Shared by `set_pending_irq` and `on_lr_freed`: if there is a free LR
    /// and a queued virq, dequeue it and program the LR.
    fn promote_pending(&mut self, vcpu: usize, host: &mut dyn HostEnv) -> GicResult<()> {
        let Some(lr_idx) = self.inject[vcpu].find_empty_lr() else {
            return Ok(());
        };
        let Some(virq) = self.inject[vcpu].dequeue() else {
            return Ok(());
        };
        host.load_list_reg(vcpu, lr_idx, virq)?;
        self.inject[vcpu].shadow_lr(lr_idx, virq);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct MockHost {
        num_vcpus: usize,
        online: Vec<bool>,
        loaded: Vec<(usize, usize, u32)>,
    }

    impl MockHost {
        fn new(num_vcpus: usize) -> Self {
            Self {
                num_vcpus,
                online: vec![true; num_vcpus],
                loaded: Vec::new(),
            }
        }
    }

    impl HostEnv for MockHost {
        fn num_vcpus(&self) -> usize {
            self.num_vcpus
        }

        fn is_vcpu_online(&self, vcpu: usize) -> bool {
            self.online[vcpu]
        }

        fn load_list_reg(&mut self, vcpu: usize, lr_idx: usize, virq: u32) -> GicResult<()> {
            self.loaded.push((vcpu, lr_idx, virq));
            Ok(())
        }
    }

    fn noop_ack(_vcpu: usize, _virq: u32, _token: Token) {}

    fn acked() -> &'static core::sync::atomic::AtomicUsize {
        static ACKED: core::sync::atomic::AtomicUsize = core::sync::atomic::AtomicUsize::new(0);
        &ACKED
    }

    fn counting_ack(_vcpu: usize, _virq: u32, _token: Token) {
        acked().fetch_add(1, core::sync::atomic::Ordering::SeqCst);
    }

    #[test]
    fn s1_basic_spi_delivery() {
        let mut vgic = Vgic::new(GicConfig::new(), 1);
        let mut host = MockHost::new(1);
        vgic.register_irq(0, 42, noop_ack, 0).unwrap();
        vgic.enable_irq(0, 42);
        vgic.dist_mut().enable_dist();

        vgic.set_pending_irq(0, 42, &mut host).unwrap();

        assert_eq!(host.loaded, vec![(0, 0, 42)]);
        assert_eq!(vgic.inject_state(0).lr(0), Some(42));
        assert!(vgic.dist().is_pending(42, 0));
    }

    #[test]
    fn s2_lr_overflow_then_on_lr_freed_promotes() {
        let mut vgic = Vgic::new(GicConfig::new(), 1);
        let mut host = MockHost::new(1);
        vgic.dist_mut().enable_dist();
        for virq in 32..37 {
            vgic.register_irq(0, virq, noop_ack, 0).unwrap();
            vgic.enable_irq(0, virq);
        }

        for virq in 32..37 {
            vgic.set_pending_irq(0, virq, &mut host).unwrap();
        }

        assert_eq!(host.loaded.len(), 4);
        assert_eq!(vgic.inject_state(0).queue_len(), 1);

        // Simulate the maintenance handler observing LR 0 (holding virq 32)
        // retire.
        vgic.on_lr_freed(0, 0, &mut host).unwrap();
        assert_eq!(host.loaded.len(), 5);
        assert_eq!(host.loaded[4], (0, 0, 36));
        assert_eq!(vgic.inject_state(0).queue_len(), 0);
        assert_eq!(vgic.inject_state(0).lr(0), Some(36));
    }

    #[test]
    fn s2_on_lr_freed_on_empty_queue_is_noop() {
        let mut vgic = Vgic::new(GicConfig::new(), 1);
        let mut host = MockHost::new(1);
        vgic.on_lr_freed(0, 0, &mut host).unwrap();
        assert!(host.loaded.is_empty());
    }

    #[test]
    fn s3_sgi_self_targets_only_requester() {
        let mut vgic = Vgic::new(GicConfig::new(), 2);
        let mut host = MockHost::new(2);
        vgic.dist_mut().enable_dist();
        for vcpu in 0..2 {
            vgic.register_irq(vcpu, 3, noop_ack, 0).unwrap();
            vgic.enable_irq(vcpu, 3);
        }

        vgic.dispatch_sgi(1, (2 << 24) | 3, &mut host);

        assert_eq!(host.loaded, vec![(1, 0, 3)]);
    }

    #[test]
    fn s4_sgi_others_skips_requester_and_offline_vcpus() {
        let mut vgic = Vgic::new(GicConfig::new(), 4);
        let mut host = MockHost::new(4);
        host.online[2] = false;
        vgic.dist_mut().enable_dist();
        for vcpu in 0..4 {
            vgic.register_irq(vcpu, 5, noop_ack, 0).unwrap();
            vgic.enable_irq(vcpu, 5);
        }

        vgic.dispatch_sgi(0, (1 << 24) | 5, &mut host);

        let mut targeted: Vec<usize> = host.loaded.iter().map(|(v, _, _)| *v).collect();
        targeted.sort();
        assert_eq!(targeted, vec![1, 3]);
    }

    #[test]
    fn s5_enable_of_quiescent_irq_acks_handler() {
        let mut vgic = Vgic::new(GicConfig::new(), 1);
        vgic.register_irq(0, 50, counting_ack, 0).unwrap();
        let before = acked().load(core::sync::atomic::Ordering::SeqCst);

        vgic.enable_irq(0, 50);

        assert_eq!(
            acked().load(core::sync::atomic::Ordering::SeqCst),
            before + 1
        );
    }

    #[test]
    fn disable_sgi_is_a_noop() {
        let mut vgic = Vgic::new(GicConfig::new(), 1);
        vgic.enable_irq(0, 3);
        assert!(vgic.dist().is_enabled(3, 0));
        vgic.disable_irq(0, 3);
        assert!(vgic.dist().is_enabled(3, 0));
    }

    #[test]
    fn set_pending_on_disabled_dist_is_not_deliverable() {
        let mut vgic = Vgic::new(GicConfig::new(), 1);
        let mut host = MockHost::new(1);
        vgic.register_irq(0, 60, noop_ack, 0).unwrap();
        vgic.enable_irq(0, 60);
        // distributor left disabled.

        let res = vgic.set_pending_irq(0, 60, &mut host);

        assert_eq!(res, Err(GicError::NotDeliverable));
        assert!(!vgic.dist().is_pending(60, 0));
    }

    #[test]
    fn set_pending_already_pending_is_noop() {
        let mut vgic = Vgic::new(GicConfig::new(), 1);
        let mut host = MockHost::new(1);
        vgic.dist_mut().enable_dist();
        vgic.register_irq(0, 70, noop_ack, 0).unwrap();
        vgic.enable_irq(0, 70);

        vgic.set_pending_irq(0, 70, &mut host).unwrap();
        let loaded_after_first = host.loaded.len();
        vgic.set_pending_irq(0, 70, &mut host).unwrap();

        assert_eq!(host.loaded.len(), loaded_after_first);
        assert_eq!(vgic.inject_state(0).queue_len(), 0);
    }

    #[test]
    fn register_irq_rejects_duplicate_and_full_table() {
        let mut vgic = Vgic::new(
            GicConfig {
                max_virqs: 1,
                ..GicConfig::new()
            },
            1,
        );
        vgic.register_irq(0, 32, noop_ack, 0).unwrap();
        assert_eq!(
            vgic.register_irq(0, 32, noop_ack, 0),
            Err(GicError::AlreadyRegistered)
        );
        assert_eq!(
            vgic.register_irq(0, 33, noop_ack, 0),
            Err(GicError::NoSpace)
        );
    }
}
