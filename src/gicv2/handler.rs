//! VIRQ handler registry: the bookkeeping table of registered interrupt
//! sources and their ack callbacks (component B).

use alloc::vec;
use alloc::vec::Vec;

use crate::config::GIC_SPI_IRQ_MIN;
use crate::error::{GicError, GicResult};

/// Opaque back-reference a backend registers alongside its ack callback.
/// The core never interprets this; it is handed back verbatim to `ack`.
pub type Token = usize;

/// An ack callback: invoked with `(vcpu, virq, token)` when the core wants
/// to tell a backend that a virq it owns may be re-raised.
pub type AckFn = fn(vcpu: usize, virq: u32, token: Token);

/// A registered interrupt source.
#[derive(Clone, Copy)]
pub struct VirqHandler {
    pub virq: u32,
    pub ack: AckFn,
    pub token: Token,
}

impl VirqHandler {
    fn new(virq: u32, ack: AckFn, token: Token) -> Self {
        Self { virq, ack, token }
    }

    /// Invokes this handler's ack callback.
    pub fn ack(&self, vcpu: usize) {
        (self.ack)(vcpu, self.virq, self.token);
    }
}

/// Registry of [`VirqHandler`]s: an indexed per-vCPU slot for SGI/PPI, and
/// a linearly-scanned global table for SPI.
pub struct HandlerTable {
    /// `sgi_ppi[vcpu][virq]` for `virq in 0..32`.
    sgi_ppi: Vec<[Option<VirqHandler>; 32]>,
    /// Global SPI table, `virq in [32, 1020)`, scanned linearly by virq.
    spi: Vec<Option<VirqHandler>>,
}

impl HandlerTable {
    pub fn new(num_vcpus: usize, max_virqs: usize) -> Self {
        Self {
            sgi_ppi: vec![[None; 32]; num_vcpus],
            spi: vec![None; max_virqs],
        }
    }

    /// Registers a handler for `virq` on `vcpu`.
    ///
    /// SGI/PPI (`virq < 32`) populate the indexed per-vCPU slot; SPI
    /// (`virq >= 32`) take the first empty slot in the global table.
    pub fn register(&mut self, vcpu: usize, virq: u32, ack: AckFn, token: Token) -> GicResult<()> {
        if virq < GIC_SPI_IRQ_MIN {
            let slot = &mut self.sgi_ppi[vcpu][virq as usize];
            if slot.is_some() {
                return Err(GicError::AlreadyRegistered);
            }
            *slot = Some(VirqHandler::new(virq, ack, token));
            Ok(())
        } else {
            if self.spi.iter().flatten().any(|h| h.virq == virq) {
                return Err(GicError::AlreadyRegistered);
            }
            match self.spi.iter_mut().find(|slot| slot.is_none()) {
                Some(slot) => {
                    *slot = Some(VirqHandler::new(virq, ack, token));
                    Ok(())
                }
                None => Err(GicError::NoSpace),
            }
        }
    }

    /// Looks up the handler for `virq` on `vcpu`. SGI/PPI is O(1) indexed;
    /// SPI is O(`max_virqs`) linear.
    pub fn find(&self, vcpu: usize, virq: u32) -> Option<&VirqHandler> {
        if virq < GIC_SPI_IRQ_MIN {
            self.sgi_ppi[vcpu][virq as usize].as_ref()
        } else {
            self.spi.iter().flatten().find(|h| h.virq == virq)
        }
    }

    /// Invokes `handler`'s ack callback for `vcpu`.
    pub fn ack(&self, vcpu: usize, handler: &VirqHandler) {
        handler.ack(vcpu);
    }
}
