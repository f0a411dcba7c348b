//! MMIO fault dispatcher (component D): decodes an offset within the 4 KiB
//! distributor window into a register bank and dispatches to the matching
//! read or write handler.

use log::{error, warn};

use crate::fault::MmioFault;
use crate::host::HostEnv;

use super::consts::*;
use super::vgic::Vgic;

/// Handles one decoded MMIO access into the distributor window.
///
/// Reads fill in `fault`'s data and resume the guest; writes apply the
/// register's semantics (bit-iterated or word-granular, per §4.D) and then
/// resume the guest. Unknown or unimplemented offsets are logged and
/// resumed as a no-op so the guest never livelocks on an emulation gap.
pub fn handle_dist_fault(vgic: &mut Vgic, vcpu: usize, fault: &mut dyn MmioFault, host: &mut dyn HostEnv) {
    let offset = fault.address();

    if offset == CTLR {
        if fault.is_read() {
            read_word(fault, vgic.dist().ctlr());
        } else {
            let word = fault.emulate(vgic.dist().ctlr());
            vgic.dist_mut().set_ctlr(word);
            fault.advance();
        }
    } else if offset == TYPER {
        read_only(fault, vgic.dist().typer());
    } else if offset == IIDR {
        read_only(fault, vgic.dist().iidr());
    } else if offset == IGROUPR0 {
        if fault.is_read() {
            read_word(fault, vgic.dist().group0_word(vcpu));
        } else {
            let word = fault.emulate(vgic.dist().group0_word(vcpu));
            vgic.dist_mut().set_group0_word(vcpu, word);
            fault.advance();
        }
    } else if (IGROUPR0 + 4..IGROUPR_END).contains(&offset) {
        let reg = (offset - IGROUPR0) / 4 - 1;
        if fault.is_read() {
            read_word(fault, vgic.dist().group_word(reg));
        } else {
            let word = fault.emulate(vgic.dist().group_word(reg));
            vgic.dist_mut().set_group_word(reg, word);
            fault.advance();
        }
    } else if (ISENABLER0_OFFSET..ISENABLER_END).contains(&offset) {
        let reg = (offset - ISENABLER0_OFFSET) / 4;
        if fault.is_read() {
            read_word(fault, vgic.dist().enable_set_word(vcpu, reg));
        } else {
            for_each_set_bit(fault, reg, |v, irq| v.enable_irq(vcpu, irq), vgic);
            fault.advance();
        }
    } else if (ICENABLER0_OFFSET..ICENABLER_END).contains(&offset) {
        let reg = (offset - ICENABLER0_OFFSET) / 4;
        if fault.is_read() {
            read_word(fault, vgic.dist().enable_clr_word(vcpu, reg));
        } else {
            for_each_set_bit(fault, reg, |v, irq| v.disable_irq(vcpu, irq), vgic);
            fault.advance();
        }
    } else if (ISPENDR0_OFFSET..ISPENDR_END).contains(&offset) {
        let reg = (offset - ISPENDR0_OFFSET) / 4;
        if fault.is_read() {
            read_word(fault, vgic.dist().pending_set_word(vcpu, reg));
        } else {
            for_each_set_bit_fallible(fault, reg, |v, irq| v.set_pending_irq(vcpu, irq, host), vgic);
            fault.advance();
        }
    } else if (ICPENDR0_OFFSET..ICPENDR_END).contains(&offset) {
        let reg = (offset - ICPENDR0_OFFSET) / 4;
        if fault.is_read() {
            read_word(fault, vgic.dist().pending_clr_word(vcpu, reg));
        } else {
            for_each_set_bit(fault, reg, |v, irq| v.clr_pending_irq(vcpu, irq), vgic);
            fault.advance();
        }
    } else if (ISACTIVER0_OFFSET..ISACTIVER_END).contains(&offset) {
        let reg = (offset - ISACTIVER0_OFFSET) / 4;
        if fault.is_read() {
            read_word(fault, vgic.dist().active_word(vcpu, reg));
        } else {
            // Paired-bank invariant: ISACTIVER and ICACTIVER both read back
            // the same active state, so a write through either one must
            // update both the active and active_clr words.
            let word = fault.emulate(vgic.dist().active_word(vcpu, reg));
            vgic.dist_mut().set_active_word(vcpu, reg, word);
            vgic.dist_mut().set_active_clr_word(vcpu, reg, word);
            fault.advance();
        }
    } else if (ICACTIVER0_OFFSET..ICACTIVER_END).contains(&offset) {
        let reg = (offset - ICACTIVER0_OFFSET) / 4;
        if fault.is_read() {
            read_word(fault, vgic.dist().active_clr_word(vcpu, reg));
        } else {
            let word = fault.emulate(vgic.dist().active_clr_word(vcpu, reg));
            vgic.dist_mut().set_active_clr_word(vcpu, reg, word);
            vgic.dist_mut().set_active_word(vcpu, reg, word);
            fault.advance();
        }
    } else if (IPRIORITYR0_OFFSET..IPRIORITYR_END).contains(&offset) {
        let reg = (offset - IPRIORITYR0_OFFSET) / 4;
        if fault.is_read() {
            let word = priority_word(vgic, vcpu, reg);
            read_word(fault, word);
        } else {
            ignored_write(fault, offset);
        }
    } else if (ITARGETSR0_OFFSET..ITARGETSR_END).contains(&offset) {
        let reg = (offset - ITARGETSR0_OFFSET) / 4;
        if fault.is_read() {
            let word = targets_word(vgic, vcpu, reg);
            read_word(fault, word);
        } else {
            ignored_write(fault, offset);
        }
    } else if (ICFGR0_OFFSET..ICFGR_END).contains(&offset) {
        let reg = (offset - ICFGR0_OFFSET) / 4;
        if fault.is_read() {
            read_word(fault, vgic.dist().config_word(reg));
        } else {
            ignored_write(fault, offset);
        }
    } else if (SPI_EXT_START..SPI_EXT_END).contains(&offset) {
        let reg = (offset - SPI_EXT_START) / 4;
        if fault.is_read() {
            read_word(fault, vgic.dist().spi_ext_word(reg));
        } else {
            ignored_write(fault, offset);
        }
    } else if offset == SGIR {
        if fault.is_read() {
            read_word(fault, vgic.dist().sgi_control());
        } else {
            let value = fault.data() & fault.data_mask();
            vgic.dist_mut().set_sgi_control(value);
            vgic.dispatch_sgi(vcpu, value, host);
            fault.advance();
        }
    } else if (CPENDSGIR0_OFFSET..SPENDSGIR_END).contains(&offset) {
        let reg = (offset - CPENDSGIR0_OFFSET) / 4;
        if fault.is_read() {
            let word = sgi_pending_word(vgic, vcpu, reg);
            read_word(fault, word);
        } else {
            warn!(
                "vgic: {} (offset {offset:#x})",
                crate::error::GicError::UnimplementedSgiPendingWrite
            );
            fault.ignore();
        }
    } else if (PERIPH_ID_START..PERIPH_ID_END).contains(&offset) {
        let byte = vgic.dist().periph_id_byte(offset - PERIPH_ID_START);
        if fault.is_read() {
            read_word(fault, byte as u32);
        } else {
            ignored_write(fault, offset);
        }
    } else {
        error!(
            "vgic: {} (offset {offset:#x})",
            crate::error::GicError::IgnoredAccess
        );
        fault.ignore();
    }
}

fn read_word(fault: &mut dyn MmioFault, word: u32) {
    fault.set_data(word & fault.data_mask());
    fault.advance();
}

fn read_only(fault: &mut dyn MmioFault, word: u32) {
    if fault.is_read() {
        read_word(fault, word);
    } else {
        let offset = fault.address();
        ignored_write(fault, offset);
    }
}

fn ignored_write(fault: &mut dyn MmioFault, offset: usize) {
    warn!(
        "vgic: {} (offset {offset:#x})",
        crate::error::GicError::IgnoredAccess
    );
    fault.ignore();
}

/// Bit-iterated write: for every set bit in `data & data_mask`, compute the
/// virq from `(reg, bit)` and invoke `op`.
fn for_each_set_bit(fault: &dyn MmioFault, reg: usize, mut op: impl FnMut(&mut Vgic, u32), vgic: &mut Vgic) {
    let mut data = fault.data() & fault.data_mask();
    while data != 0 {
        let bit = data.trailing_zeros();
        data &= !(1 << bit);
        let irq = bit + (reg as u32) * 32;
        op(vgic, irq);
    }
}

/// Same as [`for_each_set_bit`] but for operations that can fail
/// (`set_pending_irq`'s `NotDeliverable`); failures are dropped silently
/// per the spec's propagation policy — the MMIO writer never surfaces
/// "not deliverable" to the guest.
fn for_each_set_bit_fallible(
    fault: &dyn MmioFault,
    reg: usize,
    mut op: impl FnMut(&mut Vgic, u32) -> crate::error::GicResult<()>,
    vgic: &mut Vgic,
) {
    let mut data = fault.data() & fault.data_mask();
    while data != 0 {
        let bit = data.trailing_zeros();
        data &= !(1 << bit);
        let irq = bit + (reg as u32) * 32;
        let _ = op(vgic, irq);
    }
}

fn priority_word(vgic: &Vgic, vcpu: usize, reg: usize) -> u32 {
    let base = reg * 4;
    let d = vgic.dist();
    (d.priority_byte(vcpu, base) as u32)
        | ((d.priority_byte(vcpu, base + 1) as u32) << 8)
        | ((d.priority_byte(vcpu, base + 2) as u32) << 16)
        | ((d.priority_byte(vcpu, base + 3) as u32) << 24)
}

fn targets_word(vgic: &Vgic, vcpu: usize, reg: usize) -> u32 {
    let base = reg * 4;
    let d = vgic.dist();
    (d.targets_byte(vcpu, base) as u32)
        | ((d.targets_byte(vcpu, base + 1) as u32) << 8)
        | ((d.targets_byte(vcpu, base + 2) as u32) << 16)
        | ((d.targets_byte(vcpu, base + 3) as u32) << 24)
}

fn sgi_pending_word(vgic: &Vgic, vcpu: usize, reg: usize) -> u32 {
    // CPENDSGIR0..3 then SPENDSGIR0..3: both read from the same
    // clear/set-pending byte bank per the paired-bank invariant (writes
    // are rejected, see the CPENDSGIR/SPENDSGIR branch above).
    let d = vgic.dist();
    let bytes = if reg < 4 {
        [
            d.sgi_pending_clr_byte(vcpu, 0),
            d.sgi_pending_clr_byte(vcpu, 1),
            d.sgi_pending_clr_byte(vcpu, 2),
            d.sgi_pending_clr_byte(vcpu, 3),
        ]
    } else {
        [
            d.sgi_pending_set_byte(vcpu, 0),
            d.sgi_pending_set_byte(vcpu, 1),
            d.sgi_pending_set_byte(vcpu, 2),
            d.sgi_pending_set_byte(vcpu, 3),
        ]
    };
    u32::from_le_bytes(bytes)
}
