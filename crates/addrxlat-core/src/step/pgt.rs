//! Per-PTE-format page table walkers.
//!
//! One function per format, dispatched from [`step`] by a single `match`
//! on [`PteFormat`] — the only method kind whose internals are *not* one
//! `match` arm is [`crate::method::MethodKind::Custom`] (see the design
//! notes on tagged variants over virtual dispatch).

use tracing::trace;

use crate::{
    address::AddrSpace,
    error::AddrXlatError,
    method::{PagingForm, PteFormat},
    step::{squash_offset, StepState},
    Address,
};

/// Advances `state` by one page-table level using `form`.
///
/// `pte_mask` is ANDed-out of every raw PTE before interpretation (a
/// "clear mask": bits set in `pte_mask` are cleared from the raw value,
/// so the default of `0` is a no-op — see DESIGN.md for why this reading
/// of "ANDed into" was chosen over the literal one).
pub fn step(
    state: &mut StepState<'_>,
    form: &PagingForm,
    pte_mask: u64,
    target_as: AddrSpace,
) -> Result<(), AddrXlatError> {
    match form.pte_format {
        PteFormat::None => Err(AddrXlatError::NoMeth("paging form has no PTE format".into())),
        PteFormat::Pfn32 => step_pfn(state, form, pte_mask, target_as, 4),
        PteFormat::Pfn64 => step_pfn(state, form, pte_mask, target_as, 8),
        PteFormat::Ia32 => step_x86(state, form, pte_mask, target_as, 4),
        PteFormat::Ia32Pae => step_x86(state, form, pte_mask, target_as, 8),
        PteFormat::X86_64 => step_x86(state, form, pte_mask, target_as, 8),
        PteFormat::Aarch64 => step_aarch64(state, form, pte_mask, target_as, Aarch64Variant::Classic),
        PteFormat::Aarch64Lpa => step_aarch64(state, form, pte_mask, target_as, Aarch64Variant::Lpa),
        PteFormat::Aarch64Lpa2 => step_aarch64(state, form, pte_mask, target_as, Aarch64Variant::Lpa2),
        PteFormat::S390X => step_s390x(state, form, pte_mask, target_as),
        PteFormat::Ppc64LinuxRpn30 => step_ppc64_linux_rpn30(state, form, pte_mask, target_as),
    }
}

fn read_pte(state: &mut StepState<'_>, width: u8) -> Result<u64, AddrXlatError> {
    let entry_addr = state.base.wrapping_add(state.idx[state.remain] * width as u64);
    let value = match width {
        4 => state.ctx.read32(entry_addr, "pte")? as u64,
        8 => state.ctx.read64(entry_addr, "pte")?,
        _ => unreachable!("pte width is always 4 or 8"),
    };
    trace!(%entry_addr, value, "step: pgt read");
    Ok(value)
}

fn not_present(state: &StepState<'_>, what: &str) -> Result<(), AddrXlatError> {
    if !state.ctx.is_notpresent_suppressed() {
        state.ctx.prefix_err(&format!("{what} is not present"));
    }
    Err(AddrXlatError::NotPresent)
}

/// Bounds a 64-bit leaf PTE's output address to bits `12..=51`. x86-64
/// and s390x both park per-PTE flags above bit 51 on a present leaf entry
/// (NX at bit 63, protection-key bits `62:52` on x86-64) that must not
/// leak into the extracted physical address; 32-bit (non-PAE) IA32 PTEs
/// need no such mask since they're read as a 32-bit value to begin with.
const PHYS_ADDR_MASK: u64 = 0x000f_ffff_ffff_f000;

fn pfn_mask(form: &PagingForm, width: u8) -> u64 {
    let low = !((1u64 << form.page_shift()) - 1);
    if width == 8 {
        low & PHYS_ADDR_MASK
    } else {
        low
    }
}

/// Terminates the walk with the given page-frame number, squashing the
/// untranslated low-order index bits (levels `0..levels`) into the
/// intra-page offset. Used by every format except the raw PFN ones,
/// which treat the masked PTE as an address rather than a frame number.
fn terminate(state: &mut StepState<'_>, form: &PagingForm, target_as: AddrSpace, pfn: u64, levels: usize) {
    let offset = squash_offset(form, &state.idx, levels);
    state.base = Address::new(target_as, (pfn << form.page_shift()) | offset);
    state.elemsz = 1;
}

fn next_level(state: &mut StepState<'_>, table_addr: u64) {
    // Intermediate page-table addresses stay in the root's address space
    // (typically KPHYSADDR): real page-table roots are read in physical
    // memory, not re-virtualized through a direct map. See DESIGN.md.
    state.base = state.base.with_value(table_addr);
    state.remain -= 1;
}

fn step_pfn(
    state: &mut StepState<'_>,
    form: &PagingForm,
    pte_mask: u64,
    target_as: AddrSpace,
    width: u8,
) -> Result<(), AddrXlatError> {
    let raw = read_pte(state, width)?;
    let pte = raw & !pte_mask;
    state.raw = pte;

    if pte == 0 {
        return not_present(state, "table entry");
    }

    if state.remain == 1 {
        let offset = squash_offset(form, &state.idx, 1);
        state.base = Address::new(target_as, pte | offset);
        state.elemsz = 1;
    } else {
        next_level(state, pte);
    }
    Ok(())
}

fn step_x86(
    state: &mut StepState<'_>,
    form: &PagingForm,
    pte_mask: u64,
    target_as: AddrSpace,
    width: u8,
) -> Result<(), AddrXlatError> {
    let raw = read_pte(state, width)?;
    let pte = raw & !pte_mask;
    state.raw = pte;

    if pte & 0x1 == 0 {
        return not_present(state, "pte");
    }

    let huge = state.remain > 1 && pte & 0x80 != 0;
    let mask = pfn_mask(form, width);

    if huge {
        terminate(state, form, target_as, (pte & mask) >> form.page_shift(), state.remain);
        return Ok(());
    }

    if state.remain == 1 {
        terminate(state, form, target_as, (pte & mask) >> form.page_shift(), 1);
    } else {
        next_level(state, pte & mask);
    }
    Ok(())
}

/// Which AArch64 output-address encoding a [`step_aarch64`] call uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Aarch64Variant {
    /// Classic 48-bit output address.
    Classic,
    /// LPA: bits `[9:8]` of the descriptor widen the output address to
    /// bits `[49:48]`.
    Lpa,
    /// LPA2: as LPA, plus bit `7` widens the output address to bit `50`.
    Lpa2,
}

const AARCH64_ADDR_MASK: u64 = 0x0000_ffff_ffff_f000;

fn aarch64_output_pfn(pte: u64, form: &PagingForm, variant: Aarch64Variant) -> u64 {
    let base = (pte & AARCH64_ADDR_MASK) >> form.page_shift();
    match variant {
        Aarch64Variant::Classic => base,
        Aarch64Variant::Lpa => base | (((pte >> 8) & 0x3) << (48 - form.page_shift())),
        Aarch64Variant::Lpa2 => {
            base | (((pte >> 8) & 0x3) << (48 - form.page_shift())) | (((pte >> 7) & 0x1) << (50 - form.page_shift()))
        }
    }
}

fn step_aarch64(
    state: &mut StepState<'_>,
    form: &PagingForm,
    pte_mask: u64,
    target_as: AddrSpace,
    variant: Aarch64Variant,
) -> Result<(), AddrXlatError> {
    let raw = read_pte(state, 8)?;
    let pte = raw & !pte_mask;
    state.raw = pte;

    let kind = pte & 0x3;
    if kind == 0 || kind == 2 {
        return not_present(state, "pte");
    }

    if state.remain == 1 {
        if kind != 3 {
            return not_present(state, "pte");
        }
        let pfn = aarch64_output_pfn(pte, form, variant);
        terminate(state, form, target_as, pfn, 1);
        return Ok(());
    }

    if kind == 1 {
        let pfn = aarch64_output_pfn(pte, form, variant);
        terminate(state, form, target_as, pfn, state.remain);
        return Ok(());
    }

    next_level(state, pte & AARCH64_ADDR_MASK);
    Ok(())
}

const S390X_INVALID_BIT: u64 = 1 << 5;
const S390X_LARGE_BIT: u64 = 1 << 7;

fn step_s390x(
    state: &mut StepState<'_>,
    form: &PagingForm,
    pte_mask: u64,
    target_as: AddrSpace,
) -> Result<(), AddrXlatError> {
    let raw = read_pte(state, 8)?;
    let pte = raw & !pte_mask;
    state.raw = pte;

    if pte & S390X_INVALID_BIT != 0 {
        return not_present(state, "pte");
    }

    let mask = pfn_mask(form, 8);

    if state.remain > 1 && pte & S390X_LARGE_BIT != 0 {
        terminate(state, form, target_as, (pte & mask) >> form.page_shift(), state.remain);
        return Ok(());
    }

    if state.remain == 1 {
        terminate(state, form, target_as, (pte & mask) >> form.page_shift(), 1);
    } else {
        next_level(state, pte & mask);
    }
    Ok(())
}

/// PPC64 Linux RPN shift: the only PTE format spec.md names for ppc64,
/// ported from `pgt_ppc64_linux_rpn30` in `original_source/ppc64.c`.
const PPC64_RPN_SHIFT: u32 = 30;

/// Huge-PTE marker: bottom two bits of a leaf-level entry non-zero.
const PPC64_HUGE_PTE_MASK: u64 = 0x3;

/// Huge page directory marker: the entry's top bit is zero.
const PPC64_PD_HUGE: u64 = 1 << 63;

/// Low six bits of a huge-PD entry, shifted right by 2, index this table
/// (ported verbatim from `ppc64.c`'s `mmu_pshift`).
const PPC64_HUGEPD_SHIFT_MASK: u64 = 0x3f;

const PPC64_MMU_PSHIFT: [u32; 14] = [12, 14, 16, 16, 18, 20, 22, 23, 24, 26, 28, 30, 34, 36];

fn ppc64_is_hugepte(pte: u64) -> bool {
    pte & PPC64_HUGE_PTE_MASK != 0
}

fn ppc64_is_hugepd(pte: u64) -> bool {
    pte & PPC64_PD_HUGE == 0
}

fn ppc64_huge_page(state: &mut StepState<'_>, form: &PagingForm, pte: u64, target_as: AddrSpace) {
    let pfn = pte >> PPC64_RPN_SHIFT;
    let offset = squash_offset(form, &state.idx, state.remain);
    state.base = Address::new(target_as, (pfn << form.page_shift()) | offset);
    state.elemsz = 1;
}

fn ppc64_huge_pd(state: &mut StepState<'_>, form: &PagingForm, pte: u64) -> Result<(), AddrXlatError> {
    let mmu_psize = ((pte & PPC64_HUGEPD_SHIFT_MASK) >> 2) as usize;
    let pdshift = *PPC64_MMU_PSHIFT
        .get(mmu_psize)
        .ok_or_else(|| AddrXlatError::Invalid(format!("invalid hugepd mmu page size {mmu_psize}")))?;

    let mut off: u64 = 0;
    let mut i = state.remain;
    while i > 1 {
        i -= 1;
        off |= state.idx[i];
        off <<= form.field_sizes[i - 1] as u32;
    }

    state.idx[1] = off >> pdshift;
    off &= (1u64 << pdshift) - 1;
    state.idx[0] |= off;

    state.base = Address::new(AddrSpace::KVAddr, (pte & !PPC64_HUGEPD_SHIFT_MASK) | PPC64_PD_HUGE);
    state.remain = 2;
    Ok(())
}

fn step_ppc64_linux_rpn30(
    state: &mut StepState<'_>,
    form: &PagingForm,
    pte_mask: u64,
    target_as: AddrSpace,
) -> Result<(), AddrXlatError> {
    let raw = read_pte(state, 8)?;
    let pte = raw & !pte_mask;
    state.raw = pte;

    if pte == 0 {
        return not_present(state, &format!("level {} pte", state.remain));
    }

    if state.remain > 1 {
        if ppc64_is_hugepte(pte) {
            ppc64_huge_page(state, form, pte, target_as);
            return Ok(());
        }
        if ppc64_is_hugepd(pte) {
            return ppc64_huge_pd(state, form, pte);
        }

        let table_size = 1u64 << (form.field_sizes[state.remain - 1] as u32 + 3);
        next_level(state, pte & !(table_size - 1));
    } else {
        terminate(state, form, target_as, pte >> PPC64_RPN_SHIFT, 1);
    }
    Ok(())
}
