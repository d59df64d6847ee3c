//! Linux/aarch64 OS initialization: a 4-level, 48-bit VA walk plus the
//! linear (direct) map, vmemmap, and machphys identity methods.
//!
//! No original-source file covers this architecture; the kernel-VA
//! split and `PAGE_OFFSET`/`VMEMMAP_START` constants follow the
//! well-known Linux/arm64 48-bit layout (`Documentation/arm64/memory.rst`).
//! The PTE format defaults to the classic encoding; `AARCH64_LPA`/`LPA2`
//! require a wider output-address field the option parser has no slot
//! for yet, so only the classic format is selectable here.

use crate::{
    address::AddrSpace,
    context::ContextOps,
    error::AddrXlatError,
    method::{Method, MethodKind, PagingForm, PteFormat},
    options::ParsedOpts,
    osinit::{install_regions, SysRegion},
    reader::SymQuery,
    system::{sys_meth, MapDirection, System},
    Address,
};

const PAGE_OFFSET: u64 = 0xffff_0000_0000_0000;
const VMEMMAP_START: u64 = 0xffff_7e00_0000_0000;
const KIMAGE_VADDR: u64 = 0xffff_8000_0000_0000;
const USER_END: u64 = 0x0000_ffff_ffff_ffff;

fn get_symval(ctx: &dyn ContextOps, name: &'static str) -> Result<u64, AddrXlatError> {
    ctx.sym(SymQuery::Value(name))
}

pub fn init_linux(ctx: &dyn ContextOps, popt: &ParsedOpts, sys: &mut System) -> Result<(), AddrXlatError> {
    let pagesize = popt.pagesize.unwrap_or(4096);
    if pagesize != 4096 {
        return Err(AddrXlatError::NotImpl(format!("unsupported page size: {pagesize}")));
    }
    let levels = popt.levels.unwrap_or(4);
    let widths: &[u8] = match levels {
        3 => &[12, 9, 9, 9],
        4 => &[12, 9, 9, 9, 9],
        other => return Err(AddrXlatError::NotImpl(format!("unsupported paging depth: {other}"))),
    };
    let form = PagingForm::new(PteFormat::Aarch64, widths);
    let pte_mask = popt.pte_mask.unwrap_or(0);
    let phys_base = popt.phys_base.unwrap_or(0);

    let root = if let Some(full) = popt.rootpgt {
        Address::new(full.space, full.value)
    } else {
        match get_symval(ctx, "swapper_pg_dir") {
            Ok(addr) => Address::new(AddrSpace::KVAddr, addr),
            Err(_) => Address::none(),
        }
    };

    sys.set_meth(
        sys_meth::ROOT_PGT,
        Method { kind: MethodKind::Pgt { form, root, pte_mask }, target_as: AddrSpace::KPhysAddr },
    );
    sys.set_meth(
        sys_meth::DIRECT,
        Method {
            kind: MethodKind::Linear { offset: phys_base.wrapping_sub(PAGE_OFFSET) as i64 },
            target_as: AddrSpace::KPhysAddr,
        },
    );
    sys.set_meth(
        sys_meth::VMEMMAP,
        Method {
            kind: MethodKind::Linear { offset: phys_base.wrapping_sub(VMEMMAP_START) as i64 },
            target_as: AddrSpace::KPhysAddr,
        },
    );
    sys.set_meth(
        sys_meth::MACHPHYS_KPHYS,
        Method { kind: MethodKind::Linear { offset: 0 }, target_as: AddrSpace::KPhysAddr },
    );
    sys.set_meth(
        sys_meth::KPHYS_MACHPHYS,
        Method { kind: MethodKind::Linear { offset: 0 }, target_as: AddrSpace::MachPhysAddr },
    );

    let kv_phys_layout = [
        SysRegion { first: 0, last: USER_END, meth: sys_meth::ROOT_PGT },
        SysRegion { first: PAGE_OFFSET, last: VMEMMAP_START - 1, meth: sys_meth::DIRECT },
        SysRegion { first: VMEMMAP_START, last: KIMAGE_VADDR - 1, meth: sys_meth::VMEMMAP },
        SysRegion { first: KIMAGE_VADDR, last: u64::MAX, meth: sys_meth::ROOT_PGT },
    ];
    install_regions(sys.map_mut(MapDirection::KvPhys), &kv_phys_layout);
    sys.map_mut(MapDirection::MachphysKphys).set(0, u64::MAX, sys_meth::MACHPHYS_KPHYS);
    sys.map_mut(MapDirection::KphysMachphys).set(0, u64::MAX, sys_meth::KPHYS_MACHPHYS);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::ReadCaps;

    struct NoSyms;
    impl ContextOps for NoSyms {
        fn read32(&self, _addr: Address, _what: &'static str) -> Result<u32, AddrXlatError> {
            unimplemented!()
        }
        fn read64(&self, _addr: Address, _what: &'static str) -> Result<u64, AddrXlatError> {
            unimplemented!()
        }
        fn sym(&self, _query: SymQuery<'_>) -> Result<u64, AddrXlatError> {
            Err(AddrXlatError::NoData("no symbols".into()))
        }
        fn read_caps(&self) -> ReadCaps {
            ReadCaps::all()
        }
        fn prefix_err(&self, _msg: &dyn std::fmt::Display) {}
        fn bury(&self, _addr: Address) {}
        fn is_notpresent_suppressed(&self) -> bool {
            false
        }
    }

    #[test]
    fn installs_direct_map_and_root_pgt_regions() {
        let mut sys = System::empty();
        init_linux(&NoSyms, &ParsedOpts::default(), &mut sys).unwrap();
        assert_eq!(sys.map(MapDirection::KvPhys).lookup(PAGE_OFFSET), sys_meth::DIRECT);
        assert_eq!(sys.map(MapDirection::KvPhys).lookup(0), sys_meth::ROOT_PGT);
        assert_eq!(sys.map(MapDirection::KvPhys).lookup(VMEMMAP_START), sys_meth::VMEMMAP);
    }

    #[test]
    fn three_level_form_selected_via_levels_option() {
        let mut sys = System::empty();
        let mut popt = ParsedOpts::default();
        popt.levels = Some(3);
        init_linux(&NoSyms, &popt, &mut sys).unwrap();
        match &sys.meth(sys_meth::ROOT_PGT).unwrap().kind {
            MethodKind::Pgt { form, .. } => assert_eq!(form.levels(), 3),
            other => panic!("expected Pgt, got {other:?}"),
        }
    }
}
