//! Linux/x86-64 OS initialization: 4- or 5-level paging, direct map,
//! kernel text, and vmemmap.
//!
//! No original-source file covers this architecture; the virtual
//! memory layout constants below are the well-known Linux x86-64 ranges
//! (`Documentation/x86/x86_64/mm.rst`), and the vmemmap method is
//! installed as a `LINEAR` mapping rather than the sparse-vmemmap
//! `MEMARR` form — see DESIGN.md.

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

const PAGE_OFFSET_4L: u64 = 0xffff_8880_0000_0000;
const VMEMMAP_START_4L: u64 = 0xffff_ea00_0000_0000;
const USER_END_4L: u64 = 0x0000_7fff_ffff_ffff;

const PAGE_OFFSET_5L: u64 = 0xff11_0000_0000_0000;
const VMEMMAP_START_5L: u64 = 0xffd4_0000_0000_0000;
const USER_END_5L: u64 = 0x00ff_ffff_ffff_ffff;

const KERNEL_TEXT_START: u64 = 0xffff_ffff_8000_0000;
const KERNEL_TEXT_PHYS_BASE: u64 = 0x0100_0000;

fn get_symval(ctx: &dyn ContextOps, name: &'static str) -> Result<u64, AddrXlatError> {
    ctx.sym(SymQuery::Value(name))
}

pub fn init_linux(ctx: &dyn ContextOps, popt: &ParsedOpts, sys: &mut System) -> Result<(), AddrXlatError> {
    let levels = popt.levels.unwrap_or(4);
    let pagesize = popt.pagesize.unwrap_or(4096);
    if pagesize != 4096 {
        return Err(AddrXlatError::NotImpl(format!("unsupported page size: {pagesize}")));
    }

    let (widths, page_offset, vmemmap_start, user_end): (&[u8], u64, u64, u64) = match levels {
        4 => (&[12, 9, 9, 9, 9], PAGE_OFFSET_4L, VMEMMAP_START_4L, USER_END_4L),
        5 => (&[12, 9, 9, 9, 9, 9], PAGE_OFFSET_5L, VMEMMAP_START_5L, USER_END_5L),
        other => return Err(AddrXlatError::NotImpl(format!("unsupported paging depth: {other}"))),
    };

    let form = PagingForm::new(PteFormat::X86_64, widths);
    let pte_mask = popt.pte_mask.unwrap_or(0);
    let phys_base = popt.phys_base.unwrap_or(0);

    let root = if let Some(full) = popt.rootpgt {
        Address::new(full.space, full.value)
    } else {
        match get_symval(ctx, "init_top_pgt").or_else(|_| get_symval(ctx, "init_level4_pgt")) {
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
            kind: MethodKind::Linear { offset: phys_base.wrapping_sub(page_offset) as i64 },
            target_as: AddrSpace::KPhysAddr,
        },
    );
    sys.set_meth(
        sys_meth::KERNEL_TEXT,
        Method {
            kind: MethodKind::Linear { offset: KERNEL_TEXT_PHYS_BASE.wrapping_sub(KERNEL_TEXT_START) as i64 },
            target_as: AddrSpace::KPhysAddr,
        },
    );
    sys.set_meth(
        sys_meth::VMEMMAP,
        Method {
            kind: MethodKind::Linear { offset: phys_base.wrapping_sub(vmemmap_start) as i64 },
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
        SysRegion { first: 0, last: user_end, meth: sys_meth::ROOT_PGT },
        SysRegion { first: page_offset, last: vmemmap_start - 1, meth: sys_meth::DIRECT },
        SysRegion { first: vmemmap_start, last: KERNEL_TEXT_START - 1, meth: sys_meth::VMEMMAP },
        SysRegion { first: KERNEL_TEXT_START, last: u64::MAX, meth: sys_meth::KERNEL_TEXT },
    ];
    install_regions(sys.map_mut(MapDirection::KvPhys), &kv_phys_layout);

    sys.map_mut(MapDirection::MachphysKphys).set(0, u64::MAX, sys_meth::MACHPHYS_KPHYS);
    sys.map_mut(MapDirection::KphysMachphys).set(0, u64::MAX, sys_meth::KPHYS_MACHPHYS);

    // A Xen domain running without auto-translated physmap (`xen_xlat=no`)
    // has no hardware identity between machine- and kernel-physical
    // addresses; machphys->kphys must instead index the guest's P2M table,
    // an array of kernel-physical frame numbers keyed by machine frame
    // number, whose own location is given as an MFN via `xen_p2m_mfn`.
    if popt.xen_xlat == Some(false) {
        if let Some(mfn) = popt.xen_p2m_mfn {
            sys.set_meth(
                sys_meth::MACHPHYS_KPHYS,
                Method {
                    kind: MethodKind::Memarr {
                        base: Address::new(AddrSpace::MachPhysAddr, (mfn as u64) << 12),
                        shift: 12,
                        elemsz: 8,
                        valsz: 8,
                    },
                    target_as: AddrSpace::KPhysAddr,
                },
            );
            sys.map_mut(MapDirection::MachphysKphys).set(0, u64::MAX, sys_meth::MACHPHYS_KPHYS);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{address::ReadCaps, map::METH_NONE, reader::PageBuf};

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
    fn four_level_default_installs_root_and_direct_map() {
        let mut sys = System::empty();
        let popt = ParsedOpts::default();
        init_linux(&NoSyms, &popt, &mut sys).unwrap();

        assert!(!sys.meth(sys_meth::ROOT_PGT).unwrap().is_none());
        assert_eq!(sys.map(MapDirection::KvPhys).lookup(PAGE_OFFSET_4L), sys_meth::DIRECT);
        assert_eq!(sys.map(MapDirection::KvPhys).lookup(USER_END_4L), sys_meth::ROOT_PGT);
        assert_ne!(sys.map(MapDirection::KvPhys).lookup(VMEMMAP_START_4L), METH_NONE);
    }

    #[test]
    fn explicit_rootpgt_option_overrides_symbol_lookup() {
        use crate::options::OptFullAddr;
        let mut sys = System::empty();
        let mut popt = ParsedOpts::default();
        popt.rootpgt = Some(OptFullAddr { space: AddrSpace::KPhysAddr, value: 0x1000 });
        init_linux(&NoSyms, &popt, &mut sys).unwrap();

        match &sys.meth(sys_meth::ROOT_PGT).unwrap().kind {
            MethodKind::Pgt { root, .. } => assert_eq!(*root, Address::new(AddrSpace::KPhysAddr, 0x1000)),
            other => panic!("expected Pgt, got {other:?}"),
        }
    }

    #[test]
    fn xen_non_auto_translated_installs_p2m_memarr() {
        let mut sys = System::empty();
        let mut popt = ParsedOpts::default();
        popt.xen_xlat = Some(false);
        popt.xen_p2m_mfn = Some(0x1234);
        init_linux(&NoSyms, &popt, &mut sys).unwrap();

        match &sys.meth(sys_meth::MACHPHYS_KPHYS).unwrap().kind {
            MethodKind::Memarr { base, .. } => {
                assert_eq!(*base, Address::new(AddrSpace::MachPhysAddr, 0x1234 << 12));
            }
            other => panic!("expected Memarr, got {other:?}"),
        }
    }

    #[test]
    fn xen_auto_translated_keeps_identity_machphys_kphys() {
        let mut sys = System::empty();
        let mut popt = ParsedOpts::default();
        popt.xen_xlat = Some(true);
        init_linux(&NoSyms, &popt, &mut sys).unwrap();

        assert!(matches!(
            sys.meth(sys_meth::MACHPHYS_KPHYS).unwrap().kind,
            MethodKind::Linear { offset: 0 }
        ));
    }

    #[test]
    fn unsupported_page_size_is_notimpl() {
        let mut sys = System::empty();
        let mut popt = ParsedOpts::default();
        popt.pagesize = Some(16384);
        let err = init_linux(&NoSyms, &popt, &mut sys).unwrap_err();
        assert!(matches!(err, AddrXlatError::NotImpl(_)));
    }
}
