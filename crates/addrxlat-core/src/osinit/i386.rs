//! Linux/i386 OS initialization: 2-level (non-PAE) or 3-level (PAE)
//! paging plus the low-memory direct map.
//!
//! No original-source file covers this architecture; constants follow
//! the well-known 3G/1G Linux/i386 virtual memory split.

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

const PAGE_OFFSET: u64 = 0xc000_0000;
const USER_END: u64 = PAGE_OFFSET - 1;

fn get_symval(ctx: &dyn ContextOps, name: &'static str) -> Result<u64, AddrXlatError> {
    ctx.sym(SymQuery::Value(name))
}

pub fn init_linux(ctx: &dyn ContextOps, popt: &ParsedOpts, sys: &mut System) -> Result<(), AddrXlatError> {
    let pagesize = popt.pagesize.unwrap_or(4096);
    if pagesize != 4096 {
        return Err(AddrXlatError::NotImpl(format!("unsupported page size: {pagesize}")));
    }

    // PAE unless the caller asks for the 2-level classic form via
    // `levels=2`; everything else defaults to the common PAE case.
    let levels = popt.levels.unwrap_or(3);
    let (pte_format, widths): (PteFormat, &[u8]) = match levels {
        2 => (PteFormat::Ia32, &[12, 10, 10]),
        3 => (PteFormat::Ia32Pae, &[12, 9, 9, 2]),
        other => return Err(AddrXlatError::NotImpl(format!("unsupported paging depth: {other}"))),
    };
    let form = PagingForm::new(pte_format, widths);
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
        sys_meth::MACHPHYS_KPHYS,
        Method { kind: MethodKind::Linear { offset: 0 }, target_as: AddrSpace::KPhysAddr },
    );
    sys.set_meth(
        sys_meth::KPHYS_MACHPHYS,
        Method { kind: MethodKind::Linear { offset: 0 }, target_as: AddrSpace::MachPhysAddr },
    );

    let kv_phys_layout = [
        SysRegion { first: 0, last: USER_END, meth: sys_meth::ROOT_PGT },
        SysRegion { first: PAGE_OFFSET, last: u64::from(u32::MAX), meth: sys_meth::DIRECT },
    ];
    install_regions(sys.map_mut(MapDirection::KvPhys), &kv_phys_layout);
    sys.map_mut(MapDirection::MachphysKphys).set(0, u64::from(u32::MAX), sys_meth::MACHPHYS_KPHYS);
    sys.map_mut(MapDirection::KphysMachphys).set(0, u64::from(u32::MAX), sys_meth::KPHYS_MACHPHYS);

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
    fn defaults_to_pae_three_level_form() {
        let mut sys = System::empty();
        init_linux(&NoSyms, &ParsedOpts::default(), &mut sys).unwrap();
        match &sys.meth(sys_meth::ROOT_PGT).unwrap().kind {
            MethodKind::Pgt { form, .. } => assert_eq!(form.pte_format, PteFormat::Ia32Pae),
            other => panic!("expected Pgt, got {other:?}"),
        }
        assert_eq!(sys.map(MapDirection::KvPhys).lookup(PAGE_OFFSET), sys_meth::DIRECT);
        assert_eq!(sys.map(MapDirection::KvPhys).lookup(0), sys_meth::ROOT_PGT);
    }

    #[test]
    fn two_level_form_selected_via_levels_option() {
        let mut sys = System::empty();
        let mut popt = ParsedOpts::default();
        popt.levels = Some(2);
        init_linux(&NoSyms, &popt, &mut sys).unwrap();
        match &sys.meth(sys_meth::ROOT_PGT).unwrap().kind {
            MethodKind::Pgt { form, .. } => assert_eq!(form.pte_format, PteFormat::Ia32),
            other => panic!("expected Pgt, got {other:?}"),
        }
    }
}
