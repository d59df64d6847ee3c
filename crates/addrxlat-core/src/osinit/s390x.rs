//! Linux/s390x OS initialization: a single region/segment/page walk
//! covering the whole kernel-virtual range.
//!
//! No original-source file covers this architecture. s390x identity-maps
//! physical memory at a fixed kernel-virtual base rather than using a
//! separate direct-map method, so only `ROOT_PGT` and the machphys
//! identity methods are installed.

use crate::{
    address::AddrSpace,
    context::ContextOps,
    error::AddrXlatError,
    method::{Method, MethodKind, PagingForm, PteFormat},
    reader::SymQuery,
    options::ParsedOpts,
    system::{sys_meth, MapDirection, System},
    Address,
};

fn get_symval(ctx: &dyn ContextOps, name: &'static str) -> Result<u64, AddrXlatError> {
    ctx.sym(SymQuery::Value(name))
}

pub fn init_linux(ctx: &dyn ContextOps, popt: &ParsedOpts, sys: &mut System) -> Result<(), AddrXlatError> {
    let pagesize = popt.pagesize.unwrap_or(4096);
    if pagesize != 4096 {
        return Err(AddrXlatError::NotImpl(format!("unsupported page size: {pagesize}")));
    }

    // region-1/2/3, segment, page, offset.
    let form = PagingForm::new(PteFormat::S390X, &[12, 11, 11, 11, 11]);
    let pte_mask = popt.pte_mask.unwrap_or(0);

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
        sys_meth::MACHPHYS_KPHYS,
        Method { kind: MethodKind::Linear { offset: 0 }, target_as: AddrSpace::KPhysAddr },
    );
    sys.set_meth(
        sys_meth::KPHYS_MACHPHYS,
        Method { kind: MethodKind::Linear { offset: 0 }, target_as: AddrSpace::MachPhysAddr },
    );

    sys.map_mut(MapDirection::KvPhys).set(0, u64::MAX, sys_meth::ROOT_PGT);
    sys.map_mut(MapDirection::MachphysKphys).set(0, u64::MAX, sys_meth::MACHPHYS_KPHYS);
    sys.map_mut(MapDirection::KphysMachphys).set(0, u64::MAX, sys_meth::KPHYS_MACHPHYS);

    Ok(())
}
