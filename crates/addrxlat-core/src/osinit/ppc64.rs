//! Linux/ppc64 OS initialization, ported from the reference `sys_ppc64`
//! / `map_linux_ppc64` / `get_vmemmap_param` routines.

use crate::{
    address::AddrSpace,
    context::ContextOps,
    error::AddrXlatError,
    method::{LookupElem, Method, MethodKind, PagingForm, PteFormat},
    options::ParsedOpts,
    osinit::{install_regions, SysRegion},
    reader::SymQuery,
    system::{sys_meth, MapDirection, System},
    Address,
};

const PAGESIZE_64K: i64 = 1 << 16;
const RPN_SHIFT: u32 = 30;
const DIRECT_BASE: u64 = 0xc000_0000_0000_0000;

/// Linux/ppc64's fixed kernel-virtual memory layout (64K pages).
///
/// The `0xd000_...` segment covers two adjacent `PGT`-walked regions:
/// vmalloc (`0xd000_0000_0000_0000..=0xd000_07ff_ffff_ffff`) and IO
/// mappings (`0xd000_0800_0000_0000..=0xd000_0fff_ffff_ffff`) right above
/// it, both resolved by the same root page table.
const LINUX_LAYOUT: [SysRegion; 4] = [
    SysRegion { first: 0x0000_0000_0000_0000, last: 0x0000_0fff_ffff_ffff, meth: sys_meth::USER_PGT },
    SysRegion { first: 0xc000_0000_0000_0000, last: 0xcfff_ffff_ffff_ffff, meth: sys_meth::DIRECT },
    SysRegion { first: 0xd000_0000_0000_0000, last: 0xd000_0fff_ffff_ffff, meth: sys_meth::ROOT_PGT },
    SysRegion { first: 0xf000_0000_0000_0000, last: 0xffff_ffff_ffff_ffff, meth: sys_meth::VMEMMAP },
];

fn get_symval(ctx: &dyn ContextOps, name: &'static str) -> Result<u64, AddrXlatError> {
    ctx.sym(SymQuery::Value(name))
}

fn get_offsetof(ctx: &dyn ContextOps, type_name: &'static str, member: &'static str) -> Result<u64, AddrXlatError> {
    ctx.sym(SymQuery::Offsetof { type_name, member })
}

/// Walks the kernel's `vmemmap_list` linked list to build the lookup
/// table backing the `VMEMMAP` method.
fn vmemmap_lookup_table(ctx: &dyn ContextOps) -> Result<Vec<LookupElem>, AddrXlatError> {
    let vmemmap_list = get_symval(ctx, "vmemmap_list")?;
    let off_list = get_offsetof(ctx, "vmemmap_backing", "list")?;
    let off_phys = get_offsetof(ctx, "vmemmap_backing", "phys")?;
    let off_virt = get_offsetof(ctx, "vmemmap_backing", "virt_addr")?;

    let first_elem = ctx.read64(Address::new(AddrSpace::KVAddr, vmemmap_list), "vmemmap_list")?;

    let mut table = Vec::new();
    let mut elem = first_elem;
    while elem != 0 {
        let phys = ctx.read64(Address::new(AddrSpace::KVAddr, elem + off_phys), "vmemmap phys")?;
        let virt = ctx.read64(Address::new(AddrSpace::KVAddr, elem + off_virt), "vmemmap virt")?;
        table.push(LookupElem { orig: phys, dest: virt });
        elem = ctx.read64(Address::new(AddrSpace::KVAddr, elem + off_list), "vmemmap list")?;
    }
    table.sort_by_key(|e| e.orig);
    Ok(table)
}

pub fn init_linux(ctx: &dyn ContextOps, popt: &ParsedOpts, sys: &mut System) -> Result<(), AddrXlatError> {
    let pagesize = popt.pagesize.unwrap_or(PAGESIZE_64K);
    if pagesize != PAGESIZE_64K {
        return Err(AddrXlatError::NotImpl(format!("unsupported page size: {pagesize}")));
    }

    // Machine-physical and kernel-physical coincide on bare-metal ppc64
    // (no Xen indirection); `phys_mask` bounds how much of the space the
    // identity mapping is declared to cover.
    let phys_mask = (1u64 << (64 - RPN_SHIFT + 16)) - 1;
    sys.set_meth(
        sys_meth::MACHPHYS_KPHYS,
        Method { kind: MethodKind::Linear { offset: 0 }, target_as: AddrSpace::KPhysAddr },
    );
    sys.set_meth(
        sys_meth::KPHYS_MACHPHYS,
        Method { kind: MethodKind::Linear { offset: 0 }, target_as: AddrSpace::MachPhysAddr },
    );
    sys.map_mut(MapDirection::MachphysKphys).set(0, phys_mask, sys_meth::MACHPHYS_KPHYS);
    sys.map_mut(MapDirection::KphysMachphys).set(0, phys_mask, sys_meth::KPHYS_MACHPHYS);

    // The direct-mapping region (0xc000...) subtracts DIRECT_BASE to land
    // in machine-physical space without touching any page table.
    sys.set_meth(
        sys_meth::DIRECT,
        Method {
            kind: MethodKind::Linear { offset: 0u64.wrapping_sub(DIRECT_BASE) as i64 },
            target_as: AddrSpace::MachPhysAddr,
        },
    );

    install_regions(sys.map_mut(MapDirection::KvPhys), &LINUX_LAYOUT);

    let form = PagingForm::new(PteFormat::Ppc64LinuxRpn30, &[16, 12, 12, 4]);
    let pte_mask = popt.pte_mask.unwrap_or(0);

    sys.set_meth(
        sys_meth::USER_PGT,
        Method {
            kind: MethodKind::Pgt { form, root: Address::none(), pte_mask },
            target_as: AddrSpace::MachPhysAddr,
        },
    );

    let root = match get_symval(ctx, "swapper_pg_dir") {
        Ok(addr) => Address::new(AddrSpace::KVAddr, addr),
        Err(_) => Address::none(),
    };
    sys.set_meth(
        sys_meth::ROOT_PGT,
        Method { kind: MethodKind::Pgt { form, root, pte_mask }, target_as: AddrSpace::MachPhysAddr },
    );

    match vmemmap_lookup_table(ctx) {
        Ok(table) => {
            sys.set_meth(
                sys_meth::VMEMMAP,
                Method {
                    kind: MethodKind::Lookup { endoff: (pagesize - 1) as u64, table },
                    target_as: AddrSpace::KPhysAddr,
                },
            );
        }
        Err(AddrXlatError::NoData(_)) => {
            // VMEMMAP addresses will be unresolvable; not fatal.
        }
        Err(e) => return Err(e),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        address::ReadCaps,
        map::METH_NONE,
        reader::{PageBuf, Reader},
    };
    use std::collections::HashMap;

    struct FakeReader {
        syms: HashMap<&'static str, u64>,
        offsets: HashMap<(&'static str, &'static str), u64>,
    }

    impl Reader for FakeReader {
        fn get_page(&self, _addr: Address) -> Result<PageBuf, AddrXlatError> {
            unimplemented!()
        }

        fn sym(&self, query: SymQuery<'_>) -> Result<u64, AddrXlatError> {
            match query {
                SymQuery::Value(name) => self.syms.get(name).copied().ok_or_else(|| AddrXlatError::NoData(name.into())),
                SymQuery::Offsetof { type_name, member } => self
                    .offsets
                    .get(&(type_name, member))
                    .copied()
                    .ok_or_else(|| AddrXlatError::NoData(format!("{type_name}.{member}"))),
                _ => unimplemented!(),
            }
        }

        fn read_caps(&self) -> ReadCaps {
            ReadCaps::all()
        }
    }

    struct DirectOps(FakeReader);

    impl ContextOps for DirectOps {
        fn read32(&self, _addr: Address, _what: &'static str) -> Result<u32, AddrXlatError> {
            unimplemented!()
        }
        fn read64(&self, _addr: Address, _what: &'static str) -> Result<u64, AddrXlatError> {
            Err(AddrXlatError::NoData("vmemmap_list".into()))
        }
        fn sym(&self, query: SymQuery<'_>) -> Result<u64, AddrXlatError> {
            self.0.sym(query)
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
    fn installs_named_regions_and_pgt_methods() {
        let mut sys = System::empty();
        let popt = ParsedOpts::default();

        let mut syms = HashMap::new();
        syms.insert("swapper_pg_dir", 0xc000_0000_0010_0000u64);
        let ops = DirectOps(FakeReader { syms, offsets: HashMap::new() });

        init_linux(&ops, &popt, &mut sys).unwrap();

        assert!(!sys.meth(sys_meth::ROOT_PGT).unwrap().is_none());
        assert!(!sys.meth(sys_meth::USER_PGT).unwrap().is_none());
        assert!(!sys.meth(sys_meth::DIRECT).unwrap().is_none());
        assert_ne!(sys.map(MapDirection::KvPhys).lookup(0xc000_0000_1234_5678), METH_NONE);
        assert_eq!(sys.map(MapDirection::KvPhys).lookup(0xc000_0000_1234_5678), sys_meth::DIRECT);
    }

    #[test]
    fn io_mapping_region_resolves_to_root_pgt() {
        let mut sys = System::empty();
        let ops = DirectOps(FakeReader { syms: HashMap::new(), offsets: HashMap::new() });
        init_linux(&ops, &ParsedOpts::default(), &mut sys).unwrap();

        // Right above vmalloc's 0xd000_0000_0000_0000..=0xd000_07ff_ffff_ffff,
        // the IO-mapping region shares the same root page table.
        assert_eq!(sys.map(MapDirection::KvPhys).lookup(0xd000_0800_0000_0000), sys_meth::ROOT_PGT);
        assert_eq!(sys.map(MapDirection::KvPhys).lookup(0xd000_0fff_ffff_ffff), sys_meth::ROOT_PGT);
    }

    #[test]
    fn direct_map_translates_to_machphysaddr() {
        let mut sys = System::empty();
        let ops = DirectOps(FakeReader { syms: HashMap::new(), offsets: HashMap::new() });
        init_linux(&ops, &ParsedOpts::default(), &mut sys).unwrap();

        match &sys.meth(sys_meth::DIRECT).unwrap().kind {
            MethodKind::Linear { offset } => {
                let translated = (0xc000_0000_1234_5678u64 as i64).wrapping_add(*offset) as u64;
                assert_eq!(translated, 0x0000_0000_1234_5678);
            }
            other => panic!("expected Linear, got {other:?}"),
        }
        assert_eq!(sys.meth(sys_meth::DIRECT).unwrap().target_as, AddrSpace::MachPhysAddr);
    }
}
