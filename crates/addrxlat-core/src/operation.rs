//! The operation engine: the outer driver that chains [`crate::step`]s
//! across methods and re-dispatches across [`crate::map::Map`]s until
//! the target address space is reached.

use tracing::trace;

use crate::{
    address::AddrSpace,
    context::ContextOps,
    error::AddrXlatError,
    map::METH_NONE,
    method::{Method, MethodKind, MAX_FIELDS},
    step::StepState,
    system::{MapDirection, System},
    Address,
};

/// Upper bound on re-dispatches a single [`translate`] call may take.
/// Cycles are bounded by a step counter to guarantee progress even
/// against a malformed system.
pub const MAX_STEPS: u32 = 32;

/// Picks the direction map to consult for a step from `from` towards
/// `to`. `KPhysAddr` can head towards either `MachPhysAddr` or `KVAddr`
/// (the direct map); anything else defaults to the machphys direction,
/// which is always installed (identity, absent Xen).
fn direction_for(from: AddrSpace, to: AddrSpace) -> Option<MapDirection> {
    match from {
        AddrSpace::KVAddr => Some(MapDirection::KvPhys),
        AddrSpace::KPhysAddr if to == AddrSpace::KVAddr => Some(MapDirection::KphysDirect),
        AddrSpace::KPhysAddr => Some(MapDirection::KphysMachphys),
        AddrSpace::MachPhysAddr => Some(MapDirection::MachphysKphys),
        AddrSpace::NoAddr => None,
    }
}

pub(crate) fn seed_state<'a>(ctx: &'a dyn ContextOps, sys: &'a System, meth: &Method, addr: Address) -> StepState<'a> {
    match &meth.kind {
        MethodKind::Pgt { form, root, .. } => {
            let mut idx = [0u64; MAX_FIELDS];
            let mut shift = 0u32;
            for (i, width) in form.field_sizes.iter().enumerate().take(form.nfields) {
                idx[i] = (addr.value >> shift) & ((1u64 << *width) - 1);
                shift += *width as u32;
            }
            StepState {
                ctx,
                sys,
                base: *root,
                remain: form.levels().max(1),
                elemsz: form.elemsz(),
                idx,
                raw: 0,
            }
        }
        _ => StepState {
            ctx,
            sys,
            base: addr,
            remain: 1,
            elemsz: 0,
            idx: [0u64; MAX_FIELDS],
            raw: 0,
        },
    }
}

/// Translates `addr` into `target`, re-dispatching through the system's
/// maps whenever a method's output lands in a different address space,
/// up to [`MAX_STEPS`] total re-dispatches.
pub fn translate(ctx: &dyn ContextOps, sys: &System, addr: Address, target: AddrSpace) -> Result<Address, AddrXlatError> {
    let mut cur = addr;

    for _ in 0..MAX_STEPS {
        if cur.space == target {
            return Ok(cur);
        }

        let direction = direction_for(cur.space, target)
            .ok_or_else(|| AddrXlatError::NoMeth(format!("no direction from {} towards {target}", cur.space)))?;

        let meth_idx = sys.map(direction).lookup(cur.value);
        let meth = (meth_idx != METH_NONE)
            .then(|| sys.meth(meth_idx))
            .flatten()
            .ok_or_else(|| AddrXlatError::NoMeth(format!("no method covers {cur}")))?;

        trace!(%cur, ?direction, meth_idx, "translate: dispatch");

        let mut state = seed_state(ctx, sys, meth, cur);
        loop {
            meth.step(&mut state)?;
            if state.terminated() {
                break;
            }
        }
        cur = state.base;
    }

    Err(AddrXlatError::Invalid(format!(
        "translation of {addr} towards {target} did not converge within {MAX_STEPS} steps"
    )))
}

/// Reads a 32-bit value at `addr`, translating through `sys` first if
/// `ctx`'s reader cannot service `addr.space` directly.
pub fn read32(ctx: &dyn ContextOps, sys: &System, addr: Address, what: &'static str) -> Result<u32, AddrXlatError> {
    if ctx.read_caps().covers(addr.space) {
        return ctx.read32(addr, what);
    }
    ctx.read32(resolve_readable(ctx, sys, addr)?, what)
}

/// Reads a 64-bit value at `addr`, translating through `sys` first if
/// `ctx`'s reader cannot service `addr.space` directly.
pub fn read64(ctx: &dyn ContextOps, sys: &System, addr: Address, what: &'static str) -> Result<u64, AddrXlatError> {
    if ctx.read_caps().covers(addr.space) {
        return ctx.read64(addr, what);
    }
    ctx.read64(resolve_readable(ctx, sys, addr)?, what)
}

fn resolve_readable(ctx: &dyn ContextOps, sys: &System, addr: Address) -> Result<Address, AddrXlatError> {
    for space in [AddrSpace::KPhysAddr, AddrSpace::MachPhysAddr, AddrSpace::KVAddr] {
        if ctx.read_caps().covers(space) {
            if let Ok(resolved) = translate(ctx, sys, addr, space) {
                return Ok(resolved);
            }
        }
    }
    Err(AddrXlatError::NoData(format!("no readable address space reachable from {addr}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        address::ReadCaps,
        context::Context,
        method::MethodKind,
        page::MappedPage,
        reader::{PageBuf, Reader, SymQuery},
    };

    struct NullReader;

    impl Reader for NullReader {
        fn get_page(&self, addr: Address) -> Result<PageBuf, AddrXlatError> {
            Ok(PageBuf {
                addr,
                size: 0x1000,
                page: MappedPage::new(vec![0u8; 0x1000]),
                byte_order: crate::byte_order::ByteOrder::Little,
            })
        }

        fn sym(&self, _query: SymQuery<'_>) -> Result<u64, AddrXlatError> {
            unimplemented!()
        }

        fn read_caps(&self) -> ReadCaps {
            ReadCaps::all()
        }
    }

    #[test]
    fn linear_offset_zero_is_identity() {
        let ctx = Context::new(NullReader);
        let mut sys = System::empty();
        sys.set_meth(
            crate::system::sys_meth::ROOT_PGT,
            Method {
                kind: MethodKind::Linear { offset: 0 },
                target_as: AddrSpace::KPhysAddr,
            },
        );
        sys.map_mut(MapDirection::KvPhys)
            .set(0, u64::MAX, crate::system::sys_meth::ROOT_PGT);

        let addr = Address::new(AddrSpace::KVAddr, 0xffff_8000_1234_5678);
        let out = translate(ctx.as_ref(), &sys, addr, AddrSpace::KPhysAddr).unwrap();
        assert_eq!(out, Address::new(AddrSpace::KPhysAddr, 0xffff_8000_1234_5678));
    }

    #[test]
    fn linear_round_trips_with_negated_offset() {
        let ctx = Context::new(NullReader);
        let mut sys = System::empty();
        sys.set_meth(
            0,
            Method {
                kind: MethodKind::Linear { offset: 0x1000 },
                target_as: AddrSpace::KPhysAddr,
            },
        );
        sys.set_meth(
            1,
            Method {
                kind: MethodKind::Linear { offset: -0x1000 },
                target_as: AddrSpace::KVAddr,
            },
        );
        sys.map_mut(MapDirection::KvPhys).set(0, u64::MAX, 0);
        sys.map_mut(MapDirection::KphysDirect).set(0, u64::MAX, 1);

        let addr = Address::new(AddrSpace::KVAddr, 0x5000);
        let forward = translate(ctx.as_ref(), &sys, addr, AddrSpace::KPhysAddr).unwrap();
        let back = translate(ctx.as_ref(), &sys, forward, AddrSpace::KVAddr).unwrap();
        assert_eq!(back, addr);
    }

    #[test]
    fn no_method_installed_is_nometh() {
        let ctx = Context::new(NullReader);
        let sys = System::empty();
        let addr = Address::new(AddrSpace::KVAddr, 0x1000);
        let err = translate(ctx.as_ref(), &sys, addr, AddrSpace::KPhysAddr).unwrap_err();
        assert!(matches!(err, AddrXlatError::NoMeth(_)));
    }
}
