//! Per-architecture OS initialization: turns parsed options plus
//! symbolic lookups into a populated [`System`].
//!
//! Each architecture module exports one `init_linux` (and, where the
//! original system supports it, `init_xen`) that installs methods and
//! direction-map layouts the way `sys_*` does per architecture in the
//! original engine — one module per architecture, dispatched from
//! [`init_system`] by a single `match`, the same shape as
//! [`crate::step::pgt::step`].

pub mod aarch64;
pub mod i386;
pub mod ppc64;
pub mod s390x;
pub mod x86_64;

use crate::{context::ContextOps, error::AddrXlatError, map::Map, options::ParsedOpts, system::System};

/// One contiguous region of a direction map, installed verbatim by an
/// architecture's static layout table.
#[derive(Debug, Clone, Copy)]
pub struct SysRegion {
    /// First address of the region (inclusive).
    pub first: u64,
    /// Last address of the region (inclusive).
    pub last: u64,
    /// Method table index this region resolves to.
    pub meth: usize,
}

/// Installs each of `regions` into `map` as one tile.
pub fn install_regions(map: &mut Map, regions: &[SysRegion]) {
    for r in regions {
        map.set(r.first, r.last - r.first, r.meth);
    }
}

/// The operating system family an OS-init routine targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OsType {
    /// A stock Linux kernel.
    Linux,
    /// A Xen hypervisor, with its own machine-physical address space.
    Xen,
}

/// The architecture selecting which layout table to install.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arch {
    X86_64,
    I386,
    Ppc64,
    S390X,
    Aarch64,
}

/// Populates `sys` for `arch`/`os`, consulting `ctx` for any symbol or
/// memory lookups the architecture's layout needs (e.g. ppc64's vmemmap
/// backing list) and `popt` for user-supplied overrides (`levels`,
/// `pagesize`, `phys_base`, `rootpgt`, `pte_mask`, ...).
pub fn init_system(
    arch: Arch,
    os: OsType,
    ctx: &dyn ContextOps,
    popt: &ParsedOpts,
    sys: &mut System,
) -> Result<(), AddrXlatError> {
    match (arch, os) {
        (Arch::X86_64, OsType::Linux) => x86_64::init_linux(ctx, popt, sys),
        (Arch::I386, OsType::Linux) => i386::init_linux(ctx, popt, sys),
        (Arch::Ppc64, OsType::Linux) => ppc64::init_linux(ctx, popt, sys),
        (Arch::S390X, OsType::Linux) => s390x::init_linux(ctx, popt, sys),
        (Arch::Aarch64, OsType::Linux) => aarch64::init_linux(ctx, popt, sys),
        (_, OsType::Xen) => Err(AddrXlatError::NotImpl("Xen OS-init not implemented for this architecture".into())),
    }
}
