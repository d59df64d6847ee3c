//! # addrxlat
//!
//! An address-translation engine for kernel crash-dump memory: given a
//! host-provided [`Reader`] callback and a [`System`] describing an
//! operating system's page tables and memory layout, translate between
//! kernel-virtual, kernel-physical, and machine-physical addresses.
//!
//! This crate is a thin re-export of [`addrxlat_core`], the workspace
//! member carrying the actual engine (address spaces, methods, the step
//! and map/system data model, OS-init tables, and the option parser).
//! Enable the `fs` feature (on by default) to also pull in
//! [`addrxlat_file`], a [`Reader`] implementation backed by a
//! memory-mapped flat file or block device.
//!
//! ```no_run
//! use addrxlat::{osinit, Context, Address, AddrSpace, System, translate};
//! # #[cfg(feature = "fs")]
//! use addrxlat::file::FileReader;
//!
//! # #[cfg(feature = "fs")]
//! # fn main() -> Result<(), addrxlat::AddrXlatError> {
//! let reader = FileReader::open("/proc/kcore", AddrSpace::KPhysAddr)?;
//! let ctx = Context::new(reader);
//!
//! let mut sys = System::empty();
//! let popt = addrxlat::parse_opts(Some("pagesize=4096"))?;
//! osinit::init_system(osinit::Arch::X86_64, osinit::OsType::Linux, ctx.as_ref(), &popt, &mut sys)?;
//!
//! let kvaddr = Address::new(AddrSpace::KVAddr, 0xffff_8880_0010_0000);
//! let phys = translate(ctx.as_ref(), &sys, kvaddr, AddrSpace::KPhysAddr)?;
//! println!("{kvaddr} -> {phys}");
//! # Ok(())
//! # }
//! # #[cfg(not(feature = "fs"))]
//! # fn main() {}
//! ```

pub use addrxlat_core::*;

/// A [`Reader`] backed by a memory-mapped flat file or block device.
///
/// Requires the `fs` feature (enabled by default).
#[cfg(feature = "fs")]
pub mod file {
    pub use addrxlat_file::FileReader;
}
