//! Translates a kernel-virtual ppc64 direct-map address to
//! machine-physical, exercising the ppc64 OS-init layout without a real
//! dump file.

use addrxlat::osinit::{self, Arch, OsType};
use addrxlat::reader::{PageBuf, Reader, SymQuery};
use addrxlat::{AddrSpace, Address, AddrXlatError, Context, ParsedOpts, ReadCaps, System};

struct NoSymReader;

impl Reader for NoSymReader {
    fn get_page(&self, _addr: Address) -> Result<PageBuf, AddrXlatError> {
        Err(AddrXlatError::NotImpl("this demo only exercises the direct map".into()))
    }

    fn sym(&self, _query: SymQuery<'_>) -> Result<u64, AddrXlatError> {
        Err(AddrXlatError::NotImpl("no symbols in this demo".into()))
    }

    fn read_caps(&self) -> ReadCaps {
        ReadCaps::all()
    }
}

fn main() -> Result<(), AddrXlatError> {
    tracing_subscriber::fmt::init();

    let ctx = Context::new(NoSymReader);
    let mut sys = System::empty();
    osinit::init_system(Arch::Ppc64, OsType::Linux, ctx.as_ref(), &ParsedOpts::default(), &mut sys)?;

    // 0xc000... is the Linux/ppc64 direct-mapping region; it bypasses
    // the page tables entirely, so this works without a backing reader.
    let input = Address::new(AddrSpace::KVAddr, 0xc000_0000_1234_5678);
    let output = addrxlat::translate(ctx.as_ref(), &sys, input, AddrSpace::KPhysAddr)?;
    println!("{input} -> {output}");

    Ok(())
}
