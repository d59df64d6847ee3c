//! Translates a single kernel-virtual address to kernel-physical using a
//! synthetic x86-64 page table built entirely in memory (no dump file
//! needed), to exercise the engine end to end without real memory.

use std::cell::RefCell;
use std::collections::HashMap;

use addrxlat::byte_order::ByteOrder;
use addrxlat::osinit::{self, Arch, OsType};
use addrxlat::page::MappedPage;
use addrxlat::reader::{PageBuf, Reader, SymQuery};
use addrxlat::{AddrSpace, Address, AddrXlatError, Context, ParsedOpts, ReadCaps, System};

struct MemReader {
    pages: RefCell<HashMap<u64, Vec<u8>>>,
}

impl MemReader {
    fn new() -> Self {
        Self { pages: RefCell::new(HashMap::new()) }
    }

    fn write64(&self, addr: u64, value: u64) {
        let mut pages = self.pages.borrow_mut();
        let page_base = addr & !0xfff;
        let page = pages.entry(page_base).or_insert_with(|| vec![0u8; 0x1000]);
        let off = (addr - page_base) as usize;
        page[off..off + 8].copy_from_slice(&value.to_le_bytes());
    }
}

impl Reader for MemReader {
    fn get_page(&self, addr: Address) -> Result<PageBuf, AddrXlatError> {
        let page_base = addr.value & !0xfff;
        let pages = self.pages.borrow();
        let bytes = pages.get(&page_base).cloned().unwrap_or_else(|| vec![0u8; 0x1000]);
        Ok(PageBuf {
            addr: addr.with_value(page_base),
            size: bytes.len() as u64,
            page: MappedPage::new(bytes),
            byte_order: ByteOrder::Little,
        })
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

    let reader = MemReader::new();

    // Build a 4-level x86-64 walk for V = 0x7fff_abcd_e000 -> P = 0xdead_b000.
    let root = 0x1000u64;
    let v = 0x7fff_abcd_e000u64;
    let shifts = [39u32, 30, 21, 12];
    let mut table = root;
    for (level, shift) in shifts.iter().enumerate() {
        let idx = (v >> shift) & 0x1ff;
        let entry = table + idx * 8;
        if level == shifts.len() - 1 {
            reader.write64(entry, (0xdead_b000u64) | 0x1);
        } else {
            let next_table = 0x2000 + (level as u64) * 0x1000;
            reader.write64(entry, next_table | 0x1);
            table = next_table;
        }
    }

    let ctx = Context::new(reader);
    let mut sys = System::empty();
    let popt = ParsedOpts {
        rootpgt: Some(addrxlat::options::OptFullAddr { space: AddrSpace::KPhysAddr, value: root }),
        ..ParsedOpts::default()
    };
    osinit::init_system(Arch::X86_64, OsType::Linux, ctx.as_ref(), &popt, &mut sys)?;

    let input = Address::new(AddrSpace::KVAddr, v);
    let output = addrxlat::translate(ctx.as_ref(), &sys, input, AddrSpace::KPhysAddr)?;
    println!("{input} -> {output}");

    Ok(())
}
