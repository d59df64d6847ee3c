//! A [`Reader`] backed by a memory-mapped flat file or block device.
//!
//! Does not parse any dump container format (ELF core, kdump,
//! diskdump, ...) — callers needing that translate a container's own
//! physical offsets into the flat byte stream this crate maps, e.g. via
//! an external kdump-reading crate. This crate only turns byte offsets
//! into [`Reader::get_page`] answers, the same narrow role `devmem_ops`
//! plays for `/dev/mem` in the original implementation.

use std::fs::File;
use std::path::Path;

use addrxlat_core::{
    address::{AddrSpace, ReadCaps},
    byte_order::ByteOrder,
    error::AddrXlatError,
    page::MappedPage,
    reader::{PageBuf, Reader, SymQuery},
    Address,
};
use memmap2::{Mmap, MmapOptions};
use tracing::trace;

const PAGE_SIZE: u64 = 0x1000;

/// A [`Reader`] over a plain file or block device, interpreted as one
/// contiguous address space starting at an optional `phys_base` byte
/// offset.
pub struct FileReader {
    mmap: Mmap,
    phys_base: u64,
    space: AddrSpace,
}

impl FileReader {
    /// Memory-maps `path` read-only. `space` is the address space this
    /// reader answers for (typically [`AddrSpace::KPhysAddr`] for a
    /// plain physical-memory dump, [`AddrSpace::MachPhysAddr`] for a Xen
    /// machine-memory dump).
    pub fn open(path: impl AsRef<Path>, space: AddrSpace) -> Result<Self, AddrXlatError> {
        Self::open_at(path, space, 0)
    }

    /// As [`FileReader::open`], but addresses are offset by `phys_base`
    /// bytes before indexing into the file (e.g. a dump embedded
    /// partway into a disk image).
    pub fn open_at(path: impl AsRef<Path>, space: AddrSpace, phys_base: u64) -> Result<Self, AddrXlatError> {
        let file = File::open(path).map_err(|e| AddrXlatError::Reader(Box::new(e)))?;
        // SAFETY: the mapped file is only ever read; truncation races are
        // the caller's concern, same as any other dump analysis tool.
        let mmap = unsafe { MmapOptions::new().map(&file) }.map_err(|e| AddrXlatError::Reader(Box::new(e)))?;
        Ok(Self { mmap, phys_base, space })
    }

    /// Size of the mapped file in bytes.
    pub fn len(&self) -> u64 {
        self.mmap.len() as u64
    }

    /// Whether the mapped file is empty.
    pub fn is_empty(&self) -> bool {
        self.mmap.is_empty()
    }
}

impl Reader for FileReader {
    fn get_page(&self, addr: Address) -> Result<PageBuf, AddrXlatError> {
        if addr.space != self.space {
            return Err(AddrXlatError::NoData(format!("reader only services {}", self.space)));
        }
        let file_off = addr.value.checked_sub(self.phys_base).ok_or(AddrXlatError::NotPresent)?;
        if file_off >= self.len() {
            return Err(AddrXlatError::NotPresent);
        }

        let page_base = file_off & !(PAGE_SIZE - 1);
        let end = page_base.saturating_add(PAGE_SIZE).min(self.len());
        let bytes = self.mmap[page_base as usize..end as usize].to_vec();

        trace!(%addr, file_off, len = bytes.len(), "get_page");
        Ok(PageBuf {
            addr: addr.with_value(page_base + self.phys_base),
            size: bytes.len() as u64,
            page: MappedPage::new(bytes),
            byte_order: ByteOrder::Host,
        })
    }

    fn sym(&self, query: SymQuery<'_>) -> Result<u64, AddrXlatError> {
        Err(AddrXlatError::NotImpl(format!("no symbol information available for {query:?}")))
    }

    fn read_caps(&self) -> ReadCaps {
        ReadCaps::of(self.space)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp_file(bytes: &[u8]) -> std::path::PathBuf {
        let mut path = std::env::temp_dir();
        path.push(format!("addrxlat-file-test-{:p}", bytes.as_ptr()));
        let mut f = File::create(&path).unwrap();
        f.write_all(bytes).unwrap();
        path
    }

    #[test]
    fn reads_a_page_aligned_window_at_offset() {
        let mut data = vec![0u8; PAGE_SIZE as usize * 2];
        data[PAGE_SIZE as usize + 16] = 0xab;
        let path = write_temp_file(&data);

        let reader = FileReader::open(&path, AddrSpace::KPhysAddr).unwrap();
        let buf = reader.get_page(Address::new(AddrSpace::KPhysAddr, PAGE_SIZE + 16)).unwrap();
        assert_eq!(buf.addr.value, PAGE_SIZE);
        assert_eq!(buf.page[16], 0xab);

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn out_of_range_address_is_not_present() {
        let data = vec![0u8; PAGE_SIZE as usize];
        let path = write_temp_file(&data);
        let reader = FileReader::open(&path, AddrSpace::KPhysAddr).unwrap();

        let err = reader.get_page(Address::new(AddrSpace::KPhysAddr, 10 * PAGE_SIZE)).unwrap_err();
        assert!(matches!(err, AddrXlatError::NotPresent));

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn phys_base_shifts_the_addressable_window() {
        let data = vec![0xcdu8; PAGE_SIZE as usize];
        let path = write_temp_file(&data);
        let reader = FileReader::open_at(&path, AddrSpace::KPhysAddr, 0x1_0000_0000).unwrap();

        let buf = reader.get_page(Address::new(AddrSpace::KPhysAddr, 0x1_0000_0000)).unwrap();
        assert_eq!(buf.page[0], 0xcd);
        assert!(reader.get_page(Address::new(AddrSpace::KPhysAddr, 0)).is_err());

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn wrong_address_space_is_nodata() {
        let data = vec![0u8; PAGE_SIZE as usize];
        let path = write_temp_file(&data);
        let reader = FileReader::open(&path, AddrSpace::KPhysAddr).unwrap();

        let err = reader.get_page(Address::new(AddrSpace::MachPhysAddr, 0)).unwrap_err();
        assert!(matches!(err, AddrXlatError::NoData(_)));

        std::fs::remove_file(&path).ok();
    }
}
