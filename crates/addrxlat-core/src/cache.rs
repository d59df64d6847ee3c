//! The fixed-size LRU read cache sitting in front of a [`crate::Reader`].
//!
//! A hand-maintained ring of `N` slots, as prescribed by the design notes:
//! an array of fixed slots plus prev/next *indices* (not references), so
//! the whole cache is trivially ownable by [`crate::Context`] without any
//! self-referential borrowing.

use crate::{
    address::{AddrSpace, Address},
    error::AddrXlatError,
    reader::{PageBuf, Reader},
};

/// Number of cache slots. Matches `READ_CACHE_SLOTS` in the original
/// implementation.
pub const CACHE_SLOTS: usize = 4;

#[derive(Default, Clone)]
struct Slot {
    buf: Option<PageBuf>,
}

/// The read cache. Each context owns exactly one; it is never shared
/// across contexts or threads (see the concurrency model).
pub struct Cache {
    slots: [Slot; CACHE_SLOTS],
    next: [u8; CACHE_SLOTS],
    prev: [u8; CACHE_SLOTS],
    mru: u8,
}

impl Cache {
    /// Builds an empty cache with all slots linked into one ring,
    /// `mru` pointing at slot 0.
    pub fn new() -> Self {
        let mut next = [0u8; CACHE_SLOTS];
        let mut prev = [0u8; CACHE_SLOTS];
        for i in 0..CACHE_SLOTS {
            next[i] = ((i + 1) % CACHE_SLOTS) as u8;
            prev[(i + 1) % CACHE_SLOTS] = i as u8;
        }
        Self {
            slots: Default::default(),
            next,
            prev,
            mru: 0,
        }
    }

    /// The slot immediately before `mru` in the ring: the next eviction
    /// target.
    fn lru(&self) -> usize {
        self.prev[self.mru as usize] as usize
    }

    /// Splices `slot` to the head of the MRU chain, without releasing or
    /// refilling anything.
    fn touch(&mut self, slot: usize) {
        if slot == self.mru as usize {
            return;
        }
        if self.next[slot] as usize != self.mru as usize {
            self.unlink(slot);
            self.link_before(slot, self.mru as usize);
        }
        self.mru = slot as u8;
    }

    fn unlink(&mut self, slot: usize) {
        let p = self.prev[slot] as usize;
        let n = self.next[slot] as usize;
        self.next[p] = n as u8;
        self.prev[n] = p as u8;
    }

    /// Links `slot` back into the ring immediately before `anchor`.
    fn link_before(&mut self, slot: usize, anchor: usize) {
        let p = self.prev[anchor] as usize;
        self.next[slot] = anchor as u8;
        self.prev[slot] = p as u8;
        self.next[p] = slot as u8;
        self.prev[anchor] = slot as u8;
    }

    /// Demotes the slot backing `addr` to the LRU position, without
    /// releasing its buffer. The next cache miss will evict it first
    /// unless it is reused in the meantime.
    ///
    /// Implements `bury_cache_buffer`'s "demote to LRU" behavior: the
    /// buried slot is unlinked and relinked immediately before the current
    /// MRU slot. If the slot being buried *is* the current MRU slot, MRU
    /// advances to its successor, since the buried slot can no longer
    /// serve as MRU.
    pub fn bury(&mut self, addr: Address) {
        let Some(slot) = self.find(addr) else {
            return;
        };

        if self.next[slot] as usize == self.mru as usize {
            return;
        }

        if slot == self.mru as usize {
            self.mru = self.next[slot];
        } else {
            self.unlink(slot);
            self.link_before(slot, self.mru as usize);
        }
    }

    fn find(&self, addr: Address) -> Option<usize> {
        self.slots.iter().position(|slot| {
            slot.buf.as_ref().is_some_and(|buf| {
                buf.addr.space == addr.space
                    && addr
                        .value
                        .checked_sub(buf.addr.value)
                        .is_some_and(|off| off < buf.size)
            })
        })
    }

    /// Returns the buffer covering `addr`, fetching and caching it via
    /// `reader` on a miss.
    pub fn get(&mut self, reader: &dyn Reader, addr: Address) -> Result<&PageBuf, AddrXlatError> {
        if let Some(slot) = self.find(addr) {
            self.touch(slot);
            return Ok(self.slots[slot].buf.as_ref().expect("just matched"));
        }

        let slot = self.lru();
        if let Some(old) = self.slots[slot].buf.take() {
            reader.put_page(old);
        }

        let buf = reader.get_page(addr)?;
        self.slots[slot].buf = Some(buf);
        self.touch(slot);
        Ok(self.slots[slot].buf.as_ref().expect("just inserted"))
    }

    /// Releases every cached buffer via `reader.put_page`. Called once,
    /// when the owning context is dropped.
    pub fn clear(&mut self, reader: &dyn Reader) {
        for slot in &mut self.slots {
            if let Some(buf) = slot.buf.take() {
                reader.put_page(buf);
            }
        }
    }
}

impl Default for Cache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{byte_order::ByteOrder, page::MappedPage};
    use std::cell::RefCell;

    struct FakeReader {
        fetched: RefCell<Vec<u64>>,
        released: RefCell<Vec<u64>>,
    }

    impl Reader for FakeReader {
        fn get_page(&self, addr: Address) -> Result<PageBuf, AddrXlatError> {
            self.fetched.borrow_mut().push(addr.value);
            Ok(PageBuf {
                addr,
                size: 0x1000,
                page: MappedPage::new(vec![0u8; 0x1000]),
                byte_order: ByteOrder::Little,
            })
        }

        fn put_page(&self, buf: PageBuf) {
            self.released.borrow_mut().push(buf.addr.value);
        }

        fn sym(&self, _query: crate::reader::SymQuery<'_>) -> Result<u64, AddrXlatError> {
            unimplemented!()
        }

        fn read_caps(&self) -> crate::address::ReadCaps {
            crate::address::ReadCaps::all()
        }
    }

    fn addr(v: u64) -> Address {
        Address::new(AddrSpace::KPhysAddr, v)
    }

    #[test]
    fn fifth_distinct_page_evicts_the_first() {
        let reader = FakeReader {
            fetched: RefCell::new(Vec::new()),
            released: RefCell::new(Vec::new()),
        };
        let mut cache = Cache::new();

        for page in [0u64, 0x1000, 0x2000, 0x3000, 0x4000] {
            cache.get(&reader, addr(page)).unwrap();
        }

        assert_eq!(*reader.released.borrow(), vec![0]);
        assert_eq!(reader.fetched.borrow().len(), 5);
    }

    #[test]
    fn repeated_address_is_a_cache_hit() {
        let reader = FakeReader {
            fetched: RefCell::new(Vec::new()),
            released: RefCell::new(Vec::new()),
        };
        let mut cache = Cache::new();

        cache.get(&reader, addr(0x1000)).unwrap();
        cache.get(&reader, addr(0x1000 + 0x10)).unwrap();
        cache.get(&reader, addr(0x1000 + 0x20)).unwrap();

        assert_eq!(*reader.fetched.borrow(), vec![0x1000]);
    }

    #[test]
    fn bury_demotes_without_releasing() {
        let reader = FakeReader {
            fetched: RefCell::new(Vec::new()),
            released: RefCell::new(Vec::new()),
        };
        let mut cache = Cache::new();

        for page in [0u64, 0x1000, 0x2000] {
            cache.get(&reader, addr(page)).unwrap();
        }
        // MRU is 0x2000; bury it.
        cache.bury(addr(0x2000));

        // Next miss should evict 0x2000 first, not the untouched slot.
        cache.get(&reader, addr(0x5000)).unwrap();
        assert_eq!(*reader.released.borrow(), vec![0x2000]);
    }
}
