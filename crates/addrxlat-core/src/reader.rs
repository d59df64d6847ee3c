//! The callback contract a host implements to back the translation engine.

use crate::{address::ReadCaps, byte_order::ByteOrder, error::AddrXlatError, page::MappedPage, Address};

/// A buffer returned by [`Reader::get_page`]: the window of memory it
/// covers, its contents, and the byte order those contents should be
/// interpreted in.
#[derive(Clone)]
pub struct PageBuf {
    /// The base address this buffer covers. May be below the address that
    /// was requested, if the reader rounds down to some natural window
    /// (typically a page boundary).
    pub addr: Address,

    /// The number of bytes available starting at `addr`.
    pub size: u64,

    /// The buffer's contents.
    pub page: MappedPage,

    /// The byte order of multi-byte values stored in `page`.
    pub byte_order: ByteOrder,
}

/// A symbolic-information query, as issued by [`Reader::sym`].
///
/// Mirrors the `ADDRXLAT_SYM_*` discriminants of the original API: each
/// variant carries exactly the arguments that query needs (one name, or a
/// type/member pair for `Offsetof`).
#[derive(Debug, Clone, Copy)]
pub enum SymQuery<'a> {
    /// Resolve a CPU register by name (e.g. `"cr3"`).
    Reg(&'a str),
    /// Resolve the value of a kernel symbol.
    Value(&'a str),
    /// Resolve `sizeof(type)` for a named kernel type.
    Sizeof(&'a str),
    /// Resolve the byte offset of `member` inside `type_name`.
    Offsetof {
        /// The containing type's name.
        type_name: &'a str,
        /// The member's name.
        member: &'a str,
    },
    /// Resolve a named numeric constant.
    Number(&'a str),
}

/// The callback contract an address-translation host must implement.
///
/// This is the Rust shape of `addrxlat_cb_t`: a bundle of memory-reading
/// and symbol-resolution callbacks that the engine drives, never the other
/// way around. A `Reader` never calls back into [`crate::Context`] or
/// [`crate::System`]; it only answers narrow, synchronous questions.
pub trait Reader {
    /// Fills in a buffer covering `addr`.
    ///
    /// The implementation may round `addr` down to a page boundary and
    /// return a window larger than one requested address; the cache layer
    /// accounts for that when matching future reads against this buffer.
    fn get_page(&self, addr: Address) -> Result<PageBuf, AddrXlatError>;

    /// Releases a buffer previously returned by [`Reader::get_page`].
    ///
    /// Called exactly once per buffer, when the read cache evicts it.
    /// The default implementation does nothing, which is correct for
    /// readers whose `MappedPage`s are plain owned allocations (`Rc`
    /// drop suffices); override it when a buffer represents a borrowed or
    /// externally-tracked resource.
    fn put_page(&self, _buf: PageBuf) {}

    /// Resolves a symbolic-information query.
    fn sym(&self, query: SymQuery<'_>) -> Result<u64, AddrXlatError>;

    /// The set of address spaces this reader can service directly via
    /// [`Reader::get_page`], without going through the translation engine.
    fn read_caps(&self) -> ReadCaps;
}
