//! The per-session [`Context`]: user callbacks, the read cache, and the
//! accreting error buffer.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use tracing::trace;

use crate::{
    address::{AddrSpace, Address, ReadCaps},
    byte_order::ByteOrder,
    cache::Cache,
    error::{AddrXlatError, ErrorBuf},
    reader::{Reader, SymQuery},
};

/// The object-safe read/symbol contract the step engine drives.
///
/// [`Context<R>`] is the only implementer; this trait exists so that
/// [`crate::step::StepState`] and [`crate::method::CustomStep`] don't need
/// to be generic over the concrete reader type `R`, keeping `CustomStep`
/// object-safe and storable as `Rc<dyn CustomStep>`.
pub trait ContextOps {
    /// Reads a 32-bit value at `addr`, going through the read cache when
    /// possible. `what` names the object being read, for error messages.
    fn read32(&self, addr: Address, what: &'static str) -> Result<u32, AddrXlatError>;

    /// Reads a 64-bit value at `addr`, going through the read cache when
    /// possible. `what` names the object being read, for error messages.
    fn read64(&self, addr: Address, what: &'static str) -> Result<u64, AddrXlatError>;

    /// Resolves a symbolic-information query via the installed reader.
    fn sym(&self, query: SymQuery<'_>) -> Result<u64, AddrXlatError>;

    /// The set of address spaces the installed reader can service
    /// directly.
    fn read_caps(&self) -> ReadCaps;

    /// Prefixes `msg` onto the context's accreting error buffer.
    fn prefix_err(&self, msg: &dyn std::fmt::Display);

    /// Demotes the cache slot backing `addr` to the LRU position, without
    /// releasing it. Used to bias eviction away from transient reads
    /// (e.g. page-table walks that touch many tables once).
    fn bury(&self, addr: Address);

    /// Whether `noerr.notpresent` is currently set, i.e. whether a step
    /// function discovering a `NotPresent` condition on its own (not via
    /// a failed read) should skip formatting an error message.
    fn is_notpresent_suppressed(&self) -> bool;
}

/// RAII guard returned by [`Context::suppress_notpresent`]: restores the
/// previous `noerr.notpresent` setting when dropped, so callers can never
/// forget to turn message formatting back on.
pub struct NotPresentGuard<'a, R: Reader> {
    ctx: &'a Context<R>,
    previous: bool,
}

impl<R: Reader> Drop for NotPresentGuard<'_, R> {
    fn drop(&mut self) {
        self.ctx.noerr_notpresent.set(self.previous);
    }
}

/// A per-session translation context: the user's callbacks, a read cache
/// over them, and the error-message buffer those callbacks' failures
/// accumulate into.
///
/// Reference-counted with a plain `Rc`, not `Arc` — a context is used from
/// one thread at a time, and a caller sharing one across threads is
/// responsible for its own synchronization.
pub struct Context<R: Reader> {
    reader: R,
    cache: RefCell<Cache>,
    err: RefCell<ErrorBuf>,
    noerr_notpresent: Cell<bool>,
}

impl<R: Reader> Context<R> {
    /// Wraps `reader` in a new context with an empty cache and no buffered
    /// error.
    pub fn new(reader: R) -> Rc<Self> {
        Rc::new(Self {
            reader,
            cache: RefCell::new(Cache::new()),
            err: RefCell::new(ErrorBuf::new()),
            noerr_notpresent: Cell::new(false),
        })
    }

    /// The installed reader.
    pub fn reader(&self) -> &R {
        &self.reader
    }

    /// The currently buffered error message, if any.
    pub fn get_err(&self) -> Option<String> {
        self.err.borrow().message().map(str::to_owned)
    }

    /// Clears the buffered error message.
    pub fn clear_err(&self) {
        self.err.borrow_mut().clear();
    }

    /// Suppresses error-message formatting (not the returned status) for
    /// [`AddrXlatError::NotPresent`] results for the lifetime of the
    /// returned guard. Used by probing walks, e.g. OS initialization
    /// testing whether an optional region is mapped at all.
    pub fn suppress_notpresent(&self) -> NotPresentGuard<'_, R> {
        let previous = self.noerr_notpresent.replace(true);
        NotPresentGuard { ctx: self, previous }
    }

    fn read_raw(&self, addr: Address, size: u64, what: &'static str) -> Result<(ByteOrder, Vec<u8>), AddrXlatError> {
        if !self.reader.read_caps().covers(addr.space) {
            return Err(AddrXlatError::NoData(format!(
                "no read callback for {}",
                addr.space
            )));
        }

        let mut cache = self.cache.borrow_mut();
        let result = cache.get(&self.reader, addr).map(|buf| {
            let off = (addr.value - buf.addr.value) as usize;
            (buf.byte_order, buf.page[off..off + size as usize].to_vec())
        });

        result.map_err(|e| {
            if !(matches!(e, AddrXlatError::NotPresent) && self.noerr_notpresent.get()) {
                self.prefix_err_inner(&format!("cannot read {size}-byte {what} at {addr}"));
            }
            e
        })
    }

    fn prefix_err_inner(&self, msg: &dyn std::fmt::Display) {
        self.err.borrow_mut().prefix(msg);
    }
}

impl<R: Reader> ContextOps for Context<R> {
    fn read32(&self, addr: Address, what: &'static str) -> Result<u32, AddrXlatError> {
        let (byte_order, bytes) = self.read_raw(addr, 4, what)?;
        trace!(%addr, what, "read32");
        Ok(byte_order.read_u32(&bytes, 0))
    }

    fn read64(&self, addr: Address, what: &'static str) -> Result<u64, AddrXlatError> {
        let (byte_order, bytes) = self.read_raw(addr, 8, what)?;
        trace!(%addr, what, "read64");
        Ok(byte_order.read_u64(&bytes, 0))
    }

    fn sym(&self, query: SymQuery<'_>) -> Result<u64, AddrXlatError> {
        self.reader.sym(query)
    }

    fn read_caps(&self) -> ReadCaps {
        self.reader.read_caps()
    }

    fn prefix_err(&self, msg: &dyn std::fmt::Display) {
        self.prefix_err_inner(msg);
    }

    fn bury(&self, addr: Address) {
        self.cache.borrow_mut().bury(addr);
    }

    fn is_notpresent_suppressed(&self) -> bool {
        self.noerr_notpresent.get()
    }
}

impl<R: Reader> Drop for Context<R> {
    fn drop(&mut self) {
        self.cache.borrow_mut().clear(&self.reader);
    }
}

/// Convenience used by callers who only ever deal with [`AddrSpace`]
/// tokens at the boundary (e.g. the option parser) and need a readable
/// default for an uninitialized full address.
pub fn none_address() -> Address {
    Address::new(AddrSpace::NoAddr, 0)
}
