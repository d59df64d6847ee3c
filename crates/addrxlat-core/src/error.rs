//! Error taxonomy and the accreting error-message buffer.
//!
//! Two distinct things are modeled here, matching the split between
//! `addrxlat_status` and `kdump_errmsg_t` in the original implementation:
//!
//! - [`AddrXlatError`] — the `Result::Err` variant every fallible call in
//!   this crate returns. Plain data, cheap to construct and match on.
//! - [`ErrorBuf`] — a small string buffer owned by [`crate::Context`] that
//!   accretes a human-readable explanation by prefixing, one layer at a
//!   time, as an error propagates up through the engine.

/// An error that can occur while translating an address or walking a page
/// table.
#[derive(thiserror::Error, Debug)]
pub enum AddrXlatError {
    /// A requested feature, option, or page size is not supported.
    #[error("not implemented: {0}")]
    NotImpl(String),

    /// A page table entry (or lookup window) marks the address absent.
    ///
    /// Not a defect: this is a routine terminal signal, used e.g. while
    /// probing whether an address is mapped at all.
    #[error("page not present")]
    NotPresent,

    /// Malformed input or a page table entry that violates its format's
    /// invariants.
    #[error("invalid: {0}")]
    Invalid(String),

    /// Allocation failure (table construction, option buffers, ...).
    #[error("out of memory")]
    NoMem,

    /// The reader declined to provide requested data (no callback
    /// installed, or the callback itself reported data unavailable).
    #[error("no data: {0}")]
    NoData(String),

    /// No map entry resolves the requested direction for this address
    /// range.
    #[error("no translation method: {0}")]
    NoMeth(String),

    /// An opaque error surfaced by the user-supplied [`crate::Reader`].
    #[error(transparent)]
    Reader(Box<dyn std::error::Error + Send + Sync>),

    /// A host/OS-specific numeric error code, propagated verbatim from a
    /// callback (the "reserved range for system-defined codes").
    #[error("system error {0}")]
    Os(i64),
}

impl AddrXlatError {
    /// Whether this error is [`AddrXlatError::NotPresent`].
    ///
    /// Distinguishing this from other failures matters: callers that are
    /// merely probing an address (e.g. system initialization discovering
    /// the shape of a page table) expect to see this routinely.
    pub fn is_not_present(&self) -> bool {
        matches!(self, Self::NotPresent)
    }
}

/// A small, accreting error-message buffer, owned by a [`crate::Context`].
///
/// Every layer that fails may prefix its own explanation onto the
/// message already collected by layers below it, so the final message
/// reads outermost-first, e.g. `"Cannot read 64-bit pte at KVADDR:0x...:
/// No read callback for KVADDR"`.
#[derive(Debug, Default, Clone)]
pub struct ErrorBuf {
    message: Option<String>,
}

impl ErrorBuf {
    /// Creates an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Prefixes `msg` onto whatever message is already buffered.
    pub fn prefix(&mut self, msg: impl std::fmt::Display) {
        self.message = Some(match self.message.take() {
            Some(inner) => format!("{msg}: {inner}"),
            None => msg.to_string(),
        });
    }

    /// Clears the buffer. Called on `OK` and via the public `clear_err`
    /// API.
    pub fn clear(&mut self) {
        self.message = None;
    }

    /// The currently buffered message, if any.
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_reads_outermost_first() {
        let mut buf = ErrorBuf::new();
        buf.prefix("page not present");
        buf.prefix("cannot read pte[3]");
        buf.prefix("cannot translate 0xdead");
        assert_eq!(
            buf.message(),
            Some("cannot translate 0xdead: cannot read pte[3]: page not present")
        );
    }

    #[test]
    fn clear_resets_buffer() {
        let mut buf = ErrorBuf::new();
        buf.prefix("boom");
        buf.clear();
        assert_eq!(buf.message(), None);
    }
}
