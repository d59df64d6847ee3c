//! Mapped page buffers returned by a [`crate::Reader`].

use std::{ops::Deref, rc::Rc};

/// A page (or window) of memory handed back by a reader's `get_page`
/// callback.
///
/// Modeled directly on `vmi_core::VmiMappedPage`: an `Rc`-shared, type
/// erased byte slice, so the reader can hand back anything from an owned
/// `Vec<u8>` to a memory-mapped region without the cache caring which.
#[derive(Clone)]
pub struct MappedPage(Rc<Box<dyn Deref<Target = [u8]>>>);

impl MappedPage {
    /// Wraps any byte-slice-like owner as a mapped page.
    pub fn new<T>(inner: T) -> Self
    where
        T: Deref<Target = [u8]> + 'static,
    {
        Self(Rc::new(Box::new(inner)))
    }
}

impl Deref for MappedPage {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl AsRef<[u8]> for MappedPage {
    fn as_ref(&self) -> &[u8] {
        self.deref()
    }
}

impl std::fmt::Debug for MappedPage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MappedPage").field("len", &self.len()).finish()
    }
}
