//! Address spaces and the full-address type used throughout translation.

use bitflags::bitflags;

/// One of the four address spaces a translation request can name.
///
/// Mirrors `ADDRXLAT_KPHYSADDR` / `ADDRXLAT_MACHPHYSADDR` / `ADDRXLAT_KVADDR`
/// / `ADDRXLAT_NOADDR` from the original `addrxlat` API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AddrSpace {
    /// Kernel-view physical address.
    KPhysAddr,

    /// Hypervisor/machine physical address.
    MachPhysAddr,

    /// Kernel virtual address.
    KVAddr,

    /// Sentinel for an uninitialized or unresolvable address.
    NoAddr,
}

impl AddrSpace {
    /// The human-readable token used in option strings and error messages
    /// (e.g. `"KVADDR"`).
    pub fn name(self) -> &'static str {
        match self {
            Self::KPhysAddr => "KPHYSADDR",
            Self::MachPhysAddr => "MACHPHYSADDR",
            Self::KVAddr => "KVADDR",
            Self::NoAddr => "NOADDR",
        }
    }

    /// Parses one of the address-space tokens, case-insensitively.
    ///
    /// Returns `None` if `s` does not name a known address space.
    pub fn parse(s: &str) -> Option<Self> {
        if s.eq_ignore_ascii_case("KVADDR") {
            Some(Self::KVAddr)
        } else if s.eq_ignore_ascii_case("KPHYSADDR") {
            Some(Self::KPhysAddr)
        } else if s.eq_ignore_ascii_case("MACHPHYSADDR") {
            Some(Self::MachPhysAddr)
        } else if s.eq_ignore_ascii_case("NOADDR") {
            Some(Self::NoAddr)
        } else {
            None
        }
    }
}

impl std::fmt::Display for AddrSpace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

bitflags! {
    /// Bitmask of address spaces a [`Reader`](crate::Reader) can service
    /// directly, without going through the translation engine.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ReadCaps: u32 {
        /// The reader can serve [`AddrSpace::KPhysAddr`] directly.
        const KPHYSADDR = 1 << 0;
        /// The reader can serve [`AddrSpace::MachPhysAddr`] directly.
        const MACHPHYSADDR = 1 << 1;
        /// The reader can serve [`AddrSpace::KVAddr`] directly.
        const KVADDR = 1 << 2;
    }
}

impl ReadCaps {
    /// Returns the capability bit corresponding to `space`, or an empty
    /// mask for [`AddrSpace::NoAddr`] (which is never directly readable).
    pub fn of(space: AddrSpace) -> Self {
        match space {
            AddrSpace::KPhysAddr => Self::KPHYSADDR,
            AddrSpace::MachPhysAddr => Self::MACHPHYSADDR,
            AddrSpace::KVAddr => Self::KVADDR,
            AddrSpace::NoAddr => Self::empty(),
        }
    }

    /// Whether `space` can be served directly by a reader with these caps.
    pub fn covers(self, space: AddrSpace) -> bool {
        self.contains(Self::of(space))
    }
}

/// A full address: a value paired with the address space it lives in.
///
/// This is the `addrxlat_fulladdr_t` of the original API: every address
/// that crosses a component boundary in this crate carries its own space,
/// since the same 64-bit value means different things in different spaces.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Address {
    /// The address space this value is interpreted in.
    pub space: AddrSpace,

    /// The raw 64-bit value.
    pub value: u64,
}

impl Address {
    /// Creates a new full address.
    pub const fn new(space: AddrSpace, value: u64) -> Self {
        Self { space, value }
    }

    /// The `NOADDR` sentinel, used to mark uninitialized fields such as an
    /// unresolved page-table root.
    pub const fn none() -> Self {
        Self {
            space: AddrSpace::NoAddr,
            value: 0,
        }
    }

    /// Whether this address is the `NOADDR` sentinel.
    pub fn is_none(self) -> bool {
        matches!(self.space, AddrSpace::NoAddr)
    }

    /// Returns a copy of this address with `value` replaced, keeping the
    /// same address space.
    pub fn with_value(self, value: u64) -> Self {
        Self { value, ..self }
    }

    /// Returns a copy of this address in a different address space, keeping
    /// the same value. Used when a method's `target_as` changes the space
    /// of the output without changing the numeric value (e.g. linear maps).
    pub fn with_space(self, space: AddrSpace) -> Self {
        Self { space, ..self }
    }

    /// Adds `rhs` to the address value, wrapping on overflow (the address
    /// space is a modular 64-bit ring).
    pub fn wrapping_add(self, rhs: u64) -> Self {
        self.with_value(self.value.wrapping_add(rhs))
    }

    /// Adds a signed offset to the address value, wrapping on overflow.
    pub fn wrapping_add_signed(self, rhs: i64) -> Self {
        self.with_value(self.value.wrapping_add(rhs as u64))
    }
}

impl std::fmt::Debug for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:0x{:016x}", self.space, self.value)
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Debug::fmt(self, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_space_round_trips_through_name() {
        for space in [
            AddrSpace::KPhysAddr,
            AddrSpace::MachPhysAddr,
            AddrSpace::KVAddr,
            AddrSpace::NoAddr,
        ] {
            assert_eq!(AddrSpace::parse(space.name()), Some(space));
            assert_eq!(AddrSpace::parse(&space.name().to_lowercase()), Some(space));
        }
    }

    #[test]
    fn read_caps_cover_only_addressable_spaces() {
        let caps = ReadCaps::KPHYSADDR | ReadCaps::KVADDR;
        assert!(caps.covers(AddrSpace::KPhysAddr));
        assert!(caps.covers(AddrSpace::KVAddr));
        assert!(!caps.covers(AddrSpace::MachPhysAddr));
        assert!(!caps.covers(AddrSpace::NoAddr));
    }

    #[test]
    fn wrapping_add_wraps_at_u64_boundary() {
        let a = Address::new(AddrSpace::KVAddr, u64::MAX);
        assert_eq!(a.wrapping_add(1).value, 0);
    }
}
