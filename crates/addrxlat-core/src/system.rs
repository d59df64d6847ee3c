//! The fixed-size collection of methods and direction maps an OS-init
//! routine populates, shared read-only by every translation call.

use crate::{
    map::{Map, METH_NONE},
    method::Method,
};

/// Named method table slots, mirroring `ADDRXLAT_SYS_METH_*`.
///
/// A system's method table always has at least these eight slots
/// populated (some possibly left [`Method::none`]); OS-init routines may
/// push further slots past [`SysMeth::CUSTOM`] for extension methods.
pub mod sys_meth {
    /// Top-level (process/kernel) page-table walk.
    pub const ROOT_PGT: usize = 0;
    /// Userspace page-table walk (only distinct from [`ROOT_PGT`] on
    /// architectures like ppc64 where kernel and user share one format
    /// but the kernel root is resolved separately).
    pub const USER_PGT: usize = 1;
    /// Direct (linear) physical-to-virtual mapping.
    pub const DIRECT: usize = 2;
    /// Kernel text mapping.
    pub const KERNEL_TEXT: usize = 3;
    /// `vmemmap` mapping.
    pub const VMEMMAP: usize = 4;
    /// Reverse of [`DIRECT`].
    pub const REVERSE_DIRECT: usize = 5;
    /// Machine-physical to kernel-physical (Xen P2M or identity).
    pub const MACHPHYS_KPHYS: usize = 6;
    /// Kernel-physical to machine-physical (Xen M2P or identity).
    pub const KPHYS_MACHPHYS: usize = 7;
    /// First slot available for a custom extension method.
    pub const CUSTOM: usize = 8;
}

/// The five semantic direction maps a system carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapDirection {
    /// Hardware-level view, used while walking page tables themselves
    /// (the root pointer's own space, before any Xen indirection).
    Hw,
    /// Kernel-virtual to kernel-physical.
    KvPhys,
    /// Kernel-physical to a direct-mapped kernel-virtual address.
    KphysDirect,
    /// Machine-physical to kernel-physical.
    MachphysKphys,
    /// Kernel-physical to machine-physical.
    KphysMachphys,
}

impl MapDirection {
    const ALL: [MapDirection; 5] = [
        MapDirection::Hw,
        MapDirection::KvPhys,
        MapDirection::KphysDirect,
        MapDirection::MachphysKphys,
        MapDirection::KphysMachphys,
    ];

    fn index(self) -> usize {
        match self {
            MapDirection::Hw => 0,
            MapDirection::KvPhys => 1,
            MapDirection::KphysDirect => 2,
            MapDirection::MachphysKphys => 3,
            MapDirection::KphysMachphys => 4,
        }
    }
}

/// A named collection of methods and direction-indexed maps, as produced
/// by an OS-specific initialization routine.
///
/// Immutable once initialized (the crate never mutates a `System` after
/// `osinit` returns), so it is safely shared read-only by many
/// concurrent translations — see the concurrency model. Reference
/// counting (if the host needs to share one across contexts) is the
/// caller's concern, typically via `Rc`/`Arc`.
#[derive(Debug)]
pub struct System {
    methods: Vec<Method>,
    maps: [Map; 5],
}

impl System {
    /// An uninitialized system: every method slot is [`Method::none`],
    /// every map resolves every address to [`METH_NONE`].
    pub fn empty() -> Self {
        Self {
            methods: (0..sys_meth::CUSTOM).map(|_| Method::none()).collect(),
            maps: std::array::from_fn(|_| Map::empty()),
        }
    }

    /// The method at `idx`, or `None` if `idx` is out of range (which
    /// includes [`METH_NONE`]).
    pub fn meth(&self, idx: usize) -> Option<&Method> {
        if idx == METH_NONE {
            return None;
        }
        self.methods.get(idx)
    }

    /// Installs `meth` at `idx`, growing the method table if `idx` falls
    /// in the custom-extension range past [`sys_meth::CUSTOM`].
    pub fn set_meth(&mut self, idx: usize, meth: Method) {
        if idx >= self.methods.len() {
            self.methods.resize_with(idx + 1, Method::none);
        }
        self.methods[idx] = meth;
    }

    /// Appends `meth` as a new custom-extension slot, returning its
    /// index.
    pub fn push_custom_meth(&mut self, meth: Method) -> usize {
        self.methods.push(meth);
        self.methods.len() - 1
    }

    /// The map for `direction`.
    pub fn map(&self, direction: MapDirection) -> &Map {
        &self.maps[direction.index()]
    }

    /// Mutable access to the map for `direction`, for OS-init to
    /// populate.
    pub fn map_mut(&mut self, direction: MapDirection) -> &mut Map {
        &mut self.maps[direction.index()]
    }

    /// Iterates over all five named directions alongside their maps.
    pub fn maps(&self) -> impl Iterator<Item = (MapDirection, &Map)> {
        MapDirection::ALL.into_iter().map(|d| (d, self.map(d)))
    }
}

impl Default for System {
    fn default() -> Self {
        Self::empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::method::MethodKind;

    #[test]
    fn empty_system_has_no_methods_installed() {
        let sys = System::empty();
        assert!(sys.meth(sys_meth::ROOT_PGT).unwrap().is_none());
        assert_eq!(sys.meth(METH_NONE), None);
    }

    #[test]
    fn custom_method_can_be_pushed_past_named_slots() {
        let mut sys = System::empty();
        let idx = sys.push_custom_meth(Method {
            kind: MethodKind::Linear { offset: 0 },
            target_as: crate::address::AddrSpace::KPhysAddr,
        });
        assert_eq!(idx, sys_meth::CUSTOM);
        assert!(!sys.meth(idx).unwrap().is_none());
    }

    #[test]
    fn map_mut_round_trips_through_direction() {
        let mut sys = System::empty();
        sys.map_mut(MapDirection::KvPhys).set(0x1000, 0xfff, 3);
        assert_eq!(sys.map(MapDirection::KvPhys).lookup(0x1000), 3);
        assert_eq!(sys.map(MapDirection::Hw).lookup(0x1000), METH_NONE);
    }
}
