//! Ordered, non-overlapping address maps: "for input address A, which
//! method applies?" in O(log n).

/// Sentinel method index meaning "no method resolves this address" —
/// the `ADDRXLAT_SYS_METH_NONE` slot.
pub const METH_NONE: usize = usize::MAX;

/// One tiled range of a [`Map`]: `[base, base + endoff]` resolves to
/// `meth`. `base` is derived, not stored, from the cumulative widths of
/// preceding ranges.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangeView {
    /// Size of this range minus one.
    pub endoff: u64,
    /// Method table index this range resolves to, or [`METH_NONE`].
    pub meth: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Entry {
    base: u64,
    end: u64,
    meth: usize,
}

/// An ordered, gapless cover of `[0, 2^64)`, each tile tagged with a
/// method table index.
///
/// Internally stored as absolute `(base, end)` pairs rather than
/// relative `endoff` deltas, so [`Map::lookup`] can binary-search
/// directly; [`Map::ranges`] reconstructs the `(endoff, meth)` view for
/// introspection callers, matching the public shape of `map_ranges`.
#[derive(Debug, Clone)]
pub struct Map {
    entries: Vec<Entry>,
}

impl Map {
    /// An empty map: the whole address space resolves to [`METH_NONE`].
    pub fn empty() -> Self {
        Self {
            entries: vec![Entry {
                base: 0,
                end: u64::MAX,
                meth: METH_NONE,
            }],
        }
    }

    /// Binary search for the method index covering `addr`.
    pub fn lookup(&self, addr: u64) -> usize {
        let idx = self
            .entries
            .partition_point(|e| e.end < addr);
        self.entries.get(idx).map(|e| e.meth).unwrap_or(METH_NONE)
    }

    /// Installs `meth` over `[addr, addr + endoff]`, clipping or
    /// splitting any overlapping ranges, then coalescing neighbors that
    /// end up sharing the same method index.
    ///
    /// Overlapping different-method ranges are shortened or dropped;
    /// exact-boundary ties favor the new range; the map still tiles
    /// `[0, 2^64)` afterwards.
    pub fn set(&mut self, addr: u64, endoff: u64, meth: usize) {
        let new_end = if endoff == u64::MAX { u64::MAX } else { addr.wrapping_add(endoff) };
        let new_end = if new_end < addr { u64::MAX } else { new_end };

        let mut fragments = Vec::with_capacity(self.entries.len() + 2);
        for e in &self.entries {
            if e.end < addr || e.base > new_end {
                fragments.push(*e);
                continue;
            }
            if e.base < addr {
                fragments.push(Entry {
                    base: e.base,
                    end: addr - 1,
                    meth: e.meth,
                });
            }
            if e.end > new_end {
                fragments.push(Entry {
                    base: new_end + 1,
                    end: e.end,
                    meth: e.meth,
                });
            }
        }
        fragments.push(Entry {
            base: addr,
            end: new_end,
            meth,
        });
        fragments.sort_by_key(|e| e.base);

        let mut merged: Vec<Entry> = Vec::with_capacity(fragments.len());
        for e in fragments {
            if let Some(last) = merged.last_mut() {
                if last.meth == e.meth && last.end.wrapping_add(1) == e.base {
                    last.end = e.end;
                    continue;
                }
            }
            merged.push(e);
        }

        self.entries = merged;
    }

    /// The `(endoff, method_index)` view of this map's ranges, in
    /// ascending-address order.
    pub fn ranges(&self) -> Vec<RangeView> {
        self.entries
            .iter()
            .map(|e| RangeView {
                endoff: e.end - e.base,
                meth: e.meth,
            })
            .collect()
    }
}

impl Default for Map {
    fn default() -> Self {
        Self::empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_map_tiles_everything_as_none() {
        let map = Map::empty();
        assert_eq!(map.lookup(0), METH_NONE);
        assert_eq!(map.lookup(u64::MAX), METH_NONE);
    }

    #[test]
    fn set_installs_a_range_and_leaves_neighbors_covering_the_rest() {
        let mut map = Map::empty();
        map.set(0x1000, 0xfff, 3);

        assert_eq!(map.lookup(0x0fff), METH_NONE);
        assert_eq!(map.lookup(0x1000), 3);
        assert_eq!(map.lookup(0x1fff), 3);
        assert_eq!(map.lookup(0x2000), METH_NONE);

        let ranges = map.ranges();
        assert_eq!(ranges.len(), 3);
        assert_eq!(ranges.iter().map(|r| r.endoff + 1).sum::<u64>(), 0); // wraps at 2^64
    }

    #[test]
    fn adjacent_same_method_ranges_merge() {
        let mut map = Map::empty();
        map.set(0x1000, 0xfff, 5);
        map.set(0x2000, 0xfff, 5);

        let ranges = map.ranges();
        // [0,0xfff]=NONE, [0x1000,0x2fff]=5, [0x3000,MAX]=NONE
        assert_eq!(ranges.len(), 3);
        assert_eq!(ranges[1].meth, 5);
        assert_eq!(ranges[1].endoff, 0x2000);
    }

    #[test]
    fn overlapping_different_method_clips_the_existing_range() {
        let mut map = Map::empty();
        map.set(0, 0x1fff, 1);
        map.set(0x1000, 0xfff, 2);

        assert_eq!(map.lookup(0x0fff), 1);
        assert_eq!(map.lookup(0x1000), 2);
        assert_eq!(map.lookup(0x1fff), 2);
    }

    #[test]
    fn exact_boundary_collision_favors_new_range() {
        let mut map = Map::empty();
        map.set(0, 0xff, 1);
        map.set(0, 0xff, 2);
        assert_eq!(map.lookup(0), 2);
        assert_eq!(map.lookup(0xff), 2);
    }

    #[test]
    fn single_address_ranges_at_boundary() {
        let mut map = Map::empty();
        map.set(0x100, 0, 7);
        assert_eq!(map.lookup(0xff), METH_NONE);
        assert_eq!(map.lookup(0x100), 7);
        assert_eq!(map.lookup(0x101), METH_NONE);
    }
}
