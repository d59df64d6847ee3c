//! The step engine: advances a translation one page-table level (or one
//! lookup/array access) at a time, driven by a [`Method`].

pub mod pgt;

use tracing::trace;

use crate::{
    address::AddrSpace,
    context::ContextOps,
    error::AddrXlatError,
    method::{Method, MethodKind, MAX_FIELDS},
    system::System,
    Address,
};

/// The mutable state a single step advances.
///
/// `base` is the current table/frame's full address, `remain` counts the
/// walk levels left (including the one about to be read), `elemsz` is
/// the byte width of the element at the current level (set to 1 once the
/// walk has terminated), `idx` holds the per-level index array seeded by
/// the operation engine from the input address, and `raw` records the
/// most recently read raw PTE (mostly for diagnostics and tests).
pub struct StepState<'a> {
    /// The context driving reads and symbol lookups.
    pub ctx: &'a dyn ContextOps,
    /// The system the method being stepped belongs to, for methods (e.g.
    /// a future [`crate::method::CustomStep`]) that need to consult other
    /// methods or maps mid-walk.
    pub sys: &'a System,
    /// The current table or frame address.
    pub base: Address,
    /// Remaining walk levels, including the one about to be read.
    pub remain: usize,
    /// Byte width of the element at the current level; 1 once terminated.
    pub elemsz: u64,
    /// Per-level index array, `idx[0]` is the page-offset component.
    pub idx: [u64; MAX_FIELDS],
    /// The most recently read raw PTE (or array element).
    pub raw: u64,
}

impl<'a> StepState<'a> {
    /// Whether this state has terminated (the final address sits in
    /// `base`).
    pub fn terminated(&self) -> bool {
        self.elemsz == 1
    }
}

/// A standalone, caller-driven walk: pairs a [`StepState`] with the
/// [`Method`] advancing it, for callers that want to single-step a
/// translation themselves rather than go through
/// [`crate::operation::translate`]'s re-dispatching loop.
///
/// Mirrors the host-facing `step()`/`next()` pair: construct with
/// [`Step::new`], then call [`Step::next`] until it reports termination.
pub struct Step<'a> {
    meth: &'a Method,
    /// The state this walk is advancing; inspect `idx`, `raw`, and `base`
    /// between calls to [`Step::next`].
    pub state: StepState<'a>,
}

impl<'a> Step<'a> {
    /// Seeds a new walk of `meth` starting at `addr`, the same way the
    /// operation engine does before driving it to completion.
    pub fn new(ctx: &'a dyn ContextOps, sys: &'a System, meth: &'a Method, addr: Address) -> Self {
        Self {
            meth,
            state: crate::operation::seed_state(ctx, sys, meth, addr),
        }
    }

    /// Advances the walk by one level. Returns `true` once the walk has
    /// terminated (the final address is in `self.state.base`); callers
    /// should stop calling `next` at that point, possibly re-dispatching
    /// through a different map if `self.state.base.space` changed.
    pub fn next(&mut self) -> Result<bool, AddrXlatError> {
        self.meth.step(&mut self.state)?;
        Ok(self.state.terminated())
    }
}

/// Sums `idx[0..levels)`, each shifted by the cumulative width of the
/// levels below it, per `form`'s field widths.
///
/// This is the generic "squash the untranslated low-order index bits into
/// one intra-page offset" computation used both for ordinary final-level
/// termination (`levels == 1`, giving just `idx[0]`) and for huge-page
/// short-circuit termination at a higher level (`levels == remain` at the
/// point a huge entry is discovered).
pub fn squash_offset(form: &crate::method::PagingForm, idx: &[u64; MAX_FIELDS], levels: usize) -> u64 {
    let mut offset = 0u64;
    let mut shift = 0u32;
    for (i, width) in form.field_sizes.iter().enumerate().take(levels) {
        offset |= idx[i] << shift;
        shift += *width as u32;
    }
    offset
}

impl Method {
    /// Advances `state` by one step according to this method's kind.
    pub fn step(&self, state: &mut StepState<'_>) -> Result<(), AddrXlatError> {
        match &self.kind {
            MethodKind::None => Err(AddrXlatError::NoMeth("method slot is unset".into())),
            MethodKind::Custom(custom) => custom.step(state),
            MethodKind::Linear { offset } => {
                trace!(offset, "step: linear");
                state.base = state.base.wrapping_add_signed(*offset).with_space(self.target_as);
                state.elemsz = 1;
                Ok(())
            }
            MethodKind::Pgt { form, pte_mask, .. } => pgt::step(state, form, *pte_mask, self.target_as),
            MethodKind::Lookup { endoff, table } => step_lookup(state, *endoff, table, self.target_as),
            MethodKind::Memarr {
                base,
                shift,
                elemsz,
                valsz,
            } => step_memarr(state, *base, *shift, *elemsz, *valsz, self.target_as),
        }
    }
}

fn step_lookup(
    state: &mut StepState<'_>,
    endoff: u64,
    table: &[crate::method::LookupElem],
    target_as: AddrSpace,
) -> Result<(), AddrXlatError> {
    let input = state.base.value;
    let hit = table.binary_search_by(|e| {
        if input < e.orig {
            std::cmp::Ordering::Greater
        } else if input > e.orig.saturating_add(endoff) {
            std::cmp::Ordering::Less
        } else {
            std::cmp::Ordering::Equal
        }
    });

    match hit {
        Ok(i) => {
            let elem = table[i];
            trace!(orig = elem.orig, dest = elem.dest, "step: lookup hit");
            state.base = Address::new(target_as, elem.dest.wrapping_add(input - elem.orig));
            state.elemsz = 1;
            Ok(())
        }
        Err(_) => Err(AddrXlatError::NotPresent),
    }
}

fn step_memarr(
    state: &mut StepState<'_>,
    base: Address,
    shift: u8,
    elemsz: u8,
    valsz: u8,
    target_as: AddrSpace,
) -> Result<(), AddrXlatError> {
    let input = state.base.value;
    let entry_addr = base.wrapping_add((input >> shift) * elemsz as u64);

    let value = match valsz {
        4 => state.ctx.read32(entry_addr, "memarr entry")? as u64,
        8 => state.ctx.read64(entry_addr, "memarr entry")?,
        other => return Err(AddrXlatError::Invalid(format!("unsupported memarr valsz {other}"))),
    };

    trace!(%entry_addr, value, "step: memarr");
    let mask = if shift >= 64 { u64::MAX } else { (1u64 << shift) - 1 };
    state.base = Address::new(target_as, (value << shift) | (input & mask));
    state.elemsz = 1;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{context::Context, page::MappedPage, reader::{PageBuf, Reader, SymQuery}, system::System, AddrSpace};

    struct NullReader;

    impl Reader for NullReader {
        fn get_page(&self, addr: Address) -> Result<PageBuf, AddrXlatError> {
            Ok(PageBuf {
                addr,
                size: 0x1000,
                page: MappedPage::new(vec![0u8; 0x1000]),
                byte_order: crate::byte_order::ByteOrder::Little,
            })
        }

        fn sym(&self, _query: SymQuery<'_>) -> Result<u64, AddrXlatError> {
            unimplemented!()
        }

        fn read_caps(&self) -> crate::address::ReadCaps {
            crate::address::ReadCaps::all()
        }
    }

    #[test]
    fn caller_driven_step_terminates_in_one_call() {
        let ctx = Context::new(NullReader);
        let sys = System::empty();
        let meth = Method {
            kind: MethodKind::Linear { offset: 0x2000 },
            target_as: AddrSpace::KPhysAddr,
        };

        let addr = Address::new(AddrSpace::KVAddr, 0x1000);
        let mut walk = Step::new(ctx.as_ref(), &sys, &meth, addr);
        let done = walk.next().unwrap();

        assert!(done);
        assert_eq!(walk.state.base, Address::new(AddrSpace::KPhysAddr, 0x3000));
    }
}
