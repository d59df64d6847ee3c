//! Translation methods: the tagged variants that describe *how* to
//! translate one range of addresses.
//!
//! Per the design notes, method kinds form a closed sum type dispatched by
//! a single `match` in [`crate::step`], never by virtual calls — except
//! for [`MethodKind::Custom`], the sole open extension point, which holds
//! a trait object.

use std::fmt;
use std::rc::Rc;

use crate::{address::AddrSpace, error::AddrXlatError, step::StepState, Address};

/// Maximum number of page-table levels a paging form can describe,
/// including the page-offset "level 0". Five levels covers every format
/// named in the PTE format set (5-level x86-64 is the deepest).
pub const MAX_LEVELS: usize = 5;

/// Maximum number of entries in a [`PagingForm::field_sizes`] vector:
/// one page-offset field plus [`MAX_LEVELS`] table-index fields.
pub const MAX_FIELDS: usize = MAX_LEVELS + 1;

/// The closed set of page-table-entry formats a [`MethodKind::Pgt`]
/// method can walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PteFormat {
    /// No paging; never actually walked (placeholder for an uninitialized
    /// method slot).
    None,
    /// A raw 32-bit frame/table address, used as-is.
    Pfn32,
    /// A raw 64-bit frame/table address, used as-is.
    Pfn64,
    /// AArch64, classic output-address encoding.
    Aarch64,
    /// AArch64 with the LPA output-address extension.
    Aarch64Lpa,
    /// AArch64 with the LPA2 output-address extension.
    Aarch64Lpa2,
    /// 32-bit x86 (non-PAE) paging.
    Ia32,
    /// 32-bit x86 PAE paging.
    Ia32Pae,
    /// 64-bit x86 paging (4- or 5-level).
    X86_64,
    /// s390x four-level paging.
    S390X,
    /// ppc64 Linux radix-tree paging with a 30-bit RPN shift.
    Ppc64LinuxRpn30,
}

/// A page-table format: the PTE tag plus the field-size vector that
/// describes how many bits each level of the walk consumes.
///
/// `field_sizes[0]` is the page-offset width; `field_sizes[i]` for `i >=
/// 1` is the index width at level `i`. The sum over an initialized form
/// never exceeds 64 bits and `nfields` never exceeds [`MAX_FIELDS`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PagingForm {
    /// The PTE format this form describes.
    pub pte_format: PteFormat,
    /// Number of populated entries in `field_sizes`.
    pub nfields: usize,
    /// Field widths in bits, indexed from the least significant.
    pub field_sizes: [u8; MAX_FIELDS],
}

impl PagingForm {
    /// Builds a paging form from a PTE format and field widths, without
    /// further validation (callers are expected to have checked the
    /// width-sum and field-count invariants already, typically while
    /// parsing options).
    pub fn new(pte_format: PteFormat, widths: &[u8]) -> Self {
        let mut field_sizes = [0u8; MAX_FIELDS];
        let nfields = widths.len().min(MAX_FIELDS);
        field_sizes[..nfields].copy_from_slice(&widths[..nfields]);
        Self {
            pte_format,
            nfields,
            field_sizes,
        }
    }

    /// The page-offset width, i.e. `field_sizes[0]`.
    pub fn page_shift(&self) -> u8 {
        self.field_sizes[0]
    }

    /// The number of page-table levels above the page offset, i.e.
    /// `nfields - 1`.
    pub fn levels(&self) -> usize {
        self.nfields.saturating_sub(1)
    }

    /// The element size in bytes a PTE of this format occupies: 4 for the
    /// 32-bit formats, 8 otherwise.
    pub fn elemsz(&self) -> u64 {
        match self.pte_format {
            PteFormat::Pfn32 | PteFormat::Ia32 => 4,
            _ => 8,
        }
    }
}

/// One entry of a [`MethodKind::Lookup`] table: `orig` is matched against
/// the input address, `dest` is the corresponding output base.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LookupElem {
    /// Lower bound of the matched input window.
    pub orig: u64,
    /// Output address corresponding to `orig`.
    pub dest: u64,
}

/// The object-safe extension point for [`MethodKind::Custom`].
///
/// This is the sole method kind whose step is driven by virtual dispatch
/// rather than a `match` arm, matching the design note: everything else
/// is a closed tagged union.
pub trait CustomStep {
    /// Advances `state` by one step. Implementations update `state` the
    /// same way a built-in step function would: either decrement
    /// `remain` and move `base` to the next level, or set `elemsz = 1`
    /// and `base` to the final answer.
    fn step(&self, state: &mut StepState) -> Result<(), AddrXlatError>;
}

/// The tagged variant describing how to translate one range of addresses.
///
/// Mirrors `addrxlat_meth_t`'s `kind`-discriminated union; in Rust this is
/// a plain `enum` instead of a C union plus discriminant byte.
pub enum MethodKind {
    /// Uninitialized / sentinel method slot. Stepping it is an error.
    None,
    /// User-defined translation, invoked through [`CustomStep`].
    Custom(Rc<dyn CustomStep>),
    /// Fixed signed offset added to the input (64-bit modular arithmetic).
    Linear {
        /// The offset added to the input address.
        offset: i64,
    },
    /// A page-table walk.
    Pgt {
        /// The page-table format being walked.
        form: PagingForm,
        /// The full address of the top-level table.
        root: Address,
        /// Optional mask ANDed into every raw PTE before interpretation.
        pte_mask: u64,
    },
    /// A sorted table of fixed-size address windows.
    Lookup {
        /// `endoff`: the size of each window, minus one.
        endoff: u64,
        /// The `(orig, dest)` pairs, ordered by `orig`.
        table: Vec<LookupElem>,
    },
    /// A translation value read from an in-memory array indexed by page
    /// number.
    Memarr {
        /// Base address of the array.
        base: Address,
        /// Page shift of the indexed array (bits of the input consumed
        /// per array entry).
        shift: u8,
        /// Size in bytes of one array entry as stored.
        elemsz: u8,
        /// Active width in bytes of the value extracted from an entry.
        valsz: u8,
    },
}

impl fmt::Debug for MethodKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "None"),
            Self::Custom(_) => write!(f, "Custom(..)"),
            Self::Linear { offset } => f.debug_struct("Linear").field("offset", offset).finish(),
            Self::Pgt { form, root, pte_mask } => f
                .debug_struct("Pgt")
                .field("form", form)
                .field("root", root)
                .field("pte_mask", pte_mask)
                .finish(),
            Self::Lookup { endoff, table } => f
                .debug_struct("Lookup")
                .field("endoff", endoff)
                .field("entries", &table.len())
                .finish(),
            Self::Memarr { base, shift, elemsz, valsz } => f
                .debug_struct("Memarr")
                .field("base", base)
                .field("shift", shift)
                .field("elemsz", elemsz)
                .field("valsz", valsz)
                .finish(),
        }
    }
}

/// A method: its kind plus the address space its output lands in.
#[derive(Debug)]
pub struct Method {
    /// The kind of translation this method performs.
    pub kind: MethodKind,
    /// The address space a successful step's output address belongs to.
    pub target_as: AddrSpace,
}

impl Method {
    /// The uninitialized sentinel method, targeting [`AddrSpace::NoAddr`].
    pub fn none() -> Self {
        Self {
            kind: MethodKind::None,
            target_as: AddrSpace::NoAddr,
        }
    }

    /// Whether this method is the `NONE` sentinel.
    pub fn is_none(&self) -> bool {
        matches!(self.kind, MethodKind::None)
    }
}
