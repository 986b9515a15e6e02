//! Extents and their checksum bookkeeping
//!
//! Responsibilities:
//! - Represent record ranges (`Extent`) with an explicit "unset" state instead
//!   of the `u64::MAX` sentinel used on the wire.
//! - Count checksum chunks covering an extent (`layout`).
//! - Align a visible sub-range of a stored extent to chunk boundaries (`entry`).
//! - Resolve which stored extents are visible for a range at an epoch (`index`).
//!
//! Submodules:
//! - `layout`: chunk arithmetic
//! - `entry`: tree entries and chunk alignment
//! - `index`: in-memory versioned extent index
pub mod entry;
pub mod index;
pub mod layout;

/// Wire value marking an unset bound.
pub const EXTENT_UNSET: u64 = u64::MAX;

/// Inclusive range of record indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Extent {
    #[default]
    Unset,
    Range { lo: u64, hi: u64 },
}

impl Extent {
    pub fn new(lo: u64, hi: u64) -> Self {
        debug_assert!(lo <= hi, "extent lo {lo} > hi {hi}");
        Extent::Range { lo, hi }
    }

    /// `[idx, idx + nr - 1]`, or `None` for an empty or overflowing recx.
    pub fn from_recx(idx: u64, nr: u64) -> Option<Self> {
        if nr == 0 {
            return None;
        }
        let hi = idx.checked_add(nr - 1)?;
        if hi == EXTENT_UNSET {
            return None;
        }
        Some(Extent::Range { lo: idx, hi })
    }

    /// Decode from the fixed-layout representation.
    pub fn from_raw(lo: u64, hi: u64) -> Option<Self> {
        match (lo, hi) {
            (EXTENT_UNSET, EXTENT_UNSET) => Some(Extent::Unset),
            (lo, hi) if lo <= hi && hi != EXTENT_UNSET => Some(Extent::Range { lo, hi }),
            _ => None,
        }
    }

    pub fn to_raw(self) -> (u64, u64) {
        match self {
            Extent::Unset => (EXTENT_UNSET, EXTENT_UNSET),
            Extent::Range { lo, hi } => (lo, hi),
        }
    }

    pub fn is_unset(&self) -> bool {
        matches!(self, Extent::Unset)
    }

    pub fn bounds(&self) -> Option<(u64, u64)> {
        match *self {
            Extent::Unset => None,
            Extent::Range { lo, hi } => Some((lo, hi)),
        }
    }

    /// Number of records covered.
    pub fn width(&self) -> u64 {
        match *self {
            Extent::Unset => 0,
            Extent::Range { lo, hi } => hi - lo + 1,
        }
    }

    pub fn contains(&self, other: &Extent) -> bool {
        match (self.bounds(), other.bounds()) {
            (Some((lo, hi)), Some((olo, ohi))) => lo <= olo && ohi <= hi,
            _ => false,
        }
    }

    pub fn overlaps(&self, other: &Extent) -> bool {
        !self.intersect(other).is_unset()
    }

    pub fn intersect(&self, other: &Extent) -> Extent {
        match (self.bounds(), other.bounds()) {
            (Some((lo, hi)), Some((olo, ohi))) => {
                let lo = lo.max(olo);
                let hi = hi.min(ohi);
                if lo <= hi {
                    Extent::Range { lo, hi }
                } else {
                    Extent::Unset
                }
            }
            _ => Extent::Unset,
        }
    }
}

impl std::fmt::Display for Extent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Extent::Unset => write!(f, "[unset]"),
            Extent::Range { lo, hi } => write!(f, "[{lo}, {hi}]"),
        }
    }
}
