//! Tree entries and checksum-chunk alignment.

use super::Extent;
use super::layout::CsumLayout;
use crate::csum::CsumBuf;

/// One stored extent as seen by a reader: the physical extent written at
/// `epoch`, the part of it selected by the current query, and the digests
/// computed over the whole physical extent at write time.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EvtEntry {
    pub ext: Extent,
    pub sel: Extent,
    pub epoch: u64,
    pub csum: CsumBuf,
}

impl EvtEntry {
    pub fn new(ext: Extent, sel: Extent) -> Self {
        Self {
            ext,
            sel,
            ..Default::default()
        }
    }

    pub fn with_csum(mut self, csum: CsumBuf) -> Self {
        self.csum = csum;
        self
    }

    pub fn with_chunk_size(mut self, chunk_size: u32) -> Self {
        self.csum.chunk_size = chunk_size;
        self
    }

    pub fn layout(&self, inob: u32) -> CsumLayout {
        CsumLayout::new(inob, self.csum.chunk_size, self.csum.digest_len)
    }

    /// Smallest chunk-aligned extent containing `sel`, clipped to `ext`.
    ///
    /// Entries without chunks return `sel` untouched and an unset selection
    /// stays unset.
    pub fn align_to_csum_chunk(&self, inob: u32) -> Extent {
        let layout = self.layout(inob);
        let Some((first, last)) = layout.chunk_range(&self.sel) else {
            return self.sel;
        };
        let inob = inob as u128;
        let (lo_byte, _) = layout.chunk_bytes(first);
        let (_, hi_end) = layout.chunk_bytes(last);
        let mut lo = clamp_u64(lo_byte / inob);
        let mut hi = clamp_u64((hi_end - 1) / inob);
        if let Some((ext_lo, ext_hi)) = self.ext.bounds() {
            lo = lo.max(ext_lo);
            hi = hi.min(ext_hi);
        }
        if lo > hi {
            // selection outside the stored extent
            return Extent::Unset;
        }
        Extent::new(lo, hi)
    }
}

fn clamp_u64(v: u128) -> u64 {
    u64::try_from(v).unwrap_or(u64::MAX - 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Args {
        rb: u32,
        chunk_size: u32,
        sel: (u64, u64),
        ext: (u64, u64),
    }

    #[track_caller]
    fn aligned(expected_lo: u64, expected_hi: u64, args: Args) {
        let sel = Extent::from_raw(args.sel.0, args.sel.1).unwrap();
        let ext = Extent::from_raw(args.ext.0, args.ext.1).unwrap();
        let entry = EvtEntry::new(ext, sel).with_chunk_size(args.chunk_size);
        let result = entry.align_to_csum_chunk(args.rb);
        assert_eq!((expected_lo, expected_hi), result.to_raw());
    }

    #[test]
    fn test_lower_bound_alignment() {
        aligned(0, 1, Args { chunk_size: 2, rb: 1, sel: (1, 1), ext: (0, 1) });
        aligned(2, 5, Args { chunk_size: 2, rb: 1, sel: (3, 5), ext: (0, 5) });
        aligned(0, 7, Args { chunk_size: 4, rb: 1, sel: (3, 7), ext: (0, 7) });
    }

    #[test]
    fn test_upper_bound_alignment() {
        aligned(0, 1, Args { chunk_size: 2, rb: 1, sel: (0, 1), ext: (0, 1) });
        aligned(0, 3, Args { chunk_size: 2, rb: 1, sel: (0, 2), ext: (0, 4) });
        aligned(0, 7, Args { chunk_size: 4, rb: 1, sel: (0, 5), ext: (0, 10) });
    }

    #[test]
    fn test_bounded_by_stored_extent() {
        aligned(1, 10, Args { chunk_size: 4, rb: 1, sel: (2, 9), ext: (1, 10) });
    }

    #[test]
    fn test_record_and_chunk_sizes_differ() {
        aligned(0, 7, Args { chunk_size: 16, rb: 4, sel: (0, 5), ext: (0, 10) });
        aligned(4, 7, Args { chunk_size: 16, rb: 4, sel: (5, 5), ext: (0, 10) });
        aligned(
            500,
            1024 * 128 - 1,
            Args { chunk_size: 1024 * 32, rb: 1, sel: (1000, 1024 * 100), ext: (500, 1024 * 1000) },
        );
    }

    #[test]
    fn test_unset_selection_stays_unset() {
        aligned(
            u64::MAX,
            u64::MAX,
            Args { chunk_size: 1024 * 32, rb: 5, sel: (u64::MAX, u64::MAX), ext: (u64::MAX, u64::MAX) },
        );
    }

    #[test]
    fn test_selection_outside_stored_extent() {
        let entry = EvtEntry::new(Extent::new(0, 3), Extent::new(10, 12)).with_chunk_size(4);
        assert_eq!(entry.align_to_csum_chunk(1), Extent::Unset);
    }

    #[test]
    fn test_no_chunks_keeps_selection() {
        let entry = EvtEntry::new(Extent::new(0, 100), Extent::new(7, 9));
        assert_eq!(entry.align_to_csum_chunk(4), Extent::new(7, 9));
    }

    #[test]
    fn test_alignment_is_idempotent_and_bounded() {
        let ext = Extent::new(3, 61);
        for (rb, chunk_size) in [(1u32, 4u32), (2, 8), (4, 16), (1, 32)] {
            for lo in 3..=61u64 {
                for hi in lo..=61u64 {
                    let entry = EvtEntry::new(ext, Extent::new(lo, hi)).with_chunk_size(chunk_size);
                    let once = entry.align_to_csum_chunk(rb);
                    assert!(ext.contains(&once), "{once} escapes {ext}");
                    assert!(once.contains(&entry.sel));
                    let again = EvtEntry::new(ext, once)
                        .with_chunk_size(chunk_size)
                        .align_to_csum_chunk(rb);
                    assert_eq!(once, again);
                }
            }
        }
    }
}
