//! Fetch reconciliation: turns the visible fragments of a logical range into
//! ordered I/O vectors, each paired with the stored digests of its chunks.

use bytes::Bytes;
use log::{debug, trace};

use crate::csum::CsumBuf;
use crate::error::{Error, Result};
use crate::extent::Extent;
use crate::extent::index::Visible;

/// One contiguous segment of a fetch result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Biov {
    /// Chunk-aligned records backing this vector, or the hole's records.
    pub ext: Extent,
    /// Leading bytes of `data` outside the requested range.
    pub prefix_len: u64,
    /// Trailing bytes of `data` outside the requested range.
    pub suffix_len: u64,
    pub is_hole: bool,
    data: Bytes,
}

impl Biov {
    fn hole(ext: Extent) -> Self {
        Self {
            ext,
            prefix_len: 0,
            suffix_len: 0,
            is_hole: true,
            data: Bytes::new(),
        }
    }

    /// Stored bytes of the aligned range, empty for holes.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// The requested bytes: `data` without prefix and suffix.
    pub fn payload(&self) -> &[u8] {
        if self.is_hole {
            return &[];
        }
        let end = self.data.len() - self.suffix_len as usize;
        &self.data[self.prefix_len as usize..end]
    }
}

/// Result of a fetch. Owns every vector and digest it hands out; `end`
/// (or dropping the handle) releases them.
#[derive(Debug)]
pub struct FetchHandle {
    epoch: u64,
    inob: u32,
    biovs: Vec<Biov>,
    csums: Vec<CsumBuf>,
}

impl FetchHandle {
    pub(crate) fn new(epoch: u64, inob: u32) -> Self {
        Self {
            epoch,
            inob,
            biovs: Vec::new(),
            csums: Vec::new(),
        }
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn inob(&self) -> u32 {
        self.inob
    }

    pub fn biovs(&self) -> &[Biov] {
        &self.biovs
    }

    /// One descriptor per non-hole vector, in the same order.
    pub fn csums(&self) -> &[CsumBuf] {
        &self.csums
    }

    pub fn holes(&self) -> usize {
        self.biovs.iter().filter(|b| b.is_hole).count()
    }

    pub fn is_empty(&self) -> bool {
        self.biovs.is_empty()
    }

    /// Requested bytes in order, holes zero filled.
    pub fn read_payload(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for biov in &self.biovs {
            if biov.is_hole {
                let len = biov.ext.width() * self.inob as u64;
                out.resize(out.len() + len as usize, 0);
            } else {
                out.extend_from_slice(biov.payload());
            }
        }
        out
    }

    /// Releases the handle, passing the caller's status through.
    pub fn end(self, rc: Result<()>) -> Result<()> {
        debug!(
            "fetch at epoch {} ended with {} vectors ({} holes)",
            self.epoch,
            self.biovs.len(),
            self.holes()
        );
        rc
    }

    /// Appends the vectors for one requested extent.
    ///
    /// `visible` are the fragments resolved for `query`, ordered by offset.
    /// Gaps between and around them become holes; a query with no fragment
    /// contributes nothing.
    pub(crate) fn reconcile(&mut self, query: &Extent, visible: &[Visible]) -> Result<()> {
        let Some((qlo, qhi)) = query.bounds() else {
            return Ok(());
        };
        if visible.is_empty() {
            trace!("{query}: nothing stored");
            return Ok(());
        }
        self.biovs
            .try_reserve(visible.len() * 2 + 1)
            .and_then(|_| self.csums.try_reserve(visible.len()))
            .map_err(|e| Error::AllocationFailure(format!("fetch vectors: {e}")))?;

        let inob = self.inob;
        let mut cursor = qlo;
        for frag in visible {
            let (sel_lo, sel_hi) = frag.sel.to_raw();
            if cursor < sel_lo {
                self.push_hole(Extent::new(cursor, sel_lo - 1));
            }
            let entry = frag.entry();
            let aligned = entry.align_to_csum_chunk(inob);
            let (alo, ahi) = aligned.to_raw();
            let (ext_lo, _) = entry.ext.to_raw();

            let start = ((alo - ext_lo) * inob as u64) as usize;
            let end = ((ahi - ext_lo + 1) * inob as u64) as usize;
            let biov = Biov {
                ext: aligned,
                prefix_len: (sel_lo - alo) * inob as u64,
                suffix_len: (ahi - sel_hi) * inob as u64,
                is_hole: false,
                data: frag.stored.data.slice(start..end),
            };
            let csum = Self::chunk_csums(&entry.layout(inob), &entry.csum, &entry.ext, &aligned)?;
            trace!(
                "{query}: biov {aligned} prefix {} suffix {} with {} chunks",
                biov.prefix_len,
                biov.suffix_len,
                csum.chunk_count
            );
            self.biovs.push(biov);
            self.csums.push(csum);
            cursor = sel_hi + 1;
        }
        if cursor <= qhi {
            self.push_hole(Extent::new(cursor, qhi));
        }
        Ok(())
    }

    fn push_hole(&mut self, ext: Extent) {
        trace!("hole {ext}");
        self.biovs.push(Biov::hole(ext));
    }

    /// Stored digests of the chunks covering `aligned`.
    fn chunk_csums(
        layout: &crate::extent::layout::CsumLayout,
        stored: &CsumBuf,
        ext: &Extent,
        aligned: &Extent,
    ) -> Result<CsumBuf> {
        if stored.is_empty() {
            return Ok(CsumBuf::empty(stored.chunk_size));
        }
        let (Some((ext_first, _)), Some((first, last))) =
            (layout.chunk_range(ext), layout.chunk_range(aligned))
        else {
            return Ok(CsumBuf::empty(stored.chunk_size));
        };
        let skip = u32::try_from(first - ext_first)
            .map_err(|_| Error::MalformedDescriptor(format!("chunk offset of {aligned}")))?;
        let count = u32::try_from(last - first + 1)
            .map_err(|_| Error::MalformedDescriptor(format!("chunk count of {aligned}")))?;
        stored.slice(skip, count)
    }
}

impl Drop for FetchHandle {
    fn drop(&mut self) {
        trace!("fetch handle at epoch {} released", self.epoch);
    }
}
