//! Chunk arithmetic: how many checksum chunks cover an extent.
//!
//! Chunks are fixed byte windows aligned to absolute byte offset 0, so an
//! extent `[lo, hi]` of `inob`-byte records covers the bytes
//! `[lo * inob, (hi + 1) * inob)` and intersects every chunk between the one
//! holding its first byte and the one holding its last.

use super::Extent;

/// Record size, checksum chunk size and digest length of one extent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CsumLayout {
    /// Bytes per record.
    pub inob: u32,
    /// Bytes per checksum chunk.
    pub chunk_size: u32,
    /// Bytes per digest.
    pub digest_len: u16,
}

impl CsumLayout {
    pub fn new(inob: u32, chunk_size: u32, digest_len: u16) -> Self {
        Self {
            inob,
            chunk_size,
            digest_len,
        }
    }

    /// Zero record or chunk size means the extent carries no chunks.
    pub fn has_chunks(&self) -> bool {
        self.inob != 0 && self.chunk_size != 0
    }

    /// Chunk boundaries fall on record boundaries or the reverse, so
    /// widening a selection to whole chunks never splits a record.
    pub fn chunks_tile_records(&self) -> bool {
        !self.has_chunks()
            || self.chunk_size % self.inob == 0
            || self.inob % self.chunk_size == 0
    }

    /// First and last byte offsets of `ext`.
    pub fn byte_range(&self, ext: &Extent) -> Option<(u128, u128)> {
        let (lo, hi) = ext.bounds()?;
        if self.inob == 0 {
            return None;
        }
        let inob = self.inob as u128;
        Some((lo as u128 * inob, (hi as u128 + 1) * inob - 1))
    }

    /// Absolute indices of the first and last chunk touched by `ext`.
    pub fn chunk_range(&self, ext: &Extent) -> Option<(u64, u64)> {
        if !self.has_chunks() {
            return None;
        }
        let (first, last) = self.byte_range(ext)?;
        let cs = self.chunk_size as u128;
        Some((clamp_u64(first / cs), clamp_u64(last / cs)))
    }

    pub fn csum_count(&self, ext: &Extent) -> u64 {
        match self.chunk_range(ext) {
            Some((first, last)) => last - first + 1,
            None => 0,
        }
    }

    pub fn csum_buf_len(&self, ext: &Extent) -> u64 {
        self.csum_count(ext) * self.digest_len as u64
    }

    /// Byte window `[start, end)` of absolute chunk `idx`.
    pub fn chunk_bytes(&self, idx: u64) -> (u128, u128) {
        let cs = self.chunk_size as u128;
        let start = idx as u128 * cs;
        (start, start + cs)
    }
}

/// Number of `chunk_size`-byte chunks intersecting `ext` with `inob`-byte records.
pub fn csum_count(ext: &Extent, chunk_size: u32, inob: u32) -> u64 {
    CsumLayout::new(inob, chunk_size, 0).csum_count(ext)
}

/// Byte length of the digest buffer for `ext`.
pub fn csum_buf_len(ext: &Extent, chunk_size: u32, inob: u32, digest_len: u16) -> u64 {
    CsumLayout::new(inob, chunk_size, digest_len).csum_buf_len(ext)
}

fn clamp_u64(v: u128) -> u64 {
    u64::try_from(v).unwrap_or(u64::MAX)
}
