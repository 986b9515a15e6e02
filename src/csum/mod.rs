//! Checksum buffer descriptors
//!
//! A `CsumBuf` holds the ordered, fixed-length digests of the chunks covering
//! one extent. Digests are opaque here: they are computed by the caller (see
//! `algo`) and only counted, sliced and moved by the store.
//!
//! Wire layout (little endian):
//! `type: u8 | digest_len: u16 | chunk_size: u32 | chunk_count: u32 | digests`
pub mod algo;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use log::warn;

use crate::error::{Error, Result};

/// Size of the fixed header preceding the digests on the wire.
pub const CSUM_HEADER_LEN: usize = 1 + 2 + 4 + 4;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CsumBuf {
    /// Algorithm tag, opaque to the store.
    pub csum_type: u8,
    pub digest_len: u16,
    pub chunk_size: u32,
    pub chunk_count: u32,
    buf: Bytes,
}

impl CsumBuf {
    pub fn new(
        csum_type: u8,
        digest_len: u16,
        chunk_size: u32,
        chunk_count: u32,
        buf: impl Into<Bytes>,
    ) -> Result<Self> {
        let dcb = Self {
            csum_type,
            digest_len,
            chunk_size,
            chunk_count,
            buf: buf.into(),
        };
        dcb.validate()?;
        Ok(dcb)
    }

    /// Descriptor without digests, used for extents stored unchecksummed.
    pub fn empty(chunk_size: u32) -> Self {
        Self {
            chunk_size,
            ..Default::default()
        }
    }

    /// Checks `buf_len == chunk_count * digest_len`.
    pub fn validate(&self) -> Result<()> {
        let expected = self.chunk_count as u64 * self.digest_len as u64;
        if self.buf.len() as u64 != expected {
            warn!(
                "checksum buffer holds {} bytes, {} chunks of {} bytes declared",
                self.buf.len(),
                self.chunk_count,
                self.digest_len
            );
            return Err(Error::MalformedDescriptor(format!(
                "buffer length {} != {} chunks x {} bytes",
                self.buf.len(),
                self.chunk_count,
                self.digest_len
            )));
        }
        Ok(())
    }

    pub fn buf_len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunk_count == 0
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Digest of chunk `idx`.
    pub fn idx_to_csum(&self, idx: u32) -> Option<&[u8]> {
        if idx >= self.chunk_count {
            return None;
        }
        let len = self.digest_len as usize;
        let start = idx as usize * len;
        Some(&self.buf[start..start + len])
    }

    pub fn iter(&self) -> impl Iterator<Item = &[u8]> + '_ {
        (0..self.chunk_count).filter_map(move |i| self.idx_to_csum(i))
    }

    /// `count` chunks starting at chunk `first`. Shares the digest storage.
    pub fn slice(&self, first: u32, count: u32) -> Result<Self> {
        let end = first
            .checked_add(count)
            .filter(|end| *end <= self.chunk_count)
            .ok_or_else(|| {
                Error::MalformedDescriptor(format!(
                    "chunks [{first}, +{count}) outside descriptor of {} chunks",
                    self.chunk_count
                ))
            })?;
        let len = self.digest_len as usize;
        Ok(Self {
            csum_type: self.csum_type,
            digest_len: self.digest_len,
            chunk_size: self.chunk_size,
            chunk_count: end - first,
            buf: self.buf.slice(first as usize * len..end as usize * len),
        })
    }

    pub fn encoded_len(&self) -> usize {
        CSUM_HEADER_LEN + self.buf.len()
    }

    pub fn encode(&self, out: &mut BytesMut) {
        out.reserve(self.encoded_len());
        out.put_u8(self.csum_type);
        out.put_u16_le(self.digest_len);
        out.put_u32_le(self.chunk_size);
        out.put_u32_le(self.chunk_count);
        out.put_slice(&self.buf);
    }

    pub fn to_bytes(&self) -> Bytes {
        let mut out = BytesMut::with_capacity(self.encoded_len());
        self.encode(&mut out);
        out.freeze()
    }

    /// Reads one descriptor from the front of `src`.
    pub fn decode(src: &mut Bytes) -> Result<Self> {
        if src.remaining() < CSUM_HEADER_LEN {
            return Err(Error::MalformedDescriptor(format!(
                "truncated header: {} bytes",
                src.remaining()
            )));
        }
        let csum_type = src.get_u8();
        let digest_len = src.get_u16_le();
        let chunk_size = src.get_u32_le();
        let chunk_count = src.get_u32_le();
        let declared = chunk_count as u64 * digest_len as u64;
        if (src.remaining() as u64) < declared {
            return Err(Error::MalformedDescriptor(format!(
                "declared {declared} digest bytes, {} available",
                src.remaining()
            )));
        }
        let buf = src.split_to(declared as usize);
        Self::new(csum_type, digest_len, chunk_size, chunk_count, buf)
    }

    /// Decodes a buffer holding exactly one descriptor.
    pub fn from_slice(data: &[u8]) -> Result<Self> {
        let mut src = Bytes::copy_from_slice(data);
        let dcb = Self::decode(&mut src)?;
        if src.has_remaining() {
            return Err(Error::MalformedDescriptor(format!(
                "{} trailing bytes after descriptor",
                src.remaining()
            )));
        }
        Ok(dcb)
    }
}

/// Walks the digests of a sequence of descriptors in order.
pub struct CsumIter<'a> {
    dcbs: &'a [CsumBuf],
    dcb_idx: usize,
    csum_idx: u32,
}

impl<'a> CsumIter<'a> {
    pub fn new(dcbs: &'a [CsumBuf]) -> Self {
        Self {
            dcbs,
            dcb_idx: 0,
            csum_idx: 0,
        }
    }
}

impl<'a> Iterator for CsumIter<'a> {
    type Item = &'a [u8];

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let dcb = self.dcbs.get(self.dcb_idx)?;
            if let Some(csum) = dcb.idx_to_csum(self.csum_idx) {
                self.csum_idx += 1;
                return Some(csum);
            }
            self.dcb_idx += 1;
            self.csum_idx = 0;
        }
    }
}
