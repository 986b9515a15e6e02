//! I/O descriptors for update and fetch.

use crate::csum::CsumBuf;
use crate::error::{Error, Result};
use crate::extent::Extent;
use crate::extent::layout::CsumLayout;

/// `nr` records starting at record `idx`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Recx {
    pub idx: u64,
    pub nr: u64,
}

impl Recx {
    pub fn new(idx: u64, nr: u64) -> Self {
        Self { idx, nr }
    }

    pub fn extent(&self) -> Option<Extent> {
        Extent::from_recx(self.idx, self.nr)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IodType {
    Single,
    #[default]
    Array,
}

#[derive(Debug, Clone, Default)]
pub struct Iod {
    pub name: String,
    /// Record size in bytes.
    pub size: u32,
    pub kind: IodType,
    pub recxs: Vec<Recx>,
    /// One per recx on update, or none for unchecksummed writes.
    pub csums: Vec<CsumBuf>,
}

impl Iod {
    pub fn array(name: impl Into<String>, size: u32) -> Self {
        Self {
            name: name.into(),
            size,
            kind: IodType::Array,
            ..Default::default()
        }
    }

    pub fn with_recx(mut self, idx: u64, nr: u64) -> Self {
        self.recxs.push(Recx::new(idx, nr));
        self
    }

    pub fn with_csum(mut self, csum: CsumBuf) -> Self {
        self.csums.push(csum);
        self
    }

    pub fn nr(&self) -> usize {
        self.recxs.len()
    }

    /// Bytes covered by one recx, `None` if it does not fit in memory.
    pub fn recx_len(&self, recx: &Recx) -> Option<usize> {
        let len = recx.nr.checked_mul(self.size as u64)?;
        usize::try_from(len).ok()
    }

    /// Payload bytes an update must carry.
    pub fn data_len(&self) -> Result<usize> {
        self.recxs.iter().try_fold(0usize, |total, r| {
            self.recx_len(r)
                .and_then(|len| total.checked_add(len))
                .ok_or_else(|| {
                    Error::InvalidIod(format!(
                        "`{}`: {} records of {} bytes overflow",
                        self.name, r.nr, self.size
                    ))
                })
        })
    }

    fn extents(&self) -> Result<Vec<Extent>> {
        if self.kind != IodType::Array {
            return Err(Error::InvalidIod(format!(
                "`{}`: only array values are supported",
                self.name
            )));
        }
        if self.size == 0 {
            return Err(Error::InvalidIod(format!("`{}`: zero record size", self.name)));
        }
        if self.recxs.is_empty() {
            return Err(Error::InvalidIod(format!("`{}`: no extents", self.name)));
        }
        self.data_len()?;
        self.recxs
            .iter()
            .map(|r| {
                r.extent().ok_or_else(|| {
                    Error::InvalidIod(format!("`{}`: invalid recx {}+{}", self.name, r.idx, r.nr))
                })
            })
            .collect()
    }

    /// Extents of an update, after checking every descriptor covers its extent.
    pub fn validate_update(&self) -> Result<Vec<Extent>> {
        let exts = self.extents()?;
        if !self.csums.is_empty() && self.csums.len() != exts.len() {
            return Err(Error::InvalidIod(format!(
                "`{}`: {} checksum descriptors for {} extents",
                self.name,
                self.csums.len(),
                exts.len()
            )));
        }
        for (ext, csum) in exts.iter().zip(&self.csums) {
            csum.validate()?;
            let layout = CsumLayout::new(self.size, csum.chunk_size, csum.digest_len);
            if !layout.chunks_tile_records() {
                return Err(Error::MalformedDescriptor(format!(
                    "`{}`: chunks of {} bytes do not tile records of {} bytes",
                    self.name, csum.chunk_size, self.size
                )));
            }
            let expected = layout.csum_count(ext);
            if csum.chunk_count as u64 != expected {
                return Err(Error::MalformedDescriptor(format!(
                    "extent {ext} spans {expected} chunks of {} bytes, descriptor has {}",
                    csum.chunk_size, csum.chunk_count
                )));
            }
        }
        Ok(exts)
    }

    /// Extents of a fetch; they must be strictly increasing and disjoint.
    pub fn validate_fetch(&self) -> Result<Vec<Extent>> {
        let exts = self.extents()?;
        for pair in exts.windows(2) {
            let (_, prev_hi) = pair[0].to_raw();
            let (next_lo, _) = pair[1].to_raw();
            if next_lo <= prev_hi {
                return Err(Error::InvalidIod(format!(
                    "`{}`: fetch extents {} and {} are not increasing",
                    self.name, pair[0], pair[1]
                )));
            }
        }
        Ok(exts)
    }
}
