//! Digest algorithms for callers of the store.
//!
//! The store never computes digests itself. Writers use `compute_csums` to
//! build the descriptor they pass to update, readers use `verify_fetch` to
//! replay a fetch result against freshly computed digests.

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::CsumBuf;
use crate::error::{Error, Result};
use crate::extent::Extent;
use crate::extent::layout::CsumLayout;
use crate::store::fetch::FetchHandle;

pub trait ChecksumAlgorithm {
    /// Tag stored in `CsumBuf::csum_type`.
    fn csum_type(&self) -> u8;
    fn digest_len(&self) -> u16;
    fn digest(&self, data: &[u8]) -> Vec<u8>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CsumKind {
    #[default]
    Sha256,
    Md5,
}

impl CsumKind {
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            1 => Some(CsumKind::Sha256),
            2 => Some(CsumKind::Md5),
            _ => None,
        }
    }
}

impl std::str::FromStr for CsumKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "sha256" => Ok(CsumKind::Sha256),
            "md5" => Ok(CsumKind::Md5),
            other => Err(Error::Config(format!("unknown checksum algorithm `{other}`"))),
        }
    }
}

impl ChecksumAlgorithm for CsumKind {
    fn csum_type(&self) -> u8 {
        match self {
            CsumKind::Sha256 => 1,
            CsumKind::Md5 => 2,
        }
    }

    fn digest_len(&self) -> u16 {
        match self {
            CsumKind::Sha256 => 32,
            CsumKind::Md5 => 16,
        }
    }

    fn digest(&self, data: &[u8]) -> Vec<u8> {
        match self {
            CsumKind::Sha256 => Sha256::digest(data).to_vec(),
            CsumKind::Md5 => md5::compute(data).0.to_vec(),
        }
    }
}

/// Digests `data`, the bytes of `ext`, one chunk at a time.
///
/// Chunk windows are absolute, so the first and last digest only cover the
/// part of their chunk that lies inside `ext`.
pub fn compute_csums(
    alg: &dyn ChecksumAlgorithm,
    ext: &Extent,
    inob: u32,
    chunk_size: u32,
    data: &[u8],
) -> Result<CsumBuf> {
    let layout = CsumLayout::new(inob, chunk_size, alg.digest_len());
    let expected = ext.width() as u128 * inob as u128;
    if data.len() as u128 != expected {
        return Err(Error::InvalidIod(format!(
            "extent {ext} needs {expected} bytes, got {}",
            data.len()
        )));
    }
    let (Some((first, last)), Some((start, _))) = (layout.chunk_range(ext), layout.byte_range(ext))
    else {
        return Ok(CsumBuf::empty(chunk_size));
    };
    let count = last - first + 1;
    let buf_len = layout.csum_buf_len(ext);
    let mut buf = Vec::new();
    buf.try_reserve_exact(buf_len as usize)
        .map_err(|e| Error::AllocationFailure(format!("{buf_len} byte checksum buffer: {e}")))?;
    for idx in first..=last {
        let (cstart, cend) = layout.chunk_bytes(idx);
        let from = (cstart.max(start) - start) as usize;
        let to = ((cend - start) as usize).min(data.len());
        buf.extend(alg.digest(&data[from..to]));
    }
    let chunk_count = u32::try_from(count)
        .map_err(|_| Error::MalformedDescriptor(format!("{count} chunks exceed u32")))?;
    CsumBuf::new(alg.csum_type(), alg.digest_len(), chunk_size, chunk_count, buf)
}

/// Re-digests every non-hole vector of a fetch and compares with the stored
/// digests paired with it.
pub fn verify_fetch(handle: &FetchHandle, alg: &dyn ChecksumAlgorithm) -> Result<()> {
    let data_biovs = handle.biovs().iter().filter(|b| !b.is_hole);
    for (biov, stored) in data_biovs.zip(handle.csums()) {
        if stored.is_empty() {
            continue;
        }
        if stored.csum_type != alg.csum_type() {
            return Err(Error::MalformedDescriptor(format!(
                "stored checksum type {} cannot be verified with type {}",
                stored.csum_type,
                alg.csum_type()
            )));
        }
        let fresh = compute_csums(alg, &biov.ext, handle.inob(), stored.chunk_size, biov.data())?;
        if fresh.as_bytes() != stored.as_bytes() {
            let (lo, hi) = biov.ext.to_raw();
            warn!("checksum mismatch in {}", biov.ext);
            return Err(Error::CsumMismatch { lo, hi });
        }
    }
    debug!("verified {} checksummed vectors", handle.csums().len());
    Ok(())
}
