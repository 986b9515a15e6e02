//! Versioned object store: update and fetch entry points
//!
//! Responsibilities:
//! - Validate update descriptors and commit each extent, its bytes and its
//!   digests under the key at the update epoch, all or nothing.
//! - Resolve fetches against a consistent snapshot of the key's extents and
//!   hand the result to the reconciler.
//!
//! Submodules:
//! - `iod`: I/O descriptors
//! - `fetch`: reconciler and fetch handle
//! - `fault`: fault injection points
pub mod fault;
pub mod fetch;
pub mod iod;

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use bytes::Bytes;
use log::{debug, warn};

use crate::csum::CsumBuf;
use crate::error::{Error, Result};
use crate::extent::Extent;
use crate::extent::index::{ExtentIndex, Visible};
use fault::FaultPoint;
#[cfg(any(test, feature = "fault-injection"))]
use fault::FaultInjector;
use fetch::FetchHandle;
use iod::Iod;

#[cfg(any(test, feature = "fault-injection"))]
type Faults<'a> = Option<&'a FaultInjector>;
#[cfg(not(any(test, feature = "fault-injection")))]
type Faults<'a> = std::marker::PhantomData<&'a ()>;

#[cfg(any(test, feature = "fault-injection"))]
fn check_fault(faults: Faults<'_>, point: FaultPoint) -> Result<()> {
    if faults.is_some_and(|f| f.is_set(point)) {
        warn!("injected failure at {point}");
        return Err(Error::InjectedFailure(point));
    }
    Ok(())
}

#[cfg(not(any(test, feature = "fault-injection")))]
#[inline(always)]
fn check_fault(_faults: Faults<'_>, _point: FaultPoint) -> Result<()> {
    Ok(())
}

/// Keys mapped to their extent indexes.
#[derive(Debug, Default)]
pub struct VersionedStore {
    keys: RwLock<HashMap<String, ExtentIndex>>,
}

impl VersionedStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores every extent of `iod` at `epoch`. `data` holds the records of
    /// all extents back to back, in descriptor order.
    pub fn update(&self, epoch: u64, iod: &Iod, data: Bytes) -> Result<()> {
        self.update_inner(epoch, iod, data, Faults::default())
    }

    #[cfg(any(test, feature = "fault-injection"))]
    pub fn update_with_faults(
        &self,
        epoch: u64,
        iod: &Iod,
        data: Bytes,
        faults: &FaultInjector,
    ) -> Result<()> {
        self.update_inner(epoch, iod, data, Some(faults))
    }

    /// Starts a fetch of `iod` as of `epoch`.
    ///
    /// Extents with nothing stored yield no vectors rather than an error.
    pub fn fetch_begin(&self, epoch: u64, iod: &Iod) -> Result<FetchHandle> {
        self.fetch_inner(epoch, iod, false, Faults::default())
    }

    /// Like `fetch_begin`, but an extent with nothing stored is an
    /// `ExtentOutOfBounds` error.
    pub fn fetch_strict(&self, epoch: u64, iod: &Iod) -> Result<FetchHandle> {
        self.fetch_inner(epoch, iod, true, Faults::default())
    }

    #[cfg(any(test, feature = "fault-injection"))]
    pub fn fetch_begin_with_faults(
        &self,
        epoch: u64,
        iod: &Iod,
        faults: &FaultInjector,
    ) -> Result<FetchHandle> {
        self.fetch_inner(epoch, iod, false, Some(faults))
    }

    /// Number of extents stored under `name`, across all epochs.
    pub fn extent_count(&self, name: &str) -> usize {
        let keys = self.keys.read().unwrap_or_else(PoisonError::into_inner);
        keys.get(name).map_or(0, ExtentIndex::len)
    }

    fn update_inner(&self, epoch: u64, iod: &Iod, data: Bytes, faults: Faults<'_>) -> Result<()> {
        let exts = iod.validate_update().inspect_err(|e| {
            warn!("rejecting update of `{}` at epoch {epoch}: {e}", iod.name);
        })?;
        let expected = iod.data_len()?;
        if data.len() != expected {
            return Err(Error::InvalidIod(format!(
                "`{}`: {} payload bytes for {expected} expected",
                iod.name,
                data.len()
            )));
        }
        check_fault(faults, FaultPoint::CsumUpdateFail)?;

        let mut staged: Vec<(Extent, CsumBuf, Bytes)> = Vec::new();
        staged
            .try_reserve_exact(exts.len())
            .map_err(|e| Error::AllocationFailure(format!("update staging: {e}")))?;
        let mut offset = 0usize;
        for (i, (ext, recx)) in exts.into_iter().zip(&iod.recxs).enumerate() {
            let len = iod.recx_len(recx).ok_or_else(|| {
                Error::InvalidIod(format!("`{}`: recx {}+{} too large", iod.name, recx.idx, recx.nr))
            })?;
            let csum = iod
                .csums
                .get(i)
                .cloned()
                .unwrap_or_else(|| CsumBuf::empty(0));
            staged.push((ext, csum, data.slice(offset..offset + len)));
            offset += len;
        }

        let mut keys = self.keys.write().unwrap_or_else(PoisonError::into_inner);
        let index = keys
            .entry(iod.name.clone())
            .or_insert_with(|| ExtentIndex::new(iod.size));
        if index.inob() != iod.size {
            return Err(Error::InvalidIod(format!(
                "`{}` holds {}-byte records, update uses {}",
                iod.name,
                index.inob(),
                iod.size
            )));
        }
        let count = staged.len();
        for (ext, csum, bytes) in staged {
            index.insert(ext, epoch, csum, bytes);
        }
        debug!("update `{}` at epoch {epoch}: {count} extents", iod.name);
        Ok(())
    }

    fn fetch_inner(
        &self,
        epoch: u64,
        iod: &Iod,
        strict: bool,
        faults: Faults<'_>,
    ) -> Result<FetchHandle> {
        let exts = iod.validate_fetch()?;

        // Snapshot the visible fragments; the lock is not held while reconciling.
        let resolved: Vec<(Extent, Vec<Visible>)> = {
            let keys = self.keys.read().unwrap_or_else(PoisonError::into_inner);
            match keys.get(&iod.name) {
                Some(index) if index.inob() != iod.size => {
                    return Err(Error::InvalidIod(format!(
                        "`{}` holds {}-byte records, fetch uses {}",
                        iod.name,
                        index.inob(),
                        iod.size
                    )));
                }
                Some(index) => exts
                    .iter()
                    .map(|ext| (*ext, index.resolve(ext, epoch)))
                    .collect(),
                None => exts.iter().map(|ext| (*ext, Vec::new())).collect(),
            }
        };
        if strict {
            if let Some((ext, _)) = resolved.iter().find(|(_, vis)| vis.is_empty()) {
                let (lo, hi) = ext.to_raw();
                return Err(Error::ExtentOutOfBounds { lo, hi });
            }
        }
        check_fault(faults, FaultPoint::CsumFetchFail)?;

        let mut handle = FetchHandle::new(epoch, iod.size);
        for (ext, visible) in &resolved {
            handle.reconcile(ext, visible)?;
        }
        debug!(
            "fetch `{}` at epoch {epoch}: {} vectors, {} checksum sets",
            iod.name,
            handle.biovs().len(),
            handle.csums().len()
        );
        Ok(handle)
    }
}
