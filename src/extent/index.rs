//! In-memory versioned extent index.
//!
//! Keeps every extent written under one key together with its epoch and
//! resolves, for a logical range and a query epoch, which parts of which
//! stored extents are visible. Newer writes shadow older ones; nothing is
//! ever rewritten in place.

use std::collections::BTreeMap;
use std::sync::Arc;

use bytes::Bytes;
use log::trace;

use super::Extent;
use super::entry::EvtEntry;
use crate::csum::CsumBuf;

/// One committed write.
#[derive(Debug, Clone)]
pub struct StoredExtent {
    pub ext: Extent,
    pub epoch: u64,
    /// Insertion order, breaks ties between writes at the same epoch.
    pub seq: u64,
    pub csum: CsumBuf,
    /// `ext.width() * inob` bytes.
    pub data: Bytes,
}

/// A visible fragment of a stored extent.
#[derive(Debug, Clone)]
pub struct Visible {
    pub stored: Arc<StoredExtent>,
    pub sel: Extent,
}

impl Visible {
    pub fn entry(&self) -> EvtEntry {
        EvtEntry {
            ext: self.stored.ext,
            sel: self.sel,
            epoch: self.stored.epoch,
            csum: self.stored.csum.clone(),
        }
    }
}

#[derive(Debug, Default)]
pub struct ExtentIndex {
    inob: u32,
    next_seq: u64,
    entries: BTreeMap<(u64, u64), Arc<StoredExtent>>,
}

impl ExtentIndex {
    pub fn new(inob: u32) -> Self {
        Self {
            inob,
            ..Default::default()
        }
    }

    /// Record size every extent of this key is stored with.
    pub fn inob(&self) -> u32 {
        self.inob
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn insert(&mut self, ext: Extent, epoch: u64, csum: CsumBuf, data: Bytes) {
        let Some((lo, _)) = ext.bounds() else {
            return;
        };
        let seq = self.next_seq;
        self.next_seq += 1;
        let stored = StoredExtent {
            ext,
            epoch,
            seq,
            csum,
            data,
        };
        self.entries.insert((lo, seq), Arc::new(stored));
    }

    /// Visible fragments of `query` at `epoch`, ordered by offset.
    pub fn resolve(&self, query: &Extent, epoch: u64) -> Vec<Visible> {
        let Some((_, qhi)) = query.bounds() else {
            return Vec::new();
        };
        let mut candidates: Vec<&Arc<StoredExtent>> = self
            .entries
            .range(..=(qhi, u64::MAX))
            .map(|(_, e)| e)
            .filter(|e| e.epoch <= epoch && e.ext.overlaps(query))
            .collect();
        candidates.sort_by(|a, b| (b.epoch, b.seq).cmp(&(a.epoch, a.seq)));

        let mut uncovered = vec![*query];
        let mut visible = Vec::new();
        for cand in candidates {
            if uncovered.is_empty() {
                break;
            }
            let mut rest = Vec::with_capacity(uncovered.len() + 1);
            for gap in uncovered {
                let hit = gap.intersect(&cand.ext);
                let (Some((glo, ghi)), Some((hlo, hhi))) = (gap.bounds(), hit.bounds()) else {
                    rest.push(gap);
                    continue;
                };
                visible.push(Visible {
                    stored: Arc::clone(cand),
                    sel: hit,
                });
                if glo < hlo {
                    rest.push(Extent::new(glo, hlo - 1));
                }
                if hhi < ghi {
                    rest.push(Extent::new(hhi + 1, ghi));
                }
            }
            uncovered = rest;
        }
        visible.sort_by_key(|v| v.sel.to_raw().0);
        trace!(
            "resolved {query} at epoch {epoch} into {} fragments",
            visible.len()
        );
        visible
    }
}
