//! Fault injection for the update and fetch entry points.
//!
//! `FaultInjector` only exists in test builds or with the `fault-injection`
//! feature; without it the entry points carry no checks at all.

#[cfg(any(test, feature = "fault-injection"))]
use std::sync::atomic::{AtomicU8, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultPoint {
    /// Checksum handling fails while storing an update.
    CsumUpdateFail,
    /// Checksum retrieval fails while building a fetch.
    CsumFetchFail,
}

impl FaultPoint {
    #[cfg(any(test, feature = "fault-injection"))]
    fn bit(self) -> u8 {
        match self {
            FaultPoint::CsumUpdateFail => 1 << 0,
            FaultPoint::CsumFetchFail => 1 << 1,
        }
    }
}

impl std::fmt::Display for FaultPoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FaultPoint::CsumUpdateFail => write!(f, "checksum update"),
            FaultPoint::CsumFetchFail => write!(f, "checksum fetch"),
        }
    }
}

/// Set of armed fault points, shared by reference with the entry points.
#[cfg(any(test, feature = "fault-injection"))]
#[derive(Debug, Default)]
pub struct FaultInjector {
    armed: AtomicU8,
}

#[cfg(any(test, feature = "fault-injection"))]
impl FaultInjector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, point: FaultPoint) {
        self.armed.fetch_or(point.bit(), Ordering::SeqCst);
    }

    pub fn clear(&self, point: FaultPoint) {
        self.armed.fetch_and(!point.bit(), Ordering::SeqCst);
    }

    pub fn reset(&self) {
        self.armed.store(0, Ordering::SeqCst);
    }

    pub fn is_set(&self, point: FaultPoint) -> bool {
        self.armed.load(Ordering::SeqCst) & point.bit() != 0
    }
}
