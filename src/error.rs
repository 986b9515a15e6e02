use thiserror::Error;

use crate::store::fault::FaultPoint;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Malformed checksum descriptor: {0}")]
    MalformedDescriptor(String),

    #[error("Extent [{lo}, {hi}] is not covered by any stored extent")]
    ExtentOutOfBounds { lo: u64, hi: u64 },

    #[error("Injected failure at {0}")]
    InjectedFailure(FaultPoint),

    #[error("Allocation failure: {0}")]
    AllocationFailure(String),

    #[error("Invalid I/O descriptor: {0}")]
    InvalidIod(String),

    #[error("Checksum mismatch in extent [{lo}, {hi}]")]
    CsumMismatch { lo: u64, hi: u64 },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Stable status code reported by the update/fetch entry points.
    pub fn code(&self) -> i32 {
        match self {
            Error::MalformedDescriptor(_) => -1001,
            Error::ExtentOutOfBounds { .. } => -1002,
            Error::InjectedFailure(_) => -1003,
            Error::AllocationFailure(_) => -1004,
            Error::InvalidIod(_) => -1005,
            Error::Config(_) => -1006,
            Error::Io(_) => -1007,
            Error::CsumMismatch { .. } => -1008,
        }
    }
}
