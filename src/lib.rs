// Library crate for evstore: a versioned extent store whose extents are
// protected by chunk-granular checksums.

pub mod config;
pub mod csum;
pub mod error;
pub mod extent;
pub mod store;

pub use csum::{CsumBuf, CsumIter};
pub use error::{Error, Result};
pub use extent::Extent;
pub use extent::entry::EvtEntry;
pub use extent::layout::{CsumLayout, csum_buf_len, csum_count};
pub use store::VersionedStore;
pub use store::fetch::{Biov, FetchHandle};
pub use store::iod::{Iod, IodType, Recx};
