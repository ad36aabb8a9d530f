//! Range streaming over the remote chunk store
//!
//! Range negotiation turns an HTTP `Range` header into a byte window, and the
//! range reader serves that window from aligned remote chunks with a
//! single-chunk read-ahead cache.

pub mod cache;
pub mod range;
pub mod reader;

pub use cache::{CachedChunk, ChunkCache};
pub use range::{
    ByteWindow, Disposition, HttpRange, RangeError, RangeNegotiation, negotiate,
    parse_range_header, unsatisfied_content_range,
};
pub use reader::{CancelHandle, RangeStreamReader};

use crate::store::ChunkClientError;

/// Errors surfaced by a range reader.
///
/// A reader reports at most one of these; afterwards it is finished and
/// every read yields end-of-stream.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StreamError {
    #[error("fetch at offset {offset} failed: {source}")]
    Fetch {
        offset: u64,
        #[source]
        source: ChunkClientError,
    },

    #[error("remote object ended before offset {offset}")]
    UnexpectedEnd { offset: u64 },

    #[error("stream cancelled")]
    Cancelled,
}
