//! Remote chunk store abstraction
//!
//! The remote store serves byte spans of an object through round-trip calls.
//! Every call must start at a multiple of the store's alignment unit and may
//! not ask for more than the store's per-call maximum. A call returns fewer
//! bytes than requested only when the span reaches the end of the object, and
//! an empty response with no error marks the end of the object.

pub mod http;

use async_trait::async_trait;
use bytes::Bytes;

pub use http::HttpChunkClient;

use crate::config::StoreConfig;
use crate::object::ObjectLocation;

/// Capability to fetch aligned byte spans from the remote store.
#[async_trait]
pub trait RemoteChunkClient: Send + Sync {
    /// Fetches up to `limit` bytes of `location` starting at `offset`.
    ///
    /// # Errors
    /// - `ChunkClientError::MisalignedOffset` - Offset breaks the alignment rule
    /// - `ChunkClientError::LimitExceeded` - Limit above the per-call maximum
    /// - `ChunkClientError::ObjectNotFound` - Store does not know the object
    /// - `ChunkClientError::Transport` - Remote call failed
    /// - `ChunkClientError::Timeout` - Remote call did not complete in time
    /// - `ChunkClientError::Protocol` - Response had an unexpected shape
    async fn fetch(
        &self,
        location: &ObjectLocation,
        offset: u64,
        limit: u64,
    ) -> Result<Bytes, ChunkClientError>;
}

/// Errors from a single remote chunk call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChunkClientError {
    /// Offset is not a multiple of the store's alignment unit.
    #[error("offset {offset} is not aligned to {alignment} bytes")]
    MisalignedOffset {
        /// Requested offset.
        offset: u64,
        /// Required alignment unit.
        alignment: u64,
    },

    /// Requested length exceeds what the store serves in one call.
    #[error("request for {limit} bytes exceeds the per-call maximum of {max}")]
    LimitExceeded {
        /// Requested length.
        limit: u64,
        /// Per-call maximum.
        max: u64,
    },

    /// The store returned something other than the requested span.
    #[error("protocol violation: {reason}")]
    Protocol {
        /// Description of the unexpected response.
        reason: String,
    },

    /// Remote object does not exist.
    #[error("remote object {location} not found")]
    ObjectNotFound {
        /// Location that could not be resolved.
        location: String,
    },

    /// The remote call failed in transit.
    #[error("transport error: {reason}")]
    Transport {
        /// Underlying failure description.
        reason: String,
    },

    /// The remote call timed out.
    #[error("request at offset {offset} timed out")]
    Timeout {
        /// Offset of the request that timed out.
        offset: u64,
    },

    /// The owning request was cancelled while the call was in flight.
    #[error("request cancelled")]
    Cancelled,
}

/// Request limits imposed by the remote store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreLimits {
    alignment: u64,
    chunk_size: u64,
    max_request_size: u64,
}

impl StoreLimits {
    /// Creates limits. Callers validate the relation between the values
    /// through `UndertowConfig::validate`.
    pub fn new(alignment: u64, chunk_size: u64, max_request_size: u64) -> Self {
        Self {
            alignment: alignment.max(1),
            chunk_size: chunk_size.max(1),
            max_request_size: max_request_size.max(1),
        }
    }

    pub fn alignment(&self) -> u64 {
        self.alignment
    }

    pub fn chunk_size(&self) -> u64 {
        self.chunk_size
    }

    pub fn max_request_size(&self) -> u64 {
        self.max_request_size
    }

    /// Rounds `offset` down to the nearest alignment boundary.
    pub fn align_down(&self, offset: u64) -> u64 {
        (offset / self.alignment) * self.alignment
    }

    /// Rounds `offset` down to the start of its read-ahead chunk.
    pub fn chunk_start(&self, offset: u64) -> u64 {
        (offset / self.chunk_size) * self.chunk_size
    }

    pub fn is_aligned(&self, offset: u64) -> bool {
        offset % self.alignment == 0
    }

    /// Checks a request against the store's rules before it is sent.
    ///
    /// # Errors
    /// - `ChunkClientError::MisalignedOffset` - Offset breaks alignment
    /// - `ChunkClientError::LimitExceeded` - Limit is zero or above the maximum
    pub fn check_request(&self, offset: u64, limit: u64) -> Result<(), ChunkClientError> {
        if !self.is_aligned(offset) {
            return Err(ChunkClientError::MisalignedOffset {
                offset,
                alignment: self.alignment,
            });
        }
        if limit == 0 || limit > self.max_request_size {
            return Err(ChunkClientError::LimitExceeded {
                limit,
                max: self.max_request_size,
            });
        }
        Ok(())
    }
}

impl Default for StoreLimits {
    fn default() -> Self {
        Self::from(&StoreConfig::default())
    }
}

impl From<&StoreConfig> for StoreLimits {
    fn from(config: &StoreConfig) -> Self {
        Self::new(config.alignment, config.chunk_size, config.max_request_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_align_down() {
        let limits = StoreLimits::new(4096, 524_288, 1_048_576);

        assert_eq!(limits.align_down(0), 0);
        assert_eq!(limits.align_down(4095), 0);
        assert_eq!(limits.align_down(4096), 4096);
        assert_eq!(limits.align_down(45_805_696), 45_805_568);
        assert_eq!(limits.chunk_start(600_000), 524_288);
    }

    #[test]
    fn test_check_request() {
        let limits = StoreLimits::new(4096, 524_288, 1_048_576);

        assert!(limits.check_request(8192, 1_048_576).is_ok());
        assert_eq!(
            limits.check_request(100, 10),
            Err(ChunkClientError::MisalignedOffset {
                offset: 100,
                alignment: 4096
            })
        );
        assert!(matches!(
            limits.check_request(0, 1_048_577),
            Err(ChunkClientError::LimitExceeded { .. })
        ));
        assert!(matches!(
            limits.check_request(0, 0),
            Err(ChunkClientError::LimitExceeded { .. })
        ));
    }
}
