//! Bounded interior sampling of remote objects
//!
//! Draws a contiguous buffer of at most `target` bytes centred on the middle
//! of an object. The middle of a media file is far more representative than
//! its header, and a fixed budget keeps inspection cost independent of
//! object size.

use std::sync::Arc;

use bytes::{Bytes, BytesMut};

use crate::object::RemoteObjectHandle;
use crate::store::{ChunkClientError, RemoteChunkClient, StoreLimits};

/// Errors from drawing a sample.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SampleError {
    #[error("object is empty")]
    EmptyObject,

    #[error("fetch of {limit} bytes at offset {offset} failed: {source}")]
    Fetch {
        offset: u64,
        limit: u64,
        #[source]
        source: ChunkClientError,
    },

    #[error("sample offset {offset} lost alignment to {alignment} bytes")]
    Misaligned { offset: u64, alignment: u64 },

    #[error("store returned {returned} bytes for a {requested} byte request at offset {offset}")]
    Oversized {
        offset: u64,
        requested: u64,
        returned: u64,
    },

    #[error("store returned no data at offset {offset}")]
    NoData { offset: u64 },
}

/// Where a sample starts and how long it is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SamplePlan {
    pub start: u64,
    pub len: u64,
}

impl SamplePlan {
    /// Centres a window of `target` bytes on the middle of the object.
    ///
    /// The budget is capped to the object, the start is aligned down and the
    /// length shrinks if the aligned window would overrun the object end.
    pub fn compute(object_size: u64, target: u64, alignment: u64) -> Self {
        let alignment = alignment.max(1);
        let mut len = target.min(object_size);
        let raw_start = (object_size / 2).saturating_sub(len / 2);
        let start = (raw_start / alignment) * alignment;
        if start + len > object_size {
            len = object_size - start;
        }
        Self { start, len }
    }

    pub fn end(&self) -> u64 {
        self.start + self.len
    }
}

/// A contiguous sample covering `[start, start + data.len())`.
#[derive(Debug, Clone)]
pub struct Sample {
    pub start: u64,
    pub data: Bytes,
    /// Remote calls issued to assemble the sample.
    pub requests: usize,
}

impl Sample {
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Draws bounded samples through sequential aligned fetches.
pub struct BoundedSampler<C: RemoteChunkClient + ?Sized> {
    client: Arc<C>,
    limits: StoreLimits,
}

impl<C: RemoteChunkClient + ?Sized> BoundedSampler<C> {
    pub fn new(client: Arc<C>, limits: StoreLimits) -> Self {
        Self { client, limits }
    }

    pub fn limits(&self) -> StoreLimits {
        self.limits
    }

    /// Samples up to `target` bytes from the middle of `object`.
    ///
    /// Fetches run one after another because each call starts where the
    /// previous one ended. A zero-byte response ends the sample early with
    /// whatever was gathered.
    ///
    /// # Errors
    /// - `SampleError::EmptyObject` - Object size is zero
    /// - `SampleError::Fetch` - A remote call failed
    /// - `SampleError::Misaligned` - A short response broke offset alignment
    /// - `SampleError::Oversized` - The store returned more than requested
    /// - `SampleError::NoData` - The first call returned nothing
    pub async fn sample(
        &self,
        object: &RemoteObjectHandle,
        target: u64,
    ) -> Result<Sample, SampleError> {
        if object.size() == 0 {
            return Err(SampleError::EmptyObject);
        }

        let plan = SamplePlan::compute(object.size(), target, self.limits.alignment());
        let location = object.location();
        tracing::debug!(
            %location,
            size = object.size(),
            start = plan.start,
            len = plan.len,
            "Sampling object"
        );

        let mut data = BytesMut::with_capacity(usize::try_from(plan.len).unwrap_or(0));
        let mut offset = plan.start;
        let mut requests = 0;

        while offset < plan.end() {
            if !self.limits.is_aligned(offset) {
                return Err(SampleError::Misaligned {
                    offset,
                    alignment: self.limits.alignment(),
                });
            }

            let limit = self.limits.max_request_size().min(plan.end() - offset);
            let chunk = self
                .client
                .fetch(location, offset, limit)
                .await
                .map_err(|source| {
                    tracing::warn!(
                        %location,
                        offset,
                        limit,
                        error = %source,
                        "Sample fetch failed"
                    );
                    SampleError::Fetch {
                        offset,
                        limit,
                        source,
                    }
                })?;
            requests += 1;

            let returned = chunk.len() as u64;
            if returned > limit {
                return Err(SampleError::Oversized {
                    offset,
                    requested: limit,
                    returned,
                });
            }
            if returned == 0 {
                if data.is_empty() {
                    return Err(SampleError::NoData { offset });
                }
                tracing::warn!(
                    %location,
                    offset,
                    gathered = data.len(),
                    wanted = plan.len,
                    "Store ended early, keeping partial sample"
                );
                break;
            }

            data.extend_from_slice(&chunk);
            offset += returned;
        }

        tracing::debug!(%location, bytes = data.len(), requests, "Sample complete");
        Ok(Sample {
            start: plan.start,
            data: data.freeze(),
            requests,
        })
    }
}
