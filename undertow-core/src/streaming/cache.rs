//! Single-chunk read-ahead cache
//!
//! Range readers only move forward, so the most recently fetched chunk is the
//! only one worth keeping. A miss swaps the whole slot; chunks are never
//! merged.

use bytes::Bytes;

/// One chunk fetched from the remote store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedChunk {
    offset: u64,
    data: Bytes,
}

impl CachedChunk {
    pub fn new(offset: u64, data: Bytes) -> Self {
        Self { offset, data }
    }

    pub(crate) fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether object byte `position` lies inside this chunk.
    pub fn covers(&self, position: u64) -> bool {
        position >= self.offset && position - self.offset < self.data.len() as u64
    }
}

/// Cache holding at most one chunk.
#[derive(Debug, Default)]
pub struct ChunkCache {
    slot: Option<CachedChunk>,
}

impl ChunkCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn covers(&self, position: u64) -> bool {
        self.slot.as_ref().is_some_and(|chunk| chunk.covers(position))
    }

    /// Bytes of the cached chunk from `position` to the chunk's end.
    ///
    /// Returns `None` when the cache does not cover `position`.
    pub fn bytes_from(&self, position: u64) -> Option<&[u8]> {
        let chunk = self.slot.as_ref().filter(|chunk| chunk.covers(position))?;
        let start = (position - chunk.offset) as usize;
        Some(&chunk.data[start..])
    }

    /// Replaces the cached chunk.
    pub fn replace(&mut self, chunk: CachedChunk) {
        self.slot = Some(chunk);
    }
}
