//! Forward-only reader serving a byte window from aligned remote chunks.

use std::io;
use std::sync::Arc;

use bytes::Bytes;
use futures::{Stream, stream};
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use super::StreamError;
use super::cache::{CachedChunk, ChunkCache};
use super::range::ByteWindow;
use crate::object::ObjectLocation;
use crate::store::{ChunkClientError, RemoteChunkClient, StoreLimits};

/// State shared between a reader and its cancel handles.
#[derive(Debug)]
struct ReaderState {
    finished: Mutex<bool>,
    cancel: CancellationToken,
}

impl ReaderState {
    fn new(cancel: CancellationToken) -> Self {
        Self {
            finished: Mutex::new(false),
            cancel,
        }
    }

    fn is_finished(&self) -> bool {
        *self.finished.lock()
    }

    fn finish(&self) {
        *self.finished.lock() = true;
    }
}

/// Handle that stops a reader from another task.
///
/// Cancelling marks the reader finished and aborts any fetch it has in
/// flight.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    state: Arc<ReaderState>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.state.finish();
        self.state.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.state.cancel.is_cancelled()
    }
}

/// Serves the inclusive window `[start, end]` of one remote object.
///
/// The reader owns its cursor and a single cached chunk. Each cache miss
/// fetches one read-ahead chunk at `floor(cursor / chunk_size) * chunk_size`
/// and replaces the cache. A failed, empty or short fetch finishes the reader
/// for good: the failing read reports the error and every later read returns
/// `Ok(0)` without touching the store.
///
/// Exactly one task drives `read`. Other tasks interact only through
/// [`CancelHandle`].
pub struct RangeStreamReader<C: RemoteChunkClient + ?Sized> {
    client: Arc<C>,
    location: ObjectLocation,
    limits: StoreLimits,
    cursor: u64,
    end: u64,
    cache: ChunkCache,
    state: Arc<ReaderState>,
}

impl<C: RemoteChunkClient + ?Sized> RangeStreamReader<C> {
    pub fn new(
        client: Arc<C>,
        location: ObjectLocation,
        window: ByteWindow,
        limits: StoreLimits,
    ) -> Self {
        Self {
            client,
            location,
            limits,
            cursor: window.start(),
            end: window.end(),
            cache: ChunkCache::new(),
            state: Arc::new(ReaderState::new(CancellationToken::new())),
        }
    }

    /// Ties the reader to `parent`; cancelling the parent cancels the reader.
    ///
    /// Call before handing out cancel handles.
    pub fn with_cancellation(mut self, parent: &CancellationToken) -> Self {
        self.state = Arc::new(ReaderState::new(parent.child_token()));
        self
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            state: Arc::clone(&self.state),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.state.is_finished()
    }

    /// Copies the next bytes of the window into `buf`.
    ///
    /// Returns `Ok(0)` at end-of-stream.
    ///
    /// # Errors
    /// - `StreamError::Fetch` - The remote store call failed
    /// - `StreamError::UnexpectedEnd` - The store had no bytes at the cursor
    /// - `StreamError::Cancelled` - The reader was cancelled mid-fetch
    pub async fn read(&mut self, buf: &mut [u8]) -> Result<usize, StreamError> {
        if buf.is_empty() || self.state.is_finished() {
            return Ok(0);
        }
        if self.cursor > self.end {
            self.state.finish();
            return Ok(0);
        }

        if !self.cache.covers(self.cursor) {
            self.fill_cache().await?;
        }

        let Some(available) = self.cache.bytes_from(self.cursor) else {
            self.state.finish();
            return Err(StreamError::UnexpectedEnd {
                offset: self.cursor,
            });
        };

        let remaining = self.end - self.cursor + 1;
        let count = buf
            .len()
            .min(available.len())
            .min(usize::try_from(remaining).unwrap_or(usize::MAX));
        buf[..count].copy_from_slice(&available[..count]);
        self.cursor += count as u64;

        if self.cursor > self.end {
            self.state.finish();
        }
        Ok(count)
    }

    async fn fill_cache(&mut self) -> Result<(), StreamError> {
        let aligned = self.limits.chunk_start(self.cursor);
        let limit = self.limits.chunk_size();
        let token = self.state.cancel.clone();

        let fetched = tokio::select! {
            biased;
            () = token.cancelled() => Err(ChunkClientError::Cancelled),
            result = self.client.fetch(&self.location, aligned, limit) => result,
        };

        match fetched {
            Ok(data) => {
                let chunk = CachedChunk::new(aligned, data);
                if !chunk.covers(self.cursor) {
                    tracing::warn!(
                        location = %self.location,
                        offset = aligned,
                        cursor = self.cursor,
                        returned = chunk.len(),
                        "Remote store returned no bytes at the cursor"
                    );
                    self.state.finish();
                    return Err(StreamError::UnexpectedEnd {
                        offset: self.cursor,
                    });
                }
                tracing::trace!(
                    location = %self.location,
                    offset = aligned,
                    len = chunk.len(),
                    "Chunk cached"
                );
                self.cache.replace(chunk);
                Ok(())
            }
            Err(ChunkClientError::Cancelled) => {
                tracing::debug!(location = %self.location, cursor = self.cursor, "Read cancelled");
                self.state.finish();
                Err(StreamError::Cancelled)
            }
            Err(source) => {
                tracing::warn!(
                    location = %self.location,
                    offset = aligned,
                    limit,
                    error = %source,
                    "Chunk fetch failed, ending stream"
                );
                self.state.finish();
                Err(StreamError::Fetch {
                    offset: aligned,
                    source,
                })
            }
        }
    }
}

impl<C: RemoteChunkClient + ?Sized + 'static> RangeStreamReader<C> {
    /// Adapts the reader into a body stream of frames up to `buffer_size`.
    ///
    /// A reader error becomes one `io::Error` item, after which the stream
    /// ends. HTTP servers abort the response on that item, so clients see a
    /// truncated body rather than a stalled one.
    pub fn into_body_stream(
        self,
        buffer_size: usize,
    ) -> impl Stream<Item = io::Result<Bytes>> + Send + 'static {
        let buffer_size = buffer_size.max(1);
        stream::unfold(self, move |mut reader| async move {
            let mut buf = vec![0u8; buffer_size];
            match reader.read(&mut buf).await {
                Ok(0) => None,
                Ok(count) => {
                    buf.truncate(count);
                    Some((Ok(Bytes::from(buf)), reader))
                }
                Err(e) => Some((Err(io::Error::other(e)), reader)),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;
    use futures::StreamExt;
    use proptest::prelude::*;

    use super::*;

    #[derive(Default)]
    struct MockBehaviour {
        fail_on_call: Option<usize>,
        empty_on_call: Option<usize>,
        hang: bool,
    }

    // Enforces the store contract and records every call.
    struct MockChunkStore {
        data: Bytes,
        limits: StoreLimits,
        fetches: Mutex<Vec<(u64, u64)>>,
        behaviour: MockBehaviour,
    }

    impl MockChunkStore {
        fn new(data: Vec<u8>, limits: StoreLimits) -> Self {
            Self::with_behaviour(data, limits, MockBehaviour::default())
        }

        fn with_behaviour(data: Vec<u8>, limits: StoreLimits, behaviour: MockBehaviour) -> Self {
            Self {
                data: Bytes::from(data),
                limits,
                fetches: Mutex::new(Vec::new()),
                behaviour,
            }
        }

        fn fetches(&self) -> Vec<(u64, u64)> {
            self.fetches.lock().clone()
        }
    }

    #[async_trait]
    impl RemoteChunkClient for MockChunkStore {
        async fn fetch(
            &self,
            _location: &ObjectLocation,
            offset: u64,
            limit: u64,
        ) -> Result<Bytes, ChunkClientError> {
            let call = {
                let mut fetches = self.fetches.lock();
                fetches.push((offset, limit));
                fetches.len() - 1
            };
            self.limits.check_request(offset, limit)?;

            if self.behaviour.hang {
                std::future::pending::<()>().await;
            }
            if self.behaviour.fail_on_call == Some(call) {
                return Err(ChunkClientError::Transport {
                    reason: "connection reset".to_string(),
                });
            }
            if self.behaviour.empty_on_call == Some(call) {
                return Ok(Bytes::new());
            }

            let len = self.data.len() as u64;
            if offset >= len {
                return Ok(Bytes::new());
            }
            let end = (offset + limit).min(len);
            Ok(self.data.slice(offset as usize..end as usize))
        }
    }

    fn test_limits() -> StoreLimits {
        StoreLimits::new(16, 64, 128)
    }

    fn pattern(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    fn reader_for(
        store: &Arc<MockChunkStore>,
        start: u64,
        end: u64,
    ) -> RangeStreamReader<MockChunkStore> {
        let size = store.data.len() as u64;
        RangeStreamReader::new(
            Arc::clone(store),
            ObjectLocation::new("object"),
            ByteWindow::new(start, end, size).unwrap(),
            test_limits(),
        )
    }

    async fn drain(reader: &mut RangeStreamReader<MockChunkStore>, buf_size: usize) -> Vec<u8> {
        let mut out = Vec::new();
        let mut buf = vec![0u8; buf_size];
        loop {
            let count = reader.read(&mut buf).await.unwrap();
            if count == 0 {
                return out;
            }
            out.extend_from_slice(&buf[..count]);
        }
    }

    #[tokio::test]
    async fn test_reads_whole_object() {
        let data = pattern(300);
        let store = Arc::new(MockChunkStore::new(data.clone(), test_limits()));
        let mut reader = reader_for(&store, 0, 299);

        assert_eq!(drain(&mut reader, 50).await, data);
        assert!(reader.is_finished());
    }

    #[tokio::test]
    async fn test_reads_interior_window() {
        let data = pattern(300);
        let store = Arc::new(MockChunkStore::new(data.clone(), test_limits()));
        let mut reader = reader_for(&store, 70, 200);

        assert_eq!(drain(&mut reader, 7).await, data[70..=200].to_vec());
        // First fetch starts at the chunk holding byte 70.
        assert_eq!(store.fetches()[0], (64, 64));
    }

    #[tokio::test]
    async fn test_small_reads_reuse_cached_chunk() {
        let store = Arc::new(MockChunkStore::new(pattern(64), test_limits()));
        let mut reader = reader_for(&store, 0, 63);

        drain(&mut reader, 3).await;
        assert_eq!(store.fetches().len(), 1);
    }

    #[tokio::test]
    async fn test_fetches_are_aligned_and_bounded() {
        let store = Arc::new(MockChunkStore::new(pattern(1000), test_limits()));
        let mut reader = reader_for(&store, 33, 977);
        drain(&mut reader, 100).await;

        let limits = test_limits();
        for (offset, limit) in store.fetches() {
            assert!(limits.is_aligned(offset), "offset {offset} misaligned");
            assert!(limit <= limits.max_request_size());
        }
    }

    #[tokio::test]
    async fn test_never_reads_past_window_end() {
        let data = pattern(256);
        let store = Arc::new(MockChunkStore::new(data.clone(), test_limits()));
        let mut reader = reader_for(&store, 10, 20);

        let mut buf = vec![0u8; 128];
        let count = reader.read(&mut buf).await.unwrap();
        assert_eq!(count, 11);
        assert_eq!(&buf[..count], &data[10..=20]);
        assert_eq!(reader.read(&mut buf).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_failed_fetch_is_sticky() {
        let store = Arc::new(MockChunkStore::with_behaviour(
            pattern(256),
            test_limits(),
            MockBehaviour {
                fail_on_call: Some(1),
                ..Default::default()
            },
        ));
        let mut reader = reader_for(&store, 0, 255);
        let mut buf = vec![0u8; 64];

        assert_eq!(reader.read(&mut buf).await.unwrap(), 64);
        assert!(matches!(
            reader.read(&mut buf).await,
            Err(StreamError::Fetch { offset: 64, .. })
        ));
        assert!(reader.is_finished());

        for _ in 0..3 {
            assert_eq!(reader.read(&mut buf).await.unwrap(), 0);
        }
        assert_eq!(store.fetches().len(), 2);
    }

    #[tokio::test]
    async fn test_empty_fetch_is_sticky() {
        let store = Arc::new(MockChunkStore::with_behaviour(
            pattern(256),
            test_limits(),
            MockBehaviour {
                empty_on_call: Some(0),
                ..Default::default()
            },
        ));
        let mut reader = reader_for(&store, 0, 255);
        let mut buf = vec![0u8; 16];

        assert_eq!(
            reader.read(&mut buf).await,
            Err(StreamError::UnexpectedEnd { offset: 0 })
        );
        assert_eq!(reader.read(&mut buf).await.unwrap(), 0);
        assert_eq!(store.fetches().len(), 1);
    }

    #[tokio::test]
    async fn test_cancel_before_read() {
        let store = Arc::new(MockChunkStore::new(pattern(64), test_limits()));
        let mut reader = reader_for(&store, 0, 63);
        let handle = reader.cancel_handle();

        handle.cancel();

        let mut buf = vec![0u8; 16];
        assert_eq!(reader.read(&mut buf).await.unwrap(), 0);
        assert!(handle.is_cancelled());
        assert!(store.fetches().is_empty());
    }

    #[tokio::test]
    async fn test_cancel_aborts_inflight_fetch() {
        let store = Arc::new(MockChunkStore::with_behaviour(
            pattern(64),
            test_limits(),
            MockBehaviour {
                hang: true,
                ..Default::default()
            },
        ));
        let mut reader = reader_for(&store, 0, 63);
        let handle = reader.cancel_handle();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            handle.cancel();
        });

        let mut buf = vec![0u8; 16];
        let result = tokio::time::timeout(Duration::from_secs(5), reader.read(&mut buf))
            .await
            .expect("cancellation should abort the fetch");
        assert_eq!(result, Err(StreamError::Cancelled));
        assert_eq!(reader.read(&mut buf).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_parent_token_cancels_reader() {
        let store = Arc::new(MockChunkStore::new(pattern(64), test_limits()));
        let parent = CancellationToken::new();
        let reader = reader_for(&store, 0, 63).with_cancellation(&parent);
        let handle = reader.cancel_handle();

        parent.cancel();
        assert!(handle.is_cancelled());
    }

    #[tokio::test]
    async fn test_body_stream_yields_window() {
        let data = pattern(500);
        let store = Arc::new(MockChunkStore::new(data.clone(), test_limits()));
        let reader = reader_for(&store, 100, 399);

        let frames: Vec<Bytes> = reader
            .into_body_stream(48)
            .map(|frame| frame.unwrap())
            .collect()
            .await;

        assert!(frames.iter().all(|frame| frame.len() <= 48));
        assert_eq!(frames.concat(), data[100..400].to_vec());
    }

    #[tokio::test]
    async fn test_body_stream_ends_after_error() {
        let store = Arc::new(MockChunkStore::with_behaviour(
            pattern(256),
            test_limits(),
            MockBehaviour {
                fail_on_call: Some(1),
                ..Default::default()
            },
        ));
        let reader = reader_for(&store, 0, 255);

        let items: Vec<io::Result<Bytes>> = reader.into_body_stream(64).collect().await;
        assert_eq!(items.len(), 2);
        assert!(items[0].is_ok());
        assert!(items[1].is_err());
    }

    proptest! {
        #[test]
        fn prop_reader_is_byte_exact(
            size in 1usize..600,
            a in any::<prop::sample::Index>(),
            b in any::<prop::sample::Index>(),
            buf_size in 1usize..200,
        ) {
            let data = pattern(size);
            let (x, y) = (a.index(size), b.index(size));
            let (start, end) = (x.min(y), x.max(y));

            let store = Arc::new(MockChunkStore::new(data.clone(), test_limits()));
            let mut reader = reader_for(&store, start as u64, end as u64);
            let read = tokio_test::block_on(drain(&mut reader, buf_size));

            prop_assert_eq!(read, data[start..=end].to_vec());
            for (offset, limit) in store.fetches() {
                prop_assert_eq!(offset % 16, 0);
                prop_assert!(limit <= 128);
            }
        }
    }
}
